//! Modelo del lado del engine de ejecución.
//!
//! Estas estructuras son lo que el engine expone sobre una tarea viva:
//! estado, árbol de estadísticas (task -> pipeline -> operador -> métrica),
//! memoria y errores terminales. El worker solo las lee.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

use crate::metric::RuntimeMetric;

/* --------- Estado de la tarea en el engine --------- */

/// Estados de una tarea en el engine. El orden coincide con el de
/// `task_numbers_to_string`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecTaskState {
    Running,
    Finished,
    Canceled,
    Aborted,
    Failed,
}

impl ExecTaskState {
    pub const ALL: [ExecTaskState; 5] = [
        ExecTaskState::Running,
        ExecTaskState::Finished,
        ExecTaskState::Canceled,
        ExecTaskState::Aborted,
        ExecTaskState::Failed,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            ExecTaskState::Running => "Running",
            ExecTaskState::Finished => "Finished",
            ExecTaskState::Canceled => "Canceled",
            ExecTaskState::Aborted => "Aborted",
            ExecTaskState::Failed => "Failed",
        }
    }
}

/// Motivo por el que un driver está bloqueado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockingReason {
    NotBlocked,
    WaitForConsumer,
    WaitForSplit,
    WaitForProducer,
    WaitForJoinBuild,
    WaitForJoinProbe,
    WaitForMergeJoinRightSide,
    WaitForMemory,
    WaitForConnector,
    WaitForSpill,
    Yield,
}

impl fmt::Display for BlockingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/* --------- Árbol de estadísticas --------- */

/// Tiempo acumulado de una fase (add_input, get_output, finish).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuWallTiming {
    pub count: u64,
    pub wall_nanos: u64,
    pub cpu_nanos: u64,
}

impl CpuWallTiming {
    pub fn new(count: u64, wall_nanos: u64, cpu_nanos: u64) -> Self {
        Self {
            count,
            wall_nanos,
            cpu_nanos,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorMemoryStats {
    pub user_memory_reservation: u64,
    pub revocable_memory_reservation: u64,
    pub system_memory_reservation: u64,
    pub peak_user_memory_reservation: u64,
    pub peak_system_memory_reservation: u64,
    pub peak_total_memory_reservation: u64,
}

/// Contadores de un operador tal como los reporta el engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecOperatorStats {
    pub operator_id: i32,
    pub pipeline_id: i32,
    pub plan_node_id: String,
    /// Nombre nativo del operador, ej: "TableScan", "FilterProject".
    pub operator_type: String,
    pub num_drivers: i32,
    pub num_splits: u64,

    pub raw_input_positions: u64,
    pub raw_input_bytes: u64,
    pub input_positions: u64,
    pub input_bytes: u64,
    pub output_positions: u64,
    pub output_bytes: u64,

    pub add_input_timing: CpuWallTiming,
    pub get_output_timing: CpuWallTiming,
    pub finish_timing: CpuWallTiming,
    pub blocked_wall_nanos: u64,

    pub memory_stats: OperatorMemoryStats,

    pub spilled_bytes: u64,
    pub spilled_rows: u64,
    pub spilled_partitions: u64,
    pub spilled_files: u64,

    pub runtime_stats: HashMap<String, RuntimeMetric>,
}

impl ExecOperatorStats {
    pub fn new(pipeline_id: i32, operator_id: i32, plan_node_id: &str, operator_type: &str) -> Self {
        Self {
            operator_id,
            pipeline_id,
            plan_node_id: plan_node_id.to_string(),
            operator_type: operator_type.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecPipelineStats {
    /// Operadores en orden físico: el de entrada primero, el de salida último.
    pub operator_stats: Vec<ExecOperatorStats>,
    pub input_pipeline: bool,
    pub output_pipeline: bool,
}

/// Snapshot de contadores de una tarea. Los tiempos van en ms desde epoch;
/// 0 significa "todavía no ocurrió".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecTaskStats {
    pub num_total_splits: u64,
    pub num_finished_splits: u64,
    pub num_running_splits: u64,
    pub num_queued_splits: u64,
    pub completed_split_groups: Vec<i32>,

    pub execution_start_time_ms: u64,
    pub first_split_start_time_ms: u64,
    pub last_split_start_time_ms: u64,
    pub execution_end_time_ms: u64,
    /// Fin visto desde afuera: cuando el consumidor terminó de leer la salida.
    pub end_time_ms: u64,

    pub pipeline_stats: Vec<ExecPipelineStats>,

    pub num_total_drivers: u64,
    pub num_completed_drivers: u64,
    pub num_terminated_drivers: u64,
    pub num_running_drivers: u64,
    pub num_blocked_drivers: BTreeMap<BlockingReason, u64>,
}

/// Bytes actuales y pico de un tracker de memoria.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub current_bytes: u64,
    pub peak_bytes: u64,
}

/* --------- Errores del engine --------- */

/// Origen de un error del engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSource {
    User,
    Runtime,
    System,
}

/// Error capturado de una tarea: antes de crearla o reportado por el engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    #[error("{message}")]
    Engine {
        error_source: ErrorSource,
        /// Código del engine, ej: "INVALID_ARGUMENT", "MEMORY_CAP_EXCEEDED".
        error_code: String,
        message: String,
        line: u32,
        stack: Vec<String>,
        cause: Option<Box<ExecError>>,
    },

    #[error("{message}")]
    Generic {
        message: String,
        cause: Option<Box<ExecError>>,
    },
}

impl ExecError {
    pub fn generic(message: impl Into<String>) -> Self {
        ExecError::Generic {
            message: message.into(),
            cause: None,
        }
    }

    pub fn engine(error_source: ErrorSource, error_code: &str, message: impl Into<String>) -> Self {
        ExecError::Engine {
            error_source,
            error_code: error_code.to_string(),
            message: message.into(),
            line: 0,
            stack: Vec::new(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, next: ExecError) -> Self {
        match &mut self {
            ExecError::Engine { cause, .. } | ExecError::Generic { cause, .. } => {
                *cause = Some(Box::new(next));
            }
        }
        self
    }

    pub fn cause(&self) -> Option<&ExecError> {
        match self {
            ExecError::Engine { cause, .. } | ExecError::Generic { cause, .. } => cause.as_deref(),
        }
    }
}

/* --------- Tarea viva del engine --------- */

/// Lo que el worker necesita de una tarea del engine.
///
/// Los contadores que devuelve `task_stats` los mantiene el engine; acá solo
/// se leen.
pub trait ExecTask: Send + Sync {
    fn state(&self) -> ExecTaskState;

    fn task_stats(&self) -> ExecTaskStats;

    /// Tracker de memoria de la propia tarea.
    fn memory_usage(&self) -> MemoryUsage;

    /// Tracker de memoria de la query dueña de la tarea.
    fn query_memory_usage(&self) -> MemoryUsage;

    /// Error terminal registrado por el engine, si hubo.
    fn error(&self) -> Option<ExecError>;

    fn request_cancel(&self);

    fn request_abort(&self);
}
