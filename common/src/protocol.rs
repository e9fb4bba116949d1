//! Registros que el worker le devuelve al coordinator.
//!
//! Los nombres de campo siguen el JSON que espera el coordinator
//! (camelCase, enums en SCREAMING_SNAKE_CASE).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::task_id::TaskId;

/* --------- Estado --------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    #[default]
    Planned,
    Running,
    Finished,
    Canceled,
    Aborted,
    Failed,
}

impl TaskState {
    pub fn is_done(self) -> bool {
        matches!(
            self,
            TaskState::Finished | TaskState::Canceled | TaskState::Aborted | TaskState::Failed
        )
    }
}

/// Grupo de drivers terminado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lifespan {
    pub grouped: bool,
    pub group_id: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub task_instance_id_least_significant_bits: i64,
    pub task_instance_id_most_significant_bits: i64,
    pub version: i64,
    pub state: TaskState,
    pub completed_driver_groups: Vec<Lifespan>,
    pub failures: Vec<ExecutionFailureInfo>,
    pub queued_partitioned_drivers: u64,
    pub running_partitioned_drivers: u64,
    pub memory_reservation_in_bytes: u64,
    pub system_memory_reservation_in_bytes: u64,
    pub peak_node_total_memory_reservation_in_bytes: u64,
}

/* --------- Errores --------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    UserError,
    #[default]
    InternalError,
    InsufficientResources,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCause {
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorCode {
    pub code: i32,
    pub name: String,
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub retriable: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLocation {
    pub line_number: i32,
    pub column_number: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionFailureInfo {
    #[serde(rename = "type")]
    pub failure_type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ExecutionFailureInfo>>,
    pub suppressed: Vec<ExecutionFailureInfo>,
    pub stack: Vec<String>,
    pub error_location: ErrorLocation,
    pub error_code: ErrorCode,
    pub error_cause: ErrorCause,
}

/* --------- Métricas --------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuntimeUnit {
    #[default]
    None,
    Nano,
    Byte,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeMetric {
    pub name: String,
    pub unit: RuntimeUnit,
    pub sum: i64,
    pub count: i64,
    pub max: i64,
    pub min: i64,
}

/* --------- Duration y DataSize --------- */

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitParseError {
    #[error("valor sin unidad o mal formado: '{0}'")]
    Malformed(String),
    #[error("unidad desconocida '{unit}' en '{value}'")]
    UnknownUnit { value: String, unit: String },
}

/// Separa "12.5ms" en (12.5, "ms").
fn split_value_unit(s: &str) -> Result<(f64, &str), UnitParseError> {
    let s = s.trim();
    let idx = s
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(|| UnitParseError::Malformed(s.to_string()))?;
    let (num, unit) = s.split_at(idx);
    let value = num
        .trim()
        .parse::<f64>()
        .map_err(|_| UnitParseError::Malformed(s.to_string()))?;
    if value < 0.0 || !value.is_finite() {
        return Err(UnitParseError::Malformed(s.to_string()));
    }
    Ok((value, unit))
}

/// Duración del protocolo. Se serializa como "<valor><unidad>", ej: "1500.00ns".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Duration {
    nanos: u64,
}

impl Duration {
    pub fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    pub fn as_nanos(&self) -> u64 {
        self.nanos
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}ns", self.nanos as f64)
    }
}

impl FromStr for Duration {
    type Err = UnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, unit) = split_value_unit(s)?;
        let factor: f64 = match unit {
            "ns" => 1.0,
            "us" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60.0 * 1e9,
            "h" => 3600.0 * 1e9,
            "d" => 86400.0 * 1e9,
            other => {
                return Err(UnitParseError::UnknownUnit {
                    value: s.to_string(),
                    unit: other.to_string(),
                })
            }
        };
        Ok(Self::from_nanos((value * factor).round() as u64))
    }
}

impl From<Duration> for String {
    fn from(value: Duration) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Duration {
    type Error = UnitParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Tamaño del protocolo. Se serializa como "<bytes>B".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DataSize {
    bytes: u64,
}

impl DataSize {
    pub fn from_bytes(bytes: u64) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> u64 {
        self.bytes
    }
}

impl fmt::Display for DataSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.bytes)
    }
}

impl FromStr for DataSize {
    type Err = UnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, unit) = split_value_unit(s)?;
        let factor: f64 = match unit {
            "B" => 1.0,
            "kB" => 1024.0,
            "MB" => 1024.0 * 1024.0,
            "GB" => 1024.0 * 1024.0 * 1024.0,
            "TB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
            "PB" => 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
            other => {
                return Err(UnitParseError::UnknownUnit {
                    value: s.to_string(),
                    unit: other.to_string(),
                })
            }
        };
        Ok(Self::from_bytes((value * factor).round() as u64))
    }
}

impl From<DataSize> for String {
    fn from(value: DataSize) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for DataSize {
    type Error = UnitParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/* --------- Estadísticas --------- */

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorStats {
    pub stage_id: i32,
    pub stage_execution_id: i32,
    pub pipeline_id: i32,
    pub operator_id: i32,
    pub plan_node_id: String,
    pub operator_type: String,
    pub total_drivers: i64,

    pub add_input_calls: u64,
    pub add_input_wall: Duration,
    pub add_input_cpu: Duration,
    pub raw_input_data_size: DataSize,
    pub raw_input_positions: u64,
    pub input_data_size: DataSize,
    pub input_positions: u64,
    pub sum_squared_input_positions: f64,

    pub get_output_calls: u64,
    pub get_output_wall: Duration,
    pub get_output_cpu: Duration,
    pub output_data_size: DataSize,
    pub output_positions: u64,

    pub blocked_wall: Duration,

    pub finish_calls: u64,
    pub finish_wall: Duration,
    pub finish_cpu: Duration,

    pub user_memory_reservation: DataSize,
    pub revocable_memory_reservation: DataSize,
    pub system_memory_reservation: DataSize,
    pub peak_user_memory_reservation: DataSize,
    pub peak_system_memory_reservation: DataSize,
    pub peak_total_memory_reservation: DataSize,

    pub spilled_data_size: DataSize,

    pub runtime_stats: BTreeMap<String, RuntimeMetric>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    pub pipeline_id: i32,

    pub first_start_time: String,
    pub last_start_time: String,
    pub last_end_time: String,

    pub input_pipeline: bool,
    pub output_pipeline: bool,

    pub total_drivers: i64,

    pub user_memory_reservation_in_bytes: u64,
    pub revocable_memory_reservation_in_bytes: u64,
    pub system_memory_reservation_in_bytes: u64,

    pub total_scheduled_time_in_nanos: u64,
    pub total_cpu_time_in_nanos: u64,
    pub total_blocked_time_in_nanos: u64,

    pub raw_input_data_size_in_bytes: u64,
    pub raw_input_positions: u64,
    pub processed_input_data_size_in_bytes: u64,
    pub processed_input_positions: u64,
    pub output_data_size_in_bytes: u64,
    pub output_positions: u64,

    pub operator_summaries: Vec<OperatorStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub create_time: String,
    pub first_start_time: String,
    pub last_start_time: String,
    pub last_end_time: String,
    pub end_time: String,

    pub elapsed_time_in_nanos: u64,
    pub queued_time_in_nanos: u64,

    pub total_drivers: u64,
    pub queued_drivers: u64,
    pub running_drivers: u64,
    pub completed_drivers: u64,

    pub cumulative_user_memory: f64,
    pub user_memory_reservation_in_bytes: u64,
    pub revocable_memory_reservation_in_bytes: u64,
    pub system_memory_reservation_in_bytes: u64,
    pub peak_total_memory_in_bytes: u64,
    pub peak_user_memory_in_bytes: u64,
    pub peak_node_total_memory_in_bytes: u64,

    pub total_scheduled_time_in_nanos: u64,
    pub total_cpu_time_in_nanos: u64,
    pub total_blocked_time_in_nanos: u64,

    pub raw_input_data_size_in_bytes: u64,
    pub raw_input_positions: u64,
    pub processed_input_data_size_in_bytes: u64,
    pub processed_input_positions: u64,
    pub output_data_size_in_bytes: u64,
    pub output_positions: u64,

    pub pipelines: Vec<PipelineStats>,

    pub runtime_stats: BTreeMap<String, RuntimeMetric>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub task_id: TaskId,
    pub task_status: TaskStatus,
    pub last_heartbeat: String,
    pub stats: TaskStats,
    pub needs_plan: bool,
    pub node_id: String,
}

impl TaskInfo {
    pub fn new(task_id: TaskId, node_id: &str) -> Self {
        Self {
            task_id,
            task_status: TaskStatus::default(),
            last_heartbeat: String::new(),
            stats: TaskStats::default(),
            needs_plan: false,
            node_id: node_id.to_string(),
        }
    }
}
