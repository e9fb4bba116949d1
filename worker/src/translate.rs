//! Traducciones del modelo del engine al modelo del protocolo.
//!
//! Todo acá son funciones puras.

use chrono::{DateTime, Utc};
use common::protocol::{self, RuntimeUnit};
use common::{
    CpuWallTiming, Duration, ErrorCause, ErrorCode, ErrorLocation, ErrorSource, ErrorType,
    ExecError, ExecTaskState, ExecutionFailureInfo, RuntimeCounterUnit, RuntimeMetric, TaskState,
};

/* --------- Estados y unidades --------- */

pub fn to_task_state(state: ExecTaskState) -> TaskState {
    match state {
        ExecTaskState::Running => TaskState::Running,
        ExecTaskState::Finished => TaskState::Finished,
        ExecTaskState::Canceled => TaskState::Canceled,
        ExecTaskState::Failed => TaskState::Failed,
        ExecTaskState::Aborted => TaskState::Aborted,
    }
}

pub fn to_runtime_unit(unit: RuntimeCounterUnit) -> RuntimeUnit {
    match unit {
        RuntimeCounterUnit::Nanos => RuntimeUnit::Nano,
        RuntimeCounterUnit::Bytes => RuntimeUnit::Byte,
        RuntimeCounterUnit::None => RuntimeUnit::None,
    }
}

/// El coordinator tiene lógica de estadísticas que depende del nombre del
/// operador, así que algunos nombres del engine se renombran.
pub fn to_operator_type(operator_type: &str) -> &str {
    match operator_type {
        "MergeExchange" => "MergeOperator",
        "Exchange" => "ExchangeOperator",
        "TableScan" => "TableScanOperator",
        other => other,
    }
}

/// (llamadas, wall, cpu) de una fase.
pub fn to_timing(timing: &CpuWallTiming) -> (u64, Duration, Duration) {
    (
        timing.count,
        Duration::from_nanos(timing.wall_nanos),
        Duration::from_nanos(timing.cpu_nanos),
    )
}

pub fn to_runtime_metric(name: &str, metric: &RuntimeMetric) -> protocol::RuntimeMetric {
    protocol::RuntimeMetric {
        name: name.to_string(),
        unit: to_runtime_unit(metric.unit),
        sum: metric.sum,
        count: metric.count,
        max: metric.max,
        min: metric.min,
    }
}

/// Milisegundos desde epoch -> "2024-01-31T10:00:00.000Z".
pub fn to_iso_timestamp(ms: u64) -> String {
    let ms = i64::try_from(ms).unwrap_or(i64::MAX);
    let dt: DateTime<Utc> = DateTime::from_timestamp_millis(ms).unwrap_or_default();
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/* --------- Errores --------- */

const GENERIC_USER_ERROR: i32 = 0x0000_0000;
const NOT_SUPPORTED: i32 = 0x0000_000D;
const GENERIC_INTERNAL_ERROR: i32 = 0x0001_0000;
const GENERIC_INSUFFICIENT_RESOURCES: i32 = 0x0002_0000;
const EXCEEDED_LOCAL_MEMORY_LIMIT: i32 = 0x0002_0007;

fn error_code(code: i32, name: &str, error_type: ErrorType) -> ErrorCode {
    ErrorCode {
        code,
        name: name.to_string(),
        error_type,
        retriable: false,
    }
}

fn internal_error_code() -> ErrorCode {
    error_code(
        GENERIC_INTERNAL_ERROR,
        "GENERIC_INTERNAL_ERROR",
        ErrorType::InternalError,
    )
}

/// Tabla fija (origen, código del engine) -> código del protocolo.
fn translate_error_code(error_source: ErrorSource, code: &str) -> ErrorCode {
    match (error_source, code) {
        (ErrorSource::User, "INVALID_ARGUMENT") | (ErrorSource::User, "ARITHMETIC_ERROR") => {
            error_code(GENERIC_USER_ERROR, "GENERIC_USER_ERROR", ErrorType::UserError)
        }
        (ErrorSource::User, "UNSUPPORTED") => {
            error_code(NOT_SUPPORTED, "NOT_SUPPORTED", ErrorType::UserError)
        }
        (ErrorSource::Runtime, "MEMORY_CAP_EXCEEDED") => error_code(
            EXCEEDED_LOCAL_MEMORY_LIMIT,
            "EXCEEDED_LOCAL_MEMORY_LIMIT",
            ErrorType::InsufficientResources,
        ),
        (ErrorSource::Runtime, "MEMORY_ABORTED") => error_code(
            GENERIC_INSUFFICIENT_RESOURCES,
            "GENERIC_INSUFFICIENT_RESOURCES",
            ErrorType::InsufficientResources,
        ),
        _ => internal_error_code(),
    }
}

/// Convierte un error capturado en el registro de falla del protocolo.
/// Las causas anidadas se traducen recursivamente.
pub fn to_failure_info(err: &ExecError) -> ExecutionFailureInfo {
    let cause = err.cause().map(|c| Box::new(to_failure_info(c)));

    match err {
        ExecError::Engine {
            error_source,
            error_code,
            message,
            line,
            stack,
            ..
        } => {
            let failure_type = match error_source {
                ErrorSource::User => "VeloxUserError",
                ErrorSource::Runtime | ErrorSource::System => "VeloxRuntimeError",
            };
            ExecutionFailureInfo {
                failure_type: failure_type.to_string(),
                message: message.clone(),
                cause,
                suppressed: Vec::new(),
                stack: stack.clone(),
                error_location: ErrorLocation {
                    line_number: i32::try_from(*line).unwrap_or(i32::MAX).max(1),
                    column_number: 1,
                },
                error_code: translate_error_code(*error_source, error_code),
                error_cause: ErrorCause::Unknown,
            }
        }
        ExecError::Generic { message, .. } => ExecutionFailureInfo {
            failure_type: "std::exception".to_string(),
            message: message.clone(),
            cause,
            suppressed: Vec::new(),
            stack: Vec::new(),
            error_location: ErrorLocation {
                line_number: 1,
                column_number: 1,
            },
            error_code: internal_error_code(),
            error_cause: ErrorCause::Unknown,
        },
    }
}

/* --------- Logging --------- */

/// Resumen de tareas por estado del engine, en el orden
/// Running, Finished, Canceled, Aborted, Failed. Omite los ceros.
///
/// Las entradas van separadas por un espacio, sin espacio al final:
/// `"Running=3 Failed=1"`.
pub fn task_numbers_to_string(task_numbers: &[usize; 5]) -> String {
    ExecTaskState::ALL
        .iter()
        .zip(task_numbers.iter())
        .filter(|(_, n)| **n != 0)
        .map(|(state, n)| format!("{}={}", state.name(), n))
        .collect::<Vec<_>>()
        .join(" ")
}
