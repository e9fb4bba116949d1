pub mod exec;
pub mod metric;
pub mod protocol;
pub mod task_id;

pub use exec::{
    BlockingReason, CpuWallTiming, ErrorSource, ExecError, ExecOperatorStats, ExecPipelineStats,
    ExecTask, ExecTaskState, ExecTaskStats, MemoryUsage, OperatorMemoryStats,
};
pub use metric::{add_runtime_metric, RuntimeCounterUnit, RuntimeMetric};
pub use protocol::{
    DataSize, Duration, ErrorCause, ErrorCode, ErrorLocation, ErrorType, ExecutionFailureInfo,
    Lifespan, OperatorStats, PipelineStats, TaskInfo, TaskState, TaskStats, TaskStatus,
};
pub use task_id::{TaskId, TaskIdError};
