use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use common::{
    ExecError, ExecTask, ExecTaskState, ExecTaskStats, Lifespan, MemoryUsage, TaskId,
    TaskIdError, TaskInfo, TaskState, TaskStatus,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::stats::aggregate_task_stats;
use crate::translate::{to_failure_info, to_iso_timestamp, to_task_state};

fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Estado mutable de la tarea. Solo se toca con el lock tomado.
struct TaskInner {
    last_heartbeat_ms: u64,
    /// Error capturado antes (o al) crear la tarea del engine.
    error: Option<ExecError>,
    task_started: bool,
    exec_task: Option<Arc<dyn ExecTask>>,
    info: TaskInfo,
}

/// Una tarea registrada en este worker.
///
/// Todo acceso al estado pasa por un único mutex, así que un snapshot de
/// status/info siempre es coherente con los demás cambios de la tarea.
pub struct PrestoTask {
    id: TaskId,
    inner: Mutex<TaskInner>,
}

impl PrestoTask {
    pub fn new(task_id: &str, node_id: &str) -> Result<Self, TaskIdError> {
        let id = TaskId::parse(task_id)?;

        let mut info = TaskInfo::new(id.clone(), node_id);
        let (most, least) = Uuid::new_v4().as_u64_pair();
        info.task_status.task_instance_id_most_significant_bits = most as i64;
        info.task_status.task_instance_id_least_significant_bits = least as i64;

        Ok(Self {
            id,
            inner: Mutex::new(TaskInner {
                last_heartbeat_ms: 0,
                error: None,
                task_started: false,
                exec_task: None,
                info,
            }),
        })
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    fn lock(&self) -> MutexGuard<'_, TaskInner> {
        // Un panic con el lock tomado no deja nada a medias que importe:
        // el siguiente snapshot se reconstruye desde cero.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /* --------- Heartbeat --------- */

    pub fn record_heartbeat(&self) {
        let mut inner = self.lock();
        inner.last_heartbeat_ms = now_ms();
        inner.info.last_heartbeat = to_iso_timestamp(inner.last_heartbeat_ms);
    }

    /// Tiempo desde el último heartbeat, o cero si nunca hubo uno.
    pub fn time_since_last_heartbeat(&self) -> Duration {
        let inner = self.lock();
        if inner.last_heartbeat_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(now_ms().saturating_sub(inner.last_heartbeat_ms))
    }

    /* --------- Ciclo de vida --------- */

    /// Registra un error de la tarea. Gana el primero.
    pub fn set_error(&self, err: ExecError) {
        let mut inner = self.lock();
        if inner.error.is_none() {
            warn!("tarea {} falló: {}", self.id, err);
            inner.error = Some(err);
        }
    }

    /// Asocia la tarea del engine sin marcarla como iniciada.
    pub fn bind_exec_task(&self, exec_task: Arc<dyn ExecTask>) {
        self.lock().exec_task = Some(exec_task);
    }

    pub fn mark_started(&self) {
        self.lock().task_started = true;
    }

    /// Asocia la tarea del engine y la marca como iniciada, en una sola
    /// sección crítica.
    pub fn start(&self, exec_task: Arc<dyn ExecTask>) {
        let mut inner = self.lock();
        inner.exec_task = Some(exec_task);
        inner.task_started = true;
        debug!("tarea {} iniciada", self.id);
    }

    /// Estado nativo del engine, si ya hay tarea del engine.
    pub fn exec_state(&self) -> Option<ExecTaskState> {
        self.lock().exec_task.as_ref().map(|t| t.state())
    }

    /// Pide abortar. Si la tarea todavía no arrancó el ABORTED queda
    /// registrado en el status y se mantiene aunque nunca arranque.
    pub fn abort(&self) {
        let mut inner = self.lock();
        if let Some(exec_task) = inner.exec_task.clone() {
            exec_task.request_abort();
        }
        if !inner.task_started {
            inner.info.task_status.state = TaskState::Aborted;
        }
    }

    /// Pide cancelar. Si la tarea todavía no arrancó se comporta como `abort`.
    pub fn cancel(&self) {
        let mut inner = self.lock();
        if let Some(exec_task) = inner.exec_task.clone() {
            exec_task.request_cancel();
        }
        if !inner.task_started {
            inner.info.task_status.state = TaskState::Aborted;
        }
    }

    /* --------- Snapshots --------- */

    pub fn get_status(&self) -> TaskStatus {
        self.lock().update_status(&self.id)
    }

    pub fn get_info(&self) -> TaskInfo {
        self.lock().update_info(&self.id)
    }
}

/// Lectura de los contadores del engine en un único momento.
struct EngineSnapshot {
    state: ExecTaskState,
    stats: ExecTaskStats,
    memory: MemoryUsage,
    query_memory: MemoryUsage,
    error: Option<ExecError>,
}

impl EngineSnapshot {
    fn read(exec_task: &dyn ExecTask) -> Self {
        Self {
            state: exec_task.state(),
            stats: exec_task.task_stats(),
            memory: exec_task.memory_usage(),
            query_memory: exec_task.query_memory_usage(),
            error: exec_task.error(),
        }
    }
}

impl TaskInner {
    /// El status se toma del engine solo si la tarea arrancó sin error.
    fn reports_engine_state(&self) -> bool {
        self.task_started && self.error.is_none()
    }

    fn update_status(&mut self, id: &TaskId) -> TaskStatus {
        let snapshot = if self.reports_engine_state() {
            self.exec_task.as_deref().map(|t| EngineSnapshot::read(t))
        } else {
            None
        };
        self.apply_status(id, snapshot.as_ref())
    }

    fn apply_status(&mut self, id: &TaskId, snapshot: Option<&EngineSnapshot>) -> TaskStatus {
        if !self.task_started && self.error.is_none() {
            let mut ret = self.info.task_status.clone();
            if ret.state != TaskState::Aborted {
                ret.state = TaskState::Planned;
            }
            return ret;
        }

        // Error al crear la tarea o antes: se reporta y no se consulta al engine.
        if let Some(err) = &self.error {
            if self.info.task_status.failures.is_empty() {
                self.info.task_status.failures.push(to_failure_info(err));
            }
            self.info.task_status.state = TaskState::Failed;
            return self.info.task_status.clone();
        }

        let Some(snapshot) = snapshot else {
            panic!("tarea {id} marcada como iniciada pero sin tarea del engine");
        };
        let status = &mut self.info.task_status;

        // Cada split se reporta como un driver.
        status.queued_partitioned_drivers = snapshot.stats.num_queued_splits;
        status.running_partitioned_drivers = snapshot.stats.num_running_splits;

        for &group_id in &snapshot.stats.completed_split_groups {
            let known = status
                .completed_driver_groups
                .iter()
                .any(|g| g.group_id == group_id);
            if !known {
                status.completed_driver_groups.push(Lifespan {
                    grouped: true,
                    group_id,
                });
            }
        }

        status.state = to_task_state(snapshot.state);

        status.memory_reservation_in_bytes = snapshot.memory.current_bytes;
        status.system_memory_reservation_in_bytes = 0;
        status.peak_node_total_memory_reservation_in_bytes = snapshot.query_memory.peak_bytes;

        if status.failures.is_empty() {
            if let Some(err) = &snapshot.error {
                status.failures.push(to_failure_info(err));
            }
        }

        status.clone()
    }

    /// Status y estadísticas salen de la misma lectura del engine.
    fn update_info(&mut self, id: &TaskId) -> TaskInfo {
        let snapshot = self.exec_task.as_deref().map(|t| EngineSnapshot::read(t));
        let status = self.apply_status(id, snapshot.as_ref());

        if let Some(snapshot) = &snapshot {
            self.info.stats =
                aggregate_task_stats(id, &snapshot.stats, snapshot.memory, snapshot.query_memory);
        }

        let mut info = self.info.clone();
        info.task_status = status;
        info
    }
}
