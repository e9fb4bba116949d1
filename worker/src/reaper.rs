use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::manager::TaskManager;
use crate::translate::task_numbers_to_string;

/// Resultado de una pasada del reaper.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub aborted: Vec<String>,
    pub removed: Vec<String>,
}

/// Loop de limpieza de tareas:
/// - aborta tareas que el coordinator dejó de consultar
/// - olvida tareas terminadas hace rato
pub async fn run_reaper_loop(manager: Arc<TaskManager>, config: WorkerConfig) {
    loop {
        sleep(config.sweep_interval).await;

        let report = sweep_once(&manager, config.abandoned_timeout, config.cleanup_timeout);
        if !report.removed.is_empty() {
            info!("reaper olvidó {} tareas terminadas", report.removed.len());
        }

        let summary = task_numbers_to_string(&manager.task_numbers());
        if !summary.is_empty() {
            debug!("tareas: {}", summary);
        }
    }
}

/// Una pasada de chequeo:
/// 1. tareas no terminadas sin heartbeat por más de `abandoned_timeout` se abortan
/// 2. tareas terminadas sin heartbeat por más de `cleanup_timeout` se sacan del registro
///
/// Una tarea abortada en esta pasada recién se puede olvidar en la siguiente.
pub fn sweep_once(
    manager: &TaskManager,
    abandoned_timeout: Duration,
    cleanup_timeout: Duration,
) -> SweepReport {
    let mut report = SweepReport::default();

    for task in manager.tasks() {
        let elapsed = task.time_since_last_heartbeat();
        let state = task.get_status().state;

        if !state.is_done() {
            if elapsed > abandoned_timeout {
                warn!(
                    "abortando tarea {} (sin heartbeat hace {:?})",
                    task.id(),
                    elapsed
                );
                task.abort();
                report.aborted.push(task.id().to_string());
            }
            continue;
        }

        if elapsed > cleanup_timeout {
            let task_id = task.id().to_string();
            if manager.remove_task(&task_id).is_some() {
                debug!("tarea {} ({:?}) removida del registro", task_id, state);
                report.removed.push(task_id);
            }
        }
    }

    report
}
