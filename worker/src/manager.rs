use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use common::{ExecError, ExecTask, ExecTaskState, TaskIdError, TaskInfo, TaskStatus};
use thiserror::Error;
use tracing::info;

use crate::task::PrestoTask;

#[derive(Debug, Error)]
pub enum TaskManagerError {
    #[error(transparent)]
    InvalidTaskId(#[from] TaskIdError),

    #[error("tarea no encontrada: {0}")]
    TaskNotFound(String),
}

/// Registro de las tareas de este worker.
///
/// El lock del mapa solo se toma para clonar o sacar `Arc<PrestoTask>`;
/// nunca mientras se sostiene el lock de una tarea.
pub struct TaskManager {
    node_id: String,
    tasks: Mutex<HashMap<String, Arc<PrestoTask>>>,
}

impl TaskManager {
    pub fn new(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    fn tasks_map(&self) -> MutexGuard<'_, HashMap<String, Arc<PrestoTask>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registra la tarea si no existe. En ambos casos cuenta como heartbeat.
    pub fn create_or_get_task(&self, task_id: &str) -> Result<Arc<PrestoTask>, TaskManagerError> {
        let task = {
            let mut tasks = self.tasks_map();
            match tasks.get(task_id) {
                Some(task) => task.clone(),
                None => {
                    let task = Arc::new(PrestoTask::new(task_id, &self.node_id)?);
                    tasks.insert(task_id.to_string(), task.clone());
                    info!("tarea registrada: {}", task_id);
                    task
                }
            }
        };
        task.record_heartbeat();
        Ok(task)
    }

    pub fn get_task(&self, task_id: &str) -> Result<Arc<PrestoTask>, TaskManagerError> {
        self.tasks_map()
            .get(task_id)
            .cloned()
            .ok_or_else(|| TaskManagerError::TaskNotFound(task_id.to_string()))
    }

    /// Copia de los handles de todas las tareas, ordenadas por id.
    pub fn tasks(&self) -> Vec<Arc<PrestoTask>> {
        let mut out: Vec<Arc<PrestoTask>> = self.tasks_map().values().cloned().collect();
        out.sort_by(|a, b| a.id().as_str().cmp(b.id().as_str()));
        out
    }

    pub fn len(&self) -> usize {
        self.tasks_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Info para el coordinator. Registra heartbeat.
    pub fn get_task_info(&self, task_id: &str) -> Result<TaskInfo, TaskManagerError> {
        let task = self.get_task(task_id)?;
        task.record_heartbeat();
        Ok(task.get_info())
    }

    /// Status para el coordinator. Registra heartbeat.
    pub fn get_task_status(&self, task_id: &str) -> Result<TaskStatus, TaskManagerError> {
        let task = self.get_task(task_id)?;
        task.record_heartbeat();
        Ok(task.get_status())
    }

    pub fn all_task_infos(&self) -> Vec<TaskInfo> {
        self.tasks().iter().map(|t| t.get_info()).collect()
    }

    /// Arranca la tarea con la tarea del engine que la ejecuta.
    pub fn start_task(
        &self,
        task_id: &str,
        exec_task: Arc<dyn ExecTask>,
    ) -> Result<Arc<PrestoTask>, TaskManagerError> {
        let task = self.create_or_get_task(task_id)?;
        task.start(exec_task);
        Ok(task)
    }

    /// Registra un error que ocurrió antes de poder crear la tarea del engine.
    pub fn fail_task(&self, task_id: &str, err: ExecError) -> Result<Arc<PrestoTask>, TaskManagerError> {
        let task = self.create_or_get_task(task_id)?;
        task.set_error(err);
        Ok(task)
    }

    /// Aborta (o cancela) la tarea. La tarea sigue registrada hasta que el
    /// reaper la olvide, así el coordinator puede ver el estado final.
    pub fn delete_task(&self, task_id: &str, abort: bool) -> Result<TaskInfo, TaskManagerError> {
        let task = self.get_task(task_id)?;
        if abort {
            task.abort();
        } else {
            task.cancel();
        }
        info!(
            "tarea {} {} por el coordinator",
            task_id,
            if abort { "abortada" } else { "cancelada" }
        );
        task.record_heartbeat();
        Ok(task.get_info())
    }

    pub fn remove_task(&self, task_id: &str) -> Option<Arc<PrestoTask>> {
        self.tasks_map().remove(task_id)
    }

    /// Cantidad de tareas del engine por estado, en el orden de
    /// `ExecTaskState::ALL`.
    pub fn task_numbers(&self) -> [usize; 5] {
        let mut numbers = [0usize; 5];
        for task in self.tasks() {
            if let Some(state) = task.exec_state() {
                numbers[state.index()] += 1;
            }
        }
        numbers
    }
}
