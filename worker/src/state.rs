// worker/src/state.rs

use std::sync::Arc;

use crate::manager::TaskManager;

#[derive(Clone)]
pub struct AppState {
    pub task_manager: Arc<TaskManager>,
}

impl AppState {
    pub fn new(task_manager: Arc<TaskManager>) -> Self {
        Self { task_manager }
    }
}
