//! Seguimiento de tareas de un worker nativo: status, estadísticas y
//! recurso HTTP para el coordinator.

pub mod config;
pub mod handlers;
pub mod manager;
pub mod reaper;
pub mod state;
pub mod stats;
pub mod task;
pub mod translate;

pub use manager::{TaskManager, TaskManagerError};
pub use task::PrestoTask;
