use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskIdError {
    #[error("task id malformado '{0}': se esperaba <query>.<stage>.<stageExecution>.<task>[.<attempt>]")]
    Malformed(String),

    #[error("task id '{id}': el campo {field} no es numérico ('{value}')")]
    NotNumeric {
        id: String,
        field: &'static str,
        value: String,
    },
}

/// Identidad de una tarea, derivada del string que manda el coordinator.
///
/// Formato: `<queryId>.<stageId>.<stageExecutionId>.<id>` con un
/// `.<attemptNumber>` opcional al final. Inmutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId {
    raw: String,
    query_id: String,
    stage_id: i32,
    stage_execution_id: i32,
    id: i32,
    attempt_number: i32,
}

impl TaskId {
    pub fn parse(raw: &str) -> Result<Self, TaskIdError> {
        let parts: Vec<&str> = raw.split('.').collect();
        if !(parts.len() == 4 || parts.len() == 5) || parts[0].is_empty() {
            return Err(TaskIdError::Malformed(raw.to_string()));
        }

        let num = |field: &'static str, value: &str| -> Result<i32, TaskIdError> {
            value.parse::<i32>().map_err(|_| TaskIdError::NotNumeric {
                id: raw.to_string(),
                field,
                value: value.to_string(),
            })
        };

        let attempt_number = match parts.get(4) {
            Some(v) => num("attemptNumber", v)?,
            None => 0,
        };

        Ok(Self {
            raw: raw.to_string(),
            query_id: parts[0].to_string(),
            stage_id: num("stageId", parts[1])?,
            stage_execution_id: num("stageExecutionId", parts[2])?,
            id: num("id", parts[3])?,
            attempt_number,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn stage_id(&self) -> i32 {
        self.stage_id
    }

    pub fn stage_execution_id(&self) -> i32 {
        self.stage_execution_id
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn attempt_number(&self) -> i32 {
        self.attempt_number
    }
}

impl FromStr for TaskId {
    type Err = TaskIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TaskId {
    type Error = TaskIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TaskId> for String {
    fn from(value: TaskId) -> Self {
        value.raw
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
