use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

/// Pipeline stage an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Normalize,
    Build,
    Analyze,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Normalize => "normalize",
            Stage::Build => "build",
            Stage::Analyze => "analyze",
        })
    }
}

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Data integrity error during {stage} (raw id {raw_id:?}): {message}")]
    DataIntegrity {
        stage: Stage,
        raw_id: String,
        message: String,
    },

    #[error("Node not found: {0}")]
    NodeNotFound(String),
}

impl GraphError {
    pub(crate) fn integrity(
        stage: Stage,
        raw_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        GraphError::DataIntegrity {
            stage,
            raw_id: raw_id.into(),
            message: message.into(),
        }
    }
}
