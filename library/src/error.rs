use thiserror::Error;

use crate::graph::GraphError;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("Evaluation error: {0}")]
    Evaluation(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Rendering error: {0}")]
    Render(String),
    #[error("Task error: {0}")]
    Task(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl LibraryError {
    pub fn evaluation(msg: impl Into<String>) -> Self {
        LibraryError::Evaluation(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        LibraryError::Decode(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        LibraryError::Render(msg.into())
    }

    pub fn task(msg: impl Into<String>) -> Self {
        LibraryError::Task(msg.into())
    }
}
