use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConciergeError {
    #[error("agent not found: {0}")]
    AgentNotFound(String),
    #[error("lead not found: {0}")]
    LeadNotFound(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

pub use crate::Result;
