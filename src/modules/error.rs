use thiserror::Error;

use crate::modules::app_mode::AppMode;

/// User-facing rejections. None of these change any state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("task {position} has no text; please fill in all tasks before proceeding")]
    EmptyTaskText { position: usize },

    #[error("add at least one task before starting")]
    EmptyList,

    #[error("new order must contain every existing task exactly once")]
    NotAPermutation,

    #[error("cannot {action} while in {from} mode")]
    InvalidTransition { from: AppMode, action: &'static str },
}

#[derive(Debug, Error)]
pub enum LockInError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("screen capture failed: {0}")]
    Capture(String),

    #[error("analysis request failed: {0}")]
    Transport(String),

    #[error("session store error: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LockInError>;

impl From<sqlx::Error> for LockInError {
    fn from(e: sqlx::Error) -> Self {
        LockInError::Persistence(e.to_string())
    }
}

impl From<reqwest::Error> for LockInError {
    fn from(e: reqwest::Error) -> Self {
        LockInError::Transport(e.to_string())
    }
}

impl LockInError {
    pub fn is_validation(&self) -> bool {
        matches!(self, LockInError::Validation(_))
    }
}
