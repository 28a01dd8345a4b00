//! Error types for pairforge operations.
//!
//! Defines error types for the major subsystems:
//! - Input loading (prompt and reference lists)
//! - Completion API interactions
//! - Dataset persistence

use thiserror::Error;

/// Errors that can occur while loading the input lists.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Input file '{path}' is not a JSON array of strings: {message}")]
    InvalidFormat { path: String, message: String },

    #[error("Prompt and reference lists differ in length: {prompts} prompts vs {references} references")]
    LengthMismatch { prompts: usize, references: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during a single completion call.
///
/// Every variant is retryable from the worker's point of view; they stay
/// distinct so retry logs say what actually went wrong.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Failed to parse completion envelope: {0}")]
    EnvelopeError(String),

    #[error("Model response is not valid JSON: {0}")]
    NestedPayloadError(String),

    #[error("Model response has no 'answer' field")]
    AnswerMissing,

    #[error("Model response 'answer' field is not a string (got {0})")]
    AnswerWrongType(&'static str),

    #[error("Model response 'answer' field is empty")]
    EmptyAnswer,
}

/// Errors that can occur while persisting the dataset.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
