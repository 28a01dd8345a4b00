//! pairforge: chat-pair dataset generator for fine-tuning data.
//!
//! This library fans prompt lists out to a completion API through a fixed
//! pool of retrying workers and accumulates `{role, content}` pairs into a
//! JSON dataset that is persisted exactly once, on normal completion or on
//! interrupt.

// Core modules
pub mod cli;
pub mod error;
pub mod export;
pub mod inputs;
pub mod llm;
pub mod scheduler;
pub mod shutdown;
pub mod store;

// Re-export commonly used error types
pub use error::{ExportError, InputError, LlmError};
