//! Completion API integration for pairforge.
//!
//! The [`CompletionProvider`] trait abstracts the external text-completion
//! capability so the worker pool can run against a stub in tests. The
//! [`WorkersAiClient`] is the production implementation, speaking the
//! Workers-AI-style envelope where the model's text is itself a JSON object
//! carrying an `answer` field.

pub mod workers_ai;

pub use workers_ai::{Completion, CompletionProvider, Message, WorkersAiClient};
