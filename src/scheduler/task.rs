//! Task definition for the worker pool.

use serde::{Deserialize, Serialize};

/// One unit of work: a generation prompt paired with its ground-truth
/// reference text.
///
/// Tasks are created once at startup, owned by the queue until claimed by
/// exactly one worker, and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// 1-based position in the input lists.
    pub index: usize,
    /// Prompt sent to the completion API.
    pub prompt: String,
    /// Reference example recorded as the `user` half of the output pair.
    pub reference: String,
}

impl Task {
    /// Creates a new task.
    pub fn new(index: usize, prompt: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            index,
            prompt: prompt.into(),
            reference: reference.into(),
        }
    }
}
