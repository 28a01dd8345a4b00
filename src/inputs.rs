//! Input loading: prompt and reference lists.
//!
//! Both inputs are JSON files holding an array of strings. They are read
//! once at startup and zipped positionally into tasks, so they must be the
//! same length.

use std::path::Path;

use crate::error::InputError;
use crate::scheduler::Task;

/// Loads the two input lists and pairs them into tasks with 1-based indices.
///
/// Empty lists are valid and produce no tasks; the run then writes an empty
/// dataset.
///
/// # Errors
///
/// Returns `InputError::LengthMismatch` when the lists differ in length.
pub fn load_tasks(
    prompts_path: impl AsRef<Path>,
    references_path: impl AsRef<Path>,
) -> Result<Vec<Task>, InputError> {
    let prompts = read_string_list(prompts_path.as_ref())?;
    let references = read_string_list(references_path.as_ref())?;

    if prompts.len() != references.len() {
        return Err(InputError::LengthMismatch {
            prompts: prompts.len(),
            references: references.len(),
        });
    }

    Ok(prompts
        .into_iter()
        .zip(references)
        .enumerate()
        .map(|(i, (prompt, reference))| Task::new(i + 1, prompt, reference))
        .collect())
}

fn read_string_list(path: &Path) -> Result<Vec<String>, InputError> {
    let data = std::fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(|e| InputError::InvalidFormat {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
