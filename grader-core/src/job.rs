//! Job domain type

use serde::{Deserialize, Serialize};

use crate::error::{GraderError, Result};

/// Request to run an ordered list of shell commands in one sandbox
///
/// `name` doubles as the sandbox name and the correlation key in logs, so it
/// must be unique among jobs that run at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub image: String,
    pub commands: Vec<String>,
}

impl Job {
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        commands: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    /// Checks the job before any sandbox is created
    ///
    /// Fails with [`GraderError::InvalidJob`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(GraderError::invalid_job("name cannot be empty"));
        }
        if self.image.trim().is_empty() {
            return Err(GraderError::invalid_job("image cannot be empty"));
        }
        if self.commands.iter().all(|c| c.trim().is_empty()) {
            return Err(GraderError::invalid_job("commands cannot be empty"));
        }
        Ok(())
    }
}
