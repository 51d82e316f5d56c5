//! # Workflow State
//!
//! The record threaded through every step. Steps never mutate it directly:
//! each returns a `StateUpdate` which is merged here.

use crate::error::{self, Result};
use serde::{Deserialize, Serialize};

/// Shared state of one essay run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Essay topic, fixed at creation
    pub task: String,
    /// Latest outline
    pub plan: String,
    /// Latest draft
    pub draft: String,
    /// Latest grader feedback
    pub critique: String,
    /// Research snippets, append-only
    pub content: Vec<String>,
    /// Completed generation steps
    pub revision_number: u32,
    /// Revision ceiling, fixed at creation
    pub max_revisions: u32,
}

impl WorkflowState {
    pub fn new(task: impl Into<String>, max_revisions: u32) -> Self {
        Self {
            task: task.into(),
            max_revisions,
            ..Default::default()
        }
    }

    /// Apply a partial update.
    ///
    /// Scalars present in `update` replace the current value; `content` is
    /// appended. A revision number below the current one is rejected and
    /// leaves the state untouched.
    pub fn merge(&mut self, update: &StateUpdate) -> Result<()> {
        if let Some(revision) = update.revision_number {
            if revision < self.revision_number {
                return Err(error::unexpected(format!(
                    "revision number would decrease from {} to {}",
                    self.revision_number, revision
                )));
            }
        }

        if let Some(plan) = &update.plan {
            self.plan = plan.clone();
        }
        if let Some(draft) = &update.draft {
            self.draft = draft.clone();
        }
        if let Some(critique) = &update.critique {
            self.critique = critique.clone();
        }
        if let Some(revision) = update.revision_number {
            self.revision_number = revision;
        }
        self.content.extend(update.content.iter().cloned());
        Ok(())
    }

    /// The loop ends once generation has run more times than the ceiling allows
    pub fn revisions_exhausted(&self) -> bool {
        self.revision_number > self.max_revisions
    }
}

/// Partial state produced by one step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critique: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<String>,
}

impl StateUpdate {
    pub fn plan(plan: impl Into<String>) -> Self {
        Self {
            plan: Some(plan.into()),
            ..Default::default()
        }
    }

    pub fn draft(draft: impl Into<String>, revision_number: u32) -> Self {
        Self {
            draft: Some(draft.into()),
            revision_number: Some(revision_number),
            ..Default::default()
        }
    }

    pub fn critique(critique: impl Into<String>) -> Self {
        Self {
            critique: Some(critique.into()),
            ..Default::default()
        }
    }

    pub fn research(content: Vec<String>) -> Self {
        Self {
            content,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
