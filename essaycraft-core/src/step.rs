//! Workflow steps and the transition table between them.

use crate::state::WorkflowState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A node of the essay workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Plan,
    ResearchPlan,
    Generate,
    Reflect,
    ResearchCritique,
    Terminal,
}

impl Step {
    /// Entry point of every run
    pub const INITIAL: Step = Step::Plan;

    /// The step that follows `self` given the state after `self` ran.
    ///
    /// Generate is the only branch: it ends the run once the revision ceiling
    /// is exceeded. Terminal is absorbing.
    pub fn next(self, state: &WorkflowState) -> Step {
        match self {
            Step::Plan => Step::ResearchPlan,
            Step::ResearchPlan => Step::Generate,
            Step::Generate if state.revisions_exhausted() => Step::Terminal,
            Step::Generate => Step::Reflect,
            Step::Reflect => Step::ResearchCritique,
            Step::ResearchCritique => Step::Generate,
            Step::Terminal => Step::Terminal,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Step::Terminal
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Plan => "plan",
            Step::ResearchPlan => "research_plan",
            Step::Generate => "generate",
            Step::Reflect => "reflect",
            Step::ResearchCritique => "research_critique",
            Step::Terminal => "terminal",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
