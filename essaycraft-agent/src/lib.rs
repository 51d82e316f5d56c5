//! # essaycraft agent
//!
//! The essay loop:
//! 1. Plan an outline for the topic
//! 2. Research the topic on the web
//! 3. Draft the essay from the outline and research
//! 4. Stop once the revision ceiling is exceeded, otherwise
//! 5. Critique the draft as a grader, research the critique, and draft again
//!
//! Every step is checkpointed per session and streamed to the caller.

mod prompts;
mod render;
mod workflow;

pub use render::{render_block, Transcript};
pub use workflow::{StepEvent, Workflow, WorkflowConfig};
