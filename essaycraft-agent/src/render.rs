//! Text rendering of a run, one block per step

use crate::workflow::StepEvent;
use essaycraft_core::{Error, Step};

/// Accumulated, human-readable output of a run
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    text: String,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the block for `event` and return it
    pub fn push(&mut self, event: &StepEvent) -> String {
        let block = render_block(event);
        self.text.push_str(&block);
        block
    }

    /// Append a failure marker after whatever was rendered so far
    pub fn fail(&mut self, err: &Error) -> String {
        let block = with_divider(format!("### Run failed\n{}", err));
        self.text.push_str(&block);
        block
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Render one step's update
pub fn render_block(event: &StepEvent) -> String {
    let update = &event.update;
    let body = match event.step {
        Step::Plan => format!("### Plan\n{}", update.plan.as_deref().unwrap_or_default()),
        Step::ResearchPlan | Step::ResearchCritique => {
            format!("### Research\n{}", update.content.join("\n"))
        }
        Step::Generate => format!(
            "### Draft (revision {})\n{}",
            event.revision_number,
            update.draft.as_deref().unwrap_or_default()
        ),
        Step::Reflect => format!("### Critique\n{}", update.critique.as_deref().unwrap_or_default()),
        Step::Terminal => format!("### Done\nFinished after {} revision(s).", event.revision_number),
    };
    with_divider(body)
}

fn with_divider(body: String) -> String {
    format!("{}\n\n{}\n\n", body, "---".repeat(20))
}
