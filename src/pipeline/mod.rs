//! The guided analysis pipeline.
//!
//! Three dependent model invocations, each consuming the previous stage's
//! (possibly user-edited) output:
//!
//! ```text
//! Input ──▶ ReviewDescription ──▶ ReviewDfd ──▶ Results
//!   │  describe architecture │  derive DFD  │  enumerate threats
//!   ◀──────── retreat ───────◀── retreat ───┘  (no retreat from Results)
//! ```
//!
//! [`PipelineState`] is an explicit value: controller operations take it,
//! mutate it fully or not at all, and hand it back. There is no ambient
//! global state; a state value can be serialised mid-run and reloaded later.

pub mod controller;

use crate::record::{AnalysisRecord, ApplicationType, DataClassification, Threat};
use crate::transport::ImagePayload;
use serde::{Deserialize, Serialize};

/// The four pipeline stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Input,
    ReviewDescription,
    ReviewDfd,
    Results,
}

impl Stage {
    /// The next stage, or `None` at the terminal stage.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Input => Some(Stage::ReviewDescription),
            Stage::ReviewDescription => Some(Stage::ReviewDfd),
            Stage::ReviewDfd => Some(Stage::Results),
            Stage::Results => None,
        }
    }

    /// The previous stage, but only from the two review stages: the start
    /// has nothing before it and a terminal analysis is not re-opened.
    pub fn prev(&self) -> Option<Stage> {
        match self {
            Stage::ReviewDescription => Some(Stage::Input),
            Stage::ReviewDfd => Some(Stage::ReviewDescription),
            Stage::Input | Stage::Results => None,
        }
    }

    /// True for the two stages whose output the user may edit in place.
    pub fn is_review(&self) -> bool {
        matches!(self, Stage::ReviewDescription | Stage::ReviewDfd)
    }

    /// Display label, as shown by the CLI stepper.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Input => "Input",
            Stage::ReviewDescription => "Review architecture description",
            Stage::ReviewDfd => "Review data-flow description",
            Stage::Results => "Results",
        }
    }
}

/// The user-supplied inputs collected before the first invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisInputs {
    pub title: String,
    pub description: String,
    pub app_type: Option<ApplicationType>,
    pub classification: Option<DataClassification>,
    /// Preprocessed diagram, if the user attached one.
    pub image: Option<ImagePayload>,
}

/// The complete state of one guided analysis run.
///
/// Stage outputs survive a retreat: advancing again simply overwrites the
/// later outputs, so no explicit invalidation is needed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub stage: Stage,
    pub inputs: AnalysisInputs,
    /// Stage 1 output (architecture description), possibly user-edited.
    pub ai_description: String,
    /// Stage 2 output (data-flow description), possibly user-edited.
    pub dfd_description: String,
    /// Stage 3 output.
    pub threats: Vec<Threat>,
    /// Last invocation failure, held until dismissed or a new action starts.
    pub last_error: Option<String>,
    /// True while an invocation is in flight. At most one per controller.
    pub busy: bool,
}

impl Default for Stage {
    fn default() -> Self {
        Stage::Input
    }
}

impl PipelineState {
    /// Fresh state positioned at [`Stage::Input`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Hydrate a state from a persisted record, positioned at the terminal
    /// stage. The record's stage outputs become the state's outputs so the
    /// analysis can be re-viewed and exported; the image payload is gone
    /// (it lives in the store under `image_key`).
    pub fn from_record(record: &AnalysisRecord) -> Self {
        Self {
            stage: Stage::Results,
            inputs: AnalysisInputs {
                title: record.title.clone(),
                description: record.user_description.clone(),
                app_type: Some(record.app_type),
                classification: Some(record.classification),
                image: None,
            },
            ai_description: record.ai_description.clone(),
            dfd_description: record.dfd_description.clone(),
            threats: record.threats.clone(),
            last_error: None,
            busy: false,
        }
    }
}

/// Result of an `advance` or `retreat` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The pipeline moved to this stage.
    Moved(Stage),
    /// The request was rejected as a no-op; state is unchanged.
    Rejected(StepRejection),
}

/// Why a step request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRejection {
    /// An invocation is already in flight; the request is dropped,
    /// never queued.
    Busy,
    /// Retreat requested at the start of the pipeline.
    AtStart,
    /// Advance (or retreat) requested at the terminal stage.
    AtTerminal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_strictly_ordered() {
        assert!(Stage::Input < Stage::ReviewDescription);
        assert!(Stage::ReviewDescription < Stage::ReviewDfd);
        assert!(Stage::ReviewDfd < Stage::Results);
    }

    #[test]
    fn next_walks_forward_and_stops() {
        assert_eq!(Stage::Input.next(), Some(Stage::ReviewDescription));
        assert_eq!(Stage::ReviewDfd.next(), Some(Stage::Results));
        assert_eq!(Stage::Results.next(), None);
    }

    #[test]
    fn prev_only_from_review_stages() {
        assert_eq!(Stage::ReviewDescription.prev(), Some(Stage::Input));
        assert_eq!(Stage::ReviewDfd.prev(), Some(Stage::ReviewDescription));
        assert_eq!(Stage::Input.prev(), None);
        assert_eq!(Stage::Results.prev(), None);
    }

    #[test]
    fn from_record_re_enters_at_results() {
        use crate::record::{AnalysisRecord, ApplicationType, DataClassification};
        use chrono::TimeZone;

        let record = AnalysisRecord {
            id: uuid::Uuid::nil(),
            title: "Saved analysis".into(),
            app_type: ApplicationType::Web,
            classification: DataClassification::Internal,
            user_description: "user text".into(),
            image_key: Some("uploads/abc".into()),
            ai_description: "ai text".into(),
            dfd_description: "dfd text".into(),
            threats: vec![],
            created_at: chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        let state = PipelineState::from_record(&record);
        assert_eq!(state.stage, Stage::Results);
        assert_eq!(state.inputs.title, "Saved analysis");
        assert_eq!(state.ai_description, "ai text");
        assert_eq!(state.dfd_description, "dfd text");
        assert!(!state.busy);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn state_serialises_round_trip() {
        let mut state = PipelineState::new();
        state.ai_description = "desc".into();
        state.stage = Stage::ReviewDescription;
        let json = serde_json::to_string(&state).unwrap();
        let back: PipelineState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
