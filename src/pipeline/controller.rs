//! The pipeline controller: sequencing, gating, and state transitions.
//!
//! One controller owns one [`PipelineState`] and serialises its model
//! invocations: `advance` sets the busy flag before calling out and clears
//! it on every exit path, and a second `advance` while busy is rejected as
//! a no-op. A failed invocation stores the error message and leaves the
//! stage exactly where it was; there is no partial mutation to undo.

use crate::config::AnalysisConfig;
use crate::error::ThreatDocError;
use crate::invoke::ModelClient;
use crate::pipeline::{PipelineState, Stage, StepOutcome, StepRejection};
use crate::record::{AnalysisRecord, ThreatList, ThreatStatus};
use crate::{prompts, scrub};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Drives one guided analysis from input to a persistable record.
pub struct PipelineController {
    state: PipelineState,
    client: ModelClient,
}

impl PipelineController {
    /// Build a controller from a config. Fails when the config carries no
    /// transport: every forward transition needs one invocation.
    pub fn new(config: &AnalysisConfig) -> Result<Self, ThreatDocError> {
        Self::with_state(config, PipelineState::new())
    }

    /// Resume a controller over an existing state (saved mid-run, or
    /// hydrated from a persisted record via [`PipelineState::from_record`]).
    pub fn with_state(
        config: &AnalysisConfig,
        mut state: PipelineState,
    ) -> Result<Self, ThreatDocError> {
        let transport = config.transport.clone().ok_or_else(|| {
            ThreatDocError::InvalidConfig("no model transport configured".into())
        })?;
        // A reloaded state is never mid-invocation.
        state.busy = false;
        Ok(Self {
            state,
            client: ModelClient::new(
                Arc::clone(&transport),
                config.retry,
                config.max_tokens,
                config.temperature,
            ),
        })
    }

    /// Read-only view of the current state.
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Mutable access to the pre-invocation inputs. Edits while busy or
    /// past the input stage are the caller's responsibility to avoid; they
    /// only affect future invocations.
    pub fn inputs_mut(&mut self) -> &mut crate::pipeline::AnalysisInputs {
        &mut self.state.inputs
    }

    /// Consume the controller, returning its state (for saving mid-run).
    pub fn into_state(self) -> PipelineState {
        self.state
    }

    /// Run the current stage's invocation and advance on success.
    ///
    /// Rejections (busy, terminal stage) are no-ops. Validation failures
    /// and invocation errors return `Err`, store a user-visible message in
    /// `last_error`, and leave the stage unchanged.
    pub async fn advance(&mut self) -> Result<StepOutcome, ThreatDocError> {
        if self.state.busy {
            debug!("advance rejected: invocation already in flight");
            return Ok(StepOutcome::Rejected(StepRejection::Busy));
        }
        let Some(target) = self.state.stage.next() else {
            debug!("advance rejected: already at terminal stage");
            return Ok(StepOutcome::Rejected(StepRejection::AtTerminal));
        };

        self.validate_current_stage()
            .map_err(|e| self.fail(e))?;

        self.state.last_error = None;
        self.state.busy = true;

        let result = self.run_stage_invocation().await;
        self.state.busy = false;

        match result {
            Ok(()) => {
                info!(from = ?self.state.stage, to = ?target, "stage advanced");
                self.state.stage = target;
                Ok(StepOutcome::Moved(target))
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Move back exactly one stage. Allowed only from the review stages;
    /// clears any held error; prior outputs are preserved.
    pub fn retreat(&mut self) -> StepOutcome {
        if self.state.busy {
            return StepOutcome::Rejected(StepRejection::Busy);
        }
        match self.state.stage.prev() {
            Some(prev) => {
                self.state.last_error = None;
                self.state.stage = prev;
                debug!(to = ?prev, "stage retreated");
                StepOutcome::Moved(prev)
            }
            None if self.state.stage == Stage::Input => {
                StepOutcome::Rejected(StepRejection::AtStart)
            }
            None => StepOutcome::Rejected(StepRejection::AtTerminal),
        }
    }

    /// Replace the output of the stage currently under review.
    ///
    /// Only the stage the pipeline is positioned at may be edited, and only
    /// while it is a review stage.
    pub fn edit_stage_output(
        &mut self,
        stage: Stage,
        text: impl Into<String>,
    ) -> Result<(), ThreatDocError> {
        if self.state.busy {
            return Err(ThreatDocError::validation(
                "an invocation is in flight; wait for it to finish",
            ));
        }
        if stage != self.state.stage {
            return Err(ThreatDocError::validation(format!(
                "output of stage '{}' is not editable from stage '{}'",
                stage.label(),
                self.state.stage.label()
            )));
        }
        match stage {
            Stage::ReviewDescription => self.state.ai_description = text.into(),
            Stage::ReviewDfd => self.state.dfd_description = text.into(),
            Stage::Input | Stage::Results => {
                return Err(ThreatDocError::validation(format!(
                    "stage '{}' has no editable output",
                    stage.label()
                )));
            }
        }
        Ok(())
    }

    /// Apply a review decision to one threat. Available at the terminal
    /// stage only; only Pending threats can be decided.
    pub fn set_threat_status(
        &mut self,
        threat_id: &str,
        status: ThreatStatus,
    ) -> Result<(), ThreatDocError> {
        if self.state.stage != Stage::Results {
            return Err(ThreatDocError::validation(
                "threat review is only available once results exist",
            ));
        }
        let threat = self
            .state
            .threats
            .iter_mut()
            .find(|t| t.id == threat_id)
            .ok_or_else(|| {
                ThreatDocError::validation(format!("no threat with id '{threat_id}'"))
            })?;
        if !threat.set_status(status) {
            return Err(ThreatDocError::validation(format!(
                "threat '{}' is already {}",
                threat.name,
                threat.status.label()
            )));
        }
        Ok(())
    }

    /// Drop the held error message.
    pub fn dismiss_error(&mut self) {
        self.state.last_error = None;
    }

    /// Freeze the completed analysis into a persistable record.
    ///
    /// `created_at` is an explicit input so the record (and everything
    /// rendered from it) is a pure function of what the caller provides.
    pub fn finish(&self, created_at: DateTime<Utc>) -> Result<AnalysisRecord, ThreatDocError> {
        if self.state.stage != Stage::Results {
            return Err(ThreatDocError::validation(
                "the analysis has not reached results yet",
            ));
        }
        let inputs = &self.state.inputs;
        Ok(AnalysisRecord {
            id: Uuid::new_v4(),
            title: inputs.title.trim().to_string(),
            app_type: inputs
                .app_type
                .ok_or_else(|| ThreatDocError::validation("application type is missing"))?,
            classification: inputs
                .classification
                .ok_or_else(|| ThreatDocError::validation("data classification is missing"))?,
            user_description: inputs.description.clone(),
            image_key: None,
            ai_description: self.state.ai_description.clone(),
            dfd_description: self.state.dfd_description.clone(),
            threats: self.state.threats.clone(),
            created_at,
        })
    }

    // ── Internal ──────────────────────────────────────────────────────────

    /// Record a failure in the state and hand the error back to the caller.
    fn fail(&mut self, e: ThreatDocError) -> ThreatDocError {
        self.state.busy = false;
        self.state.last_error = Some(e.to_string());
        e
    }

    /// Reject missing required inputs before any model call.
    fn validate_current_stage(&self) -> Result<(), ThreatDocError> {
        let inputs = &self.state.inputs;
        match self.state.stage {
            Stage::Input => {
                if inputs.title.trim().is_empty() {
                    return Err(ThreatDocError::validation("a title is required"));
                }
                if inputs.description.trim().is_empty() && inputs.image.is_none() {
                    return Err(ThreatDocError::validation(
                        "provide a system description or an architecture diagram",
                    ));
                }
                if inputs.app_type.is_none() || inputs.classification.is_none() {
                    return Err(ThreatDocError::validation(
                        "application type and data classification are required",
                    ));
                }
                Ok(())
            }
            Stage::ReviewDescription => {
                if self.state.ai_description.trim().is_empty() {
                    return Err(ThreatDocError::validation(
                        "the architecture description is empty",
                    ));
                }
                Ok(())
            }
            Stage::ReviewDfd => {
                if self.state.dfd_description.trim().is_empty() {
                    return Err(ThreatDocError::validation(
                        "the data-flow description is empty",
                    ));
                }
                Ok(())
            }
            Stage::Results => Ok(()),
        }
    }

    /// The actual per-stage invocation. On success the stage's output slot
    /// is overwritten; nothing else in the state changes here.
    async fn run_stage_invocation(&mut self) -> Result<(), ThreatDocError> {
        let inputs = &self.state.inputs;
        let (app_type, classification) = match (inputs.app_type, inputs.classification) {
            (Some(a), Some(c)) => (a, c),
            _ => {
                return Err(ThreatDocError::validation(
                    "application type and data classification are required",
                ))
            }
        };
        match self.state.stage {
            Stage::Input => {
                let prompt =
                    prompts::architecture_prompt(&inputs.description, app_type, classification);
                let image = inputs.image.clone();
                let text = self.client.invoke_text(prompt, image).await?;
                self.state.ai_description = scrub::clean_prose(&text);
                Ok(())
            }
            Stage::ReviewDescription => {
                let prompt = prompts::dfd_prompt(&self.state.ai_description);
                let image = inputs.image.clone();
                let text = self.client.invoke_text(prompt, image).await?;
                self.state.dfd_description = scrub::clean_prose(&text);
                Ok(())
            }
            Stage::ReviewDfd => {
                let prompt =
                    prompts::threats_prompt(&self.state.dfd_description, app_type, classification);
                let list: ThreatList = self.client.invoke_structured(prompt, None).await?;
                self.state.threats = list.normalise();
                Ok(())
            }
            // advance() stops at the terminal stage before calling here.
            Stage::Results => Ok(()),
        }
    }
}
