//! Integration tests for the pipeline controller and the resilient
//! invocation client, driven by a scripted in-process transport.
//!
//! Retry timing runs under tokio's paused clock (`start_paused`), so the
//! full default backoff ladder executes instantly while still being
//! measurable through `tokio::time::Instant`.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use threatdoc::{
    AnalysisConfig, ApplicationType, DataClassification, ModelReply, ModelRequest, ModelTransport,
    PipelineController, PipelineState, Stage, StepOutcome, StepRejection, ThreatDocError,
    ThreatStatus, TransportError,
};

// ── Scripted transport ───────────────────────────────────────────────────

/// Replays a fixed sequence of outcomes and records every request it saw.
struct Scripted {
    script: Mutex<Vec<Result<String, TransportError>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl Scripted {
    fn new(mut script: Vec<Result<String, TransportError>>) -> Arc<Self> {
        script.reverse(); // pop() from the front
        Arc::new(Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn prompt(&self, index: usize) -> String {
        self.requests.lock().unwrap()[index].prompt.clone()
    }
}

#[async_trait]
impl ModelTransport for Scripted {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelReply, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop()
            .map(|r| r.map(|text| ModelReply { text }))
            .unwrap_or_else(|| Err(TransportError::fatal("script exhausted")))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn config(transport: Arc<dyn ModelTransport>) -> AnalysisConfig {
    AnalysisConfig::builder()
        .transport(transport)
        .build()
        .expect("valid config")
}

fn seeded_controller(transport: Arc<dyn ModelTransport>) -> PipelineController {
    let mut controller = PipelineController::new(&config(transport)).expect("controller");
    let inputs = controller.inputs_mut();
    inputs.title = "Payments API".into();
    inputs.description = "line one\nline two\nline three".into();
    inputs.app_type = Some(ApplicationType::Api);
    inputs.classification = Some(DataClassification::Confidential);
    controller
}

const THREATS_JSON: &str = r#"{"threats":[
  {"threat_id":"t-1","threat_name":"Token replay","stride_category":"Spoofing",
   "description":"Stolen session tokens can be replayed.","mitigation":"Bind tokens to client fingerprints.","status":"Pending"},
  {"threat_id":"t-2","threat_name":"Log tampering","stride_category":"Repudiation",
   "description":"Local logs can be altered after an incident.","mitigation":"Ship logs to an append-only store.","status":"Pending"}
]}"#;

// ── Full walkthrough ─────────────────────────────────────────────────────

#[tokio::test]
async fn full_pipeline_reaches_results_and_freezes_a_record() {
    let transport = Scripted::new(vec![
        Ok("```markdown\nThe system has an API tier and a database.\n```".into()),
        Ok("Processes: api.\r\nData stores: postgres.".into()),
        Ok(format!("Here is the threat model: {THREATS_JSON} Let me know!")),
    ]);
    let mut controller = seeded_controller(transport.clone());

    assert_eq!(
        controller.advance().await.unwrap(),
        StepOutcome::Moved(Stage::ReviewDescription)
    );
    // Stage output was scrubbed: fences gone, content kept.
    assert_eq!(
        controller.state().ai_description,
        "The system has an API tier and a database."
    );

    assert_eq!(
        controller.advance().await.unwrap(),
        StepOutcome::Moved(Stage::ReviewDfd)
    );
    assert_eq!(
        controller.state().dfd_description,
        "Processes: api.\nData stores: postgres."
    );

    assert_eq!(
        controller.advance().await.unwrap(),
        StepOutcome::Moved(Stage::Results)
    );
    assert_eq!(controller.state().threats.len(), 2);
    assert!(controller
        .state()
        .threats
        .iter()
        .all(|t| t.status == ThreatStatus::Pending));

    // Threat review at the terminal stage.
    controller
        .set_threat_status("t-1", ThreatStatus::Accepted)
        .unwrap();
    let err = controller
        .set_threat_status("t-1", ThreatStatus::Rejected)
        .unwrap_err();
    assert!(matches!(err, ThreatDocError::Validation { .. }));

    let created_at = chrono::DateTime::parse_from_rfc3339("2024-05-10T12:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let record = controller.finish(created_at).unwrap();
    assert_eq!(record.title, "Payments API");
    assert_eq!(record.threats[0].status, ThreatStatus::Accepted);
    assert_eq!(record.threats[1].status, ThreatStatus::Pending);
    assert_eq!(record.created_at, created_at);

    // Exactly one invocation per stage.
    assert_eq!(transport.calls(), 3);
}

// ── Navigation ───────────────────────────────────────────────────────────

#[tokio::test]
async fn retreat_preserves_outputs_and_advance_overwrites() {
    let transport = Scripted::new(vec![
        Ok("first description".into()),
        Ok("first dfd".into()),
        Ok("second dfd".into()),
    ]);
    let mut controller = seeded_controller(transport.clone());

    controller.advance().await.unwrap();
    controller.advance().await.unwrap();
    assert_eq!(controller.state().stage, Stage::ReviewDfd);
    assert_eq!(controller.state().dfd_description, "first dfd");

    // Back one step: the DFD output survives.
    assert_eq!(
        controller.retreat(),
        StepOutcome::Moved(Stage::ReviewDescription)
    );
    assert_eq!(controller.state().dfd_description, "first dfd");

    // Forward again simply overwrites it.
    controller.advance().await.unwrap();
    assert_eq!(controller.state().dfd_description, "second dfd");
}

#[tokio::test]
async fn retreat_from_input_is_a_noop() {
    let transport = Scripted::new(vec![]);
    let mut controller = seeded_controller(transport);
    assert_eq!(
        controller.retreat(),
        StepOutcome::Rejected(StepRejection::AtStart)
    );
    assert_eq!(controller.state().stage, Stage::Input);
}

#[tokio::test]
async fn advance_from_results_is_rejected() {
    let transport = Scripted::new(vec![
        Ok("desc".into()),
        Ok("dfd".into()),
        Ok(r#"{"threats":[]}"#.into()),
    ]);
    let mut controller = seeded_controller(transport.clone());
    for _ in 0..3 {
        controller.advance().await.unwrap();
    }
    assert_eq!(controller.state().stage, Stage::Results);

    assert_eq!(
        controller.advance().await.unwrap(),
        StepOutcome::Rejected(StepRejection::AtTerminal)
    );
    assert_eq!(controller.retreat(), StepOutcome::Rejected(StepRejection::AtTerminal));
    assert_eq!(transport.calls(), 3, "rejected advance must not invoke");
}

#[tokio::test]
async fn edited_review_output_feeds_the_next_stage() {
    let transport = Scripted::new(vec![Ok("model description".into()), Ok("dfd".into())]);
    let mut controller = seeded_controller(transport.clone());

    controller.advance().await.unwrap();
    controller
        .edit_stage_output(Stage::ReviewDescription, "hand-corrected description")
        .unwrap();
    controller.advance().await.unwrap();

    let dfd_prompt = transport.prompt(1);
    assert!(dfd_prompt.contains("hand-corrected description"));
    assert!(!dfd_prompt.contains("model description"));
}

// ── Failure semantics ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn transient_failures_retry_then_exhaust() {
    struct AlwaysThrottled {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl ModelTransport for AlwaysThrottled {
        async fn generate(&self, _request: &ModelRequest) -> Result<ModelReply, TransportError> {
            *self.calls.lock().unwrap() += 1;
            Err(TransportError::throttled("ThrottlingException: slow down"))
        }

        fn name(&self) -> &str {
            "always-throttled"
        }
    }

    let transport = Arc::new(AlwaysThrottled {
        calls: Mutex::new(0),
    });
    let mut controller = seeded_controller(transport.clone());

    let started = tokio::time::Instant::now();
    let err = controller.advance().await.unwrap_err();
    let waited = started.elapsed();

    assert!(matches!(
        err,
        ThreatDocError::CapacityExceeded { attempts: 5, .. }
    ));
    assert_eq!(*transport.calls.lock().unwrap(), 5);
    // Backoff ladder 1s + 2s + 4s + 8s under the paused clock.
    assert_eq!(waited.as_secs(), 15);

    assert_eq!(controller.state().stage, Stage::Input);
    assert!(controller.state().last_error.is_some());
    assert!(!controller.state().busy);
}

#[tokio::test]
async fn fatal_failure_propagates_after_one_attempt() {
    let transport = Scripted::new(vec![Err(TransportError::fatal("invalid credentials"))]);
    let mut controller = seeded_controller(transport.clone());

    let err = controller.advance().await.unwrap_err();
    assert!(matches!(err, ThreatDocError::Transport { .. }));
    assert!(err.to_string().contains("invalid credentials"));
    assert_eq!(transport.calls(), 1);
    assert_eq!(controller.state().stage, Stage::Input);

    // The error is held until dismissed.
    assert!(controller.state().last_error.is_some());
    controller.dismiss_error();
    assert!(controller.state().last_error.is_none());
}

#[tokio::test]
async fn malformed_threat_output_keeps_the_stage() {
    let transport = Scripted::new(vec![
        Ok("desc".into()),
        Ok("dfd".into()),
        Ok("I could not produce JSON, sorry.".into()),
    ]);
    let mut controller = seeded_controller(transport);
    controller.advance().await.unwrap();
    controller.advance().await.unwrap();

    let err = controller.advance().await.unwrap_err();
    assert!(matches!(err, ThreatDocError::MalformedOutput { .. }));
    assert_eq!(controller.state().stage, Stage::ReviewDfd);
    assert!(controller.state().threats.is_empty());
}

#[tokio::test]
async fn missing_inputs_are_rejected_before_any_call() {
    let transport = Scripted::new(vec![Ok("unused".into())]);
    let mut controller = PipelineController::new(&config(transport.clone())).unwrap();
    controller.inputs_mut().title = "No description".into();
    controller.inputs_mut().app_type = Some(ApplicationType::Web);
    controller.inputs_mut().classification = Some(DataClassification::Public);

    let err = controller.advance().await.unwrap_err();
    assert!(matches!(err, ThreatDocError::Validation { .. }));
    assert_eq!(transport.calls(), 0);
}

// ── Save / reload ────────────────────────────────────────────────────────

#[tokio::test]
async fn state_survives_serialisation_mid_run() {
    let transport = Scripted::new(vec![Ok("desc".into())]);
    let mut controller = seeded_controller(transport);
    controller.advance().await.unwrap();

    let json = serde_json::to_string(&controller.into_state()).unwrap();
    let reloaded: PipelineState = serde_json::from_str(&json).unwrap();
    assert_eq!(reloaded.stage, Stage::ReviewDescription);
    assert_eq!(reloaded.ai_description, "desc");

    // Resume from the reloaded state and finish the run.
    let transport = Scripted::new(vec![Ok("dfd".into()), Ok(r#"{"threats":[]}"#.into())]);
    let mut controller =
        PipelineController::with_state(&config(transport), reloaded).unwrap();
    controller.advance().await.unwrap();
    controller.advance().await.unwrap();
    assert_eq!(controller.state().stage, Stage::Results);
}
