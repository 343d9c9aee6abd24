//! # threatdoc
//!
//! Guided STRIDE threat-model analysis with LLM stages and paginated PDF
//! reports.
//!
//! ## Why this crate?
//!
//! Writing a useful threat model by hand requires someone who knows both
//! the system and the methodology. This crate splits the work: the user
//! supplies what they know (a description, an optional architecture
//! diagram, the data classification) and a generative model fills in the
//! methodology, one reviewable stage at a time. Because every stage output
//! is confirmed or edited by the user before the next stage consumes it,
//! the final report stays grounded in the real system rather than in model
//! guesses.
//!
//! ## Pipeline Overview
//!
//! ```text
//! inputs (title, description, diagram?, app type, classification)
//!  │
//!  ├─ 1. Describe   model synthesises an architecture description
//!  ├─ 2. Review     user confirms or edits, model derives the DFD
//!  ├─ 3. Review     user confirms, model enumerates STRIDE threats (JSON)
//!  ├─ 4. Results    user accepts/rejects threats, record is persisted
//!  └─ 5. Report     layout engine paginates the record into a PDF
//! ```
//!
//! Each forward transition is one model invocation through the resilient
//! client ([`ModelClient`]): transient capacity errors retry with
//! exponential backoff, everything else surfaces immediately, and
//! structured stages recover the JSON object embedded in the reply.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use threatdoc::{
//!     AnalysisConfig, ApplicationType, DataClassification, HttpGateway,
//!     PipelineController,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = HttpGateway::new("https://gateway.example/api/generate", None, 120)?;
//!     let config = AnalysisConfig::builder()
//!         .transport(Arc::new(gateway))
//!         .build()?;
//!
//!     let mut controller = PipelineController::new(&config)?;
//!     let inputs = controller.inputs_mut();
//!     inputs.title = "Payments API".into();
//!     inputs.description = "A REST API backed by Postgres".into();
//!     inputs.app_type = Some(ApplicationType::Api);
//!     inputs.classification = Some(DataClassification::Confidential);
//!
//!     controller.advance().await?; // architecture description
//!     controller.advance().await?; // data-flow description
//!     controller.advance().await?; // threat enumeration
//!
//!     let record = controller.finish(chrono::Utc::now())?;
//!     let artifact = threatdoc::export_pdf(&record, None, &Default::default());
//!     std::fs::write(&artifact.file_name, &artifact.bytes)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `threatdoc` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod image_prep;
pub mod invoke;
pub mod layout;
pub mod pipeline;
pub mod prompts;
pub mod record;
pub mod report;
pub mod scrub;
pub mod store;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AnalysisConfig, AnalysisConfigBuilder, ImageLimits, RetryPolicy};
pub use error::ThreatDocError;
pub use image_prep::prepare_image;
pub use invoke::{extract_structured, ModelClient};
pub use layout::{render, write_pdf, Document, DrawOp, Page, PageGeometry, TextAlign};
pub use pipeline::controller::PipelineController;
pub use pipeline::{AnalysisInputs, PipelineState, Stage, StepOutcome, StepRejection};
pub use record::{
    AnalysisRecord, ApplicationType, DataClassification, StrideCategory, Threat, ThreatList,
    ThreatStatus,
};
pub use report::{export_pdf, export_to_file, file_slug, ReportArtifact};
pub use store::{MemoryStore, RecordStore, RecordSummary, StoreError, StoredImage};
pub use transport::{
    HttpGateway, ImagePayload, ModelReply, ModelRequest, ModelTransport, TransportError,
    TransportErrorKind,
};
