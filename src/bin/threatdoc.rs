//! CLI binary for threatdoc.
//!
//! A thin shim over the library crate: flags map to `AnalysisConfig` and
//! pipeline inputs, each stage runs behind a spinner, and the finished
//! analysis is written out as a PDF report (plus, optionally, the record
//! as JSON).

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use threatdoc::{
    export_to_file, prepare_image, AnalysisConfig, ApplicationType, DataClassification,
    HttpGateway, PageGeometry, PipelineController, Stage, StepOutcome,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run a full analysis from a description file
  threatdoc --title "Payments API" --description-file system.txt \
            --app-type api --classification confidential -o report.pdf

  # Attach an architecture diagram
  threatdoc --title "Checkout" --description "React SPA + REST backend" \
            --app-type web --classification pci-dss --image diagram.png

  # Pause after each stage to review (edit by pointing at a file)
  threatdoc --title "Batch jobs" --description-file jobs.txt \
            --app-type logical-app --classification internal --review

  # Keep the structured record next to the PDF
  threatdoc --title "API" --description-file d.txt --app-type api \
            --classification restricted --record-out record.json

GATEWAY:
  The model gateway endpoint comes from --gateway-url (or THREATDOC_GATEWAY_URL)
  and authenticates with THREATDOC_API_KEY when set. Transient capacity errors
  are retried with exponential backoff before the stage is reported as failed.
"#;

#[derive(Parser, Debug)]
#[command(
    name = "threatdoc",
    version,
    about = "Guided STRIDE threat-model analysis with a paginated PDF report",
    after_help = AFTER_HELP
)]
struct Cli {
    /// Title of the analysis (also drives the report filename).
    #[arg(long)]
    title: String,

    /// System description as an inline string.
    #[arg(long, conflicts_with = "description_file")]
    description: Option<String>,

    /// Read the system description from a file.
    #[arg(long)]
    description_file: Option<PathBuf>,

    /// Application type: logical-app, logical-sub, bash, android, web, api.
    #[arg(long)]
    app_type: ApplicationType,

    /// Data classification: public, internal, confidential, restricted, pci-dss.
    #[arg(long)]
    classification: DataClassification,

    /// Optional architecture diagram (PNG or JPEG).
    #[arg(long)]
    image: Option<PathBuf>,

    /// Output path for the PDF report. Defaults to the derived filename.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write the structured analysis record as JSON.
    #[arg(long)]
    record_out: Option<PathBuf>,

    /// Model gateway endpoint URL.
    #[arg(long, env = "THREATDOC_GATEWAY_URL")]
    gateway_url: String,

    /// Gateway API key.
    #[arg(long, env = "THREATDOC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Pause after each stage for review; type a file path to replace the
    /// stage output, 'b' to go back, or press Enter to continue.
    #[arg(long)]
    review: bool,

    /// Maximum attempts per stage invocation (including the first).
    #[arg(long, default_value_t = 5)]
    max_attempts: u32,

    /// Per-call gateway timeout in seconds.
    #[arg(long, default_value_t = 120)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let description = match (&cli.description, &cli.description_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("reading description file {}", path.display()))?,
        (None, None) => String::new(),
    };
    if description.trim().is_empty() && cli.image.is_none() {
        bail!("provide --description, --description-file, or --image");
    }

    let gateway = HttpGateway::new(cli.gateway_url.clone(), cli.api_key.clone(), cli.timeout)?;
    let config = AnalysisConfig::builder()
        .transport(Arc::new(gateway))
        .max_attempts(cli.max_attempts)
        .api_timeout_secs(cli.timeout)
        .build()?;

    let image_bytes = match &cli.image {
        Some(path) => Some(
            std::fs::read(path).with_context(|| format!("reading image {}", path.display()))?,
        ),
        None => None,
    };
    let image_payload = image_bytes
        .as_deref()
        .map(|bytes| prepare_image(bytes, &config.image_limits))
        .transpose()
        .context("preparing architecture diagram")?;

    let mut controller = PipelineController::new(&config)?;
    {
        let inputs = controller.inputs_mut();
        inputs.title = cli.title.clone();
        inputs.description = description;
        inputs.app_type = Some(cli.app_type);
        inputs.classification = Some(cli.classification);
        inputs.image = image_payload;
    }

    run_stages(&mut controller, cli.review).await?;

    let record = controller.finish(chrono::Utc::now())?;
    eprintln!(
        "{} {} threats identified",
        green("✔"),
        bold(&record.threats.len().to_string())
    );

    if let Some(path) = &cli.record_out {
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing record to {}", path.display()))?;
        eprintln!("{} record written to {}", green("✔"), path.display());
    }

    let geometry = PageGeometry::default();
    let out_path = cli.output.clone().unwrap_or_else(|| {
        PathBuf::from(format!(
            "threat-model-{}.pdf",
            threatdoc::file_slug(&record.title)
        ))
    });
    let artifact = export_to_file(&record, image_bytes.as_deref(), &geometry, &out_path).await?;
    eprintln!(
        "{} report written to {} ({} bytes)",
        green("✔"),
        bold(&out_path.display().to_string()),
        artifact.bytes.len()
    );

    Ok(())
}

/// Walk the pipeline to the terminal stage, optionally pausing for review.
async fn run_stages(controller: &mut PipelineController, review: bool) -> Result<()> {
    loop {
        let stage = controller.state().stage;
        if stage == Stage::Results {
            return Ok(());
        }

        let spinner = stage_spinner(stage);
        let outcome = controller.advance().await;
        spinner.finish_and_clear();

        match outcome {
            Ok(StepOutcome::Moved(to)) => {
                eprintln!("{} {}", green("✓"), to.label());
                if review && to.is_review() {
                    review_stage(controller, to)?;
                }
            }
            Ok(StepOutcome::Rejected(reason)) => {
                bail!("stage transition rejected: {reason:?}");
            }
            Err(e) => {
                eprintln!("{} {}", red("✗"), e);
                bail!("analysis failed at stage '{}'", stage.label());
            }
        }
    }
}

/// Print the stage output and apply the user's review decision.
fn review_stage(controller: &mut PipelineController, stage: Stage) -> Result<()> {
    let output = match stage {
        Stage::ReviewDescription => controller.state().ai_description.clone(),
        Stage::ReviewDfd => controller.state().dfd_description.clone(),
        _ => return Ok(()),
    };
    eprintln!("\n{}\n{}\n", bold(stage.label()), output);
    eprint!(
        "{}",
        dim("[Enter] continue, [path] replace output from file, [b] back: ")
    );
    io::stderr().flush().ok();

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let line = line.trim();

    if line.eq_ignore_ascii_case("b") {
        controller.retreat();
        return Ok(());
    }
    if !line.is_empty() {
        let replacement = std::fs::read_to_string(line)
            .with_context(|| format!("reading replacement output from {line}"))?;
        controller
            .edit_stage_output(stage, replacement)
            .context("replacing stage output")?;
        eprintln!("{} output replaced", green("✓"));
    }
    Ok(())
}

fn stage_spinner(stage: Stage) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(match stage {
        Stage::Input => "Generating architecture description…",
        Stage::ReviewDescription => "Deriving the data-flow description…",
        Stage::ReviewDfd => "Enumerating STRIDE threats…",
        Stage::Results => "",
    });
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}
