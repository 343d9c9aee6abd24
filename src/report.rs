//! Report export: document bytes plus a derived filename.

use crate::error::ThreatDocError;
use crate::layout::{self, PageGeometry};
use crate::record::AnalysisRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::info;

/// Filename used when the record title reduces to nothing.
const FALLBACK_SLUG: &str = "analysis";

/// A rendered report ready to hand to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportArtifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Lay out and serialise the report for a completed analysis.
pub fn export_pdf(
    record: &AnalysisRecord,
    image_bytes: Option<&[u8]>,
    geometry: &PageGeometry,
) -> ReportArtifact {
    let document = layout::render(record, image_bytes, geometry);
    let bytes = layout::write_pdf(&document);
    info!(
        pages = document.pages.len(),
        bytes = bytes.len(),
        "report rendered"
    );
    ReportArtifact {
        file_name: format!("threat-model-{}.pdf", file_slug(&record.title)),
        bytes,
    }
}

/// Export the report to a file, atomically (temp file + rename).
pub async fn export_to_file(
    record: &AnalysisRecord,
    image_bytes: Option<&[u8]>,
    geometry: &PageGeometry,
    path: impl AsRef<Path>,
) -> Result<ReportArtifact, ThreatDocError> {
    let artifact = export_pdf(record, image_bytes, geometry);
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ThreatDocError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                }
            })?;
        }
    }

    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, &artifact.bytes)
        .await
        .map_err(|e| ThreatDocError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| ThreatDocError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(artifact)
}

static RE_NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]+").unwrap());

/// Derive a filesystem-safe slug from the record title: every run of
/// non-alphanumeric characters becomes `_`, the result is lowercased, and
/// an empty result falls back to a generic name.
pub fn file_slug(title: &str) -> String {
    let slug = RE_NON_ALNUM
        .replace_all(title.trim(), "_")
        .to_ascii_lowercase();
    let slug = slug.trim_matches('_').to_string();
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}
