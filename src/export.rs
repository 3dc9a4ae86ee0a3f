use anyhow::{Context, Result};
use tracing::info;

use crate::capture::{CaptureBridge, CaptureConfig, MapWidgetFactory};
use crate::compose::Compositor;
use crate::data::{DocumentAsset, ExportOptions, ImageAsset, ProjectSnapshot};
use crate::normalize::ImageLoader;

/// Coarse, user-visible progress during long-running steps. The dashboard
/// shows these in the export dialog; `NullStatus` discards them.
pub trait StatusSink: Send + Sync {
    fn update(&self, message: &str);
}

pub struct NullStatus;

impl StatusSink for NullStatus {
    fn update(&self, _message: &str) {}
}

/// The finished report. Delivery is the caller's: the core never touches the
/// filesystem or network on the way out.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// One entry per drawn or explicitly omitted block, in draw order.
    pub outline: Vec<String>,
    pub page_count: usize,
}

#[derive(Debug, Clone)]
pub struct ExportInputs {
    pub project: ProjectSnapshot,
    pub images: Vec<ImageAsset>,
    pub documents: Vec<DocumentAsset>,
    pub options: ExportOptions,
}

/// Runs one export. Everything inside is one failure boundary: recoverable
/// per-section failures degrade to omission before reaching this level, and
/// any error that does escape aborts the whole export with no artifact.
pub async fn run(
    inputs: &ExportInputs,
    widgets: &dyn MapWidgetFactory,
    loader: &dyn ImageLoader,
    status: &dyn StatusSink,
) -> Result<Artifact> {
    run_with_config(inputs, widgets, loader, status, CaptureConfig::default()).await
}

pub async fn run_with_config(
    inputs: &ExportInputs,
    widgets: &dyn MapWidgetFactory,
    loader: &dyn ImageLoader,
    status: &dyn StatusSink,
    capture: CaptureConfig,
) -> Result<Artifact> {
    status.update("preparing report");
    let bridge = CaptureBridge::new(capture);
    let compositor = Compositor::new(&inputs.project.name, loader, &bridge, widgets)?;
    let composed = compositor
        .compose(
            &inputs.project,
            &inputs.options,
            &inputs.images,
            &inputs.documents,
            status,
        )
        .await
        .with_context(|| format!("report export failed for project '{}'", inputs.project.name))?;

    let file_name = artifact_file_name(&inputs.project.name);
    info!(
        pages = composed.page_count,
        file = %file_name,
        "report composed"
    );
    Ok(Artifact {
        file_name,
        bytes: composed.bytes,
        outline: composed.outline,
        page_count: composed.page_count,
    })
}

/// Deterministic artifact name: project name upper-cased, whitespace runs
/// replaced by underscores.
pub(crate) fn artifact_file_name(project_name: &str) -> String {
    let stem = project_name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase();
    if stem.is_empty() {
        "REPORT.pdf".to_string()
    } else {
        format!("{}.pdf", stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_name_replaces_whitespace_and_uppercases() {
        assert_eq!(artifact_file_name("Pont Sewa"), "PONT_SEWA.pdf");
        assert_eq!(artifact_file_name("  Pont   de la Moa "), "PONT_DE_LA_MOA.pdf");
        assert_eq!(artifact_file_name("Kédougou"), "KÉDOUGOU.pdf");
    }

    #[test]
    fn empty_name_falls_back() {
        assert_eq!(artifact_file_name("   "), "REPORT.pdf");
    }
}
