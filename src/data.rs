use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProjectStatus {
    Prospect,
    Current,
    Done,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Prospect => "prospect",
            ProjectStatus::Current => "current",
            ProjectStatus::Done => "done",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProjectStatus::Prospect => "Prospect",
            ProjectStatus::Current => "In progress",
            ProjectStatus::Done => "Completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProgressSet {
    pub prospection: u8,
    pub studies: u8,
    pub fabrication: u8,
    pub transport: u8,
    pub construction: u8,
}

impl ProgressSet {
    /// The five phases in report order, clamped to 0..=100.
    pub fn rows(&self) -> [(&'static str, u8); 5] {
        [
            ("Prospection", self.prospection.min(100)),
            ("Studies", self.studies.min(100)),
            ("Fabrication", self.fabrication.min(100)),
            ("Transport", self.transport.min(100)),
            ("Construction", self.construction.min(100)),
        ]
    }
}

/// One project as supplied by the dashboard's CRUD layer. Immutable for the
/// duration of one export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub id: String,
    pub name: String,
    pub country: String,
    pub structure_type: String,
    pub status: ProjectStatus,
    pub progress: ProgressSet,
    pub description: String,
    pub location: GeoPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAsset {
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentKind {
    Plan,
    Flag,
    ClientLogo,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAsset {
    pub name: String,
    pub kind: DocumentKind,
}

impl DocumentAsset {
    /// Lowercased file stem ("plan-facade.pdf" -> "plan-facade").
    pub fn base_name(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .and_then(|value| value.to_str())
            .unwrap_or(&self.name)
            .to_lowercase()
    }
}

/// Per-section toggles. Sections are always emitted in the fixed canonical
/// order; options only include or exclude them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub cover_photo: bool,
    pub description: bool,
    pub progress_chart: bool,
    pub document_annex: bool,
    pub local_map: bool,
    pub global_map: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::all()
    }
}

impl ExportOptions {
    pub fn all() -> Self {
        Self {
            cover_photo: true,
            description: true,
            progress_chart: true,
            document_annex: true,
            local_map: true,
            global_map: true,
        }
    }

    pub fn none() -> Self {
        Self {
            cover_photo: false,
            description: false,
            progress_chart: false,
            document_annex: false,
            local_map: false,
            global_map: false,
        }
    }
}

/// An encoded raster image exchanged between the normalizer / capture bridge
/// and the compositor, which re-decodes it for embedding.
#[derive(Debug, Clone)]
pub struct EncodedBitmap {
    pub bytes: Vec<u8>,
    pub width_px: u32,
    pub height_px: u32,
}
