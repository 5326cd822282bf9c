//! JSON shapes of the analysis service (VirusTotal API v3 style).
//!
//! Every payload is wrapped as `{"data": {"id": ..., "attributes": {...}}}`.
//! Only the fields the orchestrator reads are modelled; everything else is
//! ignored on decode.

use serde::Deserialize;

use crate::types::{AggregateStats, EngineResults};

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// `POST /files` response.
#[derive(Debug, Deserialize)]
pub struct UploadData {
    pub id: String,
}

/// `GET /analyses/{id}` read for its status alone, so a report that is
/// completed but otherwise malformed is told apart from one still running.
#[derive(Debug, Deserialize)]
pub struct AnalysisStatus {
    pub attributes: StatusAttributes,
}

#[derive(Debug, Deserialize)]
pub struct StatusAttributes {
    pub status: String,
}

impl StatusAttributes {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }
}

/// `GET /analyses/{id}` response.
#[derive(Debug, Deserialize)]
pub struct AnalysisData {
    pub attributes: AnalysisAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisAttributes {
    pub status: String,
    #[serde(default)]
    pub stats: AggregateStats,
    #[serde(default)]
    pub results: EngineResults,
}

impl AnalysisAttributes {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }
}

/// `GET /files/{id}` response.
#[derive(Debug, Deserialize)]
pub struct FileData {
    pub attributes: FileAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileAttributes {
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub type_description: Option<String>,
}
