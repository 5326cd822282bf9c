use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Per-engine findings keyed by the service's engine key.
pub type EngineResults = BTreeMap<String, EngineFinding>;

/// A file handed to the orchestrator for one scan. Dropped once submitted.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub content: Vec<u8>,
    pub file_name: String,
    pub file_size: u64,
    pub content_type: String,
}

impl ScanRequest {
    pub fn new(content: Vec<u8>, file_name: &str, content_type: &str) -> Self {
        let content_type = if content_type.trim().is_empty() {
            "application/octet-stream".to_string()
        } else {
            content_type.to_string()
        };
        Self {
            file_size: content.len() as u64,
            content,
            file_name: file_name.to_string(),
            content_type,
        }
    }
}

/// Job identifier issued by the analysis service for an in-flight analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisHandle(String);

impl AnalysisHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier of the analysed file as the service addresses it: the handle
    /// text up to its first `-`.
    ///
    /// This is also the fallback `file_hash` when file metadata cannot be
    /// fetched. It is not a digest of the submitted bytes; verdicts built from
    /// it carry `HashSource::AnalysisHandle`.
    pub fn file_lookup_id(&self) -> &str {
        self.0
            .split_once('-')
            .map_or(self.0.as_str(), |(head, _)| head)
    }
}

impl fmt::Display for AnalysisHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Category an engine assigned to the file.
///
/// Values outside the known set are kept verbatim in `Other` so an engine
/// entry is never dropped or recategorized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EngineCategory {
    Malicious,
    Suspicious,
    Harmless,
    Undetected,
    TypeUnsupported,
    Timeout,
    ConfirmedTimeout,
    Failure,
    Other(String),
}

impl EngineCategory {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Malicious => "malicious",
            Self::Suspicious => "suspicious",
            Self::Harmless => "harmless",
            Self::Undetected => "undetected",
            Self::TypeUnsupported => "type-unsupported",
            Self::Timeout => "timeout",
            Self::ConfirmedTimeout => "confirmed-timeout",
            Self::Failure => "failure",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for EngineCategory {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "malicious" => Self::Malicious,
            "suspicious" => Self::Suspicious,
            "harmless" => Self::Harmless,
            "undetected" => Self::Undetected,
            "type-unsupported" => Self::TypeUnsupported,
            "timeout" => Self::Timeout,
            "confirmed-timeout" => Self::ConfirmedTimeout,
            "failure" => Self::Failure,
            _ => Self::Other(raw),
        }
    }
}

impl From<EngineCategory> for String {
    fn from(category: EngineCategory) -> Self {
        match category {
            EngineCategory::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EngineCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineFinding {
    pub category: EngineCategory,
    pub engine_name: String,
    #[serde(default, deserialize_with = "result_text")]
    pub result: Option<String>,
}

/// Engines occasionally report a number or object as their result; keep it
/// as its JSON text instead of rejecting the whole report.
fn result_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    })
}

/// Engine counts per category, named the way the analysis service names them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateStats {
    pub malicious: u32,
    pub suspicious: u32,
    pub undetected: u32,
    pub harmless: u32,
    pub timeout: u32,
    #[serde(rename = "confirmed-timeout")]
    pub confirmed_timeout: u32,
    pub failure: u32,
    #[serde(rename = "type-unsupported")]
    pub type_unsupported: u32,
}

impl AggregateStats {
    /// Summed in `u64` so service-supplied counters cannot overflow.
    pub fn malicious_count(&self) -> u64 {
        u64::from(self.malicious) + u64::from(self.suspicious)
    }

    /// Sum of all counters. Should equal the number of engines consulted.
    pub fn total(&self) -> u64 {
        [
            self.malicious,
            self.suspicious,
            self.undetected,
            self.harmless,
            self.timeout,
            self.confirmed_timeout,
            self.failure,
            self.type_unsupported,
        ]
        .iter()
        .map(|&n| u64::from(n))
        .sum()
    }
}

/// Where a verdict's `file_hash` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashSource {
    /// SHA-256 reported by the service's file metadata.
    Service,
    /// Lookup id derived from the analysis handle. Not a content digest.
    AnalysisHandle,
}

/// Identity of the scanned file as it goes into a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
    pub file_name: String,
    pub file_size: u64,
    pub file_hash: String,
    pub hash_source: HashSource,
    pub content_sha256: String,
    pub file_type: String,
}

/// Final result of one scan. Built once by [`crate::normalizer::normalize`]
/// and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanVerdict {
    file_name: String,
    file_size: u64,
    file_hash: String,
    hash_source: HashSource,
    content_sha256: String,
    file_type: String,
    malicious_count: u64,
    total_engines: usize,
    is_malicious: bool,
    stats: AggregateStats,
    results: EngineResults,
}

impl ScanVerdict {
    pub(crate) fn from_parts(
        identity: FileIdentity,
        stats: AggregateStats,
        results: EngineResults,
    ) -> Self {
        let malicious_count = stats.malicious_count();
        Self {
            file_name: identity.file_name,
            file_size: identity.file_size,
            file_hash: identity.file_hash,
            hash_source: identity.hash_source,
            content_sha256: identity.content_sha256,
            file_type: identity.file_type,
            malicious_count,
            total_engines: results.len(),
            is_malicious: malicious_count > 0,
            stats,
            results,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn file_hash(&self) -> &str {
        &self.file_hash
    }

    pub fn hash_source(&self) -> HashSource {
        self.hash_source
    }

    pub fn content_sha256(&self) -> &str {
        &self.content_sha256
    }

    pub fn file_type(&self) -> &str {
        &self.file_type
    }

    pub fn malicious_count(&self) -> u64 {
        self.malicious_count
    }

    pub fn total_engines(&self) -> usize {
        self.total_engines
    }

    pub fn is_malicious(&self) -> bool {
        self.is_malicious
    }

    pub fn stats(&self) -> &AggregateStats {
        &self.stats
    }

    pub fn results(&self) -> &EngineResults {
        &self.results
    }

    /// True when the stats counters and the per-engine map disagree on how
    /// many engines were consulted.
    pub fn engine_count_drift(&self) -> bool {
        self.stats.total() != self.total_engines as u64
    }
}
