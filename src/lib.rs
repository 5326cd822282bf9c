//! Multi-engine file scanning through an external analysis service.
//!
//! [`ScanOrchestrator`] uploads a file, polls the analysis until it
//! completes or the poll budget runs out, looks up file metadata when it
//! can, and returns a [`ScanVerdict`]. The [`server`] module puts an HTTP
//! front end and a scan history around it.

pub mod config;
pub mod error;
pub mod history;
pub mod multipart;
pub mod normalizer;
pub mod orchestrator;
pub mod poll;
pub mod server;
pub mod transport;
pub mod types;
pub mod wire;

pub use config::{AppConfig, ServiceConfig};
pub use error::{ScanError, ScanPhase};
pub use orchestrator::ScanOrchestrator;
pub use types::{AnalysisHandle, EngineCategory, EngineFinding, HashSource, ScanVerdict};
