use std::thread;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::{ServiceConfig, API_KEY_HEADER};
use crate::error::{ScanError, ScanPhase};
use crate::multipart::encode_file_part;
use crate::normalizer::normalize;
use crate::poll::{AttemptOutcome, PollLoop, PollState};
use crate::transport::{HttpTransport, OutboundRequest};
use crate::types::{AnalysisHandle, FileIdentity, HashSource, ScanRequest, ScanVerdict};
use crate::wire::{
    AnalysisAttributes, AnalysisData, AnalysisStatus, Envelope, FileAttributes, FileData,
    UploadData,
};

/// Runs one file through the analysis service: submit, poll until the
/// analysis completes, look up file metadata, build the verdict.
///
/// Holds only configuration and a transport, so one instance can serve any
/// number of concurrent scans.
pub struct ScanOrchestrator<T> {
    config: ServiceConfig,
    transport: T,
    sleep: fn(Duration),
}

impl<T: HttpTransport> ScanOrchestrator<T> {
    pub fn new(config: ServiceConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            sleep: thread::sleep,
        }
    }

    /// Replaces the wait between poll attempts.
    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn scan(
        &self,
        content: Vec<u8>,
        file_name: &str,
        declared_type: &str,
    ) -> Result<ScanVerdict, ScanError> {
        self.run(ScanRequest::new(content, file_name, declared_type))
    }

    pub fn run(&self, request: ScanRequest) -> Result<ScanVerdict, ScanError> {
        let content_sha256 = sha256_hex(&request.content);

        self.enter(ScanPhase::Submitting, &request.file_name);
        let handle = self.submit(&request)?;

        self.enter(ScanPhase::Polling, &request.file_name);
        let analysis = self.await_completion(&handle)?;

        self.enter(ScanPhase::Enriching, &request.file_name);
        let mut identity = fallback_identity(&request, &handle, content_sha256);
        if let Some(info) = self.fetch_file_info(&handle) {
            if let Some(sha256) = info.sha256.filter(|h| !h.is_empty()) {
                identity.file_hash = sha256;
                identity.hash_source = HashSource::Service;
            }
            if let Some(type_description) = info.type_description.filter(|t| !t.is_empty()) {
                identity.file_type = type_description;
            }
        }

        let verdict = normalize(identity, &analysis.stats, &analysis.results);
        self.enter(ScanPhase::Assembled, &request.file_name);
        info!(
            handle = %handle,
            file_name = %verdict.file_name(),
            malicious_count = verdict.malicious_count(),
            total_engines = verdict.total_engines(),
            "scan finished"
        );
        Ok(verdict)
    }

    fn submit(&self, request: &ScanRequest) -> Result<AnalysisHandle, ScanError> {
        let (content_type, body) = encode_file_part(
            "file",
            &request.file_name,
            &request.content_type,
            &request.content,
        );
        let outbound = self
            .authorized(OutboundRequest::post(self.config.endpoint("files"), body))
            .header("Content-Type", &content_type);

        let reply = self.transport.send(&outbound)?;
        if !reply.is_success() {
            warn!(status = reply.status, file_name = %request.file_name, "upload rejected");
            return Err(ScanError::UploadFailed {
                status: reply.status,
                body: reply.text(),
            });
        }

        let envelope: Envelope<UploadData> = serde_json::from_slice(&reply.body)
            .map_err(|e| ScanError::Transport(format!("unreadable upload response: {}", e)))?;
        if envelope.data.id.is_empty() {
            return Err(ScanError::Transport(
                "upload response carried no analysis id".to_string(),
            ));
        }

        let handle = AnalysisHandle::new(envelope.data.id);
        debug!(handle = %handle, "upload accepted");
        Ok(handle)
    }

    fn await_completion(&self, handle: &AnalysisHandle) -> Result<AnalysisAttributes, ScanError> {
        let state = PollLoop::new(self.config.poll).run(self.sleep, |attempt| {
            let outcome = self.poll_once(handle);
            match &outcome {
                AttemptOutcome::Pending(status) => {
                    debug!(handle = %handle, attempt, status = %status, "analysis pending")
                }
                AttemptOutcome::Miss(reason) => {
                    debug!(handle = %handle, attempt, reason = %reason, "poll attempt missed")
                }
                AttemptOutcome::Completed(_) => {}
            }
            outcome
        });

        match state {
            PollState::Completed {
                attempts,
                report: Ok(report),
            } => {
                debug!(handle = %handle, attempts, "analysis completed");
                Ok(report)
            }
            PollState::Completed {
                attempts,
                report: Err(reason),
            } => {
                warn!(handle = %handle, attempts, reason = %reason, "completed analysis unreadable");
                Err(ScanError::Transport(format!(
                    "unreadable completed analysis: {}",
                    reason
                )))
            }
            PollState::TimedOut { attempts } | PollState::Waiting { attempts } => {
                warn!(handle = %handle, attempts, "analysis did not complete in time");
                Err(ScanError::AnalysisTimeout { attempts })
            }
        }
    }

    /// A completed status ends polling even when the report itself cannot be
    /// decoded; that failure is carried out as `Completed(Err(..))`.
    fn poll_once(
        &self,
        handle: &AnalysisHandle,
    ) -> AttemptOutcome<Result<AnalysisAttributes, String>> {
        let url = self.config.endpoint(&format!("analyses/{}", handle.as_str()));
        let reply = match self.transport.send(&self.authorized(OutboundRequest::get(url))) {
            Ok(reply) => reply,
            Err(e) => return AttemptOutcome::Miss(e.to_string()),
        };
        if !reply.is_success() {
            return AttemptOutcome::Miss(format!("status {}", reply.status));
        }

        match serde_json::from_slice::<Envelope<AnalysisStatus>>(&reply.body) {
            Ok(envelope) if envelope.data.attributes.is_completed() => AttemptOutcome::Completed(
                serde_json::from_slice::<Envelope<AnalysisData>>(&reply.body)
                    .map(|envelope| envelope.data.attributes)
                    .map_err(|e| e.to_string()),
            ),
            Ok(envelope) => AttemptOutcome::Pending(envelope.data.attributes.status),
            Err(e) => AttemptOutcome::Miss(format!("unreadable analysis response: {}", e)),
        }
    }

    /// Best-effort lookup of canonical hash and type. Any failure yields
    /// `None` and the caller falls back to declared values.
    fn fetch_file_info(&self, handle: &AnalysisHandle) -> Option<FileAttributes> {
        let url = self
            .config
            .endpoint(&format!("files/{}", handle.file_lookup_id()));
        let reply = match self.transport.send(&self.authorized(OutboundRequest::get(url))) {
            Ok(reply) => reply,
            Err(e) => {
                debug!(handle = %handle, error = %e, "file metadata unavailable");
                return None;
            }
        };
        if !reply.is_success() {
            debug!(handle = %handle, status = reply.status, "file metadata unavailable");
            return None;
        }

        match serde_json::from_slice::<Envelope<FileData>>(&reply.body) {
            Ok(envelope) => Some(envelope.data.attributes),
            Err(e) => {
                debug!(handle = %handle, error = %e, "file metadata unreadable");
                None
            }
        }
    }

    fn authorized(&self, request: OutboundRequest) -> OutboundRequest {
        request.header(API_KEY_HEADER, &self.config.api_key)
    }

    fn enter(&self, phase: ScanPhase, file_name: &str) {
        debug!(%phase, file_name, "scan phase");
    }
}

/// Identity used when file metadata could not be fetched.
///
/// `file_hash` becomes the handle's lookup id, which is not a digest of the
/// file; `hash_source` marks it and `content_sha256` holds the real digest.
fn fallback_identity(
    request: &ScanRequest,
    handle: &AnalysisHandle,
    content_sha256: String,
) -> FileIdentity {
    FileIdentity {
        file_name: request.file_name.clone(),
        file_size: request.file_size,
        file_hash: handle.file_lookup_id().to_string(),
        hash_source: HashSource::AnalysisHandle,
        content_sha256,
        file_type: request.content_type.clone(),
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn fallback_identity_uses_declared_values() {
        let request = ScanRequest::new(vec![1, 2, 3], "a.txt", "text/plain");
        let identity =
            fallback_identity(&request, &AnalysisHandle::new("abc-123"), "digest".to_string());
        assert_eq!(identity.file_hash, "abc");
        assert_eq!(identity.hash_source, HashSource::AnalysisHandle);
        assert_eq!(identity.file_type, "text/plain");
        assert_eq!(identity.file_size, 3);
        assert_eq!(identity.content_sha256, "digest");
    }
}
