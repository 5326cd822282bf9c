use std::io::Read;
use std::sync::Arc;
use std::thread;

use serde_json::{json, Value};
use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{error, info, warn};

use crate::config::{DEFAULT_HISTORY_LIMIT, MAX_FILE_SIZE, MAX_HISTORY_LIMIT};
use crate::error::ScanError;
use crate::history::HistoryStore;
use crate::multipart::{boundary_from_content_type, find_file_part};
use crate::orchestrator::ScanOrchestrator;
use crate::transport::HttpTransport;

/// Extra bytes allowed on top of the file size for multipart framing.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Status and JSON body of an API answer. `body` is `None` for the bare
/// pre-flight reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl ApiResponse {
    fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Self::json(status, json!({ "error": message }))
    }

    fn error_with_details(status: u16, message: &str, details: &str) -> Self {
        Self::json(status, json!({ "error": message, "details": details }))
    }
}

/// Request routing for the scan service, independent of the HTTP server.
pub struct Api<T> {
    orchestrator: ScanOrchestrator<T>,
    history: Arc<dyn HistoryStore>,
    max_file_size: u64,
    history_limit: usize,
}

impl<T: HttpTransport> Api<T> {
    pub fn new(orchestrator: ScanOrchestrator<T>, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            orchestrator,
            history,
            max_file_size: MAX_FILE_SIZE,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_limits(mut self, max_file_size: u64, history_limit: usize) -> Self {
        self.max_file_size = max_file_size;
        self.history_limit = history_limit.clamp(1, MAX_HISTORY_LIMIT);
        self
    }

    /// Upper bound on how much of a request body is worth reading.
    pub fn body_limit(&self) -> u64 {
        self.max_file_size.saturating_add(MULTIPART_OVERHEAD)
    }

    pub fn handle(
        &self,
        method: &Method,
        url: &str,
        content_type: Option<&str>,
        body: &[u8],
    ) -> ApiResponse {
        if *method == Method::Options {
            return ApiResponse {
                status: 200,
                body: None,
            };
        }

        let (path, query) = url.split_once('?').unwrap_or((url, ""));
        match (path.trim_end_matches('/'), method) {
            ("/api/scan", Method::Post) => self.scan_upload(content_type, body),
            ("/api/history", Method::Get) => self.list_history(query),
            ("/api/health", Method::Get) => ApiResponse::json(200, json!({ "status": "ok" })),
            ("/api/scan" | "/api/history" | "/api/health", _) => {
                ApiResponse::error(405, "Method not allowed")
            }
            _ => ApiResponse::error(404, "Not found"),
        }
    }

    fn scan_upload(&self, content_type: Option<&str>, body: &[u8]) -> ApiResponse {
        let boundary = match boundary_from_content_type(content_type.unwrap_or("")) {
            Ok(boundary) => boundary,
            Err(e) => return ApiResponse::error(400, &e.to_string()),
        };

        let part = match find_file_part(body, &boundary, "file") {
            Ok(Some(part)) => part,
            Ok(None) => return ApiResponse::error(400, "No file provided"),
            Err(e) => return ApiResponse::error(400, &e.to_string()),
        };

        let file_size = part.data.len() as u64;
        info!(file_name = %part.file_name, file_size, "upload request received");

        if file_size > self.max_file_size {
            warn!(file_size, limit = self.max_file_size, "file exceeds size limit");
            return ApiResponse::error(
                400,
                &format!(
                    "File size exceeds maximum limit of {}MB",
                    self.max_file_size / 1024 / 1024
                ),
            );
        }

        let declared_type = part.content_type.unwrap_or_default();
        let verdict = match self
            .orchestrator
            .scan(part.data, &part.file_name, &declared_type)
        {
            Ok(verdict) => verdict,
            Err(e) => return scan_error_response(&e),
        };

        if let Err(e) = self.history.record(&verdict) {
            error!(error = %e, file_name = %verdict.file_name(), "failed to record scan history");
        }

        match serde_json::to_value(&verdict) {
            Ok(body) => ApiResponse::json(200, body),
            Err(e) => ApiResponse::error_with_details(500, "Internal server error", &e.to_string()),
        }
    }

    fn list_history(&self, query: &str) -> ApiResponse {
        let limit = query
            .split('&')
            .filter_map(|pair| pair.strip_prefix("limit="))
            .find_map(|v| v.parse::<usize>().ok())
            .unwrap_or(self.history_limit)
            .min(MAX_HISTORY_LIMIT);

        match self.history.recent(limit) {
            Ok(records) => ApiResponse::json(200, json!(records)),
            Err(e) => {
                error!(error = %e, "failed to load scan history");
                ApiResponse::error_with_details(500, "Failed to load history", &e.to_string())
            }
        }
    }
}

fn scan_error_response(err: &ScanError) -> ApiResponse {
    warn!(error = %err, phase = %err.phase(), "scan failed");
    match err {
        ScanError::UploadFailed { status, body } => {
            let status = if (400..600).contains(status) { *status } else { 502 };
            ApiResponse::error_with_details(status, "Failed to upload file to analysis service", body)
        }
        ScanError::AnalysisTimeout { attempts } => ApiResponse::error_with_details(
            408,
            "Analysis timeout",
            &format!(
                "analysis did not finish after {} polls; try again later",
                attempts
            ),
        ),
        ScanError::Transport(details) => {
            ApiResponse::error_with_details(502, "Analysis service unreachable", details)
        }
    }
}

/// Accepts connections on `addr`, one worker thread per request so a long
/// scan does not hold up other callers.
pub fn serve<T>(addr: &str, api: Arc<Api<T>>) -> anyhow::Result<()>
where
    T: HttpTransport + 'static,
{
    let server = Server::http(addr).map_err(|e| anyhow::anyhow!("failed to bind {}: {}", addr, e))?;
    info!(%addr, "server listening");

    for request in server.incoming_requests() {
        let api = Arc::clone(&api);
        thread::spawn(move || respond(&api, request));
    }
    Ok(())
}

fn respond<T: HttpTransport>(api: &Api<T>, mut request: Request) {
    let method = request.method().clone();
    let url = request.url().to_string();
    let content_type = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Content-Type"))
        .map(|h| h.value.as_str().to_string());

    let mut body = Vec::new();
    if method == Method::Post {
        if let Err(e) = request
            .as_reader()
            .take(api.body_limit())
            .read_to_end(&mut body)
        {
            warn!(error = %e, "failed to read request body");
            send(
                request,
                ApiResponse::error(400, "Failed to read request body"),
            );
            return;
        }
    }

    let response = api.handle(&method, &url, content_type.as_deref(), &body);
    info!(%method, %url, status = response.status, "request handled");
    send(request, response);
}

fn send(request: Request, response: ApiResponse) {
    let has_body = response.body.is_some();
    let payload = response
        .body
        .map(|body| body.to_string())
        .unwrap_or_default();
    let mut reply = Response::from_string(payload).with_status_code(response.status);
    if has_body {
        reply = with_header(reply, "Content-Type", "application/json");
    }
    let reply = add_cors_headers(reply);
    if let Err(e) = request.respond(reply) {
        warn!(error = %e, "failed to send response");
    }
}

fn add_cors_headers<R: Read>(response: Response<R>) -> Response<R> {
    let response = with_header(response, "Access-Control-Allow-Origin", "*");
    let response = with_header(response, "Access-Control-Allow-Methods", "GET, POST, OPTIONS");
    with_header(
        response,
        "Access-Control-Allow-Headers",
        "Content-Type, Authorization, X-Client-Info, Apikey",
    )
}

fn with_header<R: Read>(response: Response<R>, name: &str, value: &str) -> Response<R> {
    match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}
