#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::{json, Value};
use vtscan::poll::PollPolicy;
use vtscan::transport::{HttpReply, HttpTransport, OutboundRequest, TransportError};
use vtscan::{ScanOrchestrator, ServiceConfig};

pub const BASE: &str = "http://scanner.test/api/v3";
pub const API_KEY: &str = "test-key";

/// Answers requests from a queue in order and remembers what was sent.
/// An empty queue answers with a transport error.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<HttpReply, TransportError>>>,
    seen: Mutex<Vec<OutboundRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, status: u16, body: Value) -> Self {
        self.push(Ok(HttpReply::new(status, body.to_string())));
        self
    }

    pub fn reply_raw(self, status: u16, body: &str) -> Self {
        self.push(Ok(HttpReply::new(status, body)));
        self
    }

    pub fn fail(self, reason: &str) -> Self {
        self.push(Err(TransportError(reason.to_string())));
        self
    }

    fn push(&self, reply: Result<HttpReply, TransportError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }
}

impl HttpTransport for ScriptedTransport {
    fn send(&self, request: &OutboundRequest) -> Result<HttpReply, TransportError> {
        self.seen.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError("no scripted reply".to_string())))
    }
}

pub fn no_sleep(_: std::time::Duration) {}

pub fn orchestrator(transport: ScriptedTransport) -> ScanOrchestrator<ScriptedTransport> {
    let config = ServiceConfig::new(API_KEY, BASE).with_poll(PollPolicy::default());
    ScanOrchestrator::new(config, transport).with_sleep(no_sleep)
}

pub fn upload_ok(handle: &str) -> Value {
    json!({ "data": { "type": "analysis", "id": handle } })
}

pub fn analysis(status: &str) -> Value {
    json!({ "data": { "id": "abc-123", "type": "analysis", "attributes": { "status": status } } })
}

/// Completed analysis over eight engines: `malicious` detections (at most 3),
/// five undetected, the rest harmless.
pub fn completed_analysis(malicious: u32) -> Value {
    assert!(malicious <= 3);
    let mut results = serde_json::Map::new();
    for i in 0..8u32 {
        let engine = format!("Engine{}", i);
        let (category, result) = if i < malicious {
            ("malicious", Value::from("Trojan.Generic"))
        } else if i < malicious + 5 {
            ("undetected", Value::Null)
        } else {
            ("harmless", Value::Null)
        };
        results.insert(
            engine.clone(),
            json!({ "category": category, "engine_name": engine, "result": result }),
        );
    }
    json!({
        "data": {
            "id": "abc-123",
            "type": "analysis",
            "attributes": {
                "status": "completed",
                "stats": {
                    "malicious": malicious,
                    "suspicious": 0,
                    "undetected": 5,
                    "harmless": 3 - malicious,
                    "timeout": 0,
                    "confirmed-timeout": 0,
                    "failure": 0,
                    "type-unsupported": 0
                },
                "results": results
            }
        }
    })
}

pub fn file_info(sha256: &str, type_description: &str) -> Value {
    json!({
        "data": {
            "id": sha256,
            "type": "file",
            "attributes": {
                "sha256": sha256,
                "type_description": type_description,
                "meaningful_name": "test.txt",
                "size": 1024
            }
        }
    })
}
