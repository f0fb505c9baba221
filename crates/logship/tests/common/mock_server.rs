//! Scriptable mock HTTP server for exercising the full pipeline.
//!
//! Records every request it receives and answers from a scripted response
//! queue; once the script is exhausted it falls back to a 202 that accepts
//! every record in the request.

use std::collections::VecDeque;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

#[derive(Clone, Debug)]
pub struct ReceivedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub received_at: Instant,
}

impl ReceivedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Decodes the request body (gunzipping if needed) and returns the
    /// `logs` array.
    pub fn logs(&self) -> Vec<serde_json::Value> {
        let decoded = if self.body.starts_with(&[0x1f, 0x8b]) {
            let mut decoder = flate2::read::GzDecoder::new(self.body.as_slice());
            let mut plain = Vec::new();
            decoder.read_to_end(&mut plain).expect("invalid gzip body");
            plain
        } else {
            self.body.clone()
        };
        let value: serde_json::Value = serde_json::from_slice(&decoded).expect("invalid JSON body");
        value["logs"].as_array().cloned().unwrap_or_default()
    }

    /// Message fields of the logs in wire order.
    pub fn messages(&self) -> Vec<String> {
        self.logs()
            .iter()
            .map(|log| log["message"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

/// One canned response the server plays back before falling through to the
/// accept-everything default.
#[derive(Clone, Debug)]
pub struct ScriptedResponse {
    pub status: u16,
    pub retry_after: Option<u64>,
    pub body: Option<String>,
}

impl ScriptedResponse {
    pub fn status(status: u16) -> Self {
        Self { status, retry_after: None, body: None }
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after = Some(secs);
        self
    }
}

#[derive(Clone)]
pub struct MockServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
    script: Arc<Mutex<VecDeque<ScriptedResponse>>>,
}

impl MockServer {
    /// Starts a server that accepts everything with 202.
    pub async fn start() -> Self {
        Self::start_with_script(Vec::new()).await
    }

    /// Starts a server that plays `script` in order, then accepts
    /// everything.
    pub async fn start_with_script(script: Vec<ScriptedResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("failed to bind mock server");
        let addr = listener.local_addr().expect("failed to read local addr");

        let received = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(Mutex::new(script.into_iter().collect::<VecDeque<_>>()));

        let received_for_task = Arc::clone(&received);
        let script_for_task = Arc::clone(&script);
        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                let io = TokioIo::new(stream);
                let received = Arc::clone(&received_for_task);
                let script = Arc::clone(&script_for_task);

                tokio::spawn(async move {
                    let service = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let received = Arc::clone(&received);
                        let script = Arc::clone(&script);
                        async move { handle(req, &received, &script).await }
                    });
                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(io, service)
                        .await;
                });
            }
        });

        MockServer { addr, received, script }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.received.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    /// Appends another canned response to the script.
    #[allow(dead_code)]
    pub fn push_response(&self, response: ScriptedResponse) {
        self.script.lock().unwrap().push_back(response);
    }
}

async fn handle(
    req: Request<Incoming>,
    received: &Arc<Mutex<Vec<ReceivedRequest>>>,
    script: &Arc<Mutex<VecDeque<ScriptedResponse>>>,
) -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    let (parts, body) = req.into_parts();
    let body_bytes = body
        .collect()
        .await
        .map(|collected| collected.to_bytes().to_vec())
        .unwrap_or_default();

    let request = ReceivedRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        headers: parts
            .headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect(),
        body: body_bytes,
        received_at: Instant::now(),
    };

    let scripted = script.lock().unwrap().pop_front();
    let response = match scripted {
        Some(scripted) => {
            let body = scripted.body.unwrap_or_else(|| r#"{"error":"scripted failure"}"#.into());
            let mut builder = Response::builder().status(scripted.status);
            if let Some(secs) = scripted.retry_after {
                builder = builder.header("Retry-After", secs.to_string());
            }
            received.lock().unwrap().push(request);
            builder.body(Full::new(Bytes::from(body)))
        }
        None => {
            // Default: accept every record in the batch.
            let accepted = request.logs().len();
            received.lock().unwrap().push(request);
            Response::builder().status(202).body(Full::new(Bytes::from(format!(
                r#"{{"accepted":{accepted},"rejected":0,"errors":[]}}"#
            ))))
        }
    };
    response
}
