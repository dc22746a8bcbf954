use crate::credentials::{CredentialError, CredentialResolver, CredentialSource, Credentials};
use crate::errors::RelayError;
use crate::telegram::{DocumentSender, OutgoingDocument, SendDocumentResponse};
use async_trait::async_trait;
use metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Label, Metadata, Recorder, SharedString, Unit,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// A credential source whose answer can be changed between calls.
pub struct ScriptedSource {
    credentials: Mutex<Option<Credentials>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn succeeding(credentials: Credentials) -> Self {
        ScriptedSource {
            credentials: Mutex::new(Some(credentials)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        ScriptedSource {
            credentials: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn succeed_with(&self, credentials: Credentials) {
        *self.credentials.lock() = Some(credentials);
    }

    pub fn fail(&self) {
        *self.credentials.lock() = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for ScriptedSource {
    async fn fetch(&self, _auth_token: &str) -> Result<Credentials, CredentialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.credentials
            .lock()
            .clone()
            .ok_or_else(|| CredentialError::Transport("backend unavailable".into()))
    }
}

/// Records every resolution and answers with fixed credentials.
pub struct SpyResolver {
    credentials: Option<Credentials>,
    subjects: Mutex<Vec<Option<String>>>,
}

impl SpyResolver {
    pub fn with(credentials: Credentials) -> Self {
        SpyResolver {
            credentials: Some(credentials),
            subjects: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        SpyResolver {
            credentials: None,
            subjects: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.subjects.lock().len()
    }

    pub fn last_subject(&self) -> Option<String> {
        self.subjects.lock().last().cloned().flatten()
    }
}

#[async_trait]
impl CredentialResolver for SpyResolver {
    async fn resolve(
        &self,
        subject_id: Option<&str>,
        _auth_token: &str,
        _now_ms: u64,
    ) -> Result<Credentials, CredentialError> {
        self.subjects.lock().push(subject_id.map(str::to_owned));
        self.credentials
            .clone()
            .ok_or_else(|| CredentialError::Transport("backend unavailable".into()))
    }
}

/// Records every document and answers with a canned Telegram reply.
pub struct SpySender {
    reply: serde_json::Value,
    requests: Mutex<Vec<(Credentials, OutgoingDocument)>>,
}

impl SpySender {
    pub fn replying(reply: serde_json::Value) -> Self {
        SpySender {
            reply,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_request(&self) -> Option<(Credentials, OutgoingDocument)> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl DocumentSender for SpySender {
    async fn send_document(
        &self,
        credentials: &Credentials,
        document: OutgoingDocument,
    ) -> Result<SendDocumentResponse, RelayError> {
        self.requests.lock().push((credentials.clone(), document));
        serde_json::from_value(self.reply.clone())
            .map_err(|e| RelayError::InvalidUpstreamResponse(e.to_string()))
    }
}

const BOUNDARY: &str = "telestore-test-boundary";

/// Builds `multipart/form-data` request bodies.
#[derive(Default)]
pub struct MultipartBuilder {
    body: Vec<u8>,
}

impl MultipartBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Returns the content type header value and the finished body.
    pub fn build(mut self) -> (String, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={BOUNDARY}"), self.body)
    }
}

/// Keeps counter values in memory so tests can assert on them. Install it with
/// `metrics::set_default_local_recorder` inside a current-thread test.
#[derive(Default)]
pub struct CountingRecorder {
    counters: Mutex<HashMap<Key, Arc<AtomicU64>>>,
}

impl CountingRecorder {
    pub fn counter(&self, name: &'static str, labels: &[(&'static str, &'static str)]) -> u64 {
        let labels: Vec<Label> = labels.iter().map(|&(k, v)| Label::new(k, v)).collect();
        let key = Key::from_parts(name, labels);
        self.counters
            .lock()
            .get(&key)
            .map(|value| value.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

impl Recorder for CountingRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        let value = self.counters.lock().entry(key.clone()).or_default().clone();
        Counter::from_arc(value)
    }

    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}
