// Shared in-process transport for engine tests.
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Notify;

use paged_fetch_engine::{FetchRequest, Transport};

type Responder = Box<dyn Fn(&FetchRequest) -> Result<Value> + Send + Sync>;

/// Records every request and answers through `responder`. Requests whose
/// parameter matches a registered gate wait until the gate is notified.
pub struct MockTransport {
    responder: Responder,
    requests: Mutex<Vec<FetchRequest>>,
    gates: Mutex<Vec<(String, String, Arc<Notify>)>>,
}

impl MockTransport {
    pub fn new(
        responder: impl Fn(&FetchRequest) -> Result<Value> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            gates: Mutex::new(Vec::new()),
        })
    }

    /// Hold requests whose `key` parameter equals `value`.
    pub fn gate(&self, key: &str, value: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.gates
            .lock()
            .push((key.to_string(), value.to_string(), notify.clone()));
        notify
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }

    pub fn requested(&self, key: &str) -> Vec<Option<String>> {
        self.requests
            .lock()
            .iter()
            .map(|r| r.param(key).map(str::to_string))
            .collect()
    }

    pub async fn wait_for_calls(&self, n: usize) {
        while self.calls() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &FetchRequest) -> Result<Value> {
        self.requests.lock().push(request.clone());
        let gate = self
            .gates
            .lock()
            .iter()
            .find(|(k, v, _)| request.param(k) == Some(v.as_str()))
            .map(|(_, _, gate)| gate.clone());
        if let Some(gate) = gate {
            gate.notified().await;
        }
        (self.responder)(request)
    }
}

/// A server over a fixed item list, honouring page, limit and a substring search.
pub fn catalog(items: &[&str]) -> impl Fn(&FetchRequest) -> Result<Value> + Send + Sync + 'static {
    let items: Vec<String> = items.iter().map(|s| s.to_string()).collect();
    move |request| {
        let page: usize = request.param("page").unwrap_or("1").parse()?;
        let limit: usize = request.param("limit").unwrap_or("10").parse()?;
        let search = request.param("search");
        let filtered: Vec<&String> = items
            .iter()
            .filter(|item| search.map_or(true, |s| item.contains(s)))
            .collect();
        let slice: Vec<&String> = filtered
            .iter()
            .skip((page - 1) * limit)
            .take(limit)
            .copied()
            .collect();
        Ok(json!({"payload": slice, "totalCount": filtered.len()}))
    }
}
