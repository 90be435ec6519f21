//! Scriptable page source for driver tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use k4_core::error::K4Result;
use k4_core::types::Record;
use serde_json::{Value, json};

use crate::source::{PageRequest, PageSource};

type Responder = Box<dyn Fn(usize, &PageRequest) -> K4Result<Vec<Value>> + Send + Sync>;

/// Records every request and answers from a script or a closure.
pub struct MockSource {
    respond: Responder,
    requests: Mutex<Vec<PageRequest>>,
}

impl MockSource {
    /// Answer call `n` with `script[n]`; empty pages once the script runs out.
    pub fn scripted(script: Vec<K4Result<Vec<Value>>>) -> Self {
        let script = Mutex::new(VecDeque::from(script));
        Self::with(move |_, _| script.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new())))
    }

    /// Answer with a closure of `(call_index, request)`.
    pub fn with(f: impl Fn(usize, &PageRequest) -> K4Result<Vec<Value>> + Send + Sync + 'static) -> Self {
        Self { respond: Box::new(f), requests: Mutex::new(Vec::new()) }
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl PageSource for MockSource {
    type Record = Value;

    async fn fetch_page(&self, request: PageRequest) -> K4Result<Vec<Value>> {
        let idx = {
            let mut log = self.requests.lock().unwrap();
            log.push(request.clone());
            log.len() - 1
        };
        (self.respond)(idx, &request)
    }
}

/// Trade-like records with ids equal to their timestamps.
pub fn trades(timestamps: impl IntoIterator<Item = i64>) -> Vec<Value> {
    timestamps.into_iter().map(|ts| json!({"id": ts.to_string(), "timestamp": ts})).collect()
}

pub fn timestamps(records: &[Value]) -> Vec<i64> {
    records.iter().filter_map(Record::timestamp).collect()
}
