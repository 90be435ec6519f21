//! REST [`PageSource`] backed by `reqwest`.
//!
//! One page is one GET to `baseUrl + endpoints[method]`. Request fields are
//! sent as query parameters under the names configured in [`SourceConfig`];
//! everything left in the request's params goes through verbatim.

use std::time::Duration;

use async_trait::async_trait;
use k4_core::error::{K4Error, K4Result};
use k4_paginate::{PageRequest, PageSource};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SourceConfig;

pub struct HttpSource {
    http: reqwest::Client,
    config: SourceConfig,
}

impl HttpSource {
    pub fn new(config: SourceConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(Duration::from_millis(config.timeout_ms)).build()?;
        Ok(Self { http, config })
    }

    /// Query pairs for one request.
    fn query(&self, request: &PageRequest) -> Vec<(String, String)> {
        let cfg = &self.config;
        let mut pairs = Vec::new();
        if let Some(symbol) = &request.symbol {
            pairs.push((cfg.symbol_param.clone(), symbol.clone()));
        }
        if let Some(tf) = &request.timeframe {
            pairs.push((cfg.timeframe_param.clone(), tf.clone()));
        }
        if let Some(since) = request.since {
            pairs.push((cfg.since_param.clone(), since.to_string()));
        }
        if let Some(limit) = request.limit {
            pairs.push((cfg.limit_param.clone(), limit.to_string()));
        }
        // `till` is an alias of `until`; only one upper bound goes out.
        let has_until = request.params.get("until").is_some_and(|v| !v.is_null());
        for (key, value) in &request.params {
            if key == "till" && has_until {
                continue;
            }
            let Some(value) = param_string(value) else {
                continue;
            };
            let key = match (key.as_str(), &cfg.until_param) {
                ("until" | "till", Some(name)) => name.clone(),
                _ => key.clone(),
            };
            pairs.push((key, value));
        }
        pairs
    }
}

/// Query-string form of a param value; `null` is omitted.
fn param_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Map a non-success status to the error class the drivers act on.
fn status_error(status: StatusCode, body: &str) -> K4Error {
    // 418 is Binance's "IP banned after ignoring 429s".
    let msg = format!("HTTP {status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::IM_A_TEAPOT {
        K4Error::RateLimitExceeded(msg)
    } else {
        K4Error::Exchange(msg)
    }
}

/// Records from a response body: a bare array, or an array under `data`.
fn extract_records(body: Value) -> K4Result<Vec<Value>> {
    match body {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut obj) => match obj.remove("data") {
            Some(Value::Array(rows)) => Ok(rows),
            _ => Err(K4Error::Parse("response object has no \"data\" array".to_string())),
        },
        other => Err(K4Error::Parse(format!("expected a JSON array, got {other}"))),
    }
}

#[async_trait]
impl PageSource for HttpSource {
    type Record = Value;

    async fn fetch_page(&self, request: PageRequest) -> K4Result<Vec<Value>> {
        let path = self
            .config
            .endpoints
            .get(&request.method)
            .ok_or_else(|| K4Error::BadRequest(format!("no endpoint configured for {}", request.method)))?;
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let query = self.query(&request);

        let mut builder = self.http.get(&url).query(&query);
        for (name, value) in &self.config.headers {
            builder = builder.header(name, value);
        }

        let resp = builder.send().await.map_err(|e| K4Error::Network(format!("{} {url}: {e}", request.method)))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("[http] {} {url} -> {status}", request.method);
            return Err(status_error(status, &body));
        }

        let body: Value = resp.json().await.map_err(|e| K4Error::Parse(format!("{} {url}: {e}", request.method)))?;
        let records = extract_records(body)?;
        debug!("[http] {} {url} {query:?} -> {} records", request.method, records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use serde_json::json;

    fn source(until_param: Option<&str>) -> HttpSource {
        HttpSource::new(SourceConfig {
            base_url: "http://localhost".into(),
            endpoints: HashMap::from([("fetchTrades".to_string(), "/trades".to_string())]),
            symbol_param: "symbol".into(),
            timeframe_param: "interval".into(),
            since_param: "startTime".into(),
            limit_param: "limit".into(),
            until_param: until_param.map(str::to_string),
            timeout_ms: 1000,
            headers: HashMap::new(),
        })
        .unwrap()
    }

    #[test]
    fn statuses_map_to_error_classes() {
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "slow down").is_rate_limit());
        assert!(status_error(StatusCode::IM_A_TEAPOT, "banned").is_rate_limit());
        assert!(matches!(status_error(StatusCode::BAD_GATEWAY, ""), K4Error::Exchange(_)));
        assert!(matches!(status_error(StatusCode::BAD_REQUEST, "bad symbol"), K4Error::Exchange(_)));
    }

    #[test]
    fn accepts_array_or_data_envelope() {
        assert_eq!(extract_records(json!([1, 2])).unwrap().len(), 2);
        assert_eq!(extract_records(json!({"code": "0", "data": [[1], [2], [3]]})).unwrap().len(), 3);
        assert!(matches!(extract_records(json!({"code": "1"})), Err(K4Error::Parse(_))));
        assert!(matches!(extract_records(json!("oops")), Err(K4Error::Parse(_))));
    }

    #[test]
    fn builds_query_with_configured_names() {
        let src = source(Some("endTime"));
        let mut request = PageRequest {
            method: "fetchTrades".into(),
            symbol: Some("BTCUSDT".into()),
            since: Some(100),
            limit: Some(500),
            ..PageRequest::default()
        };
        request.params.insert("until".into(), json!(999));
        request.params.insert("fromId".into(), json!("42"));
        request.params.insert("skip".into(), Value::Null);

        let q: HashMap<_, _> = src.query(&request).into_iter().collect();
        assert_eq!(q["symbol"], "BTCUSDT");
        assert_eq!(q["startTime"], "100");
        assert_eq!(q["limit"], "500");
        assert_eq!(q["endTime"], "999");
        assert_eq!(q["fromId"], "42");
        assert!(!q.contains_key("skip"));
        assert!(!q.contains_key("until"));
    }

    #[test]
    fn until_wins_over_till() {
        let src = source(Some("endTime"));
        let mut request = PageRequest { method: "fetchTrades".into(), ..PageRequest::default() };
        request.params.insert("till".into(), json!(1000));
        request.params.insert("until".into(), json!(299));
        assert_eq!(src.query(&request), vec![("endTime".to_string(), "299".to_string())]);

        request.params.remove("until");
        assert_eq!(src.query(&request), vec![("endTime".to_string(), "1000".to_string())]);
    }

    #[test]
    fn until_passes_through_without_rename() {
        let src = source(None);
        let mut request = PageRequest { method: "fetchTrades".into(), ..PageRequest::default() };
        request.params.insert("until".into(), json!(5));
        assert_eq!(src.query(&request), vec![("until".to_string(), "5".to_string())]);
    }
}
