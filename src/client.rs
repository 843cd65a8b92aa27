//! Row sources: the seam between the fetcher and a tabular endpoint.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};
use ureq::Agent;

use crate::constants::client::MAX_RESPONSE_BYTES;
use crate::errors::FetchError;
use crate::query::QueryParams;
use crate::types::Row;

/// Anything that can answer one filtered GET with a list of rows.
///
/// Implementations are shared across worker threads.
pub trait RowSource: Send + Sync {
    /// Issue one request and return the rows it produced.
    ///
    /// An empty body or `[]` is `Ok(vec![])`. A body that is not a JSON array
    /// of objects is [`FetchError::MalformedResponse`].
    fn get_rows(&self, endpoint: &str, params: &QueryParams) -> Result<Vec<Row>, FetchError>;
}

impl<S: RowSource + ?Sized> RowSource for &S {
    fn get_rows(&self, endpoint: &str, params: &QueryParams) -> Result<Vec<Row>, FetchError> {
        (**self).get_rows(endpoint, params)
    }
}

impl<S: RowSource + ?Sized> RowSource for std::sync::Arc<S> {
    fn get_rows(&self, endpoint: &str, params: &QueryParams) -> Result<Vec<Row>, FetchError> {
        (**self).get_rows(endpoint, params)
    }
}

/// Blocking HTTP row source backed by a shared `ureq` agent.
#[derive(Clone)]
pub struct HttpRowSource {
    agent: Agent,
}

impl HttpRowSource {
    /// Build a source whose requests fail after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self { agent }
    }
}

impl RowSource for HttpRowSource {
    fn get_rows(&self, endpoint: &str, params: &QueryParams) -> Result<Vec<Row>, FetchError> {
        let mut request = self.agent.get(endpoint);
        for (name, value) in params.iter() {
            request = request.query(name, value);
        }
        let mut response = request.call().map_err(|err| FetchError::Transport {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        })?;
        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_RESPONSE_BYTES)
            .read_to_vec()
            .map_err(|err| FetchError::Transport {
                endpoint: endpoint.to_string(),
                reason: format!("failed reading response body: {err}"),
            })?;
        parse_rows(endpoint, &body)
    }
}

/// Parse a response body into rows.
///
/// Bytes that are not UTF-8 JSON are a [`FetchError::MalformedResponse`].
pub fn parse_rows(endpoint: &str, body: &[u8]) -> Result<Vec<Row>, FetchError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let json: Value = serde_json::from_slice(body).map_err(|err| FetchError::MalformedResponse {
        endpoint: endpoint.to_string(),
        details: err.to_string(),
    })?;
    let Value::Array(items) = json else {
        return Err(FetchError::MalformedResponse {
            endpoint: endpoint.to_string(),
            details: "top-level value is not an array".into(),
        });
    };
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
            Value::Object(row) => Ok(row),
            other => Err(FetchError::MalformedResponse {
                endpoint: endpoint.to_string(),
                details: format!("element {idx} is not an object: {other}"),
            }),
        })
        .collect()
}

/// Single best-effort request for pages that do not need windowing.
///
/// Any failure is logged and yields no rows.
pub fn load_rows<S: RowSource + ?Sized>(
    source: &S,
    endpoint: &str,
    params: &QueryParams,
) -> Vec<Row> {
    match source.get_rows(endpoint, params) {
        Ok(rows) => {
            if rows.is_empty() {
                warn!(endpoint, "no data received from endpoint");
            } else {
                debug!(endpoint, rows = rows.len(), "loaded rows");
            }
            rows
        }
        Err(err) => {
            warn!(endpoint, error = %err, "error fetching data from endpoint");
            Vec::new()
        }
    }
}
