//! `reqwest`-backed implementation of [`Transport`] against the remote
//! SQL-over-HTTP backend's `/v2/pipeline` endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::TransportError;

use super::retry::{backoff_delay, is_transient_client_error, is_transient_status, MAX_ATTEMPTS};
use super::types::{Row, Rows, Statement, Value};
use super::Transport;

/// Default per-request wall-clock timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, TransportError> {
        Self::with_timeout(base_url, token, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token,
        })
    }

    fn pipeline_url(&self) -> String {
        format!("{}/v2/pipeline", self.base_url.trim_end_matches('/'))
    }

    #[instrument(skip(self, stmts), fields(n = stmts.len()))]
    async fn send_pipeline(
        &self,
        stmts: &[Statement],
    ) -> Result<Vec<Result<Rows, TransportError>>, TransportError> {
        let body = WireRequest {
            requests: stmts
                .iter()
                .map(|s| WireStepRequest {
                    kind: "execute",
                    stmt: WireStatement {
                        sql: s.sql.clone(),
                        args: s.args.iter().map(WireArg::from).collect(),
                    },
                })
                .collect(),
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut req = self.client.post(self.pipeline_url()).json(&body);
            if let Some(token) = &self.token {
                req = req.bearer_auth(token);
            }

            let send_result = req.send().await;

            let response = match send_result {
                Ok(resp) => resp,
                Err(err) => {
                    if is_transient_client_error(&err) && attempt < MAX_ATTEMPTS {
                        warn!(attempt, "transport connection error, retrying: {err}");
                        tokio::time::sleep(backoff_delay(attempt)).await;
                        continue;
                    }
                    return Err(TransportError::Client(err));
                }
            };

            let status = response.status();
            if status.as_u16() == 200 {
                let parsed: WireResponse = response.json().await?;
                return Ok(parsed.results.into_iter().map(decode_result).collect());
            }

            if is_transient_status(status.as_u16()) && attempt < MAX_ATTEMPTS {
                warn!(attempt, status = status.as_u16(), "transient backend status, retrying");
                tokio::time::sleep(backoff_delay(attempt)).await;
                continue;
            }

            let text = response.text().await.unwrap_or_default();
            return Err(classify_fatal_status(status.as_u16(), text));
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn exec_one(&self, stmt: Statement) -> Result<Rows, TransportError> {
        let mut results = self.send_pipeline(std::slice::from_ref(&stmt)).await?;
        results
            .pop()
            .ok_or_else(|| TransportError::Protocol("empty pipeline response".into()))?
    }

    async fn exec_batch(
        &self,
        stmts: Vec<Statement>,
    ) -> Result<Vec<Result<Rows, TransportError>>, TransportError> {
        debug!(n = stmts.len(), "executing batch");
        self.send_pipeline(&stmts).await
    }
}

fn classify_fatal_status(status: u16, body: String) -> TransportError {
    match status {
        401 | 403 => TransportError::Auth(body),
        404 => TransportError::NotFound(body),
        400 | 422 => TransportError::Protocol(body),
        _ => TransportError::Server(format!("{status}: {body}")),
    }
}

fn decode_result(result: WireResult) -> Result<Rows, TransportError> {
    match result {
        WireResult::Ok { response } => {
            let cols: Vec<String> = response.result.cols.into_iter().map(|c| c.name).collect();
            let rows = response
                .result
                .rows
                .into_iter()
                .map(|cells| {
                    let mut map = std::collections::HashMap::with_capacity(cols.len());
                    for (name, cell) in cols.iter().zip(cells) {
                        map.insert(name.clone(), cell.into());
                    }
                    Row::from_cells(map)
                })
                .collect();
            Ok(Rows { rows })
        }
        WireResult::Error { error } => Err(classify_pipeline_error(error)),
    }
}

/// Per-statement errors reported inside an otherwise-200 pipeline response.
/// Any error code not recognized here is treated as a fatal protocol
/// failure rather than something retryable.
fn classify_pipeline_error(error: WireError) -> TransportError {
    match error.code.as_deref() {
        Some("AUTH_ERROR") | Some("UNAUTHENTICATED") => TransportError::Auth(error.message),
        Some("NOT_FOUND") => TransportError::NotFound(error.message),
        _ => TransportError::Protocol(error.message),
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct WireRequest {
    requests: Vec<WireStepRequest>,
}

#[derive(Serialize)]
struct WireStepRequest {
    #[serde(rename = "type")]
    kind: &'static str,
    stmt: WireStatement,
}

#[derive(Serialize)]
struct WireStatement {
    sql: String,
    args: Vec<WireArg>,
}

#[derive(Serialize)]
struct WireArg {
    #[serde(rename = "type")]
    ty: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
}

impl From<&Value> for WireArg {
    fn from(v: &Value) -> Self {
        match v {
            Value::Text(s) => WireArg {
                ty: "text",
                value: Some(serde_json::Value::String(s.clone())),
            },
            Value::Integer(n) => WireArg {
                ty: "integer",
                value: Some(serde_json::Value::String(n.to_string())),
            },
            Value::Real(f) => WireArg {
                ty: "real",
                value: serde_json::Number::from_f64(*f).map(serde_json::Value::Number),
            },
            Value::Null => WireArg { ty: "null", value: None },
        }
    }
}

#[derive(Deserialize)]
struct WireResponse {
    results: Vec<WireResult>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireResult {
    Ok { response: WireOkResponse },
    Error { error: WireError },
}

#[derive(Deserialize)]
struct WireOkResponse {
    result: WireResultSet,
}

#[derive(Deserialize)]
struct WireResultSet {
    cols: Vec<WireCol>,
    rows: Vec<Vec<WireCell>>,
}

#[derive(Deserialize)]
struct WireCol {
    name: String,
}

#[derive(Deserialize)]
struct WireError {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireCell {
    Text { value: String },
    Integer { value: String },
    Float { value: f64 },
    Null,
    Blob { value: String },
}

impl From<WireCell> for Value {
    fn from(cell: WireCell) -> Self {
        match cell {
            WireCell::Text { value } => Value::Text(value),
            WireCell::Integer { value } => {
                Value::Integer(value.parse().unwrap_or_default())
            }
            WireCell::Float { value } => Value::Real(value),
            WireCell::Null => Value::Null,
            WireCell::Blob { value } => Value::Text(value),
        }
    }
}
