//! Worker-side client for the record coordination service.

use std::collections::BTreeMap;
use std::time::Duration;

use bon::bon;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use super::server::{HEADER_GET_STATE, HEADER_SET_STATE};
use crate::ledger::{Info, LedgerError, Record};

/// Marker the service puts in front of the exhausted-404 body. Matching on
/// it is how a polling worker tells "done, nothing left" from real failures.
pub const EXHAUSTED_PREFIX: &str = "no open records ";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClientError {
    /// The service answered, but no record in the requested state is left.
    #[error("records exhausted: {0}")]
    Exhausted(String),

    /// Connection failure or timeout, distinct from exhaustion so that a
    /// worker loop can alert instead of quietly stopping.
    #[error("record service unreachable: {0}")]
    Unreachable(String),

    #[error("record service error {status}: {body}")]
    Service { status: u16, body: String },

    #[error("malformed record payload: {0}")]
    Payload(String),

    #[error(transparent)]
    Data(#[from] LedgerError),
}

/// Client bound to one ledger name on one service instance.
pub struct Client {
    ledger: String,
    base_url: String,
    http: reqwest::Client,
}

#[bon]
impl Client {
    #[builder]
    pub fn new(
        #[builder(into)] host: String,
        port: u16,
        #[builder(into)] ledger: String,
        timeout: Option<Duration>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|err| ClientError::Unreachable(err.to_string()))?;
        Ok(Self {
            base_url: format!("http://{host}:{port}/{ledger}"),
            ledger,
            http,
        })
    }
}

impl Client {
    pub fn ledger(&self) -> &str {
        &self.ledger
    }

    /// Lease the next record: ask for one in `get_state`, have the service
    /// flip it to `set_state`.
    pub async fn next_record(
        &self,
        get_state: &str,
        set_state: &str,
    ) -> Result<Record, ClientError> {
        let response = self
            .http
            .get(format!("{}/next", self.base_url))
            .header(HEADER_GET_STATE, get_state)
            .header(HEADER_SET_STATE, set_state)
            .send()
            .await
            .map_err(|err| ClientError::Unreachable(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ClientError::Unreachable(err.to_string()))?;
        if status == StatusCode::NOT_FOUND && body.starts_with(EXHAUSTED_PREFIX) {
            return Err(ClientError::Exhausted(body));
        }
        if status != StatusCode::OK {
            return Err(ClientError::Service {
                status: status.as_u16(),
                body,
            });
        }
        let fields: BTreeMap<String, String> =
            serde_json::from_str(&body).map_err(|err| ClientError::Payload(err.to_string()))?;
        let record = Record::from_fields(&fields)?;
        debug!(identifier = %record.identifier(), ledger = %self.ledger, "record received");
        Ok(record)
    }

    /// Post a record back to the service. The response body is not
    /// interpreted beyond the status code.
    pub async fn update(&self, record: &Record) -> Result<StatusCode, ClientError> {
        debug!(identifier = %record.identifier(), state = %record.state(), "posting record update");
        let response = self
            .http
            .post(format!("{}/update", self.base_url))
            .json(&record.to_fields())
            .send()
            .await
            .map_err(|err| ClientError::Unreachable(err.to_string()))?;
        Ok(response.status())
    }

    /// Report an outcome for an identifier: stamps the state change time
    /// and sends the given payload along.
    pub async fn report(
        &self,
        identifier: &str,
        state: &str,
        info: Info,
    ) -> Result<StatusCode, ClientError> {
        let mut record = Record::new(identifier);
        record.set_state(state);
        record.info = info;
        self.update(&record).await
    }
}
