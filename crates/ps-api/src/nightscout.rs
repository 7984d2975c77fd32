//! Blocking HTTP client for a Nightscout instance.
//!
//! Implements the destination gateway over Nightscout's v1 REST API.
//! Authentication is the classic `api-secret` header carrying the hex
//! SHA-1 of the configured secret.

use std::fmt;
use std::fmt::Write as _;
use std::time::Duration;

use ps_sync::{DestinationRecord, ENTERED_BY, Entity, Entry, Gateway, GatewayError};
use sha1::{Digest, Sha1};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Nightscout REST client for one instance.
pub struct NightscoutApi {
    http: reqwest::blocking::Client,
    base_url: String,
    secret_hash: String,
}

impl fmt::Debug for NightscoutApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NightscoutApi")
            .field("base_url", &self.base_url)
            .field("secret_hash", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl NightscoutApi {
    pub fn new(base_url: impl Into<String>, secret: &str) -> Result<Self, GatewayError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_hash: sha1_hex(secret),
        })
    }

    fn url(&self, entity: Entity) -> String {
        format!("{}/api/v1/{}", self.base_url, entity.as_str())
    }

    fn latest(
        &self,
        entity: Entity,
        filters: &[(&str, &str)],
    ) -> Result<Option<DestinationRecord>, GatewayError> {
        let response = self
            .http
            .get(self.url(entity))
            .header("api-secret", &self.secret_hash)
            .query(&[("count", "1")])
            .query(filters)
            .send()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        let body = read_body(response)?;
        let mut records: Vec<DestinationRecord> =
            serde_json::from_str(&body).map_err(|err| GatewayError::InvalidRecord(err.to_string()))?;
        Ok(if records.is_empty() {
            None
        } else {
            Some(records.swap_remove(0))
        })
    }

    fn send_write(&self, request: reqwest::blocking::RequestBuilder) -> Result<(), GatewayError> {
        let response = request
            .header("api-secret", &self.secret_hash)
            .send()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        read_body(response).map(|_| ())
    }
}

impl Gateway for NightscoutApi {
    fn last_uploaded(&self, event_type: &str) -> Result<Option<DestinationRecord>, GatewayError> {
        self.latest(
            Entity::Treatments,
            &[
                ("find[enteredBy]", ENTERED_BY),
                ("find[eventType]", event_type),
            ],
        )
    }

    fn last_uploaded_activity(
        &self,
        activity_type: &str,
    ) -> Result<Option<DestinationRecord>, GatewayError> {
        self.latest(Entity::Activity, &[("find[activityType]", activity_type)])
    }

    fn create(&mut self, entry: &Entry) -> Result<(), GatewayError> {
        self.send_write(self.http.post(self.url(entry.entity)).json(entry))
    }

    fn update(&mut self, id: &str, entry: &Entry) -> Result<(), GatewayError> {
        let body = identified_body(id, entry)?;
        self.send_write(self.http.put(self.url(entry.entity)).json(&body))
    }

    fn delete(&mut self, entity: Entity, id: &str) -> Result<(), GatewayError> {
        self.send_write(
            self.http
                .delete(format!("{}/{id}", self.url(entity))),
        )
    }
}

/// The PUT body: the entry's fields plus the `_id` of the record to
/// rewrite.
fn identified_body(id: &str, entry: &Entry) -> Result<serde_json::Value, GatewayError> {
    let mut body =
        serde_json::to_value(entry).map_err(|err| GatewayError::InvalidRecord(err.to_string()))?;
    if let Some(map) = body.as_object_mut() {
        map.insert("_id".to_string(), serde_json::Value::String(id.to_string()));
    }
    Ok(body)
}

fn read_body(response: reqwest::blocking::Response) -> Result<String, GatewayError> {
    let status = response.status();
    let body = response
        .text()
        .map_err(|err| GatewayError::Transport(err.to_string()))?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(GatewayError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

/// Hex SHA-1 digest, as Nightscout expects in the `api-secret` header.
fn sha1_hex(secret: &str) -> String {
    Sha1::digest(secret.as_bytes())
        .iter()
        .fold(String::with_capacity(40), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        })
}
