//! Blocking HTTP client for the t:connect cloud.
//!
//! Two vendor services back one account: the Control-IQ API serves the
//! JSON therapy timeline, and the WS2 service serves the raw CSV export.
//! Both authenticate with the session obtained from a single token
//! endpoint; login happens lazily on the first request and the session is
//! reused for the rest of the process.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use ps_core::{TherapyTimeline, TimeRange};
use ps_sync::{SourceError, TherapySource};
use serde::Deserialize;

const LOGIN_URL: &str = "https://tdcservices.tandemdiabetes.com/accesstoken/api/tconnect/token";
const CONTROLIQ_BASE_URL: &str = "https://tdcservices.tandemdiabetes.com/tconnect/controliq/api/";
const WS2_BASE_URL: &str = "https://tconnectws2.tandemdiabetes.com/";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// An authenticated vendor session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_token: String,
    user_guid: String,
}

/// t:connect cloud client for one account.
///
/// Cheap to construct; no network traffic happens until the first fetch.
pub struct TConnectApi {
    http: reqwest::blocking::Client,
    email: String,
    password: String,
    session: Mutex<Option<Session>>,
}

impl fmt::Debug for TConnectApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TConnectApi")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl TConnectApi {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Result<Self, SourceError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|err| SourceError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            email: email.into(),
            password: password.into(),
            session: Mutex::new(None),
        })
    }

    /// Performs a fresh login, replacing any cached session.
    ///
    /// Also the credential probe behind `pumpsync check-login`.
    pub fn login(&self) -> Result<(), SourceError> {
        let response = self
            .http
            .post(LOGIN_URL)
            .json(&serde_json::json!({
                "username": self.email,
                "password": self.password,
            }))
            .send()
            .map_err(|err| SourceError::Transport(err.to_string()))?;
        let session: Session = read_json(response)?;

        tracing::debug!(user_guid = %session.user_guid, "logged in to t:connect");
        if let Ok(mut cached) = self.session.lock() {
            *cached = Some(session);
        }
        Ok(())
    }

    fn session(&self) -> Result<Session, SourceError> {
        if let Ok(cached) = self.session.lock() {
            if let Some(session) = cached.as_ref() {
                return Ok(session.clone());
            }
        }
        self.login()?;
        let cached = self
            .session
            .lock()
            .map_err(|_| SourceError::Transport("session lock poisoned".to_string()))?;
        cached
            .clone()
            .ok_or_else(|| SourceError::InvalidPayload("login yielded no session".to_string()))
    }
}

impl TherapySource for TConnectApi {
    fn therapy_timeline(&self, range: &TimeRange) -> Result<TherapyTimeline, SourceError> {
        let session = self.session()?;
        let url = format!(
            "{CONTROLIQ_BASE_URL}therapytimeline/users/{}",
            session.user_guid
        );
        let (start, end) = timeline_dates(range);
        let response = self
            .http
            .get(url)
            .bearer_auth(&session.access_token)
            .query(&[("startDate", start), ("endDate", end)])
            .send()
            .map_err(|err| SourceError::Transport(err.to_string()))?;
        read_json(response)
    }

    fn therapy_timeline_csv(&self, range: &TimeRange) -> Result<String, SourceError> {
        let session = self.session()?;
        let url = format!(
            "{WS2_BASE_URL}{}",
            csv_export_path(&session.user_guid, range)
        );
        let response = self
            .http
            .get(url)
            .bearer_auth(&session.access_token)
            .send()
            .map_err(|err| SourceError::Transport(err.to_string()))?;
        read_text(response)
    }
}

/// Window bounds in the timeline endpoint's `YYYY-MM-DD` date format.
fn timeline_dates(range: &TimeRange) -> (String, String) {
    (
        range.start.format("%Y-%m-%d").to_string(),
        range.end.format("%Y-%m-%d").to_string(),
    )
}

/// Relative path of the WS2 CSV export, which takes `MM-DD-YYYY` dates.
fn csv_export_path(user_guid: &str, range: &TimeRange) -> String {
    format!(
        "therapytimeline2csv/{user_guid}/{}/{}?format=csv",
        range.start.format("%m-%d-%Y"),
        range.end.format("%m-%d-%Y"),
    )
}

fn read_text(response: reqwest::blocking::Response) -> Result<String, SourceError> {
    let status = response.status();
    let body = response
        .text()
        .map_err(|err| SourceError::Transport(err.to_string()))?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(SourceError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::blocking::Response,
) -> Result<T, SourceError> {
    let body = read_text(response)?;
    serde_json::from_str(&body).map_err(|err| SourceError::InvalidPayload(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn window() -> TimeRange {
        let tz = FixedOffset::west_opt(4 * 3600).unwrap();
        TimeRange::new(
            tz.with_ymd_and_hms(2021, 3, 16, 0, 0, 0).unwrap(),
            tz.with_ymd_and_hms(2021, 3, 17, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn timeline_dates_are_iso() {
        assert_eq!(
            timeline_dates(&window()),
            ("2021-03-16".to_string(), "2021-03-17".to_string())
        );
    }

    #[test]
    fn csv_export_path_uses_vendor_date_order() {
        assert_eq!(
            csv_export_path("1234-guid", &window()),
            "therapytimeline2csv/1234-guid/03-16-2021/03-17-2021?format=csv"
        );
    }

    #[test]
    fn session_json_uses_vendor_field_names() {
        let session: Session = serde_json::from_str(
            r#"{"accessToken": "tok", "userGuid": "1234-guid", "expiresIn": 3599}"#,
        )
        .unwrap();
        assert_eq!(session.access_token, "tok");
        assert_eq!(session.user_guid, "1234-guid");
    }

    #[test]
    fn debug_redacts_password() {
        let api = TConnectApi::new("user@example.com", "hunter2").unwrap();
        let rendered = format!("{api:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("hunter2"));
    }
}
