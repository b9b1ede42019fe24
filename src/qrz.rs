//! Callbook lookups against the QRZ.com XML data service.
//!
//! The enrichment cache only sees the [`CallbookService`] trait; session
//! keys, HTTP and XML stay inside [`QrzClient`].

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::station::StationRecord;

/// Default QRZ XML endpoint.
pub const QRZ_URL: &str = "https://xmldata.qrz.com/xml/current/";

/// Outcome of one remote lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    Found(StationRecord),
    NotFound,
    /// The service rejected the session key; log in again and retry.
    SessionExpired,
    ServiceError(String),
}

/// Errors raised while talking to the callbook.
#[derive(Debug, Error)]
pub enum CallbookError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Malformed XML response: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("Login failed: {0}")]
    Login(String),
}

/// A remote station lookup service with session-based authentication.
pub trait CallbookService {
    /// Establish a new session, replacing any existing one.
    fn login(&mut self) -> impl Future<Output = Result<(), CallbookError>> + Send;

    /// Look up one call sign.
    fn lookup(&mut self, call_sign: &str) -> impl Future<Output = LookupOutcome> + Send;
}

/// Reduce a call sign to the part the callbook indexes.
///
/// Portable and beacon designators are dropped: `VA3XCD/B` becomes `VA3XCD`.
pub fn base_call(call_sign: &str) -> &str {
    let start = call_sign
        .find(|c: char| c.is_ascii_alphanumeric())
        .unwrap_or(call_sign.len());
    let rest = &call_sign[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(rest.len());
    &rest[..end]
}

/// QRZ.com XML client.
pub struct QrzClient {
    http: reqwest::Client,
    url: String,
    username: String,
    password: String,
    session_key: Option<String>,
}

impl QrzClient {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, CallbookError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("rbn-filter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            url: url.into(),
            username: username.into(),
            password: password.into(),
            session_key: None,
        })
    }

    async fn fetch(&self, query: &[(&str, &str)]) -> Result<QrzDatabase, CallbookError> {
        let response = self.http.get(&self.url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CallbookError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        parse_response(&body)
    }
}

impl CallbookService for QrzClient {
    async fn login(&mut self) -> Result<(), CallbookError> {
        self.session_key = None;
        let db = self
            .fetch(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .await?;

        let session = db.session.unwrap_or_default();
        match session.key.filter(|k| !k.is_empty()) {
            Some(key) => {
                info!("Opened QRZ session");
                self.session_key = Some(key);
                Ok(())
            }
            None => Err(CallbookError::Login(
                session
                    .error
                    .unwrap_or_else(|| "no session key returned".to_string()),
            )),
        }
    }

    async fn lookup(&mut self, call_sign: &str) -> LookupOutcome {
        if self.session_key.is_none()
            && let Err(e) = self.login().await
        {
            return LookupOutcome::ServiceError(e.to_string());
        }
        let Some(key) = self.session_key.clone() else {
            return LookupOutcome::ServiceError("no session".to_string());
        };

        let call = base_call(call_sign);
        debug!("QRZ lookup for {} (as {})", call_sign, call);

        match self.fetch(&[("s", key.as_str()), ("callsign", call)]).await {
            Ok(db) => {
                let outcome = classify(db);
                if outcome == LookupOutcome::SessionExpired {
                    self.session_key = None;
                }
                outcome
            }
            Err(e) => LookupOutcome::ServiceError(e.to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct QrzDatabase {
    #[serde(rename = "Callsign")]
    callsign: Option<QrzCallsign>,
    #[serde(rename = "Session")]
    session: Option<QrzSession>,
}

#[derive(Debug, Default, Deserialize)]
struct QrzSession {
    #[serde(rename = "Key")]
    key: Option<String>,
    #[serde(rename = "Error")]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct QrzCallsign {
    call: Option<String>,
    fname: Option<String>,
    name: Option<String>,
    addr2: Option<String>,
    state: Option<String>,
    country: Option<String>,
    grid: Option<String>,
    lat: Option<String>,
    lon: Option<String>,
    cqzone: Option<String>,
    ituzone: Option<String>,
}

fn parse_response(body: &str) -> Result<QrzDatabase, CallbookError> {
    Ok(quick_xml::de::from_str(body)?)
}

/// Turn a decoded response into a lookup outcome.
fn classify(db: QrzDatabase) -> LookupOutcome {
    if let Some(error) = db.session.as_ref().and_then(|s| s.error.as_deref()) {
        if error.contains("Session Timeout") || error.contains("Invalid session key") {
            return LookupOutcome::SessionExpired;
        }
        if error.to_ascii_lowercase().contains("not found") {
            return LookupOutcome::NotFound;
        }
        return LookupOutcome::ServiceError(error.to_string());
    }

    match db.callsign {
        Some(data) => LookupOutcome::Found(data.into_record()),
        None => LookupOutcome::ServiceError("response carried no callsign data".to_string()),
    }
}

impl QrzCallsign {
    fn into_record(self) -> StationRecord {
        let name = match (self.fname, self.name) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            (first, last) => first.or(last),
        };

        StationRecord {
            call_sign: self.call.unwrap_or_default(),
            grid: non_empty(self.grid),
            latitude: self.lat.and_then(|v| v.trim().parse().ok()),
            longitude: self.lon.and_then(|v| v.trim().parse().ok()),
            state: non_empty(self.state),
            country: non_empty(self.country),
            cq_zone: self.cqzone.and_then(|v| v.trim().parse().ok()),
            itu_zone: self.ituzone.and_then(|v| v.trim().parse().ok()),
            name,
            city: non_empty(self.addr2),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
