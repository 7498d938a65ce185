#![forbid(unsafe_code)]

use crate::error::SyncError;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque session credential attached to every remote call. Acquiring it is
/// the authentication collaborator's business; see [`exchange_token`] for the
/// token-for-cookie exchange the sync path performs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(..)")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEvent {
    pub id: String,
    pub name: String,
    pub place: String,
    pub organizer_name: String,
    pub start_time: i64,
    pub end_time: i64,
}

/// A roster entry as the server sends it. `id` is the attendee code; the
/// owning event comes from the request path, not the payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAttendee {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub plusid: Option<String>,
    pub checkin_time: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckinRequest<'a> {
    event_id: &'a str,
    attendee_code: &'a str,
    revert: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckinResponse {
    checkin_time: i64,
}

/// The remote service contract. The engine only sees this trait; tests plug
/// in an in-memory fake.
pub trait EventService {
    /// Sends one check-in state change; the reply carries the authoritative
    /// check-in time, `0` meaning "not checked in".
    fn post_checkin(&self, event_id: &str, code: &str, revert: bool) -> Result<i64, SyncError>;

    fn list_events(&self) -> Result<Vec<RemoteEvent>, SyncError>;

    fn list_attendees(&self, event_id: &str) -> Result<Vec<RemoteAttendee>, SyncError>;
}

/// Batch-resolves social-profile ids to image URLs, one round trip for the
/// whole roster. Ids missing from the result simply stay without an image.
pub trait ProfileResolver {
    fn resolve(&self, ids: &[String]) -> Result<HashMap<String, String>, SyncError>;
}

/// Resolver for accounts without a social-profile integration.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProfileResolver;

impl ProfileResolver for NoopProfileResolver {
    fn resolve(&self, _ids: &[String]) -> Result<HashMap<String, String>, SyncError> {
        Ok(HashMap::new())
    }
}

trait WithSession {
    fn with_session(self, credential: &Credential) -> Self;
}

impl WithSession for RequestBuilder {
    fn with_session(self, credential: &Credential) -> Self {
        self.header(header::COOKIE, credential.as_str())
    }
}

/// Blocking HTTP implementation of the remote contract. Calls are sequential
/// by design; the engine never fans out.
pub struct HttpEventService {
    client: Client,
    base: String,
    credential: Credential,
}

impl HttpEventService {
    pub fn new(base: impl Into<String>, credential: Credential) -> Result<Self, SyncError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base: normalize_base(base.into()),
            credential,
        })
    }

    /// Deserializes a JSON array, tolerating the server's literal `null` for
    /// an empty list.
    fn fetch_array<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<Vec<T>, SyncError> {
        let response = self.client.get(url).with_session(&self.credential).send()?;
        let response = check_status(response)?;
        let body: Option<Vec<T>> = response.json()?;
        Ok(body.unwrap_or_default())
    }
}

impl EventService for HttpEventService {
    fn post_checkin(&self, event_id: &str, code: &str, revert: bool) -> Result<i64, SyncError> {
        let response = self
            .client
            .post(format!("{}/checkin", self.base))
            .with_session(&self.credential)
            .json(&CheckinRequest {
                event_id,
                attendee_code: code,
                revert,
            })
            .send()?;
        let response = check_status(response)?;
        let body: CheckinResponse = response.json()?;
        Ok(body.checkin_time)
    }

    fn list_events(&self) -> Result<Vec<RemoteEvent>, SyncError> {
        self.fetch_array(format!("{}/events", self.base))
    }

    fn list_attendees(&self, event_id: &str) -> Result<Vec<RemoteAttendee>, SyncError> {
        self.fetch_array(format!("{}/events/{event_id}/attendees", self.base))
    }
}

fn check_status(response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(SyncError::Auth(format!("{status}: {message}")))
    } else {
        Err(SyncError::Remote(format!("{status}: {message}")))
    }
}

fn normalize_base(base: String) -> String {
    base.trim_end_matches('/').to_string()
}

/// Exchanges an auth token for the session cookie the other endpoints
/// expect. The login endpoint answers a valid token with a redirect carrying
/// the session in `Set-Cookie`; any other status is an auth failure.
pub fn exchange_token(base: &str, auth_token: &str) -> Result<Credential, SyncError> {
    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let base = base.trim_end_matches('/');
    let response = client
        .get(format!(
            "{base}/_ah/login?continue=http://localhost/&auth={auth_token}"
        ))
        .send()?;
    if response.status() != StatusCode::FOUND {
        return Err(SyncError::Auth(format!(
            "login did not redirect (status {})",
            response.status()
        )));
    }
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| SyncError::Auth("login redirect carried no cookie".to_string()))?;
    if !cookie.contains("SACSID") {
        return Err(SyncError::Auth(
            "login cookie is not a session cookie".to_string(),
        ));
    }
    Ok(Credential::new(cookie))
}
