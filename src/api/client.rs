//! API client for the attendance service.
//!
//! Login talks to the network directly; the attendance mutations and
//! the record history are built as request snapshots so the cache
//! manager can route them through its strategies and queue them for
//! replay when the network is down.

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::{header, Client, StatusCode};
use tracing::debug;

use crate::auth::SessionData;
use crate::cache::{RequestSnapshot, ResponseSnapshot};
use crate::models::{AttendanceRecord, RecordType, TokenResponse};

use super::ApiError;

/// Attendance API client.
/// Clone is cheap - reqwest::Client shares its connection pool.
#[derive(Clone)]
pub struct AttendanceApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl AttendanceApi {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client,
            base_url,
            token: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Exchange credentials for a bearer token at `POST /token`.
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionData> {
        let url = format!("{}/token", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .context("Failed to send login request")?;

        let response = check_response(response).await?;
        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;
        debug!(username, "Login succeeded");

        Ok(SessionData {
            token: token.access_token,
            username: username.to_string(),
            created_at: Utc::now(),
        })
    }

    fn bearer(&self) -> Result<(String, String), ApiError> {
        let token = self.token.as_ref().ok_or(ApiError::Unauthorized)?;
        Ok((
            header::AUTHORIZATION.to_string(),
            format!("Bearer {}", token),
        ))
    }

    /// Build the check-in or check-out mutation as a replayable snapshot.
    pub fn mutation_request(&self, kind: RecordType) -> Result<RequestSnapshot, ApiError> {
        Ok(RequestSnapshot {
            method: "POST".to_string(),
            url: format!("{}{}", self.base_url, kind.path()),
            headers: vec![self.bearer()?],
            body: None,
        })
    }

    /// Build the record-history request as a snapshot.
    pub fn records_request(&self) -> Result<RequestSnapshot, ApiError> {
        Ok(RequestSnapshot {
            method: "GET".to_string(),
            url: format!("{}/attendance-records", self.base_url),
            headers: vec![self.bearer()?],
            body: None,
        })
    }

    /// Decode the record history out of a (possibly cached) response.
    pub fn parse_records(&self, response: &ResponseSnapshot) -> Result<Vec<AttendanceRecord>> {
        if !response.is_success() {
            let status = StatusCode::from_u16(response.status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return Err(ApiError::from_status(status, &response.body_text()).into());
        }
        serde_json::from_slice(&response.body).context("Failed to parse attendance records")
    }
}

async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body).into())
    }
}
