//! HTTP clients for the backend flowsheet API and show control
//!
//! Thin reqwest wrappers behind the `FlowsheetApi` and `ShowControl` traits.
//! Non-2xx responses are decoded from the backend's `ErrorResponse` body into
//! `Error::BackendRequest` so the reconciliation engine can roll back and the
//! renderer surface can relay the backend's machine-readable code.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use wfsh_common::api::ErrorResponse;
use wfsh_common::model::{EntryFieldUpdate, EntryId, RawEntry, ShowId};

use crate::backend::api::{FlowsheetApi, OnAirStatus, ShowControl};
use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("wfsh-console/", env!("CARGO_PKG_VERSION"));

/// Backend flowsheet REST client.
pub struct HttpFlowsheetApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFlowsheetApi {
    /// Build a client for the backend at `base_url`.
    ///
    /// The timeout bounds each individual request; the engine applies its own
    /// settlement timeout on top.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("building HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl FlowsheetApi for HttpFlowsheetApi {
    async fn fetch_page(
        &self,
        show_id: Option<ShowId>,
        page: u32,
        limit: u32,
    ) -> Result<Vec<RawEntry>> {
        let mut url = format!(
            "{}/api/v1/flowsheet?page={}&limit={}",
            self.base_url, page, limit
        );
        if let Some(show) = show_id {
            url.push_str(&format!("&show_id={show}"));
        }

        debug!(page, limit, "Fetching flowsheet page");

        let response = self.client.get(&url).send().await.map_err(transport)?;
        expect_json(response).await
    }

    async fn create_entry(&self, entry: RawEntry) -> Result<RawEntry> {
        let url = format!("{}/api/v1/flowsheet", self.base_url);

        debug!("Creating flowsheet entry");

        let response = self
            .client
            .post(&url)
            .json(&entry)
            .send()
            .await
            .map_err(transport)?;
        expect_json(response).await
    }

    async fn update_entry(&self, id: EntryId, update: EntryFieldUpdate) -> Result<RawEntry> {
        let url = format!("{}/api/v1/flowsheet/{}", self.base_url, id);

        debug!(entry_id = id, field = update.field_name(), "Updating entry field");

        let response = self
            .client
            .patch(&url)
            .json(&update)
            .send()
            .await
            .map_err(transport)?;
        expect_json(response).await
    }

    async fn delete_entry(&self, id: EntryId) -> Result<()> {
        let url = format!("{}/api/v1/flowsheet/{}", self.base_url, id);

        debug!(entry_id = id, "Deleting flowsheet entry");

        let response = self.client.delete(&url).send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(backend_error(status.as_u16(), &body));
        }

        Ok(())
    }

    async fn reorder_entry(&self, id: EntryId, new_play_order: i64) -> Result<RawEntry> {
        let url = format!("{}/api/v1/flowsheet/{}/play-order", self.base_url, id);

        debug!(entry_id = id, new_play_order, "Reordering flowsheet entry");

        let response = self
            .client
            .put(&url)
            .json(&serde_json::json!({ "play_order": new_play_order }))
            .send()
            .await
            .map_err(transport)?;
        expect_json(response).await
    }
}

/// Show-control REST client.
pub struct HttpShowControl {
    client: reqwest::Client,
    base_url: String,
}

impl HttpShowControl {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("building HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ShowControl for HttpShowControl {
    async fn current_show(&self) -> Result<OnAirStatus> {
        let url = format!("{}/api/v1/onair", self.base_url);

        let response = self.client.get(&url).send().await.map_err(transport)?;
        expect_json(response).await
    }
}

fn transport(e: reqwest::Error) -> Error {
    Error::backend_transport(e.to_string())
}

/// Decode a 2xx JSON body, or map an error response onto `Error`.
async fn expect_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(backend_error(status.as_u16(), &body));
    }

    response
        .json()
        .await
        .map_err(|e| Error::backend_transport(format!("decoding backend response: {e}")))
}

/// Map a non-2xx body onto `Error::BackendRequest`.
///
/// The backend answers errors with an `ErrorResponse` JSON body; anything
/// else (proxy error pages, empty bodies) falls back to a generic code.
fn backend_error(status: u16, body: &str) -> Error {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(parsed) => Error::backend(status, parsed.error, parsed.message),
        Err(_) => {
            let trimmed = body.trim();
            let message = if trimmed.is_empty() {
                format!("HTTP {status}")
            } else {
                trimmed.to_string()
            };
            Error::backend(status, "http_error", message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let client = HttpFlowsheetApi::new("http://127.0.0.1:5880", Duration::from_secs(5));
        assert!(client.is_ok());
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client =
            HttpFlowsheetApi::new("http://127.0.0.1:5880/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:5880");
    }

    #[test]
    fn structured_error_body_is_decoded() {
        let body = r#"{"error":"invalid_field","message":"Field is not editable"}"#;

        match backend_error(422, body) {
            Error::BackendRequest {
                status,
                code,
                message,
            } => {
                assert_eq!(status, Some(422));
                assert_eq!(code, "invalid_field");
                assert_eq!(message, "Field is not editable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_json_error_body_falls_back_to_raw_text() {
        match backend_error(502, "<html>Bad Gateway</html>") {
            Error::BackendRequest { status, code, message } => {
                assert_eq!(status, Some(502));
                assert_eq!(code, "http_error");
                assert_eq!(message, "<html>Bad Gateway</html>");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_error_body_reports_status() {
        match backend_error(500, "  ") {
            Error::BackendRequest { message, .. } => assert_eq!(message, "HTTP 500"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
