//! Outbound webhook transport for scheduled messages.
//!
//! This crate resolves a session identifier to a delivery URL through a
//! `DeliveryTable` and posts the message body as JSON. The scheduler treats
//! it as a fire-and-forget transport: any non-2xx response is surfaced as an
//! error so the caller can retry on its next pass.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the delivery table and the send path.
#[derive(Debug, Error)]
pub enum SendMessageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid routes file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no delivery route for session {0}")]
    NoRoute(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("delivery endpoint returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Maps session identifiers to webhook URLs, with an optional default.
///
/// Routes come from a JSON object file (`{"session": "https://..."}`); the
/// default URL catches sessions without an explicit route.
#[derive(Debug, Clone, Default)]
pub struct DeliveryTable {
    routes: HashMap<String, String>,
    default_url: Option<String>,
}

impl DeliveryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from the environment and an optional routes file.
    ///
    /// `MESSAGE_WEBHOOK_URL` provides the default URL when set and non-empty.
    pub fn from_env(routes_path: Option<&Path>) -> Result<Self, SendMessageError> {
        dotenvy::dotenv().ok();

        let mut table = Self::new();
        if let Some(path) = routes_path {
            let raw = fs::read_to_string(path)?;
            table.routes = serde_json::from_str(&raw)?;
        }
        table.default_url = std::env::var("MESSAGE_WEBHOOK_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Ok(table)
    }

    pub fn insert(&mut self, session_id: impl Into<String>, url: impl Into<String>) {
        self.routes.insert(session_id.into(), url.into());
    }

    pub fn set_default_url(&mut self, url: impl Into<String>) {
        self.default_url = Some(url.into());
    }

    /// Resolve the delivery URL for a session, falling back to the default.
    pub fn resolve(&self, session_id: &str) -> Option<&str> {
        self.routes
            .get(session_id)
            .or(self.default_url.as_ref())
            .map(String::as_str)
    }
}

/// A single outbound delivery request.
#[derive(Debug, Clone)]
pub struct SendMessageParams {
    /// Session the message is addressed to; also the route lookup key.
    pub target: String,
    /// Message body to deliver.
    pub text: String,
}

/// Outcome of a successful delivery.
#[derive(Debug, Clone)]
pub struct SendResponse {
    pub status: u16,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    session: &'a str,
    text: &'a str,
}

/// Deliver one message to the URL resolved for its target session.
pub fn send_message(
    table: &DeliveryTable,
    params: &SendMessageParams,
) -> Result<SendResponse, SendMessageError> {
    let url = table
        .resolve(&params.target)
        .ok_or_else(|| SendMessageError::NoRoute(params.target.clone()))?;

    let payload = WebhookPayload {
        session: &params.target,
        text: &params.text,
    };

    let client = reqwest::blocking::Client::new();
    let response = client.post(url).json(&payload).send()?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(SendMessageError::Api {
            status: status.as_u16(),
            body,
        });
    }

    Ok(SendResponse {
        status: status.as_u16(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_server(test_name: &str) -> Option<mockito::ServerGuard> {
        let server = std::panic::catch_unwind(|| mockito::Server::new());
        match server {
            Ok(server) => Some(server),
            Err(_) => {
                eprintln!(
                    "Skipping {test_name}; unable to start mockito server in this environment."
                );
                None
            }
        }
    }

    #[test]
    fn send_posts_json_to_resolved_route() {
        let Some(mut server) = start_server("send_posts_json_to_resolved_route") else {
            return;
        };
        let mock = server
            .mock("POST", "/hook")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::JsonString(
                r#"{"session":"s1","text":"hello"}"#.to_string(),
            ))
            .with_status(200)
            .create();

        let mut table = DeliveryTable::new();
        table.insert("s1", format!("{}/hook", server.url()));

        let params = SendMessageParams {
            target: "s1".to_string(),
            text: "hello".to_string(),
        };
        let response = send_message(&table, &params).expect("delivery should succeed");
        assert_eq!(response.status, 200);
        mock.assert();
    }

    #[test]
    fn non_success_status_is_an_api_error() {
        let Some(mut server) = start_server("non_success_status_is_an_api_error") else {
            return;
        };
        server
            .mock("POST", "/hook")
            .with_status(503)
            .with_body("overloaded")
            .create();

        let mut table = DeliveryTable::new();
        table.insert("s1", format!("{}/hook", server.url()));

        let params = SendMessageParams {
            target: "s1".to_string(),
            text: "hello".to_string(),
        };
        match send_message(&table, &params) {
            Err(SendMessageError::Api { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn missing_route_is_reported_without_a_request() {
        let table = DeliveryTable::new();
        let params = SendMessageParams {
            target: "nobody".to_string(),
            text: "hello".to_string(),
        };
        match send_message(&table, &params) {
            Err(SendMessageError::NoRoute(session)) => assert_eq!(session, "nobody"),
            other => panic!("expected NoRoute error, got {other:?}"),
        }
    }

    #[test]
    fn default_url_catches_unrouted_sessions() {
        let Some(mut server) = start_server("default_url_catches_unrouted_sessions") else {
            return;
        };
        let mock = server.mock("POST", "/default").with_status(200).create();

        let mut table = DeliveryTable::new();
        table.set_default_url(format!("{}/default", server.url()));

        let params = SendMessageParams {
            target: "unrouted".to_string(),
            text: "fallback".to_string(),
        };
        send_message(&table, &params).expect("default route should deliver");
        mock.assert();
    }

    #[test]
    fn routes_file_round_trips_through_from_env() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("routes.json");
        std::fs::write(
            &path,
            r#"{"s1": "http://localhost:1/a", "s2": "http://localhost:1/b"}"#,
        )
        .expect("write routes file");

        let table = DeliveryTable::from_env(Some(path.as_path())).expect("routes file should parse");
        assert_eq!(table.resolve("s1"), Some("http://localhost:1/a"));
        assert_eq!(table.resolve("s2"), Some("http://localhost:1/b"));
    }
}
