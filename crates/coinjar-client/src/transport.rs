//! Network access to the ledger API.
//!
//! [`LedgerTransport`] returns raw response bodies. Interpreting them (and
//! deciding whether a body is well-formed) is left to the session and the
//! poller, which treat a missing numeric field as a failure of its own kind.

use std::time::Duration;

use async_trait::async_trait;
use coinjar_core::{Amount, DeviceId};
use serde_json::{Value, json};

use crate::error::TransportError;

/// The four ledger calls a client can make.
#[async_trait]
pub trait LedgerTransport: Send + Sync {
    /// `POST /api/savings`; returns the decoded JSON body.
    async fn increment(
        &self,
        device_id: &DeviceId,
        amount: Amount,
        request_id: &str,
    ) -> Result<Value, TransportError>;

    /// `POST /api/reset`; returns the decoded JSON body.
    async fn reset(&self, device_id: &DeviceId, request_id: &str) -> Result<Value, TransportError>;

    /// `GET /api/device`; returns the decoded JSON body.
    async fn state(&self, device_id: &DeviceId) -> Result<Value, TransportError>;

    /// `GET /api/latest-savings`; returns the raw text body.
    async fn version(&self, device_id: &DeviceId) -> Result<String, TransportError>;
}

/// [`LedgerTransport`] over HTTP using reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the server at `base_url`.
    ///
    /// `timeout` bounds each request end to end.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Read a response body, failing on non-success statuses.
    async fn read_text(response: reqwest::Response) -> Result<String, TransportError> {
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    /// Decode a JSON body. An empty body decodes as `{}`.
    async fn read_json(response: reqwest::Response) -> Result<Value, TransportError> {
        let text = Self::read_text(response).await?;
        if text.trim().is_empty() {
            return Ok(json!({}));
        }
        serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl LedgerTransport for HttpTransport {
    async fn increment(
        &self,
        device_id: &DeviceId,
        amount: Amount,
        request_id: &str,
    ) -> Result<Value, TransportError> {
        let response = self
            .client
            .post(self.url("/api/savings"))
            .json(&json!({
                "deviceId": device_id,
                "amount": amount,
                "requestId": request_id,
            }))
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn reset(&self, device_id: &DeviceId, request_id: &str) -> Result<Value, TransportError> {
        let response = self
            .client
            .post(self.url("/api/reset"))
            .json(&json!({
                "deviceId": device_id,
                "requestId": request_id,
            }))
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn state(&self, device_id: &DeviceId) -> Result<Value, TransportError> {
        let response = self
            .client
            .get(self.url("/api/device"))
            .query(&[("deviceId", device_id.as_str())])
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn version(&self, device_id: &DeviceId) -> Result<String, TransportError> {
        let response = self
            .client
            .get(self.url("/api/latest-savings"))
            .query(&[("deviceId", device_id.as_str())])
            .send()
            .await?;
        Self::read_text(response).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use super::*;
    use coinjar_serve::{AppState, Config, router};

    /// Start a ledger server on an ephemeral port and return its base URL.
    pub(crate) async fn spawn_server() -> String {
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(AppState::new(Config::default()));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    pub(crate) async fn http_transport() -> Arc<HttpTransport> {
        let base = spawn_server().await;
        Arc::new(HttpTransport::new(&format!("{base}/"), Duration::from_secs(5)).unwrap())
    }

    fn device(id: &str) -> DeviceId {
        DeviceId::parse(id).unwrap()
    }

    #[test]
    fn base_url_trailing_slash_stripped() {
        let transport = HttpTransport::new("http://localhost:3000/", Duration::from_secs(1)).unwrap();
        assert_eq!(transport.base_url(), "http://localhost:3000");
        assert_eq!(transport.url("/api/device"), "http://localhost:3000/api/device");
    }

    #[tokio::test]
    async fn round_trips_against_server() {
        let transport = http_transport().await;
        let d = device("http-1");

        let body = transport
            .increment(&d, Amount::new(100.0).unwrap(), "r1")
            .await
            .unwrap();
        assert_eq!(body["total"], 100);
        assert_eq!(body["version"], 1);

        let body = transport.reset(&d, "r2").await.unwrap();
        assert_eq!(body["total"], 0);
        assert_eq!(body["version"], 2);

        let state = transport.state(&d).await.unwrap();
        assert_eq!(state["total"], 0);
        assert_eq!(state["version"], 2);

        assert_eq!(transport.version(&d).await.unwrap(), "2");
    }

    #[tokio::test]
    async fn device_ids_are_query_encoded() {
        let transport = http_transport().await;
        let d = device("desk & kitchen/1");
        transport.increment(&d, Amount::new(5.0).unwrap(), "r1").await.unwrap();
        let state = transport.state(&d).await.unwrap();
        assert_eq!(state["deviceId"], "desk & kitchen/1");
        assert_eq!(state["total"], 5);
    }

    #[tokio::test]
    async fn error_statuses_surface_as_status_errors() {
        let transport = http_transport().await;
        let d = device("conflict");
        transport.increment(&d, Amount::new(5.0).unwrap(), "same").await.unwrap();
        let err = transport.reset(&d, "same").await.unwrap_err();
        match err {
            TransportError::Status { status, body } => {
                assert_eq!(status, 409);
                assert!(body.contains("conflict"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn session_and_poller_share_a_device() {
        use crate::poller::{PollOutcome, VersionPoller};
        use crate::session::SyncSession;

        let transport = http_transport().await;
        let d = device("jar-7");
        let session = SyncSession::new(d.clone(), transport.clone());
        let mut poller = VersionPoller::new(d, transport);

        assert!(session.increment(100.0).await.is_success());
        assert!(session.increment(49.5).await.is_success());
        assert!(session.increment(0.5).await.is_success());
        assert_eq!(session.total(), 150.0);
        assert_eq!(session.version(), Some(3));

        match poller.poll_once().await.unwrap() {
            PollOutcome::Advanced { state, .. } => assert_eq!(state.total, 150.0),
            other => panic!("expected advance, got {other:?}"),
        }
        assert_eq!(poller.poll_once().await.unwrap(), PollOutcome::Unchanged { version: 3 });

        assert!(session.reset().await.is_success());
        assert_eq!(session.total(), 0.0);
        match poller.poll_once().await.unwrap() {
            PollOutcome::Advanced { previous, state } => {
                assert_eq!(previous, Some(3));
                assert_eq!(state.total, 0.0);
                assert_eq!(state.version, 4);
            }
            other => panic!("expected advance, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connection_refused_is_http_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        let err = transport.state(&device("d")).await.unwrap_err();
        assert!(matches!(err, TransportError::Http(_)));
    }
}
