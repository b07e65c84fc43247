pub mod errors;
#[cfg(test)]
pub(crate) mod fake;
pub mod models;

use std::{fmt, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{credentials::Credentials, readings::Reading};

pub use self::errors::CloudError;
use self::models::{
    ErrorBody, PairRequest, PairResponse, ReadingsRequest, StatusResponse, UnpairRequest,
};

pub const DEFAULT_API_URL: &str = "https://green-energy-topaz.vercel.app";

/// Upper bound on a single call, request and response body included.
pub const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote operations the sync coordinator depends on.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Upload a batch of readings. Returns the server's acknowledgement.
    async fn post_readings(&self, readings: &[Reading]) -> Result<Value, CloudError>;

    /// Fetch the current recommendation, savings and tariff.
    async fn get_status(&self) -> Result<StatusResponse, CloudError>;

    /// Revoke this installation's token. `true` when the server confirmed.
    async fn unpair(&self) -> Result<bool, CloudError>;
}

/// HTTP client for the Green Energy cloud.
///
/// Stateless apart from the token and instance ID, which are set once by
/// [`pair`](Self::pair) or at construction. No call is retried here.
#[derive(Debug, Clone)]
pub struct GreenEnergyClient {
    inner: Arc<Inner>,
    timeout: Duration,
}

#[derive(Debug)]
struct Inner {
    http: Client,
    base_url: String,
    session: RwLock<Option<Session>>,
}

#[derive(Clone)]
struct Session {
    token: String,
    instance_id: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"**REDACTED**")
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

impl GreenEnergyClient {
    /// Unauthenticated client, ready for [`pair`](Self::pair).
    pub fn new(api_url: &str) -> Self {
        Self::build(api_url, None)
    }

    /// Client restored from previously paired credentials.
    pub fn with_credentials(credentials: &Credentials) -> Self {
        Self::build(
            &credentials.api_url,
            Some(Session {
                token: credentials.api_token.clone(),
                instance_id: credentials.instance_id.clone(),
            }),
        )
    }

    fn build(api_url: &str, session: Option<Session>) -> Self {
        Self {
            inner: Arc::new(Inner {
                http: Client::new(),
                base_url: api_url.trim_end_matches('/').to_owned(),
                session: RwLock::new(session),
            }),
            timeout: API_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.session.read().await.is_some()
    }

    /// Exchange a one-time pairing code for a long-lived token.
    ///
    /// On success the token and instance ID are kept for all later calls.
    ///
    /// | Response                         | Result                |
    /// |----------------------------------|-----------------------|
    /// | 200                              | `Ok(PairResponse)`    |
    /// | 400 `{"error":"invalid_code"}`   | `InvalidPairingCode`  |
    /// | 400 other payload                | `Api`                 |
    /// | 401                              | `InvalidPairingCode`  |
    /// | anything else                    | `Api`                 |
    /// | timeout / transport failure      | `CannotConnect`       |
    pub async fn pair(&self, pairing_code: &str) -> Result<PairResponse, CloudError> {
        let url = self.url("/api/ha/pair");
        debug!(url = %url, "Exchanging pairing code");

        let paired = self
            .timed(async {
                let resp = self
                    .request(Method::POST, url.as_str())
                    .await
                    .json(&PairRequest { pairing_code })
                    .send()
                    .await?;

                match resp.status() {
                    StatusCode::OK => Ok(resp.json::<PairResponse>().await?),
                    StatusCode::BAD_REQUEST => {
                        let body = resp.json::<ErrorBody>().await.unwrap_or_default();
                        match body.error.as_deref() {
                            Some("invalid_code") => Err(CloudError::InvalidPairingCode),
                            Some(other) => Err(CloudError::Api(other.to_owned())),
                            None => Err(CloudError::Api("Unknown error".to_owned())),
                        }
                    }
                    StatusCode::UNAUTHORIZED => Err(CloudError::InvalidPairingCode),
                    status => Err(unexpected(status)),
                }
            })
            .await?;

        *self.inner.session.write().await = Some(Session {
            token: paired.api_token.clone(),
            instance_id: paired.instance_id.clone(),
        });
        info!(instance_id = %paired.instance_id, "Paired with Green Energy cloud");

        Ok(paired)
    }

    /// Upload a batch of readings for this installation.
    pub async fn post_readings(&self, readings: &[Reading]) -> Result<Value, CloudError> {
        let session = self.session().await?;
        let url = self.url("/api/ha/readings");
        debug!(count = readings.len(), "Posting readings");

        self.timed(async {
            let resp = self
                .request(Method::POST, url.as_str())
                .await
                .json(&ReadingsRequest {
                    instance_id: &session.instance_id,
                    readings,
                })
                .send()
                .await?;
            Ok::<_, CloudError>(check(resp)?.json::<Value>().await?)
        })
        .await
    }

    /// Fetch current status; the instance ID travels as a query parameter.
    pub async fn get_status(&self) -> Result<StatusResponse, CloudError> {
        let session = self.session().await?;
        let url = Url::parse_with_params(
            &self.url("/api/ha/status"),
            &[("instance_id", session.instance_id.as_str())],
        )
        .map_err(|e| CloudError::Api(format!("invalid API URL: {e}")))?;
        debug!(url = %url, "Fetching status");

        self.timed(async {
            let resp = self.request(Method::GET, url.as_str()).await.send().await?;
            Ok::<_, CloudError>(check(resp)?.json::<StatusResponse>().await?)
        })
        .await
    }

    /// Revoke the token. Any status other than 200 or 401 yields `Ok(false)`.
    pub async fn unpair(&self) -> Result<bool, CloudError> {
        let session = self.session().await?;
        let url = self.url("/api/ha/unpair");
        debug!(instance_id = %session.instance_id, "Unpairing");

        self.timed(async {
            let resp = self
                .request(Method::POST, url.as_str())
                .await
                .json(&UnpairRequest {
                    instance_id: &session.instance_id,
                })
                .send()
                .await?;

            match resp.status() {
                StatusCode::UNAUTHORIZED => Err(invalid_token()),
                status => Ok(status == StatusCode::OK),
            }
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    /// Credentials for authenticated calls; fails without touching the network.
    async fn session(&self) -> Result<Session, CloudError> {
        self.inner
            .session
            .read()
            .await
            .clone()
            .ok_or_else(|| CloudError::Authentication("not authenticated".to_owned()))
    }

    async fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self
            .inner
            .http
            .request(method, url)
            .header(header::ACCEPT, "application/json");

        match self.inner.session.read().await.as_ref() {
            Some(session) => builder.bearer_auth(&session.token),
            None => builder,
        }
    }

    async fn timed<T>(
        &self,
        call: impl Future<Output = Result<T, CloudError>>,
    ) -> Result<T, CloudError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| CloudError::CannotConnect("request timed out".to_owned()))?
    }
}

#[async_trait]
impl CloudApi for GreenEnergyClient {
    async fn post_readings(&self, readings: &[Reading]) -> Result<Value, CloudError> {
        GreenEnergyClient::post_readings(self, readings).await
    }

    async fn get_status(&self) -> Result<StatusResponse, CloudError> {
        GreenEnergyClient::get_status(self).await
    }

    async fn unpair(&self) -> Result<bool, CloudError> {
        GreenEnergyClient::unpair(self).await
    }
}

/// Status mapping shared by the authenticated data calls.
fn check(resp: Response) -> Result<Response, CloudError> {
    match resp.status() {
        StatusCode::OK => Ok(resp),
        StatusCode::UNAUTHORIZED => Err(invalid_token()),
        status => Err(unexpected(status)),
    }
}

fn invalid_token() -> CloudError {
    CloudError::Authentication("invalid or expired token".to_owned())
}

fn unexpected(status: StatusCode) -> CloudError {
    CloudError::Api(format!("API returned status {}", status.as_u16()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use mockito::{Matcher, Server};
    use serde_json::{json, Map};

    use super::*;

    fn credentials(api_url: &str) -> Credentials {
        Credentials {
            api_token: "t1".to_owned(),
            instance_id: "i1".to_owned(),
            user_email: "a@b.com".to_owned(),
            api_url: api_url.to_owned(),
        }
    }

    fn reading(state: &str) -> Reading {
        Reading {
            entity_id: "sensor.solar_power".to_owned(),
            state: state.to_owned(),
            attributes: Map::new(),
            timestamp: Utc::now(),
        }
    }

    // -----------------------------------------------------------------------
    // pair
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn pair_success_stores_session() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/ha/pair")
            .match_body(Matcher::Json(json!({ "pairing_code": "123456" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "api_token": "t1", "instance_id": "i1", "user_email": "a@b.com" })
                    .to_string(),
            )
            .create_async()
            .await;

        let client = GreenEnergyClient::new(&server.url());
        assert!(!client.is_authenticated().await);

        let paired = client.pair("123456").await.unwrap();
        assert_eq!(paired.api_token, "t1");
        assert_eq!(paired.instance_id, "i1");
        assert_eq!(paired.user_email.as_deref(), Some("a@b.com"));
        assert!(client.is_authenticated().await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn pair_invalid_code_on_400() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/ha/pair")
            .with_status(400)
            .with_body(json!({ "error": "invalid_code" }).to_string())
            .create_async()
            .await;

        let client = GreenEnergyClient::new(&server.url());
        assert_eq!(
            client.pair("000000").await,
            Err(CloudError::InvalidPairingCode)
        );
        assert!(!client.is_authenticated().await);
    }

    #[tokio::test]
    async fn pair_other_400_payload_is_api_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/ha/pair")
            .with_status(400)
            .with_body(json!({ "error": "rate_limited" }).to_string())
            .create_async()
            .await;

        let client = GreenEnergyClient::new(&server.url());
        assert_eq!(
            client.pair("123456").await,
            Err(CloudError::Api("rate_limited".to_owned()))
        );
    }

    #[tokio::test]
    async fn pair_401_is_invalid_code() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/ha/pair")
            .with_status(401)
            .create_async()
            .await;

        let client = GreenEnergyClient::new(&server.url());
        assert_eq!(
            client.pair("123456").await,
            Err(CloudError::InvalidPairingCode)
        );
    }

    #[tokio::test]
    async fn pair_server_error_is_api_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/ha/pair")
            .with_status(500)
            .create_async()
            .await;

        let client = GreenEnergyClient::new(&server.url());
        assert!(matches!(
            client.pair("123456").await,
            Err(CloudError::Api(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_cannot_connect() {
        let client = GreenEnergyClient::new("http://127.0.0.1:1");
        assert!(matches!(
            client.pair("123456").await,
            Err(CloudError::CannotConnect(_))
        ));
    }

    #[tokio::test]
    async fn slow_response_times_out_as_cannot_connect() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/ha/pair")
            .with_status(200)
            .with_chunked_body(|w| {
                std::thread::sleep(std::time::Duration::from_millis(500));
                std::io::Write::write_all(w, b"{}")
            })
            .create_async()
            .await;

        let client =
            GreenEnergyClient::new(&server.url()).with_timeout(Duration::from_millis(50));
        assert_eq!(
            client.pair("123456").await,
            Err(CloudError::CannotConnect("request timed out".to_owned()))
        );
    }

    // -----------------------------------------------------------------------
    // post_readings
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn post_readings_requires_authentication() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/ha/readings")
            .expect(0)
            .create_async()
            .await;

        let client = GreenEnergyClient::new(&server.url());
        let result = client.post_readings(&[reading("1")]).await;

        assert!(matches!(result, Err(CloudError::Authentication(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn post_readings_sends_instance_and_bearer_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/ha/readings")
            .match_header("authorization", "Bearer t1")
            .match_body(Matcher::PartialJson(json!({
                "instance_id": "i1",
                "readings": [{ "entity_id": "sensor.solar_power", "state": "1520" }]
            })))
            .with_status(200)
            .with_body(json!({ "accepted": 1 }).to_string())
            .create_async()
            .await;

        let client = GreenEnergyClient::with_credentials(&credentials(&server.url()));
        let ack = client.post_readings(&[reading("1520")]).await.unwrap();

        assert_eq!(ack["accepted"], 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn post_readings_401_is_authentication_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/ha/readings")
            .with_status(401)
            .create_async()
            .await;

        let client = GreenEnergyClient::with_credentials(&credentials(&server.url()));
        assert!(matches!(
            client.post_readings(&[reading("1")]).await,
            Err(CloudError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn post_readings_server_error_is_api_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/ha/readings")
            .with_status(502)
            .create_async()
            .await;

        let client = GreenEnergyClient::with_credentials(&credentials(&server.url()));
        assert_eq!(
            client.post_readings(&[reading("1")]).await,
            Err(CloudError::Api("API returned status 502".to_owned()))
        );
    }

    // -----------------------------------------------------------------------
    // get_status
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn get_status_passes_instance_id_as_query() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/ha/status")
            .match_query(Matcher::UrlEncoded("instance_id".into(), "i1".into()))
            .match_header("authorization", "Bearer t1")
            .with_status(200)
            .with_body(
                json!({
                    "recommendation": "Export to grid",
                    "savings_today_pence": 1234,
                    "current_rate_pence": 24.5
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = GreenEnergyClient::with_credentials(&credentials(&server.url()));
        let status = client.get_status().await.unwrap();

        assert_eq!(status.recommendation.as_deref(), Some("Export to grid"));
        assert_eq!(status.savings_today_pence, Some(1234));
        assert_eq!(status.current_rate_pence, Some(24.5));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn get_status_401_is_authentication_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/ha/status")
            .match_query(Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let client = GreenEnergyClient::with_credentials(&credentials(&server.url()));
        assert_eq!(
            client.get_status().await,
            Err(CloudError::Authentication("invalid or expired token".to_owned()))
        );
    }

    #[tokio::test]
    async fn get_status_malformed_body_is_api_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/ha/status")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let client = GreenEnergyClient::with_credentials(&credentials(&server.url()));
        assert!(matches!(
            client.get_status().await,
            Err(CloudError::Api(_))
        ));
    }

    // -----------------------------------------------------------------------
    // unpair
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn unpair_true_on_200() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/ha/unpair")
            .match_body(Matcher::Json(json!({ "instance_id": "i1" })))
            .with_status(200)
            .create_async()
            .await;

        let client = GreenEnergyClient::with_credentials(&credentials(&server.url()));
        assert_eq!(client.unpair().await, Ok(true));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unpair_false_on_other_status() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/ha/unpair")
            .with_status(404)
            .create_async()
            .await;

        let client = GreenEnergyClient::with_credentials(&credentials(&server.url()));
        assert_eq!(client.unpair().await, Ok(false));
    }

    #[tokio::test]
    async fn unpair_401_is_authentication_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/ha/unpair")
            .with_status(401)
            .create_async()
            .await;

        let client = GreenEnergyClient::with_credentials(&credentials(&server.url()));
        assert!(matches!(
            client.unpair().await,
            Err(CloudError::Authentication(_))
        ));
    }

    #[test]
    fn trailing_slash_is_stripped_from_base_url() {
        let client = GreenEnergyClient::new("https://example.test/");
        assert_eq!(client.base_url(), "https://example.test");
    }

    #[test]
    fn session_debug_hides_token() {
        let session = Session {
            token: "super-secret".to_owned(),
            instance_id: "i1".to_owned(),
        };
        let printed = format!("{session:?}");
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("i1"));
    }
}
