use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use jiff::{SignedDuration, Timestamp};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ReportError, ReportRow, ReportingSink};
use crate::config::ReportingConfig;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const VALUE_INPUT: (&str, &str) = ("valueInputOption", "USER_ENTERED");

/// Tokens are refreshed this long before Google says they expire.
const TOKEN_SLACK: SignedDuration = SignedDuration::from_secs(60);

const HEADER_ROW: [&str; 6] = [
    "Timestamp",
    "Prefix",
    "Pack Count",
    "Status Code",
    "Weight (g)",
    "Status",
];

/// The parts of a Google service account key file we use.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_json(json: &[u8]) -> Result<Self, ReportError> {
        serde_json::from_slice(json).map_err(|e| ReportError::InvalidCredentials(e.to_string()))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, ReportError> {
        let json = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ReportError::InvalidCredentials(e.to_string()))?;
        Self::from_json(&json)
    }

    pub fn from_file(path: &Path) -> Result<Self, ReportError> {
        Self::from_json(&std::fs::read(path)?)
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct AccessToken {
    value: String,
    expires_at: Timestamp,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Appends accepted readings to a Google Sheets tab through the values API.
pub struct GoogleSheetsSink {
    client: Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    spreadsheet_id: String,
    sheet_name: String,
    api_base: String,
    token: Mutex<Option<AccessToken>>,
}

impl GoogleSheetsSink {
    pub fn new(
        key: ServiceAccountKey,
        spreadsheet_id: impl Into<String>,
        sheet_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ReportError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            key,
            encoding_key,
            spreadsheet_id: spreadsheet_id.into(),
            sheet_name: sheet_name.into(),
            api_base: SHEETS_API.to_string(),
            token: Mutex::new(None),
        })
    }

    /// Returns `Ok(None)` when the spreadsheet id or credentials are
    /// missing. A base64 key takes precedence over a key file.
    pub fn from_config(config: &ReportingConfig) -> Result<Option<Self>, ReportError> {
        let Some(spreadsheet_id) = config
            .spreadsheet_id
            .as_deref()
            .filter(|id| !id.is_empty())
        else {
            return Ok(None);
        };

        let key = match (&config.credentials_base64, &config.credentials_path) {
            (Some(encoded), _) if !encoded.is_empty() => ServiceAccountKey::from_base64(encoded)?,
            (_, Some(path)) => ServiceAccountKey::from_file(path)?,
            _ => return Ok(None),
        };

        Self::new(key, spreadsheet_id, &config.sheet_name, config.timeout()).map(Some)
    }

    /// Points the sink at a different Sheets endpoint.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn values_url(&self, range: &str) -> Result<Url, ReportError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| ReportError::InvalidCredentials(format!("bad endpoint: {e}")))?;

        url.path_segments_mut()
            .map_err(|_| ReportError::InvalidCredentials("bad endpoint".to_string()))?
            .pop_if_empty()
            .extend([self.spreadsheet_id.as_str(), "values", range]);

        Ok(url)
    }

    async fn access_token(&self) -> Result<String, ReportError> {
        let mut cached = self.token.lock().await;
        let now = Timestamp::now();

        if let Some(token) = cached.as_ref()
            && token.expires_at > now
        {
            return Ok(token.value.clone());
        }

        let issued_at = now.as_second();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: issued_at,
            exp: issued_at + 3600,
        };
        let assertion =
            jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)?;

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        let token: TokenResponse = check(response).await?.json().await?;

        let expires_at = now
            .checked_add(SignedDuration::from_secs(token.expires_in))
            .and_then(|t| t.checked_sub(TOKEN_SLACK));
        *cached = match expires_at {
            Ok(expires_at) => Some(AccessToken {
                value: token.access_token.clone(),
                expires_at,
            }),
            Err(e) => {
                warn!(
                    error = %e,
                    expires_in = token.expires_in,
                    "Token lifetime out of range, not caching"
                );
                None
            }
        };
        debug!(client_email = %self.key.client_email, "Obtained Sheets access token");

        Ok(token.access_token)
    }

    /// Writes the column headers when the first row of the sheet is empty.
    pub async fn ensure_header(&self) -> Result<(), ReportError> {
        let range = format!("{}!A1:F1", self.sheet_name);
        let url = self.values_url(&range)?;
        let token = self.access_token().await?;

        let response = self.client.get(url.clone()).bearer_auth(&token).send().await?;
        match check(response).await {
            Ok(response) => {
                let existing: ValueRange = response.json().await?;
                if !existing.values.is_empty() {
                    return Ok(());
                }
            }
            // The values API answers 400 for a range on a tab that has
            // never been written, which also means there is no header.
            Err(ReportError::Api { .. }) => {}
            Err(e) => return Err(e),
        }

        let response = self
            .client
            .put(url)
            .bearer_auth(&token)
            .query(&[VALUE_INPUT])
            .json(&serde_json::json!({ "values": [HEADER_ROW] }))
            .send()
            .await?;
        check(response).await?;

        info!(sheet = %self.sheet_name, "Sheet header created");
        Ok(())
    }
}

#[async_trait]
impl ReportingSink for GoogleSheetsSink {
    async fn append_row(&self, row: ReportRow) -> Result<(), ReportError> {
        let url = self.values_url(&format!("{}!A:F:append", self.sheet_name))?;
        let token = self.access_token().await?;

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .query(&[VALUE_INPUT])
            .json(&serde_json::json!({ "values": [row.values()] }))
            .send()
            .await?;
        check(response).await?;

        debug!(prefix = %row.prefix, weight = row.weight, "Reading exported to sheet");
        Ok(())
    }
}

async fn check(response: Response) -> Result<Response, ReportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ReportError::Api {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const TEST_KEY: &str = include_str!("../../tests/fixtures/test_service_account.pem");
    const APPEND_PATH: &str = "/v4/spreadsheets/sheet-1/values/Line!A:F:append";
    const HEADER_PATH: &str = "/v4/spreadsheets/sheet-1/values/Line!A1:F1";

    async fn sink(server: &MockServer) -> GoogleSheetsSink {
        let key = ServiceAccountKey {
            client_email: "forming@example.iam.gserviceaccount.com".to_string(),
            private_key: TEST_KEY.to_string(),
            token_uri: format!("{}/token", server.uri()),
        };

        GoogleSheetsSink::new(key, "sheet-1", "Line", Duration::from_secs(5))
            .unwrap()
            .with_api_base(format!("{}/v4/spreadsheets", server.uri()))
    }

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "test-token",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn row() -> ReportRow {
        ReportRow {
            timestamp: "2024-05-01 08:00:00".to_string(),
            prefix: "L1".to_string(),
            count: 12,
            status: 25,
            weight: 250,
            status_text: "Under Weight".to_string(),
        }
    }

    #[tokio::test]
    async fn appends_row_and_reuses_token() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("POST"))
            .and(path(APPEND_PATH))
            .and(header("authorization", "Bearer test-token"))
            .and(query_param("valueInputOption", "USER_ENTERED"))
            .and(body_json(json!({
                "values": [["2024-05-01 08:00:00", "L1", 12, 25, 250, "Under Weight"]]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(2)
            .mount(&server)
            .await;

        let sink = sink(&server).await;
        sink.append_row(row()).await.unwrap();
        sink.append_row(row()).await.unwrap();
    }

    #[tokio::test]
    async fn out_of_range_token_lifetime_is_not_cached() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "test-token",
                "expires_in": i64::MAX,
                "token_type": "Bearer"
            })))
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(APPEND_PATH))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(2)
            .mount(&server)
            .await;

        let sink = sink(&server).await;
        sink.append_row(row()).await.unwrap();
        sink.append_row(row()).await.unwrap();
    }

    #[tokio::test]
    async fn api_rejection_is_reported() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("POST"))
            .and(path(APPEND_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_string("caller lacks permission"))
            .mount(&server)
            .await;

        let err = sink(&server).await.append_row(row()).await.unwrap_err();

        assert!(matches!(
            err,
            ReportError::Api { status: 403, ref body } if body == "caller lacks permission"
        ));
    }

    #[tokio::test]
    async fn token_rejection_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = sink(&server).await.append_row(row()).await.unwrap_err();
        assert!(matches!(err, ReportError::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn header_written_to_empty_sheet() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path(HEADER_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "range": "Line!A1:F1",
                "majorDimension": "ROWS"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path(HEADER_PATH))
            .and(body_json(json!({ "values": [HEADER_ROW] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        sink(&server).await.ensure_header().await.unwrap();
    }

    #[tokio::test]
    async fn existing_header_left_alone() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("GET"))
            .and(path(HEADER_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "range": "Line!A1:F1",
                "values": [HEADER_ROW]
            })))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        sink(&server).await.ensure_header().await.unwrap();
    }

    #[test]
    fn base64_key_is_decoded() {
        let json = json!({
            "client_email": "forming@example.iam.gserviceaccount.com",
            "private_key": TEST_KEY,
        });
        let encoded = STANDARD.encode(json.to_string());

        let key = ServiceAccountKey::from_base64(&encoded).unwrap();

        assert_eq!(key.client_email, "forming@example.iam.gserviceaccount.com");
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
    }
}
