use std::fmt;
use std::future::Future;
use std::time::Duration;
use anyhow::{Context, Error};
use jsonwebtoken::{encode, get_current_timestamp, Algorithm, EncodingKey, Header};
use log::{debug, error, info};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;
use crate::config::config::DriveConfig;
use crate::modules::ImageStore;

/// Tokens are refreshed this many seconds before they expire.
const TOKEN_EXPIRY_MARGIN: u64 = 60;

/// Lifetime requested for the signed assertion.
const ASSERTION_LIFETIME: u64 = 3600;

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// The fields of a Google service account key file used for authentication.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn from_json(credentials: &str) -> Result<Self, Error> {
        let key: ServiceAccountKey = serde_json::from_str(credentials)
            .context("drive_client - service account credentials are not valid JSON")?;
        Ok(key)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata<'a> {
    name: &'a str,
    mime_type: &'a str,
    parents: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

/// multipart_related_body builds a `multipart/related` payload with a JSON metadata part
/// followed by the media part.
fn multipart_related_body(boundary: &str, metadata: &str, mime_type: &str, media: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(media.len() + metadata.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n").as_bytes());
    body.extend_from_slice(metadata.as_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}\r\nContent-Type: {mime_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(media);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

/// Uploads images into one Google Drive folder using a service account.
pub struct DriveClient {
    http: reqwest::Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    config: DriveConfig,
    token: Mutex<Option<AccessToken>>,
}

impl fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriveClient")
            .field("key", &self.key)
            .field("config", &self.config)
            .finish()
    }
}

impl DriveClient {
    /// new parses the service account JSON and prepares the signing key.
    ///
    /// # Arguments
    /// * `credentials` - service account key file contents
    /// * `config` - DriveConfig
    ///
    /// # Returns
    /// * `Result<DriveClient, Error>`
    pub fn new(credentials: &str, config: DriveConfig) -> Result<Self, Error> {
        let key = ServiceAccountKey::from_json(credentials)?;
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .context("drive_client - service account private key is not a valid RSA PEM")?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        info!("google drive uploads go to folder {} as {}", config.folder_id, key.client_email);
        Ok(DriveClient {
            http,
            key,
            encoding_key,
            config,
            token: Mutex::new(None),
        })
    }

    fn signed_assertion(&self, now: u64) -> Result<String, Error> {
        let claims = Claims {
            iss: self.key.client_email.to_owned(),
            scope: self.config.scopes.join(" "),
            aud: self.key.token_uri.to_owned(),
            iat: now,
            exp: now + ASSERTION_LIFETIME,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)?;
        Ok(assertion)
    }

    /// access_token returns the cached OAuth token, exchanging a fresh assertion when it is
    /// missing or about to expire.
    async fn access_token(&self) -> Result<String, Error> {
        let mut cached = self.token.lock().await;
        let now = get_current_timestamp();
        if let Some(token) = cached.as_ref() {
            if token.expires_at > now + TOKEN_EXPIRY_MARGIN {
                return Ok(token.token.to_owned())
            }
        }

        let assertion = self.signed_assertion(now)?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .context("drive_client - token request failed")?;
        let response = error_for_status(response, "token exchange").await?;
        let token: TokenResponse = response.json().await?;

        debug!("obtained google access token valid for {}s", token.expires_in);
        let access_token = AccessToken {
            token: token.access_token,
            expires_at: now + token.expires_in,
        };
        *cached = Some(access_token.clone());
        Ok(access_token.token)
    }

    async fn upload(&self, name: String, png: Vec<u8>) -> Result<String, Error> {
        let token = self.access_token().await?;

        let metadata = serde_json::to_string(&FileMetadata {
            name: &name,
            mime_type: "image/png",
            parents: vec![self.config.folder_id.as_str()],
        })?;
        let boundary = Uuid::new_v4().simple().to_string();
        let body = multipart_related_body(&boundary, &metadata, "image/png", &png);

        let response = self
            .http
            .post(&self.config.upload_url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, format!("multipart/related; boundary={boundary}"))
            .body(body)
            .send()
            .await
            .context("drive_client - upload request failed")?;
        let response = error_for_status(response, "upload").await?;
        let file: DriveFile = response.json().await?;

        info!("uploaded {name} to google drive as {}", file.id);
        Ok(file.id)
    }
}

async fn error_for_status(response: reqwest::Response, action: &str) -> Result<reqwest::Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response)
    }
    let body = response.text().await.unwrap_or_default();
    error!("google drive {action} rejected with {status}: {body}");
    Err(Error::msg(format!("drive_client - {action} rejected with {status}")))
}

impl ImageStore for DriveClient {
    fn upload_png(&self, name: &str, png: Vec<u8>) -> impl Future<Output = Result<String, Error>> + Send {
        self.upload(name.to_string(), png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::decode_header;

    const TEST_KEY: &str = include_str!("../../tests/fixtures/service_account_key.pem");

    fn credentials() -> String {
        serde_json::json!({
            "type": "service_account",
            "client_email": "uploader@example.iam.gserviceaccount.com",
            "private_key": TEST_KEY,
        })
        .to_string()
    }

    #[test]
    fn test_multipart_related_body() {
        let body = multipart_related_body("xyz", r#"{"name":"a.png"}"#, "image/png", b"\x89PNG");
        let expected = b"--xyz\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{\"name\":\"a.png\"}\r\n--xyz\r\nContent-Type: image/png\r\n\r\n\x89PNG\r\n--xyz--\r\n";
        assert_eq!(body, expected.to_vec());
    }

    #[test]
    fn test_file_metadata_serialization() {
        let metadata = FileMetadata { name: "face.jpg", mime_type: "image/png", parents: vec!["folder"] };
        assert_eq!(
            serde_json::to_string(&metadata).unwrap(),
            r#"{"name":"face.jpg","mimeType":"image/png","parents":["folder"]}"#
        );
    }

    #[test]
    fn test_invalid_credentials() {
        assert!(DriveClient::new("not json", DriveConfig::default()).is_err());
        let bad_key = serde_json::json!({"client_email": "a@b.c", "private_key": "nope"}).to_string();
        assert!(DriveClient::new(&bad_key, DriveConfig::default()).is_err());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let key = ServiceAccountKey::from_json(&credentials()).unwrap();
        let printed = format!("{key:?}");
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("PRIVATE KEY"));
        assert_eq!(key.token_uri, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn test_signed_assertion() {
        let client = DriveClient::new(&credentials(), DriveConfig::default()).unwrap();
        let assertion = client.signed_assertion(1_700_000_000).unwrap();
        let header = decode_header(&assertion).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(assertion.split('.').count(), 3);
    }

    mod google {
        use std::sync::{Arc, Mutex as StdMutex};
        use axum::body::Bytes;
        use axum::extract::State;
        use axum::http::{HeaderMap, StatusCode};
        use axum::routing::post;
        use axum::{Json, Router};
        use serde_json::{json, Value};
        use tokio::net::TcpListener;

        /// Stand-in for the Google token and Drive upload endpoints.
        pub struct FakeGoogle {
            pub expires_in: u64,
            pub token_requests: StdMutex<Vec<String>>,
            pub uploads: StdMutex<Vec<(HeaderMap, Bytes)>>,
        }

        async fn token(State(google): State<Arc<FakeGoogle>>, body: String) -> Json<Value> {
            let mut requests = google.token_requests.lock().unwrap();
            requests.push(body);
            Json(json!({
                "access_token": format!("token-{}", requests.len()),
                "expires_in": google.expires_in,
                "token_type": "Bearer",
            }))
        }

        async fn upload(State(google): State<Arc<FakeGoogle>>, headers: HeaderMap, body: Bytes) -> Json<Value> {
            google.uploads.lock().unwrap().push((headers, body));
            Json(json!({"kind": "drive#file", "id": "1AbCdEf-uploaded", "name": "face.png"}))
        }

        async fn denied() -> (StatusCode, &'static str) {
            (StatusCode::FORBIDDEN, "The user does not have write access to folder private-folder-id")
        }

        /// serve starts the fake on an ephemeral port and returns its base url.
        pub async fn serve(expires_in: u64) -> (String, Arc<FakeGoogle>) {
            let google = Arc::new(FakeGoogle {
                expires_in,
                token_requests: StdMutex::new(vec![]),
                uploads: StdMutex::new(vec![]),
            });
            let app = Router::new()
                .route("/token", post(token))
                .route("/upload", post(upload))
                .route("/denied", post(denied))
                .with_state(google.clone());

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
            (format!("http://{addr}"), google)
        }
    }

    fn local_client(base_url: &str, upload_path: &str) -> DriveClient {
        let credentials = serde_json::json!({
            "client_email": "uploader@example.iam.gserviceaccount.com",
            "private_key": TEST_KEY,
            "token_uri": format!("{base_url}/token"),
        })
        .to_string();
        let config = DriveConfig {
            upload_url: format!("{base_url}{upload_path}"),
            ..DriveConfig::new("folder-1".to_string())
        };
        DriveClient::new(&credentials, config).unwrap()
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[tokio::test]
    async fn test_upload_reuses_token() {
        let (base_url, google) = google::serve(3600).await;
        let client = local_client(&base_url, "/upload");
        let png = b"\x89PNG\r\n\x1a\nfake image data".to_vec();

        assert_eq!(client.upload_png("face.png", png.clone()).await.unwrap(), "1AbCdEf-uploaded");
        assert_eq!(client.upload_png("second.png", png.clone()).await.unwrap(), "1AbCdEf-uploaded");

        let token_requests = google.token_requests.lock().unwrap();
        assert_eq!(token_requests.len(), 1);
        assert!(token_requests[0].contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"));
        assert!(token_requests[0].contains("assertion="));

        let uploads = google.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 2);
        let (headers, body) = &uploads[0];
        assert_eq!(headers["authorization"], "Bearer token-1");
        let content_type = headers["content-type"].to_str().unwrap();
        assert!(content_type.starts_with("multipart/related; boundary="));
        let boundary = content_type.trim_start_matches("multipart/related; boundary=");
        assert!(contains(body, format!("--{boundary}\r\n").as_bytes()));
        assert!(contains(body, br#"{"name":"face.png","mimeType":"image/png","parents":["folder-1"]}"#));
        assert!(contains(body, &png));
        assert_eq!(uploads[1].0["authorization"], "Bearer token-1");
    }

    #[tokio::test]
    async fn test_token_refreshed_inside_expiry_margin() {
        let (base_url, google) = google::serve(TOKEN_EXPIRY_MARGIN / 2).await;
        let client = local_client(&base_url, "/upload");

        client.upload_png("a.png", vec![1, 2, 3]).await.unwrap();
        client.upload_png("b.png", vec![4, 5, 6]).await.unwrap();

        assert_eq!(google.token_requests.lock().unwrap().len(), 2);
        assert_eq!(google.uploads.lock().unwrap()[1].0["authorization"], "Bearer token-2");
    }

    #[tokio::test]
    async fn test_rejected_upload_hides_response_body() {
        let (base_url, _google) = google::serve(3600).await;
        let client = local_client(&base_url, "/denied");

        let err = client.upload_png("face.png", vec![1, 2, 3]).await.unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("403"));
        assert!(message.contains("upload"));
        assert!(!message.contains("private-folder-id"));
    }
}
