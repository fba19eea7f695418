use crate::error::{Error, Result};
use crate::models::{FindingRef, Issue, IssueEnvelope, IssueQuery, IssuesPage};
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::{Client, header};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.cloudpassage.com";

const TOKEN_ENDPOINT: &str = "/oauth/access_token";
const ISSUES_ENDPOINT: &str = "/v3/issues";

// 期限切れ直前のトークンは使わない
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 30;

/// Halo APIのキーとシークレット
#[derive(Debug, Clone)]
pub struct Credentials {
    pub key: String,
    pub secret: SecretString,
}

impl Credentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: SecretString::new(secret.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HaloConfig {
    pub base_url: String,
    pub credentials: Credentials,
    /// User-Agentとして送る連携名
    pub integration: String,
    pub request_timeout: Option<Duration>,
}

impl HaloConfig {
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Result<Self> {
        let base_url = base_url.into();

        // Validate URL
        let _ = Url::parse(&base_url)
            .map_err(|_| Error::InvalidConfiguration("Invalid base URL".to_string()))?;

        if credentials.key.trim().is_empty() || credentials.secret.expose_secret().trim().is_empty()
        {
            return Err(Error::InvalidConfiguration(
                "API key and secret must not be empty".to_string(),
            ));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            integration: default_integration_string(),
            request_timeout: None,
        })
    }

    /// 環境変数から設定を作成
    ///
    /// `HALO_API_KEY` と `HALO_API_SECRET_KEY` は必須。`HALO_API_HOSTNAME` が
    /// あれば接続先ホストを上書きする。
    pub fn from_env() -> Result<Self> {
        use std::env;

        let key = env::var("HALO_API_KEY").map_err(|_| {
            Error::ConfigurationMissing("HALO_API_KEY not found in environment".to_string())
        })?;

        let secret = env::var("HALO_API_SECRET_KEY").map_err(|_| {
            Error::ConfigurationMissing("HALO_API_SECRET_KEY not found in environment".to_string())
        })?;

        let base_url = match env::var("HALO_API_HOSTNAME") {
            Ok(host) if !host.trim().is_empty() => base_url_for_host(host.trim())?,
            _ => DEFAULT_BASE_URL.to_string(),
        };

        Self::new(base_url, Credentials::new(key, secret))
    }

    pub fn integration(mut self, integration: impl Into<String>) -> Self {
        self.integration = integration.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

/// ホスト名からベースURLを組み立てる（http/httpsのスキーム付き指定はそのまま使う）
fn base_url_for_host(host: &str) -> Result<String> {
    if host.starts_with("https://") || host.starts_with("http://") {
        return Ok(host.to_string());
    }
    if host.contains("://") {
        return Err(Error::InvalidConfiguration(format!(
            "Unsupported scheme in HALO_API_HOSTNAME: {}",
            host
        )));
    }
    Ok(format!("https://{}", host))
}

fn default_integration_string() -> String {
    format!("Halo-Issues/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: SecretString,
    expires_at: Option<DateTime<Utc>>,
    refresh_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    fn issued(value: String, expires_in: Option<i64>, now: DateTime<Utc>) -> Self {
        // 有効期間が短いトークンでもマージンは期間の半分まで
        let margin = |secs: i64| TOKEN_EXPIRY_MARGIN_SECS.min(secs / 2);
        Self {
            value: SecretString::new(value),
            expires_at: expires_in.map(|secs| now + chrono::Duration::seconds(secs)),
            refresh_at: expires_in
                .map(|secs| now + chrono::Duration::seconds(secs - margin(secs))),
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.refresh_at.is_none_or(|refresh_at| now < refresh_at)
    }
}

/// Halo APIクライアント
///
/// アクセストークンはクライアント単位でキャッシュし、期限が近づいたら取り直す。
#[derive(Debug, Clone)]
pub struct HaloClient {
    pub(crate) client: Client,
    pub(crate) config: Arc<HaloConfig>,
    token: Arc<RwLock<Option<AccessToken>>>,
}

impl HaloClient {
    pub fn new(config: HaloConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_str(&config.integration)
                .map_err(|_| Error::InvalidConfiguration("Invalid integration string".to_string()))?,
        );

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(|e| {
            Error::InvalidConfiguration(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            config: Arc::new(config),
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// クライアントを作成し、その場で認証まで行う
    pub async fn connect(config: HaloConfig) -> Result<Self> {
        let client = Self::new(config)?;
        if let Err(e) = client.authenticate().await {
            if matches!(e, Error::Authentication { .. }) {
                error!("Bad Halo API credentials");
            }
            return Err(e);
        }
        Ok(client)
    }

    pub fn config(&self) -> &HaloConfig {
        &self.config
    }

    /// キーとシークレットをアクセストークンに交換する
    pub async fn authenticate(&self) -> Result<()> {
        self.request_token(None).await
    }

    async fn request_token(&self, timeout: Option<Duration>) -> Result<()> {
        let url = format!("{}{}", self.config.base_url, TOKEN_ENDPOINT);
        let credentials = format!(
            "{}:{}",
            self.config.credentials.key,
            self.config.credentials.secret.expose_secret()
        );
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials.as_bytes());

        let mut request = self
            .client
            .post(&url)
            .query(&[("grant_type", "client_credentials")])
            .header(header::AUTHORIZATION, format!("Basic {}", encoded));
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::from_status(status, message));
        }

        let body = response.text().await?;
        let token: TokenResponse = decode(TOKEN_ENDPOINT, &body)?;
        let token = AccessToken::issued(token.access_token, token.expires_in, Utc::now());

        debug!(expires_at = ?token.expires_at, "Obtained Halo access token");

        *self.token.write().await = Some(token);
        Ok(())
    }

    async fn bearer_token(&self, timeout: Option<Duration>) -> Result<SecretString> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.value.clone());
            }
        }

        self.request_token(timeout).await?;

        self.token
            .read()
            .await
            .as_ref()
            .map(|token| token.value.clone())
            .ok_or_else(|| Error::Authentication {
                status: 401,
                message: "No access token available".to_string(),
            })
    }

    pub(crate) async fn get<T>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.config.base_url, endpoint);
        let token = self.bearer_token(timeout).await?;

        let mut request = self
            .client
            .get(&url)
            .bearer_auth(token.expose_secret())
            .query(query);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            if status == 401 {
                // 失効したトークンは次回取り直す
                self.token.write().await.take();
            }
            let message = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::from_status(status, message));
        }

        let body = response.text().await?;
        decode(endpoint, &body)
    }

    /// Issue一覧を1ページ分取得
    pub async fn list_issues(&self, query: &IssueQuery) -> Result<IssuesPage> {
        debug!(
            status = %query.status,
            page = query.page,
            per_page = query.per_page,
            "Requesting Halo issues page"
        );
        self.get(ISSUES_ENDPOINT, &query.to_query_pairs(), query.timeout)
            .await
    }

    /// Issueの全項目を取得
    pub async fn describe_issue(
        &self,
        issue_id: &str,
        timeout: Option<Duration>,
    ) -> Result<Issue> {
        let endpoint = format!("{}/{}", ISSUES_ENDPOINT, urlencoding::encode(issue_id));
        let envelope: IssueEnvelope = self.get(&endpoint, &[], timeout).await?;
        Ok(envelope.issue)
    }

    /// スキャンまたはイベントのfindingを取得
    pub async fn describe_finding(&self, finding_url: &str) -> Result<serde_json::Value> {
        let finding = FindingRef::parse(finding_url)?;
        self.get(&finding.api_path(), &[], None).await
    }
}

fn decode<T>(endpoint: &str, body: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_str(body).map_err(|source| Error::MalformedResponse {
        endpoint: endpoint.to_string(),
        source,
    })
}
