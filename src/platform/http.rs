//! reqwest-backed [`AdsPlatform`] client.
//!
//! OAuth endpoints live under `oauth_base` (`/authorize`, `/token`); hierarchy reads live
//! under `api_base` (`/v1/customers/...`).

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use super::{AdsPlatform, AdvertiserAccount, OAuthTokens, PlatformError};
use crate::config::AppConfig;
use crate::token_vault::Credential;

const OAUTH_SCOPE: &str = "ads.manage";
const BODY_SNIPPET_CHARS: usize = 200;
/// Platforms that omit `expires_in` issue hour-long tokens.
const DEFAULT_TOKEN_TTL_SECONDS: i64 = 3600;

#[derive(Clone)]
pub struct HttpAdsPlatform {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    oauth_base: String,
    api_base: String,
    developer_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AccountPayload {
    id: String,
    #[serde(default)]
    descriptive_name: Option<String>,
    #[serde(default)]
    currency_code: Option<String>,
    #[serde(default)]
    manager: bool,
}

#[derive(Debug, Deserialize)]
struct AccountListPayload {
    #[serde(default)]
    accounts: Vec<AccountPayload>,
}

impl From<AccountPayload> for AdvertiserAccount {
    fn from(payload: AccountPayload) -> Self {
        AdvertiserAccount {
            display_name: payload
                .descriptive_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| payload.id.clone()),
            currency: payload.currency_code.unwrap_or_default(),
            is_manager: payload.manager,
            id: payload.id,
        }
    }
}

impl HttpAdsPlatform {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        oauth_base: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("adgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| PlatformError::Configuration(err.to_string()))?;

        Ok(Self {
            client,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            oauth_base: oauth_base.into().trim_end_matches('/').to_string(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            developer_token: None,
        })
    }

    pub fn with_developer_token(mut self, token: Option<String>) -> Self {
        self.developer_token = token;
        self
    }

    /// Builds the client from configuration; local/test profiles may run without app credentials.
    pub fn from_config(config: &AppConfig) -> Result<Self, PlatformError> {
        Ok(Self::new(
            config.ads_client_id.clone().unwrap_or_default(),
            config.ads_client_secret.clone().unwrap_or_default(),
            config.ads_oauth_base.clone(),
            config.ads_api_base.clone(),
        )?
        .with_developer_token(config.ads_developer_token.clone()))
    }

    fn authorized(&self, request: RequestBuilder, credential: &Credential) -> RequestBuilder {
        let mut request = request
            .bearer_auth(credential.access_token.expose())
            .header("Accept", "application/json");
        if let Some(token) = self.developer_token.as_deref() {
            request = request.header("developer-token", token);
        }
        if let Some(login) = credential.login_customer_id.as_deref() {
            request = request.header("login-customer-id", login);
        }
        request
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<OAuthTokens, PlatformError> {
        let response = self
            .client
            .post(format!("{}/token", self.oauth_base))
            .header("Accept", "application/json")
            .form(params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(classify_oauth_failure(response).await);
        }

        let body: TokenResponse = response.json().await?;
        if body.access_token.trim().is_empty() {
            return Err(PlatformError::InvalidResponse(
                "token response carried an empty access_token".to_string(),
            ));
        }

        let ttl = body.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECONDS).max(0);
        Ok(OAuthTokens {
            access_token: body.access_token,
            refresh_token: body.refresh_token.filter(|t| !t.is_empty()),
            expires_at: Utc::now() + Duration::seconds(ttl),
        })
    }
}

#[async_trait]
impl AdsPlatform for HttpAdsPlatform {
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Result<Url, PlatformError> {
        let mut url = Url::parse(&format!("{}/authorize", self.oauth_base))
            .map_err(|err| PlatformError::Configuration(err.to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", OAUTH_SCOPE)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        Ok(url)
    }

    async fn exchange_authorization_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuthTokens, PlatformError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ])
        .await
    }

    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<OAuthTokens, PlatformError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ])
        .await
    }

    async fn list_sub_accounts(
        &self,
        credential: &Credential,
    ) -> Result<Vec<AdvertiserAccount>, PlatformError> {
        let url = match credential.login_customer_id.as_deref() {
            Some(login) => format!("{}/v1/customers/{}/accounts", self.api_base, login),
            None => format!("{}/v1/customers/accessible", self.api_base),
        };

        let response = self
            .authorized(self.client.get(url), credential)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(classify_api_failure(response).await);
        }

        let payload: AccountListPayload = response.json().await?;
        Ok(payload
            .accounts
            .into_iter()
            .map(AdvertiserAccount::from)
            .collect())
    }

    async fn describe_account(
        &self,
        credential: &Credential,
        account_id: &str,
    ) -> Result<AdvertiserAccount, PlatformError> {
        let mut url = Url::parse(&format!("{}/v1/customers/", self.api_base))
            .map_err(|err| PlatformError::Configuration(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| PlatformError::Configuration("api base cannot be a base".to_string()))?
            .pop_if_empty()
            .push(account_id);

        let response = self
            .authorized(self.client.get(url), credential)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(classify_api_failure(response).await);
        }

        let payload: AccountPayload = response.json().await?;
        Ok(payload.into())
    }
}

fn retry_after_seconds(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

fn snippet(body: &str) -> String {
    if body.chars().count() > BODY_SNIPPET_CHARS {
        let truncated: String = body.chars().take(BODY_SNIPPET_CHARS).collect();
        format!("{}...", truncated)
    } else {
        body.to_string()
    }
}

/// Token endpoint failures. RFC 6749 returns 400 for a revoked or expired grant, so the
/// error code in the body decides between an authentication failure and a bad request.
async fn classify_oauth_failure(response: Response) -> PlatformError {
    let status = response.status();
    let retry_after = retry_after_seconds(&response);
    let body = response.text().await.unwrap_or_default();
    classify_oauth_status(status, retry_after, &body)
}

pub(crate) fn classify_oauth_status(
    status: StatusCode,
    retry_after: Option<u64>,
    body: &str,
) -> PlatformError {
    let lowered = body.to_ascii_lowercase();
    let permanent_marker = ["invalid_grant", "invalid_client", "unauthorized_client", "revoked"]
        .iter()
        .any(|marker| lowered.contains(marker));

    match status {
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimited { retry_after },
        s if s.is_server_error() => {
            PlatformError::Unavailable(format!("token endpoint returned {}", s.as_u16()))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PlatformError::AuthenticationFailed(snippet(body))
        }
        _ if permanent_marker => PlatformError::AuthenticationFailed(snippet(body)),
        s => PlatformError::InvalidResponse(format!(
            "token endpoint returned {}: {}",
            s.as_u16(),
            snippet(body)
        )),
    }
}

async fn classify_api_failure(response: Response) -> PlatformError {
    let status = response.status();
    let retry_after = retry_after_seconds(&response);
    let body = response.text().await.unwrap_or_default();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PlatformError::AuthenticationFailed(snippet(&body))
        }
        StatusCode::NOT_FOUND => PlatformError::NotFound(snippet(&body)),
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimited { retry_after },
        s if s.is_server_error() => {
            PlatformError::Unavailable(format!("platform returned {}", s.as_u16()))
        }
        s => PlatformError::InvalidResponse(format!(
            "platform returned {}: {}",
            s.as_u16(),
            snippet(&body)
        )),
    }
}
