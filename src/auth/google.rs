use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::jwt::GoogleIdentity;
use crate::config::GoogleOAuthConfig;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const SCOPES: &str = "openid email profile";

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token endpoint returned {status}: {body}")]
    TokenExchange { status: u16, body: String },
    #[error("userinfo endpoint returned {0}")]
    UserInfo(u16),
    #[error("userinfo response has no {0}")]
    MissingField(&'static str),
    #[error("invalid oauth url: {0}")]
    Url(#[from] url::ParseError),
}

/// Login through a third-party identity provider.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn authorization_url(&self, state: &str) -> Result<String, OAuthError>;

    /// Trades the callback `code` for the user's identity.
    async fn authenticate(&self, code: &str) -> Result<GoogleIdentity, OAuthError>;
}

pub struct GoogleOAuth {
    client: reqwest::Client,
    config: GoogleOAuthConfig,
}

impl GoogleOAuth {
    pub fn new(config: GoogleOAuthConfig) -> Result<Self, OAuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { client, config })
    }

    async fn exchange_code(&self, code: &str) -> Result<String, OAuthError> {
        let params = [
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.callback_url.as_str()),
            ("grant_type", "authorization_code"),
        ];
        let response = self.client.post(TOKEN_URL).form(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::TokenExchange {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    async fn fetch_userinfo(&self, access_token: &str) -> Result<GoogleIdentity, OAuthError> {
        let response = self
            .client
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(OAuthError::UserInfo(response.status().as_u16()));
        }

        let info: UserInfo = response.json().await?;
        info.into_identity()
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuth {
    fn authorization_url(&self, state: &str) -> Result<String, OAuthError> {
        build_authorization_url(&self.config, state)
    }

    async fn authenticate(&self, code: &str) -> Result<GoogleIdentity, OAuthError> {
        let access_token = self.exchange_code(code).await?;
        self.fetch_userinfo(&access_token).await
    }
}

fn build_authorization_url(config: &GoogleOAuthConfig, state: &str) -> Result<String, OAuthError> {
    let mut url = Url::parse(AUTHORIZE_URL)?;
    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", &config.callback_url)
        .append_pair("response_type", "code")
        .append_pair("scope", SCOPES)
        .append_pair("access_type", "online")
        .append_pair("prompt", "select_account")
        .append_pair("state", state);
    Ok(url.into())
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    id: Option<String>,
    email: Option<String>,
    name: Option<String>,
}

impl UserInfo {
    fn into_identity(self) -> Result<GoogleIdentity, OAuthError> {
        let google_id = self
            .id
            .filter(|id| !id.is_empty())
            .ok_or(OAuthError::MissingField("id"))?;
        let email = self
            .email
            .filter(|email| !email.is_empty())
            .ok_or(OAuthError::MissingField("email"))?;
        let name = self
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| email.clone());
        Ok(GoogleIdentity {
            google_id,
            email,
            name,
        })
    }
}
