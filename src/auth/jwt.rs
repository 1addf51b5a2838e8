use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;

const PENDING_REGISTRATION_SUFFIX: &str = "-pending-registration";
const PENDING_REGISTRATION_MINUTES: i64 = 15;

#[derive(Clone)]
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    expiry: Duration,
    pending_audience: String,
    pending_expiry: Duration,
}

impl JwtService {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            encoding: EncodingKey::from_secret(config.session_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.session_secret.as_bytes()),
            issuer: config.session_issuer.clone(),
            audience: config.session_audience.clone(),
            expiry: Duration::days(config.session_expiry_days),
            pending_audience: format!("{}{}", config.session_audience, PENDING_REGISTRATION_SUFFIX),
            pending_expiry: Duration::minutes(PENDING_REGISTRATION_MINUTES),
        })
    }

    pub fn session_max_age(&self) -> Duration {
        self.expiry
    }

    pub fn pending_max_age(&self) -> Duration {
        self.pending_expiry
    }

    pub fn generate_token(&self, user_id: Uuid, role: &str) -> Result<String> {
        let now = Utc::now();
        let exp = now + self.expiry;
        let claims = Claims {
            sub: user_id,
            role: role.to_owned(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(&[self.audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    /// Signs the Google identity of a user who has not picked a role yet.
    pub fn generate_pending_registration(&self, identity: &GoogleIdentity) -> Result<String> {
        let now = Utc::now();
        let exp = now + self.pending_expiry;
        let claims = PendingRegistrationClaims {
            google_id: identity.google_id.clone(),
            email: identity.email.clone(),
            name: identity.name.clone(),
            iss: self.issuer.clone(),
            aud: self.pending_audience.clone(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_pending_registration(&self, token: &str) -> Result<GoogleIdentity> {
        let mut validation = Validation::default();
        validation.set_audience(&[self.pending_audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        let data = decode::<PendingRegistrationClaims>(token, &self.decoding, &validation)?;
        Ok(GoogleIdentity {
            google_id: data.claims.google_id,
            email: data.claims.email,
            name: data.claims.name,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: String,
    pub iss: String,
    pub aud: String,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingRegistrationClaims {
    google_id: String,
    email: String,
    name: String,
    iss: String,
    aud: String,
    iat: usize,
    exp: usize,
}

/// A user as reported by Google's userinfo endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleIdentity {
    pub google_id: String,
    pub email: String,
    pub name: String,
}
