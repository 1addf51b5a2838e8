use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::{
        google::{GoogleOAuth, OAuthProvider},
        jwt::JwtService,
    },
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult},
    mailer::{Mailer, SmtpMailer},
    resume_parser::{GeminiClient, ResumeParser},
};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub jwt: JwtService,
    pub oauth: Option<Arc<dyn OAuthProvider>>,
    pub resume_parser: Option<Arc<dyn ResumeParser>>,
    pub mailer: Option<Arc<dyn Mailer>>,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig, jwt: JwtService) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            jwt,
            oauth: None,
            resume_parser: None,
            mailer: None,
        }
    }

    /// State wired to the real Google, Gemini and SMTP clients that `config` enables.
    pub fn from_config(pool: PgPool, config: AppConfig) -> anyhow::Result<Self> {
        let jwt = JwtService::from_config(&config)?;
        let google = config.google.clone();
        let gemini = config.gemini.clone();
        let smtp = config.smtp.clone();

        let mut state = Self::new(pool, config, jwt);
        if let Some(google) = google {
            state = state.with_oauth(Arc::new(GoogleOAuth::new(google)?));
        }
        if let Some(gemini) = gemini {
            state = state.with_resume_parser(Arc::new(GeminiClient::new(gemini)?));
        }
        if let Some(smtp) = smtp {
            state = state.with_mailer(Arc::new(SmtpMailer::new(smtp)));
        }
        Ok(state)
    }

    pub fn with_oauth(mut self, oauth: Arc<dyn OAuthProvider>) -> Self {
        self.oauth = Some(oauth);
        self
    }

    pub fn with_resume_parser(mut self, parser: Arc<dyn ResumeParser>) -> Self {
        self.resume_parser = Some(parser);
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }
}
