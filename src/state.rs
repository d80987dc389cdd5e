use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::{
    auth::{
        email::{BrevoMailer, EmailSender, LogMailer},
        repo::{PgUserStore, UserStore},
    },
    config::AppConfig,
    sessions::repo::{PgSessionStore, SessionStore},
    storage::{Storage, StorageClient},
    tasks::repo::{PgTaskStore, TaskStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub mailer: Arc<dyn EmailSender>,
    pub storage: Arc<dyn StorageClient>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;
        info!("database migrations applied");

        let mailer: Arc<dyn EmailSender> = match &config.email.api_key {
            Some(key) => Arc::new(BrevoMailer::new(key.clone(), &config.email)?),
            None => {
                warn!("BREVO_API_KEY not set; verification codes will only be logged");
                Arc::new(LogMailer)
            }
        };

        let storage = Arc::new(Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;

        Ok(Self {
            users: Arc::new(PgUserStore::new(db.clone())),
            sessions: Arc::new(PgSessionStore::new(db.clone())),
            tasks: Arc::new(PgTaskStore::new(db)),
            config,
            mailer,
            storage,
        })
    }
}
