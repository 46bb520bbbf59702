use crate::{
    config::Config,
    error::{anyhow, AppError},
    repository::{MemoryUserRepository, PgUserRepository, UserRepository},
    routes::AppState,
    telegram::BotApi,
};
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::header::CONTENT_TYPE,
};
use serde::de::DeserializeOwned;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod catalog;
mod config;
mod dto;
mod error;
mod init_data;
mod ledger;
mod notify;
mod purchase;
mod repository;
mod routes;
mod telegram;
mod user;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ton_jacket_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let users: Arc<dyn UserRepository> = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            tracing::info!("Connected to database");

            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Migrations completed");

            Arc::new(PgUserRepository::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, accounts are kept in memory only");
            Arc::new(MemoryUserRepository::new())
        }
    };

    let telegram = Arc::new(BotApi::new(&config.bot_token)?);
    let listen_addr = config.listen_addr;

    let app = routes::router(AppState {
        config: Arc::new(config),
        users,
        telegram,
    })?;

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(%listen_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// to make accept json with content-type: text/plain
pub(crate) struct JsonOrPlain<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonOrPlain<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let accepted = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|content_type| {
                content_type.starts_with("application/json")
                    || content_type.starts_with("text/plain")
            })
            .unwrap_or(false);

        if !accepted {
            return Err(AppError::UnsupportedMedia(anyhow!(
                "expected application/json content type"
            )));
        }

        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(anyhow!(e.body_text())))?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(AppError::bad_request("Request body is empty"));
        }

        let payload = serde_json::from_slice(&body).map_err(|e| {
            tracing::debug!(error = %e, "rejected request body");
            AppError::bad_request("Invalid JSON format in request body")
        })?;

        Ok(Self(payload))
    }
}
