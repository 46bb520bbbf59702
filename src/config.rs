use crate::error::anyhow;
use std::{env, net::SocketAddr};

/// Service configuration, read once at start-up.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bot token: root of the init-data HMAC chain and Bot API credential.
    pub bot_token: String,
    /// Bot handle used in invite deep links.
    pub bot_username: String,
    /// Mini-App URL opened from notification buttons.
    pub web_app_url: String,
    /// Chat that receives withdrawal requests.
    pub creator_chat_id: Option<i64>,
    pub database_url: Option<String>,
    /// `*` allows any origin.
    pub cors_origin: String,
    pub listen_addr: SocketAddr,
    /// Maximum age of init-data, in seconds.
    pub init_data_ttl: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let bot_token = env::var("BOT_TOKEN").unwrap_or_default();
        if bot_token.is_empty() {
            return Err(anyhow!("BOT_TOKEN must be set"));
        }

        let creator_chat_id = match optional("CREATOR_ID") {
            Some(id) => Some(
                id.parse()
                    .map_err(|_| anyhow!("invalid CREATOR_ID {:?}", id))?,
            ),
            None => None,
        };

        let listen_addr = optional("LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|e| anyhow!("invalid LISTEN_ADDR: {}", e))?;

        let init_data_ttl = match optional("INIT_DATA_TTL") {
            Some(ttl) => ttl
                .parse()
                .map_err(|_| anyhow!("invalid INIT_DATA_TTL {:?}", ttl))?,
            None => crate::init_data::DEFAULT_TTL,
        };

        Ok(Self {
            bot_token,
            bot_username: optional("BOT_USERNAME").unwrap_or_else(|| "TONJacketBot".to_string()),
            web_app_url: optional("WEB_APP_URL")
                .unwrap_or_else(|| "https://ton-jacket.netlify.app/".to_string()),
            creator_chat_id,
            database_url: optional("DATABASE_URL"),
            cors_origin: optional("CORS_ORIGIN").unwrap_or_else(|| "*".to_string()),
            listen_addr,
            init_data_ttl,
        })
    }

    /// Deep link that opens the Mini-App with the user's referral code.
    pub fn invite_link(&self, telegram_user_id: i64) -> String {
        format!(
            "https://t.me/{}?startapp=ref_{}",
            self.bot_username, telegram_user_id
        )
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        bot_token: crate::init_data::tests::BOT_TOKEN.to_string(),
        bot_username: "TONJacketBot".to_string(),
        web_app_url: "https://ton-jacket.netlify.app/".to_string(),
        creator_chat_id: Some(1000),
        database_url: None,
        cors_origin: "*".to_string(),
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
        init_data_ttl: crate::init_data::DEFAULT_TTL,
    }
}
