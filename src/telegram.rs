//! Outbound Telegram Bot API calls.

use crate::error::anyhow;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

const API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Clone, Serialize)]
pub struct OutgoingMessage {
    pub chat_id: i64,
    pub text: String,
    pub parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<Value>,
}

impl OutgoingMessage {
    pub fn markdown(chat_id: i64, text: String) -> Self {
        Self {
            chat_id,
            text,
            parse_mode: "Markdown",
            reply_markup: None,
        }
    }

    /// Adds a single inline button opening the Mini-App.
    pub fn with_web_app_button(mut self, label: &str, url: &str) -> Self {
        self.reply_markup = Some(json!({
            "inline_keyboard": [[{ "text": label, "web_app": { "url": url } }]]
        }));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledPrice {
    pub label: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Invoice {
    pub title: String,
    pub description: String,
    pub payload: String,
    /// Empty for payments in Telegram Stars.
    pub provider_token: String,
    pub currency: String,
    pub prices: Vec<LabeledPrice>,
}

#[async_trait]
pub trait TelegramGateway: Send + Sync {
    async fn send_message(&self, message: &OutgoingMessage) -> anyhow::Result<()>;

    async fn create_invoice_link(&self, invoice: &Invoice) -> anyhow::Result<String>;
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Bot API client over HTTPS.
pub struct BotApi {
    client: reqwest::Client,
    token: String,
}

impl BotApi {
    pub fn new(token: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            token: token.to_string(),
        })
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> anyhow::Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        let url = format!("{}/bot{}/{}", API_BASE, self.token, method);
        let response: ApiResponse<T> = self
            .client
            .post(url)
            .json(body)
            .send()
            .await?
            .json()
            .await?;

        match (response.ok, response.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(anyhow!(
                "{} failed: {}",
                method,
                response.description.unwrap_or_else(|| "no description".into())
            )),
        }
    }
}

#[async_trait]
impl TelegramGateway for BotApi {
    async fn send_message(&self, message: &OutgoingMessage) -> anyhow::Result<()> {
        let _: Value = self.call("sendMessage", message).await?;
        Ok(())
    }

    async fn create_invoice_link(&self, invoice: &Invoice) -> anyhow::Result<String> {
        self.call("createInvoiceLink", invoice).await
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;

    /// Records every call; fails on demand.
    #[derive(Default)]
    pub struct RecordingGateway {
        pub messages: Mutex<Vec<OutgoingMessage>>,
        pub invoices: Mutex<Vec<Invoice>>,
        pub fail: bool,
    }

    impl RecordingGateway {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl TelegramGateway for RecordingGateway {
        async fn send_message(&self, message: &OutgoingMessage) -> anyhow::Result<()> {
            if self.fail {
                return Err(anyhow!("sendMessage failed: bot was blocked by the user"));
            }
            self.messages.lock().unwrap().push(message.clone());
            Ok(())
        }

        async fn create_invoice_link(&self, invoice: &Invoice) -> anyhow::Result<String> {
            if self.fail {
                return Err(anyhow!("createInvoiceLink failed: Bad Request"));
            }
            self.invoices.lock().unwrap().push(invoice.clone());
            Ok(format!("https://t.me/$invoice-{}", invoice.payload.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_markup() {
        let message = OutgoingMessage::markdown(42, "*hi*".to_string())
            .with_web_app_button("Spin!", "https://example.org/");
        let body = serde_json::to_value(&message).unwrap();

        assert_eq!(body["chat_id"], 42);
        assert_eq!(body["parse_mode"], "Markdown");
        assert_eq!(
            body["reply_markup"]["inline_keyboard"][0][0]["web_app"]["url"],
            "https://example.org/"
        );
    }

    #[test]
    fn test_plain_message_has_no_markup() {
        let body = serde_json::to_value(OutgoingMessage::markdown(1, "x".into())).unwrap();
        assert!(body.get("reply_markup").is_none());
    }
}
