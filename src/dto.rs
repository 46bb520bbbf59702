use crate::purchase::PurchaseOutcome;
use crate::user::{Statistics, UserAccount};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Telegram user id, sent by clients either as a number or as a numeric string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawUserId")]
pub struct UserId(pub i64);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawUserId {
    Number(i64),
    Text(String),
}

impl TryFrom<RawUserId> for UserId {
    type Error = String;

    fn try_from(raw: RawUserId) -> Result<Self, Self::Error> {
        let id = match raw {
            RawUserId::Number(id) => id,
            RawUserId::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| format!("invalid user id {:?}", text))?,
        };
        if id <= 0 {
            return Err(format!("invalid user id {}", id));
        }
        Ok(Self(id))
    }
}

/// ```
/// { "initData": "query_id=...&user=%7B%22id%22%3A...&auth_date=...&hash=..." }
/// ```
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub init_data: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<UserAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimTaskRequest {
    #[serde(alias = "id")]
    pub task_id: Option<String>,
    #[serde(alias = "amount")]
    pub reward_amount: Option<Decimal>,
    #[serde(alias = "telegram_user_id")]
    pub telegram_user_id: Option<UserId>,
}

#[derive(Deserialize)]
pub struct AdsRewardRequest {
    #[serde(alias = "telegramUserId")]
    pub telegram_user_id: Option<UserId>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDataResponse {
    pub success: bool,
    pub message: &'static str,
    pub user_data: UserAccount,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCoinsRequest {
    pub telegram_user_id: Option<UserId>,
    pub coins_to_add: Option<Decimal>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCoinsResponse {
    pub success: bool,
    pub new_coins: Decimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTonRequest {
    pub telegram_id: Option<UserId>,
    pub ton_amount: Option<Decimal>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTonResponse {
    pub success: bool,
    pub ton_amount: Decimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBetRequest {
    pub telegram_user_id: Option<UserId>,
    pub bet_amount: Option<Decimal>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBetResponse {
    pub success: bool,
    pub new_bet_amount: Decimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStarsRequest {
    pub telegram_id: Option<UserId>,
    pub stars_amount: Option<Decimal>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStarsResponse {
    pub success: bool,
    pub new_stars: Decimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatisticsRequest {
    pub telegram_user_id: Option<UserId>,
    pub bet_amount: Option<Decimal>,
    pub win_amount: Option<Decimal>,
    #[serde(default)]
    pub is_win: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertCoinsRequest {
    pub user_id: Option<UserId>,
    pub coins_amount: Option<Decimal>,
    pub ton_amount: Option<Decimal>,
}

/// Generic `{success, message, data}` answer.
#[derive(Serialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub message: &'static str,
    pub data: T,
}

pub type AccountResponse = DataResponse<UserAccount>;
pub type StatisticsResponse = DataResponse<Statistics>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    pub user_id: Option<UserId>,
    pub amount: Option<Decimal>,
    pub transaction_type: Option<String>,
    pub transaction_data: Option<String>,
    pub wallet_history_url: Option<String>,
    pub user_wallet: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositResponse {
    pub success: bool,
    pub data: UserAccount,
    pub bonus_applied: bool,
    pub deposited_amount: Decimal,
    pub received_amount: Decimal,
    pub bonus_amount: Decimal,
    pub transaction_type: Option<String>,
    pub wallet_history_url: Option<String>,
    pub message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    pub user_id: Option<UserId>,
    pub amount: Option<Decimal>,
    pub wallet_address: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWalletRequest {
    pub user_id: Option<UserId>,
    pub wallet_address: Option<String>,
}

/// ```
/// {
///   "title": "TON Boost",
///   "description": "Doubles TON production",
///   "payload": "{\"item_id\":\"ton_boost\"}",
///   "currency": "XTR",
///   "prices": [{ "label": "TON Boost", "amount": 100 }]
/// }
/// ```
///
/// Prices are kept as raw JSON so each field can be checked individually.
#[derive(Deserialize)]
pub struct CreateInvoiceRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub payload: Option<String>,
    pub currency: Option<String>,
    pub prices: Option<Vec<Value>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceResponse {
    pub invoice_link: String,
}

#[derive(Deserialize)]
pub struct VerifyPaymentRequest {
    pub payload: Option<String>,
    #[serde(alias = "userId")]
    pub user_id: Option<UserId>,
}

#[derive(Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum PurchaseResponse {
    Processed {
        success: bool,
        message: &'static str,
        nft_count: Option<i64>,
        user_count: Option<i32>,
    },
    SoldOut {
        success: bool,
        sold_out: bool,
    },
    Duplicate {
        success: bool,
        duplicate: bool,
    },
    AlreadyOwned {
        success: bool,
        already_owned: bool,
    },
}

impl From<PurchaseOutcome> for PurchaseResponse {
    fn from(outcome: PurchaseOutcome) -> Self {
        match outcome {
            PurchaseOutcome::Processed {
                nft_count,
                user_count,
            } => Self::Processed {
                success: true,
                message: "Payment processed successfully",
                nft_count,
                user_count,
            },
            PurchaseOutcome::SoldOut => Self::SoldOut {
                success: true,
                sold_out: true,
            },
            PurchaseOutcome::Duplicate => Self::Duplicate {
                success: true,
                duplicate: true,
            },
            PurchaseOutcome::AlreadyOwned => Self::AlreadyOwned {
                success: true,
                already_owned: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_id_accepts_numbers_and_strings() {
        let from_number: AdsRewardRequest =
            serde_json::from_value(json!({ "telegram_user_id": 42 })).unwrap();
        assert_eq!(from_number.telegram_user_id, Some(UserId(42)));

        let from_string: WithdrawRequest =
            serde_json::from_value(json!({ "userId": " 42 " })).unwrap();
        assert_eq!(from_string.user_id, Some(UserId(42)));

        let missing: WithdrawRequest = serde_json::from_value(json!({})).unwrap();
        assert_eq!(missing.user_id, None);
    }

    #[test]
    fn test_user_id_rejects_non_positive_and_garbage() {
        for id in [json!(0), json!(-5), json!("abc"), json!(""), json!(true)] {
            let parsed = serde_json::from_value::<WithdrawRequest>(json!({ "userId": id }));
            assert!(parsed.is_err(), "accepted {}", id);
        }
    }

    #[test]
    fn test_claim_task_aliases() {
        let body: ClaimTaskRequest = serde_json::from_value(json!({
            "id": "join_channel",
            "amount": 25,
            "telegram_user_id": "7"
        }))
        .unwrap();
        assert_eq!(body.task_id.as_deref(), Some("join_channel"));
        assert_eq!(body.reward_amount, Some(Decimal::from(25)));
        assert_eq!(body.telegram_user_id, Some(UserId(7)));
    }

    #[test]
    fn test_purchase_response_shapes() {
        let processed = serde_json::to_value(PurchaseResponse::from(PurchaseOutcome::Processed {
            nft_count: None,
            user_count: None,
        }))
        .unwrap();
        assert_eq!(processed["success"], true);
        assert!(processed["nftCount"].is_null());
        assert!(processed.get("userCount").is_some());

        let sold_out = serde_json::to_value(PurchaseResponse::from(PurchaseOutcome::SoldOut)).unwrap();
        assert_eq!(sold_out, json!({ "success": true, "soldOut": true }));

        let owned =
            serde_json::to_value(PurchaseResponse::from(PurchaseOutcome::AlreadyOwned)).unwrap();
        assert_eq!(owned, json!({ "success": true, "alreadyOwned": true }));
    }
}
