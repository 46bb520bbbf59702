use crate::{
    auth::{AuthOrchestrator, AuthOutcome},
    catalog::Item,
    config::Config,
    dto::*,
    error::{anyhow, AppError},
    init_data::InitDataError,
    ledger::{self, Adjustment, Field, AD_REWARD, DEFAULT_COINS_TO_ADD},
    notify::{self, Withdrawal},
    purchase::{self, PurchaseLedger},
    repository::UserRepository,
    telegram::{Invoice, LabeledPrice, TelegramGateway},
    user::Round,
    JsonOrPlain,
};
use axum::{
    extract::State,
    http::{
        header::CONTENT_TYPE,
        HeaderValue, Method,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::{sync::Arc, time::Duration};
use tonlib::address::TonAddress;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<dyn UserRepository>,
    pub telegram: Arc<dyn TelegramGateway>,
}

pub fn router(state: AppState) -> anyhow::Result<Router> {
    let cors = cors_layer(&state.config.cors_origin)?;

    Ok(Router::new()
        .route("/api/auth", post(auth))
        .route("/api/claim-task", post(claim_task))
        .route("/api/ads-reward", post(ads_reward))
        .route("/api/update-coins", post(update_coins))
        .route("/api/update-ton", post(update_ton))
        .route("/api/update-bet", post(update_bet))
        .route("/api/update-stars", post(update_stars))
        .route("/api/update-statistics", post(update_statistics))
        .route("/api/convert-coins-to-ton", post(convert_coins_to_ton))
        .route("/api/deposit-ton", post(deposit_ton))
        .route("/api/process-withdraw", post(process_withdraw))
        .route("/api/update-wallet", post(update_wallet))
        .route("/api/create-invoice", post(create_invoice))
        .route("/api/verify-payment", post(verify_payment))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

fn cors_layer(origin: &str) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_headers([CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .max_age(Duration::from_secs(86_400));

    if origin == "*" {
        return Ok(layer.allow_origin(Any));
    }

    let origin = origin
        .parse::<HeaderValue>()
        .map_err(|e| anyhow!("invalid CORS_ORIGIN: {}", e))?;
    Ok(layer.allow_origin(origin).allow_credentials(true))
}

fn required<T>(value: Option<T>, message: &'static str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::bad_request(message))
}

fn positive(amount: Decimal, message: &'static str) -> Result<Decimal, AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::bad_request(message));
    }
    Ok(amount)
}

/// Accepts raw `wc:hex` as well as user-friendly base64 addresses.
fn parse_wallet(address: &str) -> Result<TonAddress, AppError> {
    let address = address.trim();
    TonAddress::from_hex_str(address)
        .or_else(|_| TonAddress::from_base64_url(address))
        .or_else(|_| TonAddress::from_base64_std(address))
        .map_err(|_| AppError::bad_request("Invalid wallet address"))
}

async fn health() -> &'static str {
    "ok"
}

/// Authenticate with Telegram WebApp init-data
async fn auth(
    State(state): State<AppState>,
    JsonOrPlain(body): JsonOrPlain<AuthRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let init_data = required(
        body.init_data.filter(|d| !d.is_empty()),
        "Missing initData",
    )?;

    let orchestrator = AuthOrchestrator::new(&state.config, state.users.as_ref());
    let response = match orchestrator
        .authenticate(&init_data, Utc::now().timestamp())
        .await?
    {
        AuthOutcome::Authenticated(account) => AuthResponse {
            is_valid: true,
            user_data: Some(account),
            error: None,
        },
        AuthOutcome::Rejected(e) => AuthResponse {
            is_valid: false,
            user_data: None,
            // stale init-data is reported without a reason
            error: matches!(e, InitDataError::HashMismatch).then(|| e.to_string()),
        },
    };

    Ok(Json(response))
}

async fn claim_task(
    State(state): State<AppState>,
    JsonOrPlain(body): JsonOrPlain<ClaimTaskRequest>,
) -> Result<Json<UserDataResponse>, AppError> {
    const MISSING: &str = "Missing required parameters";
    let task_id = required(body.task_id.filter(|t| !t.is_empty()), MISSING)?;
    let reward = required(body.reward_amount, MISSING)?;
    let UserId(user_id) = required(body.telegram_user_id, MISSING)?;
    let reward = positive(reward, "Invalid reward amount")?;

    let account = state.users.claim_task(user_id, &task_id, reward).await?;
    tracing::info!(user_id, task_id = %task_id, reward = %reward, "task reward claimed");

    Ok(Json(UserDataResponse {
        success: true,
        message: "Reward claimed successfully",
        user_data: account,
    }))
}

async fn ads_reward(
    State(state): State<AppState>,
    JsonOrPlain(body): JsonOrPlain<AdsRewardRequest>,
) -> Result<Json<UserDataResponse>, AppError> {
    let UserId(user_id) = required(
        body.telegram_user_id,
        "telegram_user_id is missing in request body",
    )?;

    let account = state
        .users
        .adjust(user_id, &[Adjustment::credit(Field::Coins, AD_REWARD)])
        .await?;
    tracing::info!(user_id, coins = %account.coins, "ad reward credited");

    Ok(Json(UserDataResponse {
        success: true,
        message: "Ad reward credited",
        user_data: account,
    }))
}

async fn update_coins(
    State(state): State<AppState>,
    JsonOrPlain(body): JsonOrPlain<UpdateCoinsRequest>,
) -> Result<Json<UpdateCoinsResponse>, AppError> {
    let UserId(user_id) = required(body.telegram_user_id, "Missing telegramUserId")?;
    let delta = body.coins_to_add.unwrap_or(DEFAULT_COINS_TO_ADD);

    let account = state
        .users
        .adjust(user_id, &[Adjustment::signed(Field::Coins, delta)])
        .await?;
    tracing::info!(user_id, field = Field::Coins.column(), delta = %delta, "balance updated");

    Ok(Json(UpdateCoinsResponse {
        success: true,
        new_coins: account.coins,
    }))
}

async fn update_ton(
    State(state): State<AppState>,
    JsonOrPlain(body): JsonOrPlain<UpdateTonRequest>,
) -> Result<Json<UpdateTonResponse>, AppError> {
    const MISSING: &str = "Missing telegramId or tonAmount";
    let UserId(user_id) = required(body.telegram_id, MISSING)?;
    let value = required(body.ton_amount, MISSING)?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AppError::bad_request("TON amount cannot be negative"));
    }

    let account = state
        .users
        .set_balance(user_id, Field::TonAmount, value)
        .await?;
    tracing::info!(
        user_id,
        field = Field::TonAmount.column(),
        value = %account.ton_amount,
        "balance set"
    );

    Ok(Json(UpdateTonResponse {
        success: true,
        ton_amount: account.ton_amount,
    }))
}

async fn update_bet(
    State(state): State<AppState>,
    JsonOrPlain(body): JsonOrPlain<UpdateBetRequest>,
) -> Result<Json<UpdateBetResponse>, AppError> {
    const MISSING: &str = "Missing telegramUserId or betAmount";
    let UserId(user_id) = required(body.telegram_user_id, MISSING)?;
    let delta = required(body.bet_amount, MISSING)?;

    let account = state
        .users
        .adjust(user_id, &[Adjustment::signed(Field::BetAmount, delta)])
        .await?;
    tracing::info!(user_id, field = Field::BetAmount.column(), delta = %delta, "balance updated");

    Ok(Json(UpdateBetResponse {
        success: true,
        new_bet_amount: account.bet_amount,
    }))
}

async fn update_stars(
    State(state): State<AppState>,
    JsonOrPlain(body): JsonOrPlain<UpdateStarsRequest>,
) -> Result<Json<UpdateStarsResponse>, AppError> {
    const MISSING: &str = "Missing telegramId or starsAmount";
    let UserId(user_id) = required(body.telegram_id, MISSING)?;
    let delta = required(body.stars_amount, MISSING)?;

    let account = state
        .users
        .adjust(user_id, &[Adjustment::signed(Field::Stars, delta)])
        .await?;
    tracing::info!(user_id, field = Field::Stars.column(), delta = %delta, "balance updated");

    Ok(Json(UpdateStarsResponse {
        success: true,
        new_stars: account.stars,
    }))
}

async fn update_statistics(
    State(state): State<AppState>,
    JsonOrPlain(body): JsonOrPlain<UpdateStatisticsRequest>,
) -> Result<Json<StatisticsResponse>, AppError> {
    const MISSING: &str = "Missing required fields: telegramUserId, betAmount";
    let UserId(user_id) = required(body.telegram_user_id, MISSING)?;
    let bet = required(body.bet_amount, MISSING)?;
    if bet.is_sign_negative() && !bet.is_zero() {
        return Err(AppError::bad_request("Invalid bet amount"));
    }

    let win = match body.is_win {
        true => Some(body.win_amount.unwrap_or(Decimal::ZERO)),
        false => None,
    };
    let stats = state
        .users
        .record_round(user_id, &Round::new(bet, win))
        .await?;

    Ok(Json(DataResponse {
        success: true,
        message: "Statistics updated successfully",
        data: stats,
    }))
}

async fn convert_coins_to_ton(
    State(state): State<AppState>,
    JsonOrPlain(body): JsonOrPlain<ConvertCoinsRequest>,
) -> Result<Json<AccountResponse>, AppError> {
    const MISSING: &str = "Missing required parameters";
    let UserId(user_id) = required(body.user_id, MISSING)?;
    let coins = positive(required(body.coins_amount, MISSING)?, "Invalid coins amount")?;
    let ton = positive(required(body.ton_amount, MISSING)?, "Invalid TON amount")?;

    let account = state
        .users
        .adjust(user_id, &ledger::convert_coins(coins, ton))
        .await?;
    tracing::info!(user_id, coins = %coins, ton = %ton, "coins converted");

    Ok(Json(DataResponse {
        success: true,
        message: "Conversion successful",
        data: account,
    }))
}

async fn deposit_ton(
    State(state): State<AppState>,
    JsonOrPlain(body): JsonOrPlain<DepositRequest>,
) -> Result<Json<DepositResponse>, AppError> {
    const MISSING: &str = "Missing required fields: userId, amount";
    let UserId(user_id) = required(body.user_id, MISSING)?;
    let amount = ledger::round(required(body.amount, MISSING)?, Field::TonAmount.precision());
    let amount = positive(amount, "Invalid amount")?;
    let adjustments = ledger::deposit(amount)?;

    let transaction_data: String = body
        .transaction_data
        .as_deref()
        .unwrap_or("-")
        .chars()
        .take(100)
        .collect();
    tracing::info!(
        user_id,
        amount = %amount,
        transaction_type = body.transaction_type.as_deref().unwrap_or("-"),
        transaction_data = %transaction_data,
        wallet_history_url = body.wallet_history_url.as_deref().unwrap_or("-"),
        user_wallet = body.user_wallet.as_deref().unwrap_or("-"),
        "deposit received"
    );

    let account = state
        .users
        .adjust(user_id, &adjustments)
        .await?;

    let received = ledger::round(adjustments[0].delta, Field::TonAmount.precision());
    let bonus = received - amount;

    Ok(Json(DepositResponse {
        success: true,
        data: account,
        bonus_applied: true,
        deposited_amount: amount,
        received_amount: received,
        bonus_amount: bonus,
        message: format!(
            "TON deposited successfully! You received {:.2} TON ({:.2} + {:.2} bonus)",
            ledger::round(received, 2),
            ledger::round(amount, 2),
            ledger::round(bonus, 2)
        ),
        transaction_type: body.transaction_type,
        wallet_history_url: body.wallet_history_url,
    }))
}

async fn process_withdraw(
    State(state): State<AppState>,
    JsonOrPlain(body): JsonOrPlain<WithdrawRequest>,
) -> Result<Json<AccountResponse>, AppError> {
    const MISSING: &str = "Missing required fields";
    let UserId(user_id) = required(body.user_id, MISSING)?;
    let amount = positive(required(body.amount, MISSING)?, "Invalid amount")?;
    let wallet = required(body.wallet_address.filter(|w| !w.is_empty()), MISSING)?;
    parse_wallet(&wallet)?;

    let account = state
        .users
        .adjust(user_id, &ledger::withdraw(amount))
        .await?;
    tracing::info!(user_id, amount = %amount, wallet = %wallet, "withdrawal requested");

    let stats = match state.users.statistics(user_id).await {
        Ok(stats) => stats,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "statistics unavailable for withdrawal report");
            None
        }
    };

    let withdrawal = Withdrawal {
        account: &account,
        amount,
        wallet: &wallet,
    };
    let mut messages = vec![notify::player_message(
        &withdrawal,
        &state.config.web_app_url,
    )];
    match state.config.creator_chat_id {
        Some(chat_id) => messages.push(notify::operator_report(
            chat_id,
            &withdrawal,
            stats.as_ref(),
            Utc::now(),
        )),
        None => tracing::warn!(user_id, "CREATOR_ID not set, operator not notified"),
    }
    for message in &messages {
        if let Err(e) = state.telegram.send_message(message).await {
            tracing::warn!(chat_id = message.chat_id, error = %e, "withdrawal notification failed");
        }
    }

    Ok(Json(DataResponse {
        success: true,
        message: "Withdrawal request submitted",
        data: account,
    }))
}

async fn update_wallet(
    State(state): State<AppState>,
    JsonOrPlain(body): JsonOrPlain<UpdateWalletRequest>,
) -> Result<Json<AccountResponse>, AppError> {
    const MISSING: &str = "Missing userId or walletAddress";
    let UserId(user_id) = required(body.user_id, MISSING)?;
    let wallet = required(body.wallet_address.filter(|w| !w.is_empty()), MISSING)?;
    parse_wallet(&wallet)?;

    let account = state.users.set_wallet(user_id, wallet.trim()).await?;
    tracing::info!(user_id, wallet = %account.wallet, "wallet updated");

    Ok(Json(DataResponse {
        success: true,
        message: "Wallet updated successfully",
        data: account,
    }))
}

/// Create a Telegram Stars invoice link
async fn create_invoice(
    State(state): State<AppState>,
    JsonOrPlain(body): JsonOrPlain<CreateInvoiceRequest>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let invoice = validate_invoice(body)?;

    let invoice_link = state
        .telegram
        .create_invoice_link(&invoice)
        .await
        .map_err(|e| AppError::ServerError(e.context("Failed to create invoice link")))?;
    tracing::info!(payload = %invoice.payload, "invoice link created");

    Ok(Json(InvoiceResponse { invoice_link }))
}

fn validate_invoice(body: CreateInvoiceRequest) -> Result<Invoice, AppError> {
    let title = body
        .title
        .filter(|t| t.chars().count() <= 100)
        .ok_or_else(|| AppError::bad_request("Invalid title"))?;
    let description = body
        .description
        .filter(|d| d.chars().count() <= 200)
        .ok_or_else(|| AppError::bad_request("Invalid description"))?;
    let payload = body
        .payload
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::bad_request("Invalid payload"))?;
    if body.currency.as_deref() != Some("XTR") {
        return Err(AppError::bad_request("Invalid currency. Must be XTR."));
    }

    let price = match body.prices.as_deref() {
        Some([price]) => price,
        _ => return Err(AppError::bad_request("Invalid prices format")),
    };
    let amount = price
        .get("amount")
        .and_then(|a| a.as_i64())
        .filter(|a| *a > 0)
        .ok_or_else(|| AppError::bad_request("Invalid price"))?;
    let label = price
        .get("label")
        .and_then(|l| l.as_str())
        .ok_or_else(|| AppError::bad_request("Invalid price label"))?;

    if let Ok(item) = purchase::parse_payload(&payload) {
        if i64::from(item.price()) != amount {
            return Err(AppError::bad_request(format!(
                "Price mismatch for {}",
                item.id()
            )));
        }
    }

    Ok(Invoice {
        title,
        description,
        payload,
        provider_token: String::new(),
        currency: "XTR".to_string(),
        prices: vec![LabeledPrice {
            label: label.to_string(),
            amount,
        }],
    })
}

async fn verify_payment(
    State(state): State<AppState>,
    JsonOrPlain(body): JsonOrPlain<VerifyPaymentRequest>,
) -> Result<Json<PurchaseResponse>, AppError> {
    const MISSING: &str = "Missing payload or user_id";
    let payload = required(body.payload.filter(|p| !p.is_empty()), MISSING)?;
    let UserId(user_id) = required(body.user_id, MISSING)?;
    let item: Item = purchase::parse_payload(&payload)?;

    let outcome = PurchaseLedger::new(state.users.as_ref())
        .process(user_id, item, &payload)
        .await?;
    tracing::info!(user_id, item_id = item.id(), outcome = ?outcome, "payment verified");

    Ok(Json(outcome.into()))
}
