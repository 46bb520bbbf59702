use crate::catalog::Item;
use crate::ledger::{self, Field, LedgerError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Wallet value stored until the player connects one.
pub const NO_WALLET: &str = "no wallet";

/// One row per Telegram user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserAccount {
    pub telegram_user_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub avatar: Option<String>,
    pub wallet: String,
    pub coins: Decimal,
    pub ton_amount: Decimal,
    pub deposit_amount: Decimal,
    pub withdraw_amount: Decimal,
    pub bet_amount: Decimal,
    pub stars: Decimal,
    pub coins_for_invite: Decimal,
    pub invited_friends: i32,
    pub invite_link: String,
    pub claimed_tasks: Vec<String>,
    #[sqlx(json)]
    pub payments: Vec<PaymentRecord>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub purchases: Purchases,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    /// Builds the account created on first authentication.
    pub fn new(profile: NewUser, invite_link: String, starting_coins: Decimal) -> Self {
        let now = Utc::now();
        Self {
            telegram_user_id: profile.telegram_user_id,
            first_name: profile.first_name,
            last_name: profile.last_name,
            username: profile.username,
            avatar: profile.avatar,
            wallet: NO_WALLET.to_string(),
            coins: starting_coins,
            ton_amount: Decimal::ZERO,
            deposit_amount: Decimal::ZERO,
            withdraw_amount: Decimal::ZERO,
            bet_amount: Decimal::ZERO,
            stars: Decimal::ZERO,
            coins_for_invite: Decimal::ZERO,
            invited_friends: 0,
            invite_link,
            claimed_tasks: Vec::new(),
            payments: Vec::new(),
            purchases: Purchases::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_payment(&self, payload: &str) -> bool {
        self.payments.iter().any(|p| p.payload == payload)
    }

    pub fn has_claimed(&self, task_id: &str) -> bool {
        self.claimed_tasks.iter().any(|t| t == task_id)
    }
}

/// Profile fields taken from verified init-data.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub telegram_user_id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub avatar: Option<String>,
}

/// A processed Stars payment, kept to reject replays of the same payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payload: String,
    pub item_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-user purchase state: one flag per booster/upgrade, one counter per NFT.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Purchases {
    pub ton_boost: bool,
    pub apps_boost: bool,
    pub prem_boost: bool,
    pub eth_boost: bool,
    pub btc_boost: bool,
    pub sol_boost: bool,
    pub near_boost: bool,
    pub up_storage: bool,
    pub up_boosters: bool,
    pub flower_nft_purchased: i32,
    pub cactus_nft_purchased: i32,
    pub palm_nft_purchased: i32,
    pub spruce_nft_purchased: i32,
}

impl Purchases {
    fn flag_mut(&mut self, item: Item) -> Option<&mut bool> {
        match item {
            Item::TonBoost => Some(&mut self.ton_boost),
            Item::AppsBoost => Some(&mut self.apps_boost),
            Item::PremBoost => Some(&mut self.prem_boost),
            Item::EthBoost => Some(&mut self.eth_boost),
            Item::BtcBoost => Some(&mut self.btc_boost),
            Item::SolBoost => Some(&mut self.sol_boost),
            Item::NearBoost => Some(&mut self.near_boost),
            Item::UpStorage => Some(&mut self.up_storage),
            Item::UpBoosters => Some(&mut self.up_boosters),
            _ => None,
        }
    }

    fn counter_mut(&mut self, item: Item) -> Option<&mut i32> {
        match item {
            Item::FlowerNft => Some(&mut self.flower_nft_purchased),
            Item::CactusNft => Some(&mut self.cactus_nft_purchased),
            Item::PalmNft => Some(&mut self.palm_nft_purchased),
            Item::SpruceNft => Some(&mut self.spruce_nft_purchased),
            _ => None,
        }
    }

    pub fn owns(&self, item: Item) -> bool {
        match item {
            Item::TonBoost => self.ton_boost,
            Item::AppsBoost => self.apps_boost,
            Item::PremBoost => self.prem_boost,
            Item::EthBoost => self.eth_boost,
            Item::BtcBoost => self.btc_boost,
            Item::SolBoost => self.sol_boost,
            Item::NearBoost => self.near_boost,
            Item::UpStorage => self.up_storage,
            Item::UpBoosters => self.up_boosters,
            _ => false,
        }
    }

    pub fn nft_count(&self, item: Item) -> i32 {
        match item {
            Item::FlowerNft => self.flower_nft_purchased,
            Item::CactusNft => self.cactus_nft_purchased,
            Item::PalmNft => self.palm_nft_purchased,
            Item::SpruceNft => self.spruce_nft_purchased,
            _ => 0,
        }
    }

    /// Sets the item's flag, or bumps its counter for NFTs.
    pub fn grant(&mut self, item: Item) {
        if let Some(flag) = self.flag_mut(item) {
            *flag = true;
        } else if let Some(count) = self.counter_mut(item) {
            *count += 1;
        }
    }
}

/// Accumulated spin results for one user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Statistics {
    pub telegram_user_id: i64,
    pub total_bet: Decimal,
    pub total_won: Decimal,
    pub total_lost: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Statistics {
    pub fn empty(telegram_user_id: i64) -> Self {
        let now = Utc::now();
        Self {
            telegram_user_id,
            total_bet: Decimal::ZERO,
            total_won: Decimal::ZERO,
            total_lost: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Net result of all rounds, won minus lost.
    pub fn balance(&self) -> Decimal {
        self.total_won - self.total_lost
    }

    /// Adds one round. Nothing changes when a total would leave the storable range.
    pub fn record(&mut self, round: &Round) -> Result<(), LedgerError> {
        let total_bet = add_ton(self.total_bet, round.bet)?;
        let total_won = add_ton(self.total_won, round.won)?;
        let total_lost = add_ton(self.total_lost, round.lost)?;

        self.total_bet = total_bet;
        self.total_won = total_won;
        self.total_lost = total_lost;
        self.updated_at = Utc::now();
        Ok(())
    }
}

fn add_ton(total: Decimal, amount: Decimal) -> Result<Decimal, LedgerError> {
    ledger::checked_add(total, amount, Field::TonAmount.precision())
}

/// Contribution of one spin to the statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Round {
    pub bet: Decimal,
    pub won: Decimal,
    pub lost: Decimal,
}

impl Round {
    /// A won round adds the payout to `won`, a lost one adds the bet to `lost`.
    pub fn new(bet: Decimal, win: Option<Decimal>) -> Self {
        match win {
            Some(won) => Self {
                bet,
                won,
                lost: Decimal::ZERO,
            },
            None => Self {
                bet,
                won: Decimal::ZERO,
                lost: bet,
            },
        }
    }
}
