//! Persistence of user accounts, NFT supply counters and spin statistics.
//!
//! Implementations serialize every read-modify-write per key: the account is
//! locked, mutated in memory through the functions below and written back as a
//! whole, or left untouched when the mutation fails.

use crate::catalog::{Item, ItemKind};
use crate::ledger::{self, Adjustment, Field, Ledger, LedgerError};
use crate::user::{PaymentRecord, Round, Statistics, UserAccount};
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

#[cfg(test)]
pub(crate) mod fake;
mod memory;
mod postgres;

pub use memory::MemoryUserRepository;
pub use postgres::PgUserRepository;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("User not found")]
    UserNotFound(i64),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Task already claimed")]
    TaskAlreadyClaimed(String),

    #[error("{0}")]
    Purchase(PurchaseConflict),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Purchase that must not be applied again. Reported to clients as a soft success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PurchaseConflict {
    #[error("Payment already processed")]
    Duplicate,
    #[error("Item already owned")]
    AlreadyOwned,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user(&self, id: i64) -> RepoResult<Option<UserAccount>>;

    /// Inserts `account` unless a row with the same id exists. Returns `None`
    /// when another request created the user first.
    async fn create_user(&self, account: &UserAccount) -> RepoResult<Option<UserAccount>>;

    async fn set_avatar(&self, id: i64, avatar: &str) -> RepoResult<UserAccount>;

    async fn set_wallet(&self, id: i64, wallet: &str) -> RepoResult<UserAccount>;

    /// Applies the adjustments atomically.
    async fn adjust(&self, id: i64, adjustments: &[Adjustment]) -> RepoResult<UserAccount>;

    async fn set_balance(&self, id: i64, field: Field, value: Decimal) -> RepoResult<UserAccount>;

    /// Credits the referral reward and counts one more invited friend.
    async fn credit_referrer(&self, id: i64) -> RepoResult<UserAccount>;

    async fn claim_task(&self, id: i64, task_id: &str, reward: Decimal) -> RepoResult<UserAccount>;

    /// Appends the payment and grants the item, unless the payload was already
    /// processed or the booster is already owned.
    async fn record_purchase(
        &self,
        id: i64,
        item: Item,
        payment: &PaymentRecord,
    ) -> RepoResult<Result<UserAccount, PurchaseConflict>>;

    /// Units of `item` issued so far across all users.
    async fn nft_count(&self, item: Item) -> RepoResult<i64>;

    /// Takes one unit of supply. `None` when `cap` is already reached.
    async fn reserve_nft(&self, item: Item, cap: i64) -> RepoResult<Option<i64>>;

    /// Gives back a unit taken by `reserve_nft`.
    async fn release_nft(&self, item: Item) -> RepoResult<()>;

    async fn statistics(&self, id: i64) -> RepoResult<Option<Statistics>>;

    async fn record_round(&self, id: i64, round: &Round) -> RepoResult<Statistics>;
}

pub(crate) fn claim(account: &mut UserAccount, task_id: &str, reward: Decimal) -> RepoResult<()> {
    if account.has_claimed(task_id) {
        return Err(RepoError::TaskAlreadyClaimed(task_id.to_string()));
    }
    account.apply(&[Adjustment::credit(Field::Coins, reward)])?;
    account.claimed_tasks.push(task_id.to_string());
    Ok(())
}

pub(crate) fn credit_referral(account: &mut UserAccount) -> RepoResult<()> {
    account.apply(&ledger::referral_reward())?;
    account.invited_friends += 1;
    Ok(())
}

pub(crate) fn grant_purchase(
    account: &mut UserAccount,
    item: Item,
    payment: &PaymentRecord,
) -> RepoResult<()> {
    if account.has_payment(&payment.payload) {
        return Err(RepoError::Purchase(PurchaseConflict::Duplicate));
    }
    if item.kind() == ItemKind::Booster && account.purchases.owns(item) {
        return Err(RepoError::Purchase(PurchaseConflict::AlreadyOwned));
    }
    account.payments.push(payment.clone());
    account.purchases.grant(item);
    Ok(())
}

/// Turns a conflict raised inside a locked mutation back into a soft outcome.
pub(crate) fn purchase_outcome(
    result: RepoResult<UserAccount>,
) -> RepoResult<Result<UserAccount, PurchaseConflict>> {
    match result {
        Ok(account) => Ok(Ok(account)),
        Err(RepoError::Purchase(conflict)) => Ok(Err(conflict)),
        Err(e) => Err(e),
    }
}
