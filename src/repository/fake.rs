use super::{MemoryUserRepository, PurchaseConflict, RepoError, RepoResult, UserRepository};
use crate::catalog::Item;
use crate::ledger::{Adjustment, Field};
use crate::user::{PaymentRecord, Round, Statistics, UserAccount};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Memory store whose selected operations fail like a lost database.
#[derive(Default)]
pub struct FaultyRepository {
    pub inner: MemoryUserRepository,
    pub fail_lookup: bool,
    pub fail_avatar: bool,
    pub fail_purchase: bool,
}

fn unavailable<T>() -> RepoResult<T> {
    Err(RepoError::Database(sqlx::Error::PoolTimedOut))
}

#[async_trait]
impl UserRepository for FaultyRepository {
    async fn find_user(&self, id: i64) -> RepoResult<Option<UserAccount>> {
        if self.fail_lookup {
            return unavailable();
        }
        self.inner.find_user(id).await
    }

    async fn create_user(&self, account: &UserAccount) -> RepoResult<Option<UserAccount>> {
        self.inner.create_user(account).await
    }

    async fn set_avatar(&self, id: i64, avatar: &str) -> RepoResult<UserAccount> {
        if self.fail_avatar {
            return unavailable();
        }
        self.inner.set_avatar(id, avatar).await
    }

    async fn set_wallet(&self, id: i64, wallet: &str) -> RepoResult<UserAccount> {
        self.inner.set_wallet(id, wallet).await
    }

    async fn adjust(&self, id: i64, adjustments: &[Adjustment]) -> RepoResult<UserAccount> {
        self.inner.adjust(id, adjustments).await
    }

    async fn set_balance(&self, id: i64, field: Field, value: Decimal) -> RepoResult<UserAccount> {
        self.inner.set_balance(id, field, value).await
    }

    async fn credit_referrer(&self, id: i64) -> RepoResult<UserAccount> {
        self.inner.credit_referrer(id).await
    }

    async fn claim_task(&self, id: i64, task_id: &str, reward: Decimal) -> RepoResult<UserAccount> {
        self.inner.claim_task(id, task_id, reward).await
    }

    async fn record_purchase(
        &self,
        id: i64,
        item: Item,
        payment: &PaymentRecord,
    ) -> RepoResult<Result<UserAccount, PurchaseConflict>> {
        if self.fail_purchase {
            return unavailable();
        }
        self.inner.record_purchase(id, item, payment).await
    }

    async fn nft_count(&self, item: Item) -> RepoResult<i64> {
        self.inner.nft_count(item).await
    }

    async fn reserve_nft(&self, item: Item, cap: i64) -> RepoResult<Option<i64>> {
        self.inner.reserve_nft(item, cap).await
    }

    async fn release_nft(&self, item: Item) -> RepoResult<()> {
        self.inner.release_nft(item).await
    }

    async fn statistics(&self, id: i64) -> RepoResult<Option<Statistics>> {
        self.inner.statistics(id).await
    }

    async fn record_round(&self, id: i64, round: &Round) -> RepoResult<Statistics> {
        self.inner.record_round(id, round).await
    }
}
