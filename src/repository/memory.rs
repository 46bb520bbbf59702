use super::{
    claim, credit_referral, grant_purchase, purchase_outcome, PurchaseConflict, RepoError,
    RepoResult, UserRepository,
};
use crate::catalog::Item;
use crate::ledger::{Adjustment, Field, Ledger};
use crate::user::{PaymentRecord, Round, Statistics, UserAccount};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Process-local store. Every operation holds the lock for its whole
/// read-modify-write.
#[derive(Default)]
pub struct MemoryUserRepository {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    users: HashMap<i64, UserAccount>,
    nft_counts: HashMap<Item, i64>,
    statistics: HashMap<i64, Statistics>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` on a copy of the account and stores the copy only if `f` succeeds.
    async fn mutate<F>(&self, id: i64, f: F) -> RepoResult<UserAccount>
    where
        F: FnOnce(&mut UserAccount) -> RepoResult<()> + Send,
    {
        let mut state = self.state.lock().await;
        let stored = state
            .users
            .get_mut(&id)
            .ok_or(RepoError::UserNotFound(id))?;

        let mut next = stored.clone();
        f(&mut next)?;
        next.updated_at = Utc::now();
        *stored = next.clone();

        Ok(next)
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_user(&self, id: i64) -> RepoResult<Option<UserAccount>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn create_user(&self, account: &UserAccount) -> RepoResult<Option<UserAccount>> {
        let mut state = self.state.lock().await;
        if state.users.contains_key(&account.telegram_user_id) {
            return Ok(None);
        }
        state
            .users
            .insert(account.telegram_user_id, account.clone());
        Ok(Some(account.clone()))
    }

    async fn set_avatar(&self, id: i64, avatar: &str) -> RepoResult<UserAccount> {
        self.mutate(id, |acc| {
            acc.avatar = Some(avatar.to_string());
            Ok(())
        })
        .await
    }

    async fn set_wallet(&self, id: i64, wallet: &str) -> RepoResult<UserAccount> {
        self.mutate(id, |acc| {
            acc.wallet = wallet.to_string();
            Ok(())
        })
        .await
    }

    async fn adjust(&self, id: i64, adjustments: &[Adjustment]) -> RepoResult<UserAccount> {
        self.mutate(id, |acc| Ok(acc.apply(adjustments)?)).await
    }

    async fn set_balance(&self, id: i64, field: Field, value: Decimal) -> RepoResult<UserAccount> {
        self.mutate(id, |acc| Ok(acc.set(field, value)?)).await
    }

    async fn credit_referrer(&self, id: i64) -> RepoResult<UserAccount> {
        self.mutate(id, credit_referral).await
    }

    async fn claim_task(&self, id: i64, task_id: &str, reward: Decimal) -> RepoResult<UserAccount> {
        self.mutate(id, |acc| claim(acc, task_id, reward)).await
    }

    async fn record_purchase(
        &self,
        id: i64,
        item: Item,
        payment: &PaymentRecord,
    ) -> RepoResult<Result<UserAccount, PurchaseConflict>> {
        let result = self.mutate(id, |acc| grant_purchase(acc, item, payment)).await;
        purchase_outcome(result)
    }

    async fn nft_count(&self, item: Item) -> RepoResult<i64> {
        let state = self.state.lock().await;
        Ok(state.nft_counts.get(&item).copied().unwrap_or(0))
    }

    async fn reserve_nft(&self, item: Item, cap: i64) -> RepoResult<Option<i64>> {
        let mut state = self.state.lock().await;
        let count = state.nft_counts.entry(item).or_insert(0);
        if *count >= cap {
            return Ok(None);
        }
        *count += 1;
        Ok(Some(*count))
    }

    async fn release_nft(&self, item: Item) -> RepoResult<()> {
        let mut state = self.state.lock().await;
        if let Some(count) = state.nft_counts.get_mut(&item) {
            *count = (*count - 1).max(0);
        }
        Ok(())
    }

    async fn statistics(&self, id: i64) -> RepoResult<Option<Statistics>> {
        Ok(self.state.lock().await.statistics.get(&id).cloned())
    }

    async fn record_round(&self, id: i64, round: &Round) -> RepoResult<Statistics> {
        let mut state = self.state.lock().await;
        let mut stats = state
            .statistics
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Statistics::empty(id));
        stats.record(round)?;
        state.statistics.insert(id, stats.clone());
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerError, STARTING_COINS};
    use crate::user::NewUser;
    use std::str::FromStr;

    fn account(id: i64) -> UserAccount {
        UserAccount::new(
            NewUser {
                telegram_user_id: id,
                first_name: Some("Test".to_string()),
                last_name: None,
                username: None,
                avatar: None,
            },
            format!("https://t.me/TONJacketBot?startapp=ref_{}", id),
            STARTING_COINS,
        )
    }

    fn payment(payload: &str, item: Item) -> PaymentRecord {
        PaymentRecord {
            payload: payload.to_string(),
            item_id: item.id().to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_user_only_once() {
        let repo = MemoryUserRepository::new();
        assert!(repo.create_user(&account(1)).await.unwrap().is_some());
        assert!(repo.create_user(&account(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mutation_returns_stored_account() {
        let repo = MemoryUserRepository::new();
        repo.create_user(&account(1)).await.unwrap();

        let returned = repo.set_wallet(1, "EQwallet").await.unwrap();
        let stored = repo.find_user(1).await.unwrap().unwrap();
        assert_eq!(returned.wallet, "EQwallet");
        assert_eq!(stored.wallet, returned.wallet);
        assert_eq!(stored.updated_at, returned.updated_at);

        let missing = repo.set_wallet(2, "EQwallet").await;
        assert!(matches!(missing, Err(RepoError::UserNotFound(2))));
    }

    #[tokio::test]
    async fn test_failed_adjustment_leaves_row_untouched() {
        let repo = MemoryUserRepository::new();
        repo.create_user(&account(1)).await.unwrap();

        let result = repo
            .adjust(
                1,
                &[
                    Adjustment::credit(Field::Stars, Decimal::TEN),
                    Adjustment::debit(Field::TonAmount, Decimal::ONE),
                ],
            )
            .await;
        assert!(matches!(result, Err(RepoError::Ledger(LedgerError::Insufficient { .. }))));

        let stored = repo.find_user(1).await.unwrap().unwrap();
        assert_eq!(stored.stars, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_missing_user() {
        let repo = MemoryUserRepository::new();
        let result = repo.set_wallet(42, "EQ...").await;
        assert!(matches!(result, Err(RepoError::UserNotFound(42))));
    }

    #[tokio::test]
    async fn test_claim_task_once() {
        let repo = MemoryUserRepository::new();
        repo.create_user(&account(1)).await.unwrap();

        let reward = Decimal::from_str("12.5").unwrap();
        let acc = repo.claim_task(1, "join_channel", reward).await.unwrap();
        assert_eq!(acc.coins, Decimal::from_str("512.5").unwrap());

        let again = repo.claim_task(1, "join_channel", reward).await;
        assert!(matches!(again, Err(RepoError::TaskAlreadyClaimed(_))));
    }

    #[tokio::test]
    async fn test_purchase_conflicts() {
        let repo = MemoryUserRepository::new();
        repo.create_user(&account(1)).await.unwrap();

        let first = repo
            .record_purchase(1, Item::TonBoost, &payment("p1", Item::TonBoost))
            .await
            .unwrap();
        assert!(first.unwrap().purchases.ton_boost);

        let replay = repo
            .record_purchase(1, Item::TonBoost, &payment("p1", Item::TonBoost))
            .await
            .unwrap();
        assert_eq!(replay.unwrap_err(), PurchaseConflict::Duplicate);

        let rebuy = repo
            .record_purchase(1, Item::TonBoost, &payment("p2", Item::TonBoost))
            .await
            .unwrap();
        assert_eq!(rebuy.unwrap_err(), PurchaseConflict::AlreadyOwned);

        let stored = repo.find_user(1).await.unwrap().unwrap();
        assert_eq!(stored.payments.len(), 1);
    }

    #[tokio::test]
    async fn test_nft_supply_is_capped() {
        let repo = MemoryUserRepository::new();
        assert_eq!(repo.reserve_nft(Item::PalmNft, 2).await.unwrap(), Some(1));
        assert_eq!(repo.reserve_nft(Item::PalmNft, 2).await.unwrap(), Some(2));
        assert_eq!(repo.reserve_nft(Item::PalmNft, 2).await.unwrap(), None);

        repo.release_nft(Item::PalmNft).await.unwrap();
        assert_eq!(repo.nft_count(Item::PalmNft).await.unwrap(), 1);
        assert_eq!(repo.nft_count(Item::FlowerNft).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_record_round() {
        let repo = MemoryUserRepository::new();
        let bet = Decimal::from_str("0.5").unwrap();

        repo.record_round(7, &Round::new(bet, None)).await.unwrap();
        let stats = repo
            .record_round(7, &Round::new(bet, Some(Decimal::TWO)))
            .await
            .unwrap();

        assert_eq!(stats.total_bet, Decimal::ONE);
        assert_eq!(stats.total_won, Decimal::TWO);
        assert_eq!(stats.total_lost, bet);
        assert_eq!(stats.balance(), Decimal::from_str("1.5").unwrap());
    }

    #[tokio::test]
    async fn test_record_round_out_of_range_keeps_totals() {
        let repo = MemoryUserRepository::new();
        repo.record_round(7, &Round::new(Decimal::ONE, None))
            .await
            .unwrap();

        let huge = Decimal::from_scientific("7e28").unwrap();
        let result = repo.record_round(7, &Round::new(huge, None)).await;
        assert!(matches!(result, Err(RepoError::Ledger(LedgerError::Overflow))));

        let stats = repo.statistics(7).await.unwrap().unwrap();
        assert_eq!(stats.total_bet, Decimal::ONE);
        assert_eq!(stats.total_lost, Decimal::ONE);
    }
}
