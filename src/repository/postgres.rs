//! PostgreSQL implementation.
//!
//! Account mutations lock the row with `SELECT ... FOR UPDATE` inside a
//! transaction; dropping the transaction on an error path rolls it back and
//! releases the lock.

use super::{
    claim, credit_referral, grant_purchase, purchase_outcome, PurchaseConflict, RepoError,
    RepoResult, UserRepository,
};
use crate::catalog::Item;
use crate::ledger::{Adjustment, Field, Ledger};
use crate::user::{PaymentRecord, Round, Statistics, UserAccount};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_user(
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
    ) -> RepoResult<Option<UserAccount>> {
        let row = sqlx::query_as::<_, UserAccount>(
            "SELECT * FROM tonjacket WHERE telegram_user_id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row)
    }

    async fn save(tx: &mut Transaction<'_, Postgres>, acc: &UserAccount) -> RepoResult<UserAccount> {
        let p = &acc.purchases;
        let row = sqlx::query_as::<_, UserAccount>(
            r#"
            UPDATE tonjacket SET
                avatar = $2,
                wallet = $3,
                coins = $4,
                ton_amount = $5,
                deposit_amount = $6,
                withdraw_amount = $7,
                bet_amount = $8,
                stars = $9,
                coins_for_invite = $10,
                invited_friends = $11,
                claimed_tasks = $12,
                payments = $13,
                ton_boost = $14,
                apps_boost = $15,
                prem_boost = $16,
                eth_boost = $17,
                btc_boost = $18,
                sol_boost = $19,
                near_boost = $20,
                up_storage = $21,
                up_boosters = $22,
                flower_nft_purchased = $23,
                cactus_nft_purchased = $24,
                palm_nft_purchased = $25,
                spruce_nft_purchased = $26,
                updated_at = now()
            WHERE telegram_user_id = $1
            RETURNING *
            "#,
        )
        .bind(acc.telegram_user_id)
        .bind(&acc.avatar)
        .bind(&acc.wallet)
        .bind(acc.coins)
        .bind(acc.ton_amount)
        .bind(acc.deposit_amount)
        .bind(acc.withdraw_amount)
        .bind(acc.bet_amount)
        .bind(acc.stars)
        .bind(acc.coins_for_invite)
        .bind(acc.invited_friends)
        .bind(&acc.claimed_tasks)
        .bind(Json(&acc.payments))
        .bind(p.ton_boost)
        .bind(p.apps_boost)
        .bind(p.prem_boost)
        .bind(p.eth_boost)
        .bind(p.btc_boost)
        .bind(p.sol_boost)
        .bind(p.near_boost)
        .bind(p.up_storage)
        .bind(p.up_boosters)
        .bind(p.flower_nft_purchased)
        .bind(p.cactus_nft_purchased)
        .bind(p.palm_nft_purchased)
        .bind(p.spruce_nft_purchased)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row)
    }

    /// Locks the row, applies `f` and writes the result back in one transaction.
    async fn mutate<F>(&self, id: i64, f: F) -> RepoResult<UserAccount>
    where
        F: FnOnce(&mut UserAccount) -> RepoResult<()> + Send,
    {
        let mut tx = self.pool.begin().await?;

        let mut acc = Self::lock_user(&mut tx, id)
            .await?
            .ok_or(RepoError::UserNotFound(id))?;
        f(&mut acc)?;
        let saved = Self::save(&mut tx, &acc).await?;

        tx.commit().await?;
        Ok(saved)
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_user(&self, id: i64) -> RepoResult<Option<UserAccount>> {
        let row = sqlx::query_as::<_, UserAccount>(
            "SELECT * FROM tonjacket WHERE telegram_user_id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_user(&self, account: &UserAccount) -> RepoResult<Option<UserAccount>> {
        let row = sqlx::query_as::<_, UserAccount>(
            r#"
            INSERT INTO tonjacket (
                telegram_user_id,
                first_name,
                last_name,
                username,
                avatar,
                wallet,
                coins,
                invite_link
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (telegram_user_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(account.telegram_user_id)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.username)
        .bind(&account.avatar)
        .bind(&account.wallet)
        .bind(account.coins)
        .bind(&account.invite_link)
        .fetch_optional(&self.pool)
        .await?;

        if row.is_some() {
            tracing::info!(user_id = account.telegram_user_id, "User created");
        }
        Ok(row)
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
        let result = self
            .mutate(id, |acc| grant_purchase(acc, item, payment))
            .await;
        purchase_outcome(result)
    }

    async fn nft_count(&self, item: Item) -> RepoResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT count FROM nft_global_counts WHERE item_id = $1",
        )
        .bind(item.id())
        .fetch_optional(&self.pool)
        .await?;
        Ok(count.unwrap_or(0))
    }

    async fn reserve_nft(&self, item: Item, cap: i64) -> RepoResult<Option<i64>> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO nft_global_counts (item_id, count) VALUES ($1, 1)
            ON CONFLICT (item_id) DO UPDATE
                SET count = nft_global_counts.count + 1
                WHERE nft_global_counts.count < $2
            RETURNING count
            "#,
        )
        .bind(item.id())
        .bind(cap)
        .fetch_optional(&self.pool)
        .await?;
        Ok(count)
    }

    async fn release_nft(&self, item: Item) -> RepoResult<()> {
        sqlx::query(
            "UPDATE nft_global_counts SET count = count - 1 WHERE item_id = $1 AND count > 0",
        )
        .bind(item.id())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn statistics(&self, id: i64) -> RepoResult<Option<Statistics>> {
        let row = sqlx::query_as::<_, Statistics>(
            "SELECT * FROM statistics WHERE telegram_user_id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn record_round(&self, id: i64, round: &Round) -> RepoResult<Statistics> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO statistics (telegram_user_id) VALUES ($1) ON CONFLICT (telegram_user_id) DO NOTHING",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let mut stats = sqlx::query_as::<_, Statistics>(
            "SELECT * FROM statistics WHERE telegram_user_id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        stats.record(round)?;

        let row = sqlx::query_as::<_, Statistics>(
            r#"
            UPDATE statistics SET
                total_bet = $2,
                total_won = $3,
                total_lost = $4,
                updated_at = now()
            WHERE telegram_user_id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(stats.total_bet)
        .bind(stats.total_won)
        .bind(stats.total_lost)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row)
    }
}
