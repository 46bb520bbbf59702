//! Stars payment processing: replay protection, one-time boosters and the
//! shared NFT supply.

use crate::catalog::{Item, ItemKind};
use crate::repository::{PurchaseConflict, RepoError, RepoResult, UserRepository};
use crate::user::PaymentRecord;
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Invalid payload format")]
    Malformed(#[source] serde_json::Error),
    #[error("Unknown item_id")]
    UnknownItem(String),
}

#[derive(Deserialize)]
struct InvoicePayload {
    item_id: String,
}

/// Reads the item out of the JSON payload attached to the invoice.
pub fn parse_payload(payload: &str) -> Result<Item, PayloadError> {
    let parsed: InvoicePayload = serde_json::from_str(payload).map_err(PayloadError::Malformed)?;
    Item::from_id(&parsed.item_id).ok_or(PayloadError::UnknownItem(parsed.item_id))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    SoldOut,
    Duplicate,
    AlreadyOwned,
    Processed {
        /// Global units issued, NFTs only.
        nft_count: Option<i64>,
        /// Units owned by the buyer, NFTs only.
        user_count: Option<i32>,
    },
}

impl From<PurchaseConflict> for PurchaseOutcome {
    fn from(conflict: PurchaseConflict) -> Self {
        match conflict {
            PurchaseConflict::Duplicate => Self::Duplicate,
            PurchaseConflict::AlreadyOwned => Self::AlreadyOwned,
        }
    }
}

pub struct PurchaseLedger<'a> {
    users: &'a dyn UserRepository,
}

impl<'a> PurchaseLedger<'a> {
    pub fn new(users: &'a dyn UserRepository) -> Self {
        Self { users }
    }

    pub async fn process(
        &self,
        user_id: i64,
        item: Item,
        payload: &str,
    ) -> RepoResult<PurchaseOutcome> {
        let cap = match item.kind() {
            ItemKind::Nft { cap } => Some(cap),
            ItemKind::Booster | ItemKind::Upgrade => None,
        };

        if let Some(cap) = cap {
            if self.users.nft_count(item).await? >= cap {
                return Ok(PurchaseOutcome::SoldOut);
            }
        }

        // cheap pre-checks; record_purchase repeats them under the row lock
        let account = self
            .users
            .find_user(user_id)
            .await?
            .ok_or(RepoError::UserNotFound(user_id))?;
        if account.has_payment(payload) {
            return Ok(PurchaseOutcome::Duplicate);
        }
        if item.kind() == ItemKind::Booster && account.purchases.owns(item) {
            return Ok(PurchaseOutcome::AlreadyOwned);
        }

        let nft_count = match cap {
            Some(cap) => match self.users.reserve_nft(item, cap).await? {
                Some(count) => Some(count),
                None => return Ok(PurchaseOutcome::SoldOut),
            },
            None => None,
        };

        let payment = PaymentRecord {
            payload: payload.to_string(),
            item_id: item.id().to_string(),
            timestamp: Utc::now(),
        };

        let recorded = match self.users.record_purchase(user_id, item, &payment).await {
            Ok(Ok(account)) => account,
            Ok(Err(conflict)) => {
                self.release(item, nft_count).await;
                return Ok(conflict.into());
            }
            Err(e) => {
                self.release(item, nft_count).await;
                return Err(e);
            }
        };

        tracing::info!(user_id, item_id = item.id(), "purchase recorded");

        Ok(PurchaseOutcome::Processed {
            nft_count,
            user_count: nft_count.map(|_| recorded.purchases.nft_count(item)),
        })
    }

    async fn release(&self, item: Item, reserved: Option<i64>) {
        if reserved.is_none() {
            return;
        }
        if let Err(e) = self.users.release_nft(item).await {
            tracing::error!(item_id = item.id(), error = %e, "failed to release NFT reservation");
        }
    }
}
