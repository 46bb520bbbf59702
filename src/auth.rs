//! Verify-or-reject, then find-or-create, then reward the referrer.

use crate::config::Config;
use crate::init_data::{self, InitDataError, VerifiedInitData};
use crate::ledger::STARTING_COINS;
use crate::repository::{RepoError, RepoResult, UserRepository};
use crate::user::{NewUser, UserAccount};

pub enum AuthOutcome {
    Authenticated(UserAccount),
    /// Signature or freshness check failed.
    Rejected(InitDataError),
}

pub struct AuthOrchestrator<'a> {
    config: &'a Config,
    users: &'a dyn UserRepository,
}

impl<'a> AuthOrchestrator<'a> {
    pub fn new(config: &'a Config, users: &'a dyn UserRepository) -> Self {
        Self { config, users }
    }

    /// Malformed init-data is returned as `Err`, failed checks as
    /// [`AuthOutcome::Rejected`].
    pub async fn authenticate(&self, raw: &str, now: i64) -> anyhow::Result<AuthOutcome> {
        let verified = match init_data::verify(raw, &self.config.bot_token) {
            Ok(verified) => verified,
            Err(e) if e.is_unauthenticated() => return Ok(AuthOutcome::Rejected(e)),
            Err(e) => return Err(e.into()),
        };

        if let Err(e) =
            init_data::check_freshness(verified.auth_date, now, self.config.init_data_ttl)
        {
            tracing::warn!(
                user_id = verified.user.id,
                auth_date = verified.auth_date,
                "stale init-data"
            );
            return Ok(AuthOutcome::Rejected(e));
        }

        let account = match self.users.find_user(verified.user.id).await? {
            Some(existing) => self.use_existing(existing, &verified).await,
            None => self.create(&verified).await?,
        };

        Ok(AuthOutcome::Authenticated(account))
    }

    async fn use_existing(&self, existing: UserAccount, verified: &VerifiedInitData) -> UserAccount {
        let photo_url = match verified.user.photo_url.as_deref() {
            Some(url) if existing.avatar.is_none() && !url.is_empty() => url,
            _ => return existing,
        };

        match self.users.set_avatar(existing.telegram_user_id, photo_url).await {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(
                    user_id = existing.telegram_user_id,
                    error = %e,
                    "avatar backfill failed"
                );
                existing
            }
        }
    }

    async fn create(&self, verified: &VerifiedInitData) -> RepoResult<UserAccount> {
        let user = &verified.user;
        let account = UserAccount::new(
            NewUser {
                telegram_user_id: user.id,
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
                username: user.username.clone(),
                avatar: user.photo_url.clone().filter(|url| !url.is_empty()),
            },
            self.config.invite_link(user.id),
            STARTING_COINS,
        );

        match self.users.create_user(&account).await? {
            Some(created) => {
                if let Some(referrer_id) = verified.referrer_id() {
                    self.reward_referrer(referrer_id, user.id).await;
                }
                Ok(created)
            }
            // lost the race to a concurrent first login; that request owns the referral
            None => self
                .users
                .find_user(user.id)
                .await?
                .ok_or(RepoError::UserNotFound(user.id)),
        }
    }

    async fn reward_referrer(&self, referrer_id: i64, new_user_id: i64) {
        if referrer_id == new_user_id {
            tracing::warn!(user_id = new_user_id, "self-referral ignored");
            return;
        }

        match self.users.find_user(referrer_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(referrer_id, user_id = new_user_id, "referrer not found");
                return;
            }
            Err(e) => {
                tracing::error!(referrer_id, error = %e, "referrer lookup failed");
                return;
            }
        }

        match self.users.credit_referrer(referrer_id).await {
            Ok(referrer) => tracing::info!(
                referrer_id,
                user_id = new_user_id,
                invited_friends = referrer.invited_friends,
                "referral reward credited"
            ),
            Err(e) => tracing::error!(referrer_id, error = %e, "referral reward failed"),
        }
    }
}
