//! Numeric balance fields and the adjust-then-round rule every mutation follows.

use crate::user::UserAccount;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use thiserror::Error;

/// Coins granted to a freshly created account.
pub const STARTING_COINS: Decimal = Decimal::from_parts(500_000, 0, 0, false, 3);
/// Credited to both `coins` and `coins_for_invite` of a referrer.
pub const REFERRAL_REWARD: Decimal = Decimal::from_parts(50, 0, 0, false, 0);
/// Fixed reward for watching an ad.
pub const AD_REWARD: Decimal = Decimal::from_parts(75, 0, 0, false, 0);
/// Default `coinsToAdd` for the coins update.
pub const DEFAULT_COINS_TO_ADD: Decimal = Decimal::from_parts(50, 0, 0, false, 0);
/// Multiplier applied to TON deposits.
pub const DEPOSIT_BONUS_MULTIPLIER: Decimal = Decimal::from_parts(15, 0, 0, false, 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Coins,
    TonAmount,
    DepositAmount,
    WithdrawAmount,
    BetAmount,
    Stars,
    CoinsForInvite,
}

impl Field {
    /// Fractional digits kept after every mutation.
    pub const fn precision(self) -> u32 {
        match self {
            Field::TonAmount | Field::DepositAmount | Field::WithdrawAmount => 6,
            Field::Coins | Field::BetAmount | Field::Stars | Field::CoinsForInvite => 3,
        }
    }

    pub const fn column(self) -> &'static str {
        match self {
            Field::Coins => "coins",
            Field::TonAmount => "ton_amount",
            Field::DepositAmount => "deposit_amount",
            Field::WithdrawAmount => "withdraw_amount",
            Field::BetAmount => "bet_amount",
            Field::Stars => "stars",
            Field::CoinsForInvite => "coins_for_invite",
        }
    }
}

/// Half-up rounding to `precision` fractional digits.
pub fn round(value: Decimal, precision: u32) -> Decimal {
    value.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Adjustment {
    pub field: Field,
    pub delta: Decimal,
    /// Reject when the current balance does not cover the debit.
    pub checked: bool,
}

impl Adjustment {
    pub fn credit(field: Field, amount: Decimal) -> Self {
        Self {
            field,
            delta: amount,
            checked: false,
        }
    }

    pub fn debit(field: Field, amount: Decimal) -> Self {
        Self {
            field,
            delta: -amount,
            checked: true,
        }
    }

    /// Positive deltas credit, negative deltas are checked debits.
    pub fn signed(field: Field, delta: Decimal) -> Self {
        if delta.is_sign_negative() && !delta.is_zero() {
            Self::debit(field, -delta)
        } else {
            Self::credit(field, delta)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LedgerError {
    Insufficient { field: Field },
    Overflow,
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Insufficient {
                field: Field::Coins,
            } => f.write_str("Insufficient coins"),
            LedgerError::Insufficient { .. } => f.write_str("Insufficient funds"),
            LedgerError::Overflow => f.write_str("Amount out of range"),
        }
    }
}

/// Exclusive bound on every stored amount; the widest column is `NUMERIC(20, 6)`.
pub const AMOUNT_LIMIT: Decimal = Decimal::from_parts(0x107A_4000, 0x5AF3, 0, false, 0);

/// Rounds `value` and rejects it when it does not fit the columns.
pub fn bounded(value: Decimal, precision: u32) -> Result<Decimal, LedgerError> {
    let value = round(value, precision);
    if value.abs() >= AMOUNT_LIMIT {
        return Err(LedgerError::Overflow);
    }
    Ok(value)
}

/// `current + delta`, rounded and bounded.
pub fn checked_add(
    current: Decimal,
    delta: Decimal,
    precision: u32,
) -> Result<Decimal, LedgerError> {
    let sum = current.checked_add(delta).ok_or(LedgerError::Overflow)?;
    bounded(sum, precision)
}

/// A record holding numeric ledger fields.
pub trait Ledger {
    fn balance(&self, field: Field) -> Decimal;

    fn balance_mut(&mut self, field: Field) -> &mut Decimal;

    /// Applies all adjustments or none. Every debit is checked against the
    /// balance it would see before anything is written.
    fn apply(&mut self, adjustments: &[Adjustment]) -> Result<(), LedgerError> {
        let mut staged: Vec<(Field, Decimal)> = Vec::with_capacity(adjustments.len());

        for adjustment in adjustments {
            let current = staged
                .iter()
                .rev()
                .find(|(field, _)| *field == adjustment.field)
                .map(|(_, value)| *value)
                .unwrap_or_else(|| self.balance(adjustment.field));

            if adjustment.checked && current < -adjustment.delta {
                return Err(LedgerError::Insufficient {
                    field: adjustment.field,
                });
            }

            let next = checked_add(current, adjustment.delta, adjustment.field.precision())?;
            staged.push((adjustment.field, next));
        }

        for (field, value) in staged {
            *self.balance_mut(field) = value;
        }
        Ok(())
    }

    /// Absolute overwrite, rounded like any other mutation.
    fn set(&mut self, field: Field, value: Decimal) -> Result<(), LedgerError> {
        *self.balance_mut(field) = bounded(value, field.precision())?;
        Ok(())
    }
}

impl Ledger for UserAccount {
    fn balance(&self, field: Field) -> Decimal {
        match field {
            Field::Coins => self.coins,
            Field::TonAmount => self.ton_amount,
            Field::DepositAmount => self.deposit_amount,
            Field::WithdrawAmount => self.withdraw_amount,
            Field::BetAmount => self.bet_amount,
            Field::Stars => self.stars,
            Field::CoinsForInvite => self.coins_for_invite,
        }
    }

    fn balance_mut(&mut self, field: Field) -> &mut Decimal {
        match field {
            Field::Coins => &mut self.coins,
            Field::TonAmount => &mut self.ton_amount,
            Field::DepositAmount => &mut self.deposit_amount,
            Field::WithdrawAmount => &mut self.withdraw_amount,
            Field::BetAmount => &mut self.bet_amount,
            Field::Stars => &mut self.stars,
            Field::CoinsForInvite => &mut self.coins_for_invite,
        }
    }
}

/// Adjustments for a deposit: TON credited with the bonus, raw amount tracked
/// separately.
pub fn deposit(amount: Decimal) -> Result<[Adjustment; 2], LedgerError> {
    let credited = amount
        .checked_mul(DEPOSIT_BONUS_MULTIPLIER)
        .ok_or(LedgerError::Overflow)?;
    Ok([
        Adjustment::credit(Field::TonAmount, credited),
        Adjustment::credit(Field::DepositAmount, amount),
    ])
}

/// Adjustments for a withdrawal: TON debited, withdrawn total credited.
pub fn withdraw(amount: Decimal) -> [Adjustment; 2] {
    [
        Adjustment::debit(Field::TonAmount, amount),
        Adjustment::credit(Field::WithdrawAmount, amount),
    ]
}

/// Adjustments for converting coins into TON.
pub fn convert_coins(coins: Decimal, ton: Decimal) -> [Adjustment; 2] {
    [
        Adjustment::debit(Field::Coins, coins),
        Adjustment::credit(Field::TonAmount, ton),
    ]
}

/// Adjustments granted to a referrer for one new invitee.
pub fn referral_reward() -> [Adjustment; 2] {
    [
        Adjustment::credit(Field::Coins, REFERRAL_REWARD),
        Adjustment::credit(Field::CoinsForInvite, REFERRAL_REWARD),
    ]
}
