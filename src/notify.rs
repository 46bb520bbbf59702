//! Texts sent to Telegram chats when a withdrawal is requested.

use crate::ledger;
use crate::telegram::OutgoingMessage;
use crate::user::{Statistics, UserAccount};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

const RULE: &str = "══════════════════";

pub struct Withdrawal<'a> {
    pub account: &'a UserAccount,
    pub amount: Decimal,
    pub wallet: &'a str,
}

/// Confirmation for the player, with a button back into the game.
pub fn player_message(withdrawal: &Withdrawal<'_>, web_app_url: &str) -> OutgoingMessage {
    let text = format!(
        "{rule}\n*WITHDRAWAL REQUEST*\n{rule}\n\n\
         *Amount:* {amount} TON\n\
         *Wallet:* `{wallet}`\n\n\
         *Status:* Processing...\n\n\
         {rule}\n\
         You will receive a notification from your wallet when the transaction is completed.",
        rule = RULE,
        amount = withdrawal.amount.normalize(),
        wallet = withdrawal.wallet,
    );

    OutgoingMessage::markdown(withdrawal.account.telegram_user_id, text)
        .with_web_app_button("🎰Spin!", web_app_url)
}

/// Report for the operator chat, with the player's lifetime statistics.
pub fn operator_report(
    chat_id: i64,
    withdrawal: &Withdrawal<'_>,
    stats: Option<&Statistics>,
    at: DateTime<Utc>,
) -> OutgoingMessage {
    let account = withdrawal.account;
    let name = account
        .username
        .as_deref()
        .or(account.first_name.as_deref())
        .unwrap_or("unknown");
    let (won, lost, balance) = match stats {
        Some(stats) => (stats.total_won, stats.total_lost, stats.balance()),
        None => (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
    };

    let text = format!(
        "{rule}\n   🔄 *NEW WITHDRAWAL REQUEST*\n{rule}\n\n\
         👤 *User:* {name}\n\
         🆔 *ID:* {id}\n\
         💎 *Amount:* {amount} TON\n\
         👛 *Wallet:* `{wallet}`\n\n\
         📊 *PLAYER STATISTICS:*\n\
         🎰 *Total bets:* {bets} TON\n\
         💰 *Total won:* {won:.2} TON\n\
         💸 *Total lost:* {lost:.2} TON\n\
         📈 *Balance:* {balance:.2} TON\n\
         💳 *Withdrawn in total:* {withdrawn:.2} TON\n\n\
         ⏰ *Time:* {time}",
        rule = RULE,
        name = name,
        id = account.telegram_user_id,
        amount = withdrawal.amount.normalize(),
        wallet = withdrawal.wallet,
        bets = account.bet_amount.normalize(),
        won = cents(won),
        lost = cents(lost),
        balance = cents(balance),
        withdrawn = cents(account.withdraw_amount),
        time = at.format("%-d %B %H:%M UTC"),
    );

    OutgoingMessage::markdown(chat_id, text)
}

fn cents(value: Decimal) -> Decimal {
    ledger::round(value, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::STARTING_COINS;
    use crate::user::NewUser;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn account() -> UserAccount {
        let mut account = UserAccount::new(
            NewUser {
                telegram_user_id: 77,
                first_name: Some("Ann".to_string()),
                last_name: None,
                username: None,
                avatar: None,
            },
            "https://t.me/TONJacketBot?startapp=ref_77".to_string(),
            STARTING_COINS,
        );
        account.bet_amount = Decimal::from_str("12.500").unwrap();
        account.withdraw_amount = Decimal::from_str("5").unwrap();
        account
    }

    #[test]
    fn test_player_message() {
        let account = account();
        let withdrawal = Withdrawal {
            account: &account,
            amount: Decimal::from_str("5.000000").unwrap(),
            wallet: "EQabc",
        };
        let message = player_message(&withdrawal, "https://ton-jacket.netlify.app/");

        assert_eq!(message.chat_id, 77);
        assert!(message.text.contains("*Amount:* 5 TON"));
        assert!(message.text.contains("`EQabc`"));
        assert!(message.reply_markup.is_some());
    }

    #[test]
    fn test_operator_report() {
        let account = account();
        let withdrawal = Withdrawal {
            account: &account,
            amount: Decimal::from_str("5").unwrap(),
            wallet: "EQabc",
        };
        let mut stats = Statistics::empty(77);
        stats.total_won = Decimal::from_str("3.456").unwrap();
        stats.total_lost = Decimal::from_str("1").unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();

        let message = operator_report(1000, &withdrawal, Some(&stats), at);

        assert_eq!(message.chat_id, 1000);
        assert!(message.reply_markup.is_none());
        assert!(message.text.contains("*User:* Ann"));
        assert!(message.text.contains("*Total bets:* 12.5 TON"));
        assert!(message.text.contains("*Total won:* 3.46 TON"));
        assert!(message.text.contains("*Balance:* 2.46 TON"));
        assert!(message.text.contains("*Time:* 9 March 14:05 UTC"));
    }

    #[test]
    fn test_operator_report_without_statistics() {
        let account = account();
        let withdrawal = Withdrawal {
            account: &account,
            amount: Decimal::ONE,
            wallet: "EQabc",
        };
        let message = operator_report(1000, &withdrawal, None, Utc::now());
        assert!(message.text.contains("*Total won:* 0.00 TON"));
    }
}
