//! Telegram WebApp init-data verification.
//!
//! ```text
//! secret_key = HMAC_SHA256(key = "WebAppData", msg = bot_token)
//! hash       = hex(HMAC_SHA256(key = secret_key, msg = data_check_string))
//! ```
//!
//! `data_check_string` is every received `key=value` pair except `hash`,
//! sorted by key and joined with `\n`.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const WEB_APP_DATA: &[u8] = b"WebAppData";

/// Default freshness window for `auth_date`, in seconds.
pub const DEFAULT_TTL: i64 = 86_400;

#[derive(Debug, Error)]
pub enum InitDataError {
    #[error("Missing user, auth_date, or hash in initData")]
    MissingField(&'static str),
    #[error("Error parsing user JSON")]
    MalformedUser(#[source] serde_json::Error),
    #[error("Malformed auth_date in initData")]
    MalformedAuthDate,
    #[error("Hash mismatch")]
    HashMismatch,
    #[error("auth_date is too old")]
    Expired,
}

impl InitDataError {
    /// Signature and freshness failures are expected client states, everything
    /// else is a malformed request.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::HashMismatch | Self::Expired)
    }
}

/// The `user` object embedded in init-data.
#[derive(Debug, Clone, Deserialize)]
pub struct WebAppUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// Init-data whose signature has been checked. Freshness is checked separately.
#[derive(Debug, Clone)]
pub struct VerifiedInitData {
    pub user: WebAppUser,
    pub auth_date: i64,
    pub start_param: Option<String>,
}

impl VerifiedInitData {
    /// Referrer id carried by a `start_param` of the form `ref_<id>`.
    pub fn referrer_id(&self) -> Option<i64> {
        self.start_param
            .as_deref()?
            .strip_prefix("ref_")?
            .parse()
            .ok()
    }
}

/// Parses the query string into decoded pairs, keeping duplicates and order.
pub fn parse_pairs(init_data: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(init_data.as_bytes())
        .into_owned()
        .collect()
}

fn field<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

/// Builds the canonical data-check string from decoded pairs.
pub fn data_check_string(pairs: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = pairs.iter().filter(|(k, _)| k != "hash").collect();
    // stable, so repeated keys keep their received order
    sorted.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}

fn keyed_mac(data_check_string: &str, bot_token: &str) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(WEB_APP_DATA).expect("HMAC can take key of any size");
    mac.update(bot_token.as_bytes());
    let secret_key = mac.finalize().into_bytes();

    let mut mac = HmacSha256::new_from_slice(&secret_key).expect("HMAC can take key of any size");
    mac.update(data_check_string.as_bytes());
    mac
}

/// Lowercase hex HMAC of `data_check_string` under the key derived from `bot_token`.
pub fn sign(data_check_string: &str, bot_token: &str) -> String {
    hex::encode(keyed_mac(data_check_string, bot_token).finalize().into_bytes())
}

/// Constant-time check of a lowercase hex `hash`.
fn hash_matches(data_check_string: &str, bot_token: &str, hash: &str) -> bool {
    if !hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return false;
    }
    match hex::decode(hash) {
        Ok(expected) => keyed_mac(data_check_string, bot_token)
            .verify_slice(&expected)
            .is_ok(),
        Err(_) => false,
    }
}

/// Checks the init-data signature and extracts the launching user.
pub fn verify(init_data: &str, bot_token: &str) -> Result<VerifiedInitData, InitDataError> {
    let pairs = parse_pairs(init_data);

    let user = field(&pairs, "user").ok_or(InitDataError::MissingField("user"))?;
    let auth_date = field(&pairs, "auth_date").ok_or(InitDataError::MissingField("auth_date"))?;
    let hash = field(&pairs, "hash").ok_or(InitDataError::MissingField("hash"))?;

    let user: WebAppUser = serde_json::from_str(user).map_err(InitDataError::MalformedUser)?;
    let auth_date: i64 = auth_date
        .parse()
        .map_err(|_| InitDataError::MalformedAuthDate)?;

    if !hash_matches(&data_check_string(&pairs), bot_token, hash) {
        tracing::warn!(user_id = user.id, provided = %hash, "init-data hash mismatch");
        return Err(InitDataError::HashMismatch);
    }

    Ok(VerifiedInitData {
        user,
        auth_date,
        start_param: field(&pairs, "start_param").map(str::to_owned),
    })
}

/// Rejects init-data older than `ttl` seconds. The boundary itself is still fresh.
pub fn check_freshness(auth_date: i64, now: i64, ttl: i64) -> Result<(), InitDataError> {
    if now.saturating_sub(auth_date) > ttl {
        return Err(InitDataError::Expired);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const BOT_TOKEN: &str = "5768337691:AAH5YkoiEuPk8-FZa32hStHTqXiLPtAEhx8";

    const SIGNED: &str = "query_id=AAHdF6IQAAAAAN0XohDhrOrc&user=%7B%22id%22%3A279058397%2C%22first_name%22%3A%22Vladislav%22%2C%22last_name%22%3A%22Kibenko%22%2C%22username%22%3A%22vdkfrost%22%2C%22language_code%22%3A%22ru%22%2C%22is_premium%22%3Atrue%7D&auth_date=1700000000&hash=8e9c806afb1c08d2aa3dca5c6d83de9235c085fdadbc008d4f159b233d57ffab";

    /// Builds a correctly signed init-data query string.
    pub fn signed_init_data(pairs: &[(&str, &str)], bot_token: &str) -> String {
        let owned: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let hash = sign(&data_check_string(&owned), bot_token);

        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in pairs {
            query.append_pair(k, v);
        }
        query.append_pair("hash", &hash);
        query.finish()
    }

    #[test]
    fn test_verify_known_vector() {
        match verify(SIGNED, BOT_TOKEN) {
            Ok(data) => {
                assert_eq!(data.user.id, 279058397);
                assert_eq!(data.user.username.as_deref(), Some("vdkfrost"));
                assert_eq!(data.auth_date, 1700000000);
                assert!(data.start_param.is_none());
            }
            Err(error) => {
                panic!("verify failed with error: {}", error);
            }
        }
    }

    #[test]
    fn test_data_check_string_layout() {
        let pairs = parse_pairs("b=2&hash=abc&a=1&c=x%20y");
        assert_eq!(data_check_string(&pairs), "a=1\nb=2\nc=x y");
    }

    #[test]
    fn test_signature_ignores_parameter_order() {
        let user = r#"{"id":1,"first_name":"A"}"#;
        let forward = signed_init_data(&[("auth_date", "1"), ("user", user)], BOT_TOKEN);
        let backward = signed_init_data(&[("user", user), ("auth_date", "1")], BOT_TOKEN);

        let hash_of = |q: &str| {
            parse_pairs(q)
                .into_iter()
                .find(|(k, _)| k == "hash")
                .map(|(_, v)| v)
        };
        assert_eq!(hash_of(&forward), hash_of(&backward));
        assert!(verify(&backward, BOT_TOKEN).is_ok());
    }

    #[test]
    fn test_tampered_value_fails() {
        let tampered = SIGNED.replace("auth_date=1700000000", "auth_date=1700000001");

        match verify(&tampered, BOT_TOKEN) {
            Ok(_) => {
                panic!("verify should have failed for tampered init-data");
            }
            Err(error) => {
                assert!(matches!(error, InitDataError::HashMismatch));
            }
        }
    }

    #[test]
    fn test_wrong_token_fails() {
        let result = verify(SIGNED, "1:other-token");
        assert!(matches!(result, Err(InitDataError::HashMismatch)));
    }

    #[test]
    fn test_uppercase_hash_fails() {
        let upper = SIGNED.replace(
            "8e9c806afb1c08d2aa3dca5c6d83de9235c085fdadbc008d4f159b233d57ffab",
            "8E9C806AFB1C08D2AA3DCA5C6D83DE9235C085FDADBC008D4F159B233D57FFAB",
        );
        assert!(matches!(
            verify(&upper, BOT_TOKEN),
            Err(InitDataError::HashMismatch)
        ));
    }

    #[test]
    fn test_truncated_or_garbled_hash_fails() {
        let valid = "8e9c806afb1c08d2aa3dca5c6d83de9235c085fdadbc008d4f159b233d57ffab";
        let garbled = valid.replacen("8e", "zz", 1);
        for hash in [&valid[..62], &valid[..63], garbled.as_str()] {
            let query = SIGNED.replace(valid, hash);
            assert!(
                matches!(verify(&query, BOT_TOKEN), Err(InitDataError::HashMismatch)),
                "accepted hash {}",
                hash
            );
        }
    }

    #[test]
    fn test_missing_fields() {
        assert!(matches!(
            verify("auth_date=1&hash=00", BOT_TOKEN),
            Err(InitDataError::MissingField("user"))
        ));
        assert!(matches!(
            verify("user=%7B%7D&hash=00", BOT_TOKEN),
            Err(InitDataError::MissingField("auth_date"))
        ));
        assert!(matches!(
            verify("user=%7B%7D&auth_date=1", BOT_TOKEN),
            Err(InitDataError::MissingField("hash"))
        ));
    }

    #[test]
    fn test_malformed_user_is_distinct() {
        let result = verify("user=not-json&auth_date=1&hash=00", BOT_TOKEN);
        assert!(matches!(result, Err(InitDataError::MalformedUser(_))));

        let result = verify("user=%7B%22id%22%3A1%7D&auth_date=yesterday&hash=00", BOT_TOKEN);
        assert!(matches!(result, Err(InitDataError::MalformedAuthDate)));
    }

    #[test]
    fn test_start_param_referrer() {
        let user = r#"{"id":123}"#;
        let query = signed_init_data(
            &[("user", user), ("auth_date", "1"), ("start_param", "ref_456")],
            BOT_TOKEN,
        );
        let data = verify(&query, BOT_TOKEN).expect("signed init-data");
        assert_eq!(data.referrer_id(), Some(456));

        let query = signed_init_data(
            &[("user", user), ("auth_date", "1"), ("start_param", "promo")],
            BOT_TOKEN,
        );
        let data = verify(&query, BOT_TOKEN).expect("signed init-data");
        assert_eq!(data.referrer_id(), None);
    }

    #[test]
    fn test_freshness_boundary() {
        let auth_date = 1_700_000_000;
        assert!(check_freshness(auth_date, auth_date + DEFAULT_TTL, DEFAULT_TTL).is_ok());
        assert!(matches!(
            check_freshness(auth_date, auth_date + DEFAULT_TTL + 1, DEFAULT_TTL),
            Err(InitDataError::Expired)
        ));
    }

    #[test]
    fn test_freshness_with_extreme_auth_date() {
        assert!(matches!(
            check_freshness(i64::MIN, 1_700_000_000, DEFAULT_TTL),
            Err(InitDataError::Expired)
        ));
        assert!(check_freshness(i64::MAX, 1_700_000_000, DEFAULT_TTL).is_ok());
    }
}
