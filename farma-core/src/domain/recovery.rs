//! Password-recovery token parsing
//!
//! Reset e-mails land on `/login/reset-password` with the credential in the
//! URL fragment. Two shapes are accepted:
//!
//! ```text
//! #<token>?type=recovery            (form A)
//! #access_token=<token>&type=...    (form B, `token=` also accepted)
//! ```
//!
//! Anything else parses to `None`.

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

pub const RECOVERY_TYPE: &str = "recovery";

/// Token extracted from a navigation fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryToken {
    pub token: String,
    /// Present when the fragment also carried `refresh_token`
    pub refresh_token: Option<String>,
}

impl RecoveryToken {
    /// Parse a fragment (with or without the leading `#`)
    pub fn parse(fragment: &str) -> Option<Self> {
        let fragment = fragment.strip_prefix('#').unwrap_or(fragment).trim();
        if fragment.is_empty() {
            return None;
        }

        Self::parse_token_with_type(fragment).or_else(|| Self::parse_params(fragment))
    }

    /// Form A: `<token>?type=recovery`
    fn parse_token_with_type(fragment: &str) -> Option<Self> {
        let (token, query) = fragment.split_once('?')?;
        if token.is_empty() || token.contains('=') {
            return None;
        }
        let is_recovery = form_urlencoded::parse(query.as_bytes())
            .any(|(k, v)| k == "type" && v == RECOVERY_TYPE);
        if !is_recovery {
            return None;
        }
        Some(Self {
            token: token.to_string(),
            refresh_token: None,
        })
    }

    /// Form B: fragment is a query string with `access_token` or `token`
    fn parse_params(fragment: &str) -> Option<Self> {
        let mut access_token = None;
        let mut token = None;
        let mut refresh_token = None;
        let mut kind = None;

        for (key, value) in form_urlencoded::parse(fragment.as_bytes()) {
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "access_token" => access_token = Some(value),
                "token" => token = Some(value),
                "refresh_token" => refresh_token = Some(value),
                "type" => kind = Some(value),
                _ => {}
            }
        }

        if kind.as_deref().is_some_and(|k| k != RECOVERY_TYPE) {
            return None;
        }

        access_token.or(token).map(|token| Self {
            token,
            refresh_token,
        })
    }
}

/// Progress through the password-recovery flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryStage {
    NoToken,
    TokenFound,
    SessionEstablished,
    PasswordUpdated,
    SignedOutPostReset,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(fragment: &str) -> Option<String> {
        RecoveryToken::parse(fragment).map(|t| t.token)
    }

    #[test]
    fn test_token_with_type_form() {
        assert_eq!(token("abc123?type=recovery").as_deref(), Some("abc123"));
        assert_eq!(token("#abc123?type=recovery").as_deref(), Some("abc123"));
        assert_eq!(token("abc123?type=recovery&lang=en").as_deref(), Some("abc123"));
    }

    #[test]
    fn test_params_form() {
        let parsed =
            RecoveryToken::parse("access_token=tok&refresh_token=ref&type=recovery").unwrap();
        assert_eq!(parsed.token, "tok");
        assert_eq!(parsed.refresh_token.as_deref(), Some("ref"));

        assert_eq!(token("token=xyz&type=recovery").as_deref(), Some("xyz"));
        assert_eq!(token("access_token=tok").as_deref(), Some("tok"));
    }

    #[test]
    fn test_access_token_preferred_over_token() {
        assert_eq!(token("token=b&access_token=a").as_deref(), Some("a"));
    }

    #[test]
    fn test_percent_encoded_values_are_decoded() {
        assert_eq!(token("access_token=a%2Bb&type=recovery").as_deref(), Some("a+b"));
    }

    #[test]
    fn test_rejections() {
        assert_eq!(token(""), None);
        assert_eq!(token("#"), None);
        assert_eq!(token("section-2"), None);
        assert_eq!(token("abc123?type=signup"), None);
        assert_eq!(token("?type=recovery"), None);
        assert_eq!(token("access_token=&type=recovery"), None);
        assert_eq!(token("access_token=tok&type=signup"), None);
        assert_eq!(token("type=recovery"), None);
    }
}
