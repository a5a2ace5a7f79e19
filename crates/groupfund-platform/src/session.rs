use chrono::{DateTime, Utc};
use groupfund_core::{FundError, FundResult};
use serde::Serialize;

use crate::config::AuthConfig;
use crate::signing;

#[derive(Debug, Clone, Serialize)]
pub struct AdminSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Admin login plus bearer checks for admin and cron routes.
///
/// Session tokens are `<expires_unix>.<hex hmac>` signed with the admin
/// code, so rotating the code invalidates every issued session.
#[derive(Clone)]
pub struct AdminAuth {
    config: AuthConfig,
}

impl AdminAuth {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    pub fn login(&self, code: &str, now: DateTime<Utc>) -> FundResult<AdminSession> {
        if code.is_empty() || !signing::secrets_match(&self.config.admin_secret_code, code) {
            return Err(FundError::unauthorized("invalid admin code"));
        }

        let ttl = chrono::Duration::from_std(self.config.session_ttl)
            .map_err(|err| FundError::validation(format!("session ttl out of range: {err}")))?;
        let expires_at = now + ttl;
        let expires = expires_at.timestamp().to_string();
        let signature = signing::sign(&self.config.admin_secret_code, expires.as_bytes());

        Ok(AdminSession {
            token: format!("{expires}.{signature}"),
            expires_at,
        })
    }

    pub fn verify_session(&self, token: &str, now: DateTime<Utc>) -> FundResult<()> {
        let (expires, signature) = token
            .split_once('.')
            .ok_or_else(|| FundError::unauthorized("malformed session token"))?;
        if !signing::verify(&self.config.admin_secret_code, expires.as_bytes(), signature) {
            return Err(FundError::unauthorized("invalid session token"));
        }

        let expires: i64 = expires
            .parse()
            .map_err(|_| FundError::unauthorized("malformed session token"))?;
        if now.timestamp() >= expires {
            return Err(FundError::unauthorized("session expired"));
        }
        Ok(())
    }

    pub fn verify_cron(&self, secret: &str) -> FundResult<()> {
        if signing::secrets_match(&self.config.cron_secret, secret) {
            Ok(())
        } else {
            Err(FundError::unauthorized("invalid cron secret"))
        }
    }
}

/// Extracts the credential from an `Authorization: Bearer ...` header value.
pub fn bearer_token(header: Option<&str>) -> FundResult<&str> {
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| FundError::unauthorized("missing bearer token"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;

    use super::*;

    fn auth() -> AdminAuth {
        AdminAuth::new(AuthConfig {
            admin_secret_code: "open-sesame".into(),
            session_ttl: Duration::from_secs(24 * 3600),
            cron_secret: "cron-key".into(),
        })
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 20, hour, 0, 0).unwrap()
    }

    #[test]
    fn issued_session_is_accepted_until_it_expires() {
        let auth = auth();
        let session = auth.login("open-sesame", at(8)).unwrap();

        assert_eq!(session.expires_at, at(8) + chrono::Duration::hours(24));
        auth.verify_session(&session.token, at(20)).unwrap();
        assert!(matches!(
            auth.verify_session(&session.token, session.expires_at),
            Err(FundError::Unauthorized { .. })
        ));
    }

    #[test]
    fn wrong_code_and_forged_tokens_are_rejected() {
        let auth = auth();
        assert!(auth.login("guess", at(8)).is_err());
        assert!(auth.login("", at(8)).is_err());

        let session = auth.login("open-sesame", at(8)).unwrap();
        let (_, signature) = session.token.split_once('.').unwrap();
        let extended = format!("{}.{signature}", session.expires_at.timestamp() + 3600);
        assert!(auth.verify_session(&extended, at(9)).is_err());
        assert!(auth.verify_session("garbage", at(9)).is_err());
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token(Some("Bearer cron-key")).unwrap(), "cron-key");
        assert!(bearer_token(Some("Basic abc")).is_err());
        assert!(bearer_token(Some("Bearer ")).is_err());
        assert!(bearer_token(None).is_err());

        auth().verify_cron("cron-key").unwrap();
        assert!(auth().verify_cron("nope").is_err());
    }
}
