use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use groupfund_ledger::{LedgerConfig, MemoFormat, PenaltyPolicy};
use rust_decimal::Decimal;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MomoEnvironment {
    Sandbox,
    Production,
}

impl MomoEnvironment {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://test-payment.momo.vn/v2/gateway/api",
            Self::Production => "https://payment.momo.vn/v2/gateway/api",
        }
    }
}

#[derive(Clone, Debug)]
pub struct MomoConfig {
    pub partner_code: String,
    pub access_key: String,
    pub secret_key: String,
    pub environment: MomoEnvironment,
    /// Key for the body signature on memo-transfer notifications.
    pub webhook_secret: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotifierBackend {
    Zalo,
    Meta,
    None,
}

#[derive(Clone, Debug, Default)]
pub struct ZaloConfig {
    pub access_token: String,
    pub app_id: String,
    pub app_secret: String,
}

#[derive(Clone, Debug, Default)]
pub struct MetaConfig {
    pub page_access_token: String,
    pub verify_token: String,
}

#[derive(Clone, Debug)]
pub struct NotifierConfig {
    pub backend: NotifierBackend,
    pub zalo: ZaloConfig,
    pub meta: MetaConfig,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub admin_secret_code: String,
    pub session_ttl: Duration,
    pub cron_secret: String,
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub http_addr: String,
    pub ledger: LedgerConfig,
    pub momo: MomoConfig,
    pub notifier: NotifierConfig,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        Self::from_lookup(default_http_addr, |name| std::env::var(name).ok())
    }

    pub fn worker_from_env() -> Result<Self> {
        Self::from_lookup("", |name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(default_http_addr: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let store_backend = match env.or("STORE_BACKEND", "postgres").as_str() {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => bail!("STORE_BACKEND must be postgres or memory, got {other}"),
        };
        let database_url = env.get("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL is required");
        }

        Ok(Self {
            store_backend,
            database_url,
            http_addr: env.or("HTTP_ADDR", default_http_addr),
            ledger: ledger_config(&env)?,
            momo: momo_config(&env)?,
            notifier: notifier_config(&env)?,
        })
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let admin_secret_code = env
            .get("ADMIN_SECRET_CODE")
            .context("ADMIN_SECRET_CODE is required")?;
        let cron_secret = env.get("CRON_SECRET").context("CRON_SECRET is required")?;
        let ttl_hours: u64 = env.parsed("ADMIN_SESSION_TTL_HOURS", 24)?;

        Ok(Self {
            admin_secret_code,
            session_ttl: Duration::from_secs(ttl_hours * 3600),
            cron_secret,
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Set and non-blank.
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn or(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(name) {
            Some(raw) => raw
                .parse()
                .map_err(|err| anyhow!("{name} is invalid ({raw}): {err}")),
            None => Ok(default),
        }
    }
}

const MAX_GRACE_PERIOD_DAYS: i64 = 3_650;

fn ledger_config<F>(env: &Env<F>) -> Result<LedgerConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let base_penalty: Decimal = env.parsed("PENALTY_AMOUNT", Decimal::new(5_000, 0))?;
    let grace_period_days: i64 = env.parsed("PENALTY_GRACE_PERIOD_DAYS", 7)?;
    let amount_tolerance: Decimal = env.parsed("AMOUNT_TOLERANCE", Decimal::new(1_000, 0))?;
    let pacing_ms: u64 = env.parsed("NOTIFY_PACING_MS", 1_000)?;

    if base_penalty < Decimal::ZERO || amount_tolerance < Decimal::ZERO {
        bail!("PENALTY_AMOUNT and AMOUNT_TOLERANCE must not be negative");
    }
    if !(0..=MAX_GRACE_PERIOD_DAYS).contains(&grace_period_days) {
        bail!("PENALTY_GRACE_PERIOD_DAYS must be between 0 and {MAX_GRACE_PERIOD_DAYS}");
    }

    Ok(LedgerConfig {
        penalty: PenaltyPolicy {
            base_penalty_per_period: base_penalty,
            grace_period_days,
        },
        amount_tolerance,
        notification_pacing: Duration::from_millis(pacing_ms),
        memo: MemoFormat {
            tag: env.or("MEMO_TAG", "QUY_NHOM"),
            period_marker: env.or("MEMO_PERIOD_MARKER", "TUAN"),
        },
        public_base_url: env.or("PUBLIC_BASE_URL", "http://localhost:3000"),
    })
}

fn momo_config<F>(env: &Env<F>) -> Result<MomoConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let environment = match env.or("MOMO_ENVIRONMENT", "sandbox").as_str() {
        "sandbox" => MomoEnvironment::Sandbox,
        "production" => MomoEnvironment::Production,
        other => bail!("MOMO_ENVIRONMENT must be sandbox or production, got {other}"),
    };

    Ok(MomoConfig {
        partner_code: env.or("MOMO_PARTNER_CODE", ""),
        access_key: env.or("MOMO_ACCESS_KEY", ""),
        secret_key: env.or("MOMO_SECRET_KEY", ""),
        environment,
        webhook_secret: env.or("MOMO_WEBHOOK_SECRET", ""),
    })
}

fn notifier_config<F>(env: &Env<F>) -> Result<NotifierConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let backend = match env.or("NOTIFY_BACKEND", "none").as_str() {
        "zalo" => NotifierBackend::Zalo,
        "meta" => NotifierBackend::Meta,
        "none" => NotifierBackend::None,
        other => bail!("NOTIFY_BACKEND must be zalo, meta or none, got {other}"),
    };

    Ok(NotifierConfig {
        backend,
        zalo: ZaloConfig {
            access_token: env.or("ZALO_OA_ACCESS_TOKEN", ""),
            app_id: env.or("ZALO_OA_APP_ID", ""),
            app_secret: env.or("ZALO_OA_APP_SECRET", ""),
        },
        meta: MetaConfig {
            page_access_token: env.or("META_PAGE_ACCESS_TOKEN", ""),
            verify_token: env.or("META_VERIFY_TOKEN", ""),
        },
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_with_memory_backend() {
        let config =
            ServiceConfig::from_lookup("0.0.0.0:8080", lookup(&[("STORE_BACKEND", "memory")]))
                .unwrap();

        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.http_addr, "0.0.0.0:8080");
        assert_eq!(config.ledger.penalty.base_penalty_per_period, Decimal::new(5_000, 0));
        assert_eq!(config.ledger.penalty.grace_period_days, 7);
        assert_eq!(config.ledger.amount_tolerance, Decimal::new(1_000, 0));
        assert_eq!(config.ledger.notification_pacing, Duration::from_secs(1));
        assert_eq!(config.momo.environment, MomoEnvironment::Sandbox);
        assert_eq!(config.notifier.backend, NotifierBackend::None);
    }

    #[test]
    fn postgres_requires_database_url() {
        let err = ServiceConfig::from_lookup("", lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = ServiceConfig::from_lookup(
            "",
            lookup(&[
                ("DATABASE_URL", "postgres://localhost/fund"),
                ("PENALTY_AMOUNT", "10000"),
                ("PENALTY_GRACE_PERIOD_DAYS", "3"),
                ("NOTIFY_PACING_MS", "250"),
                ("MOMO_ENVIRONMENT", "production"),
                ("NOTIFY_BACKEND", "zalo"),
            ]),
        )
        .unwrap();

        assert_eq!(config.ledger.penalty.base_penalty_per_period, Decimal::new(10_000, 0));
        assert_eq!(config.ledger.penalty.grace_period_days, 3);
        assert_eq!(config.ledger.notification_pacing, Duration::from_millis(250));
        assert_eq!(
            config.momo.environment.endpoint(),
            "https://payment.momo.vn/v2/gateway/api"
        );
        assert_eq!(config.notifier.backend, NotifierBackend::Zalo);
    }

    #[test]
    fn malformed_numbers_are_reported_by_name() {
        let err = ServiceConfig::from_lookup(
            "",
            lookup(&[("STORE_BACKEND", "memory"), ("PENALTY_AMOUNT", "lots")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("PENALTY_AMOUNT"));
    }

    #[test]
    fn grace_period_is_bounded() {
        for raw in ["-1", "3651", "9223372036854775807"] {
            let err = ServiceConfig::from_lookup(
                "",
                lookup(&[("STORE_BACKEND", "memory"), ("PENALTY_GRACE_PERIOD_DAYS", raw)]),
            )
            .unwrap_err();
            assert!(err.to_string().contains("PENALTY_GRACE_PERIOD_DAYS"), "{raw}");
        }

        let config = ServiceConfig::from_lookup(
            "",
            lookup(&[("STORE_BACKEND", "memory"), ("PENALTY_GRACE_PERIOD_DAYS", "3650")]),
        )
        .unwrap();
        assert_eq!(config.ledger.penalty.grace_period_days, 3_650);
    }

    #[test]
    fn auth_requires_both_secrets() {
        assert!(AuthConfig::from_lookup(lookup(&[("ADMIN_SECRET_CODE", "x")])).is_err());

        let auth = AuthConfig::from_lookup(lookup(&[
            ("ADMIN_SECRET_CODE", "x"),
            ("CRON_SECRET", "y"),
            ("ADMIN_SESSION_TTL_HOURS", "2"),
        ]))
        .unwrap();
        assert_eq!(auth.session_ttl, Duration::from_secs(7_200));
    }
}
