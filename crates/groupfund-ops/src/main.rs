use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use groupfund_ledger::{GenerateObligations, Ledger};
use groupfund_platform::{MomoClient, ServiceConfig, build_ledger};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::info;

/// One-shot batch jobs for cron triggers. Each prints its report as JSON.
#[derive(Debug, Parser)]
#[command(name = "groupfund-ops", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Accrue penalties on contributions past the grace period.
    Sweep {
        /// Evaluate as of this instant instead of now (RFC 3339).
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Create the week's contribution for every active member.
    Generate {
        #[arg(long)]
        week: i32,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        due_date: NaiveDate,
    },
    /// Remind members who have not paid the week.
    Remind {
        #[arg(long)]
        week: i32,
    },
    /// Mark contributions paid when a successful transaction already exists.
    Repair,
    /// Ask the wallet provider for the state of one order.
    Status {
        #[arg(long)]
        order_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "groupfund_ops=info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let config = ServiceConfig::worker_from_env()?;

    let report = match cli.command {
        Command::Status { order_id } => {
            let status = MomoClient::new(config.momo.clone())
                .query_status(&order_id, &order_id)
                .await
                .with_context(|| format!("status query for {order_id} failed"))?;
            info!("order {order_id} paid: {}", status.is_paid());
            serde_json::to_value(status)?
        }
        command => {
            let ledger = build_ledger(&config).await?;
            run(&ledger, command).await?
        }
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run(ledger: &Ledger, command: Command) -> Result<Value> {
    let report = match command {
        Command::Sweep { at } => {
            let now = at.unwrap_or_else(Utc::now);
            info!("running penalty sweep as of {now}");
            let report = ledger
                .run_penalty_sweep(now)
                .await
                .context("penalty sweep failed")?;
            serde_json::to_value(report)?
        }
        Command::Generate {
            week,
            amount,
            due_date,
        } => {
            let report = ledger
                .generate_obligations(GenerateObligations {
                    week,
                    amount,
                    due_date,
                })
                .await
                .with_context(|| format!("failed to generate week {week}"))?;
            serde_json::to_value(report)?
        }
        Command::Remind { week } => {
            let report = ledger
                .send_reminders(week)
                .await
                .with_context(|| format!("failed to send week {week} reminders"))?;
            serde_json::to_value(report)?
        }
        Command::Repair => {
            let report = ledger
                .repair_settled()
                .await
                .context("transaction repair failed")?;
            serde_json::to_value(report)?
        }
        Command::Status { .. } => anyhow::bail!("status queries the provider, not the ledger"),
    };

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use groupfund_core::{CreateMember, MemberStore, ObligationStatus, ObligationStore};
    use groupfund_ledger::LedgerConfig;
    use groupfund_store::{InMemoryFundStore, RecordingNotifier, StaticPaymentProvider};

    use super::*;

    fn ledger() -> (Ledger, Arc<InMemoryFundStore>) {
        let store = Arc::new(InMemoryFundStore::new());
        let config = LedgerConfig {
            notification_pacing: Duration::ZERO,
            ..LedgerConfig::default()
        };
        let ledger = Ledger::new(
            store.clone(),
            Arc::new(RecordingNotifier::new()),
            Arc::new(StaticPaymentProvider::new("sig")),
            config,
        )
        .unwrap();
        (ledger, store)
    }

    #[test]
    fn parses_generate_arguments() {
        let cli = Cli::try_parse_from([
            "groupfund-ops",
            "generate",
            "--week",
            "5",
            "--amount",
            "50000",
            "--due-date",
            "2024-01-07",
        ])
        .unwrap();

        match cli.command {
            Command::Generate {
                week,
                amount,
                due_date,
            } => {
                assert_eq!(week, 5);
                assert_eq!(amount, Decimal::new(50_000, 0));
                assert_eq!(due_date, NaiveDate::from_ymd_opt(2024, 1, 7).unwrap());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(
            Cli::try_parse_from([
                "groupfund-ops",
                "generate",
                "--week",
                "5",
                "--amount",
                "50000",
                "--due-date",
                "07/01/2024",
            ])
            .is_err()
        );
        assert!(Cli::try_parse_from(["groupfund-ops", "remind"]).is_err());
        assert!(Cli::try_parse_from(["groupfund-ops", "status"]).is_err());
    }

    #[test]
    fn parses_status_order() {
        let cli =
            Cli::try_parse_from(["groupfund-ops", "status", "--order-id", "CONTRIB_1"]).unwrap();
        assert!(matches!(cli.command, Command::Status { order_id } if order_id == "CONTRIB_1"));
    }

    #[tokio::test]
    async fn generate_then_sweep_reports_json() {
        let (ledger, store) = ledger();
        let member = store
            .create_member(CreateMember {
                name: "Lan".into(),
                phone: "0901000001".into(),
                status: None,
            })
            .await
            .unwrap();

        let generated = run(
            &ledger,
            Command::Generate {
                week: 2,
                amount: Decimal::new(50_000, 0),
                due_date: NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
            },
        )
        .await
        .unwrap();
        assert_eq!(generated["created"], 1);

        let at = "2024-01-20T00:00:00Z".parse().unwrap();
        let swept = run(&ledger, Command::Sweep { at: Some(at) }).await.unwrap();
        assert_eq!(swept["processed"], 1);

        let obligation = store.find_obligation(member.id, 2).await.unwrap().unwrap();
        assert_eq!(obligation.status, ObligationStatus::Overdue);
        assert_eq!(obligation.penalty, Decimal::new(10_000, 0));
    }
}
