//! `dashboard` command line client.
//!
//! Usage:
//!   dashboard login <email> <password>
//!   dashboard whoami
//!   dashboard logout
//!   dashboard tenant <slug>
//!   dashboard blocked-days <start> <end>
//!   dashboard toggle-day <date> [reason]
//!
//! Dates are YYYY-MM-DD. Set RUST_LOG=debug for request logging.

use std::sync::Arc;

use chrono::NaiveDate;

use tenant_dashboard::api::schedule::{BlockedDaysCalendar, ScheduleApi};
use tenant_dashboard::api::{auth, tenants};
use tenant_dashboard::error::ErrorPayload;
use tenant_dashboard::{load_config, ApiClient, ApiError, ClientConfig, SessionListener};

const USAGE: &str = "usage: dashboard <login EMAIL PASSWORD | whoami | logout | tenant SLUG | blocked-days START END | toggle-day DATE [REASON]>";

struct ExpiredNotice;

impl SessionListener for ExpiredNotice {
    fn on_session_expired(&self) {
        eprintln!("Session expired. Run `dashboard login` again.");
    }
}

fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("invalid date '{}': {}", raw, e))
}

fn build_client(config: &ClientConfig) -> Result<ApiClient, ApiError> {
    Ok(ApiClient::configured(config)?
        .session_listener(Arc::new(ExpiredNotice))
        .build())
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(args: &[String]) -> anyhow::Result<()> {
    let config = load_config()?;
    let client = build_client(&config)?;
    let arg = |i: usize| args.get(i).map(String::as_str);

    match (arg(0), arg(1), arg(2)) {
        (Some("login"), Some(email), Some(password)) => {
            let user = auth::login(&client, email, password).await?;
            match user.and_then(|u| u.email) {
                Some(email) => println!("Signed in as {}", email),
                None => println!("Signed in"),
            }
        }
        (Some("whoami"), _, _) => print_json(&auth::current_user(&client).await?)?,
        (Some("logout"), _, _) => {
            auth::logout(&client, None).await?;
            println!("Signed out");
        }
        (Some("tenant"), Some(slug), _) => print_json(&tenants::get_tenant(&client, slug).await?)?,
        (Some("blocked-days"), Some(start), Some(end)) => {
            let api = ScheduleApi::new(client.clone(), &config);
            let days = api.blocked_days(parse_date(start)?, parse_date(end)?).await?;
            for day in days {
                println!(
                    "{}  {}",
                    day.blocked_date,
                    day.reason.as_deref().unwrap_or("")
                );
            }
        }
        (Some("toggle-day"), Some(date), reason) => {
            let calendar = BlockedDaysCalendar::new(ScheduleApi::new(client.clone(), &config));
            let outcome = calendar.toggle(parse_date(date)?, reason).await?;
            println!("{} {:?}", outcome.date, outcome.action);
        }
        _ => anyhow::bail!(USAGE),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(&args).await {
        match e.downcast_ref::<ApiError>() {
            Some(api_err) => {
                let payload = ErrorPayload::from(api_err);
                eprintln!("error: {}", payload.message);
                eprintln!("{}", payload.recovery_suggestion);
            }
            None => eprintln!("error: {}", e),
        }
        std::process::exit(1);
    }
}
