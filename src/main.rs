//! Operational CLI: print a client's day (records, summary, timeline) and
//! rolling summary from the local store.
//!
//! Usage: `pillars <client-id> [YYYY-MM-DD]`
//! Date defaults to today in the configured timezone. Logging via
//! `RUST_LOG` (env_logger).

use std::process::ExitCode;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};

use pillars::config::EngineConfig;
use pillars::services::daily::DayService;
use pillars::services::rolling::RollingService;
use pillars::store::SqliteRecordStore;
use pillars::{ClientProfile, EngineError};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(client_id) = args.next() else {
        eprintln!("usage: pillars <client-id> [YYYY-MM-DD]");
        return ExitCode::FAILURE;
    };
    let date_arg = args.next();

    match run(&client_id, date_arg.as_deref()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_invalid_input() {
                eprintln!("could not load: {}", e);
            } else {
                eprintln!("error: {}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(client_id: &str, date_arg: Option<&str>) -> Result<(), EngineError> {
    if client_id.trim().is_empty() {
        return Err(EngineError::ClientNotFound(client_id.to_string()));
    }

    let config = EngineConfig::load().unwrap_or_else(|e| {
        log::warn!("falling back to default config: {}", e);
        EngineConfig::default()
    });

    let date = match date_arg {
        Some(raw) => raw
            .parse::<NaiveDate>()
            .map_err(|_| EngineError::InvalidDate(raw.to_string()))?,
        None => local_today(&config),
    };

    let store: Arc<SqliteRecordStore> = Arc::new(match &config.db_path {
        Some(path) => SqliteRecordStore::open_at(path.clone()).map_err(EngineError::Store)?,
        None => SqliteRecordStore::open().map_err(EngineError::Store)?,
    });

    let days = DayService::new(store.clone());
    let view = days
        .day_view(
            client_id,
            date,
            &config.timezone,
            config.timezone_offset_minutes,
        )
        .await?;

    println!("Day {} for {}", view.date, client_id);
    println!(
        "  calories {}  upf {:.1}%  hydration {}  sleep {}h  activity {}min",
        view.summary.calories,
        view.summary.upf_percentage,
        view.summary.hydration_amount,
        view.summary.sleep_hours,
        view.summary.activity_minutes,
    );
    for record in &view.records {
        println!(
            "  {}  [{}] {}",
            record.occurs_at.format("%H:%M"),
            record.pillar.as_str(),
            record.title
        );
    }
    println!("Timeline rectangles:");
    for rect in &view.timeline {
        println!(
            "  {}: top {:.2}% height {:.2}% left {:.1}% width {:.1}%",
            rect.record_id, rect.top, rect.height, rect.left, rect.width
        );
    }

    let rolling = RollingService::with_window(store, config.rolling_window_days);
    let summary = rolling
        .recompute_client_summary(
            client_id,
            &ClientProfile::new(),
            date,
            &config.timezone,
            config.timezone_offset_minutes,
            Utc::now(),
        )
        .await?;
    println!(
        "Rolling {}d: sleep {:.1}h/day  hydration {:.1}/day  activity {:.1}min/day  upf {:.1}%  cravings {}  binges {}",
        config.rolling_window_days,
        summary.avg_sleep,
        summary.avg_hydration,
        summary.avg_activity,
        summary.avg_upf,
        summary.cravings_count,
        summary.binges_count,
    );

    Ok(())
}

/// Today's calendar date in the configured local zone.
fn local_today(config: &EngineConfig) -> NaiveDate {
    (Utc::now() - Duration::minutes(i64::from(config.timezone_offset_minutes))).date_naive()
}
