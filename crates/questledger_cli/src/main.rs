//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `questledger_core` linkage and run one in-memory award.
//! - Keep output deterministic for quick local sanity checks.

use questledger_core::db::open_db_in_memory;
use questledger_core::{
    default_log_level, init_logging, LedgerService, PlayerKey, SqliteLedgerStore, XpContext,
};
use std::process::ExitCode;

/// Absolute directory for rolling log files. Logging stays off when unset.
const LOG_DIR_ENV: &str = "QUESTLEDGER_LOG_DIR";

fn main() -> ExitCode {
    if let Ok(log_dir) = std::env::var(LOG_DIR_ENV) {
        if let Err(err) = init_logging(default_log_level(), &log_dir) {
            eprintln!("questledger_core logging=failed error={err}");
            return ExitCode::FAILURE;
        }
    }

    println!("questledger_core ping={}", questledger_core::ping());
    println!("questledger_core version={}", questledger_core::core_version());

    match smoke_award() {
        Ok(line) => {
            println!("{line}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("questledger_core smoke=failed error={err}");
            ExitCode::FAILURE
        }
    }
}

fn smoke_award() -> Result<String, Box<dyn std::error::Error>> {
    let mut conn = open_db_in_memory()?;
    let store = SqliteLedgerStore::try_new(&mut conn)?;
    let mut service = LedgerService::new(store);

    let key = PlayerKey::new("smoke-org", "smoke-user");
    service.player_summary(&key)?;
    let summary = service.award_xp(&key, 1200.0, XpContext::new("cli_smoke"))?;
    Ok(format!(
        "questledger_core smoke=ok total_xp={} rank={} level={}",
        summary.total_xp, summary.rank, summary.level
    ))
}
