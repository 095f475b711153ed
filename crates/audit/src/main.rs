use std::path::PathBuf;

use anyhow::Context;

use medledger_infra::LedgerConfig;

fn main() -> anyhow::Result<()> {
    // stdout carries the report; logs go to stderr.
    medledger_observability::tracing::init_with_default("warn");

    let path = match std::env::args_os().nth(1) {
        Some(arg) => PathBuf::from(arg),
        None => LedgerConfig::from_env()?
            .journal_path
            .context("usage: medledger-audit <journal.jsonl> (or set MEDLEDGER_JOURNAL_PATH)")?,
    };

    let report = match medledger_audit::audit_journal(&path) {
        Ok(report) => report,
        Err(err) => {
            let reason = format!("{err:#}");
            tracing::error!(path = %path.display(), error = %reason, "journal audit failed");
            return Err(err);
        }
    };

    tracing::info!(ledger_id = %report.ledger_id, version = report.version, "journal audit passed");
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
