use saldo_core::{ExitCode, SaldoError, SaldoResult};
use saldo_sync::FinanceEngine;
use serde_json::json;

use crate::{GlobalOptions, SyncCommand, print_json, with_app_context, with_engine};

pub(crate) fn cmd_sync(command: SyncCommand, globals: &GlobalOptions) -> SaldoResult<ExitCode> {
    match command {
        SyncCommand::Status => cmd_status(globals),
        SyncCommand::Push => cmd_push(globals),
        SyncCommand::Discard => cmd_discard(globals),
    }
}

/// Probes the backend for the status line, then reports local sync state.
/// The month mirror itself is never touched.
fn cmd_status(globals: &GlobalOptions) -> SaldoResult<ExitCode> {
    with_app_context(globals, |ctx| {
        let mut engine = FinanceEngine::new(&ctx.api, &ctx.store);
        engine.probe()?;

        let pending = ctx.store.has_pending_changes()?;
        let last_status = ctx
            .store
            .last_api_status()?
            .unwrap_or_else(|| "unknown".to_string());
        let current_month = ctx.store.current_month()?;
        let month_count = ctx.store.load_months()?.len();

        if globals.json {
            print_json(&json!({
                "ok": true,
                "result": {
                    "pendingChanges": pending,
                    "lastApiStatus": last_status,
                    "currentMonth": current_month,
                    "monthCount": month_count,
                }
            }))?;
        } else {
            println!("Last API status: {last_status}");
            println!(
                "Pending offline changes: {}",
                if pending { "yes" } else { "no" }
            );
            if let Some(month) = current_month {
                println!("Current month: {month}");
            }
            println!("Local months: {month_count}");
        }
        Ok(ExitCode::Success)
    })
}

fn cmd_push(globals: &GlobalOptions) -> SaldoResult<ExitCode> {
    with_engine(globals, |engine, _ctx| {
        if !engine.has_pending_changes() {
            if globals.json {
                print_json(&json!({"ok": true, "result": {"pushed": false}}))?;
            } else {
                println!("Nothing to sync; local data already matches the server.");
            }
            return Ok(ExitCode::Success);
        }

        engine.sync_offline_changes()?;
        if globals.json {
            print_json(
                &json!({"ok": true, "result": {"pushed": true, "months": engine.months().len()}}),
            )?;
        } else {
            println!("Pushed {} month(s) to the server.", engine.months().len());
        }
        Ok(ExitCode::Success)
    })
}

fn cmd_discard(globals: &GlobalOptions) -> SaldoResult<ExitCode> {
    if !globals.yes {
        return Err(SaldoError::usage(
            "discarding offline changes is destructive; rerun with --yes",
        ));
    }

    with_engine(globals, |engine, _ctx| {
        engine.discard_offline_changes()?;
        if globals.json {
            print_json(
                &json!({"ok": true, "result": {"discarded": true, "months": engine.months().len()}}),
            )?;
        } else {
            println!(
                "Discarded offline changes; restored {} month(s) from the server.",
                engine.months().len()
            );
        }
        Ok(ExitCode::Success)
    })
}
