use saldo_core::metrics;
use saldo_core::model::CategoryKind;
use saldo_core::{ExitCode, SaldoError, SaldoResult};
use serde_json::json;

use crate::{
    CategoryCommand, EntryCommand, GlobalOptions, MonthCommand, print_json, with_engine,
};

pub(crate) fn cmd_month(command: MonthCommand, globals: &GlobalOptions) -> SaldoResult<ExitCode> {
    with_engine(globals, |engine, _ctx| match command {
        MonthCommand::List => {
            let status = engine.status();
            if globals.json {
                let months: Vec<_> = engine
                    .months()
                    .iter()
                    .map(|record| {
                        json!({
                            "monthKey": record.month_key,
                            "categories": record.categories.len(),
                            "current": record.month_key == status.current_month,
                        })
                    })
                    .collect();
                print_json(&json!({"ok": true, "result": months}))?;
            } else {
                for record in engine.months() {
                    let marker = if record.month_key == status.current_month {
                        "*"
                    } else {
                        " "
                    };
                    println!(
                        "{marker} {} ({} categories)",
                        record.month_key,
                        record.categories.len()
                    );
                }
            }
            Ok(ExitCode::Success)
        }
        MonthCommand::Use { month_key } => {
            engine.use_month(&month_key)?;
            if globals.json {
                print_json(&json!({"ok": true, "result": {"currentMonth": month_key}}))?;
            } else {
                println!("Now working in {month_key}.");
            }
            Ok(ExitCode::Success)
        }
        MonthCommand::Show { month_key } => {
            let key = month_key.unwrap_or_else(|| engine.current_month().to_string());
            let record = engine
                .record(&key)
                .ok_or_else(|| SaldoError::usage(format!("unknown month '{key}'")))?;

            if globals.json {
                print_json(&json!({"ok": true, "result": record}))?;
            } else {
                println!("{key}");
                for category in &record.categories {
                    let label = match category.kind {
                        CategoryKind::Bills => "bills",
                        CategoryKind::Income => "income",
                    };
                    let split = category
                        .split_by
                        .filter(|s| *s > 1)
                        .map(|s| format!(", split by {s}"))
                        .unwrap_or_default();
                    println!(
                        "  {} [{label}{split}] total {:.2} ({})",
                        category.name,
                        metrics::category_total(category),
                        category.id
                    );
                    for entry in &category.entries {
                        let paid = if entry.paid { "x" } else { " " };
                        println!(
                            "    [{paid}] {} {:.2} ({})",
                            entry.name, entry.amount, entry.id
                        );
                    }
                }
            }
            Ok(ExitCode::Success)
        }
        MonthCommand::Duplicate { target_key } => {
            engine.duplicate_month(&target_key)?;
            if globals.json {
                print_json(&json!({"ok": true, "result": {"currentMonth": target_key}}))?;
            } else {
                println!("Duplicated into {target_key}; now current.");
            }
            Ok(ExitCode::Success)
        }
        MonthCommand::Delete { month_key } => {
            if !globals.yes {
                return Err(SaldoError::usage(
                    "deleting a month is destructive; rerun with --yes",
                ));
            }
            engine.delete_month(&month_key)?;
            if globals.json {
                print_json(&json!({"ok": true, "result": {"deleted": month_key}}))?;
            } else {
                println!("Deleted {month_key}.");
            }
            Ok(ExitCode::Success)
        }
    })
}

pub(crate) fn cmd_category(
    command: CategoryCommand,
    globals: &GlobalOptions,
) -> SaldoResult<ExitCode> {
    with_engine(globals, |engine, _ctx| match command {
        CategoryCommand::Add {
            name,
            income,
            split_by,
        } => {
            let kind = if income {
                CategoryKind::Income
            } else {
                CategoryKind::Bills
            };
            let category = engine.add_category(&name, kind, split_by)?;
            if globals.json {
                print_json(&json!({"ok": true, "result": category}))?;
            } else {
                println!("Added category '{}' ({}).", category.name, category.id);
            }
            Ok(ExitCode::Success)
        }
        CategoryCommand::Rename { category_id, name } => {
            engine.rename_category(&category_id, &name)?;
            if globals.json {
                print_json(&json!({"ok": true, "result": {"id": category_id, "name": name}}))?;
            } else {
                println!("Renamed category to '{name}'.");
            }
            Ok(ExitCode::Success)
        }
        CategoryCommand::Split { category_id, by } => {
            engine.set_category_split(&category_id, by)?;
            if globals.json {
                print_json(&json!({"ok": true, "result": {"id": category_id, "splitBy": by}}))?;
            } else {
                match by {
                    Some(split) => println!("Category now split by {split}."),
                    None => println!("Category split removed."),
                }
            }
            Ok(ExitCode::Success)
        }
        CategoryCommand::Remove { category_id } => {
            engine.remove_category(&category_id)?;
            if globals.json {
                print_json(&json!({"ok": true, "result": {"removed": category_id}}))?;
            } else {
                println!("Removed category '{category_id}'.");
            }
            Ok(ExitCode::Success)
        }
    })
}

pub(crate) fn cmd_entry(command: EntryCommand, globals: &GlobalOptions) -> SaldoResult<ExitCode> {
    with_engine(globals, |engine, _ctx| match command {
        EntryCommand::Add {
            category,
            name,
            amount,
            note,
        } => {
            let entry = engine.add_entry(&category, &name, amount, note)?;
            if globals.json {
                print_json(&json!({"ok": true, "result": entry}))?;
            } else {
                println!("Added '{}' {:.2} ({}).", entry.name, entry.amount, entry.id);
            }
            Ok(ExitCode::Success)
        }
        EntryCommand::Edit {
            category,
            entry_id,
            name,
            amount,
        } => {
            engine.update_entry(&category, &entry_id, name, amount)?;
            if globals.json {
                print_json(&json!({"ok": true, "result": {"id": entry_id}}))?;
            } else {
                println!("Updated entry '{entry_id}'.");
            }
            Ok(ExitCode::Success)
        }
        EntryCommand::Toggle { category, entry_id } => {
            let paid = engine.toggle_entry_paid(&category, &entry_id)?;
            if globals.json {
                print_json(&json!({"ok": true, "result": {"id": entry_id, "paid": paid}}))?;
            } else {
                println!(
                    "Entry '{entry_id}' is now {}.",
                    if paid { "paid" } else { "unpaid" }
                );
            }
            Ok(ExitCode::Success)
        }
        EntryCommand::Remove { category, entry_id } => {
            engine.remove_entry(&category, &entry_id)?;
            if globals.json {
                print_json(&json!({"ok": true, "result": {"removed": entry_id}}))?;
            } else {
                println!("Removed entry '{entry_id}'.");
            }
            Ok(ExitCode::Success)
        }
    })
}

pub(crate) fn cmd_summary(globals: &GlobalOptions) -> SaldoResult<ExitCode> {
    with_engine(globals, |engine, _ctx| {
        let summary = engine.summary();
        let month = engine.current_month().to_string();

        if globals.json {
            print_json(&json!({"ok": true, "result": {"monthKey": month, "summary": summary}}))?;
        } else {
            println!("{month}");
            println!("  Bills total:  {:.2}", summary.grand_total);
            println!("  Bills paid:   {:.2}", summary.grand_paid);
            println!("  Income:       {:.2}", summary.income_total);
            println!("  My share:     {:.2}", summary.my_share);
            println!("  Leftover:     {:.2}", summary.leftover);
        }
        Ok(ExitCode::Success)
    })
}
