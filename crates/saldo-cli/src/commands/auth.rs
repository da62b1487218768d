use saldo_core::{ExitCode, SaldoResult};
use serde_json::json;

use crate::{AuthCommand, GlobalOptions, print_json, with_app_context};

pub(crate) fn cmd_auth(command: AuthCommand, globals: &GlobalOptions) -> SaldoResult<ExitCode> {
    with_app_context(globals, |ctx| match command {
        AuthCommand::SetToken { access, refresh } => {
            ctx.store.save_tokens(&access, &refresh)?;
            if globals.json {
                print_json(&json!({"ok": true, "result": {"profile": ctx.profile}}))?;
            } else {
                println!("Stored tokens for profile '{}'.", ctx.profile);
            }
            Ok(ExitCode::Success)
        }
        AuthCommand::Status => match ctx.api.current_user() {
            Some(user) => {
                if globals.json {
                    print_json(&json!({"ok": true, "result": user}))?;
                } else {
                    println!("Authenticated as {} against {}.", user.email, ctx.server);
                    if let Some(plan) = &user.plan {
                        println!("Plan: {plan}");
                    }
                }
                Ok(ExitCode::Success)
            }
            None => {
                if globals.json {
                    print_json(&json!({"ok": false, "result": {"authenticated": false}}))?;
                } else {
                    println!("Not authenticated; run `saldo auth set-token` first.");
                }
                Ok(ExitCode::Auth)
            }
        },
        AuthCommand::Logout => {
            ctx.store.remove_tokens()?;
            if globals.json {
                print_json(&json!({"ok": true, "result": {"profile": ctx.profile}}))?;
            } else {
                println!("Cleared stored tokens for profile '{}'.", ctx.profile);
            }
            Ok(ExitCode::Success)
        }
    })
}
