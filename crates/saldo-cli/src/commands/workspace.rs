use saldo_core::{ExitCode, SaldoResult};
use saldo_fs::{
    init_workspace, list_profiles, load_config, resolve_workspace, run_doctor, save_config,
    set_active_profile, set_profile_server,
};
use serde_json::json;

use crate::{GlobalOptions, ProfileCommand, print_json, workspace_target};

pub(crate) fn cmd_init(globals: &GlobalOptions) -> SaldoResult<ExitCode> {
    let target = workspace_target(globals)?;
    let init = init_workspace(Some(&target), globals.server.as_deref())?;

    if globals.json {
        print_json(&json!({
            "ok": true,
            "result": {
                "workspace": init.paths.root.display().to_string(),
                "created": init
                    .created
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect::<Vec<_>>(),
            }
        }))?;
    } else if init.created.is_empty() {
        println!(
            "Workspace already initialized at {}.",
            init.paths.root.display()
        );
    } else {
        println!("Initialized workspace at {}.", init.paths.root.display());
        for path in &init.created {
            println!("  created {}", path.display());
        }
    }

    Ok(ExitCode::Success)
}

pub(crate) fn cmd_doctor(globals: &GlobalOptions) -> SaldoResult<ExitCode> {
    let target = workspace_target(globals)?;
    let paths = resolve_workspace(Some(&target))?;
    let report = run_doctor(
        &paths,
        globals.profile.as_deref(),
        globals.server.as_deref(),
    )?;

    if globals.json {
        print_json(&json!({"ok": report.healthy, "result": report}))?;
    } else {
        println!("Workspace: {}", report.workspace);
        for check in &report.checks {
            let marker = if check.ok { "ok" } else { "FAIL" };
            println!("  [{marker}] {}: {}", check.name, check.details);
        }
    }

    Ok(if report.healthy {
        ExitCode::Success
    } else {
        ExitCode::Io
    })
}

pub(crate) fn cmd_profile(command: ProfileCommand, globals: &GlobalOptions) -> SaldoResult<ExitCode> {
    let target = workspace_target(globals)?;
    if !target.join(".saldo").is_dir() {
        init_workspace(Some(&target), globals.server.as_deref())?;
    }
    let paths = resolve_workspace(Some(&target))?;
    let mut config = load_config(&paths)?;

    match command {
        ProfileCommand::List => {
            let profiles = list_profiles(&config);
            if globals.json {
                print_json(&json!({"ok": true, "result": profiles}))?;
            } else {
                for profile in profiles {
                    let marker = if profile.active { "*" } else { " " };
                    println!(
                        "{marker} {} -> {} (auth: {})",
                        profile.name, profile.server, profile.auth_server
                    );
                }
            }
        }
        ProfileCommand::Use { name } => {
            set_active_profile(&mut config, &name)?;
            save_config(&paths, &config)?;
            if globals.json {
                print_json(&json!({"ok": true, "result": {"profile": name}}))?;
            } else {
                println!("Switched to profile '{name}'.");
            }
        }
        ProfileCommand::Set {
            name,
            server,
            auth_server,
        } => {
            let name = name.unwrap_or_else(|| config.active_profile.clone());
            set_profile_server(&mut config, &name, &server, auth_server.as_deref());
            save_config(&paths, &config)?;
            if globals.json {
                print_json(&json!({"ok": true, "result": {"profile": name, "server": server}}))?;
            } else {
                println!("Profile '{name}' now points at {server}.");
            }
        }
    }

    Ok(ExitCode::Success)
}
