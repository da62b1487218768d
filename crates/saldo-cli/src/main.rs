mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use saldo_api::FinanceApi;
use saldo_core::model::{BillingCycle, GoalCategory, InvestmentKind};
use saldo_core::{ExitCode, SaldoError, SaldoResult};
use saldo_fs::{WorkspacePaths, init_workspace, load_config, resolve_profile, resolve_workspace};
use saldo_store::StateStore;
use saldo_sync::FinanceEngine;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "saldo",
    version,
    about = "Workspace-first offline-capable finance ledger CLI",
    arg_required_else_help = true
)]
struct Cli {
    #[arg(long, global = true)]
    profile: Option<String>,

    #[arg(long, global = true, value_name = "PATH")]
    workspace: Option<PathBuf>,

    #[arg(long, global = true)]
    server: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    no_color: bool,

    #[arg(long, global = true)]
    debug: bool,

    #[arg(long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Init,
    Doctor,
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
    Month {
        #[command(subcommand)]
        command: MonthCommand,
    },
    Category {
        #[command(subcommand)]
        command: CategoryCommand,
    },
    Entry {
        #[command(subcommand)]
        command: EntryCommand,
    },
    Budget {
        #[command(subcommand)]
        command: BudgetCommand,
    },
    Investment {
        #[command(subcommand)]
        command: InvestmentCommand,
    },
    Goal {
        #[command(subcommand)]
        command: GoalCommand,
    },
    Subscription {
        #[command(subcommand)]
        command: SubscriptionCommand,
    },
    Summary,
    Sync {
        #[command(subcommand)]
        command: SyncCommand,
    },
}

#[derive(Debug, Subcommand)]
enum ProfileCommand {
    List,
    Use {
        name: String,
    },
    Set {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        server: String,

        #[arg(long)]
        auth_server: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum AuthCommand {
    SetToken {
        #[arg(long)]
        access: String,
        #[arg(long)]
        refresh: String,
    },
    Status,
    Logout,
}

#[derive(Debug, Subcommand)]
enum MonthCommand {
    List,
    Use {
        month_key: String,
    },
    Show {
        month_key: Option<String>,
    },
    Duplicate {
        target_key: String,
    },
    Delete {
        month_key: String,
    },
}

#[derive(Debug, Subcommand)]
enum CategoryCommand {
    Add {
        name: String,
        #[arg(long)]
        income: bool,
        #[arg(long)]
        split_by: Option<u32>,
    },
    Rename {
        category_id: String,
        name: String,
    },
    Split {
        category_id: String,
        #[arg(long)]
        by: Option<u32>,
    },
    Remove {
        category_id: String,
    },
}

#[derive(Debug, Subcommand)]
enum EntryCommand {
    Add {
        #[arg(long)]
        category: String,
        name: String,
        amount: f64,
        #[arg(long)]
        note: Option<String>,
    },
    Edit {
        #[arg(long)]
        category: String,
        entry_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        amount: Option<f64>,
    },
    Toggle {
        #[arg(long)]
        category: String,
        entry_id: String,
    },
    Remove {
        #[arg(long)]
        category: String,
        entry_id: String,
    },
}

#[derive(Debug, Subcommand)]
enum BudgetCommand {
    List,
    Add {
        category_name: String,
        #[arg(long)]
        limit: f64,
        #[arg(long, default_value_t = 0.0)]
        spent: f64,
    },
    Edit {
        budget_id: String,
        #[arg(long)]
        limit: Option<f64>,
        #[arg(long)]
        spent: Option<f64>,
    },
    Remove {
        budget_id: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InvestmentKindArg {
    Stocks,
    Funds,
    Crypto,
    Savings,
    RealEstate,
    Other,
}

impl From<InvestmentKindArg> for InvestmentKind {
    fn from(value: InvestmentKindArg) -> Self {
        match value {
            InvestmentKindArg::Stocks => InvestmentKind::Stocks,
            InvestmentKindArg::Funds => InvestmentKind::Funds,
            InvestmentKindArg::Crypto => InvestmentKind::Crypto,
            InvestmentKindArg::Savings => InvestmentKind::Savings,
            InvestmentKindArg::RealEstate => InvestmentKind::RealEstate,
            InvestmentKindArg::Other => InvestmentKind::Other,
        }
    }
}

#[derive(Debug, Subcommand)]
enum InvestmentCommand {
    List,
    Add {
        name: String,
        #[arg(long = "type", value_enum)]
        kind: InvestmentKindArg,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        purchase_date: String,
        #[arg(long)]
        current_value: Option<f64>,
        #[arg(long)]
        notes: Option<String>,
    },
    SetValue {
        investment_id: String,
        current_value: f64,
    },
    Remove {
        investment_id: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GoalCategoryArg {
    Emergency,
    Purchase,
    Vacation,
    Education,
    Retirement,
    Other,
}

impl From<GoalCategoryArg> for GoalCategory {
    fn from(value: GoalCategoryArg) -> Self {
        match value {
            GoalCategoryArg::Emergency => GoalCategory::Emergency,
            GoalCategoryArg::Purchase => GoalCategory::Purchase,
            GoalCategoryArg::Vacation => GoalCategory::Vacation,
            GoalCategoryArg::Education => GoalCategory::Education,
            GoalCategoryArg::Retirement => GoalCategory::Retirement,
            GoalCategoryArg::Other => GoalCategory::Other,
        }
    }
}

#[derive(Debug, Subcommand)]
enum GoalCommand {
    List,
    Add {
        name: String,
        #[arg(long, value_enum)]
        category: GoalCategoryArg,
        #[arg(long)]
        target: f64,
        #[arg(long, default_value_t = 0.0)]
        current: f64,
        #[arg(long)]
        deadline: Option<String>,
    },
    Progress {
        goal_id: String,
        current_amount: f64,
    },
    Remove {
        goal_id: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BillingCycleArg {
    Monthly,
    Quarterly,
    Yearly,
}

impl From<BillingCycleArg> for BillingCycle {
    fn from(value: BillingCycleArg) -> Self {
        match value {
            BillingCycleArg::Monthly => BillingCycle::Monthly,
            BillingCycleArg::Quarterly => BillingCycle::Quarterly,
            BillingCycleArg::Yearly => BillingCycle::Yearly,
        }
    }
}

#[derive(Debug, Subcommand)]
enum SubscriptionCommand {
    List,
    Add {
        name: String,
        #[arg(long)]
        amount: f64,
        #[arg(long, value_enum)]
        cycle: BillingCycleArg,
        #[arg(long)]
        next_billing: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    Toggle {
        subscription_id: String,
    },
    Remove {
        subscription_id: String,
    },
}

#[derive(Debug, Subcommand)]
enum SyncCommand {
    Status,
    Push,
    Discard,
}

#[derive(Debug, Clone)]
struct GlobalOptions {
    profile: Option<String>,
    workspace: Option<PathBuf>,
    server: Option<String>,
    json: bool,
    yes: bool,
}

#[derive(Debug)]
struct AppContext {
    paths: WorkspacePaths,
    profile: String,
    server: String,
    api: FinanceApi,
    store: StateStore,
}

fn main() {
    let cli = Cli::parse();
    configure_logging(cli.debug, cli.json, cli.no_color);

    let globals = GlobalOptions {
        profile: cli.profile,
        workspace: cli.workspace,
        server: cli.server,
        json: cli.json,
        yes: cli.yes,
    };

    let result = run_command(cli.command, &globals);

    let exit = match result {
        Ok(code) => code,
        Err(error) => {
            render_error(&error, globals.json);
            error.exit_code()
        }
    };

    std::process::exit(exit.as_i32());
}

fn configure_logging(debug: bool, json: bool, no_color: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_ansi(false)
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_ansi(!no_color)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn run_command(command: Command, globals: &GlobalOptions) -> SaldoResult<ExitCode> {
    match command {
        Command::Init => commands::workspace::cmd_init(globals),
        Command::Doctor => commands::workspace::cmd_doctor(globals),
        Command::Profile { command } => commands::workspace::cmd_profile(command, globals),
        Command::Auth { command } => commands::auth::cmd_auth(command, globals),
        Command::Month { command } => commands::ledger::cmd_month(command, globals),
        Command::Category { command } => commands::ledger::cmd_category(command, globals),
        Command::Entry { command } => commands::ledger::cmd_entry(command, globals),
        Command::Summary => commands::ledger::cmd_summary(globals),
        Command::Budget { command } => commands::planning::cmd_budget(command, globals),
        Command::Investment { command } => commands::planning::cmd_investment(command, globals),
        Command::Goal { command } => commands::planning::cmd_goal(command, globals),
        Command::Subscription { command } => commands::planning::cmd_subscription(command, globals),
        Command::Sync { command } => commands::sync::cmd_sync(command, globals),
    }
}

fn with_app_context<F>(globals: &GlobalOptions, run: F) -> SaldoResult<ExitCode>
where
    F: FnOnce(AppContext) -> SaldoResult<ExitCode>,
{
    let target = workspace_target(globals)?;
    if !target.join(".saldo").is_dir() {
        init_workspace(Some(&target), globals.server.as_deref())?;
    }

    let paths = resolve_workspace(Some(&target))?;
    let config = load_config(&paths)?;
    let resolved = resolve_profile(
        &config,
        globals.profile.as_deref(),
        globals.server.as_deref(),
    )?;
    let store = StateStore::from_workspace(&paths)?;
    let api = FinanceApi::new(
        &resolved.server,
        &resolved.auth_server,
        Arc::new(store.clone()),
    )?;

    run(AppContext {
        paths,
        profile: resolved.name,
        server: resolved.server,
        api,
        store,
    })
}

/// Builds the engine, loads state (local flag first, then the network),
/// runs the command, and flushes any debounced write before exiting.
fn with_engine<F>(globals: &GlobalOptions, run: F) -> SaldoResult<ExitCode>
where
    F: FnOnce(&mut FinanceEngine<'_>, &AppContext) -> SaldoResult<ExitCode>,
{
    with_app_context(globals, |ctx| {
        let mut engine = FinanceEngine::new(&ctx.api, &ctx.store);
        engine.load()?;
        let code = run(&mut engine, &ctx)?;
        engine.flush_now()?;
        Ok(code)
    })
}

fn workspace_target(globals: &GlobalOptions) -> SaldoResult<PathBuf> {
    if let Some(path) = &globals.workspace {
        return absolutize(path);
    }

    std::env::current_dir()
        .map_err(|err| SaldoError::io(format!("failed to resolve current directory: {err}")))
}

fn absolutize(path: &Path) -> SaldoResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    let cwd = std::env::current_dir()
        .map_err(|err| SaldoError::io(format!("failed to resolve current directory: {err}")))?;

    Ok(cwd.join(path))
}

fn render_error(error: &SaldoError, json_output: bool) {
    if json_output {
        let payload = json!({
            "ok": false,
            "error": {
                "kind": error.kind,
                "message": &error.message,
                "status": error.status,
            }
        });
        let serialized = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| {
            "{\"ok\":false,\"error\":{\"kind\":\"io\",\"message\":\"failed to serialize error\"}}"
                .to_string()
        });
        eprintln!("{serialized}");
    } else {
        eprintln!("error: {}", error.message);
    }
}

fn print_json<T: Serialize>(value: &T) -> SaldoResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| SaldoError::io(format!("failed to render JSON output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
