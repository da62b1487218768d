use saldo_core::model::{Budget, FinancialGoal, Investment, Subscription};
use saldo_core::{ExitCode, SaldoError, SaldoResult};
use saldo_sync::FinanceEngine;
use serde_json::json;

use crate::{
    BudgetCommand, GlobalOptions, GoalCommand, InvestmentCommand, SubscriptionCommand, print_json,
    with_engine,
};

pub(crate) fn cmd_budget(command: BudgetCommand, globals: &GlobalOptions) -> SaldoResult<ExitCode> {
    with_engine(globals, |engine, _ctx| match command {
        BudgetCommand::List => {
            let budgets = current_budgets(engine);
            if globals.json {
                print_json(&json!({"ok": true, "result": budgets}))?;
            } else if budgets.is_empty() {
                println!("No budgets for {}.", engine.current_month());
            } else {
                for budget in budgets {
                    println!(
                        "{} limit {:.2} spent {:.2} ({})",
                        budget.category_name, budget.limit, budget.spent, budget.id
                    );
                }
            }
            Ok(ExitCode::Success)
        }
        BudgetCommand::Add {
            category_name,
            limit,
            spent,
        } => {
            let budget = engine.add_budget(Budget {
                id: String::new(),
                category_id: None,
                category_name,
                limit,
                spent,
                month_key: String::new(),
            })?;
            if globals.json {
                print_json(&json!({"ok": true, "result": budget}))?;
            } else {
                println!("Added budget '{}' ({}).", budget.category_name, budget.id);
            }
            Ok(ExitCode::Success)
        }
        BudgetCommand::Edit {
            budget_id,
            limit,
            spent,
        } => {
            let mut budget = current_budgets(engine)
                .into_iter()
                .find(|b| b.id == budget_id)
                .ok_or_else(|| SaldoError::usage(format!("no budget with id '{budget_id}'")))?;
            if let Some(limit) = limit {
                budget.limit = limit;
            }
            if let Some(spent) = spent {
                budget.spent = spent;
            }
            engine.update_budget(budget)?;
            if globals.json {
                print_json(&json!({"ok": true, "result": {"id": budget_id}}))?;
            } else {
                println!("Updated budget '{budget_id}'.");
            }
            Ok(ExitCode::Success)
        }
        BudgetCommand::Remove { budget_id } => {
            engine.remove_budget(&budget_id)?;
            if globals.json {
                print_json(&json!({"ok": true, "result": {"removed": budget_id}}))?;
            } else {
                println!("Removed budget '{budget_id}'.");
            }
            Ok(ExitCode::Success)
        }
    })
}

pub(crate) fn cmd_investment(
    command: InvestmentCommand,
    globals: &GlobalOptions,
) -> SaldoResult<ExitCode> {
    with_engine(globals, |engine, _ctx| match command {
        InvestmentCommand::List => {
            let investments = current_investments(engine);
            if globals.json {
                print_json(&json!({"ok": true, "result": investments}))?;
            } else if investments.is_empty() {
                println!("No investments for {}.", engine.current_month());
            } else {
                for investment in investments {
                    println!(
                        "{} cost {:.2} value {:.2} ({})",
                        investment.name,
                        investment.amount,
                        investment.current_value_or_cost(),
                        investment.id
                    );
                }
            }
            Ok(ExitCode::Success)
        }
        InvestmentCommand::Add {
            name,
            kind,
            amount,
            purchase_date,
            current_value,
            notes,
        } => {
            let investment = engine.add_investment(Investment {
                id: String::new(),
                name,
                kind: kind.into(),
                amount,
                purchase_date,
                current_value,
                notes,
            })?;
            if globals.json {
                print_json(&json!({"ok": true, "result": investment}))?;
            } else {
                println!("Added investment '{}' ({}).", investment.name, investment.id);
            }
            Ok(ExitCode::Success)
        }
        InvestmentCommand::SetValue {
            investment_id,
            current_value,
        } => {
            let mut investment = current_investments(engine)
                .into_iter()
                .find(|i| i.id == investment_id)
                .ok_or_else(|| {
                    SaldoError::usage(format!("no investment with id '{investment_id}'"))
                })?;
            investment.current_value = Some(current_value);
            engine.update_investment(investment)?;
            if globals.json {
                print_json(
                    &json!({"ok": true, "result": {"id": investment_id, "currentValue": current_value}}),
                )?;
            } else {
                println!("Investment '{investment_id}' valued at {current_value:.2}.");
            }
            Ok(ExitCode::Success)
        }
        InvestmentCommand::Remove { investment_id } => {
            engine.remove_investment(&investment_id)?;
            if globals.json {
                print_json(&json!({"ok": true, "result": {"removed": investment_id}}))?;
            } else {
                println!("Removed investment '{investment_id}'.");
            }
            Ok(ExitCode::Success)
        }
    })
}

pub(crate) fn cmd_goal(command: GoalCommand, globals: &GlobalOptions) -> SaldoResult<ExitCode> {
    with_engine(globals, |engine, _ctx| match command {
        GoalCommand::List => {
            let goals = current_goals(engine);
            if globals.json {
                print_json(&json!({"ok": true, "result": goals}))?;
            } else if goals.is_empty() {
                println!("No goals for {}.", engine.current_month());
            } else {
                for goal in goals {
                    println!(
                        "{} {:.2}/{:.2} ({})",
                        goal.name, goal.current_amount, goal.target_amount, goal.id
                    );
                }
            }
            Ok(ExitCode::Success)
        }
        GoalCommand::Add {
            name,
            category,
            target,
            current,
            deadline,
        } => {
            let goal = engine.add_goal(FinancialGoal {
                id: String::new(),
                name,
                category: category.into(),
                target_amount: target,
                current_amount: current,
                deadline,
            })?;
            if globals.json {
                print_json(&json!({"ok": true, "result": goal}))?;
            } else {
                println!("Added goal '{}' ({}).", goal.name, goal.id);
            }
            Ok(ExitCode::Success)
        }
        GoalCommand::Progress {
            goal_id,
            current_amount,
        } => {
            let mut goal = current_goals(engine)
                .into_iter()
                .find(|g| g.id == goal_id)
                .ok_or_else(|| SaldoError::usage(format!("no goal with id '{goal_id}'")))?;
            goal.current_amount = current_amount;
            engine.update_goal(goal)?;
            if globals.json {
                print_json(
                    &json!({"ok": true, "result": {"id": goal_id, "currentAmount": current_amount}}),
                )?;
            } else {
                println!("Goal '{goal_id}' now at {current_amount:.2}.");
            }
            Ok(ExitCode::Success)
        }
        GoalCommand::Remove { goal_id } => {
            engine.remove_goal(&goal_id)?;
            if globals.json {
                print_json(&json!({"ok": true, "result": {"removed": goal_id}}))?;
            } else {
                println!("Removed goal '{goal_id}'.");
            }
            Ok(ExitCode::Success)
        }
    })
}

pub(crate) fn cmd_subscription(
    command: SubscriptionCommand,
    globals: &GlobalOptions,
) -> SaldoResult<ExitCode> {
    with_engine(globals, |engine, _ctx| match command {
        SubscriptionCommand::List => {
            let subscriptions = current_subscriptions(engine);
            if globals.json {
                print_json(&json!({"ok": true, "result": subscriptions}))?;
            } else if subscriptions.is_empty() {
                println!("No subscriptions for {}.", engine.current_month());
            } else {
                for subscription in subscriptions {
                    let state = if subscription.active {
                        "active"
                    } else {
                        "inactive"
                    };
                    println!(
                        "{} {:.2} next {} [{state}] ({})",
                        subscription.name,
                        subscription.amount,
                        subscription.next_billing_date,
                        subscription.id
                    );
                }
            }
            Ok(ExitCode::Success)
        }
        SubscriptionCommand::Add {
            name,
            amount,
            cycle,
            next_billing,
            category,
            notes,
        } => {
            let subscription = engine.add_subscription(Subscription {
                id: String::new(),
                name,
                amount,
                billing_cycle: cycle.into(),
                next_billing_date: next_billing,
                category,
                active: true,
                notes,
            })?;
            if globals.json {
                print_json(&json!({"ok": true, "result": subscription}))?;
            } else {
                println!(
                    "Added subscription '{}' ({}).",
                    subscription.name, subscription.id
                );
            }
            Ok(ExitCode::Success)
        }
        SubscriptionCommand::Toggle { subscription_id } => {
            let mut subscription = current_subscriptions(engine)
                .into_iter()
                .find(|s| s.id == subscription_id)
                .ok_or_else(|| {
                    SaldoError::usage(format!("no subscription with id '{subscription_id}'"))
                })?;
            subscription.active = !subscription.active;
            let active = subscription.active;
            engine.update_subscription(subscription)?;
            if globals.json {
                print_json(&json!({"ok": true, "result": {"id": subscription_id, "active": active}}))?;
            } else {
                println!(
                    "Subscription '{subscription_id}' is now {}.",
                    if active { "active" } else { "inactive" }
                );
            }
            Ok(ExitCode::Success)
        }
        SubscriptionCommand::Remove { subscription_id } => {
            engine.remove_subscription(&subscription_id)?;
            if globals.json {
                print_json(&json!({"ok": true, "result": {"removed": subscription_id}}))?;
            } else {
                println!("Removed subscription '{subscription_id}'.");
            }
            Ok(ExitCode::Success)
        }
    })
}

fn current_budgets(engine: &FinanceEngine<'_>) -> Vec<Budget> {
    engine
        .current_record()
        .and_then(|record| record.budgets.clone())
        .unwrap_or_default()
}

fn current_investments(engine: &FinanceEngine<'_>) -> Vec<Investment> {
    engine
        .current_record()
        .and_then(|record| record.investments.clone())
        .unwrap_or_default()
}

fn current_goals(engine: &FinanceEngine<'_>) -> Vec<FinancialGoal> {
    engine
        .current_record()
        .and_then(|record| record.goals.clone())
        .unwrap_or_default()
}

fn current_subscriptions(engine: &FinanceEngine<'_>) -> Vec<Subscription> {
    engine
        .current_record()
        .and_then(|record| record.subscriptions.clone())
        .unwrap_or_default()
}
