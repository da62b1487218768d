use saldo_api::FinanceApi;
use saldo_core::metrics::{self, MonthSummary};
use saldo_core::model::{
    Budget, Category, CategoryKind, Entry, FinancialGoal, Investment, MonthRecord, Subscription,
    create_id, current_month_key, is_month_key,
};
use saldo_core::{SaldoError, SaldoResult};
use saldo_store::StateStore;
use serde::Serialize;
use std::collections::HashSet;
use std::time::{Duration, Instant};

const SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

/// Snapshot of the engine's externally visible state.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub online: bool,
    pub syncing: bool,
    pub pending_changes: bool,
    pub current_month: String,
    pub month_count: usize,
    pub flush_scheduled: bool,
}

#[derive(Debug, Clone)]
struct PendingFlush {
    month_key: String,
    due: Instant,
}

/// Reconciliation engine: owns the in-memory month collection, mirrors every
/// mutation to the local store before anything touches the network, and
/// funnels month writes through one debounced flush slot.
///
/// Startup reads the pending-offline-changes flag before any network call;
/// while the flag is set the server is never allowed to overwrite local data.
/// The conflict resolves only through `sync_offline_changes` or
/// `discard_offline_changes`.
#[derive(Debug)]
pub struct FinanceEngine<'a> {
    api: &'a FinanceApi,
    store: &'a StateStore,
    months: Vec<MonthRecord>,
    current_month: String,
    online: bool,
    syncing: bool,
    pending_changes: bool,
    server_month_keys: HashSet<String>,
    pending_flush: Option<PendingFlush>,
    debounce: Duration,
}

impl<'a> FinanceEngine<'a> {
    pub fn new(api: &'a FinanceApi, store: &'a StateStore) -> Self {
        Self {
            api,
            store,
            months: Vec::new(),
            current_month: current_month_key(),
            online: false,
            syncing: false,
            pending_changes: false,
            server_month_keys: HashSet::new(),
            pending_flush: None,
            debounce: SAVE_DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Startup protocol. The pending flag is read from the store before any
    /// network traffic; when set, local data wins and the server is only
    /// probed for reachability. Without the flag the server is authoritative:
    /// its month list replaces the local mirror, and an empty collection is
    /// seeded with the current month. Any fetch failure falls back to the
    /// local mirror; startup never surfaces a server error.
    pub fn load(&mut self) -> SaldoResult<()> {
        let pending = self.store.has_pending_changes()?;
        if let Some(saved) = self.store.current_month()? {
            self.current_month = saved;
        }

        if pending {
            self.months = self.store.load_months()?;
            self.pending_changes = true;
            self.online = self.api.ping();
            self.store.set_api_status(self.online)?;
            return Ok(());
        }

        match self.api.list_months() {
            Ok(remote) => {
                self.online = true;
                self.server_month_keys = remote
                    .iter()
                    .map(|record| record.month_key.clone())
                    .collect();
                self.months = remote;
                self.months
                    .sort_by(|a, b| a.month_key.cmp(&b.month_key));
                if self.months.is_empty() {
                    self.seed_current_month();
                    self.schedule_flush(&self.current_month.clone());
                }
                self.persist_local()?;
            }
            Err(error) => {
                tracing::warn!(error = %error, "months fetch failed; loading local mirror");
                self.online = false;
                self.months = self.store.load_months()?;
                if self.months.is_empty() {
                    self.seed_current_month();
                    self.persist_local()?;
                }
            }
        }

        self.store.set_api_status(self.online)?;
        Ok(())
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            online: self.online,
            syncing: self.syncing,
            pending_changes: self.pending_changes,
            current_month: self.current_month.clone(),
            month_count: self.months.len(),
            flush_scheduled: self.pending_flush.is_some(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn has_pending_changes(&self) -> bool {
        self.pending_changes
    }

    pub fn months(&self) -> &[MonthRecord] {
        &self.months
    }

    pub fn record(&self, month_key: &str) -> Option<&MonthRecord> {
        self.months.iter().find(|m| m.month_key == month_key)
    }

    pub fn current_record(&self) -> Option<&MonthRecord> {
        self.record(&self.current_month)
    }

    pub fn current_month(&self) -> &str {
        &self.current_month
    }

    pub fn summary(&self) -> MonthSummary {
        self.current_record()
            .map(metrics::summarize)
            .unwrap_or_default()
    }

    /// Re-probes the backend and records the result.
    pub fn probe(&mut self) -> SaldoResult<bool> {
        self.online = self.api.ping();
        self.store.set_api_status(self.online)?;
        Ok(self.online)
    }

    /// Switches the current month, creating an empty record for it when it
    /// does not exist yet.
    pub fn use_month(&mut self, month_key: &str) -> SaldoResult<()> {
        validate_month_key(month_key)?;
        if self.record(month_key).is_none() {
            self.ensure_month_slot(month_key);
            self.persist_local()?;
            self.schedule_flush(month_key);
        }
        self.current_month = month_key.to_string();
        self.store.set_current_month(month_key)
    }

    /// Copies the current month into `target_key` with fresh ids and every
    /// bill unpaid, then makes the copy current. Switching only, when the
    /// target already exists.
    pub fn duplicate_month(&mut self, target_key: &str) -> SaldoResult<()> {
        validate_month_key(target_key)?;
        if self.record(target_key).is_some() {
            return self.use_month(target_key);
        }

        let copy = match self.current_record() {
            Some(record) => record.duplicate_as(target_key),
            None => MonthRecord::new(target_key),
        };
        self.insert_sorted(copy);
        self.persist_local()?;
        self.schedule_flush(target_key);
        self.current_month = target_key.to_string();
        self.store.set_current_month(target_key)
    }

    /// Removes a month locally and on the server. A server-side 404 counts
    /// as removed.
    pub fn delete_month(&mut self, month_key: &str) -> SaldoResult<()> {
        let Some(index) = self.months.iter().position(|m| m.month_key == month_key) else {
            return Err(SaldoError::usage(format!("unknown month '{month_key}'")));
        };

        self.months.remove(index);
        if self
            .pending_flush
            .as_ref()
            .is_some_and(|flush| flush.month_key == month_key)
        {
            self.pending_flush = None;
        }
        if self.current_month == month_key {
            self.current_month = self
                .months
                .last()
                .map(|m| m.month_key.clone())
                .unwrap_or_else(current_month_key);
            self.store.set_current_month(&self.current_month)?;
        }
        self.persist_local()?;
        self.server_month_keys.remove(month_key);

        match self.api.delete_month(month_key) {
            Ok(()) => self.mark_online(),
            Err(error) if error.status() == Some(404) => self.mark_online(),
            Err(error) if error.is_network() => {
                tracing::warn!(%month_key, error = %error, "month delete failed offline");
                self.mark_offline()?;
                self.set_pending(true)
            }
            Err(error) => {
                self.set_pending(true)?;
                Err(error)
            }
        }
    }

    pub fn add_category(
        &mut self,
        name: &str,
        kind: CategoryKind,
        split_by: Option<u32>,
    ) -> SaldoResult<Category> {
        let category = Category::new(name, kind, split_by);
        let stored = category.clone();
        self.mutate_current(move |record| {
            record.categories.push(stored);
            Ok(())
        })?;
        Ok(category)
    }

    pub fn rename_category(&mut self, category_id: &str, name: &str) -> SaldoResult<()> {
        let category_id = category_id.to_string();
        let name = name.to_string();
        self.mutate_current(move |record| {
            let category = record
                .category_mut(&category_id)
                .ok_or_else(|| unknown_category(&category_id))?;
            category.name = name;
            Ok(())
        })
    }

    pub fn set_category_split(
        &mut self,
        category_id: &str,
        split_by: Option<u32>,
    ) -> SaldoResult<()> {
        let category_id = category_id.to_string();
        self.mutate_current(move |record| {
            let category = record
                .category_mut(&category_id)
                .ok_or_else(|| unknown_category(&category_id))?;
            category.split_by = split_by;
            Ok(())
        })
    }

    pub fn remove_category(&mut self, category_id: &str) -> SaldoResult<()> {
        let category_id = category_id.to_string();
        self.mutate_current(move |record| {
            let before = record.categories.len();
            record.categories.retain(|c| c.id != category_id);
            if record.categories.len() == before {
                return Err(unknown_category(&category_id));
            }
            Ok(())
        })
    }

    pub fn add_entry(
        &mut self,
        category_id: &str,
        name: &str,
        amount: f64,
        note: Option<String>,
    ) -> SaldoResult<Entry> {
        let entry = Entry {
            id: create_id(),
            name: name.to_string(),
            amount,
            paid: false,
            category_id: category_id.to_string(),
            note,
        };
        let stored = entry.clone();
        let category_id = category_id.to_string();
        self.mutate_current(move |record| {
            let category = record
                .category_mut(&category_id)
                .ok_or_else(|| unknown_category(&category_id))?;
            category.entries.push(stored);
            Ok(())
        })?;
        Ok(entry)
    }

    pub fn update_entry(
        &mut self,
        category_id: &str,
        entry_id: &str,
        name: Option<String>,
        amount: Option<f64>,
    ) -> SaldoResult<()> {
        let category_id = category_id.to_string();
        let entry_id = entry_id.to_string();
        self.mutate_current(move |record| {
            let entry = find_entry(record, &category_id, &entry_id)?;
            if let Some(name) = name {
                entry.name = name;
            }
            if let Some(amount) = amount {
                entry.amount = amount;
            }
            Ok(())
        })
    }

    pub fn toggle_entry_paid(&mut self, category_id: &str, entry_id: &str) -> SaldoResult<bool> {
        let category_id = category_id.to_string();
        let entry_id = entry_id.to_string();
        self.mutate_current(move |record| {
            let entry = find_entry(record, &category_id, &entry_id)?;
            entry.paid = !entry.paid;
            Ok(entry.paid)
        })
    }

    pub fn remove_entry(&mut self, category_id: &str, entry_id: &str) -> SaldoResult<()> {
        let category_id = category_id.to_string();
        let entry_id = entry_id.to_string();
        self.mutate_current(move |record| {
            let category = record
                .category_mut(&category_id)
                .ok_or_else(|| unknown_category(&category_id))?;
            let before = category.entries.len();
            category.entries.retain(|e| e.id != entry_id);
            if category.entries.len() == before {
                return Err(SaldoError::usage(format!("unknown entry '{entry_id}'")));
            }
            Ok(())
        })
    }

    pub fn add_budget(&mut self, mut budget: Budget) -> SaldoResult<Budget> {
        if budget.id.is_empty() {
            budget.id = create_id();
        }
        budget.month_key = self.current_month.clone();
        let stored = budget.clone();
        let sent = budget.clone();
        self.entity_write(
            move |record| {
                record.budgets.get_or_insert_with(Vec::new).push(stored);
                Ok(())
            },
            move |api, month_key| api.create_budget(month_key, &sent),
        )?;
        Ok(budget)
    }

    pub fn update_budget(&mut self, budget: Budget) -> SaldoResult<()> {
        let stored = budget.clone();
        self.entity_write(
            move |record| replace_by_id(record.budgets.get_or_insert_with(Vec::new), stored, |b: &Budget| b.id.as_str()),
            move |api, month_key| api.update_budget(month_key, &budget),
        )
    }

    pub fn remove_budget(&mut self, budget_id: &str) -> SaldoResult<()> {
        let id = budget_id.to_string();
        let sent = budget_id.to_string();
        self.entity_write(
            move |record| remove_by_id(record.budgets.get_or_insert_with(Vec::new), &id, |b: &Budget| b.id.as_str()),
            move |api, month_key| absorb_not_found(api.delete_budget(month_key, &sent)),
        )
    }

    pub fn add_investment(&mut self, mut investment: Investment) -> SaldoResult<Investment> {
        if investment.id.is_empty() {
            investment.id = create_id();
        }
        let stored = investment.clone();
        let sent = investment.clone();
        self.entity_write(
            move |record| {
                record.investments.get_or_insert_with(Vec::new).push(stored);
                Ok(())
            },
            move |api, month_key| api.create_investment(month_key, &sent),
        )?;
        Ok(investment)
    }

    pub fn update_investment(&mut self, investment: Investment) -> SaldoResult<()> {
        let stored = investment.clone();
        self.entity_write(
            move |record| {
                replace_by_id(record.investments.get_or_insert_with(Vec::new), stored, |i: &Investment| {
                    i.id.as_str()
                })
            },
            move |api, month_key| api.update_investment(month_key, &investment),
        )
    }

    pub fn remove_investment(&mut self, investment_id: &str) -> SaldoResult<()> {
        let id = investment_id.to_string();
        let sent = investment_id.to_string();
        self.entity_write(
            move |record| {
                remove_by_id(record.investments.get_or_insert_with(Vec::new), &id, |i: &Investment| {
                    i.id.as_str()
                })
            },
            move |api, month_key| absorb_not_found(api.delete_investment(month_key, &sent)),
        )
    }

    pub fn add_goal(&mut self, mut goal: FinancialGoal) -> SaldoResult<FinancialGoal> {
        if goal.id.is_empty() {
            goal.id = create_id();
        }
        let stored = goal.clone();
        let sent = goal.clone();
        self.entity_write(
            move |record| {
                record.goals.get_or_insert_with(Vec::new).push(stored);
                Ok(())
            },
            move |api, month_key| api.create_goal(month_key, &sent),
        )?;
        Ok(goal)
    }

    pub fn update_goal(&mut self, goal: FinancialGoal) -> SaldoResult<()> {
        let stored = goal.clone();
        self.entity_write(
            move |record| replace_by_id(record.goals.get_or_insert_with(Vec::new), stored, |g: &FinancialGoal| g.id.as_str()),
            move |api, month_key| api.update_goal(month_key, &goal),
        )
    }

    pub fn remove_goal(&mut self, goal_id: &str) -> SaldoResult<()> {
        let id = goal_id.to_string();
        let sent = goal_id.to_string();
        self.entity_write(
            move |record| remove_by_id(record.goals.get_or_insert_with(Vec::new), &id, |g: &FinancialGoal| g.id.as_str()),
            move |api, month_key| absorb_not_found(api.delete_goal(month_key, &sent)),
        )
    }

    pub fn add_subscription(&mut self, mut subscription: Subscription) -> SaldoResult<Subscription> {
        if subscription.id.is_empty() {
            subscription.id = create_id();
        }
        let stored = subscription.clone();
        let sent = subscription.clone();
        self.entity_write(
            move |record| {
                record
                    .subscriptions
                    .get_or_insert_with(Vec::new)
                    .push(stored);
                Ok(())
            },
            move |api, month_key| api.create_subscription(month_key, &sent),
        )?;
        Ok(subscription)
    }

    pub fn update_subscription(&mut self, subscription: Subscription) -> SaldoResult<()> {
        let stored = subscription.clone();
        self.entity_write(
            move |record| {
                replace_by_id(
                    record.subscriptions.get_or_insert_with(Vec::new),
                    stored,
                    |s: &Subscription| s.id.as_str(),
                )
            },
            move |api, month_key| api.update_subscription(month_key, &subscription),
        )
    }

    pub fn remove_subscription(&mut self, subscription_id: &str) -> SaldoResult<()> {
        let id = subscription_id.to_string();
        let sent = subscription_id.to_string();
        self.entity_write(
            move |record| {
                remove_by_id(record.subscriptions.get_or_insert_with(Vec::new), &id, |s: &Subscription| {
                    s.id.as_str()
                })
            },
            move |api, month_key| absorb_not_found(api.delete_subscription(month_key, &sent)),
        )
    }

    /// Runs the scheduled flush when its debounce window has elapsed.
    pub fn flush_if_due(&mut self) -> SaldoResult<()> {
        if self
            .pending_flush
            .as_ref()
            .is_some_and(|flush| Instant::now() >= flush.due)
        {
            return self.flush_now();
        }
        Ok(())
    }

    /// Runs the scheduled flush immediately, ignoring the debounce window.
    /// One-shot callers use this before exiting.
    pub fn flush_now(&mut self) -> SaldoResult<()> {
        let Some(flush) = self.pending_flush.take() else {
            return Ok(());
        };
        let Some(record) = self.record(&flush.month_key).cloned() else {
            return Ok(());
        };

        self.syncing = true;
        let result = self.push_month(&record);
        self.syncing = false;

        match result {
            Ok(()) => self.mark_online(),
            Err(error) if error.is_network() => {
                tracing::warn!(
                    month_key = %flush.month_key,
                    error = %error,
                    "flush failed offline; keeping local changes pending"
                );
                self.mark_offline()?;
                self.set_pending(true)
            }
            Err(error) => {
                self.set_pending(true)?;
                Err(error)
            }
        }
    }

    pub fn flush_scheduled(&self) -> bool {
        self.pending_flush.is_some()
    }

    /// Pushes every local month to the server and clears the pending flag.
    /// Local data wins entirely.
    pub fn sync_offline_changes(&mut self) -> SaldoResult<()> {
        self.syncing = true;
        let result = self.push_all_months();
        self.syncing = false;

        match result {
            Ok(()) => {
                self.pending_flush = None;
                self.set_pending(false)?;
                self.mark_online()
            }
            Err(error) => {
                if error.is_network() {
                    self.mark_offline()?;
                }
                Err(error)
            }
        }
    }

    /// Replaces local data with the server's collection and clears the
    /// pending flag. Local offline changes are gone after this.
    pub fn discard_offline_changes(&mut self) -> SaldoResult<()> {
        self.syncing = true;
        let result = self.api.list_months();
        self.syncing = false;

        match result {
            Ok(remote) => {
                self.server_month_keys = remote
                    .iter()
                    .map(|record| record.month_key.clone())
                    .collect();
                self.months = remote;
                self.months.sort_by(|a, b| a.month_key.cmp(&b.month_key));
                self.pending_flush = None;
                self.persist_local()?;
                self.set_pending(false)?;
                self.mark_online()
            }
            Err(error) => {
                if error.is_network() {
                    self.mark_offline()?;
                }
                Err(error)
            }
        }
    }

    fn push_all_months(&mut self) -> SaldoResult<()> {
        let remote = self.api.list_months()?;
        self.server_month_keys = remote
            .iter()
            .map(|record| record.month_key.clone())
            .collect();

        for record in self.months.clone() {
            self.push_month(&record)?;
        }
        Ok(())
    }

    /// Update-or-create with a memo of keys the server has confirmed. A 404
    /// on update falls back to create, a 409 on create falls back to update,
    /// so replaying the same write is safe.
    fn push_month(&mut self, record: &MonthRecord) -> SaldoResult<()> {
        if self.server_month_keys.contains(&record.month_key) {
            match self.api.update_month(&record.month_key, record) {
                Ok(()) => {}
                Err(error) if error.status() == Some(404) => self.api.create_month(record)?,
                Err(error) => return Err(error),
            }
        } else {
            match self.api.create_month(record) {
                Ok(()) => {}
                Err(error) if error.status() == Some(409) => {
                    self.api.update_month(&record.month_key, record)?
                }
                Err(error) => return Err(error),
            }
        }

        self.server_month_keys.insert(record.month_key.clone());
        Ok(())
    }

    fn mutate_current<T>(
        &mut self,
        apply: impl FnOnce(&mut MonthRecord) -> SaldoResult<T>,
    ) -> SaldoResult<T> {
        let month_key = self.current_month.clone();
        let value = self.commit_month(&month_key, apply)?;
        self.schedule_flush(&month_key);
        Ok(value)
    }

    /// Applies a mutation to a copy of the month record and only installs
    /// the result and persists the mirror when it succeeds, so a rejected
    /// mutation leaves neither a stray in-memory month nor an unpersisted
    /// one behind.
    fn commit_month<T>(
        &mut self,
        month_key: &str,
        apply: impl FnOnce(&mut MonthRecord) -> SaldoResult<T>,
    ) -> SaldoResult<T> {
        let existing = self.months.iter().position(|m| m.month_key == month_key);
        let mut record = match existing {
            Some(index) => self.months[index].clone(),
            None => MonthRecord::new(month_key),
        };

        let value = apply(&mut record)?;

        match existing {
            Some(index) => self.months[index] = record,
            None => self.insert_sorted(record),
        }
        self.persist_local()?;
        Ok(value)
    }

    /// Optimistic local update plus an immediate remote write. Network
    /// failures are absorbed into the pending flag; API rejections keep the
    /// local change, set the flag, and propagate.
    fn entity_write<T>(
        &mut self,
        apply: impl FnOnce(&mut MonthRecord) -> SaldoResult<T>,
        remote: impl FnOnce(&FinanceApi, &str) -> SaldoResult<()>,
    ) -> SaldoResult<T> {
        let month_key = self.current_month.clone();
        let value = self.commit_month(&month_key, apply)?;

        let api = self.api;
        match remote(api, &month_key) {
            Ok(()) => {
                self.mark_online()?;
                Ok(value)
            }
            Err(error) if error.is_network() => {
                tracing::warn!(%month_key, error = %error, "entity write failed offline; keeping local change");
                self.mark_offline()?;
                self.set_pending(true)?;
                Ok(value)
            }
            Err(error) => {
                self.set_pending(true)?;
                Err(error)
            }
        }
    }

    fn ensure_month_slot(&mut self, month_key: &str) -> usize {
        if let Some(index) = self.months.iter().position(|m| m.month_key == month_key) {
            return index;
        }
        self.insert_sorted(MonthRecord::new(month_key));
        self.months
            .iter()
            .position(|m| m.month_key == month_key)
            .unwrap_or(0)
    }

    fn insert_sorted(&mut self, record: MonthRecord) {
        let index = self
            .months
            .partition_point(|m| m.month_key < record.month_key);
        self.months.insert(index, record);
    }

    fn seed_current_month(&mut self) {
        let key = self.current_month.clone();
        self.insert_sorted(MonthRecord::new(key));
    }

    fn schedule_flush(&mut self, month_key: &str) {
        self.pending_flush = Some(PendingFlush {
            month_key: month_key.to_string(),
            due: Instant::now() + self.debounce,
        });
    }

    fn persist_local(&self) -> SaldoResult<()> {
        self.store.save_months(&self.months)
    }

    fn set_pending(&mut self, pending: bool) -> SaldoResult<()> {
        self.pending_changes = pending;
        self.store.set_pending_changes(pending)
    }

    fn mark_online(&mut self) -> SaldoResult<()> {
        self.online = true;
        self.store.set_api_status(true)
    }

    fn mark_offline(&mut self) -> SaldoResult<()> {
        self.online = false;
        self.store.set_api_status(false)
    }
}

fn validate_month_key(month_key: &str) -> SaldoResult<()> {
    if is_month_key(month_key) {
        Ok(())
    } else {
        Err(SaldoError::usage(format!(
            "'{month_key}' is not a month key (expected YYYY-MM)"
        )))
    }
}

fn unknown_category(category_id: &str) -> SaldoError {
    SaldoError::usage(format!("unknown category '{category_id}'"))
}

fn find_entry<'r>(
    record: &'r mut MonthRecord,
    category_id: &str,
    entry_id: &str,
) -> SaldoResult<&'r mut Entry> {
    let category = record
        .category_mut(category_id)
        .ok_or_else(|| unknown_category(category_id))?;
    category
        .entries
        .iter_mut()
        .find(|e| e.id == entry_id)
        .ok_or_else(|| SaldoError::usage(format!("unknown entry '{entry_id}'")))
}

fn replace_by_id<T>(
    items: &mut Vec<T>,
    replacement: T,
    id_of: impl Fn(&T) -> &str,
) -> SaldoResult<()> {
    let id = id_of(&replacement).to_string();
    match items.iter().position(|item| id_of(item) == id.as_str()) {
        Some(index) => {
            items[index] = replacement;
            Ok(())
        }
        None => Err(SaldoError::usage(format!("no item with id '{id}'"))),
    }
}

fn remove_by_id<T>(items: &mut Vec<T>, id: &str, id_of: impl Fn(&T) -> &str) -> SaldoResult<()> {
    let before = items.len();
    items.retain(|item| id_of(item) != id);
    if items.len() == before {
        return Err(SaldoError::usage(format!("no item with id '{id}'")));
    }
    Ok(())
}

fn absorb_not_found(result: SaldoResult<()>) -> SaldoResult<()> {
    match result {
        Err(error) if error.status() == Some(404) => Ok(()),
        other => other,
    }
}
