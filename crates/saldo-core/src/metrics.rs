//! Pure derived metrics over a month record. Nothing here caches: every
//! call recomputes from the snapshot it is given.

use crate::model::{Category, CategoryKind, MonthRecord};
use serde::Serialize;

pub fn bill_categories(record: &MonthRecord) -> impl Iterator<Item = &Category> {
    record
        .categories
        .iter()
        .filter(|c| c.kind == CategoryKind::Bills)
}

pub fn income_categories(record: &MonthRecord) -> impl Iterator<Item = &Category> {
    record
        .categories
        .iter()
        .filter(|c| c.kind == CategoryKind::Income)
}

pub fn category_total(category: &Category) -> f64 {
    category.entries.iter().map(|entry| entry.amount).sum()
}

pub fn category_paid(category: &Category) -> f64 {
    category
        .entries
        .iter()
        .filter(|entry| entry.paid)
        .map(|entry| entry.amount)
        .sum()
}

pub fn grand_total(record: &MonthRecord) -> f64 {
    bill_categories(record).map(category_total).sum()
}

pub fn grand_paid(record: &MonthRecord) -> f64 {
    bill_categories(record).map(category_paid).sum()
}

pub fn income_total(record: &MonthRecord) -> f64 {
    income_categories(record).map(category_total).sum()
}

/// Per-category total divided by `splitBy` when it is 2 or more, otherwise
/// the full total.
pub fn my_share(record: &MonthRecord) -> f64 {
    bill_categories(record)
        .map(|category| {
            let total = category_total(category);
            match category.split_by {
                Some(split) if split > 1 => total / f64::from(split),
                _ => total,
            }
        })
        .sum()
}

/// Income minus my share, not minus the full bill total.
pub fn leftover(record: &MonthRecord) -> f64 {
    income_total(record) - my_share(record)
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MonthSummary {
    pub grand_total: f64,
    pub grand_paid: f64,
    pub income_total: f64,
    pub my_share: f64,
    pub leftover: f64,
}

pub fn summarize(record: &MonthRecord) -> MonthSummary {
    MonthSummary {
        grand_total: grand_total(record),
        grand_paid: grand_paid(record),
        income_total: income_total(record),
        my_share: my_share(record),
        leftover: leftover(record),
    }
}
