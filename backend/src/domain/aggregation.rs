//! # Aggregation
//!
//! Pure functions deriving totals and groupings from in-memory record lists.
//! Nothing here touches storage; services fetch, then call into this module.

use serde_json::{Number, Value};
use shared::{ExpenseFrequency, FinanceKind, FinanceRecord, NormalizedAmount};
use std::collections::HashMap;
use std::hash::Hash;

pub const DEFAULT_DECIMALS: u32 = 2;

/// Sum of `amount` over the records of one kind owned by one user
pub fn total_by_type(records: &[FinanceRecord], kind: FinanceKind, user_id: &str) -> f64 {
    records
        .iter()
        .filter(|r| r.kind() == kind && r.user_id() == user_id)
        .map(FinanceRecord::amount)
        .sum()
}

/// Yearly and monthly equivalents of an expense amount.
///
/// Only monthly and yearly expenses are normalized; every other frequency
/// yields zero for both.
pub fn normalize_expense(amount: f64, frequency: ExpenseFrequency) -> NormalizedAmount {
    match frequency {
        ExpenseFrequency::Monthly => NormalizedAmount {
            yearly: amount * 12.0,
            monthly: amount,
        },
        ExpenseFrequency::Yearly => NormalizedAmount {
            yearly: amount,
            monthly: amount / 12.0,
        },
        ExpenseFrequency::Weekly | ExpenseFrequency::OneTime => NormalizedAmount::default(),
    }
}

pub fn sum_by<T>(items: &[T], value: impl Fn(&T) -> f64) -> f64 {
    items.iter().map(value).sum()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group<K, T> {
    pub key: K,
    pub items: Vec<T>,
}

/// Group items by key, keeping keys in first-seen order and items in input order
pub fn group_by<T, K, I, F>(items: I, key_fn: F) -> Vec<Group<K, T>>
where
    I: IntoIterator<Item = T>,
    K: Eq + Hash + Clone,
    F: Fn(&T) -> K,
{
    let mut groups: Vec<Group<K, T>> = Vec::new();
    let mut index: HashMap<K, usize> = HashMap::new();

    for item in items {
        let key = key_fn(&item);
        match index.get(&key) {
            Some(&i) => groups[i].items.push(item),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(Group { key, items: vec![item] });
            }
        }
    }
    groups
}

/// Round half up to `decimals` places. Non-finite input is returned unchanged.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor + 0.5).floor() / factor;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}

/// Round a JSON value if it is a non-integer number; anything else is returned as is
pub fn round_value(value: &Value, decimals: u32) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => n
            .as_f64()
            .and_then(|f| Number::from_f64(round_to(f, decimals)))
            .map(Value::Number)
            .unwrap_or_else(|| value.clone()),
        _ => value.clone(),
    }
}

/// Which savings group is open. At most one group is expanded at a time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupExpansion {
    expanded: Option<String>,
}

impl GroupExpansion {
    /// Open `key` and collapse every other group, or collapse `key` if it was open
    pub fn toggle(&mut self, key: &str) {
        if self.expanded.as_deref() == Some(key) {
            self.expanded = None;
        } else {
            self.expanded = Some(key.to_string());
        }
    }

    pub fn is_expanded(&self, key: &str) -> bool {
        self.expanded.as_deref() == Some(key)
    }

    pub fn expanded(&self) -> Option<&str> {
        self.expanded.as_deref()
    }
}
