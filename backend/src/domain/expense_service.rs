//! Expense table: recurring expenses with derived yearly/monthly amounts.
//!
//! The derived amounts are never taken from the client. They are recomputed
//! from `amount` and `frequency` on every create and update, and the finance
//! summary is told to reload once the write has been persisted.

use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use log::{error, info, warn};
use serde_json::{Map, Value};

use crate::domain::aggregation::{normalize_expense, round_to, sum_by, DEFAULT_DECIMALS};
use crate::domain::auth_service::AuthState;
use crate::domain::sync_notifier::SyncNotifier;
use crate::domain::validation::{require_non_negative, require_text, ValidationError};
use crate::storage::Repository;
use shared::{Expense, ExpenseFrequency, ExpenseRow, ExpenseTableResponse, ExpenseTotals, SaveExpenseRequest};

#[derive(Clone)]
pub struct ExpenseService {
    expenses: Repository<Expense>,
    auth: AuthState,
    notifier: SyncNotifier,
}

impl ExpenseService {
    pub fn new(expenses: Repository<Expense>, auth: AuthState, notifier: SyncNotifier) -> Self {
        Self {
            expenses,
            auth,
            notifier,
        }
    }

    pub async fn list(&self) -> Result<Vec<Expense>> {
        let user = self.auth.require_user()?;
        self.expenses.list_for_user(&user.uid).await
    }

    /// Rows with their due-date labels plus column totals
    pub async fn table(&self) -> Result<ExpenseTableResponse> {
        let expenses = self.list().await?;
        let totals = totals(&expenses);
        let rows = expenses
            .into_iter()
            .map(|expense| ExpenseRow {
                due_label: describe_due_date(&expense),
                expense,
            })
            .collect();
        Ok(ExpenseTableResponse { rows, totals })
    }

    pub async fn create(&self, request: SaveExpenseRequest) -> Result<Expense> {
        info!("Creating expense {:?}", request.expense_name);
        let user = self.auth.require_user()?;
        let mut expense = build_expense(request, &user.uid)?;

        let id = self.expenses.create(&expense).await?;
        // The document id doubles as the expense id
        let mut fields = Map::new();
        fields.insert("expenseId".to_string(), Value::String(id.clone()));
        if let Err(e) = self.expenses.update_fields(&id, fields).await {
            warn!("Removing expense {} after its id could not be stored", id);
            if let Err(cleanup) = self.expenses.delete(&id).await {
                error!("Failed to remove half-created expense {}: {:#}", id, cleanup);
            }
            return Err(e);
        }
        expense.expense_id = id;

        self.notifier.notify_expense_changed();
        Ok(expense)
    }

    /// Look up one expense of the signed-in user
    pub async fn get(&self, expense_id: &str) -> Result<Expense> {
        let user = self.auth.require_user()?;
        self.expenses.get_for_user(&user.uid, expense_id).await
    }

    pub async fn update(&self, expense_id: &str, request: SaveExpenseRequest) -> Result<Expense> {
        info!("Updating expense {}", expense_id);
        let existing = self.get(expense_id).await?;
        let mut expense = build_expense(request, &existing.user_id)?;
        expense.expense_id = existing.expense_id;

        self.expenses.update(expense_id, &expense).await?;
        self.notifier.notify_expense_changed();
        Ok(expense)
    }

    pub async fn delete(&self, expense_id: &str) -> Result<()> {
        info!("Deleting expense {}", expense_id);
        self.get(expense_id).await?;
        self.expenses.delete(expense_id).await?;
        self.notifier.notify_expense_changed();
        Ok(())
    }
}

fn build_expense(request: SaveExpenseRequest, user_id: &str) -> Result<Expense, ValidationError> {
    require_text("expenseName", &request.expense_name)?;
    let amount = require_non_negative("amount", request.amount)?;
    let due_date = request.due_date.ok_or(ValidationError::Required("dueDate"))?;
    let net = normalize_expense(amount, request.frequency);

    Ok(Expense {
        expense_id: String::new(),
        expense_name: request.expense_name.trim().to_string(),
        frequency: request.frequency,
        due_date: Some(due_date),
        amount,
        net_amount_yearly: net.yearly,
        net_amount_monthly: net.monthly,
        user_id: user_id.to_string(),
    })
}

/// Column totals of the expense table, rounded for display
pub fn totals(expenses: &[Expense]) -> ExpenseTotals {
    ExpenseTotals {
        amount: round_to(sum_by(expenses, |e| e.amount), DEFAULT_DECIMALS),
        net_amount_yearly: round_to(sum_by(expenses, |e| e.net_amount_yearly), DEFAULT_DECIMALS),
        net_amount_monthly: round_to(sum_by(expenses, |e| e.net_amount_monthly), DEFAULT_DECIMALS),
    }
}

fn ordinal(day: u32) -> String {
    let suffix = match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", day, suffix)
}

/// "5th of every month" for monthly expenses, "5th of every year" for yearly
/// ones, and the plain date otherwise
pub fn describe_due_date(expense: &Expense) -> String {
    let Some(date) = expense.due_date else {
        return String::new();
    };
    describe(date, expense.frequency)
}

fn describe(date: NaiveDate, frequency: ExpenseFrequency) -> String {
    match frequency {
        ExpenseFrequency::Monthly => format!("{} of every month", ordinal(date.day())),
        ExpenseFrequency::Yearly => format!("{} of every year", ordinal(date.day())),
        ExpenseFrequency::Weekly | ExpenseFrequency::OneTime => date.format("%Y-%m-%d").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::auth_service::tests::signed_in_state;
    use crate::domain::sync_notifier::SyncEvent;
    use crate::storage::{Collection, Document, DocumentStore, MemoryStore, StoreError};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    fn request(name: &str, frequency: ExpenseFrequency, amount: Option<f64>) -> SaveExpenseRequest {
        SaveExpenseRequest {
            expense_name: name.to_string(),
            frequency,
            due_date: NaiveDate::from_ymd_opt(2024, 3, 5),
            amount,
        }
    }

    fn service(store: &MemoryStore, notifier: &SyncNotifier) -> ExpenseService {
        ExpenseService::new(
            Repository::new(Arc::new(store.clone())),
            signed_in_state("u"),
            notifier.clone(),
        )
    }

    #[tokio::test]
    async fn test_create_derives_amounts_and_stores_id() {
        let store = MemoryStore::new();
        let notifier = SyncNotifier::new();
        let mut changes = notifier.subscribe(&[SyncEvent::ExpensesChanged]);
        let service = service(&store, &notifier);

        let expense = service
            .create(request("Rent", ExpenseFrequency::Monthly, Some(1200.0)))
            .await
            .unwrap();
        assert_eq!(expense.net_amount_yearly, 14400.0);
        assert_eq!(expense.net_amount_monthly, 1200.0);

        let raw = store.get(Collection::Expenses, &expense.expense_id).await.unwrap();
        assert_eq!(raw.data["expenseId"], json!(expense.expense_id));
        assert_eq!(raw.data["netAmountYearly"], json!(14400.0));
        assert_eq!(changes.drain(), 1);
    }

    #[tokio::test]
    async fn test_update_recomputes_derived_amounts() {
        let store = MemoryStore::new();
        let notifier = SyncNotifier::new();
        let service = service(&store, &notifier);
        let created = service
            .create(request("Insurance", ExpenseFrequency::Monthly, Some(100.0)))
            .await
            .unwrap();

        let mut changes = notifier.subscribe(&[SyncEvent::ExpensesChanged]);
        service
            .update(&created.expense_id, request("Insurance", ExpenseFrequency::Yearly, Some(1200.0)))
            .await
            .unwrap();

        let listed = service.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].net_amount_yearly, 1200.0);
        assert_eq!(listed[0].net_amount_monthly, 100.0);
        assert_eq!(changes.drain(), 1);

        service
            .update(&created.expense_id, request("Insurance", ExpenseFrequency::Weekly, Some(1200.0)))
            .await
            .unwrap();
        let listed = service.list().await.unwrap();
        assert_eq!(listed[0].net_amount_yearly, 0.0);
        assert_eq!(listed[0].net_amount_monthly, 0.0);
    }

    #[tokio::test]
    async fn test_invalid_form_writes_nothing_and_does_not_notify() {
        let store = MemoryStore::new();
        let notifier = SyncNotifier::new();
        let mut changes = notifier.subscribe(&SyncEvent::ALL);
        let service = service(&store, &notifier);

        assert!(service.create(request("Gym", ExpenseFrequency::Monthly, None)).await.is_err());
        assert!(service.create(request("Gym", ExpenseFrequency::Monthly, Some(-1.0))).await.is_err());
        assert!(service.create(request("  ", ExpenseFrequency::Monthly, Some(1.0))).await.is_err());
        assert_eq!(store.len(Collection::Expenses).await, 0);
        assert_eq!(changes.drain(), 0);
    }

    #[tokio::test]
    async fn test_delete_notifies() {
        let store = MemoryStore::new();
        let notifier = SyncNotifier::new();
        let service = service(&store, &notifier);
        let created = service
            .create(request("Phone", ExpenseFrequency::Monthly, Some(30.0)))
            .await
            .unwrap();

        let mut changes = notifier.subscribe(&[SyncEvent::ExpensesChanged]);
        service.delete(&created.expense_id).await.unwrap();
        assert_eq!(changes.drain(), 1);
        assert!(service.list().await.unwrap().is_empty());
    }

    /// Memory store that refuses every update
    struct NoUpdates(MemoryStore);

    #[async_trait]
    impl DocumentStore for NoUpdates {
        async fn list(&self, c: Collection) -> Result<Vec<Document>> {
            self.0.list(c).await
        }
        async fn create(&self, c: Collection, data: Map<String, Value>) -> Result<String> {
            self.0.create(c, data).await
        }
        async fn update(&self, _c: Collection, _id: &str, _data: Map<String, Value>) -> Result<()> {
            anyhow::bail!("store unavailable")
        }
        async fn delete(&self, c: Collection, id: &str) -> Result<()> {
            self.0.delete(c, id).await
        }
    }

    #[tokio::test]
    async fn test_failed_id_write_removes_created_document() {
        let store = MemoryStore::new();
        let notifier = SyncNotifier::new();
        let mut changes = notifier.subscribe(&SyncEvent::ALL);
        let service = ExpenseService::new(
            Repository::new(Arc::new(NoUpdates(store.clone()))),
            signed_in_state("u"),
            notifier.clone(),
        );

        let result = service.create(request("Rent", ExpenseFrequency::Monthly, Some(900.0))).await;
        assert!(result.is_err());
        assert_eq!(store.len(Collection::Expenses).await, 0);
        assert_eq!(changes.drain(), 0);
    }

    #[tokio::test]
    async fn test_other_users_expense_cannot_be_changed() {
        let store = MemoryStore::new();
        let notifier = SyncNotifier::new();
        let owner = service(&store, &notifier);
        let created = owner
            .create(request("Rent", ExpenseFrequency::Monthly, Some(900.0)))
            .await
            .unwrap();

        let intruder = ExpenseService::new(
            Repository::new(Arc::new(store.clone())),
            signed_in_state("v"),
            notifier.clone(),
        );
        let mut changes = notifier.subscribe(&SyncEvent::ALL);
        let takeover = intruder
            .update(&created.expense_id, request("Mine now", ExpenseFrequency::Monthly, Some(1.0)))
            .await
            .unwrap_err();
        assert!(matches!(
            takeover.downcast_ref::<StoreError>(),
            Some(StoreError::NotFound { .. })
        ));
        assert!(intruder.delete(&created.expense_id).await.is_err());
        assert_eq!(changes.drain(), 0);

        let listed = owner.list().await.unwrap();
        assert_eq!(listed, vec![created]);
    }

    #[tokio::test]
    async fn test_table_totals() {
        let store = MemoryStore::new();
        let notifier = SyncNotifier::new();
        let service = service(&store, &notifier);
        service.create(request("Rent", ExpenseFrequency::Monthly, Some(1000.0))).await.unwrap();
        service.create(request("Tax", ExpenseFrequency::Yearly, Some(100.0))).await.unwrap();

        let table = service.table().await.unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].due_label, "5th of every month");
        assert_eq!(table.rows[1].due_label, "5th of every year");
        assert_eq!(table.totals.amount, 1100.0);
        assert_eq!(table.totals.net_amount_yearly, 12100.0);
        assert_eq!(table.totals.net_amount_monthly, 1008.33);
    }

    #[test]
    fn test_due_date_labels() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        assert_eq!(describe(d(1), ExpenseFrequency::Monthly), "1st of every month");
        assert_eq!(describe(d(2), ExpenseFrequency::Monthly), "2nd of every month");
        assert_eq!(describe(d(11), ExpenseFrequency::Yearly), "11th of every year");
        assert_eq!(describe(d(22), ExpenseFrequency::Monthly), "22nd of every month");
        assert_eq!(describe(d(23), ExpenseFrequency::Monthly), "23rd of every month");
        assert_eq!(describe(d(31), ExpenseFrequency::OneTime), "2024-01-31");
    }
}
