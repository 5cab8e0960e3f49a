//! # Shared Data Model
//!
//! Records and request/response types shared between the backend services, the
//! REST layer and any browser client. Field names on the wire are camelCase so
//! that documents read from the hosted document store deserialize directly into
//! these types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Signed-in identity as reported by the identity provider. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Provider-assigned user id; every record's `userId` refers to this
    pub uid: String,
    pub email: Option<String>,
}

// ---------------------------------------------------------------------------
// Finance records
// ---------------------------------------------------------------------------

/// Discriminator stored in the `type` field of a finance document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinanceKind {
    Income,
    Expense,
    Saving,
}

impl FinanceKind {
    /// Numeric code used by stored documents (1=income, 2=expense, 3=saving)
    pub fn code(self) -> u8 {
        match self {
            FinanceKind::Income => 1,
            FinanceKind::Expense => 2,
            FinanceKind::Saving => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(FinanceKind::Income),
            2 => Some(FinanceKind::Expense),
            3 => Some(FinanceKind::Saving),
            _ => None,
        }
    }

    /// Name of the type-specific correlation id field
    pub fn id_field(self) -> &'static str {
        match self {
            FinanceKind::Income => "incomeId",
            FinanceKind::Expense => "expenseId",
            FinanceKind::Saving => "savingId",
        }
    }
}

impl fmt::Display for FinanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinanceKind::Income => write!(f, "income"),
            FinanceKind::Expense => write!(f, "expense"),
            FinanceKind::Saving => write!(f, "saving"),
        }
    }
}

/// Fields every finance record carries regardless of its kind
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FinanceEntry {
    /// Document id assigned by the store (empty until persisted)
    pub id: String,
    pub user_id: String,
    pub amount: f64,
    pub date: Option<NaiveDate>,
    pub name: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncomeRecord {
    pub income_id: String,
    pub entry: FinanceEntry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseRecord {
    pub expense_id: String,
    pub entry: FinanceEntry,
    pub category: Option<String>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavingRecord {
    pub saving_id: String,
    pub entry: FinanceEntry,
    pub goal: Option<String>,
    pub source: Option<String>,
    pub savings_type: Option<String>,
    pub maturity_date: Option<NaiveDate>,
    pub maturity_amount: Option<f64>,
    pub current_value: Option<f64>,
}

/// A document of the `finances` collection.
///
/// Stored documents are flat with a numeric `type` and exactly one of
/// `incomeId`/`expenseId`/`savingId`; this enum is the checked form of that
/// document. Deserialization fails when the populated id field does not match
/// `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FinanceDocument", into = "FinanceDocument")]
pub enum FinanceRecord {
    Income(IncomeRecord),
    Expense(ExpenseRecord),
    Saving(SavingRecord),
}

impl FinanceRecord {
    pub fn kind(&self) -> FinanceKind {
        match self {
            FinanceRecord::Income(_) => FinanceKind::Income,
            FinanceRecord::Expense(_) => FinanceKind::Expense,
            FinanceRecord::Saving(_) => FinanceKind::Saving,
        }
    }

    pub fn entry(&self) -> &FinanceEntry {
        match self {
            FinanceRecord::Income(r) => &r.entry,
            FinanceRecord::Expense(r) => &r.entry,
            FinanceRecord::Saving(r) => &r.entry,
        }
    }

    pub fn entry_mut(&mut self) -> &mut FinanceEntry {
        match self {
            FinanceRecord::Income(r) => &mut r.entry,
            FinanceRecord::Expense(r) => &mut r.entry,
            FinanceRecord::Saving(r) => &mut r.entry,
        }
    }

    /// The type-specific correlation id (incomeId, expenseId or savingId)
    pub fn correlation_id(&self) -> &str {
        match self {
            FinanceRecord::Income(r) => &r.income_id,
            FinanceRecord::Expense(r) => &r.expense_id,
            FinanceRecord::Saving(r) => &r.saving_id,
        }
    }

    pub fn id(&self) -> &str {
        &self.entry().id
    }

    pub fn user_id(&self) -> &str {
        &self.entry().user_id
    }

    pub fn amount(&self) -> f64 {
        self.entry().amount
    }
}

/// Error raised when a stored finance document violates the id/type invariant
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("unknown finance type {0}")]
    UnknownType(u8),
    #[error("{kind} record is missing {field}")]
    MissingId { kind: FinanceKind, field: &'static str },
    #[error("{kind} record must not carry {field}")]
    ForeignId { kind: FinanceKind, field: &'static str },
}

/// Flat wire form of a finance document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinanceDocument {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    amount: f64,
    #[serde(default, deserialize_with = "lenient_date")]
    date: Option<NaiveDate>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    remarks: Option<String>,
    #[serde(default, deserialize_with = "non_empty_string")]
    income_id: Option<String>,
    #[serde(default, deserialize_with = "non_empty_string")]
    expense_id: Option<String>,
    #[serde(default, deserialize_with = "non_empty_string")]
    saving_id: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    payment_method: Option<String>,
    #[serde(default)]
    goal: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    savings_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_date")]
    maturity_date: Option<NaiveDate>,
    #[serde(default)]
    maturity_amount: Option<f64>,
    #[serde(default)]
    current_value: Option<f64>,
}

impl TryFrom<FinanceDocument> for FinanceRecord {
    type Error = RecordError;

    fn try_from(doc: FinanceDocument) -> Result<Self, Self::Error> {
        let kind = FinanceKind::from_code(doc.kind).ok_or(RecordError::UnknownType(doc.kind))?;

        let ids = [
            (FinanceKind::Income, &doc.income_id),
            (FinanceKind::Expense, &doc.expense_id),
            (FinanceKind::Saving, &doc.saving_id),
        ];
        for (other, value) in ids.iter() {
            if *other != kind && value.is_some() {
                return Err(RecordError::ForeignId { kind, field: other.id_field() });
            }
        }

        let entry = FinanceEntry {
            id: doc.id,
            user_id: doc.user_id,
            amount: doc.amount,
            date: doc.date,
            name: doc.name,
            remarks: doc.remarks,
        };
        let missing = RecordError::MissingId { kind, field: kind.id_field() };

        Ok(match kind {
            FinanceKind::Income => FinanceRecord::Income(IncomeRecord {
                income_id: doc.income_id.ok_or(missing)?,
                entry,
            }),
            FinanceKind::Expense => FinanceRecord::Expense(ExpenseRecord {
                expense_id: doc.expense_id.ok_or(missing)?,
                entry,
                category: doc.category,
                payment_method: doc.payment_method,
            }),
            FinanceKind::Saving => FinanceRecord::Saving(SavingRecord {
                saving_id: doc.saving_id.ok_or(missing)?,
                entry,
                goal: doc.goal,
                source: doc.source,
                savings_type: doc.savings_type,
                maturity_date: doc.maturity_date,
                maturity_amount: doc.maturity_amount,
                current_value: doc.current_value,
            }),
        })
    }
}

impl From<FinanceRecord> for FinanceDocument {
    fn from(record: FinanceRecord) -> Self {
        let kind = record.kind().code();
        match record {
            FinanceRecord::Income(r) => FinanceDocument {
                kind,
                income_id: Some(r.income_id),
                ..FinanceDocument::from_entry(r.entry)
            },
            FinanceRecord::Expense(r) => FinanceDocument {
                kind,
                expense_id: Some(r.expense_id),
                category: r.category,
                payment_method: r.payment_method,
                ..FinanceDocument::from_entry(r.entry)
            },
            FinanceRecord::Saving(r) => FinanceDocument {
                kind,
                saving_id: Some(r.saving_id),
                goal: r.goal,
                source: r.source,
                savings_type: r.savings_type,
                maturity_date: r.maturity_date,
                maturity_amount: r.maturity_amount,
                current_value: r.current_value,
                ..FinanceDocument::from_entry(r.entry)
            },
        }
    }
}

impl FinanceDocument {
    fn from_entry(entry: FinanceEntry) -> Self {
        FinanceDocument {
            id: entry.id,
            user_id: entry.user_id,
            amount: entry.amount,
            date: entry.date,
            name: entry.name,
            remarks: entry.remarks,
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Expenses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpenseFrequency {
    Monthly,
    Yearly,
    Weekly,
    OneTime,
}

/// Yearly and monthly view of an expense amount
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedAmount {
    pub yearly: f64,
    pub monthly: f64,
}

/// A document of the `expenses` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    /// Equal to the store document id once the expense has been created
    #[serde(default)]
    pub expense_id: String,
    pub expense_name: String,
    pub frequency: ExpenseFrequency,
    #[serde(default, deserialize_with = "lenient_date")]
    pub due_date: Option<NaiveDate>,
    pub amount: f64,
    /// Derived from amount and frequency; recomputed on every write
    #[serde(default)]
    pub net_amount_yearly: f64,
    /// Derived from amount and frequency; recomputed on every write
    #[serde(default)]
    pub net_amount_monthly: f64,
    #[serde(default)]
    pub user_id: String,
}

// ---------------------------------------------------------------------------
// Savings
// ---------------------------------------------------------------------------

/// A document of the `savings` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Saving {
    /// Store document id (not written into the document body)
    #[serde(default)]
    pub saving_id: String,
    pub name: String,
    pub savings_type: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, deserialize_with = "lenient_date")]
    pub maturity_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub current_value: f64,
    #[serde(default)]
    pub maturity_amount: f64,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Todos
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskFrequency {
    #[serde(rename = "one time")]
    OneTime,
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "weekly")]
    Weekly,
    #[serde(rename = "monthly")]
    Monthly,
}

impl TaskFrequency {
    pub fn is_recurring(self) -> bool {
        !matches!(self, TaskFrequency::OneTime)
    }
}

/// A document of the `todos` collection
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, deserialize_with = "lenient_date")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub frequency: Option<TaskFrequency>,
    #[serde(default)]
    pub add_to_calendar: Option<bool>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub repeat_until: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub occurrences: Option<u32>,
    /// Id of the remote calendar event, set only after a successful sync
    #[serde(default, deserialize_with = "non_empty_string")]
    pub calendar_event_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl TodoItem {
    pub fn wants_calendar(&self) -> bool {
        self.add_to_calendar.unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Current authentication state as seen by a client route guard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    /// False while the identity provider has not yet reported a state
    pub resolved: bool,
    pub user: Option<User>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveFinanceRequest {
    pub kind: FinanceKind,
    pub amount: f64,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub savings_type: Option<String>,
    #[serde(default)]
    pub maturity_date: Option<NaiveDate>,
    #[serde(default)]
    pub maturity_amount: Option<f64>,
    #[serde(default)]
    pub current_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFinancesRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFinancesResponse {
    pub deleted_count: usize,
}

/// Totals shown on the finance summary screen
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinanceSummary {
    pub income_total: f64,
    pub expense_total: f64,
    pub saving_total: f64,
    pub expenses_yearly: f64,
    pub expenses_monthly: f64,
    pub savings_current_value: f64,
    pub savings_maturity_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveExpenseRequest {
    pub expense_name: String,
    pub frequency: ExpenseFrequency,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub amount: Option<f64>,
}

/// Column sums of the expense table
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseTotals {
    pub amount: f64,
    pub net_amount_yearly: f64,
    pub net_amount_monthly: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRow {
    pub expense: Expense,
    /// "5th of every month", "5th of every year" or the plain date
    pub due_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseTableResponse {
    pub rows: Vec<ExpenseRow>,
    pub totals: ExpenseTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSavingRequest {
    pub name: String,
    pub savings_type: String,
    #[serde(default)]
    pub maturity_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub current_value: Option<f64>,
    pub maturity_amount: Option<f64>,
    #[serde(default)]
    pub amount: Option<f64>,
}

/// Outcome of a savings form submission, always carrying a status message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingStatusResponse {
    pub success: bool,
    pub message: String,
    pub saving: Option<Saving>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsGroupResponse {
    pub savings_type: String,
    pub expanded: bool,
    pub savings: Vec<Saving>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleGroupRequest {
    pub savings_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTodoRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub frequency: Option<TaskFrequency>,
    #[serde(default)]
    pub add_to_calendar: bool,
    #[serde(default)]
    pub repeat_until: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub occurrences: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoListResponse {
    pub todos: Vec<TodoItem>,
}

/// JSON error body returned by every failing endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// Accepts `YYYY-MM-DD`, an RFC 3339 timestamp, an empty string or null
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let raw = match raw.as_deref().map(str::trim) {
        None | Some("") => return Ok(None),
        Some(s) => s,
    };
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Some(date));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| Some(dt.date_naive()))
        .map_err(|_| serde::de::Error::custom(format!("invalid date '{}'", raw)))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CountValue {
    Whole(u64),
    Fractional(f64),
    Text(String),
}

/// Accepts a whole number, a whole-valued double, a numeric string, an empty
/// string or null. Form fields left blank are stored as `""`.
fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let invalid = |raw: &dyn fmt::Display| -> D::Error { serde::de::Error::custom(format!("invalid count '{}'", raw)) };
    match Option::<CountValue>::deserialize(deserializer)? {
        None => Ok(None),
        Some(CountValue::Whole(n)) => u32::try_from(n).map(Some).map_err(|_| invalid(&n)),
        Some(CountValue::Fractional(f)) => {
            if f.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&f) {
                Ok(Some(f as u32))
            } else {
                Err(invalid(&f))
            }
        }
        Some(CountValue::Text(s)) => match s.trim() {
            "" => Ok(None),
            t => t.parse::<u32>().map(Some).map_err(|_| invalid(&t)),
        },
    }
}

fn non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()))
}
