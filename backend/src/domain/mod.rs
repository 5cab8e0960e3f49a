//! # Domain Module
//!
//! Business logic for the planner: finance records, recurring expenses,
//! savings, and the todo list with its calendar sync.
//!
//! ## Module Organization
//!
//! - **aggregation**: Totals, expense normalization, grouping, and rounding
//! - **sync_notifier**: Typed fan-out of "data changed" events between screens
//! - **auth_service**: The process-wide signed-in identity
//! - **validation**: Form checks that block a submission
//! - **calendar_sync**: Todo to calendar event translation and best-effort sync
//! - **finance_service**: Finance entries, batch delete, and the summary view
//! - **expense_service**: The expense table and its derived amounts
//! - **savings_service**: Savings with per-type groups and status messages
//! - **todo_service**: Todos and their calendar side effects
//!
//! ## Business Rules
//!
//! - Every record belongs to one user; all filtering by `userId` happens here
//!   after a full fetch from the store
//! - Amounts entered on forms are never negative
//! - Persist completes before any change notification fires
//! - Calendar failures never fail the local write they follow

pub mod aggregation;
pub mod auth_service;
pub mod calendar_sync;
pub mod expense_service;
pub mod finance_service;
pub mod savings_service;
pub mod sync_notifier;
pub mod todo_service;
pub mod validation;

pub use auth_service::{AuthService, AuthState, AuthStatus, SessionTokens};
pub use calendar_sync::CalendarSyncService;
pub use expense_service::ExpenseService;
pub use finance_service::{FinanceOverview, FinanceService};
pub use savings_service::SavingsService;
pub use sync_notifier::{SyncEvent, SyncNotifier, Subscription};
pub use todo_service::TodoService;
pub use validation::ValidationError;
