//! # Finance Service
//!
//! Income, expense and saving entries of the `finances` collection, plus the
//! summary screen that combines them with the expense table and the savings
//! list.
//!
//! ## Key Responsibilities
//!
//! - **CRUD**: creating entries with a client-generated correlation id,
//!   updating and deleting them by document id
//! - **Batch delete**: one independent request per selected entry
//! - **Summary**: per-kind totals, normalized expense totals and savings totals
//! - **Freshness**: `FinanceOverview` reloads the summary whenever the expense
//!   or savings screens report a change

use anyhow::{anyhow, Result};
use futures::future::join_all;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::aggregation::{round_to, sum_by, total_by_type, DEFAULT_DECIMALS};
use crate::domain::auth_service::AuthState;
use crate::domain::sync_notifier::{SyncEvent, SyncNotifier};
use crate::domain::validation::require_non_negative;
use crate::storage::{Collection, Repository, StoreError};
use shared::{
    Expense, ExpenseRecord, FinanceEntry, FinanceKind, FinanceRecord, FinanceSummary, IncomeRecord,
    SaveFinanceRequest, Saving, SavingRecord,
};

#[derive(Clone)]
pub struct FinanceService {
    finances: Repository<FinanceRecord>,
    expenses: Repository<Expense>,
    savings: Repository<Saving>,
    auth: AuthState,
}

impl FinanceService {
    pub fn new(
        finances: Repository<FinanceRecord>,
        expenses: Repository<Expense>,
        savings: Repository<Saving>,
        auth: AuthState,
    ) -> Self {
        Self {
            finances,
            expenses,
            savings,
            auth,
        }
    }

    /// Entries of the signed-in user
    pub async fn list(&self) -> Result<Vec<FinanceRecord>> {
        let user = self.auth.require_user()?;
        self.finances.list_for_user(&user.uid).await
    }

    pub async fn add(&self, request: SaveFinanceRequest) -> Result<FinanceRecord> {
        info!("Adding {} entry", request.kind);
        let user = self.auth.require_user()?;
        let correlation_id = Uuid::new_v4().to_string();
        let mut record = build_record(request, &user.uid, String::new(), correlation_id)?;

        let id = self.finances.create(&record).await?;
        record.entry_mut().id = id;
        info!("Created {} entry {}", record.kind(), record.id());
        Ok(record)
    }

    /// Replace an entry. The correlation id is kept unless the kind changes.
    pub async fn update(&self, id: &str, request: SaveFinanceRequest) -> Result<FinanceRecord> {
        info!("Updating finance entry {}", id);
        let user = self.auth.require_user()?;
        let existing = self.get(id).await?;

        let correlation_id = if existing.kind() == request.kind {
            existing.correlation_id().to_string()
        } else {
            Uuid::new_v4().to_string()
        };
        let record = build_record(request, &user.uid, id.to_string(), correlation_id)?;
        self.finances.update(id, &record).await?;
        Ok(record)
    }

    /// Look up one entry of the signed-in user
    pub async fn get(&self, id: &str) -> Result<FinanceRecord> {
        let user = self.auth.require_user()?;
        self.finances.get_for_user(&user.uid, id).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        info!("Deleting finance entry {}", id);
        self.get(id).await?;
        self.finances.delete(id).await
    }

    /// Delete several entries with one request each, all in flight together.
    ///
    /// Every id must belong to the signed-in user; otherwise nothing is
    /// deleted. Every request is then issued and awaited. If any fails, the
    /// first failure is returned; deletions that succeeded stay applied.
    pub async fn delete_records(&self, ids: &[String]) -> Result<usize> {
        info!("Deleting {} finance entries", ids.len());
        let owned = self.list().await?;
        if let Some(foreign) = ids.iter().find(|id| !owned.iter().any(|r| r.id() == id.as_str())) {
            warn!("Refusing batch delete: {} is not an entry of the signed-in user", foreign);
            return Err(anyhow!(StoreError::NotFound {
                collection: Collection::Finances,
                id: foreign.clone(),
            }));
        }

        let results = join_all(ids.iter().map(|id| self.finances.delete(id))).await;

        let mut deleted = 0;
        let mut first_error = None;
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(()) => deleted += 1,
                Err(e) => {
                    error!("Failed to delete finance entry {}: {}", id, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => {
                warn!("Batch delete partially applied: {} of {} deleted", deleted, ids.len());
                Err(e)
            }
            None => Ok(deleted),
        }
    }

    /// Totals for the summary screen
    pub async fn summary(&self) -> Result<FinanceSummary> {
        let user = self.auth.require_user()?;
        let (finances, expenses, savings) =
            tokio::try_join!(self.finances.list(), self.expenses.list(), self.savings.list())?;

        let expenses: Vec<Expense> = expenses.into_iter().filter(|e| e.user_id == user.uid).collect();
        let savings: Vec<Saving> = savings.into_iter().filter(|s| s.user_id == user.uid).collect();

        Ok(FinanceSummary {
            income_total: total_by_type(&finances, FinanceKind::Income, &user.uid),
            expense_total: total_by_type(&finances, FinanceKind::Expense, &user.uid),
            saving_total: total_by_type(&finances, FinanceKind::Saving, &user.uid),
            expenses_yearly: round_to(sum_by(&expenses, |e| e.net_amount_yearly), DEFAULT_DECIMALS),
            expenses_monthly: round_to(sum_by(&expenses, |e| e.net_amount_monthly), DEFAULT_DECIMALS),
            savings_current_value: sum_by(&savings, |s| s.current_value),
            savings_maturity_amount: sum_by(&savings, |s| s.maturity_amount),
        })
    }
}

fn build_record(
    request: SaveFinanceRequest,
    user_id: &str,
    id: String,
    correlation_id: String,
) -> Result<FinanceRecord> {
    let amount = require_non_negative("amount", Some(request.amount))?;
    let entry = FinanceEntry {
        id,
        user_id: user_id.to_string(),
        amount,
        date: request.date,
        name: request.name,
        remarks: request.remarks,
    };

    Ok(match request.kind {
        FinanceKind::Income => FinanceRecord::Income(IncomeRecord {
            income_id: correlation_id,
            entry,
        }),
        FinanceKind::Expense => FinanceRecord::Expense(ExpenseRecord {
            expense_id: correlation_id,
            entry,
            category: request.category,
            payment_method: request.payment_method,
        }),
        FinanceKind::Saving => FinanceRecord::Saving(SavingRecord {
            saving_id: correlation_id,
            entry,
            goal: request.goal,
            source: request.source,
            savings_type: request.savings_type,
            maturity_date: request.maturity_date,
            maturity_amount: request.maturity_amount,
            current_value: request.current_value,
        }),
    })
}

/// The summary screen's view model.
///
/// The first load waits for the identity provider to resolve; afterwards every
/// expense or savings notification triggers a reload.
#[derive(Clone)]
pub struct FinanceOverview {
    service: FinanceService,
    auth: AuthState,
    notifier: SyncNotifier,
    cached: Arc<RwLock<SummaryCache>>,
}

/// The last summary, keyed by user. Every store and every invalidation bumps
/// `generation`; a load that started under an older generation is discarded.
#[derive(Default)]
struct SummaryCache {
    generation: u64,
    entry: Option<(String, FinanceSummary)>,
}

impl FinanceOverview {
    pub fn new(service: FinanceService, auth: AuthState, notifier: SyncNotifier) -> Self {
        Self {
            service,
            auth,
            notifier,
            cached: Arc::new(RwLock::new(SummaryCache::default())),
        }
    }

    pub async fn refresh(&self) -> Result<FinanceSummary> {
        let user = self.auth.require_user()?;
        let started = self.cached.read().await.generation;
        let summary = self.service.summary().await?;

        let mut cache = self.cached.write().await;
        if cache.generation == started {
            cache.generation += 1;
            cache.entry = Some((user.uid, summary.clone()));
        } else {
            debug!("Discarding finance summary loaded before generation {}", cache.generation);
        }
        Ok(summary)
    }

    /// The cached summary for the signed-in user, loading it if needed
    pub async fn current(&self) -> Result<FinanceSummary> {
        let user = self.auth.require_user()?;
        if let Some((uid, summary)) = self.cached.read().await.entry.as_ref() {
            if *uid == user.uid {
                return Ok(summary.clone());
            }
        }
        self.refresh().await
    }

    /// Start the background task that keeps the cache fresh
    pub fn spawn_refresh_loop(&self) -> JoinHandle<()> {
        // Subscribe before waiting so no change is missed in between
        let mut changes = self.notifier.subscribe(&SyncEvent::ALL);
        let overview = self.clone();

        tokio::spawn(async move {
            if overview.auth.wait_until_resolved().await.is_some() {
                if let Err(e) = overview.refresh().await {
                    warn!("Initial finance summary load failed: {}", e);
                }
            }
            while let Some(event) = changes.next().await {
                info!("Reloading finance summary after {:?}", event);
                if let Err(e) = overview.refresh().await {
                    warn!("Finance summary reload failed: {}", e);
                }
            }
        })
    }

    pub async fn cached(&self) -> Option<FinanceSummary> {
        self.cached.read().await.entry.as_ref().map(|(_, s)| s.clone())
    }

    /// Drop the cached summary so the next `current` reloads it
    pub async fn invalidate(&self) {
        let mut cache = self.cached.write().await;
        cache.generation += 1;
        cache.entry = None;
    }
}
