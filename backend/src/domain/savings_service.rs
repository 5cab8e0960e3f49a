//! # Savings Service
//!
//! Savings accounts grouped by `savingsType` into collapsible sections.
//!
//! ## Key Responsibilities
//! - Create and update savings from the form, stamping `lastUpdated`
//! - Report every save and delete as a user-visible status message
//! - Group savings by type and track which single group is expanded
//! - Tell the finance summary to reload after each persisted change

use anyhow::Result;
use chrono::Utc;
use log::{error, info};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::aggregation::{group_by, GroupExpansion};
use crate::domain::auth_service::AuthState;
use crate::domain::sync_notifier::SyncNotifier;
use crate::domain::validation::{require_non_negative, require_text, ValidationError};
use crate::storage::{Repository, StoreError};
use shared::{SaveSavingRequest, Saving, SavingStatusResponse, SavingsGroupResponse};

pub const SAVING_ADDED: &str = "Saving added successfully!";
pub const SAVING_UPDATED: &str = "Saving updated successfully!";
pub const SAVING_ADD_FAILED: &str = "Error adding saving.";
pub const SAVING_UPDATE_FAILED: &str = "Error updating saving.";
pub const SAVING_DELETED: &str = "Saving deleted.";
pub const SAVING_DELETE_FAILED: &str = "Error deleting saving.";

#[derive(Clone)]
pub struct SavingsService {
    savings: Repository<Saving>,
    auth: AuthState,
    notifier: SyncNotifier,
    expansion: Arc<RwLock<GroupExpansion>>,
}

impl SavingsService {
    pub fn new(savings: Repository<Saving>, auth: AuthState, notifier: SyncNotifier) -> Self {
        Self {
            savings,
            auth,
            notifier,
            expansion: Arc::new(RwLock::new(GroupExpansion::default())),
        }
    }

    pub async fn list(&self) -> Result<Vec<Saving>> {
        let user = self.auth.require_user()?;
        self.savings.list_for_user(&user.uid).await
    }

    /// Create a saving, or update `editing_id` when one is given.
    ///
    /// An invalid form is an error and nothing is written. A failed write is
    /// not: it comes back as an unsuccessful status carrying the message to
    /// show the user.
    pub async fn save(&self, editing_id: Option<&str>, request: SaveSavingRequest) -> Result<SavingStatusResponse> {
        let user = self.auth.require_user()?;
        let mut saving = build_saving(request, &user.uid)?;

        let outcome = match editing_id {
            Some(id) => {
                info!("Updating saving {}", id);
                match self.owned(&user.uid, id).await? {
                    Ok(()) => {
                        saving.saving_id = id.to_string();
                        self.savings.update(id, &saving).await.map(|_| SAVING_UPDATED)
                    }
                    Err(e) => Err(e),
                }
            }
            None => {
                info!("Adding saving {:?}", saving.name);
                match self.savings.create(&saving).await {
                    Ok(id) => {
                        saving.saving_id = id;
                        Ok(SAVING_ADDED)
                    }
                    Err(e) => Err(e),
                }
            }
        };

        match outcome {
            Ok(message) => {
                self.notifier.notify_savings_changed();
                Ok(SavingStatusResponse {
                    success: true,
                    message: message.to_string(),
                    saving: Some(saving),
                })
            }
            Err(e) => {
                error!("Failed to save saving: {:#}", e);
                let message = if editing_id.is_some() {
                    SAVING_UPDATE_FAILED
                } else {
                    SAVING_ADD_FAILED
                };
                Ok(SavingStatusResponse {
                    success: false,
                    message: message.to_string(),
                    saving: None,
                })
            }
        }
    }

    pub async fn delete(&self, saving_id: &str) -> Result<SavingStatusResponse> {
        info!("Deleting saving {}", saving_id);
        let user = self.auth.require_user()?;
        let deleted = match self.owned(&user.uid, saving_id).await? {
            Ok(()) => self.savings.delete(saving_id).await,
            Err(e) => Err(e),
        };
        match deleted {
            Ok(()) => {
                self.notifier.notify_savings_changed();
                Ok(SavingStatusResponse {
                    success: true,
                    message: SAVING_DELETED.to_string(),
                    saving: None,
                })
            }
            Err(e) => {
                error!("Failed to delete saving {}: {:#}", saving_id, e);
                Ok(SavingStatusResponse {
                    success: false,
                    message: SAVING_DELETE_FAILED.to_string(),
                    saving: None,
                })
            }
        }
    }

    /// Ownership check before a write. A saving of another user (or none at
    /// all) is the outer error; a failed lookup is the inner one, reported to
    /// the user like a failed write.
    async fn owned(&self, user_id: &str, saving_id: &str) -> Result<Result<()>> {
        match self.savings.get_for_user(user_id, saving_id).await {
            Ok(_) => Ok(Ok(())),
            Err(e) if StoreError::is_not_found(&e) => Err(e),
            Err(e) => Ok(Err(e)),
        }
    }

    /// The user's savings grouped by type in first-seen order
    pub async fn groups(&self) -> Result<Vec<SavingsGroupResponse>> {
        let savings = self.list().await?;
        let expansion = self.expansion.read().await;
        Ok(group_by(savings, |s: &Saving| s.savings_type.clone())
            .into_iter()
            .map(|group| SavingsGroupResponse {
                expanded: expansion.is_expanded(&group.key),
                savings_type: group.key,
                savings: group.items,
            })
            .collect())
    }

    /// Open one group and collapse the rest, or collapse it if already open.
    /// Returns the expanded group afterwards.
    pub async fn toggle_group(&self, savings_type: &str) -> Option<String> {
        let mut expansion = self.expansion.write().await;
        expansion.toggle(savings_type);
        expansion.expanded().map(str::to_string)
    }
}

fn build_saving(request: SaveSavingRequest, user_id: &str) -> Result<Saving, ValidationError> {
    require_text("name", &request.name)?;
    require_text("savingsType", &request.savings_type)?;
    let maturity_date = request.maturity_date.ok_or(ValidationError::Required("maturityDate"))?;
    let current_value = require_non_negative("currentValue", request.current_value)?;
    let maturity_amount = require_non_negative("maturityAmount", request.maturity_amount)?;

    Ok(Saving {
        saving_id: String::new(),
        name: request.name.trim().to_string(),
        savings_type: request.savings_type.trim().to_string(),
        user_id: user_id.to_string(),
        maturity_date: Some(maturity_date),
        due_date: request.due_date,
        current_value,
        maturity_amount,
        amount: request.amount.unwrap_or_default(),
        last_updated: Some(Utc::now()),
    })
}
