//! Credit allowances: the provider seam, whitelist diffing and the best-effort
//! batches that grant and revoke allowances address by address.

use crate::error::AppError;
use crate::pool::{Pool, PoolPassword};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;

/// Credits are divided into 10^12 winc.
pub const WINC_PER_CREDIT: f64 = 1e12;

/// Pool-scoped authorization shared by every call in a batch.
#[derive(Debug, Clone, Copy)]
pub struct CreditContext<'a> {
    pub pool_id: &'a str,
    pub creator_address: &'a str,
    pub password: &'a PoolPassword,
}

/// One allowance to grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditGrant {
    pub address: String,
    pub approved_winc: u128,
    pub expires_by_seconds: i64,
}

/// Grants and revokes spending allowances against a pool's funding wallet.
pub trait CreditsProvider {
    fn grant(
        &self,
        ctx: &CreditContext<'_>,
        grant: &CreditGrant,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn revoke(
        &self,
        ctx: &CreditContext<'_>,
        address: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Allowance size and expiry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CreditTerms {
    pub usage_cap: f64,
    pub end_time: DateTime<Utc>,
}

impl CreditTerms {
    pub fn of(pool: &Pool) -> Self {
        Self {
            usage_cap: pool.usage_cap,
            end_time: pool.end_time,
        }
    }

    pub fn approved_winc(&self) -> u128 {
        (self.usage_cap * WINC_PER_CREDIT).round() as u128
    }

    /// Build a grant for `address`, or fail if the allowance would already be
    /// expired at `now`.
    pub fn grant_for(&self, address: &str, now: DateTime<Utc>) -> Result<CreditGrant, AppError> {
        let expires_by_seconds = (self.end_time - now).num_seconds();
        if expires_by_seconds <= 0 {
            return Err(AppError::Validation(
                "Pool has ended, cannot sponsor credits.".into(),
            ));
        }
        Ok(CreditGrant {
            address: address.to_string(),
            approved_winc: self.approved_winc(),
            expires_by_seconds,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchAction {
    Sponsored,
    Revoked,
    Refreshed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressFailure {
    pub address: String,
    pub error: String,
}

/// Tally of a per-address batch. Individual failures never abort the batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub action: BatchAction,
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<AddressFailure>,
}

impl BatchReport {
    pub fn new(action: BatchAction) -> Self {
        Self {
            action,
            attempted: 0,
            succeeded: 0,
            failures: Vec::new(),
        }
    }

    fn record(&mut self, address: &str, result: Result<(), AppError>) {
        self.attempted += 1;
        match result {
            Ok(()) => self.succeeded += 1,
            Err(e) => {
                tracing::warn!("{:?} failed for {address}: {e}", self.action);
                self.failures.push(AddressFailure {
                    address: address.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (s, a) = (self.succeeded, self.attempted);
        match self.action {
            BatchAction::Sponsored => write!(f, "Sponsored credits to {s} of {a} addresses!"),
            BatchAction::Revoked => write!(f, "Revoked credits from {s} of {a} addresses!"),
            BatchAction::Refreshed => write!(f, "Refreshed credits for {s} of {a} addresses!"),
        }
    }
}

/// Grant `terms` to every address, one call at a time.
pub async fn sponsor_all<P: CreditsProvider>(
    provider: &P,
    ctx: &CreditContext<'_>,
    addresses: &[String],
    terms: &CreditTerms,
    now: DateTime<Utc>,
) -> BatchReport {
    let mut report = BatchReport::new(BatchAction::Sponsored);
    for address in addresses {
        let result = match terms.grant_for(address, now) {
            Ok(grant) => provider.grant(ctx, &grant).await,
            Err(e) => Err(e),
        };
        report.record(address, result);
    }
    report
}

/// Revoke every address, one call at a time.
pub async fn revoke_all<P: CreditsProvider>(
    provider: &P,
    ctx: &CreditContext<'_>,
    addresses: &[String],
) -> BatchReport {
    let mut report = BatchReport::new(BatchAction::Revoked);
    for address in addresses {
        let result = provider.revoke(ctx, address).await;
        report.record(address, result);
    }
    report
}

/// How a whitelist edit splits the addresses. Each set keeps list order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WhitelistDiff {
    pub removed: Vec<String>,
    pub added: Vec<String>,
    pub unchanged: Vec<String>,
}

impl WhitelistDiff {
    pub fn compute(old: &[String], new: &[String]) -> Self {
        let old_set: HashSet<&str> = old.iter().map(String::as_str).collect();
        let new_set: HashSet<&str> = new.iter().map(String::as_str).collect();
        Self {
            removed: old
                .iter()
                .filter(|a| !new_set.contains(a.as_str()))
                .cloned()
                .collect(),
            added: new
                .iter()
                .filter(|a| !old_set.contains(a.as_str()))
                .cloned()
                .collect(),
            unchanged: new
                .iter()
                .filter(|a| old_set.contains(a.as_str()))
                .cloned()
                .collect(),
        }
    }
}

/// Outcome of the three reconciliation phases.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub revoked: BatchReport,
    pub sponsored: BatchReport,
    pub refreshed: BatchReport,
}

impl ReconcileReport {
    pub fn failure_count(&self) -> usize {
        self.revoked.failures.len() + self.sponsored.failures.len() + self.refreshed.failures.len()
    }

    pub fn is_noop(&self) -> bool {
        self.revoked.attempted == 0 && self.sponsored.attempted == 0 && self.refreshed.attempted == 0
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.revoked, self.sponsored)?;
        if self.refreshed.attempted > 0 {
            write!(f, " {}", self.refreshed)?;
        }
        Ok(())
    }
}

/// Bring allowances in line with an edited whitelist: revoke removed addresses,
/// grant added ones, and re-grant unchanged ones when the terms moved. An
/// allowance cannot be resized in place, so a refresh is revoke then grant.
pub async fn reconcile<P: CreditsProvider>(
    provider: &P,
    ctx: &CreditContext<'_>,
    diff: &WhitelistDiff,
    old_terms: &CreditTerms,
    new_terms: &CreditTerms,
    now: DateTime<Utc>,
) -> ReconcileReport {
    let revoked = revoke_all(provider, ctx, &diff.removed).await;
    let sponsored = sponsor_all(provider, ctx, &diff.added, new_terms, now).await;

    let mut refreshed = BatchReport::new(BatchAction::Refreshed);
    if old_terms != new_terms {
        for address in &diff.unchanged {
            let result = match new_terms.grant_for(address, now) {
                Ok(grant) => match provider.revoke(ctx, address).await {
                    Ok(()) => provider.grant(ctx, &grant).await,
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            refreshed.record(address, result);
        }
    }

    tracing::info!(
        "Reconciled pool {}: {} {} {}",
        ctx.pool_id,
        revoked,
        sponsored,
        refreshed
    );
    ReconcileReport {
        revoked,
        sponsored,
        refreshed,
    }
}
