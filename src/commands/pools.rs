use super::{cached_or_fetch, refresh_after_change, require_password, Prompter};
use crate::credits::{self, CreditContext, CreditTerms, CreditsProvider, ReconcileReport, WhitelistDiff};
use crate::error::AppError;
use crate::forms::{CreatePoolForm, EditPoolForm};
use crate::pool::{AvailablePoolCard, PoolCard, PoolDetails, PoolOverview, PoolStatus};
use crate::pool_api::PoolBackend;
use crate::state::AppState;
use chrono::Utc;
use serde::Serialize;

// ==========================================
// Listing and details
// ==========================================

/// Load every pool owned by the connected wallet and rebuild the session cache.
pub async fn pool_list<B: PoolBackend>(state: &AppState<B>) -> Result<PoolOverview, AppError> {
    let Some(creator) = state.session.wallet_address() else {
        state.session.clear_pools();
        return Err(AppError::Precondition(
            "No wallet connected. Please connect your wallet to view or manage pools.".into(),
        ));
    };

    let pools = state.backend.list_pools(&creator).await?;
    state.session.replace_pools(pools.clone());

    let now = Utc::now();
    let mut cards = Vec::with_capacity(pools.len());
    for (id, pool) in pools {
        let balance = balance_or_zero(state, &id, &creator).await;
        let status = pool.status_at(now);
        cards.push(PoolCard {
            id,
            pool,
            balance,
            status,
        });
    }

    let active = cards.iter().filter(|c| c.status == PoolStatus::Active).count();
    tracing::info!("Loaded {} pools ({active} active)", cards.len());
    Ok(PoolOverview {
        total: cards.len(),
        active,
        pools: cards,
    })
}

/// Select a pool and fetch fresh data for it.
pub async fn pool_details<B: PoolBackend>(
    pool_id: &str,
    state: &AppState<B>,
) -> Result<PoolDetails, AppError> {
    let creator = state.session.require_wallet()?;

    let pools = state.backend.list_pools(&creator).await?;
    let pool = pools
        .get(pool_id)
        .cloned()
        .ok_or_else(|| AppError::NotFound("Pool data not found.".into()))?;
    state.session.replace_pools(pools);
    state.session.set_current_pool_id(Some(pool_id.to_string()));

    let balance = balance_or_zero(state, pool_id, &creator).await;
    Ok(PoolDetails {
        id: pool_id.to_string(),
        status: pool.status(),
        total_usage: pool.total_usage(),
        balance,
        pool,
    })
}

/// Balance is display-only; a failed lookup shows as zero.
async fn balance_or_zero<B: PoolBackend>(state: &AppState<B>, pool_id: &str, creator: &str) -> f64 {
    match state.backend.pool_balance(pool_id, creator).await {
        Ok(balance) => balance,
        Err(e) => {
            tracing::warn!("Balance unavailable for pool {pool_id}: {e}");
            0.0
        }
    }
}

/// Pools the connected wallet may join. Joining itself is done elsewhere;
/// this only lists them.
pub async fn pool_available<B: PoolBackend>(
    state: &AppState<B>,
) -> Result<Vec<AvailablePoolCard>, AppError> {
    let wallet = state.session.require_wallet()?;
    let pools = state.backend.available_pools(&wallet).await?;
    tracing::info!("{} pools available to this wallet", pools.len());
    Ok(pools
        .into_iter()
        .map(|(id, pool)| AvailablePoolCard { id, pool })
        .collect())
}

// ==========================================
// Create / edit / delete
// ==========================================

pub async fn pool_create<B: PoolBackend>(
    form: &CreatePoolForm,
    state: &AppState<B>,
) -> Result<serde_json::Value, AppError> {
    let creator = state.session.require_wallet()?;
    let request = form.validate(&creator)?;
    let _guard = state.session.begin("create-pool")?;

    let created = state.backend.create_pool(&request).await?;
    tracing::info!(
        "Created pool '{}' with {} whitelisted addresses",
        request.name,
        request.whitelist.len()
    );
    refresh_after_change(state).await;
    Ok(created)
}

#[derive(Debug, Clone, Serialize)]
pub struct EditOutcome {
    pub pool: serde_json::Value,
    pub reconciliation: ReconcileReport,
}

/// Patch a pool, then bring credit allowances in line with the new whitelist
/// and terms. Allowances are only touched once the server accepted the patch.
pub async fn pool_edit<B: PoolBackend + CreditsProvider>(
    pool_id: &str,
    form: &EditPoolForm,
    state: &AppState<B>,
) -> Result<EditOutcome, AppError> {
    let creator = state.session.require_wallet()?;
    let (password, update) = form.validate()?;
    let _guard = state.session.begin(format!("edit:{pool_id}"))?;

    let previous = cached_or_fetch(pool_id, &creator, state).await?;
    let updated = state
        .backend
        .edit_pool(pool_id, &creator, &password, &update)
        .await?;
    tracing::info!("Updated pool {pool_id}");

    let next = update.apply_to(&previous);
    state.session.upsert_pool(pool_id, next.clone());

    let ctx = CreditContext {
        pool_id,
        creator_address: &creator,
        password: &password,
    };
    let diff = WhitelistDiff::compute(&previous.whitelist, &next.whitelist);
    let reconciliation = credits::reconcile(
        &state.backend,
        &ctx,
        &diff,
        &CreditTerms::of(&previous),
        &CreditTerms::of(&next),
        Utc::now(),
    )
    .await;

    refresh_after_change(state).await;
    if state.session.current_pool_id().as_deref() == Some(pool_id) {
        if let Err(e) = pool_details(pool_id, state).await {
            tracing::warn!("Error reloading pool details: {e}");
        }
    }

    Ok(EditOutcome {
        pool: updated,
        reconciliation,
    })
}

/// Delete a pool. Nothing is sent unless the user confirms first.
pub async fn pool_delete<B: PoolBackend>(
    pool_id: &str,
    prompter: &dyn Prompter,
    state: &AppState<B>,
) -> Result<(), AppError> {
    let creator = state.session.require_wallet()?;
    if !prompter.confirm("Are you sure you want to delete this pool? This action cannot be undone.") {
        return Err(AppError::Cancelled(format!("pool {pool_id} was not deleted")));
    }
    let password = require_password(
        prompter,
        "Enter the pool password to confirm deletion:",
        "Password required to delete pool.",
    )?;
    let _guard = state.session.begin(format!("delete:{pool_id}"))?;

    state
        .backend
        .delete_pool(pool_id, &creator, &password)
        .await?;
    tracing::info!("Deleted pool {pool_id}");

    if state.session.current_pool_id().as_deref() == Some(pool_id) {
        state.session.set_current_pool_id(None);
    }
    refresh_after_change(state).await;
    Ok(())
}
