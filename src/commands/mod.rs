pub mod credits;
pub mod funds;
pub mod pools;

#[cfg(test)]
pub(crate) mod test_support;

use crate::error::AppError;
use crate::pool::{Pool, PoolPassword};
use crate::pool_api::PoolBackend;
use crate::state::AppState;

/// Blocking user decisions: yes/no confirmations and password entry.
pub trait Prompter {
    fn confirm(&self, question: &str) -> bool;
    fn password(&self, prompt: &str) -> Option<String>;
}

/// Ask for the pool password, failing with `missing` when none is given.
pub(crate) fn require_password(
    prompter: &dyn Prompter,
    prompt: &str,
    missing: &str,
) -> Result<PoolPassword, AppError> {
    prompter
        .password(prompt)
        .and_then(PoolPassword::new)
        .ok_or_else(|| AppError::Validation(missing.to_string()))
}

/// Pool from the session cache, reloading the list once on a miss.
pub(crate) async fn cached_or_fetch<B: PoolBackend>(
    pool_id: &str,
    creator_address: &str,
    state: &AppState<B>,
) -> Result<Pool, AppError> {
    if let Some(pool) = state.session.pool(pool_id) {
        return Ok(pool);
    }
    let pools = state.backend.list_pools(creator_address).await?;
    state.session.replace_pools(pools);
    state
        .session
        .pool(pool_id)
        .ok_or_else(|| AppError::NotFound("Pool data not found.".into()))
}

/// Reload the pool list after a mutation. A failed reload does not undo the
/// mutation that preceded it, so it is only logged.
pub(crate) async fn refresh_after_change<B: PoolBackend>(state: &AppState<B>) {
    if let Err(e) = pools::pool_list(state).await {
        tracing::warn!("Error loading pools: {e}");
    }
}
