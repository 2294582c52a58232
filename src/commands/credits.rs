use super::{cached_or_fetch, refresh_after_change, require_password, Prompter};
use crate::address::is_valid_address;
use crate::credits::{self, BatchReport, CreditContext, CreditTerms, CreditsProvider};
use crate::error::AppError;
use crate::pool::{Pool, PoolStatus, PoolUpdate};
use crate::pool_api::PoolBackend;
use crate::state::AppState;
use chrono::Utc;

/// Grant the pool's allowance to every whitelisted address.
pub async fn credits_sponsor<B: PoolBackend + CreditsProvider>(
    pool_id: &str,
    prompter: &dyn Prompter,
    state: &AppState<B>,
) -> Result<BatchReport, AppError> {
    let creator = state.session.require_wallet()?;
    let pool = cached_or_fetch(pool_id, &creator, state).await?;
    if pool.status() == PoolStatus::Ended {
        return Err(AppError::Validation(
            "Pool has ended, cannot sponsor credits.".into(),
        ));
    }
    let password = require_password(
        prompter,
        "Enter the pool password to sponsor credits:",
        "Password required to sponsor credits.",
    )?;
    let _guard = state.session.begin(format!("sponsor:{pool_id}"))?;

    let ctx = CreditContext {
        pool_id,
        creator_address: &creator,
        password: &password,
    };
    let report = credits::sponsor_all(
        &state.backend,
        &ctx,
        &pool.whitelist,
        &CreditTerms::of(&pool),
        Utc::now(),
    )
    .await;
    tracing::info!("{report}");

    refresh_after_change(state).await;
    Ok(report)
}

/// Revoke the allowance of every whitelisted address.
pub async fn credits_revoke_all<B: PoolBackend + CreditsProvider>(
    pool_id: &str,
    prompter: &dyn Prompter,
    state: &AppState<B>,
) -> Result<BatchReport, AppError> {
    let creator = state.session.require_wallet()?;
    let pool = cached_or_fetch(pool_id, &creator, state).await?;
    let password = require_password(
        prompter,
        "Enter the pool password to revoke credits:",
        "Password required to revoke credits.",
    )?;
    let _guard = state.session.begin(format!("revoke:{pool_id}"))?;

    let ctx = CreditContext {
        pool_id,
        creator_address: &creator,
        password: &password,
    };
    let report = credits::revoke_all(&state.backend, &ctx, &pool.whitelist).await;
    tracing::info!("{report}");

    refresh_after_change(state).await;
    Ok(report)
}

fn check_address(address: &str) -> Result<String, AppError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(AppError::Validation("Please enter an address.".into()));
    }
    if !is_valid_address(address) {
        return Err(AppError::Validation(
            "Please enter a valid wallet address.".into(),
        ));
    }
    Ok(address.to_string())
}

/// Share the selected pool's allowance with a single address.
pub async fn credits_share<B: PoolBackend + CreditsProvider>(
    address: &str,
    prompter: &dyn Prompter,
    state: &AppState<B>,
) -> Result<(), AppError> {
    let address = check_address(address)?;
    let pool_id = state.session.require_current_pool()?;
    let creator = state.session.require_wallet()?;
    let password = require_password(
        prompter,
        "Enter the pool password to share credits:",
        "Password required to share credits.",
    )?;
    let _guard = state.session.begin(format!("share:{pool_id}"))?;
    let pool = cached_or_fetch(&pool_id, &creator, state).await?;
    let grant = CreditTerms::of(&pool).grant_for(&address, Utc::now())?;

    let ctx = CreditContext {
        pool_id: &pool_id,
        creator_address: &creator,
        password: &password,
    };
    state.backend.grant(&ctx, &grant).await?;
    tracing::info!("Credits shared with {address} from pool {pool_id}");

    refresh_after_change(state).await;
    Ok(())
}

/// Revoke one address and drop it from the selected pool's whitelist.
pub async fn credits_revoke_access<B: PoolBackend + CreditsProvider>(
    address: &str,
    prompter: &dyn Prompter,
    state: &AppState<B>,
) -> Result<Pool, AppError> {
    let address = check_address(address)?;
    let pool_id = state.session.require_current_pool()?;
    let creator = state.session.require_wallet()?;
    let password = require_password(
        prompter,
        "Enter the pool password to revoke access:",
        "Password required to revoke access.",
    )?;
    let _guard = state.session.begin(format!("revoke-access:{pool_id}"))?;

    let ctx = CreditContext {
        pool_id: &pool_id,
        creator_address: &creator,
        password: &password,
    };
    state.backend.revoke(&ctx, &address).await?;

    // re-read so the whitelist patch is based on the server's current list
    let pools = state.backend.list_pools(&creator).await?;
    let pool = pools
        .get(&pool_id)
        .cloned()
        .ok_or_else(|| AppError::NotFound("Pool data not found after revoking access.".into()))?;

    let update = PoolUpdate {
        whitelist: Some(
            pool.whitelist
                .iter()
                .filter(|a| **a != address)
                .cloned()
                .collect(),
        ),
        ..Default::default()
    };
    state
        .backend
        .edit_pool(&pool_id, &creator, &password, &update)
        .await?;

    let next = update.apply_to(&pool);
    state.session.upsert_pool(&pool_id, next.clone());
    tracing::info!("Access revoked for {address}; removed from pool {pool_id} whitelist");
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::tests::addr;
    use crate::commands::test_support::*;

    fn list(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|t| addr(t)).collect()
    }

    #[tokio::test]
    async fn sponsor_reports_partial_success() {
        let backend = FakeBackend {
            failing_addresses: list(&["B", "D"]).into_iter().collect(),
            ..FakeBackend::with_pool("p1", active_pool(list(&["A", "B", "C", "D", "E"])))
        };
        let state = connected_state(backend);

        let report = credits_sponsor("p1", &ScriptedPrompter::accepting(), &state)
            .await
            .unwrap();

        assert_eq!(report.to_string(), "Sponsored credits to 3 of 5 addresses!");
        let grants = state
            .backend
            .calls()
            .iter()
            .filter(|c| c.starts_with("grant"))
            .count();
        assert_eq!(grants, 5);
    }

    #[tokio::test]
    async fn sponsor_refuses_ended_pool() {
        let mut pool = active_pool(list(&["A"]));
        pool.end_time = Utc::now() - chrono::Duration::hours(1);
        let state = connected_state(FakeBackend::with_pool("p1", pool));

        let err = credits_sponsor("p1", &ScriptedPrompter::accepting(), &state)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Pool has ended, cannot sponsor credits.");
        assert!(!state.backend.calls().iter().any(|c| c.starts_with("grant")));
    }

    #[tokio::test]
    async fn revoke_all_tallies() {
        let state = connected_state(FakeBackend::with_pool("p1", active_pool(list(&["A", "B"]))));
        let report = credits_revoke_all("p1", &ScriptedPrompter::accepting(), &state)
            .await
            .unwrap();
        assert_eq!(report.to_string(), "Revoked credits from 2 of 2 addresses!");
    }

    #[tokio::test]
    async fn share_needs_selected_pool_and_valid_address() {
        let state = connected_state(FakeBackend::with_pool("p1", active_pool(vec![])));
        let prompter = ScriptedPrompter::accepting();

        let err = credits_share("bogus", &prompter, &state).await.unwrap_err();
        assert_eq!(err.to_string(), "Please enter a valid wallet address.");

        let err = credits_share(&addr("Z"), &prompter, &state).await.unwrap_err();
        assert!(matches!(err, AppError::Precondition(_)));
        assert!(state.backend.calls().is_empty());

        state.session.set_current_pool_id(Some("p1".into()));
        credits_share(&addr("Z"), &prompter, &state).await.unwrap();
        assert!(state
            .backend
            .calls()
            .contains(&format!("grant {} 2000000000000", addr("Z"))));
    }

    #[tokio::test]
    async fn share_in_progress_refuses_second_trigger() {
        let state = connected_state(FakeBackend::with_pool("p1", active_pool(vec![])));
        state.session.set_current_pool_id(Some("p1".into()));
        let _running = state.session.begin("share:p1").unwrap();

        let err = credits_share(&addr("Z"), &ScriptedPrompter::accepting(), &state)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Precondition(_)));
        assert!(state.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn revoke_access_removes_address_from_whitelist() {
        let state = connected_state(FakeBackend::with_pool("p1", active_pool(list(&["A", "B"]))));
        state.session.set_current_pool_id(Some("p1".into()));

        let pool = credits_revoke_access(&addr("A"), &ScriptedPrompter::accepting(), &state)
            .await
            .unwrap();

        assert_eq!(pool.whitelist, list(&["B"]));
        assert_eq!(
            state.backend.edits.lock().unwrap()[0],
            serde_json::json!({ "whitelist": [addr("B")] })
        );
        assert_eq!(state.session.pool("p1").unwrap().whitelist, list(&["B"]));
    }

    #[tokio::test]
    async fn revoke_access_stops_when_revoke_fails() {
        let state = connected_state(FakeBackend::with_pool("p1", active_pool(list(&["A"]))));
        state.session.set_current_pool_id(Some("p1".into()));

        let err = credits_revoke_access(
            &addr("A"),
            &ScriptedPrompter::with_password(Some("wrong")),
            &state,
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Invalid password (INVALID_PASSWORD)");
        assert!(state.backend.edits.lock().unwrap().is_empty());
    }
}
