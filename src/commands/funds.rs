use super::{require_password, Prompter};
use crate::error::AppError;
use crate::pool::PoolPassword;
use crate::pool_api::PoolBackend;
use crate::state::AppState;
use crate::topup::{estimate_credits, TopUpAmount};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpReceipt {
    pub transaction_id: String,
    pub amount: f64,
    pub estimated_credits: f64,
}

/// How much to send: a fixed amount, or the pool wallet's whole balance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TopUpSource {
    Amount(TopUpAmount),
    Max,
}

// ==========================================
// Top-up
// ==========================================

/// The pool wallet's whole native balance, for "use max".
pub async fn topup_max_amount<B: PoolBackend>(
    pool_id: &str,
    password: &PoolPassword,
    state: &AppState<B>,
) -> Result<f64, AppError> {
    let creator = state.session.require_wallet()?;
    let _guard = state.session.begin(format!("balance:{pool_id}"))?;
    state
        .backend
        .native_balance(pool_id, &creator, password)
        .await
}

/// Fund the pool wallet. The password is asked for once, also covering the
/// balance lookup for `TopUpSource::Max`. The estimate is informational; the
/// server decides how many credits the amount buys.
pub async fn pool_top_up<B: PoolBackend>(
    pool_id: &str,
    source: TopUpSource,
    prompter: &dyn Prompter,
    state: &AppState<B>,
) -> Result<TopUpReceipt, AppError> {
    let creator = state.session.require_wallet()?;
    let password = require_password(
        prompter,
        "Enter the pool password to top up:",
        "Password and amount are required.",
    )?;
    let _guard = state.session.begin(format!("topup:{pool_id}"))?;

    let amount = match source {
        TopUpSource::Amount(amount) => amount,
        TopUpSource::Max => TopUpAmount::new(topup_max_amount(pool_id, &password, state).await?)?,
    };
    let transaction_id = state
        .backend
        .top_up(pool_id, &creator, &password, amount.value())
        .await?;
    tracing::info!("Pool {pool_id} topped up, transaction {transaction_id}");

    Ok(TopUpReceipt {
        transaction_id,
        amount: amount.value(),
        estimated_credits: estimate_credits(amount.value(), state.config.fee_rate),
    })
}

// ==========================================
// Pool wallet and support
// ==========================================

/// `pool-{id}-wallet.json` in the working directory. Characters outside
/// `[A-Za-z0-9_-]` in the id become `_`.
pub fn default_wallet_path(pool_id: &str) -> PathBuf {
    let safe: String = pool_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    PathBuf::from(format!("pool-{safe}-wallet.json"))
}

/// Save the pool wallet keyfile. An existing file is never overwritten.
pub async fn wallet_download<B: PoolBackend>(
    pool_id: &str,
    dest: Option<&Path>,
    prompter: &dyn Prompter,
    state: &AppState<B>,
) -> Result<PathBuf, AppError> {
    let creator = state.session.require_wallet()?;
    let password = require_password(
        prompter,
        "Enter the pool password to download wallet:",
        "Password required to download wallet.",
    )?;
    let _guard = state.session.begin(format!("download:{pool_id}"))?;

    let wallet = state
        .backend
        .pool_wallet(pool_id, &creator, &password)
        .await?;

    let path = dest
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_wallet_path(pool_id));
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)?;
    file.write_all(serde_json::to_string_pretty(&wallet)?.as_bytes())?;
    tracing::info!("Wallet for pool {pool_id} written to {}", path.display());
    Ok(path)
}

pub async fn support_link<B: PoolBackend>(state: &AppState<B>) -> Result<String, AppError> {
    state
        .backend
        .support_link()
        .await?
        .ok_or_else(|| AppError::NotFound("No support link configured.".into()))
}
