use crate::config::Config;
use crate::error::AppError;
use crate::pool::Pool;
use crate::wallet::WalletProvider;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

/// Session-scoped context: connected wallet, selected pool and the read-through
/// pool cache. The cache is rebuilt on every reload and never authoritative.
#[derive(Default)]
pub struct Session {
    wallet_address: Mutex<Option<String>>,
    current_pool_id: Mutex<Option<String>>,
    pools: Mutex<BTreeMap<String, Pool>>,
    in_flight: Mutex<HashSet<String>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, provider: &dyn WalletProvider) -> Result<String, AppError> {
        let address = provider.active_address()?;
        tracing::info!("Connected {} wallet {}", provider.name(), short_address(&address));
        *self.wallet_address.lock().unwrap() = Some(address.clone());
        Ok(address)
    }

    /// Forget the wallet along with everything loaded on its behalf.
    pub fn disconnect(&self) {
        *self.wallet_address.lock().unwrap() = None;
        self.clear_pools();
    }

    pub fn wallet_address(&self) -> Option<String> {
        self.wallet_address.lock().unwrap().clone()
    }

    pub fn require_wallet(&self) -> Result<String, AppError> {
        self.wallet_address()
            .ok_or_else(|| AppError::Precondition("Please connect your wallet first.".into()))
    }

    pub fn current_pool_id(&self) -> Option<String> {
        self.current_pool_id.lock().unwrap().clone()
    }

    pub fn set_current_pool_id(&self, pool_id: Option<String>) {
        *self.current_pool_id.lock().unwrap() = pool_id;
    }

    pub fn require_current_pool(&self) -> Result<String, AppError> {
        self.current_pool_id().ok_or_else(|| {
            AppError::Precondition("No pool selected. Please view pool details first.".into())
        })
    }

    pub fn pool(&self, pool_id: &str) -> Option<Pool> {
        self.pools.lock().unwrap().get(pool_id).cloned()
    }

    pub fn replace_pools(&self, pools: BTreeMap<String, Pool>) {
        *self.pools.lock().unwrap() = pools;
    }

    pub fn upsert_pool(&self, pool_id: &str, pool: Pool) {
        self.pools.lock().unwrap().insert(pool_id.to_string(), pool);
    }

    pub fn pool_ids(&self) -> Vec<String> {
        self.pools.lock().unwrap().keys().cloned().collect()
    }

    pub fn clear_pools(&self) {
        self.pools.lock().unwrap().clear();
        self.set_current_pool_id(None);
    }

    /// Mark `key` as running. A second trigger while the first is still in
    /// flight is refused instead of interleaving with it.
    pub fn begin(&self, key: impl Into<String>) -> Result<OperationGuard<'_>, AppError> {
        let key = key.into();
        let mut in_flight = self.in_flight.lock().unwrap();
        if !in_flight.insert(key.clone()) {
            return Err(AppError::Precondition(format!(
                "'{key}' is already in progress"
            )));
        }
        Ok(OperationGuard { session: self, key })
    }
}

/// Releases its operation key on drop.
pub struct OperationGuard<'a> {
    session: &'a Session,
    key: String,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.session.in_flight.lock().unwrap().remove(&self.key);
    }
}

/// Everything a command needs: configuration, the backend and the session.
pub struct AppState<B> {
    pub config: Config,
    pub backend: B,
    pub session: Session,
}

impl<B> AppState<B> {
    pub fn new(config: Config, backend: B) -> Self {
        Self {
            config,
            backend,
            session: Session::new(),
        }
    }
}

pub fn short_address(address: &str) -> String {
    if address.len() <= 16 {
        return address.to_string();
    }
    format!("{}...{}", &address[..8], &address[address.len() - 8..])
}
