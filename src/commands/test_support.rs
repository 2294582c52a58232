//! In-memory Pool API used by command tests. Every call is recorded so tests
//! can assert both on outcomes and on which requests went out.

use super::Prompter;
use crate::config::{Config, ConfigFile};
use crate::credits::{CreditContext, CreditGrant, CreditsProvider};
use crate::error::AppError;
use crate::pool::{AvailablePool, CreatePoolRequest, Pool, PoolPassword, PoolUpdate};
use crate::pool_api::PoolBackend;
use crate::state::AppState;
use chrono::{Duration, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

pub const PASSWORD: &str = "correct horse";

#[derive(Default)]
pub struct FakeBackend {
    pub pools: Mutex<BTreeMap<String, Pool>>,
    pub calls: Mutex<Vec<String>>,
    pub failing_addresses: HashSet<String>,
    pub edits: Mutex<Vec<serde_json::Value>>,
    pub balance: f64,
}

impl FakeBackend {
    pub fn with_pool(id: &str, pool: Pool) -> Self {
        let backend = Self::default();
        backend.pools.lock().unwrap().insert(id.to_string(), pool);
        backend
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_password(&self, password: &PoolPassword) -> Result<(), AppError> {
        if password.expose() == PASSWORD {
            Ok(())
        } else {
            Err(AppError::Api {
                message: "Invalid password".into(),
                code: Some("INVALID_PASSWORD".into()),
                status: 401,
            })
        }
    }
}

impl PoolBackend for FakeBackend {
    async fn list_pools(&self, _creator: &str) -> Result<BTreeMap<String, Pool>, AppError> {
        self.log("list".into());
        Ok(self.pools.lock().unwrap().clone())
    }

    async fn pool_balance(&self, pool_id: &str, _creator: &str) -> Result<f64, AppError> {
        self.log(format!("balance {pool_id}"));
        Ok(self.balance)
    }

    async fn create_pool(&self, request: &CreatePoolRequest) -> Result<serde_json::Value, AppError> {
        self.log(format!("create {}", request.name));
        let pool = Pool {
            name: request.name.clone(),
            creator_address: request.creator_address.clone(),
            start_time: request.start_time,
            end_time: request.end_time,
            usage_cap: request.usage_cap,
            whitelist: request.whitelist.clone(),
            sponsor_info: request.sponsor_info.clone(),
            usage: BTreeMap::new(),
        };
        let id = format!("pool-{}", self.pools.lock().unwrap().len() + 1);
        self.pools.lock().unwrap().insert(id.clone(), pool);
        Ok(serde_json::json!({ "id": id }))
    }

    async fn edit_pool(
        &self,
        pool_id: &str,
        _creator: &str,
        password: &PoolPassword,
        update: &PoolUpdate,
    ) -> Result<serde_json::Value, AppError> {
        self.log(format!("edit {pool_id}"));
        self.check_password(password)?;
        self.edits
            .lock()
            .unwrap()
            .push(serde_json::to_value(update)?);
        let mut pools = self.pools.lock().unwrap();
        let pool = pools
            .get(pool_id)
            .ok_or_else(|| AppError::NotFound(pool_id.to_string()))?;
        let next = update.apply_to(pool);
        pools.insert(pool_id.to_string(), next.clone());
        Ok(serde_json::to_value(next)?)
    }

    async fn delete_pool(
        &self,
        pool_id: &str,
        _creator: &str,
        password: &PoolPassword,
    ) -> Result<(), AppError> {
        self.log(format!("delete {pool_id}"));
        self.check_password(password)?;
        self.pools.lock().unwrap().remove(pool_id);
        Ok(())
    }

    async fn native_balance(
        &self,
        pool_id: &str,
        _creator: &str,
        password: &PoolPassword,
    ) -> Result<f64, AppError> {
        self.log(format!("ar-balance {pool_id}"));
        self.check_password(password)?;
        Ok(self.balance)
    }

    async fn top_up(
        &self,
        pool_id: &str,
        _creator: &str,
        password: &PoolPassword,
        amount: f64,
    ) -> Result<String, AppError> {
        self.log(format!("topup {pool_id} {amount}"));
        self.check_password(password)?;
        Ok("tx-123".into())
    }

    async fn pool_wallet(
        &self,
        pool_id: &str,
        _creator: &str,
        password: &PoolPassword,
    ) -> Result<serde_json::Value, AppError> {
        self.log(format!("wallet {pool_id}"));
        self.check_password(password)?;
        Ok(serde_json::json!({ "kty": "RSA", "n": "modulus" }))
    }

    async fn available_pools(
        &self,
        wallet_address: &str,
    ) -> Result<BTreeMap<String, AvailablePool>, AppError> {
        self.log(format!("available {wallet_address}"));
        Ok(self
            .pools
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, pool)| pool.whitelist.iter().any(|a| a == wallet_address))
            .map(|(id, pool)| {
                let listed = AvailablePool {
                    name: pool.name.clone(),
                    sponsor_info: pool.sponsor_info.clone(),
                    end_time: Some(pool.end_time),
                };
                (id.clone(), listed)
            })
            .collect())
    }

    async fn support_link(&self) -> Result<Option<String>, AppError> {
        self.log("support-link".into());
        Ok(Some("https://support.example.com".into()))
    }
}

impl CreditsProvider for FakeBackend {
    async fn grant(&self, ctx: &CreditContext<'_>, grant: &CreditGrant) -> Result<(), AppError> {
        self.log(format!("grant {} {}", grant.address, grant.approved_winc));
        self.check_password(ctx.password)?;
        if self.failing_addresses.contains(&grant.address) {
            return Err(AppError::Api {
                message: "Failed to share credits".into(),
                code: None,
                status: 500,
            });
        }
        Ok(())
    }

    async fn revoke(&self, ctx: &CreditContext<'_>, address: &str) -> Result<(), AppError> {
        self.log(format!("revoke {address}"));
        self.check_password(ctx.password)?;
        if self.failing_addresses.contains(address) {
            return Err(AppError::Api {
                message: "Failed to revoke credits".into(),
                code: None,
                status: 500,
            });
        }
        Ok(())
    }
}

/// Answers prompts from a script and counts how often it was asked.
pub struct ScriptedPrompter {
    pub answer: bool,
    pub password: Option<String>,
    pub asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn accepting() -> Self {
        Self {
            answer: true,
            password: Some(PASSWORD.into()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn declining() -> Self {
        Self {
            answer: false,
            ..Self::accepting()
        }
    }

    pub fn with_password(password: Option<&str>) -> Self {
        Self {
            password: password.map(str::to_string),
            ..Self::accepting()
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, question: &str) -> bool {
        self.asked.lock().unwrap().push(question.to_string());
        self.answer
    }

    fn password(&self, prompt: &str) -> Option<String> {
        self.asked.lock().unwrap().push(prompt.to_string());
        self.password.clone()
    }
}

pub fn active_pool(whitelist: Vec<String>) -> Pool {
    let now = Utc::now();
    Pool {
        name: "Hackathon".into(),
        creator_address: crate::address::tests::addr("CREATOR"),
        start_time: now - Duration::days(1),
        end_time: now + Duration::days(30),
        usage_cap: 2.0,
        whitelist,
        sponsor_info: String::new(),
        usage: BTreeMap::new(),
    }
}

/// App state with a connected wallet and a server URL.
pub fn connected_state(backend: FakeBackend) -> AppState<FakeBackend> {
    let config = Config::resolve(ConfigFile {
        server_url: Some("http://localhost:3000".into()),
        ..Default::default()
    })
    .unwrap();
    let state = AppState::new(config, backend);
    state
        .session
        .connect(&crate::wallet::StaticWallet::new(crate::address::tests::addr(
            "CREATOR",
        )))
        .unwrap();
    state
}
