use crate::config::Config;
use crate::credits::{CreditContext, CreditGrant, CreditsProvider};
use crate::error::AppError;
use crate::pool::{AvailablePool, CreatePoolRequest, Pool, PoolPassword, PoolUpdate};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

const API_KEY_HEADER: &str = "X-API-Key";

/// Remote store of pool records, balances and pool wallets.
pub trait PoolBackend {
    fn list_pools(
        &self,
        creator_address: &str,
    ) -> impl Future<Output = Result<BTreeMap<String, Pool>, AppError>> + Send;

    fn pool_balance(
        &self,
        pool_id: &str,
        creator_address: &str,
    ) -> impl Future<Output = Result<f64, AppError>> + Send;

    fn create_pool(
        &self,
        request: &CreatePoolRequest,
    ) -> impl Future<Output = Result<serde_json::Value, AppError>> + Send;

    fn edit_pool(
        &self,
        pool_id: &str,
        creator_address: &str,
        password: &PoolPassword,
        update: &PoolUpdate,
    ) -> impl Future<Output = Result<serde_json::Value, AppError>> + Send;

    fn delete_pool(
        &self,
        pool_id: &str,
        creator_address: &str,
        password: &PoolPassword,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn native_balance(
        &self,
        pool_id: &str,
        creator_address: &str,
        password: &PoolPassword,
    ) -> impl Future<Output = Result<f64, AppError>> + Send;

    fn top_up(
        &self,
        pool_id: &str,
        creator_address: &str,
        password: &PoolPassword,
        amount: f64,
    ) -> impl Future<Output = Result<String, AppError>> + Send;

    fn pool_wallet(
        &self,
        pool_id: &str,
        creator_address: &str,
        password: &PoolPassword,
    ) -> impl Future<Output = Result<serde_json::Value, AppError>> + Send;

    /// Pools the given wallet is eligible to join, keyed by id.
    fn available_pools(
        &self,
        wallet_address: &str,
    ) -> impl Future<Output = Result<BTreeMap<String, AvailablePool>, AppError>> + Send;

    fn support_link(&self) -> impl Future<Output = Result<Option<String>, AppError>> + Send;
}

/// REST client for the Pool API
pub struct PoolApiClient {
    base_url: String,
    api_key: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BalanceEnvelope {
    #[serde(default)]
    balance: Option<BalanceInner>,
}

#[derive(Debug, Default, Deserialize)]
struct BalanceInner {
    #[serde(default)]
    balance: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct NativeBalance {
    balance: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopUpResult {
    transaction_id: String,
}

#[derive(Debug, Deserialize)]
struct WalletResult {
    wallet: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SupportLink {
    #[serde(default)]
    link: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShareCreditsBody<'a> {
    event_pool_id: &'a str,
    wallet_address: &'a str,
    password: &'a str,
    approved_winc_amount: String,
    expires_by_seconds: i64,
}

impl PoolApiClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Option<Duration>) -> Self {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().unwrap_or_else(|_| Client::new());

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let base_url = config.require_server_url()?;
        Ok(Self::new(
            base_url,
            &config.api_key,
            config.request_timeout_secs.map(Duration::from_secs),
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `/pool/{id}{suffix}` with the id percent-encoded.
    fn pool_url(&self, pool_id: &str, suffix: &str) -> String {
        self.api_url(&format!("/pool/{}{}", urlencoding::encode(pool_id), suffix))
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(API_KEY_HEADER, &self.api_key)
    }

    /// Send, then map non-2xx bodies to `AppError::Api` and decode the rest.
    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T, AppError> {
        let resp = req
            .send()
            .await
            .map_err(|e| AppError::Http(format!("Pool API request to {what} failed: {e}")))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| AppError::Http(format!("Failed to read response: {e}")))?;
        tracing::debug!("Pool API {what}: {status}");

        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body, what));
        }

        let value = if body.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&body).map_err(|e| {
                AppError::Internal(format!(
                    "Unexpected {what} response: {e}: {}",
                    body.chars().take(200).collect::<String>()
                ))
            })?
        };
        serde_json::from_value(value)
            .map_err(|e| AppError::Internal(format!("Failed to parse {what} response: {e}")))
    }
}

/// Error body `{error, code?}`; anything else falls back to a generic message.
fn api_error(status: u16, body: &str, what: &str) -> AppError {
    let parsed = serde_json::from_str::<ApiErrorBody>(body).ok();
    let (message, code) = match parsed {
        Some(ApiErrorBody { error, code }) => (error, code),
        None => (None, None),
    };
    AppError::Api {
        message: message.unwrap_or_else(|| format!("Failed to {what}")),
        code,
        status,
    }
}

// ==========================================
// Request builders
// ==========================================

impl PoolApiClient {
    fn list_pools_request(&self, creator_address: &str) -> RequestBuilder {
        self.request(Method::GET, self.api_url("/pools"))
            .query(&[("creatorAddress", creator_address)])
    }

    fn available_pools_request(&self, wallet_address: &str) -> RequestBuilder {
        self.request(Method::GET, self.api_url("/available-pools"))
            .query(&[("walletAddress", wallet_address)])
    }

    fn balance_request(&self, pool_id: &str, creator_address: &str) -> RequestBuilder {
        self.request(Method::GET, self.pool_url(pool_id, "/balance"))
            .query(&[("creatorAddress", creator_address)])
    }

    fn create_request(&self, request: &CreatePoolRequest) -> RequestBuilder {
        self.request(Method::POST, self.api_url("/create-pool"))
            .json(request)
    }

    fn edit_request(
        &self,
        pool_id: &str,
        creator_address: &str,
        password: &PoolPassword,
        update: &PoolUpdate,
    ) -> RequestBuilder {
        self.request(Method::PATCH, self.pool_url(pool_id, "/edit"))
            .query(&[
                ("password", password.expose()),
                ("creatorAddress", creator_address),
            ])
            .json(update)
    }

    fn delete_request(
        &self,
        pool_id: &str,
        creator_address: &str,
        password: &PoolPassword,
    ) -> RequestBuilder {
        self.request(Method::DELETE, self.pool_url(pool_id, ""))
            .json(&serde_json::json!({
                "password": password.expose(),
                "creatorAddress": creator_address,
            }))
    }

    fn native_balance_request(
        &self,
        pool_id: &str,
        creator_address: &str,
        password: &PoolPassword,
    ) -> RequestBuilder {
        self.request(Method::GET, self.pool_url(pool_id, "/ar-balance"))
            .query(&[
                ("password", password.expose()),
                ("creatorAddress", creator_address),
            ])
    }

    fn top_up_request(
        &self,
        pool_id: &str,
        creator_address: &str,
        password: &PoolPassword,
        amount: f64,
    ) -> RequestBuilder {
        self.request(Method::POST, self.pool_url(pool_id, "/topup"))
            .query(&[("creatorAddress", creator_address)])
            .json(&serde_json::json!({
                "password": password.expose(),
                "amount": amount,
            }))
    }

    fn wallet_request(
        &self,
        pool_id: &str,
        creator_address: &str,
        password: &PoolPassword,
    ) -> RequestBuilder {
        self.request(Method::GET, self.pool_url(pool_id, "/wallet"))
            .query(&[
                ("password", password.expose()),
                ("creatorAddress", creator_address),
            ])
    }

    fn share_request(&self, ctx: &CreditContext<'_>, grant: &CreditGrant) -> RequestBuilder {
        let body = ShareCreditsBody {
            event_pool_id: ctx.pool_id,
            wallet_address: &grant.address,
            password: ctx.password.expose(),
            approved_winc_amount: grant.approved_winc.to_string(),
            expires_by_seconds: grant.expires_by_seconds,
        };
        self.request(Method::POST, self.api_url("/share-credits"))
            .json(&body)
    }

    fn revoke_request(&self, ctx: &CreditContext<'_>, address: &str) -> RequestBuilder {
        self.request(Method::POST, self.pool_url(ctx.pool_id, "/revoke"))
            .query(&[
                ("password", ctx.password.expose()),
                ("creatorAddress", ctx.creator_address),
            ])
            .json(&serde_json::json!({ "walletAddress": address }))
    }
}

impl PoolBackend for PoolApiClient {
    async fn list_pools(&self, creator_address: &str) -> Result<BTreeMap<String, Pool>, AppError> {
        let req = self.list_pools_request(creator_address);
        let pools: Option<BTreeMap<String, Pool>> = self.send(req, "fetch pools").await?;
        Ok(pools.unwrap_or_default())
    }

    async fn available_pools(
        &self,
        wallet_address: &str,
    ) -> Result<BTreeMap<String, AvailablePool>, AppError> {
        let req = self.available_pools_request(wallet_address);
        let pools: Option<BTreeMap<String, AvailablePool>> =
            self.send(req, "fetch available pools").await?;
        Ok(pools.unwrap_or_default())
    }

    async fn pool_balance(&self, pool_id: &str, creator_address: &str) -> Result<f64, AppError> {
        let req = self.balance_request(pool_id, creator_address);
        let envelope: Option<BalanceEnvelope> = self.send(req, "fetch pool balance").await?;
        Ok(envelope
            .and_then(|e| e.balance)
            .and_then(|b| b.balance)
            .unwrap_or(0.0))
    }

    async fn create_pool(&self, request: &CreatePoolRequest) -> Result<serde_json::Value, AppError> {
        self.send(self.create_request(request), "create pool").await
    }

    async fn edit_pool(
        &self,
        pool_id: &str,
        creator_address: &str,
        password: &PoolPassword,
        update: &PoolUpdate,
    ) -> Result<serde_json::Value, AppError> {
        let req = self.edit_request(pool_id, creator_address, password, update);
        self.send(req, "update pool").await
    }

    async fn delete_pool(
        &self,
        pool_id: &str,
        creator_address: &str,
        password: &PoolPassword,
    ) -> Result<(), AppError> {
        let req = self.delete_request(pool_id, creator_address, password);
        let _: serde_json::Value = self.send(req, "delete pool").await?;
        Ok(())
    }

    async fn native_balance(
        &self,
        pool_id: &str,
        creator_address: &str,
        password: &PoolPassword,
    ) -> Result<f64, AppError> {
        let req = self.native_balance_request(pool_id, creator_address, password);
        let result: NativeBalance = self.send(req, "fetch AR balance").await?;
        Ok(result.balance)
    }

    async fn top_up(
        &self,
        pool_id: &str,
        creator_address: &str,
        password: &PoolPassword,
        amount: f64,
    ) -> Result<String, AppError> {
        let req = self.top_up_request(pool_id, creator_address, password, amount);
        let result: TopUpResult = self.send(req, "top up pool").await?;
        Ok(result.transaction_id)
    }

    async fn pool_wallet(
        &self,
        pool_id: &str,
        creator_address: &str,
        password: &PoolPassword,
    ) -> Result<serde_json::Value, AppError> {
        let req = self.wallet_request(pool_id, creator_address, password);
        let result: WalletResult = self.send(req, "download wallet").await?;
        Ok(result.wallet)
    }

    async fn support_link(&self) -> Result<Option<String>, AppError> {
        let req = self.request(Method::GET, self.api_url("/support-link"));
        let result: Option<SupportLink> = self.send(req, "fetch support link").await?;
        Ok(result.and_then(|r| r.link).filter(|l| !l.is_empty()))
    }
}

impl CreditsProvider for PoolApiClient {
    async fn grant(&self, ctx: &CreditContext<'_>, grant: &CreditGrant) -> Result<(), AppError> {
        let _: serde_json::Value = self
            .send(self.share_request(ctx, grant), "share credits")
            .await?;
        Ok(())
    }

    async fn revoke(&self, ctx: &CreditContext<'_>, address: &str) -> Result<(), AppError> {
        let _: serde_json::Value = self
            .send(self.revoke_request(ctx, address), "revoke credits")
            .await?;
        Ok(())
    }
}
