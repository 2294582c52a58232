use crate::address::{import_whitelist_file, WhitelistPreview};
use crate::commands::{credits, funds, pools, Prompter};
use crate::config::{Config, ConfigFile};
use crate::error::AppError;
use crate::forms::{CreatePoolForm, EditPoolForm};
use crate::pool::{format_display_time, AvailablePoolCard, PoolDetails, PoolOverview};
use crate::pool_api::PoolApiClient;
use crate::state::{short_address, AppState};
use crate::topup::{format_estimate, TopUpAmount};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "pool-admin")]
#[command(about = "Create and manage credit pools")]
pub struct Cli {
    /// Config file (defaults to <config dir>/pool-admin/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Pool API base URL
    #[arg(long, global = true)]
    pub server_url: Option<String>,
    /// Pool API key sent as X-API-Key
    #[arg(long, global = true)]
    pub api_key: Option<String>,
    /// Creator wallet address
    #[arg(long, global = true)]
    pub wallet_address: Option<String>,
    /// Creator wallet keyfile (JWK); the address is derived from it
    #[arg(long, global = true)]
    pub keyfile: Option<PathBuf>,
    /// Pool password; prompted for when omitted
    #[arg(long, global = true)]
    pub password: Option<String>,
    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Default)]
pub struct WhitelistArgs {
    /// Whitelisted address (repeatable)
    #[arg(long = "whitelist")]
    pub addresses: Vec<String>,
    /// JSON file holding an array of addresses
    #[arg(long)]
    pub whitelist_file: Option<PathBuf>,
}

impl WhitelistArgs {
    /// Newline-delimited whitelist text, or `None` when nothing was given.
    fn to_text(&self) -> Result<Option<String>, AppError> {
        let mut lines = self.addresses.clone();
        if let Some(path) = &self.whitelist_file {
            lines.push(import_whitelist_file(path)?);
        }
        if lines.is_empty() {
            Ok(None)
        } else {
            Ok(Some(lines.join("\n")))
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List pools created by the connected wallet
    List,
    /// Show one pool with balance and usage
    Show { pool_id: String },
    /// List pools whose whitelist includes the connected wallet
    Available,
    /// Create a pool
    Create {
        #[arg(long)]
        name: String,
        /// Start, RFC 3339 or local YYYY-MM-DDTHH:MM
        #[arg(long)]
        start: String,
        /// End, RFC 3339 or local YYYY-MM-DDTHH:MM
        #[arg(long)]
        end: String,
        #[arg(long)]
        usage_cap: String,
        #[command(flatten)]
        whitelist: WhitelistArgs,
        #[arg(long, default_value = "")]
        sponsor_info: String,
    },
    /// Edit a pool; only the given fields change
    Edit {
        pool_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        usage_cap: Option<String>,
        #[command(flatten)]
        whitelist: WhitelistArgs,
        #[arg(long)]
        sponsor_info: Option<String>,
    },
    /// Delete a pool
    Delete {
        pool_id: String,
        /// Skip the confirmation question
        #[arg(long)]
        yes: bool,
    },
    /// Grant the pool allowance to every whitelisted address
    Sponsor { pool_id: String },
    /// Revoke the allowance of every whitelisted address
    RevokeAll { pool_id: String },
    /// Share the pool allowance with one address
    Share { pool_id: String, address: String },
    /// Revoke one address and remove it from the whitelist
    Revoke { pool_id: String, address: String },
    /// Fund the pool wallet
    TopUp {
        pool_id: String,
        #[arg(long, conflicts_with = "max", required_unless_present = "max")]
        amount: Option<String>,
        /// Use the pool wallet's whole native balance
        #[arg(long)]
        max: bool,
    },
    /// Estimate credits received for a top-up amount
    Estimate { amount: String },
    /// Save the pool wallet keyfile
    DownloadWallet {
        pool_id: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check a whitelist file (JSON array or one address per line)
    CheckWhitelist { path: PathBuf },
    /// Print the support link
    SupportLink,
}

/// Prompts on stderr, answers from stdin unless preset by flags.
pub struct StdinPrompter {
    password: Option<String>,
    assume_yes: bool,
}

impl StdinPrompter {
    pub fn new(password: Option<String>, assume_yes: bool) -> Self {
        Self {
            password,
            assume_yes,
        }
    }

    fn read_line(prompt: &str) -> Option<String> {
        eprint!("{prompt} ");
        let _ = io::stderr().flush();
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

impl Prompter for StdinPrompter {
    fn confirm(&self, question: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        Self::read_line(&format!("{question} [y/N]"))
            .map(|a| matches!(a.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
            .unwrap_or(false)
    }

    fn password(&self, prompt: &str) -> Option<String> {
        self.password
            .clone()
            .or_else(|| Self::read_line(prompt))
            .filter(|p| !p.is_empty())
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<(), AppError> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

pub fn render_overview(overview: &PoolOverview) -> String {
    if overview.pools.is_empty() {
        return "No pools found yet. Create your first pool to get started!".to_string();
    }
    let mut out = format!("Pools: {} ({} active)\n", overview.total, overview.active);
    for card in &overview.pools {
        out.push_str(&format!(
            "\n{}  [{}]  {}\n  balance {:.4}  cap {}  addresses {}\n  {} - {}\n",
            card.pool.name,
            card.status,
            card.id,
            card.balance,
            card.pool.usage_cap,
            card.pool.whitelist.len(),
            format_display_time(&card.pool.start_time),
            format_display_time(&card.pool.end_time),
        ));
    }
    out
}

pub fn render_details(details: &PoolDetails) -> String {
    let pool = &details.pool;
    let mut out = format!(
        "Name:        {}\nStatus:      {}\nPool ID:     {}\nStart Time:  {}\nEnd Time:    {}\nUsage Cap:   {} Credits\nBalance:     {:.2} Credits\nTotal Usage: {}\n",
        pool.name,
        details.status,
        details.id,
        format_display_time(&pool.start_time),
        format_display_time(&pool.end_time),
        pool.usage_cap,
        details.balance,
        details.total_usage,
    );
    if !pool.sponsor_info.is_empty() {
        out.push_str(&format!("Sponsor:     {}\n", pool.sponsor_info));
    }
    out.push_str(&format!("Whitelisted Addresses ({}):\n", pool.whitelist.len()));
    for address in &pool.whitelist {
        let used = pool.usage.get(address).map(|v| v.to_string());
        match used {
            Some(used) => out.push_str(&format!("  {address}  used {used}\n")),
            None => out.push_str(&format!("  {address}\n")),
        }
    }
    out
}

pub fn render_available(cards: &[AvailablePoolCard]) -> String {
    if cards.is_empty() {
        return "No available pools found for your wallet address.".to_string();
    }
    let mut out = String::new();
    for card in cards {
        out.push_str(&format!("{}  {}\n", card.pool.name, card.id));
        if let Some(end) = &card.pool.end_time {
            out.push_str(&format!("  ends {}\n", format_display_time(end)));
        }
        if !card.pool.sponsor_info.is_empty() {
            out.push_str(&format!("  {}\n", card.pool.sponsor_info));
        }
    }
    out
}

fn render_preview(preview: &WhitelistPreview) -> String {
    let mut out = String::new();
    for entry in &preview.entries {
        let mark = if entry.valid { "ok     " } else { "INVALID" };
        out.push_str(&format!("{mark} {}\n", entry.address));
    }
    out.push_str(&format!(
        "{} valid, {} invalid",
        preview.valid_count(),
        preview.invalid_count()
    ));
    out
}

fn check_whitelist(path: &Path) -> Result<WhitelistPreview, AppError> {
    let text = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        import_whitelist_file(path)?
    } else {
        fs::read_to_string(path)?
    };
    Ok(WhitelistPreview::from_text(&text))
}

fn load_config(cli: &Cli) -> Result<Config, AppError> {
    Config::load(
        cli.config.as_deref(),
        ConfigFile {
            server_url: cli.server_url.clone(),
            api_key: cli.api_key.clone(),
            wallet_address: cli.wallet_address.clone(),
            keyfile: cli.keyfile.clone(),
            ..Default::default()
        },
    )
}

/// Run one CLI command to completion.
pub async fn execute(cli: Cli) -> Result<(), AppError> {
    let config = load_config(&cli)?;
    let json = cli.json;

    // commands that never touch the network
    match &cli.command {
        Commands::Estimate { amount } => {
            let estimate = format_estimate(amount, config.fee_rate);
            return emit(json, &serde_json::json!({ "estimatedCredits": estimate }), || {
                format!("Estimated credits: {estimate}")
            });
        }
        Commands::CheckWhitelist { path } => {
            let preview = check_whitelist(path)?;
            emit(json, &preview, || render_preview(&preview))?;
            if !preview.is_submittable() {
                return Err(AppError::Validation(format!(
                    "{} invalid addresses",
                    preview.invalid_count()
                )));
            }
            return Ok(());
        }
        _ => {}
    }

    let client = PoolApiClient::from_config(&config)?;
    let wallet = config.wallet_provider();
    let state = AppState::new(config, client);
    if let Some(provider) = wallet {
        let address = state.session.connect(provider.as_ref())?;
        tracing::debug!("Acting as {}", short_address(&address));
    }

    let assume_yes = matches!(cli.command, Commands::Delete { yes: true, .. });
    let prompter = StdinPrompter::new(cli.password.clone(), assume_yes);

    match cli.command {
        Commands::List => {
            let overview = pools::pool_list(&state).await?;
            emit(json, &overview, || render_overview(&overview))
        }
        Commands::Available => {
            let cards = pools::pool_available(&state).await?;
            emit(json, &cards, || render_available(&cards))
        }
        Commands::Show { pool_id } => {
            let details = pools::pool_details(&pool_id, &state).await?;
            emit(json, &details, || render_details(&details))
        }
        Commands::Create {
            name,
            start,
            end,
            usage_cap,
            whitelist,
            sponsor_info,
        } => {
            let password = prompter.password("Pool password:").unwrap_or_default();
            let password_confirm = match &cli.password {
                Some(p) => p.clone(),
                None => StdinPrompter::read_line("Confirm pool password:").unwrap_or_default(),
            };
            let form = CreatePoolForm {
                name,
                password,
                password_confirm,
                start_time: start,
                end_time: end,
                usage_cap,
                whitelist: whitelist.to_text()?.unwrap_or_default(),
                sponsor_info,
            };
            let created = pools::pool_create(&form, &state).await?;
            emit(json, &created, || "Pool created successfully!".to_string())
        }
        Commands::Edit {
            pool_id,
            name,
            start,
            end,
            usage_cap,
            whitelist,
            sponsor_info,
        } => {
            let form = EditPoolForm {
                password: prompter
                    .password("Enter the pool password to edit:")
                    .unwrap_or_default(),
                name,
                start_time: start,
                end_time: end,
                usage_cap,
                whitelist: whitelist.to_text()?,
                sponsor_info,
            };
            let outcome = pools::pool_edit(&pool_id, &form, &state).await?;
            emit(json, &outcome, || {
                let mut text = "Pool updated successfully!".to_string();
                if !outcome.reconciliation.is_noop() {
                    text.push('\n');
                    text.push_str(&outcome.reconciliation.to_string());
                }
                text
            })
        }
        Commands::Delete { pool_id, .. } => {
            pools::pool_delete(&pool_id, &prompter, &state).await?;
            emit(json, &serde_json::json!({ "deleted": pool_id }), || {
                "Pool deleted successfully!".to_string()
            })
        }
        Commands::Sponsor { pool_id } => {
            let report = credits::credits_sponsor(&pool_id, &prompter, &state).await?;
            emit(json, &report, || report.to_string())
        }
        Commands::RevokeAll { pool_id } => {
            let report = credits::credits_revoke_all(&pool_id, &prompter, &state).await?;
            emit(json, &report, || report.to_string())
        }
        Commands::Share { pool_id, address } => {
            state.session.set_current_pool_id(Some(pool_id));
            credits::credits_share(&address, &prompter, &state).await?;
            emit(json, &serde_json::json!({ "shared": address }), || {
                "Credits shared successfully!".to_string()
            })
        }
        Commands::Revoke { pool_id, address } => {
            state.session.set_current_pool_id(Some(pool_id));
            let pool = credits::credits_revoke_access(&address, &prompter, &state).await?;
            emit(json, &pool, || {
                "Access revoked and address removed from whitelist successfully!".to_string()
            })
        }
        Commands::TopUp {
            pool_id,
            amount,
            max,
        } => {
            let source = if max {
                funds::TopUpSource::Max
            } else {
                funds::TopUpSource::Amount(TopUpAmount::parse(
                    amount.as_deref().unwrap_or_default(),
                )?)
            };
            let receipt = funds::pool_top_up(&pool_id, source, &prompter, &state).await?;
            emit(json, &receipt, || {
                format!(
                    "Pool topped up successfully! Transaction ID: {} (estimated credits {:.6})",
                    receipt.transaction_id, receipt.estimated_credits
                )
            })
        }
        Commands::DownloadWallet { pool_id, out } => {
            let path = funds::wallet_download(&pool_id, out.as_deref(), &prompter, &state).await?;
            emit(json, &serde_json::json!({ "path": path }), || {
                format!("Wallet downloaded to {}", path.display())
            })
        }
        Commands::SupportLink => {
            let link = funds::support_link(&state).await?;
            emit(json, &serde_json::json!({ "link": link }), || link.clone())
        }
        Commands::Estimate { .. } | Commands::CheckWhitelist { .. } => Ok(()),
    }
}
