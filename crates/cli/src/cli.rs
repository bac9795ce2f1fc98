use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use sui::{SuiLedger, load_optional_wallet_from_env, load_wallet_from_env};
use tracing::{info, warn};
use zksend::bulk::{expand_link_groups, links_to_csv, parse_link_groups, total_amount};
use zksend::coin::normalize_address;
use zksend::link::{DEFAULT_HOST, DEFAULT_PATH};
use zksend::{
    Address, ClaimLink, ClaimSpec, CoinType, HistoryScanner, Keypair, LinkAssetsSnapshot,
    LinkSession, LinkState, LinkVariant, MetadataCache, TransactionSigner,
    build_batch_funding_transaction, build_funding_transaction, format_amount, parse_amount,
    reclaim_link, submit_transaction,
};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "zksend")]
#[command(about = "Create, inspect, claim and reclaim zkSend links on Sui", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Sui network (mainnet, testnet, devnet)
    #[arg(long, global = true, env = "SUI_CHAIN", default_value = "testnet")]
    pub chain: String,

    /// Fullnode JSON-RPC endpoint; defaults to the public fullnode
    #[arg(long, global = true, env = "SUI_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Host that generated links point to
    #[arg(long, global = true, env = "ZKSEND_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Claim page path
    #[arg(long, global = true, env = "ZKSEND_PATH", default_value = DEFAULT_PATH)]
    pub path: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate unfunded link URLs
    Keygen {
        #[arg(long, default_value = "1")]
        count: usize,

        /// Escrow links instead of direct links
        #[arg(long, default_value = "false")]
        escrow: bool,
    },

    /// Fund a single link from the wallet in SUI_SECRET_KEY
    Create {
        /// Coin type to send
        #[arg(long, short = 'c', default_value = "0x2::sui::SUI")]
        coin_type: String,

        /// Amount in whole units (e.g. 1.5)
        #[arg(long, short = 'a')]
        amount: String,

        /// Treat the amount as base units
        #[arg(long, default_value = "false")]
        raw: bool,

        #[arg(long, default_value = "false")]
        escrow: bool,

        /// URL the claim page redirects to afterwards
        #[arg(long, requires = "redirect_name")]
        redirect_url: Option<String>,

        /// Display name of the redirect target
        #[arg(long, requires = "redirect_url")]
        redirect_name: Option<String>,
    },

    /// Fund many links in one transaction
    Bulk {
        #[arg(long, short = 'c', default_value = "0x2::sui::SUI")]
        coin_type: String,

        /// Link groups, e.g. "2x100 3x50"
        #[arg(long)]
        amounts: String,

        #[arg(long, default_value = "false")]
        escrow: bool,

        /// CSV output file; named after the coin and date by default
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,

        /// Only print the plan
        #[arg(long, default_value = "false")]
        dry_run: bool,
    },

    /// Show what a link holds
    Status { url: String },

    /// Sweep a link's assets to an address
    Claim {
        url: String,

        /// Recipient; defaults to the wallet address
        #[arg(long)]
        to: Option<String>,
    },

    /// Return an unclaimed link's assets to the wallet
    Reclaim { url: String },

    /// Escrow links created by the wallet
    History {
        #[arg(long)]
        cursor: Option<String>,

        /// Follow all pages
        #[arg(long, default_value = "false")]
        all: bool,
    },
}

pub async fn run(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Keygen { count, escrow } => handle_keygen(config, count, variant(escrow)),
        Commands::Create {
            coin_type,
            amount,
            raw,
            escrow,
            redirect_url,
            redirect_name,
        } => {
            let mut routing = config.routing.clone();
            if let (Some(url), Some(name)) = (redirect_url, redirect_name) {
                routing = routing.with_redirect(url, name);
            }
            handle_create(config, routing, &coin_type, &amount, raw, variant(escrow)).await
        }
        Commands::Bulk {
            coin_type,
            amounts,
            escrow,
            out,
            dry_run,
        } => handle_bulk(config, &coin_type, &amounts, variant(escrow), out, dry_run).await,
        Commands::Status { url } => handle_status(config, &url).await,
        Commands::Claim { url, to } => handle_claim(config, &url, to.as_deref()).await,
        Commands::Reclaim { url } => handle_reclaim(config, &url).await,
        Commands::History { cursor, all } => handle_history(config, cursor, all).await,
    }
}

fn variant(escrow: bool) -> LinkVariant {
    if escrow {
        LinkVariant::Escrow
    } else {
        LinkVariant::Direct
    }
}

fn parse_recipient(input: &str) -> Result<Address> {
    normalize_address(input)
        .and_then(|address| address.parse().ok())
        .ok_or_else(|| anyhow::anyhow!("Invalid Sui address: {}", input))
}

fn handle_keygen(config: &Config, count: usize, variant: LinkVariant) -> Result<()> {
    for _ in 0..count {
        let link = ClaimLink::generate(variant, config.routing.clone())?;
        println!("{}\t{}", link.address(), link.url()?);
    }
    Ok(())
}

async fn handle_create(
    config: &Config,
    routing: zksend::LinkRouting,
    coin_type: &str,
    amount: &str,
    raw: bool,
    variant: LinkVariant,
) -> Result<()> {
    let wallet = load_wallet_from_env()?;
    let ledger = SuiLedger::new(&config.rpc_url)?;
    let coin_type = CoinType::parse(coin_type)?;

    let amount = if raw {
        parse_amount(amount, 0)?
    } else {
        let info = MetadataCache::new().get(&ledger, &coin_type).await?;
        parse_amount(amount, info.decimals)?
    };
    let claims = ClaimSpec::single(coin_type, amount)?;

    let link = ClaimLink::generate(variant, routing)?;
    let contract = config.contract();
    let tx = build_funding_transaction(wallet.address(), &link, &claims, contract.as_ref())?;

    info!(link = %link.address(), variant = variant.as_str(), "Funding link");
    let digest = submit_transaction(&ledger, &tx, &[&wallet]).await?;
    info!(digest = %digest, "Link funded");

    println!("{}", link.url()?);
    Ok(())
}

async fn handle_bulk(
    config: &Config,
    coin_type: &str,
    amounts: &str,
    variant: LinkVariant,
    out: Option<PathBuf>,
    dry_run: bool,
) -> Result<()> {
    let ledger = SuiLedger::new(&config.rpc_url)?;
    let coin_type = CoinType::parse(coin_type)?;
    let info = MetadataCache::new().get(&ledger, &coin_type).await?;

    let groups = parse_link_groups(amounts)?;
    let per_link = expand_link_groups(&groups, &coin_type, info.decimals)?;
    let total = total_amount(&groups, info.decimals)?;
    info!(
        links = per_link.len(),
        total = %format_amount(u64::try_from(total)?, info.decimals),
        symbol = %info.symbol,
        "Bulk link plan"
    );
    if dry_run {
        for group in &groups {
            println!("{} x {} {}", group.count, group.amount, info.symbol);
        }
        return Ok(());
    }

    let wallet = load_wallet_from_env()?;
    let contract = config.contract();
    let (tx, links) = build_batch_funding_transaction(
        wallet.address(),
        &per_link,
        variant,
        &config.routing,
        contract.as_ref(),
    )?;
    let urls = links.iter().map(ClaimLink::url).collect::<zksend::Result<Vec<_>>>()?;

    let path = out.unwrap_or_else(|| {
        PathBuf::from(format!(
            "zksend_{}_{}_links_{}.csv",
            info.symbol,
            links.len(),
            Local::now().format("%m-%d")
        ))
    });
    // The file must exist before any link is funded.
    std::fs::write(&path, links_to_csv(&urls))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {}", path.display());

    let digest = submit_transaction(&ledger, &tx, &[&wallet]).await?;
    info!(digest = %digest, links = links.len(), "Links funded");
    Ok(())
}

async fn print_assets(ledger: &SuiLedger, cache: &MetadataCache, snapshot: &LinkAssetsSnapshot) {
    for balance in &snapshot.balances {
        let display = cache.describe(ledger, &balance.coin_type).await;
        println!("  {}", display.format(balance.amount));
    }
}

async fn handle_status(config: &Config, url: &str) -> Result<()> {
    let ledger = SuiLedger::new(&config.rpc_url)?;
    let mut session = LinkSession::new(&ledger, config.contract());
    let state = session.load_from_url(url).await.clone();
    match state {
        LinkState::Ready(snapshot) => {
            println!("{} ({}) is claimable:", snapshot.address, snapshot.variant.as_str());
            print_assets(&ledger, &MetadataCache::new(), &snapshot).await;
        }
        LinkState::AlreadyClaimed => println!("Link has already been claimed"),
        LinkState::LoadError(e) => return Err(e.into()),
        other => warn!("Unexpected link state {:?}", other),
    }
    Ok(())
}

async fn handle_claim(config: &Config, url: &str, to: Option<&str>) -> Result<()> {
    let ledger = SuiLedger::new(&config.rpc_url)?;
    let wallet: Option<Keypair> =
        load_optional_wallet_from_env().context("SUI_SECRET_KEY is set but invalid")?;
    let recipient = match to {
        Some(address) => parse_recipient(address)?,
        None => wallet
            .as_ref()
            .map(Keypair::address)
            .ok_or_else(|| anyhow::anyhow!("Pass --to or set SUI_SECRET_KEY"))?,
    };

    let mut session = LinkSession::new(&ledger, config.contract());
    match session.load_from_url(url).await.clone() {
        LinkState::Ready(snapshot) => {
            info!(link = %snapshot.address, recipient = %recipient, "Claiming link");
            print_assets(&ledger, &MetadataCache::new(), &snapshot).await;
        }
        LinkState::AlreadyClaimed => return Err(anyhow::anyhow!("Link has already been claimed")),
        LinkState::LoadError(e) => return Err(e.into()),
        other => return Err(anyhow::anyhow!("Link is not claimable: {:?}", other)),
    }

    let sponsor = wallet.as_ref().map(|w| w as &dyn TransactionSigner);
    let digest = session.initiate_claim(recipient, sponsor).await?;
    println!("Claimed to {} in {}", recipient, digest);
    Ok(())
}

async fn handle_reclaim(config: &Config, url: &str) -> Result<()> {
    let ledger = SuiLedger::new(&config.rpc_url)?;
    let wallet = load_wallet_from_env()?;
    let link = ClaimLink::from_url(url).context("Invalid link URL")?;
    let contract = config.contract();

    info!(link = %link.address(), "Reclaiming link");
    let digest = reclaim_link(&ledger, &link, &wallet, contract.as_ref()).await?;
    println!("Reclaimed to {} in {}", wallet.address(), digest);
    Ok(())
}

async fn handle_history(config: &Config, cursor: Option<String>, all: bool) -> Result<()> {
    let ledger = SuiLedger::new(&config.rpc_url)?;
    let wallet = load_wallet_from_env().context("History needs the wallet key")?;
    let contract = config.require_contract()?;
    let cache = MetadataCache::new();
    let mut scanner = HistoryScanner::new(&ledger, wallet.address(), contract);

    let mut cursor = cursor;
    loop {
        let page = scanner.next_page(cursor.as_deref()).await?;
        for record in &page.links {
            let created = record
                .created_at_ms
                .and_then(|ms| DateTime::from_timestamp_millis(i64::try_from(ms).ok()?))
                .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("{}  {}  {:?}  {}", created, record.address, record.status, record.digest);
            print_assets(&ledger, &cache, &record.assets).await;
        }
        if !all || !page.has_next_page {
            if let Some(next) = page.cursor.filter(|_| page.has_next_page) {
                println!("Next page: --cursor {}", next);
            }
            break;
        }
        cursor = page.cursor;
    }
    Ok(())
}
