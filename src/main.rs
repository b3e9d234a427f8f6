//! SolView wallet CLI
//!
//! Command-line front end for the wallet core. Signing uses a local keypair
//! read from `SOLVIEW_KEYPAIR` in place of a mobile wallet app.

use clap::{Parser, Subcommand};
use solview_wallet::config::KEYPAIR_ENV;
use solview_wallet::rpc::RpcNodeProvider;
use solview_wallet::wallet::{KeypairSigner, SendJournal};
use solview_wallet::{Config, Environment, Error, PreferencesStore, Result, RpcConfig, WalletSession};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "solview")]
#[command(about = "Solana wallet session and transfer tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize the wallet and remember its account
    Connect,

    /// Forget the connected account
    Disconnect,

    /// Show the session and preferences state
    Status,

    /// Show the connected account's balance in SOL
    Balance,

    /// Send SOL from the connected account
    Send {
        /// Recipient address (base-58)
        #[arg(long)]
        to: String,

        /// Amount in SOL
        #[arg(long)]
        amount: f64,
    },

    /// Manage favorite addresses
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },

    /// Manage search history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Show or change the network
    Network {
        #[command(subcommand)]
        action: NetworkAction,
    },

    /// Show current configuration
    Config,

    /// Print the send journal
    Journal,
}

#[derive(Subcommand)]
enum FavoritesAction {
    Add { address: String },
    Remove { address: String },
    List,
}

#[derive(Subcommand)]
enum HistoryAction {
    Add { address: String },
    List,
    Clear,
}

#[derive(Subcommand)]
enum NetworkAction {
    Show,
    Toggle,
    /// Select a network (devnet or mainnet)
    Set { network: Environment },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    let config = match cli.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            return Ok(());
        }
        Commands::Journal => {
            print_journal(&config)?;
            return Ok(());
        }
        _ => {}
    }

    let store = PreferencesStore::open(config.store_dir()).await?;

    match cli.command {
        Commands::Connect => {
            let session = open_session(&config, store).await?;
            let identity = session.connect().await?;
            println!("Connected {}", identity);
        }
        Commands::Disconnect => {
            let session = open_session(&config, store).await?;
            session.disconnect().await?;
            println!("Disconnected");
        }
        Commands::Status => {
            let prefs = store.snapshot().await;
            println!("Network:   {}", prefs.environment());
            match prefs.active_identity {
                Some(identity) => println!("Account:   {}", identity),
                None => println!("Account:   not connected"),
            }
            println!("Favorites: {}", prefs.favorites.len());
            println!("History:   {}", prefs.search_history.len());
        }
        Commands::Balance => {
            let session = open_session(&config, store).await?;
            let balance = session.get_balance().await?;
            println!("{} SOL", balance);
        }
        Commands::Send { to, amount } => {
            let session = open_session(&config, store).await?;
            run_send(&session, &to, amount).await?;
        }
        Commands::Favorites { action } => match action {
            FavoritesAction::Add { address } => store.add_favorite(&address).await?,
            FavoritesAction::Remove { address } => store.remove_favorite(&address).await?,
            FavoritesAction::List => print_list(&store.favorites().await),
        },
        Commands::History { action } => match action {
            HistoryAction::Add { address } => store.add_to_history(&address).await?,
            HistoryAction::List => print_list(&store.search_history().await),
            HistoryAction::Clear => store.clear_history().await?,
        },
        Commands::Network { action } => {
            let environment = match action {
                NetworkAction::Show => store.environment().await,
                NetworkAction::Toggle => store.toggle_network().await?,
                NetworkAction::Set { network } => {
                    store.set_environment(network).await?;
                    network
                }
            };
            println!("{}", environment);
        }
        Commands::Config | Commands::Journal => {}
    }

    Ok(())
}

async fn open_session(config: &Config, store: PreferencesStore) -> Result<WalletSession> {
    let signer = KeypairSigner::from_env(KEYPAIR_ENV)?;
    tracing::debug!(pubkey = %signer.pubkey(), "Loaded local signer");

    let nodes = RpcNodeProvider::new(RpcConfig::from_env(), config.send.confirm_poll_interval());
    let session = WalletSession::new(store, Arc::new(signer), Arc::new(nodes), config).await;

    Ok(match config.journal_path {
        Some(ref path) => session.with_journal(SendJournal::new(path)),
        None => session,
    })
}

async fn run_send(session: &WalletSession, to: &str, amount: f64) -> Result<()> {
    let err = match session.send_sol(to, amount).await {
        Ok(signature) => {
            println!("Confirmed {}", signature);
            println!("  {}", session.explorer_url(&signature).await);
            return Ok(());
        }
        Err(e) => e,
    };

    match err {
        // Fate unknown: the node may still land it
        Error::BroadcastFailed {
            ref signature,
            attempts,
            ref reason,
        } => {
            println!("Broadcast failed after {} attempts: {}", attempts, reason);
            println!("Check before resending: {}", session.explorer_url(signature).await);
        }
        Error::EnvironmentChanged {
            environment,
            signature: Some(ref signature),
        } => {
            println!("Network changed after broadcast on {}", environment);
            println!("Check before resending: {}", environment.explorer_url(signature));
        }
        ref e if e.is_validation() => {
            println!("Nothing was sent: {}", e);
        }
        ref e if e.is_retryable() => {
            println!("Node unreachable, safe to retry: {}", e);
        }
        _ => {}
    }
    Err(err)
}

fn print_list(items: &[String]) {
    if items.is_empty() {
        println!("(empty)");
    }
    for item in items {
        println!("{}", item);
    }
}

fn print_journal(config: &Config) -> Result<()> {
    let Some(ref path) = config.journal_path else {
        println!("Send journal disabled");
        return Ok(());
    };

    for entry in SendJournal::read_entries(path)? {
        println!(
            "{} {} {} -> {} {} lamports {}{}",
            entry.timestamp.to_rfc3339(),
            entry.environment,
            entry.sender.abbreviated(),
            entry.recipient.abbreviated(),
            entry.lamports,
            entry.outcome,
            entry
                .signature
                .map(|s| format!(" {}", s))
                .unwrap_or_default(),
        );
    }
    Ok(())
}
