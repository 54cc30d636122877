//! lockbox: command-line front end for the keyring vault.
//!
//! Every command opens the state file, unlocks it with the password
//! (prompted, or taken from `LOCKBOX_PASSWORD`), runs one operation and
//! exits. Keyring handles printed by `list` are valid for the next
//! invocation as long as the vault is not modified in between.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use lockbox_core::constants::{HD_KEYRING, SIMPLE_KEYRING};
use lockbox_core::types::{KeyringId, SerializedKeyring};
use lockbox_service::{KeyringService, ServiceConfig};

/// Environment variable read instead of prompting for the password.
const PASSWORD_ENV: &str = "LOCKBOX_PASSWORD";

/// Lockbox encrypted keyring vault.
#[derive(Parser)]
#[command(name = "lockbox")]
#[command(version, about = "Encrypted keyring vault")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Configuration file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory.
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log output format: "text" or "json".
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the vault password for the first time.
    Init,
    /// Show whether a vault exists and what it contains.
    Status,
    /// List keyrings and their accounts.
    List,
    /// Import a hex private key.
    ImportKey(ImportKeyArgs),
    /// Create an HD keyring from a mnemonic.
    CreateMnemonic(CreateMnemonicArgs),
    /// Print a fresh mnemonic without storing it.
    GenerateMnemonic,
    /// Derive one more account on a keyring.
    AddAccount(AddAccountArgs),
    /// Remove an account.
    RemoveAccount(RemoveAccountArgs),
    /// Print the private key of an account.
    ExportKey(ExportKeyArgs),
    /// Re-encrypt the vault under a new password.
    ChangePassword,
    /// Merge a vault exported by the browser extension.
    Sync(SyncArgs),
}

#[derive(Args)]
struct ImportKeyArgs {
    /// Hex private key. If not provided, will prompt securely.
    #[arg(short, long)]
    key: Option<String>,
}

#[derive(Args)]
struct CreateMnemonicArgs {
    /// Generate a new mnemonic instead of prompting for one.
    #[arg(short, long)]
    generate: bool,
}

#[derive(Args)]
struct AddAccountArgs {
    /// Keyring handle from `list` (default: first HD keyring).
    #[arg(short, long)]
    keyring: Option<u64>,
}

#[derive(Args)]
struct RemoveAccountArgs {
    /// Account address.
    address: String,

    /// Keyring type owning the account.
    #[arg(short = 't', long, default_value = SIMPLE_KEYRING)]
    keyring_type: String,

    /// Brand, for hardware keyrings.
    #[arg(short, long)]
    brand: Option<String>,

    /// Keep the keyring even if it becomes empty.
    #[arg(long)]
    keep_empty: bool,
}

#[derive(Args)]
struct ExportKeyArgs {
    /// Account address.
    address: String,
}

#[derive(Args)]
struct SyncArgs {
    /// JSON file holding an array of `{ "type", "data" }` keyrings.
    #[arg(short, long)]
    file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.global)?;

    init_logging(&config.log_level, &cli.global.log_format);

    let service = KeyringService::from_config(&config).context("Failed to open keyring state")?;
    debug!(path = %config.state_path().display(), "opened keyring state");

    match cli.command {
        Commands::Init => init(&service).await,
        Commands::Status => status(&service).await,
        Commands::List => list(&service).await,
        Commands::ImportKey(args) => import_key(&service, args).await,
        Commands::CreateMnemonic(args) => create_mnemonic(&service, args).await,
        Commands::GenerateMnemonic => {
            println!("{}", service.generate_mnemonic());
            Ok(())
        }
        Commands::AddAccount(args) => add_account(&service, args).await,
        Commands::RemoveAccount(args) => remove_account(&service, args).await,
        Commands::ExportKey(args) => export_key(&service, args).await,
        Commands::ChangePassword => change_password(&service).await,
        Commands::Sync(args) => sync(&service, args).await,
    }
}

/// Initialize tracing on stderr, keeping stdout for command output.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(global: &GlobalArgs) -> Result<ServiceConfig> {
    let mut config =
        ServiceConfig::load(global.config.as_deref()).context("Failed to load configuration")?;
    if let Some(dir) = &global.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

/// Set the first password.
async fn init(service: &KeyringService) -> Result<()> {
    if service.is_booted().await {
        bail!("Vault already initialized");
    }
    let password = prompt_new_password()?;
    service.boot(&password).await?;
    service.persist_all_keyrings().await?;
    println!("Vault initialized");
    Ok(())
}

async fn status(service: &KeyringService) -> Result<()> {
    println!("Initialized: {}", service.is_booted().await);
    println!("Vault: {}", service.has_vault().await);
    println!("Secret keyrings: {}", service.has_encrypted_keyring_data().await);
    let mirrored = service.get_unencrypted_keyring_types().await;
    if !mirrored.is_empty() {
        println!("Unencrypted keyrings: {}", mirrored.join(", "));
    }
    Ok(())
}

async fn list(service: &KeyringService) -> Result<()> {
    unlock(service).await?;
    for keyring in service.get_all_typed_accounts().await {
        println!("[{}] {}", keyring.id.0, keyring.keyring_type);
        for account in &keyring.accounts {
            println!("    {} ({})", account.address, account.brand_name);
        }
    }
    Ok(())
}

async fn import_key(service: &KeyringService, args: ImportKeyArgs) -> Result<()> {
    unlock(service).await?;
    let key = match args.key {
        Some(k) => k,
        None => prompt_password("Private key")?,
    };
    let id = service.import_private_key(key.trim()).await?;
    for address in service.keyring_accounts(id).await? {
        println!("{address}");
    }
    Ok(())
}

async fn create_mnemonic(service: &KeyringService, args: CreateMnemonicArgs) -> Result<()> {
    unlock(service).await?;
    let phrase = if args.generate {
        let phrase = service.generate_mnemonic();
        println!("\nMNEMONIC (BACKUP THESE 12 WORDS):");
        println!("  {phrase}");
        println!("\nWARNING: This phrase will NOT be shown again.\n");
        phrase
    } else {
        prompt_password("Mnemonic")?
    };
    let id = service.create_keyring_with_mnemonics(&phrase).await?;
    for address in service.keyring_accounts(id).await? {
        println!("{address}");
    }
    Ok(())
}

async fn add_account(service: &KeyringService, args: AddAccountArgs) -> Result<()> {
    unlock(service).await?;
    let id = match args.keyring {
        Some(n) => KeyringId(n),
        None => service
            .get_keyring_by_type(HD_KEYRING)
            .await
            .context("No HD keyring; create one with `create-mnemonic`")?,
    };
    for account in service.add_new_account(id).await? {
        println!("{}", account.address);
    }
    Ok(())
}

async fn remove_account(service: &KeyringService, args: RemoveAccountArgs) -> Result<()> {
    unlock(service).await?;
    service
        .remove_account(
            &args.address,
            &args.keyring_type,
            args.brand.as_deref(),
            !args.keep_empty,
        )
        .await?;
    println!("Removed {}", args.address);
    Ok(())
}

async fn export_key(service: &KeyringService, args: ExportKeyArgs) -> Result<()> {
    unlock(service).await?;
    println!("{}", service.export_account(&args.address).await?);
    Ok(())
}

async fn change_password(service: &KeyringService) -> Result<()> {
    let old = read_password("Current password")?;
    service
        .submit_password(&old)
        .await
        .context("Failed to unlock vault (check password)")?;
    let new = prompt_new_password()?;
    service.update_password(&old, &new).await?;
    println!("Password updated");
    Ok(())
}

async fn sync(service: &KeyringService, args: SyncArgs) -> Result<()> {
    let raw = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let vault: Vec<SerializedKeyring> =
        serde_json::from_str(&raw).context("Sync file is not a keyring array")?;
    unlock(service).await?;
    let added = service.sync_extension_data(vault).await?;
    println!("Added {} account(s)", added.len());
    for account in added {
        println!("    {} [{}]", account.address, account.keyring_type);
    }
    Ok(())
}

async fn unlock(service: &KeyringService) -> Result<()> {
    if !service.is_booted().await {
        bail!("Vault not initialized; run `lockbox init` first");
    }
    let password = read_password("Vault password")?;
    service
        .submit_password(&password)
        .await
        .context("Failed to unlock vault (check password)")?;
    Ok(())
}

/// Password from the environment, or prompted without echo.
fn read_password(prompt: &str) -> Result<String> {
    match std::env::var(PASSWORD_ENV) {
        Ok(p) => Ok(p),
        Err(_) => prompt_password(prompt),
    }
}

fn prompt_new_password() -> Result<String> {
    if let Ok(p) = std::env::var(PASSWORD_ENV) {
        return Ok(p);
    }
    let password = prompt_password("New password")?;
    let confirm = prompt_password("Confirm password")?;
    if password != confirm {
        bail!("Passwords do not match");
    }
    Ok(password)
}

/// Prompt for a secret securely (no echo).
fn prompt_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(format!("{prompt}: ")).context("Failed to read input")
}
