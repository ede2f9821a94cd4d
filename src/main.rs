use anyhow::{bail, Context, Result};
use tracing::info;

use credvault::config::{load_config, VaultConfig};
use credvault::crypto::{EnvelopeCipher, MasterKey};
use credvault::store::{CredentialStore, SqliteStore};

const USAGE: &str = "usage: credvault <generate-key | check [config.toml]>";

fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "credvault=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("generate-key") => {
            println!("{}", MasterKey::generate().to_base64());
            Ok(())
        }
        Some("check") => check(args.get(1).map(String::as_str)),
        _ => bail!(USAGE),
    }
}

/// Verifies that config, master key and store line up.
fn check(config_path: Option<&str>) -> Result<()> {
    let config = match config_path {
        Some(path) => load_config(path)?,
        None => VaultConfig::default(),
    }
    .from_env_overrides();

    let master_key = config.encryption.load_master_key()?;
    let cipher = EnvelopeCipher::new(&master_key);

    // Round-trip through the cipher before touching storage
    let sealed_sample = cipher
        .encrypt(b"credvault-check")
        .context("Master key failed to encrypt")?;
    cipher
        .decrypt(&sealed_sample)
        .context("Master key failed to decrypt its own output")?;

    let store = SqliteStore::open(&config.storage.database_path).with_context(|| {
        format!("Failed to open store at {}", config.storage.database_path)
    })?;
    store
        .list_credentials(uuid::Uuid::nil())
        .context("Store is not readable")?;

    info!(
        database = %config.storage.database_path,
        master_key_env = %config.encryption.master_key_env,
        "Credential vault configuration OK"
    );
    Ok(())
}
