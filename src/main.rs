//! keyring-engine - unlock or create a wallet vault and report its accounts
//!
//! On start the binary loads the stored vault (if any), unlocks it with the
//! password from the environment, or creates a new one, then prints every
//! visible account with its Tron counterpart and locks again.
//!
//! # Usage
//!
//! ```bash
//! # Unlock an existing vault, or create one with a fresh mnemonic
//! KEYRING_PASSWORD=your_password keyring-engine
//!
//! # Restore from a mnemonic when no vault exists yet
//! KEYRING_PASSWORD=pw KEYRING_MNEMONIC="test test ... junk" keyring-engine
//!
//! # Or with a config file
//! keyring-engine --config /etc/keyring-engine/keyring.toml
//! ```

use keyring_engine::config::Config;
use keyring_engine::controller::{ComposableController, ControllerHandle, Stateful};
use keyring_engine::errors::{KeyringError, Result};
use keyring_engine::identity::{IdentityController, IDENTITY_CONTROLLER};
use keyring_engine::keyring::{KeyringController, KeyringState, KEYRING_CONTROLLER};
use keyring_engine::security::setup_memory_protection;
use keyring_engine::vault::{AesGcmEncryptor, FileVaultStore};
use std::env;
use std::sync::Arc;
use tracing::{error, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load(config_path().as_deref())?;
    init_logging(&config);
    config.validate()?;

    info!("Starting keyring-engine v{}", VERSION);

    if let Err(e) = setup_memory_protection(config.security.disable_core_dumps) {
        warn!("Could not set up memory protection: {}", e);
    }

    let store = FileVaultStore::new(&config.vault.path)?;
    let stored_vault = store.load()?;

    let keyring = Arc::new(KeyringController::new(
        Arc::new(AesGcmEncryptor::new(config.kdf_params())),
        config.keyring_patch(),
        Default::default(),
    ));
    let identities = Arc::new(IdentityController::default());

    let initial_state = stored_vault.as_ref().map(|vault| {
        serde_json::json!({ KEYRING_CONTROLLER: { "vault": vault } })
    });
    let composed = ComposableController::new(
        vec![
            ControllerHandle::Keyring(keyring.clone()),
            ControllerHandle::Identity(identities.clone()),
        ],
        initial_state,
    )?;
    info!("Composed {} and {}", KEYRING_CONTROLLER, IDENTITY_CONTROLLER);

    let persist = store.clone();
    keyring.subscribe_fn(
        Arc::new(move |state: &KeyringState| match &state.vault {
            Some(vault) => persist.save(vault),
            None => Ok(()),
        }),
        &["vault"],
    );

    let password = get_password()?;
    if stored_vault.is_some() {
        info!("Unlocking vault at {:?}", store.path());
        if let Err(e) = keyring.submit_password(&password).await {
            error!("Failed to unlock vault: {}", e);
            return Err(e);
        }
    } else if let Ok(mnemonic) = env::var("KEYRING_MNEMONIC") {
        keyring.create_new_vault_and_restore(&password, &mnemonic).await?;
    } else {
        keyring.create_new_vault_and_keychain(&password).await?;
    }

    for account in keyring.get_accounts() {
        let name = identities
            .state()
            .get(&account)
            .map(|identity| identity.name.clone())
            .unwrap_or_default();
        info!(
            "{:<14} {} {}",
            name,
            account,
            keyring.get_secondary_address(&account)
        );
    }

    let snapshot = composed.snapshot()?;
    info!(
        "Cached state covers {} controllers",
        snapshot.as_object().map(|o| o.len()).unwrap_or(0)
    );

    keyring.set_locked().await?;
    info!("keyring-engine finished");
    Ok(())
}

/// `--config <path>` from the command line
fn config_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    args.iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1).cloned())
}

fn init_logging(config: &Config) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

fn get_password() -> Result<String> {
    match env::var("KEYRING_PASSWORD") {
        Ok(password) if !password.is_empty() => {
            info!("Using vault password from environment");
            Ok(password)
        }
        _ => Err(KeyringError::ConfigError(
            "KEYRING_PASSWORD environment variable not set".to_string(),
        )),
    }
}
