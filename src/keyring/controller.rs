//! Keyring manager
//!
//! Owns every key container and the vault lifecycle. Mutations run under
//! one async mutex for their whole duration: the containers are cloned,
//! changed, self-checked and encrypted before the new set is committed,
//! then roster, tombstones and cross-chain pairs are published in a single
//! state update.

use crate::controller::{
    BaseController, ComposedController, ConfigShape, Controller, ControllerContext, StateShape,
};
use crate::crypto::{same_address, to_checksum_address, EthKeyPair};
use crate::errors::{KeyringError, Result};
use crate::identity::{IdentityRegistry, IDENTITY_CONTROLLER};
use crate::keyring::container::{
    deserialize_containers, serialize_containers, KeyContainer, KeyringKind,
};
use crate::keyring::entropy::{EntropyGenerator, EntropyProgress};
use crate::keyring::hd::{HdKeyring, DEFAULT_HD_PATH};
use crate::keyring::json_wallet::decrypt_v3;
use crate::keyring::mirror::{build_pairs, find_secondary, CrossChainPair, SECONDARY_HD_PATH};
use crate::keyring::simple::SimpleKeyring;
use crate::security::{
    new_password, password_matches, LockedMemory, Password, SecureBytes, SecureString,
};
use crate::signer::{
    self, KeySource, MessageParams, SignedTransaction, Transaction, TypedMessageParams,
};
use crate::vault::Encryptor;
use parking_lot::{Mutex, RwLock};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

pub const KEYRING_CONTROLLER: &str = "KeyringController";

const REQUIRED_CONTROLLERS: &[&str] = &[IDENTITY_CONTROLLER];

/// One container's visible accounts in the published roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyringSummary {
    pub accounts: Vec<String>,
    #[serde(rename = "type")]
    pub kind: KeyringKind,
    /// Position among all containers, including hidden ones
    pub index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyringState {
    pub vault: Option<String>,
    pub keyrings: Vec<KeyringSummary>,
    /// Tombstones, checksummed, in removal order
    pub removed_accounts: Vec<String>,
    pub secondary_pairs: Vec<CrossChainPair>,
    pub is_unlocked: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KeyringStatePatch {
    pub vault: Option<String>,
    pub keyrings: Option<Vec<KeyringSummary>>,
    pub removed_accounts: Option<Vec<String>>,
    pub secondary_pairs: Option<Vec<CrossChainPair>>,
    pub is_unlocked: Option<bool>,
}

impl StateShape for KeyringState {
    type Patch = KeyringStatePatch;

    fn apply(&mut self, patch: KeyringStatePatch) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if let Some(vault) = patch.vault {
            self.vault = Some(vault);
            changed.push("vault");
        }
        if let Some(keyrings) = patch.keyrings {
            self.keyrings = keyrings;
            changed.push("keyrings");
        }
        if let Some(removed) = patch.removed_accounts {
            self.removed_accounts = removed;
            changed.push("removedAccounts");
        }
        if let Some(pairs) = patch.secondary_pairs {
            self.secondary_pairs = pairs;
            changed.push("secondaryPairs");
        }
        if let Some(unlocked) = patch.is_unlocked {
            self.is_unlocked = unlocked;
            changed.push("isUnlocked");
        }
        changed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyringConfig {
    pub disabled: bool,
    /// Primary HD path, account index appended
    pub hd_path: String,
    pub secondary_enabled: bool,
    pub secondary_hd_path: String,
    /// mlock decrypted vault plaintext
    pub lock_memory: bool,
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            hd_path: DEFAULT_HD_PATH.to_string(),
            secondary_enabled: true,
            secondary_hd_path: SECONDARY_HD_PATH.to_string(),
            lock_memory: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct KeyringConfigPatch {
    pub disabled: Option<bool>,
    pub hd_path: Option<String>,
    pub secondary_enabled: Option<bool>,
    pub secondary_hd_path: Option<String>,
    pub lock_memory: Option<bool>,
}

impl ConfigShape for KeyringConfig {
    type Patch = KeyringConfigPatch;

    fn apply(&mut self, patch: KeyringConfigPatch, _existing_only: bool) {
        if let Some(disabled) = patch.disabled {
            self.disabled = disabled;
        }
        if let Some(path) = patch.hd_path {
            self.hd_path = path;
        }
        if let Some(enabled) = patch.secondary_enabled {
            self.secondary_enabled = enabled;
        }
        if let Some(path) = patch.secondary_hd_path {
            self.secondary_hd_path = path;
        }
        if let Some(lock) = patch.lock_memory {
            self.lock_memory = lock;
        }
    }

    fn disabled(&self) -> bool {
        self.disabled
    }
}

/// How `import_account_with_strategy` interprets its arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountImportStrategy {
    /// `[hex_key]`
    PrivateKey,
    /// `[keystore_json, passphrase]`
    Json,
}

impl FromStr for AccountImportStrategy {
    type Err = KeyringError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "privateKey" => Ok(Self::PrivateKey),
            "json" => Ok(Self::Json),
            other => Err(KeyringError::UnsupportedImportStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for AccountImportStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrivateKey => f.write_str("privateKey"),
            Self::Json => f.write_str("json"),
        }
    }
}

type TransitionListener = Arc<dyn Fn() + Send + Sync>;

/// Secrets held while unlocked
#[derive(Default)]
struct Session {
    keyrings: Vec<KeyContainer>,
    password: Option<Password>,
}

pub struct KeyringController {
    base: BaseController<KeyringConfig, KeyringState>,
    op_lock: tokio::sync::Mutex<()>,
    session: RwLock<Session>,
    encryptor: Arc<dyn Encryptor>,
    identities: RwLock<Option<Arc<dyn IdentityRegistry>>>,
    lock_listeners: Mutex<Vec<TransitionListener>>,
    unlock_listeners: Mutex<Vec<TransitionListener>>,
    entropy: Mutex<EntropyGenerator>,
}

/// Visible accounts per container; containers with nothing visible are left out
fn build_roster(keyrings: &[KeyContainer], removed: &[String]) -> Vec<KeyringSummary> {
    keyrings
        .iter()
        .enumerate()
        .filter_map(|(index, container)| {
            let accounts = visible(container.accounts(), removed);
            (!accounts.is_empty()).then(|| KeyringSummary {
                accounts,
                kind: container.kind(),
                index,
            })
        })
        .collect()
}

fn visible(accounts: Vec<String>, removed: &[String]) -> Vec<String> {
    accounts
        .into_iter()
        .filter(|account| !is_tombstoned(removed, account))
        .collect()
}

fn is_tombstoned(removed: &[String], address: &str) -> bool {
    removed.iter().any(|r| same_address(r, address))
}

/// Rebuild the primary container from its own secret and compare accounts
fn verify_primary(keyrings: &[KeyContainer]) -> Result<()> {
    let primary = keyrings
        .first()
        .ok_or(KeyringError::NoKeyringFound { index: 0 })?;
    let accounts = primary.accounts();
    if accounts.is_empty() {
        return Err(KeyringError::EmptyKeyring);
    }

    let rebuilt = KeyContainer::deserialize(&primary.serialize())?.accounts();
    if rebuilt.len() != accounts.len() {
        return Err(KeyringError::SeedPhraseMismatch(format!(
            "restored {} accounts, expected {}",
            rebuilt.len(),
            accounts.len()
        )));
    }
    if let Some((got, expected)) = rebuilt
        .iter()
        .zip(&accounts)
        .find(|(got, expected)| !same_address(got, expected))
    {
        return Err(KeyringError::SeedPhraseMismatch(format!(
            "restored {} in place of {}",
            got, expected
        )));
    }
    Ok(())
}

impl KeyringController {
    pub fn new(
        encryptor: Arc<dyn Encryptor>,
        config: KeyringConfigPatch,
        state: KeyringStatePatch,
    ) -> Self {
        Self {
            base: BaseController::new(KEYRING_CONTROLLER, config, state),
            op_lock: tokio::sync::Mutex::new(()),
            session: RwLock::new(Session::default()),
            encryptor,
            identities: RwLock::new(None),
            lock_listeners: Mutex::new(Vec::new()),
            unlock_listeners: Mutex::new(Vec::new()),
            entropy: Mutex::new(EntropyGenerator::new()),
        }
    }

    /// Wire an identity registry without going through composition
    pub fn set_identity_registry(&self, registry: Arc<dyn IdentityRegistry>) {
        *self.identities.write() = Some(registry);
    }

    fn identity_registry(&self) -> Option<Arc<dyn IdentityRegistry>> {
        self.identities.read().clone()
    }

    fn sync_identities(&self) -> Result<()> {
        match self.identity_registry() {
            Some(registry) => registry.update_identities(&self.get_accounts()),
            None => {
                debug!("No identity registry attached, skipping identity sync");
                Ok(())
            }
        }
    }

    fn wipe_identities(&self) -> Result<()> {
        match self.identity_registry() {
            Some(registry) => registry.update_identities(&[]),
            None => Ok(()),
        }
    }

    fn held_password(&self) -> Result<Zeroizing<String>> {
        self.session
            .read()
            .password
            .as_ref()
            .map(|p| Zeroizing::new(p.expose_secret().to_string()))
            .ok_or(KeyringError::Locked)
    }

    fn tombstones(&self) -> Vec<String> {
        self.base.state().removed_accounts.clone()
    }

    async fn encrypt(&self, password: Zeroizing<String>, plaintext: SecureBytes) -> Result<String> {
        let encryptor = self.encryptor.clone();
        tokio::task::spawn_blocking(move || encryptor.encrypt(&password, plaintext.expose()))
            .await
            .map_err(|e| KeyringError::InternalError(format!("Vault encryption task: {}", e)))?
    }

    async fn decrypt(&self, password: Zeroizing<String>, vault: String) -> Result<LockedMemory> {
        let encryptor = self.encryptor.clone();
        let lock = self.base.config().lock_memory;
        tokio::task::spawn_blocking(move || -> Result<LockedMemory> {
            let plaintext = encryptor.decrypt(&password, &vault)?;
            Ok(LockedMemory::from_vec(plaintext.expose().to_vec(), lock))
        })
        .await
        .map_err(|e| KeyringError::InternalError(format!("Vault decryption task: {}", e)))?
    }

    /// Self-check, encrypt and install `keyrings`, then publish.
    async fn commit(
        &self,
        keyrings: Vec<KeyContainer>,
        password: Zeroizing<String>,
        removed_accounts: Vec<String>,
    ) -> Result<String> {
        verify_primary(&keyrings)?;
        let plaintext = serialize_containers(&keyrings)?;
        let vault = self.encrypt(password.clone(), plaintext).await?;

        let was_unlocked = {
            let mut session = self.session.write();
            let was_unlocked = session.password.is_some();
            session.keyrings = keyrings;
            session.password = Some(new_password(&password));
            was_unlocked
        };
        debug!("Vault persisted ({} bytes)", vault.len());

        // The new session is installed even when a listener rejects the update
        let published = self.full_update(Some(vault.clone()), removed_accounts);
        if !was_unlocked {
            self.emit_unlock();
        }
        published.map(|_| vault)
    }

    /// Recompute roster and cross-chain pairs and publish them with the
    /// given tombstones. A `None` vault leaves the stored blob as is.
    fn full_update(&self, vault: Option<String>, removed_accounts: Vec<String>) -> Result<()> {
        let config = self.base.config();
        let (keyrings, pairs, unlocked) = {
            let session = self.session.read();
            let roster = build_roster(&session.keyrings, &removed_accounts);
            let pairs = if config.secondary_enabled {
                build_pairs(&session.keyrings, &config.secondary_hd_path)
            } else {
                Vec::new()
            };
            (roster, pairs, session.password.is_some())
        };

        self.base.update(
            KeyringStatePatch {
                vault,
                keyrings: Some(keyrings),
                removed_accounts: Some(removed_accounts),
                secondary_pairs: Some(pairs),
                is_unlocked: Some(unlocked),
            },
            false,
        )
    }

    fn emit_lock(&self) {
        info!("Keyring locked");
        let listeners = self.lock_listeners.lock().clone();
        listeners.iter().for_each(|listener| listener());
    }

    fn emit_unlock(&self) {
        info!("Keyring unlocked");
        let listeners = self.unlock_listeners.lock().clone();
        listeners.iter().for_each(|listener| listener());
    }

    pub fn on_lock<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.lock_listeners.lock().push(Arc::new(listener));
    }

    pub fn on_unlock<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.unlock_listeners.lock().push(Arc::new(listener));
    }

    async fn create_vault(&self, password: &str, container: KeyContainer) -> Result<String> {
        self.wipe_identities()?;
        let vault = self
            .commit(vec![container], Zeroizing::new(password.to_string()), Vec::new())
            .await?;
        self.sync_identities()?;
        Ok(vault)
    }

    /// Replace everything with a fresh mnemonic holding one account.
    pub async fn create_new_vault_and_keychain(&self, password: &str) -> Result<String> {
        let _guard = self.op_lock.lock().await;
        let container = KeyContainer::Hd(HdKeyring::generate(&self.base.config().hd_path)?);
        let vault = self.create_vault(password, container).await?;
        info!("Created new vault");
        Ok(vault)
    }

    /// Replace everything with one account restored from `mnemonic`.
    pub async fn create_new_vault_and_restore(&self, password: &str, mnemonic: &str) -> Result<String> {
        let _guard = self.op_lock.lock().await;
        let hd_path = self.base.config().hd_path;
        let container = KeyContainer::Hd(HdKeyring::restore(mnemonic, 1, &hd_path)?);
        let vault = self.create_vault(password, container).await?;
        info!("Restored vault from mnemonic");
        Ok(vault)
    }

    /// Replace everything with a single imported key.
    pub async fn create_vault_by_private_key(&self, password: &str, private_key: &str) -> Result<String> {
        let _guard = self.op_lock.lock().await;
        let container = KeyContainer::Simple(SimpleKeyring::from_private_keys(&[private_key])?);
        let vault = self.create_vault(password, container).await?;
        info!("Created vault from private key");
        Ok(vault)
    }

    /// Add an account to the HD container at `keyring_index`. A tombstoned
    /// account of that container is restored before any new index is
    /// derived.
    pub async fn add_new_account(&self, keyring_index: usize) -> Result<String> {
        let address = self.add_account(keyring_index, true).await?;
        self.sync_identities()?;
        Ok(address)
    }

    /// Derive the next account without touching identities.
    pub async fn add_new_account_without_update(&self, keyring_index: usize) -> Result<String> {
        self.add_account(keyring_index, false).await
    }

    async fn add_account(&self, keyring_index: usize, restore_removed: bool) -> Result<String> {
        let _guard = self.op_lock.lock().await;
        let password = self.held_password()?;
        let mut keyrings = self.session.read().keyrings.clone();
        let mut removed = self.tombstones();

        let (address, derived) = {
            let container = keyrings
                .get_mut(keyring_index)
                .ok_or(KeyringError::NoKeyringFound {
                    index: keyring_index,
                })?;
            let kind = container.kind();
            let KeyContainer::Hd(hd) = container else {
                return Err(KeyringError::UnsupportedKeyringOperation {
                    index: keyring_index,
                    kind: kind.to_string(),
                });
            };

            let tombstone = if restore_removed {
                removed.iter().position(|r| hd.key_for(r).is_some())
            } else {
                None
            };
            match tombstone {
                Some(position) => (removed.remove(position), false),
                None => {
                    let added = hd.add_accounts(1)?;
                    let address = added.into_iter().next().ok_or_else(|| {
                        KeyringError::DerivationFailed("No account derived".to_string())
                    })?;
                    (address, true)
                }
            }
        };

        if derived {
            self.commit(keyrings, password, removed).await?;
            info!("Derived account {} in keyring {}", address, keyring_index);
        } else {
            verify_primary(&self.session.read().keyrings)?;
            self.full_update(None, removed)?;
            info!("Restored removed account {}", address);
        }
        Ok(address)
    }

    /// Import one account. Returns its address.
    ///
    /// `privateKey` takes `[hex_key]`; `json` takes `[keystore, passphrase]`.
    pub async fn import_account_with_strategy(&self, strategy: &str, args: &[&str]) -> Result<String> {
        let strategy: AccountImportStrategy = strategy.parse()?;
        let _guard = self.op_lock.lock().await;
        let password = self.held_password()?;

        let candidate = match strategy {
            AccountImportStrategy::PrivateKey => {
                let key = args
                    .first()
                    .filter(|key| !key.trim().is_empty())
                    .ok_or_else(|| KeyringError::InvalidKeyFormat("Cannot import an empty key".into()))?;
                SimpleKeyring::from_private_keys(&[*key])?
            }
            AccountImportStrategy::Json => {
                let input = args
                    .first()
                    .ok_or_else(|| KeyringError::InvalidKeyFormat("Missing keystore JSON".into()))?;
                let passphrase = args.get(1).copied().unwrap_or_default();
                let secret = decrypt_v3(input, passphrase)?;
                SimpleKeyring::new(vec![EthKeyPair::from_bytes(secret.expose())?])
            }
        };

        let address = self
            .import_container(KeyContainer::Simple(candidate), password)
            .await?;
        info!("Imported account {} via {}", address, strategy);
        Ok(address)
    }

    /// Import the first account of `mnemonic` as a new HD container.
    pub async fn import_account_with_seed(&self, mnemonic: &str) -> Result<String> {
        let _guard = self.op_lock.lock().await;
        let password = self.held_password()?;
        let hd_path = self.base.config().hd_path;
        let candidate = HdKeyring::restore(mnemonic, 1, &hd_path)?;

        let address = self
            .import_container(KeyContainer::Hd(candidate), password)
            .await?;
        info!("Imported seed account {}", address);
        Ok(address)
    }

    async fn import_container(&self, candidate: KeyContainer, password: Zeroizing<String>) -> Result<String> {
        let accounts = candidate.accounts();
        let first = accounts.first().cloned().ok_or(KeyringError::EmptyKeyring)?;
        let mut removed = self.tombstones();

        if accounts.iter().all(|a| is_tombstoned(&removed, a)) {
            removed.retain(|r| !accounts.iter().any(|a| same_address(a, r)));
            self.full_update(None, removed)?;
        } else {
            let existing = self.all_accounts();
            if let Some(duplicate) = accounts
                .iter()
                .find(|a| existing.iter().any(|e| same_address(e, a)))
            {
                return Err(KeyringError::DuplicateAccount {
                    address: duplicate.clone(),
                });
            }

            let mut keyrings = self.session.read().keyrings.clone();
            keyrings.push(candidate);
            self.commit(keyrings, password, removed).await?;
        }

        self.sync_identities()?;
        Ok(first)
    }

    /// Hide `address` behind a tombstone. Its key stays in the vault.
    pub async fn remove_account(&self, address: &str) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        let address = to_checksum_address(address)?;
        if !self.session.read().keyrings.iter().any(|k| k.owns(&address)) {
            return Err(KeyringError::AccountNotFound { address });
        }

        if let Some(registry) = self.identity_registry() {
            registry.remove_identity(&address)?;
        }

        let mut removed = self.tombstones();
        if !removed.contains(&address) {
            removed.push(address.clone());
        }
        self.full_update(None, removed)?;
        info!("Removed account {}", address);
        Ok(())
    }

    /// Detach the container at `keyring_index` and release its tombstones.
    pub async fn remove_keyring(&self, keyring_index: usize) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        let password = self.held_password()?;
        let mut keyrings = self.session.read().keyrings.clone();

        if keyrings.len() <= 1 {
            return Err(KeyringError::LastKeyringRemovalForbidden);
        }
        if keyring_index >= keyrings.len() {
            return Err(KeyringError::NoKeyringFound {
                index: keyring_index,
            });
        }

        let detached = keyrings.remove(keyring_index);
        let released = detached.accounts();
        let mut removed = self.tombstones();
        removed.retain(|r| !released.iter().any(|a| same_address(a, r)));

        self.commit(keyrings, password, removed).await?;
        self.sync_identities()?;
        info!("Removed keyring {} ({})", keyring_index, detached.kind());
        Ok(())
    }

    pub fn export_seed_phrase(&self, password: &str, keyring_index: usize) -> Result<SecureString> {
        let session = self.session.read();
        if !password_matches(session.password.as_ref(), password) {
            return Err(KeyringError::InvalidPassword);
        }
        let container = session
            .keyrings
            .get(keyring_index)
            .ok_or(KeyringError::NoKeyringFound {
                index: keyring_index,
            })?;
        container
            .mnemonic()
            .cloned()
            .ok_or_else(|| KeyringError::UnsupportedKeyringOperation {
                index: keyring_index,
                kind: container.kind().to_string(),
            })
    }

    /// Private key of `address` as unprefixed hex
    pub fn export_account(&self, password: &str, address: &str) -> Result<SecureString> {
        let session = self.session.read();
        if !password_matches(session.password.as_ref(), password) {
            return Err(KeyringError::InvalidPassword);
        }
        let container = session
            .keyrings
            .iter()
            .find(|k| k.owns(address))
            .ok_or_else(|| KeyringError::AccountNotFound {
                address: address.to_string(),
            })?;
        let secret = container.export_key(address)?;
        Ok(SecureString::new(hex::encode(secret.expose())))
    }

    /// Decrypt the stored vault and load its containers.
    pub async fn submit_password(&self, password: &str) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        let vault = self.base.state().vault.clone().ok_or(KeyringError::VaultNotFound)?;
        let plaintext = self.decrypt(Zeroizing::new(password.to_string()), vault).await?;
        let keyrings = deserialize_containers(plaintext.as_slice())?;
        drop(plaintext);

        let was_unlocked = {
            let mut session = self.session.write();
            let was_unlocked = session.password.is_some();
            session.keyrings = keyrings;
            session.password = Some(new_password(password));
            was_unlocked
        };

        let published = self.full_update(None, self.tombstones());
        let synced = self.sync_identities();
        if !was_unlocked {
            self.emit_unlock();
        }
        published.and(synced)
    }

    /// Check `password` against the stored vault without changing anything.
    pub async fn verify_password(&self, password: &str) -> Result<()> {
        let vault = self.base.state().vault.clone().ok_or(KeyringError::VaultNotFound)?;
        self.decrypt(Zeroizing::new(password.to_string()), vault).await?;
        Ok(())
    }

    /// Drop every secret held in memory.
    pub async fn set_locked(&self) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        let was_unlocked = {
            let mut session = self.session.write();
            let was_unlocked = session.password.is_some();
            session.keyrings.clear();
            session.password = None;
            was_unlocked
        };

        let published = self.full_update(None, self.tombstones());
        if was_unlocked {
            self.emit_lock();
        }
        published
    }

    pub async fn change_password(&self, current: &str, next: &str) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        let keyrings = {
            let session = self.session.read();
            if !password_matches(session.password.as_ref(), current) {
                return Err(KeyringError::InvalidPassword);
            }
            session.keyrings.clone()
        };

        self.commit(keyrings, Zeroizing::new(next.to_string()), self.tombstones())
            .await?;
        info!("Vault password changed");
        Ok(())
    }

    /// Put a previously produced vault blob back into state.
    pub async fn revert_vault(&self, vault: &str) -> Result<()> {
        let _guard = self.op_lock.lock().await;
        warn!("Reverting vault to a previous blob");
        self.base.update(
            KeyringStatePatch {
                vault: Some(vault.to_string()),
                ..Default::default()
            },
            false,
        )
    }

    /// Self-check the primary container against its own secret.
    pub fn verify_seed_phrase(&self) -> Result<()> {
        verify_primary(&self.session.read().keyrings)
    }

    pub fn is_unlocked(&self) -> bool {
        self.session.read().password.is_some()
    }

    fn all_accounts(&self) -> Vec<String> {
        self.session
            .read()
            .keyrings
            .iter()
            .flat_map(KeyContainer::accounts)
            .collect()
    }

    /// Every visible account across containers, in container order
    pub fn get_accounts(&self) -> Vec<String> {
        visible(self.all_accounts(), &self.tombstones())
    }

    pub fn get_keyring_accounts(&self, keyring_index: usize) -> Result<Vec<String>> {
        let accounts = self
            .session
            .read()
            .keyrings
            .get(keyring_index)
            .map(KeyContainer::accounts)
            .ok_or(KeyringError::NoKeyringFound {
                index: keyring_index,
            })?;
        Ok(visible(accounts, &self.tombstones()))
    }

    /// Secondary-chain address paired with `primary`, or `""`
    pub fn get_secondary_address(&self, primary: &str) -> String {
        find_secondary(&self.base.state().secondary_pairs, primary).to_string()
    }

    pub fn reset_entropy_generator(&self, length: usize) {
        self.entropy.lock().reset(length);
    }

    pub fn append_entropy_sample(&self, x: f64, y: f64) -> Result<EntropyProgress> {
        self.entropy.lock().append(x, y)
    }

    pub fn sign_message(&self, params: &MessageParams) -> Result<String> {
        signer::sign_message(self, params)
    }

    pub fn sign_personal_message(&self, params: &MessageParams) -> Result<String> {
        signer::sign_personal_message(self, params)
    }

    pub fn sign_typed_message(&self, params: &TypedMessageParams, version: &str) -> Result<String> {
        signer::sign_typed_message(self, params, version)
    }

    pub fn sign_transaction(&self, tx: &Transaction, from: &str) -> Result<SignedTransaction> {
        signer::sign_transaction(self, tx, from)
    }
}

impl KeySource for KeyringController {
    fn export_signing_key(&self, address: &str) -> Result<SecureBytes> {
        let session = self.session.read();
        if session.password.is_none() {
            return Err(KeyringError::Locked);
        }
        session
            .keyrings
            .iter()
            .find(|k| k.owns(address))
            .ok_or_else(|| KeyringError::AccountNotFound {
                address: address.to_string(),
            })?
            .export_key(address)
    }
}

impl Controller for KeyringController {
    type Config = KeyringConfig;
    type State = KeyringState;

    fn base(&self) -> &BaseController<KeyringConfig, KeyringState> {
        &self.base
    }

    fn required_controllers(&self) -> &'static [&'static str] {
        REQUIRED_CONTROLLERS
    }
}

impl ComposedController for KeyringController {
    fn name(&self) -> &'static str {
        KEYRING_CONTROLLER
    }

    fn required_controllers(&self) -> &'static [&'static str] {
        REQUIRED_CONTROLLERS
    }

    fn attach(&self, context: Weak<ControllerContext>) {
        self.base.attach_context(context);
    }

    /// Only the vault and tombstones survive a restart; everything else is
    /// recomputed on unlock.
    fn rehydrate(&self, cached: &Value) -> Result<()> {
        let cached: KeyringStatePatch = serde_json::from_value(cached.clone())?;
        self.base.update(
            KeyringStatePatch {
                vault: cached.vault,
                removed_accounts: cached.removed_accounts,
                ..Default::default()
            },
            false,
        )
    }

    fn snapshot(&self) -> Result<Value> {
        let state = self.base.state();
        Ok(serde_json::json!({
            "vault": state.vault,
            "removedAccounts": state.removed_accounts,
        }))
    }

    fn on_composed(&self) -> Result<()> {
        let context = self
            .base
            .context()
            .ok_or_else(|| KeyringError::InternalError("Composed without a context".into()))?;
        if let Some(registry) = context
            .get(IDENTITY_CONTROLLER)
            .and_then(|handle| handle.identity_registry())
        {
            self.set_identity_registry(registry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ComposableController, ControllerHandle, Stateful};
    use crate::identity::IdentityController;
    use crate::keyring::hd::TEST_MNEMONIC;
    use crate::keyring::json_wallet::scrypt_keystore;
    use crate::vault::encryptor::test_encryptor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PASSWORD: &str = "correct horse battery staple";
    const HARDHAT_0: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const HARDHAT_1: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
    const COW_KEY: &str = "0xc85ef7d79691fe79573b1a7064c19c1a9819ebdbd1faaab1a8ec92344438aaf4";
    const COW_ADDRESS: &str = "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826";

    fn controller() -> KeyringController {
        KeyringController::new(
            Arc::new(test_encryptor()),
            KeyringConfigPatch {
                lock_memory: Some(false),
                ..Default::default()
            },
            KeyringStatePatch::default(),
        )
    }

    async fn restored() -> KeyringController {
        let keyring = controller();
        keyring
            .create_new_vault_and_restore(PASSWORD, TEST_MNEMONIC)
            .await
            .unwrap();
        keyring
    }

    #[tokio::test]
    async fn test_restore_is_deterministic() {
        let a = restored().await;
        let b = restored().await;
        for _ in 0..4 {
            a.add_new_account(0).await.unwrap();
            b.add_new_account(0).await.unwrap();
        }
        assert_eq!(a.get_accounts().len(), 5);
        assert_eq!(a.get_accounts(), b.get_accounts());
        assert_eq!(a.get_accounts()[0], HARDHAT_0);
        assert_eq!(a.get_accounts()[1], HARDHAT_1);
    }

    #[tokio::test]
    async fn test_removed_account_is_restored_not_rederived() {
        let keyring = restored().await;
        let second = keyring.add_new_account(0).await.unwrap();
        assert_eq!(second, HARDHAT_1);

        keyring.remove_account(&second.to_lowercase()).await.unwrap();
        assert_eq!(keyring.get_accounts(), vec![HARDHAT_0.to_string()]);
        assert_eq!(keyring.state().removed_accounts, vec![HARDHAT_1.to_string()]);

        let again = keyring.add_new_account(0).await.unwrap();
        assert_eq!(again, HARDHAT_1);
        assert!(keyring.state().removed_accounts.is_empty());
        assert_eq!(keyring.get_keyring_accounts(0).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_account_lifecycle_scenario() {
        let keyring = controller();
        keyring.create_new_vault_and_keychain(PASSWORD).await.unwrap();
        let first = keyring.get_accounts();
        assert_eq!(first.len(), 1);

        let second = keyring.add_new_account(0).await.unwrap();
        assert_ne!(second, first[0]);
        assert_eq!(keyring.get_accounts().len(), 2);

        keyring.remove_account(&second).await.unwrap();
        assert_eq!(keyring.get_accounts(), first);

        assert_eq!(keyring.add_new_account(0).await.unwrap(), second);
        assert_eq!(keyring.get_accounts().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_keyring() {
        let keyring = restored().await;
        assert!(matches!(
            keyring.remove_keyring(0).await,
            Err(KeyringError::LastKeyringRemovalForbidden)
        ));

        keyring
            .import_account_with_strategy("privateKey", &[COW_KEY])
            .await
            .unwrap();
        keyring.remove_account(COW_ADDRESS).await.unwrap();
        assert_eq!(keyring.state().removed_accounts, vec![COW_ADDRESS.to_string()]);

        assert!(matches!(
            keyring.remove_keyring(5).await,
            Err(KeyringError::NoKeyringFound { index: 5 })
        ));
        keyring.remove_keyring(1).await.unwrap();
        assert_eq!(keyring.get_accounts(), vec![HARDHAT_0.to_string()]);
        assert!(keyring.state().removed_accounts.is_empty());
        assert_eq!(keyring.state().keyrings.len(), 1);
        assert_eq!(keyring.state().keyrings[0].kind, KeyringKind::Hd);
    }

    #[tokio::test]
    async fn test_malformed_key_leaves_roster_unchanged() {
        let keyring = restored().await;
        let before = keyring.state();

        let result = keyring
            .import_account_with_strategy("privateKey", &["0xzz"])
            .await;
        assert!(matches!(result, Err(KeyringError::InvalidKeyFormat(_))));

        let result = keyring.import_account_with_strategy("privateKey", &[]).await;
        assert!(matches!(result, Err(KeyringError::InvalidKeyFormat(_))));
        assert_eq!(*keyring.state(), *before);
    }

    #[tokio::test]
    async fn test_unknown_strategy() {
        let keyring = restored().await;
        let result = keyring.import_account_with_strategy("ledger", &[]).await;
        assert!(matches!(
            result,
            Err(KeyringError::UnsupportedImportStrategy(ref s)) if s == "ledger"
        ));
    }

    #[tokio::test]
    async fn test_duplicate_import_then_restore() {
        let keyring = restored().await;
        let imported = keyring
            .import_account_with_strategy("privateKey", &[COW_KEY])
            .await
            .unwrap();
        assert_eq!(imported, COW_ADDRESS);

        let duplicate = keyring
            .import_account_with_strategy("privateKey", &[COW_KEY])
            .await;
        assert!(matches!(duplicate, Err(KeyringError::DuplicateAccount { .. })));

        keyring.remove_account(COW_ADDRESS).await.unwrap();
        assert!(!keyring.get_accounts().contains(&COW_ADDRESS.to_string()));

        let restored = keyring
            .import_account_with_strategy("privateKey", &[COW_KEY])
            .await
            .unwrap();
        assert_eq!(restored, COW_ADDRESS);
        assert!(keyring.get_accounts().contains(&COW_ADDRESS.to_string()));
        assert!(keyring.state().removed_accounts.is_empty());
        assert_eq!(keyring.state().keyrings.len(), 2);
    }

    #[tokio::test]
    async fn test_seed_import_duplicate_of_primary() {
        let keyring = restored().await;
        let result = keyring.import_account_with_seed(TEST_MNEMONIC).await;
        assert!(matches!(
            result,
            Err(KeyringError::DuplicateAccount { ref address }) if address == HARDHAT_0
        ));
    }

    #[tokio::test]
    async fn test_json_keystore_import() {
        let keyring = restored().await;
        let json = scrypt_keystore();

        let wrong = keyring
            .import_account_with_strategy("json", &[&json, "nope"])
            .await;
        assert!(matches!(wrong, Err(KeyringError::InvalidPassword)));

        let address = keyring
            .import_account_with_strategy("json", &[&json, "testpassword"])
            .await
            .unwrap();
        assert_eq!(address, COW_ADDRESS);
        assert_eq!(keyring.state().keyrings[1].kind, KeyringKind::Simple);
    }

    #[tokio::test]
    async fn test_mirror_pairs_match_primary_counts() {
        let keyring = restored().await;
        keyring.add_new_account(0).await.unwrap();
        keyring
            .import_account_with_strategy("privateKey", &[COW_KEY])
            .await
            .unwrap();

        let state = keyring.state();
        for summary in &state.keyrings {
            let pairs = state
                .secondary_pairs
                .iter()
                .filter(|p| p.keyring_index == summary.index)
                .count();
            assert!(pairs == 0 || pairs == summary.accounts.len());
        }
        assert_eq!(state.secondary_pairs.len(), 3);

        assert_eq!(
            keyring.get_secondary_address(&HARDHAT_0.to_lowercase()),
            "TWer2Ygk5TEheHp3TPuYeqxmB6SsGZmaL6"
        );
        assert_eq!(
            keyring.get_secondary_address(HARDHAT_1),
            "TPjjvMwjPoDC32V2dGDYTkLH4E5LAtBZ6C"
        );
        assert_eq!(
            keyring.get_secondary_address(COW_ADDRESS),
            "TUg28KYvCXWW81EqMUeZvCZmZw2BChk1HQ"
        );
        assert_eq!(
            keyring.get_secondary_address("0x0000000000000000000000000000000000000001"),
            ""
        );
    }

    #[tokio::test]
    async fn test_mirror_disabled() {
        let keyring = controller();
        keyring.base().configure(
            KeyringConfigPatch {
                secondary_enabled: Some(false),
                ..Default::default()
            },
            false,
            true,
        );
        keyring
            .create_new_vault_and_restore(PASSWORD, TEST_MNEMONIC)
            .await
            .unwrap();
        assert!(keyring.state().secondary_pairs.is_empty());
        assert_eq!(keyring.get_secondary_address(HARDHAT_0), "");
    }

    #[tokio::test]
    async fn test_lock_unlock_transitions() {
        let keyring = controller();
        let locks = Arc::new(AtomicUsize::new(0));
        let unlocks = Arc::new(AtomicUsize::new(0));
        let lock_hits = locks.clone();
        keyring.on_lock(move || {
            lock_hits.fetch_add(1, Ordering::SeqCst);
        });
        let unlock_hits = unlocks.clone();
        keyring.on_unlock(move || {
            unlock_hits.fetch_add(1, Ordering::SeqCst);
        });

        keyring
            .create_new_vault_and_restore(PASSWORD, TEST_MNEMONIC)
            .await
            .unwrap();
        keyring.add_new_account(0).await.unwrap();
        keyring.remove_account(HARDHAT_1).await.unwrap();
        assert_eq!(unlocks.load(Ordering::SeqCst), 1);

        keyring.set_locked().await.unwrap();
        keyring.set_locked().await.unwrap();
        assert_eq!(locks.load(Ordering::SeqCst), 1);
        assert!(!keyring.is_unlocked());
        assert!(!keyring.state().is_unlocked);
        assert!(keyring.state().keyrings.is_empty());
        assert!(keyring.get_accounts().is_empty());

        let wrong = keyring.submit_password("wrong password").await.unwrap_err();
        assert_eq!(wrong.kind(), crate::errors::ErrorKind::InvalidPassword);
        assert!(!keyring.is_unlocked());
        assert!(matches!(
            keyring.verify_password("wrong password").await,
            Err(KeyringError::InvalidPassword)
        ));

        keyring.submit_password(PASSWORD).await.unwrap();
        assert!(keyring.is_unlocked());
        assert_eq!(unlocks.load(Ordering::SeqCst), 2);
        assert_eq!(keyring.get_accounts(), vec![HARDHAT_0.to_string()]);
        assert_eq!(keyring.get_keyring_accounts(0).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_locked_operations() {
        let keyring = restored().await;
        keyring.set_locked().await.unwrap();

        assert!(matches!(keyring.add_new_account(0).await, Err(KeyringError::Locked)));
        assert!(matches!(
            keyring.import_account_with_strategy("privateKey", &[COW_KEY]).await,
            Err(KeyringError::Locked)
        ));
        let params = MessageParams {
            from: HARDHAT_0.to_string(),
            data: "hello".to_string(),
        };
        assert!(matches!(
            keyring.sign_personal_message(&params),
            Err(KeyringError::Locked)
        ));
        assert!(matches!(
            keyring.export_seed_phrase(PASSWORD, 0),
            Err(KeyringError::InvalidPassword)
        ));
    }

    #[tokio::test]
    async fn test_vault_required() {
        let keyring = controller();
        assert!(matches!(
            keyring.submit_password(PASSWORD).await,
            Err(KeyringError::VaultNotFound)
        ));
        assert!(matches!(
            keyring.verify_password(PASSWORD).await,
            Err(KeyringError::VaultNotFound)
        ));
    }

    #[tokio::test]
    async fn test_change_and_verify_password() {
        let keyring = restored().await;
        let vault_before = keyring.state().vault.clone();

        assert!(matches!(
            keyring.change_password("not it", "next").await,
            Err(KeyringError::InvalidPassword)
        ));
        keyring.verify_password(PASSWORD).await.unwrap();
        assert_eq!(keyring.state().vault, vault_before);

        keyring.change_password(PASSWORD, "next password").await.unwrap();
        assert_ne!(keyring.state().vault, vault_before);
        keyring.verify_password("next password").await.unwrap();
        assert!(keyring.verify_password(PASSWORD).await.is_err());

        assert!(matches!(
            keyring.export_seed_phrase(PASSWORD, 0),
            Err(KeyringError::InvalidPassword)
        ));
        let phrase = keyring.export_seed_phrase("next password", 0).unwrap();
        assert_eq!(phrase.expose(), TEST_MNEMONIC);
    }

    #[tokio::test]
    async fn test_export_account() {
        let keyring = restored().await;
        let key = keyring.export_account(PASSWORD, HARDHAT_0).unwrap();
        assert_eq!(
            key.expose(),
            "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
        );
        assert!(matches!(
            keyring.export_account("nope", HARDHAT_0),
            Err(KeyringError::InvalidPassword)
        ));
        assert!(matches!(
            keyring.export_account(PASSWORD, COW_ADDRESS),
            Err(KeyringError::AccountNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_private_key_vault() {
        let keyring = controller();
        let zero = format!("0x{}", "00".repeat(32));
        assert!(matches!(
            keyring.create_vault_by_private_key(PASSWORD, &zero).await,
            Err(KeyringError::InvalidKeyFormat(_))
        ));
        assert!(keyring.state().vault.is_none());

        keyring
            .create_vault_by_private_key(PASSWORD, COW_KEY)
            .await
            .unwrap();
        assert_eq!(keyring.get_accounts(), vec![COW_ADDRESS.to_string()]);
        assert!(matches!(
            keyring.add_new_account(0).await,
            Err(KeyringError::UnsupportedKeyringOperation { index: 0, .. })
        ));
        assert!(matches!(
            keyring.export_seed_phrase(PASSWORD, 0),
            Err(KeyringError::UnsupportedKeyringOperation { .. })
        ));
        keyring.verify_seed_phrase().unwrap();
    }

    #[tokio::test]
    async fn test_new_vault_clears_tombstones() {
        let keyring = restored().await;
        keyring.add_new_account(0).await.unwrap();
        keyring.remove_account(HARDHAT_1).await.unwrap();

        keyring
            .create_new_vault_and_restore(PASSWORD, TEST_MNEMONIC)
            .await
            .unwrap();
        assert!(keyring.state().removed_accounts.is_empty());
        assert_eq!(keyring.add_new_account(0).await.unwrap(), HARDHAT_1);
    }

    #[tokio::test]
    async fn test_vault_listener_fires() {
        let keyring = controller();
        let saved = Arc::new(AtomicUsize::new(0));
        let hits = saved.clone();
        keyring.subscribe_fn(
            Arc::new(move |state: &KeyringState| -> Result<()> {
                assert!(state.vault.is_some());
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            &["vault"],
        );

        keyring
            .create_new_vault_and_restore(PASSWORD, TEST_MNEMONIC)
            .await
            .unwrap();
        keyring.remove_account(HARDHAT_0).await.unwrap();
        assert_eq!(saved.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_snapshot_rehydrate_and_unlock() {
        let keyring = restored().await;
        keyring.add_new_account(0).await.unwrap();
        keyring.remove_account(HARDHAT_1).await.unwrap();
        let snapshot = keyring.snapshot().unwrap();
        assert!(snapshot.get("keyrings").is_none());

        let fresh = controller();
        fresh.rehydrate(&snapshot).unwrap();
        assert!(!fresh.is_unlocked());
        fresh.submit_password(PASSWORD).await.unwrap();
        assert_eq!(fresh.get_accounts(), vec![HARDHAT_0.to_string()]);
        assert_eq!(fresh.add_new_account(0).await.unwrap(), HARDHAT_1);
    }

    #[tokio::test]
    async fn test_composition_requires_identity_registry() {
        let keyring = Arc::new(controller());
        let result = ComposableController::new(vec![ControllerHandle::Keyring(keyring)], None);
        assert!(matches!(
            result,
            Err(KeyringError::MissingController { ref required, .. }) if required == IDENTITY_CONTROLLER
        ));
    }

    #[tokio::test]
    async fn test_composed_identities_follow_roster() {
        let keyring = Arc::new(controller());
        let identity = Arc::new(IdentityController::default());
        let composed = ComposableController::new(
            vec![
                ControllerHandle::Keyring(keyring.clone()),
                ControllerHandle::Identity(identity.clone()),
            ],
            None,
        )
        .unwrap();
        assert!(composed.keyring().is_some());

        keyring
            .create_new_vault_and_restore(PASSWORD, TEST_MNEMONIC)
            .await
            .unwrap();
        keyring.add_new_account(0).await.unwrap();
        let names: Vec<String> = identity
            .state()
            .identities
            .iter()
            .map(|i| i.name.clone())
            .collect();
        assert_eq!(names, vec!["Main Account", "Account 2"]);

        keyring.remove_account(HARDHAT_1).await.unwrap();
        assert_eq!(identity.state().identities.len(), 1);
        assert_eq!(identity.selected_address(), HARDHAT_0);

        keyring.add_new_account_without_update(0).await.unwrap();
        assert_eq!(identity.state().identities.len(), 1);
    }

    #[tokio::test]
    async fn test_signing_through_controller() {
        let keyring = restored().await;
        let params = TypedMessageParams {
            from: HARDHAT_0.to_string(),
            data: serde_json::json!({ "not": "an array" }),
        };
        assert!(matches!(
            keyring.sign_typed_message(&params, "V1"),
            Err(KeyringError::InvalidTypedData(_))
        ));

        let params = MessageParams {
            from: HARDHAT_0.to_lowercase(),
            data: "hello".to_string(),
        };
        let signature = keyring.sign_personal_message(&params).unwrap();
        assert_eq!(signature.len(), 132);
    }

    #[tokio::test]
    async fn test_entropy_through_controller() {
        let keyring = controller();
        assert!(matches!(
            keyring.append_entropy_sample(1.0, 2.0),
            Err(KeyringError::EntropyGenerator(crate::errors::EntropyError::NotInitialized))
        ));

        keyring.reset_entropy_generator(2);
        let progress = keyring.append_entropy_sample(10.0, 20.0).unwrap();
        assert_eq!(progress.count, 1);
        assert!(progress.mnemonic.is_none());
        let done = keyring.append_entropy_sample(-3.5, 400.0).unwrap();
        let mnemonic = done.mnemonic.unwrap();
        assert_eq!(mnemonic.split_whitespace().count(), 12);

        keyring
            .create_new_vault_and_restore(PASSWORD, &mnemonic)
            .await
            .unwrap();
        assert_eq!(keyring.get_accounts().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_vault_listener_still_reports_unlock() {
        let keyring = controller();
        let unlocks = Arc::new(AtomicUsize::new(0));
        let locks = Arc::new(AtomicUsize::new(0));
        let unlock_hits = unlocks.clone();
        keyring.on_unlock(move || {
            unlock_hits.fetch_add(1, Ordering::SeqCst);
        });
        let lock_hits = locks.clone();
        keyring.on_lock(move || {
            lock_hits.fetch_add(1, Ordering::SeqCst);
        });
        keyring.subscribe_fn(
            Arc::new(|_: &KeyringState| -> Result<()> {
                Err(KeyringError::StorageError("disk full".to_string()))
            }),
            &["vault"],
        );

        let result = keyring
            .create_new_vault_and_restore(PASSWORD, TEST_MNEMONIC)
            .await;
        assert!(matches!(result, Err(KeyringError::ListenerFailed { .. })));
        assert!(keyring.is_unlocked());
        assert!(keyring.state().vault.is_some());
        assert_eq!(unlocks.load(Ordering::SeqCst), 1);

        keyring.set_locked().await.unwrap();
        assert_eq!(locks.load(Ordering::SeqCst), 1);
        keyring.submit_password(PASSWORD).await.unwrap();
        assert_eq!(unlocks.load(Ordering::SeqCst), 2);
        assert_eq!(keyring.get_accounts(), vec![HARDHAT_0.to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_additions_are_serialized() {
        let keyring = Arc::new(restored().await);
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let keyring = keyring.clone();
                tokio::spawn(async move { keyring.add_new_account(0).await })
            })
            .collect();

        let mut added = Vec::new();
        for task in tasks {
            added.push(task.await.unwrap().unwrap());
        }

        let expected = HdKeyring::restore(TEST_MNEMONIC, 5, DEFAULT_HD_PATH)
            .unwrap()
            .accounts();
        let mut sorted = added.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 4);
        for address in &added {
            assert!(expected[1..].contains(address));
        }
        assert_eq!(keyring.get_accounts(), expected);
        assert_eq!(keyring.state().keyrings[0].accounts.len(), 5);
    }

    #[test]
    fn test_seed_self_check() {
        let mut drifted = HdKeyring::restore(TEST_MNEMONIC, 1, DEFAULT_HD_PATH).unwrap();
        drifted.push_foreign_key(EthKeyPair::from_hex(COW_KEY).unwrap());
        assert!(matches!(
            verify_primary(&[KeyContainer::Hd(drifted)]),
            Err(KeyringError::SeedPhraseMismatch(_))
        ));

        let empty = KeyContainer::Simple(SimpleKeyring::new(Vec::new()));
        assert!(matches!(verify_primary(&[empty]), Err(KeyringError::EmptyKeyring)));
        assert!(matches!(
            verify_primary(&[]),
            Err(KeyringError::NoKeyringFound { index: 0 })
        ));

        let intact = HdKeyring::restore(TEST_MNEMONIC, 3, DEFAULT_HD_PATH).unwrap();
        verify_primary(&[KeyContainer::Hd(intact)]).unwrap();
    }

    #[tokio::test]
    async fn test_failed_self_check_keeps_vault() {
        let keyring = restored().await;
        let before = keyring.state();

        let mut drifted = HdKeyring::restore(TEST_MNEMONIC, 1, DEFAULT_HD_PATH).unwrap();
        drifted.push_foreign_key(EthKeyPair::from_hex(COW_KEY).unwrap());
        let result = keyring
            .commit(
                vec![KeyContainer::Hd(drifted)],
                Zeroizing::new(PASSWORD.to_string()),
                Vec::new(),
            )
            .await;

        assert!(matches!(result, Err(KeyringError::SeedPhraseMismatch(_))));
        assert_eq!(keyring.state().vault, before.vault);
        assert_eq!(keyring.get_accounts(), vec![HARDHAT_0.to_string()]);
        keyring.submit_password(PASSWORD).await.unwrap();
        assert_eq!(keyring.get_accounts(), vec![HARDHAT_0.to_string()]);
    }
}
