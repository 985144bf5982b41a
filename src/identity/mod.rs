//! Identity registry
//!
//! User-facing account profiles keyed by checksummed address. The keyring
//! controller pushes its roster here after every mutation.

use crate::controller::{
    BaseController, ComposedController, ConfigShape, Controller, ControllerContext, StateShape,
};
use crate::crypto::to_checksum_address;
use crate::errors::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Weak;
use tracing::debug;

pub const IDENTITY_CONTROLLER: &str = "IdentityController";

/// Receiver of roster changes from the keyring controller
pub trait IdentityRegistry: Send + Sync {
    /// Replace the identity list with `addresses`, keeping known profiles
    fn update_identities(&self, addresses: &[String]) -> Result<()>;

    fn remove_identity(&self, address: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub address: String,
    pub name: String,
    /// Milliseconds since the Unix epoch
    pub import_time: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityState {
    pub identities: Vec<Identity>,
    pub selected_address: String,
}

impl IdentityState {
    pub fn get(&self, address: &str) -> Option<&Identity> {
        self.identities.iter().find(|i| i.address == address)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IdentityStatePatch {
    pub identities: Option<Vec<Identity>>,
    pub selected_address: Option<String>,
}

impl StateShape for IdentityState {
    type Patch = IdentityStatePatch;

    fn apply(&mut self, patch: IdentityStatePatch) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if let Some(identities) = patch.identities {
            self.identities = identities;
            changed.push("identities");
        }
        if let Some(selected) = patch.selected_address {
            self.selected_address = selected;
            changed.push("selectedAddress");
        }
        changed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    pub disabled: bool,
    /// Name of the first account
    pub main_account_name: String,
    /// Prefix for every later account, suffixed with a number
    pub other_account_name: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            main_account_name: "Main Account".to_string(),
            other_account_name: "Account".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdentityConfigPatch {
    pub disabled: Option<bool>,
    pub main_account_name: Option<String>,
    pub other_account_name: Option<String>,
}

impl ConfigShape for IdentityConfig {
    type Patch = IdentityConfigPatch;

    fn apply(&mut self, patch: IdentityConfigPatch, _existing_only: bool) {
        if let Some(disabled) = patch.disabled {
            self.disabled = disabled;
        }
        if let Some(name) = patch.main_account_name {
            self.main_account_name = name;
        }
        if let Some(name) = patch.other_account_name {
            self.other_account_name = name;
        }
    }

    fn disabled(&self) -> bool {
        self.disabled
    }
}

pub struct IdentityController {
    base: BaseController<IdentityConfig, IdentityState>,
}

impl Default for IdentityController {
    fn default() -> Self {
        Self::new(IdentityConfigPatch::default(), IdentityStatePatch::default())
    }
}

impl IdentityController {
    pub fn new(config: IdentityConfigPatch, state: IdentityStatePatch) -> Self {
        Self {
            base: BaseController::new(IDENTITY_CONTROLLER, config, state),
        }
    }

    /// First `"{other} N"` not already taken, N starting after the
    /// number of known profiles
    fn next_account_name(&self, taken: &[&Identity]) -> String {
        let prefix = self.base.config().other_account_name;
        let mut index = taken.len() + 1;
        loop {
            let candidate = format!("{} {}", prefix, index);
            if !taken.iter().any(|i| i.name == candidate) {
                return candidate;
            }
            index += 1;
        }
    }

    pub fn set_account_label(&self, address: &str, label: &str) -> Result<()> {
        let address = to_checksum_address(address)?;
        let state = self.base.state();
        if state.get(&address).is_none() {
            debug!("No identity for {}, label unchanged", address);
            return Ok(());
        }

        let identities = state
            .identities
            .iter()
            .cloned()
            .map(|mut identity| {
                if identity.address == address {
                    identity.name = label.to_string();
                }
                identity
            })
            .collect();

        self.base.update(
            IdentityStatePatch {
                identities: Some(identities),
                ..Default::default()
            },
            false,
        )
    }

    pub fn set_selected_address(&self, address: &str) -> Result<()> {
        let address = to_checksum_address(address)?;
        self.base.update(
            IdentityStatePatch {
                selected_address: Some(address),
                ..Default::default()
            },
            false,
        )
    }

    pub fn selected_address(&self) -> String {
        self.base.state().selected_address.clone()
    }
}

impl IdentityRegistry for IdentityController {
    fn update_identities(&self, addresses: &[String]) -> Result<()> {
        let addresses = addresses
            .iter()
            .map(|a| to_checksum_address(a))
            .collect::<Result<Vec<_>>>()?;
        let state = self.base.state();
        let main_name = self.base.config().main_account_name;

        let mut identities: Vec<Identity> = Vec::with_capacity(addresses.len());
        for (index, address) in addresses.iter().enumerate() {
            if identities.iter().any(|i| &i.address == address) {
                continue;
            }
            let identity = match state.get(address) {
                Some(existing) => existing.clone(),
                None => {
                    let name = if index == 0 {
                        main_name.clone()
                    } else {
                        let mut taken: Vec<&Identity> = identities.iter().collect();
                        for old in &state.identities {
                            if !taken.iter().any(|i| i.address == old.address) {
                                taken.push(old);
                            }
                        }
                        self.next_account_name(&taken)
                    };
                    Identity {
                        address: address.clone(),
                        name,
                        import_time: chrono::Utc::now().timestamp_millis(),
                    }
                }
            };
            identities.push(identity);
        }

        let mut selected = state.selected_address.clone();
        if !identities.iter().any(|i| i.address == selected) {
            selected = identities
                .first()
                .map(|i| i.address.clone())
                .unwrap_or_default();
        }

        debug!("Identities updated: {} profiles", identities.len());
        self.base.update(
            IdentityStatePatch {
                identities: Some(identities),
                selected_address: Some(selected),
            },
            false,
        )
    }

    fn remove_identity(&self, address: &str) -> Result<()> {
        let address = to_checksum_address(address)?;
        let state = self.base.state();
        if state.get(&address).is_none() {
            return Ok(());
        }

        let identities: Vec<Identity> = state
            .identities
            .iter()
            .filter(|i| i.address != address)
            .cloned()
            .collect();
        let selected = if state.selected_address == address {
            identities
                .first()
                .map(|i| i.address.clone())
                .unwrap_or_default()
        } else {
            state.selected_address.clone()
        };

        self.base.update(
            IdentityStatePatch {
                identities: Some(identities),
                selected_address: Some(selected),
            },
            false,
        )
    }
}

impl Controller for IdentityController {
    type Config = IdentityConfig;
    type State = IdentityState;

    fn base(&self) -> &BaseController<IdentityConfig, IdentityState> {
        &self.base
    }
}

impl ComposedController for IdentityController {
    fn name(&self) -> &'static str {
        IDENTITY_CONTROLLER
    }

    fn attach(&self, context: Weak<ControllerContext>) {
        self.base.attach_context(context);
    }

    fn rehydrate(&self, cached: &Value) -> Result<()> {
        self.base.rehydrate(cached)
    }

    fn snapshot(&self) -> Result<Value> {
        Ok(serde_json::to_value(&*self.base.state())?)
    }
}
