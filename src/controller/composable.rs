//! Composition root wiring named controllers together
//!
//! Startup runs in fixed phases over the ordered controller list:
//! registry build and context injection, rehydration of cached state,
//! `before_on_composed` on every controller, then `on_composed` on every
//! controller. Only the last phase can fail composition.

use crate::errors::{KeyringError, Result};
use crate::identity::{IdentityController, IdentityRegistry};
use crate::keyring::KeyringController;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// What a controller is registered as besides its name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerRole {
    Plain,
    Network { chain_id: u64 },
    Contract { chain_id: u64 },
}

/// Lifecycle hooks every composed controller provides
pub trait ComposedController: Send + Sync {
    fn name(&self) -> &'static str;

    fn role(&self) -> ControllerRole {
        ControllerRole::Plain
    }

    fn required_controllers(&self) -> &'static [&'static str] {
        &[]
    }

    /// Receive the shared sibling registry
    fn attach(&self, context: Weak<ControllerContext>);

    /// Merge previously cached state; runs before `on_composed`
    fn rehydrate(&self, cached: &Value) -> Result<()>;

    /// Serializable state for caching
    fn snapshot(&self) -> Result<Value>;

    fn before_on_composed(&self) -> Result<()> {
        Ok(())
    }

    fn on_composed(&self) -> Result<()> {
        Ok(())
    }
}

/// Tagged reference to a composed controller
#[derive(Clone)]
pub enum ControllerHandle {
    Keyring(Arc<KeyringController>),
    Identity(Arc<IdentityController>),
    External(Arc<dyn ComposedController>),
}

impl ControllerHandle {
    pub fn composed(&self) -> &dyn ComposedController {
        match self {
            ControllerHandle::Keyring(c) => c.as_ref(),
            ControllerHandle::Identity(c) => c.as_ref(),
            ControllerHandle::External(c) => c.as_ref(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.composed().name()
    }

    pub fn as_keyring(&self) -> Option<&Arc<KeyringController>> {
        match self {
            ControllerHandle::Keyring(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_identity(&self) -> Option<&Arc<IdentityController>> {
        match self {
            ControllerHandle::Identity(c) => Some(c),
            _ => None,
        }
    }

    /// The handle viewed as an identity registry, if it is one
    pub fn identity_registry(&self) -> Option<Arc<dyn IdentityRegistry>> {
        match self {
            ControllerHandle::Identity(c) => Some(c.clone() as Arc<dyn IdentityRegistry>),
            _ => None,
        }
    }
}

/// Sibling registry shared with every composed controller
#[derive(Default)]
pub struct ControllerContext {
    by_name: HashMap<&'static str, ControllerHandle>,
    networks: HashMap<u64, ControllerHandle>,
    contracts: HashMap<u64, ControllerHandle>,
}

impl ControllerContext {
    pub fn get(&self, name: &str) -> Option<&ControllerHandle> {
        self.by_name.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn network(&self, chain_id: u64) -> Option<&ControllerHandle> {
        self.networks.get(&chain_id)
    }

    pub fn contract(&self, chain_id: u64) -> Option<&ControllerHandle> {
        self.contracts.get(&chain_id)
    }
}

/// Owns the composed controllers and their shared context
pub struct ComposableController {
    controllers: Vec<ControllerHandle>,
    context: Arc<ControllerContext>,
}

impl ComposableController {
    /// Compose `controllers` in order. `initial_state` is cached state
    /// keyed by controller name.
    pub fn new(controllers: Vec<ControllerHandle>, initial_state: Option<Value>) -> Result<Self> {
        let mut context = ControllerContext::default();
        for handle in &controllers {
            match handle.composed().role() {
                ControllerRole::Network { chain_id } => {
                    context.networks.insert(chain_id, handle.clone());
                }
                ControllerRole::Contract { chain_id } => {
                    context.contracts.insert(chain_id, handle.clone());
                }
                ControllerRole::Plain => {}
            }
            context.by_name.insert(handle.name(), handle.clone());
        }
        let context = Arc::new(context);

        for handle in &controllers {
            let controller = handle.composed();
            controller.attach(Arc::downgrade(&context));

            if let Some(cached) = initial_state.as_ref().and_then(|s| s.get(controller.name())) {
                if let Err(e) = controller.rehydrate(cached) {
                    warn!("Failed to rehydrate {}: {}", controller.name(), e);
                }
            }
        }

        for handle in &controllers {
            if let Err(e) = handle.composed().before_on_composed() {
                warn!("before_on_composed failed for {}: {}", handle.name(), e);
            }
        }

        for handle in &controllers {
            let controller = handle.composed();
            for required in controller.required_controllers() {
                if !context.contains(required) {
                    return Err(KeyringError::MissingController {
                        controller: controller.name().to_string(),
                        required: required.to_string(),
                    });
                }
            }
            controller.on_composed()?;
            debug!("Composed {}", controller.name());
        }

        info!("Composed {} controllers", controllers.len());
        Ok(Self {
            controllers,
            context,
        })
    }

    pub fn controllers(&self) -> &[ControllerHandle] {
        &self.controllers
    }

    pub fn context(&self) -> &Arc<ControllerContext> {
        &self.context
    }

    pub fn get(&self, name: &str) -> Option<&ControllerHandle> {
        self.context.get(name)
    }

    pub fn keyring(&self) -> Option<Arc<KeyringController>> {
        self.controllers.iter().find_map(|h| h.as_keyring().cloned())
    }

    pub fn identity(&self) -> Option<Arc<IdentityController>> {
        self.controllers.iter().find_map(|h| h.as_identity().cloned())
    }

    /// Per-controller state keyed by name, suitable as `initial_state`
    pub fn snapshot(&self) -> Result<Value> {
        let mut out = Map::new();
        for handle in &self.controllers {
            out.insert(handle.name().to_string(), handle.composed().snapshot()?);
        }
        Ok(Value::Object(out))
    }
}
