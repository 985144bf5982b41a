//! Controller state substrate and composition
//!
//! - [`BaseController`]: configuration, state snapshots and listeners
//! - [`ComposableController`]: named registry and startup hooks

pub mod base;
pub mod composable;

pub use base::{
    BaseController, ConfigShape, Configurable, Controller, Listener, ListenerId, StateShape,
    Stateful,
};
pub use composable::{
    ComposableController, ComposedController, ControllerContext, ControllerHandle, ControllerRole,
};
