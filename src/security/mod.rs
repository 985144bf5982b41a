//! Security utilities for memory protection and secure handling
//!
//! This module provides:
//! - Memory zeroization for exported keys, mnemonics and vault plaintext
//! - Memory locking to keep decrypted vault contents out of swap

pub mod mlock;
pub mod zeroize;

pub use mlock::{can_lock_memory, setup_memory_protection, LockedMemory};
pub use zeroize::{new_password, password_matches, Password, SecureBytes, SecureString};
