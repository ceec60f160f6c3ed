//! Common utilities and types used throughout the UIO register engine.
//!
//! This module provides the logical address codec, the shared error type,
//! and the small value types exchanged between the engine and its callers.

/// Logical address splitting (device index / word offset).
pub mod addr;

/// Constants shared by discovery, mapping, and the codec.
pub mod constants;

/// Register access value types.
pub mod data;

/// Error taxonomy for discovery, mapping, and register access.
pub mod error;

pub use addr::{AddressCodec, DeviceAddress};
pub use data::{BlockMode, RegisterValue};
pub use error::{Result, UioError};

pub use constants::{DEFAULT_DEVICE_BITS, WORD_BYTES};
