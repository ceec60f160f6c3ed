//! Error Types.
//!
//! Every fallible operation in the crate returns [`UioError`]. Discovery
//! misses, resource acquisition failures, and per-access failures are all
//! distinct variants so callers can decide which ones are fatal.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, UioError>;

#[derive(Debug, Error)]
pub enum UioError {
    /// No discovery strategy matched the node.
    #[error("no UIO device found for node \"{node}\"")]
    DeviceNotFound { node: String },

    #[error("failed to open {}: {source}", path.display())]
    DeviceOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// `mmap` failed after a successful open; the file has been closed.
    #[error("failed to map {}: {source}", path.display())]
    DeviceMapFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no mapping for device {device} (address {address:#010x})")]
    DeviceUnmapped { device: u32, address: u32 },

    #[error("address {address:#010x} is out of mapped range (word {word:#x}, size {size:#x} words)")]
    OutOfRange { address: u32, word: u64, size: usize },

    #[error("bus error accessing register {address:#010x}")]
    BusFault { address: u32 },

    #[error("{0} is not implemented")]
    Unimplemented(&'static str),

    #[error("no UIO endpoints found; endpoints must carry an \"endpoint\" firmware-info tag")]
    NoEndpoints,

    #[error("invalid device bit width {0} (must be at most 32)")]
    InvalidDeviceBits(u32),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl UioError {
    /// Returns `true` for failures raised by a single register access.
    ///
    /// These leave the engine fully usable for subsequent operations.
    pub fn is_access_error(&self) -> bool {
        matches!(
            self,
            UioError::DeviceUnmapped { .. }
                | UioError::OutOfRange { .. }
                | UioError::BusFault { .. }
        )
    }
}
