//! Direct AXI Register Access over Linux UIO.
//!
//! This crate reads and writes memory-mapped registers of AXI peripherals
//! that the kernel exposes through the userspace-I/O (UIO) driver. It
//! replaces a networked register-access protocol with plain loads and stores
//! into the mapped device windows.
//!
//! # Architecture
//!
//! * **Addressing**: a flat 32-bit logical address is split into a device
//!   index (high bits) and a word offset (low bits).
//! * **Discovery**: each endpoint node is matched to a `/dev/uioN` device,
//!   either through a `/dev/uio_<name>` symlink or by searching the device
//!   tree and sysfs.
//! * **Access**: every load and store runs under a SIGBUS guard, so a bus
//!   error becomes a typed error instead of killing the process.
//!
//! # Modules
//!
//! * `common`: Address codec, error type, and shared value types.
//! * `config`: Configuration loading and parsing.
//! * `engine`: The register engine and its operations.
//! * `fault`: SIGBUS interception for protected accesses.
//! * `node`: The address-table collaborator interface.
//! * `stats`: Access statistics.
//! * `uio`: Device discovery, mapping, and the device table.

/// Shared types, constants, and error handling.
///
/// Provides the logical address codec, the crate-wide error type, and the
/// value types exchanged with callers.
pub mod common;

/// Configuration system for filesystem roots, address split, and nodes.
///
/// Loads and parses TOML configuration files so discovery can be pointed at
/// the live kernel interfaces or at a staged copy of them.
pub mod config;

/// Register read/write/block/read-modify-write operations.
pub mod engine;

/// Bus error protection for memory-mapped accesses.
///
/// Installs the SIGBUS handler and serializes protected accesses.
pub mod fault;

/// Address-table nodes and endpoint selection.
pub mod node;

/// Access statistics collection and reporting.
pub mod stats;

/// UIO device discovery, memory mapping, and the device table.
pub mod uio;

pub use common::{AddressCodec, BlockMode, RegisterValue, Result, UioError};
pub use config::Config;
pub use engine::RegisterEngine;
pub use node::{Endpoint, NodeTable, NodeTree};
