//! Sysfs Attribute Helpers.
//!
//! The UIO driver publishes each device's memory maps under
//! `/sys/class/uio/uioN/maps/mapM/`. The `addr` and `size` attributes are
//! hex text terminated by a newline.

use std::fs;
use std::path::Path;

use crate::common::constants::{SYSFS_MAP0_ADDR, SYSFS_MAP0_SIZE, WORD_BYTES};

/// Memory map 0 of a UIO device as reported by sysfs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UioMap {
    /// Physical base address.
    pub addr: u64,
    /// Size in bytes.
    pub size_bytes: u64,
}

impl UioMap {
    /// Size of the map in 32-bit words.
    pub fn size_words(&self) -> usize {
        (self.size_bytes / WORD_BYTES as u64) as usize
    }
}

/// Parses kernel hex text such as `0x41200000\n`.
pub fn parse_hex_u64(text: &str) -> Option<u64> {
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Reads a single hex attribute file.
pub fn read_hex_attr(path: &Path) -> Option<u64> {
    let text = fs::read_to_string(path).ok()?;
    parse_hex_u64(&text)
}

/// Reads the physical address of map 0 for the device directory `uio_dir`.
pub fn read_map0_addr(uio_dir: &Path) -> Option<u64> {
    read_hex_attr(&uio_dir.join(SYSFS_MAP0_ADDR))
}

/// Reads both attributes of map 0 for the device directory `uio_dir`.
pub fn read_map0(uio_dir: &Path) -> Option<UioMap> {
    let addr = read_map0_addr(uio_dir)?;
    let size_bytes = read_hex_attr(&uio_dir.join(SYSFS_MAP0_SIZE))?;
    Some(UioMap { addr, size_bytes })
}
