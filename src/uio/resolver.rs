//! UIO Device Discovery.
//!
//! Maps a logical endpoint node name to the UIO device that exposes it. Two
//! strategies exist because kernels differ:
//!
//! 1. **Symlink**: kernels carrying the `linux,uio-name` patch create
//!    `/dev/uio_<name> -> uioN`, so the device is found by name directly.
//! 2. **Device tree**: otherwise the node's `label` is searched in the device
//!    tree, the physical address is taken from the `<name>@<hex>` directory
//!    name, and the UIO device reporting that base address in sysfs is used.
//!
//! Both produce the same [`DiscoveryResult`], so mapping does not care which
//! one matched.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::sysfs;
use crate::common::constants::{DEBUG_ENV, DT_LABEL_FILE, UIO_SYMLINK_PREFIX};
use crate::common::{Result, UioError};
use crate::config::{Config, PathsConfig};

const MAX_DEVICE_TREE_DEPTH: usize = 16;

macro_rules! diag {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

/// Where a UIO device lives and how much of it to map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryResult {
    /// Physical base address reported by the kernel.
    pub base_addr: u64,
    /// Mapped size in 32-bit words.
    pub size_words: usize,
    /// Device file name under the device directory, e.g. `uio3`.
    pub uio_name: String,
}

/// A single discovery mechanism.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryStrategy {
    /// `/dev/uio_<name>` symlink created by the `linux,uio-name` kernel patch.
    Symlink,
    /// Label search in the device tree, matched against sysfs base addresses.
    DeviceTree,
}

impl DiscoveryStrategy {
    /// Runs this strategy for `node`.
    pub fn discover(self, resolver: &DeviceResolver, node: &str) -> Option<DiscoveryResult> {
        match self {
            DiscoveryStrategy::Symlink => resolver.find_by_symlink(node),
            DiscoveryStrategy::DeviceTree => resolver.find_by_device_tree(node),
        }
    }
}

/// Resolves endpoint node names to UIO devices.
#[derive(Clone, Debug)]
pub struct DeviceResolver {
    paths: PathsConfig,
    strategies: Vec<DiscoveryStrategy>,
    verbose: bool,
}

impl DeviceResolver {
    /// Creates a resolver that tries `strategies` in order.
    pub fn new(paths: PathsConfig, strategies: Vec<DiscoveryStrategy>, verbose: bool) -> Self {
        Self {
            paths,
            strategies,
            verbose,
        }
    }

    /// Builds a resolver from configuration.
    ///
    /// Verbose diagnostics are enabled by `general.verbose_discovery` or by
    /// setting `UIO_AXI_DEBUG` or `UIOUHAL_DEBUG` in the environment.
    pub fn from_config(config: &Config) -> Self {
        let verbose = config.general.verbose_discovery
            || DEBUG_ENV.iter().any(|var| std::env::var_os(var).is_some());
        Self::new(
            config.paths.clone(),
            config.discovery.strategies.clone(),
            verbose,
        )
    }

    pub fn strategies(&self) -> &[DiscoveryStrategy] {
        &self.strategies
    }

    /// Whether discovery diagnostics are logged at `info` rather than `debug`.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Finds the UIO device for `node` using the first strategy that matches.
    ///
    /// # Returns
    ///
    /// The discovery result, or `DeviceNotFound` if no strategy matched.
    pub fn resolve(&self, node: &str) -> Result<DiscoveryResult> {
        for strategy in &self.strategies {
            if let Some(found) = strategy.discover(self, node) {
                diag!(
                    self.verbose,
                    node,
                    ?strategy,
                    uio = %found.uio_name,
                    "resolved node at {:#x} ({:#x} words)",
                    found.base_addr,
                    found.size_words
                );
                return Ok(found);
            }
            diag!(self.verbose, node, ?strategy, "strategy found no device");
        }
        Err(UioError::DeviceNotFound {
            node: node.to_string(),
        })
    }

    /// Looks up `<dev_dir>/uio_<node>` and reads the sysfs maps of its target.
    pub fn find_by_symlink(&self, node: &str) -> Option<DiscoveryResult> {
        let link = self
            .paths
            .dev_dir
            .join(format!("{}{}", UIO_SYMLINK_PREFIX, node));
        diag!(self.verbose, "searching for {} symlink", link.display());

        let meta = fs::symlink_metadata(&link).ok()?;
        if !meta.file_type().is_symlink() {
            diag!(
                self.verbose,
                "{} is not a symlink, falling back",
                link.display()
            );
            return None;
        }
        let target = fs::read_link(&link).ok()?;
        let uio_name = target.file_name()?.to_str()?.to_string();

        let uio_dir = self.paths.sysfs_uio_dir.join(&uio_name);
        let Some(map) = sysfs::read_map0(&uio_dir) else {
            diag!(
                self.verbose,
                "no readable map0 for {} under {}",
                uio_name,
                uio_dir.display()
            );
            return None;
        };
        if map.size_words() == 0 {
            diag!(self.verbose, "{} reports a zero-sized map", uio_name);
            return None;
        }
        Some(DiscoveryResult {
            base_addr: map.addr,
            size_words: map.size_words(),
            uio_name,
        })
    }

    /// Searches the device tree for `node`'s label and matches its address in sysfs.
    pub fn find_by_device_tree(&self, node: &str) -> Option<DiscoveryResult> {
        diag!(self.verbose, node, "using device-tree search");
        let Some(addr) = self.search_device_tree(&self.paths.device_tree_dir, node, 0) else {
            diag!(
                self.verbose,
                "cannot find a device-tree entry labelled \"{}\"",
                node
            );
            return None;
        };

        for uio_dir in sorted_subdirs(&self.paths.sysfs_uio_dir, true) {
            let Some(map) = sysfs::read_map0(&uio_dir) else {
                continue;
            };
            if map.addr != addr {
                continue;
            }
            let uio_name = uio_dir.file_name()?.to_str()?.to_string();
            if map.size_words() == 0 {
                diag!(self.verbose, "{} reports a zero-sized map", uio_name);
                return None;
            }
            return Some(DiscoveryResult {
                base_addr: addr,
                size_words: map.size_words(),
                uio_name,
            });
        }
        diag!(
            self.verbose,
            "no UIO device reports base address {:#x} for \"{}\"",
            addr,
            node
        );
        None
    }

    /// Depth-first search for a directory whose `label` equals `node`.
    ///
    /// Returns the physical address parsed from the matching directory name.
    fn search_device_tree(&self, dir: &Path, node: &str, depth: usize) -> Option<u64> {
        if depth > MAX_DEVICE_TREE_DEPTH {
            return None;
        }
        for entry in sorted_subdirs(dir, false) {
            if label_matches(&entry, node) {
                match unit_address(&entry) {
                    Some(addr) => return Some(addr),
                    None => diag!(
                        self.verbose,
                        "directory {} has no \"@<address>\" suffix",
                        entry.display()
                    ),
                }
            }
            if let Some(addr) = self.search_device_tree(&entry, node, depth + 1) {
                return Some(addr);
            }
        }
        None
    }
}

/// Subdirectories of `dir` sorted by name.
///
/// With `follow_links` set, symlinks to directories are included (the
/// `/sys/class/uio` entries are symlinks).
fn sorted_subdirs(dir: &Path, follow_links: bool) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| match entry.file_type() {
            Ok(ft) if ft.is_dir() => true,
            Ok(ft) if ft.is_symlink() && follow_links => entry.path().is_dir(),
            _ => false,
        })
        .map(|entry| entry.path())
        .collect();
    dirs.sort();
    dirs
}

fn label_matches(dir: &Path, node: &str) -> bool {
    match fs::read(dir.join(DT_LABEL_FILE)) {
        Ok(bytes) => {
            let end = bytes
                .iter()
                .rposition(|b| *b != 0 && *b != b'\n')
                .map_or(0, |i| i + 1);
            &bytes[..end] == node.as_bytes()
        }
        Err(_) => false,
    }
}

/// Parses the hex unit address of a `name@address` directory.
fn unit_address(dir: &Path) -> Option<u64> {
    let name = dir.file_name()?.to_str()?;
    let (_, addr) = name.split_once('@')?;
    sysfs::parse_hex_u64(addr)
}
