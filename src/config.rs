use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::common::constants::{
    DEFAULT_DEVICE_BITS, DEFAULT_DEVICE_TREE_DIR, DEFAULT_DEV_DIR, DEFAULT_SYSFS_UIO_DIR,
};
use crate::common::{Result, UioError};
use crate::uio::resolver::DiscoveryStrategy;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub address: AddressConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default, rename = "node")]
    pub nodes: Vec<NodeConfig>,
}

impl Config {
    /// Reads and parses a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            UioError::Config(format!("could not read '{}': {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parses a configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| UioError::Config(e.to_string()))?;
        if config.address.device_bits > 32 {
            return Err(UioError::InvalidDeviceBits(config.address.device_bits));
        }
        if config.discovery.strategies.is_empty() {
            return Err(UioError::Config(
                "discovery.strategies must name at least one strategy".to_string(),
            ));
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeneralConfig {
    #[serde(default)]
    pub verbose_discovery: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressConfig {
    #[serde(default = "default_device_bits")]
    pub device_bits: u32,
}

impl Default for AddressConfig {
    fn default() -> Self {
        Self {
            device_bits: default_device_bits(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_dev_dir")]
    pub dev_dir: PathBuf,

    #[serde(default = "default_sysfs_uio_dir")]
    pub sysfs_uio_dir: PathBuf,

    #[serde(default = "default_device_tree_dir")]
    pub device_tree_dir: PathBuf,
}

impl PathsConfig {
    /// Builds a path set rooted under `root`, mirroring the kernel layout.
    ///
    /// Used to point discovery at a staged copy of `/dev`, `/sys` and
    /// `/proc/device-tree`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            dev_dir: root.join("dev"),
            sysfs_uio_dir: root.join("sys/class/uio"),
            device_tree_dir: root.join("proc/device-tree"),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dev_dir: default_dev_dir(),
            sysfs_uio_dir: default_sysfs_uio_dir(),
            device_tree_dir: default_device_tree_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_strategies")]
    pub strategies: Vec<DiscoveryStrategy>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
        }
    }
}

/// One entry of the flat node table.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub fwinfo: BTreeMap<String, String>,
}

impl NodeConfig {
    pub fn address_val(&self) -> Result<u32> {
        parse_hex_u32(&self.address).ok_or_else(|| {
            UioError::Config(format!(
                "node '{}' has invalid address '{}'",
                self.name, self.address
            ))
        })
    }
}

/// Parses a hexadecimal string with an optional `0x` prefix.
pub fn parse_hex_u32(s: &str) -> Option<u32> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(&s.replace('_', ""), 16).ok()
}

fn default_device_bits() -> u32 {
    DEFAULT_DEVICE_BITS
}

fn default_dev_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DEV_DIR)
}

fn default_sysfs_uio_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SYSFS_UIO_DIR)
}

fn default_device_tree_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DEVICE_TREE_DIR)
}

fn default_strategies() -> Vec<DiscoveryStrategy> {
    vec![DiscoveryStrategy::Symlink, DiscoveryStrategy::DeviceTree]
}
