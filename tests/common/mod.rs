//! Shared fixture for integration tests.
//!
//! Builds a miniature copy of the kernel interfaces under a temporary
//! directory: `dev/` with plain files standing in for `/dev/uioN`,
//! `sys/class/uio/uioN/maps/map0/{addr,size}`, and `proc/device-tree/`.
//! A plain file maps just like a UIO device, and shrinking it makes accesses
//! to the mapped pages raise SIGBUS, which stands in for a dead AXI slave.

#![allow(dead_code)]

use std::fs::{self, OpenOptions};
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use uio_axi::config::{Config, PathsConfig};
use uio_axi::node::Endpoint;
use uio_axi::RegisterEngine;

/// Physical base address used by the default fixture device.
pub const FOO_PHYS: u64 = 0x4120_0000;

/// Map size of the default fixture device in bytes.
pub const FOO_BYTES: u64 = 0x1000;

/// Logical base address of `foo` with the default 8-bit device field.
pub const FOO_ADDR: u32 = 0x0100_0000;

pub struct Fixture {
    pub root: TempDir,
    pub config: Config,
}

impl Fixture {
    /// Creates an empty directory tree.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let paths = PathsConfig::under(root.path());
        fs::create_dir_all(&paths.dev_dir).unwrap();
        fs::create_dir_all(&paths.sysfs_uio_dir).unwrap();
        fs::create_dir_all(&paths.device_tree_dir).unwrap();
        let config = Config {
            paths,
            ..Config::default()
        };
        Self { root, config }
    }

    /// A tree where `foo` is `uio3` at [`FOO_PHYS`], found through its symlink.
    pub fn with_foo_symlink() -> Self {
        let fx = Self::new();
        fx.add_uio("uio3", FOO_PHYS, FOO_BYTES);
        fx.add_symlink("foo", "uio3");
        fx
    }

    /// A tree where `foo` is `uio3` at [`FOO_PHYS`], found only in the device tree.
    pub fn with_foo_device_tree() -> Self {
        let fx = Self::new();
        fx.add_uio("uio0", 0x4000_0000, 0x1000);
        fx.add_uio("uio3", FOO_PHYS, FOO_BYTES);
        fx.add_dt_node("amba_pl@0/foo@41200000", b"foo\0");
        fx
    }

    /// Adds a device file of `size` bytes and its sysfs map 0 attributes.
    pub fn add_uio(&self, uio: &str, addr: u64, size: u64) {
        let file = fs::File::create(self.device_file(uio)).unwrap();
        file.set_len(size).unwrap();
        self.add_sysfs(uio, addr, size);
    }

    /// Adds only the sysfs side of a device.
    pub fn add_sysfs(&self, uio: &str, addr: u64, size: u64) {
        let map0 = self.config.paths.sysfs_uio_dir.join(uio).join("maps/map0");
        fs::create_dir_all(&map0).unwrap();
        fs::write(map0.join("addr"), format!("{:#010x}\n", addr)).unwrap();
        fs::write(map0.join("size"), format!("{:#010x}\n", size)).unwrap();
    }

    /// Adds `dev/uio_<node> -> <uio>`.
    pub fn add_symlink(&self, node: &str, uio: &str) {
        let link = self.config.paths.dev_dir.join(format!("uio_{}", node));
        symlink(uio, link).unwrap();
    }

    /// Adds a device-tree directory (relative path) with the given `label` bytes.
    pub fn add_dt_node(&self, rel: &str, label: &[u8]) {
        let dir = self.config.paths.device_tree_dir.join(rel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("label"), label).unwrap();
    }

    pub fn dev_dir(&self) -> &Path {
        &self.config.paths.dev_dir
    }

    pub fn device_file(&self, uio: &str) -> PathBuf {
        self.config.paths.dev_dir.join(uio)
    }

    /// Resizes a device file. Shrinking it makes the dropped pages fault.
    pub fn resize(&self, uio: &str, len: u64) {
        OpenOptions::new()
            .write(true)
            .open(self.device_file(uio))
            .unwrap()
            .set_len(len)
            .unwrap();
    }

    /// Reads word `word` of a device file straight from disk.
    pub fn file_word(&self, uio: &str, word: usize) -> u32 {
        let bytes = fs::read(self.device_file(uio)).unwrap();
        let at = word * 4;
        u32::from_ne_bytes(bytes[at..at + 4].try_into().unwrap())
    }

    /// Builds an engine for the single endpoint `foo` at [`FOO_ADDR`].
    pub fn foo_engine(&self) -> RegisterEngine {
        RegisterEngine::initialize(&self.config, &[Endpoint::new("foo", FOO_ADDR)])
            .expect("engine initialization")
    }
}
