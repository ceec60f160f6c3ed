//! Constants shared across the crate.

/// Default number of high address bits used to select a device.
pub const DEFAULT_DEVICE_BITS: u32 = 8;

/// Width of one register word in bytes.
pub const WORD_BYTES: usize = 4;

/// Prefix of the `/dev` symlinks created by the `linux,uio-name` kernel patch.
pub const UIO_SYMLINK_PREFIX: &str = "uio_";

/// Device-tree property holding the node label.
pub const DT_LABEL_FILE: &str = "label";

/// Per-device sysfs attribute holding the physical base address of map 0.
pub const SYSFS_MAP0_ADDR: &str = "maps/map0/addr";

/// Per-device sysfs attribute holding the size in bytes of map 0.
pub const SYSFS_MAP0_SIZE: &str = "maps/map0/size";

/// Environment variables that raise discovery diagnostics to `info` level.
///
/// `UIOUHAL_DEBUG` is the name used by existing uHAL UIO deployments.
pub const DEBUG_ENV: [&str; 2] = ["UIO_AXI_DEBUG", "UIOUHAL_DEBUG"];

pub const DEFAULT_DEV_DIR: &str = "/dev";
pub const DEFAULT_SYSFS_UIO_DIR: &str = "/sys/class/uio";
pub const DEFAULT_DEVICE_TREE_DIR: &str = "/proc/device-tree";
