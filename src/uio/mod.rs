//! UIO device discovery, mapping, and bookkeeping.
//!
//! * `resolver`: finds the UIO device behind an endpoint node.
//! * `sysfs`: reads the kernel's per-device map attributes.
//! * `mapper`: opens and memory-maps a UIO device file.
//! * `table`: the device-index keyed registry of mapped devices.

pub mod mapper;
pub mod resolver;
pub mod sysfs;
pub mod table;

pub use mapper::UioMapping;
pub use resolver::{DeviceResolver, DiscoveryResult, DiscoveryStrategy};
pub use table::{DeviceRecord, DeviceState, DeviceTable};
