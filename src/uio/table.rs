//! Device Table.
//!
//! Registry of every endpoint discovered at initialization, keyed by the
//! device index its logical address decodes to. The table is filled once and
//! only shrinks (to nothing mapped) at teardown.

use std::collections::btree_map::{BTreeMap, Entry};

use serde::Serialize;

use super::mapper::UioMapping;
use super::resolver::DiscoveryResult;

/// Lifecycle state of a device record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceState {
    /// Discovery did not produce a usable device.
    Unmapped,
    /// The register window is mapped and accessible.
    Mapped,
    /// Released by engine teardown.
    TornDown,
}

/// One discovered (or undiscoverable) endpoint.
#[derive(Debug)]
pub struct DeviceRecord {
    pub index: u32,
    /// Physical base address reported by the kernel; informational only.
    pub base_addr: u64,
    pub size_words: usize,
    pub hw_name: String,
    pub uio_name: String,
    mapping: Option<UioMapping>,
    torn_down: bool,
}

impl DeviceRecord {
    /// A record for a node that no discovery strategy resolved.
    pub fn unmapped(index: u32, hw_name: &str) -> Self {
        Self {
            index,
            base_addr: 0,
            size_words: 0,
            hw_name: hw_name.to_string(),
            uio_name: String::new(),
            mapping: None,
            torn_down: false,
        }
    }

    /// A record owning a live mapping.
    pub fn mapped(index: u32, hw_name: &str, found: DiscoveryResult, mapping: UioMapping) -> Self {
        Self {
            index,
            base_addr: found.base_addr,
            size_words: mapping.size_words(),
            hw_name: hw_name.to_string(),
            uio_name: found.uio_name,
            mapping: Some(mapping),
            torn_down: false,
        }
    }

    pub fn state(&self) -> DeviceState {
        match (&self.mapping, self.torn_down) {
            (_, true) => DeviceState::TornDown,
            (Some(_), false) => DeviceState::Mapped,
            (None, false) => DeviceState::Unmapped,
        }
    }

    /// The live mapping, if the record is in the `Mapped` state.
    #[inline]
    pub fn mapping(&self) -> Option<&UioMapping> {
        self.mapping.as_ref()
    }

    /// Unmaps and closes the device. Safe to call repeatedly.
    pub fn release(&mut self) {
        if let Some(mapping) = self.mapping.take() {
            tracing::debug!(device = self.index, "releasing {}", mapping.path().display());
        }
        self.torn_down = true;
    }
}

/// Map from device index to device record.
#[derive(Debug, Default)]
pub struct DeviceTable {
    records: BTreeMap<u32, DeviceRecord>,
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record unless its index is already taken.
    ///
    /// # Returns
    ///
    /// `false` if a record with the same index exists; the existing record
    /// is kept and `record` is dropped.
    pub fn insert(&mut self, record: DeviceRecord) -> bool {
        match self.records.entry(record.index) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    #[inline]
    pub fn get(&self, index: u32) -> Option<&DeviceRecord> {
        self.records.get(&index)
    }

    pub fn contains(&self, index: u32) -> bool {
        self.records.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in ascending device-index order.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.records.values()
    }

    /// Releases every record. Idempotent.
    pub fn teardown(&mut self) {
        for record in self.records.values_mut() {
            record.release();
        }
    }
}
