//! Register Engine.
//!
//! The public register operations. Each call decodes the logical address,
//! finds the device's mapping in the device table, bounds-checks the word
//! offset, and performs the memory access under the fault guard.
//!
//! Read-modify-write operations are not atomic with respect to other
//! accessors of the same device (another process, or hardware). Within this
//! process the fault guard's lock keeps the three accesses together.

use crate::common::{AddressCodec, BlockMode, DeviceAddress, RegisterValue, Result, UioError};
use crate::config::Config;
use crate::fault::{FaultGuard, Probe};
use crate::node::{self, Endpoint, NodeTree};
use crate::stats::AccessStats;
use crate::uio::{DeviceRecord, DeviceResolver, DeviceTable, UioMapping};

/// Direct register access to UIO-mapped AXI devices.
pub struct RegisterEngine {
    codec: AddressCodec,
    table: DeviceTable,
    guard: FaultGuard,
    stats: AccessStats,
}

impl RegisterEngine {
    /// Discovers and maps the endpoints of a node tree.
    ///
    /// Endpoints are the nodes whose firmware info carries the endpoint tag.
    pub fn from_nodes(config: &Config, tree: &dyn NodeTree) -> Result<Self> {
        let endpoints = node::select_endpoints(tree);
        Self::initialize(config, &endpoints)
    }

    /// Discovers and maps each endpoint, then installs the fault guard.
    ///
    /// # Arguments
    ///
    /// * `config` - Address split, filesystem roots, and discovery strategies
    /// * `endpoints` - Endpoint node names with their logical base addresses
    ///
    /// # Returns
    ///
    /// The engine, `NoEndpoints` if `endpoints` is empty, or the open/map
    /// error of the first device that was found but could not be mapped.
    /// Nodes that no strategy resolves are logged and left unmapped.
    pub fn initialize(config: &Config, endpoints: &[Endpoint]) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(UioError::NoEndpoints);
        }
        let codec = AddressCodec::new(config.address.device_bits)?;
        let resolver = DeviceResolver::from_config(config);
        let mut table = DeviceTable::new();

        for endpoint in endpoints {
            let index = codec.decode(endpoint.address).device;
            if let Some(existing) = table.get(index) {
                tracing::warn!(
                    device = index,
                    "node \"{}\" decodes to the same device as \"{}\"; ignoring it",
                    endpoint.name,
                    existing.hw_name
                );
                continue;
            }

            let record = match resolver.resolve(&endpoint.name) {
                Ok(found) => {
                    let mapping =
                        UioMapping::open(&config.paths.dev_dir, &found.uio_name, found.size_words)?;
                    tracing::info!(
                        device = index,
                        "mapped \"{}\" via {} (phys {:#x}, {:#x} words)",
                        endpoint.name,
                        found.uio_name,
                        found.base_addr,
                        found.size_words
                    );
                    DeviceRecord::mapped(index, &endpoint.name, found, mapping)
                }
                Err(err) => {
                    tracing::warn!(device = index, "{}; device not opened", err);
                    DeviceRecord::unmapped(index, &endpoint.name)
                }
            };
            table.insert(record);
        }

        let guard = FaultGuard::install()?;
        Ok(Self {
            codec,
            table,
            guard,
            stats: AccessStats::default(),
        })
    }

    pub fn codec(&self) -> &AddressCodec {
        &self.codec
    }

    pub fn stats(&self) -> &AccessStats {
        &self.stats
    }

    /// Device records in ascending device-index order.
    pub fn devices(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.table.iter()
    }

    pub fn device(&self, index: u32) -> Option<&DeviceRecord> {
        self.table.get(index)
    }

    /// Reads one word. The raw word is always fetched; `mask` only shapes
    /// [`RegisterValue::value`].
    pub fn read(&self, addr: u32, mask: u32) -> Result<RegisterValue> {
        let (da, mapping) = self.mapped(addr)?;
        self.check_span(addr, mapping, da, 1, BlockMode::Fixed)?;
        let raw = self
            .guard
            .protect(|probe| self.load(probe, mapping, da.device, da.word))?;
        Ok(RegisterValue::new(raw, mask))
    }

    /// Writes one word.
    pub fn write(&self, addr: u32, value: u32) -> Result<()> {
        let (da, mapping) = self.mapped(addr)?;
        self.check_span(addr, mapping, da, 1, BlockMode::Fixed)?;
        self.guard
            .protect(|probe| self.store(probe, mapping, da.device, da.word, value))
    }

    /// Reads `count` words starting at `addr`.
    ///
    /// A bus fault on any word aborts the block and reports that word's
    /// logical address.
    pub fn read_block(&self, addr: u32, count: usize, mode: BlockMode) -> Result<Vec<u32>> {
        let (da, mapping) = self.mapped(addr)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        self.check_span(addr, mapping, da, count, mode)?;
        self.guard.protect(|probe| {
            let mut values = Vec::with_capacity(count);
            let mut word = da.word;
            for _ in 0..count {
                values.push(self.load(probe, mapping, da.device, word)?);
                if mode == BlockMode::Incremental {
                    word += 1;
                }
            }
            Ok(values)
        })
    }

    /// Writes `values` starting at `addr`.
    pub fn write_block(&self, addr: u32, values: &[u32], mode: BlockMode) -> Result<()> {
        let (da, mapping) = self.mapped(addr)?;
        if values.is_empty() {
            return Ok(());
        }
        self.check_span(addr, mapping, da, values.len(), mode)?;
        self.guard.protect(|probe| {
            let mut word = da.word;
            for &value in values {
                self.store(probe, mapping, da.device, word, value)?;
                if mode == BlockMode::Incremental {
                    word += 1;
                }
            }
            Ok(())
        })
    }

    /// Computes `(value & and_term) | or_term` in place.
    ///
    /// # Returns
    ///
    /// The value read back after the write.
    pub fn rmw_bits(&self, addr: u32, and_term: u32, or_term: u32) -> Result<u32> {
        self.read_modify_write(addr, |value| (value & and_term) | or_term)
    }

    /// Adds `addend` (wrapping) in place.
    ///
    /// # Returns
    ///
    /// The value read back after the write.
    pub fn rmw_sum(&self, addr: u32, addend: i32) -> Result<u32> {
        self.read_modify_write(addr, |value| value.wrapping_add(addend as u32))
    }

    /// Byte-order transactions have no meaning for memory-mapped access.
    pub fn byte_order_transaction(&self) -> Result<()> {
        Err(UioError::Unimplemented("byte order transaction"))
    }

    /// Unmaps and closes every device and releases the SIGBUS handler.
    ///
    /// Idempotent; also run on drop. Afterwards every operation fails with
    /// `DeviceUnmapped`.
    pub fn teardown(&mut self) {
        self.table.teardown();
        self.guard.restore();
    }

    fn read_modify_write(&self, addr: u32, update: impl FnOnce(u32) -> u32) -> Result<u32> {
        let (da, mapping) = self.mapped(addr)?;
        self.check_span(addr, mapping, da, 1, BlockMode::Fixed)?;
        self.guard.protect(|probe| {
            let current = self.load(probe, mapping, da.device, da.word)?;
            self.store(probe, mapping, da.device, da.word, update(current))?;
            self.load(probe, mapping, da.device, da.word)
        })
    }

    /// Decodes `addr` and returns the live mapping of its device.
    fn mapped(&self, addr: u32) -> Result<(DeviceAddress, &UioMapping)> {
        let da = self.codec.decode(addr);
        match self.table.get(da.device).and_then(DeviceRecord::mapping) {
            Some(mapping) => Ok((da, mapping)),
            None => {
                self.stats.record_unmapped();
                Err(UioError::DeviceUnmapped {
                    device: da.device,
                    address: addr,
                })
            }
        }
    }

    /// Rejects transfers whose last word lies beyond the mapping or beyond
    /// the word field of the logical address.
    fn check_span(
        &self,
        addr: u32,
        mapping: &UioMapping,
        da: DeviceAddress,
        count: usize,
        mode: BlockMode,
    ) -> Result<()> {
        let last = u64::from(da.word) + mode.stride() * (count as u64 - 1);
        if last >= mapping.size_words() as u64 || last >= self.codec.words_per_device() {
            self.stats.record_range_error();
            return Err(UioError::OutOfRange {
                address: addr,
                word: last,
                size: mapping.size_words(),
            });
        }
        Ok(())
    }

    fn load(&self, probe: &Probe<'_>, mapping: &UioMapping, device: u32, word: u32) -> Result<u32> {
        let address = self.codec.encode(device, word);
        let ptr = mapping
            .word_ptr(word as usize)
            .ok_or(UioError::OutOfRange {
                address,
                word: u64::from(word),
                size: mapping.size_words(),
            })?;
        // SAFETY: `ptr` is an aligned word inside the live mapping.
        match unsafe { probe.read_u32(ptr) } {
            Ok(value) => {
                self.stats.record_read();
                Ok(value)
            }
            Err(_) => {
                self.stats.record_bus_fault();
                tracing::debug!("bus error reading {:#010x}", address);
                Err(UioError::BusFault { address })
            }
        }
    }

    fn store(
        &self,
        probe: &Probe<'_>,
        mapping: &UioMapping,
        device: u32,
        word: u32,
        value: u32,
    ) -> Result<()> {
        let address = self.codec.encode(device, word);
        let ptr = mapping
            .word_ptr(word as usize)
            .ok_or(UioError::OutOfRange {
                address,
                word: u64::from(word),
                size: mapping.size_words(),
            })?;
        // SAFETY: `ptr` is an aligned word inside the live mapping.
        match unsafe { probe.write_u32(ptr, value) } {
            Ok(()) => {
                self.stats.record_write();
                Ok(())
            }
            Err(_) => {
                self.stats.record_bus_fault();
                tracing::debug!("bus error writing {:#010x}", address);
                Err(UioError::BusFault { address })
            }
        }
    }
}

impl Drop for RegisterEngine {
    fn drop(&mut self) {
        self.teardown();
    }
}
