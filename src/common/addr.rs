//! Logical Address Codec.
//!
//! A logical register address is a flat 32-bit value. The top `N` bits pick
//! the device (one UIO mapping per device) and the remaining `32 - N` bits are
//! the word offset inside that device's mapped region. `N` is fixed when the
//! codec is built, so the device and word ranges always change together.

use super::constants::DEFAULT_DEVICE_BITS;
use super::error::{Result, UioError};

/// A decoded logical address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceAddress {
    /// Index of the device in the device table.
    pub device: u32,
    /// Offset in 32-bit words from the start of the device's mapping.
    pub word: u32,
}

/// Splits logical addresses into (device index, word offset) pairs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressCodec {
    device_bits: u32,
    dev_offset: u32,
    dev_mask: u64,
    word_mask: u64,
}

impl AddressCodec {
    /// Creates a codec using `device_bits` high bits for the device index.
    ///
    /// # Arguments
    ///
    /// * `device_bits` - Number of high address bits selecting the device (0..=32)
    ///
    /// # Returns
    ///
    /// The codec, or `InvalidDeviceBits` if the width does not fit in 32 bits.
    pub fn new(device_bits: u32) -> Result<Self> {
        if device_bits > 32 {
            return Err(UioError::InvalidDeviceBits(device_bits));
        }
        let dev_offset = 32 - device_bits;
        let word_mask = (1u64 << dev_offset) - 1;
        let dev_mask = ((1u64 << device_bits) - 1) << dev_offset;
        Ok(Self {
            device_bits,
            dev_offset,
            dev_mask,
            word_mask,
        })
    }

    /// Number of high bits selecting the device.
    pub fn device_bits(&self) -> u32 {
        self.device_bits
    }

    /// Number of distinct device indices this codec can express.
    pub fn max_devices(&self) -> u64 {
        1u64 << self.device_bits
    }

    /// Number of words addressable within a single device.
    pub fn words_per_device(&self) -> u64 {
        self.word_mask + 1
    }

    /// Splits a logical address into its device index and word offset.
    #[inline]
    pub fn decode(&self, addr: u32) -> DeviceAddress {
        let addr = u64::from(addr);
        DeviceAddress {
            device: ((addr & self.dev_mask) >> self.dev_offset) as u32,
            word: (addr & self.word_mask) as u32,
        }
    }

    /// Joins a device index and word offset back into a logical address.
    ///
    /// Bits outside each field's range are discarded.
    #[inline]
    pub fn encode(&self, device: u32, word: u32) -> u32 {
        let device = (u64::from(device) << self.dev_offset) & self.dev_mask;
        let word = u64::from(word) & self.word_mask;
        (device | word) as u32
    }
}

impl Default for AddressCodec {
    fn default() -> Self {
        let dev_offset = 32 - DEFAULT_DEVICE_BITS;
        Self {
            device_bits: DEFAULT_DEVICE_BITS,
            dev_offset,
            dev_mask: ((1u64 << DEFAULT_DEVICE_BITS) - 1) << dev_offset,
            word_mask: (1u64 << dev_offset) - 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_split_is_eight_bits() {
        let codec = AddressCodec::default();
        assert_eq!(codec, AddressCodec::new(8).unwrap());
        let da = codec.decode(0x0312_3456);
        assert_eq!(da.device, 0x03);
        assert_eq!(da.word, 0x12_3456);
    }

    #[test]
    fn extreme_widths() {
        let all_word = AddressCodec::new(0).unwrap();
        assert_eq!(all_word.decode(0xFFFF_FFFF).device, 0);
        assert_eq!(all_word.decode(0xFFFF_FFFF).word, 0xFFFF_FFFF);

        let all_device = AddressCodec::new(32).unwrap();
        assert_eq!(all_device.decode(0xFFFF_FFFF).device, 0xFFFF_FFFF);
        assert_eq!(all_device.decode(0xFFFF_FFFF).word, 0);
        assert_eq!(all_device.words_per_device(), 1);
    }
}
