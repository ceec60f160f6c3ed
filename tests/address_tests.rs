//! Integration tests for logical address decoding.

use uio_axi::{AddressCodec, UioError};

/// Addresses exercising both fields at every width.
const SAMPLES: [u32; 8] = [
    0x0000_0000,
    0x0000_0001,
    0x0100_0000,
    0x0312_3456,
    0x7FFF_FFFF,
    0x8000_0000,
    0xDEAD_BEEF,
    0xFFFF_FFFF,
];

/// Tests that decoding then encoding is the identity for every device width.
#[test]
fn test_decode_encode_identity_all_widths() {
    for bits in 0..=32 {
        let codec = AddressCodec::new(bits).unwrap();
        for &addr in &SAMPLES {
            let da = codec.decode(addr);
            assert_eq!(codec.encode(da.device, da.word), addr, "bits={bits} addr={addr:#x}");
            assert!(u64::from(da.device) < codec.max_devices());
            assert!(u64::from(da.word) < codec.words_per_device());
        }
    }
}

/// Tests the default split of 8 device bits and 24 word bits.
#[test]
fn test_default_split() {
    let codec = AddressCodec::default();
    assert_eq!(codec.device_bits(), 8);
    assert_eq!(codec.max_devices(), 256);
    assert_eq!(codec.words_per_device(), 1 << 24);

    let da = codec.decode(0x0100_0004);
    assert_eq!(da.device, 1);
    assert_eq!(da.word, 4);
}

/// Tests that a width of zero puts every address in device 0.
#[test]
fn test_zero_device_bits() {
    let codec = AddressCodec::new(0).unwrap();
    let da = codec.decode(0xABCD_0123);
    assert_eq!(da.device, 0);
    assert_eq!(da.word, 0xABCD_0123);
    assert_eq!(codec.max_devices(), 1);
}

/// Tests that a width of 32 leaves a single word per device.
#[test]
fn test_full_device_bits() {
    let codec = AddressCodec::new(32).unwrap();
    let da = codec.decode(0xABCD_0123);
    assert_eq!(da.device, 0xABCD_0123);
    assert_eq!(da.word, 0);
    assert_eq!(codec.words_per_device(), 1);
}

/// Tests that encode drops bits that do not fit their field.
#[test]
fn test_encode_masks_fields() {
    let codec = AddressCodec::new(8).unwrap();
    assert_eq!(codec.encode(0x1FF, 0), 0xFF00_0000);
    assert_eq!(codec.encode(1, 0x0100_0002), 0x0100_0002);
}

/// Tests rejection of widths wider than the address.
#[test]
fn test_invalid_width() {
    assert!(matches!(
        AddressCodec::new(33),
        Err(UioError::InvalidDeviceBits(33))
    ));
}
