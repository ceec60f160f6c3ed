//! Register Access Types.
//!
//! Value types passed between the register engine and its callers: the
//! block transfer mode and the masked single-word read result.

/// Address progression for block transfers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlockMode {
    /// The word offset advances by one after each word.
    #[default]
    Incremental,

    /// Every word targets the same offset.
    ///
    /// Used for FIFO-style registers where repeated accesses drain or fill
    /// a queue behind a single address.
    Fixed,
}

impl BlockMode {
    /// Word offset stride between consecutive accesses.
    #[inline]
    pub fn stride(self) -> u64 {
        match self {
            BlockMode::Incremental => 1,
            BlockMode::Fixed => 0,
        }
    }
}

/// Result of a single-word read.
///
/// The engine always fetches the full raw word; the mask only affects
/// [`RegisterValue::value`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterValue {
    pub raw: u32,
    pub mask: u32,
}

impl RegisterValue {
    /// Mask selecting the full word.
    pub const NO_MASK: u32 = 0xFFFF_FFFF;

    pub fn new(raw: u32, mask: u32) -> Self {
        Self { raw, mask }
    }

    /// The masked field, shifted down to bit 0.
    ///
    /// A zero mask selects nothing and yields 0.
    pub fn value(&self) -> u32 {
        if self.mask == 0 {
            return 0;
        }
        (self.raw & self.mask) >> self.mask.trailing_zeros()
    }
}
