use core::fmt;

/// Byte lanes of a 32 bit word.
///
/// Lane `i` of the byte enable field selects bits `8*i..8*i+8`, so the lowest
/// byte enable bit targets the lowest address.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ByteMask4 {
    mask: u32,
}

impl ByteMask4 {
    #[inline(always)]
    pub fn from_be(be: u8) -> Self {
        let mut mask = 0;
        for lane in 0..4 {
            if be & (1 << lane) != 0 {
                mask |= 0xff << (lane * 8);
            }
        }
        ByteMask4 { mask }
    }

    #[inline(always)]
    pub fn masked_insert(&self, dest: &mut u32, value: u32) {
        *dest = self.merge(*dest, value);
    }

    /// Bytes of `new` under the mask, the rest from `old`
    #[inline(always)]
    pub fn merge(&self, old: u32, new: u32) -> u32 {
        (old & !self.mask) | (new & self.mask)
    }
}

impl fmt::Debug for ByteMask4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteMask4({:08x})", self.mask)
    }
}
