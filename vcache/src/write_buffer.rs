use common::util::ByteMask4;
use tracing::trace;

/// Single line write buffer.
///
/// Posted writes to the same line are merged byte by byte until the line is sent out as
/// one burst covering words `min..=max`.
pub struct WriteBuffer {
    data: Vec<u32>,
    be: Vec<u8>,
    address: u32,
    min: usize,
    max: usize,
    empty: bool,
    line_mask: u32,
}

impl WriteBuffer {
    pub fn new(words: usize) -> WriteBuffer {
        debug_assert!(words.is_power_of_two());
        let mut wbuf = WriteBuffer {
            data: vec![0; words],
            be: vec![0; words],
            address: 0,
            min: 0,
            max: 0,
            empty: true,
            line_mask: !((words as u32 * 4) - 1),
        };
        wbuf.reset();
        wbuf
    }

    pub fn reset(&mut self) {
        self.min = self.data.len() - 1;
        self.max = 0;
        self.empty = true;
        self.be.fill(0);
        self.data.fill(0);
    }

    #[inline(always)]
    fn word(&self, addr: u32) -> usize {
        ((addr & !self.line_mask) >> 2) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// A write to `addr` can be merged into the buffer right now
    pub fn accepts(&self, addr: u32) -> bool {
        self.empty || (addr & self.line_mask) == self.address
    }

    /// Some byte of `[addr, addr + len)` falls inside the buffered line
    pub fn overlaps(&self, addr: u32, len: u32) -> bool {
        let base = self.address as u64;
        let end = base + (!self.line_mask as u64 + 1);
        !self.empty && (addr as u64) < end && base < addr as u64 + len as u64
    }

    /// Merge a write. The caller checks `accepts` first.
    pub fn write(&mut self, addr: u32, be: u8, data: u32) {
        debug_assert!(self.accepts(addr));
        let word = self.word(addr);
        self.address = addr & self.line_mask;
        self.empty = false;

        ByteMask4::from_be(be).masked_insert(&mut self.data[word], data);
        self.be[word] |= be;
        self.min = self.min.min(word);
        self.max = self.max.max(word);
        trace!("wbuf: {:#010x} be {:04b} -> {:#010x} [{}..={}]", addr, be, self.data[word], self.min, self.max);
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn address(&self, word: usize) -> u32 {
        self.address | ((word as u32) << 2)
    }

    pub fn data(&self, word: usize) -> u32 {
        self.data[word]
    }

    pub fn be(&self, word: usize) -> u8 {
        self.be[word]
    }
}
