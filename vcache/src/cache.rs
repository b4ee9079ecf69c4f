/// Set-associative cache array, no dirty state.
///
/// A physical address is split as `tag | set | word | byte`, with `word` covering
/// `log2(words)` bits above the byte offset. Replacement is pseudo-LRU with one
/// recently-used bit per line.
pub struct Cache {
    data: Vec<u32>,
    tag: Vec<u32>,
    valid: Vec<bool>,
    recent: Vec<bool>,
    ways: usize,
    sets: usize,
    words: usize,
}

#[derive(Copy, Clone)]
struct CacheAddress {
    tag: u32,
    set: usize,
    word: usize,
}

impl Cache {
    pub fn new(ways: usize, sets: usize, words: usize) -> Cache {
        debug_assert!(ways.is_power_of_two() && sets.is_power_of_two() && words.is_power_of_two());
        Cache {
            data: vec![0; ways * sets * words],
            tag: vec![0; ways * sets],
            valid: vec![false; ways * sets],
            recent: vec![false; ways * sets],
            ways,
            sets,
            words,
        }
    }

    #[inline(always)]
    fn split(&self, addr: u32) -> CacheAddress {
        let word_bits = self.words.trailing_zeros();
        let set_bits = self.sets.trailing_zeros();
        CacheAddress {
            word: ((addr >> 2) as usize) & (self.words - 1),
            set: ((addr >> (2 + word_bits)) as usize) & (self.sets - 1),
            tag: addr.checked_shr(2 + word_bits + set_bits).unwrap_or(0),
        }
    }

    #[inline(always)]
    fn line(&self, way: usize, set: usize) -> usize {
        way * self.sets + set
    }

    /// Byte address mask selecting the start of a line
    pub fn line_mask(&self) -> u32 {
        !((self.words as u32 * 4) - 1)
    }

    pub fn words(&self) -> usize {
        self.words
    }

    fn lookup(&self, a: CacheAddress) -> Option<usize> {
        (0..self.ways)
            .map(|way| self.line(way, a.set))
            .find(|&line| self.valid[line] && self.tag[line] == a.tag)
    }

    pub fn reset(&mut self) {
        self.valid.fill(false);
        self.recent.fill(false);
    }

    pub fn read(&mut self, addr: u32) -> Option<u32> {
        let a = self.split(addr);
        let line = self.lookup(a)?;
        self.recent[line] = true;
        Some(self.data[line * self.words + a.word])
    }

    /// Overwrite one word of a line that is already present. Returns false on a miss.
    pub fn write(&mut self, addr: u32, value: u32) -> bool {
        let a = self.split(addr);
        match self.lookup(a) {
            Some(line) => {
                self.data[line * self.words + a.word] = value;
                self.recent[line] = true;
                true
            }
            None => false,
        }
    }

    pub fn inval(&mut self, addr: u32) -> bool {
        let a = self.split(addr);
        match self.lookup(a) {
            Some(line) => {
                self.valid[line] = false;
                self.recent[line] = false;
                true
            }
            None => false,
        }
    }

    /// Fill the line containing `addr` from `buf`.
    ///
    /// Returns true when a valid line had to be evicted.
    pub fn update(&mut self, addr: u32, buf: &[u32]) -> bool {
        let a = self.split(addr);
        let lines: Vec<usize> = (0..self.ways).map(|way| self.line(way, a.set)).collect();

        let (line, evicted) = if let Some(&line) = lines.iter().find(|&&l| !self.valid[l]) {
            (line, false)
        } else if let Some(&line) = lines.iter().find(|&&l| !self.recent[l]) {
            (line, true)
        } else {
            for &l in &lines {
                self.recent[l] = false;
            }
            (lines[0], true)
        };

        self.tag[line] = a.tag;
        self.valid[line] = true;
        self.recent[line] = true;
        let base = line * self.words;
        self.data[base..base + self.words].copy_from_slice(&buf[..self.words]);
        evicted
    }

    pub fn valid_lines(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }
}
