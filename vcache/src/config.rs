use anyhow::{bail, ensure};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TlbGeometry {
    pub ways: usize,
    pub sets: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CacheGeometry {
    pub ways: usize,
    pub sets: usize,
    pub words: usize,
}

/// A physical address range with a fixed cacheability
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub base: u32,
    pub size: u32,
    pub cacheable: bool,
}

impl Segment {
    pub fn new(base: u32, size: u32, cacheable: bool) -> Segment {
        Segment { base, size, cacheable }
    }

    fn end(&self) -> u64 {
        self.base as u64 + self.size as u64
    }

    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.base && (addr as u64) < self.end()
    }
}

/// Physical address to cacheability decision. Unlisted addresses are uncached.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheabilityTable {
    segments: Vec<Segment>,
}

impl CacheabilityTable {
    pub fn new(segments: Vec<Segment>) -> CacheabilityTable {
        CacheabilityTable { segments }
    }

    pub fn is_cacheable(&self, addr: u32) -> bool {
        self.segments.iter().find(|s| s.contains(addr)).is_some_and(|s| s.cacheable)
    }

    fn validate(&self) -> anyhow::Result<()> {
        for (i, a) in self.segments.iter().enumerate() {
            ensure!(a.size != 0, "segment at {:#010x} is empty", a.base);
            ensure!(a.end() <= 1 << 32, "segment at {:#010x} wraps around the address space", a.base);
            for b in &self.segments[i + 1..] {
                if (a.base as u64) < b.end() && (b.base as u64) < a.end() {
                    bail!("segments at {:#010x} and {:#010x} overlap", a.base, b.base);
                }
            }
        }
        Ok(())
    }
}

/// Construction time parameters of a controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub itlb_mega: TlbGeometry,
    pub itlb_kilo: TlbGeometry,
    pub dtlb_mega: TlbGeometry,
    pub dtlb_kilo: TlbGeometry,
    pub icache: CacheGeometry,
    pub dcache: CacheGeometry,
    pub wbuf_words: usize,
    pub srcid: u32,
    pub cacheability: CacheabilityTable,
}

impl Default for Config {
    fn default() -> Self {
        let tlb = TlbGeometry { ways: 4, sets: 16 };
        let cache = CacheGeometry { ways: 4, sets: 64, words: 8 };
        Config {
            itlb_mega: tlb,
            itlb_kilo: tlb,
            dtlb_mega: tlb,
            dtlb_kilo: tlb,
            icache: cache,
            dcache: cache,
            wbuf_words: 8,
            srcid: 0,
            cacheability: CacheabilityTable::default(),
        }
    }
}

fn check_pow2(what: &str, value: usize) -> anyhow::Result<()> {
    ensure!(value.is_power_of_two(), "{} must be a non-zero power of two, got {}", what, value);
    Ok(())
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, tlb) in [
            ("itlb (mega)", self.itlb_mega),
            ("itlb (kilo)", self.itlb_kilo),
            ("dtlb (mega)", self.dtlb_mega),
            ("dtlb (kilo)", self.dtlb_kilo),
        ] {
            check_pow2(&format!("{} ways", name), tlb.ways)?;
            check_pow2(&format!("{} sets", name), tlb.sets)?;
        }
        ensure!(self.itlb_mega.sets <= 1 << 10 && self.dtlb_mega.sets <= 1 << 10,
            "a mega page tlb can't have more than 1024 sets");
        ensure!(self.itlb_kilo.sets <= 1 << 20 && self.dtlb_kilo.sets <= 1 << 20,
            "a kilo page tlb can't have more than 2^20 sets");

        for (name, cache) in [("icache", self.icache), ("dcache", self.dcache)] {
            check_pow2(&format!("{} ways", name), cache.ways)?;
            check_pow2(&format!("{} sets", name), cache.sets)?;
            check_pow2(&format!("{} words", name), cache.words)?;
            ensure!(cache.words <= 64, "{} lines are limited to 64 words", name);
        }

        check_pow2("write buffer words", self.wbuf_words)?;
        ensure!(self.wbuf_words <= self.dcache.words,
            "write buffer line ({} words) can't be larger than a dcache line ({} words)",
            self.wbuf_words, self.dcache.words);

        self.cacheability.validate()
    }
}
