use tracing::debug;

use crate::pte::{EntryType, Pte, Rights, PTE_ET_MASK};

#[derive(Copy, Clone, Debug)]
struct TlbEntry {
    et: EntryType,
    vpn: u32,
    ppn: u32,
    rights: Rights,
    lru: bool, // recently used
}

impl TlbEntry {
    const fn empty() -> TlbEntry {
        TlbEntry {
            et: EntryType::Unmapped,
            vpn: 0,
            ppn: 0,
            rights: Rights {
                cacheable: false,
                writable: false,
                executable: false,
                user: false,
                global: false,
                dirty: false,
            },
            lru: false,
        }
    }

    fn is_valid(&self) -> bool {
        matches!(self.et, EntryType::PteNew | EntryType::PteOld)
    }
}

/// Result of a successful lookup
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TlbHit {
    pub paddr: u32,
    pub rights: Rights,
    pub way: usize,
    pub set: usize,
}

/// One set-associative TLB bank for a single page size.
///
/// Entries are stored way-major. A way is replaced with a simple recently-used bit
/// per entry, global entries are only chosen as victims when nothing else is left.
pub struct Tlb {
    entries: Vec<TlbEntry>,
    ways: usize,
    sets: usize,
    page_shift: u32,
    sets_shift: u32,
    name: &'static str,
}

impl Tlb {
    pub fn new(name: &'static str, ways: usize, sets: usize, page_shift: u32) -> Tlb {
        debug_assert!(ways.is_power_of_two() && sets.is_power_of_two());
        Tlb {
            entries: vec![TlbEntry::empty(); ways * sets],
            ways,
            sets,
            page_shift,
            sets_shift: sets.trailing_zeros(),
            name,
        }
    }

    #[inline(always)]
    fn entry(&self, way: usize, set: usize) -> &TlbEntry {
        &self.entries[way * self.sets + set]
    }

    #[inline(always)]
    fn entry_mut(&mut self, way: usize, set: usize) -> &mut TlbEntry {
        &mut self.entries[way * self.sets + set]
    }

    #[inline(always)]
    fn set_index(&self, vaddr: u32) -> usize {
        ((vaddr >> self.page_shift) as usize) & (self.sets - 1)
    }

    #[inline(always)]
    fn tag(&self, vaddr: u32) -> u32 {
        vaddr.checked_shr(self.page_shift + self.sets_shift).unwrap_or(0)
    }

    fn page_mask(&self) -> u32 {
        !0u32 >> (32 - self.page_shift)
    }

    pub fn reset(&mut self) {
        self.entries.fill(TlbEntry::empty());
    }

    pub fn translate(&self, vaddr: u32) -> Option<TlbHit> {
        let set = self.set_index(vaddr);
        let tag = self.tag(vaddr);
        (0..self.ways).find_map(|way| {
            let entry = self.entry(way, set);
            if entry.is_valid() && entry.vpn == tag {
                let paddr = entry.ppn.wrapping_shl(self.page_shift) | (vaddr & self.page_mask());
                Some(TlbHit { paddr, rights: entry.rights, way, set })
            } else {
                None
            }
        })
    }

    pub fn set_lru(&mut self, way: usize, set: usize) {
        self.entry_mut(way, set).lru = true;
    }

    pub fn set_dirty(&mut self, way: usize, set: usize) {
        self.entry_mut(way, set).rights.dirty = true;
    }

    fn find_way(&self, set: usize, f: impl Fn(&TlbEntry) -> bool) -> Option<usize> {
        (0..self.ways).find(|&way| f(self.entry(way, set)))
    }

    /// Victim way for a refill of `set`
    fn victim(&mut self, set: usize) -> usize {
        let found = self.find_way(set, |e| e.et == EntryType::Unmapped)
            .or_else(|| self.find_way(set, |e| !e.rights.global && !e.lru))
            .or_else(|| self.find_way(set, |e| !e.rights.global && e.lru))
            .or_else(|| self.find_way(set, |e| e.rights.global && !e.lru));
        if let Some(way) = found {
            return way;
        }

        for way in 0..self.ways {
            self.entry_mut(way, set).lru = false;
        }
        0
    }

    /// Install the translation described by `pte` for the page containing `vaddr`.
    ///
    /// A way already tagged with the same page is reused so a page never appears twice.
    pub fn update(&mut self, pte: u32, vaddr: u32) {
        let set = self.set_index(vaddr);
        let tag = self.tag(vaddr);
        let way = match self.find_way(set, |e| e.vpn == tag) {
            Some(way) => way,
            None => self.victim(set),
        };

        let shift = self.page_shift;
        let entry = TlbEntry {
            et: EntryType::PteOld,
            vpn: tag,
            ppn: pte.wrapping_shl(shift - 10) >> (shift - 4),
            rights: Rights::from(Pte::from(pte)),
            lru: self.entry(way, set).lru,
        };
        debug!("{}: way {} set {} vpn {:#x} -> ppn {:#x} {:?}", self.name, way, set, tag, entry.ppn, entry.rights);
        *self.entry_mut(way, set) = entry;
    }

    /// Drop the entry mapping `vaddr`, unless it is global
    pub fn inval(&mut self, vaddr: u32) -> bool {
        let set = self.set_index(vaddr);
        let tag = self.tag(vaddr);
        for way in 0..self.ways {
            let entry = self.entry_mut(way, set);
            if entry.is_valid() && entry.vpn == tag && !entry.rights.global {
                entry.et = EntryType::Unmapped;
                return true;
            }
        }
        false
    }

    /// Invalidate every entry. Global entries survive unless `all` is set.
    pub fn flush(&mut self, all: bool) {
        for entry in self.entries.iter_mut() {
            if all || !entry.rights.global {
                entry.et = EntryType::Unmapped;
            }
        }
        debug!("{}: flush (all = {})", self.name, all);
    }

    /// Rebuild the page table entry held in (way, set)
    pub fn get_pte(&self, way: usize, set: usize) -> u32 {
        let entry = self.entry(way, set);
        let r = entry.rights;
        let ppn = (!0u32 >> (self.page_shift - 4)) & entry.ppn;
        let pte = Pte::new()
            .with_cacheable(r.cacheable)
            .with_writable(r.writable)
            .with_executable(r.executable)
            .with_user(r.user)
            .with_global(r.global)
            .with_dirty(r.dirty);
        (ppn << 6) | (PTE_ET_MASK & ((entry.et as u32) << 30)) | u32::from(pte)
    }

    pub fn valid_entries(&self) -> usize {
        self.entries.iter().filter(|e| e.is_valid()).count()
    }
}
