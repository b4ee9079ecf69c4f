use crate::pte::{EntryType, Pte, Rights, PAGE_K_NBITS, PAGE_M_NBITS, PTD_ID2_MASK, PTE_ET_MASK};

use super::Ram;

/// Builds a two-level page table directly in a `Ram`.
///
/// Level 2 tables are allocated on demand, one 4 KiB frame each, from `table_area` upward.
pub struct PageTable {
    root: u32,
    next_table: u32,
}

impl PageTable {
    /// `root` must be 4 KiB aligned
    pub fn new(root: u32, table_area: u32) -> PageTable {
        PageTable { root, next_table: table_area }
    }

    /// Value to write to PTPR
    pub fn ptpr(&self) -> u32 {
        self.root >> 4
    }

    pub fn level1_entry(&self, vaddr: u32) -> u32 {
        self.root | ((vaddr >> PAGE_M_NBITS) << 2)
    }

    fn entry(ppn: u32, rights: Rights, accessed: bool) -> u32 {
        let et = if accessed { EntryType::PteOld } else { EntryType::PteNew };
        u32::from(Pte::new()
            .with_et(et)
            .with_ppn(ppn)
            .with_cacheable(rights.cacheable)
            .with_writable(rights.writable)
            .with_executable(rights.executable)
            .with_user(rights.user)
            .with_global(rights.global)
            .with_dirty(rights.dirty))
    }

    /// Map the 4 MiB page holding `vaddr`. Returns the address of its entry.
    pub fn map_mega(&mut self, ram: &mut Ram, vaddr: u32, paddr: u32, rights: Rights) -> u32 {
        let entry = self.level1_entry(vaddr);
        ram.write_word(entry, Self::entry(paddr >> PAGE_M_NBITS, rights, false));
        entry
    }

    /// Map the 4 KiB page holding `vaddr`. Returns the address of its level 2 entry.
    pub fn map_kilo(&mut self, ram: &mut Ram, vaddr: u32, paddr: u32, rights: Rights) -> u32 {
        let l1 = self.level1_entry(vaddr);
        let ptd = Pte::from(ram.read_word(l1));
        let table = if ptd.et() == EntryType::Ptd {
            ptd.table_base()
        } else {
            let table = self.next_table;
            self.next_table += 1 << PAGE_K_NBITS;
            ram.write_word(l1, u32::from(Pte::new().with_et(EntryType::Ptd).with_ppn(table >> PAGE_K_NBITS)));
            table
        };
        let entry = table | (((vaddr & PTD_ID2_MASK) >> PAGE_K_NBITS) << 2);
        ram.write_word(entry, Self::entry(paddr >> PAGE_K_NBITS, rights, false));
        entry
    }

    /// Pretend the page behind `entry` was already accessed once
    pub fn mark_accessed(ram: &mut Ram, entry: u32) {
        ram.write_word(entry, ram.read_word(entry) | PTE_ET_MASK);
    }
}
