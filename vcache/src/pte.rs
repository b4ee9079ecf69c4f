//! Two-level page table format.
//!
//! Level 1 is indexed by `vaddr[31:22]` and holds either a mega-page PTE or a PTD pointing
//! to a level 2 table, which is indexed by `vaddr[21:12]` and holds kilo-page PTEs.

use modular_bitfield::{bitfield, specifiers::*, BitfieldSpecifier};

pub const PAGE_M_NBITS: u32 = 22;
pub const PAGE_K_NBITS: u32 = 12;

pub const OFFSET_K_MASK: u32 = 0x0000_0fff;

pub const PTE_ET_MASK: u32 = 0xc000_0000;
pub const PTE_D_MASK: u32 = 0x0000_0001;
pub const PTD_PTP_MASK: u32 = 0x3fff_ffc0;
pub const PTD_ID2_MASK: u32 = 0x003f_f000;
pub const PTD_SHIFT: u32 = 6;

#[derive(BitfieldSpecifier, Debug, Clone, Copy, PartialEq, Eq)]
#[bits = 2]
pub enum EntryType {
    Unmapped,
    Ptd,
    PteNew, // valid, access bit not set yet
    PteOld,
}

#[bitfield(bits = 32)]
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Pte {
    pub dirty: bool,
    pub global: bool,
    pub user: bool,
    pub executable: bool,
    pub writable: bool,
    pub cacheable: bool,
    pub ppn: B24, // also the table pointer of a PTD
    pub et: EntryType,
}

impl Pte {
    /// Base address of the level 2 table described by this PTD
    pub fn table_base(self) -> u32 {
        ((u32::from(self) & PTD_PTP_MASK) >> PTD_SHIFT) << PAGE_K_NBITS
    }

    pub fn is_pte(self) -> bool {
        matches!(self.et(), EntryType::PteNew | EntryType::PteOld)
    }
}

/// Physical address of the level 1 entry covering `vaddr`
#[inline]
pub fn level1_address(ptpr: u32, vaddr: u32) -> u32 {
    (ptpr << 4) | ((vaddr >> PAGE_M_NBITS) << 2)
}

/// Physical address of the level 2 entry covering `vaddr` in the table at `ptba`
#[inline]
pub fn level2_address(ptba: u32, vaddr: u32) -> u32 {
    ptba | (((vaddr & PTD_ID2_MASK) >> PAGE_K_NBITS) << 2)
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Rights {
    pub cacheable: bool,
    pub writable: bool,
    pub executable: bool,
    pub user: bool,
    pub global: bool,
    pub dirty: bool,
}

impl From<Pte> for Rights {
    fn from(pte: Pte) -> Self {
        Rights {
            cacheable: pte.cacheable(),
            writable: pte.writable(),
            executable: pte.executable(),
            user: pte.user(),
            global: pte.global(),
            dirty: pte.dirty(),
        }
    }
}
