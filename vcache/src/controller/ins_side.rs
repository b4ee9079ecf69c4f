use common::{Commit, Reg};
use tracing::debug;

use crate::{
    cache::Cache,
    config::Config,
    error::MmuError,
    iss::{FetchRequest, FetchResponse, Mode},
    packet::{PendingKind, Request},
    pte::{self, EntryType, Pte, PAGE_K_NBITS, PAGE_M_NBITS, OFFSET_K_MASK, PTE_ET_MASK},
    tlb::Tlb,
    xtn::XtnOp,
};

use super::{lookup, Refill, Shared};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum InsState {
    #[default]
    Idle,
    Bis,
    Tlb1Read,
    Tlb1Ll,
    Tlb1Sc,
    Tlb1Updt,
    Tlb2Read,
    Tlb2Ll,
    Tlb2Sc,
    Tlb2Updt,
    TlbFlush,
    CacheFlush,
    TlbInval,
    TlbInvalDone,
    CacheInval,
    CacheInvalDone,
    MissWait,
    MissUpdt,
    UncWait,
    Error,
}

pub(crate) struct InsSide {
    pub state: Reg<InsState>,
    pub tlb_mega: Tlb,
    pub tlb_kilo: Tlb,
    pub cache: Cache,
    pub refill: Refill,

    vaddr_save: Reg<u32>,
    paddr_save: Reg<u32>, // also the table entry address during a walk
    pte_update: Reg<u32>,

    // last translation, reused while fetching from the same page
    ppn_save: Reg<u32>,
    vpn_save: Reg<u32>,
    translation_valid: Reg<bool>,
    page_k_save: Reg<bool>,

    // level 2 table of the last walk, lets a walk skip level 1
    id1_save: Reg<u32>,
    ptba_save: Reg<u32>,
    ptba_ok: Reg<bool>,
}

impl InsSide {
    pub fn new(config: &Config) -> InsSide {
        let c = config.icache;
        InsSide {
            state: Reg::new(InsState::Idle),
            tlb_mega: Tlb::new("itlb_m", config.itlb_mega.ways, config.itlb_mega.sets, PAGE_M_NBITS),
            tlb_kilo: Tlb::new("itlb_k", config.itlb_kilo.ways, config.itlb_kilo.sets, PAGE_K_NBITS),
            cache: Cache::new(c.ways, c.sets, c.words),
            refill: Refill::new(c.words),
            vaddr_save: Reg::new(0),
            paddr_save: Reg::new(0),
            pte_update: Reg::new(0),
            ppn_save: Reg::new(0),
            vpn_save: Reg::new(0),
            translation_valid: Reg::new(false),
            page_k_save: Reg::new(false),
            id1_save: Reg::new(0),
            ptba_save: Reg::new(0),
            ptba_ok: Reg::new(false),
        }
    }

    /// Table walk completed at `level2`, next state is the matching LL/SC or update state
    fn walk_state(level2: bool, state: WalkStep) -> InsState {
        match (level2, state) {
            (false, WalkStep::Ll) => InsState::Tlb1Ll,
            (false, WalkStep::Sc) => InsState::Tlb1Sc,
            (false, WalkStep::Updt) => InsState::Tlb1Updt,
            (true, WalkStep::Ll) => InsState::Tlb2Ll,
            (true, WalkStep::Sc) => InsState::Tlb2Sc,
            (true, WalkStep::Updt) => InsState::Tlb2Updt,
        }
    }

    fn fault(&mut self, sh: &mut Shared, error: MmuError) {
        sh.mmu.ins_fault(error, self.vaddr_save.get());
        self.state.set(InsState::Error);
    }

    pub fn transition(&mut self, ireq: &FetchRequest, sh: &mut Shared) -> FetchResponse {
        match self.state.get() {
            InsState::Idle => return self.idle(ireq, sh),
            InsState::Bis => {
                sh.stats.ins_reads += 1;
                let paddr = self.paddr_save.get();
                match self.cache.read(paddr) {
                    Some(ins) => {
                        self.state.set(InsState::Idle);
                        return FetchResponse::hit(ins);
                    }
                    None => {
                        sh.stats.ins_misses += 1;
                        sh.stats.ins_miss_frozen += 1;
                        sh.pending.raise(PendingKind::InsMiss, Request::line(paddr, self.cache.words()));
                        self.state.set(InsState::MissWait);
                    }
                }
            }
            state @ (InsState::Tlb1Read | InsState::Tlb2Read) => {
                sh.stats.ins_tlb_frozen += 1;
                if !sh.pending.is_set(PendingKind::ItlbWalk) {
                    self.walk_read(state == InsState::Tlb2Read, sh);
                }
            }
            state @ (InsState::Tlb1Ll | InsState::Tlb2Ll) => {
                sh.stats.ins_tlb_frozen += 1;
                if !sh.pending.is_set(PendingKind::ItlbLl) {
                    self.walk_ll(state == InsState::Tlb2Ll, sh);
                }
            }
            state @ (InsState::Tlb1Sc | InsState::Tlb2Sc) => {
                sh.stats.ins_tlb_frozen += 1;
                if !sh.pending.is_set(PendingKind::ItlbSc) {
                    let level2 = state == InsState::Tlb2Sc;
                    if self.refill.error.get() {
                        self.fault(sh, MmuError::illegal_access(level2));
                    } else if self.refill.tlb_word.get() != 0 {
                        sh.stats.sc_retries += 1;
                        sh.pending.raise(PendingKind::ItlbLl, Request::locked_read(self.paddr_save.get()));
                        self.state.set(Self::walk_state(level2, WalkStep::Ll));
                    } else {
                        self.state.set(Self::walk_state(level2, WalkStep::Updt));
                    }
                }
            }
            InsState::Tlb1Updt => {
                sh.stats.ins_tlb_frozen += 1;
                self.tlb_mega.update(self.pte_update.get(), self.vaddr_save.get());
                self.state.set(InsState::Idle);
            }
            InsState::Tlb2Updt => {
                sh.stats.ins_tlb_frozen += 1;
                self.tlb_kilo.update(self.pte_update.get(), self.vaddr_save.get());
                self.state.set(InsState::Idle);
            }
            InsState::TlbFlush => {
                self.tlb_mega.flush(false);
                self.tlb_kilo.flush(false);
                self.ptba_ok.set(false);
                self.translation_valid.set(false);
                sh.xtn.req.set(false);
                self.state.set(InsState::Idle);
            }
            InsState::CacheFlush => {
                self.cache.reset();
                debug!("icache flush");
                sh.xtn.req.set(false);
                self.state.set(InsState::Idle);
            }
            InsState::TlbInval => {
                let vaddr = sh.xtn.operand.get();
                if self.tlb_mega.translate(vaddr).is_some() {
                    self.page_k_save.set(false);
                    self.state.set(InsState::TlbInvalDone);
                } else if self.tlb_kilo.translate(vaddr).is_some() {
                    self.page_k_save.set(true);
                    self.state.set(InsState::TlbInvalDone);
                } else {
                    sh.xtn.req.set(false);
                    self.state.set(InsState::Idle);
                }
            }
            InsState::TlbInvalDone => {
                let vaddr = sh.xtn.operand.get();
                if self.page_k_save.get() {
                    self.tlb_kilo.inval(vaddr);
                } else {
                    self.tlb_mega.inval(vaddr);
                }
                self.translation_valid.set(false);
                sh.xtn.req.set(false);
                self.state.set(InsState::Idle);
            }
            InsState::CacheInval => {
                let vaddr = sh.xtn.operand.get();
                let paddr = if sh.mmu.mode.get().ins_enabled() {
                    lookup(&self.tlb_mega, &self.tlb_kilo, vaddr).map(|(hit, _)| hit.paddr)
                } else {
                    Some(vaddr)
                };
                match paddr {
                    Some(paddr) => {
                        self.paddr_save.set(paddr);
                        self.state.set(InsState::CacheInvalDone);
                    }
                    None => {
                        sh.xtn.req.set(false);
                        self.state.set(InsState::Idle);
                    }
                }
            }
            InsState::CacheInvalDone => {
                self.cache.inval(self.paddr_save.get());
                sh.xtn.req.set(false);
                self.state.set(InsState::Idle);
            }
            InsState::MissWait => {
                sh.stats.ins_miss_frozen += 1;
                if !sh.pending.is_set(PendingKind::InsMiss) {
                    if self.refill.error.get() {
                        self.fault(sh, MmuError::CACHE_ILLEGAL_ACCESS);
                    } else {
                        self.state.set(InsState::MissUpdt);
                    }
                }
            }
            InsState::MissUpdt => {
                sh.stats.ins_miss_frozen += 1;
                let paddr = self.paddr_save.get();
                self.cache.update(paddr, &self.refill.words);
                debug!("icache fill {:#010x}", paddr & self.cache.line_mask());
                self.state.set(InsState::Idle);
            }
            InsState::UncWait => {
                sh.stats.ins_miss_frozen += 1;
                if !sh.pending.is_set(PendingKind::InsUnc) {
                    if self.refill.error.get() {
                        self.fault(sh, MmuError::CACHE_ILLEGAL_ACCESS);
                    } else {
                        self.refill.unc_valid.set(true);
                        self.state.set(InsState::Idle);
                    }
                }
            }
            InsState::Error => {
                self.refill.error.set(false);
                self.state.set(InsState::Idle);
                return FetchResponse::error();
            }
        }
        FetchResponse::default()
    }

    fn idle(&mut self, ireq: &FetchRequest, sh: &mut Shared) -> FetchResponse {
        if sh.xtn.req.get() {
            let next = match sh.xtn.op.get() {
                XtnOp::Ptpr => Some(InsState::TlbFlush),
                XtnOp::IcacheFlush => Some(InsState::CacheFlush),
                XtnOp::ItlbInval => Some(InsState::TlbInval),
                XtnOp::IcacheInval => Some(InsState::CacheInval),
                _ => None,
            };
            if let Some(next) = next {
                if ireq.valid {
                    sh.stats.ins_miss_frozen += 1;
                }
                self.state.set(next);
                return FetchResponse::default();
            }
        }

        if !ireq.valid {
            return FetchResponse::default();
        }
        let vaddr = ireq.addr;
        self.vaddr_save.set(vaddr);

        // (physical address, cacheable, physical page unchanged) or None on a TLB miss
        let translation = if !sh.mmu.mode.get().ins_enabled() {
            Some((vaddr, sh.cacheability.is_cacheable(vaddr), true))
        } else {
            sh.stats.ins_tlb_reads += 1;
            match lookup(&self.tlb_mega, &self.tlb_kilo, vaddr) {
                Some((hit, kilo)) => {
                    if !hit.rights.user && ireq.mode == Mode::User {
                        sh.mmu.ins_fault(MmuError::PRIVILEGE_VIOLATION, vaddr);
                        return FetchResponse::error();
                    }
                    if !hit.rights.executable {
                        sh.mmu.ins_fault(MmuError::EXEC_VIOLATION, vaddr);
                        return FetchResponse::error();
                    }

                    let hit_x = (self.vpn_save.get() << PAGE_K_NBITS) == (vaddr & !OFFSET_K_MASK)
                        && self.translation_valid.get();
                    if kilo {
                        self.tlb_kilo.set_lru(hit.way, hit.set);
                    } else {
                        self.tlb_mega.set_lru(hit.way, hit.set);
                    }
                    self.ppn_save.set(hit.paddr >> PAGE_K_NBITS);
                    self.vpn_save.set(vaddr >> PAGE_K_NBITS);
                    self.translation_valid.set(true);
                    self.page_k_save.set(kilo);

                    let cached = hit.rights.cacheable && sh.cacheability.is_cacheable(hit.paddr);
                    if hit_x {
                        // same page as last time, the saved frame number is still good
                        let spc = (self.ppn_save.get() << PAGE_K_NBITS) | (vaddr & OFFSET_K_MASK);
                        Some((spc, cached, true))
                    } else {
                        Some((hit.paddr, cached, false))
                    }
                }
                None => {
                    self.translation_valid.set(false);
                    None
                }
            }
        };

        let Some((paddr, cached, hit_x)) = translation else {
            sh.stats.ins_tlb_misses += 1;
            sh.stats.ins_tlb_frozen += 1;
            let hit_p = (vaddr >> PAGE_M_NBITS) == self.id1_save.get() && self.ptba_ok.get();
            let (entry, state) = if hit_p {
                (pte::level2_address(self.ptba_save.get(), vaddr), InsState::Tlb2Read)
            } else {
                (pte::level1_address(sh.mmu.ptpr.get(), vaddr), InsState::Tlb1Read)
            };
            self.paddr_save.set(entry);
            sh.pending.raise(PendingKind::ItlbWalk, Request::read(entry, 0xf));
            self.state.set(state);
            return FetchResponse::default();
        };

        if cached && !hit_x {
            // new page: look again next cycle with the translated address
            sh.stats.ins_miss_frozen += 1;
            self.paddr_save.set(paddr);
            self.state.set(InsState::Bis);
            return FetchResponse::default();
        }

        sh.stats.ins_reads += 1;
        let found = if cached {
            self.cache.read(paddr)
        } else if self.refill.unc_valid.get() && paddr == self.paddr_save.get() {
            Some(self.refill.words[0])
        } else {
            None
        };

        if let Some(ins) = found {
            self.refill.unc_valid.set(false);
            return FetchResponse::hit(ins);
        }

        sh.stats.ins_misses += 1;
        sh.stats.ins_miss_frozen += 1;
        self.paddr_save.set(paddr);
        if cached {
            sh.pending.raise(PendingKind::InsMiss, Request::line(paddr, self.cache.words()));
            self.state.set(InsState::MissWait);
        } else {
            sh.pending.raise(PendingKind::InsUnc, Request::read(paddr, 0xf));
            self.refill.unc_valid.set(false);
            self.state.set(InsState::UncWait);
        }
        FetchResponse::default()
    }

    /// Table entry read completed
    fn walk_read(&mut self, level2: bool, sh: &mut Shared) {
        if self.refill.error.get() {
            self.fault(sh, MmuError::illegal_access(level2));
            return;
        }
        let word = self.refill.tlb_word.get();
        let entry = Pte::from(word);
        let vaddr = self.vaddr_save.get();
        if !level2 {
            self.ptba_ok.set(entry.et() == EntryType::Ptd);
        }

        match entry.et() {
            EntryType::Ptd if !level2 => {
                let base = entry.table_base();
                let paddr = pte::level2_address(base, vaddr);
                self.ptba_save.set(base);
                self.id1_save.set(vaddr >> PAGE_M_NBITS);
                self.paddr_save.set(paddr);
                sh.pending.raise(PendingKind::ItlbWalk, Request::read(paddr, 0xf));
                self.state.set(InsState::Tlb2Read);
            }
            EntryType::PteNew => {
                sh.stats.ins_pte_access_updates += 1;
                sh.pending.raise(PendingKind::ItlbLl, Request::locked_read(self.paddr_save.get()));
                self.state.set(Self::walk_state(level2, WalkStep::Ll));
            }
            EntryType::PteOld => {
                self.pte_update.set(word);
                self.state.set(Self::walk_state(level2, WalkStep::Updt));
            }
            _ => self.fault(sh, MmuError::unmapped(level2)),
        }
    }

    /// Linked read of a page table entry completed, set its access bit unless already set
    fn walk_ll(&mut self, level2: bool, sh: &mut Shared) {
        if self.refill.error.get() {
            self.fault(sh, MmuError::illegal_access(level2));
            return;
        }
        let word = self.refill.tlb_word.get();
        match Pte::from(word).et() {
            EntryType::PteOld => {
                self.pte_update.set(word);
                self.state.set(Self::walk_state(level2, WalkStep::Updt));
            }
            EntryType::PteNew => {
                let update = word | PTE_ET_MASK;
                self.pte_update.set(update);
                sh.pending.raise(PendingKind::ItlbSc, Request::store_cond(self.paddr_save.get(), update));
                self.state.set(Self::walk_state(level2, WalkStep::Sc));
            }
            // entry changed under us, walk again
            _ => self.state.set(InsState::Idle),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum WalkStep {
    Ll,
    Sc,
    Updt,
}

impl Commit for InsSide {
    fn commit(&mut self) {
        self.state.commit();
        self.refill.commit();
        self.vaddr_save.commit();
        self.paddr_save.commit();
        self.pte_update.commit();
        self.ppn_save.commit();
        self.vpn_save.commit();
        self.translation_valid.commit();
        self.page_k_save.commit();
        self.id1_save.commit();
        self.ptba_save.commit();
        self.ptba_ok.commit();
    }
}
