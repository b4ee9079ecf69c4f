use common::{util::ByteMask4, Commit, Reg};
use tracing::debug;

use crate::{
    cache::Cache,
    config::Config,
    error::MmuError,
    iss::{DataOp, DataRequest, DataResponse, Mode},
    packet::{PendingKind, Request},
    pte::{self, EntryType, Pte, PAGE_K_NBITS, PAGE_M_NBITS, OFFSET_K_MASK, PTE_D_MASK, PTE_ET_MASK},
    tlb::Tlb,
    xtn::{MmuMode, XtnOp},
};

use super::{lookup, Refill, Shared};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DataState {
    #[default]
    Idle,
    WriteReq,
    Bis,
    Tlb1Read,
    Tlb1Ll,
    Tlb1Sc,
    Tlb1Updt,
    Tlb2Read,
    Tlb2Ll,
    Tlb2Sc,
    Tlb2Updt,
    CtxtSwitch,
    IcacheFlush,
    IcacheInval,
    ItlbInval,
    DcacheFlush,
    DtlbInval,
    DtlbInvalDone,
    DcacheInval,
    DcacheInvalDone,
    MissWait,
    MissUpdt,
    UncWait,
    WriteUpdt,
    DirtyLl,
    DirtySc,
    Sync,
    Error,
}

/// Physical translation of one data access
#[derive(Copy, Clone)]
struct Translation {
    paddr: u32,
    cached: bool,
    dirty: bool,
    hit_x: bool,
    kilo: bool,
}

pub(crate) struct DataSide {
    pub state: Reg<DataState>,
    pub tlb_mega: Tlb,
    pub tlb_kilo: Tlb,
    pub cache: Cache,
    pub refill: Refill,

    // the access being served
    vaddr_save: Reg<u32>,
    paddr_save: Reg<u32>,
    op_save: Reg<DataOp>,
    wdata_save: Reg<u32>, // also the operand of extended operations
    be_save: Reg<u8>,
    rdata_save: Reg<u32>,
    cached_save: Reg<bool>,
    dirty_save: Reg<bool>,
    tlb_way_save: Reg<usize>,
    tlb_set_save: Reg<usize>,

    // table walks and PTE updates
    tlb_paddr: Reg<u32>,
    pte_update: Reg<u32>,
    ptba_read: Reg<bool>, // level 1 is being re-read only to locate a dirty bit

    ppn_save: Reg<u32>,
    vpn_save: Reg<u32>,
    translation_valid: Reg<bool>,
    page_k_save: Reg<bool>,

    id1_save: Reg<u32>,
    ptba_save: Reg<u32>,
    ptba_ok: Reg<bool>,

    /// Word address of the last load linked, if no store has consumed it yet
    reservation: Reg<Option<u32>>,
}

impl DataSide {
    pub fn new(config: &Config) -> DataSide {
        let c = config.dcache;
        DataSide {
            state: Reg::new(DataState::Idle),
            tlb_mega: Tlb::new("dtlb_m", config.dtlb_mega.ways, config.dtlb_mega.sets, PAGE_M_NBITS),
            tlb_kilo: Tlb::new("dtlb_k", config.dtlb_kilo.ways, config.dtlb_kilo.sets, PAGE_K_NBITS),
            cache: Cache::new(c.ways, c.sets, c.words),
            refill: Refill::new(c.words),
            vaddr_save: Reg::new(0),
            paddr_save: Reg::new(0),
            op_save: Reg::new(DataOp::Read),
            wdata_save: Reg::new(0),
            be_save: Reg::new(0),
            rdata_save: Reg::new(0),
            cached_save: Reg::new(false),
            dirty_save: Reg::new(false),
            tlb_way_save: Reg::new(0),
            tlb_set_save: Reg::new(0),
            tlb_paddr: Reg::new(0),
            pte_update: Reg::new(0),
            ptba_read: Reg::new(false),
            ppn_save: Reg::new(0),
            vpn_save: Reg::new(0),
            translation_valid: Reg::new(false),
            page_k_save: Reg::new(false),
            id1_save: Reg::new(0),
            ptba_save: Reg::new(0),
            ptba_ok: Reg::new(false),
            reservation: Reg::new(None),
        }
    }

    fn fault(&mut self, sh: &mut Shared, error: MmuError) {
        sh.mmu.data_fault(error, self.vaddr_save.get());
        self.state.set(DataState::Error);
    }

    fn hit_p(&self, vaddr: u32) -> bool {
        (vaddr >> PAGE_M_NBITS) == self.id1_save.get() && self.ptba_ok.get()
    }

    fn walk_state(level2: bool, step: WalkStep) -> DataState {
        match (level2, step) {
            (false, WalkStep::Ll) => DataState::Tlb1Ll,
            (false, WalkStep::Sc) => DataState::Tlb1Sc,
            (false, WalkStep::Updt) => DataState::Tlb1Updt,
            (true, WalkStep::Ll) => DataState::Tlb2Ll,
            (true, WalkStep::Sc) => DataState::Tlb2Sc,
            (true, WalkStep::Updt) => DataState::Tlb2Updt,
        }
    }

    pub fn transition(&mut self, dreq: &DataRequest, sh: &mut Shared) -> DataResponse {
        let rsp = self.step(dreq, sh);

        // A buffered line is sent as soon as the write stream stops, so that a later read of
        // the same line is never left waiting behind it.
        let streaming = matches!(self.state.pending(), DataState::WriteReq | DataState::WriteUpdt | DataState::Bis);
        if !streaming && !sh.wbuf.is_empty() && !sh.pending.is_set(PendingKind::DataWrite) {
            sh.pending.raise(PendingKind::DataWrite, Request::write_burst());
        }
        rsp
    }

    fn step(&mut self, dreq: &DataRequest, sh: &mut Shared) -> DataResponse {
        let frozen = dreq.valid as u64;

        match self.state.get() {
            DataState::Idle => return self.idle(dreq, sh),
            DataState::WriteReq => {
                let paddr = self.paddr_save.get();
                if sh.pending.is_set(PendingKind::DataWrite) || !sh.wbuf.accepts(paddr) {
                    if !sh.pending.is_set(PendingKind::DataWrite) {
                        // another line is buffered, send it first
                        sh.pending.raise(PendingKind::DataWrite, Request::write_burst());
                    }
                    sh.stats.write_frozen += 1;
                    return DataResponse::default();
                }

                sh.wbuf.write(paddr, self.be_save.get(), self.wdata_save.get());
                if !self.cached_save.get() {
                    // uncached writes are never merged
                    sh.pending.raise(PendingKind::DataWrite, Request::write_burst());
                }

                // the next request is served as if we were idle
                return self.idle(dreq, sh);
            }
            DataState::Bis => return self.bis(sh),
            state @ (DataState::Tlb1Read | DataState::Tlb2Read) => {
                sh.stats.data_tlb_frozen += frozen;
                if !sh.pending.is_set(PendingKind::DtlbWalk) {
                    self.walk_read(state == DataState::Tlb2Read, sh);
                }
            }
            state @ (DataState::Tlb1Ll | DataState::Tlb2Ll) => {
                sh.stats.data_tlb_frozen += frozen;
                if !sh.pending.is_set(PendingKind::DtlbLl) {
                    self.walk_ll(state == DataState::Tlb2Ll, sh);
                }
            }
            state @ (DataState::Tlb1Sc | DataState::Tlb2Sc) => {
                sh.stats.data_tlb_frozen += frozen;
                if !sh.pending.is_set(PendingKind::DtlbSc) {
                    let level2 = state == DataState::Tlb2Sc;
                    if self.refill.error.get() {
                        self.fault(sh, MmuError::illegal_access(level2));
                    } else if self.refill.tlb_word.get() != 0 {
                        sh.stats.sc_retries += 1;
                        sh.pending.raise(PendingKind::DtlbLl, Request::locked_read(self.tlb_paddr.get()));
                        self.state.set(Self::walk_state(level2, WalkStep::Ll));
                    } else {
                        self.state.set(Self::walk_state(level2, WalkStep::Updt));
                    }
                }
            }
            DataState::Tlb1Updt => {
                sh.stats.data_tlb_frozen += frozen;
                self.tlb_mega.update(self.pte_update.get(), self.vaddr_save.get());
                self.state.set(DataState::Idle);
            }
            DataState::Tlb2Updt => {
                sh.stats.data_tlb_frozen += frozen;
                self.tlb_kilo.update(self.pte_update.get(), self.vaddr_save.get());
                self.state.set(DataState::Idle);
            }
            DataState::CtxtSwitch => {
                self.tlb_mega.flush(false);
                self.tlb_kilo.flush(false);
                self.ptba_ok.set(false);
                self.translation_valid.set(false);
                if !sh.xtn.req.get() {
                    self.state.set(DataState::Idle);
                    return DataResponse::hit(0);
                }
            }
            DataState::IcacheFlush | DataState::IcacheInval | DataState::ItlbInval => {
                if !sh.xtn.req.get() {
                    self.state.set(DataState::Idle);
                    return DataResponse::hit(0);
                }
            }
            DataState::DcacheFlush => {
                self.cache.reset();
                debug!("dcache flush");
                self.state.set(DataState::Idle);
                return DataResponse::hit(0);
            }
            DataState::DtlbInval => {
                let vaddr = self.wdata_save.get();
                if self.tlb_mega.translate(vaddr).is_some() {
                    self.page_k_save.set(false);
                    self.state.set(DataState::DtlbInvalDone);
                } else if self.tlb_kilo.translate(vaddr).is_some() {
                    self.page_k_save.set(true);
                    self.state.set(DataState::DtlbInvalDone);
                } else {
                    self.state.set(DataState::Idle);
                    return DataResponse::hit(0);
                }
            }
            DataState::DtlbInvalDone => {
                let vaddr = self.wdata_save.get();
                if self.page_k_save.get() {
                    self.tlb_kilo.inval(vaddr);
                } else {
                    self.tlb_mega.inval(vaddr);
                }
                self.translation_valid.set(false);
                self.state.set(DataState::Idle);
                return DataResponse::hit(0);
            }
            DataState::DcacheInval => {
                let vaddr = self.wdata_save.get();
                let paddr = if sh.mmu.mode.get().data_enabled() {
                    lookup(&self.tlb_mega, &self.tlb_kilo, vaddr).map(|(hit, _)| hit.paddr)
                } else {
                    Some(vaddr)
                };
                match paddr {
                    Some(paddr) => {
                        self.paddr_save.set(paddr);
                        self.state.set(DataState::DcacheInvalDone);
                    }
                    None => {
                        self.state.set(DataState::Idle);
                        return DataResponse::hit(0);
                    }
                }
            }
            DataState::DcacheInvalDone => {
                self.cache.inval(self.paddr_save.get());
                self.state.set(DataState::Idle);
                return DataResponse::hit(0);
            }
            DataState::MissWait => {
                sh.stats.data_miss_frozen += frozen;
                if !sh.pending.is_set(PendingKind::DataMiss) {
                    if self.refill.error.get() {
                        self.fault(sh, MmuError::CACHE_ILLEGAL_ACCESS);
                    } else {
                        self.state.set(DataState::MissUpdt);
                    }
                }
            }
            DataState::MissUpdt => {
                sh.stats.data_miss_frozen += frozen;
                let paddr = self.paddr_save.get();
                self.cache.update(paddr, &self.refill.words);
                debug!("dcache fill {:#010x}", paddr & self.cache.line_mask());
                self.state.set(DataState::Idle);
            }
            DataState::UncWait => {
                sh.stats.unc_read_frozen += frozen;
                if !sh.pending.is_set(PendingKind::DataUnc) {
                    if self.refill.error.get() {
                        self.fault(sh, MmuError::CACHE_ILLEGAL_ACCESS);
                    } else {
                        if self.op_save.get() == DataOp::StoreCond {
                            // later cached reads must see the stored value
                            self.cache.inval(self.paddr_save.get());
                        }
                        self.refill.unc_valid.set(true);
                        self.state.set(DataState::Idle);
                    }
                }
            }
            DataState::WriteUpdt => {
                let mask = ByteMask4::from_be(self.be_save.get());
                let merged = mask.merge(self.rdata_save.get(), self.wdata_save.get());
                let written = self.cache.write(self.paddr_save.get(), merged);
                debug_assert!(written, "cache line vanished before the write");

                if !self.dirty_save.get() && sh.mmu.mode.get().data_enabled() {
                    self.start_dirty(self.page_k_save.get(), self.vaddr_save.get(), sh);
                } else {
                    self.state.set(DataState::WriteReq);
                    return DataResponse::hit(0);
                }
            }
            DataState::DirtyLl => {
                sh.stats.data_tlb_frozen += frozen;
                if !sh.pending.is_set(PendingKind::DtlbLl) {
                    return self.dirty_ll(sh);
                }
            }
            DataState::DirtySc => {
                sh.stats.data_tlb_frozen += frozen;
                if !sh.pending.is_set(PendingKind::DtlbSc) {
                    let level2 = self.page_k_save.get();
                    if self.refill.error.get() {
                        self.fault(sh, MmuError::illegal_access(level2));
                    } else if self.refill.tlb_word.get() != 0 {
                        sh.stats.sc_retries += 1;
                        sh.pending.raise(PendingKind::DtlbLl, Request::locked_read(self.tlb_paddr.get()));
                        self.state.set(DataState::DirtyLl);
                    } else {
                        return self.finish_dirty();
                    }
                }
            }
            DataState::Sync => {
                if !sh.pending.is_set(PendingKind::DataWrite) && sh.wbuf.is_empty() {
                    self.state.set(DataState::Idle);
                    return DataResponse::hit(0);
                }
            }
            DataState::Error => {
                self.refill.error.set(false);
                self.state.set(DataState::Idle);
                return DataResponse::error();
            }
        }
        DataResponse::default()
    }

    fn idle(&mut self, dreq: &DataRequest, sh: &mut Shared) -> DataResponse {
        self.state.set(DataState::Idle);
        if !dreq.valid {
            return DataResponse::default();
        }
        match dreq.op {
            DataOp::XtnRead => return self.xtn_read(dreq, sh),
            DataOp::XtnWrite => return self.xtn_write(dreq, sh),
            _ => {}
        }

        let vaddr = dreq.addr;
        let mode = sh.mmu.mode.get();
        let cacheable_op = matches!(dreq.op, DataOp::Read | DataOp::Write);

        let translation = if !mode.data_enabled() {
            Some(Translation {
                paddr: vaddr,
                cached: cacheable_op && sh.cacheability.is_cacheable(vaddr),
                dirty: true,
                hit_x: true,
                kilo: false,
            })
        } else {
            sh.stats.data_tlb_reads += 1;
            match lookup(&self.tlb_mega, &self.tlb_kilo, vaddr) {
                Some((hit, kilo)) => {
                    if !hit.rights.user && dreq.mode == Mode::User {
                        sh.mmu.data_fault(MmuError::PRIVILEGE_VIOLATION, vaddr);
                        return DataResponse::error();
                    }
                    if !hit.rights.writable && dreq.op == DataOp::Write {
                        sh.mmu.data_fault(MmuError::WRITE_VIOLATION, vaddr);
                        return DataResponse::error();
                    }

                    let hit_x = (self.vpn_save.get() << PAGE_K_NBITS) == (vaddr & !OFFSET_K_MASK)
                        && self.translation_valid.get();
                    let paddr = if hit_x {
                        (self.ppn_save.get() << PAGE_K_NBITS) | (vaddr & OFFSET_K_MASK)
                    } else {
                        hit.paddr
                    };
                    if kilo {
                        self.tlb_kilo.set_lru(hit.way, hit.set);
                    } else {
                        self.tlb_mega.set_lru(hit.way, hit.set);
                    }
                    self.ppn_save.set(hit.paddr >> PAGE_K_NBITS);
                    self.vpn_save.set(vaddr >> PAGE_K_NBITS);
                    self.translation_valid.set(true);
                    self.page_k_save.set(kilo);
                    self.tlb_way_save.set(hit.way);
                    self.tlb_set_save.set(hit.set);

                    Some(Translation {
                        paddr,
                        cached: cacheable_op && hit.rights.cacheable && sh.cacheability.is_cacheable(hit.paddr),
                        dirty: hit.rights.dirty,
                        hit_x,
                        kilo,
                    })
                }
                None => {
                    self.translation_valid.set(false);
                    None
                }
            }
        };

        self.vaddr_save.set(vaddr);
        self.op_save.set(dreq.op);
        self.wdata_save.set(dreq.wdata);
        self.be_save.set(dreq.be);

        let Some(t) = translation else {
            sh.stats.data_tlb_misses += 1;
            sh.stats.data_tlb_frozen += 1;
            let (entry, state) = if self.hit_p(vaddr) {
                (pte::level2_address(self.ptba_save.get(), vaddr), DataState::Tlb2Read)
            } else {
                (pte::level1_address(sh.mmu.ptpr.get(), vaddr), DataState::Tlb1Read)
            };
            self.tlb_paddr.set(entry);
            sh.pending.raise(PendingKind::DtlbWalk, Request::read(entry, 0xf));
            self.state.set(state);
            return DataResponse::default();
        };

        self.paddr_save.set(t.paddr);
        self.cached_save.set(t.cached);
        self.dirty_save.set(t.dirty);

        if t.cached && !t.hit_x {
            self.state.set(DataState::Bis);
            return DataResponse::default();
        }

        match dreq.op {
            DataOp::Write => self.write(t, dreq, sh),
            _ => self.read(t, dreq, sh),
        }
    }

    fn read(&mut self, t: Translation, dreq: &DataRequest, sh: &mut Shared) -> DataResponse {
        sh.stats.data_reads += 1;
        let found = if t.cached {
            self.cache.read(t.paddr)
        } else if self.refill.unc_valid.get() && t.paddr == self.paddr_save.get() {
            Some(self.refill.words[0])
        } else {
            None
        };
        if let Some(rdata) = found {
            self.refill.unc_valid.set(false);
            return DataResponse::hit(rdata);
        }

        let word = t.paddr & !3;
        if dreq.op == DataOp::StoreCond && self.reservation.get() != Some(word) {
            debug!("sc {:#010x} without a reservation", word);
            self.reservation.set(None);
            return DataResponse::hit(1);
        }

        if t.cached {
            sh.stats.data_misses += 1;
            sh.stats.data_miss_frozen += 1;
            sh.pending.raise(PendingKind::DataMiss, Request::line(t.paddr, self.cache.words()));
            self.state.set(DataState::MissWait);
            return DataResponse::default();
        }

        sh.stats.unc_reads += 1;
        sh.stats.unc_read_frozen += 1;
        let req = match dreq.op {
            DataOp::LoadLinked => {
                self.reservation.set(Some(word));
                Request::locked_read(t.paddr)
            }
            DataOp::StoreCond => {
                self.reservation.set(None);
                Request::store_cond(t.paddr, dreq.wdata)
            }
            _ => Request::read(t.paddr, dreq.be),
        };
        self.refill.unc_valid.set(false);
        sh.pending.raise(PendingKind::DataUnc, req);
        self.state.set(DataState::UncWait);
        DataResponse::default()
    }

    fn write(&mut self, t: Translation, dreq: &DataRequest, sh: &mut Shared) -> DataResponse {
        sh.stats.writes += 1;
        if t.cached {
            sh.stats.cached_writes += 1;
        }
        if self.reservation.get() == Some(t.paddr & !3) {
            self.reservation.set(None);
        }

        let line = if t.cached { self.cache.read(t.paddr) } else { None };
        if let Some(old) = line {
            self.rdata_save.set(old);
            self.state.set(DataState::WriteUpdt);
            DataResponse::default()
        } else if !t.dirty && sh.mmu.mode.get().data_enabled() {
            self.start_dirty(t.kilo, dreq.addr, sh);
            DataResponse::default()
        } else {
            self.state.set(DataState::WriteReq);
            DataResponse::hit(0)
        }
    }

    /// Second look at a cached access whose page changed since the previous one
    fn bis(&mut self, sh: &mut Shared) -> DataResponse {
        let paddr = self.paddr_save.get();
        let found = self.cache.read(paddr);

        if self.op_save.get() == DataOp::Write {
            sh.stats.writes += 1;
            sh.stats.cached_writes += 1;
            if self.reservation.get() == Some(paddr & !3) {
                self.reservation.set(None);
            }
            if let Some(old) = found {
                self.rdata_save.set(old);
                self.state.set(DataState::WriteUpdt);
            } else if !self.dirty_save.get() && sh.mmu.mode.get().data_enabled() {
                self.start_dirty(self.page_k_save.get(), self.vaddr_save.get(), sh);
            } else {
                self.state.set(DataState::WriteReq);
                return DataResponse::hit(0);
            }
            return DataResponse::default();
        }

        sh.stats.data_reads += 1;
        match found {
            Some(rdata) => {
                self.state.set(DataState::Idle);
                DataResponse::hit(rdata)
            }
            None => {
                sh.stats.data_misses += 1;
                sh.stats.data_miss_frozen += 1;
                sh.pending.raise(PendingKind::DataMiss, Request::line(paddr, self.cache.words()));
                self.state.set(DataState::MissWait);
                DataResponse::default()
            }
        }
    }

    /// Set the dirty bit of the page table entry mapping `vaddr` before the first write.
    fn start_dirty(&mut self, kilo: bool, vaddr: u32, sh: &mut Shared) {
        sh.stats.data_tlb_frozen += 1;
        if kilo && !self.hit_p(vaddr) {
            // the level 2 table is unknown, fetch the level 1 descriptor first
            let entry = pte::level1_address(sh.mmu.ptpr.get(), vaddr);
            self.tlb_paddr.set(entry);
            self.ptba_read.set(true);
            sh.pending.raise(PendingKind::DtlbWalk, Request::read(entry, 0xf));
            self.state.set(DataState::Tlb1Read);
            return;
        }

        let entry = if kilo {
            pte::level2_address(self.ptba_save.get(), vaddr)
        } else {
            pte::level1_address(sh.mmu.ptpr.get(), vaddr)
        };
        sh.stats.pte_dirty_updates += 1;
        self.tlb_paddr.set(entry);
        sh.pending.raise(PendingKind::DtlbLl, Request::locked_read(entry));
        self.state.set(DataState::DirtyLl);
    }

    fn dirty_ll(&mut self, sh: &mut Shared) -> DataResponse {
        let level2 = self.page_k_save.get();
        if self.refill.error.get() {
            self.fault(sh, MmuError::illegal_access(level2));
            return DataResponse::default();
        }
        let word = self.refill.tlb_word.get();
        let entry = Pte::from(word);
        if !entry.is_pte() {
            self.fault(sh, MmuError::unmapped(level2));
            return DataResponse::default();
        }
        if entry.et() == EntryType::PteOld && entry.dirty() {
            return self.finish_dirty();
        }

        let update = word | PTE_ET_MASK | PTE_D_MASK;
        self.pte_update.set(update);
        sh.pending.raise(PendingKind::DtlbSc, Request::store_cond(self.tlb_paddr.get(), update));
        self.state.set(DataState::DirtySc);
        DataResponse::default()
    }

    fn finish_dirty(&mut self) -> DataResponse {
        let (way, set) = (self.tlb_way_save.get(), self.tlb_set_save.get());
        if self.page_k_save.get() {
            self.tlb_kilo.set_dirty(way, set);
        } else {
            self.tlb_mega.set_dirty(way, set);
        }
        self.state.set(DataState::WriteReq);
        DataResponse::hit(0)
    }

    /// Table entry read completed
    fn walk_read(&mut self, level2: bool, sh: &mut Shared) {
        if self.refill.error.get() {
            self.ptba_read.set(false);
            self.fault(sh, MmuError::illegal_access(level2));
            return;
        }
        let word = self.refill.tlb_word.get();
        let entry = Pte::from(word);
        let vaddr = self.vaddr_save.get();
        if !level2 {
            self.ptba_ok.set(entry.et() == EntryType::Ptd);
        }
        if entry.et() != EntryType::Ptd {
            self.ptba_read.set(false);
        }

        match entry.et() {
            EntryType::Ptd if !level2 => {
                let base = entry.table_base();
                let paddr = pte::level2_address(base, vaddr);
                self.ptba_save.set(base);
                self.id1_save.set(vaddr >> PAGE_M_NBITS);
                self.tlb_paddr.set(paddr);
                if self.ptba_read.get() {
                    self.ptba_read.set(false);
                    sh.stats.pte_dirty_updates += 1;
                    sh.pending.raise(PendingKind::DtlbLl, Request::locked_read(paddr));
                    self.state.set(DataState::DirtyLl);
                } else {
                    sh.pending.raise(PendingKind::DtlbWalk, Request::read(paddr, 0xf));
                    self.state.set(DataState::Tlb2Read);
                }
            }
            EntryType::PteNew => {
                sh.stats.data_pte_access_updates += 1;
                sh.pending.raise(PendingKind::DtlbLl, Request::locked_read(self.tlb_paddr.get()));
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
                sh.pending.raise(PendingKind::DtlbSc, Request::store_cond(self.tlb_paddr.get(), update));
                self.state.set(Self::walk_state(level2, WalkStep::Sc));
            }
            _ => self.state.set(DataState::Idle),
        }
    }

    fn xtn_read(&mut self, dreq: &DataRequest, sh: &mut Shared) -> DataResponse {
        let mmu = &mut sh.mmu;
        let rdata = match XtnOp::decode(dreq.addr) {
            Some(XtnOp::InsErrorType) => {
                mmu.ins_error.set(MmuError::NONE);
                mmu.ins_error.get().bits()
            }
            Some(XtnOp::DataErrorType) => {
                mmu.data_error.set(MmuError::NONE);
                mmu.data_error.get().bits()
            }
            Some(XtnOp::InsBadVaddr) => mmu.ins_bad_vaddr.get(),
            Some(XtnOp::DataBadVaddr) => mmu.data_bad_vaddr.get(),
            Some(XtnOp::Ptpr) => mmu.ptpr.get(),
            Some(XtnOp::TlbMode) => mmu.mode.get().bits(),
            _ => 0,
        };
        DataResponse::hit(rdata)
    }

    fn xtn_write(&mut self, dreq: &DataRequest, sh: &mut Shared) -> DataResponse {
        let op = XtnOp::decode(dreq.addr);
        let privileged = dreq.mode.is_privileged();
        self.wdata_save.set(dreq.wdata);
        debug!("xtn write {:?} {:#010x}", op, dreq.wdata);

        let next = match op {
            Some(XtnOp::Ptpr) if privileged => {
                sh.mmu.ptpr.set(dreq.wdata);
                sh.mmu.ins_error.set(MmuError::NONE);
                sh.mmu.data_error.set(MmuError::NONE);
                sh.xtn.raise(XtnOp::Ptpr, dreq.wdata);
                DataState::CtxtSwitch
            }
            Some(XtnOp::TlbMode) if privileged => {
                sh.mmu.mode.set(MmuMode::from_bits(dreq.wdata));
                return DataResponse::hit(0);
            }
            Some(XtnOp::DtlbInval) if privileged => DataState::DtlbInval,
            Some(XtnOp::ItlbInval) if privileged => {
                sh.xtn.raise(XtnOp::ItlbInval, dreq.wdata);
                DataState::ItlbInval
            }
            Some(XtnOp::Ptpr | XtnOp::TlbMode | XtnOp::DtlbInval | XtnOp::ItlbInval) => {
                sh.mmu.data_fault(MmuError::PRIVILEGE_VIOLATION, dreq.addr);
                return DataResponse::error();
            }
            Some(XtnOp::DcacheInval) => DataState::DcacheInval,
            Some(XtnOp::DcacheFlush) => DataState::DcacheFlush,
            Some(XtnOp::IcacheInval) => {
                sh.xtn.raise(XtnOp::IcacheInval, dreq.wdata);
                DataState::IcacheInval
            }
            Some(XtnOp::IcacheFlush) => {
                sh.xtn.raise(XtnOp::IcacheFlush, dreq.wdata);
                DataState::IcacheFlush
            }
            Some(XtnOp::Sync) => DataState::Sync,
            Some(XtnOp::IcachePrefetch | XtnOp::DcachePrefetch) => return DataResponse::hit(0),
            _ => {
                sh.mmu.data_fault(MmuError::UNDEFINED_XTN, dreq.addr);
                return DataResponse::error();
            }
        };
        self.state.set(next);
        DataResponse::default()
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum WalkStep {
    Ll,
    Sc,
    Updt,
}

impl Commit for DataSide {
    fn commit(&mut self) {
        self.state.commit();
        self.refill.commit();
        self.vaddr_save.commit();
        self.paddr_save.commit();
        self.op_save.commit();
        self.wdata_save.commit();
        self.be_save.commit();
        self.rdata_save.commit();
        self.cached_save.commit();
        self.dirty_save.commit();
        self.tlb_way_save.commit();
        self.tlb_set_save.commit();
        self.tlb_paddr.commit();
        self.pte_update.commit();
        self.ptba_read.commit();
        self.ppn_save.commit();
        self.vpn_save.commit();
        self.translation_valid.commit();
        self.page_k_save.commit();
        self.id1_save.commit();
        self.ptba_save.commit();
        self.ptba_ok.commit();
        self.reservation.commit();
    }
}
