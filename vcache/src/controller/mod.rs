//! The controller proper: two side FSMs and the command/response pair sharing the port.
//!
//! Every cycle `tick` runs the instruction side, the data side, the executor, the command
//! FSM and the response FSM, in that order. All of them read registers as latched at the
//! previous edge and only the arrays (TLBs, caches, write buffer, miss buffers) are updated
//! in place. The edge itself is `commit`, after which the port outputs are regenerated.

mod cmd;
mod data_side;
mod ins_side;
mod rsp;

use common::{Commit, Reg};
use tracing::trace;

use crate::{
    config::{CacheabilityTable, Config},
    error::{MmuError, ProtocolViolation},
    iss::Executor,
    packet::{BusInputs, BusOutputs, PendingKind, Request},
    stats::Stats,
    tlb::{Tlb, TlbHit},
    write_buffer::WriteBuffer,
    xtn::{MmuMode, XtnOp},
};

use self::{cmd::CmdFsm, data_side::DataSide, ins_side::InsSide, rsp::RspFsm};

pub use self::{data_side::DataState, ins_side::InsState};

/// One outstanding request record per transaction type.
///
/// A side raises a record with the complete request, the response FSM clears it once the
/// last response cell has been consumed.
pub(crate) struct Pending {
    slots: [Reg<Option<Request>>; PendingKind::COUNT],
}

impl Pending {
    fn new() -> Pending {
        Pending { slots: [Reg::new(None); PendingKind::COUNT] }
    }

    #[inline(always)]
    pub fn is_set(&self, kind: PendingKind) -> bool {
        self.slots[kind.index()].get().is_some()
    }

    #[inline(always)]
    pub fn get(&self, kind: PendingKind) -> Option<Request> {
        self.slots[kind.index()].get()
    }

    pub fn raise(&mut self, kind: PendingKind, req: Request) {
        trace!("raise {} {:?}", kind, req);
        self.slots[kind.index()].set(Some(req));
    }

    pub fn clear(&mut self, kind: PendingKind) {
        self.slots[kind.index()].set(None);
    }
}

impl Commit for Pending {
    fn commit(&mut self) {
        self.slots.commit();
    }
}

/// MMU control registers and the per-side fault latches
pub(crate) struct Mmu {
    pub mode: Reg<MmuMode>,
    pub ptpr: Reg<u32>,
    pub ins_error: Reg<MmuError>,
    pub ins_bad_vaddr: Reg<u32>,
    pub data_error: Reg<MmuError>,
    pub data_bad_vaddr: Reg<u32>,
}

impl Mmu {
    fn new() -> Mmu {
        Mmu {
            mode: Reg::new(MmuMode::Off),
            ptpr: Reg::new(0),
            ins_error: Reg::new(MmuError::NONE),
            ins_bad_vaddr: Reg::new(0),
            data_error: Reg::new(MmuError::NONE),
            data_bad_vaddr: Reg::new(0),
        }
    }

    pub fn ins_fault(&mut self, error: MmuError, vaddr: u32) {
        trace!("ins fault {:?} at {:#010x}", error, vaddr);
        self.ins_error.set(self.ins_error.get() | error);
        self.ins_bad_vaddr.set(vaddr);
    }

    pub fn data_fault(&mut self, error: MmuError, vaddr: u32) {
        trace!("data fault {:?} at {:#010x}", error, vaddr);
        self.data_error.set(self.data_error.get() | error);
        self.data_bad_vaddr.set(vaddr);
    }
}

impl Commit for Mmu {
    fn commit(&mut self) {
        self.mode.commit();
        self.ptpr.commit();
        self.ins_error.commit();
        self.ins_bad_vaddr.commit();
        self.data_error.commit();
        self.data_bad_vaddr.commit();
    }
}

/// Instruction side operations requested by the data side.
///
/// The data side sets `req`, the instruction side clears it once the operation is done.
pub(crate) struct XtnChannel {
    pub req: Reg<bool>,
    pub op: Reg<XtnOp>,
    pub operand: Reg<u32>,
}

impl XtnChannel {
    pub fn raise(&mut self, op: XtnOp, operand: u32) {
        self.req.set(true);
        self.op.set(op);
        self.operand.set(operand);
    }
}

impl Commit for XtnChannel {
    fn commit(&mut self) {
        self.req.commit();
        self.op.commit();
        self.operand.commit();
    }
}

/// Where the response FSM leaves data for one side
pub(crate) struct Refill {
    /// Line fill buffer, word 0 doubles as the uncached buffer
    pub words: Vec<u32>,
    pub unc_valid: Reg<bool>,
    pub error: Reg<bool>,
    /// Table word, or the store conditional status
    pub tlb_word: Reg<u32>,
}

impl Refill {
    fn new(words: usize) -> Refill {
        Refill {
            words: vec![0; words],
            unc_valid: Reg::new(false),
            error: Reg::new(false),
            tlb_word: Reg::new(0),
        }
    }
}

impl Commit for Refill {
    fn commit(&mut self) {
        self.unc_valid.commit();
        self.error.commit();
        self.tlb_word.commit();
    }
}

/// State touched by more than one FSM
pub(crate) struct Shared {
    pub pending: Pending,
    pub mmu: Mmu,
    pub xtn: XtnChannel,
    pub wbuf: WriteBuffer,
    pub stats: Stats,
    pub cacheability: CacheabilityTable,
}

/// Look `vaddr` up in the mega bank, then the kilo bank. The flag is set for kilo pages.
pub(crate) fn lookup(mega: &Tlb, kilo: &Tlb, vaddr: u32) -> Option<(TlbHit, bool)> {
    mega.translate(vaddr)
        .map(|hit| (hit, false))
        .or_else(|| kilo.translate(vaddr).map(|hit| (hit, true)))
}

/// Transaction state shared by the command and response FSMs
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum BusState {
    #[default]
    Idle,
    Busy(PendingKind),
}

/// Highest priority record that may go out now.
///
/// Reads touching the line held by the write buffer wait for the buffered write to go first.
fn arbitrate(sh: &Shared) -> Option<PendingKind> {
    PendingKind::PRIORITY.iter().copied().find(|&kind| match sh.pending.get(kind) {
        None => false,
        Some(_) if kind == PendingKind::DataWrite => true,
        Some(req) => !sh.wbuf.overlaps(req.address, req.plen),
    })
}

pub struct Controller {
    config: Config,
    ins: InsSide,
    data: DataSide,
    cmd: CmdFsm,
    rsp: RspFsm,
    shared: Shared,
    outputs: BusOutputs,
}

impl Controller {
    pub fn new(config: Config) -> anyhow::Result<Controller> {
        config.validate()?;
        let mut ctrl = Controller {
            ins: InsSide::new(&config),
            data: DataSide::new(&config),
            cmd: CmdFsm::new(),
            rsp: RspFsm::new(config.srcid),
            shared: Self::new_shared(&config),
            outputs: BusOutputs::default(),
            config,
        };
        ctrl.gen_outputs();
        Ok(ctrl)
    }

    fn new_shared(config: &Config) -> Shared {
        Shared {
            pending: Pending::new(),
            mmu: Mmu::new(),
            xtn: XtnChannel { req: Reg::new(false), op: Reg::new(XtnOp::Ptpr), operand: Reg::new(0) },
            wbuf: WriteBuffer::new(config.wbuf_words),
            stats: Stats { srcid: config.srcid, ..Default::default() },
            cacheability: config.cacheability.clone(),
        }
    }

    /// Back to the power-on state: everything idle and empty, MMU off
    pub fn reset(&mut self) {
        self.ins = InsSide::new(&self.config);
        self.data = DataSide::new(&self.config);
        self.cmd = CmdFsm::new();
        self.rsp = RspFsm::new(self.config.srcid);
        self.shared = Self::new_shared(&self.config);
        self.gen_outputs();
    }

    /// One clock cycle
    pub fn tick<E: Executor + ?Sized>(&mut self, exec: &mut E, inputs: &BusInputs, irq: u32)
        -> Result<(), ProtocolViolation>
    {
        let sh = &mut self.shared;
        sh.stats.total_cycles += 1;
        trace!(
            cycle = sh.stats.total_cycles,
            ins = ?self.ins.state.get(),
            data = ?self.data.state.get(),
            cmd = ?self.cmd.state(),
            rsp = ?self.rsp.state(),
            "tick"
        );

        let ireq = exec.fetch();
        let dreq = exec.memory_access();

        let irsp = self.ins.transition(&ireq, sh);
        let drsp = self.data.transition(&dreq, sh);

        exec.notify_interrupts(irq);
        exec.step(irsp, drsp);

        if (ireq.valid && !irsp.valid) || (dreq.valid && !drsp.valid) {
            sh.stats.frozen_cycles += 1;
        }

        // Both FSMs leave idle together, on the same grant
        let grant = match (self.cmd.state(), self.rsp.state()) {
            (BusState::Idle, BusState::Idle) => arbitrate(sh),
            _ => None,
        };
        self.cmd.transition(grant, inputs.cmdack, sh);
        let mut write_error = false;
        self.rsp.transition(grant, &inputs.rsp, sh, &mut self.ins.refill, &mut self.data.refill, &mut write_error)?;
        if write_error {
            exec.write_bus_error();
        }

        self.commit();
        self.gen_outputs();
        Ok(())
    }

    fn commit(&mut self) {
        self.ins.commit();
        self.data.commit();
        self.cmd.commit();
        self.rsp.commit();
        self.shared.pending.commit();
        self.shared.mmu.commit();
        self.shared.xtn.commit();
    }

    fn gen_outputs(&mut self) {
        self.outputs = BusOutputs {
            cmd: self.cmd.output(&self.shared, self.config.srcid),
            rspack: true,
        };
    }

    pub fn outputs(&self) -> BusOutputs {
        self.outputs
    }

    pub fn stats(&self) -> &Stats {
        &self.shared.stats
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ins_state(&self) -> InsState {
        self.ins.state.get()
    }

    pub fn data_state(&self) -> DataState {
        self.data.state.get()
    }

    /// Transaction currently owned by the command and response FSMs
    pub fn in_flight(&self) -> (Option<PendingKind>, Option<PendingKind>) {
        let kind = |state: BusState| match state {
            BusState::Idle => None,
            BusState::Busy(kind) => Some(kind),
        };
        (kind(self.cmd.state()), kind(self.rsp.state()))
    }

    pub fn is_pending(&self, kind: PendingKind) -> bool {
        self.shared.pending.is_set(kind)
    }

    /// Valid entries in the (mega, kilo) instruction TLB banks
    pub fn itlb_entries(&self) -> (usize, usize) {
        (self.ins.tlb_mega.valid_entries(), self.ins.tlb_kilo.valid_entries())
    }

    /// Valid entries in the (mega, kilo) data TLB banks
    pub fn dtlb_entries(&self) -> (usize, usize) {
        (self.data.tlb_mega.valid_entries(), self.data.tlb_kilo.valid_entries())
    }

    pub fn icache_lines(&self) -> usize {
        self.ins.cache.valid_lines()
    }

    pub fn dcache_lines(&self) -> usize {
        self.data.cache.valid_lines()
    }

    pub fn write_buffer_empty(&self) -> bool {
        self.shared.wbuf.is_empty()
    }

    pub fn mmu_mode(&self) -> MmuMode {
        self.shared.mmu.mode.get()
    }

    pub fn ptpr(&self) -> u32 {
        self.shared.mmu.ptpr.get()
    }

    /// (instruction, data) fault latches
    pub fn errors(&self) -> (MmuError, MmuError) {
        (self.shared.mmu.ins_error.get(), self.shared.mmu.data_error.get())
    }
}
