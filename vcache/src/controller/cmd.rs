use common::{Commit, Reg};
use tracing::{debug, trace};

use crate::packet::{CmdCode, CommandCell, PendingKind};

use super::{BusState, Shared};

/// Drives the granted request onto the port, one cell per accepted handshake
pub(crate) struct CmdFsm {
    state: Reg<BusState>,
    cpt: Reg<usize>,
    min: Reg<usize>,
    max: Reg<usize>,
}

impl CmdFsm {
    pub fn new() -> CmdFsm {
        CmdFsm {
            state: Reg::new(BusState::Idle),
            cpt: Reg::new(0),
            min: Reg::new(0),
            max: Reg::new(0),
        }
    }

    pub fn state(&self) -> BusState {
        self.state.get()
    }

    pub fn transition(&mut self, grant: Option<PendingKind>, cmdack: bool, sh: &mut Shared) {
        match self.state.get() {
            BusState::Idle => {
                let Some(kind) = grant else { return };
                self.state.set(BusState::Busy(kind));
                sh.stats.transactions[kind.index()] += 1;

                if kind == PendingKind::DataWrite {
                    let (min, max) = (sh.wbuf.min(), sh.wbuf.max());
                    self.cpt.set(min);
                    self.min.set(min);
                    self.max.set(max);
                    sh.stats.write_bursts += 1;
                    sh.stats.write_burst_words += (max - min + 1) as u64;
                    debug!("write burst {:#010x} words {}..={}", sh.wbuf.address(min), min, max);
                } else {
                    trace!("issue {}", kind);
                }
            }
            BusState::Busy(PendingKind::DataWrite) => {
                if cmdack {
                    let cpt = self.cpt.get();
                    self.cpt.set(cpt + 1);
                    if cpt == self.max.get() {
                        self.state.set(BusState::Idle);
                        sh.wbuf.reset();
                    }
                }
            }
            BusState::Busy(_) => {
                if cmdack {
                    self.state.set(BusState::Idle);
                }
            }
        }
    }

    pub fn output(&self, sh: &Shared, srcid: u32) -> CommandCell {
        let BusState::Busy(kind) = self.state.get() else {
            return CommandCell { cmd: CmdCode::Write, ..Default::default() };
        };
        let cell = CommandCell { valid: true, srcid, trdid: kind.index() as u32, pktid: 0, eop: true, ..Default::default() };

        if kind == PendingKind::DataWrite {
            let cpt = self.cpt.get();
            CommandCell {
                address: sh.wbuf.address(cpt),
                cmd: CmdCode::Write,
                wdata: sh.wbuf.data(cpt),
                be: sh.wbuf.be(cpt),
                plen: ((self.max.get() - self.min.get() + 1) * 4) as u32,
                eop: cpt == self.max.get(),
                ..cell
            }
        } else {
            let req = sh.pending.get(kind).unwrap_or_default();
            CommandCell {
                address: req.address,
                cmd: req.cmd,
                wdata: req.wdata,
                be: req.be,
                plen: req.plen,
                ..cell
            }
        }
    }
}

impl Commit for CmdFsm {
    fn commit(&mut self) {
        self.state.commit();
        self.cpt.commit();
        self.min.commit();
        self.max.commit();
    }
}
