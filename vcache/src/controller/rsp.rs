use common::{Commit, Reg};
use tracing::{trace, warn};

use crate::{error::ProtocolViolation, packet::{PendingKind, ResponseCell}};

use super::{BusState, Refill, Shared};

/// Routes the response cells of the outstanding transaction back to the side that asked
pub(crate) struct RspFsm {
    state: Reg<BusState>,
    cpt: Reg<usize>,
    srcid: u32,
}

impl RspFsm {
    pub fn new(srcid: u32) -> RspFsm {
        RspFsm { state: Reg::new(BusState::Idle), cpt: Reg::new(0), srcid }
    }

    pub fn state(&self) -> BusState {
        self.state.get()
    }

    fn finish(&mut self, kind: PendingKind, sh: &mut Shared) {
        trace!("{} done", kind);
        sh.pending.clear(kind);
        self.state.set(BusState::Idle);
    }

    pub fn transition(
        &mut self,
        grant: Option<PendingKind>,
        rsp: &ResponseCell,
        sh: &mut Shared,
        ins: &mut Refill,
        data: &mut Refill,
        write_error: &mut bool,
    ) -> Result<(), ProtocolViolation> {
        let kind = match self.state.get() {
            BusState::Idle => {
                if rsp.valid {
                    return Err(ProtocolViolation::UnexpectedResponse { rdata: rsp.rdata });
                }
                if let Some(kind) = grant {
                    self.state.set(BusState::Busy(kind));
                    self.cpt.set(0);
                }
                return Ok(());
            }
            BusState::Busy(kind) => kind,
        };

        sh.stats.transaction_cycles[kind.index()] += 1;
        if !rsp.valid {
            return Ok(());
        }
        if rsp.srcid != self.srcid || rsp.trdid != kind.index() as u32 {
            return Err(ProtocolViolation::WrongTransaction { kind, srcid: rsp.srcid, trdid: rsp.trdid });
        }

        let error = rsp.error != 0;
        if error {
            warn!("bus error on {} (srcid {} trdid {})", kind, rsp.srcid, rsp.trdid);
        }
        let refill = if kind.is_ins() { ins } else { data };

        match kind {
            PendingKind::InsMiss | PendingKind::DataMiss => {
                let cpt = self.cpt.get();
                let words = refill.words.len();
                if cpt >= words {
                    return Err(ProtocolViolation::FillTooLong { kind, words });
                }
                refill.words[cpt] = rsp.rdata;
                self.cpt.set(cpt + 1);
                if error {
                    refill.error.set(true);
                }
                if rsp.eop {
                    if cpt != words - 1 {
                        return Err(ProtocolViolation::FillTooShort { kind, received: cpt + 1, words });
                    }
                    self.finish(kind, sh);
                }
            }
            PendingKind::DataWrite => {
                if error {
                    *write_error = true;
                }
                if rsp.eop {
                    self.finish(kind, sh);
                }
            }
            _ => {
                if !rsp.eop {
                    return Err(ProtocolViolation::MissingEop { kind });
                }
                if error {
                    refill.error.set(true);
                } else if matches!(kind, PendingKind::InsUnc | PendingKind::DataUnc) {
                    refill.words[0] = rsp.rdata;
                    refill.unc_valid.set(true);
                } else {
                    refill.tlb_word.set(rsp.rdata);
                }
                self.finish(kind, sh);
            }
        }
        Ok(())
    }
}

impl Commit for RspFsm {
    fn commit(&mut self) {
        self.state.commit();
        self.cpt.commit();
    }
}
