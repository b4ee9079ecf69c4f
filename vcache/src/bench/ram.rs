use std::collections::{HashMap, HashSet, VecDeque};

use common::util::ByteMask4;
use tracing::trace;

use crate::packet::{BusInputs, BusOutputs, CmdCode, CommandCell, ResponseCell};

/// One complete packet as seen by the memory, for checking traffic in tests
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub cmd: CmdCode,
    pub address: u32,
    pub plen: u32,
    pub srcid: u32,
    pub trdid: u32,
    /// Write data, or the stored word of a store conditional
    pub wdata: Vec<u32>,
}

/// Memory at the other end of the interconnect.
///
/// Takes one command cell per cycle while it has no packet to answer, then answers
/// `latency` cycles after the last cell with one cell per word read (or a single cell
/// for a write).
pub struct Ram {
    words: HashMap<u32, u32>,
    latency: u64,
    cycle: u64,

    packet: Vec<CommandCell>,
    responses: VecDeque<(u64, ResponseCell)>,

    /// (source id, word) pairs reserved by a locked read
    reservations: HashSet<(u32, u32)>,
    /// word -> locked reads still to be spoiled by some other master
    contended: HashMap<u32, u32>,
    faulty: Vec<(u32, u32)>,
    log: Vec<Transaction>,
}

impl Ram {
    pub fn new(latency: u64) -> Ram {
        Ram {
            words: HashMap::new(),
            latency,
            cycle: 0,
            packet: Vec::new(),
            responses: VecDeque::new(),
            reservations: HashSet::new(),
            contended: HashMap::new(),
            faulty: Vec::new(),
            log: Vec::new(),
        }
    }

    pub fn read_word(&self, addr: u32) -> u32 {
        self.words.get(&(addr & !3)).copied().unwrap_or(0)
    }

    pub fn write_word(&mut self, addr: u32, value: u32) {
        self.words.insert(addr & !3, value);
    }

    /// Answer every access to `[base, base + size)` with a bus error
    pub fn add_faulty_range(&mut self, base: u32, size: u32) {
        self.faulty.push((base, size));
    }

    /// The next `times` locked reads of `addr` lose their reservation before the store
    /// conditional can arrive, as if another master had stored to the word in between
    pub fn contend(&mut self, addr: u32, times: u32) {
        self.contended.insert(addr & !3, times);
    }

    /// Every packet received so far, in arrival order
    pub fn log(&self) -> &[Transaction] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    fn is_faulty(&self, addr: u32) -> bool {
        self.faulty.iter().any(|&(base, size)| addr >= base && (addr - base) < size)
    }

    fn store(&mut self, addr: u32, be: u8, data: u32) {
        let word = self.words.entry(addr & !3).or_insert(0);
        ByteMask4::from_be(be).masked_insert(word, data);
        // any store kills the reservations on that word
        self.reservations.retain(|&(_, reserved)| reserved != addr & !3);
    }

    /// What the memory drives this cycle
    pub fn outputs(&self) -> BusInputs {
        let rsp = match self.responses.front() {
            Some(&(ready, cell)) if ready <= self.cycle => cell,
            _ => ResponseCell::default(),
        };
        BusInputs { cmdack: self.responses.is_empty(), rsp }
    }

    /// Clock edge. `presented` is what `outputs` returned before the edge, `outs` is what
    /// the controller drove during the same cycle.
    pub fn transition(&mut self, outs: &BusOutputs, presented: &BusInputs) {
        if presented.rsp.valid && outs.rspack {
            self.responses.pop_front();
        }
        if presented.cmdack && outs.cmd.valid {
            self.packet.push(outs.cmd);
            if outs.cmd.eop {
                self.execute();
            }
        }
        self.cycle += 1;
    }

    fn execute(&mut self) {
        let cells = std::mem::take(&mut self.packet);
        let Some(&first) = cells.first() else { return };
        let ready = self.cycle + self.latency;
        let reply = ResponseCell {
            valid: true,
            srcid: first.srcid,
            trdid: first.trdid,
            pktid: first.pktid,
            ..Default::default()
        };
        trace!("ram: {:?} {:#010x} plen {} from {}", first.cmd, first.address, first.plen, first.srcid);

        let mut wdata = Vec::new();
        match first.cmd {
            CmdCode::Read | CmdCode::LockedRead => {
                let count = (first.plen / 4).max(1);
                for i in 0..count {
                    let addr = first.address.wrapping_add(i * 4);
                    let error = self.is_faulty(addr);
                    let cell = ResponseCell {
                        rdata: if error { 0 } else { self.read_word(addr) },
                        error: error as u8,
                        eop: i == count - 1,
                        ..reply
                    };
                    self.responses.push_back((ready, cell));
                }
                if first.cmd == CmdCode::LockedRead {
                    let word = first.address & !3;
                    match self.contended.get_mut(&word) {
                        Some(left) if *left > 0 => *left -= 1,
                        _ => {
                            self.reservations.insert((first.srcid, word));
                        }
                    }
                }
            }
            CmdCode::Write => {
                let mut error = false;
                for cell in &cells {
                    if self.is_faulty(cell.address) {
                        error = true;
                    } else {
                        self.store(cell.address, cell.be, cell.wdata);
                    }
                    wdata.push(cell.wdata);
                }
                self.responses.push_back((ready, ResponseCell { error: error as u8, eop: true, ..reply }));
            }
            CmdCode::StoreCond => {
                let addr = first.address & !3;
                let error = self.is_faulty(addr);
                let reserved = self.reservations.remove(&(first.srcid, addr));
                let rdata = if reserved && !error {
                    self.store(addr, first.be, first.wdata);
                    0
                } else {
                    1
                };
                wdata.push(first.wdata);
                self.responses.push_back((ready, ResponseCell { rdata, error: error as u8, eop: true, ..reply }));
            }
        }

        self.log.push(Transaction {
            cmd: first.cmd,
            address: first.address,
            plen: first.plen,
            srcid: first.srcid,
            trdid: first.trdid,
            wdata,
        });
    }
}
