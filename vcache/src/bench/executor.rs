use std::collections::VecDeque;

use crate::iss::{DataOp, DataRequest, DataResponse, Executor, FetchRequest, FetchResponse, Mode};

/// Plays back a fixed list of fetches and data accesses.
///
/// Each request is presented until the controller answers it, the answers are kept in order.
#[derive(Default)]
pub struct ScriptedExecutor {
    fetches: VecDeque<FetchRequest>,
    accesses: VecDeque<DataRequest>,
    pub fetch_responses: Vec<(FetchRequest, FetchResponse)>,
    pub data_responses: Vec<(DataRequest, DataResponse)>,
    pub write_errors: u32,
    pub irq: u32,
    pub mode: Mode,
}

impl ScriptedExecutor {
    pub fn new() -> ScriptedExecutor {
        ScriptedExecutor::default()
    }

    pub fn is_done(&self) -> bool {
        self.fetches.is_empty() && self.accesses.is_empty()
    }

    pub fn fetch_at(&mut self, addr: u32) {
        self.fetches.push_back(FetchRequest { valid: true, addr, mode: self.mode });
    }

    pub fn access(&mut self, op: DataOp, addr: u32, wdata: u32, be: u8) {
        self.accesses.push_back(DataRequest { valid: true, addr, op, wdata, be, mode: self.mode });
    }

    pub fn read(&mut self, addr: u32) {
        self.access(DataOp::Read, addr, 0, 0xf);
    }

    pub fn write(&mut self, addr: u32, wdata: u32) {
        self.access(DataOp::Write, addr, wdata, 0xf);
    }

    pub fn load_linked(&mut self, addr: u32) {
        self.access(DataOp::LoadLinked, addr, 0, 0xf);
    }

    pub fn store_cond(&mut self, addr: u32, wdata: u32) {
        self.access(DataOp::StoreCond, addr, wdata, 0xf);
    }

    pub fn xtn_write(&mut self, op: crate::xtn::XtnOp, operand: u32) {
        self.access(DataOp::XtnWrite, op.address(), operand, 0xf);
    }

    pub fn xtn_read(&mut self, op: crate::xtn::XtnOp) {
        self.access(DataOp::XtnRead, op.address(), 0, 0xf);
    }

    /// Answers to data accesses, without the requests
    pub fn data_results(&self) -> Vec<DataResponse> {
        self.data_responses.iter().map(|&(_, rsp)| rsp).collect()
    }
}

impl Executor for ScriptedExecutor {
    fn fetch(&mut self) -> FetchRequest {
        self.fetches.front().copied().unwrap_or_default()
    }

    fn memory_access(&mut self) -> DataRequest {
        self.accesses.front().copied().unwrap_or_default()
    }

    fn notify_interrupts(&mut self, irq: u32) {
        self.irq = irq;
    }

    fn step(&mut self, irsp: FetchResponse, drsp: DataResponse) {
        if irsp.valid {
            if let Some(req) = self.fetches.pop_front() {
                self.fetch_responses.push((req, irsp));
            }
        }
        if drsp.valid {
            if let Some(req) = self.accesses.pop_front() {
                self.data_responses.push((req, drsp));
            }
        }
    }

    fn write_bus_error(&mut self) {
        self.write_errors += 1;
    }

    fn reset(&mut self) {
        self.fetches.clear();
        self.accesses.clear();
        self.fetch_responses.clear();
        self.data_responses.clear();
        self.write_errors = 0;
    }
}
