//! Interface between the controller and the instruction set simulator driving it.

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    Hyper,
    #[default]
    Kernel,
    User,
}

impl Mode {
    pub fn is_privileged(self) -> bool {
        self != Mode::User
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DataOp {
    #[default]
    Read,
    Write,
    LoadLinked,
    StoreCond,
    XtnRead,
    XtnWrite,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchRequest {
    pub valid: bool,
    pub addr: u32,
    pub mode: Mode,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchResponse {
    pub valid: bool,
    pub error: bool,
    pub instruction: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DataRequest {
    pub valid: bool,
    pub addr: u32,
    pub op: DataOp,
    pub wdata: u32,
    pub be: u8,
    pub mode: Mode,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DataResponse {
    pub valid: bool,
    pub error: bool,
    pub rdata: u32,
}

impl FetchResponse {
    pub fn hit(instruction: u32) -> FetchResponse {
        FetchResponse { valid: true, error: false, instruction }
    }

    pub fn error() -> FetchResponse {
        FetchResponse { valid: true, error: true, instruction: 0 }
    }
}

impl DataResponse {
    pub fn hit(rdata: u32) -> DataResponse {
        DataResponse { valid: true, error: false, rdata }
    }

    pub fn error() -> DataResponse {
        DataResponse { valid: true, error: true, rdata: 0 }
    }
}

/// An execution engine the controller can serve.
///
/// Each cycle the controller collects both requests, runs its side FSMs, then calls `step`
/// with whatever responses became valid. A request must be presented again until it gets a
/// valid response.
pub trait Executor {
    fn fetch(&mut self) -> FetchRequest;
    fn memory_access(&mut self) -> DataRequest;
    fn notify_interrupts(&mut self, irq: u32);
    fn step(&mut self, irsp: FetchResponse, drsp: DataResponse);

    /// A posted write was answered with a bus error
    fn write_bus_error(&mut self) {}

    fn reset(&mut self) {}
}
