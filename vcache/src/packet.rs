use std::fmt;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CmdCode {
    #[default]
    Read,
    Write,
    LockedRead,
    StoreCond,
}

/// One command cell driven toward the interconnect
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandCell {
    pub valid: bool,
    pub address: u32,
    pub cmd: CmdCode,
    pub wdata: u32,
    pub be: u8,
    pub plen: u32, // packet length in bytes
    pub srcid: u32,
    pub trdid: u32,
    pub pktid: u32,
    pub eop: bool,
}

/// One response cell coming back from the interconnect
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseCell {
    pub valid: bool,
    pub rdata: u32,
    pub error: u8, // 0 is a normal response
    pub srcid: u32,
    pub trdid: u32,
    pub pktid: u32,
    pub eop: bool,
}

/// Controller side of the interconnect port
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BusOutputs {
    pub cmd: CommandCell,
    pub rspack: bool,
}

/// Peer side of the interconnect port, as sampled by the controller
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BusInputs {
    pub cmdack: bool,
    pub rsp: ResponseCell,
}

/// The transaction types that can be waiting for the interconnect.
///
/// Declaration order is the arbitration priority.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PendingKind {
    ItlbWalk,
    ItlbLl,
    ItlbSc,
    InsMiss,
    InsUnc,
    DtlbWalk,
    DtlbLl,
    DtlbSc,
    DataUnc,
    DataMiss,
    DataWrite,
}

impl PendingKind {
    pub const COUNT: usize = 11;

    pub const PRIORITY: [PendingKind; PendingKind::COUNT] = [
        PendingKind::ItlbWalk,
        PendingKind::ItlbLl,
        PendingKind::ItlbSc,
        PendingKind::InsMiss,
        PendingKind::InsUnc,
        PendingKind::DtlbWalk,
        PendingKind::DtlbLl,
        PendingKind::DtlbSc,
        PendingKind::DataUnc,
        PendingKind::DataMiss,
        PendingKind::DataWrite,
    ];

    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_trdid(trdid: u32) -> Option<PendingKind> {
        Self::PRIORITY.get(trdid as usize).copied()
    }

    pub fn is_ins(self) -> bool {
        self < PendingKind::DtlbWalk
    }
}

impl fmt::Display for PendingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PendingKind::ItlbWalk => "itlb walk",
            PendingKind::ItlbLl => "itlb ll",
            PendingKind::ItlbSc => "itlb sc",
            PendingKind::InsMiss => "ins miss",
            PendingKind::InsUnc => "ins uncached",
            PendingKind::DtlbWalk => "dtlb walk",
            PendingKind::DtlbLl => "dtlb ll",
            PendingKind::DtlbSc => "dtlb sc",
            PendingKind::DataUnc => "data uncached",
            PendingKind::DataMiss => "data miss",
            PendingKind::DataWrite => "data write",
        };
        write!(f, "{}", name)
    }
}

/// Everything the command FSM needs to issue a single packet.
///
/// Write bursts are built from the write buffer instead.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Request {
    pub address: u32,
    pub cmd: CmdCode,
    pub wdata: u32,
    pub be: u8,
    pub plen: u32,
}

impl Request {
    pub fn read(address: u32, be: u8) -> Request {
        Request { address: address & !3, cmd: CmdCode::Read, wdata: 0, be, plen: 4 }
    }

    pub fn locked_read(address: u32) -> Request {
        Request { address: address & !3, cmd: CmdCode::LockedRead, wdata: 0, be: 0xf, plen: 4 }
    }

    pub fn store_cond(address: u32, wdata: u32) -> Request {
        Request { address: address & !3, cmd: CmdCode::StoreCond, wdata, be: 0xf, plen: 4 }
    }

    /// Full line read at the line aligned address
    pub fn line(address: u32, words: usize) -> Request {
        let bytes = words as u32 * 4;
        Request { address: address & !(bytes - 1), cmd: CmdCode::Read, wdata: 0, be: 0xf, plen: bytes }
    }

    /// Placeholder for write bursts, the payload lives in the write buffer
    pub fn write_burst() -> Request {
        Request { cmd: CmdCode::Write, ..Default::default() }
    }
}
