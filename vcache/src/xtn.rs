//! Extended (control register) operations, selected by `address / 4` on the data port.

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum XtnOp {
    #[default]
    Ptpr = 0,
    TlbMode = 1,
    IcacheFlush = 2,
    DcacheFlush = 3,
    ItlbInval = 4,
    DtlbInval = 5,
    IcacheInval = 6,
    DcacheInval = 7,
    IcachePrefetch = 8,
    DcachePrefetch = 9,
    Sync = 10,
    InsErrorType = 11,
    DataErrorType = 12,
    InsBadVaddr = 13,
    DataBadVaddr = 14,
}

impl XtnOp {
    const ALL: [XtnOp; 15] = [
        XtnOp::Ptpr,
        XtnOp::TlbMode,
        XtnOp::IcacheFlush,
        XtnOp::DcacheFlush,
        XtnOp::ItlbInval,
        XtnOp::DtlbInval,
        XtnOp::IcacheInval,
        XtnOp::DcacheInval,
        XtnOp::IcachePrefetch,
        XtnOp::DcachePrefetch,
        XtnOp::Sync,
        XtnOp::InsErrorType,
        XtnOp::DataErrorType,
        XtnOp::InsBadVaddr,
        XtnOp::DataBadVaddr,
    ];

    pub fn decode(addr: u32) -> Option<XtnOp> {
        Self::ALL.get((addr / 4) as usize).copied()
    }

    /// Data port address that selects this operation
    pub fn address(self) -> u32 {
        (self as u32) * 4
    }
}

/// Which TLBs translate. The encoding is what TLB_MODE reads and writes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum MmuMode {
    #[default]
    Off = 0,
    InsOnly = 1,
    DataOnly = 2,
    Both = 3,
}

impl MmuMode {
    pub fn from_bits(bits: u32) -> MmuMode {
        match bits & 3 {
            0 => MmuMode::Off,
            1 => MmuMode::InsOnly,
            2 => MmuMode::DataOnly,
            _ => MmuMode::Both,
        }
    }

    pub fn bits(self) -> u32 {
        self as u32
    }

    pub fn ins_enabled(self) -> bool {
        matches!(self, MmuMode::InsOnly | MmuMode::Both)
    }

    pub fn data_enabled(self) -> bool {
        matches!(self, MmuMode::DataOnly | MmuMode::Both)
    }
}
