use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::packet::PendingKind;

/// Latched MMU fault bits, read back through the extended read channel
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct MmuError(u32);

impl MmuError {
    pub const NONE: MmuError = MmuError(0);
    pub const PT1_UNMAPPED: MmuError = MmuError(0x001);
    pub const PT2_UNMAPPED: MmuError = MmuError(0x002);
    pub const PRIVILEGE_VIOLATION: MmuError = MmuError(0x004);
    pub const WRITE_VIOLATION: MmuError = MmuError(0x008);
    pub const EXEC_VIOLATION: MmuError = MmuError(0x010);
    pub const UNDEFINED_XTN: MmuError = MmuError(0x020);
    pub const PT1_ILLEGAL_ACCESS: MmuError = MmuError(0x040);
    pub const PT2_ILLEGAL_ACCESS: MmuError = MmuError(0x080);
    pub const CACHE_ILLEGAL_ACCESS: MmuError = MmuError(0x100);

    const NAMES: [(MmuError, &'static str); 9] = [
        (Self::PT1_UNMAPPED, "PT1_UNMAPPED"),
        (Self::PT2_UNMAPPED, "PT2_UNMAPPED"),
        (Self::PRIVILEGE_VIOLATION, "PRIVILEGE_VIOLATION"),
        (Self::WRITE_VIOLATION, "WRITE_VIOLATION"),
        (Self::EXEC_VIOLATION, "EXEC_VIOLATION"),
        (Self::UNDEFINED_XTN, "UNDEFINED_XTN"),
        (Self::PT1_ILLEGAL_ACCESS, "PT1_ILLEGAL_ACCESS"),
        (Self::PT2_ILLEGAL_ACCESS, "PT2_ILLEGAL_ACCESS"),
        (Self::CACHE_ILLEGAL_ACCESS, "CACHE_ILLEGAL_ACCESS"),
    ];

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: MmuError) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Unmapped entry at the given walk level
    pub fn unmapped(level2: bool) -> MmuError {
        if level2 { Self::PT2_UNMAPPED } else { Self::PT1_UNMAPPED }
    }

    /// Bus error while reading or updating a table entry at the given level
    pub fn illegal_access(level2: bool) -> MmuError {
        if level2 { Self::PT2_ILLEGAL_ACCESS } else { Self::PT1_ILLEGAL_ACCESS }
    }
}

impl BitOr for MmuError {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        MmuError(self.0 | rhs.0)
    }
}

impl BitOrAssign for MmuError {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for MmuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "NONE");
        }
        let mut first = true;
        for (bit, name) in Self::NAMES {
            if self.contains(bit) {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for MmuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MmuError({:#05x}: {})", self.0, self)
    }
}

/// Broken interconnect protocol. The simulation can't continue after one of these.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// A response cell arrived while no transaction was outstanding
    UnexpectedResponse { rdata: u32 },
    /// A single cell transaction was answered with a multi-cell packet
    MissingEop { kind: PendingKind },
    /// A line fill returned more words than a cache line holds
    FillTooLong { kind: PendingKind, words: usize },
    /// A line fill ended before the whole line was returned
    FillTooShort { kind: PendingKind, received: usize, words: usize },
    /// A response cell carried the ids of some other transaction
    WrongTransaction { kind: PendingKind, srcid: u32, trdid: u32 },
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolViolation::UnexpectedResponse { rdata } => {
                write!(f, "unexpected response ({:#010x}) with no transaction outstanding", rdata)
            }
            ProtocolViolation::MissingEop { kind } => {
                write!(f, "{} response is longer than one cell", kind)
            }
            ProtocolViolation::FillTooLong { kind, words } => {
                write!(f, "{} response is longer than a {} word line", kind, words)
            }
            ProtocolViolation::FillTooShort { kind, received, words } => {
                write!(f, "{} response ended after {} of {} words", kind, received, words)
            }
            ProtocolViolation::WrongTransaction { kind, srcid, trdid } => {
                write!(f, "response for srcid {} trdid {} while waiting for {}", srcid, trdid, kind)
            }
        }
    }
}

impl std::error::Error for ProtocolViolation {}
