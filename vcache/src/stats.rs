use std::fmt;

use crate::packet::PendingKind;

/// Activity counters. They never influence the controller's behaviour.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub srcid: u32,
    pub total_cycles: u64,
    pub frozen_cycles: u64,

    pub ins_reads: u64,
    pub ins_misses: u64,
    pub data_reads: u64,
    pub data_misses: u64,
    pub unc_reads: u64,
    pub writes: u64,
    pub cached_writes: u64,

    pub ins_tlb_reads: u64,
    pub ins_tlb_misses: u64,
    pub data_tlb_reads: u64,
    pub data_tlb_misses: u64,
    pub ins_pte_access_updates: u64,
    pub data_pte_access_updates: u64,
    pub pte_dirty_updates: u64,
    pub sc_retries: u64,

    /// Transactions issued, indexed by `PendingKind`
    pub transactions: [u64; PendingKind::COUNT],
    /// Cycles the response FSM spent on each transaction type
    pub transaction_cycles: [u64; PendingKind::COUNT],
    pub write_bursts: u64,
    pub write_burst_words: u64,

    pub ins_miss_frozen: u64,
    pub ins_tlb_frozen: u64,
    pub data_miss_frozen: u64,
    pub data_tlb_frozen: u64,
    pub unc_read_frozen: u64,
    pub write_frozen: u64,
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

impl Stats {
    fn sum(counters: &[u64; PendingKind::COUNT], kinds: &[PendingKind]) -> u64 {
        kinds.iter().map(|k| counters[k.index()]).sum()
    }

    fn transaction_latency(&self, kinds: &[PendingKind]) -> f64 {
        ratio(Self::sum(&self.transaction_cycles, kinds), Self::sum(&self.transactions, kinds))
    }

    pub fn run_cycles(&self) -> u64 {
        self.total_cycles - self.frozen_cycles
    }

    pub fn cpi(&self) -> f64 {
        ratio(self.total_cycles, self.run_cycles())
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use PendingKind::*;
        let run = self.run_cycles();
        let rows: [(&str, f64); 23] = [
            ("CPI", self.cpi()),
            ("READ RATE", ratio(self.data_reads, run)),
            ("WRITE RATE", ratio(self.writes, run)),
            ("UNCACHED READ RATE", ratio(self.unc_reads, self.data_reads)),
            ("CACHED WRITE RATE", ratio(self.cached_writes, self.writes)),
            ("IMISS RATE", ratio(self.ins_misses, self.ins_reads)),
            ("DMISS RATE", ratio(self.data_misses, self.data_reads.saturating_sub(self.unc_reads))),
            ("INS MISS COST", ratio(self.ins_miss_frozen, self.ins_misses)),
            ("IMISS TRANSACTION", self.transaction_latency(&[InsMiss, InsUnc])),
            ("DMISS COST", ratio(self.data_miss_frozen, self.data_misses)),
            ("DMISS TRANSACTION", self.transaction_latency(&[DataMiss])),
            ("UNC COST", ratio(self.unc_read_frozen, self.unc_reads)),
            ("UNC TRANSACTION", self.transaction_latency(&[DataUnc])),
            ("WRITE COST", ratio(self.write_frozen, self.writes)),
            ("WRITE TRANSACTION", self.transaction_latency(&[DataWrite])),
            ("WRITE LENGTH", ratio(self.write_burst_words, self.write_bursts)),
            ("INS TLB MISS RATE", ratio(self.ins_tlb_misses, self.ins_tlb_reads)),
            ("DATA TLB MISS RATE", ratio(self.data_tlb_misses, self.data_tlb_reads)),
            ("ITLB MISS TRANSACTION", self.transaction_latency(&[ItlbWalk])),
            ("ITLB WRITE TRANSACTION", self.transaction_latency(&[ItlbLl, ItlbSc])),
            ("ITLB MISS COST", ratio(self.ins_tlb_frozen, self.ins_tlb_misses + self.ins_pte_access_updates)),
            ("DTLB MISS TRANSACTION", self.transaction_latency(&[DtlbWalk])),
            ("DTLB MISS COST", ratio(self.data_tlb_frozen,
                self.data_tlb_misses + self.data_pte_access_updates + self.pte_dirty_updates)),
        ];

        writeln!(f, "CPU {}", self.srcid)?;
        writeln!(f, "- {:<23}= {} ({} frozen)", "CYCLES", self.total_cycles, self.frozen_cycles)?;
        for (name, value) in rows {
            writeln!(f, "- {:<23}= {:.4}", name, value)?;
        }
        writeln!(f, "- {:<23}= {:.4}", "DTLB WRITE TRANSACTION", self.transaction_latency(&[DtlbLl, DtlbSc]))?;
        write!(f, "- {:<23}= {}", "SC RETRIES", self.sc_retries)
    }
}
