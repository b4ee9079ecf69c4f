use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use common::cli::GlobalOpts;
use vcache::{
    bench::{PageTable, System},
    pte::Rights,
    xtn::{MmuMode, XtnOp},
    CacheGeometry, CacheabilityTable, Config, Segment, TlbGeometry,
};

/// Runs a synthetic workload through one cache controller and prints its statistics
#[derive(Debug, Parser)]
#[clap(name = "vcache-sim", version, disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[arg(long, default_value_t = 4, help_heading = "Controller")]
    icache_ways: usize,
    #[arg(long, default_value_t = 64, help_heading = "Controller")]
    icache_sets: usize,
    #[arg(long, default_value_t = 4, help_heading = "Controller")]
    dcache_ways: usize,
    #[arg(long, default_value_t = 64, help_heading = "Controller")]
    dcache_sets: usize,
    /// Words per cache line, both caches
    #[arg(long, default_value_t = 8, help_heading = "Controller")]
    line_words: usize,
    /// Ways of every TLB bank
    #[arg(long, default_value_t = 4, help_heading = "Controller")]
    tlb_ways: usize,
    /// Sets of every TLB bank
    #[arg(long, default_value_t = 16, help_heading = "Controller")]
    tlb_sets: usize,
    #[arg(long, default_value_t = 8, help_heading = "Controller")]
    wbuf_words: usize,
    #[arg(long, default_value_t = 0, help_heading = "Controller")]
    srcid: u32,

    /// Cycles between the last command cell and the first response cell
    #[arg(long, default_value_t = 4, help_heading = "Workload")]
    latency: u64,
    /// Loop iterations of the synthetic program
    #[arg(long, default_value_t = 2000, help_heading = "Workload")]
    iterations: u32,
    /// Run with the MMU off (virtual = physical)
    #[arg(long, help_heading = "Workload")]
    physical: bool,
}

const ROOT: u32 = 0x0010_0000;
const TABLES: u32 = 0x0020_0000;
const CODE: u32 = 0x0040_0000;
const DATA: u32 = 0x0080_0000;
const DEVICE: u32 = 0x1000_0000;
const COUNTER: u32 = DATA + 0x8000;

impl Cli {
    fn config(&self) -> Config {
        let tlb = TlbGeometry { ways: self.tlb_ways, sets: self.tlb_sets };
        Config {
            itlb_mega: tlb,
            itlb_kilo: tlb,
            dtlb_mega: tlb,
            dtlb_kilo: tlb,
            icache: CacheGeometry { ways: self.icache_ways, sets: self.icache_sets, words: self.line_words },
            dcache: CacheGeometry { ways: self.dcache_ways, sets: self.dcache_sets, words: self.line_words },
            wbuf_words: self.wbuf_words,
            srcid: self.srcid,
            cacheability: CacheabilityTable::new(vec![
                Segment::new(0, DEVICE, true),
                Segment::new(DEVICE, 0x1000, false),
            ]),
        }
    }
}

/// Identity map code and data with kilo pages, the device with a mega page
fn build_page_table(sys: &mut System) -> PageTable {
    let mut pt = PageTable::new(ROOT, TABLES);
    let code = Rights { cacheable: true, executable: true, user: true, ..Default::default() };
    let data = Rights { cacheable: true, writable: true, user: true, ..Default::default() };
    let device = Rights { writable: true, global: true, ..Default::default() };

    for page in 0..4 {
        pt.map_kilo(&mut sys.ram, CODE + page * 0x1000, CODE + page * 0x1000, code);
    }
    for page in 0..16 {
        pt.map_kilo(&mut sys.ram, DATA + page * 0x1000, DATA + page * 0x1000, data);
    }
    pt.map_mega(&mut sys.ram, DEVICE, DEVICE, device);
    pt
}

/// A loop walking through code, streaming over an array, poking a device and bumping a
/// shared counter with load linked/store conditional.
fn script(sys: &mut System, iterations: u32) {
    let exec = &mut sys.exec;
    for i in 0..iterations {
        exec.fetch_at(CODE + (i * 4) % 0x4000);
        match i % 8 {
            0 | 2 | 5 => exec.read(DATA + (i * 12) % 0x8000),
            3 => exec.write(DATA + (i * 4) % 0x8000, i),
            6 => exec.read(DEVICE + (i % 16) * 4),
            7 => {
                exec.load_linked(COUNTER);
                exec.store_cond(COUNTER, i);
            }
            _ => {}
        }
    }
    exec.xtn_write(XtnOp::Sync, 0);
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.global.init_logging()?;

    let mut sys = System::new(cli.config(), cli.latency).context("invalid controller configuration")?;
    info!("controller ready: {:?}", sys.ctrl.config());

    if !cli.physical {
        let pt = build_page_table(&mut sys);
        sys.exec.xtn_write(XtnOp::Ptpr, pt.ptpr());
        sys.exec.xtn_write(XtnOp::TlbMode, MmuMode::Both.bits());
    }
    script(&mut sys, cli.iterations);

    let mut cycles = 0;
    while !sys.exec.is_done() && cycles < cli.global.cycles {
        sys.tick().context("simulation stopped")?;
        cycles += 1;
    }
    if sys.exec.is_done() {
        info!("workload done after {} cycles", cycles);
    } else {
        warn!("cycle limit reached with requests still queued");
    }

    let faults = sys.exec.data_results().iter().filter(|r| r.error).count()
        + sys.exec.fetch_responses.iter().filter(|(_, r)| r.error).count();
    if faults != 0 {
        let (ins, data) = sys.ctrl.errors();
        warn!("{} accesses answered with an error (ins: {}, data: {})", faults, ins, data);
    }

    if !cli.global.quiet {
        println!("{}", sys.ctrl.stats());
    }
    Ok(())
}
