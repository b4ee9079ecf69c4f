//! Whole controller scenarios, run on the bench against a memory with some latency.

use crate::{
    bench::{PageTable, ScriptedExecutor, System},
    config::{CacheabilityTable, Config, Segment},
    error::{MmuError, ProtocolViolation},
    iss::{DataOp, Mode},
    packet::{BusInputs, CmdCode, PendingKind, ResponseCell},
    pte::{Pte, Rights, PTE_D_MASK, PTE_ET_MASK},
    xtn::{MmuMode, XtnOp},
    Controller, DataState,
};

const ROOT: u32 = 0x0010_0000;
const TABLES: u32 = 0x0020_0000;
const UNCACHED: u32 = 0x1000_0000;

fn config() -> Config {
    Config {
        cacheability: CacheabilityTable::new(vec![
            Segment::new(0, UNCACHED, true),
            Segment::new(UNCACHED, 0x1000_0000, false),
        ]),
        ..Default::default()
    }
}

fn system() -> System {
    System::new(config(), 2).unwrap()
}

fn rights() -> Rights {
    Rights { cacheable: true, writable: true, executable: true, ..Default::default() }
}

/// Point the controller at `pt` and turn translation on, then forget the traffic it took
fn enable_mmu(sys: &mut System, pt: &PageTable, mode: MmuMode) {
    sys.exec.xtn_write(XtnOp::Ptpr, pt.ptpr());
    sys.exec.xtn_write(XtnOp::TlbMode, mode.bits());
    sys.run(100).unwrap();
    assert_eq!(sys.ctrl.mmu_mode(), mode);
    sys.ram.clear_log();
    sys.exec.data_responses.clear();
}

fn drain(sys: &mut System) {
    sys.run_until(200, |s| {
        s.ctrl.data_state() == DataState::Idle
            && s.ctrl.write_buffer_empty()
            && !s.ctrl.is_pending(PendingKind::DataWrite)
    })
    .unwrap();
}

/// Transaction types seen by the memory, in order
fn kinds(sys: &System) -> Vec<PendingKind> {
    sys.ram.log().iter().filter_map(|t| PendingKind::from_trdid(t.trdid)).collect()
}

fn rdata(sys: &System) -> Vec<u32> {
    sys.exec.data_results().iter().map(|r| r.rdata).collect()
}

#[test]
fn cold_fetch_walks_then_fills() {
    let mut sys = system();
    let mut pt = PageTable::new(ROOT, TABLES);
    let entry = pt.map_kilo(&mut sys.ram, 0x0040_0000, 0x0080_0000, rights());
    PageTable::mark_accessed(&mut sys.ram, entry);
    for i in 0..8 {
        sys.ram.write_word(0x0080_0000 + i * 4, 0x1000 + i);
    }
    enable_mmu(&mut sys, &pt, MmuMode::InsOnly);

    sys.exec.fetch_at(0x0040_0008);
    sys.run(200).unwrap();
    assert_eq!(sys.exec.fetch_responses[0].1.instruction, 0x1002);

    let log = sys.ram.log();
    assert_eq!(log.len(), 3);
    assert_eq!((log[0].address, log[0].plen), (pt.level1_entry(0x0040_0000), 4));
    assert_eq!((log[1].address, log[1].plen), (entry, 4));
    assert_eq!((log[2].address, log[2].plen), (0x0080_0000, 32));
    assert_eq!(kinds(&sys), vec![PendingKind::ItlbWalk, PendingKind::ItlbWalk, PendingKind::InsMiss]);

    // same line: answered on the first cycle, nothing on the wire
    sys.ram.clear_log();
    sys.exec.fetch_at(0x0040_000c);
    assert_eq!(sys.run(10).unwrap(), 1);
    assert_eq!(sys.exec.fetch_responses[1].1.instruction, 0x1003);
    assert!(sys.ram.log().is_empty());
}

#[test]
fn walk_sets_the_access_bit() {
    let mut sys = system();
    let mut pt = PageTable::new(ROOT, TABLES);
    let entry = pt.map_kilo(&mut sys.ram, 0x0041_0000, 0x0090_0000, rights());
    sys.ram.write_word(0x0090_0010, 77);
    enable_mmu(&mut sys, &pt, MmuMode::DataOnly);

    sys.exec.read(0x0041_0010);
    sys.run(300).unwrap();
    assert_eq!(rdata(&sys), vec![77]);
    assert_eq!(kinds(&sys), vec![
        PendingKind::DtlbWalk,
        PendingKind::DtlbWalk,
        PendingKind::DtlbLl,
        PendingKind::DtlbSc,
        PendingKind::DataMiss,
    ]);
    assert_eq!(sys.ram.read_word(entry) & PTE_ET_MASK, PTE_ET_MASK);
    assert_eq!(sys.ctrl.stats().data_pte_access_updates, 1);
    assert_eq!(sys.ctrl.dtlb_entries(), (0, 1));
}

#[test]
fn translation_is_reused() {
    let mut sys = system();
    let mut pt = PageTable::new(ROOT, TABLES);
    pt.map_kilo(&mut sys.ram, 0x0041_0000, 0x0090_0000, rights());
    enable_mmu(&mut sys, &pt, MmuMode::DataOnly);

    sys.exec.read(0x0041_0000);
    sys.run(300).unwrap();
    sys.ram.clear_log();

    sys.exec.read(0x0041_0004);
    sys.exec.read(0x0041_0040);
    sys.run(100).unwrap();
    // only the second line is fetched, no walk
    assert_eq!(kinds(&sys), vec![PendingKind::DataMiss]);
    assert_eq!(sys.ctrl.stats().data_tlb_misses, 1);
}

#[test]
fn fill_then_read() {
    let mut sys = system();
    for i in 0..8 {
        sys.ram.write_word(0x4000 + i * 4, 0xdead_0000 | i);
    }
    sys.exec.read(0x4014);
    for i in 0..8 {
        sys.exec.read(0x4000 + i * 4);
    }
    sys.run(100).unwrap();

    let mut expected = vec![0xdead_0005];
    expected.extend((0..8).map(|i| 0xdead_0000 | i));
    assert_eq!(rdata(&sys), expected);
    assert_eq!(kinds(&sys), vec![PendingKind::DataMiss]);
    assert_eq!(sys.ctrl.dcache_lines(), 1);

    let stats = sys.ctrl.stats();
    assert_eq!(stats.data_misses, 1);
    assert_eq!(stats.transactions[PendingKind::DataMiss.index()], 1);
}

#[test]
fn load_linked_store_conditional_pairing() {
    let mut sys = system();
    let a = 0x5000;
    sys.ram.write_word(a, 5);

    sys.exec.load_linked(a);
    sys.exec.store_cond(a, 6);
    sys.exec.store_cond(a, 7);
    sys.run(100).unwrap();

    assert_eq!(rdata(&sys), vec![5, 0, 1]);
    assert_eq!(sys.ram.read_word(a), 6);
    // the second store conditional never left the controller
    let log = sys.ram.log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].cmd, CmdCode::LockedRead);
    assert_eq!(log[1].cmd, CmdCode::StoreCond);
    assert_eq!(log[1].wdata, vec![6]);
}

#[test]
fn write_between_ll_and_sc_fails() {
    let mut sys = system();
    let a = 0x5000;
    sys.exec.load_linked(a);
    sys.exec.write(a, 9);
    sys.exec.store_cond(a, 10);
    sys.run(100).unwrap();
    drain(&mut sys);

    assert_eq!(rdata(&sys)[2], 1);
    assert_eq!(sys.ram.read_word(a), 9);
    assert!(!sys.ram.log().iter().any(|t| t.cmd == CmdCode::StoreCond));
}

#[test]
fn store_conditional_without_reservation() {
    let mut sys = system();
    sys.ram.write_word(0x5000, 3);
    sys.exec.read(0x5000);
    sys.run(100).unwrap();
    sys.ram.clear_log();

    sys.exec.store_cond(0x5000, 4);
    assert_eq!(sys.run(10).unwrap(), 1);
    assert_eq!(rdata(&sys)[1], 1);
    assert!(sys.ram.log().is_empty());
    assert_eq!(sys.ram.read_word(0x5000), 3);

    // the cached copy is untouched
    sys.exec.read(0x5000);
    sys.run(10).unwrap();
    assert_eq!(rdata(&sys)[2], 3);
}

#[test]
fn store_conditional_drops_the_cached_line() {
    let mut sys = system();
    let a = 0x5000;
    sys.ram.write_word(a, 1);
    sys.exec.read(a);
    sys.exec.load_linked(a);
    sys.exec.store_cond(a, 2);
    sys.exec.read(a);
    sys.run(200).unwrap();

    assert_eq!(rdata(&sys), vec![1, 1, 0, 2]);
    assert_eq!(kinds(&sys), vec![
        PendingKind::DataMiss,
        PendingKind::DataUnc,
        PendingKind::DataUnc,
        PendingKind::DataMiss,
    ]);
}

#[test]
fn writes_to_one_line_coalesce() {
    let mut sys = system();
    sys.exec.access(DataOp::Write, 0x6000, 0x0000_0011, 0b0001);
    sys.exec.access(DataOp::Write, 0x6000, 0x0033_0000, 0b0100);
    sys.exec.access(DataOp::Write, 0x6004, 0xaabb_ccdd, 0b1111);
    sys.exec.access(DataOp::Write, 0x600c, 0x4400_0000, 0b1000);
    sys.run(50).unwrap();
    drain(&mut sys);

    let log = sys.ram.log();
    assert_eq!(log.len(), 1);
    assert_eq!((log[0].cmd, log[0].address, log[0].plen), (CmdCode::Write, 0x6000, 16));
    assert_eq!(log[0].wdata.len(), 4);

    assert_eq!(sys.ram.read_word(0x6000), 0x0033_0011);
    assert_eq!(sys.ram.read_word(0x6004), 0xaabb_ccdd);
    assert_eq!(sys.ram.read_word(0x6008), 0);
    assert_eq!(sys.ram.read_word(0x600c), 0x4400_0000);
    assert_eq!((sys.ctrl.stats().write_bursts, sys.ctrl.stats().write_burst_words), (1, 4));
}

#[test]
fn byte_write_to_a_cached_line() {
    let mut sys = system();
    sys.ram.write_word(0x7000, 0x1122_3344);
    sys.exec.read(0x7000);
    sys.run(100).unwrap();
    sys.ram.clear_log();

    sys.exec.access(DataOp::Write, 0x7000, 0x0000_ab00, 0b0010);
    sys.exec.read(0x7000);
    let cycles = sys.run(20).unwrap();
    assert!(cycles <= 3, "took {} cycles", cycles);
    assert_eq!(rdata(&sys)[2], 0x1122_ab44);
    drain(&mut sys);

    let log = sys.ram.log();
    assert_eq!(log.len(), 1);
    assert_eq!((log[0].cmd, log[0].plen), (CmdCode::Write, 4));
    assert_eq!(sys.ram.read_word(0x7000), 0x1122_ab44);
}

#[test]
fn read_waits_for_buffered_write() {
    let mut sys = system();
    sys.exec.write(0x6100, 42);
    sys.exec.read(0x6100);
    sys.run(100).unwrap();

    assert_eq!(rdata(&sys)[1], 42);
    assert_eq!(kinds(&sys), vec![PendingKind::DataWrite, PendingKind::DataMiss]);
}

#[test]
fn unmapped_level1() {
    let mut sys = system();
    let pt = PageTable::new(ROOT, TABLES);
    enable_mmu(&mut sys, &pt, MmuMode::DataOnly);

    sys.exec.read(0x0800_0000);
    sys.run(100).unwrap();
    assert!(sys.exec.data_results()[0].error);
    assert_eq!(sys.ctrl.errors().1, MmuError::PT1_UNMAPPED);
    assert_eq!(sys.ctrl.dtlb_entries(), (0, 0));
    assert_eq!(sys.ctrl.dcache_lines(), 0);

    sys.exec.xtn_read(XtnOp::DataErrorType);
    sys.exec.xtn_read(XtnOp::DataErrorType);
    sys.exec.xtn_read(XtnOp::DataBadVaddr);
    sys.run(10).unwrap();
    assert_eq!(&rdata(&sys)[1..], &[MmuError::PT1_UNMAPPED.bits(), 0, 0x0800_0000]);
}

#[test]
fn unmapped_level2() {
    let mut sys = system();
    let mut pt = PageTable::new(ROOT, TABLES);
    let entry = pt.map_kilo(&mut sys.ram, 0x0041_0000, 0x0090_0000, rights());
    sys.ram.write_word(entry, 0);
    enable_mmu(&mut sys, &pt, MmuMode::DataOnly);

    sys.exec.read(0x0041_0000);
    sys.run(100).unwrap();
    assert!(sys.exec.data_results()[0].error);
    assert_eq!(sys.ctrl.errors().1, MmuError::PT2_UNMAPPED);
}

#[test]
fn uncached_read_is_not_cached() {
    let mut sys = system();
    sys.ram.write_word(UNCACHED + 0x10, 0x55);
    sys.exec.read(UNCACHED + 0x10);
    sys.run(50).unwrap();

    assert_eq!(rdata(&sys), vec![0x55]);
    let log = sys.ram.log();
    assert_eq!(log.len(), 1);
    assert_eq!((log[0].cmd, log[0].address, log[0].plen), (CmdCode::Read, UNCACHED + 0x10, 4));
    assert_eq!(kinds(&sys), vec![PendingKind::DataUnc]);
    assert_eq!(sys.ctrl.dcache_lines(), 0);

    // the buffer answers once only
    sys.exec.read(UNCACHED + 0x10);
    sys.run(50).unwrap();
    assert_eq!(sys.ram.log().len(), 2);
    assert_eq!(sys.ctrl.stats().unc_reads, 2);
}

#[test]
fn uncached_writes_are_not_merged() {
    let mut sys = system();
    sys.exec.write(UNCACHED, 1);
    sys.exec.write(UNCACHED + 4, 2);
    sys.run(100).unwrap();
    drain(&mut sys);

    assert_eq!(kinds(&sys), vec![PendingKind::DataWrite, PendingKind::DataWrite]);
    assert_eq!(sys.ram.read_word(UNCACHED + 4), 2);
}

#[test]
fn one_transaction_at_a_time() {
    let mut sys = system();
    let mut pt = PageTable::new(ROOT, TABLES);
    pt.map_kilo(&mut sys.ram, 0x0040_0000, 0x0080_0000, rights());
    pt.map_kilo(&mut sys.ram, 0x0041_0000, 0x0090_0000, rights());
    enable_mmu(&mut sys, &pt, MmuMode::Both);

    for i in 0..16 {
        sys.exec.fetch_at(0x0040_0000 + i * 0x24);
        sys.exec.read(0x0041_0000 + i * 0x44);
        sys.exec.write(0x0041_0800 + i * 4, i);
    }
    sys.exec.load_linked(0x0041_0100);
    sys.exec.store_cond(0x0041_0100, 1);

    for _ in 0..5000 {
        if sys.exec.is_done() {
            break;
        }
        sys.tick().unwrap();
        match sys.ctrl.in_flight() {
            (Some(cmd), rsp) => assert_eq!(rsp, Some(cmd)),
            (None, _) => {}
        }
    }
    assert!(sys.exec.is_done());
    assert!(sys.exec.data_results().iter().all(|r| !r.error));
    assert!(sys.exec.fetch_responses.iter().all(|(_, r)| !r.error));
}

#[test]
fn context_switch_keeps_global_entries() {
    let mut sys = system();
    let mut pt = PageTable::new(ROOT, TABLES);
    pt.map_kilo(&mut sys.ram, 0x0041_0000, 0x0090_0000, rights());
    pt.map_mega(&mut sys.ram, 0x0c00_0000, 0x0c00_0000, Rights { global: true, ..rights() });
    enable_mmu(&mut sys, &pt, MmuMode::DataOnly);

    sys.exec.read(0x0041_0000);
    sys.exec.read(0x0c00_0000);
    sys.run(300).unwrap();
    assert_eq!(sys.ctrl.dtlb_entries(), (1, 1));

    sys.exec.xtn_write(XtnOp::Ptpr, pt.ptpr());
    sys.run(20).unwrap();
    assert_eq!(sys.ctrl.dtlb_entries(), (1, 0));

    sys.ram.clear_log();
    sys.exec.read(0x0c00_0004);
    sys.run(20).unwrap();
    assert!(sys.ram.log().is_empty());

    sys.exec.read(0x0041_0004);
    sys.run(200).unwrap();
    assert!(kinds(&sys).contains(&PendingKind::DtlbWalk));
}

#[test]
fn context_switch_flushes_both_sides() {
    let mut sys = system();
    let mut pt = PageTable::new(ROOT, TABLES);
    pt.map_kilo(&mut sys.ram, 0x0040_0000, 0x0080_0000, rights());
    enable_mmu(&mut sys, &pt, MmuMode::Both);

    sys.exec.fetch_at(0x0040_0000);
    sys.run(200).unwrap();
    assert_eq!(sys.ctrl.itlb_entries(), (0, 1));

    sys.exec.xtn_write(XtnOp::Ptpr, pt.ptpr());
    sys.run(20).unwrap();
    assert_eq!(sys.ctrl.itlb_entries(), (0, 0));
    assert_eq!(sys.ctrl.ptpr(), pt.ptpr());
}

#[test]
fn invalidate_one_line() {
    let mut sys = system();
    sys.exec.read(0x8000);
    sys.exec.read(0x8020);
    sys.run(100).unwrap();
    assert_eq!(sys.ctrl.dcache_lines(), 2);

    sys.exec.xtn_write(XtnOp::DcacheInval, 0x8000);
    sys.run(10).unwrap();
    assert_eq!(sys.ctrl.dcache_lines(), 1);

    sys.ram.clear_log();
    sys.exec.read(0x8020);
    sys.run(10).unwrap();
    assert!(sys.ram.log().is_empty());
    sys.exec.read(0x8000);
    sys.run(100).unwrap();
    assert_eq!(kinds(&sys), vec![PendingKind::DataMiss]);
}

#[test]
fn invalidate_one_tlb_entry() {
    let mut sys = system();
    let mut pt = PageTable::new(ROOT, TABLES);
    pt.map_kilo(&mut sys.ram, 0x0041_0000, 0x0090_0000, rights());
    pt.map_kilo(&mut sys.ram, 0x0041_1000, 0x0090_1000, rights());
    enable_mmu(&mut sys, &pt, MmuMode::DataOnly);

    sys.exec.read(0x0041_0000);
    sys.exec.read(0x0041_1000);
    sys.run(400).unwrap();
    assert_eq!(sys.ctrl.dtlb_entries(), (0, 2));

    sys.exec.xtn_write(XtnOp::DtlbInval, 0x0041_0000);
    sys.run(10).unwrap();
    assert_eq!(sys.ctrl.dtlb_entries(), (0, 1));

    sys.ram.clear_log();
    sys.exec.read(0x0041_1004);
    sys.run(20).unwrap();
    assert!(sys.ram.log().is_empty());
    sys.exec.read(0x0041_0004);
    sys.run(200).unwrap();
    assert_eq!(kinds(&sys)[0], PendingKind::DtlbWalk);
}

#[test]
fn icache_flush() {
    let mut sys = system();
    sys.exec.fetch_at(0x3000);
    sys.run(100).unwrap();
    assert_eq!(sys.ctrl.icache_lines(), 1);

    sys.exec.xtn_write(XtnOp::IcacheFlush, 0);
    sys.run(10).unwrap();
    assert_eq!(sys.ctrl.icache_lines(), 0);
}

#[test]
fn first_write_sets_the_dirty_bit() {
    let mut sys = system();
    let mut pt = PageTable::new(ROOT, TABLES);
    let entry = pt.map_kilo(&mut sys.ram, 0x0041_0000, 0x0090_0000, rights());
    PageTable::mark_accessed(&mut sys.ram, entry);
    enable_mmu(&mut sys, &pt, MmuMode::DataOnly);

    sys.exec.write(0x0041_0008, 0x1234);
    sys.run(300).unwrap();
    drain(&mut sys);
    assert_eq!(sys.ram.read_word(entry) & PTE_D_MASK, PTE_D_MASK);
    assert_eq!(sys.ram.read_word(0x0090_0008), 0x1234);
    assert_eq!(sys.ctrl.stats().pte_dirty_updates, 1);
    assert!(kinds(&sys).contains(&PendingKind::DtlbSc));

    sys.ram.clear_log();
    sys.exec.write(0x0041_0100, 0x5678);
    sys.run(50).unwrap();
    drain(&mut sys);
    assert_eq!(kinds(&sys), vec![PendingKind::DataWrite]);
}

#[test]
fn dirty_bit_on_a_mega_page() {
    let mut sys = system();
    let mut pt = PageTable::new(ROOT, TABLES);
    let entry = pt.map_mega(&mut sys.ram, 0x0c00_0000, 0x0c00_0000, rights());
    enable_mmu(&mut sys, &pt, MmuMode::DataOnly);

    sys.exec.write(0x0c00_0040, 9);
    sys.run(300).unwrap();
    drain(&mut sys);
    let pte = Pte::from(sys.ram.read_word(entry));
    assert!(pte.dirty());
    assert_eq!(sys.ram.read_word(entry) & PTE_ET_MASK, PTE_ET_MASK);
    assert_eq!(sys.ram.read_word(0x0c00_0040), 9);
}

#[test]
fn protection_faults() {
    let mut sys = system();
    let mut pt = PageTable::new(ROOT, TABLES);
    pt.map_kilo(&mut sys.ram, 0x0041_0000, 0x0090_0000, Rights { writable: false, ..rights() });
    pt.map_kilo(&mut sys.ram, 0x0040_0000, 0x0080_0000, Rights { executable: false, ..rights() });
    enable_mmu(&mut sys, &pt, MmuMode::Both);

    sys.exec.write(0x0041_0000, 1);
    sys.exec.fetch_at(0x0040_0000);
    sys.run(300).unwrap();
    assert!(sys.exec.data_results()[0].error);
    assert!(sys.exec.fetch_responses[0].1.error);
    assert_eq!(sys.ctrl.errors(), (MmuError::EXEC_VIOLATION, MmuError::WRITE_VIOLATION));

    // user code may not touch kernel pages
    sys.exec.mode = Mode::User;
    sys.exec.read(0x0041_0000);
    sys.run(50).unwrap();
    assert!(sys.exec.data_results()[1].error);
    assert_eq!(sys.ctrl.errors().1, MmuError::WRITE_VIOLATION | MmuError::PRIVILEGE_VIOLATION);
}

#[test]
fn extended_operation_errors() {
    let mut sys = system();
    sys.exec.mode = Mode::User;
    sys.exec.xtn_write(XtnOp::Ptpr, 0x100);
    sys.exec.access(DataOp::XtnWrite, 15 * 4, 0, 0xf);
    sys.exec.xtn_write(XtnOp::DcacheFlush, 0);
    sys.exec.xtn_write(XtnOp::DcachePrefetch, 0x4000);
    sys.run(20).unwrap();

    let results = sys.exec.data_results();
    assert!(results[0].error && results[1].error);
    assert!(!results[2].error && !results[3].error);
    assert_eq!(sys.ctrl.ptpr(), 0);
    assert_eq!(sys.ctrl.errors().1, MmuError::PRIVILEGE_VIOLATION | MmuError::UNDEFINED_XTN);
}

#[test]
fn sync_waits_for_the_write_buffer() {
    let mut sys = System::new(config(), 10).unwrap();
    sys.exec.write(0x6000, 1);
    sys.exec.write(0x6004, 2);
    sys.exec.xtn_write(XtnOp::Sync, 0);
    sys.run(200).unwrap();

    assert!(sys.ctrl.write_buffer_empty());
    assert_eq!(sys.ram.read_word(0x6004), 2);
    assert_eq!(sys.ctrl.stats().write_bursts, 1);
}

#[test]
fn bus_errors() {
    let mut sys = system();
    sys.ram.add_faulty_range(0x0900_0000, 0x100);

    sys.exec.write(0x0900_0000, 1);
    sys.run(50).unwrap();
    drain(&mut sys);
    assert_eq!(sys.exec.write_errors, 1);

    sys.exec.read(0x0900_0020);
    sys.run(100).unwrap();
    assert!(sys.exec.data_results()[1].error);
    assert_eq!(sys.ctrl.errors().1, MmuError::CACHE_ILLEGAL_ACCESS);
    assert_eq!(sys.ctrl.dcache_lines(), 0);
}

#[test]
fn walk_bus_error() {
    let mut sys = system();
    let pt = PageTable::new(0x0900_0000, TABLES);
    sys.ram.add_faulty_range(0x0900_0000, 0x1000);
    enable_mmu(&mut sys, &pt, MmuMode::DataOnly);

    sys.exec.read(0x0041_0000);
    sys.run(100).unwrap();
    assert!(sys.exec.data_results()[0].error);
    assert_eq!(sys.ctrl.errors().1, MmuError::PT1_ILLEGAL_ACCESS);
}

#[test]
fn unexpected_response() {
    let mut ctrl = Controller::new(config()).unwrap();
    let mut exec = ScriptedExecutor::new();
    let inputs = BusInputs {
        cmdack: true,
        rsp: ResponseCell { valid: true, rdata: 0xbad, eop: true, ..Default::default() },
    };
    assert_eq!(ctrl.tick(&mut exec, &inputs, 0), Err(ProtocolViolation::UnexpectedResponse { rdata: 0xbad }));
}

#[test]
fn reset_clears_everything() {
    let mut sys = system();
    let pt = PageTable::new(ROOT, TABLES);
    enable_mmu(&mut sys, &pt, MmuMode::Both);
    sys.exec.read(0x8000);
    sys.run(200).unwrap();

    sys.reset();
    assert_eq!(sys.ctrl.mmu_mode(), MmuMode::Off);
    assert_eq!(sys.ctrl.ptpr(), 0);
    assert_eq!(sys.ctrl.dcache_lines(), 0);
    assert_eq!(sys.ctrl.errors(), (MmuError::NONE, MmuError::NONE));
    assert_eq!(sys.ctrl.stats().total_cycles, 0);
    assert_eq!(sys.ctrl.data_state(), DataState::Idle);
}

#[test]
fn fill_waits_for_a_narrower_write_buffer() {
    let mut config = config();
    config.wbuf_words = 4;
    let mut sys = System::new(config, 2).unwrap();
    sys.exec.write(0x6010, 42);
    sys.exec.read(0x6000);
    sys.exec.read(0x6010);
    sys.run(200).unwrap();

    assert_eq!(kinds(&sys), vec![PendingKind::DataWrite, PendingKind::DataMiss]);
    assert_eq!(rdata(&sys), vec![0, 0, 42]);
    assert_eq!(sys.ram.read_word(0x6010), 42);
}

#[test]
fn access_bit_retried_after_losing_the_reservation() {
    let mut sys = system();
    let mut pt = PageTable::new(ROOT, TABLES);
    let entry = pt.map_kilo(&mut sys.ram, 0x0040_0000, 0x0080_0000, rights());
    sys.ram.write_word(0x0080_0004, 0x2222);
    enable_mmu(&mut sys, &pt, MmuMode::InsOnly);
    sys.ram.contend(entry, 2);

    sys.exec.fetch_at(0x0040_0004);
    sys.run(400).unwrap();
    assert_eq!(sys.exec.fetch_responses[0].1.instruction, 0x2222);
    assert_eq!(kinds(&sys), vec![
        PendingKind::ItlbWalk,
        PendingKind::ItlbWalk,
        PendingKind::ItlbLl,
        PendingKind::ItlbSc,
        PendingKind::ItlbLl,
        PendingKind::ItlbSc,
        PendingKind::ItlbLl,
        PendingKind::ItlbSc,
        PendingKind::InsMiss,
    ]);
    assert_eq!(sys.ctrl.stats().sc_retries, 2);
    assert_eq!(sys.ram.read_word(entry) & PTE_ET_MASK, PTE_ET_MASK);
}

#[test]
fn dirty_bit_retried_after_losing_the_reservation() {
    let mut sys = system();
    let mut pt = PageTable::new(ROOT, TABLES);
    let entry = pt.map_kilo(&mut sys.ram, 0x0041_0000, 0x0090_0000, rights());
    PageTable::mark_accessed(&mut sys.ram, entry);
    enable_mmu(&mut sys, &pt, MmuMode::DataOnly);
    sys.ram.contend(entry, 1);

    sys.exec.write(0x0041_0008, 0x1234);
    sys.run(300).unwrap();
    drain(&mut sys);
    assert!(!sys.exec.data_results()[0].error);
    assert_eq!(kinds(&sys), vec![
        PendingKind::DtlbWalk,
        PendingKind::DtlbWalk,
        PendingKind::DtlbLl,
        PendingKind::DtlbSc,
        PendingKind::DtlbLl,
        PendingKind::DtlbSc,
        PendingKind::DataWrite,
    ]);
    assert_eq!(sys.ctrl.stats().sc_retries, 1);
    assert_eq!(sys.ram.read_word(entry) & PTE_D_MASK, PTE_D_MASK);
    assert_eq!(sys.ram.read_word(0x0090_0008), 0x1234);
}

#[test]
fn invalidate_one_instruction_tlb_entry() {
    let mut sys = system();
    let mut pt = PageTable::new(ROOT, TABLES);
    pt.map_kilo(&mut sys.ram, 0x0040_0000, 0x0080_0000, rights());
    pt.map_kilo(&mut sys.ram, 0x0040_1000, 0x0080_1000, rights());
    enable_mmu(&mut sys, &pt, MmuMode::InsOnly);

    sys.exec.fetch_at(0x0040_0000);
    sys.exec.fetch_at(0x0040_1000);
    sys.run(400).unwrap();
    assert_eq!(sys.ctrl.itlb_entries(), (0, 2));

    sys.exec.xtn_write(XtnOp::ItlbInval, 0x0040_0000);
    sys.run(10).unwrap();
    assert!(!sys.exec.data_results()[0].error);
    assert_eq!(sys.ctrl.itlb_entries(), (0, 1));

    sys.ram.clear_log();
    sys.exec.fetch_at(0x0040_1004);
    sys.run(20).unwrap();
    assert!(sys.ram.log().is_empty());
    sys.exec.fetch_at(0x0040_0004);
    sys.run(200).unwrap();
    assert_eq!(kinds(&sys)[0], PendingKind::ItlbWalk);
}

#[test]
fn invalidate_one_instruction_line() {
    let mut sys = system();
    sys.exec.fetch_at(0x3000);
    sys.exec.fetch_at(0x3020);
    sys.run(100).unwrap();
    assert_eq!(sys.ctrl.icache_lines(), 2);

    sys.exec.xtn_write(XtnOp::IcacheInval, 0x3000);
    sys.run(10).unwrap();
    assert!(!sys.exec.data_results()[0].error);
    assert_eq!(sys.ctrl.icache_lines(), 1);

    sys.ram.clear_log();
    sys.exec.fetch_at(0x3024);
    sys.run(10).unwrap();
    assert!(sys.ram.log().is_empty());
    sys.exec.fetch_at(0x3004);
    sys.run(100).unwrap();
    assert_eq!(kinds(&sys), vec![PendingKind::InsMiss]);
}

#[test]
fn uncached_fetch() {
    let mut sys = system();
    sys.ram.write_word(UNCACHED + 0x40, 0x0bad_cafe);
    sys.exec.fetch_at(UNCACHED + 0x40);
    sys.run(50).unwrap();

    assert_eq!(sys.exec.fetch_responses[0].1.instruction, 0x0bad_cafe);
    let log = sys.ram.log();
    assert_eq!(log.len(), 1);
    assert_eq!((log[0].address, log[0].plen), (UNCACHED + 0x40, 4));
    assert_eq!(kinds(&sys), vec![PendingKind::InsUnc]);
    assert_eq!(sys.ctrl.icache_lines(), 0);

    // nothing is kept once the fetch has been answered
    sys.exec.fetch_at(UNCACHED + 0x40);
    sys.run(50).unwrap();
    assert_eq!(kinds(&sys), vec![PendingKind::InsUnc, PendingKind::InsUnc]);
}

#[test]
fn level2_bus_error() {
    let mut sys = system();
    let mut pt = PageTable::new(ROOT, TABLES);
    pt.map_kilo(&mut sys.ram, 0x0041_0000, 0x0090_0000, rights());
    sys.ram.add_faulty_range(TABLES, 0x0010_0000);
    enable_mmu(&mut sys, &pt, MmuMode::DataOnly);

    sys.exec.read(0x0041_0000);
    sys.run(100).unwrap();
    assert!(sys.exec.data_results()[0].error);
    assert_eq!(sys.ctrl.errors().1, MmuError::PT2_ILLEGAL_ACCESS);
    assert_eq!(kinds(&sys), vec![PendingKind::DtlbWalk, PendingKind::DtlbWalk]);
    assert_eq!(sys.ctrl.dtlb_entries(), (0, 0));
}

/// Clock a bare controller until its command packet has been accepted
fn send_command(ctrl: &mut Controller, exec: &mut ScriptedExecutor) -> PendingKind {
    let quiet = BusInputs { cmdack: true, ..Default::default() };
    for _ in 0..20 {
        let cmd = ctrl.outputs().cmd;
        ctrl.tick(exec, &quiet, 0).unwrap();
        if cmd.valid && cmd.eop {
            return PendingKind::from_trdid(cmd.trdid).unwrap();
        }
    }
    panic!("no command went out");
}

fn response(kind: PendingKind, eop: bool) -> BusInputs {
    BusInputs {
        cmdack: true,
        rsp: ResponseCell { valid: true, trdid: kind.index() as u32, eop, ..Default::default() },
    }
}

#[test]
fn short_line_fill() {
    let mut ctrl = Controller::new(config()).unwrap();
    let mut exec = ScriptedExecutor::new();
    exec.read(0x4000);
    assert_eq!(send_command(&mut ctrl, &mut exec), PendingKind::DataMiss);

    ctrl.tick(&mut exec, &response(PendingKind::DataMiss, false), 0).unwrap();
    assert_eq!(
        ctrl.tick(&mut exec, &response(PendingKind::DataMiss, true), 0),
        Err(ProtocolViolation::FillTooShort { kind: PendingKind::DataMiss, received: 2, words: 8 })
    );
}

#[test]
fn single_word_answered_with_a_burst() {
    let mut ctrl = Controller::new(config()).unwrap();
    let mut exec = ScriptedExecutor::new();
    exec.read(UNCACHED);
    assert_eq!(send_command(&mut ctrl, &mut exec), PendingKind::DataUnc);

    assert_eq!(
        ctrl.tick(&mut exec, &response(PendingKind::DataUnc, false), 0),
        Err(ProtocolViolation::MissingEop { kind: PendingKind::DataUnc })
    );
}

#[test]
fn response_for_another_transaction() {
    let mut ctrl = Controller::new(config()).unwrap();
    let mut exec = ScriptedExecutor::new();
    exec.read(0x4000);
    assert_eq!(send_command(&mut ctrl, &mut exec), PendingKind::DataMiss);

    assert_eq!(
        ctrl.tick(&mut exec, &response(PendingKind::DataUnc, true), 0),
        Err(ProtocolViolation::WrongTransaction { kind: PendingKind::DataMiss, srcid: 0, trdid: 8 })
    );
}
