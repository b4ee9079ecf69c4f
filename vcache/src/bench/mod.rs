//! Cycle level test bench: a controller, a scripted executor and a memory, clocked together.

mod executor;
mod page_table;
mod ram;

pub use self::{
    executor::ScriptedExecutor,
    page_table::PageTable,
    ram::{Ram, Transaction},
};

use anyhow::bail;

use crate::{config::Config, controller::Controller};

pub struct System {
    pub ctrl: Controller,
    pub exec: ScriptedExecutor,
    pub ram: Ram,
    pub irq: u32,
}

impl System {
    pub fn new(config: Config, latency: u64) -> anyhow::Result<System> {
        Ok(System {
            ctrl: Controller::new(config)?,
            exec: ScriptedExecutor::new(),
            ram: Ram::new(latency),
            irq: 0,
        })
    }

    /// One clock cycle: sample both ends of the port, transition everything, then let
    /// everyone drive their new outputs.
    pub fn tick(&mut self) -> anyhow::Result<()> {
        let outs = self.ctrl.outputs();
        let ins = self.ram.outputs();
        self.ctrl.tick(&mut self.exec, &ins, self.irq)?;
        self.ram.transition(&outs, &ins);
        Ok(())
    }

    /// Clock until `done` holds. Returns the number of cycles spent.
    pub fn run_until(&mut self, max_cycles: u64, mut done: impl FnMut(&System) -> bool) -> anyhow::Result<u64> {
        for cycle in 0..max_cycles {
            if done(self) {
                return Ok(cycle);
            }
            self.tick()?;
        }
        bail!("still running after {} cycles", max_cycles)
    }

    /// Clock until every scripted request has been answered
    pub fn run(&mut self, max_cycles: u64) -> anyhow::Result<u64> {
        self.run_until(max_cycles, |sys| sys.exec.is_done())
    }

    pub fn reset(&mut self) {
        use crate::iss::Executor;
        self.ctrl.reset();
        self.exec.reset();
    }
}
