//! Machine
//!
//! The machine owns the flat physical memory, the hart array and
//! the loaded executable. It is the only place that holds all three
//! at once; the executor borrows one hart and the memory out of it
//! for each step. Resetting reapplies the executable image and
//! returns every hart to the entry point, optionally re-zeroing the
//! whole memory first (hard reset).

use log::debug;

use crate::elf_load::Executable;
use crate::exec::{self, Control, ExecOptions, ExecutionError, Observer, RunOutcome};
use crate::hart::Hart;
use crate::memory::{Memory, MemoryError};

pub struct Machine {
    memory: Memory,
    harts: Vec<Hart>,
    executable: Executable,
}

impl Machine {
    /// Build a machine with the given memory size in bytes, load
    /// the executable image and point every hart at the entry point
    pub fn new(
        executable: Executable,
        memory_size: u64,
        num_harts: usize,
    ) -> Result<Self, MemoryError> {
        let mut memory = Memory::new(memory_size);
        memory.load_executable(&executable)?;
        let harts = (0..num_harts)
            .map(|id| {
                let mut hart = Hart::new(id as u64);
                hart.reset(executable.entry);
                hart
            })
            .collect();
        Ok(Self {
            memory,
            harts,
            executable,
        })
    }

    /// Reapply the executable and return every hart to the entry
    /// point. A hard reset (clear_memory) re-zeroes all of memory
    /// first; a soft reset leaves non-image memory alone.
    pub fn reset(&mut self, clear_memory: bool) -> Result<(), MemoryError> {
        debug!("machine reset (clear_memory = {clear_memory})");
        if clear_memory {
            self.memory.reset();
        }
        self.memory.load_executable(&self.executable)?;
        for hart in &mut self.harts {
            hart.reset(self.executable.entry);
        }
        Ok(())
    }

    /// The compliance-mode trap address, if one was loaded
    pub fn tohost(&self) -> Option<u64> {
        self.executable.tohost()
    }

    pub fn executable(&self) -> &Executable {
        &self.executable
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn num_harts(&self) -> usize {
        self.harts.len()
    }

    pub fn hart(&self, hart_index: usize) -> &Hart {
        &self.harts[hart_index]
    }

    /// Execute one instruction on the given hart
    pub fn step(
        &mut self,
        hart_index: usize,
        observer: &mut Observer,
        options: &ExecOptions,
    ) -> Result<Control, ExecutionError> {
        exec::step(
            &mut self.harts[hart_index],
            &mut self.memory,
            self.executable.tohost(),
            observer,
            options,
        )
    }

    /// Trace the next instruction on the given hart without
    /// committing it
    pub fn whatif(
        &self,
        hart_index: usize,
        observer: &mut Observer,
        options: &ExecOptions,
    ) -> Result<(), ExecutionError> {
        exec::whatif(
            &self.harts[hart_index],
            &self.memory,
            self.executable.tohost(),
            observer,
            options,
        )
    }

    /// Run the given hart until it halts, hits the breakpoint, or
    /// errors
    pub fn run(
        &mut self,
        hart_index: usize,
        breakpoint: Option<u64>,
        observer: &mut Observer,
        options: &ExecOptions,
    ) -> Result<RunOutcome, ExecutionError> {
        exec::run(
            &mut self.harts[hart_index],
            &mut self.memory,
            self.executable.tohost(),
            breakpoint,
            observer,
            options,
        )
    }
}
