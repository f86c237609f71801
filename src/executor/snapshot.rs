//! Snapshot and restore of mutable instance state.
//!
//! The executor contracts the iteration order (ascending index) and the
//! shape of the payload; serialisation lives outside the core.

use log::debug;

use crate::error::{ErrCode, Result};
use crate::executor::Executor;
use crate::instance::PAGE_SIZE;
use crate::value::{ValType, Value};

/// One linear memory: page count plus the raw page bytes.
#[derive(Debug, Clone)]
pub struct MemoryImage {
    pub idx: u32,
    pub page_count: u32,
    pub bytes: Vec<u8>,
}

/// One global: its declared type and current value.
#[derive(Debug, Clone)]
pub struct GlobalImage {
    pub idx: u32,
    pub ty: ValType,
    pub value: Value,
}

/// Mutable state of an instantiated module, ordered by ascending index.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub memories: Vec<MemoryImage>,
    pub globals: Vec<GlobalImage>,
}

impl Executor {
    /// Capture every memory and global of the live instance.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let module_addr = self.instance_module_addr()?;
        let module = self.store.module(module_addr)?;

        let mut snapshot = Snapshot::default();
        for (idx, &addr) in module.mem_addrs.iter().enumerate() {
            let mem = self.store.memory(addr)?;
            snapshot.memories.push(MemoryImage {
                idx: idx as u32,
                page_count: mem.page_count(),
                bytes: mem.as_bytes().to_vec(),
            });
        }
        for (idx, &addr) in module.global_addrs.iter().enumerate() {
            let global = self.store.global(addr)?;
            snapshot.globals.push(GlobalImage {
                idx: idx as u32,
                ty: global.ty,
                value: global.value(),
            });
        }
        debug!(
            "snapshot: {} memories, {} globals",
            snapshot.memories.len(),
            snapshot.globals.len()
        );
        Ok(snapshot)
    }

    /// Write a snapshot back into the live instance.
    ///
    /// The instance must come from a matching module: memory indices,
    /// global indices, and global types must all line up. Memories grow
    /// to the recorded page count when needed; a snapshot smaller than
    /// the current memory is a mismatch.
    pub fn restore(&mut self, snapshot: &Snapshot) -> Result<()> {
        let module_addr = self.instance_module_addr()?;

        for image in &snapshot.memories {
            if image.bytes.len() != image.page_count as usize * PAGE_SIZE {
                return Err(ErrCode::InstantiationFailed);
            }
            let addr = {
                let module = self.store.module(module_addr)?;
                module
                    .mem_addrs
                    .get(image.idx as usize)
                    .copied()
                    .ok_or(ErrCode::WrongInstanceAddress)?
            };
            let mem = self.store.memory_mut(addr)?;
            let current = mem.page_count();
            if current > image.page_count {
                return Err(ErrCode::InstantiationFailed);
            }
            if current < image.page_count && mem.grow(image.page_count - current) < 0 {
                return Err(ErrCode::InstantiationFailed);
            }
            mem.set_bytes(0, &image.bytes)?;
        }

        for image in &snapshot.globals {
            let addr = {
                let module = self.store.module(module_addr)?;
                module
                    .global_addrs
                    .get(image.idx as usize)
                    .copied()
                    .ok_or(ErrCode::WrongInstanceAddress)?
            };
            let global = self.store.global_mut(addr)?;
            if global.ty != image.ty {
                return Err(ErrCode::GlobalMutabilityMismatch);
            }
            global.restore_value(image.value)?;
        }
        Ok(())
    }
}
