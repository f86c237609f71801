//! The instantiation pipeline: sections in, store instances out.

use std::rc::Rc;

use log::debug;

use crate::error::{ErrCode, Result};
use crate::executor::Executor;
use crate::instance::{
    ExportInstance, FunctionInstance, GlobalInstance, HostFunctionRef, MemoryInstance,
    ModuleInstance, TableInstance, WasmFunction,
};
use crate::parse::{ExternalKind, ImportDesc, Instruction, Module};
use crate::value::Value;

impl Executor {
    /// Run the ordered pipeline over a consumed module AST.
    ///
    /// The module instance is built locally and committed to the store
    /// only at the end; the caller clears the store when any step
    /// errors, so no partial instance is ever visible.
    pub(super) fn instantiate_module(&mut self, module: Module) -> Result<u32> {
        let Module {
            types,
            imports,
            funcs,
            tables,
            memories,
            globals,
            exports,
            start,
            elements,
            code,
            data,
        } = module;

        // 1. Allocate the module address first: function instances carry
        // it as their back-reference.
        let module_addr = self.store.push_module(ModuleInstance::default());
        let mut inst = ModuleInstance {
            types,
            ..ModuleInstance::default()
        };

        // 2-3. Imports resolve against the host registry.
        for import in &imports {
            let ImportDesc::Func(type_idx) = &import.desc else {
                return Err(ErrCode::ImportNotFound);
            };
            let host_idx = self
                .host_funcs
                .lookup(&import.module, &import.name)
                .ok_or(ErrCode::ImportNotFound)?;
            let host = self.host_funcs.get(host_idx)?;
            let expected = inst
                .types
                .get(*type_idx as usize)
                .ok_or(ErrCode::InstantiationFailed)?;
            if host.ty != *expected {
                return Err(ErrCode::TypeMismatch);
            }
            let ty = host.ty.clone();
            let addr = self
                .store
                .push_func(FunctionInstance::Host(HostFunctionRef { host_idx, ty }));
            inst.func_addrs.push(addr);
        }

        // 4. Function + code sections pair up; bodies move in.
        for (type_idx, seg) in funcs.into_iter().zip(code) {
            if type_idx as usize >= inst.types.len() {
                return Err(ErrCode::InstantiationFailed);
            }
            let addr = self.store.push_func(FunctionInstance::Wasm(WasmFunction {
                module_addr,
                type_idx,
                locals: seg.locals,
                body: Rc::from(seg.body),
            }));
            inst.func_addrs.push(addr);
        }

        // 5. Globals: evaluate each initializer, then commit.
        for global in globals {
            let value = eval_init(&global.init)?;
            if value.ty() != global.ty {
                return Err(ErrCode::InstantiationFailed);
            }
            let addr = self
                .store
                .push_global(GlobalInstance::new(global.ty, global.mutability, value)?);
            inst.global_addrs.push(addr);
        }

        // 6. Tables, then element segments with bounds checks.
        for table in tables {
            let addr = self
                .store
                .push_table(TableInstance::new(table.limits.min, table.limits.max)?);
            inst.table_addrs.push(addr);
        }
        for elem in elements {
            let table_addr = inst
                .table_addrs
                .get(elem.table_idx as usize)
                .copied()
                .ok_or(ErrCode::InstantiationFailed)?;
            let offset = eval_offset(&elem.offset)?;
            let addrs = elem
                .func_idxs
                .iter()
                .map(|idx| inst.func_addr(*idx))
                .collect::<Result<Vec<u32>>>()
                .map_err(|_| ErrCode::InstantiationFailed)?;
            let table = self.store.table_mut(table_addr)?;
            let end = offset
                .checked_add(addrs.len())
                .ok_or(ErrCode::InstantiationFailed)?;
            if end > table.slots.len() {
                return Err(ErrCode::InstantiationFailed);
            }
            for (i, addr) in addrs.into_iter().enumerate() {
                table.slots[offset + i] = Some(addr);
            }
        }

        // 7. Memories (zero-filled), then data segments.
        for memory in memories {
            let addr = self
                .store
                .push_memory(MemoryInstance::new(memory.min, memory.max)?);
            inst.mem_addrs.push(addr);
        }
        for seg in data {
            let mem_addr = inst
                .mem_addrs
                .get(seg.mem_idx as usize)
                .copied()
                .ok_or(ErrCode::InstantiationFailed)?;
            let offset = eval_offset(&seg.offset)? as u64;
            let mem = self.store.memory_mut(mem_addr)?;
            if offset + seg.bytes.len() as u64 > mem.len() as u64 {
                return Err(ErrCode::InstantiationFailed);
            }
            mem.store(offset, &seg.bytes)
                .map_err(|_| ErrCode::InstantiationFailed)?;
        }

        // 8. Exports map names to (kind, store address).
        for export in exports {
            let addrs = match export.kind {
                ExternalKind::Func => &inst.func_addrs,
                ExternalKind::Table => &inst.table_addrs,
                ExternalKind::Memory => &inst.mem_addrs,
                ExternalKind::Global => &inst.global_addrs,
            };
            let addr = addrs
                .get(export.index as usize)
                .copied()
                .ok_or(ErrCode::InstantiationFailed)?;
            inst.exports.insert(
                export.name,
                ExportInstance {
                    kind: export.kind,
                    addr,
                },
            );
        }

        // 9. Start resolution: an explicit name overrides the binary's
        // start section.
        let start_addr = match &self.start_func_name {
            Some(name) => {
                let export = inst.export(name).ok_or(ErrCode::InstantiationFailed)?;
                if export.kind != ExternalKind::Func {
                    return Err(ErrCode::InstantiationFailed);
                }
                Some(export.addr)
            }
            None => match start {
                Some(idx) => Some(inst.func_addr(idx).map_err(|_| ErrCode::InstantiationFailed)?),
                None => None,
            },
        };

        debug!(
            "instantiated module at {module_addr}: {} funcs, {} tables, {} memories, {} globals, {} exports",
            inst.func_addrs.len(),
            inst.table_addrs.len(),
            inst.mem_addrs.len(),
            inst.global_addrs.len(),
            inst.exports.len()
        );
        *self.store.module_mut(module_addr)? = inst;
        self.start_addr = start_addr;
        Ok(module_addr)
    }
}

/// Evaluate an initializer expression on a fresh sub-stack.
///
/// Only a single `*.const` is accepted. A `global.get` initializer may
/// name only an imported global, and the registry provides no global
/// imports, so it can never resolve here.
fn eval_init(init: &[Instruction]) -> Result<Value> {
    match init {
        [Instruction::Const { value }] => Ok(*value),
        _ => Err(ErrCode::InstantiationFailed),
    }
}

/// Segment offsets must evaluate to an i32.
fn eval_offset(init: &[Instruction]) -> Result<usize> {
    let offset = eval_init(init)?
        .as_i32()
        .map_err(|_| ErrCode::InstantiationFailed)?;
    Ok(offset as u32 as usize)
}
