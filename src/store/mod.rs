use crate::error::{ErrCode, Result};
use crate::instance::{
    FunctionInstance, GlobalInstance, MemoryInstance, ModuleInstance, TableInstance,
};

/// Append-only pools of runtime instances, addressed by u32 handles.
///
/// The store owns every instance for the lifetime of the executor;
/// cross-references between instances are store addresses, never
/// pointers. Lookups are total on valid addresses and report
/// `WrongInstanceAddress` otherwise.
#[derive(Debug, Default)]
pub struct Store {
    funcs: Vec<FunctionInstance>,
    tables: Vec<TableInstance>,
    mems: Vec<MemoryInstance>,
    globals: Vec<GlobalInstance>,
    modules: Vec<ModuleInstance>,
}

macro_rules! pool_accessors {
    ($pool:ident, $ty:ty, $push:ident, $get:ident, $get_mut:ident) => {
        pub fn $push(&mut self, inst: $ty) -> u32 {
            self.$pool.push(inst);
            (self.$pool.len() - 1) as u32
        }

        pub fn $get(&self, addr: u32) -> Result<&$ty> {
            self.$pool
                .get(addr as usize)
                .ok_or(ErrCode::WrongInstanceAddress)
        }

        pub fn $get_mut(&mut self, addr: u32) -> Result<&mut $ty> {
            self.$pool
                .get_mut(addr as usize)
                .ok_or(ErrCode::WrongInstanceAddress)
        }
    };
}

impl Store {
    pub fn new() -> Self {
        Store::default()
    }

    pool_accessors!(funcs, FunctionInstance, push_func, func, func_mut);
    pool_accessors!(tables, TableInstance, push_table, table, table_mut);
    pool_accessors!(mems, MemoryInstance, push_memory, memory, memory_mut);
    pool_accessors!(globals, GlobalInstance, push_global, global, global_mut);
    pool_accessors!(modules, ModuleInstance, push_module, module, module_mut);

    pub fn func_count(&self) -> usize {
        self.funcs.len()
    }

    pub fn memory_count(&self) -> usize {
        self.mems.len()
    }

    pub fn global_count(&self) -> usize {
        self.globals.len()
    }
}
