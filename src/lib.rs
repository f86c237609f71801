//! An interpreting WebAssembly virtual machine core: binary decoder,
//! store, stack machine, host-function bridge, and executor.

mod env;
mod error;
mod executor;
mod host;
mod instance;
mod interpreter;
mod parse;
mod stack;
mod store;
mod value;

pub use env::Environment;
pub use error::{ErrCode, Result};
pub use executor::{Executor, GlobalImage, MemoryImage, Snapshot, State};
pub use host::{HostBody, HostFunc, HostFuncManager};
pub use instance::{
    ExportInstance, FunctionInstance, GlobalInstance, HostFunctionRef, MemoryInstance,
    ModuleInstance, TableInstance, WasmFunction, PAGE_SIZE,
};
pub use parse::{
    ByteReader, CodeSeg, DataSeg, ElemSeg, Export, ExternalKind, GlobalSeg, Import, ImportDesc,
    Instruction, Limits, Module, OpCode, TableType,
};
pub use stack::{Frame, Label, StackManager};
pub use store::Store;
pub use value::{FuncType, ValMut, ValType, Value};
