mod instantiate;
mod snapshot;

pub use snapshot::{GlobalImage, MemoryImage, Snapshot};

use log::debug;

use crate::env::Environment;
use crate::error::{ErrCode, Result};
use crate::host::{HostFunc, HostFuncManager};
use crate::interpreter::Worker;
use crate::parse::{ExternalKind, Module};
use crate::stack::StackManager;
use crate::store::Store;
use crate::value::{FuncType, Value};

/// Executor lifecycle. Transitions are monotonic except for `reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Inited,
    ModuleSet,
    Instantiated,
    ArgsSet,
    Executed,
    Finished,
}

/// Flow control for one wasm execution: owns the store, the stack, the
/// host registry, and the run environment.
///
/// Drive it through `set_module` → `instantiate` → `set_args` → `run` →
/// `get_rets`; `reset` rewinds for another cycle.
#[derive(Debug, Default)]
pub struct Executor {
    state: State,
    start_func_name: Option<String>,
    module: Option<Module>,
    module_addr: Option<u32>,
    start_addr: Option<u32>,
    store: Store,
    stack: StackManager,
    host_funcs: HostFuncManager,
    env: Environment,
}

impl Default for State {
    fn default() -> Self {
        State::Inited
    }
}

impl Executor {
    pub fn new() -> Self {
        Executor::default()
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The live store, for external snapshot encoders and inspection.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Accumulated execution cost of the current cycle.
    pub fn cost(&self) -> u64 {
        self.env.cost()
    }

    /// Cap the cost meter; exceeding it traps with `CostLimitExceeded`.
    pub fn set_cost_limit(&mut self, limit: Option<u64>) {
        self.env.set_cost_limit(limit);
    }

    /// Register a host function. Legal in any state; registrations
    /// survive `reset`.
    pub fn set_host_function(&mut self, func: HostFunc) -> Result<()> {
        debug!("registering host function {}.{}", func.module, func.name);
        self.host_funcs.register(func);
        Ok(())
    }

    /// Override the start function by export name.
    ///
    /// Legal up to and including Instantiated; once instantiated the
    /// name is resolved against the live instance immediately.
    pub fn set_start_func_name(&mut self, name: &str) -> Result<()> {
        match self.state {
            State::Inited | State::ModuleSet => {
                self.start_func_name = Some(name.to_string());
                Ok(())
            }
            State::Instantiated => {
                self.start_func_name = Some(name.to_string());
                self.start_addr = Some(self.resolve_export_func(name)?);
                Ok(())
            }
            _ => Err(ErrCode::WrongExecutorState),
        }
    }

    /// Take ownership of a decoded module.
    pub fn set_module(&mut self, module: Module) -> Result<()> {
        if self.state != State::Inited {
            return Err(ErrCode::WrongExecutorState);
        }
        self.module = Some(module);
        self.state = State::ModuleSet;
        Ok(())
    }

    /// Build the runtime instance from the loaded module.
    ///
    /// Errors abort atomically: the store is cleared and the executor
    /// lands in Finished, recoverable only through `reset`.
    pub fn instantiate(&mut self) -> Result<()> {
        if self.state != State::ModuleSet {
            return Err(ErrCode::WrongExecutorState);
        }
        let module = self.module.take().ok_or(ErrCode::WrongExecutorState)?;
        match self.instantiate_module(module) {
            Ok(module_addr) => {
                self.module_addr = Some(module_addr);
                self.state = State::Instantiated;
                Ok(())
            }
            Err(code) => {
                debug!("instantiation failed: {code}");
                self.store = Store::new();
                self.module_addr = None;
                self.start_addr = None;
                self.state = State::Finished;
                Err(code)
            }
        }
    }

    /// Push the start function's arguments onto the stack.
    pub fn set_args(&mut self, args: Vec<Value>) -> Result<()> {
        if self.state != State::Instantiated {
            return Err(ErrCode::WrongExecutorState);
        }
        let ty = self.start_func_type()?;
        if args.len() != ty.params.len() {
            return Err(ErrCode::WrongArgumentsCount);
        }
        for (arg, param) in args.iter().zip(&ty.params) {
            if arg.ty() != *param {
                return Err(ErrCode::TypeMismatch);
            }
        }
        for arg in args {
            self.stack.push(arg);
        }
        self.state = State::ArgsSet;
        Ok(())
    }

    /// Run the start function to completion.
    ///
    /// On success the stack holds exactly the declared returns; a trap
    /// unwinds the whole wasm stack and lands in Finished.
    pub fn run(&mut self) -> Result<()> {
        if self.state != State::ArgsSet {
            return Err(ErrCode::WrongExecutorState);
        }
        let module_addr = self.module_addr.ok_or(ErrCode::WrongExecutorState)?;
        let start_addr = self.start_addr.ok_or(ErrCode::WrongExecutorState)?;
        let arity = self.start_func_type()?.returns.len();

        let mut worker = Worker {
            store: &mut self.store,
            stack: &mut self.stack,
            host: &self.host_funcs,
            env: &mut self.env,
        };
        match worker.run_start(start_addr, module_addr) {
            Ok(()) => {
                if self.stack.size() != arity || self.stack.frame_count() != 0 {
                    self.stack.reset();
                    self.state = State::Finished;
                    return Err(ErrCode::StackWrongEmpty);
                }
                self.state = State::Executed;
                Ok(())
            }
            Err(code) => {
                debug!("execution trapped: {code}");
                self.stack.reset();
                self.state = State::Finished;
                Err(code)
            }
        }
    }

    /// Drain the start function's returns, in declaration order.
    pub fn get_rets(&mut self) -> Result<Vec<Value>> {
        if self.state != State::Executed {
            return Err(ErrCode::WrongExecutorState);
        }
        let arity = self.start_func_type()?.returns.len();
        let mut rets = vec![Value::I32(0); arity];
        for slot in rets.iter_mut().rev() {
            *slot = self.stack.pop()?;
        }
        self.state = State::Finished;
        Ok(rets)
    }

    /// Clear run state. With `force` the module and the whole store are
    /// dropped too, returning to Inited; otherwise a live instance goes
    /// back to Instantiated for another args/run cycle.
    pub fn reset(&mut self, force: bool) {
        self.stack.reset();
        self.env.reset();
        if force {
            self.store = Store::new();
            self.module = None;
            self.module_addr = None;
            self.start_addr = None;
            self.state = State::Inited;
        } else {
            self.state = if self.module_addr.is_some() {
                State::Instantiated
            } else {
                State::Inited
            };
        }
    }

    /// Copy bytes out of an instance memory (by instance memory index).
    pub fn get_memory_bytes(&self, mem_idx: u32, offset: u32, len: u32) -> Result<Vec<u8>> {
        let addr = self.instance_mem_addr(mem_idx)?;
        Ok(self.store.memory(addr)?.get_bytes(offset, len)?.to_vec())
    }

    /// Copy bytes into an instance memory (by instance memory index).
    pub fn set_memory_bytes(&mut self, mem_idx: u32, offset: u32, bytes: &[u8]) -> Result<()> {
        let addr = self.instance_mem_addr(mem_idx)?;
        self.store.memory_mut(addr)?.set_bytes(offset, bytes)
    }

    /// Signature of the resolved start function.
    pub fn start_func_type(&self) -> Result<FuncType> {
        let module_addr = self.module_addr.ok_or(ErrCode::WrongExecutorState)?;
        let start_addr = self.start_addr.ok_or(ErrCode::WrongExecutorState)?;
        let func = self.store.func(start_addr)?;
        let module = self.store.module(module_addr)?;
        func.func_type(&module.types).map(FuncType::clone)
    }

    fn resolve_export_func(&self, name: &str) -> Result<u32> {
        let module_addr = self.module_addr.ok_or(ErrCode::WrongExecutorState)?;
        let export = self
            .store
            .module(module_addr)?
            .export(name)
            .ok_or(ErrCode::InstantiationFailed)?;
        if export.kind != ExternalKind::Func {
            return Err(ErrCode::InstantiationFailed);
        }
        Ok(export.addr)
    }

    pub(crate) fn instance_module_addr(&self) -> Result<u32> {
        self.module_addr.ok_or(ErrCode::WrongExecutorState)
    }

    fn instance_mem_addr(&self, mem_idx: u32) -> Result<u32> {
        let module_addr = self.instance_module_addr()?;
        self.store
            .module(module_addr)?
            .mem_addrs
            .get(mem_idx as usize)
            .copied()
            .ok_or(ErrCode::WrongInstanceAddress)
    }
}
