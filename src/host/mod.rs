use std::collections::HashMap;

use crate::env::Environment;
use crate::error::{ErrCode, Result};
use crate::instance::MemoryInstance;
use crate::stack::StackManager;
use crate::value::{FuncType, Value};

/// The native body of a host function.
///
/// Receives the run environment, the instance's linear memory when one
/// exists, and the marshalled arguments in declaration order. Returns
/// the single result value, if the signature declares one. The memory
/// borrow is scoped to the call; bodies must not retain it.
pub type HostBody =
    Box<dyn Fn(&mut Environment, Option<&mut MemoryInstance>, &[Value]) -> Result<Option<Value>>>;

/// A host-function descriptor: identity, signature, cost, and body.
///
/// The descriptor carries the parameter list; `invoke` is the adapter
/// that pops typed operands, dispatches the body, and pushes the typed
/// result.
pub struct HostFunc {
    pub module: String,
    pub name: String,
    pub ty: FuncType,
    pub cost: u64,
    body: HostBody,
}

impl HostFunc {
    pub fn new(
        module: impl Into<String>,
        name: impl Into<String>,
        ty: FuncType,
        cost: u64,
        body: HostBody,
    ) -> Self {
        HostFunc {
            module: module.into(),
            name: name.into(),
            ty,
            cost,
            body,
        }
    }

    /// Marshal a call through the wasm stack.
    ///
    /// The bottom N operands of the top-of-stack region (N = parameter
    /// count) are read in order and checked against the declared
    /// parameter tags; a mismatch is `CallFunctionError`. After the body
    /// returns, its result is pushed as a value of the declared return
    /// type.
    pub fn invoke(
        &self,
        env: &mut Environment,
        stack: &mut StackManager,
        mem: Option<&mut MemoryInstance>,
    ) -> Result<()> {
        let param_count = self.ty.params.len();
        if stack.value_count() < param_count {
            return Err(ErrCode::CallFunctionError);
        }
        let base = stack.size() - param_count;
        let mut args = Vec::with_capacity(param_count);
        for (i, param_ty) in self.ty.params.iter().enumerate() {
            let value = stack.get_bottom_n(base + i)?;
            if value.ty() != *param_ty {
                return Err(ErrCode::CallFunctionError);
            }
            args.push(value);
        }
        for _ in 0..param_count {
            stack.pop()?;
        }

        env.consume(self.cost)?;
        let ret = (self.body)(env, mem, &args)?;

        match (self.ty.returns.first(), ret) {
            (None, None) => Ok(()),
            (Some(ret_ty), Some(value)) if value.ty() == *ret_ty => {
                stack.push(value);
                Ok(())
            }
            _ => Err(ErrCode::CallFunctionError),
        }
    }
}

impl std::fmt::Debug for HostFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFunc")
            .field("module", &self.module)
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("cost", &self.cost)
            .finish()
    }
}

/// Registry mapping (module name, function name) to host descriptors.
#[derive(Debug, Default)]
pub struct HostFuncManager {
    funcs: Vec<HostFunc>,
    index: HashMap<(String, String), u32>,
}

impl HostFuncManager {
    pub fn new() -> Self {
        HostFuncManager::default()
    }

    /// Register a descriptor. Re-registering the same (module, name)
    /// replaces the previous body and signature.
    pub fn register(&mut self, func: HostFunc) -> u32 {
        let key = (func.module.clone(), func.name.clone());
        match self.index.get(&key) {
            Some(&idx) => {
                self.funcs[idx as usize] = func;
                idx
            }
            None => {
                let idx = self.funcs.len() as u32;
                self.funcs.push(func);
                self.index.insert(key, idx);
                idx
            }
        }
    }

    pub fn lookup(&self, module: &str, name: &str) -> Option<u32> {
        self.index
            .get(&(module.to_string(), name.to_string()))
            .copied()
    }

    pub fn get(&self, idx: u32) -> Result<&HostFunc> {
        self.funcs
            .get(idx as usize)
            .ok_or(ErrCode::WrongInstanceAddress)
    }
}
