//! Wasm binary decoding: byte reader, instruction decoder, section loader.

pub(crate) mod instr;
pub(crate) mod reader;

pub use instr::{Instruction, OpCode};
pub use reader::ByteReader;

use log::debug;

use crate::error::{ErrCode, Result};
use crate::value::{FuncType, ValMut, ValType};

const WASM_MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];
const WASM_VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// A decoded wasm module: the immutable section AST.
///
/// Owned by the executor from `set_module` until `instantiate`, which
/// consumes it (function bodies move into function instances).
#[derive(Debug, Default)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    /// Type index of each module-defined function, paired with `code`.
    pub funcs: Vec<u32>,
    pub tables: Vec<TableType>,
    pub memories: Vec<Limits>,
    pub globals: Vec<GlobalSeg>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub elements: Vec<ElemSeg>,
    pub code: Vec<CodeSeg>,
    pub data: Vec<DataSeg>,
}

#[derive(Debug, Clone)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub desc: ImportDesc,
}

#[derive(Debug, Clone)]
pub enum ImportDesc {
    /// Type index of the imported function.
    Func(u32),
    Table(TableType),
    Memory(Limits),
    Global { ty: ValType, mutability: ValMut },
}

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

/// Table type; the only element type in the MVP is `funcref` (0x70).
#[derive(Debug, Clone, Copy)]
pub struct TableType {
    pub limits: Limits,
}

#[derive(Debug)]
pub struct GlobalSeg {
    pub ty: ValType,
    pub mutability: ValMut,
    pub init: Vec<Instruction>,
}

#[derive(Debug, Clone)]
pub struct Export {
    pub name: String,
    pub kind: ExternalKind,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalKind {
    Func,
    Table,
    Memory,
    Global,
}

#[derive(Debug)]
pub struct ElemSeg {
    pub table_idx: u32,
    pub offset: Vec<Instruction>,
    pub func_idxs: Vec<u32>,
}

#[derive(Debug)]
pub struct CodeSeg {
    /// Declared locals, expanded (one entry per local, not per group).
    pub locals: Vec<ValType>,
    pub body: Vec<Instruction>,
}

#[derive(Debug)]
pub struct DataSeg {
    pub mem_idx: u32,
    pub offset: Vec<Instruction>,
    pub bytes: Vec<u8>,
}

impl Module {
    /// Decode a module from wasm binary bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Module> {
        load_module(&mut ByteReader::new(bytes))
    }

    /// Compile a WAT string and decode the resulting binary.
    pub fn from_wat(wat: &str) -> Result<Module> {
        let bytes = wat::parse_str(wat).map_err(|e| {
            debug!("wat compilation failed: {e}");
            ErrCode::InvalidGrammar
        })?;
        Module::from_bytes(&bytes)
    }
}

/// Read the preamble, then each `(id, size, payload)` section in order.
pub fn load_module(reader: &mut ByteReader<'_>) -> Result<Module> {
    if reader.read_bytes(4)? != WASM_MAGIC {
        return Err(ErrCode::InvalidGrammar);
    }
    if reader.read_bytes(4)? != WASM_VERSION {
        return Err(ErrCode::InvalidGrammar);
    }

    let mut module = Module::default();
    let mut last_id = 0u8;
    while !reader.is_empty() {
        let id = reader.read_byte()?;
        let size = reader.read_u32()? as usize;
        if id > 11 {
            return Err(ErrCode::InvalidGrammar);
        }
        if id == 0 {
            // Custom section: skip the payload.
            reader.skip(size)?;
            continue;
        }
        // Known sections appear at most once, in ascending id order.
        if id <= last_id {
            return Err(ErrCode::InvalidGrammar);
        }
        last_id = id;

        let start = reader.pos();
        match id {
            1 => load_type_section(reader, &mut module)?,
            2 => load_import_section(reader, &mut module)?,
            3 => load_function_section(reader, &mut module)?,
            4 => load_table_section(reader, &mut module)?,
            5 => load_memory_section(reader, &mut module)?,
            6 => load_global_section(reader, &mut module)?,
            7 => load_export_section(reader, &mut module)?,
            8 => module.start = Some(reader.read_u32()?),
            9 => load_element_section(reader, &mut module)?,
            10 => load_code_section(reader, &mut module)?,
            11 => load_data_section(reader, &mut module)?,
            _ => unreachable!(),
        }
        // The payload must be consumed exactly.
        if reader.pos() - start != size {
            return Err(ErrCode::InvalidGrammar);
        }
    }

    if module.funcs.len() != module.code.len() {
        return Err(ErrCode::InvalidGrammar);
    }
    debug!(
        "decoded module: {} types, {} imports, {} funcs, {} exports",
        module.types.len(),
        module.imports.len(),
        module.funcs.len(),
        module.exports.len()
    );
    Ok(module)
}

fn load_type_section(reader: &mut ByteReader<'_>, module: &mut Module) -> Result<()> {
    let count = reader.read_u32()?;
    for _ in 0..count {
        if reader.read_byte()? != 0x60 {
            return Err(ErrCode::InvalidGrammar);
        }
        let params = read_valtype_vec(reader)?;
        let returns = read_valtype_vec(reader)?;
        if returns.len() > 1 {
            return Err(ErrCode::InvalidGrammar);
        }
        module.types.push(FuncType { params, returns });
    }
    Ok(())
}

fn load_import_section(reader: &mut ByteReader<'_>, module: &mut Module) -> Result<()> {
    let count = reader.read_u32()?;
    for _ in 0..count {
        let mod_name = reader.read_name()?;
        let name = reader.read_name()?;
        let desc = match reader.read_byte()? {
            0x00 => ImportDesc::Func(reader.read_u32()?),
            0x01 => ImportDesc::Table(read_table_type(reader)?),
            0x02 => ImportDesc::Memory(read_limits(reader)?),
            0x03 => ImportDesc::Global {
                ty: ValType::from_byte(reader.read_byte()?, false)?,
                mutability: read_mutability(reader)?,
            },
            _ => return Err(ErrCode::InvalidGrammar),
        };
        module.imports.push(Import {
            module: mod_name,
            name,
            desc,
        });
    }
    Ok(())
}

fn load_function_section(reader: &mut ByteReader<'_>, module: &mut Module) -> Result<()> {
    let count = reader.read_u32()?;
    for _ in 0..count {
        module.funcs.push(reader.read_u32()?);
    }
    Ok(())
}

fn load_table_section(reader: &mut ByteReader<'_>, module: &mut Module) -> Result<()> {
    let count = reader.read_u32()?;
    for _ in 0..count {
        module.tables.push(read_table_type(reader)?);
    }
    Ok(())
}

fn load_memory_section(reader: &mut ByteReader<'_>, module: &mut Module) -> Result<()> {
    let count = reader.read_u32()?;
    for _ in 0..count {
        module.memories.push(read_limits(reader)?);
    }
    Ok(())
}

fn load_global_section(reader: &mut ByteReader<'_>, module: &mut Module) -> Result<()> {
    let count = reader.read_u32()?;
    for _ in 0..count {
        let ty = ValType::from_byte(reader.read_byte()?, false)?;
        let mutability = read_mutability(reader)?;
        let init = instr::decode_expr(reader)?;
        module.globals.push(GlobalSeg {
            ty,
            mutability,
            init,
        });
    }
    Ok(())
}

fn load_export_section(reader: &mut ByteReader<'_>, module: &mut Module) -> Result<()> {
    let count = reader.read_u32()?;
    for _ in 0..count {
        let name = reader.read_name()?;
        let kind = match reader.read_byte()? {
            0x00 => ExternalKind::Func,
            0x01 => ExternalKind::Table,
            0x02 => ExternalKind::Memory,
            0x03 => ExternalKind::Global,
            _ => return Err(ErrCode::InvalidGrammar),
        };
        let index = reader.read_u32()?;
        module.exports.push(Export { name, kind, index });
    }
    Ok(())
}

fn load_element_section(reader: &mut ByteReader<'_>, module: &mut Module) -> Result<()> {
    let count = reader.read_u32()?;
    for _ in 0..count {
        let table_idx = reader.read_u32()?;
        let offset = instr::decode_expr(reader)?;
        let func_count = reader.read_u32()?;
        let mut func_idxs = Vec::with_capacity(func_count as usize);
        for _ in 0..func_count {
            func_idxs.push(reader.read_u32()?);
        }
        module.elements.push(ElemSeg {
            table_idx,
            offset,
            func_idxs,
        });
    }
    Ok(())
}

fn load_code_section(reader: &mut ByteReader<'_>, module: &mut Module) -> Result<()> {
    let count = reader.read_u32()?;
    for _ in 0..count {
        let size = reader.read_u32()? as usize;
        let start = reader.pos();
        let group_count = reader.read_u32()?;
        let mut locals = Vec::new();
        for _ in 0..group_count {
            let n = reader.read_u32()?;
            let ty = ValType::from_byte(reader.read_byte()?, false)?;
            // Guard against absurd declared counts before allocating.
            if locals.len() as u64 + n as u64 > 1_000_000 {
                return Err(ErrCode::InvalidGrammar);
            }
            locals.extend(std::iter::repeat(ty).take(n as usize));
        }
        let body = instr::decode_expr(reader)?;
        if reader.pos() - start != size {
            return Err(ErrCode::InvalidGrammar);
        }
        module.code.push(CodeSeg { locals, body });
    }
    Ok(())
}

fn load_data_section(reader: &mut ByteReader<'_>, module: &mut Module) -> Result<()> {
    let count = reader.read_u32()?;
    for _ in 0..count {
        let mem_idx = reader.read_u32()?;
        let offset = instr::decode_expr(reader)?;
        let len = reader.read_u32()? as usize;
        let bytes = reader.read_bytes(len)?.to_vec();
        module.data.push(DataSeg {
            mem_idx,
            offset,
            bytes,
        });
    }
    Ok(())
}

fn read_valtype_vec(reader: &mut ByteReader<'_>) -> Result<Vec<ValType>> {
    let count = reader.read_u32()?;
    let mut types = Vec::with_capacity(count.min(64) as usize);
    for _ in 0..count {
        types.push(ValType::from_byte(reader.read_byte()?, false)?);
    }
    Ok(types)
}

fn read_table_type(reader: &mut ByteReader<'_>) -> Result<TableType> {
    // funcref is the only MVP element type.
    if reader.read_byte()? != 0x70 {
        return Err(ErrCode::InvalidGrammar);
    }
    Ok(TableType {
        limits: read_limits(reader)?,
    })
}

fn read_limits(reader: &mut ByteReader<'_>) -> Result<Limits> {
    match reader.read_byte()? {
        0x00 => Ok(Limits {
            min: reader.read_u32()?,
            max: None,
        }),
        0x01 => {
            let min = reader.read_u32()?;
            let max = reader.read_u32()?;
            Ok(Limits {
                min,
                max: Some(max),
            })
        }
        _ => Err(ErrCode::InvalidGrammar),
    }
}

fn read_mutability(reader: &mut ByteReader<'_>) -> Result<ValMut> {
    match reader.read_byte()? {
        0x00 => Ok(ValMut::Const),
        0x01 => Ok(ValMut::Var),
        _ => Err(ErrCode::InvalidGrammar),
    }
}
