use crate::error::{ErrCode, Result};
use crate::parse::reader::ByteReader;
use crate::value::{ValType, Value};

macro_rules! opcodes {
    ($($name:ident = $byte:literal,)*) => {
        /// One-byte wasm MVP opcodes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(u8)]
        pub enum OpCode {
            $($name = $byte,)*
        }

        impl OpCode {
            pub fn from_byte(byte: u8) -> Option<OpCode> {
                match byte {
                    $($byte => Some(OpCode::$name),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    // Control
    Unreachable = 0x00,
    Nop = 0x01,
    Block = 0x02,
    Loop = 0x03,
    If = 0x04,
    Else = 0x05,
    End = 0x0B,
    Br = 0x0C,
    BrIf = 0x0D,
    BrTable = 0x0E,
    Return = 0x0F,
    Call = 0x10,
    CallIndirect = 0x11,
    // Parametric
    Drop = 0x1A,
    Select = 0x1B,
    // Variable
    LocalGet = 0x20,
    LocalSet = 0x21,
    LocalTee = 0x22,
    GlobalGet = 0x23,
    GlobalSet = 0x24,
    // Memory
    I32Load = 0x28,
    I64Load = 0x29,
    F32Load = 0x2A,
    F64Load = 0x2B,
    I32Load8S = 0x2C,
    I32Load8U = 0x2D,
    I32Load16S = 0x2E,
    I32Load16U = 0x2F,
    I64Load8S = 0x30,
    I64Load8U = 0x31,
    I64Load16S = 0x32,
    I64Load16U = 0x33,
    I64Load32S = 0x34,
    I64Load32U = 0x35,
    I32Store = 0x36,
    I64Store = 0x37,
    F32Store = 0x38,
    F64Store = 0x39,
    I32Store8 = 0x3A,
    I32Store16 = 0x3B,
    I64Store8 = 0x3C,
    I64Store16 = 0x3D,
    I64Store32 = 0x3E,
    MemorySize = 0x3F,
    MemoryGrow = 0x40,
    // Const
    I32Const = 0x41,
    I64Const = 0x42,
    F32Const = 0x43,
    F64Const = 0x44,
    // Numeric: i32 compare
    I32Eqz = 0x45,
    I32Eq = 0x46,
    I32Ne = 0x47,
    I32LtS = 0x48,
    I32LtU = 0x49,
    I32GtS = 0x4A,
    I32GtU = 0x4B,
    I32LeS = 0x4C,
    I32LeU = 0x4D,
    I32GeS = 0x4E,
    I32GeU = 0x4F,
    // Numeric: i64 compare
    I64Eqz = 0x50,
    I64Eq = 0x51,
    I64Ne = 0x52,
    I64LtS = 0x53,
    I64LtU = 0x54,
    I64GtS = 0x55,
    I64GtU = 0x56,
    I64LeS = 0x57,
    I64LeU = 0x58,
    I64GeS = 0x59,
    I64GeU = 0x5A,
    // Numeric: f32 compare
    F32Eq = 0x5B,
    F32Ne = 0x5C,
    F32Lt = 0x5D,
    F32Gt = 0x5E,
    F32Le = 0x5F,
    F32Ge = 0x60,
    // Numeric: f64 compare
    F64Eq = 0x61,
    F64Ne = 0x62,
    F64Lt = 0x63,
    F64Gt = 0x64,
    F64Le = 0x65,
    F64Ge = 0x66,
    // Numeric: i32 arithmetic
    I32Clz = 0x67,
    I32Ctz = 0x68,
    I32Popcnt = 0x69,
    I32Add = 0x6A,
    I32Sub = 0x6B,
    I32Mul = 0x6C,
    I32DivS = 0x6D,
    I32DivU = 0x6E,
    I32RemS = 0x6F,
    I32RemU = 0x70,
    I32And = 0x71,
    I32Or = 0x72,
    I32Xor = 0x73,
    I32Shl = 0x74,
    I32ShrS = 0x75,
    I32ShrU = 0x76,
    I32Rotl = 0x77,
    I32Rotr = 0x78,
    // Numeric: i64 arithmetic
    I64Clz = 0x79,
    I64Ctz = 0x7A,
    I64Popcnt = 0x7B,
    I64Add = 0x7C,
    I64Sub = 0x7D,
    I64Mul = 0x7E,
    I64DivS = 0x7F,
    I64DivU = 0x80,
    I64RemS = 0x81,
    I64RemU = 0x82,
    I64And = 0x83,
    I64Or = 0x84,
    I64Xor = 0x85,
    I64Shl = 0x86,
    I64ShrS = 0x87,
    I64ShrU = 0x88,
    I64Rotl = 0x89,
    I64Rotr = 0x8A,
    // Numeric: f32 arithmetic
    F32Abs = 0x8B,
    F32Neg = 0x8C,
    F32Ceil = 0x8D,
    F32Floor = 0x8E,
    F32Trunc = 0x8F,
    F32Nearest = 0x90,
    F32Sqrt = 0x91,
    F32Add = 0x92,
    F32Sub = 0x93,
    F32Mul = 0x94,
    F32Div = 0x95,
    F32Min = 0x96,
    F32Max = 0x97,
    F32Copysign = 0x98,
    // Numeric: f64 arithmetic
    F64Abs = 0x99,
    F64Neg = 0x9A,
    F64Ceil = 0x9B,
    F64Floor = 0x9C,
    F64Trunc = 0x9D,
    F64Nearest = 0x9E,
    F64Sqrt = 0x9F,
    F64Add = 0xA0,
    F64Sub = 0xA1,
    F64Mul = 0xA2,
    F64Div = 0xA3,
    F64Min = 0xA4,
    F64Max = 0xA5,
    F64Copysign = 0xA6,
    // Numeric: conversions
    I32WrapI64 = 0xA7,
    I32TruncF32S = 0xA8,
    I32TruncF32U = 0xA9,
    I32TruncF64S = 0xAA,
    I32TruncF64U = 0xAB,
    I64ExtendI32S = 0xAC,
    I64ExtendI32U = 0xAD,
    I64TruncF32S = 0xAE,
    I64TruncF32U = 0xAF,
    I64TruncF64S = 0xB0,
    I64TruncF64U = 0xB1,
    F32ConvertI32S = 0xB2,
    F32ConvertI32U = 0xB3,
    F32ConvertI64S = 0xB4,
    F32ConvertI64U = 0xB5,
    F32DemoteF64 = 0xB6,
    F64ConvertI32S = 0xB7,
    F64ConvertI32U = 0xB8,
    F64ConvertI64S = 0xB9,
    F64ConvertI64U = 0xBA,
    F64PromoteF32 = 0xBB,
    I32ReinterpretF32 = 0xBC,
    I64ReinterpretF64 = 0xBD,
    F32ReinterpretI32 = 0xBE,
    F64ReinterpretI64 = 0xBF,
}

/// A decoded instruction, one variant per opcode family.
///
/// Block bodies never contain the terminating `end` (or the `else`
/// separator); both are consumed during decode.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// `unreachable`, `nop`, `return`.
    Control { op: OpCode },
    /// `block` and `loop`.
    Block {
        op: OpCode,
        block_type: ValType,
        body: Vec<Instruction>,
    },
    IfElse {
        block_type: ValType,
        then_body: Vec<Instruction>,
        else_body: Vec<Instruction>,
    },
    /// `br` and `br_if`.
    Br { op: OpCode, label_idx: u32 },
    BrTable {
        label_table: Vec<u32>,
        default_label: u32,
    },
    /// `call` carries a function index, `call_indirect` a type index.
    Call { op: OpCode, index: u32 },
    /// `drop` and `select`.
    Parametric { op: OpCode },
    /// Local and global get/set/tee.
    Variable { op: OpCode, var_idx: u32 },
    /// Loads, stores, `memory.size`, `memory.grow`.
    Memory { op: OpCode, align: u32, offset: u32 },
    Const { value: Value },
    Numeric { op: OpCode },
}

/// What terminated a decoded instruction sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockEnd {
    End,
    Else,
}

/// Decode instructions until an `end` opcode, which is consumed.
pub(crate) fn decode_expr(reader: &mut ByteReader<'_>) -> Result<Vec<Instruction>> {
    let (body, end) = decode_body(reader, false)?;
    debug_assert_eq!(end, BlockEnd::End);
    Ok(body)
}

fn decode_body(
    reader: &mut ByteReader<'_>,
    stop_at_else: bool,
) -> Result<(Vec<Instruction>, BlockEnd)> {
    let mut body = Vec::new();
    loop {
        let byte = reader.read_byte()?;
        let op = OpCode::from_byte(byte).ok_or(ErrCode::InvalidGrammar)?;
        match op {
            OpCode::End => return Ok((body, BlockEnd::End)),
            OpCode::Else if stop_at_else => return Ok((body, BlockEnd::Else)),
            OpCode::Else => return Err(ErrCode::InvalidGrammar),
            _ => body.push(decode_instr(op, reader)?),
        }
    }
}

/// Decode the payload of a single non-`end`, non-`else` instruction.
fn decode_instr(op: OpCode, reader: &mut ByteReader<'_>) -> Result<Instruction> {
    let instr = match op {
        OpCode::Unreachable | OpCode::Nop | OpCode::Return => Instruction::Control { op },

        OpCode::Block | OpCode::Loop => {
            let block_type = read_block_type(reader)?;
            let (body, end) = decode_body(reader, false)?;
            debug_assert_eq!(end, BlockEnd::End);
            Instruction::Block {
                op,
                block_type,
                body,
            }
        }
        OpCode::If => {
            let block_type = read_block_type(reader)?;
            let (then_body, end) = decode_body(reader, true)?;
            let else_body = match end {
                BlockEnd::Else => decode_body(reader, false)?.0,
                BlockEnd::End => Vec::new(),
            };
            Instruction::IfElse {
                block_type,
                then_body,
                else_body,
            }
        }

        OpCode::Br | OpCode::BrIf => Instruction::Br {
            op,
            label_idx: reader.read_u32()?,
        },
        OpCode::BrTable => {
            let count = reader.read_u32()?;
            let mut label_table = Vec::with_capacity(count as usize);
            for _ in 0..count {
                label_table.push(reader.read_u32()?);
            }
            Instruction::BrTable {
                label_table,
                default_label: reader.read_u32()?,
            }
        }

        OpCode::Call => Instruction::Call {
            op,
            index: reader.read_u32()?,
        },
        OpCode::CallIndirect => {
            let index = reader.read_u32()?;
            // Reserved table index, must be zero in the MVP.
            if reader.read_byte()? != 0x00 {
                return Err(ErrCode::InvalidGrammar);
            }
            Instruction::Call { op, index }
        }

        OpCode::Drop | OpCode::Select => Instruction::Parametric { op },

        OpCode::LocalGet
        | OpCode::LocalSet
        | OpCode::LocalTee
        | OpCode::GlobalGet
        | OpCode::GlobalSet => Instruction::Variable {
            op,
            var_idx: reader.read_u32()?,
        },

        OpCode::MemorySize | OpCode::MemoryGrow => {
            // Reserved memory index, must be zero in the MVP.
            if reader.read_byte()? != 0x00 {
                return Err(ErrCode::InvalidGrammar);
            }
            Instruction::Memory {
                op,
                align: 0,
                offset: 0,
            }
        }
        OpCode::I32Load
        | OpCode::I64Load
        | OpCode::F32Load
        | OpCode::F64Load
        | OpCode::I32Load8S
        | OpCode::I32Load8U
        | OpCode::I32Load16S
        | OpCode::I32Load16U
        | OpCode::I64Load8S
        | OpCode::I64Load8U
        | OpCode::I64Load16S
        | OpCode::I64Load16U
        | OpCode::I64Load32S
        | OpCode::I64Load32U
        | OpCode::I32Store
        | OpCode::I64Store
        | OpCode::F32Store
        | OpCode::F64Store
        | OpCode::I32Store8
        | OpCode::I32Store16
        | OpCode::I64Store8
        | OpCode::I64Store16
        | OpCode::I64Store32 => Instruction::Memory {
            op,
            align: reader.read_u32()?,
            offset: reader.read_u32()?,
        },

        OpCode::I32Const => Instruction::Const {
            value: Value::I32(reader.read_s32()?),
        },
        OpCode::I64Const => Instruction::Const {
            value: Value::I64(reader.read_s64()?),
        },
        OpCode::F32Const => Instruction::Const {
            value: Value::F32(reader.read_f32()?),
        },
        OpCode::F64Const => Instruction::Const {
            value: Value::F64(reader.read_f64()?),
        },

        // `end` and `else` are structural and handled by decode_body.
        OpCode::End | OpCode::Else => return Err(ErrCode::InvalidGrammar),

        // Every remaining known opcode is numeric and carries no payload.
        _ => Instruction::Numeric { op },
    };
    Ok(instr)
}

/// Block result type: one of the four numeric types or `None` (0x40).
fn read_block_type(reader: &mut ByteReader<'_>) -> Result<ValType> {
    ValType::from_byte(reader.read_byte()?, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Result<Vec<Instruction>> {
        decode_expr(&mut ByteReader::new(bytes))
    }

    #[test]
    fn nested_blocks_consume_end() {
        // block (result i32) i32.const 7 end; end
        let body = decode(&[0x02, 0x7F, 0x41, 0x07, 0x0B, 0x0B]).unwrap();
        assert_eq!(body.len(), 1);
        let Instruction::Block {
            op,
            block_type,
            body: inner,
        } = &body[0]
        else {
            panic!("expected block, got {:?}", body[0]);
        };
        assert_eq!(*op, OpCode::Block);
        assert_eq!(*block_type, ValType::I32);
        assert_eq!(
            *inner,
            vec![Instruction::Const {
                value: Value::I32(7)
            }]
        );
    }

    #[test]
    fn if_else_splits_bodies() {
        // if nop else unreachable end; end
        let body = decode(&[0x04, 0x40, 0x01, 0x05, 0x00, 0x0B, 0x0B]).unwrap();
        let Instruction::IfElse {
            then_body,
            else_body,
            ..
        } = &body[0]
        else {
            panic!("expected if, got {:?}", body[0]);
        };
        assert_eq!(then_body.len(), 1);
        assert_eq!(else_body.len(), 1);
        assert!(matches!(
            else_body[0],
            Instruction::Control {
                op: OpCode::Unreachable
            }
        ));
    }

    #[test]
    fn call_indirect_reserved_byte() {
        assert_eq!(
            decode(&[0x11, 0x00, 0x01, 0x0B]),
            Err(ErrCode::InvalidGrammar)
        );
        let body = decode(&[0x11, 0x02, 0x00, 0x0B]).unwrap();
        assert_eq!(
            body[0],
            Instruction::Call {
                op: OpCode::CallIndirect,
                index: 2
            }
        );
    }

    #[test]
    fn memory_grow_reserved_byte() {
        assert_eq!(decode(&[0x40, 0x01, 0x0B]), Err(ErrCode::InvalidGrammar));
        assert!(decode(&[0x40, 0x00, 0x0B]).is_ok());
    }

    #[test]
    fn unknown_opcode_rejected() {
        assert_eq!(decode(&[0xC0, 0x0B]), Err(ErrCode::InvalidGrammar));
    }

    #[test]
    fn bad_block_type_rejected() {
        assert_eq!(decode(&[0x02, 0x7B, 0x0B, 0x0B]), Err(ErrCode::InvalidGrammar));
    }

    #[test]
    fn stray_else_rejected() {
        assert_eq!(decode(&[0x05, 0x0B]), Err(ErrCode::InvalidGrammar));
    }
}
