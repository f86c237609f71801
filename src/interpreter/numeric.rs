//! The MVP numeric instruction set, dispatched over the typed stack.

use crate::error::{ErrCode, Result};
use crate::parse::OpCode;
use crate::stack::StackManager;
use crate::value::Value;

/// Quiet a NaN produced by float arithmetic.
fn canon32(v: f32) -> f32 {
    if v.is_nan() {
        f32::from_bits(0x7FC0_0000)
    } else {
        v
    }
}

fn canon64(v: f64) -> f64 {
    if v.is_nan() {
        f64::from_bits(0x7FF8_0000_0000_0000)
    } else {
        v
    }
}

macro_rules! float_helpers {
    ($min:ident, $max:ident, $nearest:ident, $ty:ty) => {
        /// min/max with NaN propagation; -0 loses to +0 in min and wins in max.
        fn $min(a: $ty, b: $ty) -> $ty {
            if a.is_nan() || b.is_nan() {
                <$ty>::NAN
            } else if a == 0.0 && b == 0.0 {
                if a.is_sign_negative() || b.is_sign_negative() {
                    -0.0
                } else {
                    0.0
                }
            } else {
                a.min(b)
            }
        }

        fn $max(a: $ty, b: $ty) -> $ty {
            if a.is_nan() || b.is_nan() {
                <$ty>::NAN
            } else if a == 0.0 && b == 0.0 {
                if a.is_sign_positive() || b.is_sign_positive() {
                    0.0
                } else {
                    -0.0
                }
            } else {
                a.max(b)
            }
        }

        /// Round to nearest, ties to even.
        fn $nearest(a: $ty) -> $ty {
            if a.is_nan() || a.is_infinite() || a == 0.0 {
                return a;
            }
            let truncated = a.trunc();
            let frac = (a - truncated).abs();
            if frac > 0.5 || (frac == 0.5 && truncated % 2.0 != 0.0) {
                truncated + a.signum()
            } else {
                truncated
            }
        }
    };
}

float_helpers!(fmin32, fmax32, nearest32, f32);
float_helpers!(fmin64, fmax64, nearest64, f64);

macro_rules! binop {
    ($stack:expr, $pop:ident, $wrap:ident, $f:expr) => {{
        let b = $stack.$pop()?;
        let a = $stack.$pop()?;
        $stack.push(Value::$wrap($f(a, b)));
    }};
}

macro_rules! unop {
    ($stack:expr, $pop:ident, $wrap:ident, $f:expr) => {{
        let a = $stack.$pop()?;
        $stack.push(Value::$wrap($f(a)));
    }};
}

macro_rules! cmpop {
    ($stack:expr, $pop:ident, $f:expr) => {{
        let b = $stack.$pop()?;
        let a = $stack.$pop()?;
        $stack.push(Value::I32(if $f(a, b) { 1 } else { 0 }));
    }};
}

macro_rules! trunc_s {
    ($stack:expr, $pop:ident, $wrap:ident, $int:ty, $lo:expr, $hi:expr) => {{
        let a = $stack.$pop()?;
        if a.is_nan() {
            return Err(ErrCode::InvalidConversion);
        }
        let t = a.trunc();
        if t >= $hi || t < $lo {
            return Err(ErrCode::IntegerOverflow);
        }
        $stack.push(Value::$wrap(t as $int));
    }};
}

macro_rules! trunc_u {
    ($stack:expr, $pop:ident, $wrap:ident, $uint:ty, $int:ty, $hi:expr) => {{
        let a = $stack.$pop()?;
        if a.is_nan() {
            return Err(ErrCode::InvalidConversion);
        }
        let t = a.trunc();
        if t >= $hi || t < 0.0 {
            return Err(ErrCode::IntegerOverflow);
        }
        $stack.push(Value::$wrap(t as $uint as $int));
    }};
}

/// Execute one numeric opcode against the operand stack.
pub(crate) fn apply(op: OpCode, stack: &mut StackManager) -> Result<()> {
    match op {
        // --- i32 compare ---
        OpCode::I32Eqz => unop!(stack, pop_i32, I32, |a: i32| (a == 0) as i32),
        OpCode::I32Eq => cmpop!(stack, pop_i32, |a, b| a == b),
        OpCode::I32Ne => cmpop!(stack, pop_i32, |a, b| a != b),
        OpCode::I32LtS => cmpop!(stack, pop_i32, |a, b| a < b),
        OpCode::I32LtU => cmpop!(stack, pop_i32, |a: i32, b: i32| (a as u32) < (b as u32)),
        OpCode::I32GtS => cmpop!(stack, pop_i32, |a, b| a > b),
        OpCode::I32GtU => cmpop!(stack, pop_i32, |a: i32, b: i32| (a as u32) > (b as u32)),
        OpCode::I32LeS => cmpop!(stack, pop_i32, |a, b| a <= b),
        OpCode::I32LeU => cmpop!(stack, pop_i32, |a: i32, b: i32| (a as u32) <= (b as u32)),
        OpCode::I32GeS => cmpop!(stack, pop_i32, |a, b| a >= b),
        OpCode::I32GeU => cmpop!(stack, pop_i32, |a: i32, b: i32| (a as u32) >= (b as u32)),

        // --- i64 compare ---
        OpCode::I64Eqz => {
            let a = stack.pop_i64()?;
            stack.push(Value::I32((a == 0) as i32));
        }
        OpCode::I64Eq => cmpop!(stack, pop_i64, |a, b| a == b),
        OpCode::I64Ne => cmpop!(stack, pop_i64, |a, b| a != b),
        OpCode::I64LtS => cmpop!(stack, pop_i64, |a, b| a < b),
        OpCode::I64LtU => cmpop!(stack, pop_i64, |a: i64, b: i64| (a as u64) < (b as u64)),
        OpCode::I64GtS => cmpop!(stack, pop_i64, |a, b| a > b),
        OpCode::I64GtU => cmpop!(stack, pop_i64, |a: i64, b: i64| (a as u64) > (b as u64)),
        OpCode::I64LeS => cmpop!(stack, pop_i64, |a, b| a <= b),
        OpCode::I64LeU => cmpop!(stack, pop_i64, |a: i64, b: i64| (a as u64) <= (b as u64)),
        OpCode::I64GeS => cmpop!(stack, pop_i64, |a, b| a >= b),
        OpCode::I64GeU => cmpop!(stack, pop_i64, |a: i64, b: i64| (a as u64) >= (b as u64)),

        // --- float compare ---
        OpCode::F32Eq => cmpop!(stack, pop_f32, |a, b| a == b),
        OpCode::F32Ne => cmpop!(stack, pop_f32, |a, b| a != b),
        OpCode::F32Lt => cmpop!(stack, pop_f32, |a, b| a < b),
        OpCode::F32Gt => cmpop!(stack, pop_f32, |a, b| a > b),
        OpCode::F32Le => cmpop!(stack, pop_f32, |a, b| a <= b),
        OpCode::F32Ge => cmpop!(stack, pop_f32, |a, b| a >= b),
        OpCode::F64Eq => cmpop!(stack, pop_f64, |a, b| a == b),
        OpCode::F64Ne => cmpop!(stack, pop_f64, |a, b| a != b),
        OpCode::F64Lt => cmpop!(stack, pop_f64, |a, b| a < b),
        OpCode::F64Gt => cmpop!(stack, pop_f64, |a, b| a > b),
        OpCode::F64Le => cmpop!(stack, pop_f64, |a, b| a <= b),
        OpCode::F64Ge => cmpop!(stack, pop_f64, |a, b| a >= b),

        // --- i32 arithmetic ---
        OpCode::I32Clz => unop!(stack, pop_i32, I32, |a: i32| a.leading_zeros() as i32),
        OpCode::I32Ctz => unop!(stack, pop_i32, I32, |a: i32| a.trailing_zeros() as i32),
        OpCode::I32Popcnt => unop!(stack, pop_i32, I32, |a: i32| a.count_ones() as i32),
        OpCode::I32Add => binop!(stack, pop_i32, I32, |a: i32, b: i32| a.wrapping_add(b)),
        OpCode::I32Sub => binop!(stack, pop_i32, I32, |a: i32, b: i32| a.wrapping_sub(b)),
        OpCode::I32Mul => binop!(stack, pop_i32, I32, |a: i32, b: i32| a.wrapping_mul(b)),
        OpCode::I32DivS => {
            let b = stack.pop_i32()?;
            let a = stack.pop_i32()?;
            if b == 0 {
                return Err(ErrCode::IntegerDivideByZero);
            }
            if a == i32::MIN && b == -1 {
                return Err(ErrCode::IntegerOverflow);
            }
            stack.push(Value::I32(a.wrapping_div(b)));
        }
        OpCode::I32DivU => {
            let b = stack.pop_i32()? as u32;
            let a = stack.pop_i32()? as u32;
            if b == 0 {
                return Err(ErrCode::IntegerDivideByZero);
            }
            stack.push(Value::I32((a / b) as i32));
        }
        OpCode::I32RemS => {
            let b = stack.pop_i32()?;
            let a = stack.pop_i32()?;
            if b == 0 {
                return Err(ErrCode::IntegerDivideByZero);
            }
            stack.push(Value::I32(a.wrapping_rem(b)));
        }
        OpCode::I32RemU => {
            let b = stack.pop_i32()? as u32;
            let a = stack.pop_i32()? as u32;
            if b == 0 {
                return Err(ErrCode::IntegerDivideByZero);
            }
            stack.push(Value::I32((a % b) as i32));
        }
        OpCode::I32And => binop!(stack, pop_i32, I32, |a, b| a & b),
        OpCode::I32Or => binop!(stack, pop_i32, I32, |a, b| a | b),
        OpCode::I32Xor => binop!(stack, pop_i32, I32, |a, b| a ^ b),
        OpCode::I32Shl => binop!(stack, pop_i32, I32, |a: i32, b: i32| a.wrapping_shl(b as u32)),
        OpCode::I32ShrS => binop!(stack, pop_i32, I32, |a: i32, b: i32| a.wrapping_shr(b as u32)),
        OpCode::I32ShrU => binop!(stack, pop_i32, I32, |a: i32, b: i32| (a as u32)
            .wrapping_shr(b as u32)
            as i32),
        OpCode::I32Rotl => binop!(stack, pop_i32, I32, |a: i32, b: i32| a.rotate_left(b as u32)),
        OpCode::I32Rotr => binop!(stack, pop_i32, I32, |a: i32, b: i32| a.rotate_right(b as u32)),

        // --- i64 arithmetic ---
        OpCode::I64Clz => unop!(stack, pop_i64, I64, |a: i64| a.leading_zeros() as i64),
        OpCode::I64Ctz => unop!(stack, pop_i64, I64, |a: i64| a.trailing_zeros() as i64),
        OpCode::I64Popcnt => unop!(stack, pop_i64, I64, |a: i64| a.count_ones() as i64),
        OpCode::I64Add => binop!(stack, pop_i64, I64, |a: i64, b: i64| a.wrapping_add(b)),
        OpCode::I64Sub => binop!(stack, pop_i64, I64, |a: i64, b: i64| a.wrapping_sub(b)),
        OpCode::I64Mul => binop!(stack, pop_i64, I64, |a: i64, b: i64| a.wrapping_mul(b)),
        OpCode::I64DivS => {
            let b = stack.pop_i64()?;
            let a = stack.pop_i64()?;
            if b == 0 {
                return Err(ErrCode::IntegerDivideByZero);
            }
            if a == i64::MIN && b == -1 {
                return Err(ErrCode::IntegerOverflow);
            }
            stack.push(Value::I64(a.wrapping_div(b)));
        }
        OpCode::I64DivU => {
            let b = stack.pop_i64()? as u64;
            let a = stack.pop_i64()? as u64;
            if b == 0 {
                return Err(ErrCode::IntegerDivideByZero);
            }
            stack.push(Value::I64((a / b) as i64));
        }
        OpCode::I64RemS => {
            let b = stack.pop_i64()?;
            let a = stack.pop_i64()?;
            if b == 0 {
                return Err(ErrCode::IntegerDivideByZero);
            }
            stack.push(Value::I64(a.wrapping_rem(b)));
        }
        OpCode::I64RemU => {
            let b = stack.pop_i64()? as u64;
            let a = stack.pop_i64()? as u64;
            if b == 0 {
                return Err(ErrCode::IntegerDivideByZero);
            }
            stack.push(Value::I64((a % b) as i64));
        }
        OpCode::I64And => binop!(stack, pop_i64, I64, |a, b| a & b),
        OpCode::I64Or => binop!(stack, pop_i64, I64, |a, b| a | b),
        OpCode::I64Xor => binop!(stack, pop_i64, I64, |a, b| a ^ b),
        OpCode::I64Shl => binop!(stack, pop_i64, I64, |a: i64, b: i64| a.wrapping_shl(b as u32)),
        OpCode::I64ShrS => binop!(stack, pop_i64, I64, |a: i64, b: i64| a.wrapping_shr(b as u32)),
        OpCode::I64ShrU => binop!(stack, pop_i64, I64, |a: i64, b: i64| (a as u64)
            .wrapping_shr(b as u32)
            as i64),
        OpCode::I64Rotl => binop!(stack, pop_i64, I64, |a: i64, b: i64| a.rotate_left(b as u32)),
        OpCode::I64Rotr => binop!(stack, pop_i64, I64, |a: i64, b: i64| a.rotate_right(b as u32)),

        // --- f32 arithmetic ---
        OpCode::F32Abs => unop!(stack, pop_f32, F32, |a: f32| a.abs()),
        OpCode::F32Neg => unop!(stack, pop_f32, F32, |a: f32| -a),
        OpCode::F32Ceil => unop!(stack, pop_f32, F32, |a: f32| canon32(a.ceil())),
        OpCode::F32Floor => unop!(stack, pop_f32, F32, |a: f32| canon32(a.floor())),
        OpCode::F32Trunc => unop!(stack, pop_f32, F32, |a: f32| canon32(a.trunc())),
        OpCode::F32Nearest => unop!(stack, pop_f32, F32, |a: f32| canon32(nearest32(a))),
        OpCode::F32Sqrt => unop!(stack, pop_f32, F32, |a: f32| canon32(a.sqrt())),
        OpCode::F32Add => binop!(stack, pop_f32, F32, |a: f32, b: f32| canon32(a + b)),
        OpCode::F32Sub => binop!(stack, pop_f32, F32, |a: f32, b: f32| canon32(a - b)),
        OpCode::F32Mul => binop!(stack, pop_f32, F32, |a: f32, b: f32| canon32(a * b)),
        OpCode::F32Div => binop!(stack, pop_f32, F32, |a: f32, b: f32| canon32(a / b)),
        OpCode::F32Min => binop!(stack, pop_f32, F32, |a, b| canon32(fmin32(a, b))),
        OpCode::F32Max => binop!(stack, pop_f32, F32, |a, b| canon32(fmax32(a, b))),
        OpCode::F32Copysign => binop!(stack, pop_f32, F32, |a: f32, b: f32| a.copysign(b)),

        // --- f64 arithmetic ---
        OpCode::F64Abs => unop!(stack, pop_f64, F64, |a: f64| a.abs()),
        OpCode::F64Neg => unop!(stack, pop_f64, F64, |a: f64| -a),
        OpCode::F64Ceil => unop!(stack, pop_f64, F64, |a: f64| canon64(a.ceil())),
        OpCode::F64Floor => unop!(stack, pop_f64, F64, |a: f64| canon64(a.floor())),
        OpCode::F64Trunc => unop!(stack, pop_f64, F64, |a: f64| canon64(a.trunc())),
        OpCode::F64Nearest => unop!(stack, pop_f64, F64, |a: f64| canon64(nearest64(a))),
        OpCode::F64Sqrt => unop!(stack, pop_f64, F64, |a: f64| canon64(a.sqrt())),
        OpCode::F64Add => binop!(stack, pop_f64, F64, |a: f64, b: f64| canon64(a + b)),
        OpCode::F64Sub => binop!(stack, pop_f64, F64, |a: f64, b: f64| canon64(a - b)),
        OpCode::F64Mul => binop!(stack, pop_f64, F64, |a: f64, b: f64| canon64(a * b)),
        OpCode::F64Div => binop!(stack, pop_f64, F64, |a: f64, b: f64| canon64(a / b)),
        OpCode::F64Min => binop!(stack, pop_f64, F64, |a, b| canon64(fmin64(a, b))),
        OpCode::F64Max => binop!(stack, pop_f64, F64, |a, b| canon64(fmax64(a, b))),
        OpCode::F64Copysign => binop!(stack, pop_f64, F64, |a: f64, b: f64| a.copysign(b)),

        // --- conversions ---
        OpCode::I32WrapI64 => unop!(stack, pop_i64, I32, |a: i64| a as i32),
        OpCode::I64ExtendI32S => unop!(stack, pop_i32, I64, |a: i32| a as i64),
        OpCode::I64ExtendI32U => unop!(stack, pop_i32, I64, |a: i32| a as u32 as i64),

        OpCode::I32TruncF32S => {
            trunc_s!(stack, pop_f32, I32, i32, -2147483648.0_f32, 2147483648.0_f32)
        }
        OpCode::I32TruncF32U => trunc_u!(stack, pop_f32, I32, u32, i32, 4294967296.0_f32),
        OpCode::I32TruncF64S => {
            trunc_s!(stack, pop_f64, I32, i32, -2147483648.0_f64, 2147483648.0_f64)
        }
        OpCode::I32TruncF64U => trunc_u!(stack, pop_f64, I32, u32, i32, 4294967296.0_f64),
        OpCode::I64TruncF32S => trunc_s!(
            stack,
            pop_f32,
            I64,
            i64,
            -9223372036854775808.0_f32,
            9223372036854775808.0_f32
        ),
        OpCode::I64TruncF32U => trunc_u!(stack, pop_f32, I64, u64, i64, 18446744073709551616.0_f32),
        OpCode::I64TruncF64S => trunc_s!(
            stack,
            pop_f64,
            I64,
            i64,
            -9223372036854775808.0_f64,
            9223372036854775808.0_f64
        ),
        OpCode::I64TruncF64U => trunc_u!(stack, pop_f64, I64, u64, i64, 18446744073709551616.0_f64),

        OpCode::F32ConvertI32S => unop!(stack, pop_i32, F32, |a: i32| a as f32),
        OpCode::F32ConvertI32U => unop!(stack, pop_i32, F32, |a: i32| a as u32 as f32),
        OpCode::F32ConvertI64S => unop!(stack, pop_i64, F32, |a: i64| a as f32),
        OpCode::F32ConvertI64U => unop!(stack, pop_i64, F32, |a: i64| a as u64 as f32),
        OpCode::F32DemoteF64 => unop!(stack, pop_f64, F32, |a: f64| canon32(a as f32)),
        OpCode::F64ConvertI32S => unop!(stack, pop_i32, F64, |a: i32| a as f64),
        OpCode::F64ConvertI32U => unop!(stack, pop_i32, F64, |a: i32| a as u32 as f64),
        OpCode::F64ConvertI64S => unop!(stack, pop_i64, F64, |a: i64| a as f64),
        OpCode::F64ConvertI64U => unop!(stack, pop_i64, F64, |a: i64| a as u64 as f64),
        OpCode::F64PromoteF32 => unop!(stack, pop_f32, F64, |a: f32| canon64(a as f64)),

        OpCode::I32ReinterpretF32 => unop!(stack, pop_f32, I32, |a: f32| a.to_bits() as i32),
        OpCode::I64ReinterpretF64 => unop!(stack, pop_f64, I64, |a: f64| a.to_bits() as i64),
        OpCode::F32ReinterpretI32 => unop!(stack, pop_i32, F32, |a: i32| f32::from_bits(a as u32)),
        OpCode::F64ReinterpretI64 => unop!(stack, pop_i64, F64, |a: i64| f64::from_bits(a as u64)),

        // Non-numeric opcodes never reach this table.
        _ => return Err(ErrCode::InvalidGrammar),
    }
    Ok(())
}
