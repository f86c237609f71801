/// Every fallible operation in the crate reports one of these codes.
///
/// Variants are grouped by the phase that raises them; runtime traps are
/// terminal and unwind the whole wasm stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrCode {
    // --- Decoding ---
    EndOfFile,
    InvalidGrammar,
    MalformedLeb,
    InvalidUtf8,

    // --- Instantiation ---
    WrongInstanceAddress,
    InstantiationFailed,
    ImportNotFound,
    TypeMismatch,
    GlobalMutabilityMismatch,

    // --- Runtime traps ---
    Unreachable,
    IntegerOverflow,
    IntegerDivideByZero,
    InvalidConversion,
    MemoryOutOfBounds,
    TableOutOfBounds,
    IndirectCallTypeMismatch,
    UninitializedElement,
    ModifyConstGlobal,
    StackUnderflow,
    StackWrongEmpty,
    CallFunctionError,
    CallStackExhausted,
    CostLimitExceeded,

    // --- Executor state ---
    WrongExecutorState,
    WrongArgumentsCount,
}

impl std::fmt::Display for ErrCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            ErrCode::EndOfFile => "unexpected end of binary",
            ErrCode::InvalidGrammar => "invalid module grammar",
            ErrCode::MalformedLeb => "malformed leb128 integer",
            ErrCode::InvalidUtf8 => "invalid utf-8 name",
            ErrCode::WrongInstanceAddress => "wrong instance address",
            ErrCode::InstantiationFailed => "instantiation failed",
            ErrCode::ImportNotFound => "import not found",
            ErrCode::TypeMismatch => "type mismatch",
            ErrCode::GlobalMutabilityMismatch => "global mutability mismatch",
            ErrCode::Unreachable => "unreachable executed",
            ErrCode::IntegerOverflow => "integer overflow",
            ErrCode::IntegerDivideByZero => "integer divide by zero",
            ErrCode::InvalidConversion => "invalid conversion to integer",
            ErrCode::MemoryOutOfBounds => "out of bounds memory access",
            ErrCode::TableOutOfBounds => "out of bounds table access",
            ErrCode::IndirectCallTypeMismatch => "indirect call type mismatch",
            ErrCode::UninitializedElement => "uninitialized element",
            ErrCode::ModifyConstGlobal => "cannot modify constant global",
            ErrCode::StackUnderflow => "stack underflow",
            ErrCode::StackWrongEmpty => "stack not empty at exit",
            ErrCode::CallFunctionError => "host call marshalling failed",
            ErrCode::CallStackExhausted => "call stack exhausted",
            ErrCode::CostLimitExceeded => "cost limit exceeded",
            ErrCode::WrongExecutorState => "operation not legal in current state",
            ErrCode::WrongArgumentsCount => "wrong number of arguments",
        };
        write!(f, "{msg}")
    }
}

impl std::error::Error for ErrCode {}

pub type Result<T> = std::result::Result<T, ErrCode>;
