use flow_syntax::symbol::SymbolId;

use crate::constant::ConstRef;
use crate::ids::VarSlot;

/// The comparison an `*CmpZero`/`*Cmp` opcode evaluates (spec §4.3: Number
/// comparisons go through a single "compare to zero" family, while String
/// comparisons are listed as their own explicit relations).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One instruction opcode (spec §4.3). Operand counts and kinds are fixed
/// per opcode; [`crate::handler::Instruction::operands`] is the operand
/// list and codegen/the verifier check arity against this table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Materialize a constant-pool entry as a fresh value. 0 operands.
    LoadConst(ConstRef),
    /// Materialize a Boolean literal. Booleans are two values, not worth a
    /// constant-pool arena. 0 operands.
    LoadBool(bool),
    /// Materialize a reference to a (possibly still forward-declared)
    /// handler by symbol, for an `Expr::HandlerRef` (spec §3 literal type
    /// `Handler`). Resolved to a handler index at link time
    /// (`flow-codegen`). 0 operands.
    LoadHandlerRef(SymbolId),
    /// Read a variable's current value. 0 operands.
    Load(VarSlot),
    /// Write a value into a variable. 1 operand (the value to store), no
    /// result.
    Store(VarSlot),

    // --- Number (spec §4.3 "arithmetic on Number") ---
    NAdd,
    NSub,
    NMul,
    NDiv,
    NRem,
    NPow,
    NShl,
    /// Logical right shift over the 64-bit pattern (spec §9 resolved Open
    /// Question 1: v2/FlowMachine semantics, not an arithmetic shift).
    NLShr,
    NNeg,
    NNot,
    /// Compare a single Number operand against zero; the builder emits an
    /// `NSub` ahead of this for a general `lhs OP rhs` comparison (spec
    /// §4.3 lists a single "cmpz" family rather than six relational
    /// opcodes, unlike String below).
    NCmpZero(Relation),

    // --- Boolean ---
    BAnd,
    BOr,
    BXor,
    BNot,
    BCmpEq,
    BCmpNe,

    // --- String (spec §4.3 lists explicit relations, case-insensitive) ---
    SCat,
    SLen,
    SIsEmpty,
    SCmp(Relation),
    SHeadMatch,
    STailMatch,
    SRegexMatch,
    SContains,

    // --- IP / CIDR ---
    IpCmpEq,
    IpCmpNe,
    CidrCmpEq,
    CidrCmpNe,
    IpInCidr,

    // --- Array membership (one per element type, spec optable `In` arms) ---
    NumberArrayContains,
    StringArrayContains,
    IpArrayContains,
    CidrArrayContains,

    // --- Array operations ---
    ArrayLen,
    ArrayConcat,

    // --- Conversions (spec §4.3 "N↔S, B→S, P→S, C→S, R→S, S→N") ---
    CastNumberToString,
    CastStringToNumber,
    CastBoolToString,
    CastIpToString,
    CastCidrToString,
    CastRegexToString,

    // --- Calls ---
    /// Call a native function builtin; result is its declared return type.
    CallFunction(SymbolId),
    /// Invoke a native handler builtin; result is the "handled" Boolean.
    InvokeHandler(SymbolId),
    /// Call a user-defined handler; result is the "handled" Boolean (spec
    /// §4.3 "Handler-call semantics").
    CallHandler(SymbolId),
}
