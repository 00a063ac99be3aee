use flow_syntax::LiteralType;

/// Errors raised while lowering a typed `flow_syntax::ast::Unit` into IR.
/// Every case here indicates an invariant the parser's typing tables were
/// supposed to already guarantee (spec §8 "for every AST that type-checks
/// ... the (op, lhs, rhs) triple appears in the operator table"); reaching
/// one means a `flow_syntax::ast::Unit` was constructed by something other
/// than `flow_parser::Parser`, or the tables have drifted apart.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    UnsupportedBinaryOperand { op: String, lhs: LiteralType, rhs: LiteralType },
    UnsupportedUnaryOperand { op: String, operand: LiteralType },
    UnsupportedCast { source: LiteralType, target: LiteralType },
    UnresolvedHandlerBody { name: String },
    /// A `match` subject type with no comparison opcode for the given
    /// `MatchOp` (spec §4.2 lists `Same`/`Head`/`Tail`/`RegExp` match kinds
    /// per subject type; the parser is expected to reject any other
    /// combination before this is ever reached).
    UnsupportedMatchSubject { subject_ty: LiteralType },
    /// An array literal element that isn't itself a literal. The grammar
    /// has no syntax to build an array from a non-constant expression, so
    /// reaching this means the AST was not produced by `flow_parser::Parser`.
    NonLiteralArrayElement,
    /// An array literal whose element type has no pooled array arena (spec
    /// §3: only Number/String/IpAddress/Cidr arrays are representable).
    UnsupportedArrayElementType(LiteralType),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::UnsupportedBinaryOperand { op, lhs, rhs } => {
                write!(f, "no IR lowering for operator '{op}' over ({lhs}, {rhs})")
            }
            BuildError::UnsupportedUnaryOperand { op, operand } => {
                write!(f, "no IR lowering for unary operator '{op}' over {operand}")
            }
            BuildError::UnsupportedCast { source, target } => write!(f, "no IR lowering for cast {source} -> {target}"),
            BuildError::UnresolvedHandlerBody { name } => write!(f, "handler '{name}' was never implemented"),
            BuildError::UnsupportedMatchSubject { subject_ty } => write!(f, "no match-test lowering for subject type {subject_ty}"),
            BuildError::NonLiteralArrayElement => write!(f, "array literal element is not a literal"),
            BuildError::UnsupportedArrayElementType(ty) => write!(f, "no array constant pool for element type {ty}"),
        }
    }
}

impl std::error::Error for BuildError {}
