use flow_diagnostics::Span;
use flow_syntax::LiteralType;

/// Parse-time structural errors (spec §4.2 grammar).
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    UnexpectedToken { found: String, expected: &'static str, span: Span },
    UnexpectedEof { expected: &'static str },
    DuplicateImport { name: String, span: Span },
    /// `=~` (or any `MatchOp::RegExp`) against a case label that isn't a
    /// regex literal — kept as a parse-time rejection (spec §9 Open
    /// Question 2: no IR representation exists for "cast to regex").
    MatchLabelKindMismatch { expected: LiteralType, found: LiteralType, span: Span },
    Redeclared { name: String, span: Span },
    EmptyArrayLiteral { span: Span },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::UnexpectedToken { found, expected, .. } => {
                write!(f, "unexpected token '{found}', expected {expected}")
            }
            ParseError::UnexpectedEof { expected } => write!(f, "unexpected end of input, expected {expected}"),
            ParseError::DuplicateImport { name, .. } => write!(f, "'{name}' imported more than once"),
            ParseError::MatchLabelKindMismatch { expected, found, .. } => {
                write!(f, "match case label has type {found}, expected {expected} (subject's type)")
            }
            ParseError::Redeclared { name, .. } => write!(f, "'{name}' is already declared in this scope"),
            ParseError::EmptyArrayLiteral { .. } => write!(f, "an empty array literal needs an explicit element type"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Errors raised by the operator/cast typing tables and symbol resolver
/// (spec §4.2 "Operator typing", "Symbol resolution").
#[derive(Debug, Clone, PartialEq)]
pub enum TypeError {
    IncompatibleOperands { op: String, lhs: LiteralType, rhs: LiteralType, span: Span },
    IncompatibleUnaryOperand { op: String, operand: LiteralType, span: Span },
    InvalidCast { target: &'static str, source: LiteralType, span: Span },
    UnknownSymbol { name: String, span: Span },
    NotCallable { name: String, span: Span },
    HandlerRedeclaredWithBody { name: String, span: Span },
    /// No overload of `name` accepts the given argument types after both
    /// the exact-match and reorder+defaults passes (spec §4.2).
    NoMatchingOverload { name: String, span: Span },
    /// More than one overload of `name` matches; the grammar requires a
    /// unique candidate (spec §4.2 "ambiguity is an error").
    AmbiguousOverload { name: String, span: Span },
    HandlerTakesNoArguments { name: String, span: Span },
    NotAssignable { name: String, span: Span },
    AssignmentTypeMismatch { name: String, expected: LiteralType, found: LiteralType, span: Span },
    ArrayElementTypeMismatch { expected: LiteralType, found: LiteralType, span: Span },
    NotArrayable { elem_type: LiteralType, span: Span },
}

impl std::fmt::Display for TypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeError::IncompatibleOperands { op, lhs, rhs, .. } => {
                write!(f, "operator '{op}' is not defined for {lhs} and {rhs}")
            }
            TypeError::IncompatibleUnaryOperand { op, operand, .. } => {
                write!(f, "unary operator '{op}' is not defined for {operand}")
            }
            TypeError::InvalidCast { target, source, .. } => {
                write!(f, "cannot cast {source} to {target}")
            }
            TypeError::UnknownSymbol { name, .. } => write!(f, "unknown symbol '{name}'"),
            TypeError::NotCallable { name, .. } => write!(f, "'{name}' is not callable"),
            TypeError::HandlerRedeclaredWithBody { name, .. } => {
                write!(f, "handler '{name}' already has a body")
            }
            TypeError::NoMatchingOverload { name, .. } => {
                write!(f, "no overload of '{name}' matches the given arguments")
            }
            TypeError::AmbiguousOverload { name, .. } => {
                write!(f, "call to '{name}' is ambiguous between multiple overloads")
            }
            TypeError::HandlerTakesNoArguments { name, .. } => write!(f, "handler '{name}' takes no arguments"),
            TypeError::NotAssignable { name, .. } => write!(f, "'{name}' cannot be assigned to"),
            TypeError::AssignmentTypeMismatch { name, expected, found, .. } => {
                write!(f, "cannot assign {found} to '{name}' of type {expected}")
            }
            TypeError::ArrayElementTypeMismatch { expected, found, .. } => {
                write!(f, "array element has type {found}, expected {expected}")
            }
            TypeError::NotArrayable { elem_type, .. } => write!(f, "{elem_type} has no array representation"),
        }
    }
}

impl std::error::Error for TypeError {}

/// Either kind of error the parser can raise, unified so `Parser::parse`
/// can return a single `Result`.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Parse(ParseError),
    Type(TypeError),
    Lex(flow_syntax::LexError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Parse(e) => write!(f, "{e}"),
            Error::Type(e) => write!(f, "{e}"),
            Error::Lex(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(e)
    }
}

impl From<TypeError> for Error {
    fn from(e: TypeError) -> Self {
        Error::Type(e)
    }
}

impl From<flow_syntax::LexError> for Error {
    fn from(e: flow_syntax::LexError) -> Self {
        Error::Lex(e)
    }
}
