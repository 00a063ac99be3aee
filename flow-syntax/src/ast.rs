use flow_diagnostics::Span;

use crate::literal::{LiteralType, LiteralValue};
use crate::symbol::SymbolId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Shl,
    Shr,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    PrefixMatch,
    SuffixMatch,
    RegexMatch,
    In,
}

/// Expression node, stored in `Unit::exprs`. Every node carries its
/// resolved `LiteralType` in the enclosing `TypedExpr` — by the time an
/// expression is in this arena, typing has already succeeded (spec §3
/// invariant: "every Expr carries a known LiteralType").
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(LiteralValue),
    Variable(SymbolId),
    HandlerRef(SymbolId),
    Call { callee: SymbolId, args: Vec<ExprId> },
    Unary { op: UnaryOp, sub: ExprId },
    Binary { op: BinaryOp, lhs: ExprId, rhs: ExprId },
    Array { elements: Vec<ExprId>, elem_type: LiteralType },
    /// An explicit `int(...)`/`string(...)`/`bool(...)` cast, or the
    /// implicit to-string cast the parser inserts around a non-`String`
    /// interpolated expression fragment.
    Cast { target: LiteralType, sub: ExprId },
}

#[derive(Debug, Clone)]
pub struct TypedExpr {
    pub node: Expr,
    pub ty: LiteralType,
    pub span: Span,
}

/// `match` comparison kind (spec §3/§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    Same,
    Head,
    Tail,
    RegExp,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Compound(Vec<StmtId>),
    Cond {
        cond: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
    },
    Match {
        subject: ExprId,
        op: MatchOp,
        cases: Vec<(Vec<ExprId>, StmtId)>,
        else_branch: Option<StmtId>,
    },
    Assign {
        symbol: SymbolId,
        value: ExprId,
    },
    ExprStmt(ExprId),
}

#[derive(Debug, Clone)]
pub struct SpannedStmt {
    pub node: Stmt,
    pub span: Span,
}

/// Arena owning every AST node and symbol produced while parsing one Flow
/// unit (a top-level source plus its transitively imported modules). Nodes
/// reference each other by index, never by pointer — this is how the
/// otherwise-cyclic "symbol references AST node which references symbol"
/// relationship (forward-declared handlers) is expressed without unsafe
/// code or reference counting (see DESIGN.md, "Cyclic ownership").
#[derive(Debug, Clone, Default)]
pub struct Unit {
    pub exprs: Vec<TypedExpr>,
    pub stmts: Vec<SpannedStmt>,
    pub symbols: crate::symbol::SymbolTable,
    pub imports: Vec<Import>,
}

#[derive(Debug, Clone)]
pub struct Import {
    pub names: Vec<String>,
    pub from: Option<String>,
    pub span: Span,
}

impl Unit {
    pub fn new() -> Self {
        Self { exprs: Vec::new(), stmts: Vec::new(), symbols: crate::symbol::SymbolTable::new(), imports: Vec::new() }
    }

    pub fn alloc_expr(&mut self, node: Expr, ty: LiteralType, span: Span) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(TypedExpr { node, ty, span });
        id
    }

    pub fn alloc_stmt(&mut self, node: Stmt, span: Span) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(SpannedStmt { node, span });
        id
    }

    pub fn expr(&self, id: ExprId) -> &TypedExpr {
        &self.exprs[id.0 as usize]
    }

    pub fn stmt(&self, id: StmtId) -> &SpannedStmt {
        &self.stmts[id.0 as usize]
    }

    pub fn global_scope(&self) -> crate::symbol::ScopeId {
        self.symbols.global_scope()
    }
}
