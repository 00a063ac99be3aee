use std::collections::HashMap;

use flow_diagnostics::Span;

use crate::ast::{ExprId, StmtId};
use crate::literal::LiteralType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// How a name lookup walks the scope chain (spec §3 "Symbols").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    /// Only the given scope; used for detecting redeclaration.
    SelfOnly,
    /// The given scope, then its ancestors, stopping at the first hit.
    All,
}

/// One parameter of a builtin signature. A trailing parameter with
/// `has_default: true` may be omitted by the caller (spec §4.2 "reorder +
/// defaults pass", e.g. `proxy.http ADDR, PORT [, timeouts]`).
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: LiteralType,
    pub has_default: bool,
}

impl Param {
    pub fn required(ty: LiteralType) -> Self {
        Self { ty, has_default: false }
    }

    pub fn defaulted(ty: LiteralType) -> Self {
        Self { ty, has_default: true }
    }
}

/// One overload candidate for a builtin function/handler name. A host
/// module (spec §6 "import NAME loads a host module that registers
/// builtins") may register several candidates under the same name; the
/// resolver picks among them (spec §4.2).
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltinSignature {
    pub params: Vec<Param>,
    pub return_type: LiteralType,
}

#[derive(Debug, Clone)]
pub enum SymbolKind {
    Variable {
        initializer: ExprId,
    },
    /// A handler. `body` is `None` for a forward declaration (auto-created
    /// by the parser on first call/reference); implementing it later fills
    /// in `body` in place rather than creating a second symbol.
    Handler {
        body: Option<StmtId>,
        locals: ScopeId,
    },
    /// A native function builtin (used in an expression position, has a
    /// return value). `candidates` holds every overload registered under
    /// this name.
    BuiltinFunction {
        candidates: Vec<BuiltinSignature>,
    },
    /// A native handler builtin (a statement; its "return value" in Flow
    /// terms is the handled/unhandled boolean, not a literal).
    BuiltinHandler {
        candidates: Vec<BuiltinSignature>,
    },
    Unit {
        imports: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub span: Option<Span>,
}

impl Symbol {
    pub fn is_handler(&self) -> bool {
        matches!(self.kind, SymbolKind::Handler { .. })
    }

    pub fn is_forward_declared_handler(&self) -> bool {
        matches!(self.kind, SymbolKind::Handler { body: None, .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    names: HashMap<String, SymbolId>,
}

/// Errors from symbol declaration/lookup (spec §3: "Names are unique
/// within a scope; shadowing allowed across nested scopes").
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolError {
    AlreadyDeclared { name: String },
    HandlerRedeclaredWithBody { name: String },
}

impl std::fmt::Display for SymbolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolError::AlreadyDeclared { name } => write!(f, "'{name}' is already declared in this scope"),
            SymbolError::HandlerRedeclaredWithBody { name } => {
                write!(f, "handler '{name}' already has a body")
            }
        }
    }
}

impl std::error::Error for SymbolError {}

/// Arena of scopes and symbols for one compilation unit. AST nodes refer to
/// symbols by `SymbolId`, never by pointer, so forward-declared handlers can
/// be "implemented later" by mutating the arena entry in place.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    pub scopes: Vec<Scope>,
    pub symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = Self::default();
        table.alloc_scope(None);
        table
    }

    pub fn global_scope(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn alloc_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope { parent, names: HashMap::new() });
        id
    }

    fn alloc_symbol(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        id
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    /// Declare a fresh symbol in `scope`. Fails if a symbol by that name is
    /// already declared *in this scope* (shadowing an outer scope is fine).
    pub fn declare(&mut self, scope: ScopeId, name: &str, kind: SymbolKind, span: Option<Span>) -> Result<SymbolId, SymbolError> {
        if self.lookup(scope, name, LookupMode::SelfOnly).is_some() {
            return Err(SymbolError::AlreadyDeclared { name: name.to_string() });
        }
        let id = self.alloc_symbol(Symbol { name: name.to_string(), kind, span });
        self.scopes[scope.0 as usize].names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Forward-declare a handler (auto-created by the parser when a call or
    /// reference to an undeclared name is seen). Returns the existing
    /// symbol if one is already declared by that name.
    pub fn forward_declare_handler(&mut self, scope: ScopeId, name: &str, locals: ScopeId) -> SymbolId {
        if let Some(id) = self.lookup(scope, name, LookupMode::All) {
            return id;
        }
        self.alloc_symbol(Symbol {
            name: name.to_string(),
            kind: SymbolKind::Handler { body: None, locals },
            span: None,
        });
        let id = SymbolId((self.symbols.len() - 1) as u32);
        self.scopes[scope.0 as usize].names.insert(name.to_string(), id);
        id
    }

    /// Implement a previously forward-declared handler. Errors if the
    /// handler already has a body (spec §3: "redeclaration with body is an
    /// error").
    pub fn implement_handler(&mut self, id: SymbolId, body: StmtId) -> Result<(), SymbolError> {
        let symbol = &mut self.symbols[id.0 as usize];
        match &mut symbol.kind {
            SymbolKind::Handler { body: existing @ None, .. } => {
                *existing = Some(body);
                Ok(())
            }
            SymbolKind::Handler { body: Some(_), .. } => {
                Err(SymbolError::HandlerRedeclaredWithBody { name: symbol.name.clone() })
            }
            _ => unreachable!("implement_handler called on a non-handler symbol"),
        }
    }

    pub fn lookup(&self, scope: ScopeId, name: &str, mode: LookupMode) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(s) = current {
            let scope_data = &self.scopes[s.0 as usize];
            if let Some(&id) = scope_data.names.get(name) {
                return Some(id);
            }
            if mode == LookupMode::SelfOnly {
                return None;
            }
            current = scope_data.parent;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadowing_across_scopes_is_allowed() {
        let mut table = SymbolTable::new();
        let global = table.global_scope();
        let child = table.alloc_scope(Some(global));
        table
            .declare(global, "x", SymbolKind::Variable { initializer: crate::ast::ExprId(0) }, None)
            .unwrap();
        let inner = table
            .declare(child, "x", SymbolKind::Variable { initializer: crate::ast::ExprId(1) }, None)
            .unwrap();
        assert_eq!(table.lookup(child, "x", LookupMode::All), Some(inner));
    }

    #[test]
    fn duplicate_in_same_scope_is_an_error() {
        let mut table = SymbolTable::new();
        let global = table.global_scope();
        table
            .declare(global, "x", SymbolKind::Variable { initializer: crate::ast::ExprId(0) }, None)
            .unwrap();
        let err = table.declare(global, "x", SymbolKind::Variable { initializer: crate::ast::ExprId(1) }, None);
        assert!(err.is_err());
    }

    #[test]
    fn forward_declared_handler_implemented_once() {
        let mut table = SymbolTable::new();
        let global = table.global_scope();
        let locals = table.alloc_scope(Some(global));
        let id = table.forward_declare_handler(global, "foo", locals);
        assert!(table.symbol(id).is_forward_declared_handler());
        table.implement_handler(id, crate::ast::StmtId(0)).unwrap();
        assert!(!table.symbol(id).is_forward_declared_handler());
        assert!(table.implement_handler(id, crate::ast::StmtId(1)).is_err());
    }
}
