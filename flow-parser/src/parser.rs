use flow_diagnostics::{DiagnosticsReport, SourceId, SourceMap, Span};
use flow_syntax::ast::{BinaryOp, Expr, MatchOp, Stmt, UnaryOp, Unit};
use flow_syntax::optable::{self, CastTarget};
use flow_syntax::symbol::{BuiltinSignature, LookupMode, ScopeId, SymbolError, SymbolKind};
use flow_syntax::{ast::ExprId, ast::StmtId, Keyword, Lexer, LiteralType, LiteralValue, Operator, Token, TokenKind};

use crate::error::{Error, ParseError, TypeError};
use crate::resolve::{resolve_overload, Resolution};

/// A name registered in the global scope before parsing begins — the
/// parser's view of "a host module is imported and has registered
/// builtins" (spec §4.2 "Symbol resolution", §6 "import loads a host
/// module"). Assembling the actual list from a live `HostRegistry` is the
/// caller's job (see `flow-runtime`/`x0d`); the parser only needs names and
/// signatures.
pub type Prelude = Vec<(String, SymbolKind)>;

/// Recursive-descent parser over one Flow source (and its transitive
/// `import ... from` includes). Consumes a `flow_syntax::Lexer` token at a
/// time and builds a fully typed `Unit`.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    unit: Unit,
    lookahead: Token,
    scopes: Vec<ScopeId>,
    diagnostics: DiagnosticsReport,
}

impl<'a> Parser<'a> {
    pub fn new(sources: &'a SourceMap, root: SourceId) -> Result<Self, Error> {
        Self::with_prelude(sources, root, Vec::new())
    }

    /// Build a parser whose global scope already has `prelude` declared —
    /// used so builtin calls can be type-checked against their real
    /// signatures while parsing (see `Prelude`).
    pub fn with_prelude(sources: &'a SourceMap, root: SourceId, prelude: Prelude) -> Result<Self, Error> {
        let mut lexer = Lexer::new(sources, root);
        let lookahead = lexer.next_token(true)?;
        let mut unit = Unit::new();
        let global = unit.global_scope();
        for (name, kind) in prelude {
            unit.symbols
                .declare(global, &name, kind, None)
                .map_err(|e| Self::wrap_symbol_error_static(e, lookahead.span))?;
        }
        Ok(Self { lexer, unit, lookahead, scopes: vec![global], diagnostics: DiagnosticsReport::new() })
    }

    pub fn parse(mut self) -> Result<(Unit, DiagnosticsReport), Error> {
        while matches!(self.lookahead.kind, TokenKind::Keyword(Keyword::Import)) {
            self.parse_import()?;
        }
        while !matches!(self.lookahead.kind, TokenKind::Eof) {
            self.parse_decl()?;
        }
        Ok((self.unit, self.diagnostics))
    }

    // -- token stream plumbing ------------------------------------------------

    fn current_scope(&self) -> ScopeId {
        *self.scopes.last().expect("global scope always on the stack")
    }

    /// `/` starts a regex literal only in a position where a primary
    /// expression could begin; after anything that can end an expression
    /// it's division (spec §4.1).
    fn regex_allowed_after(kind: &TokenKind) -> bool {
        !matches!(
            kind,
            TokenKind::Ident(_)
                | TokenKind::Number(_)
                | TokenKind::String(_)
                | TokenKind::StringEnd(_)
                | TokenKind::IpAddress(_)
                | TokenKind::Cidr(_)
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::Keyword(Keyword::True)
                | TokenKind::Keyword(Keyword::False)
        )
    }

    fn advance(&mut self) -> Result<(), Error> {
        let regex_allowed = Self::regex_allowed_after(&self.lookahead.kind);
        self.lookahead = self.lexer.next_token(regex_allowed)?;
        Ok(())
    }

    fn expect(&mut self, matches_fn: impl Fn(&TokenKind) -> bool, expected: &'static str) -> Result<Span, Error> {
        if matches_fn(&self.lookahead.kind) {
            let span = self.lookahead.span;
            self.advance()?;
            Ok(span)
        } else {
            Err(ParseError::UnexpectedToken { found: format!("{:?}", self.lookahead.kind), expected, span: self.lookahead.span }.into())
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> Result<Span, Error> {
        self.expect(|k| matches!(k, TokenKind::Keyword(k2) if *k2 == kw), keyword_name(kw))
    }

    fn expect_lparen(&mut self) -> Result<Span, Error> {
        self.expect(|k| matches!(k, TokenKind::LParen), "'('")
    }

    fn expect_rparen(&mut self) -> Result<Span, Error> {
        self.expect(|k| matches!(k, TokenKind::RParen), "')'")
    }

    fn expect_rbracket(&mut self) -> Result<Span, Error> {
        self.expect(|k| matches!(k, TokenKind::RBracket), "']'")
    }

    fn expect_lbrace(&mut self) -> Result<Span, Error> {
        self.expect(|k| matches!(k, TokenKind::LBrace), "'{'")
    }

    fn expect_colon(&mut self) -> Result<Span, Error> {
        self.expect(|k| matches!(k, TokenKind::Colon), "':'")
    }

    fn expect_semicolon(&mut self) -> Result<Span, Error> {
        self.expect(|k| matches!(k, TokenKind::Semicolon), "';'")
    }

    fn expect_assign(&mut self) -> Result<Span, Error> {
        self.expect(|k| matches!(k, TokenKind::Operator(Operator::Assign)), "'='")
    }

    fn expect_ident(&mut self, expected: &'static str) -> Result<String, Error> {
        match self.lookahead.kind.clone() {
            TokenKind::Ident(name) => {
                self.advance()?;
                Ok(name)
            }
            other => Err(ParseError::UnexpectedToken { found: format!("{other:?}"), expected, span: self.lookahead.span }.into()),
        }
    }

    fn expect_string(&mut self, expected: &'static str) -> Result<String, Error> {
        match self.lookahead.kind.clone() {
            TokenKind::String(s) => {
                self.advance()?;
                Ok(s)
            }
            other => Err(ParseError::UnexpectedToken { found: format!("{other:?}"), expected, span: self.lookahead.span }.into()),
        }
    }

    fn wrap_symbol_error(&self, err: SymbolError, span: Span) -> Error {
        Self::wrap_symbol_error_static(err, span)
    }

    fn wrap_symbol_error_static(err: SymbolError, span: Span) -> Error {
        match err {
            SymbolError::AlreadyDeclared { name } => ParseError::Redeclared { name, span }.into(),
            SymbolError::HandlerRedeclaredWithBody { name } => TypeError::HandlerRedeclaredWithBody { name, span }.into(),
        }
    }

    // -- top level -------------------------------------------------------------

    fn parse_import(&mut self) -> Result<(), Error> {
        let span = self.expect_keyword(Keyword::Import)?;
        let mut names = vec![self.expect_ident("an import name")?];
        while matches!(self.lookahead.kind, TokenKind::Comma) {
            self.advance()?;
            names.push(self.expect_ident("an import name")?);
        }
        let from = if matches!(self.lookahead.kind, TokenKind::Keyword(Keyword::From)) {
            self.advance()?;
            Some(self.expect_string("a module path")?)
        } else {
            None
        };
        let end_span = self.expect_semicolon()?;
        for name in &names {
            if self.unit.imports.iter().any(|i| i.names.contains(name)) {
                return Err(ParseError::DuplicateImport { name: name.clone(), span }.into());
            }
        }
        self.unit.imports.push(flow_syntax::ast::Import { names, from, span: span.to(end_span) });
        Ok(())
    }

    fn parse_decl(&mut self) -> Result<(), Error> {
        if matches!(self.lookahead.kind, TokenKind::Keyword(Keyword::Var)) {
            self.parse_var_decl()
        } else {
            self.parse_handler_decl()
        }
    }

    fn parse_var_decl(&mut self) -> Result<(), Error> {
        self.advance()?; // 'var'
        let span = self.lookahead.span;
        let name = self.expect_ident("a variable name")?;
        self.expect_assign()?;
        let value = self.parse_expr()?;
        self.expect_semicolon()?;
        self.unit
            .symbols
            .declare(self.current_scope(), &name, SymbolKind::Variable { initializer: value }, Some(span))
            .map_err(|e| self.wrap_symbol_error(e, span))?;
        Ok(())
    }

    fn parse_handler_decl(&mut self) -> Result<(), Error> {
        if matches!(self.lookahead.kind, TokenKind::Keyword(Keyword::Handler)) {
            self.advance()?;
        }
        let span = self.lookahead.span;
        let name = self.expect_ident("a handler name")?;
        let existing = self.unit.symbols.lookup(self.current_scope(), &name, LookupMode::All);
        let (id, locals) = match existing {
            Some(id) => match &self.unit.symbols.symbol(id).kind {
                SymbolKind::Handler { locals, .. } => (id, *locals),
                _ => return Err(TypeError::NotCallable { name, span }.into()),
            },
            None => {
                let locals = self.unit.symbols.alloc_scope(Some(self.current_scope()));
                let id = self
                    .unit
                    .symbols
                    .declare(self.current_scope(), &name, SymbolKind::Handler { body: None, locals }, Some(span))
                    .map_err(|e| self.wrap_symbol_error(e, span))?;
                (id, locals)
            }
        };
        if matches!(self.lookahead.kind, TokenKind::Semicolon) {
            self.advance()?;
            return Ok(());
        }
        self.scopes.push(locals);
        let body = self.parse_stmt();
        self.scopes.pop();
        let body = body?;
        self.unit.symbols.implement_handler(id, body).map_err(|e| self.wrap_symbol_error(e, span))?;
        Ok(())
    }

    // -- statements --------------------------------------------------------------

    fn parse_stmt(&mut self) -> Result<StmtId, Error> {
        match &self.lookahead.kind {
            TokenKind::Semicolon => {
                let span = self.lookahead.span;
                self.advance()?;
                Ok(self.unit.alloc_stmt(Stmt::Compound(Vec::new()), span))
            }
            TokenKind::LBrace => self.parse_compound(),
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::Match) => self.parse_match(),
            TokenKind::Ident(_) => self.parse_ident_stmt(),
            other => Err(ParseError::UnexpectedToken { found: format!("{other:?}"), expected: "a statement", span: self.lookahead.span }.into()),
        }
    }

    fn parse_compound(&mut self) -> Result<StmtId, Error> {
        let span = self.lookahead.span;
        self.advance()?; // '{'
        let mut stmts = Vec::new();
        loop {
            match self.lookahead.kind {
                TokenKind::RBrace => break,
                TokenKind::Eof => return Err(ParseError::UnexpectedEof { expected: "'}'" }.into()),
                _ => stmts.push(self.parse_stmt()?),
            }
        }
        self.advance()?; // '}'
        Ok(self.unit.alloc_stmt(Stmt::Compound(stmts), span))
    }

    fn parse_if(&mut self) -> Result<StmtId, Error> {
        let span = self.lookahead.span;
        self.advance()?; // 'if'
        let cond = self.parse_boolean_expr(span)?;
        if matches!(self.lookahead.kind, TokenKind::Keyword(Keyword::Then)) {
            self.advance()?;
        }
        let then_branch = self.parse_stmt()?;
        let else_branch = if matches!(self.lookahead.kind, TokenKind::Keyword(Keyword::Else)) {
            self.advance()?;
            Some(self.parse_stmt()?)
        } else {
            None
        };
        Ok(self.unit.alloc_stmt(Stmt::Cond { cond, then_branch, else_branch }, span))
    }

    /// Case bodies are delimited from their label list by `:` (not part of
    /// the original grammar sketch, which left the concrete separator
    /// unspecified) so a bare identifier starting the body can never be
    /// mistaken for another label.
    fn parse_match(&mut self) -> Result<StmtId, Error> {
        let span = self.lookahead.span;
        self.advance()?; // 'match'
        let subject = self.parse_expr()?;
        let subject_ty = self.unit.expr(subject).ty;
        let op = match self.lookahead.kind {
            TokenKind::Operator(Operator::Eq) => {
                self.advance()?;
                MatchOp::Same
            }
            TokenKind::Operator(Operator::PrefixMatch) => {
                self.advance()?;
                MatchOp::Head
            }
            TokenKind::Operator(Operator::SuffixMatch) => {
                self.advance()?;
                MatchOp::Tail
            }
            TokenKind::Operator(Operator::RegexMatch) => {
                self.advance()?;
                MatchOp::RegExp
            }
            _ => MatchOp::Same,
        };
        // Case labels under RegExp are regex constants, not the subject's
        // own type (spec §9 Open Question 2); every other mode requires
        // labels of the subject's exact type.
        let required_label_ty = if op == MatchOp::RegExp { LiteralType::RegExp } else { subject_ty };
        self.expect_lbrace()?;
        let mut cases = Vec::new();
        let mut else_branch = None;
        loop {
            match self.lookahead.kind {
                TokenKind::RBrace => break,
                TokenKind::Eof => return Err(ParseError::UnexpectedEof { expected: "'}'" }.into()),
                TokenKind::Keyword(Keyword::Else) => {
                    self.advance()?;
                    self.expect_colon()?;
                    else_branch = Some(self.parse_stmt()?);
                }
                _ => {
                    let mut labels = Vec::new();
                    loop {
                        let label_span = self.lookahead.span;
                        let label = self.parse_expr()?;
                        let label_ty = self.unit.expr(label).ty;
                        if label_ty != required_label_ty {
                            return Err(ParseError::MatchLabelKindMismatch { expected: required_label_ty, found: label_ty, span: label_span }.into());
                        }
                        labels.push(label);
                        if matches!(self.lookahead.kind, TokenKind::Comma) {
                            self.advance()?;
                            continue;
                        }
                        break;
                    }
                    self.expect_colon()?;
                    let body = self.parse_stmt()?;
                    cases.push((labels, body));
                }
            }
        }
        self.advance()?; // '}'
        Ok(self.unit.alloc_stmt(Stmt::Match { subject, op, cases, else_branch }, span))
    }

    fn parse_ident_stmt(&mut self) -> Result<StmtId, Error> {
        let span = self.lookahead.span;
        let name = self.expect_ident("a statement")?;
        let core = if matches!(self.lookahead.kind, TokenKind::Operator(Operator::Assign)) {
            self.advance()?;
            let value = self.parse_expr()?;
            self.build_assign_stmt(&name, value, span)?
        } else {
            self.build_call_stmt(&name, span)?
        };
        let wrapped = self.parse_postscript(core, span)?;
        self.expect_semicolon()?;
        Ok(wrapped)
    }

    fn build_assign_stmt(&mut self, name: &str, value: ExprId, span: Span) -> Result<StmtId, Error> {
        let value_ty = self.unit.expr(value).ty;
        let existing = self.unit.symbols.lookup(self.current_scope(), name, LookupMode::All);
        let symbol = match existing {
            Some(id) => match &self.unit.symbols.symbol(id).kind {
                SymbolKind::Variable { initializer } => {
                    let expected = self.unit.expr(*initializer).ty;
                    if expected != value_ty {
                        return Err(TypeError::AssignmentTypeMismatch { name: name.to_string(), expected, found: value_ty, span }.into());
                    }
                    id
                }
                _ => return Err(TypeError::NotAssignable { name: name.to_string(), span }.into()),
            },
            // First assignment to an undeclared name introduces it as a
            // local of the enclosing handler (there is no local `var` form
            // in the grammar; this is how handler bodies get locals).
            None => self
                .unit
                .symbols
                .declare(self.current_scope(), name, SymbolKind::Variable { initializer: value }, Some(span))
                .map_err(|e| self.wrap_symbol_error(e, span))?,
        };
        Ok(self.unit.alloc_stmt(Stmt::Assign { symbol, value }, span))
    }

    fn build_call_stmt(&mut self, name: &str, span: Span) -> Result<StmtId, Error> {
        let has_parens = matches!(self.lookahead.kind, TokenKind::LParen);
        let args = if has_parens { self.parse_paren_args()? } else { self.parse_bare_args()? };
        let existing = self.unit.symbols.lookup(self.current_scope(), name, LookupMode::All);
        let callee = match existing {
            Some(id) => id,
            None => {
                if !args.is_empty() {
                    return Err(TypeError::UnknownSymbol { name: name.to_string(), span }.into());
                }
                // Handlers are always top-level: a call from inside another
                // handler's body forward-declares into the global scope,
                // never the caller's local scope (spec §4.2).
                let global = self.unit.global_scope();
                let locals = self.unit.symbols.alloc_scope(Some(global));
                self.unit.symbols.forward_declare_handler(global, name, locals)
            }
        };
        let kind = self.unit.symbols.symbol(callee).kind.clone();
        let ty = match kind {
            SymbolKind::Handler { .. } => {
                if !args.is_empty() {
                    return Err(TypeError::HandlerTakesNoArguments { name: name.to_string(), span }.into());
                }
                LiteralType::Void
            }
            SymbolKind::BuiltinHandler { candidates } | SymbolKind::BuiltinFunction { candidates } => {
                let arg_types: Vec<LiteralType> = args.iter().map(|a| self.unit.expr(*a).ty).collect();
                Self::resolve_builtin(name, &candidates, &arg_types, span)?.return_type
            }
            SymbolKind::Variable { .. } | SymbolKind::Unit { .. } => {
                return Err(TypeError::NotCallable { name: name.to_string(), span }.into())
            }
        };
        let call = self.unit.alloc_expr(Expr::Call { callee, args }, ty, span);
        Ok(self.unit.alloc_stmt(Stmt::ExprStmt(call), span))
    }

    fn parse_postscript(&mut self, core: StmtId, span: Span) -> Result<StmtId, Error> {
        let negate = match self.lookahead.kind {
            TokenKind::Keyword(Keyword::If) => false,
            TokenKind::Keyword(Keyword::Unless) => true,
            _ => return Ok(core),
        };
        self.advance()?;
        let mut cond = self.parse_boolean_expr(span)?;
        if negate {
            cond = self.make_unary(UnaryOp::Not, cond, span)?;
        }
        Ok(self.unit.alloc_stmt(Stmt::Cond { cond, then_branch: core, else_branch: None }, span))
    }

    fn parse_boolean_expr(&mut self, span: Span) -> Result<ExprId, Error> {
        let cond = self.parse_expr()?;
        let ty = self.unit.expr(cond).ty;
        if ty != LiteralType::Boolean {
            return Err(TypeError::IncompatibleUnaryOperand { op: "if/unless condition".to_string(), operand: ty, span }.into());
        }
        Ok(cond)
    }

    fn parse_paren_args(&mut self) -> Result<Vec<ExprId>, Error> {
        self.expect_lparen()?;
        let mut args = Vec::new();
        if !matches!(self.lookahead.kind, TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if matches!(self.lookahead.kind, TokenKind::Comma) {
                    self.advance()?;
                    continue;
                }
                break;
            }
        }
        self.expect_rparen()?;
        Ok(args)
    }

    fn can_start_bare_arg(&self) -> bool {
        !matches!(
            self.lookahead.kind,
            TokenKind::Semicolon | TokenKind::Keyword(Keyword::If) | TokenKind::Keyword(Keyword::Unless) | TokenKind::Eof | TokenKind::RBrace
        )
    }

    fn parse_bare_args(&mut self) -> Result<Vec<ExprId>, Error> {
        let mut args = Vec::new();
        if self.can_start_bare_arg() {
            loop {
                args.push(self.parse_expr()?);
                if matches!(self.lookahead.kind, TokenKind::Comma) {
                    self.advance()?;
                    continue;
                }
                break;
            }
        }
        Ok(args)
    }

    fn resolve_builtin<'c>(name: &str, candidates: &'c [BuiltinSignature], args: &[LiteralType], span: Span) -> Result<&'c BuiltinSignature, Error> {
        match resolve_overload(candidates, args) {
            Resolution::Unique(sig) => Ok(sig),
            Resolution::None => Err(TypeError::NoMatchingOverload { name: name.to_string(), span }.into()),
            Resolution::Ambiguous => Err(TypeError::AmbiguousOverload { name: name.to_string(), span }.into()),
        }
    }

    // -- expressions ---------------------------------------------------------

    fn make_binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId, span: Span) -> Result<ExprId, Error> {
        let lhs_ty = self.unit.expr(lhs).ty;
        let rhs_ty = self.unit.expr(rhs).ty;
        match optable::binary_result_type(op, lhs_ty, rhs_ty) {
            Some(ty) => Ok(self.unit.alloc_expr(Expr::Binary { op, lhs, rhs }, ty, span)),
            None => Err(TypeError::IncompatibleOperands { op: binary_op_name(op).to_string(), lhs: lhs_ty, rhs: rhs_ty, span }.into()),
        }
    }

    fn make_unary(&mut self, op: UnaryOp, sub: ExprId, span: Span) -> Result<ExprId, Error> {
        let sub_ty = self.unit.expr(sub).ty;
        match optable::unary_result_type(op, sub_ty) {
            Some(ty) => Ok(self.unit.alloc_expr(Expr::Unary { op, sub }, ty, span)),
            None => Err(TypeError::IncompatibleUnaryOperand { op: unary_op_name(op).to_string(), operand: sub_ty, span }.into()),
        }
    }

    fn parse_expr(&mut self) -> Result<ExprId, Error> {
        let mut lhs = self.parse_logic()?;
        loop {
            let op = match self.lookahead.kind {
                TokenKind::Keyword(Keyword::And) => BinaryOp::And,
                TokenKind::Keyword(Keyword::Or) => BinaryOp::Or,
                TokenKind::Keyword(Keyword::Xor) => BinaryOp::Xor,
                _ => break,
            };
            let span = self.lookahead.span;
            self.advance()?;
            let rhs = self.parse_logic()?;
            lhs = self.make_binary(op, lhs, rhs, span)?;
        }
        Ok(lhs)
    }

    fn parse_logic(&mut self) -> Result<ExprId, Error> {
        if matches!(self.lookahead.kind, TokenKind::Keyword(Keyword::Not)) {
            let span = self.lookahead.span;
            self.advance()?;
            let sub = self.parse_rel()?;
            return self.make_unary(UnaryOp::Not, sub, span);
        }
        self.parse_rel()
    }

    fn parse_rel(&mut self) -> Result<ExprId, Error> {
        let mut lhs = self.parse_add()?;
        loop {
            let op = match self.lookahead.kind {
                TokenKind::Operator(Operator::Eq) => BinaryOp::Eq,
                TokenKind::Operator(Operator::Ne) => BinaryOp::Ne,
                TokenKind::Operator(Operator::Le) => BinaryOp::Le,
                TokenKind::Operator(Operator::Ge) => BinaryOp::Ge,
                TokenKind::Operator(Operator::Lt) => BinaryOp::Lt,
                TokenKind::Operator(Operator::Gt) => BinaryOp::Gt,
                TokenKind::Operator(Operator::PrefixMatch) => BinaryOp::PrefixMatch,
                TokenKind::Operator(Operator::SuffixMatch) => BinaryOp::SuffixMatch,
                TokenKind::Operator(Operator::RegexMatch) => BinaryOp::RegexMatch,
                TokenKind::Keyword(Keyword::In) => BinaryOp::In,
                _ => break,
            };
            let span = self.lookahead.span;
            self.advance()?;
            let rhs = self.parse_add()?;
            lhs = self.make_binary(op, lhs, rhs, span)?;
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<ExprId, Error> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.lookahead.kind {
                TokenKind::Operator(Operator::Plus) => BinaryOp::Add,
                TokenKind::Operator(Operator::Minus) => BinaryOp::Sub,
                _ => break,
            };
            let span = self.lookahead.span;
            self.advance()?;
            let rhs = self.parse_mul()?;
            lhs = self.make_binary(op, lhs, rhs, span)?;
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<ExprId, Error> {
        let mut lhs = self.parse_pow()?;
        loop {
            let op = match self.lookahead.kind {
                TokenKind::Operator(Operator::Star) => BinaryOp::Mul,
                TokenKind::Operator(Operator::Slash) => BinaryOp::Div,
                TokenKind::Operator(Operator::Percent) => BinaryOp::Rem,
                TokenKind::Keyword(Keyword::Shl) => BinaryOp::Shl,
                TokenKind::Keyword(Keyword::Shr) => BinaryOp::Shr,
                _ => break,
            };
            let span = self.lookahead.span;
            self.advance()?;
            let rhs = self.parse_pow()?;
            lhs = self.make_binary(op, lhs, rhs, span)?;
        }
        Ok(lhs)
    }

    /// Right-associative: `2 ** 3 ** 2` is `2 ** (3 ** 2)`.
    fn parse_pow(&mut self) -> Result<ExprId, Error> {
        let lhs = self.parse_unary()?;
        if matches!(self.lookahead.kind, TokenKind::Operator(Operator::Pow)) {
            let span = self.lookahead.span;
            self.advance()?;
            let rhs = self.parse_pow()?;
            return self.make_binary(BinaryOp::Pow, lhs, rhs, span);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<ExprId, Error> {
        match self.lookahead.kind {
            TokenKind::Operator(Operator::Minus) => {
                let span = self.lookahead.span;
                self.advance()?;
                let sub = self.parse_primary()?;
                self.make_unary(UnaryOp::Neg, sub, span)
            }
            TokenKind::Operator(Operator::Tilde) => {
                let span = self.lookahead.span;
                self.advance()?;
                let sub = self.parse_primary()?;
                self.make_unary(UnaryOp::BitNot, sub, span)
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<ExprId, Error> {
        let span = self.lookahead.span;
        match self.lookahead.kind.clone() {
            TokenKind::Number(n) => {
                self.advance()?;
                Ok(self.unit.alloc_expr(Expr::Literal(LiteralValue::Number(n)), LiteralType::Number, span))
            }
            TokenKind::String(s) => {
                self.advance()?;
                Ok(self.unit.alloc_expr(Expr::Literal(LiteralValue::String(s)), LiteralType::String, span))
            }
            TokenKind::StringFragment(_) => self.parse_interpolated_string(),
            TokenKind::Regex(pattern) => {
                self.advance()?;
                Ok(self.unit.alloc_expr(Expr::Literal(LiteralValue::RegExp(pattern)), LiteralType::RegExp, span))
            }
            TokenKind::IpAddress(addr) => {
                self.advance()?;
                Ok(self.unit.alloc_expr(Expr::Literal(LiteralValue::IpAddress(addr)), LiteralType::IpAddress, span))
            }
            TokenKind::Cidr(cidr) => {
                self.advance()?;
                Ok(self.unit.alloc_expr(Expr::Literal(LiteralValue::Cidr(cidr)), LiteralType::Cidr, span))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance()?;
                Ok(self.unit.alloc_expr(Expr::Literal(LiteralValue::Boolean(true)), LiteralType::Boolean, span))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance()?;
                Ok(self.unit.alloc_expr(Expr::Literal(LiteralValue::Boolean(false)), LiteralType::Boolean, span))
            }
            TokenKind::Keyword(Keyword::Int) => self.parse_cast(LiteralType::Number, CastTarget::Int, "int"),
            TokenKind::Keyword(Keyword::Bool) => self.parse_cast(LiteralType::Boolean, CastTarget::Bool, "bool"),
            TokenKind::Keyword(Keyword::StringTy) => self.parse_cast(LiteralType::String, CastTarget::StringTy, "string"),
            TokenKind::Ident(name) => self.parse_ident_primary(name, span),
            TokenKind::LParen => {
                self.advance()?;
                let inner = self.parse_expr()?;
                self.expect_rparen()?;
                Ok(inner)
            }
            TokenKind::LBracket => self.parse_array_literal(span),
            other => Err(ParseError::UnexpectedToken { found: format!("{other:?}"), expected: "an expression", span }.into()),
        }
    }

    fn parse_cast(&mut self, target: LiteralType, cast_target: CastTarget, keyword: &'static str) -> Result<ExprId, Error> {
        let span = self.lookahead.span;
        self.advance()?; // the cast keyword
        self.expect_lparen()?;
        let sub = self.parse_expr()?;
        let end_span = self.expect_rparen()?;
        let source_ty = self.unit.expr(sub).ty;
        optable::cast_result_type(source_ty, cast_target).ok_or(TypeError::InvalidCast { target: keyword, source: source_ty, span })?;
        Ok(self.unit.alloc_expr(Expr::Cast { target, sub }, target, span.to(end_span)))
    }

    fn parse_ident_primary(&mut self, name: String, span: Span) -> Result<ExprId, Error> {
        let id = match self.unit.symbols.lookup(self.current_scope(), &name, LookupMode::All) {
            Some(id) => id,
            None => {
                let global = self.unit.global_scope();
                let locals = self.unit.symbols.alloc_scope(Some(global));
                self.unit.symbols.forward_declare_handler(global, &name, locals)
            }
        };
        self.advance()?;
        let kind = self.unit.symbols.symbol(id).kind.clone();
        match kind {
            SymbolKind::Variable { initializer } => {
                if matches!(self.lookahead.kind, TokenKind::LParen) {
                    return Err(TypeError::NotCallable { name, span }.into());
                }
                let ty = self.unit.expr(initializer).ty;
                Ok(self.unit.alloc_expr(Expr::Variable(id), ty, span))
            }
            SymbolKind::Handler { .. } => {
                if matches!(self.lookahead.kind, TokenKind::LParen) {
                    return Err(TypeError::HandlerTakesNoArguments { name, span }.into());
                }
                Ok(self.unit.alloc_expr(Expr::HandlerRef(id), LiteralType::Handler, span))
            }
            SymbolKind::BuiltinFunction { candidates } | SymbolKind::BuiltinHandler { candidates } => {
                let args = if matches!(self.lookahead.kind, TokenKind::LParen) { self.parse_paren_args()? } else { Vec::new() };
                let arg_types: Vec<LiteralType> = args.iter().map(|a| self.unit.expr(*a).ty).collect();
                let sig = Self::resolve_builtin(&name, &candidates, &arg_types, span)?;
                let ty = sig.return_type;
                Ok(self.unit.alloc_expr(Expr::Call { callee: id, args }, ty, span))
            }
            SymbolKind::Unit { .. } => Err(TypeError::NotCallable { name, span }.into()),
        }
    }

    fn parse_array_literal(&mut self, span: Span) -> Result<ExprId, Error> {
        self.advance()?; // '['
        let mut elements = Vec::new();
        if !matches!(self.lookahead.kind, TokenKind::RBracket) {
            loop {
                elements.push(self.parse_expr()?);
                if matches!(self.lookahead.kind, TokenKind::Comma) {
                    self.advance()?;
                    continue;
                }
                break;
            }
        }
        let end_span = self.expect_rbracket()?;
        let Some(&first) = elements.first() else {
            return Err(ParseError::EmptyArrayLiteral { span: span.to(end_span) }.into());
        };
        let elem_type = self.unit.expr(first).ty;
        for &e in &elements {
            let ty = self.unit.expr(e).ty;
            if ty != elem_type {
                return Err(TypeError::ArrayElementTypeMismatch { expected: elem_type, found: ty, span: self.unit.expr(e).span }.into());
            }
        }
        let array_ty = elem_type.array_of().ok_or(TypeError::NotArrayable { elem_type, span })?;
        Ok(self.unit.alloc_expr(Expr::Array { elements, elem_type }, array_ty, span.to(end_span)))
    }

    fn parse_interpolated_string(&mut self) -> Result<ExprId, Error> {
        let start_span = self.lookahead.span;
        let head = match self.lookahead.kind.clone() {
            TokenKind::StringFragment(s) => s,
            _ => unreachable!("caller checked for StringFragment"),
        };
        self.advance()?;
        let mut result = self.unit.alloc_expr(Expr::Literal(LiteralValue::String(head)), LiteralType::String, start_span);
        loop {
            let embedded = self.parse_expr()?;
            let interp_end_span = self.expect(|k| matches!(k, TokenKind::InterpolationEnd), "'}' closing an interpolation")?;
            let as_string = self.to_string_cast(embedded, interp_end_span)?;
            result = self.concat_strings(result, as_string, start_span)?;
            match self.lookahead.kind.clone() {
                TokenKind::StringFragment(mid) => {
                    let span = self.lookahead.span;
                    self.advance()?;
                    let mid_id = self.unit.alloc_expr(Expr::Literal(LiteralValue::String(mid)), LiteralType::String, span);
                    result = self.concat_strings(result, mid_id, start_span)?;
                }
                TokenKind::StringEnd(tail) => {
                    let span = self.lookahead.span;
                    self.advance()?;
                    let tail_id = self.unit.alloc_expr(Expr::Literal(LiteralValue::String(tail)), LiteralType::String, span);
                    result = self.concat_strings(result, tail_id, start_span)?;
                    break;
                }
                other => {
                    return Err(ParseError::UnexpectedToken {
                        found: format!("{other:?}"),
                        expected: "the rest of an interpolated string",
                        span: self.lookahead.span,
                    }
                    .into())
                }
            }
        }
        Ok(result)
    }

    fn to_string_cast(&mut self, expr: ExprId, span: Span) -> Result<ExprId, Error> {
        let ty = self.unit.expr(expr).ty;
        if ty == LiteralType::String {
            return Ok(expr);
        }
        optable::cast_result_type(ty, CastTarget::StringTy).ok_or(TypeError::InvalidCast { target: "string", source: ty, span })?;
        Ok(self.unit.alloc_expr(Expr::Cast { target: LiteralType::String, sub: expr }, LiteralType::String, span))
    }

    fn concat_strings(&mut self, lhs: ExprId, rhs: ExprId, span: Span) -> Result<ExprId, Error> {
        self.make_binary(BinaryOp::Add, lhs, rhs, span)
    }
}

fn keyword_name(kw: Keyword) -> &'static str {
    match kw {
        Keyword::Handler => "'handler'",
        Keyword::Var => "'var'",
        Keyword::If => "'if'",
        Keyword::Unless => "'unless'",
        Keyword::Then => "'then'",
        Keyword::Else => "'else'",
        Keyword::Match => "'match'",
        Keyword::On => "'on'",
        Keyword::Import => "'import'",
        Keyword::From => "'from'",
        Keyword::True => "'true'",
        Keyword::False => "'false'",
        Keyword::Int => "'int'",
        Keyword::Bool => "'bool'",
        Keyword::StringTy => "'string'",
        Keyword::Not => "'not'",
        Keyword::And => "'and'",
        Keyword::Or => "'or'",
        Keyword::Xor => "'xor'",
        Keyword::In => "'in'",
        Keyword::Shl => "'shl'",
        Keyword::Shr => "'shr'",
    }
}

fn binary_op_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Rem => "%",
        BinaryOp::Pow => "**",
        BinaryOp::Shl => "shl",
        BinaryOp::Shr => "shr",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
        BinaryOp::Xor => "xor",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::PrefixMatch => "=^",
        BinaryOp::SuffixMatch => "=$",
        BinaryOp::RegexMatch => "=~",
        BinaryOp::In => "in",
    }
}

fn unary_op_name(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Neg => "-",
        UnaryOp::Not => "not",
        UnaryOp::BitNot => "~",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_syntax::symbol::Param;

    fn parse(src: &str) -> Result<(Unit, DiagnosticsReport), Error> {
        parse_with_prelude(src, Vec::new())
    }

    fn parse_with_prelude(src: &str, prelude: Prelude) -> Result<(Unit, DiagnosticsReport), Error> {
        let mut map = SourceMap::new();
        let id = map.add_inline("<test>", src.to_string());
        // leak the map so its lifetime covers the parser; tests are short-lived.
        let map: &'static SourceMap = Box::leak(Box::new(map));
        Parser::with_prelude(map, id, prelude)?.parse()
    }

    #[test]
    fn parses_var_and_handler_decl() {
        let (unit, _) = parse("var greeting = \"hi\"; handler main { echo greeting; };").unwrap();
        assert_eq!(unit.stmts.len() >= 1, true);
    }

    #[test]
    fn rejects_incompatible_binary_operands() {
        let err = parse("handler main { var_unused = 1 + \"x\"; };");
        assert!(matches!(err, Err(Error::Type(TypeError::IncompatibleOperands { .. }))));
    }

    #[test]
    fn forward_declares_handler_call_then_implements_it() {
        let (unit, _) = parse("handler main { helper(); }; handler helper { echo \"hi\"; };").unwrap();
        let id = unit.symbols.lookup(unit.global_scope(), "helper", LookupMode::All).unwrap();
        assert!(!unit.symbols.symbol(id).is_forward_declared_handler());
    }

    #[test]
    fn implementing_a_handler_twice_is_an_error() {
        let err = parse("handler main { }; handler main { };");
        assert!(matches!(err, Err(Error::Type(TypeError::HandlerRedeclaredWithBody { .. }))));
    }

    #[test]
    fn match_requires_labels_matching_subject_type() {
        let err = parse(
            r#"handler main {
                match "GET" {
                    1: echo "no";
                    else: echo "ok";
                }
            };"#,
        );
        assert!(matches!(err, Err(Error::Parse(ParseError::MatchLabelKindMismatch { .. }))));
    }

    #[test]
    fn match_same_type_labels_parse() {
        let (unit, _) = parse(
            r#"handler main {
                match "GET" {
                    "GET", "HEAD": echo "ok";
                    else: echo "no";
                }
            };"#,
        )
        .unwrap();
        assert!(!unit.stmts.is_empty());
    }

    #[test]
    fn postscript_if_wraps_statement_in_a_conditional() {
        let (unit, _) = parse(r#"handler main { echo "hi" if true; };"#).unwrap();
        let handler_id = unit.symbols.lookup(unit.global_scope(), "main", LookupMode::All).unwrap();
        let body = match &unit.symbols.symbol(handler_id).kind {
            SymbolKind::Handler { body: Some(body), .. } => *body,
            _ => panic!("expected implemented handler"),
        };
        assert!(matches!(unit.stmt(body).node, Stmt::Cond { .. }));
    }

    #[test]
    fn string_interpolation_concatenates_fragments_and_casts_non_strings() {
        let (unit, _) = parse(r#"var x = 1; handler main { echo "count: #{x}"; };"#).unwrap();
        // the outermost node of the interpolated string is a String-typed binary Add
        let found_concat = unit.exprs.iter().any(|e| matches!(&e.node, Expr::Binary { op: BinaryOp::Add, .. }) && e.ty == LiteralType::String);
        assert!(found_concat);
    }

    #[test]
    fn builtin_overload_resolves_via_prelude_signature() {
        let prelude: Prelude = vec![(
            "docroot".to_string(),
            SymbolKind::BuiltinHandler { candidates: vec![BuiltinSignature { params: vec![Param::required(LiteralType::String)], return_type: LiteralType::Void }] },
        )];
        let (unit, _) = parse_with_prelude(r#"handler main { docroot "/var/www"; };"#, prelude).unwrap();
        assert!(!unit.stmts.is_empty());
    }

    #[test]
    fn builtin_call_with_wrong_arg_type_is_rejected() {
        let prelude: Prelude = vec![(
            "docroot".to_string(),
            SymbolKind::BuiltinHandler { candidates: vec![BuiltinSignature { params: vec![Param::required(LiteralType::String)], return_type: LiteralType::Void }] },
        )];
        let err = parse_with_prelude("handler main { docroot 5; };", prelude);
        assert!(matches!(err, Err(Error::Type(TypeError::NoMatchingOverload { .. }))));
    }

    #[test]
    fn cast_to_incompatible_target_is_rejected() {
        let err = parse(r#"handler main { var_unused = int(true); };"#);
        assert!(matches!(err, Err(Error::Type(TypeError::InvalidCast { .. }))));
    }
}
