//! Lowers a type-checked `flow_syntax::ast::Unit` into a `crate::Program`
//! (spec component E "IR & Builder"). One `flow_ir::Handler` is produced per
//! implemented `handler` declaration; `var` declarations in the global scope
//! are materialized once, by value, into the `setup` handler's entry block
//! (see "global variable materialization" in DESIGN.md) rather than
//! re-evaluated on every load.

use flow_syntax::ast::{BinaryOp, Expr, MatchOp, Stmt, UnaryOp, Unit};
use flow_syntax::symbol::{LookupMode, SymbolId, SymbolKind};
use flow_syntax::{ast::ExprId, ast::StmtId, LiteralType, LiteralValue};

use crate::constant::ConstantPool;
use crate::error::BuildError;
use crate::handler::{Handler, Instruction, Terminator};
use crate::ids::{BlockId, ValueId, VarSlot};
use crate::opcode::{Opcode, Relation};
use crate::program::Program;

/// Top-level entry point: lower every implemented handler in `unit` into a
/// fresh `Program`.
pub struct Builder<'u> {
    unit: &'u Unit,
    program: Program,
}

impl<'u> Builder<'u> {
    pub fn new(unit: &'u Unit) -> Self {
        Self { unit, program: Program::new() }
    }

    pub fn build(mut self) -> Result<Program, BuildError> {
        self.collect_globals();
        let handler_ids: Vec<SymbolId> = (0..self.unit.symbols.symbols.len() as u32)
            .map(SymbolId)
            .filter(|&id| self.unit.symbols.symbol(id).is_handler())
            .collect();
        // Global `var` initializers run once, at boot, inside `setup`. Units
        // without an explicit `setup` (e.g. small test fixtures) still need
        // their globals materialized somewhere, so the first handler built
        // takes on the prologue as a best-effort fallback.
        let prologue_handler = handler_ids
            .iter()
            .find(|&&id| self.unit.symbols.symbol(id).name == "setup")
            .copied()
            .or_else(|| handler_ids.first().copied());
        for id in handler_ids {
            self.build_handler(id, Some(id) == prologue_handler)?;
        }
        Ok(self.program)
    }

    /// Every `Variable` symbol declared directly in the unit's global scope
    /// (as opposed to a handler-local var introduced by a bare assignment)
    /// is a "global" (spec §3 Symbols: "Unit (top-level scope"). These are
    /// the only symbols the builder routes through `VarSlot::Global`.
    fn collect_globals(&mut self) {
        let global_scope = self.unit.global_scope();
        for i in 0..self.unit.symbols.symbols.len() as u32 {
            let id = SymbolId(i);
            let name = &self.unit.symbols.symbol(id).name;
            if self.unit.symbols.lookup(global_scope, name, LookupMode::SelfOnly) != Some(id) {
                continue;
            }
            if matches!(self.unit.symbols.symbol(id).kind, SymbolKind::Variable { .. }) {
                self.program.globals.push(id);
            }
        }
    }

    fn build_handler(&mut self, id: SymbolId, is_prologue_handler: bool) -> Result<(), BuildError> {
        let symbol = self.unit.symbols.symbol(id).clone();
        let body = match symbol.kind {
            SymbolKind::Handler { body: Some(body), .. } => body,
            SymbolKind::Handler { body: None, .. } => return Err(BuildError::UnresolvedHandlerBody { name: symbol.name }),
            _ => unreachable!("build_handler only called on Handler symbols"),
        };
        let globals = self.program.globals.clone();
        let mut handler = Handler::new(symbol.name.clone(), id);
        let end = {
            let mut cx = HandlerCx { unit: self.unit, constants: &mut self.program.constants, globals: &globals, handler: &mut handler };
            let entry = Handler::ENTRY;
            if is_prologue_handler {
                cx.emit_global_prologue(entry)?;
            }
            cx.lower_stmt(body, entry)?
        };
        if !handler.block(end).is_terminated() {
            let mut cx = HandlerCx { unit: self.unit, constants: &mut self.program.constants, globals: &globals, handler: &mut handler };
            let result = cx.emit(end, Opcode::LoadBool(false), Vec::new());
            cx.handler.set_terminator(end, Terminator::Return(result));
        }
        self.program.handlers.push(handler);
        Ok(())
    }
}

/// Per-handler lowering state: a cursor into one `Handler`'s CFG plus
/// shared, read-only access to the unit being lowered and the program's
/// constant pools.
struct HandlerCx<'u, 'p> {
    unit: &'u Unit,
    constants: &'p mut ConstantPool,
    globals: &'p [SymbolId],
    handler: &'p mut Handler,
}

impl<'u, 'p> HandlerCx<'u, 'p> {
    fn is_global(&self, sym: SymbolId) -> bool {
        self.globals.contains(&sym)
    }

    fn var_slot(&self, sym: SymbolId) -> VarSlot {
        if self.is_global(sym) {
            VarSlot::Global(sym)
        } else {
            VarSlot::Local(sym)
        }
    }

    fn emit(&mut self, block: BlockId, opcode: Opcode, operands: Vec<ValueId>) -> ValueId {
        let result = self.handler.alloc_value();
        self.handler.push(block, Instruction::new(Some(result), opcode, operands));
        result
    }

    fn emit_void(&mut self, block: BlockId, opcode: Opcode, operands: Vec<ValueId>) {
        self.handler.push(block, Instruction::new(None, opcode, operands));
    }

    /// Evaluate every global `var`'s initializer, in declaration order, and
    /// store it into its `VarSlot::Global` — run once, at the front of
    /// `setup`'s entry block, before `setup`'s own body.
    fn emit_global_prologue(&mut self, block: BlockId) -> Result<(), BuildError> {
        let globals = self.globals.to_vec();
        for sym in globals {
            let initializer = match &self.unit.symbols.symbol(sym).kind {
                SymbolKind::Variable { initializer } => *initializer,
                _ => continue,
            };
            let value = self.lower_expr(initializer, block)?;
            self.emit_void(block, Opcode::Store(VarSlot::Global(sym)), vec![value]);
        }
        Ok(())
    }

    // -- statements -----------------------------------------------------

    /// Lower one statement starting at `block`; returns the block where
    /// execution continues afterward (which may be a freshly allocated join
    /// block, or `block` itself if nothing branched).
    fn lower_stmt(&mut self, stmt: StmtId, block: BlockId) -> Result<BlockId, BuildError> {
        let node = self.unit.stmt(stmt).node.clone();
        match node {
            Stmt::Compound(stmts) => self.lower_compound(&stmts, block),
            Stmt::Cond { cond, then_branch, else_branch } => self.lower_cond(cond, then_branch, else_branch, block),
            Stmt::Match { subject, op, cases, else_branch } => self.lower_match(subject, op, &cases, else_branch, block),
            Stmt::Assign { symbol, value } => self.lower_assign(symbol, value, block),
            Stmt::ExprStmt(expr) => self.lower_expr_stmt(expr, block),
        }
    }

    fn lower_compound(&mut self, stmts: &[StmtId], block: BlockId) -> Result<BlockId, BuildError> {
        let mut cur = block;
        for &s in stmts {
            cur = self.lower_stmt(s, cur)?;
            if self.handler.block(cur).is_terminated() {
                break;
            }
        }
        Ok(cur)
    }

    fn lower_cond(&mut self, cond: ExprId, then_branch: StmtId, else_branch: Option<StmtId>, block: BlockId) -> Result<BlockId, BuildError> {
        let cond_val = self.lower_expr(cond, block)?;
        let then_block = self.handler.alloc_block();
        let else_block = self.handler.alloc_block();
        self.handler.set_terminator(block, Terminator::CondBranch { cond: cond_val, then_block, else_block });
        let join = self.handler.alloc_block();

        let then_end = self.lower_stmt(then_branch, then_block)?;
        if !self.handler.block(then_end).is_terminated() {
            self.handler.set_terminator(then_end, Terminator::Branch(join));
        }
        let else_end = match else_branch {
            Some(e) => self.lower_stmt(e, else_block)?,
            None => else_block,
        };
        if !self.handler.block(else_end).is_terminated() {
            self.handler.set_terminator(else_end, Terminator::Branch(join));
        }
        Ok(join)
    }

    /// Lowers a `match` as a chain of test blocks, one per case (spec §4.2
    /// "Match semantics"): each case ORs together the per-label comparisons
    /// for that case, branches to the case body on a hit, and otherwise
    /// falls through to the next case's test block; running off the end
    /// falls through to `else` (or straight to the join if there is none).
    fn lower_match(&mut self, subject: ExprId, op: MatchOp, cases: &[(Vec<ExprId>, StmtId)], else_branch: Option<StmtId>, entry_block: BlockId) -> Result<BlockId, BuildError> {
        let subject_ty = self.unit.expr(subject).ty;
        let subject_val = self.lower_expr(subject, entry_block)?;
        let join = self.handler.alloc_block();
        let mut test_block = entry_block;

        for (labels, body) in cases {
            let mut combined: Option<ValueId> = None;
            for &label in labels {
                let label_val = self.lower_expr(label, test_block)?;
                let test = self.emit_match_test(op, subject_ty, subject_val, label_val, test_block)?;
                combined = Some(match combined {
                    None => test,
                    Some(prev) => self.emit(test_block, Opcode::BOr, vec![prev, test]),
                });
            }
            let cond = combined.expect("a match case always carries at least one label");
            let body_block = self.handler.alloc_block();
            let next_test_block = self.handler.alloc_block();
            self.handler.set_terminator(test_block, Terminator::CondBranch { cond, then_block: body_block, else_block: next_test_block });

            let body_end = self.lower_stmt(*body, body_block)?;
            if !self.handler.block(body_end).is_terminated() {
                self.handler.set_terminator(body_end, Terminator::Branch(join));
            }
            test_block = next_test_block;
        }

        match else_branch {
            Some(else_stmt) => {
                let else_end = self.lower_stmt(else_stmt, test_block)?;
                if !self.handler.block(else_end).is_terminated() {
                    self.handler.set_terminator(else_end, Terminator::Branch(join));
                }
            }
            None => self.handler.set_terminator(test_block, Terminator::Branch(join)),
        }
        Ok(join)
    }

    fn emit_match_test(&mut self, op: MatchOp, subject_ty: LiteralType, subject: ValueId, label: ValueId, block: BlockId) -> Result<ValueId, BuildError> {
        use LiteralType::*;
        match (op, subject_ty) {
            (MatchOp::Same, Number) => {
                let diff = self.emit(block, Opcode::NSub, vec![subject, label]);
                Ok(self.emit(block, Opcode::NCmpZero(Relation::Eq), vec![diff]))
            }
            (MatchOp::Same, Boolean) => Ok(self.emit(block, Opcode::BCmpEq, vec![subject, label])),
            (MatchOp::Same, String) => Ok(self.emit(block, Opcode::SCmp(Relation::Eq), vec![subject, label])),
            (MatchOp::Same, IpAddress) => Ok(self.emit(block, Opcode::IpCmpEq, vec![subject, label])),
            (MatchOp::Same, Cidr) => Ok(self.emit(block, Opcode::CidrCmpEq, vec![subject, label])),
            (MatchOp::Head, String) => Ok(self.emit(block, Opcode::SHeadMatch, vec![subject, label])),
            (MatchOp::Tail, String) => Ok(self.emit(block, Opcode::STailMatch, vec![subject, label])),
            (MatchOp::RegExp, String) => Ok(self.emit(block, Opcode::SRegexMatch, vec![subject, label])),
            _ => Err(BuildError::UnsupportedMatchSubject { subject_ty }),
        }
    }

    fn lower_assign(&mut self, symbol: SymbolId, value: ExprId, block: BlockId) -> Result<BlockId, BuildError> {
        let v = self.lower_expr(value, block)?;
        let slot = self.var_slot(symbol);
        self.emit_void(block, Opcode::Store(slot), vec![v]);
        Ok(block)
    }

    /// A statement-position call to a handler (user-defined or builtin) gets
    /// the "handled" short-circuit (spec §4.3 "Handler-call semantics");
    /// every other expression used as a statement just has its value
    /// computed and discarded.
    ///
    /// `return(status, override)` is not an ordinary builtin call: it's the
    /// one construct that lowers straight to a `Terminator::ReturnCall`
    /// (spec §4.6), so it's special-cased here ahead of the generic
    /// short-circuit dispatch below.
    fn lower_expr_stmt(&mut self, expr: ExprId, block: BlockId) -> Result<BlockId, BuildError> {
        if let Expr::Call { callee, args } = self.unit.expr(expr).node.clone() {
            let symbol = self.unit.symbols.symbol(callee).clone();
            if symbol.name == "return" && matches!(symbol.kind, SymbolKind::BuiltinHandler { .. }) && args.len() == 2 {
                let status = self.lower_expr(args[0], block)?;
                let override_status = self.lower_expr(args[1], block)?;
                self.handler.set_terminator(block, Terminator::ReturnCall { status, override_status });
                return Ok(block);
            }
            match symbol.kind {
                SymbolKind::Handler { .. } => return self.lower_handler_call(callee, &args, block, true),
                SymbolKind::BuiltinHandler { .. } => return self.lower_handler_call(callee, &args, block, false),
                _ => {}
            }
        }
        self.lower_expr(expr, block)?;
        Ok(block)
    }

    fn lower_handler_call(&mut self, callee: SymbolId, args: &[ExprId], block: BlockId, is_user_handler: bool) -> Result<BlockId, BuildError> {
        let mut arg_vals = Vec::with_capacity(args.len());
        for &a in args {
            arg_vals.push(self.lower_expr(a, block)?);
        }
        let opcode = if is_user_handler { Opcode::CallHandler(callee) } else { Opcode::InvokeHandler(callee) };
        let handled = self.emit(block, opcode, arg_vals);

        let done_block = self.handler.alloc_block();
        let continue_block = self.handler.alloc_block();
        self.handler.set_terminator(block, Terminator::CondBranch { cond: handled, then_block: done_block, else_block: continue_block });

        let true_val = self.emit(done_block, Opcode::LoadBool(true), Vec::new());
        self.handler.set_terminator(done_block, Terminator::Return(true_val));
        Ok(continue_block)
    }

    // -- expressions ------------------------------------------------------

    fn lower_expr(&mut self, expr: ExprId, block: BlockId) -> Result<ValueId, BuildError> {
        let node = self.unit.expr(expr).node.clone();
        match node {
            Expr::Literal(value) => self.lower_literal(value, block),
            Expr::Variable(sym) => {
                let slot = self.var_slot(sym);
                Ok(self.emit(block, Opcode::Load(slot), Vec::new()))
            }
            Expr::HandlerRef(sym) => Ok(self.emit(block, Opcode::LoadHandlerRef(sym), Vec::new())),
            Expr::Call { callee, args } => self.lower_call_expr(callee, &args, block),
            Expr::Unary { op, sub } => self.lower_unary(op, sub, block),
            Expr::Binary { op, lhs, rhs } => self.lower_binary(op, lhs, rhs, block),
            Expr::Array { elements, elem_type } => self.lower_array(&elements, elem_type, block),
            Expr::Cast { target, sub } => self.lower_cast(target, sub, block),
        }
    }

    fn lower_literal(&mut self, value: LiteralValue, block: BlockId) -> Result<ValueId, BuildError> {
        let opcode = match value {
            LiteralValue::Boolean(b) => Opcode::LoadBool(b),
            LiteralValue::Number(n) => Opcode::LoadConst(self.constants.number(n)),
            LiteralValue::String(s) => Opcode::LoadConst(self.constants.string(s)),
            LiteralValue::IpAddress(ip) => Opcode::LoadConst(self.constants.ip(ip)),
            LiteralValue::Cidr(c) => Opcode::LoadConst(self.constants.cidr(c)),
            LiteralValue::RegExp(p) => Opcode::LoadConst(self.constants.regex(p)),
            // A bare `Handler` literal value never appears in a typed AST:
            // the parser only ever produces `Expr::HandlerRef` for handler
            // names (see `lower_expr` above).
            LiteralValue::Handler(_) => unreachable!("the parser never constructs a LiteralValue::Handler"),
            LiteralValue::IntArray(v) => {
                let cref = self.constants.number_array(v);
                Opcode::LoadConst(cref)
            }
            LiteralValue::StringArray(v) => {
                let cref = self.constants.string_array(v);
                Opcode::LoadConst(cref)
            }
            LiteralValue::IpAddrArray(v) => {
                let cref = self.constants.ip_array(v);
                Opcode::LoadConst(cref)
            }
            LiteralValue::CidrArray(v) => {
                let cref = self.constants.cidr_array(v);
                Opcode::LoadConst(cref)
            }
            LiteralValue::Void => unreachable!("the grammar has no literal syntax for Void"),
        };
        Ok(self.emit(block, opcode, Vec::new()))
    }

    fn lower_call_expr(&mut self, callee: SymbolId, args: &[ExprId], block: BlockId) -> Result<ValueId, BuildError> {
        let mut arg_vals = Vec::with_capacity(args.len());
        for &a in args {
            arg_vals.push(self.lower_expr(a, block)?);
        }
        let kind = self.unit.symbols.symbol(callee).kind.clone();
        let opcode = match kind {
            SymbolKind::BuiltinFunction { .. } => Opcode::CallFunction(callee),
            SymbolKind::BuiltinHandler { .. } => Opcode::InvokeHandler(callee),
            SymbolKind::Handler { .. } => Opcode::CallHandler(callee),
            _ => unreachable!("the parser only allows Call on Handler/BuiltinFunction/BuiltinHandler symbols"),
        };
        Ok(self.emit(block, opcode, arg_vals))
    }

    fn lower_unary(&mut self, op: UnaryOp, sub: ExprId, block: BlockId) -> Result<ValueId, BuildError> {
        let sub_ty = self.unit.expr(sub).ty;
        let v = self.lower_expr(sub, block)?;
        let opcode = match (op, sub_ty) {
            (UnaryOp::Neg, LiteralType::Number) => Opcode::NNeg,
            (UnaryOp::BitNot, LiteralType::Number) => Opcode::NNot,
            (UnaryOp::Not, LiteralType::Boolean) => Opcode::BNot,
            _ => return Err(BuildError::UnsupportedUnaryOperand { op: format!("{op:?}"), operand: sub_ty }),
        };
        Ok(self.emit(block, opcode, vec![v]))
    }

    /// Mirrors `flow_syntax::optable::binary_result_type` one-for-one: any
    /// pair the typing table accepts must have a matching opcode here (spec
    /// §8 universal invariant).
    fn lower_binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId, block: BlockId) -> Result<ValueId, BuildError> {
        let lhs_ty = self.unit.expr(lhs).ty;
        let rhs_ty = self.unit.expr(rhs).ty;
        let lv = self.lower_expr(lhs, block)?;
        let rv = self.lower_expr(rhs, block)?;
        use BinaryOp::*;
        use LiteralType::*;

        let result = match (op, lhs_ty, rhs_ty) {
            (Add, Number, Number) => self.emit(block, Opcode::NAdd, vec![lv, rv]),
            (Sub, Number, Number) => self.emit(block, Opcode::NSub, vec![lv, rv]),
            (Mul, Number, Number) => self.emit(block, Opcode::NMul, vec![lv, rv]),
            (Div, Number, Number) => self.emit(block, Opcode::NDiv, vec![lv, rv]),
            (Rem, Number, Number) => self.emit(block, Opcode::NRem, vec![lv, rv]),
            (Pow, Number, Number) => self.emit(block, Opcode::NPow, vec![lv, rv]),
            (Shl, Number, Number) => self.emit(block, Opcode::NShl, vec![lv, rv]),
            (Shr, Number, Number) => self.emit(block, Opcode::NLShr, vec![lv, rv]),
            (Add, String, String) => self.emit(block, Opcode::SCat, vec![lv, rv]),
            (And, Boolean, Boolean) => self.emit(block, Opcode::BAnd, vec![lv, rv]),
            (Or, Boolean, Boolean) => self.emit(block, Opcode::BOr, vec![lv, rv]),
            (Xor, Boolean, Boolean) => self.emit(block, Opcode::BXor, vec![lv, rv]),
            (Eq, Boolean, Boolean) => self.emit(block, Opcode::BCmpEq, vec![lv, rv]),
            (Ne, Boolean, Boolean) => self.emit(block, Opcode::BCmpNe, vec![lv, rv]),
            (Eq, Number, Number) => self.number_cmp(Relation::Eq, lv, rv, block),
            (Ne, Number, Number) => self.number_cmp(Relation::Ne, lv, rv, block),
            (Lt, Number, Number) => self.number_cmp(Relation::Lt, lv, rv, block),
            (Le, Number, Number) => self.number_cmp(Relation::Le, lv, rv, block),
            (Gt, Number, Number) => self.number_cmp(Relation::Gt, lv, rv, block),
            (Ge, Number, Number) => self.number_cmp(Relation::Ge, lv, rv, block),
            (Eq, String, String) => self.emit(block, Opcode::SCmp(Relation::Eq), vec![lv, rv]),
            (Ne, String, String) => self.emit(block, Opcode::SCmp(Relation::Ne), vec![lv, rv]),
            (Lt, String, String) => self.emit(block, Opcode::SCmp(Relation::Lt), vec![lv, rv]),
            (Le, String, String) => self.emit(block, Opcode::SCmp(Relation::Le), vec![lv, rv]),
            (Gt, String, String) => self.emit(block, Opcode::SCmp(Relation::Gt), vec![lv, rv]),
            (Ge, String, String) => self.emit(block, Opcode::SCmp(Relation::Ge), vec![lv, rv]),
            (PrefixMatch, String, String) => self.emit(block, Opcode::SHeadMatch, vec![lv, rv]),
            (SuffixMatch, String, String) => self.emit(block, Opcode::STailMatch, vec![lv, rv]),
            (RegexMatch, String, RegExp) => self.emit(block, Opcode::SRegexMatch, vec![lv, rv]),
            (Eq, IpAddress, IpAddress) => self.emit(block, Opcode::IpCmpEq, vec![lv, rv]),
            (Ne, IpAddress, IpAddress) => self.emit(block, Opcode::IpCmpNe, vec![lv, rv]),
            (Eq, Cidr, Cidr) => self.emit(block, Opcode::CidrCmpEq, vec![lv, rv]),
            (Ne, Cidr, Cidr) => self.emit(block, Opcode::CidrCmpNe, vec![lv, rv]),
            (In, IpAddress, Cidr) => self.emit(block, Opcode::IpInCidr, vec![lv, rv]),
            (In, IpAddress, IpAddrArray) => self.emit(block, Opcode::IpArrayContains, vec![lv, rv]),
            (In, Cidr, CidrArray) => self.emit(block, Opcode::CidrArrayContains, vec![lv, rv]),
            (In, Number, IntArray) => self.emit(block, Opcode::NumberArrayContains, vec![lv, rv]),
            (In, String, StringArray) => self.emit(block, Opcode::StringArrayContains, vec![lv, rv]),
            _ => return Err(BuildError::UnsupportedBinaryOperand { op: format!("{op:?}"), lhs: lhs_ty, rhs: rhs_ty }),
        };
        Ok(result)
    }

    /// Number relational/equality compares all go through a single
    /// "subtract, then compare-to-zero" pair of opcodes (spec §4.3).
    fn number_cmp(&mut self, rel: Relation, lv: ValueId, rv: ValueId, block: BlockId) -> ValueId {
        let diff = self.emit(block, Opcode::NSub, vec![lv, rv]);
        self.emit(block, Opcode::NCmpZero(rel), vec![diff])
    }

    fn lower_array(&mut self, elements: &[ExprId], elem_type: LiteralType, block: BlockId) -> Result<ValueId, BuildError> {
        // spec §3: array literals are non-empty and homogeneous by
        // construction (an empty array literal is a parse-time TypeError).
        // The instruction set has no "build array from N values" opcode
        // (spec §4.3), so elements must themselves be literals, folded into
        // one pooled array constant (see DESIGN.md).
        let mut numbers = Vec::new();
        let mut strings = Vec::new();
        let mut ips = Vec::new();
        let mut cidrs = Vec::new();
        for &e in elements {
            let lit = match &self.unit.expr(e).node {
                Expr::Literal(v) => v.clone(),
                _ => return Err(BuildError::NonLiteralArrayElement),
            };
            match lit {
                LiteralValue::Number(n) => numbers.push(n),
                LiteralValue::String(s) => strings.push(s),
                LiteralValue::IpAddress(ip) => ips.push(ip),
                LiteralValue::Cidr(c) => cidrs.push(c),
                _ => return Err(BuildError::UnsupportedArrayElementType(elem_type)),
            }
        }
        let cref = match elem_type {
            LiteralType::Number => self.constants.number_array(numbers),
            LiteralType::String => self.constants.string_array(strings),
            LiteralType::IpAddress => self.constants.ip_array(ips),
            LiteralType::Cidr => self.constants.cidr_array(cidrs),
            _ => return Err(BuildError::UnsupportedArrayElementType(elem_type)),
        };
        Ok(self.emit(block, Opcode::LoadConst(cref), Vec::new()))
    }

    fn lower_cast(&mut self, target: LiteralType, sub: ExprId, block: BlockId) -> Result<ValueId, BuildError> {
        let source_ty = self.unit.expr(sub).ty;
        let v = self.lower_expr(sub, block)?;
        if source_ty == target {
            return Ok(v);
        }
        use LiteralType::*;
        let opcode = match (source_ty, target) {
            (Number, String) => Opcode::CastNumberToString,
            (Boolean, String) => Opcode::CastBoolToString,
            (IpAddress, String) => Opcode::CastIpToString,
            (Cidr, String) => Opcode::CastCidrToString,
            (RegExp, String) => Opcode::CastRegexToString,
            (String, Number) => Opcode::CastStringToNumber,
            _ => return Err(BuildError::UnsupportedCast { source: source_ty, target }),
        };
        Ok(self.emit(block, opcode, vec![v]))
    }
}

#[cfg(test)]
mod tests {
    use flow_diagnostics::SourceMap;
    use flow_syntax::symbol::{BuiltinSignature, Param};
    use flow_parser::{Parser, Prelude};

    use super::*;

    fn echo_prelude() -> Prelude {
        vec![(
            "echo".to_string(),
            SymbolKind::BuiltinHandler { candidates: vec![BuiltinSignature { params: vec![Param::required(LiteralType::String)], return_type: LiteralType::Void }] },
        )]
    }

    fn build(src: &str) -> Program {
        let mut map = SourceMap::new();
        let id = map.add_inline("<test>", src.to_string());
        let map: &'static SourceMap = Box::leak(Box::new(map));
        let (unit, _) = Parser::with_prelude(map, id, echo_prelude()).unwrap().parse().unwrap();
        let unit: &'static Unit = Box::leak(Box::new(unit));
        Builder::new(unit).build().unwrap()
    }

    #[test]
    fn builds_a_single_block_handler() {
        let program = build(r#"handler main { echo "hi"; };"#);
        let main = program.find_handler("main").unwrap();
        // the InvokeHandler call splits the entry block into a CondBranch
        // over done/continue (spec §4.3 handler-call semantics).
        assert!(matches!(main.block(Handler::ENTRY).terminator, Some(Terminator::CondBranch { .. })));
        assert!(main.blocks.iter().all(|b| b.is_terminated()));
    }

    #[test]
    fn cond_statement_joins_both_branches() {
        let program = build(r#"handler main { if (1 == 1) { echo "yes"; } else { echo "no"; } };"#);
        let main = program.find_handler("main").unwrap();
        assert!(matches!(main.block(Handler::ENTRY).terminator, Some(Terminator::CondBranch { .. })));
        // every reachable block terminates; nothing is left dangling.
        for id in main.reachable_blocks() {
            assert!(main.block(id).is_terminated());
        }
    }

    #[test]
    fn global_var_initializer_is_hoisted_into_setup_prologue() {
        let program = build(r#"var counter = 5; handler setup { }; handler main { echo "hi"; };"#);
        let counter = program.globals[0];
        let setup = program.find_handler("setup").unwrap();
        let stores_counter = setup.block(Handler::ENTRY).instructions.iter().any(|i| matches!(i.opcode, Opcode::Store(slot) if slot.symbol() == counter));
        assert!(stores_counter);
        // main never re-evaluates the initializer; it only ever loads the global.
        let main = program.find_handler("main").unwrap();
        assert!(main.blocks.iter().flat_map(|b| &b.instructions).all(|i| !matches!(i.opcode, Opcode::Store(VarSlot::Global(_)))));
    }

    #[test]
    fn match_same_lowers_to_chained_tests() {
        let program = build(
            r#"handler main {
                match "GET" {
                    "GET", "HEAD": echo "a";
                    else: echo "b";
                }
            };"#,
        );
        let main = program.find_handler("main").unwrap();
        let or_count = main.blocks.iter().flat_map(|b| &b.instructions).filter(|i| matches!(i.opcode, Opcode::BOr)).count();
        // two labels on the first case are combined with one BOr.
        assert_eq!(or_count, 1);
    }

    #[test]
    fn number_array_literal_folds_into_pooled_constant() {
        let program = build(r#"var xs = [1, 2, 3]; handler main { echo "hi"; };"#);
        assert_eq!(program.constants.get_number_array(0), &[1, 2, 3]);
    }

    #[test]
    fn unresolved_handler_fails_to_build() {
        let mut map = SourceMap::new();
        let id = map.add_inline("<test>", "handler main { helper(); };".to_string());
        let map: &'static SourceMap = Box::leak(Box::new(map));
        let (unit, _) = Parser::new(map, id).unwrap().parse().unwrap();
        let unit: &'static Unit = Box::leak(Box::new(unit));
        let err = Builder::new(unit).build();
        assert!(matches!(err, Err(BuildError::UnresolvedHandlerBody { .. })));
    }
}
