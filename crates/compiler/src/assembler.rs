//! The assembler: recursive descent over tokens, straight to bytecode.
//!
//! There is no AST. Statements and expressions emit instructions into
//! the current function frame as they are parsed; nested `function` and
//! lambda literals open a fresh frame, and their finished [`Xptr`] lands
//! in the enclosing frame's rodata. Forward branches go through a label
//! table and are resolved to relative offsets when the frame closes.
//!
//! Name resolution is static where it can be: arguments (`Ap`), locals
//! (`Fp`), captured cells (`Cp`), and declared globals (`Gbl`) all get
//! direct slots; anything else compiles to a dynamic `Seek` by name.
//! Closure capture is recorded while the inner function parses — a name
//! found in an enclosing frame adds a capture cell at every level in
//! between, and the outer frame emits the capture loads right after
//! `DefFunc`.

use std::rc::Rc;

use evilcandy_core::value::Value;
use evilcandy_core::xptr::{call_flags, AttrKind, CmpKind, Instr, Opcode, PtrKind, SymScope, Xptr};
use evilcandy_core::{var_eq, ErrorClass, EvcError, Str, RECURSION_MAX};
use uuid::Uuid;

use crate::lexer::Lexer;
use crate::token::{Keyword, Op, Token, TokenKind};

/// How a resolved name is addressed from the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Arg(usize),
    Local(usize),
    Closure(usize),
}

/// A parsed-but-not-yet-loaded expression head, so assignment targets
/// never emit a dead load.
enum Deferred {
    /// Code for the value is already emitted.
    Value,
    /// A bare identifier.
    Name(Rc<str>),
    /// Object emitted; key interned at `rodata[idx]`.
    Attr(i16),
    /// Object and key emitted.
    Index,
    /// Object, start, stop, step emitted.
    Slice,
}

struct LoopCtx {
    break_label: usize,
    continue_label: usize,
}

struct FuncFrame {
    instr: Vec<Instr>,
    rodata: Vec<Value>,
    labels: Vec<Option<usize>>,
    /// `(instruction index, label)` pairs patched when the frame closes.
    fixups: Vec<(usize, usize)>,
    args: Vec<Rc<str>>,
    optind: i16,
    kwind: i16,
    locals: Vec<(Rc<str>, bool)>,
    /// Captured names with the binding the *enclosing* frame loads.
    closures: Vec<(Rc<str>, Binding)>,
    loops: Vec<LoopCtx>,
    first_line: u32,
    top_level: bool,
    /// Top frame only: globals declared so far, with constness.
    globals: Vec<(Rc<str>, bool)>,
}

impl FuncFrame {
    fn new(first_line: u32, top_level: bool) -> Self {
        FuncFrame {
            instr: Vec::new(),
            rodata: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            args: Vec::new(),
            optind: -1,
            kwind: -1,
            locals: Vec::new(),
            closures: Vec::new(),
            loops: Vec::new(),
            first_line,
            top_level,
            globals: Vec::new(),
        }
    }
}

pub struct Assembler<'a> {
    lx: Lexer<'a>,
    file: Rc<str>,
    frames: Vec<FuncFrame>,
    depth: usize,
    /// Second pushback slot, on top of the lexer's single `unget`.
    /// Needed only for the call-site `name = expr` keyword lookahead.
    pending: Option<Token>,
}

/// Assemble a whole script into its top-level code object.
pub fn assemble(source: &Str, file_name: Rc<str>) -> Result<Rc<Xptr>, EvcError> {
    let mut asm = Assembler::new(source, file_name);
    asm.run()
}

impl<'a> Assembler<'a> {
    pub fn new(source: &'a Str, file_name: Rc<str>) -> Self {
        let lx = Lexer::new(source, file_name.clone());
        Assembler {
            lx,
            file: file_name,
            frames: vec![FuncFrame::new(1, true)],
            depth: 0,
            pending: None,
        }
    }

    fn run(&mut self) -> Result<Rc<Xptr>, EvcError> {
        loop {
            let tok = self.next()?;
            if tok.kind == TokenKind::Eof {
                break;
            }
            self.lx.unget(tok);
            self.statement()?;
        }
        // A script that falls off the end returns null.
        let null = self.ro_const(Value::Null)?;
        self.emit(Opcode::LoadConst, 0, null);
        self.emit_op(Opcode::Return);
        let frame = self.frames.pop().expect("top frame");
        Ok(Rc::new(self.finish_frame(frame)?))
    }

    // ---- token plumbing ----

    fn next(&mut self) -> Result<Token, EvcError> {
        if let Some(tok) = self.pending.take() {
            return Ok(tok);
        }
        self.lx.next_token()
    }

    /// Push a token back ahead of anything the lexer holds.
    fn push_back(&mut self, tok: Token) {
        debug_assert!(self.pending.is_none());
        self.pending = Some(tok);
    }

    fn err(&self, msg: impl Into<String>) -> EvcError {
        EvcError::syntax(msg).with_location(self.file.as_ref(), self.lx.line())
    }

    fn expect_op(&mut self, op: Op) -> Result<(), EvcError> {
        let tok = self.next()?;
        if tok.kind == TokenKind::Op(op) {
            Ok(())
        } else {
            Err(self.err(format!("expected '{}', got {}", op.spelling(), tok.kind)))
        }
    }

    fn eat_op(&mut self, op: Op) -> Result<bool, EvcError> {
        let tok = self.next()?;
        if tok.kind == TokenKind::Op(op) {
            Ok(true)
        } else {
            self.lx.unget(tok);
            Ok(false)
        }
    }

    fn eat_kw(&mut self, kw: Keyword) -> Result<bool, EvcError> {
        let tok = self.next()?;
        if tok.kind == TokenKind::Kw(kw) {
            Ok(true)
        } else {
            self.lx.unget(tok);
            Ok(false)
        }
    }

    fn expect_ident(&mut self) -> Result<Rc<str>, EvcError> {
        let tok = self.next()?;
        match tok.kind {
            TokenKind::Ident(name) => Ok(name),
            other => Err(self.err(format!("expected identifier, got {other}"))),
        }
    }

    // ---- emission ----

    fn frame(&mut self) -> &mut FuncFrame {
        self.frames.last_mut().expect("frame")
    }

    fn emit(&mut self, code: Opcode, arg1: u8, arg2: i16) {
        self.frame().instr.push(Instr::new(code, arg1, arg2));
    }

    fn emit_op(&mut self, code: Opcode) {
        self.emit(code, 0, 0);
    }

    fn new_label(&mut self) -> usize {
        let frame = self.frame();
        frame.labels.push(None);
        frame.labels.len() - 1
    }

    fn bind_label(&mut self, label: usize) {
        let at = self.frame().instr.len();
        self.frame().labels[label] = Some(at);
    }

    /// Emit a branch whose offset is patched at frame close.
    fn emit_branch(&mut self, code: Opcode, arg1: u8, label: usize) {
        let at = self.frame().instr.len();
        self.frame().fixups.push((at, label));
        self.emit(code, arg1, 0);
    }

    fn ro_const(&mut self, v: Value) -> Result<i16, EvcError> {
        let frame = self.frame();
        let dedup = matches!(
            v,
            Value::Null | Value::Int(_) | Value::Float(_) | Value::Str(_)
        );
        if dedup {
            for (i, existing) in frame.rodata.iter().enumerate() {
                let same_type = std::mem::discriminant(existing) == std::mem::discriminant(&v);
                if same_type && var_eq(existing, &v).unwrap_or(false) {
                    return Ok(i as i16);
                }
            }
        }
        if frame.rodata.len() > i16::MAX as usize {
            return Err(EvcError::syntax("too many constants in one function"));
        }
        frame.rodata.push(v);
        Ok((frame.rodata.len() - 1) as i16)
    }

    fn ro_name(&mut self, name: &str) -> Result<i16, EvcError> {
        self.ro_const(Value::str(name))
    }

    // ---- name resolution ----

    fn resolve(&mut self, name: &str) -> Option<Binding> {
        let cur = self.frames.len() - 1;
        self.resolve_in(cur, name)
    }

    fn resolve_in(&mut self, fi: usize, name: &str) -> Option<Binding> {
        let frame = &self.frames[fi];
        if let Some(i) = frame.args.iter().position(|a| a.as_ref() == name) {
            return Some(Binding::Arg(i));
        }
        if let Some(i) = frame.locals.iter().position(|(l, _)| l.as_ref() == name) {
            return Some(Binding::Local(i));
        }
        if let Some(i) = frame.closures.iter().position(|(c, _)| c.as_ref() == name) {
            return Some(Binding::Closure(i));
        }
        if fi == 0 || frame.top_level {
            return None;
        }
        let outer = self.resolve_in(fi - 1, name)?;
        let frame = &mut self.frames[fi];
        frame.closures.push((Rc::from(name), outer));
        Some(Binding::Closure(frame.closures.len() - 1))
    }

    fn is_const_name(&self, name: &str) -> bool {
        let frame = self.frames.last().expect("frame");
        if let Some((_, is_const)) = frame.locals.iter().find(|(l, _)| l.as_ref() == name) {
            return *is_const;
        }
        let top = self.frames.first().expect("frame");
        if frame.top_level
            && let Some((_, is_const)) = top.globals.iter().find(|(g, _)| g.as_ref() == name)
        {
            return *is_const;
        }
        false
    }

    fn emit_load_name(&mut self, name: &str) -> Result<(), EvcError> {
        match self.resolve(name) {
            Some(Binding::Arg(i)) => self.emit(Opcode::Load, PtrKind::Ap as u8, i as i16),
            Some(Binding::Local(i)) => self.emit(Opcode::Load, PtrKind::Fp as u8, i as i16),
            Some(Binding::Closure(i)) => self.emit(Opcode::Load, PtrKind::Cp as u8, i as i16),
            None => {
                let frame = self.frames.last().expect("frame");
                let declared = frame.top_level
                    && frame.globals.iter().any(|(g, _)| g.as_ref() == name);
                let idx = self.ro_name(name)?;
                if declared {
                    self.emit(Opcode::Load, PtrKind::Gbl as u8, idx);
                } else {
                    self.emit(Opcode::Load, PtrKind::Seek as u8, idx);
                }
            }
        }
        Ok(())
    }

    fn emit_store_name(&mut self, name: &str) -> Result<(), EvcError> {
        if self.is_const_name(name) {
            return Err(self.err(format!("assignment to constant '{name}'")));
        }
        match self.resolve(name) {
            Some(Binding::Arg(i)) => self.emit(Opcode::Assign, PtrKind::Ap as u8, i as i16),
            Some(Binding::Local(i)) => self.emit(Opcode::Assign, PtrKind::Fp as u8, i as i16),
            Some(Binding::Closure(i)) => self.emit(Opcode::Assign, PtrKind::Cp as u8, i as i16),
            None => {
                let idx = self.ro_name(name)?;
                self.emit(Opcode::Assign, PtrKind::Seek as u8, idx);
            }
        }
        Ok(())
    }

    // ---- statements ----

    fn statement(&mut self) -> Result<(), EvcError> {
        if self.depth >= RECURSION_MAX {
            return Err(EvcError::new(
                ErrorClass::Recursion,
                "statements nested too deeply",
            ));
        }
        self.depth += 1;
        let result = self.statement_inner();
        self.depth -= 1;
        result
    }

    fn statement_inner(&mut self) -> Result<(), EvcError> {
        let tok = self.next()?;
        match tok.kind {
            TokenKind::Kw(Keyword::Let) => self.declaration(false, false),
            TokenKind::Kw(Keyword::Const) => self.declaration(true, false),
            TokenKind::Kw(Keyword::Private) => {
                if !self.frames.last().expect("frame").top_level {
                    return Err(self.err("'private' is only meaningful at file scope"));
                }
                let tok = self.next()?;
                match tok.kind {
                    TokenKind::Kw(Keyword::Let) => self.declaration(false, true),
                    TokenKind::Kw(Keyword::Const) => self.declaration(true, true),
                    TokenKind::Kw(Keyword::Function) => self.function_statement(true),
                    other => Err(self.err(format!(
                        "expected declaration after 'private', got {other}"
                    ))),
                }
            }
            TokenKind::Kw(Keyword::Function) => self.function_statement(false),
            TokenKind::Kw(Keyword::If) => self.if_statement(),
            TokenKind::Kw(Keyword::While) => self.while_statement(),
            TokenKind::Kw(Keyword::Do) => self.do_statement(),
            TokenKind::Kw(Keyword::For) => self.for_statement(),
            TokenKind::Kw(Keyword::Try) => self.try_statement(),
            TokenKind::Kw(Keyword::Return) => {
                if self.eat_op(Op::Semi)? {
                    let null = self.ro_const(Value::Null)?;
                    self.emit(Opcode::LoadConst, 0, null);
                } else {
                    self.expression()?;
                    self.expect_op(Op::Semi)?;
                }
                self.emit_op(Opcode::Return);
                Ok(())
            }
            TokenKind::Kw(Keyword::Break) => {
                self.expect_op(Op::Semi)?;
                let Some(ctx) = self.frame().loops.last() else {
                    return Err(self.err("'break' outside a loop"));
                };
                let label = ctx.break_label;
                self.emit_branch(Opcode::B, 0, label);
                Ok(())
            }
            TokenKind::Kw(Keyword::Continue) => {
                self.expect_op(Op::Semi)?;
                let Some(ctx) = self.frame().loops.last() else {
                    return Err(self.err("'continue' outside a loop"));
                };
                let label = ctx.continue_label;
                self.emit_branch(Opcode::B, 0, label);
                Ok(())
            }
            TokenKind::Op(Op::LBrace) => {
                self.lx.unget(tok);
                self.block()
            }
            TokenKind::Op(Op::Semi) => Ok(()),
            TokenKind::Eof => Err(self.err("unexpected end of input")),
            _ => {
                self.lx.unget(tok);
                self.expression()?;
                self.expect_op(Op::Semi)?;
                self.emit_op(Opcode::Pop);
                Ok(())
            }
        }
    }

    fn block(&mut self) -> Result<(), EvcError> {
        self.expect_op(Op::LBrace)?;
        loop {
            let tok = self.next()?;
            match tok.kind {
                TokenKind::Op(Op::RBrace) => return Ok(()),
                TokenKind::Eof => return Err(self.err("unterminated block")),
                _ => {
                    self.lx.unget(tok);
                    self.statement()?;
                }
            }
        }
    }

    /// `let`/`const` declaration; `private` hides the name from the
    /// module's import surface.
    fn declaration(&mut self, is_const: bool, private: bool) -> Result<(), EvcError> {
        let name = self.expect_ident()?;
        let has_init = self.eat_op(Op::Assign)?;
        if is_const && !has_init {
            return Err(self.err(format!("constant '{name}' needs an initializer")));
        }
        if self.frames.last().expect("frame").top_level {
            if has_init {
                self.expression()?;
            } else {
                let null = self.ro_const(Value::Null)?;
                self.emit(Opcode::LoadConst, 0, null);
            }
            let idx = self.ro_name(&name)?;
            let scope = if private {
                SymScope::GlobalPrivate
            } else {
                SymScope::Global
            };
            self.emit(Opcode::SymTab, scope as u8, idx);
            self.frame().globals.push((name, is_const));
        } else {
            let frame = self.frame();
            if frame.locals.iter().any(|(l, _)| l.as_ref() == name.as_ref())
                || frame.args.iter().any(|a| a.as_ref() == name.as_ref())
            {
                return Err(self.err(format!("'{name}' is already declared")));
            }
            frame.locals.push((name.clone(), is_const));
            let slot = frame.locals.len() - 1;
            if has_init {
                self.expression()?;
                self.emit(Opcode::Assign, PtrKind::Fp as u8, slot as i16);
            }
        }
        self.expect_op(Op::Semi)
    }

    fn function_statement(&mut self, private: bool) -> Result<(), EvcError> {
        let name = self.expect_ident()?;
        if self.frames.last().expect("frame").top_level {
            // Declare before the body parses so the function can call
            // itself through its global name.
            self.frame().globals.push((name.clone(), false));
            self.function_literal(false)?;
            let idx = self.ro_name(&name)?;
            let scope = if private {
                SymScope::GlobalPrivate
            } else {
                SymScope::Global
            };
            self.emit(Opcode::SymTab, scope as u8, idx);
        } else {
            let frame = self.frame();
            frame.locals.push((name.clone(), false));
            let slot = frame.locals.len() - 1;
            self.function_literal(false)?;
            self.emit(Opcode::Assign, PtrKind::Fp as u8, slot as i16);
        }
        Ok(())
    }

    /// Assemble a `function (params) { body }` or lambda literal and
    /// leave the function object on the stack. A lambda body is a
    /// single expression whose value is the return value.
    fn function_literal(&mut self, lambda: bool) -> Result<(), EvcError> {
        let first_line = self.lx.line();
        self.expect_op(Op::LParen)?;

        // Parameter list. Defaults evaluate in the enclosing frame at
        // definition time, so their code is emitted here, before the
        // inner frame opens.
        let mut params: Vec<Rc<str>> = Vec::new();
        let mut default_slots: Vec<usize> = Vec::new();
        let mut optind: i16 = -1;
        let mut kwind: i16 = -1;
        if !self.eat_op(Op::RParen)? {
            loop {
                if self.eat_op(Op::Pow)? {
                    // Trailing keyword-dict parameter.
                    let name = self.expect_ident()?;
                    kwind = params.len() as i16;
                    params.push(name);
                    self.expect_op(Op::RParen)?;
                    break;
                }
                let name = self.expect_ident()?;
                if self.eat_op(Op::Assign)? {
                    if optind < 0 {
                        optind = params.len() as i16;
                    }
                    default_slots.push(params.len());
                    self.expression()?;
                } else if optind >= 0 {
                    return Err(self.err(format!(
                        "required parameter '{name}' after an optional one"
                    )));
                }
                params.push(name);
                if self.eat_op(Op::RParen)? {
                    break;
                }
                self.expect_op(Op::Comma)?;
            }
        }

        // Body, in a fresh frame.
        let mut inner = FuncFrame::new(first_line, false);
        inner.args = params;
        inner.optind = optind;
        inner.kwind = kwind;
        self.frames.push(inner);
        if lambda {
            // Trailing-return: the lambda body is one expression.
            self.expression()?;
            self.emit_op(Opcode::Return);
        } else {
            self.block()?;
            let null = self.ro_const(Value::Null)?;
            self.emit(Opcode::LoadConst, 0, null);
            self.emit_op(Opcode::Return);
        }
        let inner = self.frames.pop().expect("inner frame");
        let captured: Vec<(Rc<str>, Binding)> = inner.closures.clone();
        let xptr = self.finish_frame(inner)?;

        // Function object, then defaults (reverse order; each pops the
        // value beneath the function), then capture cells.
        let idx = self.ro_const(Value::Code(Rc::new(xptr)))?;
        self.emit(Opcode::DefFunc, 0, idx);
        for slot in default_slots.iter().rev() {
            self.emit(Opcode::AddDefault, 0, *slot as i16);
        }
        for (_name, binding) in captured {
            match binding {
                Binding::Arg(i) => self.emit(Opcode::Load, PtrKind::Ap as u8, i as i16),
                Binding::Local(i) => self.emit(Opcode::Load, PtrKind::Fp as u8, i as i16),
                Binding::Closure(i) => self.emit(Opcode::Load, PtrKind::Cp as u8, i as i16),
            }
            self.emit_op(Opcode::AddClosure);
        }
        Ok(())
    }

    fn if_statement(&mut self) -> Result<(), EvcError> {
        self.expect_op(Op::LParen)?;
        self.expression()?;
        self.expect_op(Op::RParen)?;
        let else_label = self.new_label();
        self.emit_branch(Opcode::BIf, 0, else_label);
        self.statement()?;
        if self.eat_kw(Keyword::Else)? {
            let end_label = self.new_label();
            self.emit_branch(Opcode::B, 0, end_label);
            self.bind_label(else_label);
            self.statement()?;
            self.bind_label(end_label);
        } else {
            self.bind_label(else_label);
        }
        Ok(())
    }

    fn while_statement(&mut self) -> Result<(), EvcError> {
        let cond_label = self.new_label();
        let end_label = self.new_label();
        self.bind_label(cond_label);
        self.expect_op(Op::LParen)?;
        self.expression()?;
        self.expect_op(Op::RParen)?;
        self.emit_branch(Opcode::BIf, 0, end_label);
        self.frame().loops.push(LoopCtx {
            break_label: end_label,
            continue_label: cond_label,
        });
        self.statement()?;
        self.frame().loops.pop();
        self.emit_branch(Opcode::B, 0, cond_label);
        self.bind_label(end_label);
        Ok(())
    }

    fn do_statement(&mut self) -> Result<(), EvcError> {
        let body_label = self.new_label();
        let cond_label = self.new_label();
        let end_label = self.new_label();
        self.bind_label(body_label);
        self.frame().loops.push(LoopCtx {
            break_label: end_label,
            continue_label: cond_label,
        });
        self.statement()?;
        self.frame().loops.pop();
        self.bind_label(cond_label);
        if !self.eat_kw(Keyword::While)? {
            return Err(self.err("expected 'while' after 'do' body"));
        }
        self.expect_op(Op::LParen)?;
        self.expression()?;
        self.expect_op(Op::RParen)?;
        self.expect_op(Op::Semi)?;
        self.emit_branch(Opcode::BIf, 1, body_label);
        self.bind_label(end_label);
        Ok(())
    }

    fn for_statement(&mut self) -> Result<(), EvcError> {
        self.expect_op(Op::LParen)?;
        // init clause
        let tok = self.next()?;
        match tok.kind {
            TokenKind::Op(Op::Semi) => {}
            TokenKind::Kw(Keyword::Let) => self.declaration(false, false)?,
            _ => {
                self.lx.unget(tok);
                self.expression()?;
                self.emit_op(Opcode::Pop);
                self.expect_op(Op::Semi)?;
            }
        }
        let cond_label = self.new_label();
        let post_label = self.new_label();
        let end_label = self.new_label();
        self.bind_label(cond_label);
        if self.eat_op(Op::Semi)? {
            // No condition: loop until break.
        } else {
            self.expression()?;
            self.expect_op(Op::Semi)?;
            self.emit_branch(Opcode::BIf, 0, end_label);
        }
        // The post clause runs after the body, so its code is emitted
        // after the body's; remember where the body starts instead of
        // buffering instructions.
        let body_label = self.new_label();
        self.emit_branch(Opcode::B, 0, body_label);
        self.bind_label(post_label);
        if !self.eat_op(Op::RParen)? {
            self.expression()?;
            self.emit_op(Opcode::Pop);
            self.expect_op(Op::RParen)?;
        }
        self.emit_branch(Opcode::B, 0, cond_label);
        self.bind_label(body_label);
        self.frame().loops.push(LoopCtx {
            break_label: end_label,
            continue_label: post_label,
        });
        self.statement()?;
        self.frame().loops.pop();
        self.emit_branch(Opcode::B, 0, post_label);
        self.bind_label(end_label);
        Ok(())
    }

    fn try_statement(&mut self) -> Result<(), EvcError> {
        let catch_label = self.new_label();
        let finally_label = self.new_label();
        self.emit_branch(Opcode::PushHandler, 0, catch_label);
        self.block()?;
        self.emit_op(Opcode::PopHandler);
        self.emit_branch(Opcode::B, 0, finally_label);
        self.bind_label(catch_label);
        if !self.eat_kw(Keyword::Catch)? {
            return Err(self.err("expected 'catch' after 'try' block"));
        }
        self.expect_op(Op::LParen)?;
        let var = self.expect_ident()?;
        self.expect_op(Op::RParen)?;
        if self.frames.last().expect("frame").top_level {
            let idx = self.ro_name(&var)?;
            self.emit(Opcode::SymTab, SymScope::Global as u8, idx);
            self.frame().globals.push((var, false));
        } else {
            let frame = self.frame();
            let slot = match frame.locals.iter().position(|(l, _)| l.as_ref() == var.as_ref()) {
                Some(i) => i,
                None => {
                    frame.locals.push((var, false));
                    frame.locals.len() - 1
                }
            };
            self.emit(Opcode::Assign, PtrKind::Fp as u8, slot as i16);
        }
        self.block()?;
        self.bind_label(finally_label);
        if self.eat_kw(Keyword::Finally)? {
            self.block()?;
        }
        Ok(())
    }

    // ---- expressions ----

    fn expression(&mut self) -> Result<(), EvcError> {
        if self.depth >= RECURSION_MAX {
            return Err(EvcError::new(
                ErrorClass::Recursion,
                "expression nested too deeply",
            ));
        }
        self.depth += 1;
        let result = self.assign_expr();
        self.depth -= 1;
        result
    }

    /// Assignment expression. Plain expressions leave their value on
    /// the stack; assignments store and leave null.
    fn assign_expr(&mut self) -> Result<(), EvcError> {
        let target = self.or_expr()?;
        let tok = self.next()?;
        let compound = match tok.kind {
            TokenKind::Op(Op::Assign) => None,
            TokenKind::Op(Op::PlusEq) => Some(Opcode::Add),
            TokenKind::Op(Op::MinusEq) => Some(Opcode::Sub),
            TokenKind::Op(Op::MulEq) => Some(Opcode::Mul),
            TokenKind::Op(Op::DivEq) => Some(Opcode::Div),
            TokenKind::Op(Op::ModEq) => Some(Opcode::Mod),
            TokenKind::Op(Op::XorEq) => Some(Opcode::BinXor),
            TokenKind::Op(Op::AndEq) => Some(Opcode::BinAnd),
            TokenKind::Op(Op::OrEq) => Some(Opcode::BinOr),
            TokenKind::Op(Op::ShlEq) => Some(Opcode::Shl),
            TokenKind::Op(Op::ShrEq) => Some(Opcode::Shr),
            TokenKind::Op(Op::Incr) | TokenKind::Op(Op::Decr) => {
                let op = if tok.kind == TokenKind::Op(Op::Incr) {
                    Opcode::Add
                } else {
                    Opcode::Sub
                };
                let one = self.ro_const(Value::Int(1))?;
                return self.store_compound(target, |asm| {
                    asm.emit(Opcode::LoadConst, 0, one);
                    asm.emit_op(op);
                    Ok(())
                });
            }
            _ => {
                self.lx.unget(tok);
                self.materialize(target)?;
                return Ok(());
            }
        };
        match compound {
            None => self.store_plain(target),
            Some(op) => self.store_compound(target, |asm| {
                asm.expression()?;
                asm.emit_op(op);
                Ok(())
            }),
        }
    }

    fn store_plain(&mut self, target: Deferred) -> Result<(), EvcError> {
        match target {
            Deferred::Name(name) => {
                self.expression()?;
                self.emit_store_name(&name)?;
            }
            Deferred::Attr(idx) => {
                self.expression()?;
                self.emit(Opcode::SetAttr, AttrKind::Const as u8, idx);
            }
            Deferred::Index => {
                self.expression()?;
                self.emit(Opcode::SetAttr, AttrKind::Stack as u8, 0);
            }
            Deferred::Slice => {
                self.expression()?;
                self.emit_op(Opcode::SetSlice);
            }
            Deferred::Value => return Err(self.err("expression is not assignable")),
        }
        let null = self.ro_const(Value::Null)?;
        self.emit(Opcode::LoadConst, 0, null);
        Ok(())
    }

    /// Read-modify-write store; `rhs` emits the modification against
    /// the loaded current value.
    fn store_compound(
        &mut self,
        target: Deferred,
        rhs: impl FnOnce(&mut Self) -> Result<(), EvcError>,
    ) -> Result<(), EvcError> {
        match target {
            Deferred::Name(name) => {
                self.emit_load_name(&name)?;
                rhs(self)?;
                self.emit_store_name(&name)?;
            }
            Deferred::Attr(idx) => {
                self.emit_op(Opcode::Dup);
                self.emit(Opcode::GetAttr, AttrKind::Const as u8, idx);
                rhs(self)?;
                self.emit(Opcode::SetAttr, AttrKind::Const as u8, idx);
            }
            Deferred::Index => {
                self.emit_op(Opcode::Dup2);
                self.emit(Opcode::GetAttr, AttrKind::Stack as u8, 0);
                rhs(self)?;
                self.emit(Opcode::SetAttr, AttrKind::Stack as u8, 0);
            }
            Deferred::Slice => return Err(self.err("slices do not support compound assignment")),
            Deferred::Value => return Err(self.err("expression is not assignable")),
        }
        let null = self.ro_const(Value::Null)?;
        self.emit(Opcode::LoadConst, 0, null);
        Ok(())
    }

    fn materialize(&mut self, target: Deferred) -> Result<(), EvcError> {
        match target {
            Deferred::Value => Ok(()),
            Deferred::Name(name) => self.emit_load_name(&name),
            Deferred::Attr(idx) => {
                self.emit(Opcode::GetAttr, AttrKind::Const as u8, idx);
                Ok(())
            }
            Deferred::Index => {
                self.emit(Opcode::GetAttr, AttrKind::Stack as u8, 0);
                Ok(())
            }
            Deferred::Slice => {
                self.emit_op(Opcode::GetSlice);
                Ok(())
            }
        }
    }

    /// `||` with short-circuit; result is 1 or 0.
    fn or_expr(&mut self) -> Result<Deferred, EvcError> {
        let mut lhs = self.and_expr()?;
        loop {
            if !self.eat_op(Op::OrOr)? {
                return Ok(lhs);
            }
            self.materialize(lhs)?;
            let true_label = self.new_label();
            let end_label = self.new_label();
            self.emit_branch(Opcode::BIf, 1, true_label);
            let rhs = self.and_expr()?;
            self.materialize(rhs)?;
            self.emit_branch(Opcode::BIf, 1, true_label);
            let zero = self.ro_const(Value::Int(0))?;
            self.emit(Opcode::LoadConst, 0, zero);
            self.emit_branch(Opcode::B, 0, end_label);
            self.bind_label(true_label);
            let one = self.ro_const(Value::Int(1))?;
            self.emit(Opcode::LoadConst, 0, one);
            self.bind_label(end_label);
            lhs = Deferred::Value;
        }
    }

    /// `&&` with short-circuit; result is 1 or 0.
    fn and_expr(&mut self) -> Result<Deferred, EvcError> {
        let mut lhs = self.bitor_expr()?;
        loop {
            if !self.eat_op(Op::AndAnd)? {
                return Ok(lhs);
            }
            self.materialize(lhs)?;
            let false_label = self.new_label();
            let end_label = self.new_label();
            self.emit_branch(Opcode::BIf, 0, false_label);
            let rhs = self.bitor_expr()?;
            self.materialize(rhs)?;
            self.emit_branch(Opcode::BIf, 0, false_label);
            let one = self.ro_const(Value::Int(1))?;
            self.emit(Opcode::LoadConst, 0, one);
            self.emit_branch(Opcode::B, 0, end_label);
            self.bind_label(false_label);
            let zero = self.ro_const(Value::Int(0))?;
            self.emit(Opcode::LoadConst, 0, zero);
            self.bind_label(end_label);
            lhs = Deferred::Value;
        }
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> Result<Deferred, EvcError>,
        table: &[(Op, Opcode)],
    ) -> Result<Deferred, EvcError> {
        let mut lhs = next(self)?;
        loop {
            let tok = self.next()?;
            let Some(&(_, opcode)) = (match &tok.kind {
                TokenKind::Op(op) => table.iter().find(|(o, _)| o == op),
                _ => None,
            }) else {
                self.lx.unget(tok);
                return Ok(lhs);
            };
            self.materialize(lhs)?;
            let rhs = next(self)?;
            self.materialize(rhs)?;
            self.emit_op(opcode);
            lhs = Deferred::Value;
        }
    }

    fn bitor_expr(&mut self) -> Result<Deferred, EvcError> {
        self.binary_level(Self::bitxor_expr, &[(Op::Or, Opcode::BinOr)])
    }

    fn bitxor_expr(&mut self) -> Result<Deferred, EvcError> {
        self.binary_level(Self::bitand_expr, &[(Op::Xor, Opcode::BinXor)])
    }

    fn bitand_expr(&mut self) -> Result<Deferred, EvcError> {
        self.binary_level(Self::equality_expr, &[(Op::And, Opcode::BinAnd)])
    }

    fn equality_expr(&mut self) -> Result<Deferred, EvcError> {
        let mut lhs = self.relational_expr()?;
        loop {
            let tok = self.next()?;
            let kind = match tok.kind {
                TokenKind::Op(Op::EqEq) => CmpKind::Eq,
                TokenKind::Op(Op::Ne) => CmpKind::Neq,
                _ => {
                    self.lx.unget(tok);
                    return Ok(lhs);
                }
            };
            self.materialize(lhs)?;
            let rhs = self.relational_expr()?;
            self.materialize(rhs)?;
            self.emit(Opcode::Cmp, kind as u8, 0);
            lhs = Deferred::Value;
        }
    }

    fn relational_expr(&mut self) -> Result<Deferred, EvcError> {
        let mut lhs = self.shift_expr()?;
        loop {
            let tok = self.next()?;
            let kind = match tok.kind {
                TokenKind::Op(Op::Lt) => CmpKind::Lt,
                TokenKind::Op(Op::Le) => CmpKind::Leq,
                TokenKind::Op(Op::Gt) => CmpKind::Gt,
                TokenKind::Op(Op::Ge) => CmpKind::Geq,
                _ => {
                    self.lx.unget(tok);
                    return Ok(lhs);
                }
            };
            self.materialize(lhs)?;
            let rhs = self.shift_expr()?;
            self.materialize(rhs)?;
            self.emit(Opcode::Cmp, kind as u8, 0);
            lhs = Deferred::Value;
        }
    }

    fn shift_expr(&mut self) -> Result<Deferred, EvcError> {
        self.binary_level(
            Self::additive_expr,
            &[(Op::Shl, Opcode::Shl), (Op::Shr, Opcode::Shr)],
        )
    }

    fn additive_expr(&mut self) -> Result<Deferred, EvcError> {
        self.binary_level(
            Self::multiplicative_expr,
            &[(Op::Plus, Opcode::Add), (Op::Minus, Opcode::Sub)],
        )
    }

    fn multiplicative_expr(&mut self) -> Result<Deferred, EvcError> {
        self.binary_level(
            Self::power_expr,
            &[
                (Op::Mul, Opcode::Mul),
                (Op::Div, Opcode::Div),
                (Op::Mod, Opcode::Mod),
            ],
        )
    }

    /// `**` binds right to left.
    fn power_expr(&mut self) -> Result<Deferred, EvcError> {
        let lhs = self.unary_expr()?;
        if !self.eat_op(Op::Pow)? {
            return Ok(lhs);
        }
        self.materialize(lhs)?;
        let rhs = self.power_expr()?;
        self.materialize(rhs)?;
        self.emit_op(Opcode::Pow);
        Ok(Deferred::Value)
    }

    fn unary_expr(&mut self) -> Result<Deferred, EvcError> {
        let tok = self.next()?;
        match tok.kind {
            TokenKind::Op(Op::Minus) => {
                let v = self.unary_expr()?;
                self.materialize(v)?;
                self.emit_op(Opcode::Negate);
                Ok(Deferred::Value)
            }
            TokenKind::Op(Op::Plus) => self.unary_expr(),
            TokenKind::Op(Op::Tilde) => {
                let v = self.unary_expr()?;
                self.materialize(v)?;
                self.emit_op(Opcode::BitNot);
                Ok(Deferred::Value)
            }
            TokenKind::Op(Op::Not) => {
                let v = self.unary_expr()?;
                self.materialize(v)?;
                self.emit_op(Opcode::LogNot);
                Ok(Deferred::Value)
            }
            TokenKind::Op(Op::Incr) | TokenKind::Op(Op::Decr) => {
                let op = if tok.kind == TokenKind::Op(Op::Incr) {
                    Opcode::Add
                } else {
                    Opcode::Sub
                };
                let target = self.unary_expr()?;
                let one = self.ro_const(Value::Int(1))?;
                self.store_compound(target, |asm| {
                    asm.emit(Opcode::LoadConst, 0, one);
                    asm.emit_op(op);
                    Ok(())
                })?;
                Ok(Deferred::Value)
            }
            _ => {
                self.lx.unget(tok);
                self.postfix_expr()
            }
        }
    }

    fn postfix_expr(&mut self) -> Result<Deferred, EvcError> {
        let mut head = self.primary_expr()?;
        loop {
            let tok = self.next()?;
            match tok.kind {
                TokenKind::Op(Op::Dot) => {
                    self.materialize(head)?;
                    let name = self.expect_ident()?;
                    let idx = self.ro_name(&name)?;
                    head = Deferred::Attr(idx);
                }
                TokenKind::Op(Op::LBracket) => {
                    self.materialize(head)?;
                    head = self.index_or_slice()?;
                }
                TokenKind::Op(Op::LParen) => {
                    head = self.call(head)?;
                }
                _ => {
                    self.lx.unget(tok);
                    return Ok(head);
                }
            }
        }
    }

    /// After `[`: a plain index leaves `(object, key)` on the stack, a
    /// slice pushes start/stop/step with null for omitted bounds.
    fn index_or_slice(&mut self) -> Result<Deferred, EvcError> {
        let null = self.ro_const(Value::Null)?;
        if self.eat_op(Op::Colon)? {
            self.emit(Opcode::LoadConst, 0, null);
        } else {
            self.expression()?;
            if self.eat_op(Op::RBracket)? {
                return Ok(Deferred::Index);
            }
            self.expect_op(Op::Colon)?;
        }
        // stop
        if self.eat_op(Op::RBracket)? {
            self.emit(Opcode::LoadConst, 0, null);
            self.emit(Opcode::LoadConst, 0, null);
            return Ok(Deferred::Slice);
        }
        if self.eat_op(Op::Colon)? {
            self.emit(Opcode::LoadConst, 0, null);
        } else {
            self.expression()?;
            if self.eat_op(Op::RBracket)? {
                self.emit(Opcode::LoadConst, 0, null);
                return Ok(Deferred::Slice);
            }
            self.expect_op(Op::Colon)?;
        }
        // step
        if self.eat_op(Op::RBracket)? {
            self.emit(Opcode::LoadConst, 0, null);
        } else {
            self.expression()?;
            self.expect_op(Op::RBracket)?;
        }
        Ok(Deferred::Slice)
    }

    /// After `(`: marshal the argument list and emit the call.
    fn call(&mut self, callee: Deferred) -> Result<Deferred, EvcError> {
        let mut flags = 0u8;
        match callee {
            Deferred::Attr(idx) => {
                // Keep the receiver below the callable for `this`.
                self.emit_op(Opcode::Dup);
                self.emit(Opcode::GetAttr, AttrKind::Const as u8, idx);
                flags |= call_flags::WITH_PARENT;
            }
            other => self.materialize(other)?,
        }
        let mut argc: i16 = 0;
        let mut kwargs: u16 = 0;
        if !self.eat_op(Op::RParen)? {
            loop {
                let tok = self.next()?;
                // `name = expr` in argument position is a keyword
                // argument; anything else is positional.
                let mut is_kw = false;
                if let TokenKind::Ident(name) = &tok.kind {
                    let after = self.next()?;
                    if after.kind == TokenKind::Op(Op::Assign) {
                        let idx = self.ro_name(name)?;
                        self.emit(Opcode::LoadConst, 0, idx);
                        self.expression()?;
                        kwargs += 1;
                        is_kw = true;
                    } else {
                        self.lx.unget(after);
                    }
                }
                if !is_kw {
                    if kwargs > 0 {
                        return Err(self.err("positional argument after keyword argument"));
                    }
                    if tok.kind == TokenKind::Op(Op::Mul) {
                        self.expression()?;
                        self.emit_op(Opcode::Star);
                    } else {
                        self.push_back(tok);
                        self.expression()?;
                    }
                    argc += 1;
                }
                if self.eat_op(Op::RParen)? {
                    break;
                }
                self.expect_op(Op::Comma)?;
            }
        }
        if kwargs > 0 {
            self.emit(Opcode::BuildDict, 0, kwargs as i16);
            flags |= call_flags::HAS_KW;
        }
        self.emit(Opcode::CallFunc, flags, argc);
        Ok(Deferred::Value)
    }

    fn primary_expr(&mut self) -> Result<Deferred, EvcError> {
        let tok = self.next()?;
        match tok.kind {
            TokenKind::Int(i) => {
                let idx = self.ro_const(Value::Int(i))?;
                self.emit(Opcode::LoadConst, 0, idx);
                Ok(Deferred::Value)
            }
            TokenKind::Float(f) => {
                let idx = self.ro_const(Value::Float(f))?;
                self.emit(Opcode::LoadConst, 0, idx);
                Ok(Deferred::Value)
            }
            TokenKind::Str(s) => {
                let idx = self.ro_const(Value::Str(s))?;
                self.emit(Opcode::LoadConst, 0, idx);
                Ok(Deferred::Value)
            }
            TokenKind::Bytes(b) => {
                let idx = self.ro_const(Value::Bytes(b))?;
                self.emit(Opcode::LoadConst, 0, idx);
                Ok(Deferred::Value)
            }
            TokenKind::Kw(Keyword::True) => {
                let idx = self.ro_const(Value::Int(1))?;
                self.emit(Opcode::LoadConst, 0, idx);
                Ok(Deferred::Value)
            }
            TokenKind::Kw(Keyword::False) => {
                let idx = self.ro_const(Value::Int(0))?;
                self.emit(Opcode::LoadConst, 0, idx);
                Ok(Deferred::Value)
            }
            TokenKind::Kw(Keyword::Null) => {
                let idx = self.ro_const(Value::Null)?;
                self.emit(Opcode::LoadConst, 0, idx);
                Ok(Deferred::Value)
            }
            TokenKind::Kw(Keyword::This) => {
                self.emit(Opcode::Load, PtrKind::This as u8, 0);
                Ok(Deferred::Value)
            }
            TokenKind::Kw(Keyword::Import) => Ok(Deferred::Name(Rc::from("import"))),
            TokenKind::Ident(name) => Ok(Deferred::Name(name)),
            TokenKind::Kw(Keyword::Function) => {
                self.function_literal(false)?;
                Ok(Deferred::Value)
            }
            TokenKind::Lambda => {
                // Tolerate the doubled backquote spelling.
                let tok = self.next()?;
                if tok.kind != TokenKind::Lambda {
                    self.lx.unget(tok);
                }
                self.function_literal(true)?;
                Ok(Deferred::Value)
            }
            TokenKind::Op(Op::LParen) => {
                self.expression()?;
                if self.eat_op(Op::Comma)? {
                    // Tuple literal; `(x,)` is the 1-tuple.
                    let mut n: i16 = 1;
                    if !self.eat_op(Op::RParen)? {
                        loop {
                            self.expression()?;
                            n += 1;
                            if self.eat_op(Op::RParen)? {
                                break;
                            }
                            self.expect_op(Op::Comma)?;
                            if self.eat_op(Op::RParen)? {
                                break;
                            }
                        }
                    }
                    self.emit(Opcode::BuildTuple, 0, n);
                } else {
                    self.expect_op(Op::RParen)?;
                }
                Ok(Deferred::Value)
            }
            TokenKind::Op(Op::LBracket) => {
                let mut n: i16 = 0;
                if !self.eat_op(Op::RBracket)? {
                    loop {
                        self.expression()?;
                        n += 1;
                        if self.eat_op(Op::RBracket)? {
                            break;
                        }
                        self.expect_op(Op::Comma)?;
                        if self.eat_op(Op::RBracket)? {
                            break;
                        }
                    }
                }
                self.emit(Opcode::BuildList, 0, n);
                Ok(Deferred::Value)
            }
            TokenKind::Op(Op::LBrace) => {
                let mut n: i16 = 0;
                if !self.eat_op(Op::RBrace)? {
                    loop {
                        let tok = self.next()?;
                        match tok.kind {
                            TokenKind::Str(s) => {
                                let idx = self.ro_const(Value::Str(s))?;
                                self.emit(Opcode::LoadConst, 0, idx);
                            }
                            TokenKind::Ident(name) => {
                                let idx = self.ro_name(&name)?;
                                self.emit(Opcode::LoadConst, 0, idx);
                            }
                            other => {
                                return Err(self.err(format!(
                                    "dictionary key must be a string, got {other}"
                                )));
                            }
                        }
                        self.expect_op(Op::Colon)?;
                        self.expression()?;
                        n += 1;
                        if self.eat_op(Op::RBrace)? {
                            break;
                        }
                        self.expect_op(Op::Comma)?;
                        if self.eat_op(Op::RBrace)? {
                            break;
                        }
                    }
                }
                self.emit(Opcode::BuildDict, 0, n);
                Ok(Deferred::Value)
            }
            other => Err(self.err(format!("unexpected {other}"))),
        }
    }

    // ---- frame finishing ----

    fn finish_frame(&self, frame: FuncFrame) -> Result<Xptr, EvcError> {
        let mut instr = frame.instr;
        let mut labels = Vec::with_capacity(frame.labels.len());
        for (i, l) in frame.labels.iter().enumerate() {
            match l {
                Some(at) => labels.push(*at),
                None => {
                    return Err(EvcError::syntax(format!("unresolved label {i}"))
                        .with_location(self.file.as_ref(), frame.first_line));
                }
            }
        }
        for (at, label) in frame.fixups {
            let target = labels[label] as i64;
            let ins = &mut instr[at];
            match ins.code {
                Opcode::PushHandler => {
                    ins.arg2 = label as i16;
                }
                _ => {
                    let offset = target - (at as i64 + 1);
                    if offset > i16::MAX as i64 || offset < i16::MIN as i64 {
                        return Err(EvcError::syntax("branch offset out of range")
                            .with_location(self.file.as_ref(), frame.first_line));
                    }
                    ins.arg2 = offset as i16;
                }
            }
        }
        Ok(Xptr {
            instr,
            rodata: frame.rodata,
            labels,
            file_name: self.file.clone(),
            file_line: frame.first_line,
            uuid: Uuid::new_v4().to_string(),
            arg_names: frame.args.iter().map(|a| a.to_string()).collect(),
            optind: frame.optind,
            kwind: frame.kwind,
            n_locals: frame.locals.len() as u16,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asm(src: &str) -> Rc<Xptr> {
        let s = Str::from_str(src);
        assemble(&s, Rc::from("<test>")).expect("assemble")
    }

    fn asm_err(src: &str) -> EvcError {
        let s = Str::from_str(src);
        assemble(&s, Rc::from("<test>")).expect_err("should fail")
    }

    fn ops(x: &Xptr) -> Vec<Opcode> {
        x.instr.iter().map(|i| i.code).collect()
    }

    #[test]
    fn test_expression_statement() {
        let x = asm("1 + 2 * 3;");
        assert_eq!(
            ops(&x),
            vec![
                Opcode::LoadConst,
                Opcode::LoadConst,
                Opcode::LoadConst,
                Opcode::Mul,
                Opcode::Add,
                Opcode::Pop,
                Opcode::LoadConst,
                Opcode::Return,
            ]
        );
    }

    #[test]
    fn test_rodata_interning() {
        let x = asm("1 + 1 + 1;");
        let ints = x
            .instr
            .iter()
            .filter(|i| i.code == Opcode::LoadConst)
            .map(|i| i.arg2)
            .collect::<Vec<_>>();
        // All three literals share one rodata slot.
        assert_eq!(ints[0], ints[1]);
        assert_eq!(ints[1], ints[2]);
    }

    #[test]
    fn test_global_declaration() {
        let x = asm("let x = 41;");
        assert!(ops(&x).contains(&Opcode::SymTab));
    }

    #[test]
    fn test_function_nesting_and_rodata() {
        let x = asm("function f(a, b) { return a + b; }");
        let nested: Vec<_> = x
            .rodata
            .iter()
            .filter_map(|v| match v {
                Value::Code(x) => Some(x.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(nested.len(), 1);
        let f = &nested[0];
        assert_eq!(f.arg_names, vec!["a", "b"]);
        assert_eq!(f.optind, -1);
        assert_eq!(f.kwind, -1);
        // Body loads both arguments through the argument pointer.
        assert!(
            f.instr
                .iter()
                .any(|i| i.code == Opcode::Load && i.arg1 == PtrKind::Ap as u8)
        );
    }

    #[test]
    fn test_closure_capture() {
        let x = asm("function mk(n) { return `(x) n + x; }");
        let Some(Value::Code(mk)) = x
            .rodata
            .iter()
            .find(|v| matches!(v, Value::Code(_)))
        else {
            panic!("mk missing");
        };
        let Some(Value::Code(lambda)) = mk
            .rodata
            .iter()
            .find(|v| matches!(v, Value::Code(_)))
        else {
            panic!("lambda missing");
        };
        // The lambda reads its capture cell.
        assert!(
            lambda
                .instr
                .iter()
                .any(|i| i.code == Opcode::Load && i.arg1 == PtrKind::Cp as u8)
        );
        // mk loads n and attaches it right after DefFunc.
        let mk_ops = ops(mk);
        let def = mk_ops.iter().position(|o| *o == Opcode::DefFunc).unwrap();
        assert_eq!(mk_ops[def + 1], Opcode::Load);
        assert_eq!(mk_ops[def + 2], Opcode::AddClosure);
    }

    #[test]
    fn test_default_arguments() {
        let x = asm("function f(a, b=10) { return a; }");
        let Some(Value::Code(f)) = x.rodata.iter().find(|v| matches!(v, Value::Code(_)))
        else {
            panic!("f missing");
        };
        assert_eq!(f.optind, 1);
        assert!(ops(&x).contains(&Opcode::AddDefault));
    }

    #[test]
    fn test_kw_dict_parameter() {
        let x = asm("function f(a, **kw) { return a; }");
        let Some(Value::Code(f)) = x.rodata.iter().find(|v| matches!(v, Value::Code(_)))
        else {
            panic!("f missing");
        };
        assert_eq!(f.kwind, 1);
        assert_eq!(f.max_args(), 1);
    }

    #[test]
    fn test_method_call_keeps_parent() {
        let x = asm("let d = {'a': 1}; d.foreach(`(v, k) v);");
        let call = x
            .instr
            .iter()
            .find(|i| i.code == Opcode::CallFunc)
            .expect("call");
        assert_eq!(call.arg1 & call_flags::WITH_PARENT, call_flags::WITH_PARENT);
        assert_eq!(call.arg2, 1);
    }

    #[test]
    fn test_branch_offsets_resolve() {
        let x = asm("let i = 0; while (i < 3) { i = i + 1; }");
        for (at, ins) in x.instr.iter().enumerate() {
            if matches!(ins.code, Opcode::B | Opcode::BIf) {
                let target = at as i64 + 1 + ins.arg2 as i64;
                assert!(target >= 0 && target <= x.instr.len() as i64);
            }
        }
    }

    #[test]
    fn test_try_catch_handler_uses_label() {
        let x = asm("try { 1; } catch (e) { 2; }");
        let push = x
            .instr
            .iter()
            .find(|i| i.code == Opcode::PushHandler)
            .expect("handler");
        let target = x.labels[push.arg2 as usize];
        assert!(target < x.instr.len());
        assert!(ops(&x).contains(&Opcode::PopHandler));
    }

    #[test]
    fn test_slice_emits_getslice() {
        let x = asm("[10,20,30,40][1:3];");
        assert!(ops(&x).contains(&Opcode::GetSlice));
    }

    #[test]
    fn test_star_argument() {
        let x = asm("print(*[1,2]);");
        assert!(ops(&x).contains(&Opcode::Star));
    }

    #[test]
    fn test_const_reassignment_rejected() {
        let err = asm_err("const x = 1; x = 2;");
        assert_eq!(err.class, ErrorClass::Syntax);
    }

    #[test]
    fn test_required_after_optional_rejected() {
        let err = asm_err("function f(a=1, b) { return b; }");
        assert_eq!(err.class, ErrorClass::Syntax);
    }

    #[test]
    fn test_missing_semicolon() {
        let err = asm_err("let x = 1");
        assert_eq!(err.class, ErrorClass::Syntax);
    }
}
