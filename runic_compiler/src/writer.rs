//! The single-pass statement compiler.
//!
//! `ParserWriter` walks the token stream once, resolving each statement
//! against the parser's frozen symbol table and the operation catalog, and
//! emits bytecode as it goes. Block structure (`if`/`else`/`loop`) is a
//! stack of open blocks whose jump targets are patched when the block
//! closes. Locals are bump-allocated per block and reclaimed on exit, on
//! every exit path.
//!
//! Compilation never mutates the parser: all scratch state lives here, so a
//! failed parse leaves the parser exactly as it was.

use crate::bytecode::{BytecodeBuilder, Container, Label};
use crate::catalog::ProcDesc;
use crate::parser::ScriptParserBase;
use crate::symbol::{RefData, RefPayload};
use crate::token::{Lexer, Token, TokenKind};
use runic_core::argkind::{ArgFlags, ArgKind, BaseType};
use runic_core::error::{CompileError, CompileErrorKind, CompileResult};
use runic_core::global::ScriptGlobal;
use runic_core::span::Span;
use runic_core::value::ScriptValue;
use runic_core::{MAX_REG_BYTES, REG_SLOT};
use rustc_hash::FxHashMap;
use std::sync::Arc;

const RESERVED: [&str; 9] = [
    "var", "const", "if", "else", "end", "loop", "break", "continue", "return",
];

enum Block {
    If {
        else_label: Label,
        end_label: Label,
        has_else: bool,
    },
    Loop {
        top: Label,
        break_label: Label,
    },
}

struct Scope {
    names: FxHashMap<Arc<str>, RefData>,
    saved_reg_top: u16,
}

/// Compiles one script against a frozen parser declaration.
pub struct ParserWriter<'a> {
    parser: &'a ScriptParserBase,
    global: &'a ScriptGlobal,
    parent: Arc<str>,
    code: BytecodeBuilder,
    scopes: Vec<Scope>,
    blocks: Vec<Block>,
    reg_top: u16,
    temp_count: u32,
}

impl<'a> ParserWriter<'a> {
    /// Compile `src` into a container. On any error the partial bytecode is
    /// discarded and the parser is untouched.
    pub fn compile(
        parser: &'a ScriptParserBase,
        global: &'a ScriptGlobal,
        parent: &str,
        src: &str,
    ) -> CompileResult<Container> {
        let mut writer = Self {
            parser,
            global,
            parent: parser.intern(parent),
            code: BytecodeBuilder::new(),
            scopes: Vec::new(),
            blocks: Vec::new(),
            reg_top: parser.reg_top(),
            temp_count: 0,
        };
        writer.push_scope();
        let mut lexer = Lexer::new(src);
        writer.run(&mut lexer)?;
        if !writer.blocks.is_empty() {
            return Err(writer
                .locate(
                    writer.perr(CompileErrorKind::Syntax, "missing 'end'"),
                    &lexer,
                    Span::empty(src.len() as u32),
                    "",
                ));
        }
        writer
            .emit_op("exit", &[])
            .map_err(|e| writer.locate(e, &lexer, Span::empty(src.len() as u32), ""))?;
        writer
            .code
            .finish(parser.id())
            .map_err(|e| e.with_parent(writer.parent.clone()))
    }

    // =========================================================================
    // Hook-facing surface
    // =========================================================================

    /// The parser this script compiles against.
    #[must_use]
    pub fn parser(&self) -> &'a ScriptParserBase {
        self.parser
    }

    /// The shared registry.
    #[must_use]
    pub fn global(&self) -> &'a ScriptGlobal {
        self.global
    }

    /// Direct access to the bytecode builder, for hooks emitting custom
    /// immediates.
    pub fn builder(&mut self) -> &mut BytecodeBuilder {
        &mut self.code
    }

    /// Resolve an operation call and emit it: overload resolution, handle,
    /// positional immediates, extra immediates.
    pub fn emit_op(&mut self, op_name: &str, args: &[RefData]) -> CompileResult<()> {
        let Some(proc) = self.lookup_proc(op_name, args) else {
            return Err(self
                .perr(
                    CompileErrorKind::UnknownIdentifier,
                    format!("unknown operation '{op_name}'"),
                )
                .with_token(op_name));
        };
        if let Some(hook) = proc.hook {
            return hook(proc, self, args);
        }
        self.emit_resolved(proc, args)
    }

    /// Allocate an anonymous scratch register in the current block scope.
    pub fn alloc_temp(&mut self, base: BaseType) -> CompileResult<RefData> {
        self.temp_count += 1;
        let name = format!("<temp{}>", self.temp_count);
        self.alloc_reg(&name, base, false)
    }

    /// Compile another script body inline at the current position.
    ///
    /// The body sees the surrounding scopes; its own locals live in a fresh
    /// block scope. Block statements inside must balance.
    pub fn inline_block(&mut self, src: &str) -> CompileResult<()> {
        let depth = self.blocks.len();
        self.push_scope();
        let mut lexer = Lexer::new(src);
        self.run(&mut lexer)?;
        self.pop_scope();
        if self.blocks.len() != depth {
            return Err(self.perr(
                CompileErrorKind::Syntax,
                "unbalanced block in inlined script",
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Statement loop
    // =========================================================================

    fn run(&mut self, lexer: &mut Lexer<'_>) -> CompileResult<()> {
        loop {
            let tok = self.next(lexer)?;
            match tok.kind {
                TokenKind::Eof => return Ok(()),
                TokenKind::Semi => {}
                TokenKind::Ident => self.statement(lexer, tok)?,
                _ => {
                    return Err(self.locate(
                        self.perr(
                            CompileErrorKind::Syntax,
                            "statement must begin with a name",
                        ),
                        lexer,
                        tok.span,
                        lexer.text(&tok),
                    ));
                }
            }
        }
    }

    fn statement(&mut self, lexer: &mut Lexer<'_>, tok: Token) -> CompileResult<()> {
        match lexer.text(&tok) {
            "var" => self.var_decl(lexer, tok),
            "const" => self.const_decl(lexer, tok),
            "if" => self.if_stmt(lexer),
            "else" => self.else_stmt(lexer, tok),
            "end" => self.end_stmt(lexer, tok),
            "loop" => self.loop_stmt(lexer),
            "break" | "continue" => self.loop_jump(lexer, tok),
            "return" => self.return_stmt(lexer, tok),
            _ => self.op_stmt(lexer, tok),
        }
    }

    fn op_stmt(&mut self, lexer: &mut Lexer<'_>, first: Token) -> CompileResult<()> {
        let text = lexer.text(&first);
        if let Some(r) = self.resolve_name(text) {
            let op_tok = self.expect_ident(lexer, "operation name")?;
            let op_text = lexer.text(&op_tok);
            let mut args = vec![r];
            args.extend(self.parse_args(lexer)?);
            return self
                .emit_op(op_text, &args)
                .map_err(|e| self.locate(e, lexer, op_tok.span, op_text));
        }
        // A dotted first token resolves its prefix and offers the suffix to
        // the operation lookup: `armor.side get out;` calls `side.get` on
        // the base type of `armor`.
        if let Some((prefix, suffix)) = text.split_once('.') {
            if let Some(r) = self.resolve_name(prefix) {
                let op_tok = self.expect_ident(lexer, "operation name")?;
                let op_text = format!("{suffix}.{}", lexer.text(&op_tok));
                let mut args = vec![r];
                args.extend(self.parse_args(lexer)?);
                return self
                    .emit_op(&op_text, &args)
                    .map_err(|e| self.locate(e, lexer, op_tok.span, &op_text));
            }
        }
        if self.parser.catalog().get(text).is_some() {
            let args = self.parse_args(lexer)?;
            return self
                .emit_op(text, &args)
                .map_err(|e| self.locate(e, lexer, first.span, text));
        }
        Err(self.locate(
            self.perr(
                CompileErrorKind::UnknownIdentifier,
                format!("name '{text}' not found"),
            ),
            lexer,
            first.span,
            text,
        ))
    }

    fn var_decl(&mut self, lexer: &mut Lexer<'_>, kw: Token) -> CompileResult<()> {
        let ty_tok = self.expect_ident(lexer, "type name")?;
        let base = self.lookup_type(lexer, &ty_tok)?;
        let name_tok = self.expect_ident(lexer, "register name")?;
        self.check_declarable(lexer, &name_tok, CompileErrorKind::DuplicateLocal)?;
        let name = lexer.text(&name_tok).to_string();

        let tok = self.next(lexer)?;
        let init = match tok.kind {
            TokenKind::Semi => None,
            TokenKind::Eq => {
                let arg = self.parse_one_arg(lexer)?;
                self.expect_semi(lexer)?;
                if arg.kind.base != base {
                    return Err(self.locate(
                        self.perr(
                            CompileErrorKind::TypeMismatch,
                            "initializer type does not match declaration",
                        ),
                        lexer,
                        name_tok.span,
                        &name,
                    ));
                }
                Some(arg)
            }
            _ => {
                return Err(self.locate(
                    self.perr(CompileErrorKind::Syntax, "expected '=' or ';'"),
                    lexer,
                    tok.span,
                    lexer.text(&tok),
                ));
            }
        };

        let reg = self
            .alloc_reg(&name, base, true)
            .map_err(|e| self.locate(e, lexer, name_tok.span, &name))?;
        match init {
            Some(arg) => self
                .emit_op("set", &[reg, arg])
                .map_err(|e| self.locate(e, lexer, kw.span, &name))?,
            // Freshly declared int registers always read as zero, even when
            // their slot was reclaimed from an earlier block.
            None if base == BaseType::INT => self
                .emit_op("clear", &[reg])
                .map_err(|e| self.locate(e, lexer, kw.span, &name))?,
            None => {}
        }
        Ok(())
    }

    fn const_decl(&mut self, lexer: &mut Lexer<'_>, _kw: Token) -> CompileResult<()> {
        let ty_tok = self.expect_ident(lexer, "type name")?;
        let base = self.lookup_type(lexer, &ty_tok)?;
        if base != BaseType::INT {
            return Err(self.locate(
                self.perr(
                    CompileErrorKind::TypeMismatch,
                    "only int constants can be declared in scripts",
                ),
                lexer,
                ty_tok.span,
                lexer.text(&ty_tok),
            ));
        }
        let name_tok = self.expect_ident(lexer, "constant name")?;
        self.check_declarable(lexer, &name_tok, CompileErrorKind::DuplicateDeclaration)?;
        let name = lexer.text(&name_tok).to_string();

        let eq = self.next(lexer)?;
        if eq.kind != TokenKind::Eq {
            return Err(self.locate(
                self.perr(CompileErrorKind::Syntax, "expected '='"),
                lexer,
                eq.span,
                lexer.text(&eq),
            ));
        }

        let first = self.next(lexer)?;
        let value = match first.kind {
            TokenKind::Int(v) => {
                self.expect_semi(lexer)?;
                ScriptValue::int(v)
            }
            TokenKind::Ident => {
                let text = lexer.text(&first);
                if let Some(r) = self.resolve_name(text) {
                    let RefPayload::Value(v) = r.payload else {
                        return Err(self.locate(
                            self.perr(
                                CompileErrorKind::TypeMismatch,
                                "constant initializer required",
                            ),
                            lexer,
                            first.span,
                            text,
                        ));
                    };
                    self.expect_semi(lexer)?;
                    v
                } else {
                    self.fold_call(lexer, &first)?
                }
            }
            _ => {
                return Err(self.locate(
                    self.perr(CompileErrorKind::Syntax, "expected a constant expression"),
                    lexer,
                    first.span,
                    lexer.text(&first),
                ));
            }
        };
        if value.kind().base != base {
            return Err(self.locate(
                self.perr(
                    CompileErrorKind::TypeMismatch,
                    "initializer type does not match declaration",
                ),
                lexer,
                name_tok.span,
                &name,
            ));
        }

        let interned = self.parser.intern(&name);
        let r = RefData::value(interned.clone(), value);
        self.scopes
            .last_mut()
            .expect("scope stack never empty")
            .names
            .insert(interned, r);
        Ok(())
    }

    /// Constant-fold an operation call in a `const` initializer.
    fn fold_call(&mut self, lexer: &mut Lexer<'_>, op_tok: &Token) -> CompileResult<ScriptValue> {
        let op_text = lexer.text(op_tok);
        let Some(proc) = self.parser.catalog().get(op_text) else {
            return Err(self.locate(
                self.perr(
                    CompileErrorKind::UnknownIdentifier,
                    format!("name '{op_text}' not found"),
                ),
                lexer,
                op_tok.span,
                op_text,
            ));
        };
        let args = self.parse_args(lexer)?;
        let Some(fold) = proc.fold else {
            return Err(self.locate(
                self.perr(
                    CompileErrorKind::Syntax,
                    format!("operation '{op_text}' cannot be constant-folded"),
                ),
                lexer,
                op_tok.span,
                op_text,
            ));
        };
        let mut values = Vec::with_capacity(args.len());
        for arg in &args {
            let RefPayload::Value(v) = arg.payload else {
                return Err(self.locate(
                    self.perr(
                        CompileErrorKind::TypeMismatch,
                        "constant arguments required for folding",
                    ),
                    lexer,
                    op_tok.span,
                    op_text,
                ));
            };
            values.push(v);
        }
        fold(&values).ok_or_else(|| {
            self.locate(
                self.perr(
                    CompileErrorKind::Syntax,
                    format!("constant folding of '{op_text}' failed"),
                ),
                lexer,
                op_tok.span,
                op_text,
            )
        })
    }

    fn if_stmt(&mut self, lexer: &mut Lexer<'_>) -> CompileResult<()> {
        let op_tok = self.expect_ident(lexer, "condition operation")?;
        let op_text = lexer.text(&op_tok);
        let mut args = self.parse_args(lexer)?;

        let then_label = self.code.new_label();
        let else_label = self.code.new_label();
        let end_label = self.code.new_label();
        args.push(RefData::label(then_label));
        args.push(RefData::label(else_label));
        self.emit_op(op_text, &args)
            .map_err(|e| self.locate(e, lexer, op_tok.span, op_text))?;
        self.code.bind_label(then_label);

        self.blocks.push(Block::If {
            else_label,
            end_label,
            has_else: false,
        });
        self.push_scope();
        Ok(())
    }

    fn else_stmt(&mut self, lexer: &mut Lexer<'_>, kw: Token) -> CompileResult<()> {
        self.expect_semi(lexer)?;
        let (else_label, end_label) = match self.blocks.last_mut() {
            Some(Block::If {
                else_label,
                end_label,
                has_else,
            }) if !*has_else => {
                *has_else = true;
                (*else_label, *end_label)
            }
            _ => {
                return Err(self.locate(
                    self.perr(CompileErrorKind::Syntax, "'else' without matching 'if'"),
                    lexer,
                    kw.span,
                    "else",
                ));
            }
        };
        self.pop_scope();
        self.emit_goto(end_label)
            .map_err(|e| self.locate(e, lexer, kw.span, "else"))?;
        self.code.bind_label(else_label);
        self.push_scope();
        Ok(())
    }

    fn end_stmt(&mut self, lexer: &mut Lexer<'_>, kw: Token) -> CompileResult<()> {
        self.expect_semi(lexer)?;
        let Some(block) = self.blocks.pop() else {
            return Err(self.locate(
                self.perr(CompileErrorKind::Syntax, "'end' without open block"),
                lexer,
                kw.span,
                "end",
            ));
        };
        self.pop_scope();
        match block {
            Block::If {
                else_label,
                end_label,
                has_else,
            } => {
                if !has_else {
                    self.code.bind_label(else_label);
                }
                self.code.bind_label(end_label);
            }
            Block::Loop { top, break_label } => {
                self.emit_goto(top)
                    .map_err(|e| self.locate(e, lexer, kw.span, "end"))?;
                self.code.bind_label(break_label);
            }
        }
        Ok(())
    }

    fn loop_stmt(&mut self, lexer: &mut Lexer<'_>) -> CompileResult<()> {
        self.expect_semi(lexer)?;
        let top = self.code.new_label();
        self.code.bind_label(top);
        let break_label = self.code.new_label();
        self.blocks.push(Block::Loop { top, break_label });
        self.push_scope();
        Ok(())
    }

    fn loop_jump(&mut self, lexer: &mut Lexer<'_>, kw: Token) -> CompileResult<()> {
        let text = lexer.text(&kw).to_string();
        self.expect_semi(lexer)?;
        let target = self.blocks.iter().rev().find_map(|b| match b {
            Block::Loop { top, break_label } => Some(if text == "break" {
                *break_label
            } else {
                *top
            }),
            Block::If { .. } => None,
        });
        let Some(target) = target else {
            return Err(self.locate(
                self.perr(
                    CompileErrorKind::Syntax,
                    format!("'{text}' outside of a loop"),
                ),
                lexer,
                kw.span,
                &text,
            ));
        };
        self.emit_goto(target)
            .map_err(|e| self.locate(e, lexer, kw.span, &text))
    }

    fn return_stmt(&mut self, lexer: &mut Lexer<'_>, kw: Token) -> CompileResult<()> {
        let args = self.parse_args(lexer)?;
        if !args.is_empty() {
            let outputs = self.parser.outputs();
            if args.len() != outputs.len() {
                return Err(self.locate(
                    self.perr(
                        CompileErrorKind::Syntax,
                        format!("'return' expects {} value(s)", outputs.len()),
                    ),
                    lexer,
                    kw.span,
                    "return",
                ));
            }
            for (out, arg) in outputs.iter().zip(&args) {
                if !out.kind.is_var() {
                    return Err(self.locate(
                        self.perr(
                            CompileErrorKind::InvalidLValue,
                            format!("output register '{}' is read-only", out.name),
                        ),
                        lexer,
                        kw.span,
                        "return",
                    ));
                }
                if arg.kind.base != out.kind.base {
                    return Err(self.locate(
                        self.perr(
                            CompileErrorKind::TypeMismatch,
                            format!("value type does not match output '{}'", out.name),
                        ),
                        lexer,
                        kw.span,
                        "return",
                    ));
                }
                self.emit_op("set", &[out.as_ref_data(), arg.clone()])
                    .map_err(|e| self.locate(e, lexer, kw.span, "return"))?;
            }
        }
        self.emit_op("exit", &[])
            .map_err(|e| self.locate(e, lexer, kw.span, "return"))
    }

    // =========================================================================
    // Resolution and emission
    // =========================================================================

    fn lookup_proc(&self, op_name: &str, args: &[RefData]) -> Option<&'a ProcDesc> {
        let catalog = self.parser.catalog();
        if let Some(first) = args.first() {
            if first.kind.base >= BaseType::FIRST_HOST {
                let qualified = format!("{}.{op_name}", self.global.type_name(first.kind.base));
                if let Some(proc) = catalog.get(&qualified) {
                    return Some(proc);
                }
            }
        }
        catalog.get(op_name)
    }

    fn emit_resolved(&mut self, proc: &ProcDesc, args: &[RefData]) -> CompileResult<()> {
        let version = self
            .parser
            .catalog()
            .resolve(proc, args)
            .map_err(|kind| self.overload_error(kind, proc, args))?;
        let overload = &proc.overloads[version];
        self.code.emit_handle(overload.handle);
        for (decl, arg) in overload.args.iter().zip(args) {
            self.emit_arg(*decl, arg)?;
        }
        if let Some(extra) = proc.emit_extra {
            extra(&mut self.code, args)?;
        }
        Ok(())
    }

    fn overload_error(
        &self,
        kind: CompileErrorKind,
        proc: &ProcDesc,
        args: &[RefData],
    ) -> CompileError {
        // A call whose first argument is not a register, against an
        // operation that only writes its first argument, is an lvalue
        // problem, not a missing overload.
        if kind == CompileErrorKind::NoMatchingOverload {
            if let Some(first) = args.first() {
                let wants_reg = proc
                    .overloads
                    .iter()
                    .filter(|o| o.args.len() == args.len())
                    .all(|o| o.args.first().is_some_and(|k| k.is_reg() && !k.is_ptr()));
                let has_arity = proc.overloads.iter().any(|o| o.args.len() == args.len());
                if has_arity && wants_reg && !first.kind.is_reg() {
                    return self
                        .perr(
                            CompileErrorKind::InvalidLValue,
                            format!("'{}' requires a register destination", proc.name),
                        )
                        .with_token(&*proc.name);
                }
            }
        }
        let message = match kind {
            CompileErrorKind::AmbiguousOverload => {
                format!("call of '{}' is ambiguous", proc.name)
            }
            _ => format!("no overload of '{}' accepts these arguments", proc.name),
        };
        self.perr(kind, message).with_token(&*proc.name)
    }

    fn emit_arg(&mut self, decl: ArgKind, arg: &RefData) -> CompileResult<()> {
        if decl.base == BaseType::LABEL {
            if let RefPayload::Label(label) = arg.payload {
                self.code.emit_label_ref(label);
                return Ok(());
            }
        } else if decl.is_reg() {
            if let RefPayload::Reg(offset) = arg.payload {
                self.code.emit_u16(offset);
                return Ok(());
            }
        } else if let RefPayload::Value(v) = arg.payload {
            self.code.emit_i64(v.bits() as i64);
            return Ok(());
        }
        Err(self.perr(
            CompileErrorKind::TypeMismatch,
            format!("argument '{}' cannot be emitted as an immediate", arg.name),
        ))
    }

    fn emit_goto(&mut self, target: Label) -> CompileResult<()> {
        self.emit_op("goto", &[RefData::label(target)])
    }

    fn resolve_name(&self, name: &str) -> Option<RefData> {
        for scope in self.scopes.iter().rev() {
            if let Some(r) = scope.names.get(name) {
                return Some(r.clone());
            }
        }
        if let Some(decl) = self.parser.lookup_reg(name) {
            return Some(decl.as_ref_data());
        }
        if let Some(v) = self.parser.lookup_const(name) {
            return Some(RefData::value(self.parser.intern(name), v));
        }
        if let Some(v) = self.global.get_ref(name) {
            return Some(RefData::value(self.parser.intern(name), v));
        }
        None
    }

    fn name_in_use(&self, name: &str) -> bool {
        self.scopes
            .iter()
            .any(|scope| scope.names.contains_key(name))
            || self.parser.lookup_reg(name).is_some()
            || self.parser.lookup_const(name).is_some()
            || self.global.get_ref(name).is_some()
    }

    // =========================================================================
    // Scopes and registers
    // =========================================================================

    fn push_scope(&mut self) {
        self.scopes.push(Scope {
            names: FxHashMap::default(),
            saved_reg_top: self.reg_top,
        });
    }

    fn pop_scope(&mut self) {
        let scope = self.scopes.pop().expect("scope stack never empty");
        self.reg_top = scope.saved_reg_top;
    }

    fn alloc_reg(&mut self, name: &str, base: BaseType, named: bool) -> CompileResult<RefData> {
        let offset = self.reg_top;
        if offset as usize + REG_SLOT > MAX_REG_BYTES {
            return Err(self.perr(
                CompileErrorKind::RegisterFileOverflow,
                "register file exhausted",
            ));
        }
        self.reg_top += REG_SLOT as u16;
        let kind = ArgKind::new(base, ArgFlags::VAR);
        let r = RefData::reg(self.parser.intern(name), kind, offset);
        if named {
            self.scopes
                .last_mut()
                .expect("scope stack never empty")
                .names
                .insert(r.name.clone(), r.clone());
        }
        Ok(r)
    }

    // =========================================================================
    // Token helpers and diagnostics
    // =========================================================================

    fn next(&self, lexer: &mut Lexer<'_>) -> CompileResult<Token> {
        lexer
            .next_token()
            .map_err(|e| e.with_parent(self.parent.clone()))
    }

    fn expect_ident(&self, lexer: &mut Lexer<'_>, what: &str) -> CompileResult<Token> {
        let tok = self.next(lexer)?;
        if tok.kind != TokenKind::Ident {
            return Err(self.locate(
                self.perr(CompileErrorKind::Syntax, format!("expected {what}")),
                lexer,
                tok.span,
                lexer.text(&tok),
            ));
        }
        Ok(tok)
    }

    fn expect_semi(&self, lexer: &mut Lexer<'_>) -> CompileResult<()> {
        let tok = self.next(lexer)?;
        if tok.kind != TokenKind::Semi {
            return Err(self.locate(
                self.perr(CompileErrorKind::Syntax, "expected ';'"),
                lexer,
                tok.span,
                lexer.text(&tok),
            ));
        }
        Ok(())
    }

    fn parse_one_arg(&mut self, lexer: &mut Lexer<'_>) -> CompileResult<RefData> {
        let tok = self.next(lexer)?;
        match tok.kind {
            TokenKind::Int(v) => Ok(RefData::value("", ScriptValue::int(v))),
            TokenKind::Ident => self.resolve_tok(lexer, &tok),
            TokenKind::Str => Ok(RefData::text(lexer.text(&tok))),
            _ => Err(self.locate(
                self.perr(CompileErrorKind::Syntax, "expected a value"),
                lexer,
                tok.span,
                lexer.text(&tok),
            )),
        }
    }

    fn parse_args(&mut self, lexer: &mut Lexer<'_>) -> CompileResult<Vec<RefData>> {
        let mut args = Vec::new();
        loop {
            let tok = self.next(lexer)?;
            match tok.kind {
                TokenKind::Semi => return Ok(args),
                TokenKind::Int(v) => args.push(RefData::value("", ScriptValue::int(v))),
                TokenKind::Ident => args.push(self.resolve_tok(lexer, &tok)?),
                TokenKind::Str => args.push(RefData::text(lexer.text(&tok))),
                TokenKind::Eof => {
                    return Err(self.locate(
                        self.perr(CompileErrorKind::Syntax, "missing ';'"),
                        lexer,
                        tok.span,
                        "",
                    ));
                }
                _ => {
                    return Err(self.locate(
                        self.perr(CompileErrorKind::Syntax, "unexpected token in arguments"),
                        lexer,
                        tok.span,
                        lexer.text(&tok),
                    ));
                }
            }
        }
    }

    fn resolve_tok(&self, lexer: &Lexer<'_>, tok: &Token) -> CompileResult<RefData> {
        let text = lexer.text(tok);
        self.resolve_name(text).ok_or_else(|| {
            self.locate(
                self.perr(
                    CompileErrorKind::UnknownIdentifier,
                    format!("name '{text}' not found"),
                ),
                lexer,
                tok.span,
                text,
            )
        })
    }

    fn lookup_type(&self, lexer: &Lexer<'_>, tok: &Token) -> CompileResult<BaseType> {
        let text = lexer.text(tok);
        self.parser.lookup_type(text).ok_or_else(|| {
            self.locate(
                self.perr(
                    CompileErrorKind::UnknownIdentifier,
                    format!("unknown type '{text}'"),
                ),
                lexer,
                tok.span,
                text,
            )
        })
    }

    fn check_declarable(
        &self,
        lexer: &Lexer<'_>,
        tok: &Token,
        duplicate_kind: CompileErrorKind,
    ) -> CompileResult<()> {
        let text = lexer.text(tok);
        if RESERVED.contains(&text) || text.contains('.') {
            return Err(self.locate(
                self.perr(
                    CompileErrorKind::Syntax,
                    format!("'{text}' cannot be used as a name"),
                ),
                lexer,
                tok.span,
                text,
            ));
        }
        if self.name_in_use(text) {
            return Err(self.locate(
                self.perr(duplicate_kind, format!("name '{text}' already declared")),
                lexer,
                tok.span,
                text,
            ));
        }
        Ok(())
    }

    fn perr(&self, kind: CompileErrorKind, message: impl Into<String>) -> CompileError {
        CompileError::new(kind, message)
    }

    fn locate(
        &self,
        mut e: CompileError,
        lexer: &Lexer<'_>,
        span: Span,
        token: &str,
    ) -> CompileError {
        if e.span.is_none() {
            e = e.with_span(span, lexer.source());
            if !token.is_empty() && e.token.is_none() {
                e = e.with_token(token);
            }
        }
        if e.parent.is_empty() {
            e = e.with_parent(self.parent.clone());
        }
        e
    }
}
