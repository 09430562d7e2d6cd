//! Integration tests for script compilation: statement forms, diagnostics,
//! scope handling and the catalog hooks, without executing anything.

use runic_compiler::bytecode::BytecodeBuilder;
use runic_compiler::catalog::ProcDesc;
use runic_compiler::parser::ScriptParserBase;
use runic_compiler::symbol::RefData;
use runic_compiler::writer::ParserWriter;
use runic_core::argkind::{ArgFlags, ArgKind, BaseType};
use runic_core::error::{CompileErrorKind, CompileResult};
use runic_core::exec::{OpResult, ProgPos, WorkerState};
use runic_core::global::ScriptGlobal;
use runic_core::value::ScriptValue;

// ============================================================================
// Test Helpers
// ============================================================================

fn demo_parser(global: &mut ScriptGlobal) -> ScriptParserBase {
    let mut parser = ScriptParserBase::new(global, "demo");
    parser.add_output("out", BaseType::INT, true).unwrap();
    parser
        .add_input("a", ArgKind::new(BaseType::INT, ArgFlags::REG))
        .unwrap();
    parser
        .add_input("b", ArgKind::new(BaseType::INT, ArgFlags::REG))
        .unwrap();
    parser
}

fn assert_compiles(parser: &ScriptParserBase, global: &ScriptGlobal, code: &str) {
    parser
        .parse(global, "test", code)
        .unwrap_or_else(|e| panic!("expected '{code}' to compile, got: {e}"));
}

fn assert_error(
    parser: &ScriptParserBase,
    global: &ScriptGlobal,
    code: &str,
    expected: CompileErrorKind,
) {
    let err = parser
        .parse(global, "test", code)
        .err()
        .unwrap_or_else(|| panic!("expected '{code}' to fail"));
    assert_eq!(err.kind, expected, "for '{code}': {err}");
}

// ============================================================================
// Statement forms
// ============================================================================

#[test]
fn test_accepted_statement_forms() {
    let mut global = ScriptGlobal::new();
    let parser = demo_parser(&mut global);

    assert_compiles(&parser, &global, "");
    assert_compiles(&parser, &global, "return;");
    assert_compiles(&parser, &global, "out add a b; return out;");
    assert_compiles(&parser, &global, "out set -0x10; return out;");
    assert_compiles(&parser, &global, "var int t = a; t add b; return t;");
    assert_compiles(&parser, &global, "var int t; return t;");
    assert_compiles(&parser, &global, "const int k = 7; out set k; return out;");
    assert_compiles(
        &parser,
        &global,
        "if eq a b; out set 1; else; out set 0; end; return out;",
    );
    assert_compiles(
        &parser,
        &global,
        "loop; if le a 0; break; end; a sub a 1; end; return a;",
    );
    assert_compiles(&parser, &global, "# just a comment\nreturn;");
    assert_compiles(&parser, &global, ";;; return ;");
    assert_compiles(&parser, &global, "clear out; return out;");
    assert_compiles(&parser, &global, "out min a b; out max out 0; return out;");
}

#[test]
fn test_nested_blocks() {
    let mut global = ScriptGlobal::new();
    let parser = demo_parser(&mut global);
    assert_compiles(
        &parser,
        &global,
        "loop; \
           if gt a b; \
             if eq a 10; break; end; \
             a sub a 1; \
           else; \
             b sub b 1; \
           end; \
           if le b 0; break; end; \
         end; \
         return a;",
    );
}

// ============================================================================
// Diagnostics
// ============================================================================

#[test]
fn test_unknown_identifier() {
    let mut global = ScriptGlobal::new();
    let parser = demo_parser(&mut global);
    assert_error(
        &parser,
        &global,
        "out add missing 1;",
        CompileErrorKind::UnknownIdentifier,
    );
    assert_error(
        &parser,
        &global,
        "out frobnicate a;",
        CompileErrorKind::UnknownIdentifier,
    );
    assert_error(
        &parser,
        &global,
        "ghost.hp get out;",
        CompileErrorKind::UnknownIdentifier,
    );
    assert_error(
        &parser,
        &global,
        "var shade x;",
        CompileErrorKind::UnknownIdentifier,
    );
}

#[test]
fn test_syntax_errors() {
    let mut global = ScriptGlobal::new();
    let parser = demo_parser(&mut global);
    assert_error(&parser, &global, "out add a b", CompileErrorKind::Syntax);
    assert_error(&parser, &global, "end;", CompileErrorKind::Syntax);
    assert_error(&parser, &global, "else;", CompileErrorKind::Syntax);
    assert_error(&parser, &global, "break;", CompileErrorKind::Syntax);
    assert_error(&parser, &global, "if gt a b; out set 1;", CompileErrorKind::Syntax);
    assert_error(&parser, &global, "{ out set 1; }", CompileErrorKind::Syntax);
    assert_error(&parser, &global, "5 set 3;", CompileErrorKind::Syntax);
    assert_error(&parser, &global, "var int var;", CompileErrorKind::Syntax);
    assert_error(&parser, &global, "return a b;", CompileErrorKind::Syntax);
    assert_error(
        &parser,
        &global,
        "if gt a b; else; else; end;",
        CompileErrorKind::Syntax,
    );
}

#[test]
fn test_duplicate_local() {
    let mut global = ScriptGlobal::new();
    let parser = demo_parser(&mut global);
    assert_error(
        &parser,
        &global,
        "var int t; var int t;",
        CompileErrorKind::DuplicateLocal,
    );
    assert_error(&parser, &global, "var int a;", CompileErrorKind::DuplicateLocal);
}

#[test]
fn test_duplicate_declaration() {
    let mut global = ScriptGlobal::new();
    let parser = demo_parser(&mut global);
    assert_error(
        &parser,
        &global,
        "const int out = 1;",
        CompileErrorKind::DuplicateDeclaration,
    );
    assert_error(
        &parser,
        &global,
        "const int k = 1; const int k = 2;",
        CompileErrorKind::DuplicateDeclaration,
    );
}

#[test]
fn test_type_mismatch() {
    let mut global = ScriptGlobal::new();
    let parser = demo_parser(&mut global);
    assert_error(
        &parser,
        &global,
        "var int t = \"text\";",
        CompileErrorKind::TypeMismatch,
    );
    assert_error(
        &parser,
        &global,
        "return \"text\";",
        CompileErrorKind::TypeMismatch,
    );
}

#[test]
fn test_invalid_lvalue() {
    let mut global = ScriptGlobal::new();
    let mut parser = demo_parser(&mut global);
    parser.add_const("FIVE", ScriptValue::int(5)).unwrap();
    assert_error(
        &parser,
        &global,
        "FIVE set 3;",
        CompileErrorKind::InvalidLValue,
    );
}

#[test]
fn test_register_file_overflow() {
    let mut global = ScriptGlobal::new();
    let parser = demo_parser(&mut global);
    // Outputs and inputs occupy 3 slots of the 64 available; the 62nd
    // local cannot be placed.
    let mut source = String::new();
    for i in 0..62 {
        source.push_str(&format!("var int local_{i};\n"));
    }
    assert_error(
        &parser,
        &global,
        &source,
        CompileErrorKind::RegisterFileOverflow,
    );
}

#[test]
fn test_no_matching_overload() {
    let mut global = ScriptGlobal::new();
    let parser = demo_parser(&mut global);
    assert_error(
        &parser,
        &global,
        "out add a b 1 2;",
        CompileErrorKind::NoMatchingOverload,
    );
    assert_error(
        &parser,
        &global,
        "out set \"name\";",
        CompileErrorKind::NoMatchingOverload,
    );
}

fn nop(_: &mut WorkerState, _: &[u8], _: &mut ProgPos) -> OpResult {
    OpResult::Continue
}

#[test]
fn test_ambiguous_overload() {
    fn tied(_: &[ArgKind], _: &[RefData], _: usize) -> u32 {
        1
    }

    let mut global = ScriptGlobal::new();
    let mut parser = demo_parser(&mut global);
    let int_reg = ArgKind::new(BaseType::INT, ArgFlags::REG);
    let int_const = ArgKind::plain(BaseType::INT);
    parser.register_op("amb", &[int_reg], nop).unwrap();
    parser.register_op("amb", &[int_const], nop).unwrap();
    parser.set_op_scorer("amb", tied);
    assert_error(&parser, &global, "a amb;", CompileErrorKind::AmbiguousOverload);
}

#[test]
fn test_error_carries_location_and_parent() {
    let mut global = ScriptGlobal::new();
    let parser = demo_parser(&mut global);
    let err = parser
        .parse(&global, "hitUnit", "out set a;\nout oops b;")
        .unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::UnknownIdentifier);
    assert_eq!(err.line_col, Some((2, 5)));
    assert_eq!(err.token.as_deref(), Some("oops"));
    assert_eq!(&*err.parent, "hitUnit");
}

// ============================================================================
// Constant folding
// ============================================================================

#[test]
fn test_const_folding() {
    let mut global = ScriptGlobal::new();
    let parser = demo_parser(&mut global);
    assert_compiles(
        &parser,
        &global,
        "const int k = add 2 3; const int k2 = mul k 4; out set k2; return out;",
    );
    assert_error(
        &parser,
        &global,
        "const int k = div 1 0;",
        CompileErrorKind::Syntax,
    );
    assert_error(
        &parser,
        &global,
        "const int k = add a 1;",
        CompileErrorKind::TypeMismatch,
    );
    assert_error(
        &parser,
        &global,
        "const int k = goto 1;",
        CompileErrorKind::Syntax,
    );
}

// ============================================================================
// Hooks and custom emission
// ============================================================================

fn double_hook(
    _desc: &ProcDesc,
    writer: &mut ParserWriter<'_>,
    args: &[RefData],
) -> CompileResult<()> {
    writer.emit_op("add", &[args[0].clone(), args[0].clone(), args[0].clone()])
}

#[test]
fn test_parse_hook_emits_through_writer() {
    let mut global = ScriptGlobal::new();
    let mut parser = demo_parser(&mut global);
    parser.register_op_hook("double", double_hook).unwrap();
    assert_compiles(&parser, &global, "out set a; double out; return out;");
}

fn unbalanced_hook(
    _desc: &ProcDesc,
    writer: &mut ParserWriter<'_>,
    _args: &[RefData],
) -> CompileResult<()> {
    writer.inline_block("loop;")
}

#[test]
fn test_unbalanced_inline_block_is_rejected() {
    let mut global = ScriptGlobal::new();
    let mut parser = demo_parser(&mut global);
    parser.register_op_hook("broken", unbalanced_hook).unwrap();
    assert_error(&parser, &global, "broken;", CompileErrorKind::Syntax);
}

fn trailer(builder: &mut BytecodeBuilder, _args: &[RefData]) -> CompileResult<()> {
    builder.emit_u16(0xBEEF);
    Ok(())
}

fn skip_trailer(st: &mut WorkerState, code: &[u8], pc: &mut ProgPos) -> OpResult {
    let dst = runic_core::exec::read_u16(code, pc);
    let trailer = runic_core::exec::read_u16(code, pc);
    st.regs.set_i64(dst, i64::from(trailer));
    OpResult::Continue
}

#[test]
fn test_extra_immediates_are_appended() {
    let mut global = ScriptGlobal::new();
    let mut parser = demo_parser(&mut global);
    let int_reg = ArgKind::new(BaseType::INT, ArgFlags::REG);
    parser.register_op("probe", &[int_reg], skip_trailer).unwrap();
    parser.set_op_emit_extra("probe", trailer);

    let container = parser.parse(&global, "test", "out probe;").unwrap();
    let code = container.code();
    assert!(code
        .windows(2)
        .any(|w| w == 0xBEEFu16.to_le_bytes().as_slice()));
}

// ============================================================================
// Transactional compile
// ============================================================================

#[test]
fn test_failed_parse_does_not_poison_the_parser() {
    let mut global = ScriptGlobal::new();
    let parser = demo_parser(&mut global);
    for bad in ["var int t = ;", "out add t 1;", "loop; loop; end;"] {
        assert!(parser.parse(&global, "bad", bad).is_err());
    }
    assert_compiles(&parser, &global, "var int t = 1; out add a t; return out;");
    assert_eq!(parser.reg_top(), 24);
}
