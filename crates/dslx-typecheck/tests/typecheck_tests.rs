//! Type-checker integration tests.
//!
//! Each test parses + type-checks a DSLX program via
//! `dslx_typecheck::type_check` and asserts on the presence (or absence) of
//! specific error codes.

use dslx_typecheck::{parse_and_typecheck, Dim, Type};
use dslx_types::ast::{ExprKind, ModuleItem, Stmt};
use dslx_types::ErrorCode;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn check(source: &str) -> dslx_types::CompileErrors {
    dslx_typecheck::type_check(source, "test.x")
}

fn render(errors: &dslx_types::CompileErrors) -> String {
    errors
        .errors
        .iter()
        .map(|e| format!("  [{}] {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join("\n")
}

fn assert_ok(source: &str) {
    let errors = check(source);
    assert!(
        !errors.has_errors(),
        "expected no errors, got {}:\n{}",
        errors.total_errors,
        render(&errors)
    );
}

fn assert_error(source: &str, expected_code: ErrorCode) {
    let errors = check(source);
    assert!(
        errors.errors.iter().any(|e| e.code == expected_code),
        "expected error code {:?}, got:\n{}",
        expected_code,
        render(&errors)
    );
}

const CAN_HANDLE_PROCS: &str = r#"
proc second_level_proc {
  input_c: chan in u32;
  output_p: chan out u32;
  member_0: u32;
  member_1: u64;

  config(input_c: chan in u32, output_p: chan out u32) {
    (input_c, output_p, u32:0, u64:1)
  }

  next(tok: token, state: u64) {
    let (tok, input) = recv(tok, input_c);
    (member_0 as u64 + input as u64 + member_1,)
  }
}

proc first_level_proc {
  input_p0: chan out u32;
  input_p1: chan out u32;
  output_c0: chan in u32;
  output_c1: chan in u32;

  config() {
    let (input_p0, input_c0) = chan u32;
    let (output_p0, output_c0) = chan u32;
    spawn second_level_proc(input_c0, output_p0)(u64:1000);

    let (input_p1, input_c1) = chan u32;
    let (output_p1, output_c1) = chan u32;
    spawn second_level_proc(input_c1, output_p1)(u64:1001);

    (input_p0, input_p1, output_p0, output_p1)
  }

  next(tok: token) {
    let tok = send(tok, input_p0, u32:0);
    let tok = send(tok, input_p1, u32:1);
    ()
  }
}

#![test_proc()]
proc test_proc {
  terminator: chan out bool;
  config(terminator: chan out bool) {
    spawn first_level_proc()();
    (terminator,)
  }

  next(tok: token) {
    let tok = send(tok, terminator, true);
    ()
  }
}
"#;

// ══════════════════════════════════════════════════════════════════════════════
// Literals
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_untyped_literal_takes_operand_type() {
    let checked = parse_and_typecheck(
        "fn f(x: u8) -> u8 { x + 1 }",
        "test.x",
        "test",
    )
    .expect("typechecks");
    let m = &checked.module;
    let f = m.find_function("f").expect("f");
    let ExprKind::Block(block) = &m.expr(m.function(f).body).kind else {
        panic!("body is a block");
    };
    let value = block.value.expect("trailing value");
    let ExprKind::Binary { rhs, .. } = &m.expr(value).kind else {
        panic!("binary");
    };
    assert_eq!(checked.type_info.expr_type(*rhs), Some(&Type::bits(false, 8)));
}

#[test]
fn test_unconstrained_literal_is_an_error() {
    assert_error("fn f() { let x = 5; () }", ErrorCode::CANNOT_INFER);
}

#[test]
fn test_literal_does_not_fit() {
    assert_error("fn f() -> u8 { u8:256 }", ErrorCode::LITERAL_DOES_NOT_FIT);
    assert_ok("fn f() -> s8 { s8:-128 }");
    assert_error("fn f() -> s8 { s8:-129 }", ErrorCode::LITERAL_DOES_NOT_FIT);
}

#[test]
fn test_index_literal_defaults_to_u32() {
    assert_ok("fn f(a: u8[4]) -> u8 { a[2] }");
}

#[test]
fn test_slice_width() {
    let checked =
        parse_and_typecheck("fn f(x: u32) -> u8 { x[0:8] }", "test.x", "test").expect("ok");
    let m = &checked.module;
    let f = m.find_function("f").expect("f");
    let ExprKind::Block(block) = &m.expr(m.function(f).body).kind else {
        panic!("block");
    };
    let ty = checked.type_info.expr_type(block.value.expect("value"));
    assert_eq!(ty, Some(&Type::bits(false, 8)));
}

// ══════════════════════════════════════════════════════════════════════════════
// Mismatches & names
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_return_type_mismatch() {
    assert_error("fn f(x: u8) -> u16 { x }", ErrorCode::TYPE_MISMATCH);
}

#[test]
fn test_operand_width_mismatch() {
    assert_error("fn f(x: u8, y: u16) -> u8 { x + y }", ErrorCode::TYPE_MISMATCH);
}

#[test]
fn test_undefined_name() {
    assert_error("fn f() -> u32 { y }", ErrorCode::UNDEFINED_NAME);
}

#[test]
fn test_unknown_type() {
    assert_error("fn f(x: Foo) -> u32 { u32:0 }", ErrorCode::UNKNOWN_TYPE);
}

#[test]
fn test_duplicate_function() {
    assert_error(
        "fn f() -> u32 { u32:0 }\nfn f() -> u32 { u32:1 }",
        ErrorCode::DUPLICATE_DEFINITION,
    );
}

#[test]
fn test_unknown_struct_field() {
    assert_error(
        "struct P { x: u32 }\nfn f(p: P) -> u32 { p.y }",
        ErrorCode::UNKNOWN_FIELD,
    );
}

#[test]
fn test_struct_instance_missing_field() {
    assert_error(
        "struct P { x: u32, y: u32 }\nfn f() -> P { P { x: u32:1 } }",
        ErrorCode::TYPE_MISMATCH,
    );
    assert_ok("struct P { x: u32, y: u32 }\nfn f(p: P) -> P { P { x: u32:1, ..p } }");
}

#[test]
fn test_enum_and_match() {
    assert_ok(
        r#"
enum Color : u2 { Red = 0, Green = 1, Blue = 2 }
const LIMIT = u8:7;
fn f(c: Color, x: u8) -> u8 {
  let a = match c {
    Color::Red => u8:1,
    _ => u8:2,
  };
  match x {
    LIMIT => a,
    u8:0 | u8:1 => u8:0,
    y => y + a,
  }
}
"#,
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Calls
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_wrong_arg_count() {
    assert_error(
        "fn g(x: u32) -> u32 { x }\nfn f() -> u32 { g(u32:1, u32:2) }",
        ErrorCode::WRONG_ARG_COUNT,
    );
}

#[test]
fn test_recursion_rejected() {
    assert_error("fn f(x: u32) -> u32 { f(x) }", ErrorCode::RECURSION_NOT_ALLOWED);
}

#[test]
fn test_parametric_return_type_is_substituted() {
    let checked = parse_and_typecheck(
        r#"
fn double<N: u32, M: u32 = {N * u32:2}>(x: uN[N]) -> uN[M] { x ++ x }
fn top(x: u8) -> u16 { double(x) }
"#,
        "test.x",
        "test",
    )
    .expect("typechecks");
    let m = &checked.module;
    let top = m.find_function("top").expect("top");
    let ExprKind::Block(block) = &m.expr(m.function(top).body).kind else {
        panic!("block");
    };
    assert_eq!(
        checked.type_info.expr_type(block.value.expect("value")),
        Some(&Type::bits(false, 16))
    );
}

#[test]
fn test_parametric_width_mismatch_detected() {
    assert_error(
        r#"
fn id<N: u32>(x: uN[N]) -> uN[N] { x }
fn top(x: u8) -> u16 { id(x) }
"#,
        ErrorCode::TYPE_MISMATCH,
    );
}

#[test]
fn test_symbolic_annotation_dim() {
    let checked = parse_and_typecheck(
        "fn id<N: u32>(x: uN[N]) -> uN[N] { x }",
        "test.x",
        "test",
    )
    .expect("typechecks");
    let m = &checked.module;
    let id = m.find_function("id").expect("id");
    let param_ty = checked
        .type_info
        .annotation_type(m.function(id).params[0].ty)
        .expect("resolved");
    assert!(matches!(
        param_ty,
        Type::Bits {
            signed: false,
            width: Dim::Symbolic(_)
        }
    ));
}

#[test]
fn test_trace_fmt_placeholder_count() {
    assert_error(
        r#"fn f(x: u32) -> u32 { trace_fmt!("{} {}", x); x }"#,
        ErrorCode::WRONG_ARG_COUNT,
    );
}

#[test]
fn test_failer_program_typechecks() {
    assert_ok(
        r#"
fn failer(x: u32) -> u1 {
  let y = x + u32:7;
  let _ = assert_eq(y, u32:1024);
  u1:1
}

fn interposer(x: u32, y:u32) -> u32 {
  let x = x + u32:1;
  let y = y + u32:1;
  let z = x + y;
  z + (failer(z) as u32)
}

fn top(x: u32) -> u32 {
  let y = x * x;
  interposer(x, y)
}
"#,
    );
}

#[test]
fn test_for_loop() {
    assert_ok(
        r#"
fn sum(a: u32[4]) -> u32 {
  for (i, acc): (u32, u32) in range(u32:0, u32:4) {
    acc + a[i]
  }(u32:0)
}
"#,
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Procs
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_can_handle_procs_typechecks() {
    assert_ok(CAN_HANDLE_PROCS);
}

#[test]
fn test_spawn_outside_config() {
    assert_error(
        r#"
proc p {
  config() { () }
  next(tok: token) { () }
}
fn f() -> () { spawn p()() }
"#,
        ErrorCode::SPAWN_OUTSIDE_CONFIG,
    );
}

#[test]
fn test_chan_outside_config() {
    assert_error(
        "fn f() -> () { let (p, c) = chan u32; () }",
        ErrorCode::SPAWN_OUTSIDE_CONFIG,
    );
}

#[test]
fn test_config_arity_mismatch() {
    assert_error(
        r#"
proc p {
  a: u32;
  b: u32;
  config() { (u32:1,) }
  next(tok: token) { () }
}
"#,
        ErrorCode::MALFORMED_PROC,
    );
}

#[test]
fn test_next_requires_token() {
    assert_error(
        r#"
proc p {
  config() { () }
  next(x: u32) { () }
}
"#,
        ErrorCode::MALFORMED_PROC,
    );
}

#[test]
fn test_send_on_input_channel_rejected() {
    assert_error(
        r#"
proc p {
  c: chan in u32;
  config(c: chan in u32) { (c,) }
  next(tok: token) {
    let tok = send(tok, c, u32:1);
    ()
  }
}
"#,
        ErrorCode::TYPE_MISMATCH,
    );
}

#[test]
fn test_short_spawn_is_accepted() {
    assert_ok(
        r#"
proc child {
  c: chan in u32;
  config(c: chan in u32) { (c,) }
  next(tok: token) { () }
}

#![test_proc()]
proc main {
  terminator: chan out bool;
  config(terminator: chan out bool) {
    spawn child()();
    (terminator,)
  }
  next(tok: token) {
    let tok = send(tok, terminator, true);
    ()
  }
}
"#,
    );
}

#[test]
fn test_let_types_are_recorded() {
    let checked = parse_and_typecheck(
        "fn f(x: u32) -> u32 { let y = x * x; y }",
        "test.x",
        "test",
    )
    .expect("typechecks");
    let m = &checked.module;
    let Some(ModuleItem::Function(f)) = m.items.first().copied() else {
        panic!("function item");
    };
    let ExprKind::Block(block) = &m.expr(m.function(f).body).kind else {
        panic!("block");
    };
    let Stmt::Let { value, .. } = &block.stmts[0] else {
        panic!("let");
    };
    assert_eq!(checked.type_info.expr_type(*value), Some(&Type::u32()));
}
