//! Integration tests for the DSLX interpreter: functions, failures with
//! backtraces, parametric instantiation, proc networks and the test runner.

use dslx_interp::{
    run_tests, Elaboration, FailureKind, FlowControl, Interpreter, InterpreterOptions, ProcId,
    Value,
};
use dslx_typecheck::parse_and_typecheck;
use dslx_types::Span;
use pretty_assertions::assert_eq;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn interp(source: &str) -> Interpreter {
    match Interpreter::from_source(source, "test.x", "test") {
        Ok(i) => i,
        Err(errors) => panic!("unexpected compile errors:\n{errors}"),
    }
}

fn interp_with(source: &str, options: InterpreterOptions) -> Interpreter {
    match parse_and_typecheck(source, "test.x", "test") {
        Ok(typed) => Interpreter::with_options(typed, options),
        Err(errors) => panic!("unexpected compile errors:\n{errors}"),
    }
}

fn run(source: &str, function: &str, args: Vec<Value>) -> Value {
    let mut i = interp(source);
    match i.run_function(function, args) {
        Ok(v) => v,
        Err(failure) => panic!("unexpected failure:\n{failure}"),
    }
}

const FAILURE_BACKTRACE: &str = r#"
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
"#;

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

const ECHO: &str = r#"
proc echo {
  input: chan in u32;
  output: chan out u32;

  config(input: chan in u32, output: chan out u32) {
    (input, output)
  }

  next(tok: token) {
    let (tok, v) = recv(tok, input);
    let tok = send(tok, output, v + u32:1);
    ()
  }
}
"#;

fn echo_network(root_next: &str) -> String {
    format!(
        r#"{ECHO}
#![test_proc()]
proc main {{
  terminator: chan out bool;
  to_a: chan out u32;
  from_a: chan in u32;
  to_b: chan out u32;
  from_b: chan in u32;

  config(terminator: chan out bool) {{
    let (to_a, a_in) = chan u32;
    let (a_out, from_a) = chan u32;
    spawn echo(a_in, a_out)();
    let (to_b, b_in) = chan u32;
    let (b_out, from_b) = chan u32;
    spawn echo(b_in, b_out)();
    (terminator, to_a, from_a, to_b, from_b)
  }}

  next(tok: token) {{
{root_next}
  }}
}}
"#
    )
}

// ══════════════════════════════════════════════════════════════════════════════
// Functions
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_token_identity() {
    let result = run("fn id(t: token) -> token { t }", "id", vec![Value::Token]);
    assert_eq!(result, Value::Token);
    assert_eq!(result.to_string(), Value::Token.to_string());
}

#[test]
fn test_arithmetic_wraps_to_width() {
    let result = run(
        "fn f(x: u8, y: u8) -> u8 { x + y }",
        "f",
        vec![Value::ubits(8, 200), Value::ubits(8, 100)],
    );
    assert_eq!(result, Value::ubits(8, 44));
}

#[test]
fn test_division_by_zero_does_not_trap() {
    let result = run(
        "fn f(x: u8, y: s8) -> (u8, u8, s8, s8) { (x / u8:0, x % u8:0, y / s8:0, -y / s8:0) }",
        "f",
        vec![Value::ubits(8, 9), Value::sbits(8, 3)],
    );
    assert_eq!(
        result,
        Value::Tuple(vec![
            Value::ubits(8, 255),
            Value::ubits(8, 0),
            Value::sbits(8, 127),
            Value::sbits(8, -128),
        ])
    );
}

#[test]
fn test_for_loop_accumulates() {
    let source = r#"
fn sum(a: u32[4]) -> u32 {
  for (i, acc): (u32, u32) in range(u32:0, u32:4) {
    acc + a[i]
  }(u32:0)
}
"#;
    let array = Value::Array((1..=4).map(Value::u32).collect());
    assert_eq!(run(source, "sum", vec![array]), Value::u32(10));
}

#[test]
fn test_enum_match_and_struct_fields() {
    let source = r#"
enum Op : u2 { Add = 0, Sub = 1 }
struct Pair { a: u8, b: u8 }

fn apply(op: Op, p: Pair) -> u8 {
  match op {
    Op::Add => p.a + p.b,
    Op::Sub => p.a - p.b,
    _ => u8:0,
  }
}

fn top() -> u8[2] {
  let p = Pair { a: u8:5, b: u8:3 };
  [apply(Op::Add, p), apply(Op::Sub, p)]
}
"#;
    assert_eq!(
        run(source, "top", Vec::new()),
        Value::Array(vec![Value::ubits(8, 8), Value::ubits(8, 2)])
    );
}

#[test]
fn test_value_rendering() {
    let result = run(
        "fn f() -> (u8, s4, u32[2]) { (u8:7, s4:-1, [u32:1, u32:2]) }",
        "f",
        Vec::new(),
    );
    assert_eq!(result.to_string(), "(u8:7, s4:-1, [u32:1, u32:2])");
}

#[test]
fn test_unknown_function_is_internal_failure() {
    let mut i = interp("fn f() -> u32 { u32:1 }");
    let failure = i.run_function("g", Vec::new()).expect_err("no such function");
    assert_eq!(failure.kind, FailureKind::Internal);
    assert!(failure.message.contains("'g'"), "{failure}");
}

#[test]
fn test_enum_equality_is_by_value() {
    let source = r#"
enum E : u2 { A = 0, B = 0, C = 1 }

fn pick(e: E) -> u8 {
  match e {
    E::B => u8:1,
    _ => u8:2,
  }
}

fn top() -> (bool, u8, u8) {
  (E::B == (u2:0 as E), pick(u2:0 as E), pick(E::C))
}
"#;
    assert_eq!(
        run(source, "top", Vec::new()),
        Value::Tuple(vec![Value::bool(true), Value::ubits(8, 1), Value::ubits(8, 2)])
    );
}

#[test]
fn test_bit_query_builtins() {
    let source = r#"
fn query(x: u8) -> (u8, u8, u8, bool, bool, bool) {
  (clz(x), ctz(x), rev(x), and_reduce(x), or_reduce(x), xor_reduce(x))
}
"#;
    assert_eq!(
        run(source, "query", vec![Value::ubits(8, 0b0001_0100)]),
        Value::Tuple(vec![
            Value::ubits(8, 3),
            Value::ubits(8, 2),
            Value::ubits(8, 0b0010_1000),
            Value::bool(false),
            Value::bool(true),
            Value::bool(false),
        ])
    );
}

#[test]
fn test_bit_slices() {
    let source = r#"
fn slices(x: u8) -> (u4, u2, u3, u4, s4) {
  (x[4:], x[1:3], x[-3:], x[2 +: u4], x[0 +: s4])
}
"#;
    assert_eq!(
        run(source, "slices", vec![Value::ubits(8, 0b1011_0110)]),
        Value::Tuple(vec![
            Value::ubits(4, 0b1011),
            Value::ubits(2, 0b11),
            Value::ubits(3, 0b101),
            Value::ubits(4, 0b1101),
            Value::sbits(4, 6),
        ])
    );
}

#[test]
fn test_sign_extension_and_slice_update() {
    let source = r#"
fn widen(x: u8, y: u4) -> (s16, u8, u8) {
  (signex(x, s16:0), signex(y, u8:0), bit_slice_update(u8:0, u32:2, u3:7))
}
"#;
    assert_eq!(
        run(source, "widen", vec![Value::ubits(8, 0x80), Value::ubits(4, 0b1010)]),
        Value::Tuple(vec![
            Value::sbits(16, -128),
            Value::ubits(8, 0xfa),
            Value::ubits(8, 0b0001_1100),
        ])
    );
}

#[test]
fn test_shifts_and_casts() {
    let source = r#"
fn convert(x: s8, y: u8) -> (s8, u8, s8, s16, u16, u4) {
  (x >> u8:2, y << u8:3, x >> u8:100, x as s16, x as u16, y as u4)
}
"#;
    assert_eq!(
        run(source, "convert", vec![Value::sbits(8, -16), Value::ubits(8, 0x81)]),
        Value::Tuple(vec![
            Value::sbits(8, -4),
            Value::ubits(8, 0x08),
            Value::sbits(8, -1),
            Value::sbits(16, -16),
            Value::ubits(16, 0xfff0),
            Value::ubits(4, 1),
        ])
    );
}

#[test]
fn test_array_builtins() {
    let source = r#"
fn double(x: u8) -> u8 { x + x }

fn arrays(a: u8[3]) -> (u8[3], u8[3], u32, u8[3]) {
  (update(a, u32:1, u8:9), update(a, u32:7, u8:9), array_size(a), map(a, double))
}
"#;
    let bytes = |vs: [u128; 3]| Value::Array(vs.iter().map(|v| Value::ubits(8, *v)).collect());
    assert_eq!(
        run(source, "arrays", vec![bytes([1, 2, 3])]),
        Value::Tuple(vec![
            bytes([1, 9, 3]),
            bytes([1, 2, 3]),
            Value::u32(3),
            bytes([2, 4, 6]),
        ])
    );
}

#[test]
fn test_struct_update_keeps_base_fields() {
    let source = r#"
struct Point { x: u8, y: u8 }

fn flatten(p: Point) -> Point { Point { y: u8:0, ..p } }
"#;
    let point = |x, y| Value::Struct {
        name: "Point".into(),
        fields: vec![
            ("x".to_string(), Value::ubits(8, x)),
            ("y".to_string(), Value::ubits(8, y)),
        ],
    };
    assert_eq!(run(source, "flatten", vec![point(3, 4)]), point(3, 0));
}

#[test]
fn test_assert_lt() {
    let source = r#"
fn bounded(x: u32) { assert_lt(x, u32:10) }
"#;
    let mut i = interp(source);
    assert_eq!(i.run_function("bounded", vec![Value::u32(3)]), Ok(Value::unit()));
    let failure = i
        .run_function("bounded", vec![Value::u32(12)])
        .expect_err("12 is not below 10");
    assert_eq!(failure.kind, FailureKind::Assertion);
    assert_eq!(failure.message, "assert_lt failed: u32:12 is not less than u32:10");
}

// ══════════════════════════════════════════════════════════════════════════════
// Failures and backtraces
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_failure_backtrace() {
    let mut i = interp(FAILURE_BACKTRACE);
    let failure = i
        .run_function("top", vec![Value::u32(7)])
        .expect_err("assertion must fail");
    assert_eq!(failure.kind, FailureKind::Assertion);
    assert_eq!(failure.message, "assert_eq failed: u32:65 != u32:1024");
    assert_eq!(failure.span, Span::new(4, 11, 4, 33));

    let rendered = failure.to_string();
    assert!(rendered.contains("via test::failer @ test.x:4:20-4:33"), "{rendered}");
    assert!(rendered.contains("via test::interposer @ test.x:12:14-12:17"), "{rendered}");
    assert!(rendered.contains("via test::top @ test.x:17:13-17:19"), "{rendered}");

    let frames: Vec<&str> = failure
        .backtrace
        .iter()
        .map(|f| f.qualified_name.as_str())
        .collect();
    assert_eq!(frames, vec!["test::failer", "test::interposer", "test::top"]);
}

#[test]
fn test_backtrace_message_tracks_input() {
    // x = 30: y = 900, z = 31 + 901 = 932, failer sees 939.
    let mut i = interp(FAILURE_BACKTRACE);
    let failure = i.run_function("top", vec![Value::u32(30)]).expect_err("still fails");
    assert_eq!(failure.message, "assert_eq failed: u32:939 != u32:1024");
}

#[test]
fn test_fail_macro_reports_message() {
    let source = r#"
fn check(x: u32) -> u32 {
  if x > u32:10 { fail!("too big: {}", x) } else { x }
}
"#;
    let mut i = interp(source);
    assert_eq!(i.run_function("check", vec![Value::u32(3)]), Ok(Value::u32(3)));
    let failure = i
        .run_function("check", vec![Value::u32(11)])
        .expect_err("fail! reached");
    assert_eq!(failure.kind, FailureKind::Assertion);
    assert_eq!(failure.message, "too big: 11");
    assert_eq!(failure.backtrace.len(), 1);
    assert_eq!(failure.backtrace[0].qualified_name, "test::check");
}

#[test]
fn test_wide_bits_are_unsupported() {
    let source = r#"
fn widen(x: u8) -> u8 { (x as u200)[0:8] }
fn join_wide(a: u100, b: u100) -> u8 { (a ++ b)[0:8] }
"#;
    let mut i = interp(source);
    let failure = i
        .run_function("widen", vec![Value::ubits(8, 1)])
        .expect_err("u200 is too wide");
    assert_eq!(failure.kind, FailureKind::Unsupported);
    assert!(failure.message.contains("got 200"), "{failure}");

    let failure = i
        .run_function("join_wide", vec![Value::ubits(100, 1), Value::ubits(100, 2)])
        .expect_err("concatenation is too wide");
    assert_eq!(failure.kind, FailureKind::Unsupported);
    assert!(failure.message.contains("200 bits wide"), "{failure}");
}

#[test]
fn test_call_depth_limit() {
    let source = r#"
fn c(x: u32) -> u32 { x + u32:1 }
fn b(x: u32) -> u32 { c(x) }
fn a(x: u32) -> u32 { b(x) }
"#;
    let options = InterpreterOptions {
        max_call_depth: 2,
        ..InterpreterOptions::default()
    };
    let mut i = interp_with(source, options);
    let failure = i.run_function("a", vec![Value::u32(1)]).expect_err("three frames deep");
    assert_eq!(failure.kind, FailureKind::Internal);
    assert_eq!(failure.message, "call depth limit of 2 exceeded in 'c'");
    assert_eq!(failure.backtrace.len(), 2);

    let mut i = interp(source);
    assert_eq!(i.run_function("a", vec![Value::u32(1)]), Ok(Value::u32(2)));
}

// ══════════════════════════════════════════════════════════════════════════════
// Parametrics
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_parametric_instantiations_are_cached_per_binding() {
    let source = r#"
fn id<N: u32>(x: uN[N]) -> uN[N] { x }

fn top() -> u8 {
  let a = id(u8:1);
  let b = id(u8:2);
  let c = id(u16:3);
  a + b + (c as u8)
}
"#;
    let mut i = interp(source);
    assert_eq!(i.run_function("top", Vec::new()), Ok(Value::ubits(8, 6)));
    assert_eq!(i.cache_size(), 2);
    assert_eq!(i.run_function("top", Vec::new()), Ok(Value::ubits(8, 6)));
    assert_eq!(i.cache_size(), 2);
}

#[test]
fn test_parametric_calls_are_deterministic() {
    let source = r#"
fn sum_all<N: u32>(xs: u8[N]) -> u8 {
  for (i, acc): (u32, u8) in range(u32:0, N) {
    acc + xs[i]
  }(u8:0)
}
"#;
    let mut i = interp(source);
    let xs = Value::Array((1..=5).map(|v| Value::ubits(8, v)).collect());
    let first = i.run_function("sum_all", vec![xs.clone()]).expect("sums");
    assert_eq!(first, Value::ubits(8, 15));
    for _ in 0..100 {
        assert_eq!(i.run_function("sum_all", vec![xs.clone()]), Ok(first.clone()));
    }
    assert_eq!(i.cache_size(), 1);
}

#[test]
fn test_parametric_default_derives_width() {
    let source = r#"
fn double<N: u32, M: u32 = {N * u32:2}>(x: uN[N]) -> uN[M] { x ++ x }
fn top(x: u8) -> u16 { double(x) }
"#;
    assert_eq!(
        run(source, "top", vec![Value::ubits(8, 0xab)]),
        Value::ubits(16, 0xabab)
    );
}

#[test]
fn test_map_binds_parametrics_from_elements() {
    let source = r#"
fn id<N: u32>(x: uN[N]) -> uN[N] { x }
fn top(a: u8[2]) -> u8[2] { map(a, id) }
"#;
    let a = Value::Array(vec![Value::ubits(8, 5), Value::ubits(8, 6)]);
    let mut i = interp(source);
    assert_eq!(i.run_function("top", vec![a.clone()]), Ok(a));
    assert_eq!(i.cache_size(), 1);
}

// ══════════════════════════════════════════════════════════════════════════════
// Trace log
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_trace_log_captures_messages() {
    let source = r#"
fn f(x: u32) -> u32 {
  trace_fmt!("x is {}", x);
  x + u32:1
}
"#;
    let mut i = interp(source);
    assert_eq!(i.run_function("f", vec![Value::u32(5)]), Ok(Value::u32(6)));
    assert_eq!(i.trace_log(), ["x is 5".to_string()]);
    assert_eq!(i.take_trace_log(), vec!["x is 5".to_string()]);
    assert!(i.trace_log().is_empty());
}

#[test]
fn test_trace_disabled_logs_nothing() {
    let options = InterpreterOptions {
        trace_enabled: false,
        ..InterpreterOptions::default()
    };
    let mut i = interp_with(
        "fn f(x: u32) -> u32 { trace_fmt!(\"x is {}\", x); x }",
        options,
    );
    assert_eq!(i.run_function("f", vec![Value::u32(5)]), Ok(Value::u32(5)));
    assert!(i.trace_log().is_empty());
}

// ══════════════════════════════════════════════════════════════════════════════
// Elaboration
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_elaborate_nested_network() {
    let mut i = interp(CAN_HANDLE_PROCS);
    let elab = i
        .elaborate("first_level_proc", Vec::new(), Vec::new())
        .expect("elaborates");
    let ids: Vec<String> = elab.instances.iter().map(|p| p.id.to_string()).collect();
    assert_eq!(
        ids,
        vec![
            "first_level_proc#0",
            "first_level_proc#0->second_level_proc#0",
            "first_level_proc#0->second_level_proc#1",
        ]
    );
    assert_eq!(elab.channels.len(), 4);

    let second = ProcId::root("first_level_proc").child("second_level_proc", 1);
    assert_eq!(
        elab.instance(&second).map(|p| p.state.clone()),
        Some(vec![Value::ubits(64, 1001)])
    );
    assert_eq!(elab.member(&second, "member_1"), Some(&Value::ubits(64, 1)));

    let json = elab.to_json().expect("serializes");
    assert!(json.contains("first_level_proc#0->second_level_proc#1"), "{json}");
}

#[test]
fn test_missing_config_arguments_reported() {
    let mut i = interp(CAN_HANDLE_PROCS);
    let mut elab = Elaboration::new();
    let failure = i
        .elaborate_instance("second_level_proc", ProcId::root("second_level_proc"), &mut elab)
        .expect_err("no arguments were provided");
    assert_eq!(failure.kind, FailureKind::Internal);
    assert!(
        failure
            .message
            .contains("not found in the per-instance argument mapping"),
        "{failure}"
    );
}

#[test]
fn test_short_spawn_reports_missing_argument() {
    let source = r#"
proc child {
  c: chan in u32;
  config(c: chan in u32) { (c,) }
  next(tok: token) { () }
}

proc parent {
  config() {
    spawn child()();
    ()
  }
  next(tok: token) { () }
}
"#;
    let mut i = interp(source);
    let failure = i
        .elaborate("parent", Vec::new(), Vec::new())
        .expect_err("child is missing its channel");
    assert!(
        failure
            .message
            .contains("not found in the per-instance argument mapping"),
        "{failure}"
    );
    assert_eq!(failure.proc_instance.as_deref(), Some("parent#0->child#0"));
    assert_eq!(failure.backtrace.len(), 1);
    assert_eq!(failure.backtrace[0].qualified_name, "test::parent.config");
}

// ══════════════════════════════════════════════════════════════════════════════
// Scheduling
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_can_handle_procs() {
    let mut i = interp(CAN_HANDLE_PROCS);
    let summary = i.run_test_proc("test_proc").expect("terminates");
    assert_eq!(summary.rounds, 1);
}

#[test]
fn test_network_round_trip_terminates() {
    let source = echo_network(
        r#"
    let tok = send(tok, to_a, u32:1);
    let tok = send(tok, to_b, u32:10);
    let (tok, a) = recv(tok, from_a);
    let (tok, b) = recv(tok, from_b);
    let tok = send(tok, terminator, a + b == u32:13);
    ()"#,
    );
    let mut i = interp(&source);
    let summary = i.run_test_proc("main").expect("terminates");
    assert_eq!(summary.rounds, 2);
    let root = ProcId::root("main");
    assert_eq!(summary.ticks.get(&root), Some(&1));
    assert_eq!(summary.ticks.get(&root.child("echo", 0)), Some(&1));
    assert_eq!(summary.ticks.get(&root.child("echo", 1)), Some(&1));
}

#[test]
fn test_missing_send_deadlocks() {
    let source = echo_network(
        r#"
    let tok = send(tok, to_a, u32:1);
    let (tok, a) = recv(tok, from_a);
    let (tok, b) = recv(tok, from_b);
    let tok = send(tok, terminator, a + b == u32:13);
    ()"#,
    );
    let mut i = interp(&source);
    let failure = i.run_test_proc("main").expect_err("from_b never fills");
    assert_eq!(failure.kind, FailureKind::Deadlock);
    assert!(failure.message.contains("main#0 on channel"), "{failure}");
    assert!(failure.message.contains("main#0->echo#1 on channel"), "{failure}");
}

#[test]
fn test_terminator_false_is_assertion() {
    let source = echo_network(
        r#"
    let tok = send(tok, to_a, u32:1);
    let (tok, a) = recv(tok, from_a);
    let tok = send(tok, terminator, a == u32:7);
    ()"#,
    );
    let mut i = interp(&source);
    let failure = i.run_test_proc("main").expect_err("reply is 2, not 7");
    assert_eq!(failure.kind, FailureKind::Assertion);
    assert!(failure.message.contains("sent false"), "{failure}");
    assert_eq!(failure.proc_instance.as_deref(), Some("main#0"));
}

#[test]
fn test_blocked_tick_replays_sends_once() {
    let source = r#"
proc accumulator {
  input: chan in u32;
  output: chan out u32;

  config(input: chan in u32, output: chan out u32) {
    (input, output)
  }

  next(tok: token, sum: u32) {
    let (tok, v) = recv(tok, input);
    let sum = sum + v;
    let tok = send(tok, output, sum);
    (sum,)
  }
}

#![test_proc(u32:0)]
proc main {
  terminator: chan out bool;
  to_acc: chan out u32;
  from_acc: chan in u32;

  config(terminator: chan out bool) {
    let (to_acc, acc_in) = chan u32;
    let (acc_out, from_acc) = chan u32;
    spawn accumulator(acc_in, acc_out)(u32:0);
    (terminator, to_acc, from_acc)
  }

  next(tok: token, count: u32) {
    trace_fmt!("root tick {}", count);
    let tok = send(tok, to_acc, u32:5);
    let (tok, r) = recv(tok, from_acc);
    let _ = assert_eq(r, u32:5 * (count + u32:1));
    let tok = send_if(tok, terminator, count == u32:1, true);
    (count + u32:1,)
  }
}
"#;
    let mut i = interp(source);
    let summary = i.run_test_proc("main").expect("terminates");
    assert_eq!(summary.rounds, 4);
    let root = ProcId::root("main");
    assert_eq!(summary.ticks.get(&root), Some(&2));
    assert_eq!(summary.ticks.get(&root.child("accumulator", 0)), Some(&2));
    assert_eq!(
        i.trace_log(),
        ["root tick 0".to_string(), "root tick 1".to_string()]
    );
}

#[test]
fn test_round_limit() {
    let source = r#"
#![test_proc(u32:0)]
proc counter {
  terminator: chan out bool;
  config(terminator: chan out bool) { (terminator,) }
  next(tok: token, n: u32) { (n + u32:1,) }
}
"#;
    let options = InterpreterOptions {
        max_rounds: 10,
        ..InterpreterOptions::default()
    };
    let mut i = interp_with(source, options);
    let failure = i.run_test_proc("counter").expect_err("never terminates");
    assert_eq!(failure.kind, FailureKind::RoundLimit);
    assert!(failure.message.contains("within 10 round(s)"), "{failure}");
}

#[test]
fn test_failure_inside_next_names_instance() {
    let source = echo_network(
        r#"
    let tok = send(tok, to_a, u32:1);
    let (tok, a) = recv(tok, from_a);
    let _ = assert_eq(a, u32:3);
    let tok = send(tok, terminator, true);
    ()"#,
    );
    let mut i = interp(&source);
    let failure = i.run_test_proc("main").expect_err("reply is 2");
    assert_eq!(failure.kind, FailureKind::Assertion);
    assert_eq!(failure.message, "assert_eq failed: u32:2 != u32:3");
    assert_eq!(failure.proc_instance.as_deref(), Some("main#0"));
    assert_eq!(failure.backtrace[0].qualified_name, "test::main.next");
}

#[test]
fn test_missing_member_mapping_is_internal() {
    let source = echo_network(
        r#"
    let tok = send(tok, terminator, true);
    ()"#,
    );
    let mut i = interp(&source);
    let mut elab = i.elaborate_test_proc("main").expect("elaborates");
    let root = ProcId::root("main");
    assert!(elab.members.remove(&root).is_some());
    let failure = i.schedule(&mut elab).expect_err("root members are gone");
    assert_eq!(failure.kind, FailureKind::Internal);
    assert!(
        failure.message.contains("not found in the per-instance argument mapping"),
        "{failure}"
    );
    assert_eq!(failure.proc_instance.as_deref(), Some("main#0"));
}

#[test]
fn test_idle_network_hits_round_limit() {
    let source = r#"
#![test_proc(u32:0)]
proc idle {
  terminator: chan out bool;
  config(terminator: chan out bool) { (terminator,) }
  next(tok: token, n: u32) { (n,) }
}
"#;
    let options = InterpreterOptions {
        max_rounds: 5,
        ..InterpreterOptions::default()
    };
    let mut i = interp_with(source, options);
    let failure = i.run_test_proc("idle").expect_err("nothing ever happens");
    assert_eq!(failure.kind, FailureKind::RoundLimit);
}

const TWO_SENDS: &str = r#"
    let tok = send(tok, to_a, u32:1);
    let tok = send(tok, to_a, u32:2);
    let (tok, a) = recv(tok, from_a);
    let (tok, b) = recv(tok, from_a);
    let tok = send(tok, terminator, a + b == u32:5);
    ()"#;

#[test]
fn test_ready_valid_send_waits_for_receiver() {
    let source = echo_network(TWO_SENDS);
    // Channel 1 is `to_a`; channel 0 is the terminator.
    let sent_in_first_round = |flow_control| {
        let options = InterpreterOptions {
            max_rounds: 1,
            flow_control,
            ..InterpreterOptions::default()
        };
        let mut i = interp_with(&source, options);
        let mut elab = i.elaborate_test_proc("main").expect("elaborates");
        let failure = i.schedule(&mut elab).expect_err("one round is not enough");
        assert_eq!(failure.kind, FailureKind::RoundLimit);
        elab.channels.get(1).map(|c| c.sent)
    };
    assert_eq!(sent_in_first_round(FlowControl::None), Some(2));
    assert_eq!(sent_in_first_round(FlowControl::ReadyValid), Some(1));

    let options = InterpreterOptions {
        flow_control: FlowControl::ReadyValid,
        ..InterpreterOptions::default()
    };
    let mut i = interp_with(&source, options);
    let summary = i.run_test_proc("main").expect("terminates");
    assert_eq!(summary.rounds, 3);
    assert_eq!(summary.ticks.get(&ProcId::root("main").child("echo", 0)), Some(&2));
}

#[test]
fn test_conditional_and_non_blocking_receives() {
    let source = echo_network(
        r#"
    let tok = send(tok, to_a, u32:1);
    let (tok0, idle, idle_valid) = recv_non_blocking(tok, from_b, u32:77);
    let (tok1, a) = recv(tok, from_a);
    let (tok2, skipped) = recv_if(tok, from_b, false, u32:42);
    let tok = join(tok0, tok1, tok2);
    let ok = (a == u32:2) && (idle == u32:77) && (idle_valid == false) && (skipped == u32:42);
    let tok = send(tok, terminator, ok);
    ()"#,
    );
    let mut i = interp(&source);
    let summary = i.run_test_proc("main").expect("terminates");
    assert_eq!(summary.rounds, 2);
}

// ══════════════════════════════════════════════════════════════════════════════
// Test runner
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_run_tests_summary() {
    let source = format!(
        r#"
fn add(x: u32, y: u32) -> u32 {{ x + y }}

#[test]
fn add_works() {{ assert_eq(add(u32:1, u32:2), u32:3) }}

#[test]
fn add_broken() {{ assert_eq(add(u32:1, u32:2), u32:4) }}

{CAN_HANDLE_PROCS}
"#
    );
    let mut i = interp(&source);
    let summary = run_tests(&mut i);
    assert_eq!(summary.passed, 2);
    assert_eq!(summary.failed, 1);

    let names: Vec<&str> = summary.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["add_works", "add_broken", "test_proc"]);

    let rendered = summary.to_string();
    assert!(rendered.contains("  ✓ add_works"), "{rendered}");
    assert!(rendered.contains("  ✗ add_broken: "), "{rendered}");
    assert!(rendered.contains("assert_eq failed: u32:3 != u32:4"), "{rendered}");
    assert!(rendered.ends_with("2 passed, 1 failed\n"), "{rendered}");
}
