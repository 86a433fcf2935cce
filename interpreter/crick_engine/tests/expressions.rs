//! Expression evaluation through the public engine API.

use crick_engine::Engine;

fn run(src: &str) -> Engine {
    let mut engine = Engine::default();
    engine.run("test.c", src).unwrap();
    engine
}

fn eval_int(src: &str, var: &str) -> i64 {
    run(src).global_int(var).unwrap()
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    assert_eq!(eval_int("int x = 2; x = x + 3 * 4;", "x"), 14);
}

#[test]
fn parentheses_override_precedence() {
    assert_eq!(eval_int("int x = (2 + 3) * 4;", "x"), 20);
    assert_eq!(eval_int("int x = 2 * ((1 + 2) * (3 + 4));", "x"), 42);
}

#[test]
fn left_associative_operators_evaluate_left_to_right() {
    assert_eq!(eval_int("int r = 20 - 5 - 3;", "r"), 12);
    assert_eq!(eval_int("int r = 100 / 5 / 2;", "r"), 10);
    assert_eq!(eval_int("int r = 17 % 7 % 2;", "r"), 1);
}

#[test]
fn assignment_chains_right_to_left() {
    let mut engine = run("int a; int b; int c; a = b = c = 7;");
    assert_eq!(engine.global_int("a"), Some(7));
    assert_eq!(engine.global_int("b"), Some(7));
    assert_eq!(engine.global_int("c"), Some(7));
}

#[test]
fn logical_and_runs_its_right_side_when_left_is_true() {
    assert_eq!(eval_int("int n = 0; (n = 5) && (n = 10);", "n"), 10);
}

#[test]
fn short_circuit_skips_function_calls() {
    let mut engine = run(
        "int calls = 0;\n\
         int f() { calls = calls + 1; return 1; }\n\
         int a = 0 && f();\n\
         int b = 1 || f();\n\
         int c = 1 && f();\n",
    );
    assert_eq!(engine.global_int("calls"), Some(1), "only the third call runs");
    assert_eq!(engine.global_int("a"), Some(0));
    assert_eq!(engine.global_int("b"), Some(1));
    assert_eq!(engine.global_int("c"), Some(1));
}

#[test]
fn short_circuit_skips_assignments_on_the_right() {
    let mut engine = run("int n = 1; int r = 0 && (n = 99);");
    assert_eq!(engine.global_int("n"), Some(1));
    assert_eq!(engine.global_int("r"), Some(0));
}

#[test]
fn ternary_selects_by_condition() {
    assert_eq!(eval_int("int t = 1 ? 10 : 20;", "t"), 10);
    assert_eq!(eval_int("int t = 0 ? 10 : 20;", "t"), 20);
    assert_eq!(eval_int("int t = 1 ? 0 ? 3 : 4 : 5;", "t"), 4);
    assert_eq!(eval_int("int t = 0 ? 3 : 0 ? 4 : 5;", "t"), 5);
}

#[test]
fn unary_operators() {
    assert_eq!(eval_int("int m = - -5;", "m"), 5);
    assert_eq!(eval_int("int m = !0;", "m"), 1);
    assert_eq!(eval_int("int m = !3;", "m"), 0);
    assert_eq!(eval_int("int m = ~0;", "m"), -1);
    assert_eq!(eval_int("int m = -(1 + 2);", "m"), -3);
}

#[test]
fn increment_decrement_prefix_versus_postfix() {
    let mut engine = run(
        "int i = 5;\n\
         int pre = ++i;\n\
         int post = i++;\n\
         int after = i;\n\
         int down = --i;\n",
    );
    assert_eq!(engine.global_int("pre"), Some(6));
    assert_eq!(engine.global_int("post"), Some(6));
    assert_eq!(engine.global_int("after"), Some(7));
    assert_eq!(engine.global_int("down"), Some(6));
}

#[test]
fn compound_assignment_operators() {
    let mut engine = run(
        "int k = 10;\n\
         k += 5;\n\
         k <<= 1;\n\
         k %= 7;\n\
         int j = 0xf0;\n\
         j &= 0x3c;\n\
         j |= 1;\n\
         j ^= 0x10;\n",
    );
    assert_eq!(engine.global_int("k"), Some(2));
    assert_eq!(engine.global_int("j"), Some(0x21));
}

#[test]
fn comparisons_and_shifts() {
    assert_eq!(eval_int("int r = (3 < 5) + (5 <= 5) + (6 > 7) + (7 >= 8);", "r"), 2);
    assert_eq!(eval_int("int r = (1 == 1) + (1 != 1);", "r"), 1);
    assert_eq!(eval_int("int r = 1 << 4;", "r"), 16);
    assert_eq!(eval_int("int r = -16 >> 2;", "r"), -4, "arithmetic shift for signed");
    assert_eq!(
        eval_int("unsigned int u = 0x80000000; unsigned int r = u >> 4;", "r"),
        0x08000000,
        "logical shift for unsigned"
    );
}

#[test]
fn floating_point_arithmetic_promotes_mixed_operands() {
    let mut engine = run(
        "double d = 1.5 + 2 * 0.25;\n\
         double e = 7 / 2.0;\n\
         int cmp = 1.5 < 2;\n\
         int trunc = 3.9;\n",
    );
    assert_eq!(engine.global_fp("d"), Some(2.0));
    assert_eq!(engine.global_fp("e"), Some(3.5));
    assert_eq!(engine.global_int("cmp"), Some(1));
    assert_eq!(engine.global_int("trunc"), Some(3));
}

#[test]
fn casts_convert_between_domains() {
    let mut engine = run(
        "int ci = (int)3.7;\n\
         double cd = (double)3;\n\
         char cc = (char)300;\n\
         int back = cc;\n",
    );
    assert_eq!(engine.global_int("ci"), Some(3));
    assert_eq!(engine.global_fp("cd"), Some(3.0));
    assert_eq!(engine.global_int("back"), Some(44));
}

#[test]
fn narrowing_assignment_truncates_to_the_destination_width() {
    let mut engine = run(
        "char c = 200;\n\
         int r = c;\n\
         unsigned char uc = 200;\n\
         int r2 = uc;\n\
         short s = 70000;\n\
         int r3 = s;\n",
    );
    assert_eq!(engine.global_int("r"), Some(-56), "signed char wraps");
    assert_eq!(engine.global_int("r2"), Some(200));
    assert_eq!(engine.global_int("r3"), Some(4464));
}

#[test]
fn sizeof_of_types_and_values() {
    let mut engine = run(
        "int s1 = sizeof(int);\n\
         int s2 = sizeof(double);\n\
         int s3 = sizeof(char);\n\
         int a[4];\n\
         int s4 = sizeof(a);\n\
         int s5 = sizeof(int*);\n",
    );
    assert_eq!(engine.global_int("s1"), Some(4));
    assert_eq!(engine.global_int("s2"), Some(8));
    assert_eq!(engine.global_int("s3"), Some(1));
    assert_eq!(engine.global_int("s4"), Some(16));
    assert_eq!(engine.global_int("s5"), Some(8));
}

#[test]
fn division_by_zero_is_a_clean_error() {
    let mut engine = Engine::default();
    let err = engine.run("test.c", "int x = 1 / 0;").unwrap_err();
    assert!(err.to_string().contains("division by zero"), "{}", err);
}

#[test]
fn assigning_to_a_temporary_is_rejected() {
    let mut engine = Engine::default();
    let err = engine.run("test.c", "int x = 5; x + 1 = 3;").unwrap_err();
    assert!(err.to_string().contains("can't assign"), "{}", err);
}

#[test]
fn evaluation_leaves_the_arena_balanced() {
    let mut engine = Engine::default();
    let depth = engine.stack_depth();
    engine
        .run(
            "test.c",
            "int x; x = 1 + 2 * 3; x = x ? x + 1 : x - 1; int y = -x;",
        )
        .unwrap();
    assert_eq!(engine.stack_depth(), depth, "no temporaries leaked");

    // and again after an error recovery
    assert!(engine.run("test.c", "int z = 1 / 0;").is_err());
    assert_eq!(engine.stack_depth(), depth);
}
