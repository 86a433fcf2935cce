//! Control flow, functions, statics, macros, typedefs and enums.

use crick_engine::Engine;

fn run(src: &str) -> Engine {
    let mut engine = Engine::default();
    engine.run("test.c", src).unwrap();
    engine
}

#[test]
fn if_else_picks_a_branch() {
    let mut engine = run(
        "int a; int b;\n\
         if (1) a = 1; else a = 2;\n\
         if (0) b = 1; else b = 2;\n",
    );
    assert_eq!(engine.global_int("a"), Some(1));
    assert_eq!(engine.global_int("b"), Some(2));
}

#[test]
fn while_loop_accumulates() {
    let mut engine = run(
        "int sum = 0; int i = 1;\n\
         while (i <= 5) { sum = sum + i; i = i + 1; }\n",
    );
    assert_eq!(engine.global_int("sum"), Some(15));
}

#[test]
fn do_while_runs_at_least_once() {
    let mut engine = run("int n = 0; do { n = n + 1; } while (0);");
    assert_eq!(engine.global_int("n"), Some(1));
}

#[test]
fn for_loop_with_increment() {
    let mut engine = run(
        "int total = 0; int i;\n\
         for (i = 0; i < 5; i++) total = total + i;\n",
    );
    assert_eq!(engine.global_int("total"), Some(10));
}

#[test]
fn break_and_continue() {
    let mut engine = run(
        "int n = 0; int i = 0;\n\
         while (1) {\n\
             i = i + 1;\n\
             if (i > 10) break;\n\
             if (i % 2) continue;\n\
             n = n + i;\n\
         }\n",
    );
    assert_eq!(engine.global_int("n"), Some(30), "2+4+6+8+10");
}

#[test]
fn switch_case_break_and_default() {
    let mut engine = run(
        "int pick = 2; int s = 0;\n\
         switch (pick) {\n\
             case 1: s = 10; break;\n\
             case 2: s = 20; break;\n\
             default: s = 30;\n\
         }\n",
    );
    assert_eq!(engine.global_int("s"), Some(20));

    let mut engine = run(
        "int s = 0;\n\
         switch (9) { case 1: s = 10; break; default: s = 30; }\n",
    );
    assert_eq!(engine.global_int("s"), Some(30));
}

#[test]
fn switch_cases_fall_through_without_break() {
    let mut engine = run(
        "int s = 0;\n\
         switch (1) { case 1: s = s + 1; case 2: s = s + 2; }\n",
    );
    assert_eq!(engine.global_int("s"), Some(3));
}

#[test]
fn goto_scans_forward_to_its_label() {
    let mut engine = run(
        "int g = 0;\n\
         int f() { g = 1; goto done; g = 2; done: g = g + 10; return g; }\n\
         int r = f();\n",
    );
    assert_eq!(engine.global_int("r"), Some(11));
}

#[test]
fn missing_goto_label_is_an_error() {
    let mut engine = Engine::default();
    let err = engine
        .run(
            "test.c",
            "int f() { goto nowhere; return 1; }\nint r = f();\n",
        )
        .unwrap_err();
    assert!(err.to_string().contains("nowhere"), "{}", err);
}

#[test]
fn functions_recurse() {
    let mut engine = run(
        "int fact(int n) { if (n <= 1) return 1; return n * fact(n - 1); }\n\
         int r = fact(5);\n",
    );
    assert_eq!(engine.global_int("r"), Some(120));
}

#[test]
fn a_prototype_may_be_defined_later() {
    let mut engine = run(
        "int twice(int n);\n\
         int r;\n\
         int twice(int n) { return n * 2; }\n\
         r = twice(21);\n",
    );
    assert_eq!(engine.global_int("r"), Some(42));
}

#[test]
fn argument_counts_are_checked() {
    let mut engine = Engine::default();
    let err = engine
        .run(
            "test.c",
            "int add(int a, int b) { return a + b; }\nint r = add(1);\n",
        )
        .unwrap_err();
    assert!(err.to_string().contains("not enough arguments"), "{}", err);

    let mut engine = Engine::default();
    let err = engine
        .run(
            "test.c",
            "int add(int a, int b) { return a + b; }\nint r = add(1, 2, 3);\n",
        )
        .unwrap_err();
    assert!(err.to_string().contains("too many arguments"), "{}", err);
}

#[test]
fn falling_off_a_non_void_function_is_an_error() {
    let mut engine = Engine::default();
    let err = engine
        .run("test.c", "int f() { int x = 1; }\nint r = f();\n")
        .unwrap_err();
    assert!(err.to_string().contains("no value returned"), "{}", err);
}

#[test]
fn void_functions_return_without_a_value() {
    let mut engine = run(
        "int g = 0;\n\
         void bump() { g = g + 1; return; }\n\
         bump();\n\
         bump();\n",
    );
    assert_eq!(engine.global_int("g"), Some(2));
}

#[test]
fn locals_shadow_and_do_not_leak() {
    let mut engine = run(
        "int x = 1;\n\
         int f() { int x = 50; return x; }\n\
         int inner = f();\n\
         int outer = x;\n",
    );
    assert_eq!(engine.global_int("inner"), Some(50));
    assert_eq!(engine.global_int("outer"), Some(1));
}

#[test]
fn static_locals_persist_across_calls() {
    let mut engine = run(
        "int counter() { static int count = 0; count = count + 1; return count; }\n\
         int a = counter();\n\
         int b = counter();\n\
         int c = counter();\n",
    );
    assert_eq!(engine.global_int("a"), Some(1));
    assert_eq!(engine.global_int("b"), Some(2));
    assert_eq!(engine.global_int("c"), Some(3));
}

#[test]
fn object_and_function_macros_expand() {
    let mut engine = run(
        "#define TEN 10\n\
         #define SQR(x) (x) * (x)\n\
         int t = TEN + 1;\n\
         int m = SQR(3);\n\
         int n = SQR(TEN);\n",
    );
    assert_eq!(engine.global_int("t"), Some(11));
    assert_eq!(engine.global_int("m"), Some(9));
    assert_eq!(engine.global_int("n"), Some(100));
}

#[test]
fn typedef_introduces_a_type_name() {
    let mut engine = run(
        "typedef int myint;\n\
         myint v = 3;\n\
         int s = sizeof(myint);\n\
         int r = v * 2;\n",
    );
    assert_eq!(engine.global_int("s"), Some(4));
    assert_eq!(engine.global_int("r"), Some(6));
}

#[test]
fn enums_define_integer_constants() {
    let mut engine = run(
        "enum Color { RED, GREEN = 5, BLUE };\n\
         int r = RED;\n\
         int g = GREEN;\n\
         int b = BLUE;\n",
    );
    assert_eq!(engine.global_int("r"), Some(0));
    assert_eq!(engine.global_int("g"), Some(5));
    assert_eq!(engine.global_int("b"), Some(6));
}

#[test]
fn delete_removes_a_global_definition() {
    let mut engine = run("int x = 5;\ndelete x;\n");
    assert!(engine.lookup_global("x").is_none());
}

#[test]
fn top_level_return_sets_the_exit_value() {
    let mut engine = Engine::default();
    engine.run("test.c", "int x = 1; return 7;").unwrap();
    assert_eq!(engine.exit_value, Some(7));
}

#[test]
fn main_runs_after_the_top_level() {
    let mut engine = Engine::default();
    engine
        .run(
            "test.c",
            "int base = 40;\nint main() { return base + 2; }\n",
        )
        .unwrap();
    assert_eq!(engine.call_main().unwrap(), Some(42));
}

#[test]
fn unknown_identifiers_are_reported_with_their_name() {
    let mut engine = Engine::default();
    let err = engine.run("test.c", "int x = nonsense + 1;").unwrap_err();
    assert!(err.to_string().contains("'nonsense' is undefined"), "{}", err);
}

#[test]
fn definitions_persist_across_run_calls() {
    let mut engine = Engine::default();
    engine
        .run("first.c", "int shared = 10; int twice(int n) { return n * 2; }")
        .unwrap();
    engine.run("second.c", "int r = twice(shared);").unwrap();
    assert_eq!(engine.global_int("r"), Some(20));
}
