//! Pointers, arrays and string handling.

use crick_engine::Engine;

fn run(src: &str) -> Engine {
    let mut engine = Engine::default();
    engine.run("test.c", src).unwrap();
    engine
}

#[test]
fn null_pointer_compares_and_traps() {
    let mut engine = run("int *p = 0; int isnull = p == 0; int notnull = p != 0;");
    assert_eq!(engine.global_int("isnull"), Some(1));
    assert_eq!(engine.global_int("notnull"), Some(0));

    let mut engine = Engine::default();
    let err = engine.run("test.c", "int *p = 0; int x = *p;").unwrap_err();
    assert!(err.to_string().contains("NULL"), "{}", err);
}

#[test]
fn address_of_and_dereference_round_trip() {
    let mut engine = run(
        "int x = 42;\n\
         int *p = &x;\n\
         int y = *p;\n\
         *p = 7;\n\
         int z = x;\n\
         int same = *(&x) == x;\n",
    );
    assert_eq!(engine.global_int("y"), Some(42));
    assert_eq!(engine.global_int("z"), Some(7));
    assert_eq!(engine.global_int("same"), Some(1));
}

#[test]
fn pointer_arithmetic_scales_by_element_size() {
    let mut engine = run(
        "int a[4];\n\
         a[0] = 10; a[1] = 20; a[2] = 30; a[3] = 40;\n\
         int *q = &a[1];\n\
         q = q + 2;\n\
         int v = *q;\n\
         q = q - 1;\n\
         int w = *q;\n\
         int d = q - &a[0];\n",
    );
    assert_eq!(engine.global_int("v"), Some(40));
    assert_eq!(engine.global_int("w"), Some(30));
    assert_eq!(engine.global_int("d"), Some(2), "difference in elements, not bytes");
}

#[test]
fn pointer_increment_and_compound_assignment() {
    let mut engine = run(
        "int a[3];\n\
         a[0] = 1; a[1] = 2; a[2] = 3;\n\
         int *p = &a[0];\n\
         p++;\n\
         int second = *p;\n\
         p += 1;\n\
         int third = *p;\n",
    );
    assert_eq!(engine.global_int("second"), Some(2));
    assert_eq!(engine.global_int("third"), Some(3));
}

#[test]
fn indexing_works_through_pointers_too() {
    let mut engine = run(
        "int a[3];\n\
         a[0] = 5; a[1] = 6; a[2] = 7;\n\
         int *p = a;\n\
         int r = p[2];\n",
    );
    assert_eq!(engine.global_int("r"), Some(7));
}

#[test]
fn unsized_array_adopts_initializer_length() {
    let mut engine = run(
        "int a[] = {1, 2, 3, 4};\n\
         int third = a[2];\n\
         int size = sizeof(a);\n",
    );
    assert_eq!(engine.global_int("third"), Some(3));
    assert_eq!(engine.global_int("size"), Some(16));
}

#[test]
fn char_array_from_string_literal() {
    let mut engine = run(
        "char s[] = \"hello\";\n\
         int size = sizeof(s);\n\
         int e = s[1];\n",
    );
    assert_eq!(engine.global_int("size"), Some(6), "strlen + nul");
    assert_eq!(engine.global_int("e"), Some('e' as i64));
}

#[test]
fn char_pointer_into_a_string_literal() {
    let mut engine = run("char *msg = \"hi there\";");
    assert_eq!(engine.global_cstr("msg").as_deref(), Some("hi there"));
}

#[test]
fn two_dimensional_initializers_flat_and_nested() {
    let mut engine = run(
        "int m[2][2] = {1, 2, 3, 4};\n\
         int n[2][2] = { {5, 6}, {7, 8} };\n\
         int a = m[1][0];\n\
         int b = n[0][1];\n\
         int c = n[1][1];\n",
    );
    assert_eq!(engine.global_int("a"), Some(3));
    assert_eq!(engine.global_int("b"), Some(6));
    assert_eq!(engine.global_int("c"), Some(8));
}

#[test]
fn too_many_initializer_elements_fail() {
    let mut engine = Engine::default();
    let err = engine
        .run("test.c", "int a[2] = {1, 2, 3};")
        .unwrap_err();
    assert!(err.to_string().contains("too many array elements"), "{}", err);
}

#[test]
fn subscripting_a_non_array_fails() {
    let mut engine = Engine::default();
    let err = engine.run("test.c", "int x = 5; int y = x[0];").unwrap_err();
    assert!(err.to_string().contains("not an array"), "{}", err);
}
