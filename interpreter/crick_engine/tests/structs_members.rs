//! Structs, unions, member functions, dot-this and scope resolution.

use crick_engine::Engine;

fn run(src: &str) -> Engine {
    let mut engine = Engine::default();
    engine.run("test.c", src).unwrap();
    engine
}

#[test]
fn struct_members_read_and_write() {
    let mut engine = run(
        "struct P { int a; int b; };\n\
         struct P p;\n\
         p.a = 7;\n\
         p.b = p.a + 1;\n\
         int r = p.b;\n",
    );
    assert_eq!(engine.global_int("r"), Some(8));
}

#[test]
fn struct_member_offsets_respect_alignment() {
    let mut engine = run(
        "struct Mixed { char c; int n; char d; };\n\
         int size = sizeof(struct Mixed);\n",
    );
    assert_eq!(engine.global_int("size"), Some(12));
}

#[test]
fn member_function_call_binds_the_receiver() {
    let mut engine = run(
        "struct F { int x; void set(int v) { x = v; } };\n\
         struct F f;\n\
         f.set(42);\n\
         int r = f.x;\n",
    );
    assert_eq!(engine.global_int("r"), Some(42));
}

#[test]
fn dot_this_writes_through_the_receiver() {
    let mut engine = run(
        "struct F { int y; void put(int v) { .y = v; } };\n\
         struct F f;\n\
         f.put(9);\n\
         int r = f.y;\n",
    );
    assert_eq!(engine.global_int("r"), Some(9));
}

#[test]
fn explicit_this_arrow_access() {
    let mut engine = run(
        "struct Acc { int total; void add(int d) { this->total = this->total + d; } };\n\
         struct Acc acc;\n\
         acc.total = 10;\n\
         acc.add(5);\n\
         acc.add(7);\n\
         int r = acc.total;\n",
    );
    assert_eq!(engine.global_int("r"), Some(22));
}

#[test]
fn member_function_results_compose_in_expressions() {
    let mut engine = run(
        "struct G { int x; int get() { return x; } };\n\
         struct G g;\n\
         g.x = 41;\n\
         int r = g.get() + 1;\n",
    );
    assert_eq!(engine.global_int("r"), Some(42));
}

#[test]
fn member_functions_mangle_into_the_global_table() {
    let mut engine = run(
        "struct S { int n; void m(int v) { n = v; } };\n",
    );
    assert!(engine.lookup_global("S.m").is_some(), "mangled name registered");
    assert!(engine.lookup_global("m").is_none(), "no bare name leaks");
}

#[test]
fn arrow_member_access_through_a_pointer() {
    let mut engine = run(
        "struct P { int a; int b; };\n\
         struct P p;\n\
         struct P *pp = &p;\n\
         pp->a = 5;\n\
         int r = pp->a + p.a;\n",
    );
    assert_eq!(engine.global_int("r"), Some(10));
}

#[test]
fn arrow_member_function_call() {
    let mut engine = run(
        "struct C { int n; void set(int v) { n = v; } };\n\
         struct C c;\n\
         struct C *pc = &c;\n\
         pc->set(5);\n\
         int r = c.n;\n",
    );
    assert_eq!(engine.global_int("r"), Some(5));
}

#[test]
fn struct_assignment_copies_the_whole_value() {
    let mut engine = run(
        "struct P { int a; int b; };\n\
         struct P p;\n\
         struct P q;\n\
         p.a = 1; p.b = 2;\n\
         q = p;\n\
         p.a = 99;\n\
         int r = q.a + q.b;\n",
    );
    assert_eq!(engine.global_int("r"), Some(3), "a copy, not an alias");
}

#[test]
fn union_members_share_storage() {
    let mut engine = run(
        "union U { int i; char c; };\n\
         union U u;\n\
         u.i = 65;\n\
         int c = u.c;\n\
         int size = sizeof(union U);\n",
    );
    assert_eq!(engine.global_int("c"), Some(65));
    assert_eq!(engine.global_int("size"), Some(4));
}

#[test]
fn linked_struct_types_may_reference_themselves() {
    let mut engine = run(
        "struct Node { struct Node *next; int value; };\n\
         struct Node a;\n\
         struct Node b;\n\
         a.value = 1;\n\
         b.value = 2;\n\
         a.next = &b;\n\
         int r = a.next->value;\n",
    );
    assert_eq!(engine.global_int("r"), Some(2));
}

#[test]
fn scope_resolution_reaches_shadowed_globals() {
    let mut engine = run(
        "int g = 100;\n\
         int get_both() { int g = 5; return ..g + ::g; }\n\
         int r = get_both();\n\
         int local_wins = 0;\n\
         int check() { int g = 5; return g; }\n\
         local_wins = check();\n",
    );
    assert_eq!(engine.global_int("r"), Some(200));
    assert_eq!(engine.global_int("local_wins"), Some(5));
}

#[test]
fn unknown_member_is_a_typed_error() {
    let mut engine = Engine::default();
    let err = engine
        .run(
            "test.c",
            "struct P { int a; };\nstruct P p;\nint r = p.nope;\n",
        )
        .unwrap_err();
    assert!(err.to_string().contains("member"), "{}", err);
}

#[test]
fn member_access_on_a_non_struct_fails() {
    let mut engine = Engine::default();
    let err = engine.run("test.c", "int x; int r = x.a;").unwrap_err();
    assert!(err.to_string().contains("not a struct"), "{}", err);
}
