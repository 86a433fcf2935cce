//! Native function registration and dispatch.

use crick_engine::{Engine, Parser, Result, ValueId};

fn native_double(eng: &mut Engine, _p: &Parser, ret: ValueId, args: &[ValueId]) -> Result<()> {
    let n = eng.read_int(args[0]);
    eng.write_int(ret, n * 2);
    Ok(())
}

fn native_hypot2(eng: &mut Engine, _p: &Parser, ret: ValueId, args: &[ValueId]) -> Result<()> {
    let a = eng.read_fp(args[0]);
    let b = eng.read_fp(args[1]);
    eng.write_fp(ret, a * a + b * b);
    Ok(())
}

#[test]
fn natives_dispatch_like_ordinary_functions() {
    let mut engine = Engine::default();
    engine
        .register_native("int double_it(int n);", native_double)
        .unwrap();
    engine
        .run("test.c", "int r = double_it(21); int s = double_it(r);")
        .unwrap();
    assert_eq!(engine.global_int("r"), Some(42));
    assert_eq!(engine.global_int("s"), Some(84));
}

#[test]
fn native_arguments_convert_through_declared_types() {
    let mut engine = Engine::default();
    engine
        .register_native("double hypot2(double a, double b);", native_hypot2)
        .unwrap();
    // integer arguments widen to double on the way in
    engine.run("test.c", "double h = hypot2(3, 4);").unwrap();
    assert_eq!(engine.global_fp("h"), Some(25.0));
}

#[test]
fn native_arity_is_checked_too() {
    let mut engine = Engine::default();
    engine
        .register_native("int double_it(int n);", native_double)
        .unwrap();
    let err = engine
        .run("test.c", "int r = double_it(1, 2);")
        .unwrap_err();
    assert!(err.to_string().contains("too many arguments"), "{}", err);
}

#[test]
fn includes_must_be_registered() {
    let mut engine = Engine::default();
    engine.allow_include("stdio.h");
    engine.run("test.c", "#include \"stdio.h\"\nint x = 1;").unwrap();
    assert_eq!(engine.global_int("x"), Some(1));

    let mut engine = Engine::default();
    let err = engine
        .run("test.c", "#include \"mystery.h\"\n")
        .unwrap_err();
    assert!(err.to_string().contains("can't include"), "{}", err);
}
