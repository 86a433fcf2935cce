//! The platform glue: a minimal set of native functions so interpreted
//! programs can produce output and terminate.

use crick_engine::{Engine, Fail, FailKind, Parser, Result, ValueId};
use std::io::Write;

pub fn install(engine: &mut Engine) {
    engine.allow_include("stdio.h");
    engine
        .register_native("void putchar(int c);", native_putchar)
        .expect("putchar prototype");
    engine
        .register_native("void puts(char *s);", native_puts)
        .expect("puts prototype");
    engine
        .register_native("void exit(int code);", native_exit)
        .expect("exit prototype");
}

fn native_putchar(
    eng: &mut Engine,
    _p: &Parser,
    _ret: ValueId,
    args: &[ValueId],
) -> Result<()> {
    let c = eng.read_int(args[0]) as u8;
    let mut out = std::io::stdout();
    let _ = out.write_all(&[c]);
    Ok(())
}

fn native_puts(eng: &mut Engine, p: &Parser, _ret: ValueId, args: &[ValueId]) -> Result<()> {
    let (target, _) = eng.deref_pointer(p, args[0])?;
    let len = eng.arena.c_strlen(target);
    let bytes = eng.arena.bytes(target, len).to_vec();
    let mut out = std::io::stdout();
    let _ = out.write_all(&bytes);
    let _ = out.write_all(b"\n");
    Ok(())
}

fn native_exit(eng: &mut Engine, _p: &Parser, _ret: ValueId, args: &[ValueId]) -> Result<()> {
    Err(Fail::bare(FailKind::Exit(eng.read_int(args[0]))))
}
