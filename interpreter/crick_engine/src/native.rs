//! Native (intrinsic) functions.
//!
//! The embedder registers a native with a C prototype string; the
//! prototype is parsed by the ordinary declaration machinery, so natives
//! and interpreted functions are indistinguishable at call sites.

use crate::error::{Fail, FailKind, Result};
use crate::parse::function::parse_param_list;
use crate::parse::types::parse_type;
use crate::parser::Parser;
use crate::value::ValueId;
use crate::{Engine, FuncDef};
use crick_lexer::{tokenize, Token};
use tracing::debug;

/// A native entry point: `(engine, call-site parser, return slot,
/// arguments)`.
pub type NativeFn = fn(&mut Engine, &Parser, ValueId, &[ValueId]) -> Result<()>;

impl Engine {
    /// Register a native function under the name its C prototype gives
    /// it, e.g. `engine.register_native("int abs(int);", native_abs)`.
    pub fn register_native(&mut self, prototype: &str, func: NativeFn) -> Result<()> {
        let tokens = tokenize(prototype, &mut self.interner).map_err(|e| {
            Fail::bare(FailKind::Lex(format!("bad native prototype: {}", e)))
        })?;
        let mut p = Parser::new(tokens.into(), "<native>".into());

        let (ret, ident, _) = parse_type(self, &mut p)?;
        let Some(ident) = ident else {
            return Err(p.fail(FailKind::Syntax("native prototype needs a name")));
        };
        p.expect(Token::OpenParen, "'(' expected")?;
        let (params, varargs) = parse_param_list(self, &mut p)?;

        debug!(name = self.interner.resolve(ident), "native registered");
        let func_id = self.funcs.push(FuncDef {
            ret,
            params,
            varargs,
            body: None,
            intrinsic: Some(func),
        });

        let func_ty = self.types.function_ty;
        let val = self.alloc_value_from_type(func_ty, false, None, true)?;
        self.write_def_payload(val, func_id.raw());
        if !self.globals.set(ident, val, None) {
            return Err(Fail::bare(FailKind::AlreadyDefined(
                self.interner.resolve(ident).to_string(),
            )));
        }
        Ok(())
    }
}
