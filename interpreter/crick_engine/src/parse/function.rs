//! Function definitions: prototypes, bodies, varargs, `main()` checks
//! and member functions (which are plain globals under mangled names).

use crate::error::{FailKind, Result};
use crate::parse::types::parse_type;
use crate::parse::{parse_statement_maybe_run, ParseResult};
use crate::parser::Parser;
use crate::ty::{BaseType, TypeId};
use crate::{Engine, FuncDef, FuncId};
use crick_lexer::{Symbol, Token};
use tracing::debug;

/// Most parameters a function may declare.
const PARAMETER_MAX: usize = 16;

/// Parse a parameter list, cursor on the first token after `(`. Ends
/// past the closing `)`.
pub fn parse_param_list(
    eng: &mut Engine,
    p: &mut Parser,
) -> Result<(Vec<(Symbol, TypeId)>, bool)> {
    let mut params: Vec<(Symbol, TypeId)> = Vec::new();
    let mut varargs = false;

    if p.eat(Token::CloseParen) {
        return Ok((params, varargs));
    }

    loop {
        if p.eat(Token::Ellipsis) {
            varargs = true;
            p.expect(Token::CloseParen, "')' expected")?;
            break;
        }

        let (ty, ident, _) = parse_type(eng, p)?;
        if ty != eng.types.void_ty {
            // `(void)` is an empty parameter list; an anonymous
            // parameter (prototypes only) still reserves a slot
            let name = match ident {
                Some(sym) => sym,
                None => eng.interner.intern(""),
            };
            params.push((name, ty));
        }

        match p.next() {
            Token::Comma => continue,
            Token::CloseParen => break,
            _ => return Err(p.fail(FailKind::Syntax("comma expected"))),
        }
    }
    Ok((params, varargs))
}

/// Parse a function definition (or prototype) for `ident`, whose return
/// type has already been parsed. With `this_type`, the function is a
/// member function and gets a synthetic leading `this` parameter of type
/// pointer-to-struct.
pub fn parse_function_definition(
    eng: &mut Engine,
    p: &mut Parser,
    ret: TypeId,
    ident: Symbol,
    this_type: Option<TypeId>,
) -> Result<FuncId> {
    if !eng.frames.is_empty() {
        return Err(p.fail(FailKind::NestedFunctions));
    }

    p.expect(Token::OpenParen, "'(' expected")?;
    let (mut params, varargs) = parse_param_list(eng, p)?;

    if let Some(struct_ty) = this_type {
        let this_ptr = eng.types.pointer_to(struct_ty);
        params.insert(0, (eng.sym_this, this_ptr));
    }
    if params.len() > PARAMETER_MAX {
        return Err(p.fail(FailKind::TooManyParameters(
            eng.interner.resolve(ident).to_string(),
        )));
    }

    if eng.interner.resolve(ident) == "main" {
        if ret != eng.types.int_ty && ret != eng.types.void_ty {
            return Err(p.fail(FailKind::BadMainSignature(
                "main() should return an int or void",
            )));
        }
        if !params.is_empty() && (params.len() != 2 || params[0].1 != eng.types.int_ty) {
            return Err(p.fail(FailKind::BadMainSignature("bad parameters to main()")));
        }
    }

    // prototype, or a full definition with a body snapshot
    let body = if p.eat(Token::Semicolon) {
        None
    } else {
        if p.peek() != Token::OpenBrace {
            return Err(p.fail(FailKind::Syntax("bad function definition")));
        }
        let body_start = p.cursor();
        if parse_statement_maybe_run(eng, p, false, true)? != ParseResult::Ok {
            return Err(p.fail(FailKind::Syntax("function definition expected")));
        }
        Some(p.span_from(body_start))
    };

    if body.is_some() {
        if let Some(old) = eng.globals.get(ident) {
            let old_is_undefined_func = eng.types.base(eng.cell(old).ty) == BaseType::Function
                && eng.funcs[FuncId::from_raw(eng.read_def_payload(old))]
                    .body
                    .is_none();
            if old_is_undefined_func {
                // override the prototype
                let removed = eng.globals.delete(ident).unwrap();
                eng.free_variable(removed);
            } else {
                return Err(p.fail(FailKind::AlreadyDefined(
                    eng.interner.resolve(ident).to_string(),
                )));
            }
        }
    }

    debug!(name = eng.interner.resolve(ident), "defined function");
    let func_id = eng.funcs.push(FuncDef {
        ret,
        params,
        varargs,
        body,
        intrinsic: None,
    });

    let func_ty = eng.types.function_ty;
    let val = eng.alloc_value_from_type(func_ty, false, None, true)?;
    eng.write_def_payload(val, func_id.raw());
    let pos = p.pos();
    if !eng.globals.set(ident, val, Some(pos)) {
        return Err(p.fail(FailKind::AlreadyDefined(
            eng.interner.resolve(ident).to_string(),
        )));
    }
    Ok(func_id)
}

/// Define `StructName.method` in the global table.
pub fn parse_member_function_definition(
    eng: &mut Engine,
    p: &mut Parser,
    struct_ty: TypeId,
    ret: TypeId,
    method: Symbol,
) -> Result<FuncId> {
    let type_name = eng
        .types
        .get(struct_ty)
        .ident
        .expect("member function on an unnamed aggregate");
    let mangled = format!(
        "{}.{}",
        eng.interner.resolve(type_name),
        eng.interner.resolve(method)
    );
    let mangled = eng.interner.intern(&mangled);
    debug!(name = eng.interner.resolve(mangled), "member function");
    parse_function_definition(eng, p, ret, mangled, Some(struct_ty))
}
