//! `#define` macro definitions and `#include` handling.

use crate::error::{FailKind, Result};
use crate::parser::Parser;
use crate::{Engine, MacroDef};
use crick_lexer::{Symbol, Token};
use tracing::debug;

/// Parse `#define NAME[(params)] body...` up to the end of the directive
/// line, capturing the body tokens for later replay.
pub fn parse_macro_definition(eng: &mut Engine, p: &mut Parser) -> Result<()> {
    let Token::Ident(name) = p.next() else {
        return Err(p.fail(FailKind::Syntax("identifier expected")));
    };

    let mut params: Vec<Symbol> = Vec::new();
    if p.peek_raw() == Token::OpenMacroParen {
        // a parameterized macro: `(` adjacent to the name
        p.advance_raw();
        if p.peek() != Token::CloseParen {
            loop {
                let Token::Ident(param) = p.next() else {
                    return Err(p.fail(FailKind::Syntax("identifier expected")));
                };
                params.push(param);
                match p.next() {
                    Token::Comma => continue,
                    Token::CloseParen => break,
                    _ => return Err(p.fail(FailKind::Syntax("comma expected"))),
                }
            }
        } else {
            p.next();
        }
    }

    // the body runs to the end of the directive line
    let body_start = p.cursor();
    while !matches!(p.peek_raw(), Token::EndOfLine | Token::Eof) {
        p.advance_raw();
    }
    let body = p.span_from(body_start);
    if p.peek_raw() == Token::EndOfLine {
        p.advance_raw();
    }

    debug!(
        name = eng.interner.resolve(name),
        params = params.len(),
        "macro defined"
    );
    let macro_id = eng.macros.push(MacroDef { params, body });

    let macro_ty = eng.types.macro_ty;
    let val = eng.alloc_value_from_type(macro_ty, false, None, true)?;
    eng.write_def_payload(val, macro_id.raw());
    let pos = p.pos();
    if !eng.globals.set(name, val, Some(pos)) {
        return Err(p.fail(FailKind::AlreadyDefined(
            eng.interner.resolve(name).to_string(),
        )));
    }
    Ok(())
}

/// `#include "name"`: accepted only for names the embedder registered.
pub fn parse_include(eng: &mut Engine, p: &mut Parser) -> Result<()> {
    let Token::StrLit(name) = p.next() else {
        return Err(p.fail(FailKind::Syntax("\"filename.h\" expected")));
    };
    if !eng.includes.contains(&name) {
        return Err(p.fail(FailKind::IncludeUnknown(
            eng.interner.resolve(name).to_string(),
        )));
    }
    Ok(())
}
