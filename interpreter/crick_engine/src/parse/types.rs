//! Parsing type names: base types with sign/storage qualifiers, struct,
//! union and enum definitions, typedef names, pointer and array
//! declarators.
//!
//! Type definitions are global side effects and happen even while code is
//! being skipped, so a struct defined inside a function body exists by
//! the time the function is called. Re-encountering a definition that
//! already has a body consumes it without redefining anything.

use crate::error::{FailKind, Result};
use crate::expr::expression_parse_int;
use crate::parser::Parser;
use crate::ty::{BaseType, TypeId};
use crate::Engine;
use crick_lexer::{Symbol, Token};
use tracing::debug;

/// Parse the leading part of a type (everything before the declarator).
/// Returns `None`, with the cursor unmoved, if no type is present.
pub fn parse_type_front(eng: &mut Engine, p: &mut Parser) -> Result<Option<(TypeId, bool)>> {
    let start = p.cursor();
    let mut is_static = false;
    let mut unsigned = false;
    let mut saw_qualifier = false;

    loop {
        match p.peek() {
            Token::KwStatic => {
                p.next();
                is_static = true;
                saw_qualifier = true;
            }
            // storage-class noise words
            Token::KwAuto | Token::KwRegister | Token::KwExtern => {
                p.next();
                saw_qualifier = true;
            }
            Token::KwSigned => {
                p.next();
                saw_qualifier = true;
            }
            Token::KwUnsigned => {
                p.next();
                unsigned = true;
                saw_qualifier = true;
            }
            _ => break,
        }
    }

    let ty = match p.peek() {
        Token::KwInt => {
            p.next();
            if unsigned {
                eng.types.uint_ty
            } else {
                eng.types.int_ty
            }
        }
        Token::KwChar => {
            p.next();
            if unsigned {
                eng.types.uchar_ty
            } else {
                eng.types.char_ty
            }
        }
        Token::KwShort => {
            p.next();
            p.eat(Token::KwInt);
            if unsigned {
                eng.types.ushort_ty
            } else {
                eng.types.short_ty
            }
        }
        Token::KwLong => {
            p.next();
            p.eat(Token::KwInt);
            if unsigned {
                eng.types.ulong_ty
            } else {
                eng.types.long_ty
            }
        }
        Token::KwFloat | Token::KwDouble => {
            p.next();
            eng.types.fp_ty
        }
        Token::KwVoid => {
            p.next();
            eng.types.void_ty
        }
        Token::KwStruct => {
            p.next();
            parse_aggregate(eng, p, BaseType::Struct)?
        }
        Token::KwUnion => {
            p.next();
            parse_aggregate(eng, p, BaseType::Union)?
        }
        Token::KwEnum => {
            p.next();
            parse_enum(eng, p)?
        }
        // a typedef'd name, optionally forced global with `..`/`::`
        Token::Ident(sym) if eng.ident_is_type(sym) => {
            p.next();
            let var = eng.variable_get(p, sym)?;
            eng.read_type_payload(var)
        }
        Token::DotDot | Token::ColonColon => {
            let mut look = p.clone();
            look.next();
            match look.next() {
                Token::Ident(sym) => {
                    let Some(var) = eng.globals.get(sym) else {
                        p.set_cursor(start);
                        return Ok(None);
                    };
                    if eng.types.base(eng.cell(var).ty) != BaseType::TypeOfType {
                        p.set_cursor(start);
                        return Ok(None);
                    }
                    p.next();
                    p.next();
                    eng.read_type_payload(var)
                }
                _ => {
                    p.set_cursor(start);
                    return Ok(None);
                }
            }
        }
        _ if unsigned => eng.types.uint_ty,
        _ if saw_qualifier => eng.types.int_ty,
        _ => {
            p.set_cursor(start);
            return Ok(None);
        }
    };

    Ok(Some((ty, is_static)))
}

/// Parse the declarator part: pointer stars, an optional identifier and
/// array suffixes. Array sizes are constant expressions; a bare `[]`
/// stays unsized until initialization.
pub fn parse_type_ident_part(
    eng: &mut Engine,
    p: &mut Parser,
    basic: TypeId,
) -> Result<(TypeId, Option<Symbol>)> {
    let mut ty = basic;
    while p.eat(Token::Star) {
        ty = eng.types.pointer_to(ty);
    }

    let ident = match p.peek() {
        Token::Ident(sym) if !eng.ident_is_type(sym) => {
            p.next();
            Some(sym)
        }
        _ => None,
    };

    let mut lens: Vec<u32> = Vec::new();
    while p.eat(Token::OpenBracket) {
        if p.eat(Token::CloseBracket) {
            lens.push(0);
        } else {
            let n = expression_parse_int(eng, p)?;
            p.expect(Token::CloseBracket, "']' expected")?;
            lens.push(n.max(0) as u32);
        }
    }
    // int a[2][3] is an array of 2 arrays of 3 ints
    for &len in lens.iter().rev() {
        ty = eng.types.matching(ty, BaseType::Array, len, None);
    }

    Ok((ty, ident))
}

/// Parse a complete type name (front plus declarator).
pub fn parse_type(eng: &mut Engine, p: &mut Parser) -> Result<(TypeId, Option<Symbol>, bool)> {
    let Some((basic, is_static)) = parse_type_front(eng, p)? else {
        return Err(p.fail(FailKind::Syntax("type expected")));
    };
    let (ty, ident) = parse_type_ident_part(eng, p, basic)?;
    Ok((ty, ident, is_static))
}

fn parse_aggregate(eng: &mut Engine, p: &mut Parser, base: BaseType) -> Result<TypeId> {
    let Token::Ident(name) = p.next() else {
        return Err(p.fail(FailKind::Syntax("struct or union name expected")));
    };
    let agg = eng.types.named_aggregate(base, name);

    if p.peek() != Token::OpenBrace {
        return Ok(agg);
    }
    if eng.types.get(agg).has_body {
        // second pass over an already-defined aggregate: consume the body
        skip_braced_body(p)?;
        return Ok(agg);
    }
    p.next(); // '{'
    debug!(name = eng.interner.resolve(name), "defining aggregate");

    while p.peek() != Token::CloseBrace {
        let Some((member_basic, _)) = parse_type_front(eng, p)? else {
            return Err(p.fail(FailKind::Syntax("member type expected")));
        };
        let (member_ty, member_ident) = parse_type_ident_part(eng, p, member_basic)?;
        let Some(member_ident) = member_ident else {
            return Err(p.fail(FailKind::Syntax("member name expected")));
        };

        if p.peek() == Token::OpenParen {
            // a member function: defined globally under its mangled name,
            // with a synthetic this parameter
            crate::parse::function::parse_member_function_definition(
                eng,
                p,
                agg,
                member_ty,
                member_ident,
            )?;
            p.eat(Token::Semicolon);
            continue;
        }

        eng.types.add_member(agg, member_ident, member_ty);
        p.expect(Token::Semicolon, "';' expected")?;
    }
    p.next(); // '}'
    eng.types.finish_aggregate(agg);
    Ok(agg)
}

fn parse_enum(eng: &mut Engine, p: &mut Parser) -> Result<TypeId> {
    let Token::Ident(name) = p.next() else {
        return Err(p.fail(FailKind::Syntax("enum name expected")));
    };
    let ty = eng.types.named_aggregate(BaseType::Enum, name);

    if p.peek() != Token::OpenBrace {
        return Ok(ty);
    }
    if eng.types.get(ty).has_body {
        skip_braced_body(p)?;
        return Ok(ty);
    }
    p.next(); // '{'

    let mut next_value: i64 = 0;
    loop {
        let Token::Ident(member) = p.next() else {
            return Err(p.fail(FailKind::Syntax("enumerator name expected")));
        };
        if p.eat(Token::Assign) {
            next_value = expression_parse_int(eng, p)?;
        }

        // enumerators are global integer constants
        let int_ty = eng.types.int_ty;
        let val = eng.alloc_value_from_type(int_ty, false, None, true)?;
        eng.write_int(val, next_value);
        let pos = p.pos();
        if !eng.globals.set(member, val, Some(pos)) {
            return Err(p.fail(FailKind::AlreadyDefined(
                eng.interner.resolve(member).to_string(),
            )));
        }
        next_value += 1;

        match p.next() {
            Token::Comma => {
                if p.peek() == Token::CloseBrace {
                    p.next();
                    break;
                }
            }
            Token::CloseBrace => break,
            _ => return Err(p.fail(FailKind::Syntax("',' or '}' expected"))),
        }
    }
    eng.types.finish_aggregate(ty);
    Ok(ty)
}

/// Consume a balanced `{ ... }` body without interpreting it.
fn skip_braced_body(p: &mut Parser) -> Result<()> {
    p.expect(Token::OpenBrace, "'{' expected")?;
    let mut depth = 1;
    loop {
        match p.next() {
            Token::OpenBrace => depth += 1,
            Token::CloseBrace => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Token::Eof => return Err(p.fail(FailKind::Syntax("'}' expected"))),
            _ => {}
        }
    }
}
