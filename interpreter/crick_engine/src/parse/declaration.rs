//! Variable declarations, typedefs and initializers.

use crate::error::{FailKind, Result};
use crate::expr::assign::assign;
use crate::expr::{expression_parse, Parsed};
use crate::parse::function::parse_function_definition;
use crate::parse::types::{parse_type, parse_type_front, parse_type_ident_part};
use crate::parser::{Parser, RunMode};
use crate::ty::BaseType;
use crate::value::ValueId;
use crate::Engine;
use crick_lexer::Token;
use tracing::debug;

/// Parse a declaration (variables or a function definition). Returns
/// whether the caller should expect a trailing semicolon.
pub fn parse_declaration(eng: &mut Engine, p: &mut Parser) -> Result<bool> {
    let Some((basic, is_static)) = parse_type_front(eng, p)? else {
        return Err(p.fail(FailKind::Syntax("type expected")));
    };
    let basic_base = eng.types.base(basic);

    loop {
        let (ty, ident) = parse_type_ident_part(eng, p, basic)?;

        let Some(ident) = ident else {
            // `struct S { ... };` and friends declare only the type
            if matches!(
                basic_base,
                BaseType::Struct | BaseType::Union | BaseType::Enum | BaseType::Void
            ) {
                return Ok(true);
            }
            return Err(p.fail(FailKind::Syntax("identifier expected")));
        };

        if p.peek() == Token::OpenParen {
            parse_function_definition(eng, p, ty, ident, None)?;
            return Ok(false);
        }

        if ty == eng.types.void_ty {
            return Err(p.fail(FailKind::VoidVariable));
        }

        // remember struct-typed variable names so mangled member calls
        // can resolve during the skip pass
        if eng.types.base(ty) == BaseType::Struct {
            if let Some(type_name) = eng.types.get(ty).ident {
                eng.var_types.insert(ident, type_name);
            }
        }

        let mut first_visit = false;
        let var = if matches!(p.mode, RunMode::Run | RunMode::Goto) {
            Some(eng.define_variable_typed(p, ident, ty, is_static, &mut first_visit)?)
        } else {
            None
        };

        if p.eat(Token::Assign) {
            parse_declaration_assignment(eng, p, var, !is_static || first_visit)?;
        }

        if !p.eat(Token::Comma) {
            break;
        }
    }
    Ok(true)
}

/// `typedef <type> <name>;` binds the name to a type value.
pub fn parse_typedef(eng: &mut Engine, p: &mut Parser) -> Result<()> {
    let (ty, ident, _) = parse_type(eng, p)?;
    let Some(ident) = ident else {
        return Err(p.fail(FailKind::Syntax("identifier expected")));
    };

    if p.mode == RunMode::Run {
        let type_ty = eng.types.type_ty;
        let tv = eng.alloc_value_from_type(type_ty, false, None, eng.frames.is_empty())?;
        eng.write_type_payload(tv, ty);
        {
            let cell = eng.cell_mut(tv);
            cell.scope_id = p.scope_id;
        }
        let pos = p.pos();
        let defined = match eng.frames.last_mut() {
            Some(frame) => frame.locals.set(ident, tv, Some(pos)),
            None => eng.globals.set(ident, tv, Some(pos)),
        };
        if !defined {
            return Err(p.fail(FailKind::AlreadyDefined(
                eng.interner.resolve(ident).to_string(),
            )));
        }
        debug!(name = eng.interner.resolve(ident), "typedef");
    }
    Ok(())
}

/// The `= ...` part of a declaration: a brace initializer for arrays, a
/// plain expression otherwise. `var` is absent while skipping.
pub fn parse_declaration_assignment(
    eng: &mut Engine,
    p: &mut Parser,
    var: Option<ValueId>,
    do_assignment: bool,
) -> Result<()> {
    if p.eat(Token::OpenBrace) {
        parse_array_initializer(eng, p, var, do_assignment)?;
        return Ok(());
    }

    match expression_parse(eng, p)? {
        Parsed::Missing => Err(p.fail(FailKind::ExpressionExpected)),
        Parsed::Skipped => Ok(()),
        Parsed::Value(cvalue) => {
            if let (Some(var), true) = (var, do_assignment) {
                assign(eng, p, var, cvalue, false, None, 0, false)?;
            }
            eng.free_stack_value(cvalue);
            Ok(())
        }
    }
}

/// A brace array initializer, cursor just past the `{`. Returns the
/// element count. Unsized arrays adopt the count first (discovered with a
/// side-effect-free counting pass); multidimensional initializers may be
/// flat or nested.
pub fn parse_array_initializer(
    eng: &mut Engine,
    p: &mut Parser,
    var: Option<ValueId>,
    do_assignment: bool,
) -> Result<usize> {
    let run = p.mode == RunMode::Run && do_assignment;

    if run {
        if let Some(var) = var {
            if eng.types.base(eng.cell(var).ty) != BaseType::Array {
                return Err(p.fail(FailKind::AssignMismatch {
                    to: eng.types.display(eng.cell(var).ty, &eng.interner),
                    from: "array initializer".to_string(),
                    ctx: None,
                }));
            }
            if eng.types.get(eng.cell(var).ty).array_len == 0 {
                // count the elements with a skipping pre-pass, then size
                // the array before assigning for real
                let mut counter = p.clone();
                counter.mode = RunMode::Skip;
                let n = parse_array_initializer(eng, &mut counter, Some(var), false)?;

                let elem = eng.types.from_ty(eng.cell(var).ty).unwrap();
                let sized = eng.types.matching(elem, BaseType::Array, n as u32, None);
                eng.resize_array_value(var, sized)?;
                debug!(len = n, "sized array from initializer");
            }
        }
    }

    let mut index: usize = 0;
    while p.peek() != Token::CloseBrace {
        if p.peek() == Token::OpenBrace {
            // a nested sub-array initializer
            p.next();
            let sub = if run {
                var.map(|var| -> Result<ValueId> {
                    let arr_ty = eng.cell(var).ty;
                    let sub_ty = eng.types.from_ty(arr_ty).unwrap();
                    let sub_size = eng.types.size_of(sub_ty);
                    if index as u32 >= eng.types.get(arr_ty).array_len {
                        return Err(p.fail(FailKind::TooManyArrayElements));
                    }
                    let base = eng.cell(var).payload;
                    Ok(eng.alloc_value_from_existing(
                        sub_ty,
                        base.offset(sub_size * index as u32),
                        true,
                        Some(var),
                    ))
                })
                .transpose()?
            } else {
                None
            };
            parse_array_initializer(eng, p, sub, do_assignment)?;
            if let Some(sub) = sub {
                eng.free_stack_value(sub);
            }
        } else {
            let element = if run {
                var.map(|var| -> Result<ValueId> {
                    // int x[2][2] = {1,2,3,4} assigns as if it were flat;
                    // a string constant stops the flattening one array
                    // level up so char rows take whole strings
                    let mut elem_ty = eng.cell(var).ty;
                    let mut total = 1u32;
                    while eng.types.base(elem_ty) == BaseType::Array {
                        total *= eng.types.get(elem_ty).array_len;
                        let inner = eng.types.from_ty(elem_ty).unwrap();
                        if matches!(p.peek(), Token::StrLit(_))
                            && eng.types.base(inner) == BaseType::Char
                        {
                            break;
                        }
                        elem_ty = inner;
                    }
                    if index as u32 >= total {
                        return Err(p.fail(FailKind::TooManyArrayElements));
                    }
                    let elem_size = eng.types.size_of(elem_ty);
                    let base = eng.cell(var).payload;
                    Ok(eng.alloc_value_from_existing(
                        elem_ty,
                        base.offset(elem_size * index as u32),
                        true,
                        Some(var),
                    ))
                })
                .transpose()?
            } else {
                None
            };

            match expression_parse(eng, p)? {
                Parsed::Missing => return Err(p.fail(FailKind::ExpressionExpected)),
                Parsed::Skipped => {}
                Parsed::Value(cvalue) => {
                    if let Some(element) = element {
                        assign(eng, p, element, cvalue, false, None, 0, false)?;
                    }
                    eng.free_stack_value(cvalue);
                }
            }
            if let Some(element) = element {
                eng.free_stack_value(element);
            }
        }

        index += 1;
        match p.peek() {
            Token::Comma => {
                p.next();
            }
            Token::CloseBrace => {}
            _ => return Err(p.fail(FailKind::Syntax("comma expected"))),
        }
    }
    p.expect(Token::CloseBrace, "'}' expected")?;
    Ok(index)
}
