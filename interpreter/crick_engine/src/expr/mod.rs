//! The expression evaluator: a two-stack precedence-climbing parser that
//! evaluates as it goes.
//!
//! The driver consumes tokens, pushing values and operators onto the
//! expression stack; whenever an operator of lower or equal precedence
//! arrives, the stack collapses down to it, executing the stacked
//! operators against the arena. Short-circuit evaluation and dead
//! ternary branches run in a shape-preserving no-op mode controlled by
//! the ignore gate, so bracket and precedence accounting never diverge
//! between the taken and untaken paths.

pub mod assign;
pub mod call;
pub mod coerce;
pub mod operators;
pub mod stack;

pub use assign::assign as expression_assign;
pub use call::expression_parse_function_call;

use crate::error::{FailKind, Result};
use crate::expr::coerce::{coerce_int, is_numeric_coercible, is_numeric_coercible_plus_pointers};
use crate::expr::stack::{collapse, ExprStack};
use crate::op::{
    is_expression_operator, left_to_right, precedence as op_prec, OpOrder, BRACKET_STEP,
    DEEP_PRECEDENCE,
};
use crate::parse::types::parse_type;
use crate::parser::{Parser, RunMode};
use crate::ty::BaseType;
use crate::value::ValueId;
use crate::{Engine, MacroId};
use crick_lexer::{Symbol, Token};
use tracing::{instrument, trace};

#[derive(Debug)]
/// What an expression parse produced.
pub enum Parsed {
    /// No expression was present at the parse position.
    Missing,
    /// An expression was parsed in skip mode; nothing was evaluated.
    Skipped,
    /// The expression's result value (run mode).
    Value(ValueId),
}

impl Parsed {
    pub fn present(&self) -> bool {
        !matches!(self, Parsed::Missing)
    }
}

/// True if the next construct is a type (a type keyword, or an identifier
/// bound by `typedef`).
fn is_type_token(eng: &Engine, tok: Token) -> bool {
    match tok {
        Token::Ident(sym) => eng.ident_is_type(sym),
        _ => tok.is_type_word(),
    }
}

/// Parse and evaluate one expression.
#[instrument(level = "trace", skip(eng, p))]
pub fn expression_parse(eng: &mut Engine, p: &mut Parser) -> Result<Parsed> {
    let mut stack = ExprStack::new();
    let mut prefix_state = true;
    let mut done = false;
    let mut bracket_prec: i32 = 0;
    let mut precedence: i32 = 0;
    let mut ignore_prec: i32 = DEEP_PRECEDENCE;
    let mut ternary_depth: i32 = 0;

    while !done {
        let pre_cursor = p.cursor();
        let tok = p.next();

        let operator_here = (is_expression_operator(tok)
            || (tok == Token::CloseParen && bracket_prec != 0))
            && (tok != Token::Colon || ternary_depth > 0);

        if operator_here {
            if prefix_state {
                if tok == Token::Dot {
                    // dot-this: implicit member access through `this`
                    dot_this(eng, p, &mut stack, precedence, ignore_prec)?;
                    prefix_state = false;
                    continue;
                }

                let op = op_prec(tok).unwrap();
                if op.prefix == 0 {
                    return Err(p.fail(FailKind::Syntax("operator not expected here")));
                }
                let local_prec = op.prefix;
                precedence = bracket_prec + local_prec;

                if tok == Token::OpenParen {
                    let next = p.peek();
                    if is_type_token(eng, next) && stack.top_operator() != Some(Token::Sizeof) {
                        // a cast: collapse to the cast's precedence, then
                        // stack the type literal and a cast operator
                        let (cast_ty, _, _) = parse_type(eng, p)?;
                        p.expect(Token::CloseParen, "brackets not closed")?;

                        precedence =
                            bracket_prec + op_prec(Token::Cast).unwrap().prefix;
                        collapse(eng, p, &mut stack, precedence + 1, &mut ignore_prec)?;
                        let tv =
                            eng.alloc_value_from_type(eng.types.type_ty, false, None, false)?;
                        eng.write_type_payload(tv, cast_ty);
                        stack.push_value_id(tv);
                        stack.push_operator(OpOrder::Infix, Token::Cast, precedence);
                    } else {
                        // a new bracket level
                        bracket_prec += BRACKET_STEP;
                    }
                } else {
                    // two prefix operators of equal precedence: nudge the
                    // inner one so it evaluates first (- -x, **p)
                    let next = p.peek();
                    let mut boost = 0;
                    if next != Token::OpenParen && is_expression_operator(next) {
                        if let Some(np) = op_prec(next) {
                            if np.prefix == local_prec {
                                boost = -1;
                            }
                        }
                    }

                    collapse(eng, p, &mut stack, precedence, &mut ignore_prec)?;
                    stack.push_operator(OpOrder::Prefix, tok, precedence + boost);
                }
            } else {
                // infix or postfix position
                let op = op_prec(tok).unwrap();
                if op.postfix != 0 {
                    match tok {
                        Token::CloseParen | Token::CloseBracket => {
                            if bracket_prec == 0 {
                                // this bracket is past the end of the expression
                                p.set_cursor(pre_cursor);
                                done = true;
                            } else {
                                collapse(eng, p, &mut stack, bracket_prec, &mut ignore_prec)?;
                                bracket_prec -= BRACKET_STEP;
                            }
                        }
                        _ => {
                            precedence = bracket_prec + op.postfix;
                            collapse(eng, p, &mut stack, precedence, &mut ignore_prec)?;
                            stack.push_operator(OpOrder::Postfix, tok, precedence);
                        }
                    }
                } else if op.infix != 0 {
                    if (tok == Token::Dot || tok == Token::Arrow) && p.mode == RunMode::Run {
                        member_or_access(
                            eng,
                            p,
                            &mut stack,
                            tok,
                            bracket_prec,
                            ignore_prec,
                        )?;
                        // the member (or call result) is a value
                        continue;
                    }

                    precedence = bracket_prec + op.infix;
                    if left_to_right(op.infix) {
                        collapse(eng, p, &mut stack, precedence, &mut ignore_prec)?;
                    } else {
                        // right-to-left: stop one level higher so the
                        // chain reduces in reverse order
                        collapse(eng, p, &mut stack, precedence + 1, &mut ignore_prec)?;
                    }

                    // && / || may already determine the result: arm the
                    // gate so the right-hand side reduces as no-ops
                    if matches!(tok, Token::LogicalOr | Token::LogicalAnd) {
                        if let Some(lhs) = stack.top_value() {
                            if is_numeric_coercible(eng, lhs) && p.mode == RunMode::Run {
                                let truthy = coerce_int(eng, lhs) != 0;
                                let decided = (tok == Token::LogicalOr && truthy)
                                    || (tok == Token::LogicalAnd && !truthy);
                                if decided && ignore_prec > precedence {
                                    ignore_prec = precedence;
                                    trace!(ignore_prec, "short-circuit armed");
                                }
                            }
                        }
                    }

                    stack.push_operator(OpOrder::Infix, tok, precedence);
                    prefix_state = true;

                    match tok {
                        Token::Question => ternary_depth += 1,
                        Token::Colon => ternary_depth -= 1,
                        _ => {}
                    }

                    // `[` opens an inner expression, like a parenthesis
                    if tok == Token::OpenBracket {
                        bracket_prec += BRACKET_STEP;
                    }
                } else {
                    return Err(p.fail(FailKind::Syntax("operator not expected here")));
                }
            }
        } else if let Token::Ident(sym) = tok {
            if !prefix_state {
                return Err(p.fail(FailKind::Syntax("identifier not expected here")));
            }
            if eng.ident_is_type(sym) {
                // a typedef name in type position (e.g. sizeof(mytype));
                // handled below with the other type tokens
                p.set_cursor(pre_cursor);
                push_type_literal(eng, p, &mut stack)?;
            } else {
                parse_identifier(eng, p, &mut stack, sym, precedence, ignore_prec)?;
            }
            prefix_state = false;
        } else if matches!(tok, Token::DotDot | Token::ColonColon) && prefix_state {
            scope_resolution(eng, p, &mut stack, precedence, ignore_prec)?;
            prefix_state = false;
        } else if matches!(
            tok,
            Token::IntLit(_) | Token::FpLit(_) | Token::StrLit(_) | Token::CharLit(_)
        ) {
            if !prefix_state {
                return Err(p.fail(FailKind::Syntax("value not expected here")));
            }
            push_constant(eng, &mut stack, tok)?;
            prefix_state = false;
        } else if tok.is_type_word() {
            if !prefix_state {
                return Err(p.fail(FailKind::Syntax("type not expected here")));
            }
            p.set_cursor(pre_cursor);
            push_type_literal(eng, p, &mut stack)?;
            prefix_state = false;
        } else {
            // not part of the expression
            p.set_cursor(pre_cursor);
            done = true;
        }
    }

    if bracket_prec > 0 {
        return Err(p.fail(FailKind::BracketsNotClosed));
    }

    collapse(eng, p, &mut stack, 0, &mut ignore_prec)?;

    if stack.is_empty() {
        return Ok(Parsed::Missing);
    }

    if p.mode == RunMode::Run {
        if stack.len() != 1 {
            return Err(p.fail(FailKind::InvalidExpression));
        }
        match stack.pop_node() {
            Some(stack::StackEntry::Val(v)) => Ok(Parsed::Value(v)),
            _ => Err(p.fail(FailKind::InvalidExpression)),
        }
    } else {
        // drop the placeholder result
        while let Some(node) = stack.pop_node() {
            if let stack::StackEntry::Val(v) = node {
                eng.free_stack_value(v);
            }
        }
        Ok(Parsed::Skipped)
    }
}

/// Parse an expression that must yield an integer.
pub fn expression_parse_int(eng: &mut Engine, p: &mut Parser) -> Result<i64> {
    match expression_parse(eng, p)? {
        Parsed::Missing => Err(p.fail(FailKind::ExpressionExpected)),
        Parsed::Skipped => Ok(0),
        Parsed::Value(v) => {
            if !is_numeric_coercible_plus_pointers(eng, v, true) {
                let name = eng.types.display(eng.cell(v).ty, &eng.interner);
                eng.free_stack_value(v);
                return Err(p.fail(FailKind::IntegerExpected(name)));
            }
            let n = coerce_int(eng, v);
            eng.free_stack_value(v);
            Ok(n)
        }
    }
}

/// Push a literal constant.
fn push_constant(eng: &mut Engine, stack: &mut ExprStack, tok: Token) -> Result<()> {
    match tok {
        Token::IntLit(n) => {
            stack.push_int(eng, n)?;
        }
        Token::FpLit(f) => {
            stack.push_fp(eng, f)?;
        }
        Token::CharLit(c) => {
            let v = eng.alloc_value_from_type(eng.types.char_ty, false, None, false)?;
            eng.write_int(v, c as i64);
            stack.push_value_id(v);
        }
        Token::StrLit(sym) => {
            // an alias of the canonical literal; assignment decays it to
            // a char pointer as needed
            let lit = eng.string_literal(sym)?;
            let v = eng.alloc_value_shared(lit);
            eng.cell_mut(v).is_lvalue = false;
            eng.cell_mut(v).lvalue_from = None;
            stack.push_value_id(v);
        }
        _ => unreachable!("not a constant token"),
    }
    Ok(())
}

/// Parse a type where a value could be (for `sizeof(int)` and friends)
/// and push it as a type literal.
fn push_type_literal(eng: &mut Engine, p: &mut Parser, stack: &mut ExprStack) -> Result<()> {
    let (ty, _, _) = parse_type(eng, p)?;
    let tv = eng.alloc_value_from_type(eng.types.type_ty, false, None, false)?;
    eng.write_type_payload(tv, ty);
    stack.push_value_id(tv);
    Ok(())
}

/// The `var.method(` / `var->method(` pattern, peeked without consuming.
fn peek_dot_method(p: &Parser) -> Option<Symbol> {
    let mut look = p.clone();
    if look.next() != Token::Dot {
        return None;
    }
    let Token::Ident(method) = look.next() else {
        return None;
    };
    if look.peek() != Token::OpenParen {
        return None;
    }
    Some(method)
}

/// Identifier handling: typedefs are routed earlier, so this is a member
/// call, a plain call, or a variable reference.
fn parse_identifier(
    eng: &mut Engine,
    p: &mut Parser,
    stack: &mut ExprStack,
    sym: Symbol,
    precedence: i32,
    ignore_prec: i32,
) -> Result<()> {
    if let Some(method) = peek_dot_method(p) {
        // var.method(...): mangle through the variable's struct type and
        // call with the variable as receiver
        let run_gate = p.mode == RunMode::Run && precedence < ignore_prec;
        p.next(); // '.'
        p.next(); // method name

        if run_gate {
            let var = eng.variable_get(p, sym)?;
            let mangled = mangled_method_name(eng, p, var, method)?;
            stack.push_lvalue(eng, var, 0);
            call::expression_parse_function_call(eng, p, stack, mangled, true)?;
        } else {
            call::expression_parse_function_call(eng, p, stack, method, false)?;
        }
        return Ok(());
    }

    if p.peek() == Token::OpenParen {
        let run_gate = p.mode == RunMode::Run && precedence < ignore_prec;
        return call::expression_parse_function_call(eng, p, stack, sym, run_gate);
    }

    if p.mode != RunMode::Run {
        stack.push_int(eng, 0)?;
        return Ok(());
    }

    // inside a member function body, a bare name that isn't a local can
    // be a member of the receiver (locals shadow members, members shadow
    // globals)
    if !eng.local_defined(sym) {
        if let Some(member_alias) = this_member_alias(eng, p, sym)? {
            stack.push_value_id(member_alias);
            return Ok(());
        }
    }

    let var = eng.variable_get(p, sym)?;
    let base = eng.types.base(eng.cell(var).ty);
    if base == BaseType::Macro {
        // an object macro used as a value: reparse its body here
        let macro_id = MacroId::from_raw(eng.read_def_payload(var));
        let (params, body) = {
            let def = &eng.macros[macro_id];
            (def.params.clone(), def.body.clone())
        };
        if !params.is_empty() {
            return Err(p.fail(FailKind::TooFewArguments(
                eng.interner.resolve(sym).to_string(),
            )));
        }
        let mut mp = Parser::from_span(&body, RunMode::Run);
        match expression_parse(eng, &mut mp)? {
            Parsed::Value(v) => stack.push_value_id(v),
            _ => return Err(p.fail(FailKind::ExpressionExpected)),
        }
        return Ok(());
    }
    if eng.cell(var).ty == eng.types.void_ty {
        return Err(p.fail(FailKind::VoidValue));
    }
    stack.push_lvalue(eng, var, 0);
    Ok(())
}

/// If the current frame has a `this` receiver with a member named `sym`,
/// an lvalue alias of that member.
fn this_member_alias(
    eng: &mut Engine,
    p: &Parser,
    sym: Symbol,
) -> Result<Option<ValueId>> {
    let Some(frame) = eng.frames.last() else {
        return Ok(None);
    };
    let Some(this) = frame.locals.get(eng.sym_this) else {
        return Ok(None);
    };
    if eng.types.base(eng.cell(this).ty) != BaseType::Pointer {
        return Ok(None);
    }
    let (target, struct_ty) = eng.deref_pointer(p, this)?;
    if eng.types.base(struct_ty) != BaseType::Struct {
        return Ok(None);
    }
    let Some(m) = eng.types.member(struct_ty, sym).copied() else {
        return Ok(None);
    };
    Ok(Some(eng.alloc_value_from_existing(
        m.ty,
        target.offset(m.offset),
        true,
        None,
    )))
}

/// Build the interned `"StructType.method"` lookup name for a receiver
/// value (dereferencing one pointer level if needed).
fn mangled_method_name(
    eng: &mut Engine,
    p: &Parser,
    receiver: ValueId,
    method: Symbol,
) -> Result<Symbol> {
    let mut ty = eng.cell(receiver).ty;
    if eng.types.base(ty) == BaseType::Pointer {
        ty = eng.types.from_ty(ty).unwrap();
    }
    if eng.types.base(ty) != BaseType::Struct {
        return Err(p.fail(FailKind::NotAStruct(
            eng.types.display(ty, &eng.interner),
        )));
    }
    let Some(type_ident) = eng.types.get(ty).ident else {
        return Err(p.fail(FailKind::ThisTypeUnknown(
            eng.interner.resolve(method).to_string(),
        )));
    };
    let mangled = format!(
        "{}.{}",
        eng.interner.resolve(type_ident),
        eng.interner.resolve(method)
    );
    Ok(eng.interner.intern(&mangled))
}

/// Infix `.` / `->` in run mode: a member function call when the member
/// is immediately called, a plain member access otherwise.
fn member_or_access(
    eng: &mut Engine,
    p: &mut Parser,
    stack: &mut ExprStack,
    tok: Token,
    bracket_prec: i32,
    ignore_prec: i32,
) -> Result<()> {
    let is_call = {
        let mut look = p.clone();
        matches!(look.next(), Token::Ident(_)) && look.peek() == Token::OpenParen
    };
    if !is_call {
        return operators::struct_element(eng, p, stack, tok);
    }

    let Token::Ident(method) = p.next() else {
        unreachable!()
    };
    let run_gate = bracket_prec + op_prec(tok).unwrap().infix <= ignore_prec;

    let Some(receiver) = stack.top_value() else {
        return Err(p.fail(FailKind::InvalidExpression));
    };

    if !run_gate {
        // short-circuited: drop the receiver and parse the call for shape
        stack.pop_node();
        eng.free_stack_value(receiver);
        return call::expression_parse_function_call(eng, p, stack, method, false);
    }

    let mangled = mangled_method_name(eng, p, receiver, method)?;

    if tok == Token::Arrow {
        // replace the pointer with the struct it refers to
        if eng.types.base(eng.cell(receiver).ty) != BaseType::Pointer {
            return Err(p.fail(FailKind::NotAPointer(
                eng.types.display(eng.cell(receiver).ty, &eng.interner),
            )));
        }
        let (target, pointed) = eng.deref_pointer(p, receiver)?;
        if eng.types.base(pointed) != BaseType::Struct {
            return Err(p.fail(FailKind::NotAStruct(
                eng.types.display(pointed, &eng.interner),
            )));
        }
        stack.pop_node();
        eng.free_stack_value(receiver);
        let alias = eng.alloc_value_from_existing(pointed, target, true, None);
        stack.push_value_id(alias);
    }

    call::expression_parse_function_call(eng, p, stack, mangled, true)
}

/// `.member` in prefix position: shorthand for `this->member` inside a
/// member function body.
fn dot_this(
    eng: &mut Engine,
    p: &mut Parser,
    stack: &mut ExprStack,
    precedence: i32,
    ignore_prec: i32,
) -> Result<()> {
    let Token::Ident(member) = p.peek() else {
        return Err(p.fail(FailKind::Syntax("member name expected after '.'")));
    };

    if p.mode != RunMode::Run {
        p.next();
        if p.peek() == Token::OpenParen {
            return call::expression_parse_function_call(eng, p, stack, member, false);
        }
        stack.push_int(eng, 0)?;
        return Ok(());
    }

    let this = eng.variable_get(p, eng.sym_this)?;
    if eng.types.base(eng.cell(this).ty) != BaseType::Pointer {
        return Err(p.fail(FailKind::NotAPointer(
            eng.types.display(eng.cell(this).ty, &eng.interner),
        )));
    }

    if p.peek2() == Token::OpenParen {
        // .method(...): the receiver is *this
        let run_gate = p.mode == RunMode::Run && precedence < ignore_prec;
        p.next(); // method name
        let mangled = mangled_method_name(eng, p, this, member)?;
        if run_gate {
            let (target, pointed) = eng.deref_pointer(p, this)?;
            let alias = eng.alloc_value_from_existing(pointed, target, true, None);
            stack.push_value_id(alias);
        }
        return call::expression_parse_function_call(eng, p, stack, mangled, run_gate);
    }

    p.next(); // member name
    let (target, struct_ty) = eng.deref_pointer(p, this)?;
    if eng.types.base(struct_ty) != BaseType::Struct {
        return Err(p.fail(FailKind::NotAStruct(
            eng.types.display(struct_ty, &eng.interner),
        )));
    }
    let Some(m) = eng.types.member(struct_ty, member).copied() else {
        return Err(p.fail(FailKind::NotAMember {
            member: eng.interner.resolve(member).to_string(),
            in_type: eng.types.display(struct_ty, &eng.interner),
        }));
    };
    let v = eng.alloc_value_from_existing(m.ty, target.offset(m.offset), true, None);
    stack.push_value_id(v);
    Ok(())
}

/// `..name` and `::name`: bind in the global table regardless of
/// shadowing.
fn scope_resolution(
    eng: &mut Engine,
    p: &mut Parser,
    stack: &mut ExprStack,
    precedence: i32,
    ignore_prec: i32,
) -> Result<()> {
    let Token::Ident(sym) = p.next() else {
        return Err(p.fail(FailKind::Syntax("identifier expected after scope resolution")));
    };

    if p.peek() == Token::OpenParen {
        let run_gate = p.mode == RunMode::Run && precedence < ignore_prec;
        return call::expression_parse_function_call(eng, p, stack, sym, run_gate);
    }

    if p.mode != RunMode::Run {
        stack.push_int(eng, 0)?;
        return Ok(());
    }

    let Some(var) = eng.globals.get(sym) else {
        return Err(p.fail(FailKind::UnknownIdentifier(
            eng.interner.resolve(sym).to_string(),
        )));
    };
    if eng.cell(var).ty == eng.types.void_ty {
        return Err(p.fail(FailKind::VoidValue));
    }
    stack.push_lvalue(eng, var, 0);
    Ok(())
}
