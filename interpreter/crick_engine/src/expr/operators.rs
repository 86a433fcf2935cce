//! Operator evaluation.
//!
//! Called from the collapse step with the consumed operand nodes already
//! removed from the expression stack. Each evaluator owns its operands:
//! it reads what it needs, frees them in LIFO order (topmost payload
//! first), and pushes its result. Destinations of assignments are alias
//! values, so the write lands before the alias descriptor is released.

use crate::arena::ByteRef;
use crate::error::{FailKind, Result};
use crate::expr::assign::{assign, assign_fp, assign_int};
use crate::expr::coerce::{
    coerce_fp, coerce_int, is_fp, is_integer_numeric, is_numeric_coercible,
};
use crate::expr::stack::ExprStack;
use crate::parser::Parser;
use crate::ty::{BaseType, TypeId};
use crate::value::ValueId;
use crate::Engine;
use crick_lexer::Token;
use tracing::trace;

fn invalid(p: &Parser) -> crate::error::Fail {
    p.fail(FailKind::InvalidOperation)
}

fn type_name(eng: &Engine, v: ValueId) -> String {
    eng.types.display(eng.cell(v).ty, &eng.interner)
}

/// Size of the element a pointer of type `ptr_ty` steps over.
fn ptr_elem_size(eng: &Engine, ptr_ty: TypeId) -> i64 {
    match eng.types.from_ty(ptr_ty) {
        Some(elem) => (eng.types.size_of(elem) as i64).max(1),
        None => 1,
    }
}

/// Evaluate a prefix operator on `top`.
pub fn prefix_operator(
    eng: &mut Engine,
    p: &mut Parser,
    stack: &mut ExprStack,
    op: Token,
    top: ValueId,
) -> Result<()> {
    trace!(?op, "prefix");
    match op {
        Token::Ampersand => {
            if !eng.cell(top).is_lvalue {
                eng.free_stack_value(top);
                return Err(p.fail(FailKind::CantTakeAddress));
            }
            let addr = eng.cell(top).payload;
            let ptr_ty = eng.types.pointer_to(eng.cell(top).ty);
            eng.free_stack_value(top);
            let result = stack.push_value_by_type(eng, ptr_ty)?;
            eng.write_ptr(result, addr);
            Ok(())
        }
        Token::Star => {
            if eng.types.base(eng.cell(top).ty) != BaseType::Pointer {
                let name = type_name(eng, top);
                eng.free_stack_value(top);
                return Err(p.fail(FailKind::NotAPointer(name)));
            }
            if stack.top_operator() == Some(Token::Sizeof) {
                // `sizeof(*p)`: only the pointed-to type matters, the
                // pointer is not followed
                let pointed = eng.types.from_ty(eng.cell(top).ty).unwrap();
                eng.free_stack_value(top);
                stack.push_value_by_type(eng, pointed)?;
                Ok(())
            } else {
                let (target, pointed) = eng.deref_pointer(p, top)?;
                eng.free_stack_value(top);
                let v = eng.alloc_value_from_existing(pointed, target, true, None);
                stack.push_value_id(v);
                Ok(())
            }
        }
        Token::Sizeof => {
            let ty = if eng.types.base(eng.cell(top).ty) == BaseType::TypeOfType {
                eng.read_type_payload(top)
            } else {
                eng.cell(top).ty
            };
            let size = eng.types.sizeof_with(ty, eng.types.get(ty).array_len, true);
            eng.free_stack_value(top);
            stack.push_int(eng, size as i64)?;
            Ok(())
        }
        _ => prefix_arithmetic(eng, p, stack, op, top),
    }
}

fn prefix_arithmetic(
    eng: &mut Engine,
    p: &mut Parser,
    stack: &mut ExprStack,
    op: Token,
    top: ValueId,
) -> Result<()> {
    if is_fp(eng, top) {
        let x = eng.read_fp(top);
        let result = match op {
            Token::Plus => x,
            Token::Minus => -x,
            Token::Increment => assign_fp(eng, p, top, x + 1.0)?,
            Token::Decrement => assign_fp(eng, p, top, x - 1.0)?,
            Token::Bang => {
                if x == 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            _ => {
                eng.free_stack_value(top);
                return Err(invalid(p));
            }
        };
        eng.free_stack_value(top);
        stack.push_fp(eng, result)?;
        Ok(())
    } else if is_integer_numeric(eng, top) {
        let x = coerce_int(eng, top);
        let result = match op {
            Token::Plus => x,
            Token::Minus => x.wrapping_neg(),
            Token::Increment => assign_int(eng, p, top, x.wrapping_add(1), false)?,
            Token::Decrement => assign_int(eng, p, top, x.wrapping_sub(1), false)?,
            Token::Bang => (x == 0) as i64,
            Token::Tilde => !x,
            _ => {
                eng.free_stack_value(top);
                return Err(invalid(p));
            }
        };
        eng.free_stack_value(top);
        stack.push_int(eng, result)?;
        Ok(())
    } else if eng.types.base(eng.cell(top).ty) == BaseType::Pointer {
        let ptr_ty = eng.cell(top).ty;
        let size = ptr_elem_size(eng, ptr_ty);
        let target = eng.read_ptr(top);
        if op != Token::Bang && target == ByteRef::NULL {
            eng.free_stack_value(top);
            return Err(p.fail(FailKind::NullDereference));
        }
        let result: u64 = match op {
            Token::Increment | Token::Decrement => {
                if !eng.cell(top).is_lvalue {
                    eng.free_stack_value(top);
                    return Err(p.fail(FailKind::NotAnLValue));
                }
                let moved = if op == Token::Increment {
                    target.0 as u64 + size as u64
                } else {
                    (target.0 as u64).wrapping_sub(size as u64)
                };
                eng.write_ptr(top, ByteRef(moved as u32));
                moved
            }
            Token::Bang => (target == ByteRef::NULL) as u64,
            _ => {
                eng.free_stack_value(top);
                return Err(invalid(p));
            }
        };
        eng.free_stack_value(top);
        let pushed = stack.push_value_by_type(eng, ptr_ty)?;
        eng.write_ptr(pushed, ByteRef(result as u32));
        Ok(())
    } else {
        eng.free_stack_value(top);
        Err(invalid(p))
    }
}

/// Evaluate a postfix operator on `top`; the pushed result is the
/// pre-modification value.
pub fn postfix_operator(
    eng: &mut Engine,
    p: &mut Parser,
    stack: &mut ExprStack,
    op: Token,
    top: ValueId,
) -> Result<()> {
    trace!(?op, "postfix");
    if is_fp(eng, top) {
        let x = eng.read_fp(top);
        let result = match op {
            Token::Increment => {
                assign_fp(eng, p, top, x + 1.0)?;
                x
            }
            Token::Decrement => {
                assign_fp(eng, p, top, x - 1.0)?;
                x
            }
            _ => {
                eng.free_stack_value(top);
                return Err(invalid(p));
            }
        };
        eng.free_stack_value(top);
        stack.push_fp(eng, result)?;
        Ok(())
    } else if is_integer_numeric(eng, top) {
        let x = coerce_int(eng, top);
        let result = match op {
            Token::Increment => assign_int(eng, p, top, x.wrapping_add(1), true)?,
            Token::Decrement => assign_int(eng, p, top, x.wrapping_sub(1), true)?,
            _ => {
                eng.free_stack_value(top);
                return Err(invalid(p));
            }
        };
        eng.free_stack_value(top);
        stack.push_int(eng, result)?;
        Ok(())
    } else if eng.types.base(eng.cell(top).ty) == BaseType::Pointer {
        let ptr_ty = eng.cell(top).ty;
        let size = ptr_elem_size(eng, ptr_ty);
        let orig = eng.read_ptr(top);
        if orig == ByteRef::NULL {
            eng.free_stack_value(top);
            return Err(p.fail(FailKind::NullDereference));
        }
        if !eng.cell(top).is_lvalue {
            eng.free_stack_value(top);
            return Err(p.fail(FailKind::NotAnLValue));
        }
        let moved = match op {
            Token::Increment => orig.0 as u64 + size as u64,
            Token::Decrement => (orig.0 as u64).wrapping_sub(size as u64),
            _ => {
                eng.free_stack_value(top);
                return Err(invalid(p));
            }
        };
        eng.write_ptr(top, ByteRef(moved as u32));
        eng.free_stack_value(top);
        let pushed = stack.push_value_by_type(eng, ptr_ty)?;
        eng.write_ptr(pushed, orig);
        Ok(())
    } else {
        eng.free_stack_value(top);
        Err(invalid(p))
    }
}

/// Evaluate an infix operator: `bottom op top`.
pub fn infix_operator(
    eng: &mut Engine,
    p: &mut Parser,
    stack: &mut ExprStack,
    op: Token,
    bottom: ValueId,
    top: ValueId,
) -> Result<()> {
    trace!(?op, "infix");

    if op == Token::OpenBracket {
        return array_index(eng, p, stack, bottom, top);
    }
    if op == Token::Question {
        return question_mark(eng, p, stack, bottom, top);
    }
    if op == Token::Colon {
        return colon(eng, p, stack, bottom, top);
    }

    let bottom_base = eng.types.base(eng.cell(bottom).ty);
    let top_base = eng.types.base(eng.cell(top).ty);

    if (is_fp(eng, top) && is_numeric_coercible(eng, bottom))
        || (is_fp(eng, bottom) && is_numeric_coercible(eng, top))
    {
        infix_fp(eng, p, stack, op, bottom, top)
    } else if is_numeric_coercible(eng, top) && is_numeric_coercible(eng, bottom) {
        infix_int(eng, p, stack, op, bottom, top)
    } else if bottom_base == BaseType::Pointer && is_numeric_coercible(eng, top) {
        infix_pointer_int(eng, p, stack, op, bottom, top)
    } else if bottom_base == BaseType::Pointer
        && top_base == BaseType::Pointer
        && op != Token::Assign
    {
        infix_pointer_pointer(eng, p, stack, op, bottom, top)
    } else if op == Token::Assign {
        // aggregate or pointer-from-array assignment
        assign(eng, p, bottom, top, false, None, 0, false)?;
        eng.free_stack_value(top);
        stack.push_value_id(bottom);
        Ok(())
    } else if op == Token::Cast {
        let dest_ty = eng.read_type_payload(bottom);
        let scratch = eng.detach_copy(top)?;
        eng.free_stack_value(top);
        eng.free_stack_value(bottom);
        let result = stack.push_value_by_type(eng, dest_ty)?;
        let outcome = assign(eng, p, result, scratch, true, None, 0, true);
        eng.free_stack_value(scratch);
        outcome
    } else {
        eng.free_stack_value(top);
        eng.free_stack_value(bottom);
        Err(invalid(p))
    }
}

fn infix_fp(
    eng: &mut Engine,
    p: &mut Parser,
    stack: &mut ExprStack,
    op: Token,
    bottom: ValueId,
    top: ValueId,
) -> Result<()> {
    let top_fp = coerce_fp(eng, top);
    let bottom_fp = coerce_fp(eng, bottom);

    // assignment variants store back into the left side, converting to
    // integer when the destination is integer
    let mut store = |eng: &mut Engine, p: &mut Parser, value: f64| -> Result<(bool, f64, i64)> {
        if is_fp(eng, bottom) {
            Ok((false, assign_fp(eng, p, bottom, value)?, 0))
        } else {
            Ok((true, 0.0, assign_int(eng, p, bottom, value as i64, false)?))
        }
    };

    let (is_int, fp_result, int_result) = match op {
        Token::Assign => store(eng, p, top_fp)?,
        Token::AddAssign => store(eng, p, bottom_fp + top_fp)?,
        Token::SubAssign => store(eng, p, bottom_fp - top_fp)?,
        Token::MulAssign => store(eng, p, bottom_fp * top_fp)?,
        Token::DivAssign => store(eng, p, bottom_fp / top_fp)?,
        Token::Equal => (true, 0.0, (bottom_fp == top_fp) as i64),
        Token::NotEqual => (true, 0.0, (bottom_fp != top_fp) as i64),
        Token::Less => (true, 0.0, (bottom_fp < top_fp) as i64),
        Token::Greater => (true, 0.0, (bottom_fp > top_fp) as i64),
        Token::LessEqual => (true, 0.0, (bottom_fp <= top_fp) as i64),
        Token::GreaterEqual => (true, 0.0, (bottom_fp >= top_fp) as i64),
        Token::Plus => (false, bottom_fp + top_fp, 0),
        Token::Minus => (false, bottom_fp - top_fp, 0),
        Token::Star => (false, bottom_fp * top_fp, 0),
        Token::Slash => (false, bottom_fp / top_fp, 0),
        _ => {
            eng.free_stack_value(top);
            eng.free_stack_value(bottom);
            return Err(invalid(p));
        }
    };

    eng.free_stack_value(top);
    eng.free_stack_value(bottom);
    if is_int {
        stack.push_int(eng, int_result)?;
    } else {
        stack.push_fp(eng, fp_result)?;
    }
    Ok(())
}

fn infix_int(
    eng: &mut Engine,
    p: &mut Parser,
    stack: &mut ExprStack,
    op: Token,
    bottom: ValueId,
    top: ValueId,
) -> Result<()> {
    let t = coerce_int(eng, top);
    let b = coerce_int(eng, bottom);
    let unsigned = eng.types.base(eng.cell(bottom).ty).is_unsigned();

    let checked_div = |n: i64| -> Result<i64> {
        if n == 0 {
            Err(p.fail(FailKind::DivisionByZero))
        } else {
            Ok(n)
        }
    };

    let result = match op {
        Token::Assign => assign_int(eng, p, bottom, t, false)?,
        Token::AddAssign => assign_int(eng, p, bottom, b.wrapping_add(t), false)?,
        Token::SubAssign => assign_int(eng, p, bottom, b.wrapping_sub(t), false)?,
        Token::MulAssign => assign_int(eng, p, bottom, b.wrapping_mul(t), false)?,
        Token::DivAssign => {
            let t = match checked_div(t) {
                Ok(t) => t,
                Err(e) => {
                    eng.free_stack_value(top);
                    eng.free_stack_value(bottom);
                    return Err(e);
                }
            };
            assign_int(eng, p, bottom, b.wrapping_div(t), false)?
        }
        Token::ModAssign => {
            let t = match checked_div(t) {
                Ok(t) => t,
                Err(e) => {
                    eng.free_stack_value(top);
                    eng.free_stack_value(bottom);
                    return Err(e);
                }
            };
            assign_int(eng, p, bottom, b.wrapping_rem(t), false)?
        }
        Token::ShlAssign => assign_int(eng, p, bottom, b.wrapping_shl(t as u32), false)?,
        Token::ShrAssign => {
            // logical shift for unsigned destinations
            let shifted = if unsigned {
                ((b as u64) >> (t as u32 % 64)) as i64
            } else {
                b.wrapping_shr(t as u32)
            };
            assign_int(eng, p, bottom, shifted, false)?
        }
        Token::AndAssign => assign_int(eng, p, bottom, b & t, false)?,
        Token::OrAssign => assign_int(eng, p, bottom, b | t, false)?,
        Token::XorAssign => assign_int(eng, p, bottom, b ^ t, false)?,
        Token::LogicalOr => (b != 0 || t != 0) as i64,
        Token::LogicalAnd => (b != 0 && t != 0) as i64,
        Token::BitOr => b | t,
        Token::BitXor => b ^ t,
        Token::Ampersand => b & t,
        Token::Equal => (b == t) as i64,
        Token::NotEqual => (b != t) as i64,
        Token::Less => (b < t) as i64,
        Token::Greater => (b > t) as i64,
        Token::LessEqual => (b <= t) as i64,
        Token::GreaterEqual => (b >= t) as i64,
        Token::Shl => b.wrapping_shl(t as u32),
        Token::Shr => {
            if unsigned {
                ((b as u64) >> (t as u32 % 64)) as i64
            } else {
                b.wrapping_shr(t as u32)
            }
        }
        Token::Plus => b.wrapping_add(t),
        Token::Minus => b.wrapping_sub(t),
        Token::Star => b.wrapping_mul(t),
        Token::Slash => {
            let t = match checked_div(t) {
                Ok(t) => t,
                Err(e) => {
                    eng.free_stack_value(top);
                    eng.free_stack_value(bottom);
                    return Err(e);
                }
            };
            b.wrapping_div(t)
        }
        Token::Percent => {
            let t = match checked_div(t) {
                Ok(t) => t,
                Err(e) => {
                    eng.free_stack_value(top);
                    eng.free_stack_value(bottom);
                    return Err(e);
                }
            };
            b.wrapping_rem(t)
        }
        _ => {
            eng.free_stack_value(top);
            eng.free_stack_value(bottom);
            return Err(invalid(p));
        }
    };

    eng.free_stack_value(top);
    eng.free_stack_value(bottom);
    stack.push_int(eng, result)?;
    Ok(())
}

fn infix_pointer_int(
    eng: &mut Engine,
    p: &mut Parser,
    stack: &mut ExprStack,
    op: Token,
    bottom: ValueId,
    top: ValueId,
) -> Result<()> {
    let t = coerce_int(eng, top);
    let ptr_ty = eng.cell(bottom).ty;

    match op {
        Token::Equal | Token::NotEqual => {
            // only comparison against a null constant is meaningful
            if t != 0 {
                eng.free_stack_value(top);
                eng.free_stack_value(bottom);
                return Err(invalid(p));
            }
            let is_null = eng.read_ptr(bottom) == ByteRef::NULL;
            let result = if op == Token::Equal { is_null } else { !is_null };
            eng.free_stack_value(top);
            eng.free_stack_value(bottom);
            stack.push_int(eng, result as i64)?;
            Ok(())
        }
        Token::Plus | Token::Minus => {
            let size = ptr_elem_size(eng, ptr_ty);
            let target = eng.read_ptr(bottom);
            if target == ByteRef::NULL {
                eng.free_stack_value(top);
                eng.free_stack_value(bottom);
                return Err(p.fail(FailKind::NullDereference));
            }
            let moved = if op == Token::Plus {
                target.0 as i64 + t * size
            } else {
                target.0 as i64 - t * size
            };
            eng.free_stack_value(top);
            eng.free_stack_value(bottom);
            let pushed = stack.push_value_by_type(eng, ptr_ty)?;
            eng.write_ptr(pushed, ByteRef(moved as u32));
            Ok(())
        }
        Token::Assign if t == 0 => {
            assign(eng, p, bottom, top, false, None, 0, false)?;
            eng.free_stack_value(top);
            stack.push_value_id(bottom);
            Ok(())
        }
        Token::AddAssign | Token::SubAssign => {
            let size = ptr_elem_size(eng, ptr_ty);
            let target = eng.read_ptr(bottom);
            if target == ByteRef::NULL {
                eng.free_stack_value(top);
                eng.free_stack_value(bottom);
                return Err(p.fail(FailKind::NullDereference));
            }
            if !eng.cell(bottom).is_lvalue {
                eng.free_stack_value(top);
                eng.free_stack_value(bottom);
                return Err(p.fail(FailKind::NotAnLValue));
            }
            let moved = if op == Token::AddAssign {
                target.0 as i64 + t * size
            } else {
                target.0 as i64 - t * size
            };
            eng.write_ptr(bottom, ByteRef(moved as u32));
            eng.free_stack_value(top);
            stack.push_value_id(bottom);
            Ok(())
        }
        _ => {
            eng.free_stack_value(top);
            eng.free_stack_value(bottom);
            Err(invalid(p))
        }
    }
}

fn infix_pointer_pointer(
    eng: &mut Engine,
    p: &mut Parser,
    stack: &mut ExprStack,
    op: Token,
    bottom: ValueId,
    top: ValueId,
) -> Result<()> {
    let t = eng.read_ptr(top).0 as i64;
    let b = eng.read_ptr(bottom).0 as i64;
    let result = match op {
        Token::Equal => (b == t) as i64,
        Token::NotEqual => (b != t) as i64,
        Token::Minus => {
            // element-scaled difference
            (b - t) / ptr_elem_size(eng, eng.cell(bottom).ty)
        }
        _ => {
            eng.free_stack_value(top);
            eng.free_stack_value(bottom);
            return Err(invalid(p));
        }
    };
    eng.free_stack_value(top);
    eng.free_stack_value(bottom);
    stack.push_int(eng, result)?;
    Ok(())
}

fn array_index(
    eng: &mut Engine,
    p: &mut Parser,
    stack: &mut ExprStack,
    bottom: ValueId,
    top: ValueId,
) -> Result<()> {
    if !is_numeric_coercible(eng, top) {
        eng.free_stack_value(top);
        eng.free_stack_value(bottom);
        return Err(p.fail(FailKind::ArrayIndexNotInt));
    }
    let index = coerce_int(eng, top);

    let (elem_ty, target) = match eng.types.base(eng.cell(bottom).ty) {
        BaseType::Array => {
            let arr_ty = eng.cell(bottom).ty;
            let elem_ty = eng.types.from_ty(arr_ty).unwrap();
            let offset = eng.types.sizeof_with(arr_ty, index as u32, true);
            (elem_ty, eng.cell(bottom).payload.0 as i64 + offset as i64)
        }
        BaseType::Pointer => {
            let elem_ty = eng.types.from_ty(eng.cell(bottom).ty).unwrap();
            let size = eng.types.size_of(elem_ty) as i64;
            (elem_ty, eng.read_ptr(bottom).0 as i64 + size * index)
        }
        _ => {
            let name = type_name(eng, bottom);
            eng.free_stack_value(top);
            eng.free_stack_value(bottom);
            return Err(p.fail(FailKind::NotAnArray(name)));
        }
    };

    let elem_size = eng.types.size_of(elem_ty) as usize;
    if target <= 0 || !eng.arena.check(ByteRef(target as u32), elem_size) {
        eng.free_stack_value(top);
        eng.free_stack_value(bottom);
        return Err(p.fail(FailKind::PointerOutOfBounds));
    }

    let is_lvalue = eng.cell(bottom).is_lvalue;
    let lvalue_from = eng.cell(bottom).lvalue_from;
    eng.free_stack_value(top);
    eng.free_stack_value(bottom);
    let v = eng.alloc_value_from_existing(elem_ty, ByteRef(target as u32), is_lvalue, lvalue_from);
    stack.push_value_id(v);
    Ok(())
}

/// First half of the ternary: `cond ? then`. Pushes the "then" value when
/// the condition holds, a void sentinel otherwise.
fn question_mark(
    eng: &mut Engine,
    p: &mut Parser,
    stack: &mut ExprStack,
    cond: ValueId,
    then_val: ValueId,
) -> Result<()> {
    if !is_numeric_coercible(eng, cond) {
        eng.free_stack_value(then_val);
        eng.free_stack_value(cond);
        return Err(p.fail(FailKind::TernaryConditionNotNumeric));
    }
    if coerce_int(eng, cond) != 0 {
        let scratch = eng.detach_copy(then_val)?;
        eng.free_stack_value(then_val);
        eng.free_stack_value(cond);
        let outcome = stack.push_value_copy(eng, scratch);
        eng.free_stack_value(scratch);
        outcome?;
    } else {
        eng.free_stack_value(then_val);
        eng.free_stack_value(cond);
        stack.push_value_by_type(eng, eng.types.void_ty)?;
    }
    Ok(())
}

/// Second half of the ternary: the void sentinel selects the "else"
/// branch, anything else is a "then" result passed through.
fn colon(
    eng: &mut Engine,
    _p: &mut Parser,
    stack: &mut ExprStack,
    lhs_result: ValueId,
    else_val: ValueId,
) -> Result<()> {
    let chosen = if eng.types.base(eng.cell(lhs_result).ty) == BaseType::Void {
        else_val
    } else {
        lhs_result
    };
    let scratch = eng.detach_copy(chosen)?;
    eng.free_stack_value(else_val);
    eng.free_stack_value(lhs_result);
    let outcome = stack.push_value_copy(eng, scratch);
    eng.free_stack_value(scratch);
    outcome?;
    Ok(())
}

/// The `.` and `->` member-access operators, reduced immediately by the
/// driver (never through the collapse step).
pub fn struct_element(
    eng: &mut Engine,
    p: &mut Parser,
    stack: &mut ExprStack,
    op: Token,
) -> Result<()> {
    let member_sym = match p.next() {
        Token::Ident(sym) => sym,
        _ => {
            return Err(p.fail(FailKind::Syntax(
                "need a structure or union member after '.' or '->'",
            )))
        }
    };

    let Some(receiver) = stack.top_value() else {
        return Err(p.fail(FailKind::InvalidExpression));
    };

    let (agg_ty, base_bytes, lvalue_from) = if op == Token::Arrow {
        if eng.types.base(eng.cell(receiver).ty) != BaseType::Pointer {
            return Err(p.fail(FailKind::NotAPointer(type_name(eng, receiver))));
        }
        let (target, pointed) = eng.deref_pointer(p, receiver)?;
        (pointed, target, None)
    } else {
        let cell = eng.cell(receiver);
        (cell.ty, cell.payload, cell.lvalue_from)
    };

    if !matches!(
        eng.types.base(agg_ty),
        BaseType::Struct | BaseType::Union
    ) {
        return Err(p.fail(FailKind::NotAStruct(
            eng.types.display(agg_ty, &eng.interner),
        )));
    }

    let Some(member) = eng.types.member(agg_ty, member_sym).copied() else {
        return Err(p.fail(FailKind::NotAMember {
            member: eng.interner.resolve(member_sym).to_string(),
            in_type: eng.types.display(agg_ty, &eng.interner),
        }));
    };

    stack.pop_node();
    eng.free_stack_value(receiver);
    let v = eng.alloc_value_from_existing(
        member.ty,
        base_bytes.offset(member.offset),
        true,
        lvalue_from,
    );
    stack.push_value_id(v);
    Ok(())
}
