//! The expression stack.
//!
//! An interleaved stack of value and operator nodes built by the driver
//! and drained by [`collapse`]. Value payloads live on the arena, so
//! between parse steps the stack nodes and the arena stack mirror each
//! other; freeing happens in strict LIFO order as operators reduce.

use crate::error::{FailKind, Result};
use crate::expr::operators;
use crate::op::{OpOrder, DEEP_PRECEDENCE};
use crate::parser::{Parser, RunMode};
use crate::ty::{BaseType, TypeId};
use crate::value::ValueId;
use crate::Engine;
use crick_lexer::Token;
use tracing::trace;

#[derive(Clone, Copy, Debug)]
pub enum StackEntry {
    Val(ValueId),
    Op {
        tok: Token,
        order: OpOrder,
        prec: i32,
    },
}

#[derive(Default)]
pub struct ExprStack {
    nodes: Vec<StackEntry>,
}

impl ExprStack {
    pub fn new() -> ExprStack {
        ExprStack::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn top(&self) -> Option<&StackEntry> {
        self.nodes.last()
    }

    pub fn top_value(&self) -> Option<ValueId> {
        match self.nodes.last() {
            Some(StackEntry::Val(v)) => Some(*v),
            _ => None,
        }
    }

    /// The operator on top of the stack, if any (for the `sizeof(` cast
    /// exception and the debug dump).
    pub fn top_operator(&self) -> Option<Token> {
        match self.nodes.last() {
            Some(StackEntry::Op { tok, .. }) => Some(*tok),
            _ => None,
        }
    }

    pub fn pop_node(&mut self) -> Option<StackEntry> {
        self.nodes.pop()
    }

    /// Push an already-allocated value.
    pub fn push_value_id(&mut self, v: ValueId) {
        self.nodes.push(StackEntry::Val(v));
    }

    /// Push a by-value copy of `src`.
    pub fn push_value_copy(&mut self, eng: &mut Engine, src: ValueId) -> Result<ValueId> {
        let copy = eng.alloc_value_and_copy(src, false)?;
        self.push_value_id(copy);
        Ok(copy)
    }

    /// Push a blank value of `ty`.
    pub fn push_value_by_type(&mut self, eng: &mut Engine, ty: TypeId) -> Result<ValueId> {
        let v = eng.alloc_value_from_type(ty, false, None, false)?;
        self.push_value_id(v);
        Ok(v)
    }

    /// Push an lvalue alias of a variable (writes go to the variable).
    pub fn push_lvalue(&mut self, eng: &mut Engine, src: ValueId, offset: u32) -> ValueId {
        let v = eng.alloc_value_shared(src);
        if offset != 0 {
            let cell = eng.cell_mut(v);
            cell.payload = cell.payload.offset(offset);
        }
        self.push_value_id(v);
        v
    }

    /// Push an integer result.
    pub fn push_int(&mut self, eng: &mut Engine, n: i64) -> Result<ValueId> {
        let v = eng.alloc_value_from_type(eng.types.int_ty, false, None, false)?;
        eng.write_int(v, n);
        self.push_value_id(v);
        Ok(v)
    }

    /// Push a floating-point result.
    pub fn push_fp(&mut self, eng: &mut Engine, f: f64) -> Result<ValueId> {
        let v = eng.alloc_value_from_type(eng.types.fp_ty, false, None, false)?;
        eng.write_fp(v, f);
        self.push_value_id(v);
        Ok(v)
    }

    pub fn push_operator(&mut self, order: OpOrder, tok: Token, prec: i32) {
        debug_assert_ne!(order, OpOrder::None);
        self.nodes.push(StackEntry::Op { tok, order, prec });
    }

    /// Render the stack for trace logs, top first.
    pub fn dump(&self, eng: &Engine) -> String {
        let mut out = String::new();
        for entry in self.nodes.iter().rev() {
            if !out.is_empty() {
                out.push_str(", ");
            }
            match *entry {
                StackEntry::Val(v) => {
                    let cell = eng.cell(v);
                    let tag = if cell.is_lvalue { "lvalue" } else { "value" };
                    let rendered = match eng.types.base(cell.ty) {
                        BaseType::Void => "void".to_string(),
                        BaseType::Fp => format!("{}", eng.read_fp(v)),
                        BaseType::Pointer => format!("ptr({})", eng.read_ptr(v).0),
                        BaseType::Struct | BaseType::Union | BaseType::Array => {
                            eng.types.display(cell.ty, &eng.interner)
                        }
                        _ => format!("{}", eng.read_int(v)),
                    };
                    out.push_str(&format!("{}={}", tag, rendered));
                }
                StackEntry::Op { tok, order, prec } => {
                    out.push_str(&format!("op={:?} {:?} {}", tok, order, prec));
                }
            }
        }
        out
    }
}

/// Drain the stack: while the top operator's precedence is at least
/// `stop_prec`, execute it on its neighbors, replacing the consumed nodes
/// with the result.
///
/// `ignore_prec` is the short-circuit gate: operators at or above it are
/// executed as no-ops that just push `0`, keeping the stack shape
/// identical while suppressing evaluation; once the reduction returns to
/// the gate level the gate resets to [`DEEP_PRECEDENCE`].
pub fn collapse(
    eng: &mut Engine,
    p: &mut Parser,
    stack: &mut ExprStack,
    stop_prec: i32,
    ignore_prec: &mut i32,
) -> Result<()> {
    trace!(stop_prec, "collapse: {}", stack.dump(eng));

    loop {
        if stack.len() < 2 {
            break;
        }

        // find the topmost operator node and its precedence
        let (found_prec, shape, top_is_value) = match *stack.top().unwrap() {
            StackEntry::Op { order, prec, .. } => (prec, order, false),
            StackEntry::Val(_) => match stack.nodes[stack.len() - 2] {
                StackEntry::Op { order, prec, .. } => (prec, order, true),
                StackEntry::Val(_) => break,
            },
        };

        if found_prec < stop_prec {
            break;
        }

        // operators at or above the short-circuit gate run for real;
        // everything beyond it is reduced as a shape-preserving no-op
        let run = p.mode == RunMode::Run && found_prec <= *ignore_prec;

        match shape {
            OpOrder::Prefix => {
                if !top_is_value {
                    // a prefix operator still waiting for its operand
                    break;
                }
                let Some(StackEntry::Val(top)) = stack.pop_node() else {
                    unreachable!()
                };
                let Some(StackEntry::Op { tok, .. }) = stack.pop_node() else {
                    unreachable!()
                };
                if run {
                    operators::prefix_operator(eng, p, stack, tok, top)?;
                } else {
                    eng.free_stack_value(top);
                    stack.push_int(eng, 0)?;
                }
            }
            OpOrder::Postfix => {
                if top_is_value {
                    return Err(p.fail(FailKind::InvalidExpression));
                }
                let Some(StackEntry::Op { tok, .. }) = stack.pop_node() else {
                    unreachable!()
                };
                let Some(StackEntry::Val(top)) = stack.pop_node() else {
                    return Err(p.fail(FailKind::InvalidExpression));
                };
                if run {
                    operators::postfix_operator(eng, p, stack, tok, top)?;
                } else {
                    eng.free_stack_value(top);
                    stack.push_int(eng, 0)?;
                }
            }
            OpOrder::Infix => {
                if !top_is_value {
                    // right operand not parsed yet (e.g. "a +" so far)
                    break;
                }
                let Some(StackEntry::Val(top)) = stack.pop_node() else {
                    unreachable!()
                };
                let Some(StackEntry::Op { tok, .. }) = stack.pop_node() else {
                    unreachable!()
                };
                let Some(StackEntry::Val(bottom)) = stack.pop_node() else {
                    return Err(p.fail(FailKind::InvalidExpression));
                };
                if run {
                    operators::infix_operator(eng, p, stack, tok, bottom, top)?;
                } else {
                    eng.free_stack_value(top);
                    eng.free_stack_value(bottom);
                    stack.push_int(eng, 0)?;
                }
            }
            OpOrder::None => unreachable!("value node treated as operator"),
        }

        // back at or above the gate: stop ignoring
        if found_prec <= *ignore_prec {
            *ignore_prec = DEEP_PRECEDENCE;
        }

        trace!("collapsed: {}", stack.dump(eng));
    }
    Ok(())
}
