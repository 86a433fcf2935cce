//! Call dispatch: user-defined functions, intrinsics, macros and member
//! functions.
//!
//! Member functions are ordinary globals under their mangled name
//! (`"Struct.method"`); dispatch recognizes the mangled shape, takes the
//! receiver from the expression stack and binds it as a synthetic first
//! parameter of type pointer-to-struct.

use crate::arena::ByteRef;
use crate::error::{Fail, FailKind, Result};
use crate::expr::assign::assign;
use crate::expr::stack::ExprStack;
use crate::expr::{expression_parse, Parsed};
use crate::parser::{Parser, RunMode, TokenSpan};
use crate::ty::{BaseType, TypeId};
use crate::value::ValueId;
use crate::{Engine, FuncId, MacroId};
use crick_lexer::{Symbol, Token};
use tracing::{debug, instrument};

/// A resolved callee, cloned out of the engine's tables so evaluation can
/// borrow the engine freely.
struct Callee {
    name: Symbol,
    ret: TypeId,
    params: Vec<(Symbol, TypeId)>,
    varargs: bool,
    body: Option<TokenSpan>,
    intrinsic: Option<crate::NativeFn>,
}

impl Engine {
    fn callee(&self, name: Symbol, id: FuncId) -> Callee {
        let def = &self.funcs[id];
        Callee {
            name,
            ret: def.ret,
            params: def.params.clone(),
            varargs: def.varargs,
            body: def.body.clone(),
            intrinsic: def.intrinsic,
        }
    }
}

/// The receiver of a member call: the bytes `this` will point at. A
/// temporary receiver is detached for the duration of the call so the
/// pointed-at bytes stay valid.
struct Receiver {
    bytes: ByteRef,
    scratch: Option<ValueId>,
}

fn take_receiver(
    eng: &mut Engine,
    p: &Parser,
    stack: &mut ExprStack,
    func_name: Symbol,
) -> Result<Receiver> {
    let Some(receiver) = stack.top_value() else {
        return Err(p.fail(FailKind::NotAStruct(
            eng.interner.resolve(func_name).to_string(),
        )));
    };
    if eng.types.base(eng.cell(receiver).ty) != BaseType::Struct {
        return Err(p.fail(FailKind::NotAStruct(
            eng.types.display(eng.cell(receiver).ty, &eng.interner),
        )));
    }
    stack.pop_node();
    if eng.cell(receiver).payload_on_stack {
        // a temporary: move it off the stack so `this` stays valid
        let scratch = eng.detach_copy(receiver)?;
        eng.free_stack_value(receiver);
        Ok(Receiver {
            bytes: eng.cell(scratch).payload,
            scratch: Some(scratch),
        })
    } else {
        let bytes = eng.cell(receiver).payload;
        eng.free_stack_value(receiver);
        Ok(Receiver {
            bytes,
            scratch: None,
        })
    }
}

/// Parse and (when `run_it`) execute a call to `name`. The `(` has not
/// been consumed yet; for a member call the receiver sits on top of the
/// expression stack.
#[instrument(level = "debug", skip(eng, p, stack))]
pub fn expression_parse_function_call(
    eng: &mut Engine,
    p: &mut Parser,
    stack: &mut ExprStack,
    name: Symbol,
    run_it: bool,
) -> Result<()> {
    let old_mode = p.mode;
    p.expect(Token::OpenParen, "'(' expected")?;

    if !run_it {
        stack.push_int(eng, 0)?;
        p.mode = RunMode::Skip;
        let outcome = parse_arguments(eng, p, None, None);
        p.mode = old_mode;
        return outcome.map(|_| ());
    }

    let is_member = eng.interner.resolve(name).contains('.');
    let receiver = if is_member {
        Some(take_receiver(eng, p, stack, name)?)
    } else {
        None
    };

    let Some(func_val) = eng.globals.get(name) else {
        return Err(p.fail(FailKind::UnknownIdentifier(
            eng.interner.resolve(name).to_string(),
        )));
    };
    match eng.types.base(eng.cell(func_val).ty) {
        BaseType::Macro => {
            let macro_id = MacroId::from_raw(eng.read_def_payload(func_val));
            return expression_parse_macro_call(eng, p, stack, name, macro_id);
        }
        BaseType::Function => {}
        _ => {
            return Err(p.fail(FailKind::NotAFunction(
                eng.types.display(eng.cell(func_val).ty, &eng.interner),
            )))
        }
    }
    let callee = eng.callee(name, FuncId::from_raw(eng.read_def_payload(func_val)));

    // the return slot goes under the arena frame so it survives the call
    let return_value = stack.push_value_by_type(eng, callee.ret)?;
    eng.arena.push_frame();

    let outcome = (|| {
        let args = parse_arguments(eng, p, Some(&callee), receiver.as_ref())?;
        dispatch(eng, p, &callee, args, return_value)
    })();

    eng.arena.pop_frame();
    if let Some(Receiver {
        scratch: Some(s), ..
    }) = receiver
    {
        eng.free_stack_value(s);
    }
    p.mode = old_mode;
    outcome
}

/// Parse the argument list. With a callee, arguments are bound into
/// freshly allocated parameter slots of the declared types; without one
/// (skip mode) they are parsed for shape only.
fn parse_arguments(
    eng: &mut Engine,
    p: &mut Parser,
    callee: Option<&Callee>,
    receiver: Option<&Receiver>,
) -> Result<Vec<ValueId>> {
    let mut args: Vec<ValueId> = Vec::new();
    let nparams = callee.map(|c| c.params.len()).unwrap_or(0);

    if let (Some(callee), Some(receiver)) = (callee, receiver) {
        // synthetic `this`, declared pointer-to-struct
        let this_ty = callee
            .params
            .first()
            .map(|&(_, ty)| ty)
            .ok_or_else(|| p.fail(FailKind::TooManyArguments(name_of(eng, callee))))?;
        let slot = eng.alloc_value_from_type(this_ty, false, None, false)?;
        eng.write_ptr(slot, receiver.bytes);
        args.push(slot);
    }

    loop {
        let slot = match callee {
            Some(callee) if args.len() < nparams => Some(eng.alloc_value_from_type(
                callee.params[args.len()].1,
                false,
                None,
                false,
            )?),
            _ => None,
        };

        match expression_parse(eng, p)? {
            Parsed::Missing => {
                // end of the argument list?
                if p.next() != Token::CloseParen {
                    return Err(p.fail(FailKind::Syntax("bad argument")));
                }
                if let Some(slot) = slot {
                    eng.free_stack_value(slot);
                }
                break;
            }
            parsed => {
                if let Some(callee) = callee {
                    if let Some(slot) = slot {
                        if let Parsed::Value(arg) = parsed {
                            assign(
                                eng,
                                p,
                                slot,
                                arg,
                                true,
                                Some(&name_of(eng, callee)),
                                args.len() + 1,
                                false,
                            )?;
                            eng.free_stack_value(arg);
                        }
                        args.push(slot);
                    } else {
                        if !callee.varargs {
                            return Err(p.fail(FailKind::TooManyArguments(name_of(eng, callee))));
                        }
                        if let Parsed::Value(arg) = parsed {
                            eng.free_stack_value(arg);
                        }
                    }
                } else if let Parsed::Value(arg) = parsed {
                    eng.free_stack_value(arg);
                }

                match p.next() {
                    Token::Comma => continue,
                    Token::CloseParen => break,
                    _ => return Err(p.fail(FailKind::Syntax("comma expected"))),
                }
            }
        }
    }

    if let Some(callee) = callee {
        if args.len() < nparams {
            return Err(p.fail(FailKind::TooFewArguments(name_of(eng, callee))));
        }
    }
    Ok(args)
}

fn name_of(eng: &Engine, callee: &Callee) -> String {
    eng.interner.resolve(callee.name).to_string()
}

fn dispatch(
    eng: &mut Engine,
    p: &mut Parser,
    callee: &Callee,
    args: Vec<ValueId>,
    return_value: ValueId,
) -> Result<()> {
    if let Some(intrinsic) = callee.intrinsic {
        debug!(name = eng.interner.resolve(callee.name), "intrinsic call");
        let outcome = intrinsic(eng, p, return_value, &args);
        for arg in args {
            eng.free_descriptor(arg);
        }
        return outcome;
    }
    execute_user_function(eng, p, callee, args, return_value)
}

fn execute_user_function(
    eng: &mut Engine,
    p: &Parser,
    callee: &Callee,
    args: Vec<ValueId>,
    return_value: ValueId,
) -> Result<()> {
    let Some(body) = &callee.body else {
        return Err(p.fail(FailKind::UnknownIdentifier(format!(
            "{} (declared but never defined)",
            eng.interner.resolve(callee.name)
        ))));
    };
    debug!(name = eng.interner.resolve(callee.name), "calling");

    let mut body_parser = Parser::from_span(body, RunMode::Run);
    eng.frame_push(callee.name, return_value);

    let outcome = (|| -> Result<()> {
        for (i, &(param_name, _)) in callee.params.iter().enumerate() {
            eng.define_variable(&body_parser, param_name, args[i], true)?;
        }

        if crate::parse::parse_statement(eng, &mut body_parser, true)?
            != crate::parse::ParseResult::Ok
        {
            return Err(body_parser.fail(FailKind::Syntax("function body expected")));
        }

        match body_parser.mode {
            RunMode::Run if eng.types.base(callee.ret) != BaseType::Void => {
                Err(body_parser.fail(FailKind::ReturnValueMissing(
                    eng.types.display(callee.ret, &eng.interner),
                )))
            }
            RunMode::Goto => {
                let label = body_parser
                    .search_goto
                    .map(|s| eng.interner.resolve(s).to_string())
                    .unwrap_or_default();
                Err(body_parser.fail(FailKind::GotoLabelNotFound(label)))
            }
            _ => Ok(()),
        }
    })();

    if let Some(frame) = eng.frames.last_mut() {
        frame.params = args;
    }
    eng.frame_pop();
    outcome
}

/// Expand a parameterized or object macro call: arguments are evaluated
/// and bound by name, then the macro body's tokens are reparsed in that
/// frame and the resulting expression becomes the call's value.
pub fn expression_parse_macro_call(
    eng: &mut Engine,
    p: &mut Parser,
    stack: &mut ExprStack,
    name: Symbol,
    macro_id: MacroId,
) -> Result<()> {
    let (params, body) = {
        let def = &eng.macros[macro_id];
        (def.params.clone(), def.body.clone())
    };

    let return_value = stack.push_value_by_type(eng, eng.types.fp_ty)?;
    eng.arena.push_frame();

    let outcome = (|| -> Result<()> {
        let mut args: Vec<ValueId> = Vec::new();
        loop {
            match expression_parse(eng, p)? {
                Parsed::Missing => {
                    if p.next() != Token::CloseParen {
                        return Err(p.fail(FailKind::Syntax("bad argument")));
                    }
                    break;
                }
                Parsed::Value(arg) => {
                    if args.len() >= params.len() {
                        return Err(p.fail(FailKind::TooManyArguments(
                            eng.interner.resolve(name).to_string(),
                        )));
                    }
                    args.push(arg);
                    match p.next() {
                        Token::Comma => continue,
                        Token::CloseParen => break,
                        _ => return Err(p.fail(FailKind::Syntax("comma expected"))),
                    }
                }
                Parsed::Skipped => {
                    return Err(p.fail(FailKind::InvalidExpression));
                }
            }
        }
        if args.len() < params.len() {
            return Err(p.fail(FailKind::TooFewArguments(
                eng.interner.resolve(name).to_string(),
            )));
        }

        let mut macro_parser = Parser::from_span(&body, p.mode);
        eng.frame_push(name, return_value);
        let inner = (|| -> Result<()> {
            for (i, &param_name) in params.iter().enumerate() {
                eng.define_variable(&macro_parser, param_name, args[i], true)?;
            }
            match expression_parse(eng, &mut macro_parser)? {
                Parsed::Value(eval) => {
                    let macro_name = eng.interner.resolve(name).to_string();
                    assign(eng, &macro_parser, return_value, eval, true, Some(&macro_name), 0, false)?;
                    eng.free_stack_value(eval);
                    Ok(())
                }
                _ => Err(macro_parser.fail(FailKind::ExpressionExpected)),
            }
        })();
        if let Some(frame) = eng.frames.last_mut() {
            frame.params = args;
        }
        eng.frame_pop();
        inner
    })();

    eng.arena.pop_frame();
    outcome
}

/// Call a zero-argument entry point directly (the embedder's
/// `call_main`). Returns the integer result for int-returning functions.
pub fn call_toplevel(eng: &mut Engine, name: Symbol, func_id: FuncId) -> Result<Option<i64>> {
    let callee = eng.callee(name, func_id);
    let body = callee.body.clone().ok_or_else(|| {
        Fail::bare(FailKind::UnknownIdentifier(
            eng.interner.resolve(name).to_string(),
        ))
    })?;

    let return_value = eng.alloc_value_from_type(callee.ret, false, None, false)?;
    eng.arena.push_frame();

    // zero arguments for declared parameters (e.g. main's argc/argv)
    let outcome = (|| -> Result<()> {
        let mut args = Vec::new();
        for &(_, ty) in &callee.params {
            args.push(eng.alloc_value_from_type(ty, false, None, false)?);
        }
        let p = Parser::from_span(&body, RunMode::Run);
        execute_user_function(eng, &p, &callee, args, return_value)
    })();

    eng.arena.pop_frame();
    let result = match outcome {
        Ok(()) if eng.types.base(callee.ret).is_integer() => Some(eng.read_int(return_value)),
        Ok(()) => None,
        Err(e) => {
            eng.free_stack_value(return_value);
            return Err(e);
        }
    };
    eng.free_stack_value(return_value);
    Ok(result)
}
