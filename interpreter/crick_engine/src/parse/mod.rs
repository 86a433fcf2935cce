//! Statement parsing and control flow.
//!
//! Statements are executed as they are parsed; control flow works by
//! replaying saved cursor positions (loops) and by run-mode switches
//! (condition skipping, `break`/`continue`/`return`/`goto` unwinding,
//! `case` searching).

pub mod declaration;
pub mod function;
pub mod macros;
pub mod types;

use crate::error::{FailKind, Result};
use crate::expr::{expression_parse, expression_parse_int, Parsed};
use crate::expr::assign::assign;
use crate::parser::{Parser, RunMode};
use crate::Engine;
use crick_lexer::Token;
use tracing::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseResult {
    Ok,
    Eof,
    Error,
}

/// Parse (and, depending on the run mode, execute) one statement.
pub fn parse_statement(eng: &mut Engine, p: &mut Parser, check_semi: bool) -> Result<ParseResult> {
    let mut check_semi = check_semi;
    let pre_cursor = p.cursor();
    let tok = p.next();
    trace!(?tok, mode = ?p.mode, "statement");

    match tok {
        Token::Eof => return Ok(ParseResult::Eof),

        Token::Ident(sym) => {
            if eng.ident_is_type(sym) {
                // a typedef'd type declares a variable
                p.set_cursor(pre_cursor);
                check_semi = declaration::parse_declaration(eng, p)?;
            } else if !eng.variable_defined(sym) && p.peek() == Token::Colon {
                // a goto label
                p.next();
                if p.mode == RunMode::Goto && p.search_goto == Some(sym) {
                    p.mode = RunMode::Run;
                    p.search_goto = None;
                }
                check_semi = false;
            } else {
                p.set_cursor(pre_cursor);
                expression_statement(eng, p)?;
            }
        }

        Token::DotDot | Token::ColonColon => {
            // `..type x;` declares with a global typedef; anything else
            // is an expression
            let is_global_typedef = match p.peek() {
                Token::Ident(sym) => eng
                    .globals
                    .get(sym)
                    .map(|v| eng.types.base(eng.cell(v).ty) == crate::ty::BaseType::TypeOfType)
                    .unwrap_or(false),
                _ => false,
            };
            p.set_cursor(pre_cursor);
            if is_global_typedef {
                check_semi = declaration::parse_declaration(eng, p)?;
            } else {
                expression_statement(eng, p)?;
            }
        }

        Token::Dot
        | Token::Star
        | Token::Ampersand
        | Token::Increment
        | Token::Decrement
        | Token::OpenParen => {
            p.set_cursor(pre_cursor);
            expression_statement(eng, p)?;
        }

        Token::OpenBrace => {
            parse_block(eng, p, false, true)?;
            check_semi = false;
        }

        Token::KwIf => {
            parse_if(eng, p)?;
            check_semi = false;
        }
        Token::KwWhile => {
            parse_while(eng, p)?;
            check_semi = false;
        }
        Token::KwDo => parse_do_while(eng, p)?,
        Token::KwFor => {
            parse_for(eng, p)?;
            check_semi = false;
        }
        Token::Semicolon => check_semi = false,

        Token::KwInt
        | Token::KwShort
        | Token::KwChar
        | Token::KwLong
        | Token::KwFloat
        | Token::KwDouble
        | Token::KwVoid
        | Token::KwStruct
        | Token::KwUnion
        | Token::KwEnum
        | Token::KwSigned
        | Token::KwUnsigned
        | Token::KwStatic
        | Token::KwAuto
        | Token::KwRegister
        | Token::KwExtern => {
            p.set_cursor(pre_cursor);
            check_semi = declaration::parse_declaration(eng, p)?;
        }

        Token::HashDefine => {
            macros::parse_macro_definition(eng, p)?;
            check_semi = false;
        }
        Token::HashInclude => {
            macros::parse_include(eng, p)?;
            check_semi = false;
        }

        Token::KwSwitch => {
            parse_switch(eng, p)?;
            check_semi = false;
        }
        Token::KwCase => {
            parse_case(eng, p)?;
            check_semi = false;
        }
        Token::KwDefault => {
            parse_default(eng, p)?;
            check_semi = false;
        }
        Token::KwBreak => {
            if p.mode == RunMode::Run {
                p.mode = RunMode::Break;
            }
        }
        Token::KwContinue => {
            if p.mode == RunMode::Run {
                p.mode = RunMode::Continue;
            }
        }
        Token::KwReturn => parse_return(eng, p)?,
        Token::KwTypedef => declaration::parse_typedef(eng, p)?,
        Token::KwGoto => parse_goto(eng, p)?,
        Token::KwDelete => parse_delete(eng, p)?,

        _ => {
            p.set_cursor(pre_cursor);
            return Ok(ParseResult::Error);
        }
    }

    if check_semi {
        p.expect(Token::Semicolon, "';' expected")?;
    }
    Ok(ParseResult::Ok)
}

/// Parse a statement, but only run it if `condition` holds.
pub fn parse_statement_maybe_run(
    eng: &mut Engine,
    p: &mut Parser,
    condition: bool,
    check_semi: bool,
) -> Result<ParseResult> {
    if p.mode != RunMode::Skip && !condition {
        let old = p.mode;
        p.mode = RunMode::Skip;
        let result = parse_statement(eng, p, check_semi);
        p.mode = old;
        result
    } else {
        parse_statement(eng, p, check_semi)
    }
}

/// Parse a `{ ... }` block and return the mode it finished in.
pub fn parse_block(
    eng: &mut Engine,
    p: &mut Parser,
    absorb_open_brace: bool,
    condition: bool,
) -> Result<RunMode> {
    let (prev_scope, scope) = eng.scope_begin(p);
    if absorb_open_brace {
        p.expect(Token::OpenBrace, "'{' expected")?;
    }

    if p.mode == RunMode::Skip || !condition {
        let old = p.mode;
        p.mode = RunMode::Skip;
        while parse_statement(eng, p, true)? == ParseResult::Ok {}
        p.mode = old;
    } else {
        while parse_statement(eng, p, true)? == ParseResult::Ok {}
    }

    p.expect(Token::CloseBrace, "'}' expected")?;
    eng.scope_end(p, scope, prev_scope);
    Ok(p.mode)
}

fn expression_statement(eng: &mut Engine, p: &mut Parser) -> Result<()> {
    match expression_parse(eng, p)? {
        Parsed::Value(v) => {
            eng.free_stack_value(v);
            Ok(())
        }
        Parsed::Skipped => Ok(()),
        Parsed::Missing => Err(p.fail(FailKind::ExpressionExpected)),
    }
}

fn parse_if(eng: &mut Engine, p: &mut Parser) -> Result<()> {
    p.expect(Token::OpenParen, "'(' expected")?;
    let condition = expression_parse_int(eng, p)? != 0;
    p.expect(Token::CloseParen, "')' expected")?;

    if parse_statement_maybe_run(eng, p, condition, true)? != ParseResult::Ok {
        return Err(p.fail(FailKind::Syntax("statement expected")));
    }

    if p.eat(Token::KwElse) {
        if parse_statement_maybe_run(eng, p, !condition, true)? != ParseResult::Ok {
            return Err(p.fail(FailKind::Syntax("statement expected")));
        }
    }
    Ok(())
}

fn parse_while(eng: &mut Engine, p: &mut Parser) -> Result<()> {
    let pre_mode = p.mode;
    p.expect(Token::OpenParen, "'(' expected")?;
    let pre_conditional = p.cursor();

    loop {
        p.set_cursor(pre_conditional);
        let condition = expression_parse_int(eng, p)? != 0;
        p.expect(Token::CloseParen, "')' expected")?;

        if parse_statement_maybe_run(eng, p, condition, true)? != ParseResult::Ok {
            return Err(p.fail(FailKind::Syntax("statement expected")));
        }
        if p.mode == RunMode::Continue {
            p.mode = pre_mode;
        }

        if !(p.mode == RunMode::Run && condition) {
            break;
        }
    }

    if p.mode == RunMode::Break {
        p.mode = pre_mode;
    }
    Ok(())
}

fn parse_do_while(eng: &mut Engine, p: &mut Parser) -> Result<()> {
    let pre_mode = p.mode;
    let pre_statement = p.cursor();

    loop {
        p.set_cursor(pre_statement);
        if parse_statement(eng, p, true)? != ParseResult::Ok {
            return Err(p.fail(FailKind::Syntax("statement expected")));
        }
        if p.mode == RunMode::Continue {
            p.mode = pre_mode;
        }

        p.expect(Token::KwWhile, "'while' expected")?;
        p.expect(Token::OpenParen, "'(' expected")?;
        let condition = expression_parse_int(eng, p)? != 0;
        p.expect(Token::CloseParen, "')' expected")?;

        if !(condition && p.mode == RunMode::Run) {
            break;
        }
    }

    if p.mode == RunMode::Break {
        p.mode = pre_mode;
    }
    Ok(())
}

fn parse_for(eng: &mut Engine, p: &mut Parser) -> Result<()> {
    let old_mode = p.mode;
    let (prev_scope, scope) = eng.scope_begin(p);

    p.expect(Token::OpenParen, "'(' expected")?;
    if parse_statement(eng, p, true)? != ParseResult::Ok {
        return Err(p.fail(FailKind::Syntax("statement expected")));
    }

    let pre_conditional = p.cursor();
    let mut condition = if p.peek() == Token::Semicolon {
        true
    } else {
        expression_parse_int(eng, p)? != 0
    };
    p.expect(Token::Semicolon, "';' expected")?;

    let pre_increment = p.cursor();
    parse_statement_maybe_run(eng, p, false, false)?;
    p.expect(Token::CloseParen, "')' expected")?;

    let pre_statement = p.cursor();
    if parse_statement_maybe_run(eng, p, condition, true)? != ParseResult::Ok {
        return Err(p.fail(FailKind::Syntax("statement expected")));
    }
    if p.mode == RunMode::Continue && old_mode == RunMode::Run {
        p.mode = RunMode::Run;
    }

    let after = p.cursor();

    while condition && p.mode == RunMode::Run {
        p.set_cursor(pre_increment);
        parse_statement(eng, p, false)?;

        p.set_cursor(pre_conditional);
        condition = if p.peek() == Token::Semicolon {
            true
        } else {
            expression_parse_int(eng, p)? != 0
        };

        if condition {
            p.set_cursor(pre_statement);
            parse_statement(eng, p, true)?;
            if p.mode == RunMode::Continue {
                p.mode = RunMode::Run;
            }
        }
    }

    if p.mode == RunMode::Break && old_mode == RunMode::Run {
        p.mode = RunMode::Run;
    }

    eng.scope_end(p, scope, prev_scope);
    p.set_cursor(after);
    Ok(())
}

fn parse_switch(eng: &mut Engine, p: &mut Parser) -> Result<()> {
    p.expect(Token::OpenParen, "'(' expected")?;
    let condition = expression_parse_int(eng, p)?;
    p.expect(Token::CloseParen, "')' expected")?;

    if p.peek() != Token::OpenBrace {
        return Err(p.fail(FailKind::Syntax("'{' expected")));
    }

    let old_mode = p.mode;
    let old_label = p.search_label;
    p.mode = RunMode::CaseSearch;
    p.search_label = condition;

    parse_block(
        eng,
        p,
        true,
        old_mode != RunMode::Skip && old_mode != RunMode::Return,
    )?;

    if p.mode != RunMode::Return {
        p.mode = old_mode;
    }
    p.search_label = old_label;
    Ok(())
}

fn parse_case(eng: &mut Engine, p: &mut Parser) -> Result<()> {
    let condition = if p.mode == RunMode::CaseSearch {
        // evaluate the label even while searching
        p.mode = RunMode::Run;
        let c = expression_parse_int(eng, p)?;
        p.mode = RunMode::CaseSearch;
        c
    } else {
        expression_parse_int(eng, p)?
    };

    p.expect(Token::Colon, "':' expected")?;

    if p.mode == RunMode::CaseSearch && condition == p.search_label {
        p.mode = RunMode::Run;
    }
    Ok(())
}

fn parse_default(_eng: &mut Engine, p: &mut Parser) -> Result<()> {
    p.expect(Token::Colon, "':' expected")?;
    if p.mode == RunMode::CaseSearch {
        p.mode = RunMode::Run;
    }
    Ok(())
}

fn parse_return(eng: &mut Engine, p: &mut Parser) -> Result<()> {
    if p.mode != RunMode::Run {
        expression_parse(eng, p)?;
        return Ok(());
    }

    let returns_value = match eng.frames.last() {
        None => true,
        Some(frame) => {
            eng.types.base(eng.cell(frame.return_value).ty) != crate::ty::BaseType::Void
        }
    };

    if returns_value {
        let Parsed::Value(cvalue) = expression_parse(eng, p)? else {
            return Err(p.fail(FailKind::Syntax("value required in return")));
        };
        match eng.frames.last() {
            None => {
                // a top-level return ends the program
                let code = crate::expr::coerce::coerce_int(eng, cvalue);
                eng.free_stack_value(cvalue);
                eng.exit_value = Some(code);
            }
            Some(frame) => {
                let ret = frame.return_value;
                assign(eng, p, ret, cvalue, true, None, 0, false)?;
                eng.free_stack_value(cvalue);
            }
        }
    } else if expression_parse(eng, p)?.present() {
        return Err(p.fail(FailKind::ReturnValueUnexpected));
    }

    p.mode = RunMode::Return;
    Ok(())
}

fn parse_goto(_eng: &mut Engine, p: &mut Parser) -> Result<()> {
    let Token::Ident(label) = p.next() else {
        return Err(p.fail(FailKind::Syntax("identifier expected")));
    };
    if p.mode == RunMode::Run {
        p.search_goto = Some(label);
        p.mode = RunMode::Goto;
    }
    Ok(())
}

fn parse_delete(eng: &mut Engine, p: &mut Parser) -> Result<()> {
    let Token::Ident(name) = p.next() else {
        return Err(p.fail(FailKind::Syntax("identifier expected")));
    };
    if p.mode == RunMode::Run {
        let Some(val) = eng.globals.delete(name) else {
            return Err(p.fail(FailKind::UnknownIdentifier(
                eng.interner.resolve(name).to_string(),
            )));
        };
        eng.free_variable(val);
    }
    Ok(())
}
