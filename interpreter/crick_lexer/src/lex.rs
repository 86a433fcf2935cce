//! The tokenizer.
//!
//! The whole source is lexed up front into a flat token buffer. The parser
//! replays that buffer with a cursor; rewinding is a cursor copy, and
//! function or macro bodies are (start, end) spans over the shared buffer.

use crate::intern::Interner;
use crate::token::{Pos, Spanned, Token};
use std::fmt;
use tracing::debug;

#[derive(Debug)]
pub struct LexError {
    pub pos: Pos,
    pub kind: LexErrorKind,
}

#[derive(Debug)]
pub enum LexErrorKind {
    UnterminatedString,
    UnterminatedChar,
    UnterminatedComment,
    BadDirective,
    IllegalCharacter(char),
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match &self.kind {
            LexErrorKind::UnterminatedString => "unterminated string constant".to_string(),
            LexErrorKind::UnterminatedChar => "unterminated character constant".to_string(),
            LexErrorKind::UnterminatedComment => "unterminated comment".to_string(),
            LexErrorKind::BadDirective => "unrecognized preprocessor directive".to_string(),
            LexErrorKind::IllegalCharacter(c) => format!("illegal character '{}'", c),
        };
        write!(f, "{}:{}: {}", self.pos.line, self.pos.col, msg)
    }
}

impl std::error::Error for LexError {}

struct Lexer<'src> {
    src: &'src [u8],
    at: usize,
    line: u32,
    col: u32,
    /// Set while lexing a `#define`/`#include` line; makes the newline
    /// emit an `EndOfLine` token.
    in_directive: bool,
    /// The next identifier is the name being `#define`d.
    expect_macro_name: bool,
    /// The previous token ended a macro name, so an immediately adjacent
    /// `(` is the parameter-list opener.
    macro_name_just_lexed: bool,
}

/// Tokenize `source`, interning identifiers and string contents into
/// `interner`. The result always ends with a single `Eof` token.
pub fn tokenize(source: &str, interner: &mut Interner) -> Result<Vec<Spanned>, LexError> {
    let mut lx = Lexer {
        src: source.as_bytes(),
        at: 0,
        line: 1,
        col: 1,
        in_directive: false,
        expect_macro_name: false,
        macro_name_just_lexed: false,
    };
    let mut out = Vec::new();
    while let Some(spanned) = lx.next_token(interner)? {
        out.push(spanned);
    }
    out.push(Spanned {
        tok: Token::Eof,
        pos: lx.pos(),
    });
    debug!("lexed {} tokens", out.len());
    Ok(out)
}

impl<'src> Lexer<'src> {
    fn pos(&self) -> Pos {
        Pos {
            line: self.line,
            col: self.col,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.at).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.at + 1).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.at += 1;
        if c == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn err(&self, kind: LexErrorKind) -> LexError {
        LexError {
            pos: self.pos(),
            kind,
        }
    }

    fn next_token(&mut self, interner: &mut Interner) -> Result<Option<Spanned>, LexError> {
        loop {
            // skip whitespace, tracking directive-terminating newlines
            while let Some(c) = self.peek() {
                if c == b'\n' && self.in_directive {
                    let pos = self.pos();
                    self.bump();
                    self.in_directive = false;
                    self.expect_macro_name = false;
                    self.macro_name_just_lexed = false;
                    return Ok(Some(Spanned {
                        tok: Token::EndOfLine,
                        pos,
                    }));
                }
                if c.is_ascii_whitespace() {
                    self.macro_name_just_lexed = false;
                    self.bump();
                } else {
                    break;
                }
            }

            // comments
            if self.peek() == Some(b'/') {
                match self.peek2() {
                    Some(b'/') => {
                        while let Some(c) = self.peek() {
                            if c == b'\n' {
                                break;
                            }
                            self.bump();
                        }
                        continue;
                    }
                    Some(b'*') => {
                        self.bump();
                        self.bump();
                        loop {
                            match self.bump() {
                                Some(b'*') if self.peek() == Some(b'/') => {
                                    self.bump();
                                    break;
                                }
                                Some(_) => {}
                                None => return Err(self.err(LexErrorKind::UnterminatedComment)),
                            }
                        }
                        continue;
                    }
                    _ => {}
                }
            }

            let pos = self.pos();
            let Some(c) = self.peek() else {
                return Ok(None);
            };

            let was_macro_name = std::mem::replace(&mut self.macro_name_just_lexed, false);

            let tok = match c {
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                    let tok = self.lex_word(interner);
                    if self.expect_macro_name && matches!(tok, Token::Ident(_)) {
                        // the macro name; an adjacent '(' opens parameters
                        self.macro_name_just_lexed = true;
                        self.expect_macro_name = false;
                    }
                    return Ok(Some(Spanned { tok, pos }));
                }
                b'0'..=b'9' => {
                    return Ok(Some(Spanned {
                        tok: self.lex_number(),
                        pos,
                    }));
                }
                b'"' => {
                    return Ok(Some(Spanned {
                        tok: self.lex_string(interner)?,
                        pos,
                    }));
                }
                b'\'' => {
                    return Ok(Some(Spanned {
                        tok: self.lex_char()?,
                        pos,
                    }));
                }
                b'#' => {
                    self.bump();
                    let word = self.take_word();
                    self.in_directive = true;
                    match word.as_str() {
                        "define" => {
                            self.expect_macro_name = true;
                            Token::HashDefine
                        }
                        "include" => Token::HashInclude,
                        _ => return Err(self.err(LexErrorKind::BadDirective)),
                    }
                }
                _ => {
                    self.bump();
                    self.lex_operator(c, was_macro_name)?
                }
            };
            return Ok(Some(Spanned { tok, pos }));
        }
    }

    fn take_word(&mut self) -> String {
        let start = self.at;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.bump();
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.src[start..self.at]).into_owned()
    }

    fn lex_word(&mut self, interner: &mut Interner) -> Token {
        let word = self.take_word();
        match word.as_str() {
            "int" => Token::KwInt,
            "char" => Token::KwChar,
            "float" => Token::KwFloat,
            "double" => Token::KwDouble,
            "void" => Token::KwVoid,
            "enum" => Token::KwEnum,
            "long" => Token::KwLong,
            "signed" => Token::KwSigned,
            "short" => Token::KwShort,
            "static" => Token::KwStatic,
            "auto" => Token::KwAuto,
            "register" => Token::KwRegister,
            "extern" => Token::KwExtern,
            "struct" => Token::KwStruct,
            "union" => Token::KwUnion,
            "unsigned" => Token::KwUnsigned,
            "typedef" => Token::KwTypedef,
            "continue" => Token::KwContinue,
            "do" => Token::KwDo,
            "else" => Token::KwElse,
            "for" => Token::KwFor,
            "goto" => Token::KwGoto,
            "if" => Token::KwIf,
            "while" => Token::KwWhile,
            "break" => Token::KwBreak,
            "switch" => Token::KwSwitch,
            "case" => Token::KwCase,
            "default" => Token::KwDefault,
            "return" => Token::KwReturn,
            "sizeof" => Token::Sizeof,
            "new" => Token::KwNew,
            "delete" => Token::KwDelete,
            _ => Token::Ident(interner.intern(&word)),
        }
    }

    fn lex_number(&mut self) -> Token {
        let mut digits = String::new();
        if self.peek() == Some(b'0') && matches!(self.peek2(), Some(b'x') | Some(b'X')) {
            self.bump();
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() {
                    digits.push(c as char);
                    self.bump();
                } else {
                    break;
                }
            }
            return Token::IntLit(i64::from_str_radix(&digits, 16).unwrap_or(0));
        }

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c as char);
                self.bump();
            } else {
                break;
            }
        }

        // a '.' followed by a digit makes it a float; ".." must stay an operator
        let is_float = (self.peek() == Some(b'.')
            && self.peek2().is_some_and(|c| c.is_ascii_digit()))
            || matches!(self.peek(), Some(b'e') | Some(b'E'));
        if is_float {
            if self.eat(b'.') {
                digits.push('.');
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        digits.push(c as char);
                        self.bump();
                    } else {
                        break;
                    }
                }
            }
            if matches!(self.peek(), Some(b'e') | Some(b'E')) {
                digits.push('e');
                self.bump();
                if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                    digits.push(self.bump().unwrap() as char);
                }
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        digits.push(c as char);
                        self.bump();
                    } else {
                        break;
                    }
                }
            }
            self.eat(b'f');
            return Token::FpLit(digits.parse().unwrap_or(0.0));
        }

        if digits.len() > 1 && digits.starts_with('0') {
            return Token::IntLit(i64::from_str_radix(&digits[1..], 8).unwrap_or(0));
        }
        Token::IntLit(digits.parse().unwrap_or(0))
    }

    fn lex_escape(&mut self) -> Result<u8, LexError> {
        let c = self.bump().ok_or_else(|| self.err(LexErrorKind::UnterminatedString))?;
        Ok(match c {
            b'n' => b'\n',
            b't' => b'\t',
            b'r' => b'\r',
            b'0' => 0,
            b'a' => 7,
            b'b' => 8,
            b'f' => 12,
            b'v' => 11,
            other => other,
        })
    }

    fn lex_string(&mut self, interner: &mut Interner) -> Result<Token, LexError> {
        self.bump(); // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                Some(b'"') => break,
                Some(b'\\') => bytes.push(self.lex_escape()?),
                Some(c) => bytes.push(c),
                None => return Err(self.err(LexErrorKind::UnterminatedString)),
            }
        }
        let contents = String::from_utf8_lossy(&bytes).into_owned();
        Ok(Token::StrLit(interner.intern(&contents)))
    }

    fn lex_char(&mut self) -> Result<Token, LexError> {
        self.bump(); // opening quote
        let c = match self.bump() {
            Some(b'\\') => self.lex_escape()?,
            Some(c) => c,
            None => return Err(self.err(LexErrorKind::UnterminatedChar)),
        };
        if !self.eat(b'\'') {
            return Err(self.err(LexErrorKind::UnterminatedChar));
        }
        Ok(Token::CharLit(c))
    }

    fn lex_operator(&mut self, c: u8, was_macro_name: bool) -> Result<Token, LexError> {
        Ok(match c {
            b'(' => {
                if was_macro_name {
                    Token::OpenMacroParen
                } else {
                    Token::OpenParen
                }
            }
            b')' => Token::CloseParen,
            b'[' => Token::OpenBracket,
            b']' => Token::CloseBracket,
            b'{' => Token::OpenBrace,
            b'}' => Token::CloseBrace,
            b';' => Token::Semicolon,
            b',' => Token::Comma,
            b'?' => Token::Question,
            b'~' => Token::Tilde,
            b'+' => {
                if self.eat(b'+') {
                    Token::Increment
                } else if self.eat(b'=') {
                    Token::AddAssign
                } else {
                    Token::Plus
                }
            }
            b'-' => {
                if self.eat(b'-') {
                    Token::Decrement
                } else if self.eat(b'=') {
                    Token::SubAssign
                } else if self.eat(b'>') {
                    Token::Arrow
                } else {
                    Token::Minus
                }
            }
            b'*' => {
                if self.eat(b'=') {
                    Token::MulAssign
                } else {
                    Token::Star
                }
            }
            b'/' => {
                if self.eat(b'=') {
                    Token::DivAssign
                } else {
                    Token::Slash
                }
            }
            b'%' => {
                if self.eat(b'=') {
                    Token::ModAssign
                } else {
                    Token::Percent
                }
            }
            b'=' => {
                if self.eat(b'=') {
                    Token::Equal
                } else {
                    Token::Assign
                }
            }
            b'!' => {
                if self.eat(b'=') {
                    Token::NotEqual
                } else {
                    Token::Bang
                }
            }
            b'<' => {
                if self.eat(b'=') {
                    Token::LessEqual
                } else if self.eat(b'<') {
                    if self.eat(b'=') {
                        Token::ShlAssign
                    } else {
                        Token::Shl
                    }
                } else {
                    Token::Less
                }
            }
            b'>' => {
                if self.eat(b'=') {
                    Token::GreaterEqual
                } else if self.eat(b'>') {
                    if self.eat(b'=') {
                        Token::ShrAssign
                    } else {
                        Token::Shr
                    }
                } else {
                    Token::Greater
                }
            }
            b'&' => {
                if self.eat(b'&') {
                    Token::LogicalAnd
                } else if self.eat(b'=') {
                    Token::AndAssign
                } else {
                    Token::Ampersand
                }
            }
            b'|' => {
                if self.eat(b'|') {
                    Token::LogicalOr
                } else if self.eat(b'=') {
                    Token::OrAssign
                } else {
                    Token::BitOr
                }
            }
            b'^' => {
                if self.eat(b'=') {
                    Token::XorAssign
                } else {
                    Token::BitXor
                }
            }
            b'.' => {
                if self.eat(b'.') {
                    if self.eat(b'.') {
                        Token::Ellipsis
                    } else {
                        Token::DotDot
                    }
                } else {
                    Token::Dot
                }
            }
            b':' => {
                if self.eat(b':') {
                    Token::ColonColon
                } else {
                    Token::Colon
                }
            }
            other => return Err(self.err(LexErrorKind::IllegalCharacter(other as char))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Token> {
        let mut i = Interner::new();
        tokenize(src, &mut i).unwrap().into_iter().map(|s| s.tok).collect()
    }

    #[test]
    fn operators_and_literals() {
        let t = toks("x += 0x10 >> 2;");
        assert!(matches!(t[0], Token::Ident(_)));
        assert_eq!(
            &t[1..],
            &[
                Token::AddAssign,
                Token::IntLit(16),
                Token::Shr,
                Token::IntLit(2),
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn scope_resolution_tokens() {
        let t = toks("..a ::b a.b a...");
        assert!(t.contains(&Token::DotDot));
        assert!(t.contains(&Token::ColonColon));
        assert!(t.contains(&Token::Dot));
        assert!(t.contains(&Token::Ellipsis));
    }

    #[test]
    fn float_versus_dot_dot() {
        assert!(matches!(toks("1.5")[0], Token::FpLit(f) if (f - 1.5).abs() < 1e-9));
        // "1..x" is an int, a '..', then an identifier
        let t = toks("1..x");
        assert_eq!(t[0], Token::IntLit(1));
        assert_eq!(t[1], Token::DotDot);
    }

    #[test]
    fn directive_newline_markers() {
        let t = toks("#define TEN 10\nint x;");
        let eol_at = t.iter().position(|t| *t == Token::EndOfLine).unwrap();
        assert_eq!(t[0], Token::HashDefine);
        assert_eq!(t[eol_at - 1], Token::IntLit(10));
        assert_eq!(t[eol_at + 1], Token::KwInt);
    }

    #[test]
    fn macro_paren_adjacency() {
        let fun = toks("#define SQR(x) x*x\n");
        assert!(fun.contains(&Token::OpenMacroParen));
        let obj = toks("#define PAIR (1)\n");
        assert!(!obj.contains(&Token::OpenMacroParen));
        assert!(obj.contains(&Token::OpenParen));
    }

    #[test]
    fn char_and_string_escapes() {
        let mut i = Interner::new();
        let t = tokenize("'\\n' \"a\\tb\"", &mut i).unwrap();
        assert_eq!(t[0].tok, Token::CharLit(b'\n'));
        match t[1].tok {
            Token::StrLit(sym) => assert_eq!(i.resolve(sym), "a\tb"),
            other => panic!("expected string, got {:?}", other),
        }
    }
}
