use crate::intern::Symbol;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// A position in the source text, for diagnostics.
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

impl Pos {
    pub const START: Pos = Pos { line: 1, col: 1 };
}

#[derive(Clone, Copy, Debug, PartialEq)]
/// A token plus the source position it was lexed at.
pub struct Spanned {
    pub tok: Token,
    pub pos: Pos,
}

#[derive(Clone, Copy, Debug, PartialEq)]
/// A lexical token of the crick source language.
///
/// Operator tokens double as the keys of the precedence table; the
/// `Cast` token is synthetic (never produced by the lexer, pushed by the
/// expression driver when it recognizes a parenthesized type).
pub enum Token {
    Comma,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    ShlAssign,
    ShrAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    Question,
    Colon,
    LogicalOr,
    LogicalAnd,
    BitOr,
    BitXor,
    Ampersand,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Shl,
    Shr,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Increment,
    Decrement,
    Bang,
    Tilde,
    Sizeof,
    Cast,
    OpenBracket,
    CloseBracket,
    Dot,
    Arrow,
    OpenParen,
    CloseParen,

    Ident(Symbol),
    IntLit(i64),
    FpLit(f64),
    StrLit(Symbol),
    CharLit(u8),

    Semicolon,
    Ellipsis,
    OpenBrace,
    CloseBrace,

    /// `..`: force lookup in the global scope.
    DotDot,
    /// `::`: same as `..`.
    ColonColon,

    KwInt,
    KwChar,
    KwFloat,
    KwDouble,
    KwVoid,
    KwEnum,
    KwLong,
    KwSigned,
    KwShort,
    KwStatic,
    KwAuto,
    KwRegister,
    KwExtern,
    KwStruct,
    KwUnion,
    KwUnsigned,
    KwTypedef,
    KwContinue,
    KwDo,
    KwElse,
    KwFor,
    KwGoto,
    KwIf,
    KwWhile,
    KwBreak,
    KwSwitch,
    KwCase,
    KwDefault,
    KwReturn,
    KwNew,
    KwDelete,

    HashDefine,
    HashInclude,
    /// `(` directly adjacent to a macro name in a `#define` (a
    /// parameterized macro, as opposed to an object macro whose body
    /// merely starts with a parenthesis).
    OpenMacroParen,

    /// End of a preprocessor directive line. Only emitted inside
    /// directives, so macro bodies know where they stop.
    EndOfLine,
    Eof,
}

impl Token {
    /// True for the keywords that can start a type: base types, aggregate
    /// introducers and storage/sign qualifiers.
    pub fn is_type_word(self) -> bool {
        matches!(
            self,
            Token::KwInt
                | Token::KwChar
                | Token::KwFloat
                | Token::KwDouble
                | Token::KwVoid
                | Token::KwEnum
                | Token::KwLong
                | Token::KwSigned
                | Token::KwShort
                | Token::KwStatic
                | Token::KwAuto
                | Token::KwRegister
                | Token::KwExtern
                | Token::KwStruct
                | Token::KwUnion
                | Token::KwUnsigned
        )
    }
}
