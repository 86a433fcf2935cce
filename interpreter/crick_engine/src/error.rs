//! The error surface of the evaluator.
//!
//! Every fatal condition is classified by a [`FailKind`] and carries the
//! source position it was raised at. There is no local recovery inside the
//! evaluator: a `Fail` propagates out through `?` until the embedder
//! catches it and rewinds the arena.

use crick_lexer::Pos;
use std::fmt;
use std::rc::Rc;

pub type Result<T, E = Fail> = std::result::Result<T, E>;

#[derive(Debug)]
pub struct Fail {
    pub file: Option<Rc<str>>,
    pub pos: Option<Pos>,
    pub kind: FailKind,
}

impl Fail {
    pub fn bare(kind: FailKind) -> Fail {
        Fail {
            file: None,
            pos: None,
            kind,
        }
    }

    pub fn at(file: Rc<str>, pos: Pos, kind: FailKind) -> Fail {
        Fail {
            file: Some(file),
            pos: Some(pos),
            kind,
        }
    }
}

#[derive(Debug)]
pub enum FailKind {
    /// A malformed construct; the message names what was expected.
    Syntax(&'static str),
    NotAnLValue,
    CantTakeAddress,
    AssignMismatch {
        to: String,
        from: String,
        /// Set when the assignment is a parameter binding: (callee, argument number).
        ctx: Option<(String, usize)>,
    },
    AssignArraySize {
        to: u32,
        from: u32,
    },
    InvalidOperation,
    InvalidExpression,
    ExpressionExpected,
    IntegerExpected(String),
    BracketsNotClosed,
    UnknownIdentifier(String),
    NotAMember {
        member: String,
        in_type: String,
    },
    NotAStruct(String),
    NotAPointer(String),
    NotAFunction(String),
    NotAnArray(String),
    ArrayIndexNotInt,
    TernaryConditionNotNumeric,
    NullDereference,
    PointerOutOfBounds,
    DivisionByZero,
    TooManyArguments(String),
    TooFewArguments(String),
    TooManyParameters(String),
    VoidValue,
    VoidVariable,
    AlreadyDefined(String),
    ReturnValueMissing(String),
    ReturnValueUnexpected,
    GotoLabelNotFound(String),
    NestedFunctions,
    BadMainSignature(&'static str),
    ThisTypeUnknown(String),
    IncludeUnknown(String),
    TooManyArrayElements,
    OutOfMemory,
    Lex(String),
    /// Clean termination requested by the program (`exit(n)` or a
    /// top-level `return`). Not an error, but it unwinds the same way.
    Exit(i64),
}

impl fmt::Display for Fail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Some(file), Some(pos)) = (&self.file, &self.pos) {
            write!(f, "{}:{}:{}: ", file, pos.line, pos.col)?;
        }
        write!(f, "{}", self.kind)
    }
}

impl fmt::Display for FailKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use FailKind::*;
        match self {
            Syntax(what) => write!(f, "{}", what),
            NotAnLValue => write!(f, "can't assign to this"),
            CantTakeAddress => write!(f, "can't get the address of this"),
            AssignMismatch { to, from, ctx } => {
                write!(f, "can't assign {} from {}", to, from)?;
                if let Some((func, arg)) = ctx {
                    write!(f, " in argument {} of call to {}()", arg, func)?;
                }
                Ok(())
            }
            AssignArraySize { to, from } => {
                write!(f, "can't assign from an array of size {} to one of size {}", from, to)
            }
            InvalidOperation => write!(f, "invalid operation"),
            InvalidExpression => write!(f, "invalid expression"),
            ExpressionExpected => write!(f, "expression expected"),
            IntegerExpected(t) => write!(f, "integer value expected instead of {}", t),
            BracketsNotClosed => write!(f, "brackets not closed"),
            UnknownIdentifier(name) => write!(f, "'{}' is undefined", name),
            NotAMember { member, in_type } => {
                write!(f, "{} doesn't have a member called '{}'", in_type, member)
            }
            NotAStruct(t) => write!(f, "{} is not a struct or union", t),
            NotAPointer(t) => write!(f, "{} is not a pointer", t),
            NotAFunction(t) => write!(f, "{} is not a function - can't call", t),
            NotAnArray(t) => write!(f, "this {} is not an array", t),
            ArrayIndexNotInt => write!(f, "array index must be an integer"),
            TernaryConditionNotNumeric => {
                write!(f, "first argument to '?' should be a number")
            }
            NullDereference => write!(f, "NULL pointer dereference"),
            PointerOutOfBounds => write!(f, "pointer is outside the interpreter's memory"),
            DivisionByZero => write!(f, "division by zero"),
            TooManyArguments(name) => write!(f, "too many arguments to {}()", name),
            TooFewArguments(name) => write!(f, "not enough arguments to '{}'", name),
            TooManyParameters(name) => write!(f, "too many parameters to '{}'", name),
            VoidValue => write!(f, "a void value isn't much use here"),
            VoidVariable => write!(f, "can't define a void variable"),
            AlreadyDefined(name) => write!(f, "'{}' is already defined", name),
            ReturnValueMissing(ty) => {
                write!(f, "no value returned from a function returning {}", ty)
            }
            ReturnValueUnexpected => write!(f, "value in return from a void function"),
            GotoLabelNotFound(label) => write!(f, "couldn't find goto label '{}'", label),
            NestedFunctions => write!(f, "nested function definitions are not allowed"),
            BadMainSignature(what) => write!(f, "{}", what),
            ThisTypeUnknown(name) => write!(f, "cannot determine the type of '{}'", name),
            IncludeUnknown(name) => write!(f, "can't include '{}'", name),
            TooManyArrayElements => write!(f, "too many array elements"),
            OutOfMemory => write!(f, "out of memory"),
            Lex(msg) => write!(f, "{}", msg),
            Exit(code) => write!(f, "exit({})", code),
        }
    }
}

impl std::error::Error for Fail {}
