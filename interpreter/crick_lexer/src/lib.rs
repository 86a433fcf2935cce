pub mod intern;
pub mod lex;
pub mod token;

pub use intern::{Interner, Symbol};
pub use lex::{tokenize, LexError};
pub use token::{Pos, Spanned, Token};
