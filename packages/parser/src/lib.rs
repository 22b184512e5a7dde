pub mod lexer;
pub mod parser;
pub mod ast;
pub mod error;
#[cfg(feature = "pretty-errors")]
pub mod report;

pub use lexer::{Token, tokenize};
pub use parser::{Parser, parse};
pub use ast::{
    AssignOp, Assignment, Call, Condition, ProFile, Span, Statement, Test, Word, WordPart,
};
pub use error::{ParseError, ParseResult};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexer_basic() {
        let source = "TARGET = demo";
        let tokens = tokenize(source).unwrap();
        assert_eq!(tokens.len(), 3);
    }
}
