use logos::Logos;
use std::fmt;

/// Token types for the project-description language
///
/// Whitespace separates tokens but is otherwise insignificant, except that
/// newlines terminate statements, so they are emitted as tokens of their own.
/// A backslash at the end of a line continues the statement.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t]+")]
#[logos(skip r"#[^\n]*")]
#[logos(skip r"\\\r?\n")]
pub enum Token<'src> {
    #[regex(r"\r?\n")]
    Newline,

    // Assignment operators
    #[token("=")]
    Assign,

    #[token("+=")]
    PlusAssign,

    #[token("-=")]
    MinusAssign,

    #[token("*=")]
    StarAssign,

    // Bare arithmetic symbols. Values such as `c++17` or `-O2` lex as several
    // tokens; the parser glues adjacent tokens back into one word by span.
    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    // Symbols
    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token(",")]
    Comma,

    #[token(":")]
    Colon,

    #[token("|")]
    Pipe,

    #[token("!")]
    Bang,

    // Variable references: $$NAME and $${NAME}
    #[regex(r"\$\$[A-Za-z_][A-Za-z0-9_.]*", |lex| &lex.slice()[2..])]
    #[regex(r"\$\$\{[A-Za-z_][A-Za-z0-9_.]*\}", trim_braced)]
    VarRef(&'src str),

    // Environment references: $$(NAME)
    #[regex(r"\$\$\([A-Za-z_][A-Za-z0-9_]*\)", trim_braced)]
    EnvRef(&'src str),

    // String literals, quotes included in the slice
    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| lex.slice())]
    Quoted(&'src str),

    // Bare words: identifiers, paths, glob patterns, flags
    #[regex(r#"[^# \t\r\n(){}:|!,"=+\-*$\\]+"#, |lex| lex.slice())]
    Word(&'src str),
}

fn trim_braced<'src>(lex: &mut logos::Lexer<'src, Token<'src>>) -> &'src str {
    let slice = lex.slice();
    &slice[3..slice.len() - 1]
}

impl<'src> fmt::Display for Token<'src> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Newline => write!(f, "end of line"),
            Token::Assign => write!(f, "="),
            Token::PlusAssign => write!(f, "+="),
            Token::MinusAssign => write!(f, "-="),
            Token::StarAssign => write!(f, "*="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Pipe => write!(f, "|"),
            Token::Bang => write!(f, "!"),
            Token::VarRef(name) => write!(f, "$${}", name),
            Token::EnvRef(name) => write!(f, "$$({})", name),
            Token::Quoted(s) => write!(f, "string {}", s),
            Token::Word(w) => write!(f, "word '{}'", w),
        }
    }
}

/// Tokenize a source string into (token, byte range) pairs.
///
/// Returns the byte offset of the first unlexable character on failure.
pub fn tokenize(source: &str) -> Result<Vec<(Token, std::ops::Range<usize>)>, usize> {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    for (result, span) in lexer.spanned() {
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => return Err(span.start),
        }
    }
    Ok(tokens)
}
