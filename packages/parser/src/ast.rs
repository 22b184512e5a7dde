use serde::{Deserialize, Serialize};

/// Span information for source location tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A parsed project file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProFile {
    pub statements: Vec<Statement>,
}

impl ProFile {
    pub fn new() -> Self {
        Self {
            statements: Vec::new(),
        }
    }
}

impl Default for ProFile {
    fn default() -> Self {
        Self::new()
    }
}

/// A single top-level or block-level statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Assignment(Assignment),
    Condition(Condition),
    /// A block-level function call such as include(), message() or error()
    Call(Call),
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::Assignment(a) => a.span,
            Statement::Condition(c) => c.span,
            Statement::Call(c) => c.span,
        }
    }
}

/// `NAME op value value ...`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub name: String,
    pub op: AssignOp,
    pub values: Vec<Word>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    /// `=` replaces the value list
    Set,
    /// `+=` appends
    Append,
    /// `-=` removes every occurrence of each value
    Remove,
    /// `*=` appends values not already present
    UniqueAppend,
}

/// A guarded block or statement with an optional else branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub test: Test,
    pub then_branch: Vec<Statement>,
    pub else_branch: Vec<Statement>,
    pub span: Span,
}

/// A condition test. `|` between tests is OR and `!` negates; a `:`
/// chain like `unix:debug` parses as nested conditions, which gives
/// the same AND semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Test {
    /// A bare word tested against the active feature set
    Feature(String),
    Not(Box<Test>),
    Or(Box<Test>, Box<Test>),
    /// A test function such as equals(), contains(), exists() or isEmpty()
    Call(Call),
}

/// A function call with comma-separated argument lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub name: String,
    /// Each argument is itself a list of words
    pub args: Vec<Vec<Word>>,
    pub span: Span,
}

/// One whitespace-delimited value, split into expandable parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub parts: Vec<WordPart>,
    pub span: Span,
}

impl Word {
    /// The literal text when the word has a single literal part
    pub fn as_literal(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [WordPart::Literal(text)] => Some(text),
            _ => None,
        }
    }

    pub fn literal(text: impl Into<String>, span: Span) -> Self {
        Self {
            parts: vec![WordPart::Literal(text.into())],
            span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WordPart {
    Literal(String),
    /// `$$NAME` or `$${NAME}`
    Var(String),
    /// `$$(NAME)`
    Env(String),
    /// An inline replace-function call such as `$$member(LIST, 0)`
    Call(Call),
}
