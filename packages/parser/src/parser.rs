use crate::ast::*;
use crate::error::{ParseError, ParseResult};
use crate::lexer::{tokenize, Token};
use std::ops::Range;

/// Parser for project-description files
///
/// The lexer splits flag-like values such as `-std=c++17` into several
/// tokens. The parser reassembles them by looking at span adjacency: tokens
/// with no whitespace between them belong to the same word.
pub struct Parser<'src> {
    source: &'src str,
    tokens: Vec<(Token<'src>, Range<usize>)>,
    pos: usize,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> ParseResult<Self> {
        let tokens = tokenize(source).map_err(ParseError::lexer_error)?;
        Ok(Self {
            source,
            tokens,
            pos: 0,
        })
    }

    /// Parse a complete project file
    pub fn parse_pro_file(&mut self) -> ParseResult<ProFile> {
        let mut pro = ProFile::new();

        self.skip_newlines();
        while !self.is_at_end() {
            pro.statements.push(self.parse_statement()?);
            self.expect_statement_end()?;
            self.skip_newlines();
        }

        Ok(pro)
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        match self.peek() {
            Some((Token::Word("else"), span)) => Err(ParseError::invalid_syntax(
                span.start,
                "else without a matching condition",
            )),
            Some((Token::Word(_), _)) => {
                if self.assignment_follows() {
                    self.parse_assignment().map(Statement::Assignment)
                } else {
                    self.parse_condition_or_call()
                }
            }
            Some((Token::Bang, _)) => self.parse_condition_or_call(),
            Some((token, span)) => Err(ParseError::unexpected_token(
                span.start,
                "a statement",
                token.to_string(),
            )),
            None => Err(ParseError::unexpected_eof(self.source.len())),
        }
    }

    /// True when the tokens at the cursor form `NAME op ...`
    fn assignment_follows(&self) -> bool {
        matches!(
            self.peek_at(1),
            Some((
                Token::Assign | Token::PlusAssign | Token::MinusAssign | Token::StarAssign,
                _
            ))
        )
    }

    fn parse_assignment(&mut self) -> ParseResult<Assignment> {
        let start = self.current_pos();
        let name = match self.advance() {
            Some((Token::Word(name), _)) => name.to_string(),
            _ => unreachable!("caller checked for a word"),
        };

        let op = match self.advance() {
            Some((Token::Assign, _)) => AssignOp::Set,
            Some((Token::PlusAssign, _)) => AssignOp::Append,
            Some((Token::MinusAssign, _)) => AssignOp::Remove,
            Some((Token::StarAssign, _)) => AssignOp::UniqueAppend,
            _ => unreachable!("caller checked for an assignment operator"),
        };

        let values = self.parse_values()?;
        let end = self.previous_end();

        Ok(Assignment {
            name,
            op,
            values,
            span: Span::new(start, end),
        })
    }

    /// Parse a statement that starts like a condition: either a guarded
    /// scope (`test: stmt` / `test { ... }`) or a block-level call such as
    /// `include(...)` or `message(...)`.
    fn parse_condition_or_call(&mut self) -> ParseResult<Statement> {
        let start = self.current_pos();
        let test = self.parse_or_test()?;

        match self.peek() {
            Some((Token::LBrace, _)) => {
                let then_branch = self.parse_block()?;
                let else_branch = self.parse_else_branch()?;
                let end = self.previous_end();
                Ok(Statement::Condition(Condition {
                    test,
                    then_branch,
                    else_branch,
                    span: Span::new(start, end),
                }))
            }
            Some((Token::Colon, _)) => {
                self.advance();
                let then_branch = vec![self.parse_statement()?];
                let else_branch = self.parse_else_branch()?;
                let end = self.previous_end();
                Ok(Statement::Condition(Condition {
                    test,
                    then_branch,
                    else_branch,
                    span: Span::new(start, end),
                }))
            }
            Some((Token::Newline | Token::RBrace, _)) | None => match test {
                // A lone call at block level: include(), message(), error()
                Test::Call(call) => Ok(Statement::Call(call)),
                _ => Err(ParseError::invalid_syntax(
                    self.current_pos(),
                    "expected ':' or '{' after condition",
                )),
            },
            Some((token, span)) => Err(ParseError::unexpected_token(
                span.start,
                "':' or '{' after condition",
                token.to_string(),
            )),
        }
    }

    /// `test | test | ...`
    fn parse_or_test(&mut self) -> ParseResult<Test> {
        let mut test = self.parse_unary_test()?;
        while self.match_token(Token::Pipe) {
            let right = self.parse_unary_test()?;
            test = Test::Or(Box::new(test), Box::new(right));
        }
        Ok(test)
    }

    fn parse_unary_test(&mut self) -> ParseResult<Test> {
        match self.peek() {
            Some((Token::Bang, _)) => {
                self.advance();
                let inner = self.parse_unary_test()?;
                Ok(Test::Not(Box::new(inner)))
            }
            Some((Token::Word(_), _)) => {
                let (text, span) = self.merge_bare_word();
                if self.check(&Token::LParen) && self.adjacent_to_previous() {
                    let call = self.parse_call(text, span.start)?;
                    Ok(Test::Call(call))
                } else {
                    Ok(Test::Feature(text))
                }
            }
            Some((token, span)) => Err(ParseError::unexpected_token(
                span.start,
                "a condition",
                token.to_string(),
            )),
            None => Err(ParseError::unexpected_eof(self.source.len())),
        }
    }

    /// `{ statements }` with arbitrary newlines inside
    fn parse_block(&mut self) -> ParseResult<Vec<Statement>> {
        self.expect(Token::LBrace)?;
        let mut statements = Vec::new();

        self.skip_newlines();
        while !self.check(&Token::RBrace) {
            if self.is_at_end() {
                return Err(ParseError::unexpected_eof(self.source.len()));
            }
            statements.push(self.parse_statement()?);
            if self.check(&Token::RBrace) {
                break;
            }
            self.expect_statement_end()?;
            self.skip_newlines();
        }
        self.expect(Token::RBrace)?;

        Ok(statements)
    }

    /// Consume an `else` branch when one follows, looking across newlines.
    /// Restores the cursor when the next statement is unrelated.
    fn parse_else_branch(&mut self) -> ParseResult<Vec<Statement>> {
        let checkpoint = self.pos;
        self.skip_newlines();

        match self.peek() {
            Some((Token::Word("else"), _)) => {
                self.advance();
                match self.peek() {
                    Some((Token::LBrace, _)) => self.parse_block(),
                    Some((Token::Colon, _)) => {
                        self.advance();
                        Ok(vec![self.parse_statement()?])
                    }
                    _ => Err(ParseError::invalid_syntax(
                        self.current_pos(),
                        "expected ':' or '{' after else",
                    )),
                }
            }
            _ => {
                self.pos = checkpoint;
                Ok(Vec::new())
            }
        }
    }

    /// Parse the value list of an assignment, up to the end of the statement
    fn parse_values(&mut self) -> ParseResult<Vec<Word>> {
        let mut values = Vec::new();
        loop {
            match self.peek() {
                None | Some((Token::Newline | Token::RBrace, _)) => break,
                Some((token, _)) if is_word_start(token) => {
                    values.push(self.parse_word()?);
                }
                Some((token, span)) => {
                    return Err(ParseError::unexpected_token(
                        span.start,
                        "a value or end of line",
                        token.to_string(),
                    ));
                }
            }
        }
        Ok(values)
    }

    /// Parse one word: a maximal run of adjacent value tokens
    fn parse_word(&mut self) -> ParseResult<Word> {
        let start = self.current_pos();
        let mut parts: Vec<WordPart> = Vec::new();
        let mut literal = String::new();
        let mut first = true;

        loop {
            let continues = match self.peek() {
                Some((token, _)) if first => is_word_start(token),
                Some((token, _)) => is_word_continuation(token) && self.adjacent_to_previous(),
                None => false,
            };
            if !continues {
                break;
            }
            first = false;

            match self.advance() {
                Some((Token::Word(text), _)) => literal.push_str(text),
                Some((Token::Plus, _)) => literal.push('+'),
                Some((Token::Minus, _)) => literal.push('-'),
                Some((Token::Star, _)) => literal.push('*'),
                Some((Token::Colon, _)) => literal.push(':'),
                Some((Token::Assign, _)) => literal.push('='),
                Some((Token::PlusAssign, _)) => literal.push_str("+="),
                Some((Token::MinusAssign, _)) => literal.push_str("-="),
                Some((Token::StarAssign, _)) => literal.push_str("*="),
                Some((Token::Quoted(raw), span)) => {
                    flush_literal(&mut parts, &mut literal);
                    parts.extend(quoted_parts(raw, span.start)?);
                }
                Some((Token::VarRef(name), span)) => {
                    flush_literal(&mut parts, &mut literal);
                    if self.check(&Token::LParen) && self.adjacent_to_previous() {
                        let call = self.parse_call(name.to_string(), span.start)?;
                        parts.push(WordPart::Call(call));
                    } else {
                        parts.push(WordPart::Var(name.to_string()));
                    }
                }
                Some((Token::EnvRef(name), _)) => {
                    flush_literal(&mut parts, &mut literal);
                    parts.push(WordPart::Env(name.to_string()));
                }
                _ => unreachable!("token classified as part of a word"),
            }
        }

        flush_literal(&mut parts, &mut literal);
        if parts.is_empty() {
            return Err(ParseError::invalid_syntax(start, "expected a value"));
        }
        Ok(Word {
            parts,
            span: Span::new(start, self.previous_end()),
        })
    }

    /// Parse `( args )` for a call whose name was already consumed
    fn parse_call(&mut self, name: String, start: usize) -> ParseResult<Call> {
        self.expect(Token::LParen)?;
        let mut args: Vec<Vec<Word>> = Vec::new();
        let mut current: Vec<Word> = Vec::new();
        let mut seen_any = false;

        loop {
            match self.peek() {
                Some((Token::RParen, _)) => {
                    self.advance();
                    break;
                }
                Some((Token::Comma, _)) => {
                    self.advance();
                    seen_any = true;
                    args.push(std::mem::take(&mut current));
                }
                Some((token, _)) if is_word_start(token) => {
                    seen_any = true;
                    current.push(self.parse_word()?);
                }
                Some((Token::Newline, span)) => {
                    return Err(ParseError::invalid_syntax(
                        span.start,
                        format!("unterminated call to {}()", name),
                    ));
                }
                Some((token, span)) => {
                    return Err(ParseError::unexpected_token(
                        span.start,
                        "an argument or ')'",
                        token.to_string(),
                    ));
                }
                None => return Err(ParseError::unexpected_eof(self.source.len())),
            }
        }

        if seen_any {
            args.push(current);
        }

        Ok(Call {
            name,
            args,
            span: Span::new(start, self.previous_end()),
        })
    }

    /// Merge an adjacent run of bare tokens into one string, for feature
    /// words such as `win32-g++`
    fn merge_bare_word(&mut self) -> (String, Span) {
        let start = self.current_pos();
        let mut end = start;
        let mut first = true;

        while let Some((token, span)) = self.peek() {
            let bare = matches!(
                token,
                Token::Word(_) | Token::Plus | Token::Minus | Token::Star
            );
            if !bare || (!first && !self.adjacent_to_previous()) {
                break;
            }
            end = span.end;
            first = false;
            self.advance();
        }

        (self.source[start..end].to_string(), Span::new(start, end))
    }

    fn expect_statement_end(&mut self) -> ParseResult<()> {
        match self.peek() {
            None | Some((Token::Newline | Token::RBrace, _)) => Ok(()),
            Some((token, span)) => Err(ParseError::unexpected_token(
                span.start,
                "end of line",
                token.to_string(),
            )),
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(&Token::Newline) {
            self.advance();
        }
    }

    fn peek(&self) -> Option<&(Token<'src>, Range<usize>)> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&(Token<'src>, Range<usize>)> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<(Token<'src>, Range<usize>)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        matches!(self.peek(), Some((current, _)) if current == token)
    }

    fn match_token(&mut self, token: Token) -> bool {
        if self.check(&token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> ParseResult<Range<usize>> {
        match self.peek() {
            Some((current, span)) if *current == token => {
                let span = span.clone();
                self.advance();
                Ok(span)
            }
            Some((current, span)) => Err(ParseError::unexpected_token(
                span.start,
                token.to_string(),
                current.to_string(),
            )),
            None => Err(ParseError::unexpected_eof(self.source.len())),
        }
    }

    /// True when no whitespace separates the current token from the previous
    fn adjacent_to_previous(&self) -> bool {
        if self.pos == 0 {
            return false;
        }
        match (self.tokens.get(self.pos - 1), self.tokens.get(self.pos)) {
            (Some((_, prev)), Some((_, current))) => prev.end == current.start,
            _ => false,
        }
    }

    fn current_pos(&self) -> usize {
        self.peek()
            .map(|(_, span)| span.start)
            .unwrap_or(self.source.len())
    }

    fn previous_end(&self) -> usize {
        if self.pos == 0 {
            return 0;
        }
        self.tokens
            .get(self.pos - 1)
            .map(|(_, span)| span.end)
            .unwrap_or(self.source.len())
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

fn is_word_start(token: &Token) -> bool {
    matches!(
        token,
        Token::Word(_)
            | Token::VarRef(_)
            | Token::EnvRef(_)
            | Token::Quoted(_)
            | Token::Plus
            | Token::Minus
            | Token::Star
    )
}

fn is_word_continuation(token: &Token) -> bool {
    is_word_start(token)
        || matches!(
            token,
            Token::Assign
                | Token::PlusAssign
                | Token::MinusAssign
                | Token::StarAssign
                | Token::Colon
        )
}

fn flush_literal(parts: &mut Vec<WordPart>, literal: &mut String) {
    if !literal.is_empty() {
        parts.push(WordPart::Literal(std::mem::take(literal)));
    }
}

/// Split the contents of a quoted string into word parts, expanding
/// `$$NAME`, `$${NAME}` and `$$(NAME)` references and backslash escapes
fn quoted_parts(raw: &str, start: usize) -> ParseResult<Vec<WordPart>> {
    let content = &raw[1..raw.len() - 1];
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = content.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some((_, escaped)) => literal.push(escaped),
                None => {
                    return Err(ParseError::invalid_syntax(
                        start + offset,
                        "dangling escape in string",
                    ));
                }
            },
            '$' if matches!(chars.peek(), Some((_, '$'))) => {
                chars.next();
                flush_literal(&mut parts, &mut literal);
                let (delimiter, closing) = match chars.peek() {
                    Some((_, '{')) => (Some('{'), Some('}')),
                    Some((_, '(')) => (Some('('), Some(')')),
                    _ => (None, None),
                };
                if delimiter.is_some() {
                    chars.next();
                }

                let mut name = String::new();
                while let Some((_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || *c == '_' || (closing != Some(')') && *c == '.')
                    {
                        name.push(*c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    return Err(ParseError::invalid_syntax(
                        start + offset,
                        "empty variable reference in string",
                    ));
                }
                if let Some(close) = closing {
                    match chars.next() {
                        Some((_, c)) if c == close => {}
                        _ => {
                            return Err(ParseError::invalid_syntax(
                                start + offset,
                                format!("expected '{}' in variable reference", close),
                            ));
                        }
                    }
                }
                if delimiter == Some('(') {
                    parts.push(WordPart::Env(name));
                } else {
                    parts.push(WordPart::Var(name));
                }
            }
            _ => literal.push(ch),
        }
    }

    flush_literal(&mut parts, &mut literal);
    if parts.is_empty() {
        // an empty string literal is still one empty value
        parts.push(WordPart::Literal(String::new()));
    }
    Ok(parts)
}

/// Parse a complete source string into a project file
pub fn parse(source: &str) -> ParseResult<ProFile> {
    Parser::new(source)?.parse_pro_file()
}
