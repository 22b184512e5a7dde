//! Pretty error reports with source context

use crate::error::ParseError;
use ariadne::{Color, Label, Report, ReportKind, Source};

/// Render a parse error against its source using ariadne
pub fn format_error(source: &str, filename: &str, error: &ParseError) -> String {
    if source.is_empty() {
        return error.to_string();
    }
    let pos = error.pos().min(source.len() - 1);
    let end = source[pos..]
        .char_indices()
        .nth(1)
        .map(|(offset, _)| pos + offset)
        .unwrap_or(source.len());

    let label_message = match error {
        ParseError::UnexpectedToken { expected, .. } => format!("expected {}", expected),
        ParseError::UnexpectedEof { .. } => "input ends here".to_string(),
        ParseError::InvalidSyntax { message, .. } => message.clone(),
        ParseError::LexerError { .. } => "cannot read this character".to_string(),
    };

    let report = Report::build(ReportKind::Error, filename, pos)
        .with_message(error.to_string())
        .with_label(
            Label::new((filename, pos..end))
                .with_color(Color::Red)
                .with_message(label_message),
        )
        .finish();

    let mut output = Vec::new();
    if report
        .write((filename, Source::from(source)), &mut output)
        .is_err()
    {
        return error.to_string();
    }

    String::from_utf8(output).unwrap_or_else(|_| error.to_string())
}
