//! Goal/capability/check document parser
//!
//! Line-based extraction of top-level declarations:
//!
//! ```text
//! capability read_docs {
//!   description "Read local documentation"
//! }
//! ```
//!
//! Braces inside double-quoted strings are ignored. Anything else at the top
//! level (comments, blank lines, directives) is skipped.

use crate::error::{Diagnostic, ParseError};
use crate::parsers::{DocumentParser, DocumentSymbol, LineRange, SyntaxTree};
use agp_artifact::WorkspacePath;

/// Declaration keywords
pub const DECLARATION_KINDS: [&str; 3] = ["goal", "capability", "check"];

/// Parser for `.ls` documents
#[derive(Debug, Clone, Copy, Default)]
pub struct LsDocumentParser;

struct OpenSymbol {
    kind: String,
    name: String,
    start_line: usize,
    depth: usize,
}

impl DocumentParser for LsDocumentParser {
    fn parse(&self, path: &WorkspacePath, content: &str) -> Result<SyntaxTree, ParseError> {
        let lines: Vec<&str> = content.lines().collect();
        let mut symbols = Vec::new();
        let mut diagnostics = Vec::new();
        let mut open: Option<OpenSymbol> = None;

        for (idx, line) in lines.iter().enumerate() {
            let line_no = idx + 1;
            match open.as_mut() {
                Some(symbol) => {
                    let (opens, closes) = count_braces(line);
                    let depth = (symbol.depth + opens).checked_sub(closes);
                    match depth {
                        Some(0) => {
                            if let Some(done) = open.take() {
                                symbols.push(DocumentSymbol {
                                    text: lines[done.start_line - 1..line_no].join("\n"),
                                    kind: done.kind,
                                    name: done.name,
                                    range: LineRange {
                                        start_line: done.start_line,
                                        end_line: line_no,
                                    },
                                });
                            }
                        }
                        Some(depth) => symbol.depth = depth,
                        None => {
                            diagnostics.push(Diagnostic {
                                line: line_no,
                                message: "unbalanced '}'".to_string(),
                            });
                            open = None;
                        }
                    }
                }
                None => match parse_declaration(line) {
                    Some(Ok((kind, name))) => {
                        let (opens, closes) = count_braces(line);
                        match opens.checked_sub(closes) {
                            Some(0) => symbols.push(DocumentSymbol {
                                kind: kind.to_string(),
                                name: name.to_string(),
                                range: LineRange {
                                    start_line: line_no,
                                    end_line: line_no,
                                },
                                text: (*line).to_string(),
                            }),
                            Some(depth) => {
                                open = Some(OpenSymbol {
                                    kind: kind.to_string(),
                                    name: name.to_string(),
                                    start_line: line_no,
                                    depth,
                                });
                            }
                            None => diagnostics.push(Diagnostic {
                                line: line_no,
                                message: "unbalanced '}'".to_string(),
                            }),
                        }
                    }
                    Some(Err(message)) => diagnostics.push(Diagnostic {
                        line: line_no,
                        message,
                    }),
                    None => {
                        let (opens, closes) = count_braces(line);
                        if opens > 0 || closes > 0 {
                            diagnostics.push(Diagnostic {
                                line: line_no,
                                message: "brace outside of a declaration".to_string(),
                            });
                        }
                    }
                },
            }
        }

        if let Some(symbol) = open {
            diagnostics.push(Diagnostic {
                line: symbol.start_line,
                message: format!("unclosed declaration '{} {}'", symbol.kind, symbol.name),
            });
        }

        if diagnostics.is_empty() {
            Ok(SyntaxTree { symbols })
        } else {
            Err(ParseError::syntax_error(path.as_str(), diagnostics))
        }
    }

    fn extensions(&self) -> &[&str] {
        &["ls"]
    }

    fn priority(&self) -> i32 {
        10
    }
}

/// `Some(Ok((kind, name)))` for a well-formed header, `Some(Err)` for a
/// malformed one, `None` when the line is not a declaration
fn parse_declaration(line: &str) -> Option<Result<(&str, &str), String>> {
    let trimmed = line.trim_start();
    let kind = DECLARATION_KINDS.into_iter().find(|kind| {
        trimmed
            .strip_prefix(kind)
            .is_some_and(|rest| rest.starts_with(char::is_whitespace) || rest.starts_with('{'))
    })?;
    let rest = trimmed[kind.len()..].trim_start();
    let Some(brace) = rest.find('{') else {
        return Some(Err(format!("expected '{{' after {kind} declaration")));
    };
    let name = rest[..brace].trim();
    if !is_identifier(name) {
        return Some(Err(format!("invalid {kind} name '{name}'")));
    }
    Some(Ok((kind, name)))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn count_braces(line: &str) -> (usize, usize) {
    let mut in_string = false;
    let mut escaped = false;
    let mut opens = 0;
    let mut closes = 0;
    for c in line.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => opens += 1,
            '}' => closes += 1,
            '#' => break,
            _ => {}
        }
    }
    (opens, closes)
}
