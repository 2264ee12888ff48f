//! Minimal source scanner.
//!
//! Not a parser: it skips strings, template literals and comments, tracks bracket depth,
//! and reports words and structural punctuation. Regex literals are not recognized, so a
//! `;` or brace inside one is seen as code.

use std::ops::Range;

/// Words that begin a statement rather than an expression.
const STATEMENT_KEYWORDS: &[&str] = &[
    "var", "let", "const", "function", "class", "if", "for", "while", "do", "switch", "try",
    "throw", "return", "break", "continue", "import", "export", "debugger", "with",
];

/// Words after which a line break never ends the statement.
const OPERATOR_WORDS: &[&str] = &[
    "typeof", "void", "delete", "new", "await", "yield", "in", "instanceof", "of", "else",
    "do", "extends", "case",
];

/// Words that continue the statement on the previous line.
const CONTINUATION_WORDS: &[&str] = &[
    "in", "instanceof", "of", "else", "catch", "finally", "while", "extends",
];

/// Words whose parenthesized head is followed by a body, not a new statement.
const CONTROL_HEADS: &[&str] = &["if", "while", "for", "with", "switch", "catch"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind<'a> {
    Word(&'a str),
    /// String or template literal
    Literal,
    Punct(u8),
    Arrow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token<'a> {
    kind: TokenKind<'a>,
    pos: usize,
    end: usize,
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn tokenize(source: &str) -> Vec<Token<'_>> {
    let bytes = source.as_bytes();
    let len = bytes.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        let c = bytes[i];
        match c {
            b'\'' | b'"' => {
                let start = i;
                i += 1;
                while i < len && bytes[i] != c && bytes[i] != b'\n' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
                i += 1;
                tokens.push(Token {
                    kind: TokenKind::Literal,
                    pos: start,
                    end: i.min(len),
                });
            }
            b'`' => {
                let start = i;
                i += 1;
                while i < len && bytes[i] != b'`' {
                    if bytes[i] == b'\\' {
                        i += 2;
                        continue;
                    }
                    if bytes[i] == b'$' && i + 1 < len && bytes[i + 1] == b'{' {
                        let mut depth = 1;
                        i += 2;
                        while i < len && depth > 0 {
                            match bytes[i] {
                                b'{' => depth += 1,
                                b'}' => depth -= 1,
                                _ => {}
                            }
                            i += 1;
                        }
                        continue;
                    }
                    i += 1;
                }
                i += 1;
                tokens.push(Token {
                    kind: TokenKind::Literal,
                    pos: start,
                    end: i.min(len),
                });
            }
            b'/' if i + 1 < len && bytes[i + 1] == b'/' => {
                while i < len && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if i + 1 < len && bytes[i + 1] == b'*' => {
                i += 2;
                while i + 1 < len && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 2;
            }
            b'=' if i + 1 < len && bytes[i + 1] == b'>' => {
                tokens.push(Token {
                    kind: TokenKind::Arrow,
                    pos: i,
                    end: i + 2,
                });
                i += 2;
            }
            b'(' | b')' | b'[' | b']' | b'{' | b'}' | b';' | b',' | b'.' | b':' => {
                tokens.push(Token {
                    kind: TokenKind::Punct(c),
                    pos: i,
                    end: i + 1,
                });
                i += 1;
            }
            _ if is_word_byte(c) => {
                let start = i;
                while i < len && is_word_byte(bytes[i]) {
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Word(&source[start..i]),
                    pos: start,
                    end: i,
                });
            }
            _ => i += 1,
        }
    }
    tokens
}

/// Whether a line break between `prev` and `next` ends a statement.
///
/// Only a bare line break counts: an operator or a comment in between keeps the two lines
/// together, and so does a line starting with `(`, `[` or `.`.
fn line_ends_statement(source: &str, prev: &Token<'_>, next: &Token<'_>) -> bool {
    let Some(gap) = source.get(prev.end..next.pos) else {
        return false;
    };
    if !gap.contains('\n') || !gap.trim().is_empty() {
        return false;
    }
    let ends = match prev.kind {
        TokenKind::Word(word) => !OPERATOR_WORDS.contains(&word),
        TokenKind::Literal | TokenKind::Punct(b')' | b']' | b'}') => true,
        _ => false,
    };
    let begins = match next.kind {
        TokenKind::Word(word) => !CONTINUATION_WORDS.contains(&word),
        TokenKind::Literal => true,
        _ => false,
    };
    ends && begins
}

/// Byte ranges of the top-level statements, trimmed, empty ones dropped.
///
/// Statements end at a top-level `;`, or at a line break between two complete lines.
pub fn statement_spans(source: &str) -> Vec<Range<usize>> {
    let tokens = tokenize(source);
    let mut spans = Vec::new();
    // One entry per open bracket: whether it is the head of `if (...)` and friends
    let mut open: Vec<bool> = Vec::new();
    let mut start = 0;

    for (index, token) in tokens.iter().enumerate() {
        let mut closed_head = false;
        match token.kind {
            TokenKind::Punct(b'(') => {
                let head = index
                    .checked_sub(1)
                    .and_then(|prev| tokens.get(prev))
                    .is_some_and(|prev| matches!(prev.kind, TokenKind::Word(w) if CONTROL_HEADS.contains(&w)));
                open.push(head);
            }
            TokenKind::Punct(b'[' | b'{') => open.push(false),
            TokenKind::Punct(b')' | b']' | b'}') => closed_head = open.pop().unwrap_or(false),
            TokenKind::Punct(b';') if open.is_empty() => {
                push_trimmed(source, start..token.pos, &mut spans);
                start = token.end;
                continue;
            }
            _ => {}
        }
        if !open.is_empty() || closed_head {
            continue;
        }
        if let Some(next) = tokens.get(index + 1) {
            if line_ends_statement(source, token, next) {
                push_trimmed(source, start..token.end, &mut spans);
                start = token.end;
            }
        }
    }
    push_trimmed(source, start..source.len(), &mut spans);
    spans
}

fn push_trimmed(source: &str, range: Range<usize>, spans: &mut Vec<Range<usize>>) {
    let text = &source[range.clone()];
    let leading = text.len() - text.trim_start().len();
    let trimmed_len = text.trim().len();
    if trimmed_len > 0 {
        let begin = range.start + leading;
        spans.push(begin..begin + trimmed_len);
    }
}

/// Top-level statements as text.
pub fn split_statements(source: &str) -> Vec<&str> {
    statement_spans(source)
        .into_iter()
        .map(|span| &source[span])
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Group,
    Block,
    Function,
}

/// Whether `return` appears outside every function or class body.
pub fn has_top_level_return(source: &str) -> bool {
    let tokens = tokenize(source);
    let mut stack: Vec<Scope> = Vec::new();
    let mut opens_function = false;
    let mut after_dot = false;

    for (index, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Word("function" | "class") if !after_dot => opens_function = true,
            TokenKind::Arrow => opens_function = true,
            TokenKind::Word("return") if !after_dot => {
                // `{ return: 1 }` names a property
                let is_key = matches!(stack.last(), Some(Scope::Group | Scope::Block))
                    && matches!(
                        tokens.get(index + 1).map(|t| t.kind),
                        Some(TokenKind::Punct(b':'))
                    );
                if !is_key && !stack.contains(&Scope::Function) {
                    return true;
                }
            }
            TokenKind::Punct(b'{') => {
                stack.push(if opens_function {
                    Scope::Function
                } else {
                    Scope::Block
                });
                opens_function = false;
            }
            TokenKind::Punct(b'(' | b'[') => stack.push(Scope::Group),
            TokenKind::Punct(b')' | b']' | b'}') => {
                stack.pop();
            }
            TokenKind::Punct(b';') => opens_function = false,
            _ => {}
        }
        after_dot = matches!(token.kind, TokenKind::Punct(b'.'));
    }
    false
}

/// Whether the statement at `span` starts with a statement keyword or a block.
fn starts_statement(source: &str, span: &Range<usize>) -> bool {
    let tokens = tokenize(&source[span.clone()]);
    match tokens.first().map(|t| t.kind) {
        None => true,
        Some(TokenKind::Punct(b'{')) => true,
        Some(TokenKind::Word("async")) => {
            matches!(tokens.get(1).map(|t| t.kind), Some(TokenKind::Word("function")))
        }
        Some(TokenKind::Word(word)) => STATEMENT_KEYWORDS.contains(&word),
        Some(_) => false,
    }
}

/// Rewrite a statement body so its final expression statement becomes the return value.
///
/// Bodies that already `return` at top level, or whose last statement is itself a
/// declaration, control-flow statement or block, come back unchanged.
pub fn with_completion_value(source: &str) -> String {
    if has_top_level_return(source) {
        return source.to_string();
    }
    let Some(last) = statement_spans(source).pop() else {
        return source.to_string();
    };
    if starts_statement(source, &last) {
        return source.to_string();
    }
    format!(
        "{}return ({}\n);{}",
        &source[..last.start],
        &source[last.clone()],
        &source[last.end..]
    )
}
