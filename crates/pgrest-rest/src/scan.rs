//! Tokenizer shared by the select grammar and the list splitters
//!
//! The query-string micro-language only gives structural meaning to `,`, `(`
//! and `)`. Commas inside `{...}` literals (JSON paths, array literals) and
//! inside double quotes are ordinary text.

/// A lexical unit of a select/list expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    Comma,
    Open,
    Close,
    Text(&'a str),
}

impl Token<'_> {
    fn as_str(&self) -> &str {
        match self {
            Token::Comma => ",",
            Token::Open => "(",
            Token::Close => ")",
            Token::Text(text) => text,
        }
    }
}

/// Split `input` into delimiter and literal-run tokens. Every input byte is
/// covered by exactly one token.
pub(crate) fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    let mut braces = 0usize;
    let mut quoted = false;
    let mut escaped = false;

    for (i, ch) in input.char_indices() {
        if quoted {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                quoted = false;
            }
            continue;
        }

        match ch {
            '"' => {
                quoted = true;
                start.get_or_insert(i);
            }
            '{' => {
                braces += 1;
                start.get_or_insert(i);
            }
            '}' => {
                braces = braces.saturating_sub(1);
                start.get_or_insert(i);
            }
            ',' | '(' | ')' if braces == 0 => {
                if let Some(s) = start.take() {
                    tokens.push(Token::Text(&input[s..i]));
                }
                tokens.push(match ch {
                    ',' => Token::Comma,
                    '(' => Token::Open,
                    _ => Token::Close,
                });
            }
            _ => {
                start.get_or_insert(i);
            }
        }
    }

    if let Some(s) = start {
        tokens.push(Token::Text(&input[s..]));
    }

    tokens
}

/// Split on commas that sit outside any parentheses. Pieces are returned
/// untrimmed; empty pieces are kept so callers decide how to treat them.
pub(crate) fn split_top_level(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for token in tokenize(input) {
        match token {
            Token::Comma if depth == 0 => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            Token::Open => depth += 1,
            Token::Close => depth = depth.saturating_sub(1),
            _ => {}
        }
        current.push_str(token.as_str());
    }

    if !current.is_empty() || !parts.is_empty() {
        parts.push(current);
    }

    parts
}

/// Remove one pair of parentheses when it encloses the whole input,
/// e.g. `(a.eq.1,b.eq.2)` but not `(a)(b)`.
pub(crate) fn strip_enclosing_parens(input: &str) -> &str {
    let trimmed = input.trim();
    let tokens = tokenize(trimmed);
    if tokens.len() < 2 || tokens[0] != Token::Open || tokens[tokens.len() - 1] != Token::Close {
        return trimmed;
    }

    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Open => depth += 1,
            Token::Close => {
                depth = depth.saturating_sub(1);
                if depth == 0 && i != tokens.len() - 1 {
                    return trimmed;
                }
            }
            _ => {}
        }
    }

    &trimmed[1..trimmed.len() - 1]
}

/// Strip one layer of double quotes and unescape `\"` / `\\`
pub(crate) fn unquote(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        let inner = &value[1..value.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(ch) = chars.next() {
            if ch == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else {
                out.push(ch);
            }
        }
        out
    } else {
        value.to_string()
    }
}
