//! Select & embedding grammar
//!
//! ```text
//! list := item (',' item)*
//! item := TEXT                      plain column, `alias:column`, JSON path
//!       | TEXT '(' list ')'         embedded resource `alias:table!fk_hint(...)`
//! ```
//!
//! One recursive-descent pass over the [`scan`](crate::scan) tokens yields
//! both the flat column list and the embedded-resource tree at every level.

use std::collections::BTreeMap;

use pgrest_common::error::{Error, Result};

use crate::json_path::JsonPath;
use crate::query::EmbeddedResource;
use crate::scan::{tokenize, Token};

/// Parsed `select` parameter at one nesting level
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectClause {
    /// Plain columns and JSON path expressions, as written
    pub columns: Vec<String>,
    /// Column or expression -> requested response key
    pub column_aliases: BTreeMap<String, String>,
    pub embedded: Vec<EmbeddedResource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SelectNode<'a> {
    Field(&'a str),
    Embed {
        head: &'a str,
        children: Vec<SelectNode<'a>>,
    },
}

struct Grammar<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> Grammar<'a> {
    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn list(&mut self, depth: usize) -> Result<Vec<SelectNode<'a>>> {
        let mut nodes = Vec::new();

        loop {
            match self.peek() {
                None if depth == 0 => return Ok(nodes),
                None => {
                    return Err(Error::InvalidSelect("unclosed '(' in select".to_string()));
                }
                Some(Token::Close) if depth == 0 => {
                    return Err(Error::InvalidSelect("unexpected ')' in select".to_string()));
                }
                Some(Token::Close) => return Ok(nodes),
                Some(Token::Comma) => self.pos += 1,
                Some(Token::Open) => {
                    return Err(Error::InvalidSelect(
                        "embedded resource without a name".to_string(),
                    ));
                }
                Some(Token::Text(text)) => {
                    self.pos += 1;
                    if self.peek() == Some(Token::Open) {
                        self.pos += 1;
                        let children = self.list(depth + 1)?;
                        // list() only returns at depth > 0 when it sees ')'
                        self.pos += 1;
                        let head = text.trim();
                        if head.is_empty() {
                            return Err(Error::InvalidSelect(
                                "embedded resource without a name".to_string(),
                            ));
                        }
                        nodes.push(SelectNode::Embed { head, children });
                    } else if !text.trim().is_empty() {
                        nodes.push(SelectNode::Field(text.trim()));
                    }
                }
            }
        }
    }
}

/// Parse a `select` value.
///
/// # Errors
/// `Error::InvalidSelect` on unbalanced parentheses or an embedded resource
/// without a name.
pub fn parse_select(input: &str) -> Result<SelectClause> {
    let mut grammar = Grammar {
        tokens: tokenize(input),
        pos: 0,
    };
    let nodes = grammar.list(0)?;
    build_clause(&nodes)
}

fn build_clause(nodes: &[SelectNode<'_>]) -> Result<SelectClause> {
    let mut clause = SelectClause::default();

    for node in nodes {
        match node {
            SelectNode::Field(field) => {
                let (alias, expression) = split_alias(field);
                let alias = alias
                    .map(ToString::to_string)
                    .or_else(|| JsonPath::parse(expression).map(|path| path.default_alias()));

                if let Some(alias) = alias {
                    clause.column_aliases.insert(expression.to_string(), alias);
                }
                clause.columns.push(expression.to_string());
            }
            SelectNode::Embed { head, children } => {
                clause.embedded.push(build_embedded(head, children)?);
            }
        }
    }

    Ok(clause)
}

fn build_embedded(head: &str, children: &[SelectNode<'_>]) -> Result<EmbeddedResource> {
    let (alias, rest) = split_alias(head);
    let (table, fk_hint) = match rest.split_once('!') {
        Some((table, hint)) => (table.trim(), Some(hint.trim().to_string())),
        None => (rest.trim(), None),
    };
    if table.is_empty() {
        return Err(Error::InvalidSelect(format!(
            "embedded resource '{}' has no table name",
            head
        )));
    }

    let body = build_clause(children)?;
    Ok(EmbeddedResource {
        table: table.to_string(),
        alias: alias.map(ToString::to_string),
        fk_hint: fk_hint.filter(|hint| !hint.is_empty()),
        select: body.columns,
        column_aliases: body.column_aliases,
        embedded: body.embedded,
        ..EmbeddedResource::default()
    })
}

/// Split `alias:rest`. A `::` cast is not an alias separator and only a colon
/// before any JSON operator counts.
fn split_alias(token: &str) -> (Option<&str>, &str) {
    let end = ["->", "#>"]
        .iter()
        .filter_map(|op| token.find(op))
        .min()
        .unwrap_or(token.len());
    let bytes = token.as_bytes();

    for i in 0..end {
        if bytes[i] != b':' {
            continue;
        }
        let prev_colon = i > 0 && bytes[i - 1] == b':';
        let next_colon = bytes.get(i + 1) == Some(&b':');
        if prev_colon || next_colon {
            continue;
        }

        let alias = token[..i].trim();
        let rest = token[i + 1..].trim();
        return if alias.is_empty() {
            (None, rest)
        } else {
            (Some(alias), rest)
        };
    }

    (None, token.trim())
}
