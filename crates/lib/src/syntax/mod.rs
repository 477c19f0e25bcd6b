//! Front end of the build description language.
//!
//! - [`lexer`]: source text to tokens
//! - [`parser`]: tokens to a concrete [`SynTree`]
//!
//! Both phases accumulate [`SyntaxError`]s instead of stopping at the first
//! problem.

pub mod lexer;
pub mod parser;
pub mod token;
pub mod tree;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use token::{Token, TokenKind};
pub use tree::{Rule, SynTree};

/// A malformed token or unexpected symbol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}:{row}:{col}: {msg}", path.display())]
pub struct SyntaxError {
  pub path: PathBuf,
  pub row: u32,
  pub col: u32,
  pub msg: String,
}

/// Lex and parse `source`, attributing positions to `path`.
pub fn parse_source(source: &str, path: &Path) -> (SynTree, Vec<SyntaxError>) {
  let (tokens, mut errors) = lexer::tokenize(source, path);
  let (tree, parse_errors) = parser::Parser::new(tokens).parse();
  errors.extend(parse_errors);
  errors.sort_by_key(|e| (e.row, e.col));
  (tree, errors)
}

/// Read and parse a file.
pub fn parse_file(path: &Path) -> std::io::Result<(SynTree, Vec<SyntaxError>)> {
  let source = std::fs::read_to_string(path)?;
  Ok(parse_source(&source, path))
}
