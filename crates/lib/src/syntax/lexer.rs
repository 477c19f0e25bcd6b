//! Lexer for build description files.
//!
//! Turns source text into a flat token list. Comments (`# ...` to end of
//! line and nestable `/* ... */`) are skipped. Lexical errors are collected
//! and the offending input is represented by an `Invalid` token, so the
//! parser never reports the same mistake twice.

use std::path::Path;
use std::sync::Arc;

use super::SyntaxError;
use super::token::{Token, TokenKind};

/// Characters that end an unquoted path literal besides whitespace.
const PATH_TERMINATORS: &[char] = &[')', ']', '}', ',', ';', '"', '\''];

pub struct Lexer {
  chars: Vec<char>,
  current: usize,
  row: u32,
  col: u32,
  start_row: u32,
  start_col: u32,
  path: Arc<Path>,
  errors: Vec<SyntaxError>,
}

impl Lexer {
  pub fn new(source: &str, path: &Path) -> Self {
    Self {
      chars: source.chars().collect(),
      current: 0,
      row: 1,
      col: 1,
      start_row: 1,
      start_col: 1,
      path: Arc::from(path),
      errors: Vec::new(),
    }
  }

  /// Tokenize the whole input. The returned list always ends with `Eof`.
  pub fn tokenize(mut self) -> (Vec<Token>, Vec<SyntaxError>) {
    let mut tokens = Vec::new();
    loop {
      self.skip_trivia();
      self.start_row = self.row;
      self.start_col = self.col;
      let Some(c) = self.advance() else {
        tokens.push(self.make(TokenKind::Eof, ""));
        break;
      };
      tokens.push(self.scan(c));
    }
    (tokens, self.errors)
  }

  fn scan(&mut self, c: char) -> Token {
    match c {
      '(' => self.make(TokenKind::LParen, "("),
      ')' => self.make(TokenKind::RParen, ")"),
      ',' => self.make(TokenKind::Comma, ","),
      ';' => self.make(TokenKind::Semi, ";"),
      '?' => self.make(TokenKind::Question, "?"),
      ']' => self.make(TokenKind::RBrack, "]"),
      '^' => self.make(TokenKind::Hat, "^"),
      '{' => self.make(TokenKind::LBrace, "{"),
      '}' => self.make(TokenKind::RBrace, "}"),
      '$' => self.make(TokenKind::Dollar, "$"),
      '%' => self.make(TokenKind::Percent, "%"),
      '[' => {
        if self.match_char(']') {
          self.make(TokenKind::LBrackRBrack, "[]")
        } else {
          self.make(TokenKind::LBrack, "[")
        }
      }
      '!' => self.pair('=', TokenKind::BangEq, TokenKind::Bang),
      '*' => self.pair('=', TokenKind::StarEq, TokenKind::Star),
      '+' => self.pair('=', TokenKind::PlusEq, TokenKind::Plus),
      '-' => self.pair('=', TokenKind::MinusEq, TokenKind::Minus),
      ':' => self.pair('=', TokenKind::ColonEq, TokenKind::Colon),
      '<' => self.pair('=', TokenKind::Le, TokenKind::Lt),
      '=' => self.pair('=', TokenKind::EqEq, TokenKind::Eq),
      '>' => self.pair('=', TokenKind::Ge, TokenKind::Gt),
      '&' => self.pair('&', TokenKind::AmpAmp, TokenKind::Amp),
      '|' => {
        if self.match_char('|') {
          self.make(TokenKind::BarBar, "||")
        } else {
          self.invalid("unexpected character '|'")
        }
      }
      '.' => {
        if self.peek() == Some('/') || (self.peek() == Some('.') && self.peek_next() == Some('/')) {
          self.unquoted_path(c)
        } else {
          self.make(TokenKind::Dot, ".")
        }
      }
      '/' => {
        if self.peek() == Some('/') {
          self.unquoted_path(c)
        } else {
          self.make(TokenKind::Slash, "/")
        }
      }
      '\'' => self.quoted_path(),
      '"' => self.string(),
      '`' => self.symbol(),
      c if c.is_ascii_digit() => self.number(c),
      c if is_ident_start(c) => self.identifier(c),
      c => self.invalid(&format!("unexpected character '{}'", c)),
    }
  }

  fn skip_trivia(&mut self) {
    loop {
      match self.peek() {
        Some(c) if c.is_whitespace() => {
          self.advance();
        }
        Some('#') => {
          while let Some(c) = self.peek() {
            if c == '\n' {
              break;
            }
            self.advance();
          }
        }
        Some('/') if self.peek_next() == Some('*') => self.block_comment(),
        _ => return,
      }
    }
  }

  fn block_comment(&mut self) {
    let (row, col) = (self.row, self.col);
    self.advance();
    self.advance();
    let mut depth = 1;
    while depth > 0 {
      match self.advance() {
        None => {
          self.error_at(row, col, "unterminated block comment");
          return;
        }
        Some('/') if self.peek() == Some('*') => {
          self.advance();
          depth += 1;
        }
        Some('*') if self.peek() == Some('/') => {
          self.advance();
          depth -= 1;
        }
        Some(_) => {}
      }
    }
  }

  fn identifier(&mut self, first: char) -> Token {
    let mut text = String::from(first);
    while let Some(c) = self.peek() {
      if !is_ident_char(c) {
        break;
      }
      text.push(c);
      self.advance();
    }
    let kind = TokenKind::keyword(&text).unwrap_or(TokenKind::Ident);
    self.make(kind, text)
  }

  fn number(&mut self, first: char) -> Token {
    let mut text = String::from(first);
    if first == '0' && matches!(self.peek(), Some('x' | 'X')) {
      self.advance();
      let mut digits = String::new();
      while let Some(c) = self.peek() {
        if !c.is_ascii_hexdigit() {
          break;
        }
        digits.push(c);
        self.advance();
      }
      return match i64::from_str_radix(&digits, 16) {
        Ok(value) => self.make(TokenKind::Integer, value.to_string()),
        Err(_) => self.invalid("invalid hexadecimal literal"),
      };
    }

    self.digits(&mut text);
    let mut kind = TokenKind::Integer;
    if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
      kind = TokenKind::Real;
      text.push('.');
      self.advance();
      self.digits(&mut text);
      if matches!(self.peek(), Some('e' | 'E')) {
        text.push('e');
        self.advance();
        if let Some(sign @ ('+' | '-')) = self.peek() {
          text.push(sign);
          self.advance();
        }
        if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
          return self.invalid("malformed exponent in real literal");
        }
        self.digits(&mut text);
      }
    }
    if kind == TokenKind::Integer && text.parse::<i64>().is_err() {
      return self.invalid("integer literal out of range");
    }
    self.make(kind, text)
  }

  fn digits(&mut self, text: &mut String) {
    while let Some(c) = self.peek() {
      if !c.is_ascii_digit() {
        break;
      }
      text.push(c);
      self.advance();
    }
  }

  fn string(&mut self) -> Token {
    let mut text = String::new();
    loop {
      match self.advance() {
        None | Some('\n') => return self.invalid("unterminated string literal"),
        Some('"') => break,
        Some('\\') => match self.advance() {
          Some('n') => text.push('\n'),
          Some('t') => text.push('\t'),
          Some('"') => text.push('"'),
          Some('\\') => text.push('\\'),
          Some(c) => {
            text.push('\\');
            text.push(c);
          }
          None => return self.invalid("unterminated string literal"),
        },
        Some(c) => text.push(c),
      }
    }
    self.make(TokenKind::String, text)
  }

  fn unquoted_path(&mut self, first: char) -> Token {
    let mut raw = String::from(first);
    while let Some(c) = self.peek() {
      if c.is_whitespace() || PATH_TERMINATORS.contains(&c) {
        break;
      }
      raw.push(c);
      self.advance();
    }
    self.path_token(&raw)
  }

  /// `'...'` path; `\'` and `\\` are escapes, other backslashes are kept.
  fn quoted_path(&mut self) -> Token {
    let mut raw = String::new();
    loop {
      match self.advance() {
        None | Some('\n') => return self.invalid("unterminated path literal"),
        Some('\'') => break,
        Some('\\') if matches!(self.peek(), Some('\'' | '\\')) => {
          if let Some(c) = self.advance() {
            raw.push(c);
          }
        }
        Some(c) => raw.push(c),
      }
    }
    if raw.is_empty() {
      return self.invalid("empty path literal");
    }
    self.path_token(&raw)
  }

  fn path_token(&mut self, raw: &str) -> Token {
    let text = normalize_path_literal(raw);
    self.make(TokenKind::Path, text)
  }

  fn symbol(&mut self) -> Token {
    let Some(first) = self.peek().filter(|c| is_ident_start(*c)) else {
      return self.invalid("expecting identifier after '`'");
    };
    let mut text = String::from(first);
    self.advance();
    while let Some(c) = self.peek() {
      if !is_ident_char(c) {
        break;
      }
      text.push(c);
      self.advance();
    }
    self.make(TokenKind::Symbol, text)
  }

  fn pair(&mut self, next: char, long: TokenKind, short: TokenKind) -> Token {
    if self.match_char(next) {
      self.make(long, long.as_str())
    } else {
      self.make(short, short.as_str())
    }
  }

  fn make(&self, kind: TokenKind, text: impl Into<String>) -> Token {
    Token::new(kind, self.start_row, self.start_col, text, self.path.clone())
  }

  fn invalid(&mut self, msg: &str) -> Token {
    self.error_at(self.start_row, self.start_col, msg);
    self.make(TokenKind::Invalid, msg)
  }

  fn error_at(&mut self, row: u32, col: u32, msg: &str) {
    self.errors.push(SyntaxError {
      path: self.path.to_path_buf(),
      row,
      col,
      msg: msg.to_string(),
    });
  }

  fn peek(&self) -> Option<char> {
    self.chars.get(self.current).copied()
  }

  fn peek_next(&self) -> Option<char> {
    self.chars.get(self.current + 1).copied()
  }

  fn match_char(&mut self, expected: char) -> bool {
    if self.peek() == Some(expected) {
      self.advance();
      true
    } else {
      false
    }
  }

  fn advance(&mut self) -> Option<char> {
    let c = self.chars.get(self.current).copied()?;
    self.current += 1;
    if c == '\n' {
      self.row += 1;
      self.col = 1;
    } else {
      self.col += 1;
    }
    Some(c)
  }
}

fn is_ident_start(c: char) -> bool {
  c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_'
}

/// `//abs` denotes the absolute path `/abs`, a leading `./` is dropped.
fn normalize_path_literal(raw: &str) -> String {
  if let Some(rest) = raw.strip_prefix("//") {
    return format!("/{}", rest);
  }
  let mut text = raw;
  while let Some(rest) = text.strip_prefix("./") {
    text = rest;
  }
  if text.is_empty() { ".".to_string() } else { text.to_string() }
}

/// Tokenize `source`, returning tokens and lexical errors.
pub fn tokenize(source: &str, path: &Path) -> (Vec<Token>, Vec<SyntaxError>) {
  Lexer::new(source, path).tokenize()
}
