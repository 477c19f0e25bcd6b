//! Token model for build description files.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Terminal symbols of the build description language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
  // Operators
  Bang,
  BangEq,
  Percent,
  Amp,
  AmpAmp,
  LParen,
  RParen,
  Star,
  StarEq,
  Plus,
  PlusEq,
  Comma,
  Minus,
  MinusEq,
  Dot,
  Slash,
  Colon,
  ColonEq,
  Semi,
  Lt,
  Le,
  Eq,
  EqEq,
  Gt,
  Ge,
  Question,
  LBrack,
  LBrackRBrack,
  RBrack,
  Hat,
  LBrace,
  BarBar,
  RBrace,
  Dollar,

  // Keywords
  Begin,
  Class,
  Define,
  Else,
  Elsif,
  End,
  False,
  If,
  Import,
  In,
  Include,
  Let,
  Param,
  Subdir,
  Submod,
  Submodule,
  Then,
  True,
  Type,
  Var,

  // Specials
  Ident,
  String,
  Integer,
  Real,
  Path,
  Symbol,

  Invalid,
  Eof,
}

impl TokenKind {
  /// Map an identifier to its keyword kind, if it is one.
  pub fn keyword(word: &str) -> Option<Self> {
    let kind = match word {
      "begin" => Self::Begin,
      "class" => Self::Class,
      "define" => Self::Define,
      "else" => Self::Else,
      "elsif" => Self::Elsif,
      "end" => Self::End,
      "false" => Self::False,
      "if" => Self::If,
      "import" => Self::Import,
      "in" => Self::In,
      "include" => Self::Include,
      "let" => Self::Let,
      "param" => Self::Param,
      "subdir" => Self::Subdir,
      "submod" => Self::Submod,
      "submodule" => Self::Submodule,
      "then" => Self::Then,
      "true" => Self::True,
      "type" => Self::Type,
      "var" => Self::Var,
      _ => return None,
    };
    Some(kind)
  }

  pub fn is_keyword(self) -> bool {
    matches!(
      self,
      Self::Begin
        | Self::Class
        | Self::Define
        | Self::Else
        | Self::Elsif
        | Self::End
        | Self::False
        | Self::If
        | Self::Import
        | Self::In
        | Self::Include
        | Self::Let
        | Self::Param
        | Self::Subdir
        | Self::Submod
        | Self::Submodule
        | Self::Then
        | Self::True
        | Self::Type
        | Self::Var
    )
  }

  /// Human readable spelling used in diagnostics.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Bang => "!",
      Self::BangEq => "!=",
      Self::Percent => "%",
      Self::Amp => "&",
      Self::AmpAmp => "&&",
      Self::LParen => "(",
      Self::RParen => ")",
      Self::Star => "*",
      Self::StarEq => "*=",
      Self::Plus => "+",
      Self::PlusEq => "+=",
      Self::Comma => ",",
      Self::Minus => "-",
      Self::MinusEq => "-=",
      Self::Dot => ".",
      Self::Slash => "/",
      Self::Colon => ":",
      Self::ColonEq => ":=",
      Self::Semi => ";",
      Self::Lt => "<",
      Self::Le => "<=",
      Self::Eq => "=",
      Self::EqEq => "==",
      Self::Gt => ">",
      Self::Ge => ">=",
      Self::Question => "?",
      Self::LBrack => "[",
      Self::LBrackRBrack => "[]",
      Self::RBrack => "]",
      Self::Hat => "^",
      Self::LBrace => "{",
      Self::BarBar => "||",
      Self::RBrace => "}",
      Self::Dollar => "$",
      Self::Begin => "begin",
      Self::Class => "class",
      Self::Define => "define",
      Self::Else => "else",
      Self::Elsif => "elsif",
      Self::End => "end",
      Self::False => "false",
      Self::If => "if",
      Self::Import => "import",
      Self::In => "in",
      Self::Include => "include",
      Self::Let => "let",
      Self::Param => "param",
      Self::Subdir => "subdir",
      Self::Submod => "submod",
      Self::Submodule => "submodule",
      Self::Then => "then",
      Self::True => "true",
      Self::Type => "type",
      Self::Var => "var",
      Self::Ident => "identifier",
      Self::String => "string",
      Self::Integer => "integer",
      Self::Real => "real",
      Self::Path => "path",
      Self::Symbol => "symbol",
      Self::Invalid => "invalid token",
      Self::Eof => "end of file",
    }
  }
}

impl fmt::Display for TokenKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// A lexical unit with its source position.
///
/// `text` holds the literal value: the unescaped contents of a string, the
/// path of a path literal (without quotes, `//` mapped to `/`), the name of a
/// symbol (without the backtick), or the spelling of any other token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
  pub kind: TokenKind,
  pub row: u32,
  pub col: u32,
  pub text: String,
  pub path: Arc<Path>,
}

impl Token {
  pub fn new(kind: TokenKind, row: u32, col: u32, text: impl Into<String>, path: Arc<Path>) -> Self {
    Self {
      kind,
      row,
      col,
      text: text.into(),
      path,
    }
  }

  pub fn is(&self, kind: TokenKind) -> bool {
    self.kind == kind
  }
}
