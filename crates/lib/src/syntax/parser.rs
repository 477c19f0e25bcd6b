//! Recursive descent parser producing a concrete syntax tree.
//!
//! Each grammar rule produces a [`SynTree::NonTerminal`] holding every
//! consumed token. Errors are collected rather than aborting: a failing
//! statement or declaration is abandoned and the parser resynchronizes on
//! the next token that can follow a statement. After reporting an error the
//! parser stays quiet until it has consumed at least [`MIN_ERR_DIST`] tokens,
//! so one mistake yields one diagnostic.

use super::SyntaxError;
use super::token::{Token, TokenKind};
use super::tree::{Rule, SynTree};

const MIN_ERR_DIST: u32 = 2;

type PResult<T> = Result<T, ()>;

pub struct Parser {
  tokens: Vec<Token>,
  current: usize,
  errors: Vec<SyntaxError>,
  err_dist: u32,
}

impl Parser {
  /// Create a parser for `tokens`. Invalid tokens are dropped: the lexer
  /// has already reported them.
  pub fn new(mut tokens: Vec<Token>) -> Self {
    tokens.retain(|t| t.kind != TokenKind::Invalid);
    Self {
      tokens,
      current: 0,
      errors: Vec::new(),
      err_dist: MIN_ERR_DIST,
    }
  }

  /// Parse a whole file.
  pub fn parse(mut self) -> (SynTree, Vec<SyntaxError>) {
    let mut children = Vec::new();
    self.statements(true, &[], &mut children);
    (SynTree::node(Rule::Busy, children), self.errors)
  }

  // === Declarations and statements ===

  fn starts_statement(&self, top: bool) -> bool {
    match self.peek().kind {
      TokenKind::Let
      | TokenKind::Var
      | TokenKind::Param
      | TokenKind::If
      | TokenKind::Begin
      | TokenKind::Dot
      | TokenKind::Ident
      | TokenKind::Hat
      | TokenKind::Semi => true,
      TokenKind::Type
      | TokenKind::Define
      | TokenKind::Submodule
      | TokenKind::Submod
      | TokenKind::Subdir
      | TokenKind::Import
      | TokenKind::Include => top,
      _ => false,
    }
  }

  /// Parse statements until one of `stop` (or end of file) is reached.
  fn statements(&mut self, top: bool, stop: &[TokenKind], out: &mut Vec<SynTree>) {
    while !self.is_at_end() && !stop.contains(&self.peek().kind) {
      if self.starts_statement(top) {
        match self.statement(top) {
          Ok(node) => out.push(node),
          Err(()) => self.synchronize(),
        }
      } else {
        let found = self.peek().kind;
        if is_declaration_keyword(found) {
          self.error(&format!("'{}' is only allowed at module level", found));
          if self.statement(true).is_err() {
            self.synchronize();
          }
          continue;
        }
        self.error(&format!("unexpected '{}'", found));
        self.advance();
      }
    }
  }

  fn statement(&mut self, top: bool) -> PResult<SynTree> {
    match self.peek().kind {
      TokenKind::Let | TokenKind::Var | TokenKind::Param => self.var_decl(),
      TokenKind::Type => self.type_decl(),
      TokenKind::Define => self.macro_def(),
      TokenKind::Submodule | TokenKind::Submod | TokenKind::Subdir => self.submodule(),
      TokenKind::Import => self.import(),
      TokenKind::Include => self.include(),
      TokenKind::If => self.condition(top),
      TokenKind::Begin => self.block(top),
      TokenKind::Semi => Ok(SynTree::Terminal(self.take())),
      _ => self.assig_or_call(),
    }
  }

  fn var_decl(&mut self) -> PResult<SynTree> {
    let keyword = self.take();
    let is_let = keyword.kind == TokenKind::Let;
    let mut c = vec![SynTree::Terminal(keyword)];
    c.push(self.ident_def()?);
    let mut typed = false;
    if self.check(TokenKind::Colon) {
      c.push(self.terminal());
      c.push(self.type_ref()?);
      typed = true;
    }
    if self.check(TokenKind::Eq) || self.check(TokenKind::ColonEq) {
      c.push(self.terminal());
      c.push(self.expression()?);
    } else if self.check(TokenKind::LBrace) {
      c.push(self.body()?);
    } else if is_let || !typed {
      self.error("expecting '=' or '{'");
      return Err(());
    }
    Ok(SynTree::node(Rule::VarDecl, c))
  }

  fn ident_def(&mut self) -> PResult<SynTree> {
    let mut c = vec![self.expect(TokenKind::Ident)?];
    if self.check(TokenKind::Star) || self.check(TokenKind::Minus) {
      c.push(self.terminal());
    }
    Ok(SynTree::node(Rule::IdentDef, c))
  }

  fn type_decl(&mut self) -> PResult<SynTree> {
    let mut c = vec![self.terminal()];
    c.push(self.ident_def()?);
    c.push(self.expect(TokenKind::Eq)?);
    if self.check(TokenKind::LParen) {
      c.push(self.enum_decl()?);
    } else if self.check(TokenKind::Class) {
      c.push(self.class_decl()?);
    } else {
      self.error("expecting enumeration or 'class'");
      return Err(());
    }
    Ok(SynTree::node(Rule::TypeDecl, c))
  }

  fn enum_decl(&mut self) -> PResult<SynTree> {
    let mut c = vec![self.terminal()];
    c.push(self.expect(TokenKind::Symbol)?);
    while !self.check(TokenKind::RParen) {
      if self.check(TokenKind::Comma) {
        c.push(self.terminal());
      }
      c.push(self.expect(TokenKind::Symbol)?);
    }
    c.push(self.terminal());
    Ok(SynTree::node(Rule::EnumDecl, c))
  }

  fn class_decl(&mut self) -> PResult<SynTree> {
    let mut c = vec![self.terminal()];
    if self.check(TokenKind::LParen) {
      c.push(self.terminal());
      c.push(self.designator()?);
      c.push(self.expect(TokenKind::RParen)?);
    }
    c.push(self.expect(TokenKind::LBrace)?);
    while !self.check(TokenKind::RBrace) {
      if self.is_at_end() {
        self.error("expecting '}'");
        return Err(());
      }
      c.push(self.field_decl()?);
      if self.check(TokenKind::Semi) {
        c.push(self.terminal());
      }
    }
    c.push(self.terminal());
    Ok(SynTree::node(Rule::ClassDecl, c))
  }

  fn field_decl(&mut self) -> PResult<SynTree> {
    let c = vec![self.ident_def()?, self.expect(TokenKind::Colon)?, self.type_ref()?];
    Ok(SynTree::node(Rule::FieldDecl, c))
  }

  fn type_ref(&mut self) -> PResult<SynTree> {
    let mut c = vec![self.designator()?];
    if self.check(TokenKind::LBrackRBrack) {
      c.push(self.terminal());
    }
    Ok(SynTree::node(Rule::TypeRef, c))
  }

  fn designator(&mut self) -> PResult<SynTree> {
    let mut c = Vec::new();
    if self.check(TokenKind::Hat) {
      c.push(self.terminal());
    }
    c.push(self.expect(TokenKind::Ident)?);
    while self.check(TokenKind::Dot) {
      c.push(self.terminal());
      c.push(self.expect(TokenKind::Ident)?);
    }
    Ok(SynTree::node(Rule::Designator, c))
  }

  fn macro_def(&mut self) -> PResult<SynTree> {
    let mut c = vec![self.terminal(), self.expect(TokenKind::Ident)?];
    if self.check(TokenKind::LParen) {
      c.push(self.terminal());
      if !self.check(TokenKind::RParen) {
        c.push(self.expect(TokenKind::Ident)?);
        while self.check(TokenKind::Comma) {
          c.push(self.terminal());
          c.push(self.expect(TokenKind::Ident)?);
        }
      }
      c.push(self.expect(TokenKind::RParen)?);
    }
    c.push(self.body()?);
    Ok(SynTree::node(Rule::MacroDef, c))
  }

  fn submodule(&mut self) -> PResult<SynTree> {
    let mut c = vec![self.terminal(), self.ident_def()?];
    if self.check(TokenKind::Eq) {
      c.push(self.terminal());
      c.push(self.path_or_ident()?);
    }
    if self.check(TokenKind::LParen) {
      c.push(self.terminal());
      if !self.check(TokenKind::RParen) {
        c.push(self.param_value()?);
        while self.check(TokenKind::Comma) {
          c.push(self.terminal());
          c.push(self.param_value()?);
        }
      }
      c.push(self.expect(TokenKind::RParen)?);
    }
    Ok(SynTree::node(Rule::Submodule, c))
  }

  fn param_value(&mut self) -> PResult<SynTree> {
    let mut c = vec![self.expect(TokenKind::Ident)?];
    if self.check(TokenKind::Eq) {
      c.push(self.terminal());
      c.push(self.expression()?);
    }
    Ok(SynTree::node(Rule::ParamValue, c))
  }

  fn import(&mut self) -> PResult<SynTree> {
    let c = vec![
      self.terminal(),
      self.ident_def()?,
      self.expect(TokenKind::Eq)?,
      self.path_or_ident()?,
    ];
    Ok(SynTree::node(Rule::Import, c))
  }

  fn include(&mut self) -> PResult<SynTree> {
    let c = vec![self.terminal(), self.expect(TokenKind::Path)?];
    Ok(SynTree::node(Rule::Include, c))
  }

  fn path_or_ident(&mut self) -> PResult<SynTree> {
    if self.check(TokenKind::Path) || self.check(TokenKind::Ident) {
      Ok(self.terminal())
    } else {
      self.error("expecting path or identifier");
      Err(())
    }
  }

  fn body(&mut self) -> PResult<SynTree> {
    let mut c = vec![self.expect(TokenKind::LBrace)?];
    self.statements(false, &[TokenKind::RBrace], &mut c);
    c.push(self.expect(TokenKind::RBrace)?);
    Ok(SynTree::node(Rule::Body, c))
  }

  fn block(&mut self, top: bool) -> PResult<SynTree> {
    let mut c = vec![self.terminal()];
    self.statements(top, &[TokenKind::End], &mut c);
    c.push(self.expect(TokenKind::End)?);
    Ok(SynTree::node(Rule::Block, c))
  }

  fn condition(&mut self, top: bool) -> PResult<SynTree> {
    const STOP: &[TokenKind] = &[TokenKind::Elsif, TokenKind::Else, TokenKind::End];
    let mut c = vec![self.terminal(), self.expression()?, self.expect(TokenKind::Then)?];
    self.statements(top, STOP, &mut c);
    while self.check(TokenKind::Elsif) {
      c.push(self.terminal());
      c.push(self.expression()?);
      c.push(self.expect(TokenKind::Then)?);
      self.statements(top, STOP, &mut c);
    }
    if self.check(TokenKind::Else) {
      c.push(self.terminal());
      self.statements(top, &[TokenKind::End], &mut c);
    }
    c.push(self.expect(TokenKind::End)?);
    Ok(SynTree::node(Rule::Condition, c))
  }

  fn assig_or_call(&mut self) -> PResult<SynTree> {
    let mut c = Vec::new();
    if self.check(TokenKind::Dot) {
      c.push(self.terminal());
    }
    c.push(self.designator()?);
    match self.peek().kind {
      TokenKind::Eq | TokenKind::ColonEq | TokenKind::PlusEq | TokenKind::MinusEq | TokenKind::StarEq => {
        let op = self.terminal();
        let value = self.expression()?;
        c.push(SynTree::node(Rule::Assignment, vec![op, value]));
      }
      TokenKind::LParen => c.push(self.call()?),
      _ => {
        self.error("expecting assignment or call");
        return Err(());
      }
    }
    Ok(SynTree::node(Rule::AssigOrCall, c))
  }

  fn call(&mut self) -> PResult<SynTree> {
    let mut c = vec![self.terminal()];
    if !self.check(TokenKind::RParen) {
      let mut list = vec![self.expression()?];
      while self.check(TokenKind::Comma) {
        list.push(self.terminal());
        list.push(self.expression()?);
      }
      c.push(SynTree::node(Rule::ExpList, list));
    }
    c.push(self.expect(TokenKind::RParen)?);
    Ok(SynTree::node(Rule::Call, c))
  }

  // === Expressions ===

  fn expression(&mut self) -> PResult<SynTree> {
    let mut c = vec![self.simple_expression()?];
    if is_relation(self.peek().kind) {
      c.push(SynTree::node(Rule::Relation, vec![self.terminal()]));
      c.push(self.simple_expression()?);
    }
    if self.check(TokenKind::Question) {
      c.push(self.terminal());
      c.push(self.expression()?);
      c.push(self.expect(TokenKind::Colon)?);
      c.push(self.expression()?);
    }
    Ok(SynTree::node(Rule::Expression, c))
  }

  fn simple_expression(&mut self) -> PResult<SynTree> {
    let mut c = Vec::new();
    if self.check(TokenKind::Minus) {
      c.push(self.terminal());
    }
    c.push(self.term()?);
    while matches!(self.peek().kind, TokenKind::Plus | TokenKind::Minus | TokenKind::BarBar) {
      c.push(SynTree::node(Rule::AddOperator, vec![self.terminal()]));
      c.push(self.term()?);
    }
    Ok(SynTree::node(Rule::SimpleExpression, c))
  }

  fn term(&mut self) -> PResult<SynTree> {
    let mut c = vec![self.factor()?];
    while matches!(
      self.peek().kind,
      TokenKind::Star | TokenKind::Slash | TokenKind::Percent | TokenKind::AmpAmp
    ) {
      c.push(SynTree::node(Rule::MulOperator, vec![self.terminal()]));
      c.push(self.factor()?);
    }
    Ok(SynTree::node(Rule::Term, c))
  }

  fn factor(&mut self) -> PResult<SynTree> {
    let c = match self.peek().kind {
      TokenKind::Integer
      | TokenKind::Real
      | TokenKind::String
      | TokenKind::Path
      | TokenKind::Symbol
      | TokenKind::True
      | TokenKind::False => vec![self.terminal()],
      TokenKind::LBrack | TokenKind::LBrackRBrack => vec![self.list()?],
      TokenKind::LParen => vec![self.terminal(), self.expression()?, self.expect(TokenKind::RParen)?],
      TokenKind::Bang => vec![self.terminal(), self.factor()?],
      TokenKind::Dot => vec![self.terminal(), self.designator()?],
      TokenKind::Ident | TokenKind::Hat => {
        let designator = self.designator()?;
        if self.check(TokenKind::LParen) {
          vec![designator, self.call()?]
        } else if self.check(TokenKind::LBrace) {
          let body = self.body()?;
          vec![SynTree::node(Rule::Constructor, vec![designator, body])]
        } else {
          vec![designator]
        }
      }
      TokenKind::Dollar | TokenKind::Amp => {
        let kind = self.peek().kind;
        self.error(&format!("'{}' is reserved", kind));
        return Err(());
      }
      _ => {
        self.error("expecting expression");
        return Err(());
      }
    };
    Ok(SynTree::node(Rule::Factor, c))
  }

  fn list(&mut self) -> PResult<SynTree> {
    if self.check(TokenKind::LBrackRBrack) {
      return Ok(SynTree::node(Rule::List, vec![self.terminal()]));
    }
    let mut c = vec![self.terminal()];
    while !self.check(TokenKind::RBrack) {
      if self.is_at_end() {
        self.error("expecting ']'");
        return Err(());
      }
      c.push(self.expression()?);
      if self.check(TokenKind::Comma) {
        c.push(self.terminal());
      }
    }
    c.push(self.terminal());
    Ok(SynTree::node(Rule::List, c))
  }

  // === Token handling ===

  fn peek(&self) -> &Token {
    &self.tokens[self.current.min(self.tokens.len() - 1)]
  }

  fn check(&self, kind: TokenKind) -> bool {
    self.peek().kind == kind
  }

  fn is_at_end(&self) -> bool {
    self.check(TokenKind::Eof)
  }

  fn advance(&mut self) {
    if !self.is_at_end() {
      self.current += 1;
    }
    self.err_dist += 1;
  }

  fn take(&mut self) -> Token {
    let token = self.peek().clone();
    self.advance();
    token
  }

  fn terminal(&mut self) -> SynTree {
    SynTree::Terminal(self.take())
  }

  fn expect(&mut self, kind: TokenKind) -> PResult<SynTree> {
    if self.check(kind) {
      Ok(self.terminal())
    } else {
      self.error(&format!("expecting '{}'", kind));
      Err(())
    }
  }

  fn error(&mut self, msg: &str) {
    if self.err_dist >= MIN_ERR_DIST {
      let token = self.peek();
      self.errors.push(SyntaxError {
        path: token.path.to_path_buf(),
        row: token.row,
        col: token.col,
        msg: msg.to_string(),
      });
    }
    self.err_dist = 0;
  }

  /// Skip to a token that can follow or start a statement.
  fn synchronize(&mut self) {
    while !self.is_at_end() {
      match self.peek().kind {
        TokenKind::Semi => {
          self.advance();
          return;
        }
        TokenKind::RBrace
        | TokenKind::End
        | TokenKind::Else
        | TokenKind::Elsif
        | TokenKind::Let
        | TokenKind::Var
        | TokenKind::Param
        | TokenKind::Type
        | TokenKind::Define
        | TokenKind::Submodule
        | TokenKind::Submod
        | TokenKind::Subdir
        | TokenKind::Import
        | TokenKind::Include
        | TokenKind::If
        | TokenKind::Begin => return,
        _ => self.advance(),
      }
    }
  }
}

fn is_relation(kind: TokenKind) -> bool {
  matches!(
    kind,
    TokenKind::EqEq | TokenKind::BangEq | TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge | TokenKind::In
  )
}

fn is_declaration_keyword(kind: TokenKind) -> bool {
  matches!(
    kind,
    TokenKind::Type
      | TokenKind::Define
      | TokenKind::Submodule
      | TokenKind::Submod
      | TokenKind::Subdir
      | TokenKind::Import
      | TokenKind::Include
  )
}
