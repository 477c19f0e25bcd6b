//! Concrete syntax tree.

use super::token::{Token, TokenKind};

/// Grammar rules that produce non-terminal nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
  Busy,
  Submodule,
  Import,
  Include,
  ParamValue,
  VarDecl,
  IdentDef,
  TypeDecl,
  EnumDecl,
  ClassDecl,
  FieldDecl,
  TypeRef,
  Designator,
  MacroDef,
  Body,
  Block,
  Condition,
  AssigOrCall,
  Assignment,
  Call,
  ExpList,
  Expression,
  SimpleExpression,
  Relation,
  AddOperator,
  Term,
  MulOperator,
  Factor,
  List,
  Constructor,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SynTree {
  Terminal(Token),
  NonTerminal { rule: Rule, children: Vec<SynTree> },
}

impl SynTree {
  pub fn node(rule: Rule, children: Vec<SynTree>) -> Self {
    SynTree::NonTerminal { rule, children }
  }

  pub fn rule(&self) -> Option<Rule> {
    match self {
      SynTree::NonTerminal { rule, .. } => Some(*rule),
      SynTree::Terminal(_) => None,
    }
  }

  pub fn is_rule(&self, expected: Rule) -> bool {
    self.rule() == Some(expected)
  }

  pub fn children(&self) -> &[SynTree] {
    match self {
      SynTree::NonTerminal { children, .. } => children,
      SynTree::Terminal(_) => &[],
    }
  }

  pub fn token(&self) -> Option<&Token> {
    match self {
      SynTree::Terminal(token) => Some(token),
      SynTree::NonTerminal { .. } => None,
    }
  }

  /// True if this node is a terminal of the given kind.
  pub fn is_token(&self, kind: TokenKind) -> bool {
    self.token().is_some_and(|t| t.kind == kind)
  }

  /// Leftmost token of the subtree.
  pub fn first_token(&self) -> Option<&Token> {
    match self {
      SynTree::Terminal(token) => Some(token),
      SynTree::NonTerminal { children, .. } => children.iter().find_map(|c| c.first_token()),
    }
  }

  /// Rightmost token of the subtree.
  pub fn last_token(&self) -> Option<&Token> {
    match self {
      SynTree::Terminal(token) => Some(token),
      SynTree::NonTerminal { children, .. } => children.iter().rev().find_map(|c| c.last_token()),
    }
  }

  /// First direct child produced by `rule`.
  pub fn child(&self, rule: Rule) -> Option<&SynTree> {
    self.children().iter().find(|c| c.is_rule(rule))
  }

  /// First direct terminal child of `kind`.
  pub fn child_token(&self, kind: TokenKind) -> Option<&Token> {
    self.children().iter().filter_map(|c| c.token()).find(|t| t.kind == kind)
  }

  /// Render the tree in an indented form, one node per line.
  pub fn dump(&self) -> String {
    let mut out = String::new();
    self.dump_into(&mut out, 0);
    out
  }

  fn dump_into(&self, out: &mut String, depth: usize) {
    let indent = "  ".repeat(depth);
    match self {
      SynTree::Terminal(token) => {
        out.push_str(&format!("{}{:?} '{}' {}:{}\n", indent, token.kind, token.text, token.row, token.col));
      }
      SynTree::NonTerminal { rule, children } => {
        out.push_str(&format!("{}{:?}\n", indent, rule));
        for child in children {
          child.dump_into(out, depth + 1);
        }
      }
    }
  }
}
