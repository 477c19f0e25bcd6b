//! Expression evaluation and name resolution.

use crate::model::{DeclData, DeclId, DeclKind, Value};
use crate::syntax::{Rule, SynTree, Token, TokenKind};

use super::{builtins, loc, node_loc, semantic, Ctx, EvalError, Session};

/// What a designator refers to.
#[derive(Debug, Clone)]
pub(super) enum Resolved {
  Decl(DeclId),
  Value(Value),
}

impl Session {
  pub(super) fn eval(&mut self, ctx: &mut Ctx, node: &SynTree) -> Result<Value, EvalError> {
    match node.rule() {
      Some(Rule::Expression) => self.eval_expression(ctx, node),
      Some(Rule::SimpleExpression) => self.eval_simple(ctx, node),
      Some(Rule::Term) => self.eval_term(ctx, node),
      Some(Rule::Factor) => self.eval_factor(ctx, node),
      Some(Rule::List) => self.eval_list(ctx, node),
      _ => Err(semantic(node_loc(node), "expecting expression")),
    }
  }

  pub(super) fn eval_args(&mut self, ctx: &mut Ctx, call: &SynTree) -> Result<Vec<Value>, EvalError> {
    let Some(list) = call.child(Rule::ExpList) else {
      return Ok(Vec::new());
    };
    list
      .children()
      .iter()
      .filter(|c| c.is_rule(Rule::Expression))
      .map(|e| self.eval(ctx, e))
      .collect()
  }

  fn eval_expression(&mut self, ctx: &mut Ctx, node: &SynTree) -> Result<Value, EvalError> {
    let children = node.children();
    let Some(first) = children.first() else {
      return Err(semantic(node_loc(node), "expecting expression"));
    };
    let mut value = self.eval(ctx, first)?;
    let mut i = 1;
    if let Some(relation) = children.get(i).filter(|c| c.is_rule(Rule::Relation)) {
      let op = relation
        .first_token()
        .ok_or_else(|| semantic(node_loc(node), "expecting relation"))?;
      let rhs_node = children
        .get(i + 1)
        .ok_or_else(|| semantic(loc(op), "expecting expression"))?;
      let rhs = self.eval(ctx, rhs_node)?;
      value = relation_op(op.kind, value, rhs).map_err(|msg| semantic(loc(op), msg))?;
      i += 2;
    }
    if children.get(i).is_some_and(|c| c.is_token(TokenKind::Question)) {
      let (Some(then), Some(otherwise)) = (children.get(i + 1), children.get(i + 3)) else {
        return Err(semantic(node_loc(node), "incomplete conditional expression"));
      };
      value = match value {
        Value::Bool(true) => self.eval(ctx, then)?,
        Value::Bool(false) => self.eval(ctx, otherwise)?,
        other => {
          return Err(EvalError::TypeMismatch {
            loc: node_loc(first),
            expected: "bool".to_string(),
            found: other.type_name().to_string(),
          });
        }
      };
    }
    Ok(value)
  }

  fn eval_simple(&mut self, ctx: &mut Ctx, node: &SynTree) -> Result<Value, EvalError> {
    let children = node.children();
    let negate = children.first().is_some_and(|c| c.is_token(TokenKind::Minus));
    let mut rest = children.iter().skip(usize::from(negate));
    let Some(first) = rest.next() else {
      return Err(semantic(node_loc(node), "expecting term"));
    };
    let mut value = self.eval(ctx, first)?;
    if negate {
      value = match value {
        Value::Int(i) => Value::Int(i.checked_neg().ok_or_else(|| semantic(node_loc(node), "integer overflow"))?),
        Value::Real(r) => Value::Real(-r),
        other => return Err(semantic(node_loc(node), format!("cannot negate {}", other.type_name()))),
      };
    }
    while let (Some(op_node), Some(term)) = (rest.next(), rest.next()) {
      let op = op_node
        .first_token()
        .ok_or_else(|| semantic(node_loc(op_node), "expecting operator"))?;
      value = self.binary(ctx, op, value, term)?;
    }
    Ok(value)
  }

  fn eval_term(&mut self, ctx: &mut Ctx, node: &SynTree) -> Result<Value, EvalError> {
    let mut rest = node.children().iter();
    let Some(first) = rest.next() else {
      return Err(semantic(node_loc(node), "expecting factor"));
    };
    let mut value = self.eval(ctx, first)?;
    while let (Some(op_node), Some(factor)) = (rest.next(), rest.next()) {
      let op = op_node
        .first_token()
        .ok_or_else(|| semantic(node_loc(op_node), "expecting operator"))?;
      value = self.binary(ctx, op, value, factor)?;
    }
    Ok(value)
  }

  /// Apply a binary operator; `||` and `&&` short-circuit.
  fn binary(&mut self, ctx: &mut Ctx, op: &Token, lhs: Value, rhs_node: &SynTree) -> Result<Value, EvalError> {
    if matches!(op.kind, TokenKind::BarBar | TokenKind::AmpAmp) {
      let Value::Bool(left) = lhs else {
        return Err(EvalError::TypeMismatch {
          loc: loc(op),
          expected: "bool".to_string(),
          found: lhs.type_name().to_string(),
        });
      };
      if (op.kind == TokenKind::BarBar) == left {
        return Ok(Value::Bool(left));
      }
      return match self.eval(ctx, rhs_node)? {
        v @ Value::Bool(_) => Ok(v),
        other => Err(EvalError::TypeMismatch {
          loc: node_loc(rhs_node),
          expected: "bool".to_string(),
          found: other.type_name().to_string(),
        }),
      };
    }
    let rhs = self.eval(ctx, rhs_node)?;
    arith(op.kind, lhs, rhs).map_err(|msg| semantic(loc(op), msg))
  }

  fn eval_factor(&mut self, ctx: &mut Ctx, node: &SynTree) -> Result<Value, EvalError> {
    match node.children() {
      [SynTree::Terminal(token)] => self.literal(ctx, token),
      [inner] if inner.is_rule(Rule::List) => self.eval_list(ctx, inner),
      [inner] if inner.is_rule(Rule::Constructor) => self.construct(ctx, inner),
      [designator] if designator.is_rule(Rule::Designator) => {
        let resolved = self.resolve(ctx, designator)?;
        self.resolved_value(resolved, designator)
      }
      [designator, call] if call.is_rule(Rule::Call) => {
        let args = self.eval_args(ctx, call)?;
        let name = match designator.children() {
          [SynTree::Terminal(t)] => t.text.as_str(),
          _ => "",
        };
        match builtins::call_function(&self.model, ctx.module, name, &args) {
          Some(result) => result.map_err(|msg| semantic(node_loc(designator), msg)),
          None => Err(semantic(node_loc(designator), "only built-in functions can be called in expressions")),
        }
      }
      [bang, operand] if bang.is_token(TokenKind::Bang) => match self.eval(ctx, operand)? {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        other => Err(EvalError::TypeMismatch {
          loc: node_loc(operand),
          expected: "bool".to_string(),
          found: other.type_name().to_string(),
        }),
      },
      [dot, designator] if dot.is_token(TokenKind::Dot) => {
        let resolved = self.resolve_field(ctx, designator)?;
        self.resolved_value(resolved, designator)
      }
      [open, inner, _] if open.is_token(TokenKind::LParen) => self.eval(ctx, inner),
      _ => Err(semantic(node_loc(node), "invalid expression")),
    }
  }

  fn literal(&mut self, ctx: &Ctx, token: &Token) -> Result<Value, EvalError> {
    let value = match token.kind {
      TokenKind::Integer => Value::Int(
        token
          .text
          .parse()
          .map_err(|_| semantic(loc(token), "invalid integer"))?,
      ),
      TokenKind::Real => Value::Real(token.text.parse().map_err(|_| semantic(loc(token), "invalid real"))?),
      TokenKind::String => Value::Str(token.text.clone()),
      TokenKind::Symbol => Value::Symbol(token.text.clone()),
      TokenKind::True => Value::Bool(true),
      TokenKind::False => Value::Bool(false),
      TokenKind::Path => {
        let resolved = self.model.resolve_path(ctx.module, &token.text);
        self.xref.add_path(token, resolved);
        Value::Path(token.text.clone())
      }
      other => return Err(semantic(loc(token), format!("unexpected '{}'", other))),
    };
    Ok(value)
  }

  fn eval_list(&mut self, ctx: &mut Ctx, node: &SynTree) -> Result<Value, EvalError> {
    let items = node
      .children()
      .iter()
      .filter(|c| c.is_rule(Rule::Expression))
      .map(|e| self.eval(ctx, e))
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::List(items))
  }

  /// `Class { ... }`: a fresh instance initialized by the body.
  fn construct(&mut self, ctx: &mut Ctx, node: &SynTree) -> Result<Value, EvalError> {
    let (Some(designator), Some(body)) = (node.child(Rule::Designator), node.child(Rule::Body)) else {
      return Err(semantic(node_loc(node), "invalid constructor"));
    };
    let class = match self.resolve(ctx, designator)? {
      Resolved::Decl(id) if self.model.decl(id).kind() == DeclKind::Class => id,
      _ => return Err(semantic(node_loc(designator), "expecting a class")),
    };
    let inst = self.new_instance(class, ctx.module, None);
    self.exec_body(ctx, body, inst)?;
    Ok(Value::Object(inst))
  }

  fn resolved_value(&self, resolved: Resolved, at: &SynTree) -> Result<Value, EvalError> {
    match resolved {
      Resolved::Value(v) => Ok(v),
      Resolved::Decl(id) => match &self.model.decl(id).data {
        DeclData::Var(var) => Ok(var.value.clone()),
        DeclData::Module(_) | DeclData::Class(_) | DeclData::Enum(_) => Ok(Value::Decl(id)),
        DeclData::Macro(_) | DeclData::Field(_) => {
          Err(semantic(node_loc(at), format!("'{}' cannot be used as a value", self.model.decl(id).name)))
        }
      },
    }
  }

  /// Resolve `[^] ident { . ident }` starting from the lexical scope.
  pub(super) fn resolve(&mut self, ctx: &mut Ctx, designator: &SynTree) -> Result<Resolved, EvalError> {
    let climb = designator.children().first().is_some_and(|c| c.is_token(TokenKind::Hat));
    let mut idents = designator
      .children()
      .iter()
      .filter_map(|c| c.token())
      .filter(|t| t.kind == TokenKind::Ident);
    let Some(first) = idents.next() else {
      return Err(semantic(node_loc(designator), "expecting identifier"));
    };

    let mut current = if climb {
      Resolved::Decl(self.lookup_outer(ctx.module, first)?)
    } else if let Some(local) = ctx.local(&first.text) {
      Resolved::Value(local.value.clone())
    } else {
      Resolved::Decl(self.lookup(ctx.module, first)?)
    };
    for ident in idents {
      current = self.select(ctx, current, ident)?;
    }
    Ok(current)
  }

  /// Resolve `.ident { . ident }` against the object under construction.
  fn resolve_field(&mut self, ctx: &mut Ctx, designator: &SynTree) -> Result<Resolved, EvalError> {
    let Some(this) = ctx.this else {
      return Err(semantic(node_loc(designator), "field access outside of an object body"));
    };
    let mut current = Resolved::Value(Value::Object(this));
    for ident in designator
      .children()
      .iter()
      .filter_map(|c| c.token())
      .filter(|t| t.kind == TokenKind::Ident)
    {
      current = self.select(ctx, current, ident)?;
    }
    Ok(current)
  }

  /// Current module, then prelude.
  fn lookup(&mut self, module: DeclId, name: &Token) -> Result<DeclId, EvalError> {
    let found = self
      .model
      .member(module, &name.text)
      .or_else(|| self.model.prelude.and_then(|p| self.model.member(p, &name.text)));
    match found {
      Some(id) => {
        self.xref.add_use(name, id);
        Ok(id)
      }
      None => Err(EvalError::Undefined {
        loc: loc(name),
        name: name.text.clone(),
      }),
    }
  }

  /// `^name`: parent module, climbing towards the root, then prelude.
  fn lookup_outer(&mut self, module: DeclId, name: &Token) -> Result<DeclId, EvalError> {
    let mut current = self.model.owning_module(module);
    while let Some(m) = current {
      if let Some(id) = self.model.member(m, &name.text) {
        self.xref.add_use(name, id);
        return Ok(id);
      }
      current = self.model.owning_module(m);
    }
    match self.model.prelude {
      Some(prelude) => self.lookup(prelude, name),
      None => Err(EvalError::Undefined {
        loc: loc(name),
        name: name.text.clone(),
      }),
    }
  }

  /// Apply one `.ident` selection.
  fn select(&mut self, ctx: &Ctx, current: Resolved, ident: &Token) -> Result<Resolved, EvalError> {
    let target = match current {
      Resolved::Decl(id) | Resolved::Value(Value::Decl(id)) => match &self.model.decl(id).data {
        DeclData::Module(_) => return self.select_member(ctx, id, ident).map(Resolved::Decl),
        DeclData::Var(var) => var.value.clone(),
        _ => {
          return Err(semantic(
            loc(ident),
            format!("cannot select '{}' from {}", ident.text, self.model.decl(id).name),
          ));
        }
      },
      Resolved::Value(v) => v,
    };
    let Value::Object(inst) = target else {
      return Err(semantic(
        loc(ident),
        format!("cannot select '{}' from a {}", ident.text, target.type_name()),
      ));
    };
    let class = self.model.inst(inst).class;
    let Some(field) = self.model.find_field(class, &ident.text) else {
      return Err(semantic(
        loc(ident),
        format!("'{}' is not a field of {}", ident.text, self.model.decl(class).name),
      ));
    };
    self.xref.add_use(ident, field);
    let value = self
      .model
      .inst(inst)
      .fields
      .get(&ident.text)
      .cloned()
      .unwrap_or_else(|| self.model.field_type(field).zero());
    Ok(Resolved::Value(value))
  }

  fn select_member(&mut self, ctx: &Ctx, module: DeclId, ident: &Token) -> Result<DeclId, EvalError> {
    let Some(id) = self.model.member(module, &ident.text) else {
      return Err(EvalError::Undefined {
        loc: loc(ident),
        name: format!("{}.{}", self.model.decl(module).name, ident.text),
      });
    };
    self.xref.add_use(ident, id);
    if module != ctx.module && !self.model.decl(id).is_public() {
      return Err(EvalError::NotPublic {
        loc: loc(ident),
        name: ident.text.clone(),
      });
    }
    Ok(id)
  }
}

fn numeric(a: &Value, b: &Value) -> Option<(f64, f64)> {
  match (a, b) {
    (Value::Int(x), Value::Real(y)) => Some((*x as f64, *y)),
    (Value::Real(x), Value::Int(y)) => Some((*x, *y as f64)),
    (Value::Real(x), Value::Real(y)) => Some((*x, *y)),
    _ => None,
  }
}

/// Evaluate `a <rel> b`.
pub(super) fn relation_op(op: TokenKind, a: Value, b: Value) -> Result<Value, String> {
  use std::cmp::Ordering;

  if op == TokenKind::In {
    return match b {
      Value::List(items) => Ok(Value::Bool(items.contains(&a))),
      other => Err(format!("'in' expects a list, found {}", other.type_name())),
    };
  }
  if matches!(op, TokenKind::EqEq | TokenKind::BangEq) {
    let equal = match numeric(&a, &b) {
      Some((x, y)) => x == y,
      None => a == b,
    };
    return Ok(Value::Bool(equal == (op == TokenKind::EqEq)));
  }

  let ordering = match (&a, &b) {
    (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
    (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
    _ => numeric(&a, &b).and_then(|(x, y)| x.partial_cmp(&y)),
  };
  let Some(ordering) = ordering else {
    return Err(format!("cannot compare {} with {}", a.type_name(), b.type_name()));
  };
  let result = match op {
    TokenKind::Lt => ordering == Ordering::Less,
    TokenKind::Le => ordering != Ordering::Greater,
    TokenKind::Gt => ordering == Ordering::Greater,
    TokenKind::Ge => ordering != Ordering::Less,
    other => return Err(format!("unexpected relation '{}'", other)),
  };
  Ok(Value::Bool(result))
}

/// Evaluate an arithmetic or concatenation operator.
pub(super) fn arith(op: TokenKind, a: Value, b: Value) -> Result<Value, String> {
  const OVERFLOW: &str = "integer overflow";
  let mismatch = |a: &Value, b: &Value| {
    format!(
      "operator '{}' not applicable to {} and {}",
      op,
      a.type_name(),
      b.type_name()
    )
  };

  match (op, a, b) {
    (TokenKind::Plus, Value::Int(x), Value::Int(y)) => x.checked_add(y).map(Value::Int).ok_or(OVERFLOW.into()),
    (TokenKind::Minus, Value::Int(x), Value::Int(y)) => x.checked_sub(y).map(Value::Int).ok_or(OVERFLOW.into()),
    (TokenKind::Star, Value::Int(x), Value::Int(y)) => x.checked_mul(y).map(Value::Int).ok_or(OVERFLOW.into()),
    (TokenKind::Slash | TokenKind::Percent, Value::Int(_), Value::Int(0)) => Err("division by zero".to_string()),
    (TokenKind::Slash, Value::Int(x), Value::Int(y)) => x.checked_div(y).map(Value::Int).ok_or(OVERFLOW.into()),
    (TokenKind::Percent, Value::Int(x), Value::Int(y)) => x.checked_rem(y).map(Value::Int).ok_or(OVERFLOW.into()),
    (TokenKind::Plus, Value::Str(x), Value::Str(y)) => Ok(Value::Str(x + &y)),
    (TokenKind::Plus, Value::List(mut x), Value::List(y)) => {
      x.extend(y);
      Ok(Value::List(x))
    }
    (TokenKind::Minus, Value::List(x), Value::List(y)) => {
      Ok(Value::List(x.into_iter().filter(|i| !y.contains(i)).collect()))
    }
    (TokenKind::Plus, Value::Path(x), Value::Path(y)) => {
      if y.starts_with('/') {
        return Err(format!("cannot append absolute path '{}'", y));
      }
      if x.is_empty() || x == "." {
        return Ok(Value::Path(y));
      }
      Ok(Value::Path(format!("{}/{}", x.trim_end_matches('/'), y)))
    }
    (TokenKind::Plus, Value::Path(x), Value::Str(y)) => Ok(Value::Path(x + &y)),
    (op, a, b) => match numeric(&a, &b) {
      Some((x, y)) => match op {
        TokenKind::Plus => Ok(Value::Real(x + y)),
        TokenKind::Minus => Ok(Value::Real(x - y)),
        TokenKind::Star => Ok(Value::Real(x * y)),
        TokenKind::Slash if y == 0.0 => Err("division by zero".to_string()),
        TokenKind::Slash => Ok(Value::Real(x / y)),
        _ => Err(mismatch(&a, &b)),
      },
      None => Err(mismatch(&a, &b)),
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn paths_join_and_strings_append() {
    assert_eq!(
      arith(TokenKind::Plus, Value::Path("src".into()), Value::Path("a.c".into())),
      Ok(Value::Path("src/a.c".into()))
    );
    assert_eq!(
      arith(TokenKind::Plus, Value::Path("lib".into()), Value::Str(".a".into())),
      Ok(Value::Path("lib.a".into()))
    );
    assert!(arith(TokenKind::Plus, Value::Path("a".into()), Value::Path("/b".into())).is_err());
  }

  #[test]
  fn mixed_numbers_promote_to_real() {
    assert_eq!(arith(TokenKind::Star, Value::Int(2), Value::Real(1.5)), Ok(Value::Real(3.0)));
    assert_eq!(
      relation_op(TokenKind::EqEq, Value::Int(2), Value::Real(2.0)),
      Ok(Value::Bool(true))
    );
  }

  #[test]
  fn integer_errors_are_reported() {
    assert_eq!(
      arith(TokenKind::Slash, Value::Int(1), Value::Int(0)),
      Err("division by zero".to_string())
    );
    assert!(arith(TokenKind::Plus, Value::Int(i64::MAX), Value::Int(1)).is_err());
    assert!(arith(TokenKind::Plus, Value::Str("a".into()), Value::Int(1)).is_err());
  }

  #[test]
  fn membership_and_ordering() {
    let list = Value::List(vec![Value::Symbol("linux".into()), Value::Symbol("macos".into())]);
    assert_eq!(
      relation_op(TokenKind::In, Value::Symbol("macos".into()), list),
      Ok(Value::Bool(true))
    );
    assert_eq!(
      relation_op(TokenKind::Lt, Value::Str("a".into()), Value::Str("b".into())),
      Ok(Value::Bool(true))
    );
    assert!(relation_op(TokenKind::Lt, Value::Bool(true), Value::Bool(false)).is_err());
  }
}
