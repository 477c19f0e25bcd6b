//! Config inheritance.
//!
//! Field values of an instance are collected from its `configs` first,
//! depth-first and pre-order, then from the instance itself. Values
//! concatenate; duplicates are kept. Relative paths are resolved against
//! the directory of the module that created each contributing instance.

use std::collections::HashSet;

use tracing::warn;

use crate::diag::LogLevel;
use crate::engine::ConfigCycleMode;
use crate::model::{DeclId, InstId, Value};

use super::{EvalError, Session};

enum Step {
  Enter(InstId),
  Own(InstId),
  Leave(InstId),
}

impl Session {
  /// Collect the list field `field` of `inst` through its configs.
  pub fn fetch_list(&self, inst: InstId, field: &str) -> Result<Vec<Value>, EvalError> {
    let mut out = Vec::new();
    let mut on_path = HashSet::new();
    let mut stack = vec![Step::Enter(inst)];

    while let Some(step) = stack.pop() {
      match step {
        Step::Enter(id) => {
          if !on_path.insert(id) {
            let name = self.inst_name(id);
            match self.params.config_cycles {
              ConfigCycleMode::Error => return Err(EvalError::ConfigCycle(name)),
              ConfigCycleMode::Report => {
                warn!(config = %name, field, "config cycle skipped");
                self.log(LogLevel::Warning, None, &format!("config cycle detected at '{}'", name));
                continue;
              }
            }
          }
          stack.push(Step::Leave(id));
          stack.push(Step::Own(id));
          let configs = self.model.inst(id).fields.get("configs").map(Value::as_list).unwrap_or(&[]);
          for config in configs.iter().rev() {
            if let Value::Object(child) = config {
              stack.push(Step::Enter(*child));
            }
          }
        }
        Step::Own(id) => {
          let instance = self.model.inst(id);
          if let Some(Value::List(items)) = instance.fields.get(field) {
            out.extend(items.iter().map(|v| self.absolute(instance.module, v)));
          }
        }
        Step::Leave(id) => {
          on_path.remove(&id);
        }
      }
    }
    Ok(out)
  }

  /// Text of a list field through configs, paths made absolute.
  pub fn fetch_strings(&self, inst: InstId, field: &str) -> Result<Vec<String>, EvalError> {
    Ok(
      self
        .fetch_list(inst, field)?
        .into_iter()
        .filter_map(|v| v.as_text().map(str::to_string))
        .collect(),
    )
  }

  /// A value with relative paths resolved against `module`.
  pub fn absolute(&self, module: DeclId, value: &Value) -> Value {
    match value {
      Value::Path(p) => Value::Path(self.model.resolve_path(module, p).to_string_lossy().into_owned()),
      other => other.clone(),
    }
  }

  /// Name of the declaration that created `inst`, or its class name.
  pub fn inst_name(&self, inst: InstId) -> String {
    let instance = self.model.inst(inst);
    match instance.decl {
      Some(decl) => self.model.decl_path(decl),
      None => self.model.decl(instance.class).name.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::diag::TracingLogger;
  use crate::engine::ConfigCycleMode;
  use crate::model::{InstId, Value};
  use crate::util::testutil::{params, project};

  use super::super::{EvalError, Session};

  const CONFIGS: &str = r#"
let a : Config { .defines += "A" }
let b : Config {
  .configs += a
  .defines += "B"
}
"#;

  /// Evaluate `CONFIGS` and close the loop `a -> b -> a` by hand; the
  /// language itself cannot express it.
  fn cyclic_session(mode: ConfigCycleMode) -> (Session, InstId) {
    let dir = project(&[("BUSY", CONFIGS)]);
    let mut parse_params = params(dir.path());
    parse_params.config_cycles = mode;
    let mut session = Session::new(parse_params, Box::new(TracingLogger)).unwrap();
    assert!(session.evaluate());

    let root = session.root().unwrap();
    let inst = |name: &str| {
      let decl = session.model.member(root, name).unwrap();
      session.model.var_inst(decl).unwrap()
    };
    let (a, b) = (inst("a"), inst("b"));
    session
      .model
      .inst_mut(a)
      .fields
      .insert("configs".to_string(), Value::List(vec![Value::Object(b)]));
    (session, b)
  }

  fn texts(values: Vec<Value>) -> Vec<String> {
    values.iter().filter_map(|v| v.as_text().map(str::to_string)).collect()
  }

  #[test]
  fn reported_cycles_skip_the_repeated_config() {
    let (session, b) = cyclic_session(ConfigCycleMode::Report);
    let defines = session.fetch_list(b, "defines").unwrap();
    assert_eq!(texts(defines), vec!["A", "B"]);
    assert!(!session.has_errors());
  }

  #[test]
  fn cycles_fail_in_error_mode() {
    let (session, b) = cyclic_session(ConfigCycleMode::Error);
    match session.fetch_list(b, "defines") {
      Err(EvalError::ConfigCycle(name)) => assert_eq!(name, "b"),
      other => panic!("expected a config cycle, got {:?}", other),
    }
  }
}
