//! Live variable state of a run and reference resolution against it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::file_ref::FileReference;
use crate::error::{Error, Result};
use crate::workflow::{InputValue, Reference, StepInput, Template};

/// Value bound to a name during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Binding {
    Text(String),
    File(FileReference),
}

impl Binding {
    pub fn text(&self) -> &str {
        match self {
            Binding::Text(t) => t,
            Binding::File(f) => f.interpolation_text(),
        }
    }

    pub fn as_file(&self) -> Option<&FileReference> {
        match self {
            Binding::File(f) => Some(f),
            Binding::Text(_) => None,
        }
    }
}

/// Name → value table consulted when rendering templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bindings {
    values: BTreeMap<String, Binding>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_text(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_string(), Binding::Text(value.into()));
    }

    pub fn set_file(&mut self, name: &str, file: FileReference) {
        self.values.insert(name.to_string(), Binding::File(file));
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.values.get(name)
    }

    pub fn file(&self, name: &str) -> Option<&FileReference> {
        self.get(name).and_then(Binding::as_file)
    }

    /// Copy with file content dropped wherever it can be reread from disk.
    pub fn evicted(&self) -> Self {
        let values = self
            .values
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    Binding::File(f) => Binding::File(f.evicted()),
                    other => other.clone(),
                };
                (k.clone(), v)
            })
            .collect();
        Self { values }
    }

    /// Value of one reference, or `None` when nothing is bound.
    ///
    /// `${step}` and `${step.output}` give the step's interpolation text.
    /// Other fields are looked up in the step's content when it is a JSON
    /// object.
    pub fn resolve(&self, reference: &Reference) -> Option<String> {
        let binding = self.get(&reference.head)?;
        match reference.field.as_deref() {
            None | Some("output") => Some(binding.text().to_string()),
            Some(field) => {
                let parsed: Value = serde_json::from_str(binding.text()).ok()?;
                let pointer = format!("/{}", field.replace('.', "/"));
                parsed.pointer(&pointer).map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
            }
        }
    }

    pub fn render(&self, template: &Template) -> String {
        template.render(|r| self.resolve(r))
    }

    /// Resolve a step input into the payload sent to the tool.
    ///
    /// Literal inputs become a string. Structured inputs become an object
    /// whose text fields are rendered independently; `previousStep` is
    /// replaced by the named step's summary.
    pub fn resolve_input(&self, input: Option<&StepInput>) -> Value {
        match input {
            None => Value::String(String::new()),
            Some(StepInput::Literal(t)) => Value::String(self.render(t)),
            Some(StepInput::Structured(map)) => {
                let mut out = Map::new();
                for (key, value) in map {
                    let resolved = match value {
                        InputValue::Text(t) => Value::String(self.render(t)),
                        InputValue::Number(n) => Value::Number(n.clone()),
                        InputValue::Bool(b) => Value::Bool(*b),
                        InputValue::StepRef(step) => Value::String(
                            self.file(step)
                                .map(|f| f.summary.clone())
                                .unwrap_or_default(),
                        ),
                    };
                    out.insert(key.clone(), resolved);
                }
                Value::Object(out)
            }
        }
    }

    /// Evaluate a `when` / `condition.if` expression.
    ///
    /// References are substituted as quoted string literals (unbound ones as
    /// `""`), the result is evaluated with rhai and reduced to a boolean.
    /// An empty expression is true.
    pub fn evaluate_condition(&self, expr: &Template) -> Result<bool> {
        if expr.as_str().trim().is_empty() {
            return Ok(true);
        }
        let script = expr.render(|r| Some(quote_literal(&self.resolve(r).unwrap_or_default())));

        let mut engine = rhai::Engine::new();
        engine.set_max_operations(100_000);
        let result = engine
            .eval::<rhai::Dynamic>(&script)
            .map_err(|e| Error::Execution(format!("Condition evaluation failed: {}", e)))?;
        Ok(truthy(result))
    }
}

fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn truthy(value: rhai::Dynamic) -> bool {
    if value.is_unit() {
        return false;
    }
    if let Ok(b) = value.as_bool() {
        return b;
    }
    if let Ok(i) = value.as_int() {
        return i != 0;
    }
    if let Ok(f) = value.as_float() {
        return f != 0.0;
    }
    if value.is_string() {
        let s = value.to_string();
        let s = s.trim();
        return !(s.is_empty() || s.eq_ignore_ascii_case("false") || s == "0");
    }
    true
}
