//! Explicit parameter schemas for registered tools

use serde_json::{Map, Value};

/// JSON type of a tool parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamKind {
    const fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            // Models occasionally send `5.0` for an integer
            Self::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

/// A single named parameter
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
}

/// Description and parameters of one tool
#[derive(Debug, Clone)]
pub struct ToolSchema {
    description: String,
    params: Vec<Param>,
}

impl ToolSchema {
    /// Schema for a tool that takes no arguments
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            params: Vec::new(),
        }
    }

    /// Add a required parameter
    #[must_use]
    pub fn param(self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.with_param(name, kind, description, true)
    }

    /// Add an optional parameter
    #[must_use]
    pub fn optional(self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.with_param(name, kind, description, false)
    }

    fn with_param(mut self, name: &str, kind: ParamKind, description: &str, required: bool) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required,
        });
        self
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Render as a JSON Schema object for the reasoning engine
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for p in &self.params {
            properties.insert(
                p.name.clone(),
                serde_json::json!({
                    "type": p.kind.json_type(),
                    "description": p.description,
                }),
            );
        }

        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Check an arguments object against this schema
    ///
    /// `null` is treated as an empty object.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violation found
    pub fn validate(&self, args: &Value) -> Result<(), String> {
        let empty = Map::new();
        let object = match args {
            Value::Null => &empty,
            Value::Object(map) => map,
            other => return Err(format!("expected an object, got {}", type_name(other))),
        };

        for p in &self.params {
            match object.get(&p.name) {
                None | Some(Value::Null) if p.required => {
                    return Err(format!("missing required argument `{}`", p.name));
                }
                Some(v) if !v.is_null() && !p.kind.accepts(v) => {
                    return Err(format!(
                        "argument `{}` must be {}, got {}",
                        p.name,
                        p.kind.json_type(),
                        type_name(v)
                    ));
                }
                _ => {}
            }
        }

        if let Some(extra) = object
            .keys()
            .find(|k| !self.params.iter().any(|p| &p.name == *k))
        {
            return Err(format!("unexpected argument `{extra}`"));
        }

        Ok(())
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
