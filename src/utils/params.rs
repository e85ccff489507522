//! Parameter schemas, runtime parameter values and their rendering into
//! command-line arguments.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::config::defs::{PipelineError, INPUT_PARAM};

/// A single scalar parameter value as sent by the job server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(true) => write!(f, "True"),
            ParamValue::Bool(false) => write!(f, "False"),
            ParamValue::Int(i) => write!(f, "{}", i),
            // Debug keeps the decimal point: 1.0 stays "1.0"
            ParamValue::Float(x) => write!(f, "{:?}", x),
            ParamValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<i32> for ParamValue {
    fn from(i: i32) -> Self {
        ParamValue::Int(i as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(x: f64) -> Self {
        ParamValue::Float(x)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

/// Named parameter values for one job invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, ParamValue>);

impl ParameterSet {
    pub fn new() -> Self {
        ParameterSet(BTreeMap::new())
    }

    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<ParamValue>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Removes the `input` artifact identifier so it never reaches a command line.
    pub fn take_input(&mut self) -> Result<String, PipelineError> {
        self.0
            .remove(INPUT_PARAM)
            .map(|v| v.to_string())
            .ok_or_else(|| PipelineError::MissingParameter(INPUT_PARAM.to_string()))
    }

    pub fn text(&self, name: &str) -> Result<String, PipelineError> {
        self.get(name)
            .map(|v| v.to_string())
            .ok_or_else(|| PipelineError::MissingParameter(name.to_string()))
    }
}

/// Declared type of a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    String,
    Integer,
    Float,
    Boolean,
    Choice(Vec<String>),
}

impl ParamKind {
    pub fn choice(options: &[&str]) -> Self {
        ParamKind::Choice(options.iter().map(|o| o.to_string()).collect())
    }

    /// Type tag in the form the job server expects.
    pub fn tag(&self) -> String {
        match self {
            ParamKind::String => "string".to_string(),
            ParamKind::Integer => "integer".to_string(),
            ParamKind::Float => "float".to_string(),
            ParamKind::Boolean => "boolean".to_string(),
            ParamKind::Choice(options) => {
                let quoted: Vec<String> = options.iter().map(|o| format!("\"{}\"", o)).collect();
                format!("choice:[{}]", quoted.join(", "))
            }
        }
    }

    fn coerce(&self, name: &str, value: &ParamValue) -> Result<ParamValue, PipelineError> {
        let invalid = |reason: String| PipelineError::InvalidParameter {
            name: name.to_string(),
            reason,
        };
        match (self, value) {
            (ParamKind::String, ParamValue::Text(_)) => Ok(value.clone()),
            (ParamKind::String, other) => Ok(ParamValue::Text(other.to_string())),

            (ParamKind::Integer, ParamValue::Int(_)) => Ok(value.clone()),
            (ParamKind::Integer, ParamValue::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map(ParamValue::Int)
                .map_err(|_| invalid(format!("'{}' is not an integer", s))),
            (ParamKind::Integer, other) => Err(invalid(format!("'{}' is not an integer", other))),

            (ParamKind::Float, ParamValue::Float(_)) => Ok(value.clone()),
            (ParamKind::Float, ParamValue::Int(i)) => Ok(ParamValue::Float(*i as f64)),
            (ParamKind::Float, ParamValue::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map(ParamValue::Float)
                .map_err(|_| invalid(format!("'{}' is not a number", s))),
            (ParamKind::Float, other) => Err(invalid(format!("'{}' is not a number", other))),

            (ParamKind::Boolean, ParamValue::Bool(_)) => Ok(value.clone()),
            (ParamKind::Boolean, ParamValue::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(ParamValue::Bool(true)),
                "false" => Ok(ParamValue::Bool(false)),
                _ => Err(invalid(format!("'{}' is not a boolean", s))),
            },
            (ParamKind::Boolean, other) => Err(invalid(format!("'{}' is not a boolean", other))),

            (ParamKind::Choice(options), other) => {
                let rendered = other.to_string();
                if options.iter().any(|o| *o == rendered) {
                    Ok(ParamValue::Text(rendered))
                } else {
                    Err(invalid(format!("'{}' is not one of {}", rendered, self.tag())))
                }
            }
        }
    }
}

impl Serialize for ParamKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub default: ParamValue,
}

impl ParamSpec {
    pub fn new(name: &str, kind: ParamKind, default: impl Into<ParamValue>) -> Self {
        ParamSpec {
            name: name.to_string(),
            kind,
            default: default.into(),
        }
    }
}

/// Static description of a plugin command: what it takes, what it produces
/// and the named parameter presets offered to users.
#[derive(Debug, Clone, Serialize)]
pub struct CommandSchema {
    pub name: String,
    pub description: String,
    pub input_types: Vec<String>,
    pub params: Vec<ParamSpec>,
    pub outputs: Vec<(String, String)>,
    pub default_sets: BTreeMap<String, ParameterSet>,
}

impl CommandSchema {
    pub fn defaults(&self) -> ParameterSet {
        let mut set = ParameterSet::new();
        for spec in &self.params {
            set.insert(&spec.name, spec.default.clone());
        }
        set
    }

    /// Checks runtime values against the schema, filling in defaults.
    ///
    /// The `input` key must already have been taken out.
    pub fn validate(&self, values: &ParameterSet) -> Result<ParameterSet, PipelineError> {
        if let Some((unknown, _)) = values
            .iter()
            .find(|(name, _)| !self.params.iter().any(|p| &p.name == *name))
        {
            return Err(PipelineError::InvalidParameter {
                name: unknown.clone(),
                reason: format!("not a parameter of {}", self.name),
            });
        }

        let mut validated = ParameterSet::new();
        for spec in &self.params {
            let value = values.get(&spec.name).unwrap_or(&spec.default);
            validated.insert(&spec.name, spec.kind.coerce(&spec.name, value)?);
        }
        Ok(validated)
    }
}

/// Flag map where each parameter name is its own flag token.
pub fn identity_flags(schema: &CommandSchema) -> Vec<(String, String)> {
    schema
        .params
        .iter()
        .map(|p| (p.name.clone(), p.name.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Quoting {
    Bare,
    Double,
}

enum Emission {
    Flag,
    Omit,
    Value(String),
}

fn emission(value: &ParamValue) -> Emission {
    match value {
        ParamValue::Bool(true) => Emission::Flag,
        ParamValue::Bool(false) => Emission::Omit,
        ParamValue::Text(s) if s == "True" => Emission::Flag,
        ParamValue::Text(s) if s.is_empty() || s == "False" || s == "default" => Emission::Omit,
        other => Emission::Value(other.to_string()),
    }
}

fn dashed(flag: &str) -> String {
    if flag.chars().count() == 1 {
        format!("-{}", flag)
    } else {
        format!("--{}", flag)
    }
}

fn emitted<F, P>(values: &ParameterSet, flags: &[(F, P)]) -> Result<Vec<(String, Option<String>)>, PipelineError>
where
    F: AsRef<str>,
    P: AsRef<str>,
{
    let mut sorted: Vec<(&str, &str)> = flags.iter().map(|(f, p)| (f.as_ref(), p.as_ref())).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = Vec::new();
    for (flag, param) in sorted {
        let value = values
            .get(param)
            .ok_or_else(|| PipelineError::MissingParameter(param.to_string()))?;
        match emission(value) {
            Emission::Flag => out.push((dashed(flag), None)),
            Emission::Omit => continue,
            Emission::Value(v) => out.push((dashed(flag), Some(v))),
        }
    }
    Ok(out)
}

/// Renders parameters as separate argument tokens, ordered by flag token.
///
/// # Arguments
///
/// * `values` - Validated parameter values.
/// * `flags` - (flag token, parameter name) pairs.
///
/// # Returns
/// Tokens ready for an argument vector: `["--flag", "value", "-b", ...]`.
pub fn param_args<F, P>(values: &ParameterSet, flags: &[(F, P)]) -> Result<Vec<String>, PipelineError>
where
    F: AsRef<str>,
    P: AsRef<str>,
{
    let mut args = Vec::new();
    for (flag, value) in emitted(values, flags)? {
        args.push(flag);
        if let Some(v) = value {
            args.push(v);
        }
    }
    Ok(args)
}

/// Renders parameters as one space separated string for shell commands.
pub fn format_params<F, P>(values: &ParameterSet, flags: &[(F, P)], quoting: Quoting) -> Result<String, PipelineError>
where
    F: AsRef<str>,
    P: AsRef<str>,
{
    let parts: Vec<String> = emitted(values, flags)?
        .into_iter()
        .map(|(flag, value)| match (value, quoting) {
            (None, _) => flag,
            (Some(v), Quoting::Bare) => format!("{} {}", flag, v),
            (Some(v), Quoting::Double) => format!("{} \"{}\"", flag, v),
        })
        .collect();
    Ok(parts.join(" "))
}
