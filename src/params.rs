// ============================================================================
// OPERATION PARAMETERS — value + kind + bounds, as shown to the UI layer
// ============================================================================
//
// Operations publish their parameters with defaults; the host edits the
// values (never the bounds) and hands the set back at `apply` time.

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::error::EditError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
    Color([u8; 4]),
}

/// Kind plus kind-specific bounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ParamKind {
    Number {
        min: f64,
        max: f64,
        step: f64,
    },
    #[serde(rename_all = "camelCase")]
    String {
        min_length: usize,
        max_length: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    Color,
    OptionList {
        options: Vec<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: ParamValue,
    #[serde(flatten)]
    pub kind: ParamKind,
}

impl Parameter {
    pub fn number(name: &str, value: f64, min: f64, max: f64, step: f64) -> Self {
        Self {
            name: name.to_string(),
            value: ParamValue::Number(value),
            kind: ParamKind::Number { min, max, step },
        }
    }

    pub fn text(name: &str, value: &str, min_length: usize, max_length: usize) -> Self {
        Self {
            name: name.to_string(),
            value: ParamValue::Text(value.to_string()),
            kind: ParamKind::String {
                min_length,
                max_length,
                pattern: None,
            },
        }
    }

    /// Only `*` wildcards and literal characters are understood in patterns.
    pub fn with_pattern(mut self, pattern: &str) -> Self {
        if let ParamKind::String { pattern: p, .. } = &mut self.kind {
            *p = Some(pattern.to_string());
        }
        self
    }

    pub fn color(name: &str, value: Rgba<u8>) -> Self {
        Self {
            name: name.to_string(),
            value: ParamValue::Color(value.0),
            kind: ParamKind::Color,
        }
    }

    pub fn options(name: &str, value: &str, options: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            value: ParamValue::Text(value.to_string()),
            kind: ParamKind::OptionList {
                options: options.iter().map(|o| o.to_string()).collect(),
            },
        }
    }

    /// Check `value` against this parameter's kind and bounds.
    pub fn validate(&self, value: &ParamValue) -> Result<(), EditError> {
        let name = self.name.as_str();
        match (&self.kind, value) {
            (ParamKind::Number { min, max, .. }, ParamValue::Number(v)) => {
                if !v.is_finite() || *v < *min || *v > *max {
                    return Err(EditError::invalid_param(name, format!("{} is outside {}..={}", v, min, max)));
                }
            }
            (
                ParamKind::String {
                    min_length,
                    max_length,
                    pattern,
                },
                ParamValue::Text(s),
            ) => {
                let len = s.chars().count();
                if len < *min_length || len > *max_length {
                    return Err(EditError::invalid_param(
                        name,
                        format!("length {} is outside {}..={}", len, min_length, max_length),
                    ));
                }
                if let Some(p) = pattern
                    && !wildcard_match(p, s)
                {
                    return Err(EditError::invalid_param(name, format!("'{}' does not match '{}'", s, p)));
                }
            }
            (ParamKind::Color, ParamValue::Color(_)) => {}
            (ParamKind::OptionList { options }, ParamValue::Text(s)) => {
                if !options.iter().any(|o| o == s) {
                    return Err(EditError::invalid_param(
                        name,
                        format!("'{}' is not one of {}", s, options.join(", ")),
                    ));
                }
            }
            _ => return Err(EditError::invalid_param(name, "value does not match the parameter kind")),
        }
        Ok(())
    }

    /// Parse a command-line / text value according to the parameter kind.
    pub fn parse_value(&self, raw: &str) -> Result<ParamValue, EditError> {
        let value = match &self.kind {
            ParamKind::Number { .. } => raw
                .trim()
                .parse::<f64>()
                .map(ParamValue::Number)
                .map_err(|_| EditError::invalid_param(&self.name, format!("'{}' is not a number", raw)))?,
            ParamKind::Color => parse_color(raw)
                .map(|c| ParamValue::Color(c.0))
                .ok_or_else(|| EditError::invalid_param(&self.name, format!("'{}' is not a colour", raw)))?,
            ParamKind::String { .. } | ParamKind::OptionList { .. } => ParamValue::Text(raw.to_string()),
        };
        self.validate(&value)?;
        Ok(value)
    }
}

/// An ordered parameter set.  Names are unique.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters {
    params: Vec<Parameter>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert; a parameter with the same name is replaced.
    pub fn with(mut self, param: Parameter) -> Self {
        match self.params.iter_mut().find(|p| p.name == param.name) {
            Some(existing) => *existing = param,
            None => self.params.push(param),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Replace a value after checking it against the parameter's bounds.
    pub fn set_value(&mut self, name: &str, value: ParamValue) -> Result<(), EditError> {
        let param = self
            .params
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| EditError::MissingParameter(name.to_string()))?;
        param.validate(&value)?;
        param.value = value;
        Ok(())
    }

    pub fn set_from_str(&mut self, name: &str, raw: &str) -> Result<(), EditError> {
        let value = self
            .get(name)
            .ok_or_else(|| EditError::MissingParameter(name.to_string()))?
            .parse_value(raw)?;
        self.set_value(name, value)
    }

    /// Check every value against its own kind and bounds.  Values set via
    /// `with` or deserialisation have not been checked yet.
    pub fn validate_all(&self) -> Result<(), EditError> {
        self.params.iter().try_for_each(|p| p.validate(&p.value))
    }

    fn value(&self, name: &str) -> Result<&ParamValue, EditError> {
        self.get(name)
            .map(|p| &p.value)
            .ok_or_else(|| EditError::MissingParameter(name.to_string()))
    }

    pub fn number(&self, name: &str) -> Result<f64, EditError> {
        match self.value(name)? {
            ParamValue::Number(v) => Ok(*v),
            _ => Err(EditError::invalid_param(name, "expected a number")),
        }
    }

    /// Text of a string or option-list parameter.
    pub fn text(&self, name: &str) -> Result<&str, EditError> {
        match self.value(name)? {
            ParamValue::Text(s) => Ok(s),
            _ => Err(EditError::invalid_param(name, "expected text")),
        }
    }

    pub fn color(&self, name: &str) -> Result<Rgba<u8>, EditError> {
        match self.value(name)? {
            ParamValue::Color(c) => Ok(Rgba(*c)),
            _ => Err(EditError::invalid_param(name, "expected a colour")),
        }
    }

    /// Number parameter as a non-negative integer coordinate.
    pub fn coord(&self, name: &str) -> Result<u32, EditError> {
        let v = self.number(name)?;
        if v < 0.0 || v > u32::MAX as f64 {
            return Err(EditError::invalid_param(name, format!("{} is not a valid coordinate", v)));
        }
        Ok(v.round() as u32)
    }
}

/// Parse `#rrggbb`, `#rrggbbaa` or `r,g,b[,a]`.
pub fn parse_color(s: &str) -> Option<Rgba<u8>> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#') {
        if !hex.is_ascii() {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        return match hex.len() {
            6 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, 255])),
            8 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
            _ => None,
        };
    }
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let r = parts[0].trim().parse::<u8>().ok()?;
    let g = parts[1].trim().parse::<u8>().ok()?;
    let b = parts[2].trim().parse::<u8>().ok()?;
    let a = match parts.get(3) {
        Some(a) => a.trim().parse::<u8>().ok()?,
        None => 255,
    };
    Some(Rgba([r, g, b, a]))
}

pub fn color_to_hex(c: Rgba<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}{:02x}", c[0], c[1], c[2], c[3])
}

/// `*` matches any run of characters; everything else is literal.
fn wildcard_match(pattern: &str, s: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else { return true };
    let Some(mut rest) = s.strip_prefix(first) else { return false };
    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(part) {
            Some(i) => rest = &rest[i + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}
