//! Hierarchy paths: where a flat CLI value lands inside a nested payload.

use std::fmt;

use serde_json::{Number, Value};

use crate::error::InputError;

/// Literal token that means "leave this field out" inside an array-of-objects token.
pub const NONE_TOKEN: &str = "None";

/// Semantic type of a leaf value, used for both CLI coercion and signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScalarType {
    String,
    Integer,
    Number,
    Boolean,
    /// Raw JSON supplied by the caller.
    Object,
}

impl ScalarType {
    /// Map a schema `type` keyword to a leaf type. Arrays are not leaves.
    pub fn from_schema_type(ty: &str) -> Option<Self> {
        match ty {
            "string" | "file" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "object" => Some(Self::Object),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
        }
    }

    /// Parse one raw CLI token as this type.
    pub fn coerce(self, raw: &str) -> Result<Value, InputError> {
        let invalid = || InputError::InvalidLiteral {
            kind: self.as_str(),
            value: raw.to_string(),
        };
        match self {
            Self::String => Ok(Value::String(raw.to_string())),
            Self::Integer => raw
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| invalid()),
            Self::Number => raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(invalid),
            Self::Boolean => match raw {
                "True" | "true" => Ok(Value::Bool(true)),
                "False" | "false" => Ok(Value::Bool(false)),
                _ => Err(invalid()),
            },
            Self::Object => serde_json::from_str(raw).map_err(|_| invalid()),
        }
    }

    /// Inverse of [`coerce`](Self::coerce): render a value back into a CLI token.
    pub fn render(self, value: &Value) -> String {
        match (self, value) {
            (_, Value::String(s)) => s.clone(),
            (Self::Boolean, Value::Bool(true)) => "True".to_string(),
            (Self::Boolean, Value::Bool(false)) => "False".to_string(),
            (_, other) => other.to_string(),
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field of an array-of-objects element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectField {
    pub name: String,
    pub kind: ScalarType,
}

/// One level of a hierarchy path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HierarchyStep {
    /// Select (or create) a field of the current object.
    FieldKey(String),
    /// The current level is a homogeneous array; each value is appended.
    ArrayOfScalars,
    /// The current level is an array of objects. Each token splits on the
    /// separator and maps positionally onto `sorted_field_order`.
    ArrayOfObjects { sorted_field_order: Vec<ObjectField> },
}

impl HierarchyStep {
    pub fn is_array(&self) -> bool {
        !matches!(self, Self::FieldKey(_))
    }
}

/// Ordered route from a flat value to its resting place in a payload.
///
/// An empty path addresses the payload root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyPath {
    steps: Vec<HierarchyStep>,
}

impl HierarchyPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(name: impl Into<String>) -> Self {
        Self::new().with_key(name)
    }

    pub fn with_key(&self, name: impl Into<String>) -> Self {
        self.with_step(HierarchyStep::FieldKey(name.into()))
    }

    pub fn with_scalar_array(&self) -> Self {
        self.with_step(HierarchyStep::ArrayOfScalars)
    }

    /// Terminate with an array-of-objects marker; fields are sorted by name.
    pub fn with_object_array(&self, mut fields: Vec<ObjectField>) -> Self {
        fields.sort_by(|a, b| a.name.cmp(&b.name));
        self.with_step(HierarchyStep::ArrayOfObjects {
            sorted_field_order: fields,
        })
    }

    fn with_step(&self, step: HierarchyStep) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        Self { steps }
    }

    pub fn steps(&self) -> &[HierarchyStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Field keys along the path, in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(|step| match step {
            HierarchyStep::FieldKey(k) => Some(k.as_str()),
            _ => None,
        })
    }

    /// The terminal array-of-objects fields, if this path ends in one.
    pub fn object_fields(&self) -> Option<&[ObjectField]> {
        match self.steps.last() {
            Some(HierarchyStep::ArrayOfObjects { sorted_field_order }) => Some(sorted_field_order),
            _ => None,
        }
    }
}

impl fmt::Display for HierarchyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for step in &self.steps {
            if !first {
                f.write_str(".")?;
            }
            first = false;
            match step {
                HierarchyStep::FieldKey(k) => f.write_str(k)?,
                HierarchyStep::ArrayOfScalars => f.write_str("[]")?,
                HierarchyStep::ArrayOfObjects { sorted_field_order } => {
                    let names: Vec<&str> =
                        sorted_field_order.iter().map(|f| f.name.as_str()).collect();
                    write!(f, "[{}]", names.join(","))?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerce_integer_and_number() {
        assert_eq!(ScalarType::Integer.coerce("42").unwrap(), json!(42));
        assert_eq!(ScalarType::Number.coerce("1.5").unwrap(), json!(1.5));
        assert!(ScalarType::Integer.coerce("4.2").is_err());
        assert!(ScalarType::Number.coerce("NaN").is_err());
    }

    #[test]
    fn coerce_boolean_literals() {
        assert_eq!(ScalarType::Boolean.coerce("True").unwrap(), json!(true));
        assert_eq!(ScalarType::Boolean.coerce("False").unwrap(), json!(false));
        let err = ScalarType::Boolean.coerce("yes").unwrap_err();
        assert!(err.to_string().contains("invalid boolean literal"));
    }

    #[test]
    fn coerce_object_parses_json() {
        assert_eq!(
            ScalarType::Object.coerce(r#"{"a":[1]}"#).unwrap(),
            json!({"a": [1]})
        );
        assert!(ScalarType::Object.coerce("{nope").is_err());
    }

    #[test]
    fn render_inverts_coerce() {
        for (kind, raw) in [
            (ScalarType::String, "abc"),
            (ScalarType::Integer, "7"),
            (ScalarType::Boolean, "False"),
            (ScalarType::Object, r#"{"k":1}"#),
        ] {
            let value = kind.coerce(raw).unwrap();
            assert_eq!(kind.render(&value), raw);
        }
    }

    #[test]
    fn object_array_fields_are_sorted() {
        let path = HierarchyPath::key("files").with_object_array(vec![
            ObjectField {
                name: "uuid".into(),
                kind: ScalarType::String,
            },
            ObjectField {
                name: "name".into(),
                kind: ScalarType::String,
            },
        ]);
        let names: Vec<&str> = path
            .object_fields()
            .unwrap()
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, ["name", "uuid"]);
        assert_eq!(path.to_string(), "files.[name,uuid]");
    }

    #[test]
    fn keys_skip_array_markers() {
        let path = HierarchyPath::key("a").with_key("b").with_scalar_array();
        assert_eq!(path.keys().collect::<Vec<_>>(), ["a", "b"]);
        assert!(path.steps().last().unwrap().is_array());
    }
}
