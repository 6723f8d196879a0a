//! Flat arguments → request payloads
//!
//! Replays each parameter's hierarchy path to rebuild the nested query,
//! header and JSON body the service expects. `flatten` is the inverse.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::warn;

use crate::aggregate::EndpointDescriptor;
use crate::error::InputError;
use crate::hierarchy::{HierarchyStep, ObjectField, NONE_TOKEN};
use crate::index::Location;

/// Flat argument values keyed by flat name.
pub type Args = BTreeMap<String, Value>;

/// Default separator packing array-of-objects fields into one token.
pub const DEFAULT_SEPARATOR: char = '/';

/// Per-call request payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    /// Positional values, stopping at the first one not supplied.
    pub path: Vec<String>,
    pub query: Map<String, Value>,
    pub header: Map<String, Value>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Copy)]
pub struct PayloadBuilder {
    separator: char,
}

impl Default for PayloadBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SEPARATOR)
    }
}

impl PayloadBuilder {
    pub fn new(separator: char) -> Self {
        Self { separator }
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    /// Build the payload for one call.
    pub fn build(&self, endpoint: &EndpointDescriptor, args: &Args) -> Result<Payload, InputError> {
        for name in args.keys() {
            if endpoint.param(name).is_none() {
                return Err(InputError::UnknownArgument { name: name.clone() });
            }
        }
        for param in endpoint.params() {
            if param.required && supplied(args, &param.flat_name).is_none() {
                return Err(InputError::MissingArgument {
                    name: param.flat_name.clone(),
                });
            }
        }

        let mut payload = Payload::default();

        let mut positional = endpoint.positional.iter();
        for param in positional.by_ref() {
            match supplied(args, &param.flat_name) {
                Some(value) => payload.path.push(param.kind.render(value)),
                None => break,
            }
        }
        for skipped in positional.filter(|p| supplied(args, &p.flat_name).is_some()) {
            warn!(
                endpoint = %endpoint.name,
                argument = %skipped.flat_name,
                "positional argument ignored because an earlier one is missing"
            );
        }

        let mut query = Value::Object(Map::new());
        let mut header = Value::Object(Map::new());
        for param in endpoint.options.values() {
            let Some(value) = supplied(args, &param.flat_name) else {
                continue;
            };
            if let Some(schema) = endpoint.body_schemas.get(&param.flat_name) {
                validate(&param.flat_name, schema, value)?;
            }
            let steps = param.hierarchy.steps();
            let root = match param.location {
                Location::Query => &mut query,
                Location::Header => &mut header,
                Location::Body => payload.body.get_or_insert_with(|| {
                    if steps.first().is_some_and(HierarchyStep::is_array) {
                        Value::Array(Vec::new())
                    } else {
                        Value::Object(Map::new())
                    }
                }),
                Location::Path => continue,
            };
            write_at(root, steps, value.clone(), self.separator, &param.flat_name)?;
        }

        if let Value::Object(map) = query {
            payload.query = map;
        }
        if let Value::Object(map) = header {
            payload.header = map;
        }
        Ok(payload)
    }
}

/// A supplied, non-null argument.
fn supplied<'a>(args: &'a Args, name: &str) -> Option<&'a Value> {
    args.get(name).filter(|v| !v.is_null())
}

fn conflict(name: &str) -> InputError {
    InputError::Conflict {
        name: name.to_string(),
    }
}

/// Write `value` at the end of `steps`, creating intermediate containers.
fn write_at(
    root: &mut Value,
    steps: &[HierarchyStep],
    value: Value,
    separator: char,
    name: &str,
) -> Result<(), InputError> {
    let Some((last, parents)) = steps.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut cursor = root;
    for (i, step) in parents.iter().enumerate() {
        cursor = descend(cursor, step, steps[i + 1].is_array(), name)?;
    }

    match last {
        HierarchyStep::FieldKey(key) => match cursor {
            Value::Object(map) => {
                map.insert(key.clone(), value);
                Ok(())
            }
            _ => Err(conflict(name)),
        },
        HierarchyStep::ArrayOfScalars => {
            let Value::Array(list) = cursor else {
                return Err(conflict(name));
            };
            match value {
                Value::Array(items) => list.extend(items),
                single => list.push(single),
            }
            Ok(())
        }
        HierarchyStep::ArrayOfObjects { sorted_field_order } => {
            let Value::Array(list) = cursor else {
                return Err(conflict(name));
            };
            let items = match value {
                Value::Array(items) => items,
                single => vec![single],
            };
            for item in items {
                let object = match item {
                    Value::String(token) => split_token(&token, sorted_field_order, separator, name)?,
                    Value::Object(map) => Value::Object(map),
                    other => {
                        return Err(InputError::InvalidLiteral {
                            kind: "object token",
                            value: other.to_string(),
                        })
                    }
                };
                list.push(object);
            }
            Ok(())
        }
    }
}

fn descend<'v>(
    cursor: &'v mut Value,
    step: &HierarchyStep,
    next_is_list: bool,
    name: &str,
) -> Result<&'v mut Value, InputError> {
    let fresh = || {
        if next_is_list {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        }
    };
    match (step, cursor) {
        (HierarchyStep::FieldKey(key), Value::Object(map)) => {
            Ok(map.entry(key.clone()).or_insert_with(fresh))
        }
        (HierarchyStep::ArrayOfScalars | HierarchyStep::ArrayOfObjects { .. }, Value::Array(list)) => {
            list.push(fresh());
            let last = list.len() - 1;
            Ok(&mut list[last])
        }
        _ => Err(conflict(name)),
    }
}

/// Split one array-of-objects token into an object, field by field.
fn split_token(
    token: &str,
    fields: &[ObjectField],
    separator: char,
    name: &str,
) -> Result<Value, InputError> {
    let parts: Vec<&str> = token.split(separator).collect();
    if parts.len() != fields.len() {
        return Err(InputError::TokenCount {
            name: name.to_string(),
            token: token.to_string(),
            expected: fields.len(),
            found: parts.len(),
        });
    }
    let mut object = Map::new();
    for (field, part) in fields.iter().zip(parts) {
        if part == NONE_TOKEN {
            continue;
        }
        object.insert(field.name.clone(), field.kind.coerce(part)?);
    }
    Ok(Value::Object(object))
}

fn validate(name: &str, schema: &Value, value: &Value) -> Result<(), InputError> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(validator) => validator,
        Err(err) => {
            warn!(argument = %name, error = %err, "body schema does not compile; not validating");
            return Ok(());
        }
    };
    let errors: Vec<String> = validator.iter_errors(value).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(InputError::SchemaViolation {
            name: name.to_string(),
            errors,
        })
    }
}

/// Recover flat arguments from a built payload.
pub fn flatten(endpoint: &EndpointDescriptor, payload: &Payload, separator: char) -> Args {
    let mut args = Args::new();

    for (param, raw) in endpoint.positional.iter().zip(&payload.path) {
        let value = param
            .kind
            .coerce(raw)
            .unwrap_or_else(|_| Value::String(raw.clone()));
        args.insert(param.flat_name.clone(), value);
    }

    let query = Value::Object(payload.query.clone());
    let header = Value::Object(payload.header.clone());
    for param in endpoint.options.values() {
        let root = match param.location {
            Location::Query => Some(&query),
            Location::Header => Some(&header),
            Location::Body => payload.body.as_ref(),
            Location::Path => None,
        };
        let value = root.and_then(|root| read_at(root, param.hierarchy.steps(), separator));
        if let Some(value) = value {
            args.insert(param.flat_name.clone(), value);
        }
    }
    args
}

fn read_at(root: &Value, steps: &[HierarchyStep], separator: char) -> Option<Value> {
    let Some((last, parents)) = steps.split_last() else {
        return Some(root.clone());
    };

    let mut cursor = root;
    for step in parents {
        cursor = match step {
            HierarchyStep::FieldKey(key) => cursor.get(key)?,
            _ => cursor.as_array()?.first()?,
        };
    }

    match last {
        HierarchyStep::FieldKey(key) => cursor.get(key).cloned(),
        HierarchyStep::ArrayOfScalars => cursor.is_array().then(|| cursor.clone()),
        HierarchyStep::ArrayOfObjects { sorted_field_order } => {
            let tokens = cursor
                .as_array()?
                .iter()
                .map(|item| Value::String(join_token(item, sorted_field_order, separator)))
                .collect();
            Some(Value::Array(tokens))
        }
    }
}

fn join_token(item: &Value, fields: &[ObjectField], separator: char) -> String {
    fields
        .iter()
        .map(|field| {
            item.get(&field.name)
                .map(|v| field.kind.render(v))
                .unwrap_or_else(|| NONE_TOKEN.to_string())
        })
        .collect::<Vec<_>>()
        .join(&separator.to_string())
}
