//! Operation parameters → flat, typed parameter index
//!
//! Resolves `$ref`s and flattens nested objects and arrays so that every
//! leaf of an operation's parameter tree becomes one `IndexedParam`, addressed
//! by a unique flat name and carrying the hierarchy path that puts its value
//! back where the service expects it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde_json::{json, Value};
use tracing::debug;

use crate::error::{SchemaError, SpecError, UnsupportedSchemaError};
use crate::hierarchy::{HierarchyPath, ObjectField, ScalarType};
use crate::spec::{resolve_ref, ApiOperation};

/// Where a parameter travels in the HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Location {
    Path,
    Query,
    Body,
    Header,
}

impl Location {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "body" => Some(Self::Body),
            "header" => Some(Self::Header),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Body => "body",
            Self::Header => "header",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One leaf of an operation's parameter tree.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct IndexedParam {
    pub flat_name: String,
    pub hierarchy: HierarchyPath,
    pub location: Location,
    /// Type of a single value (of each element when `array` is set).
    pub kind: ScalarType,
    pub array: bool,
    pub required: bool,
    /// Path templates that mandate this parameter.
    pub required_for: Vec<String>,
    pub description: String,
    pub pattern: Option<String>,
    pub format: Option<String>,
    /// Allowed values from the schema `enum`, rendered as CLI tokens.
    pub choices: Vec<String>,
    pub default: Option<Value>,
}

/// Flat parameter index of a single operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationIndex {
    pub params: BTreeMap<String, IndexedParam>,
    /// JSON schemas that body values must satisfy, keyed by flat name.
    pub body_schemas: BTreeMap<String, Value>,
}

impl OperationIndex {
    /// Path parameters in path-template order.
    pub fn positional(&self, op: &ApiOperation) -> Vec<&IndexedParam> {
        let mut positional: Vec<&IndexedParam> = self
            .params
            .values()
            .filter(|p| p.location == Location::Path)
            .collect();
        let vars = op.path_variables();
        positional.sort_by_key(|p| {
            vars.iter()
                .position(|v| *v == p.flat_name)
                .unwrap_or(usize::MAX)
        });
        positional
    }

    /// Everything that is not a path parameter.
    pub fn options(&self) -> impl Iterator<Item = &IndexedParam> {
        self.params
            .values()
            .filter(|p| p.location != Location::Path)
    }
}

/// Index one operation's parameters.
pub fn index(spec: &Value, op: &ApiOperation) -> Result<OperationIndex, SpecError> {
    let mut walker = Walker {
        spec,
        op,
        leaves: Vec::new(),
        refs: Vec::new(),
    };
    for raw in &op.parameters {
        walker.parameter(raw)?;
    }
    let index = assign_flat_names(op, walker.leaves)?;
    debug!(
        method = %op.method,
        path = %op.path,
        params = index.params.len(),
        "indexed operation"
    );
    Ok(index)
}

/// Schema facts carried from a leaf node to its `IndexedParam`.
#[derive(Debug, Clone)]
struct Meta {
    kind: ScalarType,
    description: String,
    pattern: Option<String>,
    format: Option<String>,
    choices: Vec<String>,
    default: Option<Value>,
    schema: Option<Value>,
}

impl Meta {
    fn from_node(node: &Value, kind: ScalarType) -> Self {
        let text = |key: &str| node.get(key).and_then(|v| v.as_str()).map(str::to_string);
        let choices = node
            .get("enum")
            .and_then(|e| e.as_array())
            .map(|values| values.iter().map(|v| kind.render(v)).collect())
            .unwrap_or_default();
        Self {
            kind,
            description: text("description").unwrap_or_default(),
            pattern: text("pattern"),
            format: text("format"),
            choices,
            default: node.get("default").cloned(),
            schema: None,
        }
    }

    fn opaque(schema: Value) -> Self {
        let mut meta = Self::from_node(&schema, ScalarType::Object);
        meta.schema = Some(schema);
        meta
    }
}

/// Recursion state for one descent step.
#[derive(Debug, Clone)]
struct Frame {
    /// Name of the parameter or property being walked.
    name: String,
    location: Location,
    required: bool,
    in_array: bool,
    hierarchy: HierarchyPath,
    description: Option<String>,
}

enum Walked {
    /// A parameter was registered.
    Registered,
    /// Inside an array: the element is a single value.
    Element(Meta),
    /// Inside an array: the element is an object with these fields.
    Fields(Vec<ObjectField>),
}

#[derive(Debug)]
struct Leaf {
    name: String,
    hierarchy: HierarchyPath,
    location: Location,
    array: bool,
    required: bool,
    meta: Meta,
}

impl Leaf {
    fn candidate(&self) -> String {
        self.hierarchy
            .keys()
            .last()
            .map(str::to_string)
            .unwrap_or_else(|| self.name.clone())
    }

    fn qualified(&self) -> String {
        let keys: Vec<&str> = self.hierarchy.keys().collect();
        if keys.is_empty() {
            self.name.clone()
        } else {
            keys.join("_")
        }
    }
}

struct Walker<'a> {
    spec: &'a Value,
    op: &'a ApiOperation,
    leaves: Vec<Leaf>,
    /// `$ref`s currently being expanded, for cycle detection.
    refs: Vec<String>,
}

impl Walker<'_> {
    fn parameter(&mut self, raw: &Value) -> Result<(), SpecError> {
        let param = self.merge_ref(raw)?;
        let name = param
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SchemaError::MissingName {
                method: self.op.method.clone(),
                path: self.op.path.clone(),
            })?
            .to_string();
        self.check_name(&name)?;

        let location_str = param.get("in").and_then(|v| v.as_str()).unwrap_or("");
        let location =
            Location::parse(location_str).ok_or_else(|| UnsupportedSchemaError::Location {
                method: self.op.method.clone(),
                path: self.op.path.clone(),
                name: name.clone(),
                location: location_str.to_string(),
            })?;

        let frame = Frame {
            required: param
                .get("required")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            description: param
                .get("description")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            location,
            in_array: false,
            hierarchy: if location == Location::Body {
                HierarchyPath::new()
            } else {
                HierarchyPath::key(name.clone())
            },
            name,
        };

        if location == Location::Body {
            let schema = param
                .get("schema")
                .ok_or_else(|| self.missing_type(&frame.name))?;
            self.walk(schema, frame)?;
        } else {
            self.walk(&param, frame)?;
        }
        Ok(())
    }

    /// Resolve a parameter-level `$ref`, keeping `name`, `in`, `required`
    /// and `description` from the referencing node when it sets them.
    fn merge_ref(&self, raw: &Value) -> Result<Value, SpecError> {
        let Some(reference) = raw.get("$ref").and_then(|r| r.as_str()) else {
            return Ok(raw.clone());
        };
        let mut resolved = resolve_ref(self.spec, reference)
            .cloned()
            .ok_or_else(|| SchemaError::UnresolvedRef {
                reference: reference.to_string(),
            })?;
        if let Some(obj) = resolved.as_object_mut() {
            for key in ["name", "in", "required", "description"] {
                if let Some(v) = raw.get(key) {
                    obj.insert(key.to_string(), v.clone());
                }
            }
        }
        Ok(resolved)
    }

    fn walk(&mut self, node: &Value, frame: Frame) -> Result<Walked, SpecError> {
        if let Some(reference) = node.get("$ref").and_then(|r| r.as_str()) {
            if self.refs.iter().any(|r| r == reference) {
                debug!(%reference, "cyclic $ref treated as raw JSON");
                return self.opaque(frame, json!({"type": "object"}));
            }
            let target =
                resolve_ref(self.spec, reference).ok_or_else(|| SchemaError::UnresolvedRef {
                    reference: reference.to_string(),
                })?;
            self.refs.push(reference.to_string());
            let walked = self.walk(target, frame);
            self.refs.pop();
            return walked;
        }

        let ty = node
            .get("type")
            .and_then(|t| t.as_str())
            .or_else(|| node.get("properties").map(|_| "object"));
        match ty {
            Some("array") => self.array(node, frame),
            Some("object") => self.object(node, frame),
            Some(other) => match ScalarType::from_schema_type(other) {
                Some(kind) => self.scalar(node, frame, kind),
                None => Err(self.missing_type(&frame.name)),
            },
            None => Err(self.missing_type(&frame.name)),
        }
    }

    fn array(&mut self, node: &Value, frame: Frame) -> Result<Walked, SpecError> {
        if frame.in_array {
            return Err(UnsupportedSchemaError::NestedArray {
                method: self.op.method.clone(),
                path: self.op.path.clone(),
                name: frame.name,
            }
            .into());
        }
        let items = node
            .get("items")
            .ok_or_else(|| SchemaError::MissingItems {
                method: self.op.method.clone(),
                path: self.op.path.clone(),
                name: frame.name.clone(),
            })?;

        let inner = Frame {
            in_array: true,
            ..frame.clone()
        };
        let mut outer = Meta::from_node(node, ScalarType::String);
        let hierarchy = match self.walk(items, inner)? {
            Walked::Element(meta) => {
                outer.kind = meta.kind;
                outer.choices = meta.choices;
                outer.pattern = meta.pattern;
                outer.format = meta.format;
                outer.schema = meta
                    .schema
                    .map(|items| json!({"type": "array", "items": items}));
                frame.hierarchy.with_scalar_array()
            }
            Walked::Fields(fields) => frame.hierarchy.with_object_array(fields),
            Walked::Registered => return Ok(Walked::Registered),
        };
        self.register(frame, hierarchy, true, outer);
        Ok(Walked::Registered)
    }

    fn object(&mut self, node: &Value, frame: Frame) -> Result<Walked, SpecError> {
        let properties = node
            .get("properties")
            .and_then(|p| p.as_object())
            .filter(|p| !p.is_empty());
        let Some(properties) = properties else {
            return self.opaque(frame, node.clone());
        };

        let required: Vec<&str> = node
            .get("required")
            .and_then(|r| r.as_array())
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        if frame.in_array {
            let mut fields = Vec::with_capacity(properties.len());
            for (prop, child) in properties {
                self.check_name(prop)?;
                let child_frame = Frame {
                    name: prop.clone(),
                    hierarchy: frame.hierarchy.with_key(prop.clone()),
                    ..frame.clone()
                };
                let kind = match self.walk(child, child_frame)? {
                    Walked::Element(meta) => meta.kind,
                    Walked::Fields(_) | Walked::Registered => ScalarType::Object,
                };
                fields.push(ObjectField {
                    name: prop.clone(),
                    kind,
                });
            }
            return Ok(Walked::Fields(fields));
        }

        for (prop, child) in properties {
            self.check_name(prop)?;
            let child_frame = Frame {
                name: prop.clone(),
                location: frame.location,
                required: frame.required && required.contains(&prop.as_str()),
                in_array: false,
                hierarchy: frame.hierarchy.with_key(prop.clone()),
                description: child
                    .get("description")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            };
            self.walk(child, child_frame)?;
        }
        Ok(Walked::Registered)
    }

    fn scalar(&mut self, node: &Value, frame: Frame, kind: ScalarType) -> Result<Walked, SpecError> {
        let meta = Meta::from_node(node, kind);
        if frame.in_array {
            return Ok(Walked::Element(meta));
        }
        let hierarchy = frame.hierarchy.clone();
        self.register(frame, hierarchy, false, meta);
        Ok(Walked::Registered)
    }

    /// An object with no declared properties: the caller supplies raw JSON.
    fn opaque(&mut self, frame: Frame, schema: Value) -> Result<Walked, SpecError> {
        let meta = Meta::opaque(schema);
        if frame.in_array {
            return Ok(Walked::Element(meta));
        }
        let hierarchy = frame.hierarchy.clone();
        self.register(frame, hierarchy, false, meta);
        Ok(Walked::Registered)
    }

    fn register(&mut self, frame: Frame, hierarchy: HierarchyPath, array: bool, mut meta: Meta) {
        if let Some(description) = frame.description {
            meta.description = description;
        }
        self.leaves.push(Leaf {
            name: frame.name,
            hierarchy,
            location: frame.location,
            array,
            required: frame.required,
            meta,
        });
    }

    fn check_name(&self, name: &str) -> Result<(), SpecError> {
        if name.contains('-') {
            return Err(UnsupportedSchemaError::HyphenatedName {
                method: self.op.method.clone(),
                path: self.op.path.clone(),
                name: name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn missing_type(&self, name: &str) -> SpecError {
        SchemaError::MissingType {
            method: self.op.method.clone(),
            path: self.op.path.clone(),
            name: name.to_string(),
        }
        .into()
    }
}

/// Give every leaf a unique flat name.
///
/// Leaves keep their own name unless it collides. Colliding leaves take their
/// key path joined with `_`; if that still collides, non-path leaves are
/// suffixed with their location.
fn assign_flat_names(op: &ApiOperation, leaves: Vec<Leaf>) -> Result<OperationIndex, SpecError> {
    let mut names: Vec<String> = leaves.iter().map(Leaf::candidate).collect();

    let counts = count_names(&names);
    for (name, leaf) in names.iter_mut().zip(&leaves) {
        if counts[name.as_str()] > 1 {
            *name = leaf.qualified();
        }
    }

    let counts = count_names(&names);
    for (name, leaf) in names.iter_mut().zip(&leaves) {
        if counts[name.as_str()] > 1 && leaf.location != Location::Path {
            *name = format!("{name}_{}", leaf.location);
        }
    }

    let mut index = OperationIndex::default();
    for (flat_name, leaf) in names.into_iter().zip(leaves) {
        if index.params.contains_key(&flat_name) {
            return Err(SchemaError::DuplicateFlatName {
                endpoint: format!("{} {}", op.method, op.path),
                name: flat_name,
            }
            .into());
        }
        if leaf.location == Location::Body {
            if let Some(schema) = leaf.meta.schema.clone() {
                index.body_schemas.insert(flat_name.clone(), schema);
            }
        }
        let required_for = if leaf.required {
            vec![op.path.clone()]
        } else {
            Vec::new()
        };
        index.params.insert(
            flat_name.clone(),
            IndexedParam {
                flat_name,
                hierarchy: leaf.hierarchy,
                location: leaf.location,
                kind: leaf.meta.kind,
                array: leaf.array,
                required: leaf.required,
                required_for,
                description: leaf.meta.description,
                pattern: leaf.meta.pattern,
                format: leaf.meta.format,
                choices: leaf.meta.choices,
                default: leaf.meta.default,
            },
        );
    }
    Ok(index)
}

fn count_names(names: &[String]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for name in names {
        *counts.entry(name.clone()).or_insert(0) += 1;
    }
    counts
}
