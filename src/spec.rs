//! Swagger document → operation descriptors
//!
//! Walks `paths` into a flat list of `ApiOperation`s. Parameters stay raw
//! here; `index` resolves and flattens them.

use std::collections::BTreeSet;

use serde_json::Value;

/// HTTP methods a path item may declare, in the order they are visited.
pub const METHODS: [&str; 7] = ["get", "put", "post", "delete", "options", "head", "patch"];

/// One operation of the document.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ApiOperation {
    /// Lower-case HTTP method (get, post, ...)
    pub method: String,
    /// URL path template (e.g. "/files/{uuid}")
    pub path: String,
    pub operation_id: Option<String>,
    pub summary: String,
    pub description: String,
    /// Raw parameter nodes, path-level merged with operation-level.
    pub parameters: Vec<Value>,
    /// Declared response codes ("200", "206", "302", ...)
    pub responses: BTreeSet<String>,
    pub requires_auth: bool,
}

impl ApiOperation {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_lowercase(),
            path: path.to_string(),
            operation_id: None,
            summary: String::new(),
            description: String::new(),
            parameters: Vec::new(),
            responses: BTreeSet::new(),
            requires_auth: false,
        }
    }

    /// Names of the `{var}` segments of the path template, in order.
    pub fn path_variables(&self) -> Vec<&str> {
        path_variables(&self.path)
    }
}

/// Names of the `{var}` segments of a path template, in order.
pub fn path_variables(path: &str) -> Vec<&str> {
    path.split('/')
        .filter_map(|seg| seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
        .collect()
}

/// Resolve a local `$ref` ("#/definitions/Foo") against the document.
pub fn resolve_ref<'a>(spec: &'a Value, reference: &str) -> Option<&'a Value> {
    let pointer = reference.strip_prefix('#')?;
    if pointer.is_empty() {
        return Some(spec);
    }
    spec.pointer(pointer)
}

/// Extract all operations from a Swagger document.
pub fn extract_operations(spec: &Value) -> Vec<ApiOperation> {
    let mut ops = Vec::new();

    let paths = match spec.get("paths").and_then(|p| p.as_object()) {
        Some(p) => p,
        None => return ops,
    };
    let global_security = spec.get("security");

    for (path, path_item) in paths {
        let path_level_params = path_item.get("parameters");

        for method in &METHODS {
            let operation = match path_item.get(*method) {
                Some(op) => op,
                None => continue,
            };
            ops.push(extract_single_operation(
                spec,
                path,
                method,
                operation,
                path_level_params,
                global_security,
            ));
        }
    }

    ops
}

fn extract_single_operation(
    spec: &Value,
    path: &str,
    method: &str,
    operation: &Value,
    path_level_params: Option<&Value>,
    global_security: Option<&Value>,
) -> ApiOperation {
    let text = |key: &str| {
        operation
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };

    let responses = operation
        .get("responses")
        .and_then(|r| r.as_object())
        .map(|r| r.keys().cloned().collect())
        .unwrap_or_default();

    let requires_auth = operation
        .get("security")
        .or(global_security)
        .and_then(|s| s.as_array())
        .is_some_and(|s| !s.is_empty());

    ApiOperation {
        method: method.to_string(),
        path: path.to_string(),
        operation_id: operation
            .get("operationId")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        summary: text("summary"),
        description: text("description"),
        parameters: collect_params(spec, path_level_params, operation.get("parameters")),
        responses,
        requires_auth,
    }
}

/// Merge path-level + operation-level parameters.
/// Operation-level overrides path-level on the same `(name, in)`.
fn collect_params(
    spec: &Value,
    path_level: Option<&Value>,
    operation_level: Option<&Value>,
) -> Vec<Value> {
    let mut merged: Vec<Value> = Vec::new();

    for source in [path_level, operation_level].iter().flatten() {
        let Some(params) = source.as_array() else {
            continue;
        };
        for param in params {
            let key = param_key(spec, param);
            let existing = key
                .as_ref()
                .and_then(|k| merged.iter().position(|p| param_key(spec, p).as_ref() == Some(k)));
            match existing {
                Some(idx) => merged[idx] = param.clone(),
                None => merged.push(param.clone()),
            }
        }
    }

    merged
}

/// `(name, in)` of a parameter node, looking through a `$ref` if needed.
fn param_key(spec: &Value, param: &Value) -> Option<(String, String)> {
    let field = |key: &str| {
        param
            .get(key)
            .or_else(|| {
                param
                    .get("$ref")
                    .and_then(|r| r.as_str())
                    .and_then(|r| resolve_ref(spec, r))
                    .and_then(|target| target.get(key))
            })
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    Some((field("name")?, field("in")?))
}
