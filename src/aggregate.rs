//! Operations → endpoints
//!
//! Operations whose path templates differ only by variable segments share a
//! derived endpoint name (`get /files` and `get /files/{uuid}` are both
//! `get-files`) and collapse into one `EndpointDescriptor`.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::warn;

use crate::builder::normalize_segment;
use crate::error::{SchemaError, SpecError};
use crate::index::{index, IndexedParam};
use crate::spec::{ApiOperation, METHODS};

/// One path template folded into an endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct PathVariant {
    pub template: String,
    /// Flat names of the path variables, in template order.
    pub positional: Vec<String>,
    pub requires_auth: bool,
}

/// All operations sharing one derived name.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct EndpointDescriptor {
    pub name: String,
    pub method: String,
    pub variants: Vec<PathVariant>,
    pub positional: Vec<IndexedParam>,
    pub options: BTreeMap<String, IndexedParam>,
    pub body_schemas: BTreeMap<String, Value>,
    pub requires_auth: bool,
    pub summary: String,
    pub description: String,
    pub responses: BTreeSet<String>,
}

impl EndpointDescriptor {
    fn seed(name: String, op: &ApiOperation, positional: Vec<IndexedParam>) -> Self {
        Self {
            name,
            method: op.method.clone(),
            variants: Vec::new(),
            positional,
            options: BTreeMap::new(),
            body_schemas: BTreeMap::new(),
            requires_auth: op.requires_auth,
            summary: op.summary.clone(),
            description: op.description.clone(),
            responses: op.responses.clone(),
        }
    }

    /// Look up any parameter, positional or not, by flat name.
    pub fn param(&self, flat_name: &str) -> Option<&IndexedParam> {
        self.options
            .get(flat_name)
            .or_else(|| self.positional.iter().find(|p| p.flat_name == flat_name))
    }

    /// Every parameter: positional first, then options by name.
    pub fn params(&self) -> impl Iterator<Item = &IndexedParam> {
        self.positional.iter().chain(self.options.values())
    }

    /// The variant taking exactly `supplied` positional arguments.
    pub fn variant_for(&self, supplied: usize) -> Option<&PathVariant> {
        self.variants.iter().find(|v| v.positional.len() == supplied)
    }
}

/// Derived endpoint name: method plus the non-variable path segments.
pub fn endpoint_name(method: &str, path: &str) -> String {
    let mut parts = vec![method.to_lowercase()];
    parts.extend(
        path.split('/')
            .filter(|seg| !seg.is_empty() && !seg.starts_with('{'))
            .map(normalize_segment)
            .filter(|seg| !seg.is_empty()),
    );
    parts.join("-")
}

/// Index every operation and merge those sharing an endpoint name.
pub fn aggregate(
    spec: &Value,
    ops: &[ApiOperation],
) -> Result<BTreeMap<String, EndpointDescriptor>, SpecError> {
    let mut endpoints: BTreeMap<String, EndpointDescriptor> = BTreeMap::new();

    for op in ops {
        let indexed = index(spec, op)?;
        let name = endpoint_name(&op.method, &op.path);
        let positional: Vec<IndexedParam> =
            indexed.positional(op).into_iter().cloned().collect();
        let options: Vec<IndexedParam> = indexed.options().cloned().collect();

        match endpoints.get_mut(&name) {
            Some(endpoint) => {
                merge_positional(endpoint, op, positional.iter());
                merge_options(endpoint, options)?;
                endpoint.requires_auth |= op.requires_auth;
                endpoint.responses.extend(op.responses.iter().cloned());
                if endpoint.summary.is_empty() {
                    endpoint.summary = op.summary.clone();
                }
                if endpoint.description.is_empty() {
                    endpoint.description = op.description.clone();
                }
            }
            None => {
                let mut endpoint = EndpointDescriptor::seed(name.clone(), op, positional.clone());
                endpoint
                    .options
                    .extend(options.into_iter().map(|p| (p.flat_name.clone(), p)));
                endpoints.insert(name.clone(), endpoint);
            }
        }

        if let Some(endpoint) = endpoints.get_mut(&name) {
            endpoint.body_schemas.extend(indexed.body_schemas);
            endpoint.variants.push(PathVariant {
                template: op.path.clone(),
                positional: positional.iter().map(|p| p.flat_name.clone()).collect(),
                requires_auth: op.requires_auth,
            });
        }
    }

    for endpoint in endpoints.values_mut() {
        endpoint.variants.sort_by_key(|v| v.positional.len());
        if let Some(clash) = endpoint
            .positional
            .iter()
            .find(|p| endpoint.options.contains_key(&p.flat_name))
        {
            return Err(SchemaError::DuplicateFlatName {
                endpoint: endpoint.name.clone(),
                name: clash.flat_name.clone(),
            }
            .into());
        }
        let params = endpoint
            .positional
            .iter_mut()
            .chain(endpoint.options.values_mut());
        for param in params {
            param.required_for.sort();
            param.required_for.dedup();
        }
    }

    Ok(endpoints)
}

/// Reconcile positional arguments position by position.
///
/// A position is required only if every variant has it and requires it.
fn merge_positional<'p>(
    endpoint: &mut EndpointDescriptor,
    op: &ApiOperation,
    incoming: impl ExactSizeIterator<Item = &'p IndexedParam>,
) {
    let incoming_len = incoming.len();
    for (i, param) in incoming.enumerate() {
        match endpoint.positional.get_mut(i) {
            Some(existing) => {
                if existing.flat_name != param.flat_name {
                    warn!(
                        endpoint = %endpoint.name,
                        position = i,
                        kept = %existing.flat_name,
                        ignored = %param.flat_name,
                        "positional argument named differently across path variants"
                    );
                }
                existing.required &= param.required;
                if param.required {
                    existing.required_for.push(op.path.clone());
                }
            }
            None => {
                let mut appended = param.clone();
                appended.required = false;
                endpoint.positional.push(appended);
            }
        }
    }
    for existing in endpoint.positional.iter_mut().skip(incoming_len) {
        existing.required = false;
    }
}

/// AND-merge requiredness of non-path parameters, accumulating `required_for`.
///
/// A flat name must land in the same place in every variant.
fn merge_options(
    endpoint: &mut EndpointDescriptor,
    incoming: Vec<IndexedParam>,
) -> Result<(), SchemaError> {
    let mut present = BTreeSet::new();
    for param in incoming {
        present.insert(param.flat_name.clone());
        match endpoint.options.get_mut(&param.flat_name) {
            Some(existing) => {
                if existing.location != param.location || existing.hierarchy != param.hierarchy {
                    return Err(SchemaError::DuplicateFlatName {
                        endpoint: endpoint.name.clone(),
                        name: param.flat_name,
                    });
                }
                existing.required &= param.required;
                existing.required_for.extend(param.required_for);
            }
            None => {
                let mut added = param;
                added.required = false;
                endpoint.options.insert(added.flat_name.clone(), added);
            }
        }
    }
    for (name, existing) in endpoint.options.iter_mut() {
        if !present.contains(name) {
            existing.required = false;
        }
    }
    Ok(())
}

/// Operations in visiting order: by path, then by method.
pub fn sorted_operations(mut ops: Vec<ApiOperation>) -> Vec<ApiOperation> {
    ops.sort_by_key(|op| {
        (
            op.path.clone(),
            METHODS.iter().position(|m| *m == op.method),
        )
    });
    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::extract_operations;
    use serde_json::json;

    fn files_spec(list_requires_replica: bool) -> Value {
        json!({
            "paths": {
                "/files": {
                    "get": {
                        "summary": "List files",
                        "parameters": [
                            {"name": "replica", "in": "query", "type": "string",
                             "required": list_requires_replica},
                            {"name": "per_page", "in": "query", "type": "integer"}
                        ],
                        "responses": {"200": {}, "206": {}}
                    }
                },
                "/files/{uuid}": {
                    "get": {
                        "summary": "Get a file",
                        "security": [{"dcpAuth": []}],
                        "parameters": [
                            {"name": "uuid", "in": "path", "type": "string", "required": true},
                            {"name": "replica", "in": "query", "type": "string", "required": true},
                            {"name": "version", "in": "query", "type": "string"}
                        ],
                        "responses": {"200": {}, "302": {}}
                    },
                    "head": {
                        "parameters": [
                            {"name": "uuid", "in": "path", "type": "string", "required": true}
                        ],
                        "responses": {"200": {}}
                    }
                }
            }
        })
    }

    fn endpoints(spec: &Value) -> BTreeMap<String, EndpointDescriptor> {
        aggregate(spec, &extract_operations(spec)).unwrap()
    }

    #[test]
    fn endpoint_name_drops_variable_segments() {
        assert_eq!(endpoint_name("GET", "/files/{uuid}"), "get-files");
        assert_eq!(endpoint_name("post", "/bundles/{uuid}/checkout"), "post-bundles-checkout");
        assert_eq!(endpoint_name("get", "/"), "get");
        assert_eq!(endpoint_name("put", "/Sub_Scriptions"), "put-sub-scriptions");
    }

    #[test]
    fn variants_collapse_into_one_endpoint() {
        let spec = files_spec(true);
        let endpoints = endpoints(&spec);

        let names: Vec<&str> = endpoints.keys().map(|k| k.as_str()).collect();
        assert_eq!(names, ["get-files", "head-files"]);

        let get = &endpoints["get-files"];
        let templates: Vec<&str> = get.variants.iter().map(|v| v.template.as_str()).collect();
        assert_eq!(templates, ["/files", "/files/{uuid}"]);
        assert_eq!(get.summary, "List files");
        assert!(get.requires_auth);
        assert!(get.responses.contains("206"));
        assert!(get.responses.contains("302"));
    }

    #[test]
    fn required_in_every_variant_stays_required() {
        let spec = files_spec(true);
        let endpoints = endpoints(&spec);

        let replica = &endpoints["get-files"].options["replica"];
        assert!(replica.required);
        assert_eq!(replica.required_for, ["/files", "/files/{uuid}"]);
    }

    #[test]
    fn required_in_one_variant_is_optional_but_recorded() {
        let spec = files_spec(false);
        let endpoints = endpoints(&spec);

        let replica = &endpoints["get-files"].options["replica"];
        assert!(!replica.required);
        assert_eq!(replica.required_for, ["/files/{uuid}"]);
    }

    #[test]
    fn option_missing_from_a_variant_is_optional() {
        let spec = files_spec(true);
        let endpoints = endpoints(&spec);
        let get = &endpoints["get-files"];

        assert!(!get.options["version"].required);
        assert!(!get.options["per_page"].required);
    }

    #[test]
    fn positional_absent_in_a_variant_is_optional() {
        let spec = files_spec(true);
        let endpoints = endpoints(&spec);

        let get = &endpoints["get-files"];
        assert_eq!(get.positional.len(), 1);
        assert_eq!(get.positional[0].flat_name, "uuid");
        assert!(!get.positional[0].required);

        let head = &endpoints["head-files"];
        assert!(head.positional[0].required);
        assert_eq!(head.positional[0].required_for, ["/files/{uuid}"]);
    }

    #[test]
    fn merge_is_independent_of_visiting_order() {
        let spec = files_spec(false);
        let mut ops = extract_operations(&spec);
        let forward = aggregate(&spec, &ops).unwrap();
        ops.reverse();
        let backward = aggregate(&spec, &ops).unwrap();

        let f = &forward["get-files"];
        let b = &backward["get-files"];
        assert_eq!(f.options["replica"].required, b.options["replica"].required);
        assert_eq!(f.positional[0].required, b.positional[0].required);
        assert_eq!(f.variants, b.variants);
        assert_eq!(f.options["replica"].required_for, b.options["replica"].required_for);

        let spec = files_spec(true);
        let mut ops = extract_operations(&spec);
        ops.reverse();
        let backward = aggregate(&spec, &ops).unwrap();
        assert_eq!(
            backward["get-files"].options["replica"].required_for,
            ["/files", "/files/{uuid}"]
        );
    }

    #[test]
    fn positional_and_option_sharing_a_name_is_rejected() {
        let spec = json!({
            "paths": {
                "/bundles": {
                    "get": {
                        "parameters": [{"name": "uuid", "in": "query", "type": "string"}]
                    }
                },
                "/bundles/{uuid}": {
                    "get": {
                        "parameters": [
                            {"name": "uuid", "in": "path", "type": "string", "required": true}
                        ]
                    }
                }
            }
        });
        let err = aggregate(&spec, &extract_operations(&spec)).unwrap_err();
        assert!(matches!(
            err,
            SpecError::Schema(SchemaError::DuplicateFlatName { ref endpoint, ref name })
                if endpoint == "get-bundles" && name == "uuid"
        ));
    }

    #[test]
    fn option_in_different_locations_is_rejected() {
        let spec = json!({
            "paths": {
                "/files": {
                    "get": {
                        "parameters": [{"name": "replica", "in": "query", "type": "string"}]
                    }
                },
                "/files/{uuid}": {
                    "get": {
                        "parameters": [
                            {"name": "uuid", "in": "path", "type": "string", "required": true},
                            {"name": "replica", "in": "header", "type": "string"}
                        ]
                    }
                }
            }
        });
        let err = aggregate(&spec, &extract_operations(&spec)).unwrap_err();
        assert!(matches!(
            err,
            SpecError::Schema(SchemaError::DuplicateFlatName { ref name, .. }) if name == "replica"
        ));
    }

    #[test]
    fn variant_for_selects_by_positional_count() {
        let spec = files_spec(true);
        let endpoints = endpoints(&spec);
        let get = &endpoints["get-files"];

        assert_eq!(get.variant_for(0).unwrap().template, "/files");
        assert_eq!(get.variant_for(1).unwrap().template, "/files/{uuid}");
        assert!(get.variant_for(2).is_none());
    }

    #[test]
    fn sorted_operations_orders_by_path_then_method() {
        let spec = files_spec(true);
        let mut ops = extract_operations(&spec);
        ops.reverse();
        let ops = sorted_operations(ops);
        let order: Vec<(&str, &str)> = ops
            .iter()
            .map(|o| (o.path.as_str(), o.method.as_str()))
            .collect();
        assert_eq!(
            order,
            [
                ("/files", "get"),
                ("/files/{uuid}", "get"),
                ("/files/{uuid}", "head")
            ]
        );
    }
}
