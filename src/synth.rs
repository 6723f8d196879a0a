//! Endpoint → callable signature
//!
//! Fixes the argument order of each endpoint's generated method, detects its
//! pagination and streaming affordances, and assembles its documentation.

use serde_json::Value;

use crate::aggregate::EndpointDescriptor;
use crate::error::{SchemaError, SpecError};
use crate::hierarchy::ScalarType;
use crate::index::IndexedParam;

/// Response code announcing that more pages follow.
pub const PARTIAL_CONTENT: &str = "206";
/// Response code announcing a redirect to downloadable content.
pub const FOUND: &str = "302";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgRole {
    Positional,
    Option,
}

/// One argument of a synthesized method.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgSpec {
    pub flat_name: String,
    pub role: ArgRole,
    pub kind: ScalarType,
    pub array: bool,
    pub required: bool,
    /// `None` for required arguments; otherwise the schema default or null.
    pub default: Option<Value>,
    pub choices: Vec<String>,
    pub help: String,
}

impl ArgSpec {
    fn from_param(param: &IndexedParam, role: ArgRole) -> Self {
        Self {
            flat_name: param.flat_name.clone(),
            role,
            kind: param.kind,
            array: param.array,
            required: param.required,
            default: (!param.required).then(|| param.default.clone().unwrap_or(Value::Null)),
            choices: param.choices.clone(),
            help: param_help(param),
        }
    }
}

/// A synthesized, documented method for one endpoint.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct CallableSpec {
    /// Endpoint name, also the CLI subcommand (`get-files`).
    pub endpoint: String,
    /// Method name (`get_files`).
    pub method_name: String,
    pub args: Vec<ArgSpec>,
    pub paginated: bool,
    pub streamed: bool,
    pub doc: String,
}

impl CallableSpec {
    pub fn positional(&self) -> impl Iterator<Item = &ArgSpec> {
        self.args.iter().filter(|a| a.role == ArgRole::Positional)
    }
}

/// Build the callable for one endpoint.
pub fn synthesize(endpoint: &EndpointDescriptor) -> Result<CallableSpec, SpecError> {
    check_positional_order(endpoint)?;

    let (req_pos, opt_pos): (Vec<_>, Vec<_>) =
        endpoint.positional.iter().partition(|p| p.required);
    let (req_opt, opt_opt): (Vec<_>, Vec<_>) =
        endpoint.options.values().partition(|p| p.required);

    let args: Vec<ArgSpec> = req_pos
        .into_iter()
        .map(|p| ArgSpec::from_param(p, ArgRole::Positional))
        .chain(req_opt.into_iter().map(|p| ArgSpec::from_param(p, ArgRole::Option)))
        .chain(opt_pos.into_iter().map(|p| ArgSpec::from_param(p, ArgRole::Positional)))
        .chain(opt_opt.into_iter().map(|p| ArgSpec::from_param(p, ArgRole::Option)))
        .collect();

    let paginated = endpoint.responses.contains(PARTIAL_CONTENT);
    let streamed = endpoint.responses.contains(FOUND);

    Ok(CallableSpec {
        endpoint: endpoint.name.clone(),
        method_name: endpoint.name.replace('-', "_"),
        doc: docstring(endpoint, &args, paginated, streamed),
        args,
        paginated,
        streamed,
    })
}

/// CLI positionals fill left to right, so a required positional may not
/// follow an optional one.
fn check_positional_order(endpoint: &EndpointDescriptor) -> Result<(), SpecError> {
    let mut seen_optional = false;
    for param in &endpoint.positional {
        if !param.required {
            seen_optional = true;
        } else if seen_optional {
            return Err(SchemaError::ArgumentOrder {
                endpoint: endpoint.name.clone(),
                name: param.flat_name.clone(),
            }
            .into());
        }
    }
    Ok(())
}

fn param_help(param: &IndexedParam) -> String {
    let mut help = param.description.trim().to_string();
    if let Some(fields) = param.hierarchy.object_fields() {
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        push_sentence(&mut help, &format!("Each value is {}", names.join("/")));
    }
    if !param.required && !param.required_for.is_empty() {
        push_sentence(
            &mut help,
            &format!("Required for {}", param.required_for.join(", ")),
        );
    }
    if let Some(default) = &param.default {
        push_sentence(&mut help, &format!("Default: {}", param.kind.render(default)));
    }
    help
}

fn push_sentence(buf: &mut String, sentence: &str) {
    if !buf.is_empty() {
        if !buf.ends_with('.') {
            buf.push('.');
        }
        buf.push(' ');
    }
    buf.push_str(sentence);
    buf.push('.');
}

fn docstring(
    endpoint: &EndpointDescriptor,
    args: &[ArgSpec],
    paginated: bool,
    streamed: bool,
) -> String {
    let mut doc = String::new();
    let summary = if endpoint.summary.is_empty() {
        &endpoint.description
    } else {
        &endpoint.summary
    };
    doc.push_str(summary.trim());

    if !args.is_empty() {
        doc.push_str("\n\nArguments:\n");
        for arg in args {
            let ty = if arg.array {
                format!("[{}]", arg.kind)
            } else {
                arg.kind.to_string()
            };
            doc.push_str(&format!("  {} ({ty})", arg.flat_name));
            if !arg.help.is_empty() {
                doc.push_str(&format!(": {}", arg.help));
            }
            doc.push('\n');
        }
    }

    if paginated {
        doc.push_str(
            "\nPaginated: iterate() yields results across pages; paginate() yields whole pages.\n",
        );
    }
    if streamed {
        doc.push_str("\nStreaming: stream() returns the unread response; close it when done.\n");
    }
    doc
}
