//! Error types for the swagger-clap crate.
//!
//! Generation-time failures (`SpecError`) abort client construction.
//! Per-call failures (`DispatchError`) are handed back to the caller.

use std::fmt;

use thiserror::Error;

/// The document describes a parameter the engine cannot interpret.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchemaError {
    #[error("{method} {path}: parameter `{name}` has neither a resolvable $ref nor a type")]
    MissingType {
        method: String,
        path: String,
        name: String,
    },

    #[error("unresolvable $ref: {reference}")]
    UnresolvedRef { reference: String },

    #[error("{method} {path}: array parameter `{name}` has no items schema")]
    MissingItems {
        method: String,
        path: String,
        name: String,
    },

    #[error("{method} {path}: parameter without a name")]
    MissingName { method: String, path: String },

    #[error("{endpoint}: required argument `{name}` follows an optional positional argument")]
    ArgumentOrder { endpoint: String, name: String },

    #[error("{endpoint}: flat name `{name}` is used by two different parameters")]
    DuplicateFlatName { endpoint: String, name: String },
}

/// The document is well-formed but uses a shape the flat CLI encoding cannot carry.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UnsupportedSchemaError {
    #[error("{method} {path}: nested arrays are not supported (`{name}`)")]
    NestedArray {
        method: String,
        path: String,
        name: String,
    },

    #[error("{method} {path}: name `{name}` contains a hyphen")]
    HyphenatedName {
        method: String,
        path: String,
        name: String,
    },

    #[error("{method} {path}: parameter location `{location}` is not supported (`{name}`)")]
    Location {
        method: String,
        path: String,
        name: String,
        location: String,
    },
}

/// Errors raised while turning a spec into endpoints.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SpecError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Unsupported(#[from] UnsupportedSchemaError),
}

/// Errors caused by the values a caller supplied.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InputError {
    #[error("`{name}`: token `{token}` has {found} fields, expected {expected}")]
    TokenCount {
        name: String,
        token: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid {kind} literal: {value}")]
    InvalidLiteral { kind: &'static str, value: String },

    #[error("`{name}` does not match its schema: {}", .errors.join("; "))]
    SchemaViolation { name: String, errors: Vec<String> },

    #[error("missing required argument `{name}`")]
    MissingArgument { name: String },

    #[error("unknown argument `{name}`")]
    UnknownArgument { name: String },

    #[error("`{name}` conflicts with a value already written at the same location")]
    Conflict { name: String },

    #[error("{endpoint}: no path variant takes {supplied} positional argument(s)")]
    NoMatchingVariant { endpoint: String, supplied: usize },
}

/// Body of an HTTP response, drained according to its content type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

impl fmt::Display for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(value) => write!(f, "{value}"),
            Self::Bytes(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
        }
    }
}

/// Credential failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error("could not obtain credentials: {0}")]
    Credentials(String),

    #[error("unauthorized after credential refresh: HTTP {status} {reason}: {body}")]
    Unauthorized {
        status: reqwest::StatusCode,
        reason: String,
        body: ResponseBody,
    },
}

/// Errors that can occur during API dispatch.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DispatchError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("unknown endpoint: {name}")]
    UnknownEndpoint { name: String },

    #[error("{endpoint} does not support {affordance}")]
    MissingAffordance {
        endpoint: String,
        affordance: &'static str,
    },

    #[error("unsupported HTTP method: {method}")]
    UnsupportedMethod { method: String },

    #[error("HTTP request failed")]
    RequestFailed(#[source] reqwest::Error),

    #[error("failed to read response body")]
    ResponseRead(#[source] reqwest::Error),

    #[error("failed to read response stream")]
    StreamRead(#[source] std::io::Error),

    #[error("HTTP {status} {reason}: {body}")]
    HttpError {
        status: reqwest::StatusCode,
        reason: String,
        body: ResponseBody,
    },
}

/// Errors while loading the spec document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SourceError {
    #[error("failed to read spec file: {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch spec from {url}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("spec is not valid JSON")]
    Parse(#[source] serde_json::Error),
}
