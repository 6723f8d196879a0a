//! Client context, built once per process.
//!
//! Owns the Swagger document and the method table synthesized from it,
//! together with the credential source and HTTP session.

use std::collections::BTreeMap;

use reqwest::blocking::Client;
use serde_json::Value;
use tracing::debug;

use crate::aggregate::{aggregate, sorted_operations, EndpointDescriptor};
use crate::auth::Authenticator;
use crate::error::{DispatchError, SpecError};
use crate::payload::{PayloadBuilder, DEFAULT_SEPARATOR};
use crate::source::base_url_from_spec;
use crate::spec::extract_operations;
use crate::synth::{synthesize, CallableSpec};

/// Runtime settings for a client.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    /// Base URL every path template is appended to
    pub base_url: String,
    /// Separator packing array-of-objects fields into one token
    pub separator: char,
    /// Field of a paginated page holding its results
    pub results_key: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            separator: DEFAULT_SEPARATOR,
            results_key: "results".to_string(),
        }
    }

    /// Use the base URL declared by the document, falling back to localhost.
    pub fn from_spec(spec: &Value) -> Self {
        Self::new(base_url_from_spec(spec).unwrap_or_else(|| "http://localhost".to_string()))
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    pub fn results_key(mut self, key: impl Into<String>) -> Self {
        self.results_key = key.into();
        self
    }
}

/// An endpoint together with its synthesized callable.
#[derive(Debug, Clone)]
pub struct ApiMethod {
    pub descriptor: EndpointDescriptor,
    pub callable: CallableSpec,
}

/// Turn a spec into the static table of methods, keyed by endpoint name.
pub fn build_methods(spec: &Value) -> Result<BTreeMap<String, ApiMethod>, SpecError> {
    let ops = sorted_operations(extract_operations(spec));
    let endpoints = aggregate(spec, &ops)?;
    let mut methods = BTreeMap::new();
    for (name, descriptor) in endpoints {
        let callable = synthesize(&descriptor)?;
        debug!(
            endpoint = %name,
            args = callable.args.len(),
            paginated = callable.paginated,
            streamed = callable.streamed,
            "synthesized method"
        );
        methods.insert(name, ApiMethod { descriptor, callable });
    }
    Ok(methods)
}

/// Everything a call needs, constructed once and passed by reference.
pub struct ClientContext {
    config: ClientConfig,
    spec: Value,
    http: Client,
    auth: Box<dyn Authenticator>,
    methods: BTreeMap<String, ApiMethod>,
}

impl ClientContext {
    /// Build every method from `spec`. Any generation error aborts construction.
    pub fn new(
        config: ClientConfig,
        spec: Value,
        auth: impl Authenticator + 'static,
    ) -> Result<Self, SpecError> {
        let methods = build_methods(&spec)?;
        Ok(Self {
            config,
            spec,
            http: Client::new(),
            auth: Box::new(auth),
            methods,
        })
    }

    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn spec(&self) -> &Value {
        &self.spec
    }

    pub fn methods(&self) -> impl Iterator<Item = &ApiMethod> {
        self.methods.values()
    }

    /// Look up a method by endpoint name (`get-files`) or method name (`get_files`).
    pub fn method(&self, name: &str) -> Result<&ApiMethod, DispatchError> {
        self.methods
            .get(name)
            .or_else(|| self.methods.get(&name.replace('_', "-")))
            .ok_or_else(|| DispatchError::UnknownEndpoint {
                name: name.to_string(),
            })
    }

    pub fn payload_builder(&self) -> PayloadBuilder {
        PayloadBuilder::new(self.config.separator)
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn auth(&self) -> &dyn Authenticator {
        self.auth.as_ref()
    }
}
