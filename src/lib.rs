//! Generate a typed client and a clap CLI from a Swagger 2.0 document.
//!
//! The document is indexed once into flat, typed parameters, operations that
//! differ only by trailing path variables are merged into one endpoint, and
//! each endpoint becomes both a callable method and a subcommand. Flat
//! arguments are rebuilt into nested query/header/body payloads per call.
//!
//! # Usage
//!
//! ```no_run
//! use swagger_clap::{build_commands, dispatch, Anonymous, ClientConfig, ClientContext, CliConfig};
//!
//! let spec: serde_json::Value =
//!     serde_json::from_str(r#"{"swagger":"2.0","paths":{}}"#).unwrap();
//! let ctx = ClientContext::new(ClientConfig::from_spec(&spec), spec, Anonymous).unwrap();
//!
//! let config = CliConfig::new("myapi", "My API CLI", ctx.config().base_url.clone());
//! let matches = build_commands(&config, ctx.methods()).get_matches();
//! if let Some((name, sub)) = matches.subcommand() {
//!     let resp = dispatch(&ctx, name, sub).unwrap();
//!     println!("{}", resp.body);
//! }
//! ```

pub mod aggregate;
pub mod auth;
pub mod builder;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod hierarchy;
pub mod index;
pub mod logging;
pub mod payload;
pub mod pool;
pub mod source;
pub mod spec;
pub mod synth;

pub use aggregate::{aggregate, EndpointDescriptor, PathVariant};
pub use auth::{Anonymous, Authenticator, StaticToken};
pub use builder::{build_commands, collect_args, CliConfig};
pub use client::{ApiMethod, ClientConfig, ClientContext};
pub use dispatch::{dispatch, ApiResponse, Items, Pages, StreamHandle};
pub use error::{
    AuthError, DispatchError, InputError, ResponseBody, SchemaError, SourceError, SpecError,
    UnsupportedSchemaError,
};
pub use hierarchy::{HierarchyPath, HierarchyStep, ScalarType};
pub use index::{index, IndexedParam, Location};
pub use payload::{flatten, Args, Payload, PayloadBuilder};
pub use source::SpecSource;
pub use spec::{extract_operations, ApiOperation};
pub use synth::{synthesize, ArgSpec, CallableSpec};

// Re-export dependencies for downstream crates
pub use clap;
pub use reqwest;
