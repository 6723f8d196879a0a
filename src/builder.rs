//! Callable specs → clap Command tree
//!
//! One subcommand per endpoint. Positionals stay positional, everything else
//! becomes a `--flag`, and leaf types drive clap-side value parsing.

use clap::builder::{PossibleValuesParser, TypedValueParser};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::Value;

use crate::client::ApiMethod;
use crate::hierarchy::ScalarType;
use crate::payload::Args;
use crate::synth::{ArgRole, ArgSpec, CallableSpec};

/// Flag added to paginated subcommands to walk every page.
pub const PAGINATE_FLAG: &str = "paginate";

/// Configuration for building a CLI from a Swagger document.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct CliConfig {
    /// Root command name (e.g. "dss", "swagger-clap")
    pub name: String,
    /// Root command about/description
    pub about: String,
    /// Base URL used when neither the flag nor the environment sets one
    pub default_base_url: String,
    /// Environment variable backing `--base-url`
    pub base_url_env: String,
    /// Environment variable backing `--spec`
    pub spec_env: String,
}

impl CliConfig {
    pub fn new(
        name: impl Into<String>,
        about: impl Into<String>,
        default_base_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            about: about.into(),
            default_base_url: default_base_url.into(),
            base_url_env: "SWAGGER_BASE_URL".to_string(),
            spec_env: "SWAGGER_SPEC".to_string(),
        }
    }

    pub fn base_url_env(mut self, var: impl Into<String>) -> Self {
        self.base_url_env = var.into();
        self
    }

    pub fn spec_env(mut self, var: impl Into<String>) -> Self {
        self.spec_env = var.into();
        self
    }
}

/// The root-level flags, without any subcommand.
///
/// `main` parses these first (leniently) to find the document to load.
pub fn global_args(config: &CliConfig) -> Vec<Arg> {
    vec![
        Arg::new("base-url")
            .long("base-url")
            .global(true)
            .env(config.base_url_env.clone())
            .default_value(config.default_base_url.clone())
            .help("API base URL"),
        Arg::new("spec-source")
            .long("spec")
            .global(true)
            .env(config.spec_env.clone())
            .help("Swagger document: URL or file path"),
        Arg::new("log-verbose")
            .long("verbose")
            .short('v')
            .global(true)
            .action(ArgAction::SetTrue)
            .help("Log requests and generation details"),
        Arg::new("output-format")
            .long("output")
            .short('o')
            .global(true)
            .value_parser(["json", "compact"])
            .default_value("json")
            .help("Output format"),
    ]
}

/// Build a clap `Command` tree from the synthesized methods.
///
/// Structure: `<name> <endpoint> [positionals] [--options]`
pub fn build_commands<'a>(
    config: &CliConfig,
    methods: impl IntoIterator<Item = &'a ApiMethod>,
) -> Command {
    let mut root = Command::new(config.name.clone())
        .about(config.about.clone())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .args(global_args(config));

    for method in methods {
        root = root.subcommand(build_endpoint_command(&method.callable));
    }
    root
}

fn build_endpoint_command(callable: &CallableSpec) -> Command {
    let about = callable.doc.lines().next().unwrap_or_default().to_string();
    let mut cmd = Command::new(callable.endpoint.clone())
        .about(about)
        .long_about(callable.doc.clone());

    for arg in &callable.args {
        cmd = cmd.arg(build_arg(arg));
    }

    if callable.paginated && !callable.args.iter().any(|a| a.flat_name == PAGINATE_FLAG) {
        cmd = cmd.arg(
            Arg::new(PAGINATE_FLAG)
                .long(PAGINATE_FLAG)
                .action(ArgAction::SetTrue)
                .help("Follow every page and print each result"),
        );
    }
    cmd
}

fn build_arg(spec: &ArgSpec) -> Arg {
    let mut arg = Arg::new(spec.flat_name.clone())
        .help(spec.help.clone())
        .required(spec.required);

    if spec.role == ArgRole::Option {
        arg = arg.long(flag_name(&spec.flat_name));
    }

    if is_switch(spec) {
        return arg.action(ArgAction::SetTrue);
    }

    let kind = spec.kind;
    arg = if spec.choices.is_empty() {
        arg.value_parser(move |s: &str| kind.coerce(s))
    } else {
        arg.value_parser(
            PossibleValuesParser::new(spec.choices.clone()).try_map(move |s| kind.coerce(&s)),
        )
    };

    if spec.array {
        arg.num_args(1..).action(ArgAction::Append)
    } else {
        arg.action(ArgAction::Set)
    }
}

/// Optional scalar booleans are plain presence flags.
fn is_switch(spec: &ArgSpec) -> bool {
    spec.kind == ScalarType::Boolean
        && !spec.array
        && !spec.required
        && spec.role == ArgRole::Option
}

/// Gather the flat arguments of `callable` from parsed matches.
/// Anything the user left out is absent, so defaults apply.
pub fn collect_args(callable: &CallableSpec, matches: &ArgMatches) -> Args {
    let mut args = Args::new();
    for spec in &callable.args {
        let id = spec.flat_name.as_str();
        let value = if is_switch(spec) {
            matches
                .try_get_one::<bool>(id)
                .ok()
                .flatten()
                .copied()
                .filter(|set| *set)
                .map(Value::Bool)
        } else if spec.array {
            matches
                .try_get_many::<Value>(id)
                .ok()
                .flatten()
                .map(|vals| Value::Array(vals.cloned().collect()))
        } else {
            matches.try_get_one::<Value>(id).ok().flatten().cloned()
        };
        if let Some(value) = value {
            args.insert(spec.flat_name.clone(), value);
        }
    }
    args
}

/// `creator_uid` → `creator-uid`
pub fn flag_name(flat_name: &str) -> String {
    flat_name.replace('_', "-")
}

/// Lowercase a path segment and turn every other character run into one `-`.
pub fn normalize_segment(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            result.push(c.to_ascii_lowercase());
        } else if !result.is_empty() && !result.ends_with('-') {
            result.push('-');
        }
    }
    while result.ends_with('-') {
        result.pop();
    }
    result
}
