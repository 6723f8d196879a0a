use std::io::Write;

use anyhow::{Context, Result};
use clap::Command;
use reqwest::blocking::Client;
use serde_json::Value;

use swagger_clap::builder::{global_args, PAGINATE_FLAG};
use swagger_clap::logging::init_tracing;
use swagger_clap::{
    build_commands, collect_args, dispatch, Anonymous, CliConfig, ClientConfig, ClientContext,
    ResponseBody, SpecError, SpecSource, StaticToken,
};

const NAME: &str = "swagger-clap";
const ABOUT: &str = "CLI generated at runtime from a Swagger 2.0 document";
const TOKEN_ENV: &str = "SWAGGER_TOKEN";

fn main() -> Result<()> {
    // Only the globals are known before the document is loaded; read them leniently.
    let boot = Command::new(NAME)
        .args(global_args(&CliConfig::new(NAME, ABOUT, "")))
        .ignore_errors(true)
        .allow_external_subcommands(true)
        .disable_help_flag(true)
        .get_matches();

    init_tracing(boot.get_flag("log-verbose"));

    let location = boot
        .get_one::<String>("spec-source")
        .context("no spec given: pass --spec or set SWAGGER_SPEC")?;
    let http = Client::new();
    let spec = SpecSource::parse(location)
        .load(&http)
        .with_context(|| format!("failed to load spec from {location}"))?;

    let client_config = ClientConfig::from_spec(&spec);
    let cli_config = CliConfig::new(NAME, ABOUT, client_config.base_url.clone());
    let ctx = build_context(client_config, spec)
        .context("failed to generate client from spec")?
        .with_http_client(http);

    let matches = build_commands(&cli_config, ctx.methods()).get_matches();
    let base_url = matches
        .get_one::<String>("base-url")
        .context("no base URL")?;
    let ctx = rebase(ctx, base_url);

    let output = matches
        .get_one::<String>("output-format")
        .map(|s| s.as_str())
        .unwrap_or("json");

    let (name, sub) = matches.subcommand().context("no subcommand provided")?;
    let method = ctx.method(name)?;
    let args = collect_args(&method.callable, sub);

    let paginate = sub
        .try_get_one::<bool>(PAGINATE_FLAG)
        .ok()
        .flatten()
        .copied()
        .unwrap_or(false);

    if method.callable.paginated && paginate {
        for item in ctx.iterate(name, &args)? {
            print_value(&item.with_context(|| format!("{name} failed"))?, output)?;
        }
    } else if method.callable.streamed {
        // A variant without a redirect still answers with a JSON document.
        let document = ctx
            .with_stream(name, &args, |stream| {
                if stream.is_json() {
                    return Ok(Some(serde_json::from_reader::<_, Value>(stream)?));
                }
                std::io::copy(stream, &mut std::io::stdout().lock())?;
                Ok(None)
            })
            .with_context(|| format!("{name} failed"))?;
        if let Some(value) = document {
            print_value(&value, output)?;
        }
    } else {
        let resp = dispatch(&ctx, name, sub).with_context(|| format!("{name} failed"))?;
        match resp.body {
            ResponseBody::Json(value) => print_value(&value, output)?,
            ResponseBody::Bytes(bytes) => std::io::stdout().lock().write_all(&bytes)?,
        }
    }

    Ok(())
}

fn build_context(config: ClientConfig, spec: Value) -> Result<ClientContext, SpecError> {
    match std::env::var(TOKEN_ENV) {
        Ok(token) => ClientContext::new(config, spec, StaticToken::new(token)),
        Err(_) => ClientContext::new(config, spec, Anonymous),
    }
}

/// The context was built before `--base-url` could be parsed.
fn rebase(ctx: ClientContext, base_url: &str) -> ClientContext {
    if ctx.config().base_url == base_url {
        return ctx;
    }
    let config = ctx.config().clone().base_url(base_url);
    ctx.with_config(config)
}

fn print_value(value: &Value, output: &str) -> Result<()> {
    match output {
        "compact" => println!("{value}"),
        _ => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}
