use serde_json::{json, Value};
use swagger_clap::{
    build_commands, collect_args, dispatch, Anonymous, Args, CliConfig, ClientConfig,
    ClientContext, DispatchError, InputError, ResponseBody, StaticToken,
};

fn storage_spec() -> Value {
    json!({
        "swagger": "2.0",
        "host": "dss.example.org",
        "basePath": "/v1",
        "security": [{"dcpAuth": []}],
        "definitions": {
            "Replica": {"name": "replica", "in": "query", "type": "string", "required": true,
                        "enum": ["aws", "gcp"]},
            "FileRef": {
                "type": "object",
                "properties": {
                    "uuid": {"type": "string"},
                    "version": {"type": "string"},
                    "name": {"type": "string"},
                    "indexed": {"type": "boolean"}
                }
            }
        },
        "paths": {
            "/files": {
                "get": {
                    "security": [],
                    "summary": "List files",
                    "parameters": [{"$ref": "#/definitions/Replica"}],
                    "responses": {"200": {}, "206": {}}
                }
            },
            "/files/{uuid}": {
                "parameters": [
                    {"name": "uuid", "in": "path", "type": "string", "required": true}
                ],
                "get": {
                    "summary": "Retrieve a file",
                    "parameters": [
                        {"$ref": "#/definitions/Replica"},
                        {"name": "version", "in": "query", "type": "string"}
                    ],
                    "responses": {"200": {}, "206": {}}
                }
            },
            "/bundles/{uuid}": {
                "put": {
                    "summary": "Create a bundle",
                    "parameters": [
                        {"name": "uuid", "in": "path", "type": "string", "required": true},
                        {"$ref": "#/definitions/Replica"},
                        {"name": "body", "in": "body", "required": true, "schema": {
                            "type": "object",
                            "required": ["creator_uid", "files"],
                            "properties": {
                                "creator_uid": {"type": "integer"},
                                "files": {"type": "array", "items": {"$ref": "#/definitions/FileRef"}}
                            }
                        }}
                    ],
                    "responses": {"201": {}}
                }
            },
            "/search": {
                "post": {
                    "security": [],
                    "parameters": [
                        {"name": "replica", "in": "query", "type": "string", "required": true},
                        {"name": "body", "in": "body", "schema": {
                            "type": "object",
                            "properties": {"es_query": {"type": "object"}}
                        }}
                    ],
                    "responses": {"200": {}, "206": {}}
                }
            }
        }
    })
}

fn context(server: &mockito::Server) -> ClientContext {
    ClientContext::new(
        ClientConfig::new(server.url()),
        storage_spec(),
        StaticToken::new("tok"),
    )
    .unwrap()
}

fn run(ctx: &ClientContext, argv: &[&str]) -> Result<swagger_clap::ApiResponse, DispatchError> {
    let config = CliConfig::new("dss", "Storage CLI", ctx.config().base_url.clone());
    let matches = build_commands(&config, ctx.methods())
        .try_get_matches_from(argv)
        .unwrap();
    let (name, sub) = matches.subcommand().unwrap();
    dispatch(ctx, name, sub)
}

#[test]
fn spec_base_url_and_endpoint_table() {
    let spec = storage_spec();
    let ctx = ClientContext::new(ClientConfig::from_spec(&spec), spec, Anonymous).unwrap();
    assert_eq!(ctx.config().base_url, "https://dss.example.org/v1");

    let names: Vec<&str> = ctx.methods().map(|m| m.callable.endpoint.as_str()).collect();
    assert_eq!(names, ["get-files", "post-search", "put-bundles"]);

    let get = ctx.method("get-files").unwrap();
    let replica = get.descriptor.param("replica").unwrap();
    assert!(replica.required);
    assert_eq!(replica.required_for, ["/files", "/files/{uuid}"]);
    assert!(!get.descriptor.param("uuid").unwrap().required);
    assert!(!get.descriptor.param("version").unwrap().required);
}

#[test]
fn cli_put_bundle_builds_nested_body() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("PUT", "/bundles/b-1")
        .match_query(mockito::Matcher::UrlEncoded("replica".into(), "aws".into()))
        .match_header("authorization", "Bearer tok")
        .match_body(mockito::Matcher::Json(json!({
            "creator_uid": 7,
            "files": [
                {"indexed": true, "name": "a.txt", "uuid": "f1", "version": "v1"},
                {"indexed": false, "uuid": "f2", "version": "v2"}
            ]
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"bundle_uuid":"b-1"}"#)
        .create();

    let ctx = context(&server);
    let resp = run(
        &ctx,
        &[
            "dss",
            "put-bundles",
            "b-1",
            "--replica",
            "aws",
            "--creator-uid",
            "7",
            "--files",
            "True/a.txt/f1/v1",
            "False/None/f2/v2",
        ],
    )
    .unwrap();

    assert_eq!(resp.body, ResponseBody::Json(json!({"bundle_uuid": "b-1"})));
    mock.assert();
}

#[test]
fn cli_get_file_picks_longer_variant() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/files/f1")
        .match_query(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("replica".into(), "gcp".into()),
            mockito::Matcher::UrlEncoded("version".into(), "v2".into()),
        ]))
        .match_header("authorization", "Bearer tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"name":"a.txt"}"#)
        .create();

    let ctx = context(&server);
    let resp = run(
        &ctx,
        &["dss", "get-files", "f1", "--replica", "gcp", "--version", "v2"],
    )
    .unwrap();
    assert_eq!(resp.json().unwrap()["name"], "a.txt");
    mock.assert();
}

#[test]
fn cli_list_files_uses_open_variant() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/files")
        .match_query(mockito::Matcher::UrlEncoded("replica".into(), "aws".into()))
        .match_header("authorization", mockito::Matcher::Missing)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"results":[]}"#)
        .create();

    let ctx = context(&server);
    run(&ctx, &["dss", "get-files", "--replica", "aws"]).unwrap();
    mock.assert();
}

#[test]
fn cli_rejects_bad_token_count_before_sending() {
    let server = mockito::Server::new();
    let ctx = context(&server);
    let err = run(
        &ctx,
        &[
            "dss",
            "put-bundles",
            "b-1",
            "--replica",
            "aws",
            "--creator-uid",
            "7",
            "--files",
            "a.txt/f1",
        ],
    )
    .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Input(InputError::TokenCount { expected: 4, found: 2, .. })
    ));
}

#[test]
fn iterate_search_results_across_pages() {
    let mut server = mockito::Server::new();
    let next = format!("<{}/search-2>; rel=\"next\"", server.url());
    let first = server
        .mock("POST", "/search")
        .match_query(mockito::Matcher::UrlEncoded("replica".into(), "aws".into()))
        .match_body(mockito::Matcher::Json(json!({"es_query": {"match_all": {}}})))
        .with_status(206)
        .with_header("content-type", "application/json")
        .with_header("link", &next)
        .with_body(r#"{"results":[{"bundle_fqid":"b1"}]}"#)
        .create();
    let second = server
        .mock("POST", "/search-2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"results":[{"bundle_fqid":"b2"}]}"#)
        .create();

    let ctx = context(&server);
    let mut args = Args::new();
    args.insert("replica".into(), json!("aws"));
    args.insert("es_query".into(), json!({"match_all": {}}));

    let ids: Vec<Value> = ctx
        .iterate("post_search", &args)
        .unwrap()
        .map(|item| item.unwrap()["bundle_fqid"].clone())
        .collect();
    assert_eq!(ids, [json!("b1"), json!("b2")]);
    first.assert();
    second.assert();
}

#[test]
fn collect_args_round_trips_through_clap() {
    let server = mockito::Server::new();
    let ctx = context(&server);
    let config = CliConfig::new("dss", "Storage CLI", "http://unused");
    let matches = build_commands(&config, ctx.methods())
        .try_get_matches_from(["dss", "post-search", "--replica", "aws", "--es-query", r#"{"match":{"a":1}}"#])
        .unwrap();
    let (name, sub) = matches.subcommand().unwrap();
    let args = collect_args(&ctx.method(name).unwrap().callable, sub);
    assert_eq!(args["es_query"], json!({"match": {"a": 1}}));
    assert_eq!(args["replica"], "aws");
}
