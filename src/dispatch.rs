//! Flat arguments → HTTP request dispatch
//!
//! Builds the request for a synthesized method, attaches credentials with a
//! single refresh-and-retry on 401, and exposes the single-call, bulk,
//! paginated and streaming variants.

use std::collections::VecDeque;
use std::io::Read;

use reqwest::blocking::Response;
use reqwest::header::{HeaderMap, CONTENT_TYPE, LINK};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::builder::collect_args;
use crate::client::ClientContext;
use crate::error::{AuthError, DispatchError, InputError, ResponseBody};
use crate::payload::Args;
use crate::pool::run_bounded;

/// Methods that carry a JSON body; the rest send query data only.
const BODY_METHODS: [&str; 3] = ["post", "put", "patch"];

/// A drained response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl ApiResponse {
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Json(value) => Some(value),
            ResponseBody::Bytes(_) => None,
        }
    }
}

/// A fully resolved request, reusable across retries and pages.
#[derive(Debug, Clone)]
struct Prepared {
    endpoint: String,
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Value>,
    requires_auth: bool,
    args: Args,
}

impl ClientContext {
    /// Issue one request and drain its response.
    pub fn call(&self, name: &str, args: &Args) -> Result<ApiResponse, DispatchError> {
        let req = self.prepare(name, args)?;
        finish(self.send(&req, &req.url, true)?)
    }

    /// Call one endpoint once per argument set, on a bounded worker pool.
    ///
    /// Responses come back in input order. Every call is attempted; if any
    /// fail, the first failure is returned.
    pub fn call_many(
        &self,
        name: &str,
        batch: Vec<Args>,
    ) -> Result<Vec<ApiResponse>, DispatchError> {
        self.method(name)?;
        run_bounded(batch, |args| self.call(name, &args))
    }

    /// Lazily fetch successive pages. Each call starts again from page one.
    pub fn paginate(&self, name: &str, args: &Args) -> Result<Pages<'_>, DispatchError> {
        self.require(name, "pagination", |c| c.paginated)?;
        let req = self.prepare(name, args)?;
        Ok(Pages {
            ctx: self,
            next: Some(req.url.clone()),
            first: true,
            req,
        })
    }

    /// Lazily yield results across pages.
    pub fn iterate(&self, name: &str, args: &Args) -> Result<Items<'_>, DispatchError> {
        Ok(Items {
            pages: self.paginate(name, args)?,
            buffer: VecDeque::new(),
            results_key: self.config().results_key.clone(),
        })
    }

    /// Issue the request and hand back the unread response.
    pub fn stream(&self, name: &str, args: &Args) -> Result<StreamHandle, DispatchError> {
        self.require(name, "streaming", |c| c.streamed)?;
        let req = self.prepare(name, args)?;
        let response = self.send(&req, &req.url, true)?;
        if !response.status().is_success() {
            return Err(http_error(response));
        }
        Ok(StreamHandle { response })
    }

    /// Run `f` over a stream; the handle is closed however `f` returns.
    pub fn with_stream<T>(
        &self,
        name: &str,
        args: &Args,
        f: impl FnOnce(&mut StreamHandle) -> std::io::Result<T>,
    ) -> Result<T, DispatchError> {
        let mut handle = self.stream(name, args)?;
        let result = f(&mut handle);
        handle.close();
        result.map_err(DispatchError::StreamRead)
    }

    fn require(
        &self,
        name: &str,
        affordance: &'static str,
        has: impl Fn(&crate::synth::CallableSpec) -> bool,
    ) -> Result<(), DispatchError> {
        let method = self.method(name)?;
        if has(&method.callable) {
            Ok(())
        } else {
            Err(DispatchError::MissingAffordance {
                endpoint: method.callable.endpoint.clone(),
                affordance,
            })
        }
    }

    fn prepare(&self, name: &str, args: &Args) -> Result<Prepared, DispatchError> {
        let method = self.method(name)?;
        let endpoint = &method.descriptor;
        let payload = self.payload_builder().build(endpoint, args)?;

        let variant =
            endpoint
                .variant_for(payload.path.len())
                .ok_or_else(|| InputError::NoMatchingVariant {
                    endpoint: endpoint.name.clone(),
                    supplied: payload.path.len(),
                })?;

        let http_method: Method =
            endpoint
                .method
                .to_uppercase()
                .parse()
                .map_err(|_| DispatchError::UnsupportedMethod {
                    method: endpoint.method.clone(),
                })?;

        let body = if BODY_METHODS.contains(&endpoint.method.as_str()) {
            payload.body
        } else {
            if payload.body.is_some() {
                warn!(endpoint = %endpoint.name, "body values dropped for a body-less method");
            }
            None
        };

        Ok(Prepared {
            endpoint: endpoint.name.clone(),
            method: http_method,
            url: build_url(
                &self.config().base_url,
                &variant.template,
                &variant.positional,
                &payload.path,
            ),
            query: pairs(&payload.query),
            headers: pairs(&payload.header),
            body,
            requires_auth: variant.requires_auth,
            args: args.clone(),
        })
    }

    /// Send with credentials; on 401 refresh them and try exactly once more.
    fn send(&self, req: &Prepared, url: &str, with_query: bool) -> Result<Response, DispatchError> {
        if !req.requires_auth {
            return self.issue(req, url, with_query, None);
        }

        let auth = self.auth().auth_header(&req.args, false)?;
        let resp = self.issue(req, url, with_query, Some(auth))?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        info!(endpoint = %req.endpoint, "401 received; retrying with refreshed credentials");
        let auth = self.auth().auth_header(&req.args, true)?;
        let resp = self.issue(req, url, with_query, Some(auth))?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            let status = resp.status();
            let body = drain(resp)?;
            return Err(AuthError::Unauthorized {
                status,
                reason: reason(status),
                body,
            }
            .into());
        }
        Ok(resp)
    }

    fn issue(
        &self,
        req: &Prepared,
        url: &str,
        with_query: bool,
        auth: Option<HeaderMap>,
    ) -> Result<Response, DispatchError> {
        debug!(method = %req.method, %url, "sending request");
        let mut builder = self.http().request(req.method.clone(), url);
        if with_query && !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        for (name, val) in &req.headers {
            builder = builder.header(name, val);
        }
        if let Some(auth) = auth {
            builder = builder.headers(auth);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }
        builder.send().map_err(DispatchError::RequestFailed)
    }
}

/// Pages of a paginated endpoint, fetched one per `next()`.
pub struct Pages<'c> {
    ctx: &'c ClientContext,
    req: Prepared,
    next: Option<String>,
    first: bool,
}

impl Iterator for Pages<'_> {
    type Item = Result<ApiResponse, DispatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        let url = self.next.take()?;
        let with_query = std::mem::replace(&mut self.first, false);
        let page = match self
            .ctx
            .send(&self.req, &url, with_query)
            .and_then(finish)
        {
            Ok(page) => page,
            Err(err) => return Some(Err(err)),
        };
        if page.status == StatusCode::PARTIAL_CONTENT {
            self.next = next_link(&page.headers, &url);
        }
        Some(Ok(page))
    }
}

/// Results of a paginated endpoint. A page is only requested once the
/// previous one is used up.
pub struct Items<'c> {
    pages: Pages<'c>,
    buffer: VecDeque<Value>,
    results_key: String,
}

impl Iterator for Items<'_> {
    type Item = Result<Value, DispatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            match self.pages.next()? {
                Ok(page) => self.buffer.extend(page_items(&page.body, &self.results_key)),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// An unread response body. Dropping the handle closes the connection.
#[derive(Debug)]
pub struct StreamHandle {
    response: Response,
}

impl StreamHandle {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }

    /// Whether the server labelled the body as JSON.
    pub fn is_json(&self) -> bool {
        is_json(self.response.headers())
    }

    pub fn close(self) {
        drop(self);
    }
}

impl Read for StreamHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.response.read(buf)
    }
}

/// Execute a synthesized method based on clap matches.
pub fn dispatch(
    ctx: &ClientContext,
    name: &str,
    matches: &clap::ArgMatches,
) -> Result<ApiResponse, DispatchError> {
    let method = ctx.method(name)?;
    let args = collect_args(&method.callable, matches);
    ctx.call(name, &args)
}

fn build_url(base_url: &str, template: &str, names: &[String], values: &[String]) -> String {
    let base = base_url.trim_end_matches('/');
    let mut url = format!("{base}{template}");
    for (name, val) in names.iter().zip(values) {
        url = url.replace(&format!("{{{name}}}"), &urlencoding::encode(val));
    }
    url
}

/// Render a query or header container as string pairs; arrays repeat the name.
fn pairs(map: &serde_json::Map<String, Value>) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (name, value) in map {
        match value {
            Value::Array(items) => {
                out.extend(items.iter().map(|item| (name.clone(), render(item))));
            }
            other => out.push((name.clone(), render(other))),
        }
    }
    out
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn reason(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("").to_string()
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

fn drain(resp: Response) -> Result<ResponseBody, DispatchError> {
    let json = is_json(resp.headers());
    let bytes = resp.bytes().map_err(DispatchError::ResponseRead)?;
    if json {
        if let Ok(value) = serde_json::from_slice(&bytes) {
            return Ok(ResponseBody::Json(value));
        }
    }
    Ok(ResponseBody::Bytes(bytes.to_vec()))
}

fn http_error(resp: Response) -> DispatchError {
    let status = resp.status();
    match drain(resp) {
        Ok(body) => DispatchError::HttpError {
            status,
            reason: reason(status),
            body,
        },
        Err(err) => err,
    }
}

fn finish(resp: Response) -> Result<ApiResponse, DispatchError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(http_error(resp));
    }
    let headers = resp.headers().clone();
    let body = drain(resp)?;
    Ok(ApiResponse {
        status,
        headers,
        body,
    })
}

/// Target of the `rel="next"` entry of `Link` headers, resolved against the
/// URL of the page that carried it.
fn next_link(headers: &HeaderMap, current: &str) -> Option<String> {
    let target = headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .find(|entry| {
            entry
                .split(';')
                .skip(1)
                .any(|attr| matches!(attr.trim(), "rel=\"next\"" | "rel=next"))
        })
        .and_then(|entry| {
            let start = entry.find('<')? + 1;
            let end = entry.find('>')?;
            (start <= end).then(|| entry[start..end].to_string())
        })?;
    match reqwest::Url::parse(current).and_then(|base| base.join(&target)) {
        Ok(url) => Some(url.to_string()),
        Err(_) => Some(target),
    }
}

fn page_items(body: &ResponseBody, results_key: &str) -> Vec<Value> {
    match body {
        ResponseBody::Json(Value::Array(items)) => items.clone(),
        ResponseBody::Json(page) => page
            .get(results_key)
            .and_then(|r| r.as_array())
            .cloned()
            .unwrap_or_default(),
        ResponseBody::Bytes(_) => Vec::new(),
    }
}
