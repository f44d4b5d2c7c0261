//! The central dispatch engine (§4.8 C8): route registration, the
//! per-request middleware chain, the catch-all route, and the
//! error-taxonomy-to-HTTP mapping.
//!
//! The extract-body → call-handler → convert-response shape is the usual
//! axum extractor pattern, generalized here from compile-time-typed
//! per-endpoint routing to a runtime registry, since this engine's
//! methods are populated from a lexicon document set at construction
//! time rather than known to the type system.
//!
//! Ordering decision (recorded in `DESIGN.md`): the catch-all resolves the
//! NSID and route first — an unknown method or a verb/kind mismatch is a
//! request-shape error and is rejected before any auth or rate-limit work
//! runs at all. Past that point the per-request chain follows the
//! "Ordering guarantees" list literally: auth, then the global rate
//! limiters, then body/param parse, then the route rate limiters (which
//! fold the global ones back in), then the handler.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Request, State};
use axum::extract::ws::WebSocketUpgrade;
use axum::response::{IntoResponse, Response};
use http::{Method, StatusCode};
use tokio_util::sync::CancellationToken;

use xrpc_ratelimit::{ConsumeResult, RateLimiterRegistry, RateLimiterStore};
use xrpc_types::{
    HandlerInput, HandlerOutput, LexiconValidator, MethodDef, MethodKind, Nsid, Params,
    PermissiveValidator, RequestContext, XrpcErrorKind,
};

use crate::auth::{AuthRequest, AuthVerifier};
use crate::config::DispatcherConfig;
use crate::error::{apply_handler_headers, apply_rate_limit_headers, error_response};
use crate::method::{AuthRequirement, MethodConfig, StreamConfig};

/// The dispatcher. `A` is the opaque auth payload type threaded through
/// every route; `S` is the rate-limiter backing store (the in-memory
/// fixed-window store by default).
pub struct Dispatcher<A, S = xrpc_ratelimit::InMemoryRateLimiterStore> {
    methods: HashMap<String, MethodConfig<A>>,
    streams: HashMap<String, StreamConfig<A>>,
    rate_limits: RateLimiterRegistry,
    store: S,
    auth: Option<AuthVerifier<A>>,
    validator: Arc<dyn LexiconValidator>,
    config: DispatcherConfig,
}

impl<A, S> Dispatcher<A, S>
where
    A: Clone + Send + Sync + 'static,
    S: RateLimiterStore + Send + Sync + 'static,
{
    pub fn new(config: DispatcherConfig, store: S) -> Self {
        Self {
            methods: HashMap::new(),
            streams: HashMap::new(),
            rate_limits: RateLimiterRegistry::new(),
            store,
            auth: None,
            validator: Arc::new(PermissiveValidator),
            config,
        }
    }

    pub fn validator(mut self, validator: Arc<dyn LexiconValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn auth_verifier(mut self, verifier: AuthVerifier<A>) -> Self {
        self.auth = Some(verifier);
        self
    }

    pub fn rate_limits(mut self, f: impl FnOnce(&mut RateLimiterRegistry)) -> Self {
        f(&mut self.rate_limits);
        self
    }

    /// Register a query or procedure (§4.8 "Registration").
    pub fn method(mut self, config: MethodConfig<A>) -> Self {
        self.methods
            .insert(config.def.nsid.as_str().to_string(), config);
        self
    }

    /// Register a subscription (§4.8 "Registration").
    pub fn stream_method(mut self, config: StreamConfig<A>) -> Self {
        self.streams
            .insert(config.def.nsid.as_str().to_string(), config);
        self
    }

    /// Build the axum router. Uses a single catch-all at `/xrpc/{method_id}`
    /// (axum 0.8's `{param}` path-parameter syntax) handling every verb, per
    /// §4.8 "Catch-all".
    pub fn into_router(self) -> Router<()> {
        let dispatcher = Arc::new(self);
        Router::new()
            .route("/xrpc/{method_id}", axum::routing::any(catch_all::<A, S>))
            .with_state(dispatcher)
    }
}

async fn catch_all<A, S>(
    State(dispatcher): State<Arc<Dispatcher<A, S>>>,
    Path(method_id): Path<String>,
    req: Request,
) -> Response
where
    A: Clone + Send + Sync + 'static,
    S: RateLimiterStore + Send + Sync + 'static,
{
    let method = req.method().clone();

    let nsid = match Nsid::new(&method_id) {
        Ok(n) => n,
        Err(kind) => return error_response(kind, None),
    };

    if let Some(stream) = dispatcher.streams.get(nsid.as_str()) {
        if method != Method::GET {
            return error_response(
                XrpcErrorKind::invalid_request("subscription methods require a websocket upgrade"),
                Some(&nsid),
            );
        }
        return handle_subscription(dispatcher.clone(), nsid, stream, req).await;
    }

    let Some(route) = dispatcher.methods.get(nsid.as_str()) else {
        return error_response(
            XrpcErrorKind::MethodNotImplemented {
                message: Some(format!("unknown method {nsid}")),
            },
            Some(&nsid),
        );
    };

    let expected_method = match route.def.kind {
        MethodKind::Query => Method::GET,
        MethodKind::Procedure => Method::POST,
        MethodKind::Subscription => {
            return error_response(
                XrpcErrorKind::internal(format!("{nsid} registered as both method and stream")),
                Some(&nsid),
            );
        }
    };
    if method != expected_method {
        return error_response(
            XrpcErrorKind::MethodNotImplemented {
                message: Some(format!("{nsid} does not accept {method}")),
            },
            Some(&nsid),
        );
    }

    handle_method(&dispatcher, &nsid, route, req).await
}

/// Evaluate the global rate limiters alone, after auth has already
/// succeeded (§5 "Ordering guarantees": `auth → rate-limit (global) →
/// body parse`). Returns the [`ConsumeResult`] on success so a caller that
/// also has route limiters (`handle_method`) can combine the two without
/// consuming the global buckets a second time; on rejection, returns the
/// raw kind and the tightest status so the HTTP path can still set the
/// standard headers.
async fn evaluate_global_kind<A, S>(
    dispatcher: &Dispatcher<A, S>,
    headers: &http::HeaderMap,
) -> Result<ConsumeResult, (XrpcErrorKind, Option<xrpc_ratelimit::RateLimiterStatus>)>
where
    S: RateLimiterStore,
{
    match dispatcher
        .rate_limits
        .evaluate_global(&dispatcher.store, headers)
        .await
    {
        Ok(ConsumeResult::Exceeded(status)) => Err((
            XrpcErrorKind::RateLimitExceeded { message: None },
            Some(status),
        )),
        Ok(result) => Ok(result),
        Err(err) => Err((XrpcErrorKind::internal(err.to_string()), None)),
    }
}

async fn evaluate_global<A, S>(
    dispatcher: &Dispatcher<A, S>,
    nsid: &Nsid,
    headers: &http::HeaderMap,
) -> Result<ConsumeResult, Response>
where
    S: RateLimiterStore,
{
    evaluate_global_kind(dispatcher, headers).await.map_err(|(kind, status)| {
        let mut response = error_response(kind, Some(nsid));
        if let Some(status) = &status {
            apply_rate_limit_headers(&mut response, status);
        }
        response
    })
}

async fn handle_method<A, S>(
    dispatcher: &Arc<Dispatcher<A, S>>,
    nsid: &Nsid,
    route: &MethodConfig<A>,
    req: Request,
) -> Response
where
    A: Clone + Send + Sync + 'static,
    S: RateLimiterStore + Send + Sync + 'static,
{
    let (parts, body) = req.into_parts();

    let auth_payload = match run_auth(dispatcher, nsid, route.auth, &parts.headers).await {
        Ok(payload) => payload,
        Err(response) => return response,
    };

    let global_result = match evaluate_global(dispatcher, nsid, &parts.headers).await {
        Ok(result) => result,
        Err(response) => return response,
    };

    let input = match read_input(
        &dispatcher.config,
        &dispatcher.validator,
        nsid,
        &route.def,
        &parts,
        body,
    )
    .await
    {
        Ok(input) => input,
        Err(kind) => return error_response(kind, Some(nsid)),
    };

    let params = match decode_params(&route.def, parts.uri.query().unwrap_or("")) {
        Ok(p) => p,
        Err(kind) => return error_response(kind, Some(nsid)),
    };
    if let Err(kind) = dispatcher.validator.assert_valid_params(nsid, &params) {
        return error_response(kind, Some(nsid));
    }

    let rl_status = match dispatcher
        .rate_limits
        .evaluate_route(global_result, &route.rate_limiters, &dispatcher.store, &parts.headers)
        .await
    {
        Ok(ConsumeResult::Exceeded(status)) => {
            let mut response =
                error_response(XrpcErrorKind::RateLimitExceeded { message: None }, Some(nsid));
            apply_rate_limit_headers(&mut response, &status);
            return response;
        }
        Ok(result) => result.status(),
        Err(err) => return error_response(XrpcErrorKind::internal(err.to_string()), Some(nsid)),
    };

    let reset_route_rate_limits = build_reset_hook(dispatcher, nsid, &parts.headers);

    let ctx = RequestContext {
        nsid: nsid.clone(),
        params,
        input,
        auth: auth_payload,
        reset_route_rate_limits,
    };
    let output = (route.handler)(ctx).await;

    let mut response = render_output(&dispatcher.config, &dispatcher.validator, nsid, &route.def, output);
    if let Some(status) = rl_status {
        apply_rate_limit_headers(&mut response, &status);
    }
    response
}

/// Build the `resetRouteRateLimits()` hook handed to a handler through its
/// [`RequestContext`] (§4.5 "Bypass"): calling it clears this route's own
/// limiter counters for the request's key, without touching the global
/// buckets already consumed for this request.
fn build_reset_hook<A, S>(
    dispatcher: &Arc<Dispatcher<A, S>>,
    nsid: &Nsid,
    headers: &http::HeaderMap,
) -> xrpc_types::output::ResetRouteRateLimits
where
    A: Clone + Send + Sync + 'static,
    S: RateLimiterStore + Send + Sync + 'static,
{
    let dispatcher = dispatcher.clone();
    let nsid = nsid.to_string();
    let headers = headers.clone();
    Arc::new(move || {
        let dispatcher = dispatcher.clone();
        let nsid = nsid.clone();
        let headers = headers.clone();
        Box::pin(async move {
            let Some(route) = dispatcher.methods.get(&nsid) else {
                return;
            };
            if let Err(_err) = dispatcher
                .rate_limits
                .reset_route(&route.rate_limiters, &dispatcher.store, &headers)
                .await
            {
                #[cfg(feature = "tracing")]
                tracing::warn!(nsid = %nsid, error = %_err, "resetRouteRateLimits failed");
            }
        })
    })
}

/// Run the configured auth verifier, if any, surfacing the raw
/// [`XrpcErrorKind`] on failure. Shared by the HTTP path (which converts
/// the kind to a response) and the subscription path (which converts it
/// to a single Error frame, §6 "auth failure" as a 1008 cause).
async fn run_auth_kind<A, S>(
    dispatcher: &Dispatcher<A, S>,
    nsid: &Nsid,
    requirement: AuthRequirement,
    headers: &http::HeaderMap,
) -> Result<Option<A>, XrpcErrorKind> {
    if requirement == AuthRequirement::Open {
        return Ok(None);
    }
    let Some(verifier) = &dispatcher.auth else {
        return Err(XrpcErrorKind::AuthRequired {
            message: Some("no auth verifier configured for this route".into()),
        });
    };
    verifier(AuthRequest { nsid, headers }).await.map(Some)
}

async fn run_auth<A, S>(
    dispatcher: &Dispatcher<A, S>,
    nsid: &Nsid,
    requirement: AuthRequirement,
    headers: &http::HeaderMap,
) -> Result<Option<A>, Response> {
    run_auth_kind(dispatcher, nsid, requirement, headers)
        .await
        .map_err(|kind| error_response(kind, Some(nsid)))
}

async fn read_input(
    config: &DispatcherConfig,
    validator: &Arc<dyn LexiconValidator>,
    nsid: &Nsid,
    def: &MethodDef,
    parts: &http::request::Parts,
    body: axum::body::Body,
) -> Result<HandlerInput, XrpcErrorKind> {
    let Some(declared) = &def.input_encoding else {
        return Ok(HandlerInput::None);
    };

    let content_type = parts
        .headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    xrpc_types::body::require_content_type(true, content_type)?;
    let Some(content_type) = content_type else {
        return Err(XrpcErrorKind::invalid_request(
            "Request encoding (Content-Type) required but not provided",
        ));
    };
    if !xrpc_types::body::mime_matches(declared, content_type) {
        return Err(XrpcErrorKind::invalid_request(format!(
            "unexpected content-type: {content_type}"
        )));
    }

    let content_length = parts
        .headers
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    xrpc_types::body::check_content_length(content_length, config.blob_limit)?;

    let raw = axum::body::to_bytes(body, config.blob_limit as usize)
        .await
        .map_err(|_| XrpcErrorKind::PayloadTooLarge {
            message: Some("request entity too large".into()),
        })?;

    let encoding_header = parts
        .headers
        .get(http::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok());
    let encodings = match encoding_header {
        Some(header) => xrpc_types::body::parse_content_encoding(header)?,
        None => Vec::new(),
    };
    let decoded = xrpc_types::body::decode_content_encoding(raw, &encodings, config.blob_limit as usize)?;

    let input = match declared {
        xrpc_types::DeclaredEncoding::Json => {
            let value: serde_json::Value = serde_json::from_slice(&decoded)
                .map_err(|e| XrpcErrorKind::invalid_request(format!("invalid json body: {e}")))?;
            validator.assert_valid_input(nsid, &value)?;
            HandlerInput::Json(value)
        }
        xrpc_types::DeclaredEncoding::Text(_) => {
            let text = String::from_utf8(decoded.to_vec())
                .map_err(|_| XrpcErrorKind::invalid_request("body is not valid utf-8"))?;
            HandlerInput::Text(text)
        }
        xrpc_types::DeclaredEncoding::Any | xrpc_types::DeclaredEncoding::Other(_) => {
            HandlerInput::Bytes(decoded)
        }
    };
    Ok(input)
}

fn decode_params(def: &MethodDef, query: &str) -> Result<Params, XrpcErrorKind> {
    let schema: Vec<(&str, xrpc_types::ParamType)> =
        def.params.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    xrpc_types::params::decode_query_params(query, &schema)
}

fn render_output(
    config: &DispatcherConfig,
    validator: &Arc<dyn LexiconValidator>,
    nsid: &Nsid,
    def: &MethodDef,
    output: HandlerOutput,
) -> Response {
    match output {
        HandlerOutput::Void { headers } => {
            let mut response = StatusCode::OK.into_response();
            apply_handler_headers(&mut response, &headers);
            response
        }
        HandlerOutput::Json {
            encoding,
            body,
            headers,
        } => {
            if config.response_validation && def.output_encoding.is_some() {
                if let Err(kind) = validator.assert_valid_output(nsid, &body) {
                    return error_response(kind, Some(nsid));
                }
            }
            let content_type = response_content_type(&encoding);
            let bytes = match serde_json::to_vec(&body) {
                Ok(b) => b,
                Err(e) => {
                    return error_response(
                        XrpcErrorKind::internal(format!("output serialize failed: {e}")),
                        Some(nsid),
                    );
                }
            };
            let mut response =
                (StatusCode::OK, [(http::header::CONTENT_TYPE, content_type)], bytes).into_response();
            apply_handler_headers(&mut response, &headers);
            response
        }
        HandlerOutput::Buffer {
            encoding,
            buffer,
            headers,
        } => {
            let content_type = response_content_type(&encoding);
            let mut response = (
                StatusCode::OK,
                [(http::header::CONTENT_TYPE, content_type)],
                buffer.to_vec(),
            )
                .into_response();
            apply_handler_headers(&mut response, &headers);
            response
        }
        HandlerOutput::Stream {
            encoding,
            stream,
            headers,
        } => {
            let content_type = response_content_type(&encoding);
            let body = axum::body::Body::from_stream(stream);
            let mut response =
                (StatusCode::OK, [(http::header::CONTENT_TYPE, content_type)], body).into_response();
            apply_handler_headers(&mut response, &headers);
            response
        }
        HandlerOutput::Error(kind) => error_response(kind, Some(nsid)),
    }
}

/// `application/json` gets the fixed `; charset=utf-8` suffix, `text/*`
/// gets the same suffix, anything else is used as-declared (§6 "Response
/// content-type").
fn response_content_type(encoding: &str) -> String {
    if encoding == "application/json" {
        "application/json; charset=utf-8".to_string()
    } else if encoding.starts_with("text/") {
        format!("{encoding}; charset=utf-8")
    } else {
        encoding.to_string()
    }
}

/// Everything a subscription needs before its handler can run: either a
/// ready request context, or the single kind that will become the one
/// Error frame the connection gets (§4.6, §6 "Close codes": a 1008 cause
/// can be an error frame, an auth failure, or server policy — all three
/// are the *same* one-error-frame-then-close path here, not a pre-upgrade
/// HTTP rejection).
async fn prepare_subscription<A, S>(
    dispatcher: &Dispatcher<A, S>,
    nsid: &Nsid,
    stream: &StreamConfig<A>,
    headers: &http::HeaderMap,
    query: &str,
) -> Result<RequestContext<A>, XrpcErrorKind>
where
    S: RateLimiterStore,
{
    let auth_payload = run_auth_kind(dispatcher, nsid, stream.auth, headers).await?;
    evaluate_global_kind(dispatcher, headers)
        .await
        .map_err(|(kind, _status)| kind)?;
    let params = decode_params(&stream.def, query)?;
    dispatcher.validator.assert_valid_params(nsid, &params)?;
    Ok(RequestContext {
        nsid: nsid.clone(),
        params,
        input: HandlerInput::None,
        auth: auth_payload,
        reset_route_rate_limits: xrpc_types::no_op_reset_route_rate_limits(),
    })
}

/// §4.6 "If absent, reject the upgrade (no 101)" is already handled by the
/// caller (unknown NSIDs never reach this function). Everything else —
/// auth, global rate limits, and param validation — runs *after* the
/// socket is accepted, since the wire protocol reports those failures as
/// a single Error frame followed by a policy close, not an HTTP status
/// (§6 "Close codes").
async fn handle_subscription<A, S>(
    dispatcher: Arc<Dispatcher<A, S>>,
    nsid: Nsid,
    stream: &StreamConfig<A>,
    req: Request,
) -> Response
where
    A: Clone + Send + Sync + 'static,
    S: RateLimiterStore + Send + Sync + 'static,
{
    let (mut parts, _body) = req.into_parts();

    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &dispatcher).await {
        Ok(u) => u,
        Err(rejection) => return rejection.into_response(),
    };

    let query = parts.uri.query().unwrap_or("").to_string();
    let prepared = prepare_subscription(&dispatcher, &nsid, stream, &parts.headers, &query).await;

    let dispatcher_for_task = dispatcher.clone();
    let nsid_for_task = nsid;

    upgrade.on_upgrade(move |socket| async move {
        let cancel = CancellationToken::new();
        let body: crate::method::StreamBody = match prepared {
            Ok(ctx) => {
                let Some(route) = dispatcher_for_task.streams.get(nsid_for_task.as_str()) else {
                    return;
                };
                (route.handler)(ctx, cancel.clone())
            }
            Err(kind) => Box::pin(futures_util::stream::once(async move { Err(kind) })),
        };
        crate::ws::run_producer(socket, nsid_for_task.to_string(), body, cancel).await;
    })
}
