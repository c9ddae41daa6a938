//! The HTTP surface: a thin hyper wrapper over the verification core.
//!
//! Endpoints mirror the engine's collaborator interface:
//!
//! - `POST /verify`              — verify a text against an ontology
//! - `GET  /ontologies`          — list loadable ontologies
//! - `GET  /ontologies/{name}`   — verbatim validated document
//! - `POST /ontologies/reload`   — rebuild the registry cache
//! - `GET  /health`              — liveness probe
//! - `GET  /`                    — service index
//!
//! Verification is CPU-bound and owns a solver context per request, so it
//! runs on the blocking pool; the async side only shuffles bytes.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use verdict_engine::{CancelToken, Verifier};
use verdict_ontology::{OntologyError, OntologyRegistry};

pub struct AppState {
    pub registry: OntologyRegistry,
    pub verifier: Verifier,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    #[serde(default)]
    llm_output: String,
    #[serde(default = "default_ontology")]
    ontology: String,
}

fn default_ontology() -> String {
    "mortgage-compliance-v1".to_string()
}

pub async fn serve(state: Arc<AppState>, listen: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("cannot bind {}", listen))?;
    info!(listen = %listen, "verdict service listening");

    loop {
        let (stream, peer) = listener.accept().await.context("accept failed")?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let service = service_fn(move |req| handle(Arc::clone(&state), req));
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                warn!(peer = %peer, error = %e, "connection error");
            }
        });
    }
}

async fn handle(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
    let origin = req
        .headers()
        .get(hyper::header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let cors = cors_origin(&origin, &state.cors_origins);

    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = route(state, req).await.unwrap_or_else(|e| {
        error!(error = %format!("{:#}", e), "request failed");
        json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &json!({"error": e.to_string(), "type": "internal_error"}),
        )
    });

    info!(method = %method, path = %path, status = %response.status(), "request");
    Ok(with_cors(response, &cors))
}

async fn route(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>> {
    if req.method() == Method::OPTIONS {
        return Ok(Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Full::new(Bytes::new()))
            .expect("static response"));
    }

    let path = req.uri().path().to_string();
    match (req.method().clone(), path.as_str()) {
        (Method::POST, "/verify") => verify(state, req).await,
        (Method::GET, "/ontologies") => Ok(json_response(
            StatusCode::OK,
            &json!({"ontologies": state.registry.list()}),
        )),
        (Method::POST, "/ontologies/reload") => Ok(json_response(
            StatusCode::OK,
            &json!({"ontologies": state.registry.reload()}),
        )),
        (Method::GET, p) if p.starts_with("/ontologies/") => {
            let name = p.trim_start_matches("/ontologies/");
            match state.registry.get_document(name) {
                Ok(doc) => Ok(json_response(StatusCode::OK, &doc)),
                Err(e) => Ok(ontology_error_response(e)),
            }
        }
        (Method::GET, "/health") => Ok(json_response(
            StatusCode::OK,
            &json!({
                "status": "ok",
                "service": "verdict",
                "version": env!("CARGO_PKG_VERSION"),
            }),
        )),
        (Method::GET, "/") => Ok(json_response(
            StatusCode::OK,
            &json!({
                "service": "verdict",
                "description": "SMT verification engine for LLM output",
                "version": env!("CARGO_PKG_VERSION"),
                "endpoints": {
                    "POST /verify": "Verify LLM output against an ontology",
                    "GET /ontologies": "List available ontologies",
                    "GET /ontologies/{name}": "Get an ontology document",
                    "POST /ontologies/reload": "Rebuild the ontology cache",
                    "GET /health": "Health check",
                },
            }),
        )),
        _ => Ok(json_response(
            StatusCode::NOT_FOUND,
            &json!({"error": "not found"}),
        )),
    }
}

async fn verify(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>> {
    let body = req
        .into_body()
        .collect()
        .await
        .context("failed to read request body")?
        .to_bytes();
    verify_payload(state, &body).await
}

async fn verify_payload(state: Arc<AppState>, body: &[u8]) -> Result<Response<Full<Bytes>>> {
    let request: VerifyRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(_) => {
            return Ok(json_response(
                StatusCode::BAD_REQUEST,
                &json!({"error": "Invalid JSON in request body"}),
            ))
        }
    };
    if request.llm_output.is_empty() {
        return Ok(json_response(
            StatusCode::BAD_REQUEST,
            &json!({"error": "llm_output is required"}),
        ));
    }

    let ontology = match state.registry.get(&request.ontology) {
        Ok(o) => o,
        Err(e) => return Ok(ontology_error_response(e)),
    };

    info!(
        ontology = %ontology.name,
        input_length = request.llm_output.len(),
        "verification request"
    );

    // The solver context lives on one blocking thread for the request.
    let verifier_state = Arc::clone(&state);
    let report = tokio::task::spawn_blocking(move || {
        verifier_state
            .verifier
            .verify(&ontology, &request.llm_output, &CancelToken::new())
    })
    .await
    .context("verification task panicked")?
    .context("verification aborted")?;

    Ok(json_response(StatusCode::OK, &report))
}

fn ontology_error_response(error: OntologyError) -> Response<Full<Bytes>> {
    let (status, kind) = match &error {
        OntologyError::UnknownOntology(_) => (StatusCode::NOT_FOUND, "unknown_ontology"),
        _ => (StatusCode::UNPROCESSABLE_ENTITY, "load_error"),
    };
    json_response(status, &json!({"error": error.to_string(), "type": kind}))
}

fn json_response(status: StatusCode, body: &impl serde::Serialize) -> Response<Full<Bytes>> {
    let payload = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(payload)))
        .expect("response assembles")
}

/// Pick the `Access-Control-Allow-Origin` value for a request origin.
fn cors_origin(origin: &str, allowed: &[String]) -> String {
    if allowed.iter().any(|a| a == origin) {
        return origin.to_string();
    }
    if allowed.iter().any(|a| a == "*") {
        return "*".to_string();
    }
    allowed.first().cloned().unwrap_or_default()
}

fn with_cors(mut response: Response<Full<Bytes>>, origin: &str) -> Response<Full<Bytes>> {
    let headers = response.headers_mut();
    if let Ok(value) = origin.parse() {
        headers.insert("Access-Control-Allow-Origin", value);
    }
    headers.insert(
        "Access-Control-Allow-Headers",
        "Content-Type,x-api-key,Authorization".parse().expect("static header"),
    );
    headers.insert(
        "Access-Control-Allow-Methods",
        "OPTIONS,POST,GET".parse().expect("static header"),
    );
    response
}

// ============================================================================
// Tests
// ============================================================================
