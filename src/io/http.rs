//! Trip HTTP server
//!
//! Routes:
//! - `POST /trips` - segment a Latitude JSON feed (or KML with a KML content type)
//! - `GET /health` - liveness
//! - `GET /metrics` - Prometheus text format
//! - `GET /<file>` - static files from the configured web root
//!
//! Uses hyper http1 with one task per connection. Ingestion and segmentation
//! run on the blocking pool so large uploads never stall the accept loop or
//! other connections.

use crate::domain::Path;
use crate::infra::{Config, Metrics};
use crate::io::error::IngestError;
use crate::io::output::TripsResponse;
use crate::io::prometheus::format_prometheus_metrics;
use crate::io::{kml, latitude};
use crate::services::TripService;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::path::{Component, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Largest request body accepted on POST /trips
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

const KML_CONTENT_TYPE: &str = "application/vnd.google-earth.kml+xml";

/// Everything a request handler needs, shared across connections
pub struct AppState {
    pub service: TripService,
    pub metrics: Arc<Metrics>,
    pub web_root: Option<PathBuf>,
}

impl AppState {
    pub fn new(service: TripService, metrics: Arc<Metrics>, web_root: Option<PathBuf>) -> Self {
        Self { service, metrics, web_root }
    }
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail")
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "ok": false, "error": message });
    json_response(status, body.to_string().into_bytes())
}

fn not_found() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Full::new(Bytes::from("Not Found")))
        .expect("static response should not fail")
}

/// Route a fully buffered request
pub async fn route(req: Request<Bytes>, state: &Arc<AppState>) -> Response<Full<Bytes>> {
    match (req.method(), req.uri().path()) {
        (&Method::POST, "/trips") => handle_trips(&req, state).await,
        (&Method::OPTIONS, "/trips") => Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "POST, OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type")
            .body(Full::new(Bytes::from("")))
            .expect("static response should not fail"),
        (&Method::GET, "/health") => Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail"),
        (&Method::GET, "/metrics") => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")
            .body(Full::new(Bytes::from(format_prometheus_metrics(&state.metrics))))
            .expect("static response should not fail"),
        (&Method::GET, path) => serve_static(state.web_root.as_deref(), path).await,
        _ => not_found(),
    }
}

/// Parse the body and segment it into trips
fn segment_body(service: &TripService, body: &[u8], is_kml: bool) -> Result<Vec<Path>, IngestError> {
    let path = if is_kml { kml::parse_kml(body)? } else { latitude::parse_feed(body)? };
    debug!(events = %path.len(), kml = %is_kml, "path_ingested");
    Ok(service.segment(path)?)
}

async fn handle_trips(req: &Request<Bytes>, state: &Arc<AppState>) -> Response<Full<Bytes>> {
    let is_kml = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with(KML_CONTENT_TYPE));

    let body = req.body().clone();
    let worker = state.clone();
    let result = tokio::task::spawn_blocking(move || {
        segment_body(&worker.service, &body, is_kml)
            .map(|trips| serde_json::to_vec(&TripsResponse::from_paths(&trips)))
    })
    .await;

    match result {
        Ok(Ok(Ok(body))) => json_response(StatusCode::OK, body),
        Ok(Ok(Err(e))) => {
            error!(error = %e, "trips_serialize_error");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "serialization failed")
        }
        Ok(Err(e)) => {
            state.metrics.record_rejected();
            warn!(error = %e, "trips_request_rejected");
            error_response(StatusCode::BAD_REQUEST, &e.to_string())
        }
        Err(e) => {
            error!(error = %e, "trips_worker_failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "segmentation failed")
        }
    }
}

/// Map a request path onto the web root, refusing anything but plain names
fn resolve_static(web_root: &std::path::Path, request_path: &str) -> Option<PathBuf> {
    let relative = request_path.trim_start_matches('/');
    let relative = if relative.is_empty() { "index.html" } else { relative };

    let mut resolved = web_root.to_path_buf();
    for component in std::path::Path::new(relative).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            _ => return None,
        }
    }
    Some(resolved)
}

fn content_type_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("js") => "text/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("kml") => KML_CONTENT_TYPE,
        Some("png") => "image/png",
        Some("svg") => "image/svg+xml",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

async fn serve_static(web_root: Option<&std::path::Path>, request_path: &str) -> Response<Full<Bytes>> {
    let Some(web_root) = web_root else {
        return not_found();
    };
    let Some(file) = resolve_static(web_root, request_path) else {
        warn!(path = %request_path, "static_path_rejected");
        return not_found();
    };

    match tokio::fs::read(&file).await {
        Ok(contents) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, content_type_for(&file))
            .body(Full::new(Bytes::from(contents)))
            .expect("static response should not fail"),
        Err(e) => {
            debug!(path = %file.display(), error = %e, "static_file_unavailable");
            not_found()
        }
    }
}

/// Buffer the body, then route
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "request_body_rejected");
            state.metrics.record_rejected();
            if e.downcast_ref::<LengthLimitError>().is_some() {
                return Ok(error_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"));
            }
            return Ok(error_response(StatusCode::BAD_REQUEST, "request body unreadable"));
        }
    };
    Ok(route(Request::from_parts(parts, body), &state).await)
}

/// Bind the listener configured in `[server]`
pub async fn bind(config: &Config) -> anyhow::Result<TcpListener> {
    let addr = format!("{}:{}", config.bind_address(), config.port());
    let listener = TcpListener::bind(addr.as_str())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {addr}: {e}"))?;
    Ok(listener)
}

/// Accept connections until shutdown is signalled
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "trip_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "trip_server_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "trip_server_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("trip_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

/// Bind and serve in one step
pub async fn start_server(
    config: &Config,
    state: Arc<AppState>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = bind(config).await?;
    serve(listener, state, shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::TripSettings;
    use serde_json::Value;

    fn state_with(settings: TripSettings, web_root: Option<PathBuf>) -> Arc<AppState> {
        let metrics = Arc::new(Metrics::new());
        let service = TripService::new(settings, Some(metrics.clone()));
        Arc::new(AppState::new(service, metrics, web_root))
    }

    fn state(web_root: Option<PathBuf>) -> Arc<AppState> {
        state_with(TripSettings::default(), web_root)
    }

    fn request(method: Method, uri: &str, body: &str) -> Request<Bytes> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Bytes::from(body.to_string()))
            .unwrap()
    }

    async fn body_of(response: Response<Full<Bytes>>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    /// A 25 minute stop followed by a drive north
    fn feed() -> String {
        let mut items = Vec::new();
        for i in 0..=25 {
            let ts = (1500 + i * 60) * 1000;
            items.push(format!(r#"{{"latitude": 0.0, "longitude": 0.0, "timestampMs": {ts}}}"#));
        }
        for i in 0..10 {
            let ts = (3060 + i * 60) * 1000;
            items.push(format!(
                r#"{{"latitude": {}, "longitude": 0.0, "timestampMs": "{ts}"}}"#,
                0.01 * (i + 1) as f64
            ));
        }
        // newest first on the wire
        items.reverse();
        format!(r#"{{"data":{{"items":[{}]}}}}"#, items.join(","))
    }

    #[tokio::test]
    async fn test_post_trips() {
        let state = state(None);
        let response = route(request(Method::POST, "/trips", &feed()), &state).await;
        assert_eq!(response.status(), StatusCode::OK);

        let value: Value = serde_json::from_slice(&body_of(response).await).unwrap();
        let trips = value["trips"].as_array().unwrap();
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0]["events"].as_array().unwrap().len(), 10);
        assert!(trips[0]["info"]["traveled"].as_f64().unwrap() > 0.1);
        assert_eq!(state.metrics.runs_total(), 1);
    }

    #[tokio::test]
    async fn test_post_trips_bad_body() {
        let state = state(None);
        let response = route(request(Method::POST, "/trips", "{\"data\":"), &state).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let value: Value = serde_json::from_slice(&body_of(response).await).unwrap();
        assert_eq!(value["ok"], false);
        assert!(value["error"].as_str().unwrap().contains("JSON"));
        assert_eq!(state.metrics.rejected_total(), 1);
    }

    #[tokio::test]
    async fn test_post_trips_kml() {
        let state = state(None);
        let kml = r#"<kml><gx:Track>
            <when>2011-03-01T10:00:00Z</when>
            <when>2011-03-01T10:01:00Z</when>
            <gx:coord>0.0 0.0 0</gx:coord>
            <gx:coord>0.0 0.05 0</gx:coord>
        </gx:Track></kml>"#;
        let req = Request::builder()
            .method(Method::POST)
            .uri("/trips")
            .header(CONTENT_TYPE, KML_CONTENT_TYPE)
            .body(Bytes::from(kml))
            .unwrap();
        let response = route(req, &state).await;
        assert_eq!(response.status(), StatusCode::OK);

        let value: Value = serde_json::from_slice(&body_of(response).await).unwrap();
        assert_eq!(value["trips"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let state = state(None);
        let response = route(request(Method::GET, "/health", ""), &state).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, Bytes::from("ok"));

        let response = route(request(Method::GET, "/metrics", ""), &state).await;
        assert_eq!(response.status(), StatusCode::OK);
        let text = String::from_utf8(body_of(response).await.to_vec()).unwrap();
        assert!(text.contains("trips_requests_total 0"));
    }

    #[tokio::test]
    async fn test_health_answers_during_long_segmentation() {
        // two fixes at one spot, resampled every second into thousands of
        // co-located events
        let settings = TripSettings { interpolate_secs: Some(1.0), ..TripSettings::default() };
        let state = state_with(settings, None);
        let feed = r#"{"data":{"items":[
            {"latitude": 1.0, "longitude": 1.0, "timestampMs": 3000000},
            {"latitude": 1.0, "longitude": 1.0, "timestampMs": 0}
        ]}}"#;

        let trips_state = state.clone();
        let trips = tokio::spawn(async move {
            route(request(Method::POST, "/trips", feed), &trips_state).await
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let health = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            route(request(Method::GET, "/health", ""), &state),
        )
        .await
        .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
        assert!(!trips.is_finished());

        let response = trips.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value: Value = serde_json::from_slice(&body_of(response).await).unwrap();
        assert!(value["trips"].as_array().unwrap().is_empty());
        assert_eq!(state.metrics.runs_total(), 1);
    }

    #[tokio::test]
    async fn test_unknown_routes() {
        let state = state(None);
        let response = route(request(Method::GET, "/index.html", ""), &state).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = route(request(Method::DELETE, "/trips", ""), &state).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_static_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>trips</h1>").unwrap();
        std::fs::create_dir(dir.path().join("js")).unwrap();
        std::fs::write(dir.path().join("js/app.js"), "main()").unwrap();
        let state = state(Some(dir.path().to_path_buf()));

        let response = route(request(Method::GET, "/", ""), &state).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(body_of(response).await, Bytes::from("<h1>trips</h1>"));

        let response = route(request(Method::GET, "/js/app.js", ""), &state).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, Bytes::from("main()"));

        let response = route(request(Method::GET, "/missing.css", ""), &state).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_traversal_is_rejected() {
        let root = std::path::Path::new("/srv/web");
        assert_eq!(resolve_static(root, "/../etc/passwd"), None);
        assert_eq!(resolve_static(root, "/js/../../secret"), None);
        assert_eq!(resolve_static(root, "/a/./b"), Some(PathBuf::from("/srv/web/a/b")));
        assert_eq!(resolve_static(root, "/"), Some(PathBuf::from("/srv/web/index.html")));
    }
}
