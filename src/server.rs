use crate::api;
use crate::assets::AssetCollector;
use crate::config::{AppConfig, ConsentConfig};
use crate::inject::{PageAssets, inject_assets};
use crate::paths::{PublicPathResolver, WebPathResolver};
use crate::renderer::AssetRenderer;
use crate::resolver::{ConfigResolver, ConfigurationError, PageContext};
use crate::routing::{RouteDecision, load_html, resolve_route};
use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared, read-only state. Per-page data never lives here.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub consent: Option<Arc<ConsentConfig>>,
    pub paths: Arc<dyn WebPathResolver>,
}

impl AppState {
    pub fn new(config: AppConfig, consent: Option<ConsentConfig>) -> Self {
        let paths = PublicPathResolver::new(&config.site_root, config.web_base.clone())
            .with_extension_roots(config.extension_roots.clone());
        Self {
            config: Arc::new(config),
            consent: consent.map(Arc::new),
            paths: Arc::new(paths),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/consent/config", get(api::get_consent_config))
        .fallback(serve_page)
        .layer(TraceLayer::new_for_http());
    if state.config.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }
    router.with_state(state)
}

pub async fn run(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, root = %state.config.site_root.display(), "listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn host_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(|h| h.split(':').next().unwrap_or(h).to_string())
}

async fn serve_page(State(state): State<AppState>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    match resolve_route(&state.config.site_root, &path).await {
        RouteDecision::Page(page) => match load_html(&page).await {
            Ok(html) => render_page(&state, &path, html),
            Err(err) => {
                error!(?err, %path, "failed to load page");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
        RouteDecision::Static => {
            match ServeDir::new(&state.config.site_root).oneshot(request).await {
                Ok(response) => response.into_response(),
                Err(never) => match never {},
            }
        }
        RouteDecision::NotFound => StatusCode::NOT_FOUND.into_response(),
    }
}

/// One render pass: fresh collector, register, render, inject.
fn render_page(state: &AppState, route: &str, html: String) -> Response {
    let ctx = PageContext::new(route, state.consent.as_deref());
    let mut collector = AssetCollector::new();
    if let Err(err) = ConfigResolver::new(&mut collector).apply(&ctx) {
        log_configuration_error(&err, route);
        if state.config.strict_consent {
            return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
        }
    }

    let renderer = AssetRenderer::new(&collector, state.paths.as_ref());
    let assets = PageAssets::render(&renderer);
    match inject_assets(html.clone(), &assets) {
        Ok(page) => Html(page).into_response(),
        Err(err) => {
            warn!(?err, route, "failed to inject consent assets; serving page as is");
            Html(html).into_response()
        }
    }
}

fn log_configuration_error(err: &ConfigurationError, route: &str) {
    error!(code = err.code(), route, "{err}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use std::collections::HashMap;

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("index.html"),
            "<html><head><title>home</title></head><body><main>hi</main></body></html>",
        )
        .unwrap();
        std::fs::create_dir(dir.path().join("js")).unwrap();
        std::fs::write(dir.path().join("js/app.js"), "console.log('app')").unwrap();
        dir
    }

    fn state(root: &std::path::Path, consent: Option<&str>, strict: bool) -> AppState {
        let config = AppConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            site_root: root.to_path_buf(),
            consent_config: None,
            web_base: "/".into(),
            extension_roots: HashMap::new(),
            enable_cors: false,
            strict_consent: strict,
        };
        let consent = consent.map(|raw| ConsentConfig::from_toml_str(raw).expect("toml"));
        AppState::new(config, consent)
    }

    async fn get_body(state: AppState, uri: &str) -> (StatusCode, String) {
        let response = router(state)
            .oneshot(axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    const CONSENT: &str = r#"
settingsId = "abc"
useVersion = 3

[[jsFiles]]
file = "js/app.js"
dataServiceProcessor = "App"
options = { priority = true }

[[jsInline]]
value = "track()"
dataServiceProcessor = "analytics"
"#;

    #[tokio::test]
    async fn injects_assets_into_pages() {
        let dir = site();
        let (status, body) = get_body(state(dir.path(), Some(CONSENT), false), "/").await;
        assert_eq!(status, StatusCode::OK);
        let head_end = body.find("</head>").unwrap();
        let app = body.find("src=\"/js/app.js\"").unwrap();
        assert!(app < head_end);
        let loader = body.find("loader.js").unwrap();
        let inline = body.find("track()").unwrap();
        assert!(head_end < loader && loader < inline);
        assert!(body.contains("data-usercentrics=\"analytics\""));
    }

    #[tokio::test]
    async fn pages_pass_through_without_consent_config() {
        let dir = site();
        let (status, body) = get_body(state(dir.path(), None, false), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<main>hi</main>"));
        assert!(!body.contains("<script"));
    }

    #[tokio::test]
    async fn static_files_are_served_verbatim() {
        let dir = site();
        let (status, body) = get_body(state(dir.path(), Some(CONSENT), false), "/js/app.js").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "console.log('app')");
    }

    #[tokio::test]
    async fn invalid_config_degrades_to_partial_injection() {
        let dir = site();
        let broken = "settingsId = \"abc\"\nuseVersion = 3\n[[jsFiles]]\nfile = \"js/app.js\"\n";
        let (status, body) = get_body(state(dir.path(), Some(broken), false), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("loader.js"));
        assert!(!body.contains("/js/app.js"));
    }

    #[tokio::test]
    async fn strict_mode_fails_the_page() {
        let dir = site();
        let (status, body) = get_body(state(dir.path(), Some("useVersion = 3"), true), "/").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("Usercentrics ID not configured"));
    }

    #[tokio::test]
    async fn serves_percent_encoded_pages_with_verbatim_tags() {
        let dir = site();
        std::fs::write(
            dir.path().join("about us.html"),
            "<html><head></head><body><p>us</p></body></html>",
        )
        .unwrap();
        let (status, body) =
            get_body(state(dir.path(), Some(CONSENT), false), "/about%20us.html").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(
            "<script data-settings-id=\"abc\" id=\"usercentrics-cmp\" async=\"async\" type=\"text/javascript\" src=\"https://app.usercentrics.eu/browser-ui/latest/loader.js\"></script>"
        ));
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let dir = site();
        let (status, _) = get_body(state(dir.path(), None, false), "/nope.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn exposes_consent_config() {
        let dir = site();
        let (status, body) =
            get_body(state(dir.path(), Some(CONSENT), false), "/api/consent/config").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["configured"], true);
        assert_eq!(json["config"]["settingsId"], "abc");
        assert_eq!(json["config"]["jsFiles"][0]["dataServiceProcessor"], "App");
    }

    #[test]
    fn strips_port_from_host_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "example.com:8080".parse().unwrap());
        assert_eq!(host_from_headers(&headers).as_deref(), Some("example.com"));
    }
}
