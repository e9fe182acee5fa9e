use anyhow::Context;
use percent_encoding::percent_decode_str;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

#[derive(Debug, PartialEq, Eq)]
pub enum RouteDecision {
    /// An HTML page that receives consent assets.
    Page(PathBuf),
    /// Anything else under the site root; handed to the static file service.
    Static,
    NotFound,
}

/// Maps a raw (percent-encoded) request path onto the site root.
pub async fn resolve_route(site_root: &Path, path: &str) -> RouteDecision {
    let Ok(decoded) = percent_decode_str(path).decode_utf8() else {
        return RouteDecision::NotFound;
    };
    let Some(relative) = sanitize(&decoded) else {
        return RouteDecision::NotFound;
    };
    let candidate = site_root.join(&relative);

    let page = match fs::metadata(&candidate).await {
        Ok(meta) if meta.is_dir() => candidate.join("index.html"),
        Ok(_) if is_html(&candidate) => candidate,
        Ok(_) => return RouteDecision::Static,
        Err(_) => return RouteDecision::NotFound,
    };
    match fs::metadata(&page).await {
        Ok(meta) if meta.is_file() => RouteDecision::Page(page),
        _ => RouteDecision::NotFound,
    }
}

pub async fn load_html(page: &Path) -> anyhow::Result<String> {
    fs::read_to_string(page)
        .await
        .with_context(|| format!("reading html {page:?}"))
}

fn sanitize(path: &str) -> Option<PathBuf> {
    let trimmed = path.trim_start_matches('/');
    let mut out = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(out)
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
}
