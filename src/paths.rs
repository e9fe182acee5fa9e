use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::warn;
use url::Url;

const EXTENSION_PREFIX: &str = "EXT:";

/// Maps a local asset path to the path a browser should request.
pub trait WebPathResolver: Send + Sync {
    /// Returns an empty string when the path cannot be published.
    fn to_absolute_web_path(&self, local_path: &str) -> String;
}

/// Resolves paths below a public document root.
///
/// `EXT:<key>/<file>` references are looked up in `extension_roots`, whose
/// values are directories relative to the public root.
#[derive(Debug, Clone)]
pub struct PublicPathResolver {
    public_root: PathBuf,
    web_base: String,
    extension_roots: HashMap<String, PathBuf>,
}

impl PublicPathResolver {
    pub fn new(public_root: impl Into<PathBuf>, web_base: impl Into<String>) -> Self {
        let mut web_base = web_base.into();
        if !web_base.ends_with('/') {
            web_base.push('/');
        }
        Self {
            public_root: normalize(&public_root.into()),
            web_base,
            extension_roots: HashMap::new(),
        }
    }

    pub fn with_extension_roots(mut self, roots: HashMap<String, PathBuf>) -> Self {
        self.extension_roots = roots;
        self
    }

    /// Location of `local_path` relative to the public root, if it stays inside it.
    fn relative_location(&self, local_path: &str) -> Option<PathBuf> {
        if let Some(reference) = local_path.strip_prefix(EXTENSION_PREFIX) {
            let (key, rest) = reference.split_once('/').unwrap_or((reference, ""));
            let Some(root) = self.extension_roots.get(key) else {
                warn!(extension = key, "unknown extension in asset path");
                return None;
            };
            return clamp(&normalize(&root.join(rest)));
        }

        let path = Path::new(local_path);
        if path.is_absolute() {
            let normalized = normalize(path);
            return match normalized.strip_prefix(&self.public_root) {
                Ok(relative) => clamp(relative),
                Err(_) => None,
            };
        }
        clamp(&normalize(path))
    }

    fn publish(&self, relative: &Path) -> String {
        let web_relative = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        match Url::parse(&self.web_base) {
            Ok(base) => base
                .join(&web_relative)
                .map(String::from)
                .unwrap_or_else(|_| format!("{}{web_relative}", self.web_base)),
            Err(_) => format!("{}{web_relative}", self.web_base),
        }
    }
}

impl WebPathResolver for PublicPathResolver {
    fn to_absolute_web_path(&self, local_path: &str) -> String {
        match self.relative_location(local_path) {
            Some(relative) => self.publish(&relative),
            None => {
                warn!(path = local_path, "asset path outside the public root");
                String::new()
            }
        }
    }
}

/// Lexical normalization; leading `..` components are kept so callers can reject them.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn clamp(relative: &Path) -> Option<PathBuf> {
    if relative
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        return None;
    }
    Some(relative.to_path_buf())
}
