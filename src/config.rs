use crate::assets::Attributes;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Runtime configuration for the page server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub site_root: PathBuf,
    pub consent_config: Option<PathBuf>,
    pub web_base: String,
    #[serde(default)]
    pub extension_roots: HashMap<String, PathBuf>,
    pub enable_cors: bool,
    /// Fail the page with 500 when the consent configuration is invalid.
    pub strict_consent: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr: SocketAddr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .context("failed to parse BIND_ADDR")?;

        let site_root =
            PathBuf::from(std::env::var("SITE_ROOT").unwrap_or_else(|_| "public".to_string()));

        let consent_config = std::env::var("CONSENT_CONFIG").ok().map(PathBuf::from);

        let web_base = std::env::var("WEB_BASE").unwrap_or_else(|_| "/".to_string());

        let extension_roots = match std::env::var("EXTENSION_ROOTS_JSON") {
            Ok(raw) => serde_json::from_str::<HashMap<String, PathBuf>>(&raw)
                .context("failed to parse EXTENSION_ROOTS_JSON")?,
            Err(_) => HashMap::new(),
        };

        Ok(Self {
            bind_addr,
            site_root,
            consent_config,
            web_base,
            extension_roots,
            enable_cors: env_flag("ENABLE_CORS"),
            strict_consent: env_flag("CONSENT_STRICT"),
        })
    }

    /// Loads the consent configuration file, if one is configured.
    pub fn load_consent(&self) -> anyhow::Result<Option<ConsentConfig>> {
        self.consent_config
            .as_deref()
            .map(ConsentConfig::load)
            .transpose()
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Consent tool configuration as written by site integrators.
///
/// Fields that are validated when the configuration is applied are kept as
/// [`Scalar`] so a wrongly typed value surfaces as a configuration error with
/// a stable code instead of a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_id: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_version: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version2_type: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Scalar>,
    #[serde(default)]
    pub js_files: Vec<JsFileEntry>,
    #[serde(default)]
    pub js_inline: Vec<JsInlineEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsFileEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_service_processor: Option<Scalar>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub options: AssetOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsInlineEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Scalar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_service_processor: Option<Scalar>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub options: AssetOptions,
}

/// Per-asset options. Only `priority` is interpreted; other keys ride along.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Scalar>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Scalar>,
}

impl AssetOptions {
    pub fn prioritized() -> Self {
        Self {
            priority: Some(Scalar::Bool(true)),
            extra: BTreeMap::new(),
        }
    }

    /// Turns a truthy priority into a real boolean; falsy values stay as given.
    pub fn normalized(mut self) -> Self {
        if self.priority.as_ref().is_some_and(Scalar::is_truthy) {
            self.priority = Some(Scalar::Bool(true));
        }
        self
    }

    /// Strict match against the requested partition; an absent priority counts as `false`.
    pub fn priority_is(&self, priority: bool) -> bool {
        match &self.priority {
            None => !priority,
            Some(Scalar::Bool(value)) => *value == priority,
            Some(_) => false,
        }
    }

    /// Overlays `other` onto `self`, values from `other` winning.
    pub fn merge(&mut self, other: AssetOptions) {
        if other.priority.is_some() {
            self.priority = other.priority;
        }
        self.extra.extend(other.extra);
    }
}

/// A loosely typed configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    /// `false`, `0`, `0.0`, `""` and `"0"` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Scalar::Bool(b) => *b,
            Scalar::Integer(i) => *i != 0,
            Scalar::Float(f) => *f != 0.0,
            Scalar::Text(s) => !s.is_empty() && s != "0",
        }
    }

    /// Integer cast: strings contribute their leading integer (saturating at the
    /// `i64` bounds), non-numeric strings give 0.
    pub fn to_integer(&self) -> i64 {
        match self {
            Scalar::Bool(b) => i64::from(*b),
            Scalar::Integer(i) => *i,
            Scalar::Float(f) => f.trunc() as i64,
            Scalar::Text(s) => leading_integer(s),
        }
    }

    /// Textual form used for attribute values; `false` becomes empty.
    pub fn to_text(&self) -> String {
        match self {
            Scalar::Bool(true) => "1".to_string(),
            Scalar::Bool(false) => String::new(),
            Scalar::Integer(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

fn leading_integer(raw: &str) -> i64 {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| {
            let d = i64::from(d - b'0');
            if negative {
                acc.saturating_mul(10).saturating_sub(d)
            } else {
                acc.saturating_mul(10).saturating_add(d)
            }
        })
}

impl ConsentConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading consent config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_consent_config() {
        let cfg = ConsentConfig::from_toml_str(
            r#"
settingsId = "abc"
useVersion = "2"
version2Type = "legacy"
language = "de"

[[jsFiles]]
file = "EXT:site/tracking.js"
dataServiceProcessor = "Google Analytics"
attributes = { defer = "defer", crossorigin = "anonymous" }
options = { priority = 1, useNonce = true }

[[jsInline]]
value = "console.log(1)"
dataServiceProcessor = "analytics"
"#,
        )
        .expect("config");
        assert_eq!(cfg.settings_id, Some(Scalar::from("abc")));
        assert_eq!(cfg.use_version.as_ref().map(Scalar::to_integer), Some(2));
        assert_eq!(cfg.version2_type, Some(Scalar::from("legacy")));
        assert_eq!(cfg.js_files.len(), 1);
        let file = &cfg.js_files[0];
        assert_eq!(file.attributes.get("defer"), Some("defer"));
        let keys: Vec<_> = file.attributes.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["defer", "crossorigin"]);
        assert_eq!(file.options.priority, Some(Scalar::Integer(1)));
        assert_eq!(file.options.extra.get("useNonce"), Some(&Scalar::Bool(true)));
        assert_eq!(cfg.js_inline[0].value, Some(Scalar::from("console.log(1)")));
    }

    #[test]
    fn loads_demo_site_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/site/consent.toml");
        let cfg = ConsentConfig::load(&path).expect("demo config");
        assert_eq!(cfg.js_files.len(), 2);
        assert_eq!(cfg.js_inline.len(), 1);
        assert!(ConsentConfig::load(Path::new("does/not/exist.toml")).is_err());
    }

    #[test]
    fn wrongly_typed_settings_id_still_parses() {
        let cfg = ConsentConfig::from_toml_str("settingsId = 42").expect("config");
        assert_eq!(cfg.settings_id, Some(Scalar::Integer(42)));
        assert!(cfg.js_files.is_empty());
    }

    #[test]
    fn integer_cast_follows_leading_digits() {
        assert_eq!(Scalar::from("3").to_integer(), 3);
        assert_eq!(Scalar::from(" 2abc").to_integer(), 2);
        assert_eq!(Scalar::from("legacy").to_integer(), 0);
        assert_eq!(Scalar::from("-1").to_integer(), -1);
        assert_eq!(Scalar::Float(3.9).to_integer(), 3);
    }

    #[test]
    fn integer_cast_saturates_on_overflow() {
        assert_eq!(Scalar::from("99999999999999999999").to_integer(), i64::MAX);
        assert_eq!(Scalar::from("-99999999999999999999").to_integer(), i64::MIN);
        assert_eq!(Scalar::from("9223372036854775807").to_integer(), i64::MAX);
    }

    #[test]
    fn truthiness() {
        assert!(!Scalar::from("0").is_truthy());
        assert!(!Scalar::from("").is_truthy());
        assert!(!Scalar::Integer(0).is_truthy());
        assert!(Scalar::from("yes").is_truthy());
        assert!(Scalar::Integer(2).is_truthy());
    }

    #[test]
    fn priority_normalization_keeps_falsy_values() {
        let truthy = AssetOptions {
            priority: Some(Scalar::from("1")),
            ..Default::default()
        }
        .normalized();
        assert_eq!(truthy.priority, Some(Scalar::Bool(true)));
        assert!(truthy.priority_is(true));

        let falsy = AssetOptions {
            priority: Some(Scalar::Integer(0)),
            ..Default::default()
        }
        .normalized();
        assert_eq!(falsy.priority, Some(Scalar::Integer(0)));
        assert!(!falsy.priority_is(true));
        assert!(!falsy.priority_is(false));

        assert!(AssetOptions::default().priority_is(false));
    }
}
