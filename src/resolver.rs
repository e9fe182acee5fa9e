use crate::assets::{AssetCollector, Attributes};
use crate::config::{AssetOptions, ConsentConfig, JsFileEntry, JsInlineEntry, Scalar};
use std::fmt;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Identifier of the consent tool script itself.
pub const MAIN_SCRIPT_ID: &str = "usercentrics";

const MAIN_JS_V1: &str = "https://app.usercentrics.eu/latest/main.js";
const BUNDLE_JS_V2: &str = "https://app.usercentrics.eu/browser-ui/latest/bundle.js";
const BUNDLE_LEGACY_JS_V2: &str = "https://app.usercentrics.eu/browser-ui/latest/bundle_legacy.js";
const LOADER_JS_V3: &str = "https://app.usercentrics.eu/browser-ui/latest/loader.js";
const CMP_ELEMENT_ID: &str = "usercentrics-cmp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Inline,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => f.write_str("file"),
            EntryKind::Inline => f.write_str("inline JS"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Usercentrics ID not configured, please set settingsId in the consent configuration")]
    MissingSettingsId,
    #[error("No valid file given for jsFiles entry {index}, please check the consent configuration")]
    InvalidFile { index: usize },
    #[error(
        "No valid identifier given for {kind} entry {index}, please check the consent configuration"
    )]
    InvalidDataServiceProcessor { kind: EntryKind, index: usize },
}

impl ConfigurationError {
    /// Stable numeric code for log correlation.
    pub fn code(&self) -> u64 {
        match self {
            ConfigurationError::MissingSettingsId => 1583774571,
            ConfigurationError::InvalidFile { .. } => 1583774682,
            ConfigurationError::InvalidDataServiceProcessor {
                kind: EntryKind::File,
                ..
            } => 1583774683,
            ConfigurationError::InvalidDataServiceProcessor {
                kind: EntryKind::Inline,
                ..
            } => 1583774685,
        }
    }
}

/// Everything the resolver needs to know about the page being rendered.
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    pub route: &'a str,
    pub consent: Option<&'a ConsentConfig>,
}

impl<'a> PageContext<'a> {
    pub fn new(route: &'a str, consent: Option<&'a ConsentConfig>) -> Self {
        Self { route, consent }
    }
}

/// Registers the consent tool and its guarded scripts into a collector.
pub struct ConfigResolver<'a> {
    collector: &'a mut AssetCollector,
}

impl<'a> ConfigResolver<'a> {
    pub fn new(collector: &'a mut AssetCollector) -> Self {
        Self { collector }
    }

    /// Registers the main script, then `jsFiles`, then `jsInline`.
    ///
    /// A failing entry aborts the pass but leaves earlier registrations in
    /// the collector.
    pub fn apply(&mut self, ctx: &PageContext<'_>) -> Result<(), ConfigurationError> {
        let Some(config) = ctx.consent else {
            debug!(route = ctx.route, "no consent configuration for page");
            return Ok(());
        };
        let settings_id = config
            .settings_id
            .as_ref()
            .and_then(Scalar::as_str)
            .ok_or(ConfigurationError::MissingSettingsId)?;

        self.add_main_script(config, settings_id);
        self.add_js_files(&config.js_files)?;
        self.add_inline_scripts(&config.js_inline)?;
        Ok(())
    }

    fn add_main_script(&mut self, config: &ConsentConfig, settings_id: &str) {
        let language = config
            .language
            .as_ref()
            .map(Scalar::to_text)
            .unwrap_or_default();
        let version = config
            .use_version
            .as_ref()
            .map(Scalar::to_integer)
            .unwrap_or(0);

        let (source, attributes): (&str, Attributes) = match version {
            1 => (
                MAIN_JS_V1,
                [
                    ("type", "application/javascript"),
                    ("id", settings_id),
                    ("language", language.as_str()),
                ]
                .into_iter()
                .collect(),
            ),
            2 => {
                let legacy = config
                    .version2_type
                    .as_ref()
                    .is_some_and(|t| t.to_text() == "legacy");
                let source = if legacy {
                    BUNDLE_LEGACY_JS_V2
                } else {
                    BUNDLE_JS_V2
                };
                (
                    source,
                    [
                        ("data-settings-id", settings_id),
                        ("id", CMP_ELEMENT_ID),
                        ("language", language.as_str()),
                        ("async", "async"),
                    ]
                    .into_iter()
                    .collect(),
                )
            }
            3 => (
                LOADER_JS_V3,
                [
                    ("data-settings-id", settings_id),
                    ("id", CMP_ELEMENT_ID),
                    ("async", "async"),
                ]
                .into_iter()
                .collect(),
            ),
            other => {
                debug!(version = other, "unsupported useVersion; main script skipped");
                return;
            }
        };

        debug!(version, %source, "registering consent tool script");
        self.collector
            .add_script(MAIN_SCRIPT_ID, source, attributes, AssetOptions::default());
    }

    fn add_js_files(&mut self, entries: &[JsFileEntry]) -> Result<(), ConfigurationError> {
        for (index, entry) in entries.iter().enumerate() {
            let file = entry
                .file
                .as_ref()
                .and_then(Scalar::as_str)
                .ok_or(ConfigurationError::InvalidFile { index })?;
            let processor = data_service_processor(
                entry.data_service_processor.as_ref(),
                EntryKind::File,
                index,
            )?;
            let identifier = unique_identifier(processor);
            debug!(%identifier, file, "registering guarded script file");
            self.collector.add_script(
                identifier,
                file,
                guarded_attributes(&entry.attributes, processor),
                entry.options.clone().normalized(),
            );
        }
        Ok(())
    }

    fn add_inline_scripts(&mut self, entries: &[JsInlineEntry]) -> Result<(), ConfigurationError> {
        for (index, entry) in entries.iter().enumerate() {
            let code = entry.value.as_ref().map(Scalar::to_text).unwrap_or_default();
            let processor = data_service_processor(
                entry.data_service_processor.as_ref(),
                EntryKind::Inline,
                index,
            )?;
            let identifier = unique_identifier(processor);
            debug!(%identifier, "registering guarded inline script");
            self.collector.add_inline_script(
                identifier,
                code,
                guarded_attributes(&entry.attributes, processor),
                entry.options.clone().normalized(),
            );
        }
        Ok(())
    }
}

fn data_service_processor(
    value: Option<&Scalar>,
    kind: EntryKind,
    index: usize,
) -> Result<&str, ConfigurationError> {
    value
        .and_then(Scalar::as_str)
        .ok_or(ConfigurationError::InvalidDataServiceProcessor { kind, index })
}

/// Caller attributes plus the pair that hands the element over to the consent tool.
fn guarded_attributes(attributes: &Attributes, processor: &str) -> Attributes {
    let mut attributes = attributes.clone();
    attributes.insert("type", "text/plain");
    attributes.insert("data-usercentrics", processor);
    attributes
}

fn unique_identifier(processor: &str) -> String {
    format!("{processor}-{}", Uuid::new_v4().simple())
}
