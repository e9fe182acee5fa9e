use crate::assets::{Asset, AssetCollector, Attributes};
use crate::paths::WebPathResolver;
use std::borrow::Cow;
use std::collections::HashSet;

const ABSOLUTE_URL_MARKER: &str = "://";
const DEFAULT_SCRIPT_TYPE: &str = "text/javascript";

/// Serializes collected scripts into `<script>` tags.
///
/// Rendering only reads from the collector, so repeated calls yield the same markup.
pub struct AssetRenderer<'a> {
    collector: &'a AssetCollector,
    paths: &'a dyn WebPathResolver,
}

impl<'a> AssetRenderer<'a> {
    pub fn new(collector: &'a AssetCollector, paths: &'a dyn WebPathResolver) -> Self {
        Self { collector, paths }
    }

    pub fn render_inline_scripts(&self, priority: bool) -> String {
        render(self.collector.inline_scripts(), priority, |asset| {
            let mut attributes = asset.attributes.clone();
            attributes.insert_default("type", DEFAULT_SCRIPT_TYPE);
            format!(
                "<script{}>{}</script>",
                attribute_string(&attributes),
                asset.source
            )
        })
    }

    pub fn render_file_scripts(&self, priority: bool) -> String {
        render(self.collector.scripts(), priority, |asset| {
            let mut attributes = asset.attributes.clone();
            attributes.insert_default("type", DEFAULT_SCRIPT_TYPE);
            attributes.insert("src", self.script_src(&asset.source));
            format!("<script{}></script>", attribute_string(&attributes))
        })
    }

    fn script_src(&self, source: &str) -> String {
        if source.contains(ABSOLUTE_URL_MARKER) {
            return source.to_string();
        }
        self.paths.to_absolute_web_path(source)
    }
}

fn render(assets: &[Asset], priority: bool, tag: impl Fn(&Asset) -> String) -> String {
    assets
        .iter()
        .filter(|asset| asset.options.priority_is(priority))
        .map(tag)
        .collect::<Vec<_>>()
        .join("\n")
}

/// ` name="value"` pairs with a leading space, or nothing.
///
/// Names are lower-cased and the first occurrence wins; empty values are skipped.
fn attribute_string(attributes: &Attributes) -> String {
    let mut seen = HashSet::new();
    let mut out = String::new();
    for (name, value) in attributes.iter() {
        let name = name.to_ascii_lowercase();
        if value.is_empty() || !seen.insert(name.clone()) {
            continue;
        }
        out.push(' ');
        out.push_str(&name);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out
}

fn escape_attr(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '"', '\'', '<', '>']) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}
