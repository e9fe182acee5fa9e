use crate::renderer::AssetRenderer;
use kuchiki::traits::*;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum InjectError {
    #[error("html manipulation failed: {0}")]
    Html(String),
}

/// Rendered markup for the two injection points of a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageAssets {
    /// Priority scripts, appended to `<head>`.
    pub head: String,
    /// Everything else, appended to the end of `<body>`.
    pub body: String,
}

impl PageAssets {
    pub fn render(renderer: &AssetRenderer<'_>) -> Self {
        Self {
            head: join_fragments([
                renderer.render_file_scripts(true),
                renderer.render_inline_scripts(true),
            ]),
            body: join_fragments([
                renderer.render_file_scripts(false),
                renderer.render_inline_scripts(false),
            ]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_empty() && self.body.is_empty()
    }
}

fn join_fragments(parts: [String; 2]) -> String {
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inserts the rendered tags verbatim right before `</head>` and `</body>`.
///
/// Pages without explicit closing tags are normalized through the HTML
/// parser first; the injected markup itself never goes through it.
pub fn inject_assets(html: String, assets: &PageAssets) -> Result<String, InjectError> {
    if assets.is_empty() {
        return Ok(html);
    }

    let mut page = if closing_tag(&html, "head").is_some() && closing_tag(&html, "body").is_some()
    {
        html
    } else {
        debug!("page lacks explicit head/body closing tags; normalizing");
        kuchiki::parse_html().one(html).to_string()
    };
    if !assets.head.is_empty() {
        insert_before_closing(&mut page, "head", &assets.head)?;
    }
    if !assets.body.is_empty() {
        insert_before_closing(&mut page, "body", &assets.body)?;
    }
    Ok(page)
}

/// Byte offset of the first `</head>` or the last `</body>`, ASCII case-insensitive.
fn closing_tag(html: &str, tag: &str) -> Option<usize> {
    let needle = format!("</{tag}>");
    let lowered = html.to_ascii_lowercase();
    if tag == "head" {
        lowered.find(&needle)
    } else {
        lowered.rfind(&needle)
    }
}

fn insert_before_closing(page: &mut String, tag: &str, markup: &str) -> Result<(), InjectError> {
    let offset = closing_tag(page, tag)
        .ok_or_else(|| InjectError::Html(format!("no </{tag}> in page")))?;
    debug!(tag, offset, "injecting consent assets");
    page.insert_str(offset, &format!("{markup}\n"));
    Ok(())
}
