//! Consent-tool asset pipeline: consent configuration is turned into
//! registered scripts, which are rendered into `<script>` tags and injected
//! into server-rendered pages.

pub mod api;
pub mod assets;
pub mod config;
pub mod inject;
pub mod paths;
pub mod renderer;
pub mod resolver;
pub mod routing;
pub mod server;
