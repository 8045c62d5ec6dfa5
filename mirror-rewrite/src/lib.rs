//! mirror-rewrite
//!
//! Transforms fetched HTML/CSS so every embedded reference points back at
//! the proxy tagged with the requesting identity, injects the client-side
//! interception bootstrap, and infers plausible content types for proxied
//! assets.

pub mod bootstrap;
pub mod content_type;
mod css;
mod html;
pub mod refs;

pub use content_type::{infer_content_type, is_font_path};
pub use refs::{append_query, resolve_upstream, to_local, LOCAL_PREFIX};

use mirror_core::{MirrorError, MirrorResult, RewriteContext};
use regex::Regex;

pub struct RewriteEngine {
    css_url: Regex,
}

impl RewriteEngine {
    pub fn new() -> MirrorResult<Self> {
        let css_url = Regex::new(css::CSS_URL_PATTERN)
            .map_err(|e| MirrorError::internal(format!("invalid css url pattern: {e}")))?;
        Ok(Self { css_url })
    }

    /// Rewrite a full HTML document; idempotent for already-rewritten input.
    pub fn rewrite_html(&self, html: &str, ctx: &RewriteContext) -> MirrorResult<String> {
        html::rewrite_html(html, ctx)
    }

    /// Rewrite every `url(...)` reference in a stylesheet; idempotent.
    pub fn rewrite_css(&self, css: &str, ctx: &RewriteContext) -> String {
        css::rewrite_css(&self.css_url, css, ctx)
    }
}
