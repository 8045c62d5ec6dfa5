//! CSS reference rewriting
//!
//! Rewrites every `url(...)` token through the local reference scheme.
//! `data:` URLs and already-local references pass through untouched via the
//! same skip rules as the HTML rewriter.

use crate::refs;
use mirror_core::RewriteContext;
use regex::{Captures, Regex};

pub(crate) const CSS_URL_PATTERN: &str = r#"url\(\s*(['"]?)([^'")]*)['"]?\s*\)"#;

pub(crate) fn rewrite_css(pattern: &Regex, css: &str, ctx: &RewriteContext) -> String {
    pattern
        .replace_all(css, |caps: &Captures<'_>| {
            let quote = &caps[1];
            let reference = caps[2].trim();
            format!("url({quote}{}{quote})", refs::to_local(reference, ctx))
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RewriteContext {
        RewriteContext {
            account_id: "A1".to_string(),
            session_id: "s-1".to_string(),
            base_url: "https://app.example.com".to_string(),
        }
    }

    fn pattern() -> Regex {
        Regex::new(CSS_URL_PATTERN).unwrap()
    }

    #[test]
    fn rewrites_font_url_and_is_idempotent() {
        let css = "@font-face { src: url(/fonts/f.woff2); }";
        let once = rewrite_css(&pattern(), css, &ctx());
        assert_eq!(
            once,
            "@font-face { src: url(/static/fonts/f.woff2?accountId=A1&sessionId=s-1); }"
        );
        let twice = rewrite_css(&pattern(), &once, &ctx());
        assert_eq!(twice, once);
    }

    #[test]
    fn handles_quotes_and_preserves_query() {
        let css = r#"background: url("//cdn.example/bg.png?v=2");"#;
        let out = rewrite_css(&pattern(), css, &ctx());
        assert_eq!(
            out,
            r#"background: url("/static/https://cdn.example/bg.png?v=2&accountId=A1&sessionId=s-1");"#
        );
    }

    #[test]
    fn data_urls_are_untouched() {
        let css = "background: url(data:image/png;base64,AAAA);";
        assert_eq!(rewrite_css(&pattern(), css, &ctx()), css);
    }
}
