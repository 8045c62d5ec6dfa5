//! Reference mapping between upstream URLs and proxy-local paths
//!
//! The local scheme embeds the original reference whole under a recognized
//! prefix, so "already rewritten" is a structural property of the path and
//! the reverse mapping needs no lookup table:
//!
//!   https://cdn.example/b.js  ->  /static/https://cdn.example/b.js?accountId=..&sessionId=..
//!   //cdn.example/b.js        ->  /static/https://cdn.example/b.js?accountId=..&sessionId=..
//!   /a.css?v=1                ->  /static/a.css?v=1&accountId=..&sessionId=..

use mirror_core::{MirrorError, MirrorResult, RewriteContext};
use url::Url;

pub const LOCAL_PREFIX: &str = "/static/";

/// References the rewriter must leave alone: fragments, inline data, and
/// non-http(s) schemes.
fn is_skippable(reference: &str) -> bool {
    reference.is_empty()
        || reference.starts_with('#')
        || reference.starts_with("data:")
        || reference.starts_with("blob:")
        || reference.starts_with("javascript:")
        || reference.starts_with("mailto:")
        || has_other_scheme(reference)
}

fn has_other_scheme(reference: &str) -> bool {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return false;
    }
    match reference.split_once(':') {
        Some((scheme, _)) => {
            let mut chars = scheme.chars();
            chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Map one reference to a proxy-local path tagged with the request's
/// identity. Already-local references pass through unchanged, which is what
/// makes the whole rewrite idempotent.
pub fn to_local(reference: &str, ctx: &RewriteContext) -> String {
    if reference.starts_with(LOCAL_PREFIX) || is_skippable(reference) {
        return reference.to_string();
    }

    let normalized = if let Some(rest) = reference.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        reference.to_string()
    };
    let embedded = normalized.strip_prefix('/').unwrap_or(&normalized);

    let separator = if embedded.contains('?') { '&' } else { '?' };
    format!(
        "{LOCAL_PREFIX}{embedded}{separator}accountId={}&sessionId={}",
        ctx.account_id, ctx.session_id
    )
}

/// Reverse rule: map the path captured after the local prefix back to a
/// fully-qualified upstream URL.
pub fn resolve_upstream(path: &str, base_url: &str) -> MirrorResult<String> {
    if path.starts_with("http://") || path.starts_with("https://") {
        return Ok(path.to_string());
    }
    if let Some(rest) = path.strip_prefix("//") {
        return Ok(format!("https://{rest}"));
    }

    let base = Url::parse(base_url)
        .map_err(|e| MirrorError::validation(format!("invalid base url {base_url}: {e}")))?;
    let joined = base
        .join(path.trim_start_matches('/'))
        .map_err(|e| MirrorError::validation(format!("unresolvable path {path}: {e}")))?;
    Ok(joined.to_string())
}

/// Re-attach leftover query parameters (the original query, minus the
/// identity tags the proxy consumed).
pub fn append_query(url: &str, pairs: &[(String, String)]) -> String {
    if pairs.is_empty() {
        return url.to_string();
    }
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{encoded}")
}
