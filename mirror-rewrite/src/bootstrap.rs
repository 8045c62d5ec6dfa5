//! Client-side interception bootstrap
//!
//! A script injected once per rewritten page that mirrors the server-side
//! reference mapping at call time: dynamic `fetch`/XHR targets are rewritten
//! to the local scheme and tagged with the account/session identity headers.
//! This covers resources referenced only by runtime-generated code.

use mirror_core::RewriteContext;

/// Marker attribute; the HTML rewriter checks for it before injecting so a
/// second pass over already-rewritten markup adds nothing.
pub const BOOTSTRAP_MARKER: &str = "data-mirror-bootstrap";

pub fn bootstrap_script(ctx: &RewriteContext) -> String {
    // JSON-encode the identifiers so they land as safe JS string literals.
    let account = serde_json::to_string(&ctx.account_id).unwrap_or_default();
    let session = serde_json::to_string(&ctx.session_id).unwrap_or_default();

    format!(
        r#"<script {BOOTSTRAP_MARKER}>
(function () {{
  var ACCOUNT = {account};
  var SESSION = {session};
  var PREFIX = "/static/";
  function toLocal(url) {{
    if (typeof url !== "string" || url.indexOf(PREFIX) === 0) return url;
    if (/^(#|data:|blob:|javascript:|mailto:)/.test(url)) return url;
    if (url.indexOf("/api/") === 0) return url;
    var target = url;
    if (target.indexOf("//") === 0) target = "https:" + target;
    if (target.charAt(0) === "/") target = target.slice(1);
    var sep = target.indexOf("?") === -1 ? "?" : "&";
    return PREFIX + target + sep + "accountId=" + ACCOUNT + "&sessionId=" + SESSION;
  }}
  var originalFetch = window.fetch;
  window.fetch = function (input, init) {{
    init = init || {{}};
    var headers = new Headers(init.headers || {{}});
    headers.set("X-Mirror-Account-Id", ACCOUNT);
    headers.set("X-Mirror-Session-Id", SESSION);
    init.headers = headers;
    var url = typeof input === "string" ? input : input.url;
    return originalFetch.call(window, toLocal(url), init);
  }};
  var originalOpen = XMLHttpRequest.prototype.open;
  XMLHttpRequest.prototype.open = function (method, url) {{
    arguments[1] = toLocal(url);
    this.__mirrorTagged = true;
    return originalOpen.apply(this, arguments);
  }};
  var originalSend = XMLHttpRequest.prototype.send;
  XMLHttpRequest.prototype.send = function () {{
    if (this.__mirrorTagged) {{
      this.setRequestHeader("X-Mirror-Account-Id", ACCOUNT);
      this.setRequestHeader("X-Mirror-Session-Id", SESSION);
    }}
    return originalSend.apply(this, arguments);
  }};
}})();
</script>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_carries_marker_and_identity() {
        let ctx = RewriteContext {
            account_id: "X42".to_string(),
            session_id: "s-\"1\"".to_string(),
            base_url: "https://app.example.com".to_string(),
        };
        let script = bootstrap_script(&ctx);
        assert!(script.contains(BOOTSTRAP_MARKER));
        assert!(script.contains(r#"var ACCOUNT = "X42";"#));
        // The quoted session id is escaped, not spliced raw.
        assert!(script.contains(r#"var SESSION = "s-\"1\"";"#));
    }
}
