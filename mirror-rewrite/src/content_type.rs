//! Content-type inference
//!
//! Upstream responses sometimes omit Content-Type or report one that is
//! implausible for the requested path (`text/html` for a `.js` asset is the
//! classic case when a challenge page leaks through). The extension table
//! wins whenever the upstream value is implausible.

const DEFAULT_BINARY: &str = "application/octet-stream";

fn extension_mime(extension: &str) -> Option<&'static str> {
    let mime = match extension {
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "html" | "htm" => "text/html",
        "xml" => "application/xml",
        "txt" => "text/plain",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        "wasm" => "application/wasm",
        _ => return None,
    };
    Some(mime)
}

fn path_extension(path: &str) -> Option<&str> {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let file = path.rsplit('/').next().unwrap_or(path);
    let (_, extension) = file.rsplit_once('.')?;
    if extension.is_empty() {
        None
    } else {
        Some(extension)
    }
}

fn plausible(upstream: &str, expected: &str) -> bool {
    let bare = upstream
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    if bare == expected {
        return true;
    }
    match expected {
        "application/javascript" => bare.contains("javascript") || bare.contains("ecmascript"),
        _ => {
            // image/jpg vs image/jpeg and the like.
            expected.starts_with("image/") && bare.starts_with("image/")
        }
    }
}

/// Pick the Content-Type to serve for a proxied asset.
pub fn infer_content_type(path: &str, upstream: Option<&str>) -> String {
    let expected = path_extension(path)
        .map(|e| e.to_ascii_lowercase())
        .and_then(|e| extension_mime(&e));

    match (upstream, expected) {
        (Some(upstream), Some(expected)) if plausible(upstream, expected) => upstream.to_string(),
        (_, Some(expected)) => expected.to_string(),
        (Some(upstream), None) => upstream.to_string(),
        (None, None) => DEFAULT_BINARY.to_string(),
    }
}

/// Font assets get permissive CORS so cross-origin @font-face loads work.
pub fn is_font_path(path: &str) -> bool {
    matches!(
        path_extension(path).map(|e| e.to_ascii_lowercase()).as_deref(),
        Some("woff" | "woff2" | "ttf" | "otf" | "eot")
    )
}
