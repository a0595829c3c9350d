//! Endpoint derivation between the REST base URL and the stream URL.

use url::Url;

use crate::errors::ConfigError;

/// Derives the telemetry WebSocket URL from the dashboard API base URL.
///
/// `http` maps to `ws`, `https` maps to `wss`, and `ws` is joined onto the
/// base path: `https://eco.example/api/` becomes `wss://eco.example/api/ws`.
pub fn stream_url_from_api_base(base: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(base).map_err(|e| ConfigError::InvalidEndpoint {
        endpoint: base.to_string(),
        reason: e.to_string(),
    })?;

    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    };
    // http(s) -> ws(s) stays within the "special" scheme family, so this cannot fail.
    url.set_scheme(scheme)
        .map_err(|_| ConfigError::UnsupportedScheme(scheme.to_string()))?;

    ensure_trailing_slash(&mut url);
    url.join("ws").map_err(|e| ConfigError::InvalidEndpoint {
        endpoint: base.to_string(),
        reason: e.to_string(),
    })
}

/// Makes `Url::join` append to the last path segment instead of replacing it.
pub(crate) fn ensure_trailing_slash(url: &mut Url) {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
}
