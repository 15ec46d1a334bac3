// Connectivity probe
//
// Cheap pre-flight request made before any pattern runs. A failure here is
// the only per-run fatal error: nothing has been dispatched yet, so the run
// stops with a single descriptive error.

use std::time::Duration;

use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode, Url};

use crate::error::{BenchError, Result};
use crate::protocol::MODELS_PATH;

/// Join an API path onto a base URL, keeping any path prefix of the base
pub fn endpoint_url(base_url: &Url, path: &str) -> Result<Url> {
    let joined = format!("{}{}", base_url.as_str().trim_end_matches('/'), path);
    Url::parse(&joined).map_err(|e| BenchError::config(format!("invalid URL {}: {}", joined, e)))
}

/// Check that `GET {base}/v1/models` answers with 200 or 401.
///
/// An `http://` base that redirects to `https://` is switched to HTTPS and
/// probed once more. Returns the base URL the run should use.
pub async fn probe_endpoint(base_url: &Url, credential: &str, timeout: Duration) -> Result<Url> {
    let client = Client::builder()
        .redirect(Policy::none())
        .timeout(timeout)
        .build()?;

    match probe_once(&client, base_url, credential).await? {
        ProbeStatus::Reachable => Ok(base_url.clone()),
        ProbeStatus::Redirect(location) => {
            let https_base = https_base_from_redirect(base_url, &location).ok_or_else(|| {
                BenchError::connectivity(
                    base_url.as_str(),
                    format!("unexpected redirect to {}", location),
                )
            })?;
            tracing::info!(from = %base_url, to = %https_base, "Endpoint redirects to HTTPS, switching");

            match probe_once(&client, &https_base, credential).await? {
                ProbeStatus::Reachable => Ok(https_base),
                ProbeStatus::Redirect(location) => Err(BenchError::connectivity(
                    https_base.as_str(),
                    format!("redirected again to {}", location),
                )),
            }
        }
    }
}

enum ProbeStatus {
    Reachable,
    Redirect(String),
}

async fn probe_once(client: &Client, base_url: &Url, credential: &str) -> Result<ProbeStatus> {
    let url = endpoint_url(base_url, MODELS_PATH)?;

    let mut request = client.get(url.clone());
    if !credential.is_empty() {
        request = request.bearer_auth(credential);
    }

    let response = request
        .send()
        .await
        .map_err(|e| BenchError::connectivity(url.as_str(), e.to_string()))?;
    let status = response.status();

    match status {
        StatusCode::OK => Ok(ProbeStatus::Reachable),
        // The endpoint is up; the credential problem shows up per request
        StatusCode::UNAUTHORIZED => {
            tracing::warn!(url = %url, "Probe got 401, credential may be invalid");
            Ok(ProbeStatus::Reachable)
        }
        s if s.is_redirection() => {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            Ok(ProbeStatus::Redirect(location))
        }
        s => Err(BenchError::connectivity(
            url.as_str(),
            format!("unexpected status {}", s),
        )),
    }
}

/// HTTPS base URL for an `http://` base whose probe redirected to `https://`
fn https_base_from_redirect(base_url: &Url, location: &str) -> Option<Url> {
    if base_url.scheme() != "http" {
        return None;
    }
    let target = Url::parse(location).ok()?;
    if target.scheme() != "https" {
        return None;
    }

    if let Some(prefix) = target.as_str().strip_suffix(MODELS_PATH) {
        return Url::parse(prefix).ok();
    }

    let mut upgraded = base_url.clone();
    upgraded.set_scheme("https").ok()?;
    Some(upgraded)
}
