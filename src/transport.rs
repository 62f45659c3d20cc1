//! Peer transport — HTTP calls to other cluster nodes.
//!
//! Spawns `curl` as a subprocess rather than linking an HTTP client crate,
//! matching the teacher's own `federation_sync.rs` (`push_to_peer`/
//! `pull_from_peer`): "reqwest-free approach... keeps dependencies minimal".

use tokio::process::Command;

const CONNECT_TIMEOUT_SECS: &str = "3";
const MAX_TIME_SECS: &str = "10";

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct TransportError {
    pub url: String,
    pub reason: String,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "request to {} failed: {}", self.url, self.reason)
    }
}

impl std::error::Error for TransportError {}

/// POST a JSON body and return the response, status code included. A curl
/// invocation that can't even reach the peer (exit status != 0) is a
/// [`TransportError`]; a non-2xx HTTP response is NOT an error here — callers
/// inspect `status` themselves, since a 404 from a quorum-read peer is
/// meaningful (key not found there) rather than a transport failure.
pub async fn post_json(url: &str, body: &str) -> Result<HttpResponse, TransportError> {
    run_curl(&[
        "-s",
        "-o", "-",
        "-w", "\n%{http_code}",
        "-X", "POST",
        "-H", "Content-Type: application/json",
        "-d", body,
        "--connect-timeout", CONNECT_TIMEOUT_SECS,
        "--max-time", MAX_TIME_SECS,
        url,
    ], url)
    .await
}

pub async fn get(url: &str) -> Result<HttpResponse, TransportError> {
    run_curl(&[
        "-s",
        "-o", "-",
        "-w", "\n%{http_code}",
        "-X", "GET",
        "--connect-timeout", CONNECT_TIMEOUT_SECS,
        "--max-time", MAX_TIME_SECS,
        url,
    ], url)
    .await
}

/// Same as [`post_json`], with an `Authorization` header carrying a raw
/// bearer token — used for the server-to-server calls the distributor makes
/// on a client's behalf.
pub async fn post_json_authed(
    url: &str,
    body: &str,
    token: &str,
) -> Result<HttpResponse, TransportError> {
    let auth_header = format!("Authorization: {}", token);
    run_curl(&[
        "-s",
        "-o", "-",
        "-w", "\n%{http_code}",
        "-X", "POST",
        "-H", "Content-Type: application/json",
        "-H", &auth_header,
        "-d", body,
        "--connect-timeout", CONNECT_TIMEOUT_SECS,
        "--max-time", MAX_TIME_SECS,
        url,
    ], url)
    .await
}

async fn run_curl(args: &[&str], url: &str) -> Result<HttpResponse, TransportError> {
    let output = Command::new("curl")
        .args(args)
        .output()
        .await
        .map_err(|e| TransportError {
            url: url.to_string(),
            reason: format!("curl failed to spawn: {}", e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TransportError {
            url: url.to_string(),
            reason: format!("curl exited with failure: {}", stderr.trim()),
        });
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    let (body, status_line) = raw
        .rsplit_once('\n')
        .ok_or_else(|| TransportError {
            url: url.to_string(),
            reason: "malformed curl output, missing status line".to_string(),
        })?;

    let status: u16 = status_line.trim().parse().map_err(|_| TransportError {
        url: url.to_string(),
        reason: format!("malformed status code: {:?}", status_line),
    })?;

    Ok(HttpResponse {
        status,
        body: body.to_string(),
    })
}
