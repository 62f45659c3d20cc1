//! Distributor (C4) — write broadcast and quorum-read fan-out across peers.
//!
//! Two distinct propagation modes:
//!
//! * **Broadcast** (`/set`): best-effort fan-out to every known peer. A peer
//!   that can't be reached is logged and pruned from membership; the write
//!   itself already succeeded locally before broadcast starts, so a failed
//!   broadcast never rolls anything back.
//! * **Quorum read** (`/get`): peers are tried in randomized order until one
//!   reports a hit. Every forwarded request carries a `without_key` witness
//!   list (peers already asked); a peer that also misses locally keeps
//!   fanning out to its own unwitnessed peers rather than answering
//!   local-only, so a read can cross more than one hop. The witness list,
//!   which only grows, is what bounds the recursion — `is_endpoint` plays no
//!   part here, it's the write-broadcast anti-storm guard only.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::membership::PeerSet;
use crate::store::{Entry, GetResult};
use crate::transport;

#[derive(Debug, Serialize, Deserialize)]
pub struct SetRequest {
    pub token: String,
    #[serde(rename = "db_name")]
    pub db: String,
    #[serde(rename = "keys")]
    pub entries: Vec<Entry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GetRequestBody {
    token: String,
    #[serde(rename = "db_name")]
    db: String,
    keys: Vec<String>,
    #[serde(default)]
    without_key: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GetResponseBody {
    entries: std::collections::HashMap<String, Entry>,
    #[serde(default)]
    not_found_keys: Vec<String>,
}

/// Broadcast a write to every peer in `peers`, best-effort. Each request is
/// tagged `is_endpoint=true` so the receiving node applies it locally and
/// does not re-broadcast — the originating node already fanned out once.
pub async fn broadcast_set(peers: &PeerSet, request: &SetRequest, auth_token: &str) {
    let snapshot = peers.snapshot().await;
    if snapshot.is_empty() {
        return;
    }

    let body = match serde_json::to_string(request) {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "failed to encode set broadcast");
            return;
        }
    };

    let mut unreachable = Vec::new();
    for peer in snapshot {
        let url = format!("{}/set?is_endpoint=true", peer.trim_end_matches('/'));
        match transport::post_json_authed(&url, &body, auth_token).await {
            Ok(resp) if resp.is_success() => {}
            Ok(resp) => warn!(peer = %peer, status = resp.status, "peer rejected broadcast write"),
            Err(e) => {
                warn!(peer = %peer, error = %e, "broadcast to peer failed");
                unreachable.push(peer);
            }
        }
    }
    peers.prune(&unreachable).await;
}

/// Ask the rest of the cluster for `keys` that weren't found locally.
/// `without_key` is the witness list of nodes already consulted (always
/// includes our own `self_url` before this call, per the `/get` handler).
/// A peer that receives this forwarded and also misses locally keeps
/// forwarding in turn (its own `/get` handler runs the same logic), so a
/// miss can cross multiple hops; the witness list only grows, which bounds
/// the recursion to the cluster size. Returns the first peer's hit, merged
/// with whatever was already found locally; peers that can't be reached are
/// pruned from membership.
pub async fn quorum_get(
    peers: &PeerSet,
    token: &str,
    db: &str,
    keys: &[String],
    without_key: &[String],
) -> GetResult {
    let mut candidates: Vec<String> = peers
        .snapshot()
        .await
        .into_iter()
        .filter(|p| !without_key.contains(p))
        .collect();
    candidates.shuffle(&mut rand::thread_rng());

    let body = GetRequestBody {
        token: token.to_string(),
        db: db.to_string(),
        keys: keys.to_vec(),
        without_key: without_key.to_vec(),
    };
    let encoded = match serde_json::to_string(&body) {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "failed to encode quorum read request");
            return GetResult {
                entries: Default::default(),
                not_found_keys: keys.to_vec(),
            };
        }
    };

    let mut unreachable = Vec::new();
    let mut result = GetResult {
        entries: Default::default(),
        not_found_keys: keys.to_vec(),
    };

    for peer in candidates {
        let url = format!("{}/get", peer.trim_end_matches('/'));
        match transport::post_json_authed(&url, &encoded, token).await {
            Ok(resp) if resp.is_success() => {
                match serde_json::from_str::<GetResponseBody>(&resp.body) {
                    Ok(parsed) => {
                        result.not_found_keys.retain(|k| !parsed.entries.contains_key(k));
                        result.entries.extend(parsed.entries);
                        if result.not_found_keys.is_empty() {
                            break;
                        }
                    }
                    Err(e) => warn!(peer = %peer, error = %e, "malformed quorum-read response"),
                }
            }
            Ok(resp) if resp.status == 404 => {
                // This peer doesn't have it either; keep trying others.
                let _ = resp;
            }
            Ok(resp) => warn!(peer = %peer, status = resp.status, "peer rejected quorum read"),
            Err(e) => {
                warn!(peer = %peer, error = %e, "quorum read to peer failed");
                unreachable.push(peer);
            }
        }
    }

    peers.prune(&unreachable).await;
    result
}

#[derive(Debug, Serialize, Deserialize)]
struct RegisterKeyRequest {
    token: String,
}

/// Broadcast a freshly-minted token to every known peer's `/registerkey`,
/// best-effort, exactly as `/auth` announces new tokens in the original.
pub async fn broadcast_register_key(peers: &PeerSet, token: &str) {
    let snapshot = peers.snapshot().await;
    if snapshot.is_empty() {
        return;
    }

    let body = match serde_json::to_string(&RegisterKeyRequest {
        token: token.to_string(),
    }) {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "failed to encode registerkey broadcast");
            return;
        }
    };

    let mut unreachable = Vec::new();
    for peer in snapshot {
        let url = format!("{}/registerkey", peer.trim_end_matches('/'));
        match transport::post_json_authed(&url, &body, token).await {
            Ok(resp) if resp.is_success() => {}
            Ok(resp) => warn!(peer = %peer, status = resp.status, "peer rejected registerkey"),
            Err(e) => {
                warn!(peer = %peer, error = %e, "registerkey broadcast failed");
                unreachable.push(peer);
            }
        }
    }
    peers.prune(&unreachable).await;
}
