//! Membership (C3) — the set of peer base URLs this node knows about.
//!
//! One-hop gossip only: a node learns peers from `/mkcluster` responses and
//! `/registernode` broadcasts, never persists the set across restarts (the
//! set starts empty every boot), and never re-announces on a peer's behalf.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::transport::{self, TransportError};

#[derive(Debug, Serialize, Deserialize)]
struct MkClusterRequest {
    sender_address: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct MkClusterResponse {
    addresses: Vec<String>,
    #[serde(rename = "api-keys")]
    api_keys: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RegisterNodeRequest {
    address: Vec<String>,
}

/// Outcome of [`PeerSet::join`].
pub struct JoinResult {
    pub peer_tokens: Vec<String>,
}

pub struct PeerSet {
    self_url: String,
    peers: RwLock<HashSet<String>>,
}

impl PeerSet {
    pub fn new(self_url: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            self_url: self_url.into(),
            peers: RwLock::new(HashSet::new()),
        })
    }

    pub fn self_url(&self) -> &str {
        &self.self_url
    }

    /// Union `urls` into the known peer set, excluding our own address.
    pub async fn add(&self, urls: impl IntoIterator<Item = String>) {
        let mut peers = self.peers.write().await;
        for url in urls {
            if url != self.self_url {
                peers.insert(url);
            }
        }
    }

    /// Snapshot of currently-known peers (not including our own address).
    pub async fn snapshot(&self) -> Vec<String> {
        self.peers.read().await.iter().cloned().collect()
    }

    /// Remove peers observed unreachable during a fan-out. This is the
    /// pruning step the set never performs on its own; distributor calls it
    /// after every broadcast/quorum attempt with whichever peers it couldn't
    /// reach.
    pub async fn prune(&self, unreachable: &[String]) {
        if unreachable.is_empty() {
            return;
        }
        let mut peers = self.peers.write().await;
        let before = peers.len();
        peers.retain(|p| !unreachable.contains(p));
        if peers.len() != before {
            warn!(removed = before - peers.len(), "pruned unreachable peers");
        }
    }

    /// Join a cluster through `seed_url`: announce ourselves via its
    /// `/mkcluster`, merge the addresses and tokens it hands back. A
    /// connection failure is reported, not fatal — the node keeps running
    /// standalone and an operator can retry with the `mkcluster` admin
    /// command.
    pub async fn join(&self, seed_url: &str) -> Result<JoinResult, TransportError> {
        let request = MkClusterRequest {
            sender_address: self.self_url.clone(),
        };
        let body = serde_json::to_string(&request).map_err(|e| TransportError {
            url: seed_url.to_string(),
            reason: format!("failed to encode join request: {}", e),
        })?;

        let url = format!("{}/mkcluster", seed_url.trim_end_matches('/'));
        let response = transport::post_json(&url, &body).await?;

        if !response.is_success() {
            return Err(TransportError {
                url,
                reason: format!("seed rejected join with status {}", response.status),
            });
        }

        let parsed: MkClusterResponse =
            serde_json::from_str(&response.body).map_err(|e| TransportError {
                url: url.clone(),
                reason: format!("malformed join response: {}", e),
            })?;

        self.add(parsed.addresses).await;
        self.add(std::iter::once(seed_url.to_string())).await;

        info!(seed = %seed_url, peers = self.peers.read().await.len(), "joined cluster");

        Ok(JoinResult {
            peer_tokens: parsed.api_keys,
        })
    }

    /// Forward a newly-seen peer address to every currently-known peer via
    /// `/registernode`, best-effort. Used by the `/mkcluster` handler so the
    /// rest of the cluster learns about a freshly-joined node.
    pub async fn announce(&self, new_peer: &str) {
        let request = RegisterNodeRequest {
            address: vec![new_peer.to_string()],
        };
        let body = match serde_json::to_string(&request) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "failed to encode registernode broadcast");
                return;
            }
        };

        let peers = self.snapshot().await;
        let mut unreachable = Vec::new();
        for peer in peers {
            if peer == new_peer {
                continue;
            }
            let url = format!("{}/registernode", peer.trim_end_matches('/'));
            match transport::post_json(&url, &body).await {
                Ok(resp) if resp.is_success() => {}
                Ok(resp) => warn!(peer = %peer, status = resp.status, "registernode rejected"),
                Err(e) => {
                    warn!(peer = %peer, error = %e, "registernode broadcast failed");
                    unreachable.push(peer);
                }
            }
        }
        self.prune(&unreachable).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_excludes_self_url() {
        let peers = PeerSet::new("http://self:9000");
        peers
            .add(vec![
                "http://self:9000".to_string(),
                "http://other:9001".to_string(),
            ])
            .await;
        let snapshot = peers.snapshot().await;
        assert_eq!(snapshot, vec!["http://other:9001".to_string()]);
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let peers = PeerSet::new("http://self:9000");
        peers.add(vec!["http://other:9001".to_string()]).await;
        peers.add(vec!["http://other:9001".to_string()]).await;
        assert_eq!(peers.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn prune_removes_unreachable_peers() {
        let peers = PeerSet::new("http://self:9000");
        peers
            .add(vec![
                "http://a:9001".to_string(),
                "http://b:9002".to_string(),
            ])
            .await;
        peers.prune(&["http://a:9001".to_string()]).await;
        assert_eq!(peers.snapshot().await, vec!["http://b:9002".to_string()]);
    }

    #[tokio::test]
    async fn join_against_unreachable_seed_fails_without_panicking() {
        let peers = PeerSet::new("http://self:9000");
        let result = peers.join("http://127.0.0.1:1").await;
        assert!(result.is_err());
        assert!(peers.snapshot().await.is_empty());
    }
}
