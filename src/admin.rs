//! Admin Loop (C6) — a line-reading console running alongside the HTTP
//! server. Recognizes `mkcluster` (join the seed, if one is configured) and
//! `connections` (list known peers); everything else is logged at debug
//! level and otherwise ignored, matching the original's `debug_print` for
//! unrecognized commands rather than failing the loop.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::node::Node;

/// Runs until stdin is closed. Errors reading a line or executing a command
/// never stop the loop — an operator typo shouldn't take the node down.
pub async fn run(node: Arc<Node>, seed_url: Option<String>) {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => handle_command(&node, &seed_url, line.trim()).await,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "failed to read admin command");
                break;
            }
        }
    }
}

async fn handle_command(node: &Arc<Node>, seed_url: &Option<String>, command: &str) {
    match command {
        "mkcluster" => match seed_url {
            Some(seed) => match node.peers.join(seed).await {
                Ok(result) => {
                    for token in result.peer_tokens {
                        if let Err(e) = node.tokens.add(&token).await {
                            error!(error = %e, "failed to persist peer token during join");
                        }
                    }
                    info!(seed = %seed, "mkcluster: joined");
                }
                Err(e) => warn!(seed = %seed, error = %e, "mkcluster: join failed"),
            },
            None => debug!("mkcluster: no seed configured, nothing to do"),
        },
        "connections" => {
            let peers = node.peers.snapshot().await;
            info!(peers = ?peers, "connections");
        }
        "" => {}
        other => debug!(command = %other, "unknown admin command"),
    }
}
