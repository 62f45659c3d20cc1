//! Replicated key-value store node.
//!
//! Starts the HTTP surface and the admin console loop side by side, same
//! shape as the teacher's `http_main.rs` entrypoint, with the console
//! folded in as a second concurrently-polled task instead of the original's
//! Sanic background task.

use anyhow::Result;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use kvcluster::{admin, config, http, node::Node};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let config = config::load_or_exit();
    let seed_url = config.seed_url();
    let bind_addr = config.bind_addr();
    let self_url = format!("http://{}", bind_addr);

    let node = Node::bootstrap("./data", self_url.clone()).await?;

    if let Some(seed) = &seed_url {
        match node.peers.join(seed).await {
            Ok(result) => {
                for token in result.peer_tokens {
                    node.tokens.add(&token).await?;
                }
                info!(seed = %seed, "joined cluster at startup");
            }
            Err(e) => {
                tracing::warn!(seed = %seed, error = %e, "could not join cluster at startup");
            }
        }
    }

    let app = http::api_routes()
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(node.clone());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "kv node listening");

    let server = axum::serve(listener, app);
    let admin_loop = admin::run(node, seed_url);

    tokio::select! {
        result = server => result?,
        _ = admin_loop => {}
    }

    Ok(())
}
