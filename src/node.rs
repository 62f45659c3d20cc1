//! The node's owned state — no module-level singletons or global mutable
//! state (unlike the class-level state the original cluster node kept):
//! every component is constructed once at startup and threaded explicitly
//! into the HTTP handlers and the admin loop through a single [`Node`] value.

use std::path::PathBuf;
use std::sync::Arc;

use crate::membership::PeerSet;
use crate::store::Store;
use crate::tokens::TokenRegistry;

pub struct Node {
    pub store: Arc<Store>,
    pub tokens: Arc<TokenRegistry>,
    pub peers: Arc<PeerSet>,
    pub self_url: String,
}

impl Node {
    pub async fn bootstrap(
        data_root: impl Into<PathBuf>,
        self_url: impl Into<String>,
    ) -> std::io::Result<Arc<Self>> {
        let data_root = data_root.into();
        let self_url = self_url.into();

        let tokens = TokenRegistry::recover(data_root.clone()).await?;
        let store = Store::new(data_root);
        let peers = PeerSet::new(self_url.clone());

        Ok(Arc::new(Self {
            store,
            tokens,
            peers,
            self_url,
        }))
    }
}
