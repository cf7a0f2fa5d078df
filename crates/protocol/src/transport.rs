use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Node identifier assigned by the remote target's DOM agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Query operations against one live page over its remote-debugging connection.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn find_nodes_matching(&self, selector: &str) -> Result<Vec<NodeId>>;

    /// Runtime properties of the JavaScript object behind a node, e.g. a
    /// `<link>` element's absolute `href`.
    async fn node_properties(&self, node: NodeId) -> Result<HashMap<String, String>>;

    async fn replace_node_content(&self, node: NodeId, html: &str) -> Result<()>;

    /// Whether the page ever loaded `url`.
    fn was_url_requested(&self, url: &str) -> bool;
}
