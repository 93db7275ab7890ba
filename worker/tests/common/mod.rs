use comms::{AllReduceSession, specs::NodeSpec};
use futures::future::try_join_all;
use orchestrator::SpanningTree;

/// Starts a master that wires up `groups` groups.
pub async fn master(groups: usize) -> String {
    let master = SpanningTree::bind("127.0.0.1:0").await.unwrap();
    let addr = master.local_addr().unwrap().to_string();
    tokio::spawn(master.serve(Some(groups)));
    addr
}

/// The spec of `node` in a group of `total`, children listen on ephemeral ports.
pub fn node_spec(master: &str, unique_id: u64, total: u64, node: u64) -> NodeSpec {
    NodeSpec {
        port_base: 0,
        ..NodeSpec::new(master, unique_id, total, node)
    }
}

/// Connects every node of a fresh group of `total`.
pub async fn group(total: u64) -> Vec<AllReduceSession> {
    let master = master(1).await;

    try_join_all((0..total).map(|node| {
        let spec = node_spec(&master, 1, total, node);
        async move { AllReduceSession::connect(&spec).await }
    }))
    .await
    .unwrap()
}
