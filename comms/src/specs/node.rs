use serde::{Deserialize, Serialize};

/// The port the spanning tree master listens on when the location has none.
pub const DEFAULT_MASTER_PORT: u16 = 26543;

/// The first port a node with children tries to listen on.
pub const DEFAULT_PORT_BASE: u16 = DEFAULT_MASTER_PORT + 1;

const DEFAULT_MAX_PORT_ATTEMPTS: u16 = 64;

fn default_port_base() -> u16 {
    DEFAULT_PORT_BASE
}

fn default_max_port_attempts() -> u16 {
    DEFAULT_MAX_PORT_ATTEMPTS
}

/// How a node joins an all reduce group.
///
/// `unique_id` names the group, `total` is its size and `node` is this node's
/// position in `0..total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NodeSpec {
    /// The master's location, either `host` or `host:port`.
    pub master: String,
    pub unique_id: u64,
    pub total: u64,
    pub node: u64,
    /// `0` binds an ephemeral port instead.
    #[serde(default = "default_port_base")]
    pub port_base: u16,
    #[serde(default = "default_max_port_attempts")]
    pub max_port_attempts: u16,
}

impl NodeSpec {
    pub fn new(master: impl Into<String>, unique_id: u64, total: u64, node: u64) -> Self {
        Self {
            master: master.into(),
            unique_id,
            total,
            node,
            port_base: DEFAULT_PORT_BASE,
            max_port_attempts: DEFAULT_MAX_PORT_ATTEMPTS,
        }
    }

    /// The `host:port` string to connect to the master with.
    pub fn master_addr(&self) -> String {
        if self.master.contains(':') {
            self.master.clone()
        } else {
            format!("{}:{DEFAULT_MASTER_PORT}", self.master)
        }
    }
}
