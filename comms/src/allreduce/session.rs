use std::io;

use log::info;

use super::{NodeSocks, bootstrap, broadcast::broadcast, reduce::reduce};
use crate::specs::NodeSpec;

/// A node's membership in an all reduce group.
#[derive(Debug)]
pub struct AllReduceSession {
    spec: NodeSpec,
    socks: NodeSocks,
}

impl AllReduceSession {
    /// Joins the group described by `spec` through its master.
    ///
    /// # Args
    /// * `spec` - The master location and this node's place in the group.
    ///
    /// # Returns
    /// The connected session or an io error.
    pub async fn connect(spec: &NodeSpec) -> io::Result<Self> {
        let socks = bootstrap(spec).await?;

        Ok(Self {
            spec: spec.clone(),
            socks,
        })
    }

    pub fn spec(&self) -> &NodeSpec {
        &self.spec
    }

    pub fn socks(&self) -> &NodeSocks {
        &self.socks
    }

    /// Replaces `floats` with its element wise sum over every node of the group.
    ///
    /// Every node must call this with a buffer of the same length, the call
    /// returns once the sum reached this node.
    ///
    /// # Args
    /// * `floats` - This node's contribution, overwritten with the total.
    ///
    /// # Returns
    /// An io error if any neighbour failed, the session is unusable after that.
    pub async fn all_reduce(&mut self, floats: &mut [f32]) -> io::Result<()> {
        reduce(&self.socks, floats).await?;
        broadcast(&mut self.socks, floats).await
    }
}

/// Keeps the session of the last master a node talked to.
///
/// Asking for a session with another master location tears the current one
/// down and joins the new group.
#[derive(Debug, Default)]
pub struct SessionCache {
    session: Option<AllReduceSession>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for `spec`'s master, connecting if needed.
    pub async fn session(&mut self, spec: &NodeSpec) -> io::Result<&mut AllReduceSession> {
        let session = match self.session.take() {
            Some(session) if session.spec.master == spec.master => session,
            stale => {
                if let Some(stale) = stale {
                    info!("leaving all reduce group {}", stale.spec.unique_id);
                }
                AllReduceSession::connect(spec).await?
            }
        };

        Ok(self.session.insert(session))
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }
}
