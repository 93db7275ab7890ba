//! Sum reduction of float buffers over a binary spanning tree of TCP connections.
//!
//! Every node of a group first joins the tree through the spanning tree master,
//! then any amount of `all_reduce` calls run over the same sockets: the
//! children's buffers are summed up towards the root and the root's total is
//! broadcast back down.

mod bootstrap;
mod broadcast;
mod reduce;
mod session;

use tokio::net::TcpStream;

pub use bootstrap::bootstrap;
pub use session::{AllReduceSession, SessionCache};

/// The size of the chunks moved per socket operation.
pub const AR_BUF_SIZE: usize = 1 << 16;

/// The sockets a node keeps to its neighbours in the tree.
///
/// The root has no `parent`, a leaf has no `children`.
#[derive(Debug)]
pub struct NodeSocks {
    pub parent: Option<TcpStream>,
    pub children: [Option<TcpStream>; 2],
}

impl NodeSocks {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn kids(&self) -> usize {
        self.children.iter().flatten().count()
    }
}
