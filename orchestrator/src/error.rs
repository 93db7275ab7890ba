use std::{error::Error, fmt, io};

/// All errors that can occur in the spanning tree master.
#[derive(Debug)]
pub enum OrchestratorError {
    /// A node asked to join with a position its group can't hold.
    InvalidRegistration {
        unique_id: u64,
        node: u64,
        total: u64,
        reason: &'static str,
    },
    /// A node connected from an address the tree can't route to.
    UnroutablePeer(String),
    /// An underlying I/O error not covered by the above variants.
    Io(io::Error),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRegistration {
                unique_id,
                node,
                total,
                reason,
            } => write!(
                f,
                "invalid registration of node {node} of {total} in group {unique_id}: {reason}"
            ),
            Self::UnroutablePeer(addr) => write!(f, "peer {addr} has no ipv4 address"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for OrchestratorError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<OrchestratorError> for io::Error {
    fn from(value: OrchestratorError) -> Self {
        match value {
            OrchestratorError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
