pub mod allreduce;
pub mod codec;
mod receiver;
mod sender;
pub mod specs;

use tokio::io::{AsyncRead, AsyncWrite};

pub use allreduce::{AllReduceSession, NodeSocks, SessionCache};
pub use receiver::WireReceiver;
pub use sender::WireSender;

/// Creates both `WireReceiver` and `WireSender` network channel parts.
///
/// Given a writer and reader creates and returns both ends of the communication.
///
/// # Arguments
/// * `rx` - An async readable.
/// * `tx` - An async writable.
///
/// # Returns
/// A communication stream in the form of a wire receiver and sender.
pub fn channel<R, W>(rx: R, tx: W) -> (WireReceiver<R>, WireSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (WireReceiver::new(rx), WireSender::new(tx))
}
