//! The implementation of the sending end of the bootstrap protocol.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::codec::Encode;

/// The sending end handle of the bootstrap communication.
pub struct WireSender<W>
where
    W: AsyncWrite + Unpin,
{
    tx: W,
    buf: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> WireSender<W> {
    /// Creates a new `WireSender` instance.
    ///
    /// # Arguments
    /// * `tx` - The underlying writer.
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            buf: Vec::new(),
        }
    }

    /// Sends `msg` through the inner sender.
    ///
    /// # Arguments
    /// * `msg` - An encodable message.
    ///
    /// # Returns
    /// A result object that returns `io::Error` on failure.
    pub async fn send<T: Encode>(&mut self, msg: &T) -> io::Result<()> {
        let Self { buf, tx } = self;

        buf.clear();
        msg.encode(buf);

        tx.write_all(buf).await?;
        tx.flush().await
    }
}
