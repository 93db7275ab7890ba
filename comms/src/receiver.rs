use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::codec::Decode;

/// The receiving end handle of the bootstrap communication.
pub struct WireReceiver<R: AsyncRead + Unpin> {
    rx: R,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> WireReceiver<R> {
    /// Creates a new `WireReceiver` instance.
    ///
    /// # Arguments
    /// * `rx` - The underlying reader.
    pub(super) fn new(rx: R) -> Self {
        Self {
            rx,
            buf: Vec::new(),
        }
    }

    /// The underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.rx
    }

    /// Waits to receive a new fixed size message from the inner receiver.
    ///
    /// # Returns
    /// A result object that returns `T` on success or `io::Error` on failure,
    /// an early end of stream is `UnexpectedEof`.
    pub async fn recv<T: Decode>(&mut self) -> io::Result<T> {
        self.buf.resize(T::SIZE, 0);
        self.rx.read_exact(&mut self.buf).await?;
        Ok(T::decode(&self.buf))
    }
}
