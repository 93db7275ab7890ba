use std::{future, io};

use log::debug;
use tokio::net::TcpStream;

use super::{AR_BUF_SIZE, NodeSocks};

/// The progress of the sum coming from one child.
///
/// `read_pos` counts the bytes taken off the child's stream, the first
/// `unprocessed` bytes of `scratch` are a float that hasn't fully arrived yet.
struct ChildCursor {
    read_pos: usize,
    unprocessed: usize,
    scratch: Vec<u8>,
}

impl ChildCursor {
    /// An absent child starts as fully read.
    fn new(present: bool, n: usize) -> Self {
        if !present {
            return Self {
                read_pos: n,
                unprocessed: 0,
                scratch: Vec::new(),
            };
        }

        Self {
            read_pos: 0,
            unprocessed: 0,
            scratch: vec![0; AR_BUF_SIZE + size_of::<f32>() - 1],
        }
    }

    /// The bytes of the local buffer that already hold this child's contribution.
    fn completed(&self) -> usize {
        self.read_pos - self.unprocessed
    }

    /// Adds the whole floats of the `got` freshly read bytes into `floats`.
    fn absorb(&mut self, got: usize, floats: &mut [f32]) {
        let first = self.completed() / size_of::<f32>();
        let avail = self.unprocessed + got;
        let whole = avail / size_of::<f32>();

        let values = self.scratch[..whole * size_of::<f32>()].chunks_exact(size_of::<f32>());
        for (acc, bytes) in floats[first..first + whole].iter_mut().zip(values) {
            *acc += bytemuck::pod_read_unaligned::<f32>(bytes);
        }

        let tail = whole * size_of::<f32>();
        self.scratch.copy_within(tail..avail, 0);
        self.unprocessed = avail - tail;
        self.read_pos += got;
    }

    /// Reads whatever the child has ready without blocking.
    fn pump(&mut self, stream: Option<&TcpStream>, floats: &mut [f32]) -> io::Result<()> {
        let Some(stream) = stream else {
            return Ok(());
        };

        let n = size_of_val(&*floats);
        let want = AR_BUF_SIZE.min(n - self.read_pos);
        let start = self.unprocessed;

        match stream.try_read(&mut self.scratch[start..start + want]) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("child closed after {} of {n} bytes", self.read_pos),
            )),
            Ok(got) => {
                self.absorb(got, floats);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }
}

async fn readable(stream: Option<&TcpStream>) -> io::Result<()> {
    match stream {
        Some(stream) => stream.readable().await,
        None => future::pending().await,
    }
}

async fn writable(stream: Option<&TcpStream>) -> io::Result<()> {
    match stream {
        Some(stream) => stream.writable().await,
        None => future::pending().await,
    }
}

/// Sums the children's buffers into `floats` and streams the partial sum to the parent.
///
/// Bytes are forwarded as soon as every child contributed to them, a float is
/// never added before its 4 bytes arrived. On return `floats` holds the sum of
/// this node's subtree, or, at the root, of the whole tree.
pub(super) async fn reduce(socks: &NodeSocks, floats: &mut [f32]) -> io::Result<()> {
    let n = size_of_val(&*floats);
    let [left, right] = &socks.children;
    let parent = socks.parent.as_ref();

    let mut cursors = [
        ChildCursor::new(left.is_some(), n),
        ChildCursor::new(right.is_some(), n),
    ];
    let mut parent_sent = if parent.is_some() { 0 } else { n };

    loop {
        let ready = cursors[0].completed().min(cursors[1].completed());
        if parent_sent == n && ready == n {
            break;
        }

        tokio::select! {
            res = readable(left.as_ref()), if cursors[0].read_pos < n => {
                res?;
                cursors[0].pump(left.as_ref(), floats)?;
            }
            res = readable(right.as_ref()), if cursors[1].read_pos < n => {
                res?;
                cursors[1].pump(right.as_ref(), floats)?;
            }
            res = writable(parent), if parent_sent < ready => {
                res?;

                if let Some(parent) = parent {
                    let bytes: &[u8] = bytemuck::cast_slice(&*floats);

                    match parent.try_write(&bytes[parent_sent..ready]) {
                        Ok(sent) => parent_sent += sent,
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                        Err(e) => return Err(e),
                    }
                }
            }
            else => {
                return Err(io::Error::other(format!(
                    "reduce stalled at {parent_sent} of {n} bytes"
                )));
            }
        }
    }

    debug!(bytes = n; "reduce finished");
    Ok(())
}
