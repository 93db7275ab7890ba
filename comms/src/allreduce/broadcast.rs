use std::io;

use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{AR_BUF_SIZE, NodeSocks};

/// Streams the root's buffer down the tree, overwriting `floats` on every other node.
///
/// Whatever arrived from the parent is relayed to the children before reading more.
pub(super) async fn broadcast(socks: &mut NodeSocks, floats: &mut [f32]) -> io::Result<()> {
    let bytes: &mut [u8] = bytemuck::cast_slice_mut(floats);
    let n = bytes.len();

    let NodeSocks { parent, children } = socks;
    let has_children = children.iter().any(Option::is_some);

    let mut parent_read = if parent.is_some() { 0 } else { n };
    let mut children_sent = if has_children { 0 } else { n };

    loop {
        let pending = AR_BUF_SIZE.min(parent_read.saturating_sub(children_sent));
        if pending > 0 {
            let chunk = &bytes[children_sent..children_sent + pending];
            for child in children.iter_mut().flatten() {
                child.write_all(chunk).await?;
            }
            children_sent += pending;
        }

        if parent_read == n && children_sent == n {
            break;
        }

        if parent_read < n
            && let Some(parent) = parent.as_mut()
        {
            let want = AR_BUF_SIZE.min(n - parent_read);
            let got = parent
                .read(&mut bytes[parent_read..parent_read + want])
                .await?;

            if got == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("parent closed after {parent_read} of {n} bytes"),
                ));
            }
            parent_read += got;
        }
    }

    debug!(bytes = n; "broadcast finished");
    Ok(())
}
