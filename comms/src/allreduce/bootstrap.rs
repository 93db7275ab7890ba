use std::{
    io,
    net::{Ipv4Addr, SocketAddr},
};

use log::{debug, info};
use tokio::net::{TcpListener, TcpStream};

use super::NodeSocks;
use crate::{
    channel,
    codec::{KidCount, ListenPort, ParentAddr, Registration, Verdict},
    specs::NodeSpec,
};

/// Binds the listener children connect to.
///
/// Starting at `port_base`, the port is incremented while it's in use, at most
/// `max_attempts` times. A `port_base` of `0` binds an ephemeral port.
async fn bind_children_listener(port_base: u16, max_attempts: u16) -> io::Result<TcpListener> {
    if port_base == 0 {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).await;
    }

    let mut port = port_base;
    for _ in 0..max_attempts.max(1) {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                debug!(port = port; "port in use, trying the next one");
                port = port.checked_add(1).ok_or(e)?;
            }
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AddrInUse,
        format!("no free port in {port_base}..{port}"),
    ))
}

/// Joins the spanning tree described by `spec`.
///
/// # Args
/// * `spec` - The master location and this node's place in the group.
///
/// # Returns
/// The sockets to this node's parent and children, or an io error if the master
/// rejected the registration or any connection failed.
pub async fn bootstrap(spec: &NodeSpec) -> io::Result<NodeSocks> {
    let master_addr = spec.master_addr();
    let master = TcpStream::connect(&master_addr).await?;
    debug!(node = spec.node; "connected to master at {master_addr}");

    let (rx, tx) = master.into_split();
    let (mut rx, mut tx) = channel(rx, tx);

    let registration = Registration {
        unique_id: spec.unique_id,
        total: spec.total,
        node: spec.node,
    };
    tx.send(&registration).await?;

    let Verdict(ok) = rx.recv().await?;
    if ok == 0 {
        return Err(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            format!(
                "master rejected node {} of {} in group {}",
                spec.node, spec.total, spec.unique_id
            ),
        ));
    }

    let KidCount(kids) = rx.recv().await?;
    if kids > 2 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("a tree node has at most 2 children, master sent {kids}"),
        ));
    }

    let listener = if kids > 0 {
        let listener = bind_children_listener(spec.port_base, spec.max_port_attempts).await?;
        let port = listener.local_addr()?.port();
        tx.send(&ListenPort(port)).await?;
        debug!(port = port, kids = kids; "listening for children");
        Some(listener)
    } else {
        None
    };

    let parent_addr: ParentAddr = rx.recv().await?;
    drop((rx, tx));

    let parent = if parent_addr.is_root() {
        None
    } else {
        let addr = SocketAddr::from((parent_addr.ip(), parent_addr.port));
        let parent = TcpStream::connect(addr).await?;
        parent.set_nodelay(true)?;
        Some(parent)
    };

    let mut socks = NodeSocks {
        parent,
        children: [None, None],
    };

    if let Some(listener) = listener {
        for child in socks.children.iter_mut().take(kids as usize) {
            let (stream, addr) = listener.accept().await?;
            stream.set_nodelay(true)?;
            debug!("accepted child from {addr}");
            *child = Some(stream);
        }
    }

    info!(
        node = spec.node,
        root = socks.parent.is_none(),
        kids = kids;
        "joined all reduce tree"
    );

    Ok(socks)
}
