pub mod error;
mod tree;

use std::{
    collections::HashMap,
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use comms::{
    WireReceiver, WireSender,
    codec::{KidCount, ListenPort, ParentAddr, Registration, Verdict},
};
use log::{debug, info, warn};
use tokio::{
    net::{
        TcpListener, TcpStream, ToSocketAddrs,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc,
    time,
};

pub use error::OrchestratorError;
pub use tree::{TreeNode, build_tree};

type NetRx = WireReceiver<OwnedReadHalf>;
type NetTx = WireSender<OwnedWriteHalf>;

/// How long a connected node has to send its registration.
pub const DEFAULT_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(10);

/// A connection that already sent its registration.
struct Arrival {
    addr: SocketAddr,
    registration: Registration,
    rx: NetRx,
    tx: NetTx,
}

/// A registered node waiting for the rest of its group.
struct Member {
    rx: NetRx,
    tx: NetTx,
    ip: Ipv4Addr,
}

impl Member {
    /// Whether the node still holds its connection.
    ///
    /// A registered node sends nothing until it gets its kid count, so both a
    /// readable byte and the end of the stream mean it's gone.
    fn is_alive(&self) -> bool {
        matches!(
            self.rx.get_ref().try_read(&mut [0; 1]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock
        )
    }
}

/// The nodes of one `unique_id` registered so far.
struct Group {
    total: u64,
    members: Vec<Option<Member>>,
    joined: usize,
}

impl Group {
    fn new(total: u64) -> Self {
        Self {
            total,
            members: (0..total).map(|_| None).collect(),
            joined: 0,
        }
    }

    fn is_full(&self) -> bool {
        self.joined as u64 == self.total
    }
}

/// The master every node of an all reduce group meets at to learn its place in the tree.
pub struct SpanningTree {
    listener: TcpListener,
    groups: HashMap<u64, Group>,
    registration_timeout: Duration,
}

impl SpanningTree {
    /// Binds the master to `addr`.
    ///
    /// # Arguments
    /// * `addr` - Where to listen for registrations.
    ///
    /// # Returns
    /// A new `SpanningTree` instance or an io error if binding failed.
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self {
            listener,
            groups: HashMap::new(),
            registration_timeout: DEFAULT_REGISTRATION_TIMEOUT,
        })
    }

    /// Sets how long a connection may stay silent before it's dropped.
    pub fn with_registration_timeout(mut self, timeout: Duration) -> Self {
        self.registration_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts registrations and wires up every group that completes.
    ///
    /// Registrations are read concurrently, so a silent connection holds no one
    /// back. Invalid registrations are refused and the master keeps serving, a
    /// node dropping out of a completing group abandons only that group.
    ///
    /// # Arguments
    /// * `limit` - The amount of groups to wire up before returning, `None` serves forever.
    ///
    /// # Returns
    /// An io error if accepting connections failed.
    pub async fn serve(mut self, limit: Option<usize>) -> Result<(), OrchestratorError> {
        let (arrivals_tx, mut arrivals) = mpsc::channel(64);
        let mut done = 0;

        while limit.is_none_or(|limit| done < limit) {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, addr) = accepted?;
                    debug!("node connected from {addr}");

                    tokio::spawn(read_registration(
                        stream,
                        addr,
                        self.registration_timeout,
                        arrivals_tx.clone(),
                    ));
                }
                Some(arrival) = arrivals.recv() => {
                    if self.admit(arrival).await {
                        done += 1;
                    }
                }
            }
        }

        Ok(())
    }

    /// Places a registered node in its group, wiring the group up once complete.
    ///
    /// # Returns
    /// Whether a group was wired up.
    async fn admit(&mut self, arrival: Arrival) -> bool {
        let Arrival {
            addr,
            registration,
            rx,
            mut tx,
        } = arrival;

        let ip = match peer_ip(addr) {
            Ok(ip) => ip,
            Err(e) => {
                warn!("{e}");
                let _ = tx.send(&Verdict(0)).await;
                return false;
            }
        };

        let fresh = match self.check(&registration) {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!("{e}");
                let _ = tx.send(&Verdict(0)).await;
                return false;
            }
        };

        if let Err(e) = tx.send(&Verdict(1)).await {
            warn!("node {} went away before joining: {e}", registration.node);
            return false;
        }

        let Registration {
            unique_id,
            total,
            node,
        } = registration;

        let group = self
            .groups
            .entry(unique_id)
            .or_insert_with(|| Group::new(total));
        group.members[node as usize] = Some(Member { rx, tx, ip });

        if fresh {
            group.joined += 1;
        } else {
            info!("node {node} of group {unique_id} registered again, its old connection was closed");
        }

        debug!(
            unique_id = unique_id,
            node = node,
            joined = group.joined;
            "node registered"
        );

        if !group.is_full() {
            return false;
        }

        let Some(group) = self.groups.remove(&unique_id) else {
            return false;
        };

        match wire_up(group).await {
            Ok(()) => info!(unique_id = unique_id, total = total; "spanning tree built"),
            Err(e) => warn!("abandoning group {unique_id}: {e}"),
        }

        true
    }

    /// Whether `registration` fits in its group.
    ///
    /// # Returns
    /// `true` for a new node, `false` if it replaces a member whose connection closed.
    fn check(&self, registration: &Registration) -> Result<bool, OrchestratorError> {
        let Registration {
            unique_id,
            total,
            node,
        } = *registration;

        let invalid = |reason| OrchestratorError::InvalidRegistration {
            unique_id,
            node,
            total,
            reason,
        };

        if node >= total {
            return Err(invalid("node out of range"));
        }

        let Some(group) = self.groups.get(&unique_id) else {
            return Ok(true);
        };

        if group.total != total {
            return Err(invalid("total differs from the group's"));
        }

        match &group.members[node as usize] {
            Some(member) if member.is_alive() => Err(invalid("node already registered")),
            Some(_) => Ok(false),
            None => Ok(true),
        }
    }
}

/// Reads the registration of a fresh connection and hands it to the master.
async fn read_registration(
    stream: TcpStream,
    addr: SocketAddr,
    timeout: Duration,
    arrivals: mpsc::Sender<Arrival>,
) {
    let (rx, tx) = stream.into_split();
    let (mut rx, tx) = comms::channel(rx, tx);

    let registration = match time::timeout(timeout, rx.recv::<Registration>()).await {
        Ok(Ok(registration)) => registration,
        Ok(Err(e)) => {
            warn!("dropping {addr}, bad registration: {e}");
            return;
        }
        Err(_) => {
            warn!("dropping {addr}, no registration within {timeout:?}");
            return;
        }
    };

    let arrival = Arrival {
        addr,
        registration,
        rx,
        tx,
    };

    if arrivals.send(arrival).await.is_err() {
        debug!("master stopped before {addr} registered");
    }
}

fn peer_ip(addr: SocketAddr) -> Result<Ipv4Addr, OrchestratorError> {
    match addr.ip() {
        IpAddr::V4(ip) => Ok(ip),
        IpAddr::V6(ip) if ip.is_loopback() => Ok(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) => ip
            .to_ipv4_mapped()
            .ok_or_else(|| OrchestratorError::UnroutablePeer(addr.to_string())),
    }
}

/// Tells every member of a full group where it sits in the tree.
async fn wire_up(group: Group) -> io::Result<()> {
    let mut members: Vec<Member> = group.members.into_iter().flatten().collect();
    let tree = build_tree(members.len());

    for (member, node) in members.iter_mut().zip(&tree) {
        member.tx.send(&KidCount(node.kids)).await?;
    }

    let mut ports = vec![0; members.len()];
    for ((member, node), port) in members.iter_mut().zip(&tree).zip(&mut ports) {
        if node.kids > 0 {
            let ListenPort(listening) = member.rx.recv().await?;
            *port = listening;
        }
    }

    let parents: Vec<_> = tree
        .iter()
        .map(|node| match node.parent {
            Some(parent) => ParentAddr {
                ip: members[parent].ip.octets(),
                port: ports[parent],
            },
            None => ParentAddr::root(),
        })
        .collect();

    for (member, parent) in members.iter_mut().zip(&parents) {
        member.tx.send(parent).await?;
    }

    Ok(())
}
