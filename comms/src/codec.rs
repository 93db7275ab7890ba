//! Fixed size messages exchanged between a node and the spanning tree master.

use std::net::Ipv4Addr;

/// The ip a root node receives instead of a parent address.
pub const ROOT_SENTINEL: [u8; 4] = [0xff; 4];

/// A message that can be appended to an outgoing buffer.
pub trait Encode {
    fn encode(&self, buf: &mut Vec<u8>);
}

/// A message with a fixed wire size.
pub trait Decode: Sized {
    const SIZE: usize;

    /// Decodes `Self` out of exactly `SIZE` bytes.
    fn decode(bytes: &[u8]) -> Self;
}

/// A node announcing itself to the master, every field in native byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub unique_id: u64,
    pub total: u64,
    pub node: u64,
}

/// The master's answer to a `Registration`, zero means rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict(pub i32);

/// The amount of children a node must accept, native byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KidCount(pub u16);

/// The port a node with children listens on, network byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenPort(pub u16);

/// Where a node must connect to reach its parent, network byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentAddr {
    pub ip: [u8; 4],
    pub port: u16,
}

impl ParentAddr {
    /// The address sent to the root of the tree.
    pub fn root() -> Self {
        Self {
            ip: ROOT_SENTINEL,
            port: u16::MAX,
        }
    }

    pub fn is_root(&self) -> bool {
        self.ip == ROOT_SENTINEL
    }

    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ip)
    }
}

fn array<const N: usize>(bytes: &[u8], at: usize) -> [u8; N] {
    let mut out = [0; N];
    out.copy_from_slice(&bytes[at..at + N]);
    out
}

impl Encode for Registration {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.unique_id.to_ne_bytes());
        buf.extend_from_slice(&self.total.to_ne_bytes());
        buf.extend_from_slice(&self.node.to_ne_bytes());
    }
}

impl Decode for Registration {
    const SIZE: usize = 3 * size_of::<u64>();

    fn decode(bytes: &[u8]) -> Self {
        Self {
            unique_id: u64::from_ne_bytes(array(bytes, 0)),
            total: u64::from_ne_bytes(array(bytes, 8)),
            node: u64::from_ne_bytes(array(bytes, 16)),
        }
    }
}

impl Encode for Verdict {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.0.to_ne_bytes());
    }
}

impl Decode for Verdict {
    const SIZE: usize = size_of::<i32>();

    fn decode(bytes: &[u8]) -> Self {
        Self(i32::from_ne_bytes(array(bytes, 0)))
    }
}

impl Encode for KidCount {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.0.to_ne_bytes());
    }
}

impl Decode for KidCount {
    const SIZE: usize = size_of::<u16>();

    fn decode(bytes: &[u8]) -> Self {
        Self(u16::from_ne_bytes(array(bytes, 0)))
    }
}

impl Encode for ListenPort {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.0.to_be_bytes());
    }
}

impl Decode for ListenPort {
    const SIZE: usize = size_of::<u16>();

    fn decode(bytes: &[u8]) -> Self {
        Self(u16::from_be_bytes(array(bytes, 0)))
    }
}

impl Encode for ParentAddr {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.ip);
        buf.extend_from_slice(&self.port.to_be_bytes());
    }
}

impl Decode for ParentAddr {
    const SIZE: usize = 4 + size_of::<u16>();

    fn decode(bytes: &[u8]) -> Self {
        Self {
            ip: array(bytes, 0),
            port: u16::from_be_bytes(array(bytes, 4)),
        }
    }
}
