mod frag;
mod interface;
mod ringbuffer;

pub use frag::*;
pub use interface::*;
pub use ringbuffer::*;

use core::{
    fmt,
    net::{SocketAddr, SocketAddrV4, SocketAddrV6},
    str::FromStr,
};

use alloc::{collections::VecDeque, rc::Rc, string::String};

use bitflags::bitflags;

use crate::{suite::Suite, timestamp::Timestamp};

// A Face is one neighbour as seen from this relay: the peer behind a
//  transport address on one of our interfaces, or the local application.

// Faces never touch the network themselves. They hold the packets waiting
//  for their turn and hand them to the owning interface one at a time,
//  which in turn asks the platform to transmit.

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FaceAddress {
    /// The local application, reached through `Platform::deliver_to_application`.
    Local,
    Link([u8; 6]),
    Ipv4(SocketAddrV4),
    Ipv6(SocketAddrV6),
    Unix(String),
}

impl fmt::Display for FaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaceAddress::Local => write!(f, "local"),
            FaceAddress::Link(mac) => write!(
                f,
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
            ),
            FaceAddress::Ipv4(addr) => write!(f, "{}", addr),
            FaceAddress::Ipv6(addr) => write!(f, "{}", addr),
            FaceAddress::Unix(path) => write!(f, "unix:{}", path),
        }
    }
}

impl From<SocketAddr> for FaceAddress {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => FaceAddress::Ipv4(v4),
            SocketAddr::V6(v6) => FaceAddress::Ipv6(v6),
        }
    }
}

impl FaceAddress {
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self {
            FaceAddress::Ipv4(v4) => Some(SocketAddr::V4(*v4)),
            FaceAddress::Ipv6(v6) => Some(SocketAddr::V6(*v6)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised face address")]
pub struct BadFaceAddress;

// Accepts what Display prints: "local", "unix:<path>", a MAC address or a socket address
impl FromStr for FaceAddress {
    type Err = BadFaceAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "local" {
            return Ok(FaceAddress::Local);
        }
        if let Some(path) = s.strip_prefix("unix:") {
            return Ok(FaceAddress::Unix(path.into()));
        }
        if let Ok(addr) = SocketAddr::from_str(s) {
            return Ok(addr.into());
        }
        let mut mac = [0u8; 6];
        let mut parts = s.split(':');
        for byte in mac.iter_mut() {
            let part = parts.next().filter(|p| p.len() == 2).ok_or(BadFaceAddress)?;
            *byte = u8::from_str_radix(part, 16).map_err(|_| BadFaceAddress)?;
        }
        match parts.next() {
            None => Ok(FaceAddress::Link(mac)),
            Some(_) => Err(BadFaceAddress),
        }
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FaceFlags: u8 {
        /// Never aged out.
        const STATIC = 0x01;
        /// Interests may be sent back to the face they came from.
        const REFLECT = 0x02;
        /// Already answered in the current delivery round.
        const SERVED = 0x04;
        /// Interests from this face are propagated even when already pending.
        const FWDALLI = 0x08;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedPacket {
    pub suite: Suite,
    pub bytes: Rc<[u8]>,
}

// The packet handed to the interface, and how many of its units are still queued there
#[derive(Clone, Debug)]
pub(crate) struct InFlight {
    pub bytes: Rc<[u8]>,
    pub remaining: usize,
}

pub struct Face {
    pub(crate) ifndx: Option<usize>,
    pub(crate) address: FaceAddress,
    pub(crate) flags: FaceFlags,
    pub(crate) last_used: Timestamp,
    pub(crate) outq: VecDeque<QueuedPacket>,
    pub(crate) in_flight: Option<InFlight>,
    pub(crate) fragmenter: Fragmenter,
    pub(crate) reassembler: Reassembler,
}

impl Face {
    pub fn new(
        ifndx: Option<usize>,
        address: FaceAddress,
        flags: FaceFlags,
        fragmentation: FragmentationPolicy,
        now: Timestamp,
    ) -> Self {
        Self {
            ifndx,
            address,
            flags,
            last_used: now,
            outq: VecDeque::new(),
            in_flight: None,
            fragmenter: Fragmenter::new(fragmentation),
            reassembler: Reassembler::new(),
        }
    }

    pub fn ifndx(&self) -> Option<usize> {
        self.ifndx
    }

    pub fn address(&self) -> &FaceAddress {
        &self.address
    }

    pub fn flags(&self) -> FaceFlags {
        self.flags
    }

    pub fn last_used(&self) -> Timestamp {
        self.last_used
    }

    pub fn is_local(&self) -> bool {
        self.address == FaceAddress::Local
    }

    pub fn fragmentation(&self) -> FragmentationPolicy {
        self.fragmenter.policy()
    }

    /// Packets waiting behind the one in flight.
    pub fn queue_len(&self) -> usize {
        self.outq.len()
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Whether these exact bytes are already waiting or being sent.
    pub fn is_queued(&self, bytes: &[u8]) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|f| f.bytes.as_ref() == bytes)
            || self.outq.iter().any(|q| q.bytes.as_ref() == bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_text_roundtrip() {
        for text in ["local", "unix:/tmp/relay.sock", "02:00:5e:10:00:01", "10.0.0.1:9695", "[::1]:6363"] {
            let address: FaceAddress = text.parse().unwrap();
            assert_eq!(address.to_string(), text);
        }
        assert!(matches!("[::1]:6363".parse(), Ok(FaceAddress::Ipv6(_))));
        assert_eq!("02:00:5e:10:00".parse::<FaceAddress>(), Err(BadFaceAddress));
        assert_eq!("02:00:5e:10:00:01:02".parse::<FaceAddress>(), Err(BadFaceAddress));
        assert_eq!("nowhere".parse::<FaceAddress>(), Err(BadFaceAddress));
    }

    #[test]
    fn test_duplicate_check_covers_in_flight() {
        let mut face = Face::new(
            Some(0),
            FaceAddress::Local,
            FaceFlags::empty(),
            FragmentationPolicy::None,
            Timestamp::default(),
        );
        let bytes: Rc<[u8]> = Rc::from(&[1u8, 2, 3][..]);
        assert!(!face.is_queued(&bytes));
        face.in_flight = Some(InFlight {
            bytes: bytes.clone(),
            remaining: 1,
        });
        assert!(face.is_queued(&[1, 2, 3]));
        face.outq.push_back(QueuedPacket {
            suite: Suite::NdnTlv,
            bytes: Rc::from(&[4u8][..]),
        });
        assert!(face.is_queued(&[4]));
        assert!(!face.is_queued(&[5]));
        assert_eq!(face.queue_len(), 1);
    }
}
