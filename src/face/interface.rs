use alloc::rc::Rc;

use super::{FaceAddress, FaceFlags, FragmentationPolicy, RingBuffer};
use crate::{platform::TimerHandle, tables::FaceToken};

pub const MAX_IF_QLEN: usize = 64;
pub const MAX_INTERFACES: usize = 10;

/// One unit handed to the platform: a whole packet or a single fragment.
#[derive(Clone, Debug)]
pub struct TxRequest {
    pub face: Option<FaceToken>,
    pub destination: FaceAddress,
    pub bytes: Rc<[u8]>,
}

pub type TxRing = RingBuffer<TxRequest, MAX_IF_QLEN>;

/// A transport endpoint of the relay, such as a bound socket.
pub struct Interface {
    pub(crate) address: FaceAddress,
    pub(crate) mtu: usize,
    pub(crate) flags: FaceFlags,
    pub(crate) pacing_us: Option<u64>,
    pub(crate) queue: TxRing,
    pub(crate) draining: bool,
    pub(crate) cts_timer: Option<TimerHandle>,
}

impl Interface {
    pub fn new(address: FaceAddress, mtu: usize, flags: FaceFlags) -> Self {
        Self {
            address,
            mtu,
            // Only what new faces inherit is kept
            flags: flags & (FaceFlags::REFLECT | FaceFlags::FWDALLI),
            pacing_us: None,
            queue: TxRing::new(),
            draining: false,
            cts_timer: None,
        }
    }

    pub fn address(&self) -> &FaceAddress {
        &self.address
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    pub fn flags(&self) -> FaceFlags {
        self.flags
    }

    pub fn pacing_us(&self) -> Option<u64> {
        self.pacing_us
    }

    /// Units waiting for the platform.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queued(&self) -> impl Iterator<Item = &TxRequest> + '_ {
        self.queue.iter()
    }

    pub(crate) fn fragmentation(&self) -> FragmentationPolicy {
        FragmentationPolicy::for_mtu(self.mtu)
    }
}
