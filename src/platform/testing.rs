use alloc::vec::Vec;

use super::{Platform, TimerEvent, TimerHandle};
use crate::{face::FaceAddress, prefix::Prefix, timestamp::Timestamp};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Sent {
    pub ifndx: usize,
    pub destination: FaceAddress,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Delivered {
    pub name: Prefix,
    pub chunk: Option<u32>,
    pub payload: Vec<u8>,
}

/// Manual clock, and a record of everything the relay asked for.
#[derive(Default)]
pub(crate) struct TestPlatform {
    pub now: Timestamp,
    pub sent: Vec<Sent>,
    pub delivered: Vec<Delivered>,
    pub tapped: Vec<Prefix>,
    pub timers: Vec<(TimerHandle, u64, TimerEvent)>,
    pub cancelled: Vec<TimerHandle>,
    next_timer: u64,
}

impl TestPlatform {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            now: Timestamp::from_secs(1_000),
            ..Default::default()
        }
    }

    pub fn advance_secs(&mut self, secs: u64) {
        self.now = self.now.adding_secs(secs);
    }

    /// Removes and returns the armed timers for `event`.
    pub fn take_timers(&mut self, event: TimerEvent) -> Vec<TimerHandle> {
        let mut taken = Vec::new();
        self.timers.retain(|(handle, _, e)| {
            if *e == event {
                taken.push(*handle);
                false
            } else {
                true
            }
        });
        taken
    }

    pub fn sent_to(&self, destination: &FaceAddress) -> usize {
        self.sent.iter().filter(|s| s.destination == *destination).count()
    }
}

impl Platform for TestPlatform {
    fn now(&mut self) -> Timestamp {
        self.now
    }

    fn set_timer(&mut self, delay_us: u64, event: TimerEvent) -> Option<TimerHandle> {
        self.next_timer += 1;
        let handle = TimerHandle(self.next_timer);
        self.timers.push((handle, delay_us, event));
        Some(handle)
    }

    fn cancel_timer(&mut self, handle: TimerHandle) {
        self.timers.retain(|(h, _, _)| *h != handle);
        self.cancelled.push(handle);
    }

    fn transmit(&mut self, ifndx: usize, destination: &FaceAddress, bytes: &[u8]) {
        self.sent.push(Sent {
            ifndx,
            destination: destination.clone(),
            bytes: bytes.to_vec(),
        });
    }

    fn deliver_to_application(&mut self, name: &Prefix, chunk: Option<u32>, payload: &[u8]) {
        self.delivered.push(Delivered {
            name: name.clone(),
            chunk,
            payload: payload.to_vec(),
        });
    }

    fn tap_interest(&mut self, name: &Prefix, _bytes: &[u8]) {
        self.tapped.push(name.clone());
    }
}
