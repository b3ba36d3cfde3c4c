use core::{cmp::Reverse, fmt};
use std::{
    collections::{BinaryHeap, HashMap},
    io::{self, ErrorKind},
    net::{SocketAddr, UdpSocket},
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use super::clock::MonotonicClock;
use crate::{
    face::FaceAddress,
    platform::{Platform, TimerEvent, TimerHandle},
    prefix::Prefix,
    timestamp::Timestamp,
};
#[cfg(any(unix, windows))]
use crate::{error::RelayError, relay::Relay};

pub const MAX_DATAGRAM: usize = 65_535;

// Upper bound on one poll, so the stop flag is looked at regularly
const MAX_WAIT: Duration = Duration::from_millis(100);

/// Content the relay handed up to the local application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub name: Prefix,
    pub chunk: Option<u32>,
    pub payload: Vec<u8>,
}

/// A [`Platform`] over one nonblocking UDP socket per interface.
#[derive(Default)]
pub struct UdpPlatform {
    clock: MonotonicClock,
    sockets: Vec<Option<UdpSocket>>,
    deadlines: BinaryHeap<Reverse<(Timestamp, TimerHandle)>>,
    timers: HashMap<TimerHandle, TimerEvent>,
    next_timer: u64,
    delivered: Vec<Delivery>,
    tapped: Vec<(Prefix, Vec<u8>)>,
}

impl UdpPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the socket of interface `ifndx` and returns its local address.
    pub fn bind(&mut self, ifndx: usize, address: SocketAddr) -> io::Result<SocketAddr> {
        let socket = UdpSocket::bind(address)?;
        socket.set_nonblocking(true)?;
        let local = socket.local_addr()?;
        if self.sockets.len() <= ifndx {
            self.sockets.resize_with(ifndx + 1, || None);
        }
        self.sockets[ifndx] = Some(socket);
        log::info!("Interface {} bound to {}", ifndx, local);
        Ok(local)
    }

    pub fn socket(&self, ifndx: usize) -> Option<&UdpSocket> {
        self.sockets.get(ifndx).and_then(Option::as_ref)
    }

    pub fn take_delivered(&mut self) -> Vec<Delivery> {
        core::mem::take(&mut self.delivered)
    }

    pub fn take_tapped(&mut self) -> Vec<(Prefix, Vec<u8>)> {
        core::mem::take(&mut self.tapped)
    }

    /// When the earliest armed timer fires.
    pub fn next_deadline(&mut self) -> Option<Timestamp> {
        while let Some(Reverse((deadline, handle))) = self.deadlines.peek() {
            if self.timers.contains_key(handle) {
                return Some(*deadline);
            }
            self.deadlines.pop();
        }
        None
    }

    /// Disarms and returns every timer due at `now`, earliest first.
    pub fn take_expired(&mut self, now: Timestamp) -> Vec<TimerEvent> {
        let mut expired = Vec::new();
        while let Some(Reverse((deadline, handle))) = self.deadlines.peek().copied() {
            if deadline > now {
                break;
            }
            self.deadlines.pop();
            if let Some(event) = self.timers.remove(&handle) {
                expired.push(event);
            }
        }
        expired
    }
}

impl fmt::Debug for UdpPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpPlatform")
            .field("sockets", &self.sockets)
            .field("timers", &self.timers.len())
            .finish()
    }
}

impl Platform for UdpPlatform {
    fn now(&mut self) -> Timestamp {
        self.clock.now()
    }

    fn set_timer(&mut self, delay_us: u64, event: TimerEvent) -> Option<TimerHandle> {
        self.next_timer += 1;
        let handle = TimerHandle(self.next_timer);
        let deadline = self.clock.now().adding(delay_us);
        self.deadlines.push(Reverse((deadline, handle)));
        self.timers.insert(handle, event);
        Some(handle)
    }

    fn cancel_timer(&mut self, handle: TimerHandle) {
        self.timers.remove(&handle);
    }

    fn transmit(&mut self, ifndx: usize, destination: &FaceAddress, bytes: &[u8]) {
        let Some(socket) = self.socket(ifndx) else {
            log::warn!("Interface {} has no socket, dropping {} bytes", ifndx, bytes.len());
            return;
        };
        let Some(address) = destination.socket_addr() else {
            log::debug!("Cannot reach {} over UDP", destination);
            return;
        };
        match socket.send_to(bytes, address) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                log::debug!("Socket busy, dropping {} bytes to {}", bytes.len(), address)
            }
            Err(e) => log::warn!("Sending to {} failed: {}", address, e),
        }
    }

    fn deliver_to_application(&mut self, name: &Prefix, chunk: Option<u32>, payload: &[u8]) {
        self.delivered.push(Delivery {
            name: name.clone(),
            chunk,
            payload: payload.to_vec(),
        });
    }

    fn tap_interest(&mut self, name: &Prefix, bytes: &[u8]) {
        self.tapped.push((name.clone(), bytes.to_vec()));
    }
}

/// Runs `relay` until `stop` is set: datagrams arriving on the bound
/// sockets go to `Relay::receive`, due timers to `Relay::on_timer`.
#[cfg(any(unix, windows))]
pub fn run_relay(relay: &mut Relay<UdpPlatform>, stop: &AtomicBool) -> Result<(), RelayError> {
    use super::poller::{ReadPoller, SocketId};

    let mut poller = ReadPoller::new()?;
    for ifndx in 0..relay.interface_count() {
        if let Some(socket) = relay.platform().socket(ifndx) {
            poller.register(ifndx, SocketId::of(socket)?)?;
        }
    }

    relay.start()?;
    let mut ready = Vec::new();
    let mut buffer = vec![0u8; MAX_DATAGRAM];

    while !stop.load(Ordering::Relaxed) {
        let now = relay.platform_mut().now();
        let timeout = relay
            .platform_mut()
            .next_deadline()
            .map(|deadline| Duration::from_micros(deadline.difference(&now).unwrap_or(0)))
            .map_or(MAX_WAIT, |wait| wait.min(MAX_WAIT));

        ready.clear();
        poller.wait(&mut ready, Some(timeout))?;

        for &ifndx in &ready {
            loop {
                let Some(socket) = relay.platform().socket(ifndx) else {
                    break;
                };
                let (len, from) = match socket.recv_from(&mut buffer) {
                    Ok(received) => received,
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) => return Err(e.into()),
                };
                if let Err(e) = relay.receive(ifndx, &buffer[..len], &from.into()) {
                    log::warn!("Datagram from {} dropped: {}", from, e);
                }
            }
        }

        let now = relay.platform_mut().now();
        for event in relay.platform_mut().take_expired(now) {
            relay.on_timer(event);
        }
    }

    relay.stop();
    Ok(())
}
