use alloc::{rc::Rc, vec, vec::Vec};

use crate::{
    error::RelayError,
    face::{InFlight, QueuedPacket, TxRequest},
    platform::{Platform, TimerEvent},
    relay::Relay,
    suite::Suite,
    tables::FaceToken,
};

// Two levels of queueing sit between the forwarder and the platform.
//  Every face keeps a FIFO of whole packets and releases one at a time,
//  carved into fragments if the face needs it. Every interface keeps a
//  bounded ring of units (packets or fragments) shared by all its faces.
//  When the platform has sent a face's last unit, the face releases its
//  next packet.

impl<P: Platform> Relay<P> {
    /// Queues `bytes` for `face`. Returns false, queueing nothing, when the
    /// face already has the same bytes waiting or in flight.
    pub(crate) fn face_enqueue(
        &mut self,
        face: FaceToken,
        suite: Suite,
        bytes: Rc<[u8]>,
    ) -> Result<bool, RelayError> {
        let f = self.faces.get_mut(face.0).ok_or(RelayError::NoSuchFace)?;
        if f.ifndx.is_none() {
            return Err(RelayError::LocalFace);
        }
        if f.is_queued(&bytes) {
            relay_log!(self, Debug, "Already queued for {:?}, not queueing twice", face);
            return Ok(false);
        }
        f.outq.push_back(QueuedPacket { suite, bytes });
        self.face_cts(face);
        Ok(true)
    }

    /// Moves the next packet of `face` to its interface once the previous
    /// one has left.
    pub(crate) fn face_cts(&mut self, face: FaceToken) {
        loop {
            let Some(f) = self.faces.get_mut(face.0) else {
                return;
            };
            let Some(ifndx) = f.ifndx else {
                return;
            };
            if f.in_flight.is_some() {
                return;
            }
            let Some(next) = f.outq.pop_front() else {
                return;
            };
            let destination = f.address.clone();

            let units: Vec<Rc<[u8]>> = match self.codecs.get(next.suite) {
                Some(codec) => match f.fragmenter.fragment(codec, &next.bytes) {
                    Ok(Some(fragments)) => fragments.into_iter().map(Rc::from).collect(),
                    Ok(None) => vec![next.bytes.clone()],
                    Err(e) => {
                        relay_log!(self, Warn, "Cannot fragment for {}: {}", destination, e);
                        continue;
                    }
                },
                None => vec![next.bytes.clone()],
            };
            f.in_flight = Some(InFlight {
                bytes: next.bytes,
                remaining: units.len(),
            });

            let mut rejected = 0;
            for bytes in units {
                let request = TxRequest {
                    face: Some(face),
                    destination: destination.clone(),
                    bytes,
                };
                if let Err(e) = self.interface_enqueue(ifndx, request) {
                    relay_log!(self, Warn, "Dropping packet for {}: {}", destination, e);
                    rejected += 1;
                }
            }

            if let Some(f) = self.faces.get_mut(face.0) {
                if let Some(in_flight) = f.in_flight.as_mut() {
                    in_flight.remaining = in_flight.remaining.saturating_sub(rejected);
                    if in_flight.remaining == 0 {
                        // Nothing of it made it into the ring, try the next packet
                        f.in_flight = None;
                        continue;
                    }
                }
            }
            self.interface_kick(ifndx);
            return;
        }
    }

    pub(crate) fn interface_enqueue(
        &mut self,
        ifndx: usize,
        request: TxRequest,
    ) -> Result<(), RelayError> {
        let interface = self
            .interfaces
            .get_mut(ifndx)
            .ok_or(RelayError::NoSuchInterface(ifndx))?;
        interface
            .queue
            .push(request)
            .map_err(|_| RelayError::QueueFull(ifndx))
    }

    // Starts sending from the ring unless that is already under way
    fn interface_kick(&mut self, ifndx: usize) {
        let Some(interface) = self.interfaces.get(ifndx) else {
            return;
        };
        if interface.draining || interface.queue.is_empty() {
            return;
        }
        match interface.pacing_us {
            Some(_) if interface.cts_timer.is_some() => {}
            Some(delay) => {
                let handle = self.platform.set_timer(delay, TimerEvent::InterfaceCts(ifndx));
                match handle {
                    Some(handle) => {
                        if let Some(interface) = self.interfaces.get_mut(ifndx) {
                            interface.cts_timer = Some(handle);
                        }
                    }
                    None => {
                        relay_log!(self, Warn, "No timer for interface {}, sending unpaced", ifndx);
                        self.interface_drain(ifndx);
                    }
                }
            }
            None => self.interface_drain(ifndx),
        }
    }

    /// The paced interface `ifndx` may send one unit.
    pub(crate) fn interface_cts(&mut self, ifndx: usize) {
        match self.interfaces.get_mut(ifndx) {
            Some(interface) => interface.cts_timer = None,
            None => return,
        }
        self.transmit_one(ifndx);
        self.interface_kick(ifndx);
    }

    fn interface_drain(&mut self, ifndx: usize) {
        if let Some(interface) = self.interfaces.get_mut(ifndx) {
            interface.draining = true;
        }
        while self.transmit_one(ifndx) {}
        if let Some(interface) = self.interfaces.get_mut(ifndx) {
            interface.draining = false;
        }
    }

    fn transmit_one(&mut self, ifndx: usize) -> bool {
        let Some(request) = self
            .interfaces
            .get_mut(ifndx)
            .and_then(|interface| interface.queue.pop())
        else {
            return false;
        };
        self.platform
            .transmit(ifndx, &request.destination, &request.bytes);
        self.tx_done(request);
        true
    }

    // One unit left; the face moves on once all units of its packet have
    fn tx_done(&mut self, request: TxRequest) {
        let Some(face) = request.face else {
            return;
        };
        let Some(f) = self.faces.get_mut(face.0) else {
            return;
        };
        let finished = match f.in_flight.as_mut() {
            Some(in_flight) => {
                in_flight.remaining = in_flight.remaining.saturating_sub(1);
                in_flight.remaining == 0
            }
            None => false,
        };
        if finished {
            f.in_flight = None;
            self.face_cts(face);
        }
    }
}
