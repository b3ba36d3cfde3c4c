//! The relay: owner of every table and entry point for all events.
//!
//! A [`Relay`] is driven from outside. Wire bytes come in through
//! [`Relay::receive`], timers armed through the [`Platform`] come back through
//! [`Relay::on_timer`], and the management operations below change routes and
//! content. Each call runs to completion before returning.

use alloc::{format, vec, vec::Vec};

use crate::{
    codec::{switch, Codecs, DecodeError, EncodeError},
    config::RelayConfig,
    error::RelayError,
    face::{Face, FaceAddress, FaceFlags, FragmentationPolicy, Interface, MAX_INTERFACES},
    packet::{ContentOptions, InterestOptions, Packet, PacketKind},
    platform::{Platform, TimerEvent, TimerHandle},
    prefix::Prefix,
    suite::{sniff, Suite},
    tables::{
        ContentFlags, ContentStore, FaceToken, Fib, FibDestination, NonceRing, Pit, Slots,
    },
    timestamp::Timestamp,
};

/// Logs through the relay's platform.
macro_rules! relay_log {
    ($relay:expr, $level:ident, $($arg:tt)+) => {
        $relay.platform.log(log::Level::$level, format_args!($($arg)+))
    };
}

// Nested fragments are never reassembled
const MAX_REASSEMBLY_DEPTH: u8 = 1;

pub(crate) struct Timeouts {
    pub content_us: u64,
    pub interest_us: u64,
    pub face_us: u64,
    pub ageing_interval_us: u64,
    pub max_interest_retransmit: u32,
}

impl Timeouts {
    fn from_config(config: &RelayConfig) -> Self {
        Self {
            content_us: config.content_timeout_s.saturating_mul(1_000_000),
            interest_us: config.interest_timeout_s.saturating_mul(1_000_000),
            face_us: config.face_timeout_s.saturating_mul(1_000_000),
            ageing_interval_us: config.ageing_interval_ms.saturating_mul(1_000),
            max_interest_retransmit: config.max_interest_retransmit,
        }
    }
}

pub struct Relay<P: Platform> {
    pub(crate) platform: P,
    pub(crate) codecs: Codecs,
    pub(crate) faces: Slots<Face>,
    pub(crate) interfaces: Vec<Interface>,
    pub(crate) pit: Pit,
    pub(crate) fib: Fib,
    pub(crate) cs: ContentStore,
    pub(crate) nonces: NonceRing,
    pub(crate) timeouts: Timeouts,
    local_face: Option<FaceToken>,
    ageing_timer: Option<TimerHandle>,
    nonce_state: u32,
}

impl<P: Platform> Relay<P> {
    pub fn new(platform: P) -> Self {
        let config = RelayConfig::default();
        let mut platform = platform;
        let seed = platform.now().us_since_epoch as u32;
        Self {
            platform,
            codecs: Codecs::default(),
            faces: Slots::new(),
            interfaces: Vec::new(),
            pit: Pit::new(),
            fib: Fib::new(),
            cs: ContentStore::new(config.max_cache_entries),
            nonces: NonceRing::new(config.max_nonces),
            timeouts: Timeouts::from_config(&config),
            local_face: None,
            ageing_timer: None,
            nonce_state: seed | 1,
        }
    }

    /// A relay with the limits, interfaces and routes of `config`.
    pub fn with_config(platform: P, config: &RelayConfig) -> Result<Self, RelayError> {
        let mut relay = Self::new(platform);
        relay.cs.set_max_entries(config.max_cache_entries);
        relay.nonces = NonceRing::new(config.max_nonces);
        relay.timeouts = Timeouts::from_config(config);

        for interface in &config.interfaces {
            let address = interface.address.parse().map_err(|_| {
                RelayError::Config(format!("bad interface address {:?}", interface.address))
            })?;
            let mut flags = FaceFlags::empty();
            flags.set(FaceFlags::REFLECT, interface.reflect);
            flags.set(FaceFlags::FWDALLI, interface.forward_all_interests);
            let ifndx = relay.add_interface(address, interface.mtu, flags)?;
            relay.set_interface_pacing(ifndx, interface.pacing_us)?;
        }

        for route in &config.routes {
            let suite: Suite = route
                .suite
                .parse()
                .map_err(|_| RelayError::Config(format!("unknown suite {:?}", route.suite)))?;
            let prefix = Prefix::from_uri(&route.prefix, suite)?;
            let next_hop = route.next_hop.parse().map_err(|_| {
                RelayError::Config(format!("bad next hop {:?}", route.next_hop))
            })?;
            let face = relay.add_face(route.interface, next_hop, FaceFlags::STATIC)?;
            relay.add_fib_rule(prefix, suite, FibDestination::Face(face))?;
        }

        Ok(relay)
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn codecs(&self) -> &Codecs {
        &self.codecs
    }

    pub fn pit(&self) -> &Pit {
        &self.pit
    }

    pub fn fib(&self) -> &Fib {
        &self.fib
    }

    pub fn content_store(&self) -> &ContentStore {
        &self.cs
    }

    pub fn set_max_cache_entries(&mut self, max_entries: i64) {
        self.cs.set_max_entries(max_entries);
    }

    /// Arms the periodic ageing sweep.
    pub fn start(&mut self) -> Result<(), RelayError> {
        if self.ageing_timer.is_none() {
            self.arm_ageing()?;
        }
        relay_log!(self, Info, "Relay started with {} interfaces", self.interfaces.len());
        Ok(())
    }

    /// Cancels every timer the relay has armed.
    pub fn stop(&mut self) {
        if let Some(handle) = self.ageing_timer.take() {
            self.platform.cancel_timer(handle);
        }
        for ifndx in 0..self.interfaces.len() {
            if let Some(handle) = self.interfaces[ifndx].cts_timer.take() {
                self.platform.cancel_timer(handle);
            }
        }
    }

    pub fn on_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::Ageing => {
                self.ageing_timer = None;
                self.age();
                if let Err(e) = self.arm_ageing() {
                    relay_log!(self, Warn, "Ageing stopped: {}", e);
                }
            }
            TimerEvent::InterfaceCts(ifndx) => self.interface_cts(ifndx),
        }
    }

    fn arm_ageing(&mut self) -> Result<(), RelayError> {
        let handle = self
            .platform
            .set_timer(self.timeouts.ageing_interval_us, TimerEvent::Ageing)
            .ok_or(RelayError::TimerUnavailable)?;
        self.ageing_timer = Some(handle);
        Ok(())
    }

    // Interfaces and faces

    pub fn add_interface(
        &mut self,
        address: FaceAddress,
        mtu: usize,
        flags: FaceFlags,
    ) -> Result<usize, RelayError> {
        if self.interfaces.len() >= MAX_INTERFACES {
            return Err(RelayError::TooManyInterfaces);
        }
        relay_log!(self, Info, "Interface {} on {}", self.interfaces.len(), address);
        self.interfaces.push(Interface::new(address, mtu, flags));
        Ok(self.interfaces.len() - 1)
    }

    /// Spaces transmissions on the interface `delay_us` apart, or lets them
    /// out back to back when None.
    pub fn set_interface_pacing(
        &mut self,
        ifndx: usize,
        delay_us: Option<u64>,
    ) -> Result<(), RelayError> {
        let interface = self
            .interfaces
            .get_mut(ifndx)
            .ok_or(RelayError::NoSuchInterface(ifndx))?;
        interface.pacing_us = delay_us;
        Ok(())
    }

    pub fn interface(&self, ifndx: usize) -> Option<&Interface> {
        self.interfaces.get(ifndx)
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    pub fn face(&self, face: FaceToken) -> Option<&Face> {
        self.faces.get(face.0)
    }

    pub fn faces(&self) -> impl Iterator<Item = (FaceToken, &Face)> + '_ {
        self.faces.iter().map(|(key, face)| (FaceToken(key), face))
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn find_face(&self, ifndx: usize, address: &FaceAddress) -> Option<FaceToken> {
        self.faces()
            .find(|(_, f)| f.ifndx == Some(ifndx) && f.address == *address)
            .map(|(token, _)| token)
    }

    /// The face for `address` on interface `ifndx`. An existing face gains
    /// `flags`, a new one also inherits the interface's flags and MTU.
    pub fn add_face(
        &mut self,
        ifndx: usize,
        address: FaceAddress,
        flags: FaceFlags,
    ) -> Result<FaceToken, RelayError> {
        let interface = self
            .interfaces
            .get(ifndx)
            .ok_or(RelayError::NoSuchInterface(ifndx))?;
        let inherited = interface.flags();
        let fragmentation = interface.fragmentation();

        if let Some(token) = self.find_face(ifndx, &address) {
            if let Some(face) = self.faces.get_mut(token.0) {
                face.flags.insert(flags);
            }
            return Ok(token);
        }

        let now = self.platform.now();
        relay_log!(self, Info, "New face {} on interface {}", address, ifndx);
        let face = Face::new(Some(ifndx), address, flags | inherited, fragmentation, now);
        Ok(FaceToken(self.faces.insert(face)))
    }

    pub fn get_face_or_create(
        &mut self,
        ifndx: usize,
        address: &FaceAddress,
    ) -> Result<FaceToken, RelayError> {
        match self.find_face(ifndx, address) {
            Some(token) => Ok(token),
            None => self.add_face(ifndx, address.clone(), FaceFlags::empty()),
        }
    }

    /// The face standing for the local application, created on first use.
    pub fn local_face(&mut self) -> FaceToken {
        if let Some(token) = self.local_face.filter(|t| self.faces.contains(t.0)) {
            return token;
        }
        let now = self.platform.now();
        let face = Face::new(
            None,
            FaceAddress::Local,
            FaceFlags::STATIC,
            FragmentationPolicy::None,
            now,
        );
        let token = FaceToken(self.faces.insert(face));
        self.local_face = Some(token);
        token
    }

    /// Tears a face down together with every reference to it.
    pub fn remove_face(&mut self, face: FaceToken) -> Result<(), RelayError> {
        let removed = self.faces.remove(face.0).ok_or(RelayError::NoSuchFace)?;
        if self.local_face == Some(face) {
            self.local_face = None;
        }
        let interests = self.pit.remove_face(face);
        let routes = self.fib.remove_face(face);
        let mut units = 0;
        for interface in self.interfaces.iter_mut() {
            units += interface.queue.remove_where(|r| r.face == Some(face));
        }
        relay_log!(
            self,
            Info,
            "Removed face {}: {} interests, {} routes, {} queued packets dropped",
            removed.address,
            interests,
            routes,
            removed.outq.len() + units
        );
        Ok(())
    }

    // Routes

    pub fn add_fib_rule(
        &mut self,
        prefix: Prefix,
        suite: Suite,
        destination: FibDestination,
    ) -> Result<(), RelayError> {
        if prefix.suite() != suite {
            return Err(RelayError::SuiteMismatch {
                prefix: prefix.suite(),
                rule: suite,
            });
        }
        if let FibDestination::Face(face) = destination {
            if !self.faces.contains(face.0) {
                return Err(RelayError::NoSuchFace);
            }
        }
        relay_log!(self, Info, "Route {} ({}) to {:?}", prefix, suite, destination);
        self.fib.insert(prefix, destination);
        Ok(())
    }

    pub fn remove_fib_rule(&mut self, prefix: &Prefix, suite: Suite) -> bool {
        prefix.suite() == suite && self.fib.remove(prefix)
    }

    // Content

    /// Pins `count` chunks of `bytes` in the content store, `chunk_size`
    /// bytes each (zero keeps `bytes` in one piece). Chunks are named
    /// `name` plus a chunk component counting up from `chunk_seq`; a single
    /// chunk without `chunk_seq` gets the bare name. Interests waiting for
    /// the new content are answered. Returns the number of chunks stored.
    pub fn add_content(
        &mut self,
        name: &Prefix,
        chunk_seq: Option<u32>,
        bytes: &[u8],
        chunk_size: usize,
        count: usize,
    ) -> Result<usize, RelayError> {
        let suite = name.suite();
        let codec = self.codecs.get(suite).ok_or(RelayError::Unsupported(suite))?;
        let pieces: Vec<&[u8]> = match chunk_size {
            0 => vec![bytes],
            size => bytes.chunks(size).collect(),
        };
        let first = chunk_seq.unwrap_or(0);
        let last = u32::try_from(count.saturating_sub(1))
            .ok()
            .and_then(|n| first.checked_add(n))
            .ok_or(EncodeError::ValueTooLong)?;

        let mut packets = Vec::with_capacity(count);
        for i in 0..count {
            let prefix = if chunk_seq.is_none() && count == 1 {
                name.clone()
            } else {
                // Cannot overflow, bounded by `last`
                name.with_chunk(first + i as u32)?
            };
            let options = ContentOptions {
                final_block_id: (count > 1).then_some(last),
                ..Default::default()
            };
            let payload = pieces.get(i).copied().unwrap_or_default();
            let wire = codec.encode_content(&prefix, payload, &options)?;
            packets.push(decode_whole(&self.codecs, suite, &wire)?);
        }

        let now = self.platform.now();
        let mut stored = 0;
        for packet in packets {
            if self
                .cs
                .insert(packet.clone(), ContentFlags::STATIC, now)?
                .is_some()
            {
                stored += 1;
            }
            self.serve_pending(&packet);
        }
        relay_log!(self, Info, "Stored {} chunks of {}", stored, name);
        Ok(stored)
    }

    /// Drops every cached packet named exactly `prefix`.
    pub fn remove_content(&mut self, prefix: &Prefix) -> usize {
        self.cs.remove_prefix(prefix)
    }

    /// Sends an interest on behalf of the local application. The answer
    /// arrives through `Platform::deliver_to_application`.
    pub fn request_content(&mut self, name: &Prefix, chunk_seq: Option<u32>) -> Result<(), RelayError> {
        let suite = name.suite();
        let prefix = match chunk_seq {
            Some(chunk) => name.with_chunk(chunk)?,
            None => name.clone(),
        };
        let options = InterestOptions {
            nonce: Some(self.next_nonce()),
            ..Default::default()
        };
        let codec = self.codecs.get(suite).ok_or(RelayError::Unsupported(suite))?;
        let wire = codec.encode_interest(&prefix, &options)?;
        let packet = decode_whole(&self.codecs, suite, &wire)?;
        let local = self.local_face();
        self.handle_interest(local, packet)
    }

    fn next_nonce(&mut self) -> [u8; 4] {
        // djb2 step keyed on the current table state
        let now = self.platform.now().us_since_epoch as u32;
        let key = (self.pit.len() as u32 + 1).wrapping_mul(7) ^ now;
        self.nonce_state = self.nonce_state.wrapping_mul(33) ^ key;
        self.nonce_state.to_be_bytes()
    }

    // Receive path

    /// Feeds wire bytes that arrived on interface `ifndx` from `from`. The
    /// buffer may hold several packets back to back; an encoding switch
    /// applies to everything after it. Processing stops at the first packet
    /// that cannot be decoded. Returns the number of packets handled.
    pub fn receive(
        &mut self,
        ifndx: usize,
        bytes: &[u8],
        from: &FaceAddress,
    ) -> Result<usize, RelayError> {
        if ifndx >= self.interfaces.len() {
            return Err(RelayError::NoSuchInterface(ifndx));
        }
        let face = self.get_face_or_create(ifndx, from)?;
        let now = self.platform.now();
        if let Some(f) = self.faces.get_mut(face.0) {
            f.last_used = now;
        }
        Ok(self.process_buffer(face, bytes, 0))
    }

    fn process_buffer(&mut self, face: FaceToken, bytes: &[u8], depth: u8) -> usize {
        let mut offset = 0;
        let mut switched: Option<Suite> = None;
        let mut handled = 0;

        while offset < bytes.len() {
            let rest = &bytes[offset..];
            let suite = match switch::dehead(rest) {
                Ok(Some((suite, skip))) => {
                    switched = Some(suite);
                    offset += skip;
                    continue;
                }
                Ok(None) => switched.or_else(|| sniff(rest)),
                Err(e) => {
                    relay_log!(self, Debug, "Bad encoding switch at {}: {}", offset, e);
                    break;
                }
            };
            let Some(suite) = suite else {
                relay_log!(self, Debug, "Unrecognised bytes at {}, dropping the rest", offset);
                break;
            };

            let (packet, consumed) = match self.codecs.decode(suite, rest) {
                Ok((_, 0)) => break,
                Ok(decoded) => decoded,
                Err(e) => {
                    relay_log!(self, Debug, "Dropping undecodable {} packet: {}", suite, e);
                    break;
                }
            };
            offset += consumed;
            handled += 1;

            if let Err(e) = self.dispatch(face, packet, depth) {
                relay_log!(self, Debug, "Packet from {:?} not handled: {}", face, e);
            }
        }
        handled
    }

    fn dispatch(&mut self, face: FaceToken, packet: Packet, depth: u8) -> Result<(), RelayError> {
        relay_log!(
            self,
            Trace,
            "{:?} {} from {:?}",
            packet.kind(),
            crate::tables::DisplayName(&packet),
            face
        );
        match packet.kind() {
            PacketKind::Interest => match packet.with_decremented_hop_limit() {
                Some(packet) => self.handle_interest(face, packet),
                None => {
                    relay_log!(self, Debug, "Hop limit exhausted, dropping interest");
                    Ok(())
                }
            },
            PacketKind::Content => self.handle_content(face, packet),
            PacketKind::Nack => {
                relay_log!(self, Debug, "Ignoring NACK from {:?}", face);
                Ok(())
            }
            PacketKind::Fragment => {
                if depth >= MAX_REASSEMBLY_DEPTH {
                    relay_log!(self, Debug, "Dropping fragment inside a fragment");
                    return Ok(());
                }
                let whole = self
                    .faces
                    .get_mut(face.0)
                    .ok_or(RelayError::NoSuchFace)?
                    .reassembler
                    .accept(&packet);
                if let Some(bytes) = whole {
                    self.process_buffer(face, &bytes, depth + 1);
                }
                Ok(())
            }
        }
    }

    pub(crate) fn now(&mut self) -> Timestamp {
        self.platform.now()
    }
}

/// Decodes a packet this relay just encoded, switch included.
fn decode_whole(codecs: &Codecs, suite: Suite, wire: &[u8]) -> Result<Packet, RelayError> {
    let skip = switch::dehead(wire)?.map_or(0, |(_, skip)| skip);
    let (packet, _) = codecs.decode(suite, &wire[skip..])?;
    if packet.suite() != suite {
        return Err(DecodeError::UnknownSuite.into());
    }
    Ok(packet)
}
