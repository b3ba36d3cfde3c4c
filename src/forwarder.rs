use alloc::vec::Vec;

use crate::{
    error::RelayError,
    face::FaceFlags,
    matching::needs_digest,
    packet::Packet,
    platform::Platform,
    relay::Relay,
    tables::{ContentFlags, ContentToken, DisplayName, FaceToken, FibDestination, InterestEntry, InterestToken},
};

impl<P: Platform> Relay<P> {
    /// An interest arrived on `from`.
    ///
    /// Interests with a nonce seen before are dropped. A cached answer is
    /// served right away. Otherwise the interest joins an existing PIT entry
    /// for the same request, or starts a new one that is propagated along
    /// every covering FIB rule when the interest may leave this node.
    pub(crate) fn handle_interest(&mut self, from: FaceToken, packet: Packet) -> Result<(), RelayError> {
        let suite = packet.suite();
        if let Some(nonce) = packet.nonce() {
            if self.nonces.seen_before(suite, nonce) {
                relay_log!(self, Debug, "Dropping {}, nonce already seen", DisplayName(&packet));
                return Ok(());
            }
        }

        let now = self.now();
        if let Some(hit) = self.cs_lookup(&packet) {
            self.cs.touch(hit, now);
            let Some(content) = self.cs.get(hit).map(|e| e.packet.clone()) else {
                return Ok(());
            };
            relay_log!(self, Trace, "Answering {} from the content store", DisplayName(&packet));
            return self.serve(from, &content);
        }

        let codec = self.codecs.get(suite).ok_or(RelayError::Unsupported(suite))?;
        if let Some(token) = self.pit.find(|pending| codec.same_interest(pending, &packet)) {
            if let Some(entry) = self.pit.get_mut(token) {
                entry.add_pending(from, now);
            }
            let forward_all = self
                .faces
                .get(from.0)
                .is_some_and(|f| f.flags.contains(FaceFlags::FWDALLI));
            if forward_all {
                self.propagate(token)?;
            }
            return Ok(());
        }

        let may_forward = codec.may_forward(&packet);
        let token = self.pit.insert(InterestEntry::new(packet, from, now));
        if may_forward {
            self.propagate(token)?;
        } else {
            relay_log!(self, Debug, "Interest stays local, not propagating");
        }
        Ok(())
    }

    /// A content packet arrived on `from`. It is handed to every waiting
    /// face and cached, or dropped when nobody asked for it.
    pub(crate) fn handle_content(&mut self, from: FaceToken, packet: Packet) -> Result<(), RelayError> {
        if self.cs.find_duplicate(&packet).is_some() {
            relay_log!(self, Debug, "Already cached: {}", DisplayName(&packet));
            return Ok(());
        }

        if self.serve_pending(&packet) == 0 {
            relay_log!(self, Debug, "Unsolicited {} from {:?}", DisplayName(&packet), from);
            return Ok(());
        }

        if self.cs.is_enabled() {
            let now = self.now();
            self.cs.insert(packet, ContentFlags::empty(), now)?;
        }
        Ok(())
    }

    /// Serves `content` to the faces of every PIT entry it answers and drops
    /// those entries. Each face receives the content at most once per call.
    /// Returns the number of entries satisfied.
    pub(crate) fn serve_pending(&mut self, content: &Packet) -> usize {
        let Some(name) = content.prefix() else {
            return 0;
        };
        let Some(codec) = self.codecs.get(content.suite()) else {
            return 0;
        };

        let platform = &mut self.platform;
        let mut satisfied = Vec::new();
        for (token, entry) in self.pit.iter() {
            if entry.packet.suite() != content.suite() {
                continue;
            }
            let Some(wanted) = entry.packet.prefix() else {
                continue;
            };
            let digest = match needs_digest(wanted, name) {
                true => content.digest_with(|b| platform.sha256(b)).map(|d| d.as_bytes()),
                false => None,
            };
            if codec.admits(&entry.packet, content, digest) {
                satisfied.push(token);
            }
        }

        let mut count = 0;
        for token in satisfied {
            let Some(entry) = self.pit.remove(token) else {
                continue;
            };
            count += 1;
            for face in entry.pending_faces() {
                let Some(f) = self.faces.get_mut(face.0) else {
                    continue;
                };
                if f.flags.contains(FaceFlags::SERVED) {
                    continue;
                }
                f.flags.insert(FaceFlags::SERVED);
                if let Err(e) = self.serve(face, content) {
                    relay_log!(self, Debug, "Could not serve {:?}: {}", face, e);
                }
            }
        }

        for (_, face) in self.faces.iter_mut() {
            face.flags.remove(FaceFlags::SERVED);
        }
        count
    }

    /// Hands the interest of a PIT entry to every FIB rule covering its name,
    /// never back to the face it came from unless that face reflects.
    /// Returns how many destinations took it.
    pub(crate) fn propagate(&mut self, token: InterestToken) -> Result<usize, RelayError> {
        let now = self.now();
        let Some(entry) = self.pit.get_mut(token) else {
            return Ok(0);
        };
        entry.last_attempt = now;
        let packet = entry.packet.clone();
        let from = entry.from;
        let Some(name) = packet.prefix() else {
            return Ok(0);
        };

        let reflect = self
            .faces
            .get(from.0)
            .is_some_and(|f| f.flags.contains(FaceFlags::REFLECT));
        let destinations: Vec<FibDestination> =
            self.fib.matches(name).map(|rule| rule.destination).collect();

        let mut sent = 0;
        for destination in destinations {
            let face = match destination {
                FibDestination::Tap => {
                    self.platform.tap_interest(name, packet.bytes());
                    sent += 1;
                    continue;
                }
                FibDestination::Face(face) if face == from && !reflect => continue,
                FibDestination::Face(face) => face,
            };
            // Interests routed to the local application take the tap
            if self.faces.get(face.0).is_some_and(|f| f.is_local()) {
                self.platform.tap_interest(name, packet.bytes());
                sent += 1;
                continue;
            }
            match self.face_enqueue(face, packet.suite(), packet.buffer()) {
                Ok(true) => sent += 1,
                Ok(false) => {}
                Err(e) => relay_log!(self, Debug, "Not forwarding to {:?}: {}", face, e),
            }
        }
        relay_log!(self, Trace, "{} went to {} destinations", name, sent);
        Ok(sent)
    }

    /// Sends a copy of `content` to `face`, or up to the application when
    /// `face` is the local one.
    pub(crate) fn serve(&mut self, face: FaceToken, content: &Packet) -> Result<(), RelayError> {
        let f = self.faces.get(face.0).ok_or(RelayError::NoSuchFace)?;
        if f.is_local() {
            if let Some(name) = content.prefix() {
                let payload = content.content().unwrap_or_default();
                self.platform
                    .deliver_to_application(name, name.chunknum(), payload);
            }
            return Ok(());
        }
        self.face_enqueue(face, content.suite(), content.buffer())
            .map(|_| ())
    }

    fn cs_lookup(&mut self, interest: &Packet) -> Option<ContentToken> {
        let wanted = interest.prefix()?;
        let codec = self.codecs.get(interest.suite())?;
        let platform = &mut self.platform;
        for (token, entry) in self.cs.iter() {
            if entry.packet.suite() != interest.suite() {
                continue;
            }
            if interest.must_be_fresh() && entry.flags.contains(ContentFlags::STALE) {
                continue;
            }
            let Some(name) = entry.packet.prefix() else {
                continue;
            };
            let digest = match needs_digest(wanted, name) {
                true => entry
                    .packet
                    .digest_with(|b| platform.sha256(b))
                    .map(|d| d.as_bytes()),
                false => None,
            };
            if codec.admits(interest, &entry.packet, digest) {
                return Some(token);
            }
        }
        None
    }
}
