use std::{io, net::UdpSocket, time::Duration};

use polling::{Event, PollMode};

// Owned duplicate of a socket handle, so the poller can outlive borrows of the platform
pub(crate) struct SocketId(
    #[cfg(unix)] std::os::fd::OwnedFd,
    #[cfg(windows)] std::os::windows::io::OwnedSocket,
);

impl SocketId {
    #[cfg(unix)]
    pub(crate) fn of(socket: &UdpSocket) -> io::Result<Self> {
        use std::os::fd::AsFd;
        Ok(SocketId(socket.as_fd().try_clone_to_owned()?))
    }

    #[cfg(windows)]
    pub(crate) fn of(socket: &UdpSocket) -> io::Result<Self> {
        use std::os::windows::io::AsSocket;
        Ok(SocketId(socket.as_socket().try_clone_to_owned()?))
    }

    #[cfg(unix)]
    fn raw_source(&self) -> std::os::fd::RawFd {
        use std::os::fd::AsRawFd;
        self.0.as_raw_fd()
    }

    #[cfg(unix)]
    fn source(&self) -> std::os::fd::BorrowedFd<'_> {
        use std::os::fd::AsFd;
        self.0.as_fd()
    }

    #[cfg(windows)]
    fn raw_source(&self) -> std::os::windows::io::RawSocket {
        use std::os::windows::io::AsRawSocket;
        self.0.as_raw_socket()
    }

    #[cfg(windows)]
    fn source(&self) -> std::os::windows::io::BorrowedSocket<'_> {
        use std::os::windows::io::AsSocket;
        self.0.as_socket()
    }
}

/// Waits for any of the registered interface sockets to become readable.
pub(crate) struct ReadPoller {
    sockets: Vec<(usize, SocketId)>,
    socket_poller: polling::Poller,
    socket_events: polling::Events,
    should_re_add: bool,
}

impl ReadPoller {
    pub(crate) fn new() -> io::Result<Self> {
        let socket_poller = polling::Poller::new()?;
        let should_re_add = !socket_poller.supports_level();
        Ok(Self {
            sockets: Vec::new(),
            socket_poller,
            socket_events: polling::Events::new(),
            should_re_add,
        })
    }

    pub(crate) fn register(&mut self, ifndx: usize, socket: SocketId) -> io::Result<()> {
        let idx = match self.find(ifndx) {
            Ok(idx) => {
                let old = std::mem::replace(&mut self.sockets[idx].1, socket);
                let _ = self.socket_poller.delete(old.source());
                idx
            }
            Err(idx) => {
                self.sockets.insert(idx, (ifndx, socket));
                idx
            }
        };

        let mode = if self.should_re_add {
            PollMode::Oneshot
        } else {
            PollMode::Level
        };
        // Every source added here is deleted again on replacement and in drop
        unsafe {
            self.socket_poller.add_with_mode(
                self.sockets[idx].1.raw_source(),
                Event::readable(ifndx),
                mode,
            )
        }
    }

    /// Appends the indices of readable interfaces to `ready`.
    pub(crate) fn wait(&mut self, ready: &mut Vec<usize>, timeout: Option<Duration>) -> io::Result<()> {
        self.socket_events.clear();
        self.socket_poller.wait(&mut self.socket_events, timeout)?;

        for event in self.socket_events.iter() {
            if !event.readable {
                continue;
            }
            ready.push(event.key);
            if self.should_re_add {
                if let Ok(idx) = self.find(event.key) {
                    self.socket_poller
                        .modify(self.sockets[idx].1.source(), Event::readable(event.key))?;
                }
            }
        }
        Ok(())
    }

    fn find(&self, ifndx: usize) -> Result<usize, usize> {
        self.sockets.binary_search_by(|(i, _)| i.cmp(&ifndx))
    }
}

impl Drop for ReadPoller {
    fn drop(&mut self) {
        for (_, socket) in self.sockets.drain(..) {
            let _ = self.socket_poller.delete(socket.source());
        }
    }
}
