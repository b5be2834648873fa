// Copyright (C) 2024-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of journal-tracing.
//
// journal-tracing is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// mpdpopm is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details.
//
// You should have received a copy of the GNU General Public License along with mpdpopm.  If not,
// see <http://www.gnu.org/licenses/>.

//! The journal transport layer.
//!
//! This module defines the [`Transport`] trait that all implementations must support, as well as
//! the Unix datagram implementation that speaks to the journal's well-known socket.
//!
//! # Examples
//!
//! To send entries to the journal daemon on this host:
//!
//! ```no_run
//! use journal_tracing::transport::JournalSocket;
//! let transpo = JournalSocket::try_default().unwrap();
//! ```
//!
//! To a journal socket at a non-standard path (a test harness, a container bind-mount):
//!
//! ```rust
//! use journal_tracing::transport::JournalSocket;
//! let transpo = JournalSocket::new("/i/am/not/there.s");
//! assert!(transpo.is_err()); // no such socket, after all
//! ```

use crate::error::{Error, Result};

use backtrace::Backtrace;

#[cfg(unix)]
use std::os::unix::net::UnixDatagram;
use std::path::Path;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      transport mechanisms                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Operations all transport layers must support.
pub trait Transport {
    /// Send a slice of byte on this transport mechanism.
    ///
    /// It would be nice to make this more general, to accept input in a variety of forms that
    /// might support zero-copy, but at the end of the day a datagram socket operates on a
    /// contiguous slice of `u8`, so we require that our caller assemble one.
    fn send(&self, buf: &[u8]) -> Result<usize>;
}

/// The path at which the journal daemon listens for native-protocol datagrams.
#[cfg(unix)]
pub const JOURNAL_SOCKET_PATH: &str = "/run/systemd/journal/socket";

/// Sending journal entries via Unix socket (datagram).
///
/// One datagram per entry; the daemon treats the payload as a complete entry, so no framing
/// beyond the native protocol itself is required. An entry too large for the socket's buffer
/// fails at [`send`](Transport::send) and is discarded upstream like any other delivery failure.
#[cfg(unix)]
#[derive(Debug)]
pub struct JournalSocket {
    socket: UnixDatagram,
}

#[cfg(unix)]
impl JournalSocket {
    /// Construct a [`Transport`] implementation via Unix datagram sockets at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<JournalSocket> {
        let sock = UnixDatagram::unbound().map_err(|err| Error::Transport {
            source: Box::new(err),
            back: Backtrace::new(),
        })?;
        sock.connect(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::NoJournal {
                    path: path.as_ref().to_path_buf(),
                    back: Backtrace::new(),
                }
            } else {
                Error::Transport {
                    source: Box::new(err),
                    back: Backtrace::new(),
                }
            }
        })?;
        Ok(JournalSocket { socket: sock })
    }
    /// Construct a [`Transport`] implementation speaking to the journal daemon at its well-known
    /// socket.
    pub fn try_default() -> Result<JournalSocket> {
        JournalSocket::new(JOURNAL_SOCKET_PATH)
    }
    /// Is a journal daemon listening on this host?
    ///
    /// Mirrors the usual "journal enabled" check: the well-known socket is present. Useful for
    /// deciding at startup whether to install the layer at all (and in this crate's test suite).
    pub fn exists() -> bool {
        Path::new(JOURNAL_SOCKET_PATH).exists()
    }
}

#[cfg(unix)]
impl Transport for JournalSocket {
    fn send(&self, buf: &[u8]) -> Result<usize> {
        let cb_written = self.socket.send(buf).map_err(|err| Error::Transport {
            source: Box::new(err),
            back: Backtrace::new(),
        })?;
        Ok(cb_written)
    }
}

#[cfg(all(test, unix))]
mod test {

    use super::*;

    #[test]
    fn missing_socket_is_reported() {
        let err = JournalSocket::new("/i/am/not/there.s").unwrap_err();
        assert!(format!("{}", err).contains("/i/am/not/there.s"));
    }

    #[test]
    fn datagrams_arrive_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.socket");
        let daemon = UnixDatagram::bind(&path).unwrap();

        let transpo = JournalSocket::new(&path).unwrap();
        let sent = transpo.send(b"PRIORITY=6\nMESSAGE=hello\n").unwrap();
        assert_eq!(sent, 25);

        let mut buf = [0_u8; 128];
        let received = daemon.recv(&mut buf).unwrap();
        assert_eq!(&buf[..received], b"PRIORITY=6\nMESSAGE=hello\n");
    }
}
