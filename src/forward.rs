//! Forwarding slide commands to a presentation application.
//!
//! A command is a single datagram on a Unix socket: the event class `Kntc`, the event id
//! (`steF` to advance, `steB` to go back) and the target application's identifier.

use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Event class of every slide command.
pub const EVENT_CLASS: [u8; 4] = *b"Kntc";

/// Identifier of the presentation application commands are addressed to by default.
pub const DEFAULT_APP_ID: &str = "com.apple.iWork.Keynote";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlideCommand {
    Forward,
    Backward,
}

impl SlideCommand {
    pub fn event_id(self) -> [u8; 4] {
        match self {
            SlideCommand::Forward => *b"steF",
            SlideCommand::Backward => *b"steB",
        }
    }
}

/// Builds the datagram for `command` addressed to `app_id`.
pub fn encode_message(command: SlideCommand, app_id: &str) -> Vec<u8> {
    let mut message = Vec::with_capacity(8 + app_id.len());
    message.extend_from_slice(&EVENT_CLASS);
    message.extend_from_slice(&command.event_id());
    message.extend_from_slice(app_id.as_bytes());
    message
}

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to create socket: {0}")]
    Socket(#[source] io::Error),
    #[error("failed to send to {}: {source}", path.display())]
    Send {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Destination for slide commands.
pub trait CommandSink {
    fn deliver(&mut self, command: SlideCommand) -> Result<(), ForwardError>;
}

impl<S: CommandSink + ?Sized> CommandSink for Box<S> {
    fn deliver(&mut self, command: SlideCommand) -> Result<(), ForwardError> {
        (**self).deliver(command)
    }
}

/// Sends commands as datagrams to the socket at a fixed path.
///
/// The socket is created on first use; nothing is bound or connected up front, so a target
/// that starts after the monitor still receives commands. Sends never block: when the target's
/// receive queue is full the command is dropped with [`ForwardError::Send`].
#[derive(Debug)]
pub struct DatagramSink {
    app_id: String,
    path: PathBuf,
    socket: Option<UnixDatagram>,
}

impl DatagramSink {
    pub fn new(app_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        DatagramSink {
            app_id: app_id.into(),
            path: path.into(),
            socket: None,
        }
    }

    /// `$XDG_RUNTIME_DIR/<app_id>.sock`, or the same name in the temp dir.
    pub fn default_path(app_id: &str) -> PathBuf {
        let dir = std::env::var_os("XDG_RUNTIME_DIR")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        dir.join(format!("{app_id}.sock"))
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CommandSink for DatagramSink {
    fn deliver(&mut self, command: SlideCommand) -> Result<(), ForwardError> {
        let socket = match self.socket.take() {
            Some(socket) => socket,
            None => {
                let socket = UnixDatagram::unbound().map_err(ForwardError::Socket)?;
                // A target that stops reading must not stall the run loop.
                socket.set_nonblocking(true).map_err(ForwardError::Socket)?;
                socket
            }
        };
        let socket = self.socket.insert(socket);
        let message = encode_message(command, &self.app_id);
        socket
            .send_to(&message, &self.path)
            .map_err(|source| ForwardError::Send {
                path: self.path.clone(),
                source,
            })?;
        tracing::debug!(?command, path = %self.path.display(), "slide command sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("iremoted-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn message_layout() {
        assert_eq!(
            encode_message(SlideCommand::Forward, DEFAULT_APP_ID),
            b"KntcsteFcom.apple.iWork.Keynote"
        );
        assert_eq!(encode_message(SlideCommand::Backward, "x"), b"KntcsteBx");
    }

    #[test]
    fn delivers_datagrams_in_order() {
        let dir = scratch_dir("deliver");
        let path = dir.join("target.sock");
        let receiver = UnixDatagram::bind(&path).unwrap();

        let mut sink = DatagramSink::new("org.example.Slides", &path);
        sink.deliver(SlideCommand::Forward).unwrap();
        sink.deliver(SlideCommand::Backward).unwrap();

        let mut buf = [0u8; 64];
        let n = receiver.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"KntcsteForg.example.Slides");
        let n = receiver.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"KntcsteBorg.example.Slides");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_target_is_a_send_error() {
        let dir = scratch_dir("missing");
        let path = dir.join("nobody.sock");
        let mut sink = DatagramSink::new(DEFAULT_APP_ID, &path);

        match sink.deliver(SlideCommand::Forward) {
            Err(ForwardError::Send { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected result: {other:?}"),
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn full_target_queue_drops_commands_without_blocking() {
        let dir = scratch_dir("full");
        let path = dir.join("stalled.sock");
        let _receiver = UnixDatagram::bind(&path).unwrap();
        let mut sink = DatagramSink::new(DEFAULT_APP_ID, &path);

        let mut dropped = 0;
        for _ in 0..1000 {
            match sink.deliver(SlideCommand::Forward) {
                Ok(()) => {}
                Err(ForwardError::Send { source, .. }) => {
                    assert_eq!(source.kind(), io::ErrorKind::WouldBlock);
                    dropped += 1;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(dropped > 0);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn default_path_ends_with_app_id() {
        let path = DatagramSink::default_path("org.example.Slides");
        assert_eq!(
            path.file_name().unwrap(),
            std::ffi::OsStr::new("org.example.Slides.sock")
        );
    }
}
