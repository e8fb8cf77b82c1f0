#![allow(dead_code)]

use iremoted::forward::{CommandSink, ForwardError};
use iremoted::{Element, EventType, InputEvent, RemoteDevice, SlideCommand, Usage};
use std::cell::RefCell;
use std::io::{self, Write};
use std::os::unix::io::OwnedFd;
use std::os::unix::net::UnixStream;
use std::rc::Rc;

pub type Log = Rc<RefCell<Vec<&'static str>>>;

/// A remote whose event stream is one end of a socket pair.
///
/// Every call is appended to `log`. `close` also checks whether the event queue still holds
/// its end of the pair, so tests can assert the queue was disposed first.
pub struct MockRemote {
    pub log: Log,
    pub elements: Vec<Element>,
    pub fail_open: bool,
    pub fail_elements: bool,
    source: Option<OwnedFd>,
    peer: Option<UnixStream>,
}

impl MockRemote {
    /// A remote with the given elements, plus the writing end of its event stream.
    pub fn connected(elements: Vec<Element>) -> (MockRemote, UnixStream) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let peer = theirs.try_clone().unwrap();
        let mut remote = MockRemote::with_source(elements, OwnedFd::from(ours));
        remote.peer = Some(peer);
        (remote, theirs)
    }

    /// Like [`connected`](Self::connected), but closing the returned stream ends the event
    /// stream.
    pub fn detached(elements: Vec<Element>) -> (MockRemote, UnixStream) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        (MockRemote::with_source(elements, OwnedFd::from(ours)), theirs)
    }

    pub fn with_source(elements: Vec<Element>, source: OwnedFd) -> MockRemote {
        MockRemote {
            log: Rc::default(),
            elements,
            fail_open: false,
            fail_elements: false,
            source: Some(source),
            peer: None,
        }
    }

    fn queue_released(&mut self) -> Option<bool> {
        if self.source.is_some() {
            return None;
        }
        let peer = self.peer.as_mut()?;
        match peer.write(&[0]) {
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
                ) =>
            {
                Some(true)
            }
            _ => Some(false),
        }
    }
}

impl RemoteDevice for MockRemote {
    fn open_exclusive(&mut self) -> io::Result<()> {
        self.log.borrow_mut().push("open");
        if self.fail_open {
            return Err(io::Error::from_raw_os_error(libc::EBUSY));
        }
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        let entry = match self.queue_released() {
            Some(true) => "close:queue-disposed",
            Some(false) => "close:queue-open",
            None => "close",
        };
        self.log.borrow_mut().push(entry);
        Ok(())
    }

    fn elements(&self) -> io::Result<Vec<Element>> {
        self.log.borrow_mut().push("elements");
        if self.fail_elements {
            return Err(io::ErrorKind::PermissionDenied.into());
        }
        Ok(self.elements.clone())
    }

    fn event_source(&mut self) -> io::Result<OwnedFd> {
        self.log.borrow_mut().push("event_source");
        self.source
            .take()
            .ok_or_else(|| io::ErrorKind::NotConnected.into())
    }
}

impl Drop for MockRemote {
    fn drop(&mut self) {
        self.log.borrow_mut().push("release");
    }
}

/// The six buttons of the remote on cookies 0x10 (Right) to 0x15 (AppMenu).
pub fn remote_elements() -> Vec<Element> {
    vec![
        Element::hid(0, 0x10, Usage::SYSTEM_MENU_RIGHT),
        Element::hid(1, 0x11, Usage::SYSTEM_MENU_LEFT),
        Element::hid(2, 0x12, Usage::SYSTEM_MENU_UP),
        Element::hid(3, 0x13, Usage::SYSTEM_MENU_DOWN),
        Element::hid(4, 0x14, Usage::SYSTEM_MENU),
        Element::hid(5, 0x15, Usage::SYSTEM_APP_MENU),
    ]
}

pub fn key_event(code: u16, value: i32) -> InputEvent {
    InputEvent::new(EventType::KEY, code, value)
}

pub fn syn_report() -> InputEvent {
    InputEvent::new(EventType::SYNCHRONIZATION, 0, 0)
}

pub fn scan_event(usage: Usage) -> InputEvent {
    InputEvent::new(EventType::MISC, 4, usage.to_scancode() as i32)
}

/// A press-and-release as a HID receiver reports it.
pub fn key_click(code: u16, usage: Usage) -> Vec<InputEvent> {
    vec![
        scan_event(usage),
        key_event(code, 1),
        syn_report(),
        scan_event(usage),
        key_event(code, 0),
        syn_report(),
    ]
}

pub fn write_events(stream: &mut UnixStream, events: &[InputEvent]) {
    let bytes = unsafe {
        std::slice::from_raw_parts(events.as_ptr() as *const u8, std::mem::size_of_val(events))
    };
    stream.write_all(bytes).unwrap();
}

/// Output captured from the dispatcher.
#[derive(Clone, Default)]
pub struct SharedOutput(Rc<RefCell<Vec<u8>>>);

impl SharedOutput {
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.borrow())
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Records delivered slide commands.
#[derive(Clone, Default)]
pub struct Recorder(Rc<RefCell<Vec<SlideCommand>>>);

impl Recorder {
    pub fn commands(&self) -> Vec<SlideCommand> {
        self.0.borrow().clone()
    }
}

impl CommandSink for Recorder {
    fn deliver(&mut self, command: SlideCommand) -> Result<(), ForwardError> {
        self.0.borrow_mut().push(command);
        Ok(())
    }
}
