//! The per-session event queue.
//!
//! The kernel already keeps a ring buffer of input events for every open evdev client; the
//! queue owns a duplicate of the device descriptor, subscribes to a set of cookies and hands
//! each matching key event to a bound handler from the tokio run loop.

use crate::compat::input_event;
use crate::{Cookie, CookieSet, CookieTable, Error, EventType, InputEvent, Synchronization};
use nix::fcntl;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::time::SystemTime;
use std::{fmt, io, mem};
use tokio::io::unix::AsyncFd;

/// Number of events read from the kernel per batch.
pub const DEFAULT_QUEUE_DEPTH: usize = 8;

/// Lifecycle of an [`EventQueue`]. Transitions only ever move forward.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QueueState {
    Created,
    Registered,
    Bound,
    Started,
    Stopped,
    Disposed,
    /// Binding to the run loop failed; the queue will never start.
    Failed,
}

/// A press or release of a registered element.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueuedEvent {
    pub cookie: Cookie,
    /// Nonzero while the button is held (2 for kernel autorepeat), zero on release.
    pub value: i32,
    pub timestamp: SystemTime,
}

impl QueuedEvent {
    #[inline]
    pub fn is_pressed(&self) -> bool {
        self.value != 0
    }
}

/// Whether the event source is still delivering after a call to [`EventQueue::service`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QueueStatus {
    Open,
    Closed,
}

type Handler = Box<dyn FnMut(&QueuedEvent)>;

enum Source {
    Idle(OwnedFd),
    Bound(AsyncFd<OwnedFd>),
    Closed,
}

pub struct EventQueue {
    source: Source,
    depth: usize,
    elements: CookieSet,
    event_buf: Vec<input_event>,
    handler: Option<Handler>,
    state: QueueState,
}

impl EventQueue {
    /// Creates a queue reading from `fd`, `depth` events at a time.
    pub fn create(fd: OwnedFd, depth: usize) -> io::Result<Self> {
        if depth == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "event queue depth must be nonzero",
            ));
        }
        fcntl::fcntl(fd.as_raw_fd(), fcntl::F_SETFL(fcntl::OFlag::O_NONBLOCK))?;
        tracing::debug!(depth, "event queue created");
        Ok(EventQueue {
            source: Source::Idle(fd),
            depth,
            elements: CookieSet::new(),
            event_buf: Vec::with_capacity(depth),
            handler: None,
            state: QueueState::Created,
        })
    }

    fn expect_state(&self, op: &'static str, allowed: &[QueueState]) -> Result<(), Error> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::QueueState {
                op,
                state: self.state,
            })
        }
    }

    /// Subscribes to events of `cookie`. [`Cookie::UNSET`] is ignored.
    pub fn register(&mut self, cookie: Cookie) -> Result<(), Error> {
        self.expect_state("register", &[QueueState::Created, QueueState::Registered])?;
        self.state = QueueState::Registered;
        if cookie.is_unset() {
            return Ok(());
        }
        if self.elements.insert(cookie) {
            tracing::trace!(%cookie, "registered cookie");
        } else {
            tracing::warn!(%cookie, "cookie out of range, not registered");
        }
        Ok(())
    }

    /// Subscribes to every assigned cookie of `table`.
    pub fn register_table(&mut self, table: &CookieTable) -> Result<(), Error> {
        self.expect_state("register", &[QueueState::Created, QueueState::Registered])?;
        self.state = QueueState::Registered;
        for cookie in table.cookies() {
            self.register(cookie)?;
        }
        Ok(())
    }

    /// The cookies this queue is subscribed to.
    pub fn registered(&self) -> &CookieSet {
        &self.elements
    }

    /// Adds the queue to the current tokio reactor and installs `handler`.
    ///
    /// Must be called from within a runtime with I/O enabled. If the descriptor cannot be
    /// registered the queue is left [`Failed`](QueueState::Failed).
    pub fn bind<H>(&mut self, handler: H) -> Result<(), Error>
    where
        H: FnMut(&QueuedEvent) + 'static,
    {
        self.expect_state("bind", &[QueueState::Registered])?;
        let Source::Idle(fd) = mem::replace(&mut self.source, Source::Closed) else {
            return Err(Error::QueueState {
                op: "bind",
                state: self.state,
            });
        };
        match AsyncFd::new(fd) {
            Ok(fd) => {
                self.source = Source::Bound(fd);
                self.handler = Some(Box::new(handler));
                self.state = QueueState::Bound;
                tracing::debug!("event queue bound to run loop");
                Ok(())
            }
            Err(e) => {
                self.state = QueueState::Failed;
                Err(Error::Bind(e))
            }
        }
    }

    pub fn start(&mut self) -> Result<(), Error> {
        self.expect_state("start", &[QueueState::Bound])?;
        self.state = QueueState::Started;
        tracing::debug!("event queue started");
        Ok(())
    }

    /// Stops delivery and removes the queue from the run loop.
    pub fn stop(&mut self) -> Result<(), Error> {
        self.expect_state("stop", &[QueueState::Started])?;
        if let Source::Bound(fd) = mem::replace(&mut self.source, Source::Closed) {
            self.source = Source::Idle(fd.into_inner());
        }
        self.state = QueueState::Stopped;
        tracing::debug!("event queue stopped");
        Ok(())
    }

    /// Closes the descriptor and drops the handler. A started queue must be stopped first.
    pub fn dispose(&mut self) -> Result<(), Error> {
        self.expect_state(
            "dispose",
            &[
                QueueState::Created,
                QueueState::Registered,
                QueueState::Bound,
                QueueState::Stopped,
            ],
        )?;
        self.source = Source::Closed;
        self.handler = None;
        self.event_buf = Vec::new();
        self.state = QueueState::Disposed;
        tracing::debug!("event queue disposed");
        Ok(())
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    /// Waits until events are available, then delivers everything the kernel has buffered.
    ///
    /// Returns [`QueueStatus::Closed`] once the device has gone away.
    pub async fn service(&mut self) -> Result<QueueStatus, Error> {
        let state = self.state;
        let EventQueue {
            source,
            depth,
            elements,
            event_buf,
            handler,
            ..
        } = self;
        let (QueueState::Started, Source::Bound(fd)) = (state, source) else {
            return Err(Error::QueueState {
                op: "service",
                state,
            });
        };

        let mut drained = false;
        loop {
            let mut guard = fd.readable().await?;
            loop {
                match guard.try_io(|fd| fill_events(fd.as_raw_fd(), event_buf, *depth)) {
                    Ok(Ok(0)) => return Ok(QueueStatus::Closed),
                    Ok(Ok(_)) => {
                        drained = true;
                        deliver(event_buf, elements, handler);
                    }
                    Ok(Err(e)) if e.raw_os_error() == Some(libc::ENODEV) => {
                        return Ok(QueueStatus::Closed)
                    }
                    Ok(Err(e)) => return Err(Error::Io(e)),
                    Err(_would_block) => break,
                }
            }
            if drained {
                return Ok(QueueStatus::Open);
            }
        }
    }
}

/// Reads at most `depth` events into `buf`, replacing its contents.
///
/// Returns the number of bytes read, so that end-of-file can be told apart.
fn fill_events(fd: RawFd, buf: &mut Vec<input_event>, depth: usize) -> io::Result<usize> {
    buf.clear();
    buf.reserve(depth);

    let spare_capacity = &mut buf.spare_capacity_mut()[..depth];
    let spare_capacity_size = mem::size_of_val(spare_capacity);

    // use libc::read instead of nix::unistd::read b/c we need to pass an uninitialized buf
    let res = unsafe { libc::read(fd, spare_capacity.as_mut_ptr() as _, spare_capacity_size) };
    let bytes_read = nix::errno::Errno::result(res)? as usize;
    unsafe {
        buf.set_len(bytes_read / mem::size_of::<input_event>());
    }
    Ok(bytes_read)
}

fn deliver(events: &mut Vec<input_event>, elements: &CookieSet, handler: &mut Option<Handler>) {
    for ev in events.drain(..).map(InputEvent::from_raw) {
        match ev.event_type() {
            EventType::KEY => {
                let cookie = Cookie(ev.code());
                if !elements.contains(cookie) {
                    tracing::trace!(%cookie, "ignoring unregistered cookie");
                    continue;
                }
                let queued = QueuedEvent {
                    cookie,
                    value: ev.value(),
                    timestamp: ev.timestamp(),
                };
                tracing::trace!(?queued, "dispatching");
                if let Some(handler) = handler.as_mut() {
                    handler(&queued);
                }
            }
            EventType::SYNCHRONIZATION if ev.code() == Synchronization::SYN_DROPPED.0 => {
                tracing::debug!("kernel event buffer overflowed, events were dropped");
            }
            _ => {}
        }
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("state", &self.state)
            .field("depth", &self.depth)
            .field("elements", &self.elements)
            .finish_non_exhaustive()
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        if self.state == QueueState::Started {
            if let Err(e) = self.stop() {
                tracing::warn!("failed to stop event queue: {e}");
            }
        }
        if !matches!(self.state, QueueState::Disposed | QueueState::Failed) {
            if let Err(e) = self.dispose() {
                tracing::warn!("failed to dispose event queue: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Write;
    use std::os::unix::net::UnixStream;
    use std::rc::Rc;

    fn raw(type_: EventType, code: u16, value: i32) -> input_event {
        *InputEvent::new(type_, code, value).as_raw()
    }

    fn write_events(stream: &mut UnixStream, events: &[input_event]) {
        let bytes = unsafe { crate::cast_to_bytes(events) };
        stream.write_all(bytes).unwrap();
    }

    fn queue_pair() -> (EventQueue, UnixStream) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let queue = EventQueue::create(OwnedFd::from(ours), DEFAULT_QUEUE_DEPTH).unwrap();
        (queue, theirs)
    }

    fn recording(queue: &mut EventQueue) -> Rc<RefCell<Vec<(u16, i32)>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        queue
            .bind(move |ev: &QueuedEvent| sink.borrow_mut().push((ev.cookie.code(), ev.value)))
            .unwrap();
        seen
    }

    #[test]
    fn zero_depth_is_rejected() {
        let (ours, _theirs) = UnixStream::pair().unwrap();
        let err = EventQueue::create(OwnedFd::from(ours), 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn unset_cookie_is_not_registered() {
        let (mut queue, _theirs) = queue_pair();
        queue.register(Cookie::UNSET).unwrap();
        queue.register(Cookie(0x10)).unwrap();
        assert_eq!(queue.state(), QueueState::Registered);
        assert_eq!(queue.registered().iter().collect::<Vec<_>>(), [Cookie(0x10)]);
    }

    #[test]
    fn out_of_order_calls_are_rejected() {
        let (mut queue, _theirs) = queue_pair();
        assert!(matches!(
            queue.start(),
            Err(Error::QueueState {
                op: "start",
                state: QueueState::Created
            })
        ));
        assert!(queue.stop().is_err());
        queue.dispose().unwrap();
        assert!(queue.register(Cookie(0x10)).is_err());
        assert_eq!(queue.state(), QueueState::Disposed);
    }

    #[tokio::test]
    async fn started_queue_cannot_be_disposed() {
        let (mut queue, _theirs) = queue_pair();
        queue.register(Cookie(0x10)).unwrap();
        let _seen = recording(&mut queue);
        queue.start().unwrap();
        assert!(queue.dispose().is_err());
        queue.stop().unwrap();
        queue.dispose().unwrap();
    }

    #[tokio::test]
    async fn delivers_registered_key_events_in_order() {
        let (mut queue, mut theirs) = queue_pair();
        queue.register(Cookie(0x10)).unwrap();
        queue.register(Cookie(0x11)).unwrap();
        let seen = recording(&mut queue);
        queue.start().unwrap();

        write_events(
            &mut theirs,
            &[
                raw(EventType::MISC, 4, 0x0001_008a),
                raw(EventType::KEY, 0x10, 1),
                raw(EventType::SYNCHRONIZATION, 0, 0),
                raw(EventType::KEY, 0x20, 1),
                raw(EventType::SYNCHRONIZATION, Synchronization::SYN_DROPPED.0, 0),
                raw(EventType::KEY, 0x10, 0),
                raw(EventType::SYNCHRONIZATION, 0, 0),
                raw(EventType::KEY, 0x11, 2),
                raw(EventType::KEY, 0x11, 0),
                raw(EventType::SYNCHRONIZATION, 0, 0),
            ],
        );

        assert_eq!(queue.service().await.unwrap(), QueueStatus::Open);
        assert_eq!(
            *seen.borrow(),
            [(0x10, 1), (0x10, 0), (0x11, 2), (0x11, 0)]
        );
    }

    #[tokio::test]
    async fn reports_closed_source() {
        let (mut queue, theirs) = queue_pair();
        queue.register(Cookie(0x10)).unwrap();
        let seen = recording(&mut queue);
        queue.start().unwrap();
        drop(theirs);

        assert_eq!(queue.service().await.unwrap(), QueueStatus::Closed);
        assert!(seen.borrow().is_empty());
    }

    #[tokio::test]
    async fn bind_failure_leaves_queue_failed() {
        let file = std::fs::File::open(env!("CARGO_MANIFEST_DIR").to_owned() + "/Cargo.toml")
            .unwrap();
        let mut queue = EventQueue::create(OwnedFd::from(file), DEFAULT_QUEUE_DEPTH).unwrap();
        queue.register(Cookie(0x10)).unwrap();
        assert!(matches!(queue.bind(|_: &QueuedEvent| {}), Err(Error::Bind(_))));
        assert_eq!(queue.state(), QueueState::Failed);
        assert!(queue.start().is_err());
    }

    #[tokio::test]
    async fn drop_stops_and_disposes() {
        let (mut queue, mut theirs) = queue_pair();
        queue.register(Cookie(0x10)).unwrap();
        let _seen = recording(&mut queue);
        queue.start().unwrap();
        drop(queue);

        let err = theirs.write_all(&[0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
