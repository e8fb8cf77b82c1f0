//! Monitor an infrared remote control through the Linux evdev subsystem.
//!
//! The kernel exposes the remote's receiver as an input device node under `/dev/input`. Every
//! physical button on it is a hardware *element*, identified by the keycode the kernel maps it
//! to; this crate calls that identifier a [`Cookie`]. The HID usage behind each element is
//! only known at runtime, so the crate reads the device's keymap and builds a [`CookieTable`]
//! that assigns the six buttons of the remote (AppMenu, Select, Right, Left, Up, Down) to
//! whatever cookies the device actually uses.
//!
//! A session then runs through a fixed sequence:
//!
//! 1. [`device::discover`] finds the device by name, [`DeviceSession::open`] grabs it.
//! 2. [`element::resolve_device`] reads the keymap into a [`CookieTable`].
//! 3. An [`EventQueue`] subscribes to the table's cookies and is bound to the run loop.
//! 4. Each queued press or release reaches the [`Dispatcher`], which prints
//!    `<cookie> pressed|depressed` and, when forwarding is enabled, turns Right and Left
//!    presses into [`SlideCommand`]s for a presentation application.
//! 5. On shutdown the queue is stopped and disposed before the device is ungrabbed and closed.
//!
//! [`run::run`] drives all of this on a single-threaded tokio runtime:
//!
//! ```no_run
//! # async fn demo() -> Result<(), iremoted::Error> {
//! use iremoted::{device, forward::DatagramSink, run, RunConfig};
//!
//! let remote = device::discover(device::TARGET_DEVICE_NAME)?;
//! let sink = DatagramSink::new("com.apple.iWork.Keynote", "/run/user/1000/keynote.sock");
//! let config = RunConfig { forwarding: true, ..RunConfig::default() };
//! // Runs until the device goes away.
//! run::run(remote, &config, std::io::stdout(), sink, std::future::pending()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Button events that arrive faster than they are read are buffered by the kernel. If its
//! ring buffer overflows the kernel drops the whole buffer and reports `SYN_DROPPED`; those
//! presses are lost, which is acceptable for a remote control.

#![cfg(any(unix, target_os = "android"))]

mod compat;
mod constants;
mod cookie;
pub mod device;
pub mod dispatch;
pub mod element;
mod error;
pub mod forward;
pub mod queue;
pub mod run;
mod sys;


use crate::compat::input_event;
use std::fmt;
use std::time::{Duration, SystemTime};

pub use crate::constants::*;
pub use crate::cookie::{Cookie, CookieSet};
pub use crate::device::{Device, DeviceSession, RemoteDevice};
pub use crate::dispatch::Dispatcher;
pub use crate::element::{CookieTable, Element, LogicalButton, Usage};
pub use crate::error::{Error, EX_OSERR};
pub use crate::forward::{CommandSink, SlideCommand};
pub use crate::queue::{EventQueue, QueueState, QueuedEvent};
pub use crate::run::{LoopExit, RunConfig};

/// A wrapped `input_event` as read from an evdev node.
#[derive(Copy, Clone)]
#[repr(transparent)]
pub struct InputEvent(input_event);

impl InputEvent {
    /// Builds an event stamped with the current time.
    pub fn new(type_: EventType, code: u16, value: i32) -> Self {
        InputEvent(input_event {
            time: systime_to_timeval(&SystemTime::now()),
            type_: type_.0,
            code,
            value,
        })
    }

    #[inline]
    pub fn timestamp(&self) -> SystemTime {
        timeval_to_systime(&self.0.time)
    }

    #[inline]
    pub fn event_type(&self) -> EventType {
        EventType(self.0.type_)
    }

    #[inline]
    pub fn code(&self) -> u16 {
        self.0.code
    }

    #[inline]
    pub fn value(&self) -> i32 {
        self.0.value
    }

    pub fn from_raw(raw: input_event) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> &input_event {
        &self.0
    }
}

impl fmt::Debug for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("InputEvent")
            .field("time", &self.timestamp())
            .field("type", &self.event_type())
            .field("code", &format_args!("{:#x}", self.code()))
            .field("value", &self.value())
            .finish()
    }
}

fn systime_to_timeval(time: &SystemTime) -> libc::timeval {
    let (sign, dur) = match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(dur) => (1, dur),
        Err(e) => (-1, e.duration()),
    };

    libc::timeval {
        tv_sec: dur.as_secs() as libc::time_t * sign,
        tv_usec: dur.subsec_micros() as libc::suseconds_t,
    }
}

fn timeval_to_systime(tv: &libc::timeval) -> SystemTime {
    let dur = Duration::new(tv.tv_sec.unsigned_abs() as u64, tv.tv_usec as u32 * 1000);
    if tv.tv_sec >= 0 {
        SystemTime::UNIX_EPOCH + dur
    } else {
        SystemTime::UNIX_EPOCH - dur
    }
}

/// Reinterprets a slice of events as the raw bytes the kernel reads and writes.
///
/// # Safety
///
/// `T` must be plain old data without padding the reader could observe.
#[cfg(test)]
pub(crate) unsafe fn cast_to_bytes<T: ?Sized>(mem: &T) -> &[u8] {
    std::slice::from_raw_parts(mem as *const T as *const u8, std::mem::size_of_val(mem))
}
