//! Hardware elements of the remote and their mapping onto logical buttons.
//!
//! The kernel's keymap pairs each scancode the receiver can produce with the keycode it is
//! reported as. For HID receivers the scancode is the 32-bit usage (`page << 16 | id`), which
//! is what tells us which of the remote's buttons an element is.

use crate::compat::KEY_MAX;
use crate::device::RemoteDevice;
use crate::{Cookie, Error};
use std::fmt;

/// A single keymap entry read from the device.
#[derive(Clone, PartialEq, Eq)]
pub struct Element {
    pub index: u16,
    pub keycode: u32,
    pub scancode: Vec<u8>,
}

impl Element {
    /// Builds the entry a HID receiver reports for `usage` mapped to `cookie`.
    pub fn hid(index: u16, cookie: u16, usage: Usage) -> Self {
        Element {
            index,
            keycode: cookie as u32,
            scancode: usage.to_scancode().to_ne_bytes().to_vec(),
        }
    }

    /// The cookie events for this element are reported under, if it is a usable one.
    pub fn cookie(&self) -> Option<Cookie> {
        match self.keycode {
            0 => None,
            code if code > KEY_MAX as u32 => None,
            code => Some(Cookie(code as u16)),
        }
    }

    /// Decodes the scancode as a HID usage. Scancodes of any other width are not HID usages.
    pub fn usage(&self) -> Option<Usage> {
        let bytes: [u8; 4] = self.scancode.as_slice().try_into().ok()?;
        Some(Usage::from_scancode(u32::from_ne_bytes(bytes)))
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Element")
            .field("index", &self.index)
            .field("keycode", &format_args!("{:#x}", self.keycode))
            .field("scancode", &format_args!("{:02x?}", self.scancode))
            .finish()
    }
}

/// A HID usage: a page and an identifier within it.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Usage {
    pub page: u16,
    pub id: u16,
}

impl Usage {
    pub const GENERIC_DESKTOP: u16 = 0x01;

    pub const SYSTEM_APP_MENU: Usage = Usage::desktop(0x86);
    pub const SYSTEM_MENU: Usage = Usage::desktop(0x89);
    pub const SYSTEM_MENU_RIGHT: Usage = Usage::desktop(0x8a);
    pub const SYSTEM_MENU_LEFT: Usage = Usage::desktop(0x8b);
    pub const SYSTEM_MENU_UP: Usage = Usage::desktop(0x8c);
    pub const SYSTEM_MENU_DOWN: Usage = Usage::desktop(0x8d);

    pub const fn new(page: u16, id: u16) -> Self {
        Usage { page, id }
    }

    const fn desktop(id: u16) -> Self {
        Usage::new(Self::GENERIC_DESKTOP, id)
    }

    pub const fn from_scancode(scancode: u32) -> Self {
        Usage {
            page: (scancode >> 16) as u16,
            id: scancode as u16,
        }
    }

    pub const fn to_scancode(self) -> u32 {
        (self.page as u32) << 16 | self.id as u32
    }
}

impl fmt::Debug for Usage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Usage({:#04x}:{:#04x})", self.page, self.id)
    }
}

/// The six buttons of the remote.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LogicalButton {
    AppMenu,
    Select,
    Right,
    Left,
    Up,
    Down,
}

impl LogicalButton {
    pub const ALL: [LogicalButton; 6] = [
        LogicalButton::AppMenu,
        LogicalButton::Select,
        LogicalButton::Right,
        LogicalButton::Left,
        LogicalButton::Up,
        LogicalButton::Down,
    ];

    /// Maps a Generic Desktop usage onto a button. Everything else is ignored.
    pub fn from_usage(usage: Usage) -> Option<Self> {
        Some(match usage {
            Usage::SYSTEM_APP_MENU => LogicalButton::AppMenu,
            Usage::SYSTEM_MENU => LogicalButton::Select,
            Usage::SYSTEM_MENU_RIGHT => LogicalButton::Right,
            Usage::SYSTEM_MENU_LEFT => LogicalButton::Left,
            Usage::SYSTEM_MENU_UP => LogicalButton::Up,
            Usage::SYSTEM_MENU_DOWN => LogicalButton::Down,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            LogicalButton::AppMenu => "AppMenu",
            LogicalButton::Select => "Select",
            LogicalButton::Right => "Right",
            LogicalButton::Left => "Left",
            LogicalButton::Up => "Up",
            LogicalButton::Down => "Down",
        }
    }
}

impl fmt::Display for LogicalButton {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(self.name())
    }
}

/// The cookie assigned to each logical button. Buttons the device lacks stay
/// [`Cookie::UNSET`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CookieTable {
    pub app_menu: Cookie,
    pub select: Cookie,
    pub right: Cookie,
    pub left: Cookie,
    pub up: Cookie,
    pub down: Cookie,
}

impl CookieTable {
    pub fn get(&self, button: LogicalButton) -> Cookie {
        match button {
            LogicalButton::AppMenu => self.app_menu,
            LogicalButton::Select => self.select,
            LogicalButton::Right => self.right,
            LogicalButton::Left => self.left,
            LogicalButton::Up => self.up,
            LogicalButton::Down => self.down,
        }
    }

    pub fn set(&mut self, button: LogicalButton, cookie: Cookie) {
        let slot = match button {
            LogicalButton::AppMenu => &mut self.app_menu,
            LogicalButton::Select => &mut self.select,
            LogicalButton::Right => &mut self.right,
            LogicalButton::Left => &mut self.left,
            LogicalButton::Up => &mut self.up,
            LogicalButton::Down => &mut self.down,
        };
        *slot = cookie;
    }

    /// The cookie that advances a presentation.
    #[inline]
    pub fn next(&self) -> Cookie {
        self.right
    }

    /// The cookie that steps a presentation back.
    #[inline]
    pub fn previous(&self) -> Cookie {
        self.left
    }

    pub fn iter(&self) -> impl Iterator<Item = (LogicalButton, Cookie)> + '_ {
        LogicalButton::ALL.iter().map(move |&b| (b, self.get(b)))
    }

    /// The assigned cookies, without the unset ones.
    pub fn cookies(&self) -> impl Iterator<Item = Cookie> + '_ {
        self.iter().map(|(_, c)| c).filter(|c| !c.is_unset())
    }

    pub fn is_empty(&self) -> bool {
        self.cookies().next().is_none()
    }
}

impl fmt::Display for CookieTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for (button, cookie) in self.iter() {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            if cookie.is_unset() {
                write!(f, "{button}=-")?;
            } else {
                write!(f, "{button}={cookie}")?;
            }
        }
        Ok(())
    }
}

/// Builds the cookie table from a device's elements.
///
/// Elements whose scancode is not one of the six Generic Desktop usages are skipped, as are
/// elements without a usable keycode. When two elements carry the same usage the later one
/// wins.
pub fn resolve<'a, I>(elements: I) -> CookieTable
where
    I: IntoIterator<Item = &'a Element>,
{
    let mut table = CookieTable::default();
    for element in elements {
        let Some(usage) = element.usage() else {
            tracing::trace!(?element, "skipping element without a HID usage");
            continue;
        };
        let Some(button) = LogicalButton::from_usage(usage) else {
            tracing::trace!(?element, ?usage, "skipping unrelated usage");
            continue;
        };
        let Some(cookie) = element.cookie() else {
            tracing::debug!(?element, %button, "element has no usable keycode");
            continue;
        };
        let previous = table.get(button);
        if !previous.is_unset() && previous != cookie {
            tracing::debug!(%button, %previous, %cookie, "usage appears twice, keeping the later element");
        }
        table.set(button, cookie);
    }
    table
}

/// Reads the device's elements and resolves them into a cookie table.
pub fn resolve_device<D: RemoteDevice + ?Sized>(device: &D) -> Result<CookieTable, Error> {
    let elements = device.elements().map_err(Error::Elements)?;
    let table = resolve(&elements);
    tracing::debug!(elements = elements.len(), %table, "resolved cookies");
    Ok(table)
}
