//! Finding, opening and grabbing the remote's input device.

use crate::compat::{input_id, input_keymap_entry};
use crate::element::Element;
use crate::{sys, BusType, CookieSet, Error, EventType};
use bitvec::prelude::*;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::mem::MaybeUninit;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

/// Name the kernel gives the built-in IR receiver of Apple machines.
pub const TARGET_DEVICE_NAME: &str = "Apple Computer, Inc. IR Receiver";

/// Upper bound on keymap entries read from one device.
const MAX_ELEMENTS: u16 = 1024;

fn ioctl_get_cstring(
    f: unsafe fn(RawFd, &mut [u8]) -> nix::Result<libc::c_int>,
    fd: RawFd,
) -> Option<String> {
    let mut buf = vec![0; 256];
    match unsafe { f(fd, buf.as_mut_slice()) } {
        // The string ioctls return the number of bytes written, including the trailing \0.
        Ok(len) if len > 1 && len as usize <= buf.len() => {
            buf.truncate(len as usize - 1);
            Some(bytes_into_string_lossy(buf))
        }
        _ => None,
    }
}

fn bytes_into_string_lossy(v: Vec<u8>) -> String {
    String::from_utf8(v).unwrap_or_else(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

/// Bus and vendor information of a device.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct InputId(input_id);

impl InputId {
    pub fn bus_type(&self) -> BusType {
        BusType(self.0.bustype)
    }
    pub fn vendor(&self) -> u16 {
        self.0.vendor
    }
    pub fn product(&self) -> u16 {
        self.0.product
    }
    pub fn version(&self) -> u16 {
        self.0.version
    }
}

impl fmt::Debug for InputId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("InputId")
            .field("bus_type", &self.bus_type())
            .field("vendor", &format_args!("{:#06x}", self.vendor()))
            .field("product", &format_args!("{:#06x}", self.product()))
            .field("version", &format_args!("{:#06x}", self.version()))
            .finish()
    }
}

/// An evdev input device node, typically `/dev/input/eventN`.
#[derive(Debug)]
pub struct Device {
    file: File,
    path: PathBuf,
    name: Option<String>,
    phys: Option<String>,
    id: InputId,
    driver_version: (u8, u8, u8),
    supported_keys: Option<CookieSet>,
    grabbed: bool,
}

impl Device {
    /// Opens a device, given its system path.
    #[inline(always)]
    pub fn open(path: impl AsRef<Path>) -> io::Result<Device> {
        Self::_open(path.as_ref())
    }

    fn _open(path: &Path) -> io::Result<Device> {
        let mut options = OpenOptions::new();

        // Try to load read/write, then fall back to read-only.
        let file = options
            .read(true)
            .write(true)
            .open(path)
            .or_else(|_| options.write(false).open(path))?;

        let ty = {
            let mut ty: BitArr!(for EventType::COUNT, in u8) = BitArray::ZERO;
            unsafe { sys::eviocgbit_type(file.as_raw_fd(), ty.as_raw_mut_slice())? };
            ty
        };

        let name = ioctl_get_cstring(sys::eviocgname, file.as_raw_fd());
        let phys = ioctl_get_cstring(sys::eviocgphys, file.as_raw_fd());

        let id = unsafe {
            let mut id = MaybeUninit::uninit();
            sys::eviocgid(file.as_raw_fd(), id.as_mut_ptr())?;
            InputId(id.assume_init())
        };
        let mut driver_version: i32 = 0;
        unsafe {
            sys::eviocgversion(file.as_raw_fd(), &mut driver_version)?;
        }
        let driver_version = (
            ((driver_version >> 16) & 0xff) as u8,
            ((driver_version >> 8) & 0xff) as u8,
            (driver_version & 0xff) as u8,
        );

        let supported_keys = if ty.get(EventType::KEY.0 as usize).map_or(false, |b| *b) {
            let mut keys = CookieSet::new();
            unsafe { sys::eviocgbit_key(file.as_raw_fd(), keys.as_mut_raw_slice())? };
            Some(keys)
        } else {
            None
        };

        Ok(Device {
            file,
            path: path.to_owned(),
            name,
            phys,
            id,
            driver_version,
            supported_keys,
            grabbed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the device's name as read from the kernel.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the device's physical location as read from the kernel.
    pub fn physical_path(&self) -> Option<&str> {
        self.phys.as_deref()
    }

    pub fn input_id(&self) -> InputId {
        self.id
    }

    /// Returns the version of the evdev driver, as `(major, minor, patch)`.
    pub fn driver_version(&self) -> (u8, u8, u8) {
        self.driver_version
    }

    /// The keycodes the device claims it can report, if it reports keys at all.
    pub fn supported_keys(&self) -> Option<&CookieSet> {
        self.supported_keys.as_ref()
    }

    pub fn is_grabbed(&self) -> bool {
        self.grabbed
    }

    /// Reads one keymap entry by index.
    ///
    /// The kernel answers `EINVAL` once `index` is past the last entry.
    pub fn keymap_entry(&self, index: u16) -> io::Result<Element> {
        let mut keymap = input_keymap_entry {
            flags: sys::INPUT_KEYMAP_BY_INDEX,
            len: 0,
            index,
            keycode: 0,
            scancode: [0u8; 32],
        };

        unsafe { sys::eviocgkeycode_v2(self.as_raw_fd(), &mut keymap)? };
        let len = (keymap.len as usize).min(keymap.scancode.len());
        Ok(Element {
            index: keymap.index,
            keycode: keymap.keycode,
            scancode: keymap.scancode[..len].to_vec(),
        })
    }

    /// Copies every keymap entry of the device.
    pub fn read_elements(&self) -> io::Result<Vec<Element>> {
        let mut elements = Vec::new();
        for index in 0..MAX_ELEMENTS {
            match self.keymap_entry(index) {
                Ok(element) => elements.push(element),
                Err(e) if e.raw_os_error() == Some(libc::EINVAL) => break,
                Err(e) => return Err(e),
            }
        }
        if elements.len() == MAX_ELEMENTS as usize {
            tracing::debug!(
                path = %self.path.display(),
                "keymap has more than {MAX_ELEMENTS} entries, ignoring the rest"
            );
        }
        Ok(elements)
    }

    /// Grab the device through a kernel syscall.
    ///
    /// This prevents other clients (including kernel-internal ones such as rfkill) from receiving
    /// events from this device.
    pub fn grab(&mut self) -> io::Result<()> {
        if !self.grabbed {
            unsafe {
                sys::eviocgrab(self.as_raw_fd(), 1)?;
            }
            self.grabbed = true;
        }
        Ok(())
    }

    /// Ungrab the device through a kernel syscall.
    pub fn ungrab(&mut self) -> io::Result<()> {
        if self.grabbed {
            unsafe {
                sys::eviocgrab(self.as_raw_fd(), 0)?;
            }
            self.grabbed = false;
        }
        Ok(())
    }
}

impl AsRawFd for Device {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name.as_deref().unwrap_or("Unnamed device"))?;
        writeln!(f, "  Path: {}", self.path.display())?;
        let (maj, min, pat) = self.driver_version;
        writeln!(f, "  Driver version: {}.{}.{}", maj, min, pat)?;
        if let Some(ref phys) = self.phys {
            writeln!(f, "  Physical address: {:?}", phys)?;
        }
        writeln!(f, "  Bus: {}", self.id.bus_type())?;
        writeln!(
            f,
            "  Vendor: {:#x}, product: {:#x}, version: {:#x}",
            self.id.vendor(),
            self.id.product(),
            self.id.version()
        )?;
        if let Some(keys) = &self.supported_keys {
            writeln!(f, "  Keys: {}", keys.len())?;
        }
        Ok(())
    }
}

/// The device operations a monitoring session needs.
///
/// [`Device`] implements this over an evdev node; tests substitute their own. Releasing the
/// device is dropping it.
pub trait RemoteDevice {
    /// Opens the device for exclusive use.
    fn open_exclusive(&mut self) -> io::Result<()>;

    /// Ends exclusive use.
    fn close(&mut self) -> io::Result<()>;

    /// Copies the device's hardware elements.
    fn elements(&self) -> io::Result<Vec<Element>>;

    /// A new descriptor that delivers the device's input events.
    fn event_source(&mut self) -> io::Result<OwnedFd>;
}

impl RemoteDevice for Device {
    fn open_exclusive(&mut self) -> io::Result<()> {
        self.grab()
    }

    fn close(&mut self) -> io::Result<()> {
        self.ungrab()
    }

    fn elements(&self) -> io::Result<Vec<Element>> {
        self.read_elements()
    }

    fn event_source(&mut self) -> io::Result<OwnedFd> {
        Ok(self.file.try_clone()?.into())
    }
}

/// A device held open for exclusive use.
///
/// Dropping the session closes the device if [`close`](Self::close) was not called, and then
/// releases it.
pub struct DeviceSession<D: RemoteDevice> {
    device: D,
    open: bool,
}

impl<D: RemoteDevice> DeviceSession<D> {
    /// Opens `device` exclusively. On failure the device is released before returning.
    pub fn open(mut device: D) -> Result<Self, Error> {
        device.open_exclusive().map_err(Error::Grab)?;
        Ok(DeviceSession { device, open: true })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn elements(&self) -> io::Result<Vec<Element>> {
        self.device.elements()
    }

    pub fn event_source(&mut self) -> io::Result<OwnedFd> {
        self.device.event_source()
    }

    /// Ends exclusive use and releases the device.
    pub fn close(mut self) -> io::Result<()> {
        self.open = false;
        self.device.close()
    }
}

impl<D: RemoteDevice> Drop for DeviceSession<D> {
    fn drop(&mut self) {
        if self.open {
            self.open = false;
            if let Err(e) = self.device.close() {
                tracing::warn!("failed to close device: {e}");
            }
        }
    }
}

/// Crawls `/dev/input` for evdev devices.
///
/// Will not bubble up any errors in opening devices or traversing the directory. Instead returns
/// an empty iterator or omits the devices that could not be opened.
pub fn enumerate() -> EnumerateDevices {
    EnumerateDevices {
        readdir: std::fs::read_dir("/dev/input").ok(),
    }
}

pub struct EnumerateDevices {
    readdir: Option<std::fs::ReadDir>,
}

impl Iterator for EnumerateDevices {
    type Item = (PathBuf, Device);

    fn next(&mut self) -> Option<(PathBuf, Device)> {
        use std::os::unix::ffi::OsStrExt;
        let readdir = self.readdir.as_mut()?;
        loop {
            let Ok(entry) = readdir.next()? else {
                continue;
            };
            let path = entry.path();
            let is_event_node = path
                .file_name()
                .map_or(false, |name| name.as_bytes().starts_with(b"event"));
            if !is_event_node {
                continue;
            }
            match Device::open(&path) {
                Ok(dev) => return Some((path, dev)),
                Err(e) => tracing::trace!(path = %path.display(), "skipping device: {e}"),
            }
        }
    }
}

/// Finds the first input device whose name equals `name`.
///
/// Devices are visited in directory order; further matches are counted and ignored.
pub fn discover(name: &str) -> Result<Device, Error> {
    let mut found: Option<Device> = None;
    let mut ignored = 0usize;
    for (path, device) in enumerate() {
        if device.name() != Some(name) {
            continue;
        }
        if found.is_none() {
            found = Some(device);
        } else {
            tracing::debug!(path = %path.display(), "ignoring additional match");
            ignored += 1;
        }
    }
    if ignored > 0 {
        tracing::warn!("{ignored} more device(s) named {name:?} ignored, using the first");
    }

    let device = found.ok_or_else(|| Error::NotFound(name.to_owned()))?;
    let id = device.input_id();
    tracing::info!(
        path = %device.path().display(),
        bus = %id.bus_type(),
        vendor = id.vendor(),
        product = id.product(),
        "found {name:?}"
    );
    Ok(device)
}

/// Opens the device node at `path` directly, bypassing discovery by name.
pub fn open_path(path: &Path) -> Result<Device, Error> {
    let device = Device::open(path).map_err(|source| Error::Open {
        path: path.to_owned(),
        source,
    })?;
    tracing::info!(path = %path.display(), name = ?device.name(), "opened device");
    Ok(device)
}
