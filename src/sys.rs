use crate::compat::{input_id, input_keymap_entry};
use nix::{ioctl_read, ioctl_read_buf, ioctl_write_int};

/// `input_keymap_entry::flags` bit selecting lookup by `index` instead of by scancode.
pub(crate) const INPUT_KEYMAP_BY_INDEX: u8 = 1;

ioctl_read!(eviocgversion, b'E', 0x01, ::libc::c_int);
ioctl_read!(eviocgid, b'E', 0x02, /*struct*/ input_id);
ioctl_read!(eviocgkeycode_v2, b'E', 0x04, input_keymap_entry);

ioctl_read_buf!(eviocgname, b'E', 0x06, u8);
ioctl_read_buf!(eviocgphys, b'E', 0x07, u8);

ioctl_write_int!(eviocgrab, b'E', 0x90);

macro_rules! eviocgbit_ioctl {
    ($mac:ident!($name:ident, $ev:ident, $ty:ty)) => {
        eviocgbit_ioctl!($mac!($name, $crate::EventType::$ev.0, $ty));
    };
    ($mac:ident!($name:ident, $ev:expr, $ty:ty)) => {
        $mac!($name, b'E', 0x20 + $ev, $ty);
    };
}

eviocgbit_ioctl!(ioctl_read_buf!(eviocgbit_type, 0, u8));
eviocgbit_ioctl!(ioctl_read_buf!(eviocgbit_key, KEY, u8));
