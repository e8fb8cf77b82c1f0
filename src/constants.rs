use crate::compat::EV_CNT;
use std::fmt;

macro_rules! evdev_enum {
    ($t:ty, $($(#[$attr:meta])* $c:ident = $val:expr,)*) => {
        impl $t {
            $($(#[$attr])* pub const $c: Self = Self($val);)*
        }
        impl std::fmt::Debug for $t {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                #[allow(unreachable_patterns)]
                match *self {
                    $(Self::$c => f.pad(stringify!($c)),)*
                    _ => write!(f, "{}({:#x})", stringify!($t), self.0),
                }
            }
        }
    }
}

/// Event types supported by the device.
///
/// The remote monitor only acts on `KEY` and `SYNCHRONIZATION` events; the rest are named so
/// that log output stays readable.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventType(pub u16);

evdev_enum!(
    EventType,
    /// A bookkeeping event. Usually not important to applications.
    SYNCHRONIZATION = 0x00,
    /// A key changed state. Remote buttons are reported as keys.
    KEY = 0x01,
    RELATIVE = 0x02,
    ABSOLUTE = 0x03,
    /// Miscellaneous events. HID devices report the raw scancode of every key event here
    /// (`MSC_SCAN`) right before the key event itself.
    MISC = 0x04,
    SWITCH = 0x05,
    LED = 0x11,
    SOUND = 0x12,
    REPEAT = 0x14,
    FORCEFEEDBACK = 0x15,
    POWER = 0x16,
    FORCEFEEDBACKSTATUS = 0x17,
);

impl EventType {
    pub(crate) const COUNT: usize = EV_CNT;
}

/// Codes of `SYNCHRONIZATION` events.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Synchronization(pub u16);

evdev_enum!(
    Synchronization,
    /// Terminates a packet of events from the device.
    SYN_REPORT = 0,
    SYN_CONFIG = 1,
    SYN_MT_REPORT = 2,
    /// Ring buffer filled, events were dropped.
    SYN_DROPPED = 3,
);

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct BusType(pub u16);

evdev_enum!(
    BusType,
    BUS_PCI = 0x01,
    BUS_USB = 0x03,
    BUS_BLUETOOTH = 0x05,
    BUS_VIRTUAL = 0x06,
    BUS_I8042 = 0x11,
    BUS_RS232 = 0x13,
    BUS_I2C = 0x18,
    BUS_HOST = 0x19,
    BUS_SPI = 0x1C,
);

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            Self::BUS_PCI => "PCI",
            Self::BUS_USB => "USB",
            Self::BUS_BLUETOOTH => "Bluetooth",
            Self::BUS_VIRTUAL => "Virtual",
            Self::BUS_I8042 => "i8042",
            Self::BUS_RS232 => "RS232",
            Self::BUS_I2C => "I2C",
            Self::BUS_HOST => "Host",
            Self::BUS_SPI => "SPI",
            _ => "Unknown",
        };
        f.write_str(s)
    }
}
