use crate::compat::KEY_CNT;
use bitvec::prelude::*;
use std::fmt;

/// Identifier of one hardware element on the remote.
///
/// The kernel reports every button press under the keycode the element is mapped to, so the
/// keycode is what identifies the element in the event stream. `Cookie::UNSET` (keycode 0,
/// `KEY_RESERVED`) is never emitted by a device and marks a button the remote doesn't have.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cookie(pub u16);

impl Cookie {
    pub const UNSET: Cookie = Cookie(0);

    pub(crate) const COUNT: usize = KEY_CNT;

    #[inline]
    pub const fn code(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn is_unset(self) -> bool {
        self.0 == Self::UNSET.0
    }

    #[inline]
    fn to_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Cookie({:#x})", self.0)
    }
}

/// A set of cookies, one bit per keycode.
///
/// Used both for the keys a device advertises (filled straight from `EVIOCGBIT`) and for the
/// cookies an event queue is subscribed to.
#[derive(Clone)]
pub struct CookieSet {
    bits: Box<BitArr!(for KEY_CNT, in u8)>,
}

impl CookieSet {
    pub fn new() -> Self {
        Self {
            bits: Box::new(BitArray::ZERO),
        }
    }

    /// Returns `true` if this set contains `cookie`.
    #[inline]
    pub fn contains(&self, cookie: Cookie) -> bool {
        self.bits.get(cookie.to_index()).map_or(false, |b| *b)
    }

    /// Adds `cookie` to the set. Returns `false` if the cookie lies outside the kernel's key
    /// range and could not be stored.
    pub fn insert(&mut self, cookie: Cookie) -> bool {
        if cookie.to_index() >= Cookie::COUNT {
            return false;
        }
        self.bits.set(cookie.to_index(), true);
        true
    }

    pub fn remove(&mut self, cookie: Cookie) {
        if cookie.to_index() < Cookie::COUNT {
            self.bits.set(cookie.to_index(), false);
        }
    }

    /// Iterates over the cookies in the set in ascending order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = Cookie> + '_ {
        self.bits.iter_ones().map(|idx| Cookie(idx as u16))
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }

    #[inline]
    pub(crate) fn as_mut_raw_slice(&mut self) -> &mut [u8] {
        self.bits.as_raw_mut_slice()
    }
}

impl Default for CookieSet {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<Cookie> for CookieSet {
    fn from_iter<I: IntoIterator<Item = Cookie>>(iter: I) -> Self {
        let mut set = CookieSet::new();
        iter.into_iter().for_each(|cookie| {
            set.insert(cookie);
        });
        set
    }
}

impl fmt::Debug for CookieSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
