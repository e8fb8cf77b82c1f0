//! Compatibility layer for non-Linux builds.
//!
//! Only the handful of kernel structs and counts the remote monitor reads are re-exported here.

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(any(
        target_os = "linux",
        target_os = "l4re",
        target_os = "android",
        target_os = "emscripten"
    ))] {
        pub(crate) use libc::{input_event, input_id, input_keymap_entry, EV_CNT, KEY_CNT, KEY_MAX};
    } else {
        mod non_linux;
        pub(crate) use non_linux::{input_event, input_id, input_keymap_entry, EV_CNT, KEY_CNT, KEY_MAX};
    }
}
