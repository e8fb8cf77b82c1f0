//! Turning queued events into output lines and slide commands.

use crate::forward::{CommandSink, SlideCommand};
use crate::{CookieTable, QueuedEvent};
use std::io::Write;

/// Handles every event the queue delivers.
///
/// Each event produces one `<cookie> pressed|depressed` line on `out`. With forwarding enabled
/// a press of the table's `next` cookie sends [`SlideCommand::Forward`] and a press of its
/// `previous` cookie sends [`SlideCommand::Backward`]. Neither a failed write nor a failed
/// delivery interrupts processing.
pub struct Dispatcher<W, S> {
    table: CookieTable,
    forwarding: bool,
    out: W,
    sink: S,
}

impl<W: Write, S: CommandSink> Dispatcher<W, S> {
    pub fn new(table: CookieTable, forwarding: bool, out: W, sink: S) -> Self {
        Dispatcher {
            table,
            forwarding,
            out,
            sink,
        }
    }

    pub fn on_event(&mut self, event: &QueuedEvent) {
        let state = if event.is_pressed() {
            "pressed"
        } else {
            "depressed"
        };
        if let Err(e) = writeln!(self.out, "{} {}", event.cookie, state).and_then(|()| self.out.flush())
        {
            tracing::warn!("failed to write event line: {e}");
        }

        if let Some(command) = self.command_for(event) {
            if let Err(e) = self.sink.deliver(command) {
                tracing::error!(?command, "failed to forward slide command: {e}");
            }
        }
    }

    fn command_for(&self, event: &QueuedEvent) -> Option<SlideCommand> {
        if !self.forwarding || !event.is_pressed() || event.cookie.is_unset() {
            return None;
        }
        if event.cookie == self.table.next() {
            Some(SlideCommand::Forward)
        } else if event.cookie == self.table.previous() {
            Some(SlideCommand::Backward)
        } else {
            None
        }
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_parts(self) -> (W, S) {
        (self.out, self.sink)
    }
}
