//! One monitoring session from grabbing the device to releasing it.

use crate::device::{DeviceSession, RemoteDevice};
use crate::element;
use crate::forward::CommandSink;
use crate::queue::{EventQueue, QueueStatus, DEFAULT_QUEUE_DEPTH};
use crate::{Dispatcher, Error, QueuedEvent};
use std::future::Future;
use std::io::Write;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    /// Send slide commands for presses of the Right and Left buttons.
    pub forwarding: bool,
    pub queue_depth: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            forwarding: false,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// Why the run loop ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoopExit {
    /// The shutdown future completed.
    Shutdown,
    /// The device stopped delivering events, usually because it was unplugged.
    DeviceGone,
}

/// Runs a session on `device` until `shutdown` completes or the device goes away.
///
/// Event lines are written to `out` and slide commands go to `sink`. Must be awaited from
/// within a tokio runtime with I/O enabled.
///
/// However the session ends, the queue is stopped and disposed before the device is closed,
/// and the device is released last.
pub async fn run<D, W, S, F>(
    device: D,
    config: &RunConfig,
    out: W,
    sink: S,
    shutdown: F,
) -> Result<LoopExit, Error>
where
    D: RemoteDevice,
    W: Write + 'static,
    S: CommandSink + 'static,
    F: Future<Output = ()>,
{
    let mut session = DeviceSession::open(device)?;
    let table = element::resolve_device(session.device())?;
    if table.is_empty() {
        tracing::warn!("device has none of the remote's buttons");
    }

    let source = session.event_source().map_err(Error::Queue)?;
    let mut queue = EventQueue::create(source, config.queue_depth).map_err(Error::Queue)?;
    queue.register_table(&table)?;

    let mut dispatcher = Dispatcher::new(table, config.forwarding, out, sink);
    queue.bind(move |event: &QueuedEvent| dispatcher.on_event(event))?;
    queue.start()?;
    tracing::info!(%table, forwarding = config.forwarding, "listening for remote events");

    let result = drive(&mut queue, shutdown).await;
    match &result {
        Ok(exit) => tracing::info!(?exit, "run loop finished"),
        Err(e) => tracing::debug!("run loop failed: {e}"),
    }

    queue.stop()?;
    queue.dispose()?;
    drop(queue);
    if let Err(e) = session.close() {
        tracing::warn!("failed to close device: {e}");
    }
    result
}

async fn drive<F>(queue: &mut EventQueue, shutdown: F) -> Result<LoopExit, Error>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            biased;
            () = &mut shutdown => return Ok(LoopExit::Shutdown),
            status = queue.service() => match status? {
                QueueStatus::Open => {}
                QueueStatus::Closed => return Ok(LoopExit::DeviceGone),
            },
        }
    }
}
