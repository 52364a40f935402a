//! Periodic save timer (spec §5).
//!
//! Ticks are fed into the same queue as commands, via [`crate::dispatcher::Message::Tick`],
//! so a save sweep can never interleave with an in-flight command.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;

use crate::dispatcher::Message;

/// Default interval between save sweeps, overridable via [`crate::config::Config`].
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(30);

/// Sends a `Tick` on `tx` every `period` until the receiver is dropped.
pub async fn run(tx: mpsc::UnboundedSender<Message>, period: Duration) {
    let mut ticker = interval(period);
    ticker.tick().await; // tokio's first tick fires immediately; that one carries nothing to save yet.
    loop {
        ticker.tick().await;
        if tx.send(Message::Tick).is_err() {
            break;
        }
    }
}
