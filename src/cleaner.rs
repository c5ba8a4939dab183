/// Background expiry worker.
///
/// One named thread per cache wakes every `clean_window` and reaps expired
/// records from every shard. It stops when the cache's close channel
/// disconnects or the caller's cancellation channel fires, and is never
/// joined: a pass in progress always runs to completion.
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, tick, Receiver};
use tracing::debug;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::shard::Shard;

const THREAD_NAME: &str = "arenacache-cleaner";

/// Reap expired records from every shard. Returns the number of frames
/// released.
pub(crate) fn clean_all(shards: &[Shard], now: u64) -> usize {
    shards.iter().map(|shard| shard.clean_up(now)).sum()
}

pub(crate) fn spawn(
    shards: Arc<[Shard]>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    close: Receiver<()>,
    cancel: Receiver<()>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(THREAD_NAME.into())
        .spawn(move || run(&shards, clock.as_ref(), interval, close, cancel))
        .map_err(Error::Spawn)
}

fn run(shards: &[Shard], clock: &dyn Clock, interval: Duration, close: Receiver<()>, cancel: Receiver<()>) {
    debug!(interval_ms = interval.as_millis() as u64, shards = shards.len(), "cleanup worker started");

    let ticker = tick(interval);
    loop {
        select! {
            recv(ticker) -> _ => {
                let now = clock.epoch().max(0) as u64;
                let released = clean_all(shards, now);
                if released > 0 {
                    debug!(released, now, "cleanup pass");
                }
            }
            recv(close) -> _ => break,
            recv(cancel) -> _ => break,
        }
    }

    debug!("cleanup worker stopped");
}
