//! Orchestration loop: poll the document probe, resolve metadata through the
//! cache, publish presence, and supervise reconnects forever.

use std::time::Duration;

use log::{debug, error, info, warn};

use crate::cache::BookCache;
use crate::config::Config;
use crate::document_probe::DocumentProbe;
use crate::link_resolver::ResolveReviewLink;
use crate::metadata_resolver::ResolveMetadata;
use crate::presence::{build_descriptor, now_unix_ms, PresencePublisher};

pub struct PresenceService<D, P, R, L> {
    probe: D,
    publisher: P,
    cache: BookCache<R, L>,
    poll_interval: Duration,
}

impl<D, P, R, L> PresenceService<D, P, R, L>
where
    D: DocumentProbe,
    P: PresencePublisher,
    R: ResolveMetadata,
    L: ResolveReviewLink,
{
    pub fn new(probe: D, publisher: P, cache: BookCache<R, L>, config: &Config) -> Self {
        Self {
            probe,
            publisher,
            cache,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }

    /// One poll cycle. `Err` means the connected loop must tear down and
    /// reconnect; degraded lookups stay inside the cycle.
    fn poll_once(&mut self) -> Result<(), String> {
        let state = self.probe.state().map_err(|error| error.to_string())?;
        if !state.is_host_running || !state.has_titled_document {
            debug!("Host not running or idling; clearing presence");
            self.publisher.clear_activity()?;
            return Ok(());
        }

        let snapshot = self.probe.snapshot().map_err(|error| error.to_string())?;
        info!("Open document: '{}' ({})", snapshot.title, snapshot.page_label);
        debug!("Chapter progress: {}", snapshot.chapter_progress_label);

        let Some(metadata) = self.cache.get_or_resolve(&snapshot.title) else {
            warn!("No metadata available for '{}' this cycle", snapshot.title);
            return Ok(());
        };

        let descriptor = build_descriptor(&snapshot, &metadata, now_unix_ms());
        self.publisher.set_activity(&descriptor)?;
        debug!("Presence updated");
        Ok(())
    }

    /// Connects the publisher, then polls at the fixed interval until a
    /// cycle fails.
    fn connect_and_poll(&mut self) -> Result<(), String> {
        info!("Connecting presence publisher...");
        self.publisher.connect()?;
        loop {
            self.poll_once()?;
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Closes the publisher if a handle is live. The publisher clears its
    /// handle even on a failed close, so this never wedges a reconnect.
    fn try_close(&mut self) {
        if self.publisher.is_connected() {
            info!("Closing presence publisher");
            if let Err(close_error) = self.publisher.close() {
                warn!("Publisher close failed: {}", close_error);
            }
        }
    }

    /// One supervision pass: connect-and-poll until failure, then tear down.
    fn run_supervision_cycle(&mut self) {
        if let Err(cycle_error) = self.connect_and_poll() {
            error!("Presence cycle failed: {}", cycle_error);
        }
        self.try_close();
    }

    /// Supervises forever: there is no terminal state short of process
    /// termination, and one fixed backoff tier between reconnects.
    pub fn run(&mut self) {
        loop {
            self.run_supervision_cycle();
            info!("Reconnecting in {} ms", self.poll_interval.as_millis());
            std::thread::sleep(self.poll_interval);
        }
    }
}
