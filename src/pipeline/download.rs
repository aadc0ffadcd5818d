//! Bounded-concurrency download scheduler (component H, §4.H). Independent
//! of import operations; also used for project icons and thumbnails.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::ports::{CancelToken, DownloadOutcome, DownloadPort};

pub const MAX_CONCURRENT: usize = 10;
pub const MAX_FRAME_DURATION: Duration = Duration::from_millis(20);
const COARSEN_FRACTION: f64 = 0.05;
const COARSEN_BYTES: u64 = 1024 * 1024;

pub type DownloadId = u64;

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub destination: PathBuf,
}

#[derive(Debug, Clone)]
pub enum DownloadUpdate {
    Progress { id: DownloadId, bytes_downloaded: u64, total_bytes: Option<u64> },
    Finished { id: DownloadId, outcome: DownloadOutcome },
}

enum Event {
    Progress { id: DownloadId, bytes_downloaded: u64, total_bytes: Option<u64> },
    Finished { id: DownloadId, outcome: DownloadOutcome },
}

struct InFlightState {
    last_reported_bytes: u64,
    last_reported_fraction: f64,
}

/// Drains its queue on `tick`, respecting `maxConcurrent` in-flight
/// transfers and a per-tick wall-clock budget. Progress is coarsened so the
/// caller isn't flooded with near-duplicate updates.
pub struct DownloadManager {
    port: std::sync::Arc<dyn DownloadPort>,
    max_concurrent: usize,
    max_frame_duration: Duration,
    next_id: AtomicU64,
    queue: Mutex<VecDeque<(DownloadId, DownloadRequest)>>,
    in_flight: Mutex<HashMap<DownloadId, InFlightState>>,
    sender: smol::channel::Sender<Event>,
    receiver: smol::channel::Receiver<Event>,
}

impl DownloadManager {
    pub fn new(port: std::sync::Arc<dyn DownloadPort>) -> Self {
        let (sender, receiver) = smol::channel::unbounded();
        Self {
            port,
            max_concurrent: MAX_CONCURRENT,
            max_frame_duration: MAX_FRAME_DURATION,
            next_id: AtomicU64::new(1),
            queue: Mutex::new(VecDeque::new()),
            in_flight: Mutex::new(HashMap::new()),
            sender,
            receiver,
        }
    }

    #[cfg(test)]
    fn with_limits(port: std::sync::Arc<dyn DownloadPort>, max_concurrent: usize, max_frame_duration: Duration) -> Self {
        let mut manager = Self::new(port);
        manager.max_concurrent = max_concurrent;
        manager.max_frame_duration = max_frame_duration;
        manager
    }

    pub fn enqueue(&self, request: DownloadRequest) -> DownloadId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.queue.lock().unwrap().push_back((id, request));
        id
    }

    pub fn pending_and_in_flight(&self) -> usize {
        self.queue.lock().unwrap().len() + self.in_flight.lock().unwrap().len()
    }

    /// Moves ready queue entries into flight, then drains finished/progress
    /// events up to the wall-clock budget, coarsening progress.
    pub async fn tick(&self, cancel: &CancelToken) -> Vec<DownloadUpdate> {
        self.start_ready(cancel);

        let deadline = Instant::now() + self.max_frame_duration;
        let mut updates = Vec::new();

        loop {
            if Instant::now() >= deadline {
                break;
            }
            let event = match self.receiver.try_recv() {
                Ok(event) => event,
                Err(_) => break,
            };
            match event {
                Event::Finished { id, outcome } => {
                    self.in_flight.lock().unwrap().remove(&id);
                    updates.push(DownloadUpdate::Finished { id, outcome });
                }
                Event::Progress { id, bytes_downloaded, total_bytes } => {
                    let should_report = {
                        let mut in_flight = self.in_flight.lock().unwrap();
                        match in_flight.get_mut(&id) {
                            Some(state) => {
                                let byte_delta = bytes_downloaded.saturating_sub(state.last_reported_bytes);
                                let fraction = total_bytes
                                    .filter(|&t| t > 0)
                                    .map(|t| bytes_downloaded as f64 / t as f64)
                                    .unwrap_or(0.0);
                                let fraction_delta = fraction - state.last_reported_fraction;
                                let report = byte_delta >= COARSEN_BYTES || fraction_delta >= COARSEN_FRACTION;
                                if report {
                                    state.last_reported_bytes = bytes_downloaded;
                                    state.last_reported_fraction = fraction;
                                }
                                report
                            }
                            None => false,
                        }
                    };
                    if should_report {
                        updates.push(DownloadUpdate::Progress { id, bytes_downloaded, total_bytes });
                    }
                }
            }
        }

        updates
    }

    fn start_ready(&self, cancel: &CancelToken) {
        if cancel.is_cancelled() {
            return;
        }
        loop {
            let slot_available = self.in_flight.lock().unwrap().len() < self.max_concurrent;
            if !slot_available {
                break;
            }
            let Some((id, request)) = self.queue.lock().unwrap().pop_front() else {
                break;
            };

            self.in_flight.lock().unwrap().insert(
                id,
                InFlightState { last_reported_bytes: 0, last_reported_fraction: 0.0 },
            );

            let port = self.port.clone();
            let sender = self.sender.clone();
            let cancel = cancel.clone();
            smol::spawn(async move {
                let on_progress_sender = sender.clone();
                let on_progress = move |bytes_downloaded: u64, total_bytes: Option<u64>| {
                    let _ = on_progress_sender.try_send(Event::Progress { id, bytes_downloaded, total_bytes });
                };
                let outcome = port.download(&request.url, &request.destination, &on_progress, &cancel).await;
                let _ = sender.send(Event::Finished { id, outcome }).await;
            })
            .detach();
        }
    }
}
