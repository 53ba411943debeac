use super::{AssetError, ModelAsset};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::{Duration, Instant};

/// Result of one load request.
#[derive(Debug)]
pub struct LoadOutcome {
    pub generation: u64,
    pub uri: String,
    pub result: Result<ModelAsset, AssetError>,
}

/// Model loads keyed by generation. Only the most recent request can
/// complete; anything older is dropped when it arrives.
pub struct AssetLoadQueue {
    background: bool,
    latest: u64,
    pending: Option<u64>,
    tx: Sender<LoadOutcome>,
    rx: Receiver<LoadOutcome>,
}

impl AssetLoadQueue {
    pub fn new(background: bool) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            background,
            latest: 0,
            pending: None,
            tx,
            rx,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Starts loading `uri`, superseding any earlier request.
    pub fn request(&mut self, uri: &str) -> u64 {
        self.latest += 1;
        let generation = self.latest;
        self.pending = Some(generation);
        let uri = uri.to_string();
        log::info!("Loading model {} (generation {})", uri, generation);

        if !self.background {
            let result = ModelAsset::from_uri(&uri);
            let _ = self.tx.send(LoadOutcome {
                generation,
                uri,
                result,
            });
            return generation;
        }

        let tx = self.tx.clone();
        let worker_uri = uri.clone();
        let spawned = std::thread::Builder::new()
            .name("asset-loader".to_string())
            .spawn(move || {
                let result = ModelAsset::from_uri(&worker_uri);
                // The queue may already be gone; nothing to report to.
                let _ = tx.send(LoadOutcome {
                    generation,
                    uri: worker_uri,
                    result,
                });
            });
        if let Err(err) = spawned {
            log::error!("Failed to start asset loader thread: {}", err);
            let _ = self.tx.send(LoadOutcome {
                generation,
                uri,
                result: Err(AssetError::WorkerGone),
            });
        }
        generation
    }

    /// Abandons the in-flight request, if any.
    pub fn cancel(&mut self) {
        if self.pending.take().is_some() {
            self.latest += 1;
        }
    }

    /// Next outcome for the current request, without blocking.
    pub fn poll(&mut self) -> Option<LoadOutcome> {
        loop {
            match self.rx.try_recv() {
                Ok(outcome) => {
                    if let Some(outcome) = self.accept(outcome) {
                        return Some(outcome);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            }
        }
    }

    /// Blocks up to `timeout` for the current request to finish.
    pub fn wait(&mut self, timeout: Duration) -> Option<LoadOutcome> {
        let deadline = Instant::now() + timeout;
        while self.pending.is_some() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(outcome) => {
                    if let Some(outcome) = self.accept(outcome) {
                        return Some(outcome);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
        None
    }

    fn accept(&mut self, outcome: LoadOutcome) -> Option<LoadOutcome> {
        if self.pending != Some(outcome.generation) {
            log::warn!(
                "Discarding superseded load of {} (generation {}, latest {})",
                outcome.uri,
                outcome.generation,
                self.latest
            );
            return None;
        }
        self.pending = None;
        Some(outcome)
    }
}
