use domain::DomainError;
use std::future::Future;
use tokio::sync::watch;

/// One-way shutdown flag observed by readers.
#[derive(Debug)]
pub struct CloseSignal {
    tx: watch::Sender<bool>,
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CloseSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Raises the flag. Returns true only for the call that raised it.
    pub fn close(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Torrent and engine shutdown flags seen from a reader.
#[derive(Debug, Clone)]
pub struct ClosedWatch {
    torrent: watch::Receiver<bool>,
    engine: watch::Receiver<bool>,
}

impl ClosedWatch {
    pub fn new(torrent: &CloseSignal, engine: &CloseSignal) -> Self {
        Self {
            torrent: torrent.subscribe(),
            engine: engine.subscribe(),
        }
    }

    /// A dropped signal counts as closed.
    pub fn is_closed(&self) -> bool {
        let raised = |rx: &watch::Receiver<bool>| *rx.borrow() || rx.has_changed().is_err();
        raised(&self.torrent) || raised(&self.engine)
    }

    async fn closed(&mut self) {
        tokio::select! {
            _ = self.torrent.wait_for(|closed| *closed) => {}
            _ = self.engine.wait_for(|closed| *closed) => {}
        }
    }

    /// Runs `operation` unless either side shuts down first, in which case
    /// the operation is abandoned with [`DomainError::EngineClosed`].
    pub async fn guard<T, F>(&self, operation: F) -> Result<T, DomainError>
    where
        F: Future<Output = Result<T, DomainError>>,
    {
        if self.is_closed() {
            return Err(DomainError::EngineClosed);
        }
        let mut watch = self.clone();
        tokio::select! {
            biased;
            _ = watch.closed() => Err(DomainError::EngineClosed),
            result = operation => result,
        }
    }
}
