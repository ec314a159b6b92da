use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::InstrumentationError;
use crate::flusher::Flush;
use crate::sample::Sample;

/// Accumulates samples and owns the single debounce timer.
///
/// The first sample recorded into an idle buffer arms a timer; later
/// samples ride along without extending it. When the timer fires the
/// pending samples are taken out under the lock and only then handed to
/// the flusher, so a concurrent `record` always lands in the next batch.
pub struct SampleBuffer {
    inner: Mutex<Pending>,
    debounce: Duration,
    flusher: Arc<dyn Flush>,
}

struct Pending {
    /// Completion order.
    samples: Vec<Sample>,
    /// `Some` exactly while a flush is scheduled and has not fired.
    timer: Option<JoinHandle<()>>,
}

impl SampleBuffer {
    pub fn new(debounce: Duration, flusher: Arc<dyn Flush>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Pending {
                samples: Vec::new(),
                timer: None,
            }),
            debounce,
            flusher,
        })
    }

    /// Append a sample, arming the flush timer if none is pending.
    ///
    /// Must be called from within a tokio runtime when the timer needs
    /// arming; otherwise the sample is refused with `NoRuntime`.
    pub fn record(self: &Arc<Self>, sample: Sample) -> Result<(), InstrumentationError> {
        let mut pending = self.inner.lock();

        if pending.timer.is_none() {
            let runtime = Handle::try_current().map_err(|_| InstrumentationError::NoRuntime)?;
            let buffer = Arc::downgrade(self);
            let delay = self.debounce;
            pending.timer = Some(runtime.spawn(fire_after(buffer, delay)));
        }

        pending.samples.push(sample);
        Ok(())
    }

    /// Flush immediately, cancelling an armed timer.
    pub fn flush_now(self: &Arc<Self>) {
        let batch = {
            let mut pending = self.inner.lock();
            if let Some(timer) = pending.timer.take() {
                timer.abort();
            }
            std::mem::take(&mut pending.samples)
        };
        self.dispatch(batch);
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().samples.len()
    }

    pub fn is_timer_armed(&self) -> bool {
        self.inner.lock().timer.is_some()
    }

    /// Timer expiry: snapshot-and-clear, then flush outside the lock.
    fn on_timer(self: &Arc<Self>) {
        let batch = {
            let mut pending = self.inner.lock();
            pending.timer = None;
            std::mem::take(&mut pending.samples)
        };
        self.dispatch(batch);
    }

    fn dispatch(self: &Arc<Self>, batch: Vec<Sample>) {
        if batch.is_empty() {
            debug!("flush skipped, no pending samples");
            return;
        }
        self.flusher.flush(self, batch);
    }
}

async fn fire_after(buffer: Weak<SampleBuffer>, delay: Duration) {
    tokio::time::sleep(delay).await;
    if let Some(buffer) = buffer.upgrade() {
        buffer.on_timer();
    }
}
