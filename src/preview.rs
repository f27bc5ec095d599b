use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::RgbaImage;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::curves::grade_image_cooperative;
use crate::error::Result;
use crate::models::CurveSettings;

/// A published preview and the generation that produced it.
#[derive(Debug, Clone)]
pub struct Preview {
    pub generation: u64,
    pub image: Arc<RgbaImage>,
}

pub type BoxedRender = Pin<Box<dyn Future<Output = Result<RgbaImage>> + Send>>;

/// Produces a preview raster from the source and the settings in effect.
pub type RenderFn = Arc<dyn Fn(Arc<RgbaImage>, CurveSettings) -> BoxedRender + Send + Sync>;

struct Inner {
    source: Arc<RgbaImage>,
    quiescence: Duration,
    generation: AtomicU64,
    pending: Mutex<Option<JoinHandle<()>>>,
    render: RenderFn,
    published: watch::Sender<Preview>,
}

#[derive(Clone)]
pub struct PreviewScheduler {
    inner: Arc<Inner>,
}

fn grade_render() -> RenderFn {
    Arc::new(|source: Arc<RgbaImage>, settings: CurveSettings| -> BoxedRender {
        Box::pin(async move { grade_image_cooperative(&source, &settings).await })
    })
}

impl PreviewScheduler {
    /// Grades `source` with the curve LUTs. The ungraded source is the
    /// initial preview (generation 0).
    pub fn new(source: Arc<RgbaImage>, quiescence: Duration) -> Self {
        Self::with_renderer(source, quiescence, grade_render())
    }

    pub fn with_renderer(source: Arc<RgbaImage>, quiescence: Duration, render: RenderFn) -> Self {
        let (published, _) = watch::channel(Preview {
            generation: 0,
            image: source.clone(),
        });
        Self {
            inner: Arc::new(Inner {
                source,
                quiescence,
                generation: AtomicU64::new(0),
                pending: Mutex::new(None),
                render,
                published,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Preview> {
        self.inner.published.subscribe()
    }

    pub fn latest(&self) -> Preview {
        self.inner.published.borrow().clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Whether a timer or render is still outstanding.
    pub fn is_pending(&self) -> bool {
        self.inner
            .pending
            .lock()
            .map(|slot| slot.as_ref().map(|h| !h.is_finished()).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Restarts the quiescence window for `settings`. Must be called from
    /// within a tokio runtime.
    pub fn schedule(&self, settings: CurveSettings) -> u64 {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(inner.quiescence).await;
            if inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            let rendered = (inner.render)(inner.source.clone(), settings).await;
            publish(&inner, generation, rendered);
        });

        if let Ok(mut slot) = self.inner.pending.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
        generation
    }

    /// Drops any pending recompute; the current preview stays.
    pub fn cancel(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut slot) = self.inner.pending.lock() {
            if let Some(previous) = slot.take() {
                previous.abort();
            }
        }
    }
}

fn publish(inner: &Inner, generation: u64, rendered: Result<RgbaImage>) {
    if inner.generation.load(Ordering::SeqCst) != generation {
        debug!(generation, "discarding stale preview");
        return;
    }
    match rendered {
        Ok(image) => {
            inner.published.send_replace(Preview {
                generation,
                image: Arc::new(image),
            });
            debug!(generation, "preview published");
        }
        Err(e) => warn!(generation, "preview render failed, keeping previous: {e}"),
    }
}
