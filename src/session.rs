use std::sync::Arc;

use image::RgbaImage;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::EditorConfig;
use crate::editor::CurveEditor;
use crate::histogram::{Histogram, HISTOGRAMS};
use crate::image_io::preview_copy;
use crate::models::{Background, Clothing, CurveSettings, ImageId};
use crate::pipeline::GenerateRequest;
use crate::preview::{Preview, PreviewScheduler};

pub struct EditingSession {
    id: ImageId,
    photo: Arc<RgbaImage>,
    editor: CurveEditor,
    preview: PreviewScheduler,
    histogram: watch::Receiver<Option<Arc<Histogram>>>,
    histogram_task: JoinHandle<()>,
}

impl EditingSession {
    /// Starts grading `photo`. The histogram is computed in the background
    /// and never holds up editing. Must be called from within a tokio
    /// runtime.
    pub fn new(photo: RgbaImage, settings: CurveSettings, config: &EditorConfig) -> Self {
        let id = ImageId::new();
        let photo = Arc::new(photo);
        let preview_source = Arc::new(preview_copy(&photo, config.preview_max_dimension));

        let (tx, histogram) = watch::channel(None);
        let source = preview_source.clone();
        let histogram_task = tokio::spawn(async move {
            let hist = HISTOGRAMS.histogram_for(id, &source).await;
            let _ = tx.send(Some(hist));
        });

        let preview = PreviewScheduler::new(preview_source, config.debounce());
        let initial_is_identity = settings.is_identity();
        let editor = CurveEditor::new(settings.clone(), config.history_capacity);
        if !initial_is_identity {
            preview.schedule(settings);
        }
        debug!(image = %id, "editing session started");

        Self {
            id,
            photo,
            editor,
            preview,
            histogram,
            histogram_task,
        }
    }

    pub fn id(&self) -> ImageId {
        self.id
    }

    pub fn photo(&self) -> &Arc<RgbaImage> {
        &self.photo
    }

    pub fn editor(&self) -> &CurveEditor {
        &self.editor
    }

    pub fn settings(&self) -> &CurveSettings {
        self.editor.settings()
    }

    /// Runs one edit against the curve editor and reschedules the preview
    /// when the live settings changed.
    pub fn edit<R>(&mut self, f: impl FnOnce(&mut CurveEditor) -> R) -> R {
        let before = self.editor.settings().clone();
        let out = f(&mut self.editor);
        if self.editor.settings() != &before {
            self.preview.schedule(self.editor.settings().clone());
        }
        out
    }

    pub fn preview(&self) -> Preview {
        self.preview.latest()
    }

    pub fn subscribe_preview(&self) -> watch::Receiver<Preview> {
        self.preview.subscribe()
    }

    /// `None` until the background computation finishes.
    pub fn histogram(&self) -> Option<Arc<Histogram>> {
        self.histogram.borrow().clone()
    }

    pub async fn wait_for_histogram(&mut self) -> Option<Arc<Histogram>> {
        self.histogram
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|h| h.clone())
    }

    /// Snapshot of everything "Generate" needs, at full resolution.
    pub fn generate_request(&self, background: Background, clothing: Clothing) -> GenerateRequest {
        GenerateRequest {
            photo: self.photo.clone(),
            curves: self.editor.settings().clone(),
            background,
            clothing,
        }
    }
}

impl Drop for EditingSession {
    fn drop(&mut self) {
        self.preview.cancel();
        self.histogram_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Channel;
    use image::Rgba;
    use std::time::Duration;

    fn photo() -> RgbaImage {
        RgbaImage::from_fn(70, 90, |x, y| Rgba([(x * 3) as u8, (y * 2) as u8, 40, 255]))
    }

    #[tokio::test(start_paused = true)]
    async fn edits_reach_the_preview_after_quiescence() {
        let config = EditorConfig::default();
        let mut session = EditingSession::new(photo(), CurveSettings::default(), &config);
        let mut rx = session.subscribe_preview();

        session.edit(|ed| {
            ed.select_channel(Channel::Red);
            ed.add_point(128, 200)
        })
        .unwrap();
        assert_eq!(session.preview().generation, 0);

        rx.changed().await.unwrap();
        let preview = rx.borrow().clone();
        assert_eq!(preview.generation, 1);
        let expected = crate::curves::grade_image(session.photo(), session.settings());
        assert_eq!(*preview.image, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn no_op_edit_does_not_schedule() {
        let config = EditorConfig::default();
        let mut session = EditingSession::new(photo(), CurveSettings::default(), &config);
        assert!(!session.edit(|ed| ed.undo()));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(session.preview().generation, 0);
    }

    #[tokio::test]
    async fn histogram_arrives_without_blocking_edits() {
        let config = EditorConfig::default();
        let mut session = EditingSession::new(photo(), CurveSettings::default(), &config);
        session.edit(|ed| ed.add_point(64, 90)).unwrap();
        assert_eq!(session.editor().history().len(), 2);

        let hist = session.wait_for_histogram().await.unwrap();
        assert_eq!(hist.pixel_count, 70 * 90);
        assert!(Arc::ptr_eq(&hist, &session.histogram().unwrap()));
        assert!(HISTOGRAMS.get(&session.id()).is_some());
    }

    #[test]
    fn generate_request_uses_full_resolution_crop() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let _guard = rt.enter();
        let config = EditorConfig {
            preview_max_dimension: 30,
            ..EditorConfig::default()
        };
        let session = EditingSession::new(photo(), CurveSettings::default(), &config);
        let req = session.generate_request(Background::Blue, Clothing::ShirtWhite);
        assert_eq!(req.photo.dimensions(), (70, 90));
        assert_eq!(session.preview().image.height(), 30);
        assert_eq!(req.background, Background::Blue);
    }
}
