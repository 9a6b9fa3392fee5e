//! The seam between the player shell and whatever plays and draws the audio.

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::analyzer::Spectrogram;
use crate::config::{PlayerConfig, SpectrogramConfig, TimelineConfig};
use crate::object_url::ObjectUrl;
use crate::timeline::Timeline;

/// Identity of one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId(u64);

impl EngineId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Playing,
    Paused,
    Finished,
    TimeUpdate(f64),
}

/// Add-on visualizations an engine can draw next to the waveform.
#[derive(Debug, Clone, PartialEq)]
pub enum Plugin {
    Spectrogram(SpectrogramConfig),
    Timeline(TimelineConfig),
}

impl Plugin {
    pub fn name(&self) -> &'static str {
        match self {
            Plugin::Spectrogram(_) => "spectrogram",
            Plugin::Timeline(_) => "timeline",
        }
    }
}

/// Everything the renderer needs to draw the engine's current picture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineView {
    pub duration: f64,
    pub width: u16,
    pub peaks: Vec<f32>,
    pub spectrogram: Option<Spectrogram>,
    pub timeline: Option<Timeline>,
}

impl EngineView {
    /// Played fraction of the track for `current_time`.
    pub fn progress(&self, current_time: f64) -> f64 {
        if self.duration > 0.0 {
            (current_time / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Source {0} has no data")]
    EmptySource(String),
    #[error("No supported audio tracks found")]
    NoTrack,
    #[error("Decoding failed: {0}")]
    Decode(#[from] symphonia::core::errors::Error),
    #[error("Audio output unavailable: {0}")]
    Output(String),
}

pub trait Engine {
    fn id(&self) -> EngineId;
    fn play(&mut self);
    fn pause(&mut self);
    fn play_pause(&mut self);
    /// Jump to `fraction` (0..=1) of the track.
    fn seek_to(&mut self, fraction: f64);
    fn set_width(&mut self, width: u16);
    fn register_plugin(&mut self, plugin: Plugin);
    /// State changes since the previous poll.
    fn poll_events(&mut self) -> Vec<EngineEvent>;
    fn view(&self) -> Option<&EngineView>;
}

pub trait EngineFactory {
    /// Build an engine playing `source`. The engine must not keep using the
    /// source once it has been dropped.
    fn create(
        &mut self,
        source: &ObjectUrl,
        options: &PlayerConfig,
        width: u16,
    ) -> Result<Box<dyn Engine>, EngineError>;
}

impl<F> EngineFactory for F
where
    F: FnMut(&ObjectUrl, &PlayerConfig, u16) -> Result<Box<dyn Engine>, EngineError>,
{
    fn create(
        &mut self,
        source: &ObjectUrl,
        options: &PlayerConfig,
        width: u16,
    ) -> Result<Box<dyn Engine>, EngineError> {
        self(source, options, width)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::object_url::ObjectUrls;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    /// Calls observed on a [`MockEngine`].
    #[derive(Debug, Default)]
    pub(crate) struct MockLog {
        pub created: usize,
        pub dropped: usize,
        pub toggles: usize,
        pub plays: usize,
        pub widths: Vec<u16>,
        pub seeks: Vec<f64>,
        pub plugins: Vec<&'static str>,
        pub sources: Vec<String>,
        /// Whether the source URL still resolved when each engine dropped.
        pub source_live_at_drop: Vec<bool>,
        pub pending: Vec<EngineEvent>,
    }

    pub(crate) struct MockEngine {
        id: EngineId,
        playing: bool,
        source: String,
        urls: Arc<ObjectUrls>,
        log: Rc<RefCell<MockLog>>,
    }

    impl Engine for MockEngine {
        fn id(&self) -> EngineId {
            self.id
        }

        fn play(&mut self) {
            self.log.borrow_mut().plays += 1;
            if !self.playing {
                self.playing = true;
                self.log.borrow_mut().pending.push(EngineEvent::Playing);
            }
        }

        fn pause(&mut self) {
            if self.playing {
                self.playing = false;
                self.log.borrow_mut().pending.push(EngineEvent::Paused);
            }
        }

        fn play_pause(&mut self) {
            self.log.borrow_mut().toggles += 1;
            if self.playing {
                self.pause();
            } else {
                self.playing = true;
                self.log.borrow_mut().pending.push(EngineEvent::Playing);
            }
        }

        fn seek_to(&mut self, fraction: f64) {
            self.log.borrow_mut().seeks.push(fraction);
        }

        fn set_width(&mut self, width: u16) {
            self.log.borrow_mut().widths.push(width);
        }

        fn register_plugin(&mut self, plugin: Plugin) {
            self.log.borrow_mut().plugins.push(plugin.name());
        }

        fn poll_events(&mut self) -> Vec<EngineEvent> {
            std::mem::take(&mut self.log.borrow_mut().pending)
        }

        fn view(&self) -> Option<&EngineView> {
            None
        }
    }

    impl Drop for MockEngine {
        fn drop(&mut self) {
            let live = self.urls.resolve(&self.source).is_some();
            let mut log = self.log.borrow_mut();
            log.dropped += 1;
            log.source_live_at_drop.push(live);
        }
    }

    /// Factory producing [`MockEngine`]s that share one log.
    pub(crate) struct MockFactory {
        log: Rc<RefCell<MockLog>>,
        urls: Arc<ObjectUrls>,
    }

    impl MockFactory {
        pub(crate) fn new(log: Rc<RefCell<MockLog>>, urls: Arc<ObjectUrls>) -> Self {
            Self { log, urls }
        }
    }

    impl EngineFactory for MockFactory {
        fn create(
            &mut self,
            source: &ObjectUrl,
            _options: &PlayerConfig,
            _width: u16,
        ) -> Result<Box<dyn Engine>, EngineError> {
            let mut log = self.log.borrow_mut();
            log.created += 1;
            log.sources.push(source.as_str().to_owned());
            drop(log);
            Ok(Box::new(MockEngine {
                id: EngineId::next(),
                playing: false,
                source: source.as_str().to_owned(),
                urls: Arc::clone(&self.urls),
                log: Rc::clone(&self.log),
            }))
        }
    }

    #[test]
    fn engine_ids_are_unique() {
        assert_ne!(EngineId::next(), EngineId::next());
    }

    #[test]
    fn progress_is_clamped() {
        let view = EngineView {
            duration: 100.0,
            ..Default::default()
        };
        assert_eq!(view.progress(25.0), 0.25);
        assert_eq!(view.progress(250.0), 1.0);
        assert_eq!(EngineView::default().progress(3.0), 0.0);
    }
}
