//! Player state machine.
//!
//! Every input (load result, user toggle, engine report, terminal resize) goes
//! through [`PlayerShell::dispatch`], so transitions can be checked without a
//! terminal or an audio device.

use std::sync::Arc;

use crossbeam::channel::{Receiver, TryRecvError};

use crate::config::Config;
use crate::engine::{Engine, EngineEvent, EngineFactory, EngineId, EngineView, Plugin};
use crate::loader::{LoadError, LoadResult};
use crate::object_url::ObjectUrl;
use crate::viewport::{ResizeSubscription, Viewport};

/// `MM:SS`, both parts floored and zero padded.
pub fn format_time(seconds: f64) -> String {
    let seconds = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.0
    };
    let minutes = (seconds / 60.0).floor() as u64;
    let secs = (seconds % 60.0).floor() as u64;
    format!("{:02}:{:02}", minutes % 100, secs)
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Error(String),
}

#[derive(Debug)]
pub enum PlayerEvent {
    Mount,
    LoadCompleted(ObjectUrl),
    LoadFailed(String),
    Toggle,
    EnginePlaying,
    EnginePaused,
    EngineFinished,
    TimeUpdate(f64),
    Resize(u16),
    /// Jump to a fraction of the track.
    Seek(f64),
}

impl From<EngineEvent> for PlayerEvent {
    fn from(event: EngineEvent) -> Self {
        match event {
            EngineEvent::Playing => PlayerEvent::EnginePlaying,
            EngineEvent::Paused => PlayerEvent::EnginePaused,
            EngineEvent::Finished => PlayerEvent::EngineFinished,
            EngineEvent::TimeUpdate(t) => PlayerEvent::TimeUpdate(t),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Moved { from: PlayerState, to: PlayerState },
    /// Handled without a state change.
    Stayed,
    /// Not valid in the current state; nothing happened.
    Ignored,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackState {
    pub current_time: f64,
    pub is_playing: bool,
    pub container_width: u16,
}

pub struct PlayerShell<F: EngineFactory> {
    state: PlayerState,
    playback: PlaybackState,
    config: Config,
    factory: F,
    viewport: Arc<Viewport>,
    // dropped in this order on teardown: resize, load, engine, source
    resize: Option<ResizeSubscription>,
    pending_load: Option<Receiver<LoadResult>>,
    engine: Option<Box<dyn Engine>>,
    source: Option<ObjectUrl>,
    plugins_attached_to: Option<EngineId>,
    torn_down: bool,
}

impl<F: EngineFactory> PlayerShell<F> {
    pub fn new(config: Config, factory: F, viewport: Arc<Viewport>) -> Self {
        Self {
            state: PlayerState::Idle,
            playback: PlaybackState::default(),
            config,
            factory,
            viewport,
            resize: None,
            pending_load: None,
            engine: None,
            source: None,
            plugins_attached_to: None,
            torn_down: false,
        }
    }

    /// Start listening for resizes and kick off the asset load.
    pub fn mount(&mut self, start_load: impl FnOnce() -> Receiver<LoadResult>) {
        if let Transition::Moved { .. } = self.dispatch(PlayerEvent::Mount) {
            self.pending_load = Some(start_load());
        }
    }

    /// Drain everything that arrived since the last frame.
    pub fn tick(&mut self) {
        if self.torn_down {
            return;
        }
        if let Some(width) = self.resize.as_ref().and_then(ResizeSubscription::latest) {
            self.dispatch(PlayerEvent::Resize(width));
        }

        if let Some(rx) = &self.pending_load {
            let event = match rx.try_recv() {
                Ok(Ok(url)) => Some(PlayerEvent::LoadCompleted(url)),
                Ok(Err(err)) => Some(PlayerEvent::LoadFailed(err.to_string())),
                Err(TryRecvError::Disconnected) => {
                    Some(PlayerEvent::LoadFailed(LoadError::Disconnected.to_string()))
                }
                Err(TryRecvError::Empty) => None,
            };
            if let Some(event) = event {
                self.pending_load = None;
                self.dispatch(event);
            }
        }

        let events = self
            .engine
            .as_mut()
            .map(|engine| engine.poll_events())
            .unwrap_or_default();
        for event in events {
            self.dispatch(event.into());
        }
    }

    pub fn toggle_play_pause(&mut self) -> Transition {
        self.dispatch(PlayerEvent::Toggle)
    }

    pub fn dispatch(&mut self, event: PlayerEvent) -> Transition {
        if self.torn_down {
            tracing::debug!(?event, "event after teardown ignored");
            return Transition::Ignored;
        }
        match (&self.state, event) {
            (PlayerState::Idle, PlayerEvent::Mount) => {
                let subscription = self.viewport.subscribe();
                self.playback.container_width = subscription.current_width();
                self.resize = Some(subscription);
                self.move_to(PlayerState::Loading)
            }
            (PlayerState::Loading, PlayerEvent::LoadCompleted(url)) => self.attach_source(url),
            (PlayerState::Loading, PlayerEvent::LoadFailed(message)) => {
                tracing::error!("audio load failed: {message}");
                self.move_to(PlayerState::Error(message))
            }
            (_, PlayerEvent::Toggle) => match self.engine.as_mut() {
                Some(engine) => {
                    engine.play_pause();
                    Transition::Stayed
                }
                None => {
                    tracing::debug!("toggle before the engine exists");
                    Transition::Ignored
                }
            },
            (PlayerState::Ready | PlayerState::Paused, PlayerEvent::EnginePlaying) => {
                self.playback.is_playing = true;
                self.move_to(PlayerState::Playing)
            }
            (PlayerState::Playing, PlayerEvent::EnginePlaying) => Transition::Stayed,
            (PlayerState::Playing, PlayerEvent::EnginePaused | PlayerEvent::EngineFinished) => {
                self.playback.is_playing = false;
                self.move_to(PlayerState::Paused)
            }
            (PlayerState::Paused, PlayerEvent::EnginePaused | PlayerEvent::EngineFinished) => {
                Transition::Stayed
            }
            (
                PlayerState::Ready | PlayerState::Playing | PlayerState::Paused,
                PlayerEvent::TimeUpdate(seconds),
            ) => {
                self.playback.current_time = seconds;
                Transition::Stayed
            }
            (_, PlayerEvent::Resize(width)) => {
                self.playback.container_width = width;
                if let Some(engine) = self.engine.as_mut() {
                    engine.set_width(width);
                }
                Transition::Stayed
            }
            (_, PlayerEvent::Seek(fraction)) => {
                let interact = self.config.player.interact;
                match self.engine.as_mut() {
                    Some(engine) if interact => {
                        engine.seek_to(fraction);
                        Transition::Stayed
                    }
                    _ => Transition::Ignored,
                }
            }
            (state, event) => {
                tracing::debug!(?state, ?event, "ignored event");
                // a late load result is dropped here, which revokes it
                Transition::Ignored
            }
        }
    }

    fn attach_source(&mut self, url: ObjectUrl) -> Transition {
        let width = self.playback.container_width;
        match self.factory.create(&url, &self.config.player, width) {
            Ok(engine) => {
                tracing::info!(source = %url, "engine ready");
                self.source = Some(url);
                self.engine = Some(engine);
                self.attach_plugins();
                let transition = self.move_to(PlayerState::Ready);
                if self.config.player.autoplay {
                    if let Some(engine) = self.engine.as_mut() {
                        engine.play();
                    }
                }
                transition
            }
            Err(err) => {
                tracing::error!(source = %url, "engine failed to start: {err}");
                drop(url);
                self.move_to(PlayerState::Error(err.to_string()))
            }
        }
    }

    // once per engine instance
    fn attach_plugins(&mut self) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        if self.plugins_attached_to == Some(engine.id()) {
            return;
        }
        engine.register_plugin(Plugin::Timeline(self.config.timeline.clone()));
        engine.register_plugin(Plugin::Spectrogram(self.config.spectrogram.clone()));
        self.plugins_attached_to = Some(engine.id());
    }

    fn move_to(&mut self, to: PlayerState) -> Transition {
        let from = std::mem::replace(&mut self.state, to.clone());
        tracing::debug!(?from, ?to, "player state changed");
        Transition::Moved { from, to }
    }

    /// Release everything the shell owns. The engine goes before the source
    /// it plays, and the source is revoked exactly once.
    pub fn unmount(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.resize = None;
        self.pending_load = None;
        self.engine = None;
        self.source = None;
        self.plugins_attached_to = None;
        self.playback.is_playing = false;
        tracing::debug!(
            resize_subscribers = self.viewport.subscriber_count(),
            "player unmounted"
        );
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn playback(&self) -> PlaybackState {
        self.playback
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine_view(&self) -> Option<&EngineView> {
        self.engine.as_ref().and_then(|engine| engine.view())
    }

    #[cfg(test)]
    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn time_display(&self) -> String {
        format_time(self.playback.current_time)
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            PlayerState::Error(message) => Some(message),
            _ => None,
        }
    }
}

impl<F: EngineFactory> Drop for PlayerShell<F> {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlayerConfig;
    use crate::engine::EngineError;
    use crate::engine::tests::{MockFactory, MockLog};
    use crate::object_url::ObjectUrls;
    use crossbeam::channel::{Sender, bounded};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Harness {
        shell: PlayerShell<MockFactory>,
        log: Rc<RefCell<MockLog>>,
        urls: Arc<ObjectUrls>,
        viewport: Arc<Viewport>,
        load_tx: Sender<LoadResult>,
    }

    fn harness(config: Config) -> Harness {
        let log = Rc::new(RefCell::new(MockLog::default()));
        let urls = ObjectUrls::new();
        let viewport = Viewport::new(80);
        let factory = MockFactory::new(log.clone(), urls.clone());
        let mut shell = PlayerShell::new(config, factory, viewport.clone());
        let (load_tx, load_rx) = bounded(1);
        shell.mount(move || load_rx);
        Harness {
            shell,
            log,
            urls,
            viewport,
            load_tx,
        }
    }

    fn manual_play() -> Config {
        let mut config = Config::default();
        config.player.autoplay = false;
        config
    }

    fn ready(h: &mut Harness) {
        h.load_tx.send(Ok(h.urls.create(vec![1u8, 2, 3]))).unwrap();
        h.shell.tick();
        assert!(h.shell.has_engine());
    }

    #[test]
    fn time_is_floored_and_padded() {
        assert_eq!(format_time(0.0), "00:00");
        assert_eq!(format_time(65.0), "01:05");
        assert_eq!(format_time(599.9), "09:59");
        assert_eq!(format_time(59.999), "00:59");
        assert_eq!(format_time(3600.0), "60:00");
        assert_eq!(format_time(-4.0), "00:00");
        assert_eq!(format_time(f64::NAN), "00:00");
    }

    #[test]
    fn mount_starts_loading_and_measures_width() {
        let h = harness(manual_play());
        assert_eq!(h.shell.state(), &PlayerState::Loading);
        assert_eq!(h.shell.playback().container_width, 80);
        assert_eq!(h.viewport.subscriber_count(), 1);
    }

    #[test]
    fn toggle_without_engine_does_nothing() {
        let mut h = harness(manual_play());
        let before = h.shell.playback();
        assert_eq!(h.shell.toggle_play_pause(), Transition::Ignored);
        assert_eq!(h.shell.state(), &PlayerState::Loading);
        assert_eq!(h.shell.playback(), before);

        let factory = MockFactory::new(h.log.clone(), h.urls.clone());
        let mut idle = PlayerShell::new(Config::default(), factory, Viewport::new(10));
        assert_eq!(idle.toggle_play_pause(), Transition::Ignored);
        assert_eq!(idle.state(), &PlayerState::Idle);
        assert_eq!(h.log.borrow().toggles, 0);
    }

    #[test]
    fn engine_waits_for_the_load() {
        let mut h = harness(manual_play());
        for _ in 0..3 {
            h.shell.tick();
        }
        assert_eq!(h.log.borrow().created, 0);

        let url = h.urls.create(vec![9u8]);
        let expected = url.as_str().to_owned();
        h.load_tx.send(Ok(url)).unwrap();
        h.shell.tick();

        assert_eq!(h.shell.state(), &PlayerState::Ready);
        assert_eq!(h.log.borrow().created, 1);
        assert_eq!(h.log.borrow().sources, vec![expected]);
    }

    #[test]
    fn plugins_attach_once_per_engine() {
        let mut h = harness(manual_play());
        ready(&mut h);
        h.viewport.publish(100);
        h.shell.tick();
        h.shell.tick();
        assert_eq!(h.log.borrow().plugins, vec!["timeline", "spectrogram"]);
    }

    #[test]
    fn toggle_round_trip_follows_engine_events() {
        let mut h = harness(manual_play());
        ready(&mut h);

        assert_eq!(h.shell.toggle_play_pause(), Transition::Stayed);
        h.shell.tick();
        assert_eq!(h.shell.state(), &PlayerState::Playing);
        assert!(h.shell.playback().is_playing);

        h.shell.toggle_play_pause();
        h.shell.tick();
        assert_eq!(h.shell.state(), &PlayerState::Paused);
        assert!(!h.shell.playback().is_playing);
        assert_eq!(h.log.borrow().toggles, 2);
    }

    #[test]
    fn autoplay_starts_playback() {
        let mut h = harness(Config::default());
        ready(&mut h);
        assert_eq!(h.log.borrow().plays, 1);
        h.shell.tick();
        assert_eq!(h.shell.state(), &PlayerState::Playing);
    }

    #[test]
    fn resize_keeps_playback_position() {
        let mut h = harness(manual_play());
        ready(&mut h);
        h.shell.dispatch(PlayerEvent::EnginePlaying);
        h.shell.dispatch(PlayerEvent::TimeUpdate(42.5));

        h.viewport.publish(132);
        h.shell.tick();

        let playback = h.shell.playback();
        assert_eq!(playback.container_width, 132);
        assert_eq!(playback.current_time, 42.5);
        assert!(playback.is_playing);
        assert_eq!(h.log.borrow().widths.last(), Some(&132));
        assert_eq!(h.log.borrow().created, 1);
    }

    #[test]
    fn teardown_releases_source_once_after_engine() {
        let mut h = harness(manual_play());
        ready(&mut h);
        assert_eq!(h.urls.live(), 1);

        h.shell.unmount();
        h.shell.unmount();
        drop(h.shell);

        assert_eq!(h.urls.issued(), 1);
        assert_eq!(h.urls.revoked(), 1);
        assert_eq!(h.log.borrow().dropped, 1);
        assert_eq!(h.log.borrow().source_live_at_drop, vec![true]);
        assert_eq!(h.viewport.subscriber_count(), 0);
    }

    #[test]
    fn load_failure_is_visible() {
        let mut h = harness(manual_play());
        let err = crate::fetch::FetchError::Status {
            url: "http://localhost/audio/audio.m4a".into(),
            status: 404,
        };
        h.load_tx.send(Err(err.into())).unwrap();
        h.shell.tick();

        assert!(matches!(h.shell.state(), PlayerState::Error(_)));
        assert!(h.shell.error().unwrap().contains("404"));
        assert_eq!(h.shell.toggle_play_pause(), Transition::Ignored);
        assert_eq!(h.log.borrow().created, 0);
    }

    #[test]
    fn loader_vanishing_is_a_failure() {
        let mut h = harness(manual_play());
        // dropping the only sender disconnects the load channel
        h.load_tx = bounded(1).0;
        h.shell.tick();
        assert!(matches!(h.shell.state(), PlayerState::Error(_)));
    }

    #[test]
    fn load_finishing_after_teardown_is_released() {
        let mut h = harness(manual_play());
        h.shell.unmount();
        let late = h.urls.create(vec![1u8]);
        assert_eq!(h.shell.dispatch(PlayerEvent::LoadCompleted(late)), Transition::Ignored);
        assert_eq!(h.urls.issued(), h.urls.revoked());
        assert_eq!(h.log.borrow().created, 0);
    }

    #[test]
    fn failed_engine_start_releases_source() {
        let urls = ObjectUrls::new();
        let factory = |_: &ObjectUrl, _: &PlayerConfig, _: u16| -> Result<Box<dyn Engine>, EngineError> {
            Err(EngineError::NoTrack)
        };
        let mut shell = PlayerShell::new(manual_play(), factory, Viewport::new(40));
        let (tx, rx) = bounded(1);
        shell.mount(move || rx);
        tx.send(Ok(urls.create(vec![0u8]))).unwrap();
        shell.tick();

        assert!(matches!(shell.state(), PlayerState::Error(_)));
        assert_eq!(urls.live(), 0);
        assert_eq!(urls.revoked(), 1);
    }

    #[test]
    fn seek_respects_interact_setting() {
        let mut h = harness(manual_play());
        ready(&mut h);
        assert_eq!(h.shell.dispatch(PlayerEvent::Seek(0.5)), Transition::Stayed);
        assert_eq!(h.log.borrow().seeks, vec![0.5]);

        let mut config = manual_play();
        config.player.interact = false;
        let mut h = harness(config);
        ready(&mut h);
        assert_eq!(h.shell.dispatch(PlayerEvent::Seek(0.5)), Transition::Ignored);
    }

    #[test]
    fn illegal_transitions_are_ignored() {
        let mut h = harness(manual_play());
        assert_eq!(h.shell.dispatch(PlayerEvent::EnginePlaying), Transition::Ignored);
        assert_eq!(h.shell.dispatch(PlayerEvent::TimeUpdate(3.0)), Transition::Ignored);
        assert_eq!(h.shell.dispatch(PlayerEvent::Mount), Transition::Ignored);
        assert_eq!(h.shell.state(), &PlayerState::Loading);
        assert_eq!(h.shell.playback().current_time, 0.0);
    }

    #[test]
    fn finishing_pauses() {
        let mut h = harness(manual_play());
        ready(&mut h);
        h.shell.dispatch(PlayerEvent::EnginePlaying);
        let t = h.shell.dispatch(PlayerEvent::EngineFinished);
        assert_eq!(
            t,
            Transition::Moved {
                from: PlayerState::Playing,
                to: PlayerState::Paused
            }
        );
    }
}
