//! Playback event dispatcher.
//!
//! Sits between the audio-controller event stream and the session engine.
//! Forwards now-playing and state updates, and debounces stop transitions so
//! a momentary "stopped" blip during a track change never causes a visible
//! stop-and-relaunch cycle on the receiver: only a stop state that outlives
//! the debounce window is treated as real.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::session::SessionControl;
use super::types::{MessageKind, PlayState, PlaybackPayload};
use crate::protocol_constants::STOP_DEBOUNCE;

/// Dispatcher parameters.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How long an inactive state must persist before the cast is stopped.
    pub stop_debounce: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            stop_debounce: STOP_DEBOUNCE,
        }
    }
}

/// Upstream playback signals, mirroring the controller's two event shapes.
#[derive(Debug, Clone)]
pub enum PlaybackSignal {
    /// Track metadata is present (or the zone is explicitly playing).
    NowPlaying(PlaybackPayload),
    /// Bare transport-state change.
    State(PlaybackPayload),
}

/// Cloneable handle feeding the dispatcher task.
#[derive(Clone)]
pub struct DispatcherHandle {
    signals: mpsc::Sender<PlaybackSignal>,
}

impl DispatcherHandle {
    /// Routes one controller playback update: payloads carrying track data,
    /// or an explicit playing state, take the now-playing path so that track
    /// changes which briefly report "stopped" still refresh the display.
    pub async fn dispatch_update(&self, payload: PlaybackPayload) {
        let signal = if payload.now_playing.is_some() || payload.is_playing() {
            PlaybackSignal::NowPlaying(payload)
        } else {
            PlaybackSignal::State(payload)
        };
        let _ = self.signals.send(signal).await;
    }

    pub async fn now_playing(&self, payload: PlaybackPayload) {
        let _ = self.signals.send(PlaybackSignal::NowPlaying(payload)).await;
    }

    pub async fn state(&self, payload: PlaybackPayload) {
        let _ = self.signals.send(PlaybackSignal::State(payload)).await;
    }
}

/// Spawns the dispatcher task and returns its handle.
pub fn spawn_dispatcher(
    config: DispatcherConfig,
    session: Arc<dyn SessionControl>,
) -> DispatcherHandle {
    let (signal_tx, signal_rx) = mpsc::channel(32);
    let dispatcher = Dispatcher {
        config,
        session,
        signals: signal_rx,
        stop_at: None,
    };
    tokio::spawn(dispatcher.run());
    DispatcherHandle { signals: signal_tx }
}

struct Dispatcher {
    config: DispatcherConfig,
    session: Arc<dyn SessionControl>,
    signals: mpsc::Receiver<PlaybackSignal>,
    /// The single debounced stop decision; at most one may be pending.
    stop_at: Option<Instant>,
}

impl Dispatcher {
    async fn run(mut self) {
        loop {
            tokio::select! {
                signal = self.signals.recv() => match signal {
                    Some(signal) => self.handle_signal(signal).await,
                    None => break,
                },
                _ = sleep_until_opt(self.stop_at) => self.fire_stop().await,
            }
        }
    }

    async fn handle_signal(&mut self, signal: PlaybackSignal) {
        match signal {
            PlaybackSignal::NowPlaying(payload) => {
                self.cancel_stop("now-playing data received");
                if let Some(state) = payload.state {
                    // Forward only genuinely playing / transitional /
                    // stopped-with-data states.
                    if !matches!(
                        state,
                        PlayState::Playing | PlayState::Loading | PlayState::Stopped
                    ) {
                        log::debug!("[Dispatch] skipping NOW_PLAYING while state is {:?}", state);
                        return;
                    }
                }
                self.forward(MessageKind::NowPlaying, payload).await;
            }
            PlaybackSignal::State(payload) => {
                let playing = payload.is_playing();
                let transitioning =
                    payload.state == Some(PlayState::Loading) || payload.state.is_none();
                if playing || transitioning {
                    self.cancel_stop("playback active or transitioning");
                    self.forward(MessageKind::State, payload).await;
                    return;
                }
                if self.stop_at.is_some() {
                    log::debug!("[Dispatch] stop already scheduled, dropping state event");
                    return;
                }
                log::info!(
                    "[Dispatch] scheduling cast stop in {:?} (state {:?})",
                    self.config.stop_debounce,
                    payload.state
                );
                self.stop_at = Some(Instant::now() + self.config.stop_debounce);
            }
        }
    }

    async fn forward(&self, kind: MessageKind, payload: PlaybackPayload) {
        if let Err(err) = self.session.ensure_launched().await {
            log::warn!("[Dispatch] application not available: {}", err);
            return;
        }
        if let Err(err) = self.session.send(kind, payload).await {
            // The session engine classifies and recovers on its own.
            log::warn!("[Dispatch] send failed: {}", err);
        }
    }

    fn cancel_stop(&mut self, reason: &str) {
        if self.stop_at.take().is_some() {
            log::info!("[Dispatch] cancelling pending stop: {}", reason);
        }
    }

    async fn fire_stop(&mut self) {
        self.stop_at = None;
        log::info!("[Dispatch] executing delayed stop");
        self.session.stop_app().await;
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cast::CastError;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        EnsureLaunched,
        Send(MessageKind, Option<PlayState>),
        StopApp,
    }

    #[derive(Default)]
    struct RecordingSession {
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingSession {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn stop_count(&self) -> usize {
            self.calls()
                .iter()
                .filter(|call| **call == Call::StopApp)
                .count()
        }
    }

    #[async_trait]
    impl SessionControl for RecordingSession {
        async fn ensure_launched(&self) -> Result<(), CastError> {
            self.calls.lock().push(Call::EnsureLaunched);
            Ok(())
        }

        async fn send(
            &self,
            kind: MessageKind,
            payload: PlaybackPayload,
        ) -> Result<(), CastError> {
            self.calls.lock().push(Call::Send(kind, payload.state));
            Ok(())
        }

        async fn stop_app(&self) {
            self.calls.lock().push(Call::StopApp);
        }
    }

    fn payload(state: Option<PlayState>) -> PlaybackPayload {
        PlaybackPayload {
            zone_name: Some("Kitchen".into()),
            state,
            ..Default::default()
        }
    }

    fn with_track(state: Option<PlayState>) -> PlaybackPayload {
        PlaybackPayload {
            now_playing: Some(crate::cast::types::NowPlaying::default()),
            ..payload(state)
        }
    }

    fn spawn_test_dispatcher() -> (DispatcherHandle, Arc<RecordingSession>) {
        let session = Arc::new(RecordingSession::default());
        let handle = spawn_dispatcher(DispatcherConfig::default(), session.clone());
        (handle, session)
    }

    /// Parks until the dispatcher has drained its queue.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn now_playing_is_launched_then_sent() {
        let (handle, session) = spawn_test_dispatcher();
        handle
            .now_playing(with_track(Some(PlayState::Playing)))
            .await;
        settle().await;
        assert_eq!(
            session.calls(),
            vec![
                Call::EnsureLaunched,
                Call::Send(MessageKind::NowPlaying, Some(PlayState::Playing))
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_now_playing_with_metadata_is_still_forwarded() {
        let (handle, session) = spawn_test_dispatcher();
        handle
            .now_playing(with_track(Some(PlayState::Stopped)))
            .await;
        settle().await;
        assert_eq!(
            session.calls(),
            vec![
                Call::EnsureLaunched,
                Call::Send(MessageKind::NowPlaying, Some(PlayState::Stopped))
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn paused_now_playing_is_skipped() {
        let (handle, session) = spawn_test_dispatcher();
        handle.now_playing(with_track(Some(PlayState::Paused))).await;
        settle().await;
        assert!(session.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_state_schedules_exactly_one_debounced_stop() {
        let (handle, session) = spawn_test_dispatcher();
        handle.state(payload(Some(PlayState::Paused))).await;
        settle().await;
        assert!(session.calls().is_empty());

        // A second inactive event inside the window is dropped; the stop
        // still fires at the first event's deadline.
        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.state(payload(Some(PlayState::Paused))).await;
        tokio::time::sleep(Duration::from_millis(1400)).await;
        assert_eq!(session.stop_count(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(session.stop_count(), 1);

        // Nothing further fires once the timer is spent.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(session.stop_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn playing_event_cancels_pending_stop() {
        let (handle, session) = spawn_test_dispatcher();
        handle.state(payload(Some(PlayState::Paused))).await;
        settle().await;

        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.state(payload(Some(PlayState::Playing))).await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(session.stop_count(), 0);
        assert!(session
            .calls()
            .contains(&Call::Send(MessageKind::State, Some(PlayState::Playing))));
    }

    #[tokio::test(start_paused = true)]
    async fn now_playing_event_cancels_pending_stop() {
        let (handle, session) = spawn_test_dispatcher();
        handle.state(payload(Some(PlayState::Paused))).await;
        settle().await;

        handle
            .now_playing(with_track(Some(PlayState::Playing)))
            .await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(session.stop_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transitioning_state_is_forwarded_not_debounced() {
        let (handle, session) = spawn_test_dispatcher();
        handle.state(payload(Some(PlayState::Loading))).await;
        handle.state(payload(None)).await;
        settle().await;
        assert_eq!(
            session.calls(),
            vec![
                Call::EnsureLaunched,
                Call::Send(MessageKind::State, Some(PlayState::Loading)),
                Call::EnsureLaunched,
                Call::Send(MessageKind::State, None)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_update_routes_by_track_presence() {
        let (handle, session) = spawn_test_dispatcher();
        // Track metadata present, state stopped: still the now-playing path.
        handle
            .dispatch_update(with_track(Some(PlayState::Stopped)))
            .await;
        // Bare stopped state without metadata: the state path (debounce).
        handle.dispatch_update(payload(Some(PlayState::Stopped))).await;
        settle().await;
        assert_eq!(
            session.calls(),
            vec![
                Call::EnsureLaunched,
                Call::Send(MessageKind::NowPlaying, Some(PlayState::Stopped))
            ]
        );
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(session.stop_count(), 1);
    }
}
