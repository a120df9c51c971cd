//! Per-guild voice sessions.
//!
//! A [VoiceContext] owns the guild's [TrackQueue] and a background loop that plays
//! the queue one track at a time:
//!
//! 1. Wait for the next track, giving up after the idle timeout.
//! 2. Hand it to the [AudioSink] with the session's volume.
//! 3. Report a [PlayEvent], then announce the track.
//! 4. Wait until the sink says the track is done, then repeat.
//!
//! Timing out in step 1 or calling [VoiceContext::stop] ends the session for good.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument;
use tracing::Instrument;

use super::announce::Announcer;
use super::play_event::EventReporter;
use super::play_event::PlayEvent;
use super::sink::AudioSink;
use super::sink::Completion;
use super::track::Track;
use super::track::TrackMetadata;
use super::track_queue::TrackQueue;
use crate::serenity;
use crate::CadenceError;

/// Where a session's playback loop is at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Waiting for something to be queued.
    Idle,
    /// Handing the current track to the sink.
    Playing,
    /// Sending the play event.
    Reporting,
    /// Sending the "now playing" message.
    Announcing,
    /// Waiting for the current track to finish.
    WaitingForNext,
    /// The session is over.
    ShuttingDown,
}

/// Knobs for a [VoiceContext].
#[derive(Debug, Clone, Copy)]
pub struct VoiceSettings {
    /// How long to wait for a new track before leaving.
    pub idle_timeout: Duration,
    /// Volume that new sessions start with.
    pub default_volume: f32,
    /// How long the loop waits on a play event report before moving on.
    pub report_timeout: Duration,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(15 * 60),
            default_volume: 0.5,
            report_timeout: Duration::from_secs(10),
        }
    }
}

/// Collaborators a [VoiceContext] talks to.
pub struct Outputs<S> {
    /// Plays audio, doubles as the voice connection.
    pub sink: Arc<S>,
    /// Sends "now playing" messages.
    pub announcer: Arc<dyn Announcer>,
    /// Records play events. `None` turns reporting off.
    pub reporter: Option<Arc<dyn EventReporter>>,
}

/// A voice session in one guild.
///
/// Dropping it cancels the playback loop, call [VoiceContext::stop] first to also
/// leave the voice channel.
pub struct VoiceContext<S: AudioSink> {
    /// State shared with the playback loop.
    session: Arc<Session<S>>,
    /// The playback loop.
    player: JoinHandle<()>,
}

/// Everything the playback loop and the outside both touch.
struct Session<S: AudioSink> {
    /// The guild this session plays in.
    guild_id: serenity::GuildId,
    /// Tracks waiting to be played.
    tracks: TrackQueue<Track<S::Source>>,
    /// Cleared once the session starts shutting down. Held while pushing so
    /// nothing is queued after the final clear.
    open: Mutex<bool>,
    /// Metadata of the track being played.
    current: Mutex<Option<TrackMetadata>>,
    /// Volume applied to each track before it's played.
    volume: Mutex<f32>,
    /// The connection. Taken on shutdown so it's only released once.
    sink: Mutex<Option<Arc<S>>>,
    #[allow(clippy::missing_docs_in_private_items)]
    announcer: Arc<dyn Announcer>,
    #[allow(clippy::missing_docs_in_private_items)]
    reporter: Option<Arc<dyn EventReporter>>,
    #[allow(clippy::missing_docs_in_private_items)]
    state: watch::Sender<PlaybackState>,
    /// See [VoiceSettings::idle_timeout].
    idle_timeout: Duration,
    /// See [VoiceSettings::report_timeout].
    report_timeout: Duration,
}

impl<S: AudioSink + 'static> VoiceContext<S> {
    /// Highest accepted volume, 1.0 is unchanged.
    pub const MAX_VOLUME: f32 = 2.0;

    /// Start a session. The playback loop starts right away.
    pub fn new(guild_id: serenity::GuildId, outputs: Outputs<S>, settings: VoiceSettings) -> Self {
        let (state, _) = watch::channel(PlaybackState::Idle);
        let session = Arc::new(Session {
            guild_id,
            tracks: TrackQueue::default(),
            open: Mutex::new(true),
            current: Mutex::new(None),
            volume: Mutex::new(settings.default_volume.clamp(0.0, Self::MAX_VOLUME)),
            sink: Mutex::new(Some(outputs.sink)),
            announcer: outputs.announcer,
            reporter: outputs.reporter,
            state,
            idle_timeout: settings.idle_timeout,
            report_timeout: settings.report_timeout,
        });

        let span = tracing::info_span!("playback", guild = %guild_id);
        let player = tokio::spawn(session.clone().play_audio().instrument(span));

        Self { session, player }
    }

    /// Add a track to the back of the queue.
    pub fn enqueue(&self, track: Track<S::Source>) -> Result<(), CadenceError> {
        let open = self.session.open.lock();
        if !*open || self.player.is_finished() {
            return Err(CadenceError::SessionClosed);
        }
        tracing::debug!("Queueing {}", track.meta.title_or_default());
        self.session.tracks.push(track);
        Ok(())
    }

    /// Stop the current track, the loop moves on to the next one.
    /// Returns the skipped track, `None` if nothing was playing.
    #[instrument(skip(self), fields(guild = %self.session.guild_id))]
    pub async fn skip(&self) -> Result<Option<TrackMetadata>, CadenceError> {
        let Some(current) = self.current() else {
            return Ok(None);
        };
        let Some(sink) = self.session.connection() else {
            return Ok(None);
        };

        tracing::info!("Skipping {}", current.title_or_default());
        sink.stop_current().await?;
        Ok(Some(current))
    }

    /// End the session: drop pending tracks, leave the voice channel and stop the loop.
    #[instrument(skip(self), fields(guild = %self.session.guild_id))]
    pub async fn stop(&self) {
        self.session.shut_down().await;
        self.player.abort();
    }

    /// Change the volume, clamped to `0.0..=MAX_VOLUME`.
    /// Applies to the current track and all following ones.
    pub async fn set_volume(&self, volume: f32) -> Result<f32, CadenceError> {
        let volume = volume.clamp(0.0, Self::MAX_VOLUME);
        *self.session.volume.lock() = volume;

        if let Some(sink) = self.session.connection() {
            sink.set_volume(volume).await?;
        }
        Ok(volume)
    }

    /// The volume the next track will play at.
    pub fn volume(&self) -> f32 {
        *self.session.volume.lock()
    }

    /// The track being played.
    pub fn current(&self) -> Option<TrackMetadata> {
        self.session.current.lock().clone()
    }

    /// Metadata of tracks waiting to be played, front first.
    pub fn pending(&self) -> Vec<TrackMetadata> {
        self.session.tracks.map_pending(|track| track.meta.clone())
    }

    /// What the playback loop is doing right now.
    pub fn state(&self) -> PlaybackState {
        *self.session.state.borrow()
    }

    /// Watch the playback loop's state.
    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.session.state.subscribe()
    }

    /// Whether this session is over and needs replacing.
    pub fn is_closed(&self) -> bool {
        !*self.session.open.lock() || self.player.is_finished()
    }
}

impl<S: AudioSink> Drop for VoiceContext<S> {
    fn drop(&mut self) {
        self.player.abort();
    }
}

impl<S: AudioSink + 'static> Session<S> {
    /// The playback loop, runs until the idle timeout or an unrecoverable error.
    async fn play_audio(self: Arc<Self>) {
        tracing::info!("Initializing audio loop");
        loop {
            self.set_state(PlaybackState::Idle);

            let Some(track) = self.tracks.pop_timeout(self.idle_timeout).await else {
                if !self.close_if_idle() {
                    // Something was queued right as the wait ran out.
                    continue;
                }
                tracing::info!(
                    "Nothing queued for {}s, exiting.",
                    self.idle_timeout.as_secs()
                );
                self.shut_down().await;
                return;
            };

            if let Err(e) = self.play_track(track).await {
                tracing::error!("Playback failed, ending session: {e}");
                self.shut_down().await;
                return;
            }
        }
    }

    /// One pass of the loop, from handing `track` off to it finishing.
    async fn play_track(&self, track: Track<S::Source>) -> Result<(), CadenceError> {
        let Track { meta, source } = track;
        tracing::info!("Pulled in new track! {}", meta.title_or_default());

        *self.current.lock() = Some(meta.clone());
        self.set_state(PlaybackState::Playing);

        let sink = self.connection().ok_or(CadenceError::SessionClosed)?;
        let volume = *self.volume.lock();
        let (completion, finished) = Completion::new();
        sink.play(source, volume, completion).await?;

        self.set_state(PlaybackState::Reporting);
        self.report(&meta).await;

        self.set_state(PlaybackState::Announcing);
        if let Err(e) = self.announcer.now_playing(&meta).await {
            tracing::error!("Could not announce {}: {e}", meta.title_or_default());
        }

        self.set_state(PlaybackState::WaitingForNext);
        match finished.await {
            Ok(Ok(())) => tracing::debug!("Finished {}", meta.title_or_default()),
            Ok(Err(e)) => tracing::error!("Something went wrong in play next: {e}"),
            Err(_) => tracing::warn!("Sink dropped {} without finishing it", meta.id),
        }

        *self.current.lock() = None;
        Ok(())
    }

    /// Post a play event for `track`. Failures are logged and otherwise ignored.
    async fn report(&self, track: &TrackMetadata) {
        let Some(reporter) = self.reporter.clone() else {
            tracing::debug!("No track events endpoint, skipping report.");
            return;
        };

        let event = PlayEvent::play(track, self.guild_id);
        let id = event.id.clone();

        // Run apart from the loop so a slow endpoint only holds up this session.
        let mut post = tokio::spawn(async move { reporter.report(&event).await }.in_current_span());

        match tokio::time::timeout(self.report_timeout, &mut post).await {
            Ok(Ok(Ok(()))) => tracing::info!("Successful track event post for track ID {id}"),
            Ok(Ok(Err(e))) => tracing::error!("Error posting track event for track ID {id}: {e}"),
            Ok(Err(e)) => tracing::error!("Track event post for track ID {id} did not finish: {e}"),
            Err(_) => {
                post.abort();
                tracing::error!(
                    "Track event post for track ID {id} timed out after {}s",
                    self.report_timeout.as_secs()
                );
            }
        }
    }

    /// The live connection, `None` after shutdown.
    fn connection(&self) -> Option<Arc<S>> {
        self.sink.lock().clone()
    }

    /// Stop accepting tracks, but only if none are pending.
    /// Returns whether the session closed.
    fn close_if_idle(&self) -> bool {
        let mut open = self.open.lock();
        if !self.tracks.is_empty() {
            return false;
        }
        *open = false;
        self.set_state(PlaybackState::ShuttingDown);
        true
    }

    /// Enter [PlaybackState::ShuttingDown], clear the queue and disconnect once.
    async fn shut_down(&self) {
        {
            let mut open = self.open.lock();
            *open = false;
            self.set_state(PlaybackState::ShuttingDown);
            self.tracks.clear();
        }

        let sink = self.sink.lock().take();
        if let Some(sink) = sink {
            if let Err(e) = sink.disconnect().await {
                tracing::error!("Error leaving voice channel: {e}");
            }
        }
    }

    /// Publish a new state, [PlaybackState::ShuttingDown] is never left.
    fn set_state(&self, new: PlaybackState) {
        self.state.send_if_modified(|state| {
            if *state == PlaybackState::ShuttingDown || *state == new {
                false
            } else {
                *state = new;
                true
            }
        });
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::error::PlaybackError;
    use crate::error::ReportError;
    use crate::lib::track::test::meta;

    /// Records what it's asked to do. Tracks only finish when a test says so.
    #[derive(Default)]
    struct FakeSink {
        played: Mutex<Vec<(&'static str, f32)>>,
        volume_changes: Mutex<Vec<f32>>,
        playing: Mutex<Option<Completion>>,
        stops: AtomicUsize,
        disconnects: AtomicUsize,
    }

    impl FakeSink {
        /// Finish whatever is playing, as if the track ended.
        fn finish(&self, result: Result<(), PlaybackError>) {
            let completion = self.playing.lock().take().expect("something playing");
            assert!(completion.finish(result));
        }

        fn played(&self) -> Vec<&'static str> {
            self.played.lock().iter().map(|(name, _)| *name).collect()
        }
    }

    #[async_trait]
    impl AudioSink for FakeSink {
        type Source = &'static str;

        async fn play(
            &self,
            source: &'static str,
            volume: f32,
            completion: Completion,
        ) -> Result<(), CadenceError> {
            self.played.lock().push((source, volume));
            *self.playing.lock() = Some(completion);
            Ok(())
        }

        async fn stop_current(&self) -> Result<(), CadenceError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if let Some(completion) = self.playing.lock().take() {
                completion.finish(Ok(()));
            }
            Ok(())
        }

        async fn set_volume(&self, volume: f32) -> Result<(), CadenceError> {
            self.volume_changes.lock().push(volume);
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), CadenceError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Forwards announced track ids to the test.
    struct FakeAnnouncer(mpsc::UnboundedSender<String>);

    #[async_trait]
    impl Announcer for FakeAnnouncer {
        async fn now_playing(&self, track: &TrackMetadata) -> Result<(), CadenceError> {
            self.0.send(track.id.clone()).expect("test receiver alive");
            Ok(())
        }
    }

    /// Records reported ids, fails every post if `fail` is set and never
    /// answers if `hang` is set.
    #[derive(Default)]
    struct FakeReporter {
        reported: Mutex<Vec<String>>,
        fail: bool,
        hang: bool,
    }

    #[async_trait]
    impl EventReporter for FakeReporter {
        async fn report(&self, event: &PlayEvent) -> Result<(), ReportError> {
            self.reported.lock().push(event.id.clone());
            if self.hang {
                std::future::pending::<()>().await;
            }
            if self.fail {
                Err(ReportError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR))
            } else {
                Ok(())
            }
        }
    }

    struct Harness {
        voice: VoiceContext<FakeSink>,
        sink: Arc<FakeSink>,
        reporter: Arc<FakeReporter>,
        announced: mpsc::UnboundedReceiver<String>,
    }

    impl Harness {
        fn new(reporter: FakeReporter) -> Self {
            let sink = Arc::new(FakeSink::default());
            let reporter = Arc::new(reporter);
            let (tx, announced) = mpsc::unbounded_channel();

            let outputs = Outputs {
                sink: sink.clone(),
                announcer: Arc::new(FakeAnnouncer(tx)),
                reporter: Some(reporter.clone() as Arc<dyn EventReporter>),
            };
            let voice = VoiceContext::new(
                serenity::GuildId::new(1),
                outputs,
                VoiceSettings::default(),
            );

            Self {
                voice,
                sink,
                reporter,
                announced,
            }
        }

        fn enqueue(&self, name: &'static str) {
            self.voice.enqueue(Track::new(meta(name), name)).unwrap();
        }

        /// Wait for the next announcement and for the loop to start waiting on it.
        async fn next_announced(&mut self) -> String {
            let id = self.announced.recv().await.expect("loop alive");
            self.wait_for(PlaybackState::WaitingForNext).await;
            id
        }

        async fn wait_for(&self, state: PlaybackState) {
            let mut rx = self.voice.subscribe();
            rx.wait_for(|s| *s == state).await.expect("loop alive");
        }
    }

    #[tokio::test]
    async fn plays_in_queue_order() {
        let mut h = Harness::new(FakeReporter::default());
        h.enqueue("A");
        h.enqueue("B");

        assert_eq!(h.next_announced().await, "a");
        assert_eq!(h.voice.current().unwrap().id, "a");
        assert_eq!(h.voice.pending().len(), 1);

        h.sink.finish(Ok(()));
        assert_eq!(h.next_announced().await, "b");
        assert_eq!(h.voice.current().unwrap().id, "b");

        h.sink.finish(Ok(()));
        h.wait_for(PlaybackState::Idle).await;
        assert!(h.voice.current().is_none());
        assert_eq!(h.sink.played(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn error_completion_still_moves_on() {
        let mut h = Harness::new(FakeReporter::default());
        h.enqueue("A");
        h.enqueue("B");

        assert_eq!(h.next_announced().await, "a");
        h.sink.finish(Err(PlaybackError("stream closed".to_string())));

        assert_eq!(h.next_announced().await, "b");
        assert_eq!(h.voice.current().unwrap().id, "b");
    }

    #[tokio::test]
    async fn dropped_completion_still_moves_on() {
        let mut h = Harness::new(FakeReporter::default());
        h.enqueue("A");
        h.enqueue("B");

        assert_eq!(h.next_announced().await, "a");
        drop(h.sink.playing.lock().take());

        assert_eq!(h.next_announced().await, "b");
    }

    #[tokio::test]
    async fn failed_report_still_announces() {
        let mut h = Harness::new(FakeReporter {
            fail: true,
            ..Default::default()
        });
        h.enqueue("A");

        assert_eq!(h.next_announced().await, "a");
        assert_eq!(*h.reporter.reported.lock(), vec!["a".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_report_times_out() {
        let mut h = Harness::new(FakeReporter {
            hang: true,
            ..Default::default()
        });
        let start = tokio::time::Instant::now();
        h.enqueue("A");
        h.enqueue("B");

        assert_eq!(h.next_announced().await, "a");
        assert!(start.elapsed() <= VoiceSettings::default().report_timeout);

        h.sink.finish(Ok(()));
        assert_eq!(h.next_announced().await, "b");
        assert_eq!(*h.reporter.reported.lock(), vec!["a", "b"]);
        assert_eq!(h.sink.played(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn volume_is_applied_before_handoff() {
        let mut h = Harness::new(FakeReporter::default());
        assert_eq!(h.voice.volume(), 0.5);
        assert_eq!(h.voice.set_volume(5.0).await.unwrap(), 2.0);
        h.voice.set_volume(0.8).await.unwrap();
        h.enqueue("A");

        h.next_announced().await;
        assert_eq!(*h.sink.played.lock(), vec![("A", 0.8)]);
    }

    #[tokio::test]
    async fn volume_changes_between_tracks() {
        let mut h = Harness::new(FakeReporter::default());
        h.enqueue("A");
        assert_eq!(h.next_announced().await, "a");
        h.sink.finish(Ok(()));
        h.wait_for(PlaybackState::Idle).await;

        assert_eq!(h.voice.set_volume(1.2).await.unwrap(), 1.2);
        assert_eq!(*h.sink.volume_changes.lock(), vec![1.2]);

        h.enqueue("B");
        assert_eq!(h.next_announced().await, "b");
        assert_eq!(h.sink.played.lock().last(), Some(&("B", 1.2)));
    }

    #[tokio::test]
    async fn skip_without_current_track_does_nothing() {
        let h = Harness::new(FakeReporter::default());
        assert!(h.voice.skip().await.unwrap().is_none());
        assert_eq!(h.sink.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stop_clears_pending_but_not_current() {
        let mut h = Harness::new(FakeReporter::default());
        h.enqueue("A");
        h.enqueue("B");
        h.enqueue("C");

        assert_eq!(h.next_announced().await, "a");
        h.voice.stop().await;

        assert_eq!(h.voice.state(), PlaybackState::ShuttingDown);
        assert!(h.voice.is_closed());
        assert!(h.voice.pending().is_empty());
        assert_eq!(h.voice.current().unwrap().id, "a");
        assert_eq!(h.sink.disconnects.load(Ordering::SeqCst), 1);

        // Stopping twice releases the connection only once.
        h.voice.stop().await;
        assert_eq!(h.sink.disconnects.load(Ordering::SeqCst), 1);
        assert!(matches!(
            h.voice.enqueue(Track::new(meta("D"), "D")),
            Err(CadenceError::SessionClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_shuts_down() {
        let h = Harness::new(FakeReporter::default());

        h.wait_for(PlaybackState::ShuttingDown).await;
        // Let the loop finish disconnecting.
        while !h.voice.player.is_finished() {
            tokio::task::yield_now().await;
        }

        assert_eq!(h.sink.disconnects.load(Ordering::SeqCst), 1);
        assert!(h.voice.is_closed());

        h.voice.stop().await;
        assert_eq!(h.sink.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn skipping_last_track_goes_idle() {
        let mut h = Harness::new(FakeReporter::default());
        h.enqueue("A");
        assert_eq!(h.next_announced().await, "a");

        assert_eq!(h.voice.skip().await.unwrap().unwrap().id, "a");
        h.wait_for(PlaybackState::Idle).await;
        assert!(h.voice.current().is_none());
        assert_eq!(h.voice.state(), PlaybackState::Idle);
        assert_eq!(h.sink.disconnects.load(Ordering::SeqCst), 0);

        h.wait_for(PlaybackState::ShuttingDown).await;
        while !h.voice.player.is_finished() {
            tokio::task::yield_now().await;
        }
        assert_eq!(h.sink.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn idle_close_keeps_late_tracks() {
        let mut h = Harness::new(FakeReporter::default());
        h.enqueue("A");
        assert_eq!(h.next_announced().await, "a");

        // A track queued as the idle wait runs out keeps the session open.
        h.enqueue("B");
        assert!(!h.voice.session.close_if_idle());
        assert!(!h.voice.is_closed());
        assert_eq!(h.voice.pending().len(), 1);

        h.sink.finish(Ok(()));
        assert_eq!(h.next_announced().await, "b");

        // With nothing pending it closes, and later tracks are refused.
        assert!(h.voice.session.close_if_idle());
        assert!(h.voice.is_closed());
        assert!(matches!(
            h.voice.enqueue(Track::new(meta("C"), "C")),
            Err(CadenceError::SessionClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_only_counts_waiting() {
        let mut h = Harness::new(FakeReporter::default());
        h.enqueue("A");
        assert_eq!(h.next_announced().await, "a");

        // A track longer than the idle timeout keeps the session alive.
        tokio::time::sleep(Duration::from_secs(60 * 60)).await;
        assert_eq!(h.voice.state(), PlaybackState::WaitingForNext);

        h.sink.finish(Ok(()));
        h.enqueue("B");
        assert_eq!(h.next_announced().await, "b");
        assert_eq!(h.sink.disconnects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn finish_then_skip_scenario() {
        let mut h = Harness::new(FakeReporter::default());
        h.enqueue("A");
        h.enqueue("B");
        h.enqueue("C");

        assert_eq!(h.next_announced().await, "a");
        h.sink.finish(Ok(()));

        assert_eq!(h.next_announced().await, "b");
        assert_eq!(h.voice.current().unwrap().id, "b");
        assert_eq!(*h.reporter.reported.lock(), vec!["a", "b"]);

        let skipped = h.voice.skip().await.unwrap().unwrap();
        assert_eq!(skipped.id, "b");
        assert_eq!(h.sink.stops.load(Ordering::SeqCst), 1);

        assert_eq!(h.next_announced().await, "c");
        assert_eq!(h.voice.current().unwrap().id, "c");
        assert_eq!(h.sink.played(), vec!["A", "B", "C"]);
    }
}
