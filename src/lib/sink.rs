//! Audio output.
//!
//! An [AudioSink] plays one source at a time and reports the end of every source
//! through a [Completion]. [SongbirdSink] plays into a songbird [Call](songbird::Call).

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use songbird::error::ControlError;
use songbird::input::Input;
use songbird::tracks::PlayMode;
use songbird::tracks::Track as SongbirdTrack;
use songbird::tracks::TrackHandle;
use songbird::Event;
use songbird::EventContext;
use songbird::EventHandler;
use songbird::TrackEvent;
use tokio::sync::oneshot;
use tracing::instrument;

use super::call::CallRef;
use crate::error::PlaybackError;
use crate::CadenceError;

/// How a source's playback ended.
pub type PlaybackResult = Result<(), PlaybackError>;

/// Receiving half of a [Completion].
pub type Finished = oneshot::Receiver<PlaybackResult>;

/// One-shot signal that a source stopped playing, either naturally, by being
/// stopped, or because of an error.
///
/// Only the first [Completion::finish] is delivered. Dropping it without finishing
/// also wakes the receiver (with a [RecvError](oneshot::error::RecvError)).
#[derive(Debug)]
pub struct Completion {
    #[allow(clippy::missing_docs_in_private_items)]
    tx: Mutex<Option<oneshot::Sender<PlaybackResult>>>,
}

impl Completion {
    /// Create a signal and the receiver that waits on it.
    pub fn new() -> (Self, Finished) {
        let (tx, rx) = oneshot::channel();
        let completion = Self {
            tx: Mutex::new(Some(tx)),
        };
        (completion, rx)
    }

    /// Signal the end of playback. Returns `false` if it was already signalled.
    pub fn finish(&self, result: PlaybackResult) -> bool {
        match self.tx.lock().take() {
            Some(tx) => {
                // The receiver is gone if its session was dropped, nothing to wake then.
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }
}

/// Where tracks are played.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// What this sink can play.
    type Source: Send + 'static;

    /// Start playing `source` at `volume`, replacing anything playing.
    /// `completion` must be finished once `source` stops, however it stops.
    async fn play(
        &self,
        source: Self::Source,
        volume: f32,
        completion: Completion,
    ) -> Result<(), CadenceError>;

    /// Stop the current source early. Its completion is finished as usual.
    async fn stop_current(&self) -> Result<(), CadenceError>;

    /// Change the volume of the current source.
    async fn set_volume(&self, volume: f32) -> Result<(), CadenceError>;

    /// Leave the voice channel.
    async fn disconnect(&self) -> Result<(), CadenceError>;
}

/// Plays [Input]s into a songbird call.
pub struct SongbirdSink {
    /// The call being played into.
    call: CallRef,
    /// Handle to what's playing, used for stopping and volume.
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdSink {
    /// Constructor for [SongbirdSink]
    pub fn new(call: CallRef) -> Self {
        Self {
            call,
            current: Mutex::new(None),
        }
    }
}

#[async_trait]
impl AudioSink for SongbirdSink {
    type Source = Input;

    #[instrument(skip_all, fields(volume = volume))]
    async fn play(
        &self,
        source: Input,
        volume: f32,
        completion: Completion,
    ) -> Result<(), CadenceError> {
        let track = SongbirdTrack::new(source).volume(volume);
        let handle = {
            let mut call = self.call.lock().await;
            call.play_only(track)
        };

        let completion = Arc::new(completion);
        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = TrackDone::new(&completion).register(&handle, event) {
                // The track is already gone, so no event will ever fire.
                tracing::error!("Could not watch track for {event:?}: {e}");
                completion.finish(Err(PlaybackError(e.to_string())));
            }
        }

        *self.current.lock() = Some(handle);
        Ok(())
    }

    async fn stop_current(&self) -> Result<(), CadenceError> {
        let handle = self.current.lock().take();
        match handle {
            Some(handle) => {
                tracing::debug!("Stopping current track.");
                ignore_finished(handle.stop())
            }
            None => Ok(()),
        }
    }

    async fn set_volume(&self, volume: f32) -> Result<(), CadenceError> {
        let handle = self.current.lock().clone();
        match handle {
            Some(handle) => ignore_finished(handle.set_volume(volume)),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) -> Result<(), CadenceError> {
        tracing::info!("Leaving voice channel.");
        self.current.lock().take();
        let mut call = self.call.lock().await;
        call.stop();
        call.leave().await?;
        Ok(())
    }
}

/// The handle outlives its track, controlling a track that already ended is a no-op.
fn ignore_finished(result: Result<(), ControlError>) -> Result<(), CadenceError> {
    match result {
        Err(ControlError::Finished) => {
            tracing::debug!("Track already finished, nothing to change.");
            Ok(())
        }
        other => Ok(other?),
    }
}

/// Finishes a [Completion] when the track it watches ends or errors.
struct TrackDone {
    /// Shared by every event watching the same track, first one wins.
    completion: Arc<Completion>,
}

impl TrackDone {
    /// Constructor for [TrackDone]
    fn new(completion: &Arc<Completion>) -> Self {
        Self {
            completion: completion.clone(),
        }
    }

    /// Register this as an event on `handle`.
    fn register(self, handle: &TrackHandle, event: TrackEvent) -> Result<(), CadenceError> {
        handle.add_event(Event::Track(event), self)?;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for TrackDone {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(PlaybackError(e.to_string())),
                _ => None,
            }),
            _ => None,
        };

        if let Some(e) = &error {
            tracing::error!("Something went wrong during playback: {e}");
        }

        self.completion.finish(error.map_or(Ok(()), Err));
        Some(Event::Cancel)
    }
}
