//! The playback session control loop.
//!
//! One `PlayerSession` owns the manifest, buffer, ABR controller and
//! subtitle state for a single piece of content. The host drives it with
//! [`PlayerSession::tick`], reporting the actual playhead position each
//! time; fetched media comes back in presentation order on the channel
//! returned by [`PlayerSession::chunks`].
//!
//! At most one segment fetch is in flight per session. That discipline
//! serializes buffer growth and ABR decisions, so segments can never arrive
//! out of order and a variant switch always lands on a segment boundary.
//! Variants are assumed to share the same segmentation; the buffer keeps one
//! interval and one segment cursor across switches.

#![forbid(unsafe_code)]

use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use reel_abr::{AbrController, AbrMode, SharedEstimator, Variant};
use reel_hls::{parse_master_playlist, parse_media_playlist, Cue, Manifest, SubtitleTrack};
use reel_net::{
    FetchError, HttpClient, MeteredNet, Net, NetExt, RetryNet, SegmentFetcher, TimeoutNet,
};
use tokio::sync::mpsc::{
    self,
    error::{TryRecvError, TrySendError},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    buffer::{BufferAction, BufferManager, BufferedRange},
    error::{PlayerError, PlayerResult},
    events::{EventEmitter, PlayerEvent},
    options::PlayerOptions,
    state::{PlaybackState, StateMachine},
    subtitles::{SubtitleManager, SubtitleSource},
};

/// One fetched segment, handed to the host sink in presentation order.
#[derive(Clone, Debug)]
pub struct MediaChunk {
    pub variant: usize,
    pub segment: usize,
    pub start: Duration,
    pub duration: Duration,
    pub data: Bytes,
}

/// Completion of a spawned segment fetch, delivered to the next tick.
struct SegmentOutcome {
    generation: u64,
    variant: usize,
    segment: usize,
    result: Result<Bytes, FetchError>,
}

struct OutstandingFetch {
    segment: usize,
    cancel: CancellationToken,
}

pub struct PlayerSession<N> {
    fetcher: SegmentFetcher<N>,
    options: PlayerOptions,
    manifest_url: Url,
    subtitle_sources: Vec<SubtitleSource>,

    machine: StateMachine,
    events: EventEmitter,
    estimator: SharedEstimator,
    buffer: BufferManager,
    subtitles: SubtitleManager,
    manifest: Option<Manifest>,
    abr: Option<AbrController>,

    position: Duration,
    /// Identity of the cue last reported via `CueChanged`, as the active
    /// track index and the cue's start time.
    last_cue: Option<(usize, Duration)>,
    /// Bumped on every cancellation; completions from older generations are
    /// discarded instead of applied.
    generation: u64,
    outstanding: Option<OutstandingFetch>,
    stalled_since: Option<Instant>,

    outcome_tx: mpsc::Sender<SegmentOutcome>,
    outcome_rx: mpsc::Receiver<SegmentOutcome>,
    chunk_tx: mpsc::Sender<MediaChunk>,
    chunk_rx: Option<mpsc::Receiver<MediaChunk>>,
    /// Chunks completed but not yet accepted by the host channel.
    pending_chunks: VecDeque<MediaChunk>,
}

impl PlayerSession<RetryNet<MeteredNet<TimeoutNet<HttpClient>>>> {
    /// Builds a session over the default production network stack.
    pub fn connect(
        manifest_url: Url,
        subtitle_sources: Vec<SubtitleSource>,
        options: PlayerOptions,
    ) -> Self {
        let estimator = new_estimator(&options);
        let stack =
            SegmentFetcher::with_default_stack(&options.net, Arc::new(estimator.clone()));
        Self::from_parts(stack, estimator, manifest_url, subtitle_sources, options)
    }
}

impl<N: Net + 'static> PlayerSession<MeteredNet<N>> {
    /// Builds a session over a caller-supplied transport. The session adds
    /// its own throughput metering around it.
    pub fn with_net(
        net: N,
        manifest_url: Url,
        subtitle_sources: Vec<SubtitleSource>,
        options: PlayerOptions,
    ) -> Self {
        let estimator = new_estimator(&options);
        let net = net.with_meter(Arc::new(estimator.clone()));
        Self::from_parts(
            SegmentFetcher::new(net),
            estimator,
            manifest_url,
            subtitle_sources,
            options,
        )
    }
}

fn new_estimator(options: &PlayerOptions) -> SharedEstimator {
    SharedEstimator::new(options.throughput_window_size, options.throughput_window_age)
}

impl<N: Net + 'static> PlayerSession<N> {
    fn from_parts(
        fetcher: SegmentFetcher<N>,
        estimator: SharedEstimator,
        manifest_url: Url,
        subtitle_sources: Vec<SubtitleSource>,
        options: PlayerOptions,
    ) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::channel(4);
        let (chunk_tx, chunk_rx) = mpsc::channel(options.chunk_capacity);

        Self {
            fetcher,
            machine: StateMachine::new(),
            events: EventEmitter::new(options.event_capacity),
            estimator,
            buffer: BufferManager::new(options.target_buffer),
            subtitles: SubtitleManager::default(),
            manifest: None,
            abr: None,
            manifest_url,
            subtitle_sources,
            options,
            position: Duration::ZERO,
            last_cue: None,
            generation: 0,
            outstanding: None,
            stalled_since: None,
            outcome_tx,
            outcome_rx,
            chunk_tx,
            chunk_rx: Some(chunk_rx),
            pending_chunks: VecDeque::new(),
        }
    }

    // -- transport controls ---------------------------------------------

    /// Starts or resumes playback.
    ///
    /// From `Idle` this loads the manifest, the subtitle tracks and the
    /// first media segment before entering `Playing`; load failures move
    /// the session to `Errored`. From `Ready` or `Paused` it just resumes.
    /// From `Playing` it is a no-op.
    pub async fn play(&mut self) -> PlayerResult<()> {
        match self.machine.state() {
            PlaybackState::Playing => Ok(()),
            PlaybackState::Ready | PlaybackState::Paused => {
                self.transition(PlaybackState::Playing)
            }
            PlaybackState::Idle => self.start().await,
            state => Err(PlayerError::invalid_op("play", state)),
        }
    }

    /// Pauses playback, cancelling any in-flight segment fetch.
    pub fn pause(&mut self) -> PlayerResult<()> {
        match self.machine.state() {
            PlaybackState::Paused => Ok(()),
            PlaybackState::Playing => {
                self.cancel_outstanding();
                self.transition(PlaybackState::Paused)
            }
            state => Err(PlayerError::invalid_op("pause", state)),
        }
    }

    /// Seeks to `target`, clamped to the content duration. Accepted from
    /// `Playing`, `Paused` and `Ready`; the session lands in `Ready` and
    /// playback resumes on the next `play`. A buffered interval that does
    /// not contain the target is discarded.
    pub fn seek(&mut self, target: Duration) -> PlayerResult<()> {
        let state = self.machine.state();
        if !matches!(
            state,
            PlaybackState::Playing | PlaybackState::Paused | PlaybackState::Ready
        ) {
            return Err(PlayerError::invalid_op("seek", state));
        }

        let manifest = self.require_manifest()?;
        let target = match manifest.duration {
            Some(duration) => target.min(duration),
            None => target,
        };

        self.transition(PlaybackState::Seeking)?;
        self.cancel_outstanding();
        self.pending_chunks.clear();
        self.stalled_since = None;

        let variant_index = self.active_variant_index()?;
        let variant = self
            .manifest
            .as_ref()
            .and_then(|m| m.variants.get(variant_index))
            .ok_or_else(|| PlayerError::InternalConsistency("manifest not loaded".into()))?;
        self.buffer.seek(target, variant);
        self.position = target;
        info!(target_secs = target.as_secs_f64(), "reel-player: seek");

        self.transition(PlaybackState::Ready)
    }

    /// Seeks forward by the configured skip step, staying in `Playing` if
    /// the session was playing.
    pub fn skip_forward(&mut self) -> PlayerResult<()> {
        let target = self.position.saturating_add(self.options.skip_step);
        self.skip_to(target)
    }

    /// Seeks backward by the configured skip step.
    pub fn skip_back(&mut self) -> PlayerResult<()> {
        let target = self.position.saturating_sub(self.options.skip_step);
        self.skip_to(target)
    }

    fn skip_to(&mut self, target: Duration) -> PlayerResult<()> {
        let was_playing = self.machine.state() == PlaybackState::Playing;
        self.seek(target)?;
        if was_playing {
            self.transition(PlaybackState::Playing)?;
        }
        Ok(())
    }

    /// Pins a variant (`Some`) or returns to automatic selection (`None`).
    /// The switch takes effect at the next segment boundary.
    pub fn set_quality(&mut self, variant: Option<usize>) -> PlayerResult<()> {
        let manifest = self.require_manifest()?;
        if let Some(index) = variant {
            if index >= manifest.variants.len() {
                return Err(PlayerError::UnknownVariant { index });
            }
        }
        let abr = self
            .abr
            .as_mut()
            .ok_or_else(|| PlayerError::InternalConsistency("no ABR controller".into()))?;
        abr.set_mode(match variant {
            Some(index) => AbrMode::Manual(index),
            None => AbrMode::Auto,
        });
        Ok(())
    }

    /// Selects a subtitle track by index, or `None` for off.
    pub fn select_subtitle(&mut self, track: Option<usize>) -> PlayerResult<()> {
        self.subtitles.select(track)?;
        self.events.emit(PlayerEvent::SubtitleChanged { track });
        Ok(())
    }

    // -- control loop ---------------------------------------------------

    /// One control-loop step. `position` is the host-reported playhead,
    /// treated as ground truth; `now` is the tick's wall-clock instant.
    ///
    /// Drains fetch completions, detects end of content, runs one ABR
    /// decision cycle, asks the buffer what to do and manages stall entry,
    /// recovery and escalation. Terminal states make this a no-op.
    pub fn tick(&mut self, position: Duration, now: Instant) -> PlayerResult<()> {
        let state = self.machine.state();
        if state.is_terminal() || matches!(state, PlaybackState::Idle | PlaybackState::Loading) {
            return Ok(());
        }

        self.position = position;
        self.flush_chunks();
        self.emit_cue_change();
        self.drain_completions()?;

        if self.check_ended()? {
            return Ok(());
        }

        let buffered_ahead = self.buffer.buffered_ahead(self.position);
        self.run_abr_cycle(buffered_ahead, now)?;

        let variant_index = self.active_variant_index()?;
        let action = {
            let manifest = self.require_manifest()?;
            let variant = &manifest.variants[variant_index];
            self.buffer
                .advance(self.position, variant, self.outstanding.is_some())
        };

        match action {
            BufferAction::FetchNext(segment) => {
                if matches!(
                    self.machine.state(),
                    PlaybackState::Playing | PlaybackState::Stalled | PlaybackState::Ready
                ) {
                    self.spawn_fetch(variant_index, segment)?;
                }
            }
            BufferAction::Stalled => {
                if self.machine.state() == PlaybackState::Playing {
                    self.transition(PlaybackState::Stalled)?;
                    self.stalled_since = Some(now);
                    self.events.emit(PlayerEvent::Stalled);
                }
            }
            BufferAction::Idle => {}
        }

        self.manage_stall(buffered_ahead, now)?;

        self.events.emit(PlayerEvent::Progress {
            position: self.position,
            buffered_ahead: self.buffer.buffered_ahead(self.position),
        });
        Ok(())
    }

    // -- observation ----------------------------------------------------

    pub fn state(&self) -> PlaybackState {
        self.machine.state()
    }

    pub fn position(&self) -> Duration {
        self.position
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    pub fn buffered_range(&self) -> Option<BufferedRange> {
        self.buffer.buffered_range()
    }

    pub fn active_variant(&self) -> Option<usize> {
        self.abr.as_ref().map(|abr| abr.current())
    }

    pub fn subtitle_tracks(&self) -> &[SubtitleTrack] {
        self.subtitles.tracks()
    }

    pub fn active_subtitle(&self) -> Option<usize> {
        self.subtitles.active_track()
    }

    /// The active subtitle cue at the current position, if any.
    pub fn active_cue(&self) -> Option<&Cue> {
        self.subtitles.active_cue(self.position)
    }

    pub fn events(&self) -> tokio::sync::broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    /// Takes the media chunk receiver. Yields `None` after the first call.
    pub fn chunks(&mut self) -> Option<mpsc::Receiver<MediaChunk>> {
        self.chunk_rx.take()
    }

    // -- internals ------------------------------------------------------

    async fn start(&mut self) -> PlayerResult<()> {
        self.transition(PlaybackState::Loading)?;

        match self.load().await {
            Ok(()) => {}
            Err(err) => return Err(self.fail(err)),
        }

        self.transition(PlaybackState::Ready)?;

        // First segment is fetched inline so `Playing` always has media.
        let variant_index = self.active_variant_index()?;
        match self.fetch_first_segment(variant_index).await {
            Ok(()) => {}
            Err(err) => return Err(self.fail(err)),
        }

        self.transition(PlaybackState::Playing)
    }

    async fn load(&mut self) -> PlayerResult<()> {
        let master_text = self.fetcher.fetch_text(&self.manifest_url).await?;
        let master = parse_master_playlist(&master_text, &self.manifest_url)?;

        let mut media = Vec::with_capacity(master.variants.len());
        for variant in &master.variants {
            let text = self.fetcher.fetch_text(&variant.url).await?;
            media.push(parse_media_playlist(&text, &variant.url)?);
        }

        let manifest = Manifest::assemble(self.manifest_url.clone(), master, media)?;
        info!(
            variants = manifest.variants.len(),
            duration_secs = manifest.duration.map(|d| d.as_secs_f64()),
            "reel-player: manifest loaded"
        );

        self.abr = Some(AbrController::new(
            self.options.abr_options(),
            manifest.lowest_variant(),
        ));
        self.subtitles = SubtitleManager::load(&self.fetcher, &self.subtitle_sources).await;
        // Manifest and subtitle transfers are small and not representative
        // of segment throughput; start ABR from a clean window.
        self.estimator.clear();
        self.manifest = Some(manifest);
        Ok(())
    }

    async fn fetch_first_segment(&mut self, variant_index: usize) -> PlayerResult<()> {
        let (url, range, segment_index) = {
            let manifest = self.require_manifest()?;
            let segment = &manifest.variants[variant_index].segments[0];
            (segment.url.clone(), segment.byte_range, segment.index)
        };

        let data = self.fetcher.fetch(&url, range).await?;
        self.complete_segment(variant_index, segment_index, data)
    }

    fn drain_completions(&mut self) -> PlayerResult<()> {
        loop {
            match self.outcome_rx.try_recv() {
                Ok(outcome) => self.handle_outcome(outcome)?,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }
    }

    fn handle_outcome(&mut self, outcome: SegmentOutcome) -> PlayerResult<()> {
        if outcome.generation != self.generation {
            debug!(
                segment = outcome.segment,
                "reel-player: discarding completion from cancelled fetch"
            );
            return Ok(());
        }
        self.outstanding = None;

        match outcome.result {
            Ok(data) => self.complete_segment(outcome.variant, outcome.segment, data),
            // Retries are exhausted inside the fetch layer; whatever
            // arrives here is unrecoverable.
            Err(err) => Err(self.fail(err.into())),
        }
    }

    fn complete_segment(
        &mut self,
        variant_index: usize,
        segment_index: usize,
        data: Bytes,
    ) -> PlayerResult<()> {
        let (chunk, completion) = {
            let manifest = self.manifest.as_ref().ok_or_else(|| {
                PlayerError::InternalConsistency("segment completed without manifest".into())
            })?;
            let segment = &manifest.variants[variant_index].segments[segment_index];
            let chunk = MediaChunk {
                variant: variant_index,
                segment: segment_index,
                start: segment.start,
                duration: segment.duration,
                data,
            };
            (chunk, self.buffer.on_segment_complete(segment))
        };
        if let Err(err) = completion {
            return Err(self.fail(err));
        }

        self.events.emit(PlayerEvent::SegmentBuffered {
            variant: variant_index,
            segment: segment_index,
            buffered_to: self
                .buffer
                .buffered_range()
                .map(|r| r.end)
                .unwrap_or_default(),
        });
        self.pending_chunks.push_back(chunk);
        self.flush_chunks();
        Ok(())
    }

    fn check_ended(&mut self) -> PlayerResult<bool> {
        let Some(duration) = self.manifest.as_ref().and_then(|m| m.duration) else {
            return Ok(false);
        };
        if self.position < duration {
            return Ok(false);
        }

        self.cancel_outstanding();
        self.transition(PlaybackState::Ended)?;
        info!("reel-player: playback ended");
        Ok(true)
    }

    fn run_abr_cycle(&mut self, buffered_ahead: Duration, now: Instant) -> PlayerResult<()> {
        let variants: Vec<Variant> = self
            .require_manifest()?
            .variants
            .iter()
            .enumerate()
            .map(|(index, v)| Variant {
                index,
                bandwidth_bps: v.bandwidth_bps,
            })
            .collect();
        let estimate = self.estimator.estimate_bps(now);

        let abr = self
            .abr
            .as_mut()
            .ok_or_else(|| PlayerError::InternalConsistency("no ABR controller".into()))?;
        let decision = abr.decide(&variants, buffered_ahead, estimate);

        // Variant switches land on segment boundaries only. With at most
        // one fetch in flight, "nothing outstanding" is exactly a boundary.
        if decision.changed && self.outstanding.is_none() {
            let from = abr.current();
            abr.apply(&decision);
            self.events.emit(PlayerEvent::VariantChanged {
                from,
                to: decision.target,
                reason: decision.reason,
            });
        }
        Ok(())
    }

    fn manage_stall(&mut self, buffered_ahead: Duration, now: Instant) -> PlayerResult<()> {
        if self.machine.state() != PlaybackState::Stalled {
            return Ok(());
        }

        if buffered_ahead > self.options.low_water {
            self.stalled_since = None;
            self.transition(PlaybackState::Playing)?;
            self.events.emit(PlayerEvent::Recovered);
            return Ok(());
        }

        if let Some(since) = self.stalled_since {
            let stalled_for = now.saturating_duration_since(since);
            if stalled_for >= self.options.max_stall {
                warn!(
                    stalled_secs = stalled_for.as_secs_f64(),
                    "reel-player: stall exceeded limit"
                );
                return Err(self.fail(PlayerError::StallTimeout {
                    max: self.options.max_stall,
                }));
            }
        }
        Ok(())
    }

    fn spawn_fetch(&mut self, variant_index: usize, segment_index: usize) -> PlayerResult<()> {
        let (url, range) = {
            let manifest = self.require_manifest()?;
            let segment = &manifest.variants[variant_index].segments[segment_index];
            (segment.url.clone(), segment.byte_range)
        };

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let fetcher = self.fetcher.clone();
        let outcome_tx = self.outcome_tx.clone();
        let generation = self.generation;

        self.outstanding = Some(OutstandingFetch {
            segment: segment_index,
            cancel,
        });
        debug!(
            variant = variant_index,
            segment = segment_index,
            "reel-player: fetching segment"
        );

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = fetcher.fetch(&url, range) => {
                    let _ = outcome_tx
                        .send(SegmentOutcome {
                            generation,
                            variant: variant_index,
                            segment: segment_index,
                            result,
                        })
                        .await;
                }
            }
        });
        Ok(())
    }

    fn cancel_outstanding(&mut self) {
        if let Some(fetch) = self.outstanding.take() {
            debug!(
                segment = fetch.segment,
                "reel-player: cancelling in-flight fetch"
            );
            fetch.cancel.cancel();
            self.generation += 1;
        }
    }

    /// Hands buffered chunks to the host channel without blocking the tick.
    /// A full channel leaves the remainder queued for the next tick; a
    /// closed channel (host hung up) drops them.
    fn flush_chunks(&mut self) {
        while let Some(chunk) = self.pending_chunks.pop_front() {
            match self.chunk_tx.try_send(chunk) {
                Ok(()) => {}
                Err(TrySendError::Full(chunk)) => {
                    self.pending_chunks.push_front(chunk);
                    return;
                }
                Err(TrySendError::Closed(_)) => {
                    self.pending_chunks.clear();
                    return;
                }
            }
        }
    }

    /// Emits `CueChanged` when the active subtitle cue at the current
    /// position differs from the last one reported, including the change to
    /// no cue at all.
    fn emit_cue_change(&mut self) {
        let active = self.subtitles.active_cue(self.position);
        let key = self
            .subtitles
            .active_track()
            .zip(active.map(|c| c.start));
        if key == self.last_cue {
            return;
        }
        let cue = active.cloned();
        self.last_cue = key;
        self.events.emit(PlayerEvent::CueChanged { cue });
    }

    fn transition(&mut self, to: PlaybackState) -> PlayerResult<()> {
        let from = self.machine.transition(to)?;
        self.events.emit(PlayerEvent::StateChanged { from, to });
        Ok(())
    }

    /// Moves the session to `Errored` and returns the originating error for
    /// the caller. Terminal already-errored sessions are left as they are.
    fn fail(&mut self, err: PlayerError) -> PlayerError {
        warn!(%err, "reel-player: session failed");
        self.cancel_outstanding();
        let from = self.machine.state();
        if self.machine.transition(PlaybackState::Errored).is_ok() {
            self.events.emit(PlayerEvent::StateChanged {
                from,
                to: PlaybackState::Errored,
            });
        }
        self.events.emit(PlayerEvent::SessionError {
            message: err.to_string(),
        });
        err
    }

    fn require_manifest(&self) -> PlayerResult<&Manifest> {
        self.manifest
            .as_ref()
            .ok_or_else(|| PlayerError::InternalConsistency("manifest not loaded".into()))
    }

    fn active_variant_index(&self) -> PlayerResult<usize> {
        self.abr
            .as_ref()
            .map(|abr| abr.current())
            .ok_or_else(|| PlayerError::InternalConsistency("no ABR controller".into()))
    }
}
