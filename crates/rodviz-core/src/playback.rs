//! Playback controls over the growing frame cache.

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::cache::PlaybackCache;
use crate::mesh::FrameMeshBundle;

/// Playback speed multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackSpeed {
    /// 0.25x speed
    QuarterSpeed,
    /// 0.5x speed
    HalfSpeed,
    /// Normal speed (1x)
    #[default]
    Normal,
    /// 2x speed
    Double,
    /// 4x speed
    Quadruple,
    /// 10x speed
    TenX,
}

impl PlaybackSpeed {
    const ALL: [PlaybackSpeed; 6] = [
        PlaybackSpeed::QuarterSpeed,
        PlaybackSpeed::HalfSpeed,
        PlaybackSpeed::Normal,
        PlaybackSpeed::Double,
        PlaybackSpeed::Quadruple,
        PlaybackSpeed::TenX,
    ];

    /// Get the speed multiplier.
    pub fn multiplier(&self) -> f64 {
        match self {
            PlaybackSpeed::QuarterSpeed => 0.25,
            PlaybackSpeed::HalfSpeed => 0.5,
            PlaybackSpeed::Normal => 1.0,
            PlaybackSpeed::Double => 2.0,
            PlaybackSpeed::Quadruple => 4.0,
            PlaybackSpeed::TenX => 10.0,
        }
    }

    /// Tick interval at this speed.
    pub fn scale(&self, base: Duration) -> Duration {
        base.div_f64(self.multiplier())
    }

    /// Next faster speed, saturating at the fastest.
    pub fn faster(self) -> Self {
        let i = self.position();
        Self::ALL[(i + 1).min(Self::ALL.len() - 1)]
    }

    /// Next slower speed, saturating at the slowest.
    pub fn slower(self) -> Self {
        Self::ALL[self.position().saturating_sub(1)]
    }

    fn position(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(2)
    }
}

impl fmt::Display for PlaybackSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.multiplier())
    }
}

/// Current state of playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Cursor is held; no ticks are scheduled
    #[default]
    Paused,
    /// Cursor advances on every tick
    Playing,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Paused => f.write_str("paused"),
            PlaybackState::Playing => f.write_str("playing"),
        }
    }
}

/// Moves a cursor through the frames of a [`PlaybackCache`].
///
/// The cursor never points past the cache's high watermark. Every method that
/// moves the cursor returns the bundle to render, if any.
pub struct PlaybackController {
    cache: Arc<PlaybackCache>,
    cursor: usize,
    state: PlaybackState,
    speed: PlaybackSpeed,
    interval: Duration,
    next_tick: Option<Instant>,
}

impl PlaybackController {
    /// Default tick interval at normal speed.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(40);

    /// Create a paused controller at frame 0.
    pub fn new(cache: Arc<PlaybackCache>, interval: Duration) -> Self {
        Self {
            cache,
            cursor: 0,
            state: PlaybackState::Paused,
            speed: PlaybackSpeed::Normal,
            interval,
            next_tick: None,
        }
    }

    pub fn cache(&self) -> &Arc<PlaybackCache> {
        &self.cache
    }

    /// Get the current frame number.
    pub fn current_frame(&self) -> usize {
        self.cursor
    }

    /// Bundle under the cursor, if it has been built.
    pub fn current(&self) -> Option<Arc<FrameMeshBundle>> {
        self.cache.get(self.cursor).ok()
    }

    /// Get the current playback state.
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Get the current playback speed.
    pub fn speed(&self) -> PlaybackSpeed {
        self.speed
    }

    /// Set playback speed. Applies from the next scheduled tick on.
    pub fn set_speed(&mut self, speed: PlaybackSpeed) {
        self.speed = speed;
    }

    pub fn faster(&mut self) {
        self.speed = self.speed.faster();
    }

    pub fn slower(&mut self) {
        self.speed = self.speed.slower();
    }

    /// Time between ticks at the current speed.
    pub fn tick_interval(&self) -> Duration {
        self.speed.scale(self.interval)
    }

    /// Valid cursor range, or `None` while nothing is built.
    pub fn bounds(&self) -> Option<RangeInclusive<usize>> {
        match self.cache.size() {
            0 => None,
            size => Some(0..=size - 1),
        }
    }

    /// Start playback.
    ///
    /// Sitting on the final frame of a finished cache rewinds to frame 0.
    pub fn play(&mut self, now: Instant) -> Option<Arc<FrameMeshBundle>> {
        if self.is_playing() {
            return None;
        }
        self.state = PlaybackState::Playing;
        self.next_tick = Some(now + self.tick_interval());

        let complete = self.cache.is_complete();
        let size = self.cache.size();
        if complete && size > 0 && self.cursor + 1 >= size {
            self.cursor = 0;
            return self.current();
        }
        None
    }

    /// Pause playback.
    pub fn pause(&mut self) {
        self.state = PlaybackState::Paused;
        self.next_tick = None;
    }

    /// Play if paused, pause if playing.
    pub fn toggle(&mut self, now: Instant) -> Option<Arc<FrameMeshBundle>> {
        match self.state {
            PlaybackState::Playing => {
                self.pause();
                None
            }
            PlaybackState::Paused => self.play(now),
        }
    }

    /// Move to the next built frame.
    ///
    /// Does nothing while the producer has not built past the cursor. Reaching
    /// the last frame of a finished cache pauses playback.
    pub fn advance(&mut self) -> Option<Arc<FrameMeshBundle>> {
        // Completion first: once it is observed the size is final.
        let complete = self.cache.is_complete();
        let size = self.cache.size();

        if self.cursor + 1 < size {
            self.cursor += 1;
            if complete && self.cursor + 1 == size {
                self.pause();
            }
            self.current()
        } else {
            if complete {
                self.pause();
            }
            None
        }
    }

    /// Advance if playing and the scheduled tick is due.
    pub fn tick(&mut self, now: Instant) -> Option<Arc<FrameMeshBundle>> {
        if !self.is_playing() {
            return None;
        }
        let due = self.next_tick?;
        if now < due {
            return None;
        }

        let interval = self.tick_interval();
        let mut next = due + interval;
        if next <= now {
            // Fell behind by more than one tick; don't try to catch up.
            next = now + interval;
        }
        self.next_tick = Some(next);
        self.advance()
    }

    /// Time left until the next tick, or `None` while paused.
    pub fn time_until_tick(&self, now: Instant) -> Option<Duration> {
        self.next_tick.map(|t| t.saturating_duration_since(now))
    }

    /// Jump to a frame, clamped to the built range. Keeps the current state.
    pub fn seek(&mut self, index: usize) -> Option<Arc<FrameMeshBundle>> {
        let size = self.cache.size();
        if size == 0 {
            return None;
        }
        self.cursor = index.min(size - 1);
        self.current()
    }

    /// Step forward one frame.
    pub fn step_forward(&mut self) -> Option<Arc<FrameMeshBundle>> {
        if self.cursor + 1 < self.cache.size() {
            self.cursor += 1;
            self.current()
        } else {
            None
        }
    }

    /// Step backward one frame. Always pauses.
    pub fn step_backward(&mut self) -> Option<Arc<FrameMeshBundle>> {
        self.pause();
        if self.cursor > 0 {
            self.cursor -= 1;
            self.current()
        } else {
            None
        }
    }

    /// Calculate progress as percentage (0.0 - 1.0).
    pub fn progress(&self) -> f64 {
        match self.cache.total_frames() {
            0 | 1 => {
                if self.cache.is_empty() {
                    0.0
                } else {
                    1.0
                }
            }
            total => self.cursor as f64 / (total - 1) as f64,
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        PlaybackStatus::from(self)
    }
}

/// Snapshot of the controller for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackStatus {
    pub current_frame: usize,
    pub frames_ready: usize,
    pub total_frames: usize,
    pub state: PlaybackState,
    pub speed: PlaybackSpeed,
    pub progress: f64,
    pub build_complete: bool,
    pub timestamp: Option<f64>,
}

impl From<&PlaybackController> for PlaybackStatus {
    fn from(playback: &PlaybackController) -> Self {
        Self {
            current_frame: playback.cursor,
            frames_ready: playback.cache.size(),
            total_frames: playback.cache.total_frames(),
            state: playback.state,
            speed: playback.speed,
            progress: playback.progress(),
            build_complete: playback.cache.is_complete(),
            timestamp: playback.current().map(|b| b.timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with(frames: usize, total: usize) -> Arc<PlaybackCache> {
        let cache = Arc::new(PlaybackCache::new(total));
        for i in 0..frames {
            cache
                .append(FrameMeshBundle::new(i, i as f64 * 0.01))
                .unwrap();
        }
        cache
    }

    fn controller(cache: &Arc<PlaybackCache>) -> PlaybackController {
        PlaybackController::new(Arc::clone(cache), PlaybackController::DEFAULT_INTERVAL)
    }

    #[test]
    fn playback_starts_paused_at_zero() {
        let playback = controller(&cache_with(3, 3));
        assert_eq!(playback.current_frame(), 0);
        assert_eq!(playback.state(), PlaybackState::Paused);
        assert_eq!(playback.time_until_tick(Instant::now()), None);
    }

    #[test]
    fn seek_clamps_to_bounds() {
        let cache = cache_with(5, 10);
        let mut playback = controller(&cache);

        assert_eq!(playback.seek(3).unwrap().frame_index, 3);
        assert_eq!(playback.seek(100).unwrap().frame_index, 4);
        assert_eq!(playback.current_frame(), 4);
        assert_eq!(playback.bounds(), Some(0..=4));
    }

    #[test]
    fn seek_on_empty_cache_is_noop() {
        let mut playback = controller(&cache_with(0, 5));
        assert!(playback.seek(2).is_none());
        assert_eq!(playback.current_frame(), 0);
        assert_eq!(playback.bounds(), None);
    }

    #[test]
    fn seek_keeps_state() {
        let mut playback = controller(&cache_with(5, 5));
        playback.play(Instant::now());
        playback.seek(2);
        assert!(playback.is_playing());
    }

    #[test]
    fn advance_waits_for_producer() {
        let cache = cache_with(2, 5);
        let mut playback = controller(&cache);
        playback.play(Instant::now());

        assert_eq!(playback.advance().unwrap().frame_index, 1);
        assert!(playback.advance().is_none());
        assert_eq!(playback.current_frame(), 1);
        assert!(playback.is_playing());

        cache.append(FrameMeshBundle::new(2, 0.02)).unwrap();
        assert_eq!(playback.advance().unwrap().frame_index, 2);
    }

    #[test]
    fn advance_auto_pauses_at_the_end() {
        let cache = cache_with(3, 3);
        cache.mark_complete();
        let mut playback = controller(&cache);
        playback.play(Instant::now());

        playback.advance();
        assert!(playback.is_playing());
        assert_eq!(playback.advance().unwrap().frame_index, 2);
        assert_eq!(playback.state(), PlaybackState::Paused);
    }

    #[test]
    fn stalled_cursor_pauses_once_complete() {
        let cache = cache_with(2, 5);
        let mut playback = controller(&cache);
        playback.seek(1);
        playback.play(Instant::now());
        assert!(playback.advance().is_none());
        assert!(playback.is_playing());

        // Producer failed early: nothing more is coming.
        cache.mark_complete();
        assert!(playback.advance().is_none());
        assert_eq!(playback.state(), PlaybackState::Paused);
    }

    #[test]
    fn play_at_end_of_complete_cache_rewinds() {
        let cache = cache_with(3, 3);
        cache.mark_complete();
        let mut playback = controller(&cache);
        playback.seek(2);

        let frame = playback.play(Instant::now()).unwrap();
        assert_eq!(frame.frame_index, 0);
        assert_eq!(playback.current_frame(), 0);
        assert!(playback.is_playing());
    }

    #[test]
    fn play_twice_is_noop() {
        let mut playback = controller(&cache_with(3, 3));
        let now = Instant::now();
        playback.play(now);
        let scheduled = playback.time_until_tick(now);
        assert!(playback.play(now + Duration::from_millis(10)).is_none());
        assert_eq!(playback.time_until_tick(now), scheduled);
    }

    #[test]
    fn tick_fires_only_after_interval() {
        let mut playback = controller(&cache_with(5, 5));
        let start = Instant::now();
        playback.play(start);

        assert!(playback.tick(start + Duration::from_millis(39)).is_none());
        assert_eq!(playback.current_frame(), 0);

        let frame = playback.tick(start + Duration::from_millis(40)).unwrap();
        assert_eq!(frame.frame_index, 1);
        assert_eq!(
            playback.time_until_tick(start + Duration::from_millis(40)),
            Some(Duration::from_millis(40))
        );
    }

    #[test]
    fn tick_does_not_catch_up_after_a_stall() {
        let mut playback = controller(&cache_with(10, 10));
        let start = Instant::now();
        playback.play(start);

        let late = start + Duration::from_secs(1);
        assert!(playback.tick(late).is_some());
        assert!(playback.tick(late).is_none());
        assert_eq!(playback.current_frame(), 1);
    }

    #[test]
    fn paused_controller_ignores_ticks() {
        let mut playback = controller(&cache_with(5, 5));
        let start = Instant::now();
        playback.play(start);
        playback.pause();
        assert!(playback.tick(start + Duration::from_secs(1)).is_none());
        assert_eq!(playback.current_frame(), 0);
    }

    #[test]
    fn speed_changes_interval() {
        let mut playback = controller(&cache_with(1, 1));
        assert_eq!(playback.tick_interval(), Duration::from_millis(40));
        playback.faster();
        assert_eq!(playback.speed(), PlaybackSpeed::Double);
        assert_eq!(playback.tick_interval(), Duration::from_millis(20));
        playback.slower();
        playback.slower();
        assert_eq!(playback.tick_interval(), Duration::from_millis(80));
    }

    #[test]
    fn speed_steps_saturate() {
        assert_eq!(PlaybackSpeed::TenX.faster(), PlaybackSpeed::TenX);
        assert_eq!(PlaybackSpeed::QuarterSpeed.slower(), PlaybackSpeed::QuarterSpeed);
        assert_eq!(PlaybackSpeed::Normal.faster().slower(), PlaybackSpeed::Normal);
    }

    #[test]
    fn step_backward_pauses() {
        let mut playback = controller(&cache_with(4, 4));
        playback.seek(2);
        playback.play(Instant::now());

        assert_eq!(playback.step_backward().unwrap().frame_index, 1);
        assert_eq!(playback.state(), PlaybackState::Paused);
        assert_eq!(playback.step_forward().unwrap().frame_index, 2);
    }

    #[test]
    fn step_forward_stops_at_watermark() {
        let mut playback = controller(&cache_with(2, 4));
        assert!(playback.step_forward().is_some());
        assert!(playback.step_forward().is_none());
        assert_eq!(playback.current_frame(), 1);
    }

    #[test]
    fn status_conversion() {
        let cache = cache_with(6, 11);
        let mut playback = controller(&cache);
        playback.seek(5);
        playback.set_speed(PlaybackSpeed::Double);

        let status = playback.status();
        assert_eq!(status.current_frame, 5);
        assert_eq!(status.frames_ready, 6);
        assert_eq!(status.total_frames, 11);
        assert_eq!(status.speed, PlaybackSpeed::Double);
        assert_eq!(status.progress, 0.5);
        assert_eq!(status.timestamp, Some(5.0 * 0.01));
        assert!(!status.build_complete);
    }
}
