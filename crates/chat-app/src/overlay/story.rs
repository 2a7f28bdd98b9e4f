use std::time::Duration;

use mechat_storage::StoryId;

use super::OverlayId;
use super::timer::TimerHandle;
use crate::app::{AppEvent, AppEventSender};

pub const STORY_TICK_EVERY: Duration = Duration::from_millis(50);
pub const STORY_PROGRESS_MAX: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorySignal {
    Tick,
}

/// Result of moving through the story list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoryStep {
    /// Still on the same story; progress moved.
    Progressed(u8),
    /// A different story is now shown, with progress reset.
    Showing(StoryId),
    Closed,
}

/// Full-screen story viewer over an ordered list of story ids.
#[derive(Debug)]
pub struct StoryOverlay {
    id: OverlayId,
    stories: Vec<StoryId>,
    index: usize,
    progress: u8,
    ticker: Option<TimerHandle>,
}

impl StoryOverlay {
    /// Returns `None` when `start` is not in `stories`.
    pub fn new(id: OverlayId, stories: Vec<StoryId>, start: &StoryId) -> Option<Self> {
        let index = stories.iter().position(|story_id| story_id == start)?;

        Some(Self {
            id,
            stories,
            index,
            progress: 0,
            ticker: None,
        })
    }

    pub fn start(&mut self, events: &AppEventSender) {
        let overlay = self.id;
        let events = events.clone();
        self.ticker = Some(TimerHandle::every(STORY_TICK_EVERY, move || {
            events
                .send(AppEvent::Story {
                    overlay,
                    signal: StorySignal::Tick,
                })
                .is_ok()
        }));
    }

    pub fn id(&self) -> OverlayId {
        self.id
    }

    pub fn current(&self) -> &StoryId {
        &self.stories[self.index]
    }

    pub fn position(&self) -> (usize, usize) {
        (self.index + 1, self.stories.len())
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn apply(&mut self, signal: StorySignal) -> StoryStep {
        match signal {
            StorySignal::Tick => self.tick(),
        }
    }

    /// Advances progress by one; a full bar moves on to the next story.
    pub fn tick(&mut self) -> StoryStep {
        self.progress = self.progress.saturating_add(1).min(STORY_PROGRESS_MAX);
        if self.progress >= STORY_PROGRESS_MAX {
            return self.next();
        }

        StoryStep::Progressed(self.progress)
    }

    pub fn next(&mut self) -> StoryStep {
        if self.index + 1 >= self.stories.len() {
            self.ticker = None;
            return StoryStep::Closed;
        }

        self.show(self.index + 1)
    }

    pub fn prev(&mut self) -> StoryStep {
        if self.index == 0 {
            self.ticker = None;
            return StoryStep::Closed;
        }

        self.show(self.index - 1)
    }

    fn show(&mut self, index: usize) -> StoryStep {
        self.index = index;
        self.progress = 0;
        StoryStep::Showing(self.current().clone())
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn ids(raw: &[&str]) -> Vec<StoryId> {
        raw.iter().map(|id| StoryId::new(*id)).collect()
    }

    fn run_to_full(overlay: &mut StoryOverlay) -> StoryStep {
        let mut step = StoryStep::Progressed(overlay.progress());
        while let StoryStep::Progressed(_) = step {
            step = overlay.tick();
        }
        step
    }

    #[test]
    fn unknown_start_opens_nothing() {
        assert!(StoryOverlay::new(OverlayId(1), ids(&["s1"]), &StoryId::new("missing")).is_none());
    }

    #[test]
    fn full_progress_advances_then_closes_after_last() {
        let mut overlay =
            StoryOverlay::new(OverlayId(1), ids(&["s1", "s2", "s3"]), &StoryId::new("s1")).unwrap();

        assert_eq!(run_to_full(&mut overlay), StoryStep::Showing(StoryId::new("s2")));
        assert_eq!(overlay.progress(), 0);

        let mut last =
            StoryOverlay::new(OverlayId(2), ids(&["s1", "s2", "s3"]), &StoryId::new("s3")).unwrap();
        assert_eq!(run_to_full(&mut last), StoryStep::Closed);
    }

    #[test]
    fn it_takes_one_hundred_ticks_to_advance() {
        let mut overlay =
            StoryOverlay::new(OverlayId(1), ids(&["s1", "s2"]), &StoryId::new("s1")).unwrap();
        for expected in 1..STORY_PROGRESS_MAX {
            assert_eq!(overlay.tick(), StoryStep::Progressed(expected));
        }
        assert_eq!(overlay.tick(), StoryStep::Showing(StoryId::new("s2")));
    }

    #[test]
    fn manual_navigation_resets_progress_and_closes_at_edges() {
        let mut overlay =
            StoryOverlay::new(OverlayId(1), ids(&["s1", "s2"]), &StoryId::new("s1")).unwrap();
        overlay.tick();
        overlay.tick();

        assert_eq!(overlay.next(), StoryStep::Showing(StoryId::new("s2")));
        assert_eq!(overlay.progress(), 0);
        assert_eq!(overlay.position(), (2, 2));
        assert_eq!(overlay.prev(), StoryStep::Showing(StoryId::new("s1")));
        assert_eq!(overlay.prev(), StoryStep::Closed);

        let mut at_end =
            StoryOverlay::new(OverlayId(2), ids(&["s1", "s2"]), &StoryId::new("s2")).unwrap();
        assert_eq!(at_end.next(), StoryStep::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_emits_tagged_signals_until_dropped() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut overlay =
            StoryOverlay::new(OverlayId(9), ids(&["s1"]), &StoryId::new("s1")).unwrap();
        overlay.start(&events_tx);

        match events_rx.recv().await {
            Some(AppEvent::Story { overlay: id, signal }) => {
                assert_eq!(id, OverlayId(9));
                assert_eq!(signal, StorySignal::Tick);
            }
            other => panic!("expected story tick, got {other:?}"),
        }

        drop(overlay);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(events_rx.try_recv().is_err());
    }
}
