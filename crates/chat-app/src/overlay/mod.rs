pub mod call;
pub mod story;
pub mod timer;

use std::fmt;

pub use call::{CallDurationPolicy, CallOverlay, CallPhase, CallSignal};
pub use story::{StoryOverlay, StorySignal, StoryStep};
pub use timer::TimerHandle;

/// Identity of one opened overlay. Timer events carry it so that events from
/// a dismissed overlay can be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverlayId(pub u64);

impl fmt::Display for OverlayId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "overlay-{}", self.0)
    }
}

/// Formats whole seconds as `MM:SS`.
pub fn format_duration(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
