use std::time::Duration;

use mechat_storage::{CallDirection, CallKind, NewCallLog, User};
use serde::{Deserialize, Serialize};

use super::timer::TimerHandle;
use super::{OverlayId, format_duration};
use crate::app::{AppEvent, AppEventSender};

pub const RINGING_AFTER: Duration = Duration::from_millis(1_500);
pub const CONNECTED_AFTER: Duration = Duration::from_millis(3_500);
pub const CALL_TICK_EVERY: Duration = Duration::from_secs(1);
pub const DEFAULT_RECORDED_CALL_SECS: u64 = 45;

/// How the duration of an ended call is recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDurationPolicy {
    Fixed { seconds: u64 },
    Elapsed,
}

impl Default for CallDurationPolicy {
    fn default() -> Self {
        Self::Fixed {
            seconds: DEFAULT_RECORDED_CALL_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallPhase {
    Calling,
    Ringing,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallSignal {
    Ringing,
    Connected,
    Tick,
}

/// An outgoing call in progress. Dropping it cancels all of its timers.
#[derive(Debug)]
pub struct CallOverlay {
    id: OverlayId,
    peer: User,
    kind: CallKind,
    phase: CallPhase,
    elapsed_secs: u64,
    muted: bool,
    camera_off: bool,
    timers: Vec<TimerHandle>,
}

impl CallOverlay {
    pub fn new(id: OverlayId, peer: User, kind: CallKind) -> Self {
        Self {
            id,
            peer,
            kind,
            phase: CallPhase::Calling,
            elapsed_secs: 0,
            muted: false,
            camera_off: false,
            timers: Vec::new(),
        }
    }

    /// Schedules the ringing and connected transitions.
    pub fn start(&mut self, events: &AppEventSender) {
        let ringing = self.signal_after(RINGING_AFTER, CallSignal::Ringing, events);
        let connected = self.signal_after(CONNECTED_AFTER, CallSignal::Connected, events);
        self.timers.extend([ringing, connected]);
    }

    pub fn id(&self) -> OverlayId {
        self.id
    }

    pub fn peer(&self) -> &User {
        &self.peer
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }

    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_camera_off(&self) -> bool {
        self.camera_off
    }

    /// Applies one timer signal; returns whether anything visible changed.
    pub fn apply(&mut self, signal: CallSignal, events: &AppEventSender) -> bool {
        match (signal, self.phase) {
            (CallSignal::Ringing, CallPhase::Calling) => {
                self.phase = CallPhase::Ringing;
                true
            }
            (CallSignal::Connected, CallPhase::Calling | CallPhase::Ringing) => {
                self.phase = CallPhase::Connected;
                let ticker = self.ticker(events);
                self.timers.push(ticker);
                tracing::info!(peer_id = %self.peer.id, kind = %self.kind, "call connected");
                true
            }
            (CallSignal::Tick, CallPhase::Connected) => {
                self.elapsed_secs += 1;
                true
            }
            _ => false,
        }
    }

    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        self.muted
    }

    /// Returns the new camera-off state, or `None` for audio calls.
    pub fn toggle_camera(&mut self) -> Option<bool> {
        if self.kind != CallKind::Video {
            return None;
        }

        self.camera_off = !self.camera_off;
        Some(self.camera_off)
    }

    pub fn status_line(&self) -> String {
        match self.phase {
            CallPhase::Calling => "Calling...".to_string(),
            CallPhase::Ringing => "Ringing...".to_string(),
            CallPhase::Connected => format_duration(self.elapsed_secs),
        }
    }

    /// Ends the call and returns the log entry to record, stamped with the
    /// moment it ended.
    pub fn end(self, policy: CallDurationPolicy, ended_at_unix_seconds: u64) -> NewCallLog {
        let duration_secs = match policy {
            CallDurationPolicy::Fixed { seconds } => seconds,
            CallDurationPolicy::Elapsed => self.elapsed_secs,
        };

        NewCallLog {
            peer_id: self.peer.id.clone(),
            kind: self.kind,
            direction: CallDirection::Outgoing,
            created_at_unix_seconds: ended_at_unix_seconds,
            duration_secs: Some(duration_secs),
        }
    }

    fn signal_after(
        &self,
        delay: Duration,
        signal: CallSignal,
        events: &AppEventSender,
    ) -> TimerHandle {
        let overlay = self.id;
        let events = events.clone();
        TimerHandle::after(delay, move || {
            let _ = events.send(AppEvent::Call { overlay, signal });
        })
    }

    fn ticker(&self, events: &AppEventSender) -> TimerHandle {
        let overlay = self.id;
        let events = events.clone();
        TimerHandle::every(CALL_TICK_EVERY, move || {
            events
                .send(AppEvent::Call {
                    overlay,
                    signal: CallSignal::Tick,
                })
                .is_ok()
        })
    }
}

#[cfg(test)]
mod tests {
    use mechat_storage::Presence;
    use tokio::sync::mpsc;

    use super::*;

    fn sarah() -> User {
        User::new("u1", "Sarah Connor", "", Presence::Offline)
    }

    async fn next_call_signal(
        events: &mut mpsc::UnboundedReceiver<AppEvent>,
    ) -> (OverlayId, CallSignal) {
        match events.recv().await {
            Some(AppEvent::Call { overlay, signal }) => (overlay, signal),
            other => panic!("expected call signal, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn phases_follow_the_schedule() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut call = CallOverlay::new(OverlayId(7), sarah(), CallKind::Video);
        call.start(&events_tx);
        assert_eq!(call.status_line(), "Calling...");

        let (overlay, signal) = next_call_signal(&mut events_rx).await;
        assert_eq!(overlay, OverlayId(7));
        assert!(call.apply(signal, &events_tx));
        assert_eq!(call.status_line(), "Ringing...");

        let (_, signal) = next_call_signal(&mut events_rx).await;
        assert!(call.apply(signal, &events_tx));
        assert_eq!(call.phase(), CallPhase::Connected);
        assert_eq!(call.status_line(), "00:00");

        for _ in 0..3 {
            let (_, signal) = next_call_signal(&mut events_rx).await;
            call.apply(signal, &events_tx);
        }
        assert_eq!(call.status_line(), "00:03");
    }

    #[tokio::test(start_paused = true)]
    async fn ended_call_stops_signalling() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut call = CallOverlay::new(OverlayId(1), sarah(), CallKind::Audio);
        call.start(&events_tx);

        call.end(CallDurationPolicy::default(), 2_000);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(events_rx.try_recv().is_err());
    }

    #[test]
    fn ending_records_one_outgoing_log_of_the_call_kind() {
        let call = CallOverlay::new(OverlayId(1), sarah(), CallKind::Video);
        let log = call.end(CallDurationPolicy::default(), 2_000);

        assert_eq!(log.peer_id, sarah().id);
        assert_eq!(log.kind, CallKind::Video);
        assert_eq!(log.direction, CallDirection::Outgoing);
        assert_eq!(log.duration_secs, Some(DEFAULT_RECORDED_CALL_SECS));
    }

    #[test]
    fn elapsed_policy_records_the_live_counter() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let mut call = CallOverlay::new(OverlayId(1), sarah(), CallKind::Audio);
        call.phase = CallPhase::Connected;
        for _ in 0..5 {
            call.apply(CallSignal::Tick, &events_tx);
        }

        let log = call.end(CallDurationPolicy::Elapsed, 2_000);
        assert_eq!(log.duration_secs, Some(5));
    }

    #[test]
    fn ticks_before_connecting_are_ignored() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let mut call = CallOverlay::new(OverlayId(1), sarah(), CallKind::Audio);
        assert!(!call.apply(CallSignal::Tick, &events_tx));
        assert_eq!(call.elapsed_secs(), 0);
    }

    #[test]
    fn camera_toggle_only_applies_to_video() {
        let mut audio = CallOverlay::new(OverlayId(1), sarah(), CallKind::Audio);
        assert_eq!(audio.toggle_camera(), None);
        assert!(audio.toggle_mute());
        assert!(!audio.toggle_mute());

        let mut video = CallOverlay::new(OverlayId(2), sarah(), CallKind::Video);
        assert_eq!(video.toggle_camera(), Some(true));
    }
}
