use tracing::{debug, info};

use crate::errors::ClientError;
use crate::events::{EventKind, InboundEvent, PollSnapshot};
use crate::gate::InputGate;
use crate::ids::RunId;
use crate::state::{RunState, RunStatus, TaskProgress};
use crate::transcript::{ChatKind, ChatTranscript};

/// What one reconciler step changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Reduction {
    /// Transcript entries appended by this step.
    pub appended: usize,
    pub gate_changed: bool,
    pub state_changed: bool,
}

impl Reduction {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Sole owner of one run's state, transcript and input gate.
///
/// Every inbound envelope, polling snapshot, connection note and user reply
/// goes through here, one at a time, in the order the caller hands them over.
#[derive(Clone, Debug, Default)]
pub struct EventReconciler {
    state: RunState,
    transcript: ChatTranscript,
    gate: InputGate,
    // Highest history index already narrated from polling snapshots.
    history_seen: usize,
    last_snapshot_error: Option<String>,
    completion_announced: bool,
}

impl EventReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn transcript(&self) -> &ChatTranscript {
        &self.transcript
    }

    pub fn gate(&self) -> InputGate {
        self.gate
    }

    /// True once the run has been announced as finished, either by a
    /// `complete` envelope (with or without a status) or by a terminal
    /// snapshot status.
    pub fn is_complete(&self) -> bool {
        self.completion_announced
    }

    /// Apply one inbound envelope.
    pub fn apply(&mut self, event: &InboundEvent) -> Reduction {
        let mut out = Reduction::default();

        match &event.kind {
            EventKind::Unrecognized(tag) => {
                info!(event_type = %tag, "ignoring unrecognized event");
                return out;
            }
            kind if kind.is_narrated() => {
                self.append(&mut out, ChatKind::Agent, event.narration());
            }
            EventKind::Screenshot => {
                if let Some(data) = &event.data {
                    if self.state.screenshot.as_deref() != Some(data.as_str()) {
                        self.state.screenshot = Some(data.clone());
                        out.state_changed = true;
                    }
                } else {
                    debug!("screenshot event without data");
                }
            }
            EventKind::Error => {
                self.append(&mut out, ChatKind::Error, event.narration());
            }
            EventKind::ErrorAwaitingInput => {
                self.append(&mut out, ChatKind::Error, event.narration());
                out.gate_changed |= self.gate.block();
            }
            EventKind::Complete => {
                let summary = completion_summary(event.status.as_deref(), event.message.as_deref());
                self.append(&mut out, ChatKind::System, summary);
                out.gate_changed |= self.gate.release();
                self.completion_announced = true;
            }
            // is_narrated() covers the remaining tags.
            _ => {}
        }

        self.apply_state_fields(event, &mut out);
        out
    }

    /// Apply a polling snapshot. Snapshots are full state, so the newest
    /// arrival wins even if it was dispatched earlier than the previous one.
    pub fn apply_snapshot(&mut self, snapshot: &PollSnapshot) -> Reduction {
        let mut out = Reduction::default();

        let status = snapshot.status.as_deref().and_then(|s| {
            let mapped = RunStatus::from_wire(s);
            if mapped.is_none() {
                debug!(status = s, "snapshot status does not map to run state");
            }
            mapped
        });
        if let Some(status) = status {
            self.set_status(status, &mut out);
        }

        if let Some(screenshot) = &snapshot.screenshot {
            if !screenshot.is_empty() && self.state.screenshot.as_ref() != Some(screenshot) {
                self.state.screenshot = Some(screenshot.clone());
                out.state_changed = true;
            }
        }

        // Transcript is append-only: a stale, shorter history narrates nothing.
        for item in snapshot.history.iter().skip(self.history_seen) {
            let kind = if item.is_system() { ChatKind::System } else { ChatKind::Agent };
            self.append(&mut out, kind, item.render());
        }
        self.history_seen = self.history_seen.max(snapshot.history.len());

        if let Some(error) = &snapshot.error {
            if self.last_snapshot_error.as_ref() != Some(error) {
                self.append(&mut out, ChatKind::Error, error.clone());
                self.last_snapshot_error = Some(error.clone());
            }
        }

        if let Some(status) = status.filter(RunStatus::is_terminal) {
            if !self.completion_announced {
                self.append(&mut out, ChatKind::System, completion_summary(Some(status.as_str()), None));
                out.gate_changed |= self.gate.release();
                self.completion_announced = true;
            }
        }

        out
    }

    /// Record a reply that the transport accepted for delivery.
    pub fn record_user_reply(&mut self, text: &str) -> Reduction {
        let mut out = Reduction::default();
        self.append(&mut out, ChatKind::User, text);
        out.gate_changed = self.gate.release();
        out
    }

    pub fn note_connected(&mut self, run_id: &RunId) -> Reduction {
        let mut out = Reduction::default();
        self.append(&mut out, ChatKind::System, format!("Connected to run {run_id}"));
        out
    }

    pub fn note_channel_error(&mut self, error: &ClientError) -> Reduction {
        let mut out = Reduction::default();
        self.append(&mut out, ChatKind::System, format!("Connection error: {error}"));
        out
    }

    pub fn note_disconnected(&mut self, reason: Option<&str>) -> Reduction {
        let mut out = Reduction::default();
        let text = match reason {
            Some(reason) if !reason.is_empty() => format!("Disconnected: {reason}"),
            _ => "Disconnected".to_string(),
        };
        self.append(&mut out, ChatKind::System, text);
        out
    }

    fn append(&mut self, out: &mut Reduction, kind: ChatKind, text: impl Into<String>) {
        self.transcript.push(kind, text);
        out.appended += 1;
    }

    // Type-independent: any envelope may carry status or progress.
    fn apply_state_fields(&mut self, event: &InboundEvent, out: &mut Reduction) {
        if let Some(raw) = event.status.as_deref() {
            match RunStatus::from_wire(raw) {
                Some(status) => self.set_status(status, out),
                None => debug!(status = raw, event_type = %event.kind, "unmapped status ignored"),
            }
        }

        if let Some(task) = &event.task {
            if self.state.current_task.as_ref() != Some(task) {
                self.state.current_task = Some(task.clone());
                out.state_changed = true;
            }
        }

        if let (Some(current), Some(total)) = (event.task_number, event.total_tasks) {
            let progress = TaskProgress { current, total };
            if self.state.task_progress != progress {
                self.state.task_progress = progress;
                out.state_changed = true;
            }
        }
    }

    fn set_status(&mut self, status: RunStatus, out: &mut Reduction) {
        if self.state.status != status {
            self.state.status = status;
            out.state_changed = true;
        }
    }
}

/// Pure form of [`EventReconciler::apply`]: consumes the prior state and
/// returns the next one.
pub fn reduce(mut prior: EventReconciler, event: &InboundEvent) -> EventReconciler {
    prior.apply(event);
    prior
}

fn completion_summary(status: Option<&str>, message: Option<&str>) -> String {
    match (status, message) {
        (Some(status), Some(message)) => format!("Run {status}: {message}"),
        (Some(status), None) => format!("Run {status}"),
        (None, Some(message)) => message.to_string(),
        (None, None) => "Run complete".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::HistoryItem;
    use serde_json::Map;

    fn evt(kind: EventKind) -> InboundEvent {
        InboundEvent::new(kind)
    }

    fn history(role: &str, content: &str) -> HistoryItem {
        HistoryItem {
            role: Some(role.into()),
            content: Some(content.into()),
            extra: Map::new(),
        }
    }

    #[test]
    fn narrated_types_append_agent_entries() {
        let mut r = EventReconciler::new();
        for kind in [
            EventKind::Status,
            EventKind::Plan,
            EventKind::TaskStart,
            EventKind::ActionPlan,
            EventKind::ActionExecuted,
            EventKind::TaskComplete,
        ] {
            let out = r.apply(&evt(kind).with_message("step"));
            assert_eq!(out.appended, 1);
        }
        assert_eq!(r.transcript().len(), 6);
        assert!(r.transcript().entries().iter().all(|e| e.kind == ChatKind::Agent));
        assert_eq!(r.gate(), InputGate::NotWaiting);
    }

    #[test]
    fn narration_without_message_renders_event() {
        let mut r = EventReconciler::new();
        r.apply(&evt(EventKind::Plan));
        let text = &r.transcript().last().unwrap().text;
        assert!(text.contains("\"type\":\"plan\""), "got: {text}");
    }

    #[test]
    fn screenshot_replaces_without_transcript() {
        let mut r = EventReconciler::new();
        let out = r.apply(&evt(EventKind::Screenshot).with_data("Xg=="));
        assert_eq!(r.state().screenshot.as_deref(), Some("Xg=="));
        assert_eq!(r.transcript().len(), 0);
        assert_eq!(out.appended, 0);
        assert!(out.state_changed);

        r.apply(&evt(EventKind::Screenshot).with_data("AAAA"));
        assert_eq!(r.state().screenshot.as_deref(), Some("AAAA"));
        assert_eq!(r.transcript().len(), 0);
    }

    #[test]
    fn error_appends_error_entry_without_gate() {
        let mut r = EventReconciler::new();
        r.apply(&evt(EventKind::Error).with_message("Navigation failed"));
        let entry = r.transcript().last().unwrap();
        assert_eq!(entry.kind, ChatKind::Error);
        assert_eq!(entry.text, "Navigation failed");
        assert_eq!(r.gate(), InputGate::NotWaiting);
    }

    #[test]
    fn awaiting_input_is_idempotent() {
        let mut r = EventReconciler::new();
        let first = r.apply(&evt(EventKind::ErrorAwaitingInput).with_message("crash?"));
        let second = r.apply(&evt(EventKind::ErrorAwaitingInput).with_message("crash?"));
        assert!(first.gate_changed);
        assert!(!second.gate_changed);
        assert_eq!(r.gate(), InputGate::Waiting);
        assert_eq!(r.transcript().len(), 2);
    }

    #[test]
    fn reply_releases_gate_once() {
        let mut r = EventReconciler::new();
        r.apply(&evt(EventKind::ErrorAwaitingInput).with_message("crash?"));

        let out = r.record_user_reply("retry");
        assert!(out.gate_changed);
        assert_eq!(r.gate(), InputGate::NotWaiting);
        assert_eq!(r.transcript().last().unwrap().kind, ChatKind::User);

        let out = r.record_user_reply("again");
        assert!(!out.gate_changed);
        assert_eq!(r.gate(), InputGate::NotWaiting);
        assert_eq!(r.transcript().len(), 3);
    }

    #[test]
    fn complete_sets_status_and_clears_gate() {
        let mut r = EventReconciler::new();
        r.apply(&evt(EventKind::ErrorAwaitingInput));
        let out = r.apply(&evt(EventKind::Complete).with_status("passed"));
        assert!(out.gate_changed);
        assert!(out.state_changed);
        assert_eq!(r.state().status, RunStatus::Passed);
        assert_eq!(r.gate(), InputGate::NotWaiting);
        let entry = r.transcript().last().unwrap();
        assert_eq!(entry.kind, ChatKind::System);
        assert_eq!(entry.text, "Run passed");
    }

    #[test]
    fn complete_without_status_keeps_status() {
        let mut r = EventReconciler::new();
        r.apply(&evt(EventKind::Status).with_status("running"));
        assert!(!r.is_complete());
        r.apply(&evt(EventKind::Complete).with_message("All tasks completed successfully"));
        assert_eq!(r.state().status, RunStatus::Running);
        assert!(r.is_complete());
        assert_eq!(r.transcript().last().unwrap().text, "All tasks completed successfully");
    }

    #[test]
    fn unrecognized_changes_nothing() {
        let mut r = EventReconciler::new();
        let out = r.apply(&evt(EventKind::Unrecognized("warning".into())).with_status("failed"));
        assert!(out.is_noop());
        assert_eq!(r.state(), &RunState::default());
        assert!(r.transcript().is_empty());
    }

    #[test]
    fn secondary_channel_updates_progress_alongside_narration() {
        let mut r = EventReconciler::new();
        let out = r.apply(
            &evt(EventKind::TaskStart)
                .with_message("Task 2/3")
                .with_task("Open settings")
                .with_progress(2, 3)
                .with_status("running"),
        );
        assert_eq!(out.appended, 1);
        assert!(out.state_changed);
        assert_eq!(r.state().current_task.as_deref(), Some("Open settings"));
        assert_eq!(r.state().task_progress, TaskProgress { current: 2, total: 3 });
        assert_eq!(r.state().status, RunStatus::Running);
    }

    #[test]
    fn progress_needs_both_fields_and_is_not_monotonic() {
        let mut r = EventReconciler::new();
        let mut half = evt(EventKind::Status);
        half.task_number = Some(4);
        r.apply(&half);
        assert_eq!(r.state().task_progress, TaskProgress::default());

        r.apply(&evt(EventKind::Status).with_progress(3, 5));
        r.apply(&evt(EventKind::Status).with_progress(1, 5));
        assert_eq!(r.state().task_progress, TaskProgress { current: 1, total: 5 });
    }

    #[test]
    fn transcript_length_counts_narrated_and_error_like() {
        let events = vec![
            evt(EventKind::Status).with_message("a"),
            evt(EventKind::Screenshot).with_data("Xg=="),
            evt(EventKind::Error).with_message("b"),
            evt(EventKind::Unrecognized("info".into())),
            evt(EventKind::ActionExecuted),
            evt(EventKind::ErrorAwaitingInput),
            evt(EventKind::Screenshot).with_data("AA=="),
        ];
        let r = events.iter().fold(EventReconciler::new(), reduce);
        let narrated = events.iter().filter(|e| e.kind.is_narrated()).count();
        let errors = events.iter().filter(|e| e.kind.is_error_like()).count();
        assert_eq!(r.transcript().len(), narrated + errors);
    }

    #[test]
    fn snapshot_is_last_writer_wins() {
        let mut r = EventReconciler::new();
        let newer = PollSnapshot {
            status: Some("running".into()),
            screenshot: Some("bmV3".into()),
            history: vec![history("system", "Session started"), history("model", "Plan: [a, b]")],
            error: None,
        };
        let older = PollSnapshot {
            status: Some("starting".into()),
            screenshot: Some("b2xk".into()),
            history: vec![history("system", "Session started")],
            error: None,
        };

        r.apply_snapshot(&newer);
        assert_eq!(r.transcript().len(), 2);

        // An older response arriving late wins for state but cannot unsay history.
        r.apply_snapshot(&older);
        assert_eq!(r.state().screenshot.as_deref(), Some("b2xk"));
        assert_eq!(r.state().status, RunStatus::Running);
        assert_eq!(r.transcript().len(), 2);

        r.apply_snapshot(&newer);
        assert_eq!(r.state().screenshot.as_deref(), Some("bmV3"));
        assert_eq!(r.transcript().len(), 2);
    }

    #[test]
    fn snapshot_history_roles_map_to_kinds() {
        let mut r = EventReconciler::new();
        r.apply_snapshot(&PollSnapshot {
            status: Some("running".into()),
            history: vec![history("system", "Session started"), history("model", "tap")],
            ..Default::default()
        });
        let kinds: Vec<ChatKind> = r.transcript().entries().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ChatKind::System, ChatKind::Agent]);
    }

    #[test]
    fn terminal_snapshot_announces_once() {
        let mut r = EventReconciler::new();
        let done = PollSnapshot {
            status: Some("failed".into()),
            error: Some("Setup failed".into()),
            ..Default::default()
        };
        r.apply_snapshot(&done);
        r.apply_snapshot(&done);
        let kinds: Vec<ChatKind> = r.transcript().entries().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ChatKind::Error, ChatKind::System]);
        assert_eq!(r.state().status, RunStatus::Failed);
        assert!(r.is_complete());
    }

    #[test]
    fn unmapped_snapshot_status_is_ignored() {
        let mut r = EventReconciler::new();
        let out = r.apply_snapshot(&PollSnapshot {
            status: Some("not_found".into()),
            ..Default::default()
        });
        assert!(out.is_noop());
        assert_eq!(r.state().status, RunStatus::Idle);
    }

    #[test]
    fn connection_notes_are_system_entries() {
        let mut r = EventReconciler::new();
        r.note_connected(&RunId::from_raw("r1"));
        r.note_channel_error(&ClientError::transport("connection reset"));
        r.note_disconnected(None);
        let texts: Vec<&str> = r.transcript().entries().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "Connected to run r1",
                "Connection error: transport error: connection reset",
                "Disconnected",
            ]
        );
        assert!(r.transcript().entries().iter().all(|e| e.kind == ChatKind::System));
    }
}
