use serde::{Deserialize, Serialize};

/// Whether the agent is blocked waiting for a human reply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputGate {
    #[default]
    NotWaiting,
    Waiting,
}

impl InputGate {
    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Returns true if the gate changed.
    pub(crate) fn block(&mut self) -> bool {
        let changed = !self.is_waiting();
        *self = Self::Waiting;
        changed
    }

    /// Returns true if the gate changed.
    pub(crate) fn release(&mut self) -> bool {
        let changed = self.is_waiting();
        *self = Self::NotWaiting;
        changed
    }
}
