//! Run model and event reconciliation for the Zendroid client.
//!
//! Everything here is synchronous and I/O free: transports in
//! `zendroid-client` feed envelopes in, renderers read state out.

pub mod errors;
pub mod events;
pub mod gate;
pub mod ids;
pub mod reconciler;
pub mod state;
pub mod transcript;

pub use errors::ClientError;
pub use events::{EventKind, HistoryItem, InboundEvent, OutboundEvent, PollSnapshot};
pub use gate::InputGate;
pub use ids::RunId;
pub use reconciler::{reduce, EventReconciler, Reduction};
pub use state::{RunState, RunStatus, TaskProgress};
pub use transcript::{ChatEntry, ChatKind, ChatTranscript};
