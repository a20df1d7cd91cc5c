//! Request-scoped state and the per-scene tool-calling loop.

pub mod context;
pub mod events;
pub(crate) mod executor;

pub use context::{ContinuationState, ExecutionPhase, SceneContext};
pub use events::{ClientToolRequest, SceneEvent, SceneEventStream, SceneStatus};
