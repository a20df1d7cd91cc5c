//! Actors: pre-loop context injectors.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::TroupeError;

/// Snapshot of the request handed to actors.
#[derive(Debug, Clone)]
pub struct ActorInput {
    pub input: String,
    pub metadata: HashMap<String, String>,
    pub conversation_key: String,
}

type ComputedFn = dyn Fn(&ActorInput) -> String + Send + Sync;
type AsyncFn = dyn Fn(ActorInput) -> Pin<Box<dyn Future<Output = Result<String, TroupeError>> + Send>>
    + Send
    + Sync;

/// A context-injecting step run before a scene's main loop. Each actor
/// contributes one system-context message.
#[derive(Clone)]
pub enum Actor {
    Static(String),
    Computed(Arc<ComputedFn>),
    Async(Arc<AsyncFn>),
}

impl Actor {
    /// A fixed context string.
    pub fn static_context(text: impl Into<String>) -> Self {
        Self::Static(text.into())
    }

    /// Context computed synchronously from the request.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&ActorInput) -> String + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }

    /// Context produced by an async step (e.g. a lookup).
    pub fn async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(ActorInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, TroupeError>> + Send + 'static,
    {
        Self::Async(Arc::new(move |input| Box::pin(f(input))))
    }

    /// Run the actor and collect its contribution.
    pub async fn contribute(&self, input: &ActorInput) -> Result<String, TroupeError> {
        match self {
            Self::Static(text) => Ok(text.clone()),
            Self::Computed(f) => Ok(f(input)),
            Self::Async(f) => f(input.clone()).await,
        }
    }
}

impl std::fmt::Debug for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(text) => f.debug_tuple("Actor::Static").field(text).finish(),
            Self::Computed(_) => f.write_str("Actor::Computed"),
            Self::Async(_) => f.write_str("Actor::Async"),
        }
    }
}
