//! Troupe: a scene-orchestration engine for tool-calling AI conversations.
//!
//! Given one user request the engine selects which bounded unit of work
//! ("scene") should handle it, lets the model call host-provided functions
//! ("tools") in a loop, enforces a monetary cost budget, and emits an ordered
//! stream of progress/result events. Three execution strategies are built in:
//! direct selection, multi-step planning, and dynamic scene chaining.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use troupe::prelude::*;
//!
//! # async fn example(chat: Arc<dyn ChatClient>) -> troupe::error::Result<()> {
//! use futures::StreamExt;
//!
//! let mut registry = SceneRegistry::new();
//! registry.register(Scene::new("weather", "Answers weather questions"));
//!
//! let manager = SceneManager::new(chat, registry);
//! let mut events = manager.execute(
//!     SceneRequest::new("What's the weather in Oslo?"),
//!     CancellationToken::new(),
//! );
//! while let Some(event) = events.next().await {
//!     println!("{}: {:?}", event.status, event.message);
//! }
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod error;
pub mod manager;
pub mod mcp;
pub mod modes;
pub mod prelude;
pub mod scene;
pub mod scene_loop;
pub mod services;
pub mod tools;
pub mod types;
