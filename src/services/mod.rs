//! Pluggable cross-cutting services: response cache, rate limiter,
//! conversation memory. Each trait ships with a usable in-memory default.

pub mod cache;
pub mod memory;
pub mod rate_limit;

pub use cache::{InMemoryCache, LogSummarizer, ResponseCache, ThresholdSummarizer};
pub use memory::{ConversationMemory, FoldMemorySummarizer, InMemoryMemoryStore, MemoryStore, MemorySummarizer};
pub use rate_limit::{RateLimitStatus, RateLimiter, WindowRateLimiter};
