//! Rate limiting algorithms and per-identifier state management.

mod algorithm;
mod backend;
mod clock;
mod decision;
mod fixed_window;
mod limiter;
mod registry;
mod rules;
mod sliding_window;
mod store;
mod sweeper;
mod token_bucket;

pub use backend::RateLimiterBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use decision::{Decision, RateLimitHeaders};
pub use fixed_window::FixedWindowState;
pub use limiter::RateLimiter;
pub use registry::LimiterRegistry;
pub use rules::{AlgorithmKind, LimitRule, LimiterConfig, RulesConfig, TimeUnit};
pub use sliding_window::SlidingWindowState;
pub use store::StateStore;
pub use sweeper::{spawn_sweeper, SweeperConfig, SweeperHandle};
pub use token_bucket::TokenBucketState;
