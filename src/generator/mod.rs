//! Automatic notification generation from application events.

pub mod deep_link;
pub mod engine;
pub mod throttle;

pub use deep_link::deep_link_for;
pub use engine::{dynamic_priority, GenerationStats, NotificationGenerator};
pub use throttle::ThrottleTracker;
