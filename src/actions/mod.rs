//! Notification action dispatch.

pub mod registry;

pub use registry::{
    ActionContext, ActionExecution, ActionHandler, ActionRegistry, ActionResult,
};
