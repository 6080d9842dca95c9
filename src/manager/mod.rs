//! Facade and component wiring.

pub mod service;

pub use service::{
    ComponentRegistry, ManagerConfig, ManagerMetrics, NotificationManager, ServiceStatus,
};
