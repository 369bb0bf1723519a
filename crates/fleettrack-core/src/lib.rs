//! Core types for the FleetTrack real-time courier tracking service.
//!
//! This crate holds the domain model shared by every other crate in the
//! workspace: position samples and deliveries, the error taxonomy, and the
//! layered configuration system. It deliberately contains no I/O.

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{Result, TrackerError};
pub use types::{
    ActiveDelivery, ConnectionId, ConnectionMeta, ConnectionRecord, DeliveryStatus, DriverId,
    GeoPoint, NearbyDriver, OrderId, PositionSample, PositionUpdate,
};
