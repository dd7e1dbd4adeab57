//! Push notification delivery
//!
//! Outbound: the gateway client exchanges a service credential for a
//! bearer token and performs one independent push call per recipient
//! token. Inbound: the device inbox feeds received pushes through the
//! per-organization notification batcher.

pub mod batcher;
pub mod gateway;
pub mod inbox;

pub use batcher::{NotificationBatcher, NotificationSink, PushPayload, TerminalSink};
pub use gateway::{fan_out, DeliveryFailure, FanoutReport, PushData, PushError, PushGatewayClient, PushSender};
