pub mod client_view;
pub mod messages;

pub use client_view::{ClientMatchView, ViewOutcome};
pub use messages::{InboundMessage, SnapshotReason, ViewerMessage};
