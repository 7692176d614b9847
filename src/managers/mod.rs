// Managers Module
//
// Focused manager classes owned by the bridge handle.
//
// - NotificationHub: broadcast fan-out of relay notifications to listeners

pub mod notification_manager;

pub use notification_manager::{
    ListenerId, LogListener, NotificationChannel, NotificationHub, NotificationListener,
    NotificationMessage, NotificationStats,
};
