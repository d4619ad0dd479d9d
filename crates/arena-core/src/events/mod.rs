//! Notification type model

mod notification;

pub use notification::Notification;
