pub mod notification;
pub mod settings;
pub mod time;

pub use notification::{
    most_recent, next_id, unread_count, Notification, NotificationList, NotificationSnapshot,
    NotificationType, UnreadMessage,
};
pub use settings::{MessagingSettings, SettingKey};
pub use time::{parse_timestamp_millis, relative_time};
