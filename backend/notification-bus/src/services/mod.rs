pub mod fanout;
pub mod notification_bus;
pub mod notifier;
pub mod observer;
pub mod settings_store;
pub mod storage;

pub use fanout::{remote_unread_feed, BusEvent, CrossProcessBroadcast, FanOut};
pub use notification_bus::NotificationBus;
pub use notifier::Notifier;
pub use observer::{NotificationObserver, NotificationView, UnreadBadge};
pub use settings_store::SettingsStore;
pub use storage::{FileStorage, MemoryStorage, RedisStorage, Storage, StorageEvent};
