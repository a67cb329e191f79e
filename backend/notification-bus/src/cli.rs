use clap::{Parser, Subcommand};
use notification_bus::{NotificationType, SettingKey};

/// Local notification bus: publish, read and watch notifications shared
/// between processes
#[derive(Parser)]
#[command(name = "notification-bus", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Publish a notification
    Publish {
        message: String,
        /// info, success, warning or error
        #[arg(long = "type", short = 't', default_value = "info")]
        kind: NotificationType,
    },

    /// Print every stored notification, newest first
    List,

    /// Print the unread count and the most recent notifications
    Recent,

    /// Mark every notification read
    ReadAll,

    /// Mark one notification read
    Read { id: i64 },

    /// Delete every notification
    Clear,

    /// Print Prometheus metrics for this run
    Metrics,

    /// Follow the notification list until Ctrl-C
    Watch,

    /// Messaging preferences
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Print every switch
    Show,
    /// Flip one switch
    Toggle { key: SettingKey },
}
