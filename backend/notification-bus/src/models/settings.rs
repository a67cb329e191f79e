use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Messaging preferences persisted under the `settings` key
///
/// Fields missing from stored JSON take their defaults, so older blobs keep
/// loading after new switches are added.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct MessagingSettings {
    /// Gate for [`Notifier`](crate::services::Notifier)
    pub enable_notifications: bool,
    pub dark_mode: bool,
    pub show_typing_indicator: bool,
    pub show_reactions: bool,
    pub auto_scroll: bool,
    pub show_deleted_messages: bool,
}

impl Default for MessagingSettings {
    fn default() -> Self {
        Self {
            enable_notifications: true,
            dark_mode: false,
            show_typing_indicator: true,
            show_reactions: true,
            auto_scroll: true,
            show_deleted_messages: false,
        }
    }
}

/// Names of the switches in [`MessagingSettings`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    EnableNotifications,
    DarkMode,
    ShowTypingIndicator,
    ShowReactions,
    AutoScroll,
    ShowDeletedMessages,
}

impl SettingKey {
    pub const ALL: [SettingKey; 6] = [
        SettingKey::EnableNotifications,
        SettingKey::DarkMode,
        SettingKey::ShowTypingIndicator,
        SettingKey::ShowReactions,
        SettingKey::AutoScroll,
        SettingKey::ShowDeletedMessages,
    ];

    /// Name used in the persisted JSON
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::EnableNotifications => "enableNotifications",
            SettingKey::DarkMode => "darkMode",
            SettingKey::ShowTypingIndicator => "showTypingIndicator",
            SettingKey::ShowReactions => "showReactions",
            SettingKey::AutoScroll => "autoScroll",
            SettingKey::ShowDeletedMessages => "showDeletedMessages",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = String;

    /// Accepts the camelCase JSON name as well as snake_case and kebab-case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();

        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str().to_ascii_lowercase() == folded)
            .ok_or_else(|| format!("unknown setting '{}'", s))
    }
}

impl MessagingSettings {
    pub fn get(&self, key: SettingKey) -> bool {
        match key {
            SettingKey::EnableNotifications => self.enable_notifications,
            SettingKey::DarkMode => self.dark_mode,
            SettingKey::ShowTypingIndicator => self.show_typing_indicator,
            SettingKey::ShowReactions => self.show_reactions,
            SettingKey::AutoScroll => self.auto_scroll,
            SettingKey::ShowDeletedMessages => self.show_deleted_messages,
        }
    }

    fn slot(&mut self, key: SettingKey) -> &mut bool {
        match key {
            SettingKey::EnableNotifications => &mut self.enable_notifications,
            SettingKey::DarkMode => &mut self.dark_mode,
            SettingKey::ShowTypingIndicator => &mut self.show_typing_indicator,
            SettingKey::ShowReactions => &mut self.show_reactions,
            SettingKey::AutoScroll => &mut self.auto_scroll,
            SettingKey::ShowDeletedMessages => &mut self.show_deleted_messages,
        }
    }

    /// Flip one switch and return its new value
    pub fn toggle(&mut self, key: SettingKey) -> bool {
        let slot = self.slot(key);
        *slot = !*slot;
        *slot
    }

    pub fn iter(&self) -> impl Iterator<Item = (SettingKey, bool)> + '_ {
        SettingKey::ALL.into_iter().map(move |key| (key, self.get(key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = MessagingSettings::default();
        assert!(s.enable_notifications);
        assert!(!s.dark_mode);
        assert!(s.show_typing_indicator);
        assert!(s.show_reactions);
        assert!(s.auto_scroll);
        assert!(!s.show_deleted_messages);
    }

    #[test]
    fn test_toggle_flips_only_one_field() {
        let mut s = MessagingSettings::default();
        assert!(s.toggle(SettingKey::DarkMode));
        assert!(s.dark_mode);
        assert_eq!(
            s.iter().filter(|(_, on)| *on).count(),
            MessagingSettings::default().iter().filter(|(_, on)| *on).count() + 1
        );
        assert!(!s.toggle(SettingKey::DarkMode));
        assert_eq!(s, MessagingSettings::default());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let s: MessagingSettings = serde_json::from_str(r#"{"darkMode":true}"#).unwrap();
        assert!(s.dark_mode);
        assert!(s.enable_notifications);
        assert!(!s.show_deleted_messages);
    }

    #[test]
    fn test_json_uses_camel_case() {
        let json = serde_json::to_value(MessagingSettings::default()).unwrap();
        for key in SettingKey::ALL {
            assert!(json.get(key.as_str()).is_some(), "missing {}", key);
        }
    }

    #[test]
    fn test_key_parsing() {
        assert_eq!("darkMode".parse::<SettingKey>(), Ok(SettingKey::DarkMode));
        assert_eq!("auto_scroll".parse::<SettingKey>(), Ok(SettingKey::AutoScroll));
        assert_eq!(
            "show-deleted-messages".parse::<SettingKey>(),
            Ok(SettingKey::ShowDeletedMessages)
        );
        assert!("fontSize".parse::<SettingKey>().is_err());
    }
}
