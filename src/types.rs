//! Common type definitions used throughout the botdata library
//!
//! This module provides the conversation address, the store partitions, the
//! physical key derived from them, and the persisted record itself.

use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// ETag value meaning "overwrite regardless of the current version"
pub const WILDCARD_ETAG: &str = "*";

/// Identifies the conversation-state record a bot is working with
///
/// Which of the ids must be present depends on the [`StoreType`] the address
/// is used with; `channel_id` is always required.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub bot_id: String,
    pub channel_id: String,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub service_url: String,
}

impl Address {
    /// Create an address for a bot on a channel
    pub fn new(bot_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            bot_id: bot_id.into(),
            channel_id: channel_id.into(),
            ..Self::default()
        }
    }

    /// Set the conversation id
    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = conversation_id.into();
        self
    }

    /// Set the user id
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Set the service URL the channel connector lives at
    pub fn with_service_url(mut self, service_url: impl Into<String>) -> Self {
        self.service_url = service_url.into();
        self
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.bot_id, self.channel_id, self.conversation_id, self.user_id
        )
    }
}

/// The three logical partitions of bot state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreType {
    /// Scoped by (channel, user)
    UserData,
    /// Scoped by (channel, conversation)
    ConversationData,
    /// Scoped by (channel, conversation, user)
    PrivateConversationData,
}

impl StoreType {
    /// All store types, in declaration order
    pub const ALL: [StoreType; 3] = [
        StoreType::UserData,
        StoreType::ConversationData,
        StoreType::PrivateConversationData,
    ];
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreType::UserData => "user",
            StoreType::ConversationData => "conversation",
            StoreType::PrivateConversationData => "private_conversation",
        };
        f.write_str(name)
    }
}

/// Physical (partition, row) key of a record
///
/// Every backend derives the same key for the same address and store type, so
/// records written by one backend can be located by another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub partition_key: String,
    pub row_key: String,
}

impl EntityKey {
    /// Row key used for user-scoped records
    pub const USER_ROW: &'static str = "user";
    /// Row key used for conversation-scoped records
    pub const CONVERSATION_ROW: &'static str = "conversation";

    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
        }
    }

    /// Derive the key for `address` under `store_type`
    ///
    /// Fails with [`StorageError::InvalidAddress`] when an id the store type is
    /// scoped by is missing.
    pub fn derive(address: &Address, store_type: StoreType) -> StorageResult<Self> {
        require(&address.channel_id, "channelId", store_type)?;
        match store_type {
            StoreType::UserData => {
                require(&address.user_id, "userId", store_type)?;
                Ok(Self::new(&address.user_id, Self::USER_ROW))
            }
            StoreType::ConversationData => {
                require(&address.conversation_id, "conversationId", store_type)?;
                Ok(Self::new(&address.conversation_id, Self::CONVERSATION_ROW))
            }
            StoreType::PrivateConversationData => {
                require(&address.conversation_id, "conversationId", store_type)?;
                require(&address.user_id, "userId", store_type)?;
                Ok(Self::new(&address.conversation_id, &address.user_id))
            }
        }
    }
}

fn require(value: &str, field: &str, store_type: StoreType) -> StorageResult<()> {
    if value.is_empty() {
        return Err(StorageError::InvalidAddress(format!(
            "{field} is required for {store_type} data"
        )));
    }
    Ok(())
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition_key, self.row_key)
    }
}

/// How a save must be applied, decoded from the record's eTag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveCondition {
    /// Empty eTag: the record must not exist yet
    Create,
    /// `"*"`: write or delete whatever is currently stored
    Overwrite,
    /// Any other eTag: the stored version must match exactly
    IfMatch(String),
}

/// One persisted record of bot state
///
/// `data == None` means "no record" on load and "delete" on save.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BotData {
    #[serde(rename = "eTag", default)]
    pub etag: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl BotData {
    /// The record returned when nothing is stored
    pub fn empty() -> Self {
        Self::default()
    }

    /// JSON `null` is normalized to `None`
    pub fn new(etag: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            etag: etag.into(),
            data: data.filter(|value| !value.is_null()),
        }
    }

    /// A record that will be saved unconditionally
    pub fn wildcard(data: Option<Value>) -> Self {
        Self::new(WILDCARD_ETAG, data)
    }

    /// True when this is the "nothing stored" record
    pub fn is_empty(&self) -> bool {
        self.etag.is_empty() && self.payload().is_none()
    }

    /// The payload to persist, or `None` when the record is to be deleted
    ///
    /// `Some(Value::Null)` set directly on `data` counts as no payload.
    pub fn payload(&self) -> Option<&Value> {
        self.data.as_ref().filter(|value| !value.is_null())
    }

    /// Owned form of [`BotData::payload`]
    pub fn into_payload(self) -> Option<Value> {
        self.data.filter(|value| !value.is_null())
    }

    pub fn condition(&self) -> SaveCondition {
        match self.etag.as_str() {
            "" => SaveCondition::Create,
            WILDCARD_ETAG => SaveCondition::Overwrite,
            etag => SaveCondition::IfMatch(etag.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn address() -> Address {
        Address::new("B1", "test")
            .with_conversation("C1")
            .with_user("U1")
    }

    #[test]
    fn test_private_conversation_key() {
        let key = EntityKey::derive(&address(), StoreType::PrivateConversationData).unwrap();
        assert_eq!(key, EntityKey::new("C1", "U1"));
    }

    #[test]
    fn test_user_and_conversation_keys() {
        let user = EntityKey::derive(&address(), StoreType::UserData).unwrap();
        assert_eq!(user, EntityKey::new("U1", "user"));

        let conversation = EntityKey::derive(&address(), StoreType::ConversationData).unwrap();
        assert_eq!(conversation, EntityKey::new("C1", "conversation"));
    }

    #[test]
    fn test_key_derivation_is_deterministic() {
        let addresses = [
            address(),
            Address::new("bot", "slack").with_user("only-user"),
            Address::new("bot", "emulator").with_conversation("only-conversation"),
        ];
        for address in &addresses {
            for store_type in StoreType::ALL {
                let first = EntityKey::derive(address, store_type);
                let second = EntityKey::derive(&address.clone(), store_type);
                assert_eq!(first.ok(), second.ok());
            }
        }
    }

    #[test]
    fn test_missing_ids_rejected() {
        let user_only = Address::new("bot", "test").with_user("U1");
        assert!(EntityKey::derive(&user_only, StoreType::UserData).is_ok());
        assert!(matches!(
            EntityKey::derive(&user_only, StoreType::ConversationData),
            Err(StorageError::InvalidAddress(_))
        ));
        assert!(matches!(
            EntityKey::derive(&user_only, StoreType::PrivateConversationData),
            Err(StorageError::InvalidAddress(_))
        ));

        let no_channel = Address::new("bot", "").with_user("U1");
        assert!(EntityKey::derive(&no_channel, StoreType::UserData).is_err());
    }

    #[test]
    fn test_save_condition_from_etag() {
        assert_eq!(BotData::empty().condition(), SaveCondition::Create);
        assert_eq!(BotData::wildcard(None).condition(), SaveCondition::Overwrite);
        assert_eq!(
            BotData::new("abc", None).condition(),
            SaveCondition::IfMatch("abc".to_string())
        );
    }

    #[test]
    fn test_bot_data_wire_shape() {
        let data = BotData::new("E1", Some(json!({"Store": "source", "Value": 5})));
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["eTag"], "E1");
        assert_eq!(json["data"]["Value"], 5);

        let parsed: BotData = serde_json::from_str("{}").unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_null_payload_means_no_record() {
        let data = BotData::wildcard(Some(Value::Null));
        assert_eq!(data.data, None);

        let mut raw = BotData::new("E1", Some(json!(1)));
        raw.data = Some(Value::Null);
        assert_eq!(raw.payload(), None);
        assert_eq!(raw.clone().into_payload(), None);

        let empty = BotData {
            etag: String::new(),
            data: Some(Value::Null),
        };
        assert!(empty.is_empty());

        let wire = serde_json::to_string(&BotData::new("E1", Some(Value::Null))).unwrap();
        let parsed: BotData = serde_json::from_str(&wire).unwrap();
        assert_eq!(parsed, BotData::new("E1", None));
    }

    #[test]
    fn test_address_serde_names() {
        let json = serde_json::to_value(address()).unwrap();
        assert_eq!(json["botId"], "B1");
        assert_eq!(json["channelId"], "test");
        assert_eq!(json["conversationId"], "C1");
        assert_eq!(json["userId"], "U1");
    }
}
