use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Value of the `__type` key that marks a plugin object in a snapshot.
pub const PLUGIN_TYPE_TAG: &str = "Plugin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[serde(alias = "say")]
    Note,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedString {
    #[serde(rename = "str")]
    pub text: String,
    #[serde(default)]
    pub lang: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, deserialize_with = "lenient_list")]
    pub content: Vec<LocalizedString>,
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTag {
    pub name: String,
    #[serde(default)]
    pub condition: Option<String>,
}

/// Plugin fields as the sorting engine reports them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPlugin {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_empty: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_master: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub loads_bsa: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub crc: u32,
    #[serde(default)]
    pub masterlist: Option<Map<String, Value>>,
    #[serde(default)]
    pub userlist: Option<Map<String, Value>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mod_priority: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_global_priority: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_dirty: bool,
    #[serde(default, deserialize_with = "lenient_list")]
    pub tags: Vec<RawTag>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub messages: Vec<RawMessage>,
}

/// A message flattened for display: only the first localized string is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub kind: MessageType,
    pub content: String,
    pub condition: Option<String>,
    pub hidden: bool,
}

impl Message {
    pub fn from_raw(raw: RawMessage) -> Self {
        let content = raw
            .content
            .into_iter()
            .next()
            .map(|first| first.text)
            .unwrap_or_default();
        Self {
            kind: raw.kind,
            content,
            condition: raw.condition,
            hidden: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagSummary {
    pub added: String,
    pub removed: String,
}

/// Presentation state that is never persisted or synchronized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardState {
    pub menu_open: bool,
    pub editor_open: bool,
    pub search_result: bool,
    pub version_hidden: bool,
    pub crc_hidden: bool,
    pub tags_hidden: bool,
}

/// One plugin in the load order.
///
/// `messages` and `is_dirty` feed the session counters, so they are only
/// replaced through [`crate::sync::apply_update`]. The display strings are
/// computed when the backing field is set and read back without work.
#[derive(Debug, Clone)]
pub struct PluginRecord {
    pub name: String,
    pub id: String,
    pub version: String,
    pub is_active: bool,
    pub is_empty: bool,
    pub is_master: bool,
    pub loads_bsa: bool,
    pub masterlist: Option<Map<String, Value>>,
    pub userlist: Option<Map<String, Value>>,
    pub is_global_priority: bool,
    pub card: CardState,
    pub(crate) mod_priority: i32,
    pub(crate) priority_display: String,
    pub(crate) crc: u32,
    pub(crate) crc_display: String,
    pub(crate) tags: Vec<RawTag>,
    pub(crate) tag_summary: TagSummary,
    pub(crate) messages: Vec<Message>,
    pub(crate) is_dirty: bool,
}

impl PluginRecord {
    /// Builds a record with every derived view filled in. The caller is
    /// responsible for rejecting a snapshot entry without a name.
    pub fn new(name: String, raw: RawPlugin) -> Self {
        let id = plugin_id(&name);
        let crc_display = format_crc(raw.crc);
        let priority_display = format_priority(raw.mod_priority);
        let tag_summary = resolve_tags(&raw.tags);
        let messages = raw.messages.into_iter().map(Message::from_raw).collect();
        Self {
            name,
            id,
            version: raw.version,
            is_active: raw.is_active,
            is_empty: raw.is_empty,
            is_master: raw.is_master,
            loads_bsa: raw.loads_bsa,
            masterlist: raw.masterlist,
            userlist: raw.userlist,
            is_global_priority: raw.is_global_priority,
            card: CardState::default(),
            mod_priority: raw.mod_priority,
            priority_display,
            crc: raw.crc,
            crc_display,
            tags: raw.tags,
            tag_summary,
            messages,
            is_dirty: raw.is_dirty,
        }
    }

    pub fn crc(&self) -> u32 {
        self.crc
    }

    pub fn crc_display(&self) -> &str {
        &self.crc_display
    }

    pub fn mod_priority(&self) -> i32 {
        self.mod_priority
    }

    pub fn priority_display(&self) -> &str {
        &self.priority_display
    }

    pub fn tags(&self) -> &[RawTag] {
        &self.tags
    }

    pub fn tags_added(&self) -> &str {
        &self.tag_summary.added
    }

    pub fn tags_removed(&self) -> &str {
        &self.tag_summary.removed
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The display flag is the only part of a message that may change
    /// outside the synchronizer. Returns false for an index past the end.
    pub fn set_message_hidden(&mut self, index: usize, hidden: bool) -> bool {
        match self.messages.get_mut(index) {
            Some(message) => {
                message.hidden = hidden;
                true
            }
            None => false,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn has_user_edits(&self) -> bool {
        self.userlist
            .as_ref()
            .map(|userlist| userlist.len() > 1)
            .unwrap_or(false)
    }

    /// Search-bar match. Fields hidden by the display toggles and messages
    /// hidden by the message filters are not searched.
    pub fn is_visible(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let contains = |value: &str| value.to_lowercase().contains(&needle);

        if contains(&self.name)
            || (!self.card.version_hidden && contains(&self.version))
            || (!self.card.crc_hidden && contains(&self.crc_display))
        {
            return true;
        }
        if !self.card.tags_hidden
            && (contains(&self.tag_summary.added) || contains(&self.tag_summary.removed))
        {
            return true;
        }
        self.messages
            .iter()
            .any(|message| !message.hidden && contains(&message.content))
    }
}

pub fn plugin_id(name: &str) -> String {
    name.chars().filter(|ch| !ch.is_whitespace()).collect()
}

pub fn format_crc(crc: u32) -> String {
    if crc == 0 {
        return String::new();
    }
    let hex = format!("{crc:08X}");
    hex[hex.len() - 8..].to_string()
}

pub fn format_priority(priority: i32) -> String {
    if priority == 0 {
        String::new()
    } else {
        priority.to_string()
    }
}

/// Splits tag directives into added and removed display strings. A name that
/// is both added and removed (ignoring case) only shows as removed.
pub fn resolve_tags(tags: &[RawTag]) -> TagSummary {
    let mut added: Vec<&str> = Vec::new();
    let mut removed: Vec<&str> = Vec::new();
    for tag in tags {
        match tag.name.strip_prefix('-') {
            Some(name) => removed.push(name),
            None => added.push(&tag.name),
        }
    }

    let removed_lower: Vec<String> = removed.iter().map(|name| name.to_lowercase()).collect();
    added.retain(|name| !removed_lower.contains(&name.to_lowercase()));

    TagSummary {
        added: added.join(", "),
        removed: removed.join(", "),
    }
}

/// Reads a list, dropping entries that do not match `T` and treating anything
/// that is not an array as empty.
pub(crate) fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let Some(Value::Array(items)) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
