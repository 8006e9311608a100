use crate::{
    counters::{AggregateCounters, MessageTally},
    plugin::{format_crc, format_priority, resolve_tags, Message, PluginRecord, RawMessage, RawTag},
};

/// A change to one of the two fields the dashboard counters observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Messages { old: MessageTally, new: MessageTally },
    Dirty { is_dirty: bool },
}

/// Whole-field replacements applied to one record as a single batch.
#[derive(Debug, Clone, Default)]
pub struct PluginUpdate {
    pub version: Option<String>,
    pub crc: Option<u32>,
    pub is_empty: Option<bool>,
    pub mod_priority: Option<i32>,
    pub tags: Option<Vec<RawTag>>,
    pub messages: Option<Vec<RawMessage>>,
    pub is_dirty: Option<bool>,
}

impl PluginUpdate {
    pub fn is_empty(&self) -> bool {
        self.version.is_none()
            && self.crc.is_none()
            && self.is_empty.is_none()
            && self.mod_priority.is_none()
            && self.tags.is_none()
            && self.messages.is_none()
            && self.is_dirty.is_none()
    }
}

/// Applies `update` to `record`, recomputes the display strings of every
/// replaced backing field and feeds the observed changes to `counters`.
///
/// A `messages` replacement is always reported, even with equal content. An
/// `is_dirty` replacement is only reported when the value actually flips;
/// the counter side moves by one per report without looking at the old value.
pub fn apply_update(
    record: &mut PluginRecord,
    update: PluginUpdate,
    counters: &mut AggregateCounters,
) -> Vec<Change> {
    let mut changes = Vec::new();

    if let Some(version) = update.version {
        record.version = version;
    }
    if let Some(is_empty) = update.is_empty {
        record.is_empty = is_empty;
    }
    if let Some(crc) = update.crc {
        record.crc = crc;
        record.crc_display = format_crc(crc);
    }
    if let Some(priority) = update.mod_priority {
        record.mod_priority = priority;
        record.priority_display = format_priority(priority);
    }
    if let Some(tags) = update.tags {
        record.tag_summary = resolve_tags(&tags);
        record.tags = tags;
    }
    if let Some(messages) = update.messages {
        let old = MessageTally::of(&record.messages);
        record.messages = messages.into_iter().map(Message::from_raw).collect();
        let new = MessageTally::of(&record.messages);
        changes.push(Change::Messages { old, new });
    }
    if let Some(is_dirty) = update.is_dirty {
        if record.is_dirty != is_dirty {
            record.is_dirty = is_dirty;
            changes.push(Change::Dirty { is_dirty });
        }
    }

    for change in &changes {
        counters.apply(change);
    }
    if !changes.is_empty() {
        tracing::debug!(plugin = %record.name, changes = changes.len(), "plugin counters synced");
    }
    changes
}
