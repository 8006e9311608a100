use crate::{
    plugin::{Message, MessageType, PluginRecord},
    sync::Change,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MessageTally {
    pub total: usize,
    pub warnings: usize,
    pub errors: usize,
}

impl MessageTally {
    pub fn of(messages: &[Message]) -> Self {
        let mut tally = MessageTally {
            total: messages.len(),
            ..MessageTally::default()
        };
        for message in messages {
            match message.kind {
                MessageType::Warn => tally.warnings += 1,
                MessageType::Error => tally.errors += 1,
                MessageType::Note => {}
            }
        }
        tally
    }
}

/// Dashboard totals for the whole load order.
///
/// Owned by the session and only written through [`AggregateCounters::apply`]
/// while no filter pass is running. `filtered_total_messages` follows the
/// message deltas between passes and is only exact right after
/// [`AggregateCounters::reconcile_filtered`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateCounters {
    pub filtered_total_messages: usize,
    pub total_messages: usize,
    pub total_warnings: usize,
    pub total_errors: usize,
    pub dirty_plugin_count: usize,
}

impl AggregateCounters {
    pub fn from_plugins(plugins: &[PluginRecord]) -> Self {
        let mut counters = AggregateCounters::default();
        for plugin in plugins {
            let tally = MessageTally::of(plugin.messages());
            counters.total_messages += tally.total;
            counters.total_warnings += tally.warnings;
            counters.total_errors += tally.errors;
            if plugin.is_dirty() {
                counters.dirty_plugin_count += 1;
            }
        }
        counters.filtered_total_messages = counters.total_messages;
        counters
    }

    pub fn apply(&mut self, change: &Change) {
        match change {
            Change::Messages { old, new } => {
                shift(
                    &mut self.filtered_total_messages,
                    new.total,
                    old.total,
                    "filtered_total_messages",
                );
                shift(&mut self.total_messages, new.total, old.total, "total_messages");
                shift(
                    &mut self.total_warnings,
                    new.warnings,
                    old.warnings,
                    "total_warnings",
                );
                shift(&mut self.total_errors, new.errors, old.errors, "total_errors");
            }
            Change::Dirty { is_dirty: true } => {
                self.dirty_plugin_count += 1;
            }
            Change::Dirty { is_dirty: false } => {
                shift(&mut self.dirty_plugin_count, 0, 1, "dirty_plugin_count");
            }
        }
    }

    /// Resets the advisory filtered total after a full filter pass.
    pub fn reconcile_filtered(&mut self, hidden_message_no: usize) {
        self.filtered_total_messages = self.total_messages.saturating_sub(hidden_message_no);
    }
}

fn shift(value: &mut usize, add: usize, sub: usize, label: &str) {
    let raised = *value + add;
    if raised < sub {
        tracing::warn!(counter = label, value = *value, add, sub, "counter underflow clamped");
    }
    *value = raised.saturating_sub(sub);
}
