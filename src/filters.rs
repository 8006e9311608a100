use crate::plugin::{Message, MessageType, PluginRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const DEFAULT_DO_NOT_CLEAN_PHRASE: &str = "Do not clean";

/// Names of the plugins the conflict filter lets through.
pub type ConflictSet = HashSet<String>;

/// Persisted toggle block. Key names match the settings file written by
/// earlier releases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSettings {
    pub hide_messageless_plugins: bool,
    pub hide_inactive_plugins: bool,
    pub hide_notes: bool,
    pub hide_do_not_clean_messages: bool,
    pub hide_all_plugin_messages: bool,
    pub hide_version_numbers: bool,
    #[serde(rename = "hideCRCs")]
    pub hide_crcs: bool,
    pub hide_bash_tags: bool,
}

impl FilterSettings {
    /// True when one of the toggles that changes which plugins or messages
    /// are shown is on.
    pub fn any_content_filter(&self) -> bool {
        self.hide_messageless_plugins
            || self.hide_inactive_plugins
            || self.hide_notes
            || self.hide_do_not_clean_messages
            || self.hide_all_plugin_messages
    }

    pub fn get(&self, toggle: FilterToggle) -> bool {
        match toggle {
            FilterToggle::HideMessageless => self.hide_messageless_plugins,
            FilterToggle::HideInactive => self.hide_inactive_plugins,
            FilterToggle::HideNotes => self.hide_notes,
            FilterToggle::HideDoNotClean => self.hide_do_not_clean_messages,
            FilterToggle::HideAllMessages => self.hide_all_plugin_messages,
            FilterToggle::HideVersions => self.hide_version_numbers,
            FilterToggle::HideCrcs => self.hide_crcs,
            FilterToggle::HideBashTags => self.hide_bash_tags,
        }
    }

    pub fn set(&mut self, toggle: FilterToggle, value: bool) {
        let slot = match toggle {
            FilterToggle::HideMessageless => &mut self.hide_messageless_plugins,
            FilterToggle::HideInactive => &mut self.hide_inactive_plugins,
            FilterToggle::HideNotes => &mut self.hide_notes,
            FilterToggle::HideDoNotClean => &mut self.hide_do_not_clean_messages,
            FilterToggle::HideAllMessages => &mut self.hide_all_plugin_messages,
            FilterToggle::HideVersions => &mut self.hide_version_numbers,
            FilterToggle::HideCrcs => &mut self.hide_crcs,
            FilterToggle::HideBashTags => &mut self.hide_bash_tags,
        };
        *slot = value;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterToggle {
    HideMessageless,
    HideInactive,
    HideNotes,
    HideDoNotClean,
    HideAllMessages,
    HideVersions,
    HideCrcs,
    HideBashTags,
}

impl FilterToggle {
    pub const ALL: [FilterToggle; 8] = [
        FilterToggle::HideMessageless,
        FilterToggle::HideInactive,
        FilterToggle::HideNotes,
        FilterToggle::HideDoNotClean,
        FilterToggle::HideAllMessages,
        FilterToggle::HideVersions,
        FilterToggle::HideCrcs,
        FilterToggle::HideBashTags,
    ];

    /// Display toggles only change what a card shows, not which cards exist.
    pub fn is_display_only(self) -> bool {
        matches!(
            self,
            FilterToggle::HideVersions | FilterToggle::HideCrcs | FilterToggle::HideBashTags
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            FilterToggle::HideMessageless => "Hide messageless plugins",
            FilterToggle::HideInactive => "Hide inactive plugins",
            FilterToggle::HideNotes => "Hide notes",
            FilterToggle::HideDoNotClean => "Hide 'Do not clean' messages",
            FilterToggle::HideAllMessages => "Hide all plugin messages",
            FilterToggle::HideVersions => "Hide version numbers",
            FilterToggle::HideCrcs => "Hide CRCs",
            FilterToggle::HideBashTags => "Hide Bash Tags",
        }
    }
}

/// Everything the predicates read. Predicates never look anywhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    pub toggles: FilterSettings,
    pub content_filter: String,
    pub conflict_plugin: Option<String>,
    pub do_not_clean_phrase: String,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            toggles: FilterSettings::default(),
            content_filter: String::new(),
            conflict_plugin: None,
            do_not_clean_phrase: DEFAULT_DO_NOT_CLEAN_PHRASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessagelessVerdict {
    pub passes: bool,
    pub hidden_messages: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    /// Indices into the plugin slice, in load order.
    pub filtered: Vec<usize>,
    pub hidden_plugin_no: usize,
    pub hidden_message_no: usize,
}

pub fn note_filter(message: &Message, state: &FilterState) -> bool {
    !state.toggles.hide_notes || message.kind != MessageType::Note
}

pub fn do_not_clean_filter(message: &Message, state: &FilterState) -> bool {
    let phrase = state.do_not_clean_phrase.as_str();
    !state.toggles.hide_do_not_clean_messages
        || phrase.is_empty()
        || !message.content.contains(phrase)
}

pub fn all_message_filter(state: &FilterState) -> bool {
    !state.toggles.hide_all_plugin_messages
}

/// Counts the plugin's messages the message filters would hide, and decides
/// whether the plugin survives the hide-messageless toggle. The count is
/// needed even when the plugin is later hidden by another predicate.
pub fn messageless_filter(plugin: &PluginRecord, state: &FilterState) -> MessagelessVerdict {
    let messages = plugin.messages();
    let hidden_messages = if all_message_filter(state) {
        messages
            .iter()
            .filter(|message| !(note_filter(message, state) && do_not_clean_filter(message, state)))
            .count()
    } else {
        messages.len()
    };
    let has_messages = hidden_messages < messages.len();

    MessagelessVerdict {
        passes: !state.toggles.hide_messageless_plugins || has_messages,
        hidden_messages,
    }
}

pub fn inactive_filter(plugin: &PluginRecord, state: &FilterState) -> bool {
    !state.toggles.hide_inactive_plugins || plugin.is_active
}

pub fn conflicts_filter(plugin: &PluginRecord, conflicts: &ConflictSet) -> bool {
    conflicts.is_empty() || conflicts.contains(&plugin.name)
}

/// Content-filter match. `needle` must already be lowercase. Unlike
/// [`PluginRecord::is_visible`] this ignores the display toggles and the
/// per-message hidden flags.
pub fn search_filter(plugin: &PluginRecord, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    let contains = |value: &str| value.to_lowercase().contains(needle);

    contains(&plugin.name)
        || contains(plugin.crc_display())
        || contains(&plugin.version)
        || contains(plugin.tags_added())
        || contains(plugin.tags_removed())
        || plugin
            .messages()
            .iter()
            .any(|message| contains(&message.content))
}

/// Runs the plugin predicates in their fixed order over a collection.
pub struct FilterPipeline<'a> {
    state: &'a FilterState,
    conflicts: &'a ConflictSet,
}

impl<'a> FilterPipeline<'a> {
    pub fn new(state: &'a FilterState, conflicts: &'a ConflictSet) -> Self {
        Self { state, conflicts }
    }

    pub fn run(&self, plugins: &[PluginRecord]) -> FilterOutcome {
        let needle = self.state.content_filter.to_lowercase();
        let mut outcome = FilterOutcome::default();

        for (index, plugin) in plugins.iter().enumerate() {
            let verdict = messageless_filter(plugin, self.state);
            outcome.hidden_message_no += verdict.hidden_messages;

            if verdict.passes
                && inactive_filter(plugin, self.state)
                && conflicts_filter(plugin, self.conflicts)
                && search_filter(plugin, &needle)
            {
                outcome.filtered.push(index);
            } else {
                outcome.hidden_plugin_no += 1;
            }
        }

        outcome
    }
}

/// Marks each message's `hidden` flag for display. With every message hidden
/// by the all-messages toggle, all flags are set. Nothing else on the record
/// changes.
pub fn apply_message_filters(plugin: &mut PluginRecord, state: &FilterState) {
    let show_any = all_message_filter(state);
    let hidden: Vec<bool> = plugin
        .messages()
        .iter()
        .map(|message| {
            !show_any || !(note_filter(message, state) && do_not_clean_filter(message, state))
        })
        .collect();
    for (index, hidden) in hidden.into_iter().enumerate() {
        plugin.set_message_hidden(index, hidden);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::MessageTally;
    use crate::plugin::{RawPlugin, RawTag};

    fn message(kind: MessageType, content: &str) -> Message {
        Message {
            kind,
            content: content.to_string(),
            condition: None,
            hidden: false,
        }
    }

    fn plugin(name: &str, active: bool, messages: Vec<Message>) -> PluginRecord {
        let mut record = PluginRecord::new(
            name.to_string(),
            RawPlugin {
                is_active: active,
                version: "1.0".to_string(),
                crc: 0x1234_abcd,
                tags: vec![RawTag {
                    name: "Relev".to_string(),
                    condition: None,
                }],
                ..RawPlugin::default()
            },
        );
        record.messages = messages;
        record
    }

    fn state_with(toggles: FilterSettings) -> FilterState {
        FilterState {
            toggles,
            ..FilterState::default()
        }
    }

    #[test]
    fn note_filter_only_applies_when_toggled() {
        let note = message(MessageType::Note, "hello");
        let warn = message(MessageType::Warn, "hello");
        let off = FilterState::default();
        assert!(note_filter(&note, &off));

        let on = state_with(FilterSettings {
            hide_notes: true,
            ..FilterSettings::default()
        });
        assert!(!note_filter(&note, &on));
        assert!(note_filter(&warn, &on));
    }

    #[test]
    fn do_not_clean_filter_uses_configured_phrase() {
        let mut state = state_with(FilterSettings {
            hide_do_not_clean_messages: true,
            ..FilterSettings::default()
        });
        let english = message(MessageType::Warn, "Do not clean ITM records here.");
        assert!(!do_not_clean_filter(&english, &state));

        state.do_not_clean_phrase = "Nicht säubern".to_string();
        assert!(do_not_clean_filter(&english, &state));
        let german = message(MessageType::Warn, "Nicht säubern!");
        assert!(!do_not_clean_filter(&german, &state));
    }

    #[test]
    fn hidden_notes_still_count_when_plugin_is_hidden() {
        let plugins = vec![plugin(
            "Notes.esp",
            true,
            vec![message(MessageType::Note, "just a note")],
        )];
        let state = state_with(FilterSettings {
            hide_messageless_plugins: true,
            hide_notes: true,
            ..FilterSettings::default()
        });
        let conflicts = ConflictSet::new();
        let outcome = FilterPipeline::new(&state, &conflicts).run(&plugins);
        assert!(outcome.filtered.is_empty());
        assert_eq!(outcome.hidden_plugin_no, 1);
        assert_eq!(outcome.hidden_message_no, 1);
    }

    #[test]
    fn hidden_messages_count_for_plugins_hidden_by_later_filters() {
        let plugins = vec![plugin(
            "Inactive.esp",
            false,
            vec![
                message(MessageType::Note, "note"),
                message(MessageType::Warn, "warn"),
            ],
        )];
        let state = state_with(FilterSettings {
            hide_inactive_plugins: true,
            hide_notes: true,
            ..FilterSettings::default()
        });
        let conflicts = ConflictSet::new();
        let outcome = FilterPipeline::new(&state, &conflicts).run(&plugins);
        assert!(outcome.filtered.is_empty());
        assert_eq!(outcome.hidden_message_no, 1);
    }

    #[test]
    fn hide_all_messages_hides_every_message() {
        let plugins = vec![plugin(
            "A.esp",
            true,
            vec![
                message(MessageType::Warn, "w"),
                message(MessageType::Error, "e"),
            ],
        )];
        let state = state_with(FilterSettings {
            hide_all_plugin_messages: true,
            hide_messageless_plugins: true,
            ..FilterSettings::default()
        });
        let conflicts = ConflictSet::new();
        let outcome = FilterPipeline::new(&state, &conflicts).run(&plugins);
        assert_eq!(outcome.hidden_message_no, 2);
        assert_eq!(outcome.hidden_plugin_no, 1);
    }

    #[test]
    fn messageless_filter_passes_when_toggle_off() {
        let record = plugin("Empty.esp", true, Vec::new());
        let verdict = messageless_filter(&record, &FilterState::default());
        assert_eq!(
            verdict,
            MessagelessVerdict {
                passes: true,
                hidden_messages: 0
            }
        );
    }

    #[test]
    fn conflict_set_restricts_plugins() {
        let plugins = vec![
            plugin("A.esp", true, Vec::new()),
            plugin("B.esp", true, Vec::new()),
            plugin("F.esp", true, Vec::new()),
        ];
        let state = FilterState::default();
        let conflicts: ConflictSet = ["F.esp", "A.esp"].iter().map(|s| s.to_string()).collect();
        let outcome = FilterPipeline::new(&state, &conflicts).run(&plugins);
        assert_eq!(outcome.filtered, vec![0, 2]);
        assert_eq!(outcome.hidden_plugin_no, 1);
    }

    #[test]
    fn empty_needle_passes_but_other_filters_still_apply() {
        let plugins = vec![
            plugin("Active.esp", true, Vec::new()),
            plugin("Inactive.esp", false, Vec::new()),
        ];
        for plugin in &plugins {
            assert!(search_filter(plugin, ""));
        }
        let state = state_with(FilterSettings {
            hide_inactive_plugins: true,
            ..FilterSettings::default()
        });
        let conflicts = ConflictSet::new();
        let outcome = FilterPipeline::new(&state, &conflicts).run(&plugins);
        assert_eq!(outcome.filtered, vec![0]);
    }

    #[test]
    fn content_filter_matches_case_insensitively() {
        let plugins = vec![
            plugin("Alpha.esp", true, vec![message(MessageType::Warn, "Needs Bashed Patch")]),
            plugin("Beta.esp", true, Vec::new()),
        ];
        let conflicts = ConflictSet::new();
        let mut state = FilterState::default();

        state.content_filter = "BASHED".to_string();
        assert_eq!(FilterPipeline::new(&state, &conflicts).run(&plugins).filtered, vec![0]);

        state.content_filter = "1234ABCD".to_string();
        assert_eq!(
            FilterPipeline::new(&state, &conflicts).run(&plugins).filtered,
            vec![0, 1]
        );

        state.content_filter = "relev".to_string();
        assert_eq!(
            FilterPipeline::new(&state, &conflicts).run(&plugins).filtered,
            vec![0, 1]
        );

        state.content_filter = "beta".to_string();
        assert_eq!(FilterPipeline::new(&state, &conflicts).run(&plugins).filtered, vec![1]);
    }

    #[test]
    fn pipeline_is_idempotent() {
        let plugins = vec![
            plugin("A.esp", true, vec![message(MessageType::Note, "n")]),
            plugin("B.esp", false, vec![message(MessageType::Warn, "w")]),
            plugin("C.esp", true, Vec::new()),
        ];
        let state = state_with(FilterSettings {
            hide_notes: true,
            hide_messageless_plugins: true,
            ..FilterSettings::default()
        });
        let conflicts = ConflictSet::new();
        let pipeline = FilterPipeline::new(&state, &conflicts);
        let first = pipeline.run(&plugins);
        let second = pipeline.run(&plugins);
        assert_eq!(first, second);
        assert_eq!(first.filtered, vec![1]);
        assert_eq!(first.hidden_plugin_no, 2);
        assert_eq!(first.hidden_message_no, 1);
    }

    #[test]
    fn message_filters_mark_hidden_flags() {
        let mut record = plugin(
            "A.esp",
            true,
            vec![
                message(MessageType::Note, "n"),
                message(MessageType::Warn, "Do not clean this."),
                message(MessageType::Error, "broken"),
            ],
        );
        let state = state_with(FilterSettings {
            hide_notes: true,
            hide_do_not_clean_messages: true,
            ..FilterSettings::default()
        });
        apply_message_filters(&mut record, &state);
        let hidden: Vec<bool> = record.messages().iter().map(|m| m.hidden).collect();
        assert_eq!(hidden, vec![true, true, false]);

        apply_message_filters(&mut record, &FilterState::default());
        assert!(record.messages().iter().all(|m| !m.hidden));

        let all = state_with(FilterSettings {
            hide_all_plugin_messages: true,
            ..FilterSettings::default()
        });
        apply_message_filters(&mut record, &all);
        assert!(record.messages().iter().all(|m| m.hidden));
    }

    #[test]
    fn message_filters_leave_tallied_fields_alone() {
        let mut record = plugin(
            "A.esp",
            true,
            vec![
                message(MessageType::Note, "n"),
                message(MessageType::Error, "broken"),
            ],
        );
        let before = MessageTally::of(record.messages());
        let contents: Vec<String> = record.messages().iter().map(|m| m.content.clone()).collect();
        apply_message_filters(
            &mut record,
            &state_with(FilterSettings {
                hide_notes: true,
                hide_all_plugin_messages: true,
                ..FilterSettings::default()
            }),
        );
        assert_eq!(MessageTally::of(record.messages()), before);
        let after: Vec<String> = record.messages().iter().map(|m| m.content.clone()).collect();
        assert_eq!(after, contents);
    }

    #[test]
    fn settings_use_legacy_key_names() {
        let settings: FilterSettings =
            serde_json::from_str(r#"{"hideCRCs": true, "hideMessagelessPlugins": true}"#)
                .expect("settings");
        assert!(settings.hide_crcs);
        assert!(settings.hide_messageless_plugins);
        assert!(!settings.hide_notes);
        assert!(settings.any_content_filter());
    }
}
