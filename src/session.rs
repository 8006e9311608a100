use crate::{
    config::AppConfig,
    conflicts::{merge_response, ConflictEngine, ConflictMessage, ConflictResolver},
    counters::AggregateCounters,
    filters::{
        apply_message_filters, ConflictSet, FilterPipeline, FilterSettings, FilterState,
        FilterToggle,
    },
    plugin::{MessageType, PluginRecord},
    sync::{self, Change, PluginUpdate},
};
use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

const LOG_CAPACITY: usize = 300;
const CONFLICT_PROGRESS: &str = "Checking if plugins have been loaded...";

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub message: String,
    pub level: ToastLevel,
    pub expires_at: Instant,
}

/// Single owner of the plugin list and everything derived from it.
///
/// All writes to records, counters and the conflict set happen through
/// `&mut Session` on the thread that drives the UI. The engine query is the
/// only work done elsewhere; its reply is folded in by
/// [`Session::poll_conflicts`] or [`Session::wait_for_conflicts`], and the
/// filter pass that needs it runs only after that.
pub struct Session {
    pub title: String,
    pub plugins: Vec<PluginRecord>,
    pub counters: AggregateCounters,
    pub filters: FilterState,
    pub conflicts: ConflictSet,
    pub filtered: Vec<usize>,
    pub hidden_plugin_no: usize,
    pub hidden_message_no: usize,
    pub search_needle: String,
    pub progress: Option<String>,
    pub status: String,
    pub logs: VecDeque<LogEntry>,
    pub log_scroll: usize,
    pub toast: Option<Toast>,
    pub selected: usize,
    resolver: ConflictResolver,
    refresh_pending: bool,
    generation: u64,
    query_generation: u64,
}

impl Session {
    pub fn new(engine: Arc<dyn ConflictEngine>, config: &AppConfig) -> Self {
        let filters = FilterState {
            toggles: config.filters,
            do_not_clean_phrase: config.do_not_clean_phrase.clone(),
            ..FilterState::default()
        };
        Self {
            title: String::new(),
            plugins: Vec::new(),
            counters: AggregateCounters::default(),
            filters,
            conflicts: ConflictSet::new(),
            filtered: Vec::new(),
            hidden_plugin_no: 0,
            hidden_message_no: 0,
            search_needle: String::new(),
            progress: None,
            status: "Ready".to_string(),
            logs: VecDeque::new(),
            log_scroll: 0,
            toast: None,
            selected: 0,
            resolver: ConflictResolver::new(engine),
            refresh_pending: false,
            generation: 0,
            query_generation: 0,
        }
    }

    /// Replaces the whole collection, as after a rescan. Counters are
    /// tallied from the new records and the conflict filter is dropped. A
    /// reply to a query made before the rescan is discarded.
    pub fn load_plugins(&mut self, title: Option<String>, plugins: Vec<PluginRecord>) {
        self.generation = self.generation.wrapping_add(1);
        self.title = title.unwrap_or_default();
        self.plugins = plugins;
        self.counters = AggregateCounters::from_plugins(&self.plugins);
        self.filters.conflict_plugin = None;
        self.conflicts.clear();
        self.filtered = (0..self.plugins.len()).collect();
        self.hidden_plugin_no = 0;
        self.hidden_message_no = 0;
        self.selected = 0;
        self.apply_display_toggles();
        self.log_info(format!("Loaded {} plugin(s)", self.plugins.len()));
        self.set_filtered_ui_data();
    }

    pub fn restore_filter_states(&mut self, settings: &FilterSettings) {
        self.filters.toggles = *settings;
    }

    /// Re-applies restored toggles: one refresh if any content toggle is on,
    /// then the display toggles.
    pub fn apply_enabled_filters(&mut self) {
        if self.filters.toggles.any_content_filter() {
            self.set_filtered_ui_data();
        }
        self.apply_display_toggles();
    }

    pub fn filter_settings(&self) -> FilterSettings {
        self.filters.toggles
    }

    pub fn set_toggle(&mut self, toggle: FilterToggle, value: bool) {
        if self.filters.toggles.get(toggle) == value {
            return;
        }
        self.filters.toggles.set(toggle, value);
        let state = if value { "on" } else { "off" };
        self.status = format!("{}: {state}", toggle.label());
        tracing::debug!(?toggle, value, "filter toggled");
        if toggle.is_display_only() {
            self.apply_display_toggles();
        } else {
            self.set_filtered_ui_data();
        }
    }

    pub fn flip_toggle(&mut self, toggle: FilterToggle) {
        let value = !self.filters.toggles.get(toggle);
        self.set_toggle(toggle, value);
    }

    pub fn set_content_filter(&mut self, value: &str) {
        let trimmed = value.trim();
        if trimmed == self.filters.content_filter {
            return;
        }
        self.filters.content_filter = trimmed.to_string();
        if trimmed.is_empty() {
            self.log_info("Content filter cleared".to_string());
        } else {
            self.log_info(format!("Content filter set: \"{trimmed}\""));
        }
        self.set_filtered_ui_data();
    }

    /// Restricts the view to plugins conflicting with `plugin`, or lifts the
    /// restriction with `None`.
    pub fn show_only_conflicts(&mut self, plugin: Option<&str>) {
        let next = plugin.map(str::to_string);
        if next == self.filters.conflict_plugin {
            return;
        }
        self.filters.conflict_plugin = next;
        self.set_filtered_ui_data();
    }

    pub fn is_busy(&self) -> bool {
        self.resolver.is_active()
    }

    /// Recomputes the filtered view. With a conflict plugin set this first
    /// asks the engine and finishes when the reply is picked up. A request
    /// made while a query is in flight is held and replayed afterwards.
    pub fn set_filtered_ui_data(&mut self) {
        if self.resolver.is_active() {
            self.refresh_pending = true;
            return;
        }

        match self.filters.conflict_plugin.clone() {
            None => self.finish_refresh(ConflictSet::new()),
            Some(plugin) => {
                self.query_generation = self.generation;
                self.resolver.start(&plugin);
                self.progress = Some(CONFLICT_PROGRESS.to_string());
                self.status = format!("Checking conflicts for {plugin}");
            }
        }
    }

    pub fn poll_conflicts(&mut self) {
        while let Some(message) = self.resolver.poll() {
            self.handle_conflict_message(message);
        }
    }

    /// Blocks until no query is in flight, replaying any held refresh.
    pub fn wait_for_conflicts(&mut self) {
        while self.resolver.is_active() {
            match self.resolver.wait() {
                Some(message) => self.handle_conflict_message(message),
                None => break,
            }
        }
    }

    pub fn refresh_blocking(&mut self) {
        self.set_filtered_ui_data();
        self.wait_for_conflicts();
    }

    fn handle_conflict_message(&mut self, message: ConflictMessage) {
        self.progress = None;
        if self.query_generation != self.generation {
            self.log_warn(format!(
                "Dropped conflict data for {} from a previous load order",
                message.plugin()
            ));
            self.refresh_pending = false;
            self.set_filtered_ui_data();
            return;
        }

        let mut failure = None;
        let conflicts = match message {
            ConflictMessage::Completed { plugin, response } => {
                let reported = response.as_ref().map(|data| data.len()).unwrap_or(0);
                let conflicts =
                    merge_response(&mut self.plugins, &mut self.counters, &plugin, response);
                self.log_info(format!(
                    "Conflict check for {plugin}: {reported} plugin(s) reported, {} shown",
                    conflicts.len()
                ));
                conflicts
            }
            ConflictMessage::Failed { plugin, error } => {
                self.log_error(format!("Conflict check for {plugin} failed: {error}"));
                self.set_toast(
                    "Conflict check failed",
                    ToastLevel::Error,
                    Duration::from_secs(3),
                );
                failure = Some(error);
                merge_response(&mut self.plugins, &mut self.counters, &plugin, None)
            }
        };

        if self.refresh_pending {
            self.refresh_pending = false;
            self.set_filtered_ui_data();
            return;
        }
        self.finish_refresh(conflicts);
        if let Some(error) = failure {
            self.status = format!("Conflict check failed: {error}");
        }
    }

    fn finish_refresh(&mut self, conflicts: ConflictSet) {
        self.conflicts = conflicts;
        let outcome = FilterPipeline::new(&self.filters, &self.conflicts).run(&self.plugins);
        self.hidden_plugin_no = outcome.hidden_plugin_no;
        self.hidden_message_no = outcome.hidden_message_no;
        self.counters.reconcile_filtered(outcome.hidden_message_no);

        for &index in &outcome.filtered {
            apply_message_filters(&mut self.plugins[index], &self.filters);
        }
        self.filtered = outcome.filtered;
        self.clamp_selection();

        tracing::debug!(
            shown = self.filtered.len(),
            hidden_plugins = self.hidden_plugin_no,
            hidden_messages = self.hidden_message_no,
            "filter pass complete"
        );
        self.status = format!(
            "Showing {} of {} plugin(s)",
            self.filtered.len(),
            self.plugins.len()
        );

        let needle = self.search_needle.clone();
        self.search(&needle);
    }

    /// Search-bar highlight over the filtered plugins. Returns the number of
    /// matches; an empty needle clears every highlight.
    pub fn search(&mut self, needle: &str) -> usize {
        self.search_needle = needle.to_string();
        for plugin in &mut self.plugins {
            plugin.card.search_result = false;
        }
        if needle.is_empty() {
            return 0;
        }

        let mut matches = 0;
        for &index in &self.filtered {
            let plugin = &mut self.plugins[index];
            if plugin.is_visible(needle) {
                plugin.card.search_result = true;
                matches += 1;
            }
        }
        matches
    }

    /// Positions in the filtered view whose plugin matches the search bar.
    pub fn search_results(&self) -> Vec<usize> {
        self.filtered
            .iter()
            .enumerate()
            .filter(|(_, index)| self.plugins[**index].card.search_result)
            .map(|(position, _)| position)
            .collect()
    }

    pub fn apply_display_toggles(&mut self) {
        let toggles = self.filters.toggles;
        for plugin in &mut self.plugins {
            plugin.card.version_hidden = toggles.hide_version_numbers;
            plugin.card.crc_hidden = toggles.hide_crcs;
            plugin.card.tags_hidden = toggles.hide_bash_tags;
        }
    }

    /// Entry point for metadata editors. Returns `None` when no plugin has
    /// that name.
    pub fn update_plugin(&mut self, name: &str, update: PluginUpdate) -> Option<Vec<Change>> {
        let record = self.plugins.iter_mut().find(|plugin| plugin.name == name)?;
        Some(sync::apply_update(record, update, &mut self.counters))
    }

    pub fn filtered_plugins(&self) -> impl Iterator<Item = &PluginRecord> {
        self.filtered.iter().map(|index| &self.plugins[*index])
    }

    pub fn selected_plugin(&self) -> Option<&PluginRecord> {
        self.filtered
            .get(self.selected)
            .map(|index| &self.plugins[*index])
    }

    pub fn move_selection(&mut self, delta: isize) {
        if delta < 0 {
            self.selected = self.selected.saturating_sub(delta.unsigned_abs());
        } else {
            self.selected = self.selected.saturating_add(delta as usize);
        }
        self.clamp_selection();
    }

    pub fn clamp_selection(&mut self) {
        let len = self.filtered.len();
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }

    pub fn select_next_search_result(&mut self) {
        let results = self.search_results();
        let next = results
            .iter()
            .copied()
            .find(|position| *position > self.selected)
            .or_else(|| results.first().copied());
        if let Some(position) = next {
            self.selected = position;
        }
    }

    /// Filtered plugin names, one per line.
    pub fn load_order_text(&self) -> String {
        self.filtered_plugins()
            .map(|plugin| plugin.name.as_str())
            .collect::<Vec<&str>>()
            .join("\n")
    }

    /// Plain-text card contents for pasting into bug reports.
    pub fn metadata_text(&self, plugin: &PluginRecord) -> String {
        let mut lines = vec![plugin.name.clone()];
        if !plugin.version.is_empty() {
            lines.push(format!("Version: {}", plugin.version));
        }
        if !plugin.crc_display().is_empty() {
            lines.push(format!("CRC: {}", plugin.crc_display()));
        }
        if !plugin.priority_display().is_empty() {
            let scope = if plugin.is_global_priority {
                "global"
            } else {
                "local"
            };
            lines.push(format!("Priority: {} ({scope})", plugin.priority_display()));
        }
        if !plugin.tags_added().is_empty() {
            lines.push(format!("Bash Tags added: {}", plugin.tags_added()));
        }
        if !plugin.tags_removed().is_empty() {
            lines.push(format!("Bash Tags removed: {}", plugin.tags_removed()));
        }
        for message in plugin.messages() {
            let label = match message.kind {
                MessageType::Note => "Note",
                MessageType::Warn => "Warning",
                MessageType::Error => "Error",
            };
            lines.push(format!("{label}: {}", message.content));
        }
        if let Some(userlist) = plugin.userlist.as_ref().filter(|_| plugin.has_user_edits()) {
            if let Ok(raw) = serde_json::to_string_pretty(userlist) {
                lines.push(format!("User metadata:\n{raw}"));
            }
        }
        lines.join("\n")
    }

    pub fn tick(&mut self) {
        if let Some(toast) = &self.toast {
            if toast.expires_at <= Instant::now() {
                self.toast = None;
            }
        }
        self.poll_conflicts();
    }

    pub fn set_toast(&mut self, message: &str, level: ToastLevel, duration: Duration) {
        self.toast = Some(Toast {
            message: message.to_string(),
            level,
            expires_at: Instant::now() + duration,
        });
    }

    pub fn log_info(&mut self, message: String) {
        tracing::info!("{message}");
        self.push_log(LogLevel::Info, message);
    }

    pub fn log_warn(&mut self, message: String) {
        tracing::warn!("{message}");
        self.push_log(LogLevel::Warn, message);
    }

    pub fn log_error(&mut self, message: String) {
        tracing::error!("{message}");
        self.push_log(LogLevel::Error, message);
    }

    pub fn scroll_log_up(&mut self, lines: usize) {
        self.log_scroll = self.log_scroll.saturating_add(lines);
    }

    pub fn scroll_log_down(&mut self, lines: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(lines);
    }

    /// `log_scroll` counts entries hidden below the view, so a scrolled view
    /// moves up by one to keep showing the same entries.
    fn push_log(&mut self, level: LogLevel, message: String) {
        self.logs.push_back(LogEntry { level, message });
        if self.logs.len() > LOG_CAPACITY {
            self.logs.pop_front();
        }
        if self.log_scroll > 0 {
            self.log_scroll = (self.log_scroll + 1).min(self.logs.len());
        }
    }
}
