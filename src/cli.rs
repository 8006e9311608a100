use crate::{
    config::{base_data_dir, AppConfig, EngineConfig},
    counters::AggregateCounters,
    filters::{FilterSettings, FilterToggle},
    logging,
    plugin::{MessageType, PluginRecord},
    session::Session,
    snapshot::GameSnapshot,
    ui,
};
use anyhow::{anyhow, bail, Result};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct GlobalOptions {
    format: Option<OutputFormat>,
    snapshot: Option<PathBuf>,
    engine: Option<EngineConfig>,
    hide: Vec<FilterToggle>,
    content_filter: Option<String>,
    search: Option<String>,
}

impl GlobalOptions {
    fn format(&self) -> OutputFormat {
        self.format.unwrap_or(OutputFormat::Text)
    }

    fn filter_settings(&self, base: FilterSettings) -> FilterSettings {
        let mut settings = base;
        for toggle in &self.hide {
            settings.set(*toggle, true);
        }
        settings
    }
}

#[derive(Debug, PartialEq)]
enum CliAction {
    Ui(GlobalOptions),
    Command {
        command: CliCommand,
        options: GlobalOptions,
    },
}

#[derive(Debug, PartialEq)]
enum CliCommand {
    List,
    Counts,
    Conflicts(String),
    Settings,
    Help,
    Version,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let action = parse_args(&args)?;
    match action {
        CliAction::Ui(options) => {
            let mut config = AppConfig::load_or_create()?;
            let _guard = logging::init_file(&base_data_dir()?, &config.log_level)?;
            if let Some(path) = &options.snapshot {
                config.last_snapshot = Some(path.clone());
            }
            let mut session = build_session(&config, &options, false)?;
            ui::run(&mut session, &mut config)
        }
        CliAction::Command { command, options } => match command {
            CliCommand::Help => {
                print_help();
                Ok(())
            }
            CliCommand::Version => {
                println!("PluginDeck v{}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
            _ => {
                let config = AppConfig::load_or_create()?;
                logging::init_stderr(&config.log_level)?;
                run_command(&config, command, &options)
            }
        },
    }
}

fn parse_args(args: &[String]) -> Result<CliAction> {
    if matches!(args.first().map(|s| s.as_str()), Some("--help" | "-h" | "help")) {
        return Ok(CliAction::Command {
            command: CliCommand::Help,
            options: GlobalOptions::default(),
        });
    }
    if matches!(args.first().map(|s| s.as_str()), Some("--version" | "-V" | "version")) {
        return Ok(CliAction::Command {
            command: CliCommand::Version,
            options: GlobalOptions::default(),
        });
    }

    let (options, tokens) = parse_global_options(args)?;
    let Some(head) = tokens.first() else {
        return Ok(CliAction::Ui(options));
    };

    let command = match head.as_str() {
        "list" => CliCommand::List,
        "counts" => CliCommand::Counts,
        "settings" => CliCommand::Settings,
        "conflicts" => {
            let plugin = tokens
                .get(1)
                .ok_or_else(|| anyhow!("conflicts requires a plugin name"))?;
            CliCommand::Conflicts(plugin.to_string())
        }
        "ui" => return Ok(CliAction::Ui(options)),
        other => bail!("Unknown command: {other} (try 'plugindeck help')"),
    };
    Ok(CliAction::Command { command, options })
}

fn parse_global_options(args: &[String]) -> Result<(GlobalOptions, Vec<String>)> {
    let mut options = GlobalOptions::default();
    let mut tokens = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag, Some(value.to_string())),
            _ => (arg.as_str(), None),
        };
        let mut value = |name: &str| -> Result<String> {
            match inline.clone() {
                Some(value) => Ok(value),
                None => iter
                    .next()
                    .cloned()
                    .ok_or_else(|| anyhow!("{name} requires a value")),
            }
        };

        match flag {
            "--format" => {
                let raw = value("--format")?;
                options.format = Some(
                    OutputFormat::parse(&raw)
                        .ok_or_else(|| anyhow!("Unknown format: {raw} (use 'text' or 'json')"))?,
                );
            }
            "--snapshot" | "-s" => options.snapshot = Some(PathBuf::from(value("--snapshot")?)),
            "--engine-file" => {
                options.engine = Some(EngineConfig::File {
                    path: PathBuf::from(value("--engine-file")?),
                });
            }
            "--engine-url" => {
                options.engine = Some(EngineConfig::Http {
                    url: value("--engine-url")?,
                    timeout_secs: 30,
                });
            }
            "--filter" => options.content_filter = Some(value("--filter")?),
            "--search" => options.search = Some(value("--search")?),
            _ => {
                if let Some(toggle) = hide_flag(flag) {
                    if !options.hide.contains(&toggle) {
                        options.hide.push(toggle);
                    }
                } else if flag.starts_with("--") {
                    bail!("Unknown option: {flag}");
                } else {
                    tokens.push(arg.to_string());
                }
            }
        }
    }

    Ok((options, tokens))
}

fn hide_flag(flag: &str) -> Option<FilterToggle> {
    let toggle = match flag {
        "--hide-messageless" => FilterToggle::HideMessageless,
        "--hide-inactive" => FilterToggle::HideInactive,
        "--hide-notes" => FilterToggle::HideNotes,
        "--hide-do-not-clean" => FilterToggle::HideDoNotClean,
        "--hide-all-messages" => FilterToggle::HideAllMessages,
        "--hide-versions" => FilterToggle::HideVersions,
        "--hide-crcs" => FilterToggle::HideCrcs,
        "--hide-tags" => FilterToggle::HideBashTags,
        _ => return None,
    };
    Some(toggle)
}

/// Builds a session from the saved config with command-line overrides on
/// top. Without a snapshot the session is empty unless `require_snapshot`.
fn build_session(
    config: &AppConfig,
    options: &GlobalOptions,
    require_snapshot: bool,
) -> Result<Session> {
    let engine = options
        .engine
        .clone()
        .unwrap_or_else(|| config.engine.clone())
        .build();
    let mut session = Session::new(engine, config);
    session.restore_filter_states(&options.filter_settings(config.filters));

    let snapshot_path = options
        .snapshot
        .clone()
        .or_else(|| config.last_snapshot.clone());
    match snapshot_path {
        Some(path) => {
            let snapshot = GameSnapshot::load(&path)?;
            session.load_plugins(snapshot.title, snapshot.plugins);
        }
        None if require_snapshot => {
            bail!("No snapshot to read (pass --snapshot <path>)");
        }
        None => {
            session.log_warn("No snapshot loaded (pass --snapshot <path>)".to_string());
        }
    }

    session.apply_enabled_filters();
    if let Some(filter) = &options.content_filter {
        session.set_content_filter(filter);
    }
    session.wait_for_conflicts();
    if let Some(needle) = &options.search {
        session.search(needle);
    }
    Ok(session)
}

fn run_command(config: &AppConfig, command: CliCommand, options: &GlobalOptions) -> Result<()> {
    match command {
        CliCommand::Settings => print_settings(config, options),
        CliCommand::List => {
            let session = build_session(config, options, true)?;
            list_plugins(&session, options.format())
        }
        CliCommand::Counts => {
            let session = build_session(config, options, true)?;
            print_counts(&session, options.format())
        }
        CliCommand::Conflicts(plugin) => {
            let mut session = build_session(config, options, true)?;
            if !session.plugins.iter().any(|record| record.name == plugin) {
                bail!("Unknown plugin: {plugin}");
            }
            session.show_only_conflicts(Some(&plugin));
            session.wait_for_conflicts();
            if session.status.starts_with("Conflict check failed") {
                eprintln!("{}", session.status);
            }
            list_plugins(&session, options.format())
        }
        CliCommand::Help | CliCommand::Version => Ok(()),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PluginListItem {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    crc: Option<String>,
    priority: String,
    is_active: bool,
    is_dirty: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags_added: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags_removed: Option<String>,
    search_result: bool,
    messages: Vec<MessageItem>,
}

#[derive(Serialize)]
struct MessageItem {
    #[serde(rename = "type")]
    kind: MessageType,
    content: String,
}

impl PluginListItem {
    fn from_record(plugin: &PluginRecord) -> Self {
        let shown = |hidden: bool, value: &str| (!hidden).then(|| value.to_string());
        Self {
            name: plugin.name.clone(),
            version: shown(plugin.card.version_hidden, &plugin.version),
            crc: shown(plugin.card.crc_hidden, plugin.crc_display()),
            priority: plugin.priority_display().to_string(),
            is_active: plugin.is_active,
            is_dirty: plugin.is_dirty(),
            tags_added: shown(plugin.card.tags_hidden, plugin.tags_added()),
            tags_removed: shown(plugin.card.tags_hidden, plugin.tags_removed()),
            search_result: plugin.card.search_result,
            messages: plugin
                .messages()
                .iter()
                .filter(|message| !message.hidden)
                .map(|message| MessageItem {
                    kind: message.kind,
                    content: message.content.clone(),
                })
                .collect(),
        }
    }
}

fn list_plugins(session: &Session, format: OutputFormat) -> Result<()> {
    let items: Vec<PluginListItem> = session
        .filtered_plugins()
        .map(PluginListItem::from_record)
        .collect();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => {
            for item in items {
                let marker = if item.search_result { '>' } else { ' ' };
                let active = if item.is_active { '*' } else { ' ' };
                let mut line = format!("{marker}{active} {}", item.name);
                for extra in [&item.version, &item.crc].into_iter().flatten() {
                    if !extra.is_empty() {
                        line.push_str("  ");
                        line.push_str(extra);
                    }
                }
                if item.is_dirty {
                    line.push_str("  [dirty]");
                }
                println!("{line}");
                for message in item.messages {
                    println!("      {}: {}", message_label(message.kind), message.content);
                }
            }
        }
    }

    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CountsOutput {
    #[serde(flatten)]
    counters: AggregateCounters,
    total_plugins: usize,
    shown_plugins: usize,
    hidden_plugin_no: usize,
    hidden_message_no: usize,
}

fn print_counts(session: &Session, format: OutputFormat) -> Result<()> {
    let output = CountsOutput {
        counters: session.counters,
        total_plugins: session.plugins.len(),
        shown_plugins: session.filtered.len(),
        hidden_plugin_no: session.hidden_plugin_no,
        hidden_message_no: session.hidden_message_no,
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!(
                "Plugins: {} shown, {} hidden, {} total",
                output.shown_plugins, output.hidden_plugin_no, output.total_plugins
            );
            println!(
                "Messages: {} shown, {} hidden, {} total",
                output.counters.filtered_total_messages,
                output.hidden_message_no,
                output.counters.total_messages
            );
            println!("Warnings: {}", output.counters.total_warnings);
            println!("Errors: {}", output.counters.total_errors);
            println!("Dirty plugins: {}", output.counters.dirty_plugin_count);
        }
    }

    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingsOutput {
    filters: FilterSettings,
    do_not_clean_phrase: String,
    engine: EngineConfig,
    config_dir: String,
}

fn print_settings(config: &AppConfig, options: &GlobalOptions) -> Result<()> {
    let output = SettingsOutput {
        filters: options.filter_settings(config.filters),
        do_not_clean_phrase: config.do_not_clean_phrase.clone(),
        engine: options
            .engine
            .clone()
            .unwrap_or_else(|| config.engine.clone()),
        config_dir: base_data_dir()?.display().to_string(),
    };

    match options.format() {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            for toggle in FilterToggle::ALL {
                let state = if output.filters.get(toggle) { "on" } else { "off" };
                println!("{:<28} {state}", toggle.label());
            }
            println!("{:<28} \"{}\"", "Do not clean phrase", output.do_not_clean_phrase);
            let engine = match &output.engine {
                EngineConfig::None => "none".to_string(),
                EngineConfig::File { path } => format!("file {}", path.display()),
                EngineConfig::Http { url, .. } => format!("http {url}"),
            };
            println!("{:<28} {engine}", "Conflict engine");
            println!("{:<28} {}", "Config dir", output.config_dir);
        }
    }

    Ok(())
}

fn message_label(kind: MessageType) -> &'static str {
    match kind {
        MessageType::Note => "Note",
        MessageType::Warn => "Warning",
        MessageType::Error => "Error",
    }
}

fn print_help() {
    println!("PluginDeck v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  plugindeck                      Launch TUI");
    println!("  plugindeck list                 List plugins that pass the filters");
    println!("  plugindeck counts               Show message and plugin counters");
    println!("  plugindeck conflicts <plugin>   List plugins conflicting with <plugin>");
    println!("  plugindeck settings             Show effective filter settings");
    println!();
    println!("Global options:");
    println!("  -s, --snapshot <path>           Load order snapshot (JSON)");
    println!("  --format <json|text>            Output format for commands");
    println!("  --engine-file <path>            Answer conflict queries from a JSON file");
    println!("  --engine-url <url>              Answer conflict queries over HTTP");
    println!("  --filter <text>                 Content filter");
    println!("  --search <text>                 Mark plugins matching <text>");
    println!("  -h, --help                      Show help");
    println!("  -V, --version                   Show version");
    println!();
    println!("Filter options:");
    println!("  --hide-messageless              Hide plugins without visible messages");
    println!("  --hide-inactive                 Hide inactive plugins");
    println!("  --hide-notes                    Hide notes");
    println!("  --hide-do-not-clean             Hide 'Do not clean' messages");
    println!("  --hide-all-messages             Hide all plugin messages");
    println!("  --hide-versions                 Hide version numbers");
    println!("  --hide-crcs                     Hide CRCs");
    println!("  --hide-tags                     Hide Bash Tags");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn no_arguments_launches_ui() {
        assert_eq!(
            parse_args(&[]).expect("parse"),
            CliAction::Ui(GlobalOptions::default())
        );
    }

    #[test]
    fn help_and_version_short_circuit() {
        let help = parse_args(&args(&["-h", "--bogus"])).expect("parse");
        assert!(matches!(
            help,
            CliAction::Command {
                command: CliCommand::Help,
                ..
            }
        ));
        let version = parse_args(&args(&["version"])).expect("parse");
        assert!(matches!(
            version,
            CliAction::Command {
                command: CliCommand::Version,
                ..
            }
        ));
    }

    #[test]
    fn global_options_can_surround_command() {
        let action = parse_args(&args(&[
            "--format=json",
            "list",
            "--snapshot",
            "order.json",
            "--hide-inactive",
            "--hide-crcs",
            "--hide-inactive",
            "--search=patch",
        ]))
        .expect("parse");
        let CliAction::Command { command, options } = action else {
            panic!("expected command");
        };
        assert_eq!(command, CliCommand::List);
        assert_eq!(options.format(), OutputFormat::Json);
        assert_eq!(options.snapshot, Some(PathBuf::from("order.json")));
        assert_eq!(
            options.hide,
            vec![FilterToggle::HideInactive, FilterToggle::HideCrcs]
        );
        assert_eq!(options.search.as_deref(), Some("patch"));
    }

    #[test]
    fn conflicts_needs_plugin() {
        assert!(parse_args(&args(&["conflicts"])).is_err());
        let action = parse_args(&args(&["conflicts", "Foo.esp", "--engine-file", "c.json"]))
            .expect("parse");
        let CliAction::Command { command, options } = action else {
            panic!("expected command");
        };
        assert_eq!(command, CliCommand::Conflicts("Foo.esp".to_string()));
        assert_eq!(
            options.engine,
            Some(EngineConfig::File {
                path: PathBuf::from("c.json")
            })
        );
    }

    #[test]
    fn rejects_unknown_input() {
        assert!(parse_args(&args(&["frobnicate"])).is_err());
        assert!(parse_args(&args(&["list", "--nope"])).is_err());
        assert!(parse_args(&args(&["list", "--format", "yaml"])).is_err());
        assert!(parse_args(&args(&["list", "--snapshot"])).is_err());
    }

    #[test]
    fn hide_flags_layer_over_saved_settings() {
        let (options, _) =
            parse_global_options(&args(&["--hide-notes", "--hide-tags"])).expect("parse");
        let base = FilterSettings {
            hide_inactive_plugins: true,
            ..FilterSettings::default()
        };
        let settings = options.filter_settings(base);
        assert!(settings.hide_inactive_plugins);
        assert!(settings.hide_notes);
        assert!(settings.hide_bash_tags);
        assert!(!settings.hide_crcs);
    }
}
