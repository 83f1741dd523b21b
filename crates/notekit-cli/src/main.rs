//! `notekit` command line tool
//!
//! Reads and edits a plugin's persisted settings through the same store the
//! plugin uses, so merging and validation behave identically.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use notekit_core::{PluginContext, PluginId};
use notekit_settings::schema::json_type_name;
use notekit_settings::{
    BackendError, JsonFileBackend, Schema, SettingKind, SettingsBackend, SettingsPatch,
    SettingsStore, StoreOptions, ValidationIssue,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("notekit")
        .version(notekit_settings::VERSION)
        .about("Inspect and edit plugin settings")
        .subcommand_required(true)
        .arg(
            Arg::new("data")
                .long("data")
                .value_parser(value_parser!(PathBuf))
                .conflicts_with_all(["plugins-dir", "plugin"])
                .help("Path to a settings data.json"),
        )
        .arg(
            Arg::new("plugins-dir")
                .long("plugins-dir")
                .value_parser(value_parser!(PathBuf))
                .requires("plugin")
                .help("Directory holding one folder per plugin"),
        )
        .arg(
            Arg::new("plugin")
                .long("plugin")
                .requires("plugins-dir")
                .help("Plugin id inside --plugins-dir"),
        )
        .arg(
            Arg::new("schema")
                .long("schema")
                .value_parser(value_parser!(PathBuf))
                .help("JSON schema file (default: template schema)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Debug logging (RUST_LOG takes precedence)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(Command::new("show").about("Print merged settings"))
        .subcommand(
            Command::new("get")
                .about("Print one setting")
                .arg(Arg::new("key").required(true).help("Setting key")),
        )
        .subcommand(
            Command::new("set")
                .about("Change one setting and persist it")
                .arg(Arg::new("key").required(true).help("Setting key"))
                .arg(
                    Arg::new("value")
                        .required(true)
                        .allow_hyphen_values(true)
                        .help("JSON value; anything that is not JSON is stored as a string"),
                ),
        )
        .subcommand(Command::new("reset").about("Persist the schema defaults"))
        .subcommand(Command::new("validate").about("Check persisted data against the schema"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("verbose"), matches.get_flag("log-json"));

    match run(&matches).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Where the settings blob lives
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    File(PathBuf),
    Plugin { dir: PathBuf, id: PluginId },
}

impl Target {
    fn from_matches(matches: &ArgMatches) -> Result<Self> {
        if let Some(path) = matches.get_one::<PathBuf>("data") {
            return Ok(Self::File(path.clone()));
        }
        match (
            matches.get_one::<PathBuf>("plugins-dir"),
            matches.get_one::<String>("plugin"),
        ) {
            (Some(dir), Some(id)) => Ok(Self::Plugin {
                dir: dir.clone(),
                id: PluginId::new(id.as_str())?,
            }),
            _ => bail!("pass --data <path> or --plugins-dir <dir> --plugin <id>"),
        }
    }

    fn backend(&self) -> Result<JsonFileBackend> {
        Ok(match self {
            Self::File(path) => JsonFileBackend::new(path.clone()),
            Self::Plugin { dir, id } => JsonFileBackend::for_plugin(dir, id.as_str())?,
        })
    }
}

/// Loaded store, plus the plugin context when one was activated
struct Session {
    store: Arc<SettingsStore>,
    context: Option<PluginContext>,
}

impl Session {
    async fn open(target: &Target, schema: Schema, options: StoreOptions) -> Result<Self> {
        match target {
            Target::File(path) => {
                let backend = Arc::new(JsonFileBackend::new(path.clone()));
                let store = Arc::new(SettingsStore::with_options(schema, backend, options));
                store
                    .load()
                    .await
                    .with_context(|| format!("loading {}", path.display()))?;
                Ok(Self {
                    store,
                    context: None,
                })
            }
            Target::Plugin { dir, id } => {
                let context = PluginContext::init_in_dir(id.clone(), schema, dir, options).await?;
                Ok(Self {
                    store: context.settings(),
                    context: Some(context),
                })
            }
        }
    }

    async fn close(self) {
        match self.context {
            Some(context) => context.teardown().await,
            None => self.store.wait_for_writes().await,
        }
    }
}

async fn run(matches: &ArgMatches) -> Result<ExitCode> {
    let target = Target::from_matches(matches)?;
    let schema = load_schema(matches.get_one::<PathBuf>("schema"))?;
    // read-only commands never rewrite the file
    let read_only = StoreOptions::new().persist_on_load(false);

    match matches.subcommand() {
        Some(("show", _)) => {
            let session = Session::open(&target, schema, read_only).await?;
            println!("{}", serde_json::to_string_pretty(&session.store.settings().to_value())?);
            session.close().await;
        }
        Some(("get", args)) => {
            let key = required(args, "key")?;
            let session = Session::open(&target, schema, read_only).await?;
            println!("{}", render(&session.store.get(key)?));
            session.close().await;
        }
        Some(("set", args)) => {
            let key = required(args, "key")?;
            let value = parse_value(&schema, key, required(args, "value")?);
            let session = Session::open(&target, schema, StoreOptions::default()).await?;
            session
                .store
                .update(SettingsPatch::new().set(key, value))
                .await
                .with_context(|| format!("setting '{key}'"))?;
            println!("{key} = {}", render(&session.store.get(key)?));
            session.close().await;
        }
        Some(("reset", _)) => {
            let session = Session::open(&target, schema, read_only).await?;
            session.store.reset().await?;
            println!("Settings reset to defaults");
            session.close().await;
        }
        Some(("validate", _)) => {
            let backend = target.backend()?;
            return validate(&schema, &backend).await;
        }
        _ => bail!("unknown command"),
    }
    Ok(ExitCode::SUCCESS)
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a str> {
    args.get_one::<String>(name)
        .map(String::as_str)
        .with_context(|| format!("missing <{name}>"))
}

fn load_schema(path: Option<&PathBuf>) -> Result<Schema> {
    let Some(path) = path else {
        return Ok(Schema::template());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading schema {}", path.display()))?;
    Schema::from_json_str(&raw).with_context(|| format!("parsing schema {}", path.display()))
}

/// JSON when it parses, otherwise the raw text as a string
///
/// String settings always take the raw text, so `42` or `true` need no quotes.
fn parse_value(schema: &Schema, key: &str, raw: &str) -> Value {
    let parsed = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()));
    match schema.get(key) {
        Some(def) if matches!(def.kind, SettingKind::String) && !parsed.is_string() => {
            Value::String(raw.to_owned())
        }
        _ => parsed,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

async fn validate(schema: &Schema, backend: &dyn SettingsBackend) -> Result<ExitCode> {
    let issues = match backend.load().await {
        Ok(None) => {
            println!("No settings stored; defaults apply");
            return Ok(ExitCode::SUCCESS);
        }
        Ok(Some(blob)) => blob_issues(schema, &blob),
        Err(BackendError::Corrupt(reason)) => vec![ValidationIssue::Undecodable(reason)],
        Err(err) => return Err(err.into()),
    };

    let (missing, problems): (Vec<_>, Vec<_>) = issues
        .into_iter()
        .partition(|issue| matches!(issue, ValidationIssue::Missing(_)));
    for issue in &missing {
        println!("note: {issue} (default will be used)");
    }
    if problems.is_empty() {
        println!("Settings are valid");
        return Ok(ExitCode::SUCCESS);
    }
    for issue in &problems {
        println!("error: {issue}");
    }
    Ok(ExitCode::FAILURE)
}

fn blob_issues(schema: &Schema, blob: &Value) -> Vec<ValidationIssue> {
    match blob {
        Value::Null => Vec::new(),
        Value::Object(map) => schema.complete_issues(map),
        other => vec![ValidationIssue::NotAnObject(json_type_name(other))],
    }
}
