mod config;
mod error;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use policy::gates::resolve_execution_role;
use policy::{PolicyStore, RolePolicyDocument, builtin_document, validate_role_policy_document, validate_tool_registry};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use storage::{Event, EventKind, EventStore, PUBLISH_CHANNEL};
use studio::{
    DiagnosticInput, ManifestMap, ManifestStore, PublishOutcome, Studio, StudioDraftBundle, StudioSnapshot,
    diagnose, validate_manifest,
};
use surface::{ContributionBridge, MountMode, RegisteredMod, ToolbarMode, UserOverrides, Viewport};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};

const CONFIG_FILE: &str = "modkit.toml";
const DB_FILE: &str = "events.db";
const LIVE_FILE: &str = "live.json";
const MANIFESTS_FILE: &str = "manifests.json";

#[derive(Parser)]
#[command(name = "modkit")]
#[command(about = "Role-gated mod studio: policies, toolbars and publishing", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: ./modkit.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a role policy document
    CheckPolicy { file: PathBuf },
    /// Validate a tool registry
    CheckTools { file: PathBuf },
    /// Look up a (role, surface, action) decision
    Resolve {
        #[arg(short, long)]
        role: String,
        #[arg(short, long)]
        surface: String,
        #[arg(short, long)]
        action: String,
        /// Policy document to query instead of the built-in one
        #[arg(short, long)]
        policy: Option<PathBuf>,
    },
    /// Show toolbar placement plans
    Toolbar {
        /// draw, playback or canvas
        #[arg(short, long)]
        mode: Option<String>,
        /// desktop, tablet or mobile
        #[arg(short, long)]
        viewport: Option<String>,
        /// Resolve a single action (needs --mode and --viewport)
        #[arg(short, long)]
        action: Option<String>,
        /// Suppress the legacy break-insertion group
        #[arg(long)]
        cutover: bool,
        /// Package whose overrides apply (default: configured active package)
        #[arg(long)]
        package: Option<String>,
    },
    /// Resolve mod toolbar and panel contributions
    Contributions {
        #[arg(short, long)]
        role: String,
        /// window-host, window-student or embedded
        #[arg(short, long, default_value = "window-host")]
        mount_mode: String,
        /// Registered mods (JSON array)
        #[arg(long)]
        mods: Option<PathBuf>,
        /// User override rules (JSON)
        #[arg(long)]
        user: Option<PathBuf>,
        #[arg(long)]
        package: Option<String>,
        #[arg(short, long)]
        policy: Option<PathBuf>,
    },
    /// Validate a draft bundle without applying it
    Preflight { file: PathBuf },
    /// Preflight and commit a draft bundle
    Publish { file: PathBuf },
    /// List archived snapshots
    Snapshots {
        /// Show only the last N snapshots
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Replay an archived snapshot
    Rollback {
        /// Snapshot ID (prefix match supported)
        snapshot: String,
    },
    /// Show the publish audit trail
    Audit {
        /// Show only the last N events
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::discover(cli.config.as_deref(), Path::new(CONFIG_FILE))?;
    init_tracing(&config.log_level);

    match cli.command {
        Commands::CheckPolicy { file } => cmd_check_policy(&file),
        Commands::CheckTools { file } => cmd_check_tools(&file),
        Commands::Resolve {
            role,
            surface,
            action,
            policy,
        } => cmd_resolve(&role, &surface, &action, policy.as_deref()),
        Commands::Toolbar {
            mode,
            viewport,
            action,
            cutover,
            package,
        } => cmd_toolbar(
            &config,
            mode.as_deref(),
            viewport.as_deref(),
            action.as_deref(),
            cutover,
            package.as_deref(),
        ),
        Commands::Contributions {
            role,
            mount_mode,
            mods,
            user,
            package,
            policy,
        } => cmd_contributions(
            &config,
            &role,
            &mount_mode,
            mods.as_deref(),
            user.as_deref(),
            package.as_deref(),
            policy.as_deref(),
        ),
        Commands::Preflight { file } => cmd_preflight(&config, &file),
        Commands::Publish { file } => cmd_publish(&config, &file),
        Commands::Snapshots { limit } => cmd_snapshots(&config, limit),
        Commands::Rollback { snapshot } => cmd_rollback(&config, &snapshot),
        Commands::Audit { limit } => cmd_audit(&config, limit),
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_env("MODKIT_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn cmd_check_policy(file: &Path) -> Result<()> {
    let document = validate_role_policy_document(&read_json::<Value>(file)?)?;
    println!(
        "ok: version {}, {} role(s)",
        document.version(),
        document.roles().len()
    );
    for (role, entry) in document.roles() {
        println!("  {role}: {} surface(s)", entry.surfaces.len());
    }
    Ok(())
}

fn cmd_check_tools(file: &Path) -> Result<()> {
    let entries = validate_tool_registry(&read_json::<Value>(file)?)?;
    println!("ok: {} tool(s)", entries.len());
    for entry in entries {
        println!(
            "  {:<32}  {:<12}  {} capability(ies)",
            entry.tool_id,
            serde_json::to_value(entry.category)?.as_str().unwrap_or_default(),
            entry.capabilities.len()
        );
    }
    Ok(())
}

fn cmd_resolve(role: &str, surface: &str, action: &str, policy: Option<&Path>) -> Result<()> {
    let document = load_policy(policy)?;
    let decision = document.resolve(role, surface, action);
    println!("{}", serde_json::to_value(decision)?.as_str().unwrap_or("deny"));
    Ok(())
}

fn cmd_toolbar(
    config: &Config,
    mode: Option<&str>,
    viewport: Option<&str>,
    action: Option<&str>,
    cutover: bool,
    package: Option<&str>,
) -> Result<()> {
    let registry = config.package_registry()?;
    let resolver = registry.toolbar_resolver(package, cutover || config.cutover_enabled);
    for diagnostic in resolver.diagnostics() {
        tracing::warn!(
            item = %diagnostic.item_id,
            layer = %diagnostic.layer,
            issue = %diagnostic.issue,
            "toolbar override not applied"
        );
    }

    let mode = mode.map(|m| parse_choice::<ToolbarMode>(m, "toolbar mode")).transpose()?;
    let viewport = viewport.map(|v| parse_choice::<Viewport>(v, "viewport")).transpose()?;

    match (mode, viewport, action) {
        (Some(mode), Some(viewport), Some(action)) => {
            let surface = resolver.resolve(mode, viewport, action);
            println!("{}", serde_json::to_value(surface)?.as_str().unwrap_or("hidden"));
            Ok(())
        }
        (Some(mode), Some(viewport), None) => print_json(&resolver.plan(mode, viewport)),
        (None, None, None) => print_json(&resolver.plan_all()),
        _ => Err(Error::Invalid(
            "--mode and --viewport must be given together (and both for --action)".to_string(),
        )),
    }
}

fn cmd_contributions(
    config: &Config,
    role: &str,
    mount_mode: &str,
    mods: Option<&Path>,
    user: Option<&Path>,
    package: Option<&str>,
    policy: Option<&Path>,
) -> Result<()> {
    let document = load_policy(policy)?;
    let registry = config.package_registry()?;
    let mods: Vec<RegisteredMod> = mods.map(read_json).transpose()?.unwrap_or_default();
    let user: UserOverrides = user.map(read_json).transpose()?.unwrap_or_default();
    let mount_mode: MountMode = parse_choice(mount_mode, "mount mode")?;
    let role = resolve_execution_role(Some(role));
    let reserved: BTreeSet<String> = config.reserved_toolbar_ids.iter().cloned().collect();

    let bridge = ContributionBridge::new(&document, &registry, &mods, &user);
    let toolbar = bridge.resolve_toolbar(mount_mode, role, Some(&reserved), package);
    let panels = bridge.resolve_panels(role, package);
    let diagnostics = diagnose(&DiagnosticInput {
        known_commands: None,
        toolbar_raw: &toolbar.raw,
        toolbar_blocked: &toolbar.blocked,
        registered_mods: &mods,
        ..DiagnosticInput::default()
    });

    print_json(&json!({
        "role": role,
        "toolbar": toolbar,
        "panels": panels,
        "diagnostics": diagnostics,
    }))
}

fn cmd_preflight(config: &Config, file: &Path) -> Result<()> {
    let bundle: StudioDraftBundle = read_json(file)?;
    let (studio, _, _) = open_studio(config)?;

    match studio.preflight(&bundle) {
        Ok(report) => {
            println!(
                "ok: manifest {} with {} ui entr{}",
                report.manifest.plugin_id,
                report.manifest.ui.len(),
                if report.manifest.ui.len() == 1 { "y" } else { "ies" }
            );
            for warning in &report.warnings {
                println!("  warning {warning}");
            }
            print_json(&report.manifest)
        }
        Err(failure) => Err(Error::Rejected(failure.to_string())),
    }
}

fn cmd_publish(config: &Config, file: &Path) -> Result<()> {
    let bundle: StudioDraftBundle = read_json(file)?;
    let (studio, _, data_dir) = open_studio(config)?;
    let outcome = studio.publish_studio_draft_bundle(&bundle)?;
    finish_commit(&studio, &data_dir, outcome)
}

fn cmd_snapshots(config: &Config, limit: usize) -> Result<()> {
    let store = open_store(config)?;
    let snapshots = store.list_snapshots(Some(limit))?;

    if snapshots.is_empty() {
        println!("No snapshots found.");
        return Ok(());
    }

    println!("{:<36}  {:<20}  REASON", "SNAPSHOT ID", "CREATED");
    println!("{}", "-".repeat(80));

    for summary in snapshots {
        let created = Local
            .from_utc_datetime(&summary.created_at.naive_utc())
            .format("%Y-%m-%d %H:%M");
        println!("{:<36}  {:<20}  {}", summary.id, created, summary.reason);
    }

    Ok(())
}

fn cmd_rollback(config: &Config, prefix: &str) -> Result<()> {
    let (studio, store, data_dir) = open_studio(config)?;
    let snapshot = StudioSnapshot::from_record(store.find_snapshot(prefix)?)?;
    println!("Rolling back to {} ({})", snapshot.id(), snapshot.reason());
    let outcome = studio.rollback_studio_snapshot(&snapshot)?;
    finish_commit(&studio, &data_dir, outcome)
}

fn cmd_audit(config: &Config, limit: usize) -> Result<()> {
    let store = open_store(config)?;
    let events = store.recent(PUBLISH_CHANNEL, Some(limit))?;

    if events.is_empty() {
        println!("No audit events found.");
        return Ok(());
    }

    for event in events.iter().rev() {
        print_event(event);
    }

    Ok(())
}

fn finish_commit(studio: &Studio, data_dir: &Path, outcome: PublishOutcome) -> Result<()> {
    match outcome {
        PublishOutcome::Committed(receipt) => {
            save_state(studio, data_dir)?;
            println!("{}", receipt.message);
            println!("  snapshot {}", receipt.snapshot_id);
            println!("  policy revision {}", receipt.policy_revision);
            for warning in &receipt.warnings {
                println!("  warning {warning}");
            }
            Ok(())
        }
        PublishOutcome::Rejected(failure) => Err(Error::Rejected(failure.to_string())),
    }
}

fn print_event(event: &Event) {
    let time = Local
        .from_utc_datetime(&event.timestamp.naive_utc())
        .format("%Y-%m-%d %H:%M:%S");
    let status = if event.kind.ok() { "ok" } else { "FAILED" };

    match &event.kind {
        EventKind::Rollback { snapshot_id, .. } => {
            println!(
                "[{time}] rollback {status}: {} (snapshot {snapshot_id})",
                event.kind.message()
            );
        }
        kind => println!("[{time}] {} {status}: {}", kind.name(), kind.message()),
    }
}

/// Build a studio over the persisted live state in the data directory.
fn open_studio(config: &Config) -> Result<(Studio, Arc<EventStore>, PathBuf)> {
    let data_dir = data_dir(config);
    std::fs::create_dir_all(&data_dir)?;
    let events = Arc::new(EventStore::open(data_dir.join(DB_FILE))?);

    let live: StudioDraftBundle = read_json_if_exists(&data_dir.join(LIVE_FILE))?.unwrap_or_default();
    let policies = match validate_role_policy_document(&live.policy) {
        Ok(document) => PolicyStore::with_document(document),
        Err(e) => {
            tracing::warn!(error = %e, "stored live policy is invalid; starting from the built-in policy");
            PolicyStore::new()
        }
    };

    let manifests = ManifestStore::new();
    if let Some(stored) = read_json_if_exists::<ManifestMap>(&data_dir.join(MANIFESTS_FILE))? {
        let valid: ManifestMap = stored
            .into_iter()
            .filter(|(id, manifest)| match validate_manifest(manifest) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(plugin = %id, error = %e, "dropping invalid stored manifest");
                    false
                }
            })
            .collect();
        let current = manifests.snapshot();
        manifests.compare_and_swap(&current, valid)?;
    }

    let mut studio = Studio::new(Arc::new(policies), Arc::new(manifests))
        .with_event_store(Arc::clone(&events))
        .with_live_bundle(live);
    if let Some(commands) = &config.known_commands {
        studio = studio.with_known_commands(commands.clone());
    }
    Ok((studio, events, data_dir))
}

fn save_state(studio: &Studio, data_dir: &Path) -> Result<()> {
    std::fs::write(
        data_dir.join(LIVE_FILE),
        serde_json::to_string_pretty(&studio.live_bundle())?,
    )?;
    std::fs::write(
        data_dir.join(MANIFESTS_FILE),
        serde_json::to_string_pretty(&*studio.manifests().snapshot())?,
    )?;
    Ok(())
}

fn open_store(config: &Config) -> Result<EventStore> {
    let db_path = data_dir(config).join(DB_FILE);

    if !db_path.exists() {
        return Err(Error::DatabaseNotFound { path: db_path });
    }

    Ok(EventStore::open(&db_path)?)
}

fn data_dir(config: &Config) -> PathBuf {
    config
        .data_dir
        .clone()
        .or_else(dirs_data_dir)
        .unwrap_or_else(|| ".modkit".into())
}

fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share/modkit"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("modkit"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("modkit"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}

fn load_policy(path: Option<&Path>) -> Result<RolePolicyDocument> {
    match path {
        Some(path) => Ok(validate_role_policy_document(&read_json::<Value>(path)?)?),
        None => Ok(builtin_document().clone()),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn read_json_if_exists<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if path.exists() {
        read_json(path).map(Some)
    } else {
        Ok(None)
    }
}

/// Parse a closed-set value by its serialized name.
fn parse_choice<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T> {
    serde_json::from_value(Value::String(raw.trim().to_string()))
        .map_err(|_| Error::Invalid(format!("unknown {what} '{raw}'")))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_closed_choices() {
        assert_eq!(parse_choice::<ToolbarMode>("playback", "mode").unwrap(), ToolbarMode::Playback);
        assert_eq!(parse_choice::<Viewport>(" mobile ", "viewport").unwrap(), Viewport::Mobile);
        assert_eq!(
            parse_choice::<MountMode>("window-host", "mount mode").unwrap(),
            MountMode::WindowHost
        );
        assert!(matches!(
            parse_choice::<ToolbarMode>("sketch", "toolbar mode"),
            Err(Error::Invalid(message)) if message == "unknown toolbar mode 'sketch'"
        ));
    }

    #[test]
    fn builtin_policy_is_the_default() {
        let document = load_policy(None).unwrap();
        assert_eq!(&document, builtin_document());
    }

    #[test]
    fn rollback_without_archive_reports_missing_snapshot() {
        let dir = std::env::temp_dir().join(format!("modkit-rollback-{}", std::process::id()));
        let config = Config {
            data_dir: Some(dir.clone()),
            ..Config::default()
        };
        let err = cmd_rollback(&config, "abc").unwrap_err();
        assert!(matches!(err, Error::Storage(storage::Error::NotFound(_))), "{err:?}");
        assert!(dir.join(DB_FILE).exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn configured_data_dir_wins() {
        let config = Config {
            data_dir: Some(PathBuf::from("/tmp/modkit-test")),
            ..Config::default()
        };
        assert_eq!(data_dir(&config), PathBuf::from("/tmp/modkit-test"));
    }
}
