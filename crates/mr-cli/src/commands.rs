use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use mr_container::ContainerError;
use mr_lock::LockError;
use mr_objects::{ContainerRepository, RepositoryError, Repositories};
use mr_store::StoreError;
use mr_types::{ContainerName, ContainerObject};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::backend::open_backend;
use crate::cli::*;
use crate::config::{BackendKind, Config, TOKEN_ENV};

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let printer = Printer::new(cli.output);
    let path = config_path(cli.conf_file)?;
    match cli.command {
        Command::Setup(args) => cmd_setup(&path, args, &printer),
        Command::Company(args) => run_objects(open_repositories(&path)?.companies(), args.action()?, &printer).await,
        Command::Interaction(args) => {
            run_objects(open_repositories(&path)?.interactions(), args.action()?, &printer).await
        }
        Command::Study(args) => run_objects(open_repositories(&path)?.studies(), args.action()?, &printer).await,
        Command::Locks(args) => cmd_locks(&open_repositories(&path)?, args.action, &printer).await,
    }
}

fn config_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => Config::default_path().context("cannot determine the user configuration directory"),
    }
}

fn open_repositories(path: &Path) -> anyhow::Result<Repositories> {
    let mut config = Config::load(path)?;
    config.apply_token_override(std::env::var(TOKEN_ENV).ok());
    config.validate(chrono::Utc::now())?;
    let backend = open_backend(&config)?;
    Ok(Repositories::new(backend, config.lock_config()?, config.retry_policy()))
}

async fn run_objects<T: ContainerObject>(
    repo: ContainerRepository<T>,
    action: ObjectAction,
    printer: &Printer,
) -> anyhow::Result<()> {
    let container = repo.container();
    match action {
        ObjectAction::List => {
            let listing = repo.get_all().await?;
            printer.objects(container, &listing.objects, false)
        }
        ObjectAction::FindByName(name) => {
            let found = repo.find_by_name(&name).await?;
            printer.objects(container, &found, true)
        }
        ObjectAction::FindByX { attribute, value } => {
            let found = repo.find_by_x(&attribute, &parse_value(&value)).await?;
            printer.objects(container, &found, true)
        }
        ObjectAction::Update { name, assignments } => {
            let updates = parse_assignments(&assignments)?;
            let updated = repo.update_obj(&name, updates).await?;
            printer.success(
                &format!("updated {container} object {}", updated.name()),
                serde_json::to_value(&updated)?,
            );
            Ok(())
        }
        ObjectAction::Delete { name, allow_orphans } => {
            let report = repo.delete_obj(&name, allow_orphans).await?;
            let mut message = format!("deleted {container} object {}", report.deleted);
            if !report.cascaded.is_empty() {
                message.push_str(&format!(" and {} linked object(s)", report.cascaded.len()));
            }
            if !report.unlinked.is_empty() {
                message.push_str(&format!(", unlinked from {} object(s)", report.unlinked.len()));
            }
            let unlinked: Vec<Value> = report
                .unlinked
                .iter()
                .map(|(c, n)| json!({"container": c, "name": n}))
                .collect();
            printer.success(
                &message,
                json!({"deleted": report.deleted, "cascaded": report.cascaded, "unlinked": unlinked}),
            );
            Ok(())
        }
        ObjectAction::Add(path) => {
            let objects: Vec<T> = load_objects(&path)?;
            let count = objects.len();
            let sha = repo.create_objs(objects).await?;
            printer.success(
                &format!("added {count} {container} object(s)"),
                json!({"count": count, "sha": sha.as_str()}),
            );
            Ok(())
        }
    }
}

async fn cmd_locks(repos: &Repositories, action: LocksAction, printer: &Printer) -> anyhow::Result<()> {
    let locks = repos.lock_manager();
    match action {
        LocksAction::Status => {
            let mut report = Vec::new();
            for container in ContainerName::ALL {
                let status = locks.check_for_lock(container).await?;
                if printer.format == OutputFormat::Text {
                    if status.holders.is_empty() {
                        println!("{:<14} {}", container.as_str().bold(), "unlocked".green());
                    }
                    for holder in &status.holders {
                        let state = if holder.stale {
                            "stale".yellow()
                        } else {
                            "locked".red()
                        };
                        println!("{:<14} {} by {}", container.as_str().bold(), state, holder.describe());
                    }
                }
                let holders: Vec<Value> = status
                    .holders
                    .iter()
                    .map(|h| json!({"path": h.path, "holder": h.describe(), "stale": h.stale}))
                    .collect();
                report.push(json!({"container": container, "locked": status.is_locked(), "holders": holders}));
            }
            if printer.format == OutputFormat::Json {
                printer.json(&json!({"status": "success", "data": report}));
            }
            Ok(())
        }
        LocksAction::Clear { container } => {
            let removed = locks.force_unlock(container).await?;
            printer.success(
                &format!("cleared {removed} lock file(s) on {container}"),
                json!({"container": container, "removed": removed}),
            );
            Ok(())
        }
    }
}

fn cmd_setup(path: &Path, args: SetupArgs, printer: &Printer) -> anyhow::Result<()> {
    if path.exists() && !args.force {
        bail!("{} already exists; pass --force to overwrite it", path.display());
    }
    let mut config = Config::default();
    if let Some(root) = args.local_root {
        config.default.backend = BackendKind::Local;
        config.default.local_root = Some(root);
    }
    if let Some(org) = args.org {
        config.github.org = org;
    }
    config.github.repo = args.repo;
    config.github.token = args.token;
    config.save(path)?;
    printer.success(
        &format!("wrote configuration to {}", path.display()),
        json!({"path": path.display().to_string()}),
    );
    Ok(())
}

/// Parse a CLI value as JSON, falling back to a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub fn parse_assignments(assignments: &[String]) -> anyhow::Result<Map<String, Value>> {
    let mut updates = Map::new();
    for assignment in assignments {
        let Some((key, value)) = assignment.split_once('=') else {
            bail!("expected KEY=VALUE, got {assignment}");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("empty field name in {assignment}");
        }
        updates.insert(key.to_string(), parse_value(value));
    }
    Ok(updates)
}

/// Read one object or an array of objects from a JSON file.
pub fn load_objects<T: ContainerObject>(path: &Path) -> anyhow::Result<Vec<T>> {
    let raw = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    let value: Value =
        serde_json::from_slice(&raw).with_context(|| format!("{} is not valid JSON", path.display()))?;
    let items = match value {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        _ => bail!("{} must hold a JSON object or array", path.display()),
    };
    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(anyhow::Error::from))
        .collect::<anyhow::Result<Vec<T>>>()
        .with_context(|| format!("invalid {} object in {}", T::CONTAINER, path.display()))
}

/// The status code carried by a library error, if any.
pub fn status_code(err: &anyhow::Error) -> Option<u16> {
    if let Some(e) = err.downcast_ref::<RepositoryError>() {
        return Some(e.status_code());
    }
    if let Some(e) = err.downcast_ref::<ContainerError>() {
        return Some(e.status_code());
    }
    if let Some(e) = err.downcast_ref::<LockError>() {
        return Some(match e {
            LockError::Contention { .. } => 423,
            LockError::LockLost { .. } => 409,
            LockError::Serialization(_) => 500,
            LockError::Store(inner) => inner.status_code(),
        });
    }
    err.downcast_ref::<StoreError>().map(StoreError::status_code)
}

/// Renders results as `SUCCESS:`/`ERROR:` lines or JSON documents.
pub struct Printer {
    format: OutputFormat,
}

impl Printer {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn success(&self, message: &str, data: Value) {
        match self.format {
            OutputFormat::Text => println!("{} {message}", "SUCCESS:".green().bold()),
            OutputFormat::Json => {
                self.json(&json!({"status": "success", "message": message, "data": data}))
            }
        }
    }

    pub fn error(&self, err: &anyhow::Error) {
        let code = status_code(err);
        match self.format {
            OutputFormat::Text => match code {
                Some(code) => eprintln!("{} {err:#} (status {code})", "ERROR:".red().bold()),
                None => eprintln!("{} {err:#}", "ERROR:".red().bold()),
            },
            OutputFormat::Json => self.json(&json!({
                "status": "error",
                "code": code,
                "message": format!("{err:#}"),
            })),
        }
    }

    fn objects<T: Serialize>(&self, container: ContainerName, objects: &[T], detail: bool) -> anyhow::Result<()> {
        let values = objects
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        match self.format {
            OutputFormat::Json => self.json(&json!({"status": "success", "data": values})),
            OutputFormat::Text => {
                println!(
                    "{} {} {container} object(s)",
                    "SUCCESS:".green().bold(),
                    values.len()
                );
                for value in &values {
                    if detail {
                        println!("{}", serde_json::to_string_pretty(value)?);
                    } else {
                        println!("  {}", summarize(value));
                    }
                }
            }
        }
        Ok(())
    }

    fn json(&self, value: &Value) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("{} {e}", "ERROR:".red().bold()),
        }
    }
}

/// One-line listing form: the name, then the description if there is one.
fn summarize(object: &Value) -> String {
    let name = object.get("name").and_then(Value::as_str).unwrap_or("<unnamed>");
    match object.get("description").and_then(Value::as_str) {
        Some(description) if !description.is_empty() => {
            format!("{} {}", name.bold(), description.dimmed())
        }
        _ => name.bold().to_string(),
    }
}
