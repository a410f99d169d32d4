//! Thin CLI layer: parse args, styled output, and call into revchain-core.
//! Crash-proof: panic caught and reported; all errors return Result.

use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::env;
use std::io::IsTerminal;
use std::path::PathBuf;

use revchain_core::{
    Artifact, ChainConfig, Coordinate, DownloadOptions, DownloadStatus, ResolveError,
    ResolvedModule, Resolver,
};

// ---- UI helpers (no-op when stdout isn't a TTY) ----

fn use_color() -> bool {
    std::io::stdout().is_terminal() && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn success(msg: &str) {
    if use_color() {
        println!("{}", msg.green());
    } else {
        println!("{}", msg);
    }
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn warning(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.yellow());
    } else {
        eprintln!("{}", msg);
    }
}

fn info(msg: &str) {
    if use_color() {
        println!("{}", msg.cyan());
    } else {
        println!("{}", msg);
    }
}

fn dim(msg: &str) {
    if use_color() {
        println!("{}", msg.dimmed());
    } else {
        println!("{}", msg);
    }
}

fn coordinates(sub_m: &ArgMatches) -> Result<Vec<Coordinate>, String> {
    sub_m
        .get_many::<String>("coordinate")
        .map(|it| it.map(|s| s.parse::<Coordinate>()).collect())
        .unwrap_or_else(|| Ok(Vec::new()))
}

fn load_config() -> ChainConfig {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    revchain_core::load_config(&cwd)
}

/// `core.jar` -> (`core`, `jar`). A missing extension is an error.
fn split_artifact(spec: &str) -> Result<(String, String), String> {
    match spec.rsplit_once('.') {
        Some((name, ext)) if !name.is_empty() && !ext.is_empty() => Ok((name.to_string(), ext.to_string())),
        _ => Err(format!("Artifact must look like <name>.<ext>, got '{}'", spec)),
    }
}

fn module_json(module: &ResolvedModule) -> serde_json::Value {
    json!({
        "id": module.id.to_string(),
        "version": module.revision(),
        "status": module.status,
        "published": module.published.to_rfc3339(),
        "resolver": module.resolver,
    })
}

fn cmd_resolve(sub_m: &ArgMatches) -> Result<(), String> {
    let requests = coordinates(sub_m)?;
    let json_out = sub_m.get_flag("json");
    let cfg = load_config();
    let chain = revchain_core::build_chain(&cfg)?;
    let ctx = cfg.context();

    revchain_core::log_debug(&format!("Resolving {} coordinate(s) through '{}'", requests.len(), chain.name()));
    let results = revchain_core::resolve_all(&chain, &requests, &ctx);
    let unresolved = results.iter().filter(|(_, r)| !matches!(r, Ok(Some(_)))).count();

    if json_out {
        let out: Vec<serde_json::Value> = results
            .iter()
            .map(|(requested, result)| match result {
                Ok(Some(module)) => json!({
                    "requested": requested.to_string(),
                    "outcome": "resolved",
                    "module": module_json(module),
                }),
                Ok(None) => json!({ "requested": requested.to_string(), "outcome": "not-found" }),
                Err(e) => json!({
                    "requested": requested.to_string(),
                    "outcome": "failed",
                    "error": e.to_string(),
                }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out).map_err(|e| e.to_string())?);
    } else {
        for (requested, result) in &results {
            print_resolution(requested, result);
        }
    }

    if unresolved > 0 {
        return Err(format!("{} of {} request(s) could not be resolved", unresolved, results.len()));
    }
    Ok(())
}

fn print_resolution(requested: &Coordinate, result: &Result<Option<ResolvedModule>, ResolveError>) {
    match result {
        Ok(Some(module)) => success(&format!("{} -> {} ({})", requested, module.id, module.resolver)),
        Ok(None) => warning(&format!("{}: not found in any repository", requested)),
        Err(e) => error(&e.to_string()),
    }
}

fn cmd_download(sub_m: &ArgMatches) -> Result<(), String> {
    let requests = coordinates(sub_m)?;
    let artifact_spec = sub_m.get_one::<String>("artifact").cloned();
    let options = DownloadOptions {
        destination: sub_m.get_one::<String>("dest").map(PathBuf::from),
        verify_checksums: sub_m.get_flag("verify"),
    };
    let cfg = load_config();
    let chain = revchain_core::build_chain(&cfg)?;
    let ctx = cfg.context();

    let mut artifacts = Vec::new();
    let mut problems = 0usize;
    for (requested, result) in revchain_core::resolve_all(&chain, &requests, &ctx) {
        match result {
            Ok(Some(module)) => {
                let artifact = match &artifact_spec {
                    Some(spec) => {
                        let (name, ext) = split_artifact(spec)?;
                        Artifact::new(module.id.clone(), name, ext)
                    }
                    None => Artifact::main(module.id.clone(), "jar"),
                };
                artifacts.push(artifact);
            }
            other => {
                print_resolution(&requested, &other);
                problems += 1;
            }
        }
    }

    let bar = if use_color() {
        ProgressBar::new(artifacts.len() as u64)
    } else {
        ProgressBar::hidden()
    };
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{bar:30.cyan/blue} {pos}/{len} {msg}")
            .map_err(|e| e.to_string())?,
    );

    let mut reports = Vec::new();
    for artifact in &artifacts {
        bar.set_message(artifact.file_name());
        let report = chain.download_artifacts(std::slice::from_ref(artifact), &options);
        reports.extend(report.artifacts);
        bar.inc(1);
    }
    bar.finish_and_clear();

    for report in &reports {
        let where_to = report
            .local_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let from = report.resolver.as_deref().unwrap_or("-");
        match report.status {
            DownloadStatus::Successful => {
                success(&format!("{} -> {} ({})", report.artifact, where_to, from))
            }
            DownloadStatus::NoChange => dim(&format!("{} up to date at {} ({})", report.artifact, where_to, from)),
            DownloadStatus::Failed => {
                problems += 1;
                error(&format!(
                    "{}: {}",
                    report.artifact,
                    report.message.as_deref().unwrap_or("download failed")
                ));
            }
        }
    }

    if problems > 0 {
        return Err(format!("{} problem(s) while downloading", problems));
    }
    Ok(())
}

fn cmd_memo(sub_m: &ArgMatches) -> Result<(), String> {
    let cfg = load_config();
    let store = cfg.dynamic_version_store();
    match sub_m.subcommand() {
        Some(("list", list_m)) => {
            let entries = store.list();
            if list_m.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&entries).map_err(|e| e.to_string())?);
                return Ok(());
            }
            if entries.is_empty() {
                dim("No memoized dynamic versions.");
                return Ok(());
            }
            for e in entries {
                let saved = chrono::DateTime::from_timestamp_millis(e.saved_at_millis as i64)
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                println!("{}  {} -> {}  (saved {})", e.resolver, e.requested, e.module.id.version, saved);
            }
        }
        Some(("clear", _)) => {
            let count = store.list().len();
            store.clear()?;
            success(&format!("Cleared {} memoized dynamic version(s).", count));
        }
        _ => return Err("Use `revchain memo list` or `revchain memo clear`".to_string()),
    }
    Ok(())
}

fn cmd_repos() -> Result<(), String> {
    let cfg = load_config();
    match &cfg.source {
        Some(path) => dim(&format!("Config: {}", path.display())),
        None => dim("Config: defaults (no .revchainrc found)"),
    }
    if cfg.repositories.is_empty() {
        info("No repositories configured. Add them to .revchainrc under \"repositories\".");
        return Ok(());
    }
    for (i, repo) in cfg.repositories.iter().enumerate() {
        println!("{}. {}  {}", i + 1, repo.name, repo.path.display());
    }
    Ok(())
}

fn run() -> Result<(), String> {
    let coordinate_arg = Arg::new("coordinate")
        .required(true)
        .num_args(1..)
        .help("Module coordinate(s) as group:name:version (version may be dynamic, e.g. 1.+)");

    let matches = Command::new("revchain")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Resolve modules through an ordered chain of repositories")
        .after_help(
            "Examples:\n  revchain resolve org.acme:core:1.+\n  revchain download org.acme:core:1.2 --dest lib\n  revchain memo list\n  revchain repos",
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("resolve")
                .about("Resolve coordinates against the configured repositories")
                .arg(coordinate_arg.clone())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print results as JSON"),
                ),
        )
        .subcommand(
            Command::new("download")
                .about("Resolve coordinates, then download an artifact of each")
                .arg(coordinate_arg)
                .arg(
                    Arg::new("artifact")
                        .long("artifact")
                        .value_name("NAME.EXT")
                        .help("Artifact file to fetch (default: <module>.jar)"),
                )
                .arg(
                    Arg::new("dest")
                        .long("dest")
                        .value_name("DIR")
                        .help("Destination directory (default: the cache)"),
                )
                .arg(
                    Arg::new("verify")
                        .long("verify")
                        .action(ArgAction::SetTrue)
                        .help("Check artifacts against .sha256 sidecar files"),
                ),
        )
        .subcommand(
            Command::new("memo")
                .about("Inspect the dynamic version cache")
                .subcommand_required(true)
                .subcommand(
                    Command::new("list").about("List memoized dynamic versions").arg(
                        Arg::new("json")
                            .long("json")
                            .action(ArgAction::SetTrue)
                            .help("Print entries as JSON"),
                    ),
                )
                .subcommand(Command::new("clear").about("Forget all memoized dynamic versions")),
        )
        .subcommand(Command::new("repos").about("List configured repositories in resolution order"))
        .get_matches();

    match matches.subcommand() {
        Some(("resolve", sub_m)) => cmd_resolve(sub_m),
        Some(("download", sub_m)) => cmd_download(sub_m),
        Some(("memo", sub_m)) => cmd_memo(sub_m),
        Some(("repos", _)) => cmd_repos(),
        _ => Err("Unknown command. Run `revchain --help`.".to_string()),
    }
}

fn main() {
    if !use_color() {
        colored::control::set_override(false);
    }

    let code = match std::panic::catch_unwind(run) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error(&e);
            1
        }
        Err(_) => {
            error("An unexpected error occurred. Please report this issue.");
            1
        }
    };
    std::process::exit(code);
}
