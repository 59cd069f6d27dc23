//! Command-line front end.
//!
//! Subcommands mirror the library split: `manifest` runs the derivation
//! pipeline, `batch` the orchestrator, `record` the on-demand trigger,
//! `scenarios` lists the catalog. Machine-readable output (manifest
//! JSON, progress events, summary line) goes to stdout; logs and the
//! human summary go to stderr. Exit codes: 0 success, 1 failure, 2
//! usage error.

use std::fs;
use std::path::PathBuf;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use flowcov_batch::{
    detect_runner_version, trigger_recording, BatchConfig, BatchMode, BatchOrchestrator,
    JsonlSink, NullSink, ProcessRunner, ProgressSink, RecordingConfig, RunnerConfig,
    SqliteRunStore,
};
use flowcov_core::{
    build_manifest, fill_uncovered, known_path_ids, scenario_catalog, validate_catalog,
    ManifestConfig,
};

const HELP: &str = r"flowcov - flow coverage derivation and batch execution

USAGE:
    flowcov <COMMAND> [OPTIONS]

COMMANDS:
    manifest     Derive the coverage manifest from routes, components and flow scripts
    batch        Run the scenario catalog with hash-gated caching
    record       Capture a recording for one graph path
    scenarios    List the curated scenario catalog
    help         Show this message

MANIFEST OPTIONS:
    --suite <DIR>       Flow-script suite directory (default e2e/flows)
    --routes <DIR>      Route tree root (default app)
    --features <DIR>    Feature tree root (default features)
    --output <FILE>     Write the manifest to a file instead of stdout

BATCH OPTIONS:
    --suite <DIR>       Flow-script suite directory (default e2e/flows)
    --store <FILE>      Run store database (default flowcov.db)
    --recordings <DIR>  Recording output directory (default e2e/recordings)
    --events <FILE>     Write progress events to a file instead of stdout
    --runner <BIN>      Flow tool binary (default maestro)
    --failed-only       Re-run only scenarios whose latest run failed
    --quiet             Suppress progress events and the text summary

RECORD OPTIONS:
    --path-id <ID>      Graph path to record (required)
    --suite <DIR>       Flow-script suite directory (default e2e/flows)
    --recordings <DIR>  Recording output directory (default e2e/recordings)
    --store <FILE>      Run store database (default flowcov.db)
    --runner <BIN>      Flow tool binary (default maestro)

SCENARIOS OPTIONS:
    --json              Emit the catalog as JSON

Exit codes: 0 success, 1 failure, 2 usage error.
";

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    std::process::exit(run_cli(&args));
}

fn run_cli(args: &[String]) -> i32 {
    match args.first().map(String::as_str) {
        None | Some("help" | "--help" | "-h") => {
            print!("{HELP}");
            0
        }
        Some("manifest") => cmd_manifest(&args[1..]),
        Some("batch") => cmd_batch(&args[1..]),
        Some("record") => cmd_record(&args[1..]),
        Some("scenarios") => cmd_scenarios(&args[1..]),
        Some(other) => {
            eprintln!("unknown command `{other}`, see `flowcov help`");
            2
        }
    }
}

// ── manifest ─────────────────────────────────────────────────────────────

fn cmd_manifest(args: &[String]) -> i32 {
    let mut config = ManifestConfig::default();
    let mut output: Option<PathBuf> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--suite" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    return usage_error("--suite needs a directory");
                };
                config.suite_dir = PathBuf::from(value);
            }
            "--routes" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    return usage_error("--routes needs a directory");
                };
                config.routes.routes_root = PathBuf::from(value);
            }
            "--features" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    return usage_error("--features needs a directory");
                };
                config.routes.features_root = PathBuf::from(value);
            }
            "--output" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    return usage_error("--output needs a file");
                };
                output = Some(PathBuf::from(value));
            }
            other => {
                return usage_error(&format!("unknown manifest flag `{other}`"));
            }
        }
        i += 1;
    }

    let mut manifest = build_manifest(&config);
    fill_uncovered(&mut manifest, &known_path_ids());
    let json = match manifest.to_json() {
        Ok(json) => json,
        Err(err) => {
            eprintln!("error: {err}");
            return 1;
        }
    };
    match output {
        Some(path) => {
            if let Err(err) = fs::write(&path, format!("{json}\n")) {
                eprintln!("error: cannot write {}: {err}", path.display());
                return 1;
            }
            tracing::info!(output = %path.display(), tests = manifest.tests.len(), "manifest written");
        }
        None => println!("{json}"),
    }
    0
}

// ── batch ────────────────────────────────────────────────────────────────

fn cmd_batch(args: &[String]) -> i32 {
    let mut config = BatchConfig::default();
    let mut runner_config = RunnerConfig::default();
    let mut store_path = PathBuf::from("flowcov.db");
    let mut events_path: Option<PathBuf> = None;
    let mut quiet = false;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--suite" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    return usage_error("--suite needs a directory");
                };
                config.suite_dir = PathBuf::from(value);
            }
            "--store" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    return usage_error("--store needs a file");
                };
                store_path = PathBuf::from(value);
            }
            "--recordings" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    return usage_error("--recordings needs a directory");
                };
                config.recordings_dir = PathBuf::from(value);
            }
            "--events" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    return usage_error("--events needs a file");
                };
                events_path = Some(PathBuf::from(value));
            }
            "--runner" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    return usage_error("--runner needs a binary");
                };
                runner_config.binary = value.clone();
            }
            "--failed-only" => config.mode = BatchMode::FailedOnly,
            "--quiet" => quiet = true,
            other => {
                return usage_error(&format!("unknown batch flag `{other}`"));
            }
        }
        i += 1;
    }

    if let Some(version) = detect_runner_version(&runner_config.binary) {
        tracing::info!(runner = %runner_config.binary, version = %version, "flow tool detected");
    }
    let mut store = match SqliteRunStore::open(&store_path) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("error: cannot open store {}: {err}", store_path.display());
            return 1;
        }
    };
    let mut sink: Box<dyn ProgressSink> = if let Some(path) = &events_path {
        match fs::File::create(path) {
            Ok(file) => Box::new(JsonlSink::new(file)),
            Err(err) => {
                eprintln!("error: cannot create events file {}: {err}", path.display());
                return 1;
            }
        }
    } else if quiet {
        Box::new(NullSink)
    } else {
        Box::new(JsonlSink::new(std::io::stdout()))
    };

    let orchestrator = BatchOrchestrator::new(config, ProcessRunner::new(runner_config));
    let summary = match orchestrator.run_batch(&mut store, sink.as_mut()) {
        Ok(summary) => summary,
        Err(err) => {
            eprintln!("error: {err}");
            return 1;
        }
    };
    match summary.to_json() {
        Ok(line) => println!("{line}"),
        Err(err) => {
            eprintln!("error: {err}");
            return 1;
        }
    }
    if !quiet {
        eprint!("{}", summary.render_summary());
    }
    i32::from(!summary.all_green())
}

// ── record ───────────────────────────────────────────────────────────────

fn cmd_record(args: &[String]) -> i32 {
    let mut config = RecordingConfig::default();
    let mut runner_config = RunnerConfig::default();
    let mut store_path = PathBuf::from("flowcov.db");
    let mut path_id: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--path-id" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    return usage_error("--path-id needs a graph path id");
                };
                path_id = Some(value.clone());
            }
            "--suite" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    return usage_error("--suite needs a directory");
                };
                config.suite_dir = PathBuf::from(value);
            }
            "--recordings" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    return usage_error("--recordings needs a directory");
                };
                config.recordings_dir = PathBuf::from(value);
            }
            "--store" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    return usage_error("--store needs a file");
                };
                store_path = PathBuf::from(value);
            }
            "--runner" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    return usage_error("--runner needs a binary");
                };
                runner_config.binary = value.clone();
            }
            other => {
                return usage_error(&format!("unknown record flag `{other}`"));
            }
        }
        i += 1;
    }
    let Some(path_id) = path_id else {
        return usage_error("record needs --path-id");
    };

    let mut store = match SqliteRunStore::open(&store_path) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("error: cannot open store {}: {err}", store_path.display());
            return 1;
        }
    };
    let runner = ProcessRunner::new(runner_config);
    match trigger_recording(&config, &runner, &mut store, &path_id) {
        Ok(meta) => match serde_json::to_string(&meta) {
            Ok(line) => {
                println!("{line}");
                0
            }
            Err(err) => {
                eprintln!("error: {err}");
                1
            }
        },
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    }
}

// ── scenarios ────────────────────────────────────────────────────────────

fn cmd_scenarios(args: &[String]) -> i32 {
    let mut as_json = false;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--json" => as_json = true,
            other => {
                return usage_error(&format!("unknown scenarios flag `{other}`"));
            }
        }
        i += 1;
    }

    for problem in validate_catalog() {
        eprintln!("warning: {problem}");
    }
    let scenarios = scenario_catalog();
    if as_json {
        match serde_json::to_string_pretty(&scenarios) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("error: {err}");
                return 1;
            }
        }
    } else {
        println!("{:<26} {:<22} {:<20} STEPS", "SCENARIO", "FLOW", "SCRIPT");
        for s in scenarios {
            let script = s.test_file.as_deref().unwrap_or("-");
            let steps = s
                .step_indices
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            println!("{:<26} {:<22} {:<20} {steps}", s.id, s.parent_path_id, script);
        }
    }
    0
}

fn usage_error(message: &str) -> i32 {
    eprintln!("{message}, see `flowcov help`");
    2
}

// ── Tests ────────────────────────────────────────────────────────────────
