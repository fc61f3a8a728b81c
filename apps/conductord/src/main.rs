mod probe;
mod runtime_file;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use conductor_events::{load_trace, replay};
use conductor_kernel::Conductor;
use conductor_protocol::{
    ConductorSnapshot, ModuleId, PortRef, SwapMode, ToolTarget, ValidationBoundary,
    ValidationIssue, WiringEdge,
};
use serde_json::json;
use tokio::fs;
use tracing::{info, warn};

use crate::probe::{DEFAULT_PROBE_URLS, run_probe};
use crate::runtime_file::{
    ModuleProfileFile, PersistedModule, RUNTIME_FILE, RejectedInput, RuntimeConfigFile,
    default_manifest,
};

#[derive(Debug, Parser)]
#[command(name = "conductord")]
#[command(about = "Conductor daemon for MCP app modules")]
struct Cli {
    #[arg(long, global = true, default_value = RUNTIME_FILE)]
    runtime_file: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show current module and wiring inventory.
    Dev,
    /// Run a protocol conformance probe.
    Probe {
        #[arg(long = "url", alias = "servers", value_delimiter = ',')]
        urls: Vec<String>,
    },
    /// Register a module endpoint and profile.
    Connect {
        #[arg(long)]
        id: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        profile: Option<PathBuf>,
    },
    /// Create or update a wiring edge.
    Wire {
        /// module:port
        #[arg(long)]
        from: String,
        /// module:tool:arg
        #[arg(long)]
        to: String,
        #[arg(long)]
        id: Option<String>,
    },
    /// Plan a tiered swap and re-home the wiring.
    Swap {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "auto")]
        mode: SwapMode,
    },
    /// Print the newest flight-recorder entries.
    Trace {
        #[arg(long, alias = "tail", default_value_t = 20)]
        limit: usize,
        /// Fold the trace and print the resulting state summary.
        #[arg(long)]
        replay: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            match error.downcast_ref::<RejectedInput>() {
                Some(RejectedInput(outcome)) => {
                    let rendered = serde_json::to_string_pretty(outcome)
                        .unwrap_or_else(|_| outcome.message.clone());
                    eprintln!("{rendered}");
                }
                None => eprintln!("{error:#}"),
            }
            1
        }
    };
    std::process::exit(code);
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn summary(state: &ConductorSnapshot, trace_file: &Path) -> serde_json::Value {
    let modules: Vec<_> = state
        .modules
        .values()
        .map(|module| json!({ "id": module.id, "url": module.url, "status": module.status }))
        .collect();
    json!({
        "modules": modules,
        "wiring": state.wiring,
        "viewCount": state.views.len(),
        "eventCount": state.events.len(),
        "traceFile": trace_file,
    })
}

/// Record a flag failure at `cli.flags` and turn it into an error.
fn reject_flag(
    conductor: &Conductor,
    message: String,
    issue: ValidationIssue,
) -> anyhow::Error {
    let rejected = RejectedInput::new(
        ValidationBoundary::CliFlags,
        conductor.policy(),
        message,
        vec![issue],
    );
    if let Err(error) = conductor.report_validation_outcome(rejected.0.clone()) {
        warn!(%error, "failed recording flag outcome");
    }
    rejected.into()
}

async fn read_profile(path: &Path, runtime: &RuntimeConfigFile) -> Result<ModuleProfileFile> {
    let policy = &runtime.validation_policy;
    let text = fs::read_to_string(path).await.map_err(|error| {
        RejectedInput::new(
            ValidationBoundary::CliProfile,
            policy,
            format!("Unable to read profile file \"{}\".", path.display()),
            vec![ValidationIssue::new("<root>", error.to_string(), "read_error")],
        )
    })?;
    let profile = serde_json::from_str(&text).map_err(|error| {
        let code = if error.is_syntax() || error.is_eof() {
            "invalid_json"
        } else {
            "invalid_type"
        };
        RejectedInput::new(
            ValidationBoundary::CliProfile,
            policy,
            format!("Profile file \"{}\" failed validation.", path.display()),
            vec![ValidationIssue::new("<root>", error.to_string(), code)],
        )
    })?;
    Ok(profile)
}

async fn run(cli: Cli) -> Result<i32> {
    if let Command::Probe { urls } = &cli.command {
        let urls: Vec<String> = if urls.is_empty() {
            DEFAULT_PROBE_URLS.iter().map(|url| (*url).to_owned()).collect()
        } else {
            urls.clone()
        };
        let mut reports = Vec::with_capacity(urls.len());
        for url in &urls {
            reports.push(run_probe(url).await);
        }
        let ok = reports.iter().all(probe::ProbeReport::passed);
        print_json(&json!({ "ok": ok, "reports": reports }))?;
        return Ok(if ok { 0 } else { 1 });
    }

    let mut runtime = RuntimeConfigFile::load(&cli.runtime_file).await?;
    let trace_file = runtime.trace_path();

    if let Command::Trace { limit, replay: fold } = cli.command {
        let events = load_trace(&trace_file).await?;
        if events.is_empty() {
            println!("No trace file found yet.");
            return Ok(0);
        }
        if fold {
            print_json(&summary(&replay(events.iter()), &trace_file))?;
        } else {
            let skip = events.len().saturating_sub(limit.max(1));
            for event in &events[skip..] {
                println!("{}", serde_json::to_string(event)?);
            }
        }
        return Ok(0);
    }

    let conductor = runtime.conductor();
    let mut events = conductor.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(event_type = %event.event_type, trace_id = %event.trace_id, "event.appended");
        }
    });

    let result = execute(cli.command, &conductor, &mut runtime, &cli.runtime_file).await;
    conductor.close().await;
    event_task.abort();
    result.map(|()| 0)
}

async fn execute(
    command: Command,
    conductor: &Conductor,
    runtime: &mut RuntimeConfigFile,
    runtime_path: &Path,
) -> Result<()> {
    runtime.hydrate(conductor).await?;

    match command {
        Command::Dev => print_json(&summary(&conductor.get_state(), &runtime.trace_path())),
        Command::Connect { id, url, profile } => {
            let (manifest, profile) = match profile {
                Some(path) => {
                    let file = read_profile(&path, runtime).await?;
                    (file.manifest, file.runtime)
                }
                None => (default_manifest(&id), None),
            };
            let module = PersistedModule {
                id: ModuleId::from(id),
                url,
                manifest: Some(manifest),
                profile,
                transport_adapter_id: None,
            };
            conductor.register_module(module.registration()).await?;
            let mut capabilities = conductor.discover_capabilities(Some(&module.id)).await?;

            let output = json!({
                "id": module.id,
                "url": module.url,
                "capabilities": capabilities.shift_remove(&module.id),
            });
            runtime.modules.insert(module.id.clone(), module);
            runtime.wiring = conductor.get_state().wiring.clone();
            runtime.save(runtime_path).await?;
            print_json(&output)
        }
        Command::Wire { from, to, id } => {
            let source = PortRef::parse(&from).map_err(|issue| {
                reject_flag(
                    conductor,
                    format!("Invalid --from value \"{from}\". Expected module:port."),
                    issue,
                )
            })?;
            let target = ToolTarget::parse(&to).map_err(|issue| {
                reject_flag(
                    conductor,
                    format!("Invalid --to value \"{to}\". Expected module:tool:arg."),
                    issue,
                )
            })?;
            let edge = conductor.connect_ports(WiringEdge::new(
                id.unwrap_or_default(),
                source,
                target,
            ))?;
            runtime.wiring = conductor.get_state().wiring.clone();
            runtime.save(runtime_path).await?;
            print_json(&edge)
        }
        Command::Swap { from, to, mode } => {
            let plan = conductor
                .swap_module(&ModuleId::from(from), &ModuleId::from(to), mode)
                .await?;
            runtime.wiring = conductor.get_state().wiring.clone();
            runtime.save(runtime_path).await?;
            print_json(&plan)
        }
        Command::Probe { .. } | Command::Trace { .. } => Ok(()),
    }
}
