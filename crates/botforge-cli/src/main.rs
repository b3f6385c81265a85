//! botforge command-line tools.
//!
//! Provides the `botforge` binary:
//! - `check` compiles one program from a source directory and prints its
//!   diagnostics.
//! - `run` spawns one processor entity running a program and advances a
//!   headless simulation, printing sync messages and a final report.
//!
//! Simulation settings come from an optional JSON config file plus
//! `BOTFORGE_*` environment variables (see `SimConfig::apply_env`).

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};

use botforge_compile::asm::AsmFrontend;
use botforge_compile::resolver::LocalResolver;
use botforge_compile::{
    CompilationRegistry, CompilationScheduler, CompilationStatus, Dispatcher, InlineDispatcher,
    TokioDispatcher,
};
use botforge_core::{ExternalSignature, PeripheralKind, SourceId, TeamId, Vec2};
use botforge_sim::{EntitySpec, SimConfig, Simulation};
use botforge_vm::ExternalTable;

/// botforge program tools.
#[derive(Parser)]
#[command(name = "botforge", about = "Compile and run botforge machine programs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a program once and print its diagnostics.
    Check {
        /// Directory holding the program and its includes.
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Program path relative to the directory.
        program: String,
    },

    /// Run a program on one entity in a headless simulation.
    Run {
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        program: String,

        /// Number of ticks to simulate.
        #[arg(short, long, default_value_t = 600)]
        ticks: u64,

        /// Instructions per tick (overrides config).
        #[arg(short, long)]
        budget: Option<u32>,

        /// JSON config file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "none")]
        peripheral: PeripheralArg,

        #[arg(long)]
        drive: bool,

        #[arg(long)]
        radar: bool,

        #[arg(long)]
        pendrive: bool,

        /// Console lines queued before the first tick.
        #[arg(long = "stdin")]
        stdin: Vec<String>,

        /// Resource node as `x,y,amount`.
        #[arg(long = "resource", value_parser = parse_resource)]
        resources: Vec<(Vec2, u32)>,

        /// Compile on the simulation thread instead of a worker pool.
        #[arg(long)]
        inline: bool,

        /// Pace ticks at the configured tick rate.
        #[arg(long)]
        realtime: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PeripheralArg {
    None,
    Turret,
    Extractor,
    Transporter,
    Facility,
}

impl From<PeripheralArg> for PeripheralKind {
    fn from(arg: PeripheralArg) -> Self {
        match arg {
            PeripheralArg::None => PeripheralKind::None,
            PeripheralArg::Turret => PeripheralKind::Turret,
            PeripheralArg::Extractor => PeripheralKind::Extractor,
            PeripheralArg::Transporter => PeripheralKind::Transporter,
            PeripheralArg::Facility => PeripheralKind::Facility,
        }
    }
}

fn parse_resource(text: &str) -> Result<(Vec2, u32), String> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    let [x, y, amount] = parts.as_slice() else {
        return Err(format!("expected x,y,amount, got '{}'", text));
    };
    let x: f32 = x.parse().map_err(|e| format!("bad x '{}': {}", x, e))?;
    let y: f32 = y.parse().map_err(|e| format!("bad y '{}': {}", y, e))?;
    let amount: u32 = amount
        .parse()
        .map_err(|e| format!("bad amount '{}': {}", amount, e))?;
    Ok((Vec2::new(x, y), amount))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Check { dir, program } => run_check(&dir, &program),
        Commands::Run {
            dir,
            program,
            ticks,
            budget,
            config,
            peripheral,
            drive,
            radar,
            pendrive,
            stdin,
            resources,
            inline,
            realtime,
        } => {
            let options = RunOptions {
                ticks,
                budget,
                config,
                peripheral: peripheral.into(),
                drive,
                radar,
                pendrive,
                stdin,
                resources,
                inline,
                realtime,
            };
            run_simulation(&dir, &program, options).await
        }
    };
    process::exit(exit_code);
}

fn load_sources(dir: &Path) -> Option<Arc<LocalResolver>> {
    match LocalResolver::from_dir(dir) {
        Ok(resolver) => Some(Arc::new(resolver)),
        Err(e) => {
            eprintln!("Error: failed to read '{}': {}", dir.display(), e);
            None
        }
    }
}

/// Execute the check subcommand.
///
/// Returns exit code: 0 = success, 1 = compile errors, 2 = missing
/// dependency, 3 = I/O error.
fn run_check(dir: &Path, program: &str) -> i32 {
    let Some(resolver) = load_sources(dir) else {
        return 3;
    };
    let signatures: Arc<[ExternalSignature]> = ExternalTable::standard().signature_list().into();
    let mut scheduler = CompilationScheduler::new(
        Arc::new(CompilationRegistry::new()),
        resolver.clone(),
        Arc::new(AsmFrontend::new()),
        Box::new(InlineDispatcher),
        signatures,
        Default::default(),
    );

    let source = SourceId::local(program);
    let now = Instant::now();
    let handle = scheduler.request(&source, now);
    scheduler.tick(now);

    let record = handle.read();
    if record.status() != CompilationStatus::Done {
        eprintln!("{}: waiting on unavailable sources:", source);
        for missing in resolver.fetch_requests() {
            eprintln!("  - {}", missing);
        }
        return 2;
    }
    for diagnostic in record.diagnostics() {
        eprintln!("{}: {}", source, diagnostic);
    }
    match record.runnable() {
        Some((version, program)) => {
            println!(
                "{}: ok ({} instructions, version {})",
                source,
                program.bytecode.len(),
                version.0
            );
            0
        }
        None => {
            eprintln!("{}: compilation failed", source);
            1
        }
    }
}

struct RunOptions {
    ticks: u64,
    budget: Option<u32>,
    config: Option<PathBuf>,
    peripheral: PeripheralKind,
    drive: bool,
    radar: bool,
    pendrive: bool,
    stdin: Vec<String>,
    resources: Vec<(Vec2, u32)>,
    inline: bool,
    realtime: bool,
}

/// Execute the run subcommand.
///
/// Returns exit code: 0 = ran all ticks, 3 = config or I/O error.
async fn run_simulation(dir: &Path, program: &str, options: RunOptions) -> i32 {
    let mut config = match SimConfig::load(options.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 3;
        }
    };
    if let Some(budget) = options.budget {
        config.engine.instruction_budget = budget;
    }
    let Some(resolver) = load_sources(dir) else {
        return 3;
    };

    let dispatcher: Box<dyn Dispatcher> = match TokioDispatcher::current() {
        Some(dispatcher) if !options.inline => Box::new(dispatcher),
        _ => Box::new(InlineDispatcher),
    };
    let tick_duration = config.tick_duration();
    let mut sim = Simulation::new(config, resolver, Arc::new(AsmFrontend::new()), dispatcher);

    for (position, amount) in &options.resources {
        sim.world_mut().add_resource(*position, *amount);
    }
    let mut spec = EntitySpec::new(TeamId(1))
        .program(SourceId::local(program))
        .peripheral(options.peripheral);
    if options.drive {
        spec = spec.with_drive();
    }
    if options.radar {
        spec = spec.with_radar();
    }
    if options.pendrive {
        spec = spec.with_pendrive();
    }
    let id = sim.spawn(spec);
    for line in options.stdin {
        if let Err(e) = sim.provide_stdin(id, line.into_bytes()) {
            eprintln!("Error: {}", e);
            return 3;
        }
    }

    let mut interval = tokio::time::interval(tick_duration);
    let mut instructions = 0u64;
    for _ in 0..options.ticks {
        if options.realtime {
            interval.tick().await;
        } else {
            tokio::task::yield_now().await;
        }
        let summary = if options.realtime {
            sim.tick(Instant::now())
        } else {
            sim.step()
        };
        instructions += summary.instructions;

        for outbound in sim.take_outbound() {
            let line = serde_json::json!({ "to": outbound.to, "message": outbound.message });
            println!("{}", line);
        }
        if sim.world().entity(id).is_none() {
            break;
        }
    }

    let entity = sim.world().entity(id);
    let report = serde_json::json!({
        "ticks": sim.tick_count(),
        "instructions": instructions,
        "signal": sim.processor(id).map(|p| format!("{:?}", p.signal())),
        "crash_message": sim.processor(id).and_then(|p| p.crash_message()),
        "stdout": sim
            .processor(id)
            .map(|p| String::from_utf8_lossy(p.memory().stdout()).into_owned()),
        "position": entity.map(|e| e.transform.position),
        "heading": entity.map(|e| e.transform.heading),
        "health": entity.map(|e| e.health),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).unwrap_or_else(|e| {
            format!("{{\"error\": \"failed to serialize report: {}\"}}", e)
        })
    );
    tracing::info!(ticks = sim.tick_count(), instructions, "simulation finished");
    0
}
