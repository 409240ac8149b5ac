#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use miette::NamedSource;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

use pgas_core::{find_config, Checker, CheckerConfig, OverlapPolicy};
use pgas_explore::{ExplorationReport, Explorer, Program, Scenario};

mod report;

#[derive(Parser, Debug)]
#[command(
    name = "pgas-check",
    version,
    about = "Finds symmetric-memory misuse in PGAS (OpenSHMEM-style) call traces"
)]
struct Cli {
    /// Scenario file (`.toml` or `.json`).
    scenario: PathBuf,

    /// Checker config. Defaults to the nearest `pgas-check.toml` above the scenario.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Built-in call table to use. Overrides the config.
    #[arg(long)]
    dialect: Option<String>,

    /// How undecided symbolic comparisons count when testing ranges for overlap.
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Report every occurrence of a violation kind on a path, not only the first.
    #[arg(long)]
    all_reports: bool,

    /// Stop exploring after this many complete paths.
    #[arg(long)]
    max_paths: Option<usize>,

    /// Print a JSON report on stdout instead of rendered diagnostics.
    #[arg(long)]
    json: bool,

    /// Raise log verbosity (repeatable: info, debug, trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum PolicyArg {
    /// Disjoint only when one range is proven to precede the other.
    Conservative,
    /// Overlapping only when neither range can precede the other.
    Feasibility,
}

impl From<PolicyArg> for OverlapPolicy {
    fn from(v: PolicyArg) -> Self {
        match v {
            PolicyArg::Conservative => OverlapPolicy::Conservative,
            PolicyArg::Feasibility => OverlapPolicy::Feasibility,
        }
    }
}

fn main() -> miette::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = resolve_config(&cli)?;
    let checker = Checker::from_config(config)?;
    log::info!("dialect `{}` with {} entry points", checker.dialect().name(), checker.dialect().len());

    let scenario = Scenario::load(&cli.scenario)?;
    let program = scenario.compile()?;

    let mut explorer = Explorer::new(checker);
    if let Some(max) = cli.max_paths {
        explorer = explorer.with_max_paths(max);
    }
    let report = explorer.explore(&program);

    if cli.json {
        println!("{}", report::to_json(&report::build(&program, &report))?);
    } else {
        render(&cli.scenario, &program, &report);
    }

    Ok(if report.has_violations() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    // Only fails if a logger is already installed.
    let _ = TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto);
}

/// Explicit `--config`, else the nearest config file, else defaults; then CLI overrides.
fn resolve_config(cli: &Cli) -> miette::Result<CheckerConfig> {
    let path = cli.config.clone().or_else(|| find_config(&cli.scenario));
    let mut config = match &path {
        Some(p) => {
            log::info!("using config {}", p.display());
            CheckerConfig::load(p)?
        }
        None => CheckerConfig::default(),
    };

    if let Some(name) = &cli.dialect {
        config.dialect.name = Some(name.clone());
    }
    if let Some(policy) = cli.policy {
        config.overlap_policy = policy.into();
    }
    if cli.all_reports {
        config.report_once_per_path = false;
    }
    Ok(config)
}

fn render(path: &Path, program: &Program, report: &ExplorationReport) {
    let source = program
        .source
        .as_ref()
        .map(|text| NamedSource::new(path.display().to_string(), text.clone()));

    let findings = report.distinct();
    for finding in &findings {
        let diagnostic = miette::Report::new(finding.violation.clone());
        let diagnostic = match &source {
            Some(src) => diagnostic.with_source_code(src.clone()),
            None => diagnostic,
        };
        eprintln!("{diagnostic:?}");

        if let Some(name) = finding.violation.region.and_then(|id| program.region_name(id)) {
            eprintln!("  region: {name}");
        }
        if report.paths.len() > 1 {
            eprintln!("  paths: {}", finding.paths.join(", "));
        }
    }

    let mut summary = format!(
        "{}: {} distinct violation(s) across {} path(s)",
        program.name,
        findings.len(),
        report.paths.len()
    );
    if report.truncated {
        summary.push_str(" (exploration truncated)");
    }
    println!("{summary}");
}
