//! rv-build CLI
//!
//! Entry point for the `rv-build` command-line tool.

use clap::{Parser, Subcommand};
use rv_build_lane::config::discover_host_config;
use rv_build_lane::signal::SignalHandler;
use rv_build_lane::status::StatusReporter;
use rv_build_lane::summary::{EXIT_CODE_ENVIRONMENT, EXIT_CODE_REJECTED, EXIT_CODE_SUCCESS};
use rv_build_lane::{
    CancellationToken, CliOverrides, EffectiveConfig, IsolationKind, LaneConfig, Method, Pipeline,
    StripPolicy, SubmissionPaths,
};
use rvb_sanitizer::SanitizeExplanation;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;
use tracing::{debug, error, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "rv-build")]
#[command(about = "Sanitize and cross-compile untrusted RISC-V submissions", version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sanitize and build one submission
    Run {
        /// Directory that holds all project directories
        project_base: PathBuf,

        /// Project directory, relative to the base
        project_dir: PathBuf,

        #[command(flatten)]
        build: BuildArgs,

        /// Time limit for the toolchain, in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Strip policy: all, retain or none
        #[arg(long)]
        strip: Option<StripPolicy>,

        /// Validate the source without writing it back
        #[arg(long)]
        pass_through: bool,
    },

    /// Run only the sanitizer over a file and explain the decision
    Check {
        file: PathBuf,

        /// Output JSON instead of text
        #[arg(long)]
        json: bool,

        /// Host config file (default: /etc/rv-build/lane.toml if present)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Print the toolchain invocation for a submission without running it
    Explain {
        project_base: PathBuf,

        project_dir: PathBuf,

        #[command(flatten)]
        build: BuildArgs,
    },
}

#[derive(clap::Args, Debug)]
struct BuildArgs {
    /// Target method: "linux" for the hosted target, anything else for bare-metal
    #[arg(long)]
    method: Option<String>,

    /// Isolation mode: direct, container or exec
    #[arg(long)]
    isolation: Option<IsolationKind>,

    /// Host config file (default: /etc/rv-build/lane.toml if present)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    debug!("rv-build v{} starting", env!("CARGO_PKG_VERSION"));

    let exit_code = match cli.command {
        Commands::Run {
            project_base,
            project_dir,
            build,
            timeout,
            strip,
            pass_through,
        } => {
            let overrides = CliOverrides {
                isolation: build.isolation,
                timeout_seconds: timeout,
                strip,
                pass_through,
            };
            run_build(project_base, project_dir, &build, &overrides)
        }
        Commands::Check { file, json, config } => run_check(file, json, config),
        Commands::Explain {
            project_base,
            project_dir,
            build,
        } => {
            let overrides = CliOverrides {
                isolation: build.isolation,
                ..CliOverrides::default()
            };
            run_explain(project_base, project_dir, &build, &overrides)
        }
    };

    process::exit(exit_code);
}

fn init_logging(cli: &Cli) {
    let level = if let Some(level_str) = &cli.log_level {
        parse_level(level_str)
    } else if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        let level_str = env::var("RV_BUILD_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        parse_level(&level_str)
    };

    let mut filter = EnvFilter::from_default_env();
    if env::var("RUST_LOG").is_err() {
        for crate_name in ["rv_build_lane", "rv_build"] {
            if let Ok(directive) = format!("{}={}", crate_name, level).parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

fn load_config(explicit: Option<PathBuf>, overrides: &CliOverrides) -> Option<LaneConfig> {
    let host = discover_host_config(explicit);
    match EffectiveConfig::build(host.as_deref(), overrides) {
        Ok(effective) => {
            debug!(sources = ?effective.sources, "configuration resolved");
            Some(effective.config)
        }
        Err(e) => {
            error!("Error loading config: {}", e);
            None
        }
    }
}

fn run_build(
    project_base: PathBuf,
    project_dir: PathBuf,
    build: &BuildArgs,
    overrides: &CliOverrides,
) -> i32 {
    let Some(config) = load_config(build.config.clone(), overrides) else {
        return EXIT_CODE_ENVIRONMENT;
    };

    let token = CancellationToken::new();
    let handler =
        match SubmissionPaths::new(project_base.clone(), &project_dir, config.artifacts.clone()) {
            Ok(paths) if paths.local_dir().is_dir() => {
                SignalHandler::with_status(token.clone(), StatusReporter::new(paths.status()))
            }
            _ => SignalHandler::new(token.clone()),
        };
    if let Err(e) = handler.install() {
        warn!("could not install signal handler: {}", e);
    }

    let method = Method::from_discriminant(build.method.as_deref());
    let pipeline = Pipeline::new(config).with_cancellation(token);
    match pipeline.run(project_base, project_dir, method) {
        Ok(outcome) => outcome.exit_code,
        Err(e) => e.exit_code(),
    }
}

fn run_check(file: PathBuf, json: bool, config: Option<PathBuf>) -> i32 {
    let Some(config) = load_config(config, &CliOverrides::default()) else {
        return EXIT_CODE_ENVIRONMENT;
    };

    let bytes = match fs::read(&file) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Error reading {}: {}", file.display(), e);
            return 1;
        }
    };

    let sanitizer = config.sanitizer.build();
    let explanation =
        SanitizeExplanation::from_outcome(&sanitizer.sanitize_bytes(&bytes).map(|_| ()));

    if json {
        match explanation.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Error serializing explanation: {}", e);
                return 1;
            }
        }
    } else {
        println!("{}", explanation.to_human());
    }

    if explanation.accepted {
        EXIT_CODE_SUCCESS
    } else {
        EXIT_CODE_REJECTED
    }
}

fn run_explain(
    project_base: PathBuf,
    project_dir: PathBuf,
    build: &BuildArgs,
    overrides: &CliOverrides,
) -> i32 {
    let Some(config) = load_config(build.config.clone(), overrides) else {
        return EXIT_CODE_ENVIRONMENT;
    };

    let method = Method::from_discriminant(build.method.as_deref());
    let invocation = match Pipeline::new(config).plan(project_base, project_dir, method) {
        Ok(invocation) => invocation,
        Err(e) => {
            error!("{}", e);
            return e.exit_code();
        }
    };

    match invocation.to_json() {
        Ok(json) => {
            println!("{}", json);
            EXIT_CODE_SUCCESS
        }
        Err(e) => {
            error!("Error serializing invocation: {}", e);
            1
        }
    }
}
