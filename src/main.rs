//! Repowhisper - generate a README for any repository.
//!
//! Runs the analyze/draft workflow over a local directory or a cloned
//! repository and prints the resulting README.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repowhisper::core::Config;
use repowhisper::repo::{self, DefaultMaterializer, SampleOptions};
use repowhisper::{
    build_orchestrator, AIManager, GenerateOptions, ReadmeService, RunId, RunReport, ServiceError,
    WorkflowError,
};

/// Generate a README for any repository
#[derive(Parser)]
#[command(name = "repowhisper")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default lookup
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a README for a repository
    Generate {
        /// Local path or git URL
        locator: String,

        /// Write the result to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Run id (derived from the locator by default)
        #[arg(long)]
        run_id: Option<String>,

        /// Maximum number of step invocations
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Resume from a stored checkpoint
        #[arg(long)]
        resume: bool,

        /// AI provider (auto, gemini, claude, ollama, none)
        #[arg(long, env = "REPOWHISPER_PROVIDER")]
        provider: Option<String>,

        /// Model override for the provider
        #[arg(long)]
        model: Option<String>,

        /// Directory for run checkpoints
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,
    },

    /// Show what the analysis step extracts, without calling a model
    Analyze {
        /// Directory to analyze
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List the AI providers that would be used
    Providers,

    /// Show configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Generate {
            locator,
            output,
            format,
            run_id,
            max_iterations,
            resume,
            provider,
            model,
            checkpoint_dir,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(provider) = provider {
                config.ai.provider = provider;
            }
            if model.is_some() {
                config.ai.model = model;
            }
            if checkpoint_dir.is_some() {
                config.workflow.checkpoint_dir = checkpoint_dir;
            }

            let options = GenerateOptions {
                run_id: run_id.map(RunId::new),
                max_iterations,
                resume: resume || config.workflow.resume,
            };
            cmd_generate(&config, &locator, options, format, output.as_deref())?;
        }
        Commands::Analyze { path, format } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_analyze(&config, &path, format)?;
        }
        Commands::Providers => {
            let config = load_config(cli.config.as_deref())?;
            cmd_providers(&config)?;
        }
        Commands::Config { path } => {
            cmd_config(cli.config.as_deref(), path)?;
        }
        Commands::Completions { shell } => {
            cmd_completions(shell);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_file(path),
        None => Config::load(),
    }
}

/// Run the workflow and print or write the README.
fn cmd_generate(
    config: &Config,
    locator: &str,
    options: GenerateOptions,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let ai = AIManager::from_config(&config.ai).await?;
        if !ai.is_available() {
            tracing::warn!("No AI provider available, the README will use the fallback template");
        }

        let orchestrator = build_orchestrator(config, Arc::new(ai))?;
        let service =
            Arc::new(ReadmeService::new(Arc::new(orchestrator), Arc::new(DefaultMaterializer::default())));

        let run_id = options.run_id.clone().unwrap_or_else(|| RunId::from_locator(locator));
        {
            let service = service.clone();
            let run_id = run_id.clone();
            ctrlc::set_handler(move || {
                if !service.cancel(&run_id) {
                    std::process::exit(130);
                }
            })?;
        }

        let options = GenerateOptions { run_id: Some(run_id), ..options };
        match service.generate(locator, options).await {
            Ok(report) => write_report(&report, format, output),
            Err(ServiceError::Workflow(e)) => {
                if let Some(state) = e.state() {
                    eprintln!("Decision log:");
                    for line in &state.log {
                        eprintln!("  {line}");
                    }
                }
                if let (WorkflowError::Cancelled { run_id, .. }, Some(dir)) = (&e, &config.workflow.checkpoint_dir) {
                    eprintln!(
                        "Resume with: repowhisper generate {locator} --run-id {run_id} --checkpoint-dir {} --resume",
                        dir.display()
                    );
                }
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    })
}

fn write_report(report: &RunReport, format: OutputFormat, output: Option<&Path>) -> Result<()> {
    let content = match format {
        OutputFormat::Text => report.readme.clone(),
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
    };

    match output {
        Some(path) => {
            std::fs::write(path, &content)?;
            eprintln!("Wrote {} ({} step invocations)", path.display(), report.iterations);
        }
        None => println!("{content}"),
    }

    Ok(())
}

/// Print what the analysis step would extract.
fn cmd_analyze(config: &Config, path: &Path, format: OutputFormat) -> Result<()> {
    if !path.is_dir() {
        anyhow::bail!("Not a directory: {}", path.display());
    }

    let ignore = &config.analysis.ignore_dirs;
    let structure = repo::build_structure(path, ignore);
    let dependencies = repo::find_dependencies(path);
    let extensions = repo::file_extensions(path, ignore);
    let samples = repo::sample_files(
        path,
        ignore,
        SampleOptions {
            max_files: config.analysis.max_sample_files,
            max_chars: config.analysis.max_sample_chars,
        },
    );

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "structure": structure,
                "dependencies": dependencies,
                "extensions": extensions,
                "sample_files": samples.keys().collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("Project: {}", repo::project_name(&path.to_string_lossy()));
            println!("Directories: {}", structure.directories.len());
            println!("Files: {}", structure.files.len());

            let languages: Vec<String> = repo::dominant_extensions(&extensions)
                .into_iter()
                .take(5)
                .map(|ext| format!("{ext} ({})", extensions[&ext]))
                .collect();
            println!("Extensions: {}", languages.join(", "));

            println!("\nManifests:");
            if dependencies.is_empty() {
                println!("  (none)");
            }
            for (name, manifest) in &dependencies {
                println!("  {name}: {} dependencies", manifest.len());
            }

            println!("\nSample files:");
            for name in samples.keys() {
                println!("  {name}");
            }
        }
    }

    Ok(())
}

/// List the provider chain resolved from config and environment.
fn cmd_providers(config: &Config) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let ai = AIManager::from_config(&config.ai).await?;
        println!("Provider preference: {}", config.ai.provider);

        if ai.is_available() {
            for (i, name) in ai.provider_names().iter().enumerate() {
                println!("  {}. {name}", i + 1);
            }
        } else {
            println!("No AI provider available.");
            println!("Set GEMINI_API_KEY or ANTHROPIC_API_KEY, or run Ollama locally.");
        }

        Ok::<_, anyhow::Error>(())
    })
}

/// Show configuration.
fn cmd_config(explicit: Option<&Path>, show_path: bool) -> Result<()> {
    if show_path {
        let path = explicit.map(Path::to_path_buf).or_else(Config::effective_path);
        if let Some(path) = path {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let config = load_config(explicit)?;
    let toml = toml::to_string_pretty(&config)?;
    println!("{toml}");

    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "repowhisper", &mut io::stdout());
}
