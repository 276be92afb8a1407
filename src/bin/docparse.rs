//! CLI binary for docparse.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `ProcessingConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use docparse::{
    BatchReport, DocumentResult, DocumentService, ProcessingConfig, ProgressSink, ProviderKind,
    QuotaConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress sink using indicatif ────────────────────────────────────────

/// Terminal progress sink: one bar whose length follows the `total` of the
/// latest notification (1 while a PDF is rasterised, then the page count).
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:42.green/238}] {pos:>3}/{len}  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for BarProgress {
    fn on_progress(&self, current: usize, total: usize, message: &str) {
        if self.bar.length() != Some(total as u64) {
            self.bar.set_length(total as u64);
            self.bar.reset_eta();
        }
        self.bar.set_position(current as u64);
        self.bar.set_message(message.to_string());
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One scanned PDF, Markdown written to ./output/scan.md
  docparse file scan.pdf

  # Several images with a custom prompt
  docparse batch -f page1.png -f page2.jpg -p "Transcribe the table only"

  # Every invoice in a directory
  docparse dir ./inbox --pattern "invoice_*" -o ./text

  # Use OpenAI or any OpenAI-compatible gateway
  docparse file scan.pdf --provider openai --base-url http://localhost:8000/v1/chat/completions

  # Show the resolved configuration
  docparse config --show

ENVIRONMENT VARIABLES:
  SILICONFLOW_API_KEY      SiliconFlow API key
  OPENAI_API_KEY           OpenAI API key
  OPENAI_BASE_URL          Chat-completions URL for --provider openai
  <PROVIDER>_MODEL         Model for the provider
  <PROVIDER>_RPM           Requests-per-minute cap (default 1000)
  <PROVIDER>_TPM           Tokens-per-minute cap (default 80000)
  <PROVIDER>_MAX_CONCURRENT  Worker count (default: rpm / 10, 1..=10)
  REQUEST_TIMEOUT          Per-call timeout in seconds, 0 = none (default 30)
  OUTPUT_DIR               Output directory (default ./output)

  Variables are also read from ./.env and ~/.config/docparse/config
  (%APPDATA%\docparse\config on Windows). Values in those files override
  the shell environment, and the config file overrides ./.env.
"#;

/// Recognise scanned documents and images with vision recognition services.
#[derive(Parser, Debug)]
#[command(
    name = "docparse",
    version,
    about = "Recognise scanned documents and images with vision recognition services",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCPARSE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCPARSE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recognise a single file.
    File {
        /// PDF or image to recognise.
        path: PathBuf,
        #[command(flatten)]
        opts: RunArgs,
    },
    /// Recognise several files, one after the other.
    Batch {
        /// File to recognise (repeatable).
        #[arg(short = 'f', long = "file", required = true)]
        files: Vec<PathBuf>,
        #[command(flatten)]
        opts: RunArgs,
    },
    /// Recognise every supported file in a directory (not recursive).
    Dir {
        directory: PathBuf,
        /// File-name pattern; `*` and `?` wildcards, extension appended.
        #[arg(long, default_value = "*")]
        pattern: String,
        #[command(flatten)]
        opts: RunArgs,
    },
    /// Show the resolved configuration.
    Config {
        /// Show every provider.
        #[arg(short, long)]
        show: bool,
        /// Show one provider.
        #[arg(long, value_name = "PROVIDER")]
        show_provider: Option<String>,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Recognition provider: siliconflow, openai, or any edgequake-llm provider.
    #[arg(long, env = "DOCPARSE_PROVIDER", default_value = "siliconflow")]
    provider: String,

    /// API key. Default: `<PROVIDER>_API_KEY`.
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Model ID. Default: `<PROVIDER>_MODEL`, then the provider default.
    #[arg(long)]
    model: Option<String>,

    /// Full chat-completions URL overriding the provider endpoint.
    /// Default for `--provider openai`: `OPENAI_BASE_URL`.
    #[arg(long)]
    base_url: Option<String>,

    /// Per-call timeout in seconds; 0 disables it.
    #[arg(short = 't', long, env = "REQUEST_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Output directory for the Markdown files.
    #[arg(short, long, env = "OUTPUT_DIR", default_value = "output")]
    output: PathBuf,

    /// Custom recognition prompt.
    #[arg(short, long)]
    prompt: Option<String>,

    /// Requests-per-minute cap. Default: `<PROVIDER>_RPM`, then 1000.
    #[arg(long)]
    rpm: Option<u64>,

    /// Tokens-per-minute cap. Default: `<PROVIDER>_TPM`, then 80000.
    #[arg(long)]
    tpm: Option<u64>,

    /// Worker count. Default: `<PROVIDER>_MAX_CONCURRENT`, then derived from rpm.
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DOCPARSE_PASSWORD")]
    password: Option<String>,

    /// Disable the progress bar.
    #[arg(long, env = "DOCPARSE_NO_PROGRESS")]
    no_progress: bool,

    /// Print the result as JSON instead of a summary.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before parsing, so clap's `env` defaults see the file values too.
    let env_files = load_env_files(Path::new(".env"), config_file().as_deref());
    let cli = Cli::parse();

    let opts = match &cli.command {
        Command::File { opts, .. } | Command::Batch { opts, .. } | Command::Dir { opts, .. } => {
            Some(opts)
        }
        Command::Config { .. } => None,
    };
    let show_progress = opts.is_some_and(|o| !o.no_progress && !o.json) && !cli.quiet;

    // ── Logging setup ────────────────────────────────────────────────────
    // Library logs would interleave with the progress bar.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    for (path, outcome) in &env_files {
        match outcome {
            Ok(()) => debug!("Loaded environment from {}", path.display()),
            Err(e) => warn!("Ignoring {}: {}", path.display(), e),
        }
    }

    match cli.command {
        Command::Config {
            show,
            show_provider,
        } => {
            show_config(show, show_provider.as_deref());
            Ok(())
        }
        Command::File { path, opts } => {
            let (service, bar) = build_service(&opts, show_progress)?;
            let result = service
                .process_file(&path, Some(&opts.output), opts.prompt.as_deref())
                .await;
            finish(&service, bar);
            report_file(&result, &opts, cli.quiet)
        }
        Command::Batch { files, opts } => {
            let (service, bar) = build_service(&opts, show_progress)?;
            let report = service
                .process_files(&files, Some(&opts.output), opts.prompt.as_deref())
                .await;
            finish(&service, bar);
            report_batch(&report, &opts, cli.quiet)
        }
        Command::Dir {
            directory,
            pattern,
            opts,
        } => {
            if !directory.is_dir() {
                bail!("Directory not found: {}", directory.display());
            }
            let (service, bar) = build_service(&opts, show_progress)?;
            let report = service
                .process_directory(&directory, Some(&opts.output), &pattern, opts.prompt.as_deref())
                .await;
            finish(&service, bar);
            if report.total_files == 0 && !opts.json {
                eprintln!("No matching files in {}", directory.display());
                return Ok(());
            }
            report_batch(&report, &opts, cli.quiet)
        }
    }
}

fn finish(service: &DocumentService, bar: Option<Arc<BarProgress>>) {
    service.close();
    if let Some(bar) = bar {
        bar.finish();
    }
}

/// User config file: `~/.config/docparse/config`, or
/// `%APPDATA%\docparse\config` on Windows.
fn config_file() -> Option<PathBuf> {
    let base = if cfg!(windows) {
        dirs::config_dir()
    } else {
        dirs::home_dir().map(|home| home.join(".config"))
    };
    base.map(|dir| dir.join("docparse").join("config"))
}

/// Load `project_env` and then `config_file` into the process environment.
///
/// Both override variables already set, and the config file is loaded last
/// so its values win over `.env`. Missing files are skipped.
fn load_env_files(
    project_env: &Path,
    config_file: Option<&Path>,
) -> Vec<(PathBuf, Result<(), dotenvy::Error>)> {
    std::iter::once(project_env)
        .chain(config_file)
        .filter(|path| path.is_file())
        .map(|path| (path.to_path_buf(), dotenvy::from_path_override(path)))
        .collect()
}

/// `--base-url`, else `OPENAI_BASE_URL` for the OpenAI provider only.
fn resolve_base_url(
    provider: &ProviderKind,
    flag: Option<&str>,
    openai_env: Option<String>,
) -> Option<String> {
    match flag {
        Some(url) => Some(url.to_string()),
        None if matches!(provider, ProviderKind::OpenAi) => {
            openai_env.filter(|url| !url.trim().is_empty())
        }
        None => None,
    }
}

/// `<PREFIX>_<NAME>` from the environment, parsed.
fn provider_env<T: std::str::FromStr>(provider: &ProviderKind, name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    let key = format!("{}_{}", provider.env_prefix(), name);
    match std::env::var(&key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid {key}={raw}: {e}")),
        _ => Ok(None),
    }
}

/// Map CLI args and environment to `ProcessingConfig`.
fn build_config(opts: &RunArgs) -> Result<ProcessingConfig> {
    let provider = ProviderKind::from_name(&opts.provider);
    let defaults = QuotaConfig::default();

    let api_key = match &opts.api_key {
        Some(key) => key.clone(),
        None => provider_env::<String>(&provider, "API_KEY")?.unwrap_or_default(),
    };
    let model = match &opts.model {
        Some(m) => Some(m.clone()),
        None => provider_env::<String>(&provider, "MODEL")?,
    };
    let quota = QuotaConfig {
        rpm: match opts.rpm {
            Some(v) => v,
            None => provider_env(&provider, "RPM")?.unwrap_or(defaults.rpm),
        },
        tpm: match opts.tpm {
            Some(v) => v,
            None => provider_env(&provider, "TPM")?.unwrap_or(defaults.tpm),
        },
        max_concurrent: match opts.max_concurrent {
            Some(v) => Some(v),
            None => provider_env(&provider, "MAX_CONCURRENT")?,
        },
    };
    let base_url = resolve_base_url(
        &provider,
        opts.base_url.as_deref(),
        std::env::var("OPENAI_BASE_URL").ok(),
    );
    let timeout = (opts.timeout > 0).then(|| Duration::from_secs(opts.timeout));

    let mut builder = ProcessingConfig::builder()
        .provider(provider)
        .api_key(api_key)
        .quota(quota)
        .request_timeout(timeout);
    if let Some(model) = model {
        builder = builder.model(model);
    }
    if let Some(url) = base_url {
        builder = builder.base_url(url);
    }
    if let Some(pwd) = &opts.password {
        builder = builder.password(pwd.clone());
    }
    builder.build().context("Invalid configuration")
}

fn build_service(
    opts: &RunArgs,
    show_progress: bool,
) -> Result<(DocumentService, Option<Arc<BarProgress>>)> {
    let config = build_config(opts)?;
    let service =
        DocumentService::from_config(config).context("Failed to set up recognition provider")?;

    if show_progress {
        let bar = BarProgress::new();
        let service = service.with_progress(bar.clone());
        Ok((service, Some(bar)))
    } else {
        Ok((service, None))
    }
}

fn report_file(result: &DocumentResult, opts: &RunArgs, quiet: bool) -> Result<()> {
    if opts.json {
        println!(
            "{}",
            serde_json::to_string_pretty(result).context("Failed to serialise result")?
        );
    } else if !quiet {
        print_result(result);
    }
    if !result.is_success() {
        bail!("Processing {} failed", result.file_path.display());
    }
    Ok(())
}

fn print_result(result: &DocumentResult) {
    match &result.output_path {
        Some(out) if result.is_success() => {
            eprintln!("{} {}", green("✔"), bold(&result.file_path.display().to_string()));
            eprintln!("   output: {}", out.display());
            eprintln!(
                "   {} pages in {:.2}s",
                result.page_count,
                result.processing_time_ms as f64 / 1000.0
            );
        }
        _ => eprintln!(
            "{} {}: {}",
            red("✘"),
            result.file_path.display(),
            result.error_message.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn report_batch(report: &BatchReport, opts: &RunArgs, quiet: bool) -> Result<()> {
    if opts.json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialise report")?
        );
    } else if !quiet {
        eprintln!("Files:        {}", report.total_files);
        eprintln!("Succeeded:    {}", report.success_count);
        eprintln!("Failed:       {}", report.failed_count);
        eprintln!("Success rate: {:.1}%", report.success_rate());
        eprintln!(
            "Total time:   {:.2}s",
            report.total_processing_time_ms as f64 / 1000.0
        );
        for failed in report.failures() {
            print_result(failed);
        }
    }
    if report.failed_count > 0 {
        bail!("{} of {} files failed", report.failed_count, report.total_files);
    }
    Ok(())
}

fn show_config(show: bool, provider: Option<&str>) {
    let describe = |kind: ProviderKind| {
        let model = provider_env::<String>(&kind, "MODEL")
            .ok()
            .flatten()
            .unwrap_or_else(|| kind.default_model().to_string());
        let key_set = provider_env::<String>(&kind, "API_KEY")
            .ok()
            .flatten()
            .is_some();
        let defaults = QuotaConfig::default();
        let rpm: u64 = provider_env(&kind, "RPM").ok().flatten().unwrap_or(defaults.rpm);
        let tpm: u64 = provider_env(&kind, "TPM").ok().flatten().unwrap_or(defaults.tpm);
        println!("{}:", bold(kind.name()));
        println!("  Model:    {model}");
        println!(
            "  Endpoint: {}",
            kind.default_endpoint().unwrap_or("(provider SDK)")
        );
        println!("  API key:  {}", if key_set { "set" } else { "not set" });
        println!("  Quota:    {rpm} rpm / {tpm} tpm");
    };

    if let Some(name) = provider {
        describe(ProviderKind::from_name(name));
    } else if show {
        let output = std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "output".to_string());
        println!("Output directory: {}", Path::new(&output).display());
        println!();
        describe(ProviderKind::SiliconFlow);
        println!();
        describe(ProviderKind::OpenAi);
    } else {
        println!("Use --show or --show-provider <PROVIDER>.");
        println!("  docparse config --show");
        println!("  docparse config --show-provider siliconflow");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docparse::backend::ChatCompletionsBackend;
    use std::fs;

    fn run_args(args: &[&str]) -> RunArgs {
        match Cli::parse_from(args).command {
            Command::File { opts, .. } => opts,
            other => panic!("expected the file command, got {other:?}"),
        }
    }

    #[test]
    fn openai_base_url_is_ignored_for_other_providers() {
        let gateway = || Some("https://gateway.example/v1/chat/completions".to_string());

        assert_eq!(resolve_base_url(&ProviderKind::SiliconFlow, None, gateway()), None);
        assert_eq!(
            resolve_base_url(&ProviderKind::OpenAi, None, gateway()).as_deref(),
            Some("https://gateway.example/v1/chat/completions")
        );
        assert_eq!(
            resolve_base_url(&ProviderKind::SiliconFlow, Some("http://localhost:8000"), gateway())
                .as_deref(),
            Some("http://localhost:8000")
        );
        assert_eq!(
            resolve_base_url(&ProviderKind::OpenAi, None, Some("  ".into())),
            None
        );
    }

    #[test]
    fn siliconflow_keeps_its_endpoint_when_openai_base_url_is_set() {
        std::env::set_var("OPENAI_BASE_URL", "https://gateway.example/v1/chat/completions");
        let siliconflow = build_config(&run_args(&["docparse", "file", "scan.pdf", "-k", "sk"]));
        let openai = build_config(&run_args(&[
            "docparse", "file", "scan.pdf", "--provider", "openai", "-k", "sk",
        ]));
        std::env::remove_var("OPENAI_BASE_URL");

        let siliconflow = siliconflow.unwrap();
        assert_eq!(siliconflow.base_url, None);
        let backend = ChatCompletionsBackend::from_config(&siliconflow).unwrap();
        assert_eq!(backend.endpoint(), "https://api.siliconflow.cn/v1/chat/completions");

        assert_eq!(
            openai.unwrap().base_url.as_deref(),
            Some("https://gateway.example/v1/chat/completions")
        );
    }

    #[test]
    fn config_file_overrides_dotenv_and_shell() {
        let dir = tempfile::tempdir().unwrap();
        let project_env = dir.path().join(".env");
        let config = dir.path().join("config");
        fs::write(
            &project_env,
            "DOCPARSE_TEST_LAYER=dotenv\nDOCPARSE_TEST_DOTENV_ONLY=yes\n",
        )
        .unwrap();
        fs::write(&config, "DOCPARSE_TEST_LAYER=config\n").unwrap();
        std::env::set_var("DOCPARSE_TEST_LAYER", "shell");

        let loaded = load_env_files(&project_env, Some(&config));

        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().all(|(_, outcome)| outcome.is_ok()));
        assert_eq!(std::env::var("DOCPARSE_TEST_LAYER").unwrap(), "config");
        assert_eq!(std::env::var("DOCPARSE_TEST_DOTENV_ONLY").unwrap(), "yes");
    }

    #[test]
    fn missing_env_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_env_files(&dir.path().join(".env"), Some(&dir.path().join("config")));
        assert!(loaded.is_empty());
    }

    #[test]
    fn config_file_lives_under_docparse() {
        if let Some(path) = config_file() {
            assert!(path.ends_with(Path::new("docparse").join("config")), "{path:?}");
        }
    }
}
