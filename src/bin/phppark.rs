use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use phppark::paths::{Paths, SystemLayout};
use phppark::privilege::require_root;
use phppark::process::SystemRunner;
use phppark::report::Report;
use phppark::workflows::{self, Context};
use tracing::{debug, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_ENV: &str = "PHPPARK_LOG";

#[derive(Debug, Parser)]
#[command(name = "phppark", version, about = "Serve local PHP projects under a development domain")]
struct Cli {
    /// Debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create ~/.phppark and start nginx and PHP-FPM.
    Install,
    /// Serve every subdirectory of PATH (default: current directory) as a site.
    Park { path: Option<PathBuf> },
    /// Serve the current directory as NAME (default: directory name).
    Link { name: Option<String> },
    /// Stop serving a site.
    Unlink { name: String },
    /// List registered sites.
    Links,
    /// Regenerate and redeploy every site.
    Rebuild,
    /// Serve a site over HTTPS with a self-signed certificate.
    Secure { site: String },
    /// Serve a site over plain HTTP again.
    Unsecure { site: String },
    /// List installed PHP versions.
    #[command(name = "php:list")]
    PhpList,
    /// Set the default PHP version, or the version of one site.
    Use {
        version: String,
        site: Option<String>,
        /// Install the version through apt when it is missing.
        #[arg(long)]
        install: bool,
    },
    /// Show installation, site and DNS state.
    Status,
    /// Resolve the development domain to 127.0.0.1 via dnsmasq.
    Trust,
    /// Undo `trust`.
    Untrust,
}

impl Command {
    /// Verbs that only read state run unprivileged.
    fn needs_root(&self) -> Option<&'static str> {
        match self {
            Command::Links | Command::PhpList | Command::Status => None,
            Command::Install => Some("install"),
            Command::Park { .. } => Some("park"),
            Command::Link { .. } => Some("link"),
            Command::Unlink { .. } => Some("unlink"),
            Command::Rebuild => Some("rebuild"),
            Command::Secure { .. } => Some("secure"),
            Command::Unsecure { .. } => Some("unsecure"),
            Command::Use { .. } => Some("use"),
            Command::Trust => Some("trust"),
            Command::Untrust => Some("untrust"),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);
    debug!(?cli, "starting");

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        env::var(LOG_ENV)
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(Level::WARN)
    };

    let filter = match env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new(format!("phppark={level}")),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn run(command: Command) -> Result<()> {
    if let Some(action) = command.needs_root() {
        require_root(action)?;
    }

    let runner = SystemRunner;
    let ctx = Context::new(Paths::resolve()?, SystemLayout::host(), &runner);

    match command {
        Command::Install => print_report(&workflows::install(&ctx)?),
        Command::Park { path } => {
            let path = match path {
                Some(path) => path,
                None => env::current_dir().context("reading the current directory")?,
            };
            print_report(&workflows::park(&ctx, &path)?);
        }
        Command::Link { name } => {
            let dir = env::current_dir().context("reading the current directory")?;
            print_report(&workflows::link(&ctx, name.as_deref(), &dir)?);
        }
        Command::Unlink { name } => print_report(&workflows::unlink(&ctx, &name)?),
        Command::Links => print_links(&ctx)?,
        Command::Rebuild => print_report(&workflows::rebuild(&ctx)?),
        Command::Secure { site } => print_report(&workflows::secure(&ctx, &site)?),
        Command::Unsecure { site } => print_report(&workflows::unsecure(&ctx, &site)?),
        Command::PhpList => print_runtimes(&ctx),
        Command::Use {
            version,
            site,
            install,
        } => print_report(&workflows::use_version(&ctx, &version, site.as_deref(), install)?),
        Command::Status => print!("{}", workflows::status(&ctx)?),
        Command::Trust => print_report(&workflows::trust(&ctx)?),
        Command::Untrust => print_report(&workflows::untrust(&ctx)?),
    }
    Ok(())
}

fn print_report(report: &Report) {
    for step in report.steps() {
        println!("{step}");
    }
    let warnings = report.advisories().count();
    if warnings > 0 {
        println!("\n{warnings} step(s) need attention; `phppark rebuild` retries deployment");
    }
}

fn print_links(ctx: &Context) -> Result<()> {
    let listing = workflows::links(ctx)?;
    if listing.is_empty() {
        println!("No sites registered. Try `phppark park ~/sites` or `phppark link`.");
        return Ok(());
    }
    for entry in listing {
        let scheme = if entry.site.secured { "https" } else { "http" };
        let php = if entry.php_inherited {
            format!("{} (default)", entry.php)
        } else {
            entry.php
        };
        println!("{scheme}://{}", entry.hostname);
        println!("  path: {}", entry.site.path.display());
        println!("  kind: {}", entry.site.kind);
        println!("  php:  {php}");
    }
    Ok(())
}

fn print_runtimes(ctx: &Context) {
    let runtimes = workflows::php_list(ctx);
    if runtimes.is_empty() {
        println!("No PHP installations found. Try `phppark use <version> --install`.");
        return;
    }
    for runtime in runtimes {
        let marker = if runtime.is_system_default { "*" } else { " " };
        println!("{marker} PHP {}", runtime.version);
        println!("    binary: {}", runtime.binary.display());
        println!("    socket: {}", runtime.pool_socket.display());
    }
}
