use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cpdt::cli::{commands, Cli, Commands};
use cpdt::core::Config;

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cpdt={}", level)));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    // Install miette's fancy error handler for beautiful diagnostics
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let config = Config::load(cli.global.config.as_deref()).into_diagnostic()?;

    let global = &cli.global;
    match cli.command {
        Commands::Combine(args) => commands::combine::run(args, global, &config),
        Commands::Yield(args) => commands::yield_report::run(args, global, &config),
        Commands::Stats(args) => commands::stats::run(args, global, &config),
    }
}
