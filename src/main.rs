use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = gentask::cli::Cli::parse();
    gentask::logging::init_tracing(cli.log_filter.clone())?;

    let config = gentask::config::from_cli(&cli)?;
    let command = cli.command.unwrap_or_default();
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    gentask::commands::execute(&config, command, &mut handle)?;

    Ok(())
}
