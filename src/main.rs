use clap::Parser;

use shortener::cli::{Cli, Commands};
use shortener::config::{get_config, init_config};
use shortener::interfaces::cli::{print_config_sample, run_command};
use shortener::system::lifetime::{shutdown, startup};
use shortener::system::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // 不需要存储的命令直接返回
    if let Commands::ConfigSample = cli.command {
        print_config_sample();
        return Ok(());
    }

    if let Err(e) = init_config(cli.config.as_deref()) {
        eprintln!("{}", e.format_colored());
        std::process::exit(1);
    }
    let config = get_config();
    let log_guard = init_logging(&config.logging)?;

    let ctx = match startup::prepare(config).await {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("{}", e.format_colored());
            std::process::exit(1);
        }
    };

    let result = run_command(&ctx, cli.command, &cli.base_url).await;
    let shutdown_result = shutdown::graceful_shutdown(&ctx.service).await;

    if let Err(e) = result {
        eprintln!("{}", e.format_colored());
        drop(log_guard);
        std::process::exit(if e.is_recoverable() { 2 } else { 1 });
    }
    shutdown_result?;
    Ok(())
}
