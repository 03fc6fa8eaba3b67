mod cli;
mod commands;
mod formatting;
mod settings;

use std::process::ExitCode;

use cli::Commands;
use commands::{run_render, run_serve, RenderArgs};
use settings::ServeOverrides;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    run().await
}

async fn run() -> ExitCode {
    let args = cli::parse();
    init_tracing(args.debug);

    match args.command {
        Commands::Serve {
            port,
            chrome_path,
            user_data_dir,
            host,
            quiet_period,
            max_render_wait,
            idle_timeout,
            viewport,
        } => {
            let overrides = ServeOverrides {
                host,
                port,
                chrome_path,
                user_data_dir,
                quiet_period_ms: quiet_period,
                max_render_wait_ms: max_render_wait,
                idle_timeout_secs: idle_timeout,
                viewport,
            };
            run_serve(args.config, args.debug, overrides).await
        }
        Commands::Render {
            url,
            page_image,
            computed_styles,
            username,
            password,
            chrome_path,
            user_data_dir,
        } => {
            let render = RenderArgs {
                url,
                page_image,
                computed_styles,
                username,
                password,
                chrome_path,
                user_data_dir,
            };
            run_render(args.config, args.debug, render).await
        }
    }
}

/// Logs go to stderr; `RUST_LOG` wins over `--debug`.
fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
