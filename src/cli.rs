use clap::{Parser, Subcommand};
use pms_lib::Viewport;
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pms")]
#[command(
    version,
    about = "Page Markup Server - Render pages in headless Chrome and return the settled markup",
    long_about = "Page Markup Server (PMS)\n\nModes:\n- serve: local HTTP front door (/GET, /EXIT) that renders one page at a time on a shared browser and exits after an idle period.\n- render: render a single URL and print the framed markup to stdout.\n\nUse --help on any subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable debug logging (RUST_LOG wins when set)")]
    pub debug: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML) to set defaults for port/viewport/timeouts/browser; CLI flags override config"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve rendered markup over HTTP
    Serve {
        #[arg(help = "Port to listen on (default 8000)")]
        port: Option<u16>,

        #[arg(value_name = "CHROME_PATH", help = "Chrome/Chromium executable")]
        chrome_path: Option<PathBuf>,

        #[arg(value_name = "USER_DATA_DIR", help = "Chrome user data directory")]
        user_data_dir: Option<PathBuf>,

        #[arg(long, help = "Address to bind (default 127.0.0.1)")]
        host: Option<IpAddr>,

        #[arg(
            long,
            value_name = "MS",
            help = "Quiet period after the last subresource completes (default 500)"
        )]
        quiet_period: Option<u64>,

        #[arg(
            long,
            value_name = "MS",
            help = "Ceiling on the render wait, measured from page open (default 2000)"
        )]
        max_render_wait: Option<u64>,

        #[arg(
            long,
            value_name = "SECS",
            help = "Exit after this many seconds without a request (default 50)"
        )]
        idle_timeout: Option<u64>,

        #[arg(long, help = "Viewport dimensions (WIDTHxHEIGHT, default 1280x847)")]
        viewport: Option<Viewport>,
    },

    /// Render a single URL and print the framed markup
    Render {
        #[arg(help = "Page to render (http or https)")]
        url: String,

        #[arg(long, value_name = "PATH", help = "Write a full-page screenshot to PATH")]
        page_image: Option<PathBuf>,

        #[arg(long, help = "Append per-element computed styles as JSON")]
        computed_styles: bool,

        #[arg(long, requires = "password", help = "Basic-auth user, sent after a 401")]
        username: Option<String>,

        #[arg(long, requires = "username", help = "Basic-auth password, sent after a 401")]
        password: Option<String>,

        #[arg(long, value_name = "PATH", help = "Chrome/Chromium executable")]
        chrome_path: Option<PathBuf>,

        #[arg(long, value_name = "DIR", help = "Chrome user data directory")]
        user_data_dir: Option<PathBuf>,
    },
}

/// Older launch scripts pass `-debug` as a bare flag; accept that spelling
/// anywhere on the command line.
pub fn normalize_legacy_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    args.into_iter()
        .map(|arg| {
            if arg == "-debug" {
                "--debug".to_string()
            } else {
                arg
            }
        })
        .collect()
}

pub fn parse() -> Cli {
    Cli::parse_from(normalize_legacy_args(std::env::args()))
}
