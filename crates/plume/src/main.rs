use clap::Parser as ClapParser;
use plume::driver::{self, DriverProcess};
use plume::webdriver::WebDriverSurface;
use plume_engine::config;
use plume_engine::creds::HttpSheet;
use plume_engine::flow::PostFlow;
use plume_engine::media::DriveMedia;
use plume_engine::notify::{Notify, NullSink, WebhookSink};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL of an external WebDriver server. If not provided, chromedriver
    /// will be launched automatically.
    #[arg(short, long)]
    webdriver_url: Option<String>,

    /// Port for the auto-launched chromedriver
    #[arg(long, default_value_t = driver::DEFAULT_DRIVER_PORT)]
    driver_port: u16,

    /// Run the browser headless
    #[arg(long)]
    headless: bool,

    /// Env file to load before reading configuration
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(path) = &args.env_file {
        dotenvy::from_path(path)?;
    } else {
        let _ = dotenvy::dotenv();
    }

    let (webdriver_url, _driver): (String, Option<DriverProcess>) = match args.webdriver_url {
        Some(url) => {
            info!("Using external WebDriver at {}", url);
            (url, None)
        }
        None => {
            info!("Auto-launching chromedriver...");
            match driver::launch_chromedriver(args.driver_port).await {
                Ok(process) => (process.webdriver_url(), Some(process)),
                Err(e) => {
                    error!("Failed to launch: {}", e);
                    std::process::exit(1);
                }
            }
        }
    };

    let raw = config::env_map();
    let notify: Box<dyn Notify> = match raw.get("WEBHOOK_URL").map(|v| v.trim()) {
        Some(url) if !url.is_empty() => Box::new(WebhookSink::new(url)),
        _ => Box::new(NullSink),
    };

    let surface = WebDriverSurface::new(&webdriver_url, args.headless);
    let flow = PostFlow::new(
        raw,
        surface,
        Box::new(HttpSheet::new()),
        Box::new(DriveMedia::new()),
        notify,
    );

    match flow.run().await {
        Ok(report) => {
            info!("Post submitted ({} steps traced).", report.trace.len());
            Ok(())
        }
        Err(failure) => {
            error!("{}", failure);
            std::process::exit(1);
        }
    }
}
