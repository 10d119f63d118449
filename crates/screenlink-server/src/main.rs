//! screenlink server entry point.
//!
//! Loads the runtime settings and the screen map, opens the primary screen,
//! and serves client sessions until interrupted.
//!
//! ```text
//! main()
//!  └─ Settings::load + ScreenConfig::parse
//!  └─ Server::open_primary          -- platform driver + switch state
//!  └─ SessionSupervisor::run        -- acceptors + session tasks
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use screenlink_core::ScreenConfig;
use screenlink_server::platform::mock::MockScreen;
use screenlink_server::platform::PlatformScreen;
use screenlink_server::settings::Settings;
use screenlink_server::{Server, SessionSupervisor};

const USAGE: &str = "\
screenlink-server — share one keyboard and mouse across workstations

USAGE:
    screenlink-server [OPTIONS]

OPTIONS:
    --config <PATH>    Runtime settings file (default: screenlink.toml)
    --map <PATH>       Screen-map file (default: from settings)
    --address <ADDR>   Listen address, host:port (default: 0.0.0.0:24800)
    --admin <ADDR>     Admin listen address (disabled unless set)
    --name <NAME>      Screen name of this server (default: hostname)
    -h, --help         Print this help
";

#[derive(Debug, Default)]
struct CliArgs {
    config: Option<PathBuf>,
    map: Option<PathBuf>,
    address: Option<String>,
    admin: Option<String>,
    name: Option<String>,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut args = CliArgs::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .with_context(|| format!("{flag} requires a value"))
        };
        match arg.as_str() {
            "--config" => args.config = Some(PathBuf::from(value("--config")?)),
            "--map" => args.map = Some(PathBuf::from(value("--map")?)),
            "--address" => args.address = Some(value("--address")?),
            "--admin" => args.admin = Some(value("--admin")?),
            "--name" => args.name = Some(value("--name")?),
            "-h" | "--help" => {
                print!("{USAGE}");
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument `{other}` (try --help)"),
        }
    }
    Ok(args)
}

fn screen_name(args: &CliArgs, settings: &Settings) -> String {
    args.name
        .clone()
        .or_else(|| settings.server.name.clone())
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()))
        .unwrap_or_else(|| "primary".to_string())
}

fn load_screen_map(path: &PathBuf, explicit: bool, name: &str) -> anyhow::Result<ScreenConfig> {
    match std::fs::read_to_string(path) {
        Ok(text) => ScreenConfig::parse(&text)
            .with_context(|| format!("invalid screen map {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
            // no map yet: run standalone so the setup can be tested before
            // any client screens are declared
            warn!(path = %path.display(), "no screen map found; starting with this screen only");
            let mut config = ScreenConfig::new();
            config
                .add_screen(name)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            Ok(config)
        }
        Err(e) => Err(e).with_context(|| format!("cannot read screen map {}", path.display())),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args()?;

    let settings_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("screenlink.toml"));
    let settings = Settings::load(&settings_path)
        .with_context(|| format!("cannot load settings {}", settings_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.server.log_level.clone())),
        )
        .init();

    let name = screen_name(&args, &settings);
    info!(screen = %name, "screenlink server starting");

    let map_path = args.map.clone().unwrap_or_else(|| settings.server.map.clone());
    let mut config = load_screen_map(&map_path, args.map.is_some(), &name)?;

    // CLI beats settings beats the map's own options section
    if let Some(address) = args.address.as_deref().or(settings.network.address.as_deref()) {
        config.set_address(address);
    }
    if let Some(admin) = args.admin.as_deref().or(settings.network.admin_address.as_deref()) {
        config.set_admin_address(admin);
    }

    let server = Arc::new(
        Server::new(name, config)
            .with_bind_timeout(Duration::from_secs(settings.network.bind_timeout_secs)),
    );

    // platform input drivers are provided by per-OS builds; this build runs
    // headless on the mock driver
    warn!("no platform input driver compiled in; using the mock screen driver");
    let platform = Arc::new(MockScreen::standard());
    server
        .open_primary(platform as Arc<dyn PlatformScreen>)
        .context("cannot open primary screen")?;

    // Ctrl-C / SIGTERM requests an orderly shutdown
    {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                server.request_shutdown();
            }
        });
    }

    let supervisor = SessionSupervisor::new(Arc::clone(&server));
    supervisor.run().await.context("server failed")?;

    info!("screenlink server stopped");
    Ok(())
}
