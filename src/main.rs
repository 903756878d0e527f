use clap::{Parser, Subcommand};
use ldn_bridge::config::{self, Config};
use ldn_bridge::telemetry::init_logging;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "ldn-bridge")]
#[command(about = "Bridges console LDN local play onto a simulator room")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run the bridge
    Run {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Use an in-memory link instead of opening the interface
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate config.toml
    Validate {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Print the effective configuration with defaults filled in
    Show {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Config { action }) => match action {
            ConfigAction::Validate {
                config: config_path,
            } => cmd_config_validate(&config_path),
            ConfigAction::Show {
                config: config_path,
            } => cmd_config_show(&config_path),
        },
        Some(Commands::Run {
            config: config_path,
            dry_run,
        }) => cmd_run(&config_path, dry_run),
        None => cmd_run(&PathBuf::from("config.toml"), false),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn load_validated(config_path: &PathBuf) -> Result<Config, String> {
    let cfg = config::load(config_path).map_err(|e| format!("Failed to load config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        return Err("Validation failed".to_string());
    }
    Ok(cfg)
}

fn cmd_run(config_path: &PathBuf, dry_run: bool) -> Result<(), String> {
    use ldn_bridge::capture::{AfPacketSocket, MemoryCapture};
    use ldn_bridge::protocol::MacAddr;
    use tokio::runtime::Runtime;
    use tracing::debug;

    let cfg = load_validated(config_path)?;
    init_logging(Some(&cfg.logging));
    info!("Loaded {}", config_path.display());

    let rt = Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async move {
        if dry_run {
            let mac = cfg.capture.mac.unwrap_or(MacAddr([0x02, 0, 0, 0, 0, 0x01]));
            let (capture, mut link) = MemoryCapture::pair(mac);
            info!("Dry run: no interface is opened");
            tokio::spawn(async move {
                while let Some(frame) = link.next_frame().await {
                    debug!(len = frame.len(), "Dry run frame out");
                }
            });
            return serve(&cfg, capture).await;
        }

        let interface = &cfg.capture.interface;
        info!("Binding to interface {}...", interface);
        let socket = match cfg.capture.mac {
            Some(mac) => AfPacketSocket::bind_with_mac(interface, mac),
            None => AfPacketSocket::bind(interface),
        }
        .map_err(|e| {
            format!(
                "Failed to bind to {}: {}. Run with root privileges.",
                interface, e
            )
        })?;
        serve(&cfg, socket).await
    })
}

async fn serve<C: ldn_bridge::capture::Capture>(cfg: &Config, capture: C) -> Result<(), String> {
    use ldn_bridge::dataplane::{EngineConfig, PacketForwardEngine};
    use ldn_bridge::room::{ChannelRoom, LdnBridge};
    use tokio::sync::{mpsc, watch};
    use tracing::warn;

    let engine = PacketForwardEngine::new(capture, EngineConfig::from(cfg));
    engine
        .start()
        .map_err(|e| format!("Failed to start engine: {}", e))?;
    info!(
        subnet = %cfg.subnet(),
        gateway = %cfg.subnet.gateway,
        mac = %engine.local_mac(),
        "Engine started"
    );

    let (room, mut outbound) = ChannelRoom::new(cfg.engine.event_capacity);
    let room_log = tokio::spawn(async move {
        while let Some(packet) = outbound.recv().await {
            info!(
                kind = %packet.kind,
                local = %packet.local_ip,
                remote = %packet.remote_ip,
                broadcast = packet.broadcast,
                len = packet.payload.len(),
                "To room"
            );
        }
    });

    // The room transport feeds inbound messages through this sender.
    let (_inbound_tx, inbound_rx) = mpsc::channel(cfg.engine.event_capacity.max(1));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let bridge = LdnBridge::from(cfg);
    let run = bridge.run(&engine, &room, inbound_rx, shutdown_rx);
    tokio::pin!(run);

    let finished = tokio::select! {
        result = &mut run => Some(result),
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            None
        }
    };

    let result = match finished {
        Some(result) => result,
        None => {
            info!("Shutting down...");
            let _ = shutdown_tx.send(true);
            run.await
        }
    };
    if let Err(e) = result {
        warn!("Bridge ended: {}", e);
    }

    engine.stop().await;
    room_log.abort();

    for (name, value) in engine.metrics().export() {
        info!(metric = %name, value, "Final counter");
    }
    Ok(())
}

fn cmd_config_validate(config_path: &PathBuf) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());
    load_validated(config_path)?;
    println!("[INFO] Configuration is valid");
    Ok(())
}

fn cmd_config_show(config_path: &PathBuf) -> Result<(), String> {
    let cfg = config::load(config_path).map_err(|e| format!("Failed to load config: {}", e))?;
    let rendered =
        config::to_toml(&cfg).map_err(|e| format!("Failed to render config: {}", e))?;
    print!("{}", rendered);
    Ok(())
}
