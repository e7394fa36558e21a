use std::time::Duration;

use tracing::{error, info, warn};

use parlor::emote::EmoteCatalog;
use parlor::{BanGate, Config, Engine, EngineEvent, EngineHandle, IdentityRegistry, ModerationEngine, WebServer};

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {CONFIG_PATH}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = parlor::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        parlor::logging::init_console_only(&config.logging.level);
    }

    info!("Parlor - single-room chat");
    info!("Server configured on {}:{}", config.host, config.port);

    let registry = IdentityRegistry::open(&config.identities_path).unwrap_or_else(|e| {
        warn!("Failed to load identities: {e}. Running in memory.");
        IdentityRegistry::in_memory()
    });
    let bans = BanGate::open(&config.bans_path, config.ip_pepper.clone()).unwrap_or_else(|e| {
        warn!("Failed to load bans: {e}. Running in memory.");
        BanGate::in_memory(config.ip_pepper.clone())
    });
    if !bans.has_secret() {
        warn!("No ip_pepper configured; bans cannot be checked or recorded");
    }
    let moderation = ModerationEngine::load(&config);

    let mut engine = Engine::new(config.clone(), registry, moderation, bans);
    match EmoteCatalog::new(&config.emote_api_base) {
        Ok(catalog) => engine = engine.with_catalog(catalog),
        Err(e) => warn!("Emote catalog disabled: {e}"),
    }
    engine.load_startup_emotes().await;

    let (handle, rx) = EngineHandle::new();
    tokio::spawn(engine.run(rx, handle.clone()));

    // Idle sweep
    let sweep_handle = handle.clone();
    let sweep_secs = config.idle_sweep_secs.max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(sweep_secs));
        // Skip the first immediate tick
        interval.tick().await;
        loop {
            interval.tick().await;
            if !sweep_handle.send(EngineEvent::Sweep) {
                break;
            }
        }
    });

    let server = match WebServer::new(&config.host, config.port, handle) {
        Ok(server) => server,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = server.run().await {
        error!("Web server stopped: {e}");
        std::process::exit(1);
    }
}
