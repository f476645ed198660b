mod cache;
mod config;
mod db_manager;
mod discord_ipc;
mod document_probe;
mod link_resolver;
mod metadata_resolver;
mod presence;
mod presence_service;
mod protocol;
mod similarity;

use cache::BookCache;
use config::{sanitize_config, Config};
use db_manager::DbManager;
use discord_ipc::DiscordIpcPublisher;
use document_probe::{AppleBooksProbe, RetryingProbe};
use link_resolver::LinkResolver;
use log::info;
use metadata_resolver::MetadataResolver;
use presence_service::PresenceService;

fn load_config() -> Config {
    let config_dir = dirs::config_dir().expect("Could not find config directory");
    let config_file = config_dir.join("bookrpc.toml");

    if !config_file.exists() {
        let default_config = Config::default();
        info!(
            "Config file not found. Creating default config. path={}",
            config_file.display()
        );
        std::fs::write(
            config_file.clone(),
            toml::to_string(&default_config).unwrap(),
        )
        .unwrap();
    }

    let config_content = std::fs::read_to_string(config_file).unwrap();
    sanitize_config(toml::from_str::<Config>(&config_content).unwrap_or_default())
}

fn main() {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Debug);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config = load_config();
    info!("Starting bookrpc. poll_interval_ms={}", config.poll_interval_ms);

    let db_manager = DbManager::new().expect("Failed to initialize cache database");
    let cache = BookCache::new(db_manager, MetadataResolver::new(), LinkResolver::new());
    // Memoization is intra-run only: the store starts empty every launch.
    cache.clear();

    let probe = RetryingProbe::new(AppleBooksProbe::new());
    let publisher = DiscordIpcPublisher::new();

    let mut service = PresenceService::new(probe, publisher, cache, &config);
    service.run();
}
