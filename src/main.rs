mod analyzer;
mod audio_player;
mod builtin_themes;
mod config;
mod engine;
mod fetch;
mod loader;
mod logging;
mod object_url;
mod shell;
mod store;
mod timeline;
mod tui;
mod viewport;
mod waveform;

use crate::audio_player::audio_engine_factory;
use crate::config::Config;
use crate::fetch::HttpFetcher;
use crate::loader::{StoreLocation, spawn_load};
use crate::object_url::ObjectUrls;
use crate::shell::PlayerShell;
use crate::viewport::Viewport;
use color_eyre::Result;

fn main() -> Result<()> {
    color_eyre::install()?;
    // the UI owns the terminal, so a broken log dir only costs us the log
    if let Err(err) = logging::init() {
        eprintln!("logging disabled: {err}");
    }

    let config = Config::load()?;
    let theme = builtin_themes::get_by_name(&config.player.theme).unwrap_or_else(|| {
        tracing::warn!(
            theme = %config.player.theme,
            available = ?builtin_themes::list_themes(),
            "unknown theme, using Teal"
        );
        builtin_themes::teal()
    });
    let url = fetch::resolve_url(&config.source.base_url, &config.source.audio_path)?;

    let location = StoreLocation {
        path: config.cache.db_path(),
        name: config.cache.db_name.clone(),
        version: config.cache.db_version,
        collection: config.cache.collection.clone(),
        key: config.cache.key.clone(),
    };
    let fetcher = HttpFetcher::new(config.source.max_bytes);
    let urls = ObjectUrls::new();
    let loader_urls = urls.clone();

    let viewport = Viewport::new(0);
    let shell = PlayerShell::new(config, audio_engine_factory(), viewport.clone());
    let result = tui::run(shell, theme, viewport, move || {
        spawn_load(location, fetcher, url, loader_urls)
    });

    tracing::info!(
        issued = urls.issued(),
        revoked = urls.revoked(),
        live = urls.live(),
        "player closed"
    );
    result
}
