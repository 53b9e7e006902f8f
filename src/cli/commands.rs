//! Implementation of the modindex CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};

use crate::request::ServerRequest;
use crate::server::ServerClient;
use crate::types::config::{Config, CONFIG_FILE_NAME};
use crate::types::errors::ServerResult;
use crate::types::models::{InstalledMod, ModVersionSelector, ModsQuery, ModsSort};
use crate::{ModIndexError, ModIndexResult};

/// Initializes configuration in the specified directory.
pub async fn init(path: Option<PathBuf>) -> ModIndexResult<()> {
    let target_dir = path.unwrap_or_else(|| PathBuf::from("."));

    if !target_dir.exists() {
        std::fs::create_dir_all(&target_dir)?;
        tracing::info!("Directory created: {}", target_dir.display());
    }

    let config_path = target_dir.join(CONFIG_FILE_NAME);

    if config_path.exists() {
        println!("Configuration already exists at: {}", config_path.display());
        return Ok(());
    }

    let config = Config::default_config();
    config.save(&config_path)?;

    println!("modindex initialized successfully!");
    println!("Configuration created at: {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Point [server] base_url at your index server");
    println!("  2. Browse mods: modindex mods");

    Ok(())
}

fn client(config: &Config) -> ModIndexResult<ServerClient> {
    ServerClient::from_config(config, Arc::new(Vec::<InstalledMod>::new()))
}

/// Waits for `request`, showing its progress on a spinner.
async fn wait_with_spinner<T>(request: &ServerRequest<T>) -> ServerResult<T>
where
    T: Clone + Send + Sync + 'static,
{
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(request.name().to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));

    let forward = {
        let spinner = spinner.clone();
        let mut updates = request.subscribe_progress();
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let latest = updates.borrow_and_update().clone();
                if let Some(progress) = latest {
                    spinner.set_message(progress.to_string());
                }
            }
        })
    };

    let result = request.wait().await;
    forward.abort();
    spinner.finish_and_clear();
    result
}

/// Lists mods matching the given filters.
pub async fn mods(
    query: Option<String>,
    tags: Vec<String>,
    featured: bool,
    sort: ModsSort,
    page: usize,
    per_page: usize,
    config: &Config,
) -> ModIndexResult<()> {
    if page == 0 {
        return Err(ModIndexError::invalid_argument("pages start at 1"));
    }

    let query = ModsQuery {
        query,
        tags,
        featured: featured.then_some(true),
        sorting: sort,
        page: page - 1,
        page_size: per_page,
        ..ModsQuery::default()
    };

    let list = wait_with_spinner(&client(config)?.get_mods(&query, true)).await?;

    if list.mods.is_empty() {
        println!("No mods found.");
        return Ok(());
    }

    println!(
        "Page {page} - showing {} of {} mods\n",
        list.mods.len(),
        list.total_mod_count
    );
    for metadata in &list.mods {
        let version = metadata
            .latest_version()
            .map(|v| v.version.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<32} {:<12} {:>9} downloads  by {}",
            metadata.id,
            version,
            metadata.download_count,
            metadata.format_developers()
        );
    }

    Ok(())
}

/// Shows metadata for a single mod.
pub async fn info(id: &str, config: &Config) -> ModIndexResult<()> {
    let metadata = wait_with_spinner(&client(config)?.get_mod(id, true)).await?;
    let now = Utc::now();

    println!("{}", metadata.id);
    if let Some(latest) = metadata.latest_version() {
        println!("  Name:        {}", latest.name);
        println!("  Latest:      {}", latest.version);
        println!("  Description: {}", latest.description);
    }
    println!("  Developers:  {}", metadata.format_developers());
    println!("  Downloads:   {}", metadata.download_count);
    println!("  Featured:    {}", if metadata.featured { "yes" } else { "no" });
    if !metadata.tags.is_empty() {
        let tags: Vec<&str> = metadata.tags.iter().map(String::as_str).collect();
        println!("  Tags:        {}", tags.join(", "));
    }
    if let Some(source) = metadata.source_url() {
        println!("  Source:      {source}");
    }
    if let Some(updated) = &metadata.updated_at {
        println!("  Updated:     {}", updated.to_ago_string(now));
    }

    println!("\n  Versions:");
    for version in &metadata.versions {
        println!(
            "    {:<12} {:>9} downloads  loader {}",
            version.version.to_string(),
            version.download_count,
            version.geode
        );
    }

    Ok(())
}

/// Shows one release of a mod.
pub async fn release(id: &str, select: &ModVersionSelector, config: &Config) -> ModIndexResult<()> {
    let version = wait_with_spinner(&client(config)?.get_mod_version(id, select, true)).await?;

    println!("{} {}", version.mod_id, version.version);
    println!("  Name:      {}", version.name);
    println!("  Download:  {}", version.download_link);
    println!("  Hash:      {}", version.hash);
    println!("  Loader:    {}", version.geode);
    match version.game_version_for(&config.server.platform) {
        Some(gd) => println!("  Game:      {gd} ({})", config.server.platform),
        None => println!("  Game:      any ({})", config.server.platform),
    }
    if !version.dependencies.is_empty() {
        println!("  Dependencies:");
        for dependency in &version.dependencies {
            println!("    {} {}", dependency.mod_id, dependency.version);
        }
    }

    Ok(())
}

/// Lists the tags known to the server.
pub async fn tags(config: &Config) -> ModIndexResult<()> {
    let tags = wait_with_spinner(&client(config)?.get_tags(true)).await?;

    if tags.is_empty() {
        println!("The server has no tags.");
        return Ok(());
    }
    for tag in &tags {
        println!("  {:<20} {}", tag.name, tag.display_name);
    }

    Ok(())
}

/// Downloads a mod's logo to `output`.
pub async fn logo(id: &str, output: &Path, config: &Config) -> ModIndexResult<()> {
    let bytes = wait_with_spinner(&client(config)?.get_mod_logo(id, true)).await?;
    std::fs::write(output, &bytes)?;
    println!("Logo saved to: {} ({} bytes)", output.display(), bytes.len());
    Ok(())
}

/// Checks the given installed mods for updates.
pub async fn updates(installed: Vec<InstalledMod>, config: &Config) -> ModIndexResult<()> {
    let client = ServerClient::from_config(config, Arc::new(installed.clone()))?;
    let updates = wait_with_spinner(&client.check_all_updates(true)).await?;

    let mut found = 0;
    for mod_info in &installed {
        let Some(update) = updates.iter().find(|u| u.is_update_for(mod_info)) else {
            continue;
        };
        found += 1;
        match &update.replacement {
            Some(replacement) => println!(
                "  {} {} -> replaced by {} {}",
                mod_info.id, mod_info.version, replacement.id, replacement.version
            ),
            None => println!("  {} {} -> {}", mod_info.id, mod_info.version, update.version),
        }
    }

    if found == 0 {
        println!("All {} mods are up to date.", installed.len());
    } else {
        println!("\n{found} of {} mods have updates.", installed.len());
    }

    Ok(())
}

/// Shows version.
pub fn version() {
    println!("modindex {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Caching client for mod index servers");
}
