use anyhow::Context;
use cities_core::{
    CitiesApi, CityInfo, CityListStore, Config, FetchOutcome, GeonameId, PreferredCitiesStore,
    PreferredEntry, api_from_config,
};
use clap::{Parser, Subcommand};
use inquire::{CustomType, Text};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "cities", version, about = "Browse cities and manage preferred ones")]
pub struct Cli {
    /// Server address, overriding the configured one.
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Set the server address and page size.
    Configure,

    /// Search cities by name.
    Search {
        /// Text to filter by; lists every city when absent.
        filter: Option<String>,

        /// Number of pages to load.
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },

    /// Manage preferred cities.
    Preferred {
        #[command(subcommand)]
        action: PreferredAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum PreferredAction {
    /// Show preferred cities.
    List {
        /// Reload the cities that failed to load once more.
        #[arg(long)]
        retry: bool,
    },

    /// Add a city by geoname id.
    Add { id: String },

    /// Remove a city by geoname id.
    Remove { id: String },

    /// Remove every preferred city.
    Clear,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let mut config = Config::load()?;
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }

        match self.command {
            Command::Configure => configure(config),
            Command::Search { filter, pages } => {
                search(&config, filter.as_deref().unwrap_or_default(), pages).await
            }
            Command::Preferred { action } => preferred(&config, action).await,
        }
    }
}

fn configure(mut config: Config) -> anyhow::Result<()> {
    config.base_url = Text::new("Server address:")
        .with_default(&config.base_url)
        .prompt()
        .context("Failed to read server address")?;

    config.page_size = CustomType::<u32>::new("Page size:")
        .with_default(config.page_size)
        .with_error_message("Please enter a positive number")
        .prompt()
        .context("Failed to read page size")?
        .max(1);

    // Reject an unusable address before it reaches the config file.
    api_from_config(&config)?;

    config.save()?;
    println!("Configuration saved to {}", Config::config_file_path()?.display());
    Ok(())
}

async fn search(config: &Config, filter: &str, pages: u32) -> anyhow::Result<()> {
    let store = CityListStore::with_page_size(api_from_config(config)?, config.page_size);

    let outcome = store
        .search_with_retry(filter, config.retry_policy())
        .await
        .context("Failed to load cities. Please try again.")?;
    if let FetchOutcome::Canceled = outcome {
        return Ok(());
    }

    for _ in 1..pages {
        if store.next_link().is_none() {
            break;
        }
        store
            .fetch_next()
            .await
            .context("Failed to load more cities. Please try again.")?;
    }

    let cities = store.cities();
    if cities.is_empty() {
        println!("No cities found.");
        return Ok(());
    }

    for city in &cities {
        println!("{}", format_city(city));
    }
    if let Some(total) = store.total() {
        println!("\nShowing {} of {total}", cities.len());
    }
    Ok(())
}

async fn preferred(config: &Config, action: PreferredAction) -> anyhow::Result<()> {
    let api = api_from_config(config)?;
    let store = PreferredCitiesStore::new(api.clone());

    match action {
        PreferredAction::List { retry } => {
            store
                .load_preferred_with_retry(config.retry_policy())
                .await
                .context("Failed to load preferred cities.")?;
            store.settled().await;

            if retry && store.retry_all_failed() > 0 {
                store.settled().await;
            }

            print_preferred(&store);
        }
        PreferredAction::Add { id } => {
            let id = GeonameId::new(id);
            let city = api
                .get_city(&id)
                .await
                .with_context(|| format!("Failed to load city {id}"))?;

            store
                .set_preferred(city.clone(), true)
                .await
                .context("Failed to save preferred city")?;
            println!("Added {}", format_city(&city));
        }
        PreferredAction::Remove { id } => {
            let id = GeonameId::new(id);
            store
                .remove_preferred(&id)
                .await
                .context("Failed to save preferred city")?;
            println!("Removed {id}");
        }
        PreferredAction::Clear => {
            store
                .load_preferred_with_retry(config.retry_policy())
                .await
                .context("Failed to load preferred cities.")?;
            store.reset_all().await.context("Failed to clear preferred cities")?;
            println!("Preferred cities cleared");
        }
    }
    Ok(())
}

fn print_preferred(store: &PreferredCitiesStore) {
    let entries = store.preferred_cities();
    if entries.is_empty() {
        println!("You don't have favorite cities");
        return;
    }

    for (id, entry) in &entries {
        match entry {
            PreferredEntry::Loaded(city) => println!("{}", format_city(city)),
            PreferredEntry::Failed => println!("{id:>10}  (failed to load)"),
            PreferredEntry::Pending => println!("{id:>10}  (loading)"),
        }
    }

    let failed = store.preferred_cities_with_error().len();
    if failed > 0 {
        println!("\n{failed} failed to load; run `cities preferred list --retry` to reload them");
    }
}

fn format_city(city: &CityInfo) -> String {
    match &city.subregion {
        Some(subregion) => format!("{:>10}  {}, {subregion}, {}", city.id, city.name, city.country),
        None => format!("{:>10}  {}, {}", city.id, city.name, city.country),
    }
}
