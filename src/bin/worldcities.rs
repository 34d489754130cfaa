use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use worldcities::config::Settings;
use worldcities::{
    City, Country, Environment, PageRequest, PageResult, Shaper, SortFieldPolicy, Store,
};

#[derive(Parser, Debug)]
#[command(name = "worldcities", version, about = "World cities reference data")]
struct Cli {
    /// Postgres connection string. Falls back to DATABASE_URL.
    #[arg(long)]
    database_url: Option<String>,

    /// development, staging or production. Falls back to APP_ENV.
    #[arg(long)]
    environment: Option<String>,

    /// After the command, print this run's counters to stderr in Prometheus
    /// text format
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create tables and indexes if missing
    Migrate,

    /// Merge the spreadsheet export into the database
    Import {
        /// CSV export to read. Falls back to WORLDCITIES_DATA_FILE.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Print one page of countries as JSON
    Countries(PageArgs),

    /// Print one page of cities as JSON
    Cities(PageArgs),
}

#[derive(Args, Debug)]
struct PageArgs {
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    page_index: i64,

    /// Falls back to WORLDCITIES_PAGE_SIZE.
    #[arg(long, allow_negative_numbers = true)]
    page_size: Option<i64>,

    #[arg(long)]
    sort_column: Option<String>,

    #[arg(long)]
    sort_order: Option<String>,

    #[arg(long)]
    filter_column: Option<String>,

    #[arg(long)]
    filter_query: Option<String>,

    /// Ignore unknown sort columns instead of failing
    #[arg(long)]
    lenient: bool,
}

impl PageArgs {
    fn request(&self, settings: &Settings) -> PageRequest {
        PageRequest {
            page_index: self.page_index,
            page_size: self.page_size.unwrap_or(settings.page_size),
            sort_column: self.sort_column.clone(),
            sort_order: self.sort_order.clone(),
            filter_column: self.filter_column.clone(),
            filter_query: self.filter_query.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> worldcities::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::from_env()?;
    if let Some(url) = cli.database_url {
        settings.database_url = Some(url);
    }
    if let Some(env) = cli.environment.as_deref() {
        settings.environment = Environment::parse_or_production(env);
    }

    match cli.command {
        Commands::Migrate => {
            connect(&settings).await?.migrate().await?;
            println!("Schema is up to date.");
        }
        Commands::Import { file } => {
            let store = connect(&settings).await?;
            let ctx = settings.execution_context();
            let path = file.unwrap_or_else(|| settings.data_file.clone());
            let outcome = store.import(&ctx, &path).await?;
            print_json(&outcome)?;
        }
        Commands::Countries(args) => {
            let store = connect(&settings).await?;
            let page: PageResult<Country> = store
                .countries()
                .page(&shaper_for(&settings, &args), args.request(&settings))
                .await?;
            print_json(&page)?;
        }
        Commands::Cities(args) => {
            let store = connect(&settings).await?;
            let page: PageResult<City> = store
                .cities()
                .page(&shaper_for(&settings, &args), args.request(&settings))
                .await?;
            print_json(&page)?;
        }
    }

    if cli.metrics {
        eprint!("{}", worldcities::metrics::render_prometheus());
    }
    Ok(())
}

async fn connect(settings: &Settings) -> worldcities::Result<Store> {
    let Some(builder) = settings.store_builder() else {
        eprintln!("error: --database-url or env DATABASE_URL is required");
        std::process::exit(2);
    };
    builder.build().await
}

fn shaper_for(settings: &Settings, args: &PageArgs) -> Shaper {
    let shaper = settings.shaper();
    if args.lenient {
        shaper.policy(SortFieldPolicy::Lenient)
    } else {
        shaper
    }
}

fn print_json<T: Serialize>(value: &T) -> worldcities::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
