mod session;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use client_core::{
    config::{load_settings, normalize_backend_url},
    SessionController,
};
use session::watch;
use shared::domain::{Route, SearchQuery, SeatClass};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Watch train ticket availability through the crawler backend")]
struct Cli {
    /// Overrides the configured backend base url.
    #[arg(long, global = true)]
    backend_url: Option<String>,
    #[command(subcommand)]
    search: SearchCommand,
}

#[derive(Subcommand, Debug)]
enum SearchCommand {
    /// Search by departure and destination station.
    Stations {
        #[arg(long)]
        date: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        high_speed: bool,
        #[arg(long)]
        strict: bool,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Search a single train by its code.
    Code {
        #[arg(long)]
        date: String,
        #[arg(long)]
        train_code: String,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Seat class label (二等座) or key (secondClass).
    #[arg(long)]
    seat: Option<String>,
    /// Seconds between backend polls.
    #[arg(long, default_value_t = 10)]
    interval: u32,
    #[arg(long)]
    student: bool,
    /// Stop as soon as a poll finds no tickets.
    #[arg(long)]
    no_auto_monitor: bool,
}

impl SearchCommand {
    fn into_query(self) -> Result<SearchQuery> {
        let (mut query, common) = match self {
            SearchCommand::Stations {
                date,
                from,
                to,
                high_speed,
                strict,
                common,
            } => {
                let query = SearchQuery {
                    route: Route::Stations {
                        departure: from,
                        destination: to,
                        high_speed,
                        strict_mode: strict,
                    },
                    ..SearchQuery::stations(date, "", "")
                };
                (query, common)
            }
            SearchCommand::Code {
                date,
                train_code,
                common,
            } => (SearchQuery::train_code(date, train_code), common),
        };

        query.seat_class = common
            .seat
            .as_deref()
            .map(str::parse::<SeatClass>)
            .transpose()?;
        query.ask_time_secs = common.interval;
        query.student_ticket = common.student;
        query.auto_monitor = !common.no_auto_monitor;
        Ok(query)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(url) = cli.backend_url.as_deref() {
        settings.backend_url = normalize_backend_url(url);
    }
    info!(backend = %settings.backend_url, "using crawler backend");

    let query = cli.search.into_query()?;
    let mode = query.mode();
    let controller = SessionController::new(&settings);
    let events = controller.subscribe_events();

    controller.start_search(query).await?;
    let query = controller.active_query(mode).await;

    watch(&controller, events, mode, query, tokio::signal::ctrl_c()).await
}
