mod config;

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{PaginatedFetchController, PaginationOptions, PollingController, PollingOptions};
use serde::Serialize;
use serde_json::Value;
use shared::{
    domain::{Fields, QueryOptions, RecordId},
    error::StoreError,
    error_map::ErrorMapper,
};
use storage::{EntityRepository, InMemoryRepository, RestConfig, RestRepository, SqliteRepository};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{load_settings, prepare_database_url, Backend, Settings};

#[derive(Parser, Debug)]
#[command(name = "estate", about = "Inspect and edit holdings tables")]
struct Cli {
    /// Overrides the configured SQLite database.
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inserts one row given as a JSON object.
    Create { table: String, data: String },
    Get { table: String, id: String },
    List {
        table: String,
        /// Equality filter as `column=value`; values are parsed as JSON when possible.
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, Value)>,
        #[arg(long, default_value = "created_at")]
        order_by: String,
        #[arg(long)]
        ascending: bool,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
    },
    /// Merges a JSON object into an existing row.
    Update {
        table: String,
        id: String,
        data: String,
    },
    Delete { table: String, id: String },
    BatchDelete {
        table: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Walks a table page by page, newest first.
    Pages {
        table: String,
        #[arg(long)]
        page_size: Option<u32>,
        #[arg(long)]
        max_pages: Option<u32>,
    },
    /// Re-lists a table on the polling interval and prints each result.
    Watch {
        table: String,
        #[arg(long, default_value_t = 3)]
        ticks: u32,
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings()?;
    if let Some(database_url) = cli.database_url {
        settings.database_url = database_url;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mapper = settings.error_mapper()?;
    let repository = open_repository(&settings).await?;

    match run(cli.command, repository, &settings, &mapper).await {
        Ok(()) => Ok(()),
        Err(err) => {
            error!(error = %err, "command failed");
            Err(err)
        }
    }
}

async fn open_repository(settings: &Settings) -> Result<Arc<dyn EntityRepository>> {
    let repository: Arc<dyn EntityRepository> = match settings.backend {
        Backend::Sqlite => {
            let database_url = prepare_database_url(&settings.database_url);
            let repository = SqliteRepository::new(&database_url)
                .await
                .with_context(|| format!("failed to open database '{database_url}'"))?;
            info!(%database_url, "using sqlite backend");
            Arc::new(repository)
        }
        Backend::Memory => {
            info!("using in-memory backend; nothing is persisted");
            Arc::new(InMemoryRepository::new())
        }
        Backend::Rest => {
            let Some(rest_url) = &settings.rest_url else {
                bail!("the rest backend needs ESTATE_REST_URL or rest_url in estate.toml");
            };
            let api_key = settings.api_key.clone().unwrap_or_default();
            let repository = RestRepository::new(RestConfig::new(rest_url.as_str(), api_key))
                .with_context(|| format!("invalid rest url '{rest_url}'"))?;
            info!(%rest_url, "using rest backend");
            Arc::new(repository)
        }
    };
    Ok(repository)
}

async fn run(
    command: Command,
    repository: Arc<dyn EntityRepository>,
    settings: &Settings,
    mapper: &ErrorMapper,
) -> Result<()> {
    let friendly = |err: StoreError| anyhow!("{} ({err})", mapper.map_error(&err));

    match command {
        Command::Create { table, data } => {
            let record = repository
                .create(&table, parse_object(&data)?)
                .await
                .map_err(friendly)?;
            print_json(&record)?;
        }
        Command::Get { table, id } => {
            let record = repository
                .get_by_id(&table, &RecordId::from(id))
                .await
                .map_err(friendly)?;
            print_json(&record)?;
        }
        Command::List {
            table,
            filters,
            order_by,
            ascending,
            limit,
            offset,
        } => {
            let mut options = QueryOptions::new()
                .filters(filters)
                .order_by(order_by, ascending);
            options.limit = limit;
            options.offset = offset;
            let records = repository.list(&table, &options).await.map_err(friendly)?;
            print_json(&records)?;
        }
        Command::Update { table, id, data } => {
            let record = repository
                .update(&table, &RecordId::from(id), parse_object(&data)?)
                .await
                .map_err(friendly)?;
            print_json(&record)?;
        }
        Command::Delete { table, id } => {
            let record = repository
                .delete(&table, &RecordId::from(id))
                .await
                .map_err(friendly)?;
            print_json(&record)?;
        }
        Command::BatchDelete { table, ids } => {
            let ids: Vec<RecordId> = ids.into_iter().map(RecordId::from).collect();
            let removed = repository
                .batch_delete(&table, &ids)
                .await
                .map_err(friendly)?;
            println!("deleted {} of {} rows", removed.len(), ids.len());
        }
        Command::Pages {
            table,
            page_size,
            max_pages,
        } => {
            let page_size = page_size.unwrap_or(settings.page_size);
            walk_pages(repository, table, page_size, max_pages, mapper.clone()).await?;
        }
        Command::Watch {
            table,
            ticks,
            interval_ms,
        } => {
            let interval = interval_ms
                .map(std::time::Duration::from_millis)
                .unwrap_or_else(|| settings.poll_interval());
            watch_table(repository, table, ticks, interval, mapper.clone()).await?;
        }
    }
    Ok(())
}

async fn walk_pages(
    repository: Arc<dyn EntityRepository>,
    table: String,
    page_size: u32,
    max_pages: Option<u32>,
    mapper: ErrorMapper,
) -> Result<()> {
    let controller = PaginatedFetchController::new(
        move |page: u32, page_size: u32| {
            let repository = Arc::clone(&repository);
            let table = table.clone();
            async move {
                let options = QueryOptions::new()
                    .limit(page_size)
                    .offset((page - 1) * page_size);
                repository.list(&table, &options).await
            }
        },
        PaginationOptions::default().page_size(page_size).mapper(mapper),
    );

    let first = controller.mount().await.map_err(|message| anyhow!(message))?;
    println!("page 1: {first} rows");
    while max_pages.map_or(true, |max| controller.snapshot().page < max) {
        match controller.load_more().await {
            None => break,
            Some(Ok(received)) => println!("page {}: {received} rows", controller.snapshot().page),
            Some(Err(message)) => bail!(message),
        }
    }

    let state = controller.snapshot();
    print_json(&state.items)?;
    info!(
        pages = state.page,
        rows = state.items.len(),
        has_more = state.has_more,
        "finished paging"
    );
    Ok(())
}

async fn watch_table(
    repository: Arc<dyn EntityRepository>,
    table: String,
    ticks: u32,
    interval: std::time::Duration,
    mapper: ErrorMapper,
) -> Result<()> {
    let controller = PollingController::new(
        move || {
            let repository = Arc::clone(&repository);
            let table = table.clone();
            async move { repository.list(&table, &QueryOptions::new()).await }
        },
        PollingOptions::default().interval(interval).mapper(mapper),
    );

    let mut states = controller.subscribe();
    controller.mount();
    let mut settled = 0;
    while settled < ticks {
        states
            .changed()
            .await
            .context("polling controller went away")?;
        let state = states.borrow_and_update().clone();
        if state.loading {
            continue;
        }
        settled += 1;
        match (&state.error, &state.data) {
            (Some(message), _) => println!("tick {settled}: {message}"),
            (None, Some(rows)) => println!("tick {settled}: {} rows", rows.len()),
            (None, None) => {}
        }
    }
    controller.stop_polling();
    Ok(())
}

fn parse_object(raw: &str) -> Result<Fields> {
    match serde_json::from_str::<Value>(raw).context("row data must be valid JSON")? {
        Value::Object(fields) => Ok(fields),
        other => bail!("row data must be a JSON object, got {other}"),
    }
}

fn parse_filter(raw: &str) -> Result<(String, Value), String> {
    let (column, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("filter '{raw}' is not column=value"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((column.trim().to_string(), value))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
