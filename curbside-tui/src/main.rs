//! Terminal front end for curbside: browse pickup schedules or build town databases.

mod app;
mod input;
mod ui;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::{io, time::Duration as StdDuration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event as CEvent},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use curbside_core::{
    CollectionService, ResolveErrorKind, RouteQuery, RouteSchedule, ScheduleRequest, ServiceError,
    TownId, TownRegistry,
};
use curbside_source_file as source_file;
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::input::{Action, parse_address_input, trailing_number_reading};

#[derive(Parser)]
#[command(name = "curbside", version, about = "Trash and recycling pickup calendar")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Look up pickup schedules interactively
    Browse {
        /// Town config file (repeat for several towns)
        #[arg(long = "town", required = true)]
        towns: Vec<PathBuf>,
        /// Days to show; the town default when omitted
        #[arg(long)]
        days: Option<u32>,
        /// Write logs here (the terminal belongs to the UI)
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Build a town database from parser output
    Build {
        /// Town config file
        #[arg(long)]
        town: PathBuf,
        /// Parsed route list (JSON)
        #[arg(long)]
        routes: PathBuf,
        /// Parsed schedule guide (JSON)
        #[arg(long)]
        schedule: PathBuf,
        /// Output database path
        #[arg(long)]
        out: PathBuf,
        /// Check inputs without writing the database
        #[arg(long)]
        validate_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Browse {
            towns,
            days,
            log_file,
        } => {
            init_file_logging(log_file.as_deref())?;
            browse(&towns, days).await
        }
        Command::Build {
            town,
            routes,
            schedule,
            out,
            validate_only,
        } => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(io::stderr)
                .init();
            let db = source_file::build_database_files(
                &town,
                &routes,
                &schedule,
                &out,
                validate_only,
            )
            .with_context(|| format!("building database for {}", town.display()))?;
            info!(routes = db.routes.len(), aliases = db.aliases.len(), "build finished");
            Ok(())
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_file_logging(log_file: Option<&Path>) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter());
    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(io::sink).init(),
    }
    Ok(())
}

async fn browse(town_configs: &[PathBuf], days: Option<u32>) -> Result<()> {
    let plugins = town_configs
        .iter()
        .map(|path| {
            source_file::plugin(path)
                .with_context(|| format!("loading town config {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let registry = Arc::new(TownRegistry::new(plugins));
    let service = Arc::new(CollectionService::new(registry));

    let app = App::new(service, days);

    // Terminal init
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

async fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, mut app: App) -> Result<()> {
    loop {
        terminal.draw(|frame| ui::draw(frame, &app))?;

        // Poll for input (non-blocking, small timeout to keep CPU low)
        if event::poll(StdDuration::from_millis(100))?
            && let CEvent::Key(key) = event::read()?
        {
            match input::handle_key_event(key, &mut app) {
                Action::Quit => break,
                Action::None => {}
                Action::LoadTownSummary => {
                    let Some(town) = app.selected_town.clone() else {
                        continue;
                    };
                    app.is_loading = true;
                    terminal.draw(|frame| ui::draw(frame, &app))?;

                    let summary = tokio::try_join!(
                        app.service.streets(&town),
                        app.service.snapshot_info(&town)
                    );

                    app.is_loading = false;
                    match summary {
                        Ok((streets, info)) => {
                            app.error_message = None;
                            app.show_town_summary(&streets, &info);
                        }
                        Err(err) => {
                            app.error_message = Some(format!("Failed to load town data: {err}"));
                        }
                    }
                }
                Action::LoadSchedule => {
                    let Some(town) = app.selected_town.clone() else {
                        app.error_message = Some("Select a town first".into());
                        continue;
                    };
                    let Some(query) = parse_address_input(&app.address_input) else {
                        app.error_message = Some(
                            "Type a street (optionally with a house number), then press Enter"
                                .into(),
                        );
                        continue;
                    };

                    app.is_loading = true;
                    app.error_message = None;
                    terminal.draw(|frame| ui::draw(frame, &app))?;

                    let res = load_schedule(&app, &town, query).await;

                    app.is_loading = false;
                    match res {
                        Ok(schedule) => app.show_schedule(schedule),
                        Err(ServiceError::Resolve(err)) => app.show_resolve_error(err),
                        Err(err) => {
                            app.error_message = Some(format!("Failed to load schedule: {err}"));
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// Schedule for the typed address. When the whole text is not a known street, retry with
/// a trailing number read as the house number ("Boston Rd 65").
async fn load_schedule(
    app: &App,
    town: &TownId,
    query: RouteQuery,
) -> Result<RouteSchedule, ServiceError> {
    let alternative = trailing_number_reading(&query);
    let request = |query: RouteQuery| ScheduleRequest {
        days: app.days,
        ..ScheduleRequest::for_address(query)
    };

    let first = app.service.schedule(town, &request(query)).await;
    let not_found = matches!(
        &first,
        Err(ServiceError::Resolve(err)) if err.kind == ResolveErrorKind::NotFound
    );
    let Some(alternative) = alternative.filter(|_| not_found) else {
        return first;
    };
    match app.service.schedule(town, &request(alternative)).await {
        Err(ServiceError::Resolve(retry)) if retry.kind == ResolveErrorKind::NotFound => first,
        retried => retried,
    }
}
