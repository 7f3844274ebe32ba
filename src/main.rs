use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use close_extractor::agent::PageDirectory;
use close_extractor::config::Settings;
use close_extractor::coordinator::Coordinator;
use close_extractor::dashboard::Dashboard;
use close_extractor::export;
use close_extractor::indicator::SpinnerIndicator;
use close_extractor::model::EntityKind;
use close_extractor::page::SnapshotPage;
use close_extractor::parser::matcher;
use close_extractor::store::StoreHandle;

#[derive(Parser)]
#[command(name = "close_extractor", about = "Extract Close CRM records from saved pages")]
struct Cli {
    /// Store location (overrides CRM_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract records from a saved page
    Extract {
        /// Address the page was saved from
        #[arg(short, long)]
        url: String,
        /// Saved HTML of the page
        #[arg(long)]
        html: PathBuf,
    },
    /// Re-extract whenever the saved page gains new records (Ctrl-C to stop)
    Watch {
        #[arg(short, long)]
        url: String,
        #[arg(long)]
        html: PathBuf,
        /// How often to look at the file
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
    },
    /// List stored records
    Show {
        /// Only this kind (contacts, opportunities, tasks)
        #[arg(short, long)]
        kind: Option<EntityKind>,
        /// Case-insensitive filter on names, leads and descriptions
        #[arg(short, long)]
        search: Option<String>,
        /// Max rows per kind
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show store statistics
    Stats,
    /// Delete one record
    Delete { kind: EntityKind, id: String },
    /// Remove every stored record
    Clear,
    /// Write the store to a file
    Export {
        #[arg(short, long, value_enum, default_value = "csv")]
        format: ExportFormat,
        /// Output path (default: close-data-<millis>.<ext>)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
    Json,
}

/// The long-lived pieces every command works through.
struct App {
    settings: Settings,
    pages: PageDirectory,
    dashboard: Dashboard,
}

impl App {
    fn start(settings: Settings) -> anyhow::Result<Self> {
        let store = StoreHandle::open(&settings.db_path, &settings.namespace)
            .with_context(|| format!("opening store at {}", settings.db_path.display()))?;
        let (bus, _task) = Coordinator::spawn(store.clone());
        let pages = PageDirectory::new(
            settings.clone(),
            store.clone(),
            bus.clone(),
            Arc::new(SpinnerIndicator::new()),
        );
        let dashboard = Dashboard::new(&settings, store, bus, pages.clone())?;
        Ok(Self {
            settings,
            pages,
            dashboard,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load().context("loading CRM_* settings")?;
    if let Some(db) = cli.db {
        settings.db_path = db;
    }
    let mut app = App::start(settings)?;

    let result = match cli.command {
        Commands::Extract { url, html } => {
            let page = app.pages.open(Arc::new(SnapshotPage::new(url, html)));
            let msg = app.dashboard.extract(page.id()).await;
            println!("{}", msg);
            Ok(())
        }
        Commands::Watch {
            url,
            html,
            interval_ms,
        } => watch(&mut app, url, html, Duration::from_millis(interval_ms)).await,
        Commands::Show {
            kind,
            search,
            limit,
        } => {
            show(&app.dashboard, kind, search.as_deref().unwrap_or(""), limit);
            Ok(())
        }
        Commands::Stats => {
            let view = app.dashboard.view();
            println!("Contacts:      {}", view.contacts.len());
            println!("Opportunities: {}", view.opportunities.len());
            println!("Tasks:         {}", view.tasks.len());
            println!("Last sync:     {}", format_sync(view.last_sync));
            Ok(())
        }
        Commands::Delete { kind, id } => {
            if app.dashboard.delete(kind, &id)? {
                println!("Deleted {} {}", kind, id);
            } else {
                println!("No {} with id {}", kind, id);
            }
            Ok(())
        }
        Commands::Clear => {
            app.dashboard.clear_all().await?;
            println!("All data cleared.");
            Ok(())
        }
        Commands::Export { format, out } => {
            let view = app.dashboard.view();
            let (body, ext) = match format {
                ExportFormat::Csv => (export::to_csv(view), "csv"),
                ExportFormat::Json => (export::to_json(view)?, "json"),
            };
            let path = out.unwrap_or_else(|| PathBuf::from(export::default_filename(ext)));
            std::fs::write(&path, body)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Exported {} records to {}", view.len(), path.display());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Extract once, then again each time the file shows more record markers.
async fn watch(app: &mut App, url: String, html: PathBuf, every: Duration) -> anyhow::Result<()> {
    let page = app.pages.open(Arc::new(SnapshotPage::new(url, html.clone())));
    println!("{}", app.dashboard.extract(page.id()).await);

    let read_markers = || -> anyhow::Result<usize> {
        let body = std::fs::read_to_string(&html)
            .with_context(|| format!("reading {}", html.display()))?;
        Ok(matcher::count_markers(&body))
    };
    let mut seen = read_markers()?;
    tracing::info!(
        "Watching {} every {:?} ({} records, dismiss after {:?})",
        html.display(),
        every,
        seen,
        app.settings.indicator_dismiss()
    );

    let mut tick = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let now = match read_markers() {
                    Ok(n) => n,
                    Err(e) => {
                        tracing::warn!("{:#}", e);
                        continue;
                    }
                };
                if now > seen {
                    tracing::debug!("Marker count {} -> {}", seen, now);
                    page.content_changed();
                }
                seen = now;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    app.pages.close(page.id());
    app.dashboard.refresh()?;
    println!("Stopped. {} records stored.", app.dashboard.view().len());
    Ok(())
}

fn show(dashboard: &Dashboard, kind: Option<EntityKind>, query: &str, limit: usize) {
    let hits = dashboard.search(query);
    let wants = |k: EntityKind| kind.map_or(true, |only| only == k);

    if wants(EntityKind::Contacts) {
        println!("\n--- Contacts ({}) ---", hits.contacts.len());
        println!("{:<16} | {:<24} | {:<24} | {:<30} | {:<16}", "ID", "Name", "Lead", "Emails", "Phones");
        println!("{}", "-".repeat(122));
        for c in hits.contacts.iter().take(limit) {
            println!(
                "{:<16} | {:<24} | {:<24} | {:<30} | {:<16}",
                c.id,
                truncate(&c.name, 24),
                truncate(&c.lead, 24),
                truncate(&c.emails.join(";"), 30),
                truncate(&c.phones.join(";"), 16)
            );
        }
    }

    if wants(EntityKind::Opportunities) {
        println!("\n--- Opportunities ({}) ---", hits.opportunities.len());
        println!("{:<16} | {:<28} | {:>12} | {:<18} | {:<14}", "ID", "Name", "Value", "Status", "Close");
        println!("{}", "-".repeat(100));
        for o in hits.opportunities.iter().take(limit) {
            println!(
                "{:<16} | {:<28} | {:>12} | {:<18} | {:<14}",
                o.id,
                truncate(&o.name, 28),
                truncate(&o.value, 12),
                truncate(&o.status, 18),
                truncate(&o.close_date, 14)
            );
        }
    }

    if wants(EntityKind::Tasks) {
        println!("\n--- Tasks ({}) ---", hits.tasks.len());
        println!("{:<16} | {:<44} | {:<12} | {:<8} | {:>4}", "ID", "Description", "Due", "Assignee", "Done");
        println!("{}", "-".repeat(96));
        for t in hits.tasks.iter().take(limit) {
            println!(
                "{:<16} | {:<44} | {:<12} | {:<8} | {:>4}",
                t.id,
                truncate(&t.description, 44),
                truncate(&t.due_date, 12),
                truncate(&t.assignee, 8),
                if t.is_complete { "yes" } else { "no" }
            );
        }
    }
}

fn format_sync(millis: i64) -> String {
    if millis == 0 {
        return "never".to_string();
    }
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
