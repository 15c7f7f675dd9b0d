use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;

use clap::{Parser, Subcommand};
use ratatui::DefaultTerminal;
use tracing::{error, info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use invopt::backend::{HttpBackend, OptimizationBackend};
use invopt::controller::Controller;
use invopt::domain::{AppConfig, DEFAULT_PAGE_SIZE, FallbackPolicy, InvError};
use invopt::model::{Model, Status};
use invopt::state::FileStore;
use invopt::ui;
use invopt::view::{SortKey, ViewQuery};
use invopt::workflow::Workflow;

#[derive(Parser, Debug)]
#[command(name = "invopt", version, about = "Inventory optimization front-end for the terminal")]
struct Cli {
    /// Base URL of the optimization service
    #[arg(long, env = "INVOPT_BACKEND_URL", default_value = "http://localhost:5000/api")]
    backend_url: String,

    /// Directory holding the persisted state and the log file
    #[arg(long, env = "INVOPT_STATE_DIR", default_value = "~/.invopt")]
    state_dir: String,

    /// Directory results are exported to
    #[arg(long, default_value = ".")]
    export_dir: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    #[arg(long, default_value_t = 32)]
    max_column_width: usize,

    /// Lowercase column names and replace spaces with underscores on upload
    #[arg(long)]
    normalize_headers: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the terminal UI, uploading FILES first
    View { files: Vec<String> },
    /// Parse and store files
    Upload {
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Run the optimization on the stored files
    Optimize {
        /// Fail instead of falling back to demo results
        #[arg(long)]
        no_demo: bool,
        /// Restrict the run to these stored files
        #[arg(long = "file")]
        files: Vec<String>,
    },
    /// Write the optimization results as CSV
    Export {
        #[arg(long)]
        dir: Option<String>,
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        desc: bool,
    },
    /// Clear the persisted state
    Reset,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Err(e) => {
            error!("Exiting with error: {e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn expand_path(path: &str) -> Result<PathBuf, InvError> {
    let expanded = shellexpand::full(path)
        .map_err(|e| InvError::Workflow(format!("cannot expand path \"{path}\": {e}")))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

fn init_logging(state_dir: &Path) -> Result<(), InvError> {
    fs::create_dir_all(state_dir)?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(state_dir.join("invopt.log"))?;
    let filter = EnvFilter::try_from_env("INVOPT_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn run(cli: Cli) -> Result<(), InvError> {
    let state_dir = expand_path(&cli.state_dir)?;
    init_logging(&state_dir)?;
    info!("Starting invopt {}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::default()
        .with_backend_url(cli.backend_url)
        .with_request_timeout_secs(cli.timeout)
        .with_page_size(cli.page_size)
        .with_max_column_width(cli.max_column_width)
        .with_normalize_headers(cli.normalize_headers)
        .with_state_dir(state_dir.clone())
        .with_export_dir(expand_path(&cli.export_dir)?);

    let backend = HttpBackend::new(
        config.backend_url.clone(),
        Duration::from_secs(config.request_timeout_secs),
    )?;
    let mut workflow = Workflow::new(config.clone(), FileStore::new(&state_dir), backend)?;

    match cli.command.unwrap_or(Command::View { files: Vec::new() }) {
        Command::View { files } => {
            let paths = files
                .iter()
                .map(|f| expand_path(f))
                .collect::<Result<Vec<_>, _>>()?;
            if !paths.is_empty() {
                workflow.open(&paths, config.fallback)?;
            } else if workflow.state().uploaded_files.is_empty()
                && let Err(e) = workflow.backend().health()
            {
                warn!("Backend unavailable ({e}), loading demo data");
                workflow.load_demo_data()?;
            }
            run_tui(&config, workflow)
        }
        Command::Upload { files } => {
            let paths = files
                .iter()
                .map(|f| expand_path(f))
                .collect::<Result<Vec<_>, _>>()?;
            for report in workflow.upload(&paths)? {
                print!("{}: {} rows x {} columns", report.name, report.rows, report.columns);
                if report.recovered_lines > 0 {
                    print!(" ({} lines padded or truncated)", report.recovered_lines);
                }
                println!();
            }
            Ok(())
        }
        Command::Optimize { no_demo, files } => {
            if !files.is_empty() {
                workflow.select_for_optimization(&files)?;
            }
            let policy = if no_demo {
                FallbackPolicy::Fail
            } else {
                config.fallback
            };
            let result = workflow.run_optimization(policy)?;
            println!("{}", result.message);
            println!("Total savings:           {:.2}", result.summary.total_savings);
            println!(
                "Average stock reduction: {:.1}%",
                result.summary.average_stock_reduction
            );
            println!("Rows:                    {}", result.data.row_count());
            if workflow.state().using_demo_data {
                println!("Backend unavailable, these are demo results.");
            }
            Ok(())
        }
        Command::Export {
            dir,
            filter,
            sort,
            desc,
        } => {
            let dir = match dir {
                Some(d) => expand_path(&d)?,
                None => config.export_dir.clone(),
            };
            let mut query = ViewQuery::default().with_filter(filter.unwrap_or_default());
            if let Some(column) = sort {
                query = query.with_sort(if desc {
                    SortKey::descending(column)
                } else {
                    SortKey::ascending(column)
                });
            }
            let path = workflow.export_results(&dir, &query)?;
            println!("{}", path.display());
            Ok(())
        }
        Command::Reset => {
            workflow.reset()?;
            println!("State cleared");
            Ok(())
        }
    }
}

fn run_tui<B: OptimizationBackend>(
    config: &AppConfig,
    workflow: Workflow<FileStore, B>,
) -> Result<(), InvError> {
    let mut terminal = ratatui::init();
    let result = tui_loop(config, workflow, &mut terminal);
    ratatui::restore();
    result
}

fn tui_loop<B: OptimizationBackend>(
    config: &AppConfig,
    workflow: Workflow<FileStore, B>,
    terminal: &mut DefaultTerminal,
) -> Result<(), InvError> {
    let size = terminal
        .size()
        .map_err(|e| InvError::Terminal(e.to_string()))?;
    let mut model = Model::init(config, workflow, size.width as usize, size.height as usize)?;
    let controller = Controller::new(config);

    while model.status != Status::QUITTING {
        // Render the current view
        terminal
            .draw(|f| ui::draw(model.get_uidata(), f))
            .map_err(|e| InvError::Terminal(e.to_string()))?;

        // Handle events and map to a Message
        let message = controller.handle_event(&model)?;
        model.update(message)?;
    }
    info!("Quitting invopt");
    Ok(())
}
