use clap::{Args, Parser, Subcommand};
use hfspace_cli::{
    config::{Credentials, partial_show_secret, resolve_data_dir},
    output::{self, OutputFormat},
};
use hfspace_core::{
    Error,
    config::{self, ClientConfig},
    favorites::{AddOutcome, FavoritesStore, RemoveOutcome},
    hub::{HubClient, SpaceSort},
    results::{NewResult, OutputType, Page, ResultFilter, ResultsStore},
    runner::{CallArgs, GradioConnector, SpaceRunner},
};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(author, version, about = "Find, run and archive Hugging Face Spaces", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a client config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Hub endpoint
    #[arg(long, short = 'u', env = "HF_ENDPOINT", global = true)]
    hub_url: Option<String>,

    /// Hugging Face access token
    #[arg(long, short = 'k', env = "HF_TOKEN", global = true, hide_env_values = true)]
    hf_token: Option<String>,

    /// Directory holding favorites and the results database
    #[arg(long, env = "HFSPACE_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Credentials directory
    #[arg(long, short = 'd', global = true)]
    credentials_dir: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the Hub for Spaces matching a task description
    Search(SearchArgs),

    /// Manage favorite Spaces
    Favorites {
        #[command(subcommand)]
        command: FavoritesCommands,
    },

    /// Inspect or call a Space's API
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },

    /// Manage the local library of generated results
    Results {
        #[command(subcommand)]
        command: ResultsCommands,
    },

    /// Show or save Hub credentials
    Login(LoginArgs),
}

#[derive(Args)]
struct SearchArgs {
    /// Task description to search for
    task_description: String,

    /// Sort field (likes, lastModified, createdAt, trendingScore, id)
    #[arg(long, default_value = "likes")]
    sort_by: SpaceSort,

    /// Maximum number of Spaces to return
    #[arg(long, default_value_t = 10)]
    limit: usize,
}

#[derive(Subcommand)]
enum FavoritesCommands {
    /// Add a Space to favorites
    Add { space_id: String },

    /// List favorite Spaces
    List,

    /// Remove a Space from favorites
    Remove { space_id: String },
}

#[derive(Args)]
struct CallTarget {
    /// Space id (owner/name) or direct Space URL
    space_id: String,

    /// API endpoint name (e.g. /predict)
    api_name: String,

    /// Inputs as key=value or bare positional values; files by path
    #[arg(long, num_args = 1..)]
    params: Vec<String>,
}

#[derive(Subcommand)]
enum RunCommands {
    /// Show the API endpoints a Space exposes
    Info { space_id: String },

    /// Call a Space and wait for the result
    Predict {
        #[command(flatten)]
        target: CallTarget,

        /// Task description stored with the result (defaults to the Space id)
        #[arg(long)]
        task_desc: Option<String>,

        /// Save the result to the library under this output type
        #[arg(long)]
        output_type_for_db: Option<OutputType>,
    },

    /// Queue a call on the Space and print its event id
    Submit {
        #[command(flatten)]
        target: CallTarget,

        /// Wait for the job to finish and print its result
        #[arg(long)]
        wait: bool,

        /// Seconds to wait for the result
        #[arg(long, requires = "wait")]
        timeout: Option<u64>,
    },
}

#[derive(Subcommand)]
enum ResultsCommands {
    /// List stored results, newest first
    List {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    /// Add a result by hand
    Add {
        #[arg(long)]
        space_id: String,
        #[arg(long)]
        task: String,
        #[arg(long = "type")]
        output_type: OutputType,
        #[arg(long)]
        data: String,
        /// Input parameters as a JSON object
        #[arg(long)]
        params_json: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Show a single result
    View { content_id: i64 },

    /// Filter results by type, Space or task keyword
    Filter {
        #[arg(long = "type")]
        output_type: Option<OutputType>,
        #[arg(long)]
        space_id: Option<String>,
        #[arg(long)]
        task_keyword: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    /// Replace the notes of a result
    Update {
        content_id: i64,
        #[arg(long)]
        notes: String,
    },

    /// Delete a result
    Delete {
        content_id: i64,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Create the results database if it does not exist
    Initdb,
}

#[derive(Args)]
struct LoginArgs {
    /// Save the effective credentials to the credentials file
    #[arg(short, long)]
    save: bool,

    /// Test the token against the Hub
    #[arg(short, long)]
    test: bool,
}

struct Context {
    credentials: Credentials,
    client_config: ClientConfig,
    data_dir: PathBuf,
    format: OutputFormat,
}

impl Context {
    fn from_cli(cli: &Cli) -> Result<Self, Error> {
        let credentials = Credentials::initialize(
            cli.credentials_dir.clone(),
            cli.hub_url.clone(),
            cli.hf_token.clone(),
        );
        let mut client_config = match &cli.config {
            Some(path) => config::from_file::<ClientConfig, _>(path)?,
            None => ClientConfig::default(),
        };
        if let Some(hub_url) = &credentials.hub_url {
            client_config = client_config.with_hub_url(hub_url.clone());
        }
        let data_dir = resolve_data_dir(cli.data_dir.as_deref())
            .map_err(|e| Error::Internal(format!("Failed to resolve data directory: {}", e)))?;
        debug!("Using data directory {}", data_dir.display());

        Ok(Self {
            credentials,
            client_config,
            data_dir,
            format: cli.output,
        })
    }

    fn hub(&self) -> Result<HubClient, Error> {
        Ok(HubClient::new(
            self.client_config.http_client()?,
            &self.client_config,
            self.credentials.token(),
        ))
    }

    fn runner(&self) -> Result<SpaceRunner, Error> {
        let client = self.client_config.http_client()?;
        let hub = HubClient::new(client.clone(), &self.client_config, self.credentials.token());
        Ok(SpaceRunner::new(Arc::new(GradioConnector::new(hub, client))))
    }

    fn favorites(&self) -> FavoritesStore {
        FavoritesStore::in_dir(&self.data_dir)
    }

    fn results(&self) -> Result<ResultsStore, Error> {
        Ok(ResultsStore::in_dir(&self.data_dir)?)
    }

    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

async fn handle_search(args: &SearchArgs, ctx: &Context) -> Result<(), Error> {
    info!(
        "Searching for Spaces with task: '{}', sort_by: {}, limit: {}",
        args.task_description, args.sort_by, args.limit
    );
    let spaces = ctx
        .hub()?
        .find_spaces(&args.task_description, args.sort_by, args.limit)
        .await?;

    if ctx.json() {
        output::output_json(&spaces, true)?;
    } else {
        println!("{}", output::render_spaces(&spaces));
    }
    Ok(())
}

async fn handle_favorites_commands(cmd: &FavoritesCommands, ctx: &Context) -> Result<(), Error> {
    let store = ctx.favorites();
    match cmd {
        FavoritesCommands::Add { space_id } => match store.add(space_id).await? {
            AddOutcome::Added => println!("Space '{}' added to favorites.", space_id),
            AddOutcome::AlreadyPresent => println!("Space '{}' is already a favorite.", space_id),
        },
        FavoritesCommands::List => {
            let favorites = store.list().await;
            if ctx.json() {
                output::output_json(&favorites, true)?;
            } else {
                println!("{}", output::render_favorites(&favorites));
            }
        }
        FavoritesCommands::Remove { space_id } => match store.remove(space_id).await? {
            RemoveOutcome::Removed => println!("Space '{}' removed from favorites.", space_id),
            RemoveOutcome::NotPresent => println!("Space '{}' was not a favorite.", space_id),
        },
    }
    Ok(())
}

fn print_prediction(value: &Value, ctx: &Context) -> Result<(), Error> {
    if ctx.json() {
        output::output_json(value, true)
    } else {
        println!("{}", output::render_prediction(value));
        Ok(())
    }
}

async fn handle_run_commands(cmd: &RunCommands, ctx: &Context) -> Result<(), Error> {
    let runner = ctx.runner()?;
    match cmd {
        RunCommands::Info { space_id } => {
            info!("Fetching API details for Space: {}", space_id);
            let api_info = runner.get_space_api_details(space_id).await?;
            if ctx.json() {
                output::output_json(&api_info, true)?;
            } else {
                print!("{}", api_info);
            }
        }

        RunCommands::Predict {
            target,
            task_desc,
            output_type_for_db,
        } => {
            let args = CallArgs::parse(&target.params);
            let result = runner
                .run_space_predict(&target.space_id, &target.api_name, &args)
                .await?;
            print_prediction(&result, ctx)?;

            if let Some(output_type) = output_type_for_db {
                let store = ctx.results()?;
                let id = store.add_content(&NewResult {
                    space_id: target.space_id.clone(),
                    task_description: task_desc.clone().unwrap_or_else(|| target.space_id.clone()),
                    output_type: *output_type,
                    output_data: output::output_data_string(&result),
                    parameters: args.to_parameters_json(),
                    notes: Some("Generated via CLI 'run predict'".to_string()),
                })?;
                eprintln!("Result saved with ID: {}", id);
            }
        }

        RunCommands::Submit {
            target,
            wait,
            timeout,
        } => {
            let args = CallArgs::parse(&target.params);
            let job = runner
                .run_space_submit(&target.space_id, &target.api_name, &args)
                .await?;
            let handle = job.id().to_string();
            eprintln!(
                "{}",
                output::render_job(&job, runner.get_job_status(&handle)?)
            );

            if *wait {
                let result = runner
                    .get_job_result(&handle, timeout.map(Duration::from_secs))
                    .await?;
                print_prediction(&result, ctx)?;
            } else {
                // The Space has the call queued; its result is only collected with --wait.
                println!("{}", job.event_id());
            }
        }
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool, Error> {
    print!("{} (yes/no): ", prompt);
    io::stdout()
        .flush()
        .map_err(|e| Error::Internal(e.to_string()))?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|e| Error::Internal(e.to_string()))?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "yes" | "y"))
}

fn print_results(results: &[hfspace_core::results::StoredResult], ctx: &Context) -> Result<(), Error> {
    if ctx.json() {
        output::output_json(&results, true)
    } else {
        println!("{}", output::render_results(results));
        Ok(())
    }
}

fn handle_results_commands(cmd: &ResultsCommands, ctx: &Context) -> Result<(), Error> {
    let store = ctx.results()?;
    match cmd {
        ResultsCommands::List { limit, offset } => {
            let results = store.get_all_content(Page {
                limit: *limit,
                offset: *offset,
            })?;
            print_results(&results, ctx)?;
        }

        ResultsCommands::Add {
            space_id,
            task,
            output_type,
            data,
            params_json,
            notes,
        } => {
            let parameters = match params_json {
                Some(raw) => serde_json::from_str::<Value>(raw).map_err(|e| {
                    Error::Internal(format!("Invalid JSON for --params-json: {}", e))
                })?,
                None => Value::Object(Default::default()),
            };
            let id = store.add_content(&NewResult {
                space_id: space_id.clone(),
                task_description: task.clone(),
                output_type: *output_type,
                output_data: data.clone(),
                parameters,
                notes: notes.clone(),
            })?;
            println!("Content added successfully with ID: {}", id);
        }

        ResultsCommands::View { content_id } => match store.get_content_by_id(*content_id)? {
            Some(result) if ctx.json() => output::output_json(&result, true)?,
            Some(result) => println!("{}", output::render_result_detail(&result)),
            None => {
                return Err(Error::Internal(format!(
                    "No result found with ID: {}",
                    content_id
                )));
            }
        },

        ResultsCommands::Filter {
            output_type,
            space_id,
            task_keyword,
            limit,
            offset,
        } => {
            let filter = ResultFilter {
                output_type: *output_type,
                space_id: space_id.clone(),
                task_keyword: task_keyword.clone(),
            };
            let results = store.filter_content(
                &filter,
                Page {
                    limit: *limit,
                    offset: *offset,
                },
            )?;
            print_results(&results, ctx)?;
        }

        ResultsCommands::Update { content_id, notes } => {
            if store.update_content_notes(*content_id, notes)? {
                println!("Notes updated for result ID: {}", content_id);
            } else {
                return Err(Error::Internal(format!(
                    "No result found with ID: {}",
                    content_id
                )));
            }
        }

        ResultsCommands::Delete { content_id, yes } => {
            if !*yes
                && !confirm(&format!(
                    "Are you sure you want to delete result ID {}?",
                    content_id
                ))?
            {
                println!("Deletion cancelled.");
                return Ok(());
            }
            if store.delete_content(*content_id)? {
                println!("Result ID: {} deleted.", content_id);
            } else {
                return Err(Error::Internal(format!(
                    "No result found with ID: {}",
                    content_id
                )));
            }
        }

        ResultsCommands::Initdb => {
            let location = store
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "memory".to_string());
            println!("Database '{}' initialized.", location);
        }
    }
    Ok(())
}

async fn handle_login_command(args: &LoginArgs, ctx: &Context) -> Result<(), Error> {
    let credentials = &ctx.credentials;

    println!("Current Hub settings:");
    println!("Hub URL: {}", ctx.client_config.hub_url);
    if !credentials.hf_token.expose_secret().is_empty() {
        println!("HF Token: {}", partial_show_secret(&credentials.hf_token));
    } else {
        println!("HF Token: Not set");
    }

    if args.save {
        let path = credentials
            .save_credentials()
            .map_err(|e| Error::Internal(format!("Failed to save credentials: {}", e)))?;
        println!("Credentials saved to {}", path.display());
    }

    if args.test {
        print!("Testing Hub connection... ");
        io::stdout()
            .flush()
            .map_err(|e| Error::Internal(e.to_string()))?;
        match ctx.hub()?.find_spaces("", SpaceSort::Likes, 1).await {
            Ok(_) => println!("✅ Success"),
            Err(e) => println!("❌ Failed: {}", e),
        }
    }
    Ok(())
}

async fn run(cli: &Cli) -> Result<(), Error> {
    let ctx = Context::from_cli(cli)?;
    match &cli.command {
        Commands::Search(args) => handle_search(args, &ctx).await,
        Commands::Favorites { command } => handle_favorites_commands(command, &ctx).await,
        Commands::Run { command } => handle_run_commands(command, &ctx).await,
        Commands::Results { command } => handle_results_commands(command, &ctx),
        Commands::Login(args) => handle_login_command(args, &ctx).await,
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenv::dotenv();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(fmt::layer().with_writer(io::stderr))
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
