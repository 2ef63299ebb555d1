use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use devstack::admin::AdminClient;
use devstack::credentials::{self, CredentialStore, FileCredentialStore, Prompt, TerminalPrompt};
use devstack::menu::{Menu, MenuAction, TerminalSelector};
use devstack::models::{Network, ProjectDescriptor, RunTarget};
use devstack::paths::{self, Paths};
use devstack::reset;
use devstack::runtime::container::DockerCompose;
use devstack::runtime::readiness::ReadinessCheck;
use devstack::session::{self, Session, StartOptions, TerminationSignals};

#[derive(Parser)]
#[command(name = "devstack")]
#[command(about = "Local development environment orchestrator")]
struct Cli {
    /// Project directory
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the environment and keep it running until interrupted
    Start {
        /// Expose the application server through a public tunnel
        #[arg(long)]
        tunnel: bool,
    },
    /// Remove all local service data
    Reset {
        /// Do not ask for confirmation
        #[arg(short, long)]
        force: bool,
    },
    /// Edit stored settings and credentials
    Config {
        #[arg(long)]
        network: Option<Network>,
        #[arg(long)]
        backend: Option<bool>,
        #[arg(long)]
        frontend: Option<bool>,
        #[arg(long)]
        sync_protocol: Option<bool>,
        #[arg(long)]
        verbose_logging: Option<bool>,
        #[arg(long)]
        advanced_engine: Option<bool>,
        /// Advanced engine parameter as KEY=JSON; an empty value removes it
        #[arg(long, value_name = "KEY=VALUE")]
        engine: Vec<String>,
        /// Server key for the selected network
        #[arg(long)]
        server_key: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        /// Store credentials globally instead of for this project
        #[arg(long)]
        global: bool,
        /// Print the resulting configuration
        #[arg(long)]
        show: bool,
    },
    /// Trigger a synchronization on the running server
    Sync {
        /// Refresh peer discovery instead of syncing state
        #[arg(long)]
        peers: bool,
    },
}

/// Initialize tracing with output to stderr
fn init_tracing(verbose: bool) {
    let default = if verbose { "devstack=debug" } else { "devstack=info" };
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

struct App {
    paths: Paths,
    project: ProjectDescriptor,
    project_store: FileCredentialStore,
    global_store: FileCredentialStore,
}

impl App {
    /// Open the project. Only commands that edit or start it write a default
    /// descriptor into a directory that has none.
    fn open(project_dir: &Path, init: bool) -> Result<Self> {
        let paths = Paths::new(project_dir)?;
        let project = if init {
            ProjectDescriptor::load_or_init(&paths.descriptor_file())?
        } else {
            ProjectDescriptor::load_or_default(&paths.descriptor_file())?
        };
        let project_store = FileCredentialStore::new(paths.secrets_file());
        let global_store = FileCredentialStore::new(paths::global_credentials_file()?);
        Ok(Self {
            paths,
            project,
            project_store,
            global_store,
        })
    }

    fn save(&mut self) -> Result<()> {
        self.project.save(&self.paths.descriptor_file())
    }

    async fn start(self, tunnel: bool) -> Result<i32> {
        let credentials = if self.project.runs_backend() {
            let mut prompt = TerminalPrompt;
            credentials::prepare_for_start(
                &self.project_store,
                &self.global_store,
                self.project.network,
                &mut prompt,
            )?
        } else {
            credentials::resolve(
                &self.project_store.load()?,
                &self.global_store.load()?,
                self.project.network,
            )
        };

        let mut readiness = ReadinessCheck::default();
        if let Ok(url) = std::env::var("DEVSTACK_HEALTH_URL") {
            readiness.url = url;
        }
        let options = StartOptions {
            tunnel,
            readiness,
            ..Default::default()
        };

        let signals = TerminationSignals::register().context("Failed to install signal handlers")?;
        let session = Session::new(
            self.paths,
            self.project,
            credentials,
            DockerCompose::default(),
            options,
        );
        Ok(session::run(session, signals).await)
    }

    fn reset(&self, force: bool) -> Result<()> {
        let mut prompt = TerminalPrompt;
        let outcome = reset::reset(&self.paths, force, &mut prompt)?;
        println!("{}", outcome.message());
        Ok(())
    }

    async fn sync(&self, peers: bool) -> Result<()> {
        let resolved = credentials::resolve(
            &self.project_store.load()?,
            &self.global_store.load()?,
            self.project.network,
        );
        let Some(token) = resolved.admin_token else {
            bail!("No admin token configured; start the environment once to generate one");
        };

        let client = AdminClient::from_env(token);
        let response = if peers {
            client.refresh_peers().await?
        } else {
            client.trigger_sync().await?
        };
        println!("{}", response.status.as_deref().unwrap_or("Sync triggered"));
        Ok(())
    }

    fn edit_credentials(&self, prompt: &mut dyn Prompt) -> Result<()> {
        let mut stored = self.project_store.load()?;
        let network = self.project.network;
        if let Some(key) = prompt.secret(&format!("Server key for {} (leave empty to keep)", network))? {
            stored.server_keys.insert(network, key);
        }
        if let Some(key) = prompt.secret("External API key (leave empty to keep)")? {
            stored.api_key = Some(key);
        }
        self.project_store.save(&stored)
    }

    async fn menu(mut self) -> Result<i32> {
        let mut menu = Menu::new(TerminalSelector);
        while let Some(action) = menu.next_action()? {
            match action {
                MenuAction::Start => return self.start(false).await,
                MenuAction::Reset => self.reset(false)?,
                MenuAction::TriggerSync => {
                    if let Err(e) = self.sync(false).await {
                        eprintln!("error: {:#}", e);
                    }
                }
                MenuAction::ToggleRun(target) => {
                    let on = self.project.toggle_run(target);
                    self.save()?;
                    println!("{} {}", target.as_str(), if on { "enabled" } else { "disabled" });
                }
                MenuAction::ToggleSyncProtocol => {
                    let on = !self.project.features.sync_protocol;
                    self.project.set_sync_protocol(on);
                    self.save()?;
                }
                MenuAction::ToggleVerboseLogging => {
                    let on = !self.project.features.verbose_logging;
                    self.project.set_verbose_logging(on);
                    self.save()?;
                }
                MenuAction::ToggleAdvancedEngine => {
                    let on = !self.project.features.advanced_engine;
                    self.project.set_advanced_engine(on);
                    self.save()?;
                }
                MenuAction::SetNetwork(network) => {
                    self.project.set_network(network);
                    self.save()?;
                }
                MenuAction::EditCredentials => {
                    let mut prompt = TerminalPrompt;
                    self.edit_credentials(&mut prompt)?;
                }
            }
        }
        Ok(0)
    }
}

fn set_run(project: &mut ProjectDescriptor, target: RunTarget, on: bool) {
    if project.runs(target) != on {
        project.toggle_run(target);
    }
}

fn parse_engine_param(raw: &str) -> Result<(String, Option<serde_json::Value>)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("Expected KEY=VALUE, got '{}'", raw))?;
    if value.is_empty() {
        return Ok((key.to_string(), None));
    }
    // Bare words are taken as strings.
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), Some(value)))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let read_only = matches!(
        cli.command,
        Some(Commands::Reset { .. } | Commands::Sync { .. })
    );
    let mut app = App::open(&cli.project, !read_only)?;

    let exit_code = match cli.command {
        Some(Commands::Start { tunnel }) => app.start(tunnel).await?,
        Some(Commands::Reset { force }) => {
            app.reset(force)?;
            0
        }
        Some(Commands::Config {
            network,
            backend,
            frontend,
            sync_protocol,
            verbose_logging,
            advanced_engine,
            engine,
            server_key,
            api_key,
            global,
            show,
        }) => {
            if let Some(network) = network {
                app.project.set_network(network);
            }
            if let Some(on) = backend {
                set_run(&mut app.project, RunTarget::Backend, on);
            }
            if let Some(on) = frontend {
                set_run(&mut app.project, RunTarget::Frontend, on);
            }
            if let Some(on) = sync_protocol {
                app.project.set_sync_protocol(on);
            }
            if let Some(on) = verbose_logging {
                app.project.set_verbose_logging(on);
            }
            if let Some(on) = advanced_engine {
                app.project.set_advanced_engine(on);
            }
            for raw in &engine {
                let (key, value) = parse_engine_param(raw)?;
                app.project.set_engine_param(&key, value);
            }
            app.save()?;

            if server_key.is_some() || api_key.is_some() {
                let store = if global {
                    &app.global_store
                } else {
                    &app.project_store
                };
                let mut stored = store.load()?;
                if let Some(key) = server_key {
                    stored.server_keys.insert(app.project.network, key);
                }
                if let Some(key) = api_key {
                    stored.api_key = Some(key);
                }
                store.save(&stored)?;
                tracing::info!("Credentials written to {}", store.path().display());
            }

            if show {
                println!("{}", serde_json::to_string_pretty(&app.project)?);
            }
            0
        }
        Some(Commands::Sync { peers }) => {
            app.sync(peers).await?;
            0
        }
        None => app.menu().await?,
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
