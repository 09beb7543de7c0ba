//! Command-line entry points.

use crate::auth::{Principal, TokenAuthenticator};
use crate::cache::{self, Cache};
use crate::config::Config;
use crate::generate::{Framework, GenerationPipeline, Orchestrator, StyleFramework};
use crate::provider::Client;
use crate::server::{ApiServer, AppState};
use crate::session::{SessionService, SessionStore};
use crate::studio::{ContextInput, GenerateRequest, Studio};
use crate::sync::{EditorSync, SessionEditSink};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const WATCH_POLL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(about = "AI-assisted UI component authoring server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the REST server
    Serve {
        /// Listen address (overrides `bind_addr` from the config file)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Generate one component and print it as JSON
    Generate(GenerateArgs),
    /// Print a session export as JSON
    Export {
        #[arg(long)]
        session: String,
        #[arg(long)]
        user: String,
    },
    /// List a user's active sessions
    Sessions {
        #[arg(long)]
        user: String,
    },
    /// Mirror local files into a session as manual edits
    Watch(WatchArgs),
}

#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// What to build
    #[arg(required = true)]
    pub prompt: String,

    #[arg(long, value_enum)]
    pub framework: Option<FrameworkArg>,

    /// Styling approach
    #[arg(long, value_enum)]
    pub style: Option<StyleArg>,

    #[arg(long)]
    pub typescript: bool,

    /// Cache scope for the generation
    #[arg(long, default_value = "local")]
    pub user: String,
}

#[derive(Parser, Debug)]
pub struct WatchArgs {
    #[arg(long)]
    pub session: String,

    #[arg(long)]
    pub user: String,

    /// File holding the component markup
    #[arg(long)]
    pub jsx: PathBuf,

    /// File holding the stylesheet
    #[arg(long)]
    pub css: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum FrameworkArg {
    React,
    Vue,
    Angular,
}

impl From<FrameworkArg> for Framework {
    fn from(arg: FrameworkArg) -> Self {
        match arg {
            FrameworkArg::React => Self::React,
            FrameworkArg::Vue => Self::Vue,
            FrameworkArg::Angular => Self::Angular,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum StyleArg {
    Css,
    Tailwind,
    StyledComponents,
    Emotion,
}

impl From<StyleArg> for StyleFramework {
    fn from(arg: StyleArg) -> Self {
        match arg {
            StyleArg::Css => Self::Css,
            StyleArg::Tailwind => Self::Tailwind,
            StyleArg::StyledComponents => Self::StyledComponents,
            StyleArg::Emotion => Self::Emotion,
        }
    }
}

/// Everything a command needs, wired from the config.
struct App {
    studio: Studio,
    store: Arc<SessionStore>,
    cache: Option<Arc<dyn Cache>>,
    config: Config,
}

impl App {
    fn build(config: Config) -> Result<Self> {
        let client = Client::from_settings(&config.backend_settings())
            .context("Failed to build provider client")?;
        let models = config.fallback_models()?;
        let orchestrator = Orchestrator::new(Arc::new(client), models);

        let cache = cache::connect(&config.cache, &config.cache_db_path());
        let pipeline = GenerationPipeline::new(orchestrator, cache.clone(), config.cache.ttl());

        let sessions_path = config.sessions_db_path();
        let store = Arc::new(SessionStore::open(&sessions_path).with_context(|| {
            format!("Failed to open session store at {}", sessions_path.display())
        })?);
        let studio = Studio::new(Arc::new(pipeline), SessionService::new(store.clone()));

        Ok(Self {
            studio,
            store,
            cache,
            config,
        })
    }

    async fn close(&self) {
        if let Some(cache) = &self.cache {
            cache.close().await;
        }
    }
}

pub async fn run(command: Commands) -> ExitCode {
    match execute(command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Commands) -> Result<()> {
    let config = Config::load()?;
    let app = App::build(config)?;

    let result = match command {
        Commands::Serve { bind } => serve(&app, bind).await,
        Commands::Generate(args) => generate(&app, args).await,
        Commands::Export { session, user } => export(&app, &session, &user),
        Commands::Sessions { user } => list_sessions(&app, &user),
        Commands::Watch(args) => watch(&app, args).await,
    };

    app.close().await;
    result
}

async fn serve(app: &App, bind: Option<String>) -> Result<()> {
    let addr = bind.unwrap_or_else(|| app.config.bind_addr.clone());
    let server = ApiServer::bind(&addr)?;
    if app.config.auth.tokens.is_empty() && !app.config.auth.trust_user_header {
        warn!("No API tokens configured and user header not trusted; every request will be rejected");
    }

    let state = Arc::new(AppState {
        studio: app.studio.clone(),
        auth: Arc::new(TokenAuthenticator::from_settings(&app.config.auth)),
    });

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
            on_signal.cancel();
        }
    });

    server.run(state, shutdown).await?;
    Ok(())
}

async fn generate(app: &App, args: GenerateArgs) -> Result<()> {
    let principal = Principal::new(args.user);
    let request = GenerateRequest {
        prompt: args.prompt,
        session_id: None,
        context: ContextInput {
            framework: args.framework.map(Into::into),
            style_framework: args.style.map(Into::into),
            typescript: Some(args.typescript),
            ..ContextInput::default()
        },
    };

    let outcome = app
        .studio
        .generate(&principal, request, &CancellationToken::new())
        .await?;
    if outcome.generated.source.is_mock() {
        eprintln!("All models failed; printing a placeholder component.");
    }
    println!("{}", serde_json::to_string_pretty(&outcome.generated.payload)?);
    Ok(())
}

fn export(app: &App, session_id: &str, user: &str) -> Result<()> {
    let export = app
        .studio
        .sessions()
        .export(&Principal::new(user), session_id)
        .with_context(|| format!("Cannot export session {session_id}"))?;
    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}

fn list_sessions(app: &App, user: &str) -> Result<()> {
    let titles = app.store.titles(user)?;
    if titles.is_empty() {
        println!("No sessions.");
    }
    for (id, title) in titles {
        println!("{id}  {title}");
    }
    Ok(())
}

async fn watch(app: &App, args: WatchArgs) -> Result<()> {
    let service = app.studio.sessions().clone();
    let principal = Principal::new(args.user);
    let session = service
        .get(&principal, &args.session)
        .with_context(|| format!("Cannot open session {}", args.session))?;

    let current = session.current_component.clone();
    let mut jsx = seed(&args.jsx, &current.jsx)?;
    let mut css = match &args.css {
        Some(path) => Some(seed(path, &current.css)?),
        None => None,
    };

    let sink = Arc::new(SessionEditSink::new(service, principal, session.id.clone()));
    let sync = EditorSync::new(current, app.config.sync.quiet_period(), sink);
    sync.set_jsx(jsx.clone());
    if let Some(css) = &css {
        sync.set_css(css.clone());
    }
    info!(session = %session.id, path = %args.jsx.display(), "Watching");

    let mut ticker = tokio::time::interval(WATCH_POLL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {}
        }

        if let Some(text) = changed(&args.jsx, &jsx) {
            sync.set_jsx(text.clone());
            jsx = text;
        }
        if let (Some(path), Some(last)) = (&args.css, css.as_mut())
            && let Some(text) = changed(path, last)
        {
            sync.set_css(text.clone());
            *last = text;
        }
    }

    if sync.is_pending() {
        warn!("Stopped with unsynced changes");
    }
    sync.close();
    Ok(())
}

/// Current file contents, writing `initial` first if the file is missing.
fn seed(path: &Path, initial: &str) -> Result<String> {
    if !path.exists() {
        std::fs::write(path, initial)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        return Ok(initial.to_string());
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn changed(path: &Path, last: &str) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) if text != last => Some(text),
        Ok(_) => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read watched file");
            None
        }
    }
}
