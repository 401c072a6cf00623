use aikadin::config::{self, AppConfig, ENV_API_KEY, ENV_BASE_URL};
use aikadin::gallery::Gallery;
use aikadin::gateway::Gateway;
use aikadin::logger;
use aikadin::models::{GarmentCategory, NewClothingItem, Sender, TryOnRequest, UserProfile};
use aikadin::paths;
use aikadin::session::ConversationSession;
use aikadin::store::ProfileStore;
use aikadin::tryon::{StyleAnalysisBackend, TryOnPipeline, TryOnProgress};
use aikadin::wardrobe::Wardrobe;

use clap::{Args, Parser, Subcommand};
use log::{error, info};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "aikadin", version, about = "Fashion assistant: AI chat, virtual try-on and wardrobe")]
struct Cli {
    /// Log level (error, warn, info, debug, trace). Overrides the config file.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Database file (defaults to the app data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file (defaults to the app data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = ENV_API_KEY, hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, global = true, env = ENV_BASE_URL)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chat with the assistant. Without a message, starts an interactive session.
    Chat {
        message: Option<String>,
        /// Forget the stored conversation first
        #[arg(long)]
        clear: bool,
    },
    /// Try a garment on a person photo
    TryOn {
        person: PathBuf,
        garment: PathBuf,
        #[arg(long, default_value = "upper_body")]
        category: GarmentCategory,
        /// Also copy the result into the picture gallery
        #[arg(long)]
        save: bool,
    },
    /// Try several garments on the same person photo
    Batch {
        person: PathBuf,
        #[arg(required = true)]
        garments: Vec<PathBuf>,
    },
    /// Copy an image into the picture gallery
    SaveToGallery { image: PathBuf },
    #[command(subcommand)]
    Profile(ProfileCommand),
    #[command(subcommand)]
    Wardrobe(WardrobeCommand),
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Delete try-on output files
    Cleanup,
    /// Report gateway and try-on status
    Health,
    /// Delete all local application data
    Reset {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommand {
    Show,
    /// Replace the stored profile
    Set(ProfileArgs),
    /// Store the profile and mark onboarding as completed
    Onboard(ProfileArgs),
    /// Log out: remove the local profile
    Clear,
}

#[derive(Args)]
struct ProfileArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    height: Option<f32>,
    #[arg(long)]
    weight: Option<f32>,
    #[arg(long)]
    style: Option<String>,
    #[arg(long)]
    body_type: Option<String>,
    /// Comma separated
    #[arg(long, value_delimiter = ',')]
    colors: Vec<String>,
    #[arg(long)]
    language: Option<String>,
}

#[derive(Subcommand)]
enum WardrobeCommand {
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long)]
        season: Option<String>,
    },
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        color: String,
        #[arg(long)]
        image: String,
        #[arg(long)]
        brand: Option<String>,
        #[arg(long, value_delimiter = ',')]
        season: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    Delete { id: String },
    Summary,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Write the default configuration file
    Init,
}

/// Services constructed once at startup
struct App {
    config: AppConfig,
    config_path: PathBuf,
    store: ProfileStore,
    gateway: Arc<Gateway>,
}

impl App {
    fn pipeline(&self) -> Result<TryOnPipeline, String> {
        let backend = Arc::new(StyleAnalysisBackend::new(self.gateway.clone()));
        Ok(TryOnPipeline::new(
            backend,
            self.config.tryon.clone(),
            paths::get_tryon_output_dir()?,
        ))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let config_path = match cli.config {
        Some(path) => path,
        None => paths::get_config_path()?,
    };
    let config = config::load_config_from(&config_path)?
        .with_env_overrides(cli.api_key, cli.base_url);

    let level = logger::parse_level(cli.log_level.as_deref().unwrap_or(&config.log_level));
    logger::initialize(level, Some(&paths::get_log_path()?))?;

    if let Command::Reset { yes } = cli.command {
        if !yes {
            return Err("Refusing to delete app data without --yes".to_string());
        }
        paths::clear_app_data()?;
        println!("All local data removed");
        return Ok(());
    }

    let db_path = match cli.db {
        Some(path) => path,
        None => paths::get_db_path()?,
    };
    let app = App {
        gateway: Arc::new(Gateway::new(config.gateway.clone())),
        store: ProfileStore::open(db_path)?,
        config,
        config_path,
    };
    info!("[run] gateway configured: {}", app.gateway.is_configured());

    match cli.command {
        Command::Chat { message, clear } => chat(&app, message, clear).await,
        Command::TryOn {
            person,
            garment,
            category,
            save,
        } => try_on(&app, TryOnRequest::new(person, garment, category), save).await,
        Command::Batch { person, garments } => batch(&app, person, garments).await,
        Command::SaveToGallery { image } => {
            let saved = Gallery::default_location()?
                .save(&image)
                .await
                .map_err(|e| e.to_string())?;
            println!("Saved to {}", saved.display());
            Ok(())
        }
        Command::Profile(cmd) => profile(&app, cmd),
        Command::Wardrobe(cmd) => wardrobe(&app, cmd),
        Command::Config(ConfigCommand::Show) => {
            let mut shown = app.config.clone();
            if shown.gateway.api_key().is_some() {
                shown.gateway.api_key = Some("********".to_string());
            }
            print_json(&shown)
        }
        Command::Config(ConfigCommand::Init) => {
            config::save_config_to(&app.config_path, &AppConfig::default())?;
            println!("Wrote {}", app.config_path.display());
            Ok(())
        }
        Command::Cleanup => {
            let removed = app.pipeline()?.cleanup().await?;
            println!("Removed {} files", removed);
            Ok(())
        }
        Command::Health => {
            let report = serde_json::json!({
                "gateway": app.gateway.health_check(),
                "tryOn": app.pipeline()?.health_check(),
                "database": app.store.path(),
            });
            print_json(&report)
        }
        Command::Reset { .. } => Ok(()),
    }
}

// ============ Chat ============

async fn chat(app: &App, message: Option<String>, clear: bool) -> Result<(), String> {
    let mut session = ConversationSession::open(app.store.clone(), app.gateway.clone())?;
    if clear {
        session.clear()?;
    }

    if let Some(text) = message {
        return send(&mut session, &text).await;
    }

    for msg in session.history() {
        print_message(msg.sender, &msg.text);
    }

    chat_loop(&mut session, BufReader::new(tokio::io::stdin())).await?;
    Ok(())
}

/// Sends every non-blank line from `input` until EOF or `exit`/`quit`.
/// Returns how many turns were answered.
async fn chat_loop<R>(session: &mut ConversationSession, input: R) -> Result<usize, String>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut answered = 0;
    loop {
        print!("> ");
        std::io::stdout()
            .flush()
            .map_err(|e| format!("Failed to write prompt: {}", e))?;

        let line = match lines
            .next_line()
            .await
            .map_err(|e| format!("Failed to read input: {}", e))?
        {
            Some(line) => line,
            None => break,
        };
        if matches!(line.trim(), "exit" | "quit") {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        // A failed turn is reported and the loop continues
        match send(session, &line).await {
            Ok(()) => answered += 1,
            Err(e) => eprintln!("{}", e),
        }
    }
    Ok(answered)
}

async fn send(session: &mut ConversationSession, text: &str) -> Result<(), String> {
    if !session.append_user_turn(text) {
        return Ok(());
    }
    let reply = session
        .request_assistant_reply()
        .await
        .map_err(|e| e.to_string())?;
    print_message(reply.sender, &reply.text);
    Ok(())
}

fn print_message(sender: Sender, text: &str) {
    match sender {
        Sender::User => println!("you: {}", text),
        Sender::Assistant => println!("aikadin: {}", text),
    }
}

// ============ Try-On ============

/// Cancels `token` on Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

async fn try_on(app: &App, request: TryOnRequest, save: bool) -> Result<(), String> {
    let pipeline = app.pipeline()?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let (tx, mut rx) = mpsc::unbounded_channel::<TryOnProgress>();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            eprintln!("[{:>3}%] {}", event.percent, event.phase);
        }
    });

    let outcome = pipeline.run(&request, Some(&tx), &cancel).await;
    drop(tx);
    let _ = printer.await;

    let result = outcome.map_err(|e| e.to_string())?;
    print_json(&result)?;

    if let Some(image) = result.result_image.as_ref().filter(|_| save) {
        let saved = Gallery::default_location()?
            .save(image)
            .await
            .map_err(|e| e.to_string())?;
        println!("Saved to {}", saved.display());
    }
    Ok(())
}

async fn batch(app: &App, person: PathBuf, garments: Vec<PathBuf>) -> Result<(), String> {
    let pipeline = app.pipeline()?;
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let results = pipeline
        .process_batch(&person, &garments, &cancel)
        .await
        .map_err(|e| e.to_string())?;
    print_json(&results)
}

// ============ Profile & Wardrobe ============

impl ProfileArgs {
    fn into_profile(self, existing: Option<UserProfile>) -> UserProfile {
        let mut profile = existing.unwrap_or_default();
        profile.name = self.name;
        profile.height = self.height.or(profile.height);
        profile.weight = self.weight.or(profile.weight);
        profile.style = self.style.or(profile.style);
        profile.body_type = self.body_type.or(profile.body_type);
        if !self.colors.is_empty() {
            profile.favorite_colors = self
                .colors
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
        }
        if let Some(language) = self.language {
            profile.preferences.language = language;
        }
        profile
    }
}

fn profile(app: &App, cmd: ProfileCommand) -> Result<(), String> {
    match cmd {
        ProfileCommand::Show => {
            let report = serde_json::json!({
                "profile": app.store.load_profile()?,
                "onboardingCompleted": app.store.is_onboarding_completed()?,
            });
            print_json(&report)
        }
        ProfileCommand::Set(args) => {
            let profile = args.into_profile(app.store.load_profile()?);
            app.store.save_profile(&profile)?;
            print_json(&profile)
        }
        ProfileCommand::Onboard(args) => {
            let profile = args.into_profile(None);
            app.store.complete_onboarding(&profile)?;
            print_json(&profile)
        }
        ProfileCommand::Clear => {
            app.store.clear_profile()?;
            println!("Profile removed");
            Ok(())
        }
    }
}

fn wardrobe(app: &App, cmd: WardrobeCommand) -> Result<(), String> {
    let wardrobe = Wardrobe::new(app.store.clone());
    match cmd {
        WardrobeCommand::List {
            category,
            search,
            season,
        } => {
            let mut items = wardrobe.filter(category.as_deref(), &search)?;
            if let Some(season) = season {
                let ids: Vec<String> = wardrobe.by_season(&season)?.into_iter().map(|i| i.id).collect();
                items.retain(|i| ids.contains(&i.id));
            }
            print_json(&items)
        }
        WardrobeCommand::Add {
            name,
            category,
            color,
            image,
            brand,
            season,
            tags,
        } => {
            let item = wardrobe.add_item(NewClothingItem {
                name,
                category,
                color,
                brand,
                image_uri: image,
                season,
                tags,
            })?;
            print_json(&item)
        }
        WardrobeCommand::Delete { id } => {
            if wardrobe.delete_item(&id)? {
                println!("Deleted {}", id);
                Ok(())
            } else {
                Err(format!("No wardrobe item with id {}", id))
            }
        }
        WardrobeCommand::Summary => print_json(&wardrobe.summary()?),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize output: {}", e))?;
    println!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aikadin::gateway::{ChatReply, ChatTurn, GatewayError};
    use aikadin::session::ChatProvider;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl ChatProvider for Echo {
        async fn complete_chat(&self, messages: &[ChatTurn]) -> Result<ChatReply, GatewayError> {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(ChatReply {
                text: format!("echo: {}", last),
                model: "echo".to_string(),
                simulated: false,
            })
        }
    }

    #[tokio::test]
    async fn test_chat_loop_reads_until_exit() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("chat.db")).unwrap();
        let mut session = ConversationSession::open(store.clone(), Arc::new(Echo)).unwrap();

        let input: &[u8] = b"first\n   \nsecond\nexit\nnever sent\n";
        let answered = chat_loop(&mut session, input).await.unwrap();

        assert_eq!(answered, 2);
        let stored = store.load_chat_history().unwrap();
        let texts: Vec<&str> = stored.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(&texts[texts.len() - 4..], ["first", "echo: first", "second", "echo: second"]);
    }

    #[tokio::test]
    async fn test_chat_loop_stops_at_eof() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("chat.db")).unwrap();
        let mut session = ConversationSession::open(store, Arc::new(Echo)).unwrap();

        let input: &[u8] = b"only line";
        assert_eq!(chat_loop(&mut session, input).await.unwrap(), 1);
    }
}
