use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use atelier_contracts::chat::{parse_intent, Intent, SESSION_COMMANDS};
use atelier_contracts::events::EventLog;
use atelier_contracts::gallery::{filter_gallery, GalleryFilter, GalleryItem, GalleryManager};
use atelier_contracts::generation::AspectRatio;
use atelier_contracts::presets::StyleCatalog;
use atelier_contracts::store::FileStore;
use atelier_contracts::theme::{Theme, ThemeController};
use atelier_engine::export::export_image;
use atelier_engine::upload::read_image_file;
use atelier_engine::{EngineConfig, EnvSource, GenerationClient, GeneratorSession, SessionState};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "atelier",
    version,
    about = "Generate images from prompts and keep the good ones in a local gallery"
)]
struct Cli {
    /// Directory holding the gallery store, event log and exports.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Image backend to use (gemini or dryrun).
    #[arg(long, global = true)]
    backend: Option<String>,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a single generation.
    Generate(GenerateArgs),
    /// Interactive session.
    Chat(ChatArgs),
    Gallery(GalleryArgs),
    Theme(ThemeArgs),
    /// List the style presets.
    Styles,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    prompt: String,
    #[arg(long)]
    negative: Option<String>,
    /// Style preset label, e.g. "Digital Art".
    #[arg(long)]
    style: Option<String>,
    #[arg(long, default_value = "1:1")]
    aspect_ratio: AspectRatio,
    #[arg(long, default_value_t = 1)]
    count: u32,
    /// Reference image (png, jpeg or webp) to condition on.
    #[arg(long)]
    reference: Option<PathBuf>,
    /// Write every result into this directory.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Save every result to the gallery.
    #[arg(long)]
    save: bool,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    /// Export directory for /export (defaults to <data-dir>/exports).
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct GalleryArgs {
    #[command(subcommand)]
    action: Option<GalleryCommand>,
}

#[derive(Debug, Subcommand)]
enum GalleryCommand {
    List {
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long)]
        favorites: bool,
    },
    Favorite {
        id: String,
    },
    Remove {
        id: String,
    },
    Export {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Debug, Parser)]
struct ThemeArgs {
    #[command(subcommand)]
    action: Option<ThemeCommand>,
}

#[derive(Debug, Subcommand)]
enum ThemeCommand {
    Show,
    Toggle,
    Set { theme: Theme },
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("atelier error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let app = AppContext::resolve(&cli)?;
    match cli.command {
        Command::Generate(args) => run_generate(&app, args),
        Command::Chat(args) => run_chat(&app, args),
        Command::Gallery(args) => run_gallery(&app, args),
        Command::Theme(args) => run_theme(&app, args),
        Command::Styles => {
            print_styles(&StyleCatalog::default());
            Ok(0)
        }
    }
}

fn init_tracing(verbose: bool) {
    let log_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();
}

struct AppContext {
    data_dir: PathBuf,
    env: EnvSource,
    config: EngineConfig,
    styles: StyleCatalog,
}

impl AppContext {
    fn resolve(cli: &Cli) -> Result<Self> {
        let env = EnvSource::load(Some(Path::new(".env")));
        let mut config = EngineConfig::from_env(&env);
        if let Some(backend) = cli.backend.as_deref() {
            config.backend = backend.trim().to_string();
        }
        let data_dir = match cli.data_dir.clone() {
            Some(dir) => dir,
            None => env
                .get("ATELIER_HOME")
                .map(PathBuf::from)
                .or_else(|| dirs::data_dir().map(|dir| dir.join("atelier")))
                .ok_or_else(|| anyhow!("could not determine a data directory; pass --data-dir"))?,
        };
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        tracing::debug!(data_dir = %data_dir.display(), backend = %config.backend, "resolved settings");
        Ok(Self {
            data_dir,
            env,
            config,
            styles: StyleCatalog::default(),
        })
    }

    fn store(&self) -> FileStore {
        FileStore::new(self.data_dir.join("store.json"))
    }

    fn gallery(&self) -> GalleryManager<FileStore> {
        GalleryManager::load(self.store())
    }

    fn theme(&self) -> ThemeController<FileStore> {
        let prefers_dark = self.env.get_bool("ATELIER_PREFERS_DARK").unwrap_or(false);
        ThemeController::load(self.store(), prefers_dark)
    }

    fn events(&self) -> EventLog {
        EventLog::new(
            self.data_dir.join("events.jsonl"),
            uuid::Uuid::new_v4().to_string(),
        )
    }

    fn client(&self) -> Result<GenerationClient> {
        GenerationClient::from_config(&self.config)
    }

    fn default_export_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }
}

fn run_generate(app: &AppContext, args: GenerateArgs) -> Result<i32> {
    let client = app.client()?;
    let mut session = GeneratorSession::new().with_events(app.events());
    session.set_prompt(args.prompt);
    if let Some(negative) = args.negative {
        session.set_negative_prompt(negative);
    }
    if let Some(style) = args.style.as_deref() {
        session.set_style(resolve_style(&app.styles, style)?);
    }
    session.set_aspect_ratio(args.aspect_ratio)?;
    session.set_image_count(args.count)?;
    if let Some(reference) = args.reference.as_deref() {
        session.attach_reference(read_image_file(reference)?)?;
    }

    println!("Generating with {}...", client.backend_name());
    if session.submit(&client)? == SessionState::Failed {
        bail!("{}", session.error().unwrap_or("generation failed"));
    }

    let mut gallery = args.save.then(|| app.gallery());
    for (idx, image) in session.results().iter().enumerate() {
        println!("{}. {}", idx + 1, image.id);
        if let Some(out_dir) = args.out.as_deref() {
            let path = export_result(&session, out_dir, &image.id)?;
            println!("   wrote {}", path.display());
        }
        if let (Some(gallery), Some(entry)) = (gallery.as_mut(), session.gallery_entry(&image.id)) {
            gallery.add(entry)?;
            println!("   saved to gallery");
        }
    }
    Ok(0)
}

fn run_gallery(app: &AppContext, args: GalleryArgs) -> Result<i32> {
    let mut gallery = app.gallery();
    let action = args.action.unwrap_or(GalleryCommand::List {
        search: String::new(),
        favorites: false,
    });
    match action {
        GalleryCommand::List { search, favorites } => {
            let filter = GalleryFilter::new(search, favorites);
            print_gallery(&filter_gallery(gallery.items(), &filter), &app.styles);
        }
        GalleryCommand::Favorite { id } => match gallery.toggle_favorite(&id) {
            Some(true) => println!("Favorited {id}"),
            Some(false) => println!("Unfavorited {id}"),
            None => bail!("no gallery item with id {id}"),
        },
        GalleryCommand::Remove { id } => {
            if gallery.remove(&id).is_none() {
                bail!("no gallery item with id {id}");
            }
            println!("Removed {id}");
        }
        GalleryCommand::Export { ids, out } => {
            for id in ids {
                let item = gallery
                    .get(&id)
                    .ok_or_else(|| anyhow!("no gallery item with id {id}"))?;
                let path = export_image(&out, &item.prompt, &item.id, &item.base64)?;
                println!("Wrote {}", path.display());
            }
        }
    }
    Ok(0)
}

fn run_theme(app: &AppContext, args: ThemeArgs) -> Result<i32> {
    let mut theme = app.theme();
    match args.action.unwrap_or(ThemeCommand::Show) {
        ThemeCommand::Show => println!("{}", theme.theme()),
        ThemeCommand::Toggle => println!("{}", theme.toggle()),
        ThemeCommand::Set { theme: value } => {
            theme.set(value);
            println!("{value}");
        }
    }
    Ok(0)
}

fn run_chat(app: &AppContext, args: ChatArgs) -> Result<i32> {
    let client = app.client()?;
    let mut chat = ChatState {
        session: GeneratorSession::new().with_events(app.events()),
        gallery: app.gallery(),
        theme: app.theme(),
        filter: GalleryFilter::default(),
        out_dir: args.out.unwrap_or_else(|| app.default_export_dir()),
    };

    let stdin = io::stdin();
    let mut line = String::new();

    println!(
        "Atelier session started ({} backend, {} theme). Type /help for commands.",
        client.backend_name(),
        chat.theme.theme()
    );

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        if intent == Intent::Quit {
            break;
        }
        chat.handle(intent, &client, &app.styles);
    }

    Ok(0)
}

struct ChatState {
    session: GeneratorSession,
    gallery: GalleryManager<FileStore>,
    theme: ThemeController<FileStore>,
    filter: GalleryFilter,
    out_dir: PathBuf,
}

impl ChatState {
    fn handle(&mut self, intent: Intent, client: &GenerationClient, styles: &StyleCatalog) {
        let session = &mut self.session;
        match intent {
            Intent::Noop | Intent::Quit => {}
            Intent::Help => {
                for command in SESSION_COMMANDS {
                    println!("  {:<20} {}", command.usage, command.summary);
                }
            }
            Intent::SetPrompt(prompt) => {
                session.set_prompt(prompt);
                println!("Prompt set");
            }
            Intent::SetNegativePrompt(negative) => {
                if negative.trim().is_empty() {
                    println!("Negative prompt cleared");
                } else {
                    println!("Negative prompt set");
                }
                session.set_negative_prompt(negative);
            }
            Intent::SetStyle(input) => match resolve_style(styles, &input) {
                Ok(value) => {
                    println!(
                        "Style set to {}",
                        styles.label_for_value(&value).unwrap_or("Custom")
                    );
                    session.set_style(value);
                }
                Err(err) => println!("{err}"),
            },
            Intent::SetAspectRatio(raw) => match raw.parse::<AspectRatio>() {
                Ok(ratio) => match session.set_aspect_ratio(ratio) {
                    Ok(()) => println!("Aspect ratio set to {ratio}"),
                    Err(err) => println!("{err}"),
                },
                Err(err) => println!("{err}"),
            },
            Intent::SetImageCount(raw) => match raw.trim().parse::<u32>() {
                Ok(count) => match session.set_image_count(count) {
                    Ok(()) => println!("Image count set to {count}"),
                    Err(err) => println!("{err}"),
                },
                Err(_) => println!("/count requires a number from 1 to 4"),
            },
            Intent::AttachReference(path) if path.is_empty() => {
                println!("/attach requires a path")
            }
            Intent::AttachReference(path) => {
                let attached = read_image_file(Path::new(&path)).and_then(|image| {
                    let mime_type = image.mime_type.clone();
                    session.attach_reference(image)?;
                    Ok(mime_type)
                });
                match attached {
                    Ok(mime_type) => {
                        println!("Attached {path} ({mime_type}); image editing generates one image")
                    }
                    Err(err) => println!("{err:#}"),
                }
            }
            Intent::DetachReference => match session.detach_reference() {
                Ok(Some(_)) => println!(
                    "Reference removed; image count back to {}",
                    session.selected_image_count()
                ),
                Ok(None) => println!("No reference image attached"),
                Err(err) => println!("{err}"),
            },
            Intent::Generate { prompt } => {
                if let Some(prompt) = prompt {
                    session.set_prompt(prompt);
                }
                println!("Generating your masterpiece...");
                match session.submit(client) {
                    Ok(_) => print_session_outcome(session),
                    Err(err) => println!("{err}"),
                }
            }
            Intent::ShowStatus => print_status(session, styles, &self.out_dir),
            Intent::SaveResults(args) => {
                for image_id in resolve_result_ids(session, &args) {
                    let saved = image_id.map_err(|err| anyhow!(err)).and_then(|image_id| {
                        let entry = session
                            .gallery_entry(&image_id)
                            .ok_or_else(|| anyhow!("No current result {image_id}"))?;
                        Ok(self.gallery.add(entry)?.id.clone())
                    });
                    match saved {
                        Ok(id) => println!("Saved {id}"),
                        Err(err) => println!("{err}"),
                    }
                }
            }
            Intent::ExportImages(args) => {
                for image_id in resolve_result_ids(session, &args) {
                    let written = image_id
                        .map_err(|err| anyhow!(err))
                        .and_then(|image_id| export_result(session, &self.out_dir, &image_id));
                    match written {
                        Ok(path) => println!("Wrote {}", path.display()),
                        Err(err) => println!("{err:#}"),
                    }
                }
            }
            Intent::SetOutputDir(path) if path.is_empty() => println!("/outdir requires a path"),
            Intent::SetOutputDir(path) => {
                self.out_dir = PathBuf::from(path);
                println!("Exports go to {}", self.out_dir.display());
            }
            Intent::ListGallery => self.print_gallery(styles),
            Intent::SearchGallery(search) => {
                self.filter.search = search.trim().to_string();
                self.print_gallery(styles);
            }
            Intent::ToggleFavoritesOnly => {
                self.filter.favorites_only = !self.filter.favorites_only;
                println!(
                    "Favorites only: {}",
                    if self.filter.favorites_only { "on" } else { "off" }
                );
                self.print_gallery(styles);
            }
            Intent::ToggleFavorite(ids) => {
                for id in ids {
                    match self.gallery.toggle_favorite(&id) {
                        Some(true) => println!("Favorited {id}"),
                        Some(false) => println!("Unfavorited {id}"),
                        None => println!("No gallery item with id {id}"),
                    }
                }
            }
            Intent::RemoveFromGallery(ids) => {
                for id in ids {
                    match self.gallery.remove(&id) {
                        Some(_) => println!("Removed {id}"),
                        None => println!("No gallery item with id {id}"),
                    }
                }
            }
            Intent::ListStyles => print_styles(styles),
            Intent::ToggleTheme => println!("Theme: {}", self.theme.toggle()),
            Intent::Unknown { command, .. } => {
                println!("Unknown command /{command}. Type /help for commands.")
            }
        }
    }

    fn print_gallery(&self, styles: &StyleCatalog) {
        print_gallery(&filter_gallery(self.gallery.items(), &self.filter), styles);
    }
}

/// Writes one current result, named after the prompt it was generated from.
fn export_result(session: &GeneratorSession, out_dir: &Path, image_id: &str) -> Result<PathBuf> {
    let image = session
        .results()
        .iter()
        .find(|image| image.id == image_id)
        .ok_or_else(|| anyhow!("No current result {image_id}"))?;
    let prompt = session
        .result_options()
        .map(|options| options.prompt.as_str())
        .unwrap_or_else(|| session.prompt());
    export_image(out_dir, prompt, &image.id, &image.base64)
}

fn resolve_style(styles: &StyleCatalog, input: &str) -> Result<String> {
    if input.trim().is_empty() {
        return Ok(String::new());
    }
    styles
        .resolve(input)
        .map(|preset| preset.value.clone())
        .ok_or_else(|| {
            let labels: Vec<&str> = styles.list().map(|preset| preset.label.as_str()).collect();
            anyhow!("unknown style '{}' (available: {})", input.trim(), labels.join(", "))
        })
}

/// Maps `/save`-style arguments to result ids. Arguments are 1-based
/// result numbers or ids; no arguments means every result.
fn resolve_result_ids(session: &GeneratorSession, args: &[String]) -> Vec<Result<String, String>> {
    let results = session.results();
    if args.is_empty() {
        if results.is_empty() {
            return vec![Err("No results to use".to_string())];
        }
        return results.iter().map(|image| Ok(image.id.clone())).collect();
    }
    args.iter()
        .map(|arg| {
            if let Some(image) = results.iter().find(|image| &image.id == arg) {
                return Ok(image.id.clone());
            }
            arg.parse::<usize>()
                .ok()
                .and_then(|number| number.checked_sub(1))
                .and_then(|idx| results.get(idx))
                .map(|image| image.id.clone())
                .ok_or_else(|| format!("No current result {arg}"))
        })
        .collect()
}

fn print_session_outcome(session: &GeneratorSession) {
    match session.state() {
        SessionState::Success => {
            for (idx, image) in session.results().iter().enumerate() {
                println!("{}. {}", idx + 1, image.id);
            }
            println!("Use /save or /export with result numbers (none for all).");
        }
        SessionState::Failed => {
            println!("Error: {}", session.error().unwrap_or("generation failed"))
        }
        SessionState::Idle | SessionState::Loading => {}
    }
}

fn print_status(session: &GeneratorSession, styles: &StyleCatalog, out_dir: &Path) {
    let show = |value: &str| {
        if value.trim().is_empty() {
            "(none)".to_string()
        } else {
            value.to_string()
        }
    };
    println!("Prompt:       {}", show(session.prompt()));
    println!("Negative:     {}", show(session.negative_prompt()));
    println!(
        "Style:        {}",
        styles.label_for_value(session.style()).unwrap_or("Custom")
    );
    match session.reference_image() {
        Some(image) => {
            println!("Reference:    attached ({})", image.mime_type);
            println!("Aspect ratio: not applicable for image editing");
            println!("Images:       1");
        }
        None => {
            println!("Reference:    (none)");
            println!("Aspect ratio: {}", session.aspect_ratio());
            println!("Images:       {}", session.effective_image_count());
        }
    }
    println!("State:        {}", session.state().as_str());
    if let Some(error) = session.error() {
        println!("Error:        {error}");
    }
    println!("Results:      {}", session.results().len());
    println!("Exports:      {}", out_dir.display());
}

fn print_gallery(items: &[&GalleryItem], styles: &StyleCatalog) {
    if items.is_empty() {
        println!("No images found.");
        return;
    }
    for item in items {
        let marker = if item.is_favorite { "*" } else { " " };
        let style = styles.label_for_value(&item.style).unwrap_or("Custom");
        println!(
            "{marker} {}  {}  {:<5} {:<14} {}",
            item.id,
            item.created_at.format("%Y-%m-%d %H:%M"),
            item.aspect_ratio,
            style,
            item.prompt
        );
    }
}

fn print_styles(styles: &StyleCatalog) {
    for preset in styles.list() {
        if preset.value.is_empty() {
            println!("{}", preset.label);
        } else {
            println!("{:<15} {}", preset.label, preset.value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{export_result, resolve_result_ids, resolve_style};
    use atelier_contracts::presets::StyleCatalog;
    use atelier_engine::{EngineConfig, GenerationClient, GeneratorSession};

    #[test]
    fn resolve_style_accepts_labels_and_blank() {
        let styles = StyleCatalog::default();
        assert_eq!(resolve_style(&styles, "").unwrap(), "");
        assert_eq!(
            resolve_style(&styles, "pixel-art").unwrap(),
            "pixel art, 16-bit, retro gaming style"
        );
        let err = resolve_style(&styles, "watercolor").unwrap_err();
        assert!(err.to_string().starts_with("unknown style 'watercolor'"));
    }

    #[test]
    fn result_ids_need_results() {
        let session = GeneratorSession::new();
        assert_eq!(
            resolve_result_ids(&session, &[]),
            vec![Err("No results to use".to_string())]
        );
        assert_eq!(
            resolve_result_ids(&session, &["2".to_string()]),
            vec![Err("No current result 2".to_string())]
        );
    }

    #[test]
    fn export_names_files_after_the_generating_prompt() -> anyhow::Result<()> {
        let client = GenerationClient::from_config(&EngineConfig {
            backend: "dryrun".to_string(),
            ..EngineConfig::default()
        })?;
        let mut session = GeneratorSession::new();
        session.set_prompt("red fox");
        session.submit(&client)?;
        session.set_prompt("something else entirely");

        let temp = tempfile::tempdir()?;
        let image_id = session.results()[0].id.clone();
        let path = export_result(&session, temp.path(), &image_id)?;
        assert_eq!(path, temp.path().join(format!("red_fox_{image_id}.jpg")));

        let missing = export_result(&session, temp.path(), "nope").unwrap_err();
        assert_eq!(missing.to_string(), "No current result nope");
        Ok(())
    }
}
