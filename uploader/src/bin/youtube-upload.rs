use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use youtube_upload::config::{CHUNK_GRANULARITY, DEFAULT_CHUNK_SIZE};
use youtube_upload::request::{CategoryInput, TagInput, parse_tags, resolve};
use youtube_upload::{
    AuthConfig, CredentialProvider, OAuthManager, PrivacyStatus, RequestLayer, UploadError,
    UploadSettings, Uploader,
};

/// Upload a video to YouTube, then optionally set its thumbnail and add it to a playlist.
///
/// Values in a --metadata file take precedence over the corresponding flags.
#[derive(Debug, Parser)]
#[command(name = "youtube-upload", version, about)]
struct Cli {
    /// Video file to upload
    #[arg(long)]
    file: Option<PathBuf>,

    /// Video title
    #[arg(long)]
    title: Option<String>,

    /// Video description
    #[arg(long)]
    description: Option<String>,

    /// Tags, comma-separated or as a JSON array
    #[arg(long)]
    tags: Option<String>,

    /// YouTube category ID (default: 22, People & Blogs)
    #[arg(long)]
    category_id: Option<String>,

    /// public, unlisted or private (default: unlisted)
    #[arg(long)]
    privacy: Option<PrivacyStatus>,

    /// Image to use as the video thumbnail
    #[arg(long)]
    thumbnail: Option<PathBuf>,

    /// Playlist to add the uploaded video to
    #[arg(long)]
    playlist_id: Option<String>,

    /// When to publish: 'YYYY-MM-DD HH:MM' (local time) or RFC 3339. Forces private until then.
    #[arg(long)]
    publish_at: Option<String>,

    /// Mark the video as made for kids
    #[arg(long)]
    made_for_kids: bool,

    /// JSON file with any of the fields above
    #[arg(long)]
    metadata: Option<PathBuf>,

    /// OAuth client secrets downloaded from the Google Cloud Console
    #[arg(long, env = "YT_CLIENT_SECRETS", default_value = "client_secret.json")]
    client_secrets: PathBuf,

    /// Where the OAuth credential is kept between runs
    #[arg(long, env = "YT_TOKEN_FILE", default_value = "token_youtube_upload.json")]
    token_file: PathBuf,

    /// Bytes sent per upload request; must be a multiple of 256 KiB
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, value_parser = parse_chunk_size)]
    chunk_size: u64,

    /// Paste the authorization code instead of receiving it on a local redirect
    #[arg(long)]
    console_auth: bool,
}

impl Cli {
    fn flag_layer(&self) -> RequestLayer {
        RequestLayer {
            file: self.file.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            tags: self.tags.as_deref().map(|t| TagInput::List(parse_tags(t))),
            category_id: self.category_id.clone().map(CategoryInput::Text),
            privacy: self.privacy,
            thumbnail: self.thumbnail.clone(),
            playlist_id: self.playlist_id.clone(),
            publish_at: self.publish_at.clone(),
            made_for_kids: self.made_for_kids.then_some(true),
        }
    }
}

fn parse_chunk_size(s: &str) -> Result<u64, String> {
    let size: u64 = s.parse().map_err(|e: std::num::ParseIntError| e.to_string())?;
    if size == 0 || size % CHUNK_GRANULARITY != 0 {
        return Err(format!(
            "{size} is not a positive multiple of {CHUNK_GRANULARITY} bytes"
        ));
    }
    Ok(size)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(video_id) => {
            println!("Uploaded video ID: {video_id}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let code = e.exit_code();
            eprintln!("Error: {:?}", eyre::Report::new(e));
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> Result<String, UploadError> {
    let file_layer = match &cli.metadata {
        Some(path) => {
            let json = tokio::fs::read_to_string(path).await.map_err(|e| {
                UploadError::Validation(format!(
                    "cannot read metadata file {}: {e}",
                    path.display()
                ))
            })?;
            RequestLayer::from_json(&json)?
        }
        None => RequestLayer::default(),
    };
    let request = resolve(RequestLayer::defaults(), file_layer, cli.flag_layer())?;

    let config = AuthConfig {
        client_secrets: cli.client_secrets,
        token_file: cli.token_file,
        ..AuthConfig::default()
    };
    let mut oauth = OAuthManager::new(config.loopback_timeout)
        .map_err(|e| UploadError::Auth(e.into()))?;
    if cli.console_auth {
        oauth = oauth.console_only();
    }
    let settings = UploadSettings {
        chunk_size: cli.chunk_size,
        ..UploadSettings::default()
    };
    let uploader = Uploader::new(CredentialProvider::new(config, oauth), settings)?;

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}% ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    bar.enable_steady_tick(Duration::from_millis(250));

    let result = uploader
        .upload_video(&request, |percent| bar.set_position(u64::from(percent)))
        .await;
    match &result {
        Ok(_) => bar.finish(),
        Err(_) => bar.abandon(),
    }
    result
}
