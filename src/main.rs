// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::debug;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedSender};
use url::Url;

use podcatcher::{
    Config, DownloadEvent, DownloadListener, Episode, EpisodeManager, HttpDownloadService,
    Podcast, ReqwestClient, SaveOutcome, SharedDownloadListener, load_feed,
};

// Emoji with fallback for terminals without Unicode support
static MICROPHONE: Emoji<'_, '_> = Emoji("🎙️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static TRASH: Emoji<'_, '_> = Emoji("🗑️  ", "[-] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");

/// Download podcast episodes and keep track of them
#[derive(Parser, Debug)]
#[command(name = "podcatcher")]
#[command(about = "Download podcast episodes and keep track of them")]
#[command(version)]
struct Args {
    /// Increase log verbosity (-v warn, -vv info, -vvv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file to use instead of the default one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the newest episodes of a feed
    Fetch {
        /// RSS feed URL or path to local RSS file
        feed: String,

        /// Number of newest episodes to download
        #[arg(short, long, default_value = "3")]
        limit: usize,

        /// Quiet mode - suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },

    /// List downloaded episodes, newest first
    List {
        /// Only episodes of this podcast (feed URL or podcast name)
        #[arg(short, long)]
        podcast: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Delete the download of an episode
    Delete {
        /// Media URL of the episode
        episode: String,
    },

    /// Show where things are stored and how much is downloaded
    Status,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Download listener drawing one indicatif bar per running episode
struct IndicatifListener {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    finished: UnboundedSender<DownloadEvent>,
}

impl IndicatifListener {
    fn new(finished: UnboundedSender<DownloadEvent>) -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            finished,
        }
    }

    fn bar_for(&self, episode: &Episode) -> ProgressBar {
        let mut bars = lock(&self.bars);
        if let Some(bar) = bars.get(episode.id()) {
            return bar.clone();
        }

        let style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{pos:>3}}% {{wide_msg}}"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");

        let bar = self.multi.add(ProgressBar::new(100));
        bar.set_style(style);
        bar.set_message(truncate_title(&episode.name, 40));
        bars.insert(episode.id().to_string(), bar.clone());
        bar
    }

    fn take_bar(&self, episode: &Episode) -> ProgressBar {
        let bar = self.bar_for(episode);
        lock(&self.bars).remove(episode.id());
        bar
    }
}

impl DownloadListener for IndicatifListener {
    fn on_download_event(&self, event: &DownloadEvent) {
        match event {
            DownloadEvent::Progress { episode, percent } => {
                self.bar_for(episode).set_position(u64::from(*percent));
            }
            DownloadEvent::Succeeded { episode } => {
                let bar = self.take_bar(episode);
                bar.set_position(100);
                bar.finish_with_message(format!(
                    "{SUCCESS}{}",
                    truncate_title(&episode.name, 40).green()
                ));
            }
            DownloadEvent::Failed { episode, error } => {
                self.take_bar(episode).abandon_with_message(format!(
                    "{FAILURE}{} - {}",
                    truncate_title(&episode.name, 30).red(),
                    error.to_string().red()
                ));
            }
            DownloadEvent::Deleted { episode } => {
                self.take_bar(episode).finish_and_clear();
            }
        }

        if !matches!(event, DownloadEvent::Progress { .. }) {
            let _ = self.finished.send(event.clone());
        }
    }
}

/// Listener used with `--quiet`: only forwards terminal events
struct SilentListener {
    finished: UnboundedSender<DownloadEvent>,
}

impl DownloadListener for SilentListener {
    fn on_download_event(&self, event: &DownloadEvent) {
        if !matches!(event, DownloadEvent::Progress { .. }) {
            let _ = self.finished.send(event.clone());
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let cut: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

/// One row of `list --json`
#[derive(Serialize)]
struct ListedEpisode {
    #[serde(flatten)]
    episode: Episode,
    path: Option<PathBuf>,
}

fn podcast_filter(arg: &str) -> Podcast {
    match Url::parse(arg) {
        Ok(url) => Podcast {
            name: String::new(),
            url: Some(url),
        },
        Err(_) => Podcast {
            name: arg.to_string(),
            url: None,
        },
    }
}

async fn open_manager(config: Config, client: ReqwestClient) -> EpisodeManager {
    let service = Arc::new(HttpDownloadService::new(client));
    let manager = EpisodeManager::open(config, service).await;

    for episode in manager.forget_in_flight() {
        debug!("Download of {} was interrupted", episode.id());
    }
    manager
}

/// Download the newest `limit` episodes of a feed and wait for them
///
/// Returns false if every download failed.
async fn fetch(
    manager: &EpisodeManager,
    client: &ReqwestClient,
    feed: &str,
    limit: usize,
    quiet: bool,
) -> Result<bool> {
    if !quiet {
        println!("{SEARCH}Fetching feed: {}", feed.cyan());
    }
    let feed = load_feed(client, feed)
        .await
        .context("Failed to load feed")?;

    let selected: Vec<&Episode> = feed.episodes.iter().take(limit).collect();
    let (missing, present): (Vec<&Episode>, Vec<&Episode>) = selected
        .into_iter()
        .partition(|episode| !manager.is_downloaded(episode));

    if !quiet {
        println!(
            "{HEADPHONES}{} • {} episodes total, {} to download",
            feed.podcast.name.bold().green(),
            feed.episodes.len().to_string().cyan(),
            missing.len().to_string().yellow()
        );
    }

    let (tx, mut finished) = mpsc::unbounded_channel();
    let listener: SharedDownloadListener = if quiet {
        Arc::new(SilentListener { finished: tx })
    } else {
        Arc::new(IndicatifListener::new(tx))
    };
    manager.add_download_listener(listener.clone());

    let mut pending: HashSet<String> = HashSet::new();
    for episode in &missing {
        pending.insert(episode.id().to_string());
        manager.download(episode);
    }

    let mut downloaded = 0;
    let mut failed = 0;
    while !pending.is_empty() {
        let Some(event) = finished.recv().await else {
            break;
        };
        if !pending.remove(event.episode().id()) {
            continue;
        }
        match event {
            DownloadEvent::Succeeded { .. } => downloaded += 1,
            DownloadEvent::Failed { .. } => failed += 1,
            _ => {}
        }
    }
    manager.remove_download_listener(&listener);

    if !quiet {
        println!(
            "\n{} {} downloaded, {} already present, {}",
            "Fetch complete:".bold().green(),
            downloaded.to_string().green().bold(),
            present.len().to_string().yellow(),
            if failed > 0 {
                format!("{failed} failed").red().bold()
            } else {
                format!("{failed} failed").green()
            }
        );
        println!(
            "\n{FOLDER}Output: {}\n",
            manager.config().download_dir.display().to_string().cyan()
        );
    }

    Ok(failed == 0 || downloaded > 0)
}

async fn list(manager: &EpisodeManager, podcast: Option<&str>, json: bool) -> Result<()> {
    let filter = podcast.map(podcast_filter);
    let episodes = manager.load_downloads(filter.as_ref()).await;

    if json {
        let rows: Vec<ListedEpisode> = episodes
            .into_iter()
            .map(|episode| ListedEpisode {
                path: manager.local_path(&episode),
                episode,
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).context("Failed to encode episodes")?
        );
        return Ok(());
    }

    if episodes.is_empty() {
        println!("{}", "No downloaded episodes".dimmed());
        return Ok(());
    }

    for episode in &episodes {
        let date = episode
            .pub_date
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "----------".to_string());
        println!(
            "{} {} {}",
            date.dimmed(),
            episode.podcast.name.cyan(),
            episode.name.bold()
        );
        if let Some(path) = manager.local_path(episode) {
            println!("           {}", path.display().to_string().dimmed());
        }
    }
    Ok(())
}

fn delete(manager: &EpisodeManager, id: &str) -> Result<()> {
    let Some(episode) = manager.episode(id) else {
        bail!("Unknown episode: {id}");
    };

    if !manager.is_downloading_or_downloaded(&episode) {
        println!("{} is not downloaded", episode.name.yellow());
        return Ok(());
    }

    manager.delete_download(&episode);
    println!("{TRASH}Deleted {}", episode.name.bold());
    Ok(())
}

fn status(manager: &EpisodeManager) {
    let config = manager.config();
    println!(
        "{FOLDER}Journal:   {}",
        config.journal_path().display().to_string().cyan()
    );
    println!(
        "{FOLDER}Downloads: {}",
        config.download_dir.display().to_string().cyan()
    );
    println!(
        "{HEADPHONES}{} downloaded episodes",
        manager.downloads_size().to_string().green().bold()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_target(false)
        .init();

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    let client = ReqwestClient::new().context("Failed to create HTTP client")?;

    if matches!(args.command, Command::Fetch { quiet: false, .. }) {
        println!(
            "\n{}{} {}\n",
            MICROPHONE,
            "podcatcher".bold().magenta(),
            "- Podcast Downloader".dimmed()
        );
    }

    let manager = open_manager(config, client.clone()).await;

    let succeeded = match &args.command {
        Command::Fetch { feed, limit, quiet } => {
            fetch(&manager, &client, feed, *limit, *quiet).await?
        }
        Command::List { podcast, json } => {
            list(&manager, podcast.as_deref(), *json).await?;
            true
        }
        Command::Delete { episode } => {
            delete(&manager, episode)?;
            true
        }
        Command::Status => {
            status(&manager);
            true
        }
    };

    match manager.close().await.context("Failed to save episode metadata")? {
        SaveOutcome::Stored(count) => debug!("Saved {} metadata records", count),
        SaveOutcome::Unchanged => debug!("Metadata unchanged"),
    }

    if !succeeded {
        std::process::exit(1);
    }

    Ok(())
}
