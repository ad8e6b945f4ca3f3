use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::index::collection::Collection;
use crate::index::progress::StatusFile;
use crate::storage::db::i64_seconds_to_local_time;
use crate::storage::store::Store;

#[derive(Parser)]
#[command(name = "tunedex")]
#[command(version = "0.1")]
#[command(about = "Local music collection indexer and search")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "tunedex.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show index status and the progress of any running bulk operation
    Status,
    /// Re-index the whole collection from scratch
    Rebuild,
    /// Reconcile the index with the files currently on disk
    Resync,
    /// Search the collection
    Search {
        query: String,
        /// Maximum results per section
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// Print the raw result payload as JSON
        #[arg(long)]
        json: bool,
    },
    /// Index the collection, then keep watching it for changes
    Run,
}

/// Entrypoint for CLI
pub fn run() {
    env_logger::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config).unwrap();

    match &cli.command {
        Commands::Status => {
            let status = StatusFile::for_root(&cfg.status_dir(), &cfg.collection.root);
            match status.get() {
                Some(record) => {
                    let started = i64_seconds_to_local_time(record.started_at)
                        .map(|t| t.to_string())
                        .unwrap_or_else(|_| "?".to_string());
                    if record.total >= 0 {
                        println!(
                            "{:?} since {}: {}/{} ({:.0}%)",
                            record.status,
                            started,
                            record.current,
                            record.total,
                            record.progress * 100.0
                        );
                    } else {
                        println!("{:?} since {}: counting files...", record.status, started);
                    }
                }
                None => println!("Idle, no bulk operation running"),
            }

            match cfg.database.path.as_deref().map(Store::open_read_only) {
                Some(Ok(store)) => {
                    println!("Indexed tracks: {}", store.count().unwrap());
                }
                _ => println!("Database not created yet, run \"rebuild\" first"),
            }
        }

        Commands::Rebuild => {
            let collection = Collection::open(&cfg).expect("failed to open collection");
            collection.rebuild().expect("rebuild failed");
            println!("Rebuild done, {} tracks indexed", collection.count().unwrap());
            collection.stop();
        }

        Commands::Resync => {
            let collection = Collection::open(&cfg).expect("failed to open collection");
            collection.resync().expect("resync failed");
            println!("Resync done, {} tracks indexed", collection.count().unwrap());
            collection.stop();
        }

        Commands::Search { query, limit, json } => {
            let collection = Collection::open(&cfg).expect("failed to open collection");
            let (results, terms) = collection.search(query, *limit).unwrap();

            if *json {
                let payload = serde_json::json!({
                    "results": results,
                    "terms": terms,
                });
                println!("{}", serde_json::to_string_pretty(&payload).unwrap());
            } else {
                if !results.artists.is_empty() {
                    println!("Artists:");
                    for artist in &results.artists {
                        println!("  {}", artist.name);
                    }
                }
                if !results.albums.is_empty() {
                    println!("Albums:");
                    for album in &results.albums {
                        println!("  {} - {}", album.artist, album.album);
                    }
                }
                if !results.tracks.is_empty() {
                    println!("Tracks:");
                    for track in &results.tracks {
                        println!(
                            "  {} - {} - {} ({})",
                            track.artist,
                            track.album,
                            track.title,
                            track.path.to_string_lossy()
                        );
                    }
                }
                if results.artists.is_empty()
                    && results.albums.is_empty()
                    && results.tracks.is_empty()
                {
                    println!("No matches");
                }
            }

            collection.stop();
        }

        Commands::Run => {
            let collection = Collection::open(&cfg).expect("failed to open collection");
            collection.start();
            println!(
                "Indexing '{}', watching for changes (Ctrl+C to stop)",
                cfg.collection.root.display()
            );

            loop {
                std::thread::sleep(std::time::Duration::from_secs(30));
                if let Some(record) = collection.progress() {
                    log::info!(
                        "{:?}: {}/{}",
                        record.status,
                        record.current,
                        record.total
                    );
                }
                if !collection.is_healthy() {
                    eprintln!("index writer died, exiting");
                    std::process::exit(1);
                }
            }
        }
    }
}
