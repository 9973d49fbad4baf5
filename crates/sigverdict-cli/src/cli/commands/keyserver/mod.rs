//! Keyserver CLI commands.
//!
//! Search, fetch, upload, sync and probe against HKP keyservers. Fetched keys
//! are written as armored files by [`DirectoryImporter`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use sigverdict_core::KeySnapshot;
use sigverdict_keyserver::{
    looks_like_key_id, CancelFlag, ImportOutcome, KeyImportStatus, KeyServerClient,
    KeyServerConfig, SearchOutcome, SyncOptions, SyncProgress,
};

use super::importer::DirectoryImporter;
use crate::cli::args::KeyserverCommonArgs;
use crate::exit_codes::{
    EXIT_NETWORK_ERROR, EXIT_NOT_FULLY_VALID, EXIT_PARTIAL_FAILURE, EXIT_SUCCESS,
};

#[derive(Subcommand, Debug)]
pub enum KeyserverCmd {
    /// Search the keyserver index
    Search(SearchArgs),

    /// Fetch keys by ID, fingerprint or search term into a directory
    Fetch(FetchArgs),

    /// Publish an armored public key
    Upload(UploadArgs),

    /// Refresh every key of a key snapshot from the keyserver
    Sync(SyncArgs),

    /// Check which configured keyservers are reachable
    Probe(ProbeArgs),
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Email, name, key ID or fingerprint
    pub query: String,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub common: KeyserverCommonArgs,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Key ID, fingerprint or search term
    pub query: String,

    /// Directory to store fetched keys in
    #[arg(long, short, default_value = ".")]
    pub output: PathBuf,

    #[command(flatten)]
    pub common: KeyserverCommonArgs,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Armored public key file
    pub key: PathBuf,

    #[command(flatten)]
    pub common: KeyserverCommonArgs,
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Key snapshot listing the keys to refresh (YAML or JSON)
    pub keys: PathBuf,

    /// Directory to store fetched keys in
    #[arg(long, short, default_value = ".")]
    pub output: PathBuf,

    /// Parallel keyserver requests
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Print the per-key outcome as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub common: KeyserverCommonArgs,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Connect timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    #[command(flatten)]
    pub common: KeyserverCommonArgs,
}

pub async fn run(cmd: KeyserverCmd) -> Result<i32> {
    match cmd {
        KeyserverCmd::Search(args) => cmd_search(args).await,
        KeyserverCmd::Fetch(args) => cmd_fetch(args).await,
        KeyserverCmd::Upload(args) => cmd_upload(args).await,
        KeyserverCmd::Sync(args) => cmd_sync(args).await,
        KeyserverCmd::Probe(args) => cmd_probe(args).await,
    }
}

/// Config file (or defaults), then environment, then command line.
fn load_config(common: &KeyserverCommonArgs) -> Result<KeyServerConfig> {
    let mut config = match &common.config {
        Some(path) => KeyServerConfig::from_file(path)
            .with_context(|| format!("failed to load keyserver config: {}", path.display()))?,
        None => KeyServerConfig::default(),
    }
    .apply_env();

    if let Some(server) = &common.server {
        config = config.with_server(server.clone());
    }
    if let Some(secs) = common.timeout {
        config = config.with_timeout_secs(secs);
    }
    Ok(config)
}

fn build_client(config: KeyServerConfig) -> Result<KeyServerClient> {
    KeyServerClient::new(config).context("invalid keyserver configuration")
}

fn search_exit_code(outcome: &SearchOutcome) -> i32 {
    match outcome {
        SearchOutcome::Found(_) => EXIT_SUCCESS,
        SearchOutcome::NotFound
        | SearchOutcome::TooManyResponses
        | SearchOutcome::InsufficientQuery => EXIT_NOT_FULLY_VALID,
        SearchOutcome::Timeout
        | SearchOutcome::ServerNotFound
        | SearchOutcome::ConnectionError => EXIT_NETWORK_ERROR,
    }
}

fn describe_outcome(outcome: &SearchOutcome) -> &'static str {
    match outcome {
        SearchOutcome::Found(_) => "found",
        SearchOutcome::NotFound => "no matching key",
        SearchOutcome::Timeout => "keyserver timed out",
        SearchOutcome::ServerNotFound => "keyserver host not found",
        SearchOutcome::ConnectionError => "could not talk to the keyserver",
        SearchOutcome::TooManyResponses => "too many matches, narrow the query",
        SearchOutcome::InsufficientQuery => "query too short",
    }
}

async fn cmd_search(args: SearchArgs) -> Result<i32> {
    let client = build_client(load_config(&args.common)?)?;
    let outcome = client.search(&args.query).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(search_exit_code(&outcome));
    }

    match &outcome {
        SearchOutcome::Found(candidates) => {
            for c in candidates {
                let mut flags = Vec::new();
                if c.revoked {
                    flags.push("revoked");
                }
                if c.expired {
                    flags.push("expired");
                }
                if c.disabled {
                    flags.push("disabled");
                }
                let flags = if flags.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", flags.join(", "))
                };
                println!("{} {}/{}{}", c.fetch_id(), c.algorithm, c.bits, flags);
                for uid in &c.uids {
                    println!("    {}", uid);
                }
            }
        }
        other => eprintln!("{}: {}", client.server(), describe_outcome(other)),
    }
    Ok(search_exit_code(&outcome))
}

async fn cmd_fetch(args: FetchArgs) -> Result<i32> {
    let client = build_client(load_config(&args.common)?)?;
    let importer = Arc::new(DirectoryImporter::new(&args.output));
    let options = SyncOptions::default();
    let query = args.query.trim();

    let outcome = if looks_like_key_id(query) {
        client
            .sync_all(&[query.to_string()], importer, &options)
            .await
    } else {
        match client.search(query).await {
            SearchOutcome::Found(candidates) => {
                client
                    .import_candidates(&candidates, importer, &options)
                    .await
            }
            other => {
                eprintln!("{}: {}", client.server(), describe_outcome(&other));
                return Ok(search_exit_code(&other));
            }
        }
    };

    print_import_outcome(&outcome, &args.output);
    Ok(import_exit_code(&outcome))
}

async fn cmd_upload(args: UploadArgs) -> Result<i32> {
    let armored = std::fs::read_to_string(&args.key)
        .with_context(|| format!("failed to read key file: {}", args.key.display()))?;
    let client = build_client(load_config(&args.common)?)?;

    match client.upload(&armored).await {
        Ok(()) => {
            println!("uploaded {} to {}", args.key.display(), client.server());
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(e.exit_code())
        }
    }
}

async fn cmd_sync(args: SyncArgs) -> Result<i32> {
    let snapshot = KeySnapshot::from_file(&args.keys)?;
    let key_ids = snapshot.fingerprints();
    if key_ids.is_empty() {
        println!("no keys to sync in {}", args.keys.display());
        return Ok(EXIT_SUCCESS);
    }

    let mut config = load_config(&args.common)?;
    if let Some(n) = args.concurrency {
        config = config.with_sync_concurrency(n);
    }
    let client = build_client(config)?;

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted, finishing keys in flight");
            on_interrupt.cancel();
        }
    });

    let options = SyncOptions::default()
        .with_cancel(cancel)
        .with_progress(Arc::new(|p: SyncProgress| eprintln!("{}", p)));
    let importer = Arc::new(DirectoryImporter::new(&args.output));
    let outcome = client.sync_all(&key_ids, importer, &options).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_import_outcome(&outcome, &args.output);
    }
    Ok(import_exit_code(&outcome))
}

async fn cmd_probe(args: ProbeArgs) -> Result<i32> {
    let mut config = load_config(&args.common)?;
    if let Some(ms) = args.timeout_ms {
        config = config.with_probe_timeout_ms(ms);
    }
    let client = build_client(config)?;

    let results = client.probe_servers().await;
    for r in &results {
        match (r.reachable, r.latency_ms, &r.error) {
            (true, Some(ms), _) => println!("{} reachable ({} ms)", r.server, ms),
            (true, None, _) => println!("{} reachable", r.server),
            (false, _, Some(err)) => println!("{} unreachable: {}", r.server, err),
            (false, _, None) => println!("{} unreachable", r.server),
        }
    }

    if results.iter().all(|r| r.reachable) {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_NETWORK_ERROR)
    }
}

fn print_import_outcome(outcome: &ImportOutcome, dir: &Path) {
    for entry in &outcome.entries {
        match &entry.status {
            KeyImportStatus::Imported => println!("imported  {}", entry.key_id),
            KeyImportStatus::Failed { message, .. } => {
                println!("failed    {}: {}", entry.key_id, message)
            }
            KeyImportStatus::Cancelled => println!("cancelled {}", entry.key_id),
        }
    }
    println!(
        "{} of {} keys imported into {}",
        outcome.imported().count(),
        outcome.entries.len(),
        dir.display()
    );
}

fn import_exit_code(outcome: &ImportOutcome) -> i32 {
    if outcome.is_complete_success() {
        EXIT_SUCCESS
    } else if outcome.imported().count() == 0 && !outcome.cancelled {
        EXIT_NOT_FULLY_VALID
    } else {
        EXIT_PARTIAL_FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_id_queries() {
        assert!(looks_like_key_id("DEADBEEF"));
        assert!(looks_like_key_id("0xdeadbeefcafebabe"));
        assert!(looks_like_key_id("A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1A1"));
        assert!(!looks_like_key_id("alice@example.org"));
        assert!(!looks_like_key_id("DEADBEE"));
    }

    #[test]
    fn search_outcomes_map_to_exit_codes() {
        assert_eq!(search_exit_code(&SearchOutcome::Found(vec![])), EXIT_SUCCESS);
        assert_eq!(search_exit_code(&SearchOutcome::NotFound), EXIT_NOT_FULLY_VALID);
        assert_eq!(search_exit_code(&SearchOutcome::Timeout), EXIT_NETWORK_ERROR);
        assert_eq!(
            search_exit_code(&SearchOutcome::InsufficientQuery),
            EXIT_NOT_FULLY_VALID
        );
    }
}
