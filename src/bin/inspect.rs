//! AtlasKV Index Inspector
//!
//! Read-only diagnostics for an index directory.

use std::path::{Path, PathBuf};
use std::process;

use atlaskv_index::branch::BranchTable;
use atlaskv_index::dkey::{decode_sequence_key, DirectKey};
use atlaskv_index::entry::EntryStore;
use atlaskv_index::journal::{index_file_path, FileStatus, IndexReader, IndexRecovery, ItemRecord};
use atlaskv_index::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// AtlasKV index inspector
#[derive(Parser, Debug)]
#[command(name = "atlaskv-index-inspect")]
#[command(about = "Inspect AtlasKV index files without modifying them")]
#[command(version)]
struct Args {
    /// Index directory
    #[arg(short, long, default_value = "./atlaskv_data/index")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the header of every index file
    Headers,

    /// Print the records of one index file
    Dump {
        /// File id to dump
        file_id: u16,

        /// Decode 8-byte ids as sequence ids
        #[arg(long)]
        sequence: bool,

        /// Also print the direct key clients use for each value
        #[arg(long)]
        direct: bool,
    },

    /// Replay every file and report damage or torn tails
    Verify,

    /// Replay into memory and print live key statistics
    Stats {
        /// Number of branches to hash into
        #[arg(short, long, default_value = "65536")]
        branches: usize,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atlaskv_index=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!("AtlasKV index inspector v{}", atlaskv_index::VERSION);

    let result = match args.command {
        Commands::Headers => headers(&args.dir),
        Commands::Dump {
            file_id,
            sequence,
            direct,
        } => dump(&args.dir, file_id, sequence, direct),
        Commands::Verify => verify(&args.dir),
        Commands::Stats { branches } => stats(&args.dir, branches),
    };

    if let Err(e) = result {
        tracing::error!("Inspection failed: {}", e);
        process::exit(1);
    }
}

fn headers(dir: &Path) -> Result<()> {
    for file_id in IndexRecovery::discover(dir)? {
        let path = index_file_path(dir, file_id);
        match IndexReader::open(&path, file_id) {
            Ok(reader) => {
                let h = reader.header();
                let mode = h
                    .run_mode()
                    .map_or_else(|| format!("unknown({})", h.mode), |m| m.to_string());
                println!(
                    "{:05}  version={} created={} opened={} header_id={} mode={}",
                    file_id, h.version, h.created, h.opened, h.file_id, mode
                );
            }
            Err(e) => println!("{:05}  unreadable: {}", file_id, e),
        }
    }
    Ok(())
}

fn dump(dir: &Path, file_id: u16, sequence: bool, direct: bool) -> Result<()> {
    let mut reader = IndexReader::open(&index_file_path(dir, file_id), file_id)?;

    let mut offset = reader.position();
    while let Some(record) = reader.next_record()? {
        println!("{:>10}  {}", offset, describe(&record, sequence, direct));
        offset = reader.position();
    }

    if reader.was_truncated() {
        println!("-- torn record after offset {}", reader.position());
    }
    Ok(())
}

fn verify(dir: &Path) -> Result<()> {
    let report = IndexRecovery::verify(dir)?;

    for file in &report.files {
        let status = match &file.status {
            FileStatus::Clean => "clean".to_string(),
            FileStatus::Empty => "empty".to_string(),
            FileStatus::Truncated => "torn tail".to_string(),
            FileStatus::Corrupt(reason) => format!("CORRUPT: {}", reason),
            FileStatus::Unreadable(reason) => format!("UNREADABLE: {}", reason),
        };
        println!(
            "{:05}  records={} tombstones={} valid_len={}  {}",
            file.file_id, file.records, file.tombstones, file.valid_len, status
        );
    }

    let damaged = report.damaged_files().count();
    println!(
        "{} files, {} records, {} damaged",
        report.files.len(),
        report.records(),
        damaged
    );

    if damaged > 0 {
        process::exit(2);
    }
    Ok(())
}

fn stats(dir: &Path, branches: usize) -> Result<()> {
    let table = BranchTable::new(branches);
    let mut store = EntryStore::new();

    let mut replay = IndexRecovery::replay(dir)?;
    for replayed in replay.by_ref() {
        let record = replayed.record;
        if record.is_tombstone() {
            table.delete(&mut store, &record.id);
        } else {
            table.insert(&mut store, &record.id, record.location);
        }
    }
    let report = replay.finish();

    let longest = (0..table.branch_count())
        .map(|i| table.branch_len(i))
        .max()
        .unwrap_or(0);
    let used = (0..table.branch_count())
        .filter(|&i| table.branch_len(i) > 0)
        .count();

    println!("files:          {}", report.files.len());
    println!("records:        {}", report.records());
    println!("tombstones:     {}", report.tombstones());
    println!("live keys:      {}", table.len());
    println!("branches used:  {} / {}", used, table.branch_count());
    println!("longest branch: {}", longest);
    println!("entries reused: {}", store.reuses());
    Ok(())
}

fn describe(record: &ItemRecord, sequence: bool, direct: bool) -> String {
    let id = match decode_sequence_key(&record.id).filter(|_| sequence) {
        Some(seq) => format!("#{}", seq),
        None => String::from_utf8_lossy(&record.id).into_owned(),
    };
    let loc = record.location;
    if record.is_tombstone() {
        format!("DEL  {}", id)
    } else {
        let mut line = format!(
            "PUT  {}  -> data={} offset={} length={}",
            id, loc.data_file_id, loc.offset, loc.length
        );
        if direct {
            match DirectKey::for_location(loc) {
                Some(key) => {
                    let hex: String = key.to_bytes().iter().map(|b| format!("{:02x}", b)).collect();
                    line.push_str(&format!("  direct={}", hex));
                }
                None => line.push_str("  direct=none"),
            }
        }
        line
    }
}
