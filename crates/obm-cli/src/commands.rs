use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, TimeDelta, Utc};
use colored::Colorize;
use obm_codec::{BlockCodec, FramedBlockCodec};
use obm_merger::{find_next_base_block, Merger, MergerConfig};
use obm_server::ObmServer;
use obm_store::{LocalObjectStore, ObjectStore};
use obm_types::{format_one_block_filename, Block, OneBlockFile};
use tokio::sync::watch;

use crate::cli::*;
use crate::config::AppConfig;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(args),
        Command::NextBase(args) => cmd_next_base(args, cli.format),
        Command::ParseName(args) => cmd_parse_name(args, cli.format),
        Command::Seed(args) => cmd_seed(args),
    }
}

fn open_store(dir: &std::path::Path, role: &str) -> anyhow::Result<Arc<LocalObjectStore>> {
    let store = LocalObjectStore::open(dir)
        .with_context(|| format!("opening {role} store at {}", dir.display()))?;
    Ok(Arc::new(store))
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let config = AppConfig::from_args(&args)?;
    let source = open_store(&config.source_dir, "source")?;
    let destination = open_store(&config.destination_dir, "destination")?;

    let merger = Merger::new(
        source,
        destination,
        Arc::new(FramedBlockCodec),
        config.merger.clone(),
    )
    .context("computing resume point")?;
    println!(
        "{} Resuming at block {} (chunk size {})",
        "✓".green().bold(),
        merger.bundle().base().to_string().yellow(),
        config.merger.chunk_size,
    );
    println!("  Source:      {}", config.source_dir.display());
    println!("  Destination: {}", config.destination_dir.display());
    println!("  Queries:     http://{}", config.server.bind_addr.to_string().bold());

    let server = ObmServer::new(config.server.clone(), merger.query_service());
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let (tx, rx) = watch::channel(false);
        let merger_task = tokio::spawn(merger.run(rx.clone()));
        let mut server_task = tokio::spawn(server.serve_until(rx));

        let served = tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("shutdown requested");
                None
            }
            served = &mut server_task => Some(served),
        };
        tx.send_replace(true);

        let served = match served {
            Some(served) => served,
            None => server_task.await,
        };
        merger_task.await??;
        served??;
        Ok::<_, anyhow::Error>(())
    })?;

    println!("{} Stopped.", "✓".green());
    Ok(())
}

fn cmd_next_base(args: NextBaseArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = MergerConfig {
        chunk_size: args.chunk_size,
        minimal_block_num: args.minimal_block_num,
        ..MergerConfig::default()
    };
    config.validate()?;
    let store = open_store(&args.destination, "destination")?;
    let base = find_next_base_block(
        &*store,
        config.minimal_block_num,
        config.chunk_size,
        &config.ignore_suffix,
    )?;
    match format {
        OutputFormat::Text => {
            println!("Next base block: {}", base.to_string().yellow().bold());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "next_base": base }));
        }
    }
    Ok(())
}

fn cmd_parse_name(args: ParseNameArgs, format: OutputFormat) -> anyhow::Result<()> {
    let file = OneBlockFile::parse(&args.name)?;
    match format {
        OutputFormat::Text => {
            println!("Block #{}", file.number.to_string().yellow().bold());
            println!("  Timestamp:   {}", file.timestamp.to_rfc3339());
            println!("  ID:          {}", file.id.cyan());
            println!("  Previous ID: {}", file.previous_id.cyan());
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&file)?),
    }
    Ok(())
}

fn cmd_seed(args: SeedArgs) -> anyhow::Result<()> {
    let store = open_store(&args.dir, "seed")?;
    let start = Utc::now();
    let end = args
        .from
        .checked_add(args.count)
        .context("block range overflows")?;

    let mut written = 0;
    for number in args.from..end {
        let previous = number
            .checked_sub(1)
            .map_or_else(|| "0".repeat(16), |p| synthetic_id("main", p));
        let block = synthetic_block(number, synthetic_id("main", number), previous, start);
        write_one_block(&*store, &block)?;
        written += 1;
    }
    if let Some(number) = args.fork_at {
        let previous = number
            .checked_sub(1)
            .map_or_else(|| "0".repeat(16), |p| synthetic_id("main", p));
        let block = synthetic_block(number, synthetic_id("fork", number), previous, start);
        write_one_block(&*store, &block)?;
        written += 1;
    }

    println!(
        "{} Wrote {} one-block files to {}",
        "✓".green().bold(),
        written.to_string().bold(),
        args.dir.display()
    );
    Ok(())
}

/// Short hex id derived from the branch name and block number.
fn synthetic_id(branch: &str, number: u64) -> String {
    let hash = blake3::hash(format!("{branch}:{number}").as_bytes());
    hex::encode(&hash.as_bytes()[..8])
}

fn synthetic_block(number: u64, id: String, previous_id: String, start: DateTime<Utc>) -> Block {
    let offset = TimeDelta::try_seconds(number as i64).unwrap_or_default();
    let payload = blake3::hash(id.as_bytes()).as_bytes().to_vec();
    Block::new(number, id, previous_id, start + offset).with_payload(payload)
}

fn write_one_block(store: &dyn ObjectStore, block: &Block) -> anyhow::Result<String> {
    let key =
        format_one_block_filename(block.number, &block.timestamp, &block.id, &block.previous_id);
    let data = FramedBlockCodec.encode(block)?;
    store.write(&key, &data)?;
    Ok(key)
}
