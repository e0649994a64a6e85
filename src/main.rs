use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use revidx::cache::BoundedCache;
use revidx::config::Config;
use revidx::l2p::{format::L2pHeader, L2pBuilder, L2pReader};
use revidx::p2l::{format::P2lHeader, P2lBuilder, P2lReader};
use revidx::proto::ProtoReader;

#[derive(Parser)]
#[command(name = "ridx", version = "0.1.0", about = "Logical/physical item-index engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an L2P index file from a proto log
    BuildL2p {
        proto: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        first_revision: u64,
        #[arg(long, default_value = "8192")]
        page_size: u64,
    },
    /// Build a P2L index file from a proto log
    BuildP2l {
        proto: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        first_revision: u64,
        #[arg(long)]
        finalize_revision: u64,
        #[arg(long)]
        file_size: u64,
        #[arg(long, default_value = "65536")]
        cluster_size: u64,
    },
    /// Print an L2P index file's header fields
    InspectL2p { input: PathBuf },
    /// Print a P2L index file's header fields
    InspectP2l { input: PathBuf },
    /// Look up the physical offset of one (revision, item_index)
    LookupL2p {
        input: PathBuf,
        #[arg(long)]
        base_revision: u64,
        #[arg(long)]
        revision: u64,
        #[arg(long)]
        item_index: u64,
    },
    /// Look up the item occupying a physical offset
    LookupP2l {
        input: PathBuf,
        #[arg(long)]
        base_revision: u64,
        #[arg(long)]
        offset: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        // ── BuildL2p ─────────────────────────────────────────────────────────
        Commands::BuildL2p {
            proto,
            output,
            first_revision,
            page_size,
        } => {
            let mut config = Config::default();
            config.l2p_page_size = page_size;

            let proto_file = File::open(&proto)?;
            let mut reader = ProtoReader::new(proto_file, &proto);
            let sink = File::create(&output)?;
            let builder = L2pBuilder::new(sink, config, first_revision);
            builder.build_from_proto(&mut reader)?;

            let size = std::fs::metadata(&output)?.len();
            println!("Built L2P index: {}  ({} B on disk)", output.display(), size);
        }

        // ── BuildP2l ─────────────────────────────────────────────────────────
        Commands::BuildP2l {
            proto,
            output,
            first_revision,
            finalize_revision,
            file_size,
            cluster_size,
        } => {
            let mut config = Config::default();
            config.p2l_cluster_size = cluster_size;

            let proto_file = File::open(&proto)?;
            let mut reader = ProtoReader::new(proto_file, &proto);
            let sink = File::create(&output)?;
            let builder = P2lBuilder::new(sink, config, first_revision);
            builder.build_from_proto(&mut reader, finalize_revision, file_size)?;

            let size = std::fs::metadata(&output)?.len();
            println!("Built P2L index: {}  ({} B on disk)", output.display(), size);
        }

        // ── InspectL2p ───────────────────────────────────────────────────────
        Commands::InspectL2p { input } => {
            let blob = read_l2p_header_blob(&input)?;
            let header = L2pHeader::parse(&blob)?;
            println!("── L2P index ────────────────────────────────────────────");
            println!("  Path             {}", input.display());
            println!("  First revision   {}", header.first_revision());
            println!("  Page size (P)    {}", header.page_size());
            println!("  Revision count   {}", header.revision_count());
            println!("  Total pages      {}", header.total_page_count());
        }

        // ── InspectP2l ───────────────────────────────────────────────────────
        Commands::InspectP2l { input } => {
            let blob = read_p2l_header_blob(&input)?;
            let header = P2lHeader::parse(&blob)?;
            println!("── P2L index ────────────────────────────────────────────");
            println!("  Path             {}", input.display());
            println!("  First revision   {}", header.first_revision());
            println!("  File size        {} B", header.file_size());
            println!("  Cluster size (Q) {} B", header.cluster_size());
            println!("  Page count       {}", header.page_count());
        }

        // ── LookupL2p ────────────────────────────────────────────────────────
        Commands::LookupL2p {
            input,
            base_revision,
            revision,
            item_index,
        } => {
            let file = File::open(&input)?;
            let header_cache = Arc::new(BoundedCache::new(8));
            let page_cache = Arc::new(BoundedCache::new(64));
            let mut reader = L2pReader::new(file, &input, false, header_cache, page_cache);
            let offset = reader.item_offset(base_revision, revision, item_index)?;
            println!("(revision={revision}, item_index={item_index}) -> offset {offset}");
        }

        // ── LookupP2l ────────────────────────────────────────────────────────
        Commands::LookupP2l {
            input,
            base_revision,
            offset,
        } => {
            let file = File::open(&input)?;
            let header_cache = Arc::new(BoundedCache::new(8));
            let page_cache = Arc::new(BoundedCache::new(64));
            let mut reader = P2lReader::new(file, &input, false, header_cache, page_cache);
            let entry = reader.find_item_at(base_revision, offset)?;
            println!(
                "offset {offset} -> revision={} item_number={} size={} type={}",
                entry.revision, entry.item_number, entry.size, entry.item_type
            );
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────
// Sealing a finished index file read-only (§4.4/§4.5: "close, then set file
// permissions to read-only") is the builder's own responsibility now — see
// `crate::sink::FinalizeSink` — so there's no CLI-side equivalent to call here.

fn read_l2p_header_blob(path: &PathBuf) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    use std::io::{Read, Seek, SeekFrom};
    let mut f = File::open(path)?;
    let len = f.seek(SeekFrom::End(0))?;
    let mut footer = [0u8; 8];
    f.seek(SeekFrom::Start(len - 8))?;
    f.read_exact(&mut footer)?;
    let header_len = u32::from_le_bytes(footer[0..4].try_into().unwrap()) as u64;
    let start = len - 8 - header_len;
    let mut blob = vec![0u8; header_len as usize];
    f.seek(SeekFrom::Start(start))?;
    f.read_exact(&mut blob)?;
    Ok(blob)
}

fn read_p2l_header_blob(path: &PathBuf) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    // Identical footer shape to the L2P file; kept as a separate function
    // since the two formats are not guaranteed to stay in lockstep.
    read_l2p_header_blob(path)
}
