use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use db::keys::{DEFAULT_SEED, KeyKind};
use db::printer::print_phase_table;
use db::workload::{run_build, run_errors, run_temp};
use storage::{BufferPoolManager, DiskManager};

#[derive(Parser, Debug)]
#[command(name = "hashix", about = "Exercise the disk-backed hash index")]
struct Args {
    #[arg(long, env = "HASHIX_DB", value_name = "PATH", default_value = "data/hashix.db")]
    db: PathBuf,
    /// Buffer pool frames.
    #[arg(long, default_value_t = 64)]
    pool_size: usize,
    /// Entries inserted by the build workload.
    #[arg(long, default_value_t = 3000)]
    entries: usize,
    /// Key type for the build workload; all three when omitted.
    #[arg(long, value_enum)]
    key_type: Option<KeyKind>,
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Small temporary index.
    Temp,
    /// Larger persistent indexes.
    Build,
    /// Boundary and error conditions.
    Errors,
    /// Everything above, in order.
    All,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    if let Some(parent) = args.db.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("create db directory")?;
    }

    println!("hashix v{}", env!("CARGO_PKG_VERSION"));
    println!("Using database file: {}", args.db.display());
    let disk_manager = DiskManager::open(&args.db)
        .with_context(|| format!("open {}", args.db.display()))?;
    let pool = BufferPoolManager::new(disk_manager, args.pool_size);
    let mut out = io::stdout();

    if matches!(args.command, Command::Temp | Command::All) {
        println!("\nTest 1: Small, temporary hash index");
        let reports = run_temp(&pool, args.seed, &mut out)?;
        print_phase_table("Test 1 counters", &reports);
    }
    if matches!(args.command, Command::Build | Command::All) {
        println!("\nTest 2: Larger, persistent hash indexes");
        let kinds = match args.key_type {
            Some(kind) => vec![kind],
            None => KeyKind::ALL.to_vec(),
        };
        let mut reports = Vec::new();
        for kind in kinds {
            println!("\n(type == {})", kind);
            reports.extend(run_build(&pool, kind, args.entries, args.seed, &mut out)?);
        }
        print_phase_table("Test 2 counters", &reports);
    }
    if matches!(args.command, Command::Errors | Command::All) {
        println!("\nTest 3: Boundary and error conditions");
        let reports = run_errors(&pool, args.seed, &mut out)?;
        print_phase_table("Test 3 counters", &reports);
    }

    pool.flush_all_pages().context("flush buffer pool")?;
    println!("\nAll hash index tests completed successfully!");
    Ok(())
}
