//! Scoped Drive CLI
//!
//! Runs sandboxed drive operations against a JSON snapshot of a store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use scoped_drive::{Error, MemoryStore, NodeId, Result, ScopeConfig, ScopedDrive};

const USAGE: &str = "\
Usage: scoped-drive <snapshot.json> <command> [args]

Commands:
  root                      Print the sandbox root id and name (creates it if missing)
  check <id>                Print whether <id> is inside the sandbox
  ls [id] [depth]           List the sandbox breadth-first
  search <query> [--content] Search names, and bodies with --content
  cat <id>                  Print the text of a file
  mkdir <name> [parent]     Create a folder
  rm <id>...                Delete nodes, reporting each one

Environment variables:
  SCOPED_DRIVE_CONFIG=path  TOML scope configuration (default: built-in)";

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse args
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    }

    // Run the command against the snapshot
    if let Err(e) = run(PathBuf::from(&args[0]), &args[1], &args[2..]).await {
        eprintln!("scoped-drive: {}", e);
        std::process::exit(1);
    }
}

fn load_config() -> Result<ScopeConfig> {
    match std::env::var("SCOPED_DRIVE_CONFIG") {
        Ok(path) => ScopeConfig::load(Path::new(&path)),
        Err(_) => Ok(ScopeConfig::default()),
    }
}

fn load_store(path: &Path) -> Result<MemoryStore> {
    if path.exists() {
        MemoryStore::load(path)
    } else {
        tracing::info!(path = ?path, "snapshot not found, starting empty");
        Ok(MemoryStore::new())
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn usage_error(msg: &str) -> Error {
    Error::Config(format!("{}\n\n{}", msg, USAGE))
}

async fn run(snapshot: PathBuf, command: &str, args: &[String]) -> Result<()> {
    // Load config and store
    let config = load_config()?;
    let store = Arc::new(load_store(&snapshot)?);
    let drive = ScopedDrive::new(store.clone(), config)?;

    let mutates = match command {
        "root" => {
            let root = drive.resolve_root().await?;
            println!("{}\t{}", root, drive.config().root_name);
            true
        }
        "check" => {
            let id = args.first().ok_or_else(|| usage_error("check needs an id"))?;
            let allowed = drive.is_in_scope(&NodeId::from(id.as_str())).await?;
            println!("{}", if allowed { "in scope" } else { "not allowed" });
            false
        }
        "ls" => {
            let start = args.first().map(|id| NodeId::from(id.as_str()));
            let depth = match args.get(1) {
                Some(raw) => Some(
                    raw.parse::<usize>()
                        .map_err(|_| usage_error("depth must be a number"))?,
                ),
                None => None,
            };
            for item in drive.list_scoped(start.as_ref(), depth).await? {
                let kind = if item.node.is_folder() { "d" } else { "-" };
                println!(
                    "{}{} {} {}",
                    "  ".repeat(item.depth),
                    kind,
                    item.node.id,
                    item.node.name
                );
            }
            false
        }
        "search" => {
            let query = args.first().ok_or_else(|| usage_error("search needs a query"))?;
            let include_content = args.iter().skip(1).any(|a| a == "--content");
            print_json(&drive.search_scoped(query, include_content).await?)?;
            false
        }
        "cat" => {
            let id = args.first().ok_or_else(|| usage_error("cat needs an id"))?;
            print!("{}", drive.read_text(&NodeId::from(id.as_str())).await?);
            false
        }
        "mkdir" => {
            let name = args.first().ok_or_else(|| usage_error("mkdir needs a name"))?;
            let parent = args.get(1).map(|id| NodeId::from(id.as_str()));
            let folder = drive.create_folder(name, parent.as_ref()).await?;
            println!("{}", folder.id);
            true
        }
        "rm" => {
            if args.is_empty() {
                return Err(usage_error("rm needs at least one id"));
            }
            let ids: Vec<NodeId> = args.iter().map(|id| NodeId::from(id.as_str())).collect();
            print_json(&drive.batch_delete(&ids).await?)?;
            true
        }
        other => return Err(usage_error(&format!("unknown command '{}'", other))),
    };

    // Persist changes
    if mutates {
        store.save(&snapshot)?;
    }
    Ok(())
}
