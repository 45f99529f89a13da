mod output;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use kestrel_core::{Commit, CommitFilter, Hash, Object, Repository};
use output::{
    AddOutput, BranchCreateOutput, BranchEntry, BranchListOutput, CatObjectOutput,
    CheckoutOutput, CommitInfo, CommitOutput, GcOutput, InitOutput, LogEntry, LogOutput,
    ObjectData, OutputWriter, SearchOutput, StagedInfo, TreeEntryInfo,
};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Kestrel - a small version-control tool
#[derive(Parser)]
#[command(name = "kestrel")]
#[command(about = "Version control on a SHA-256 content-addressed object store", long_about = None)]
#[command(version)]
struct Cli {
    /// Working tree root (defaults to KESTREL_ROOT env var or the current directory)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new repository
    Init,

    /// Stage files or directories
    Add {
        /// Paths to add
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Record the staged files as a new commit
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: String,
    },

    /// List branches, or create one at HEAD
    Branch {
        /// Name of the branch to create
        name: Option<String>,
    },

    /// Switch the working tree to a branch or commit
    Checkout {
        /// Branch name, HEAD or commit hash
        target: String,
    },

    /// Show commit history from HEAD
    Log {
        /// Maximum number of commits to show
        #[arg(short = 'n', long)]
        max_count: Option<usize>,
    },

    /// Search every stored commit by message or author
    Search {
        /// Text to find in the message or author name
        query: Option<String>,

        /// Only commits whose author name contains this text
        #[arg(long)]
        author: Option<String>,

        /// Only commits whose message contains this text
        #[arg(long)]
        message: Option<String>,
    },

    /// Pack loose objects
    Gc,

    /// Print an object (blob content, tree listing or commit fields)
    CatObject {
        /// Hash of the object
        hash: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = OutputWriter::new(cli.json);

    if let Err(err) = run(cli, &output) {
        output.write_error(&err, 1);
        std::process::exit(1);
    }
}

fn run(cli: Cli, output: &OutputWriter) -> Result<()> {
    // Determine work tree root: CLI arg > KESTREL_ROOT env var > current directory
    let root = resolve_root(cli.root, std::env::var("KESTREL_ROOT").ok())?;

    match cli.command {
        Commands::Init => cmd_init(&root, output),
        Commands::Add { paths } => cmd_add(&root, paths, output),
        Commands::Commit { message } => cmd_commit(&root, &message, output),
        Commands::Branch { name } => cmd_branch(&root, name.as_deref(), output),
        Commands::Checkout { target } => cmd_checkout(&root, &target, output),
        Commands::Log { max_count } => cmd_log(&root, max_count, output),
        Commands::Search {
            query,
            author,
            message,
        } => cmd_search(&root, CommitFilter { query, author, message }, output),
        Commands::Gc => cmd_gc(&root, output),
        Commands::CatObject { hash } => cmd_cat_object(&root, &hash, output),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("kestrel={level},kestrel_core={level}"))
    });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn resolve_root(cli_root: Option<PathBuf>, env_root: Option<String>) -> Result<PathBuf> {
    match cli_root.or_else(|| env_root.filter(|s| !s.is_empty()).map(PathBuf::from)) {
        Some(root) => Ok(root),
        None => std::env::current_dir().context("Failed to determine current directory"),
    }
}

fn open_repo(root: &Path) -> Result<Repository> {
    Repository::discover(root)
        .with_context(|| format!("Failed to open repository at {}", root.display()))
}

fn cmd_init(root: &Path, output: &OutputWriter) -> Result<()> {
    let repo = Repository::init(root)
        .with_context(|| format!("Failed to initialize repository at {}", root.display()))?;

    let data = InitOutput {
        success: true,
        result_code: 0,
        meta_dir: repo.meta_dir().display().to_string(),
        algorithm: repo.config().algorithm.as_str().to_string(),
    };

    output.write(&data, || {
        format!(
            "Initialized empty kestrel repository in {}\nAlgorithm: {}\n",
            data.meta_dir, data.algorithm
        )
    })
}

fn cmd_add(root: &Path, paths: Vec<PathBuf>, output: &OutputWriter) -> Result<()> {
    let repo = open_repo(root)?;
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let paths: Vec<PathBuf> = paths.into_iter().map(|p| cwd.join(p)).collect();

    let staged = repo
        .add_paths(&paths)
        .with_context(|| "Failed to stage paths")?;

    let data = AddOutput {
        success: true,
        result_code: 0,
        staged: staged
            .into_iter()
            .map(|file| StagedInfo {
                path: file.path,
                hash: file.hash,
            })
            .collect(),
    };

    output.write(&data, || {
        let mut text = String::new();
        for file in &data.staged {
            let _ = writeln!(text, "{} {}", file.hash.short(), file.path);
        }
        let _ = writeln!(text, "Staged {} file(s)", data.staged.len());
        text
    })
}

fn cmd_commit(root: &Path, message: &str, output: &OutputWriter) -> Result<()> {
    let repo = open_repo(root)?;

    let hash = repo.commit(message).with_context(|| "Failed to commit")?;
    let data = CommitOutput {
        success: true,
        result_code: 0,
        hash,
        branch: repo.current_branch()?,
        message: message.to_string(),
    };

    output.write(&data, || {
        format!(
            "[{} {}] {}\n",
            data.branch.as_deref().unwrap_or("detached HEAD"),
            data.hash.short(),
            first_line(&data.message)
        )
    })
}

fn cmd_branch(root: &Path, name: Option<&str>, output: &OutputWriter) -> Result<()> {
    let repo = open_repo(root)?;

    if let Some(name) = name {
        let hash = repo
            .create_branch(name)
            .with_context(|| format!("Failed to create branch: {}", name))?;
        let data = BranchCreateOutput {
            success: true,
            result_code: 0,
            name: name.to_string(),
            hash,
        };
        return output.write(&data, || {
            format!("Created branch {} at {}\n", data.name, data.hash.short())
        });
    }

    let branches = repo.list_branches().with_context(|| "Failed to list branches")?;
    let data = BranchListOutput {
        success: true,
        result_code: 0,
        branches: branches
            .into_iter()
            .map(|b| BranchEntry {
                name: b.name,
                hash: b.hash,
                current: b.current,
            })
            .collect(),
    };

    output.write(&data, || {
        if data.branches.is_empty() {
            return "No branches (make a commit first)\n".to_string();
        }
        let mut text = String::new();
        for branch in &data.branches {
            let marker = if branch.current { '*' } else { ' ' };
            let _ = writeln!(text, "{} {} {}", marker, branch.name, branch.hash.short());
        }
        text
    })
}

fn cmd_checkout(root: &Path, target: &str, output: &OutputWriter) -> Result<()> {
    let repo = open_repo(root)?;

    let hash = repo
        .checkout(target)
        .with_context(|| format!("Failed to check out {}", target))?;
    let data = CheckoutOutput {
        success: true,
        result_code: 0,
        hash,
        branch: repo.current_branch()?,
    };

    output.write(&data, || match &data.branch {
        Some(branch) => format!("Switched to branch '{}'\n", branch),
        None => format!("HEAD is now at {}\n", data.hash.short()),
    })
}

fn log_entry(hash: Hash, commit: &Commit) -> LogEntry {
    LogEntry {
        hash,
        parent: commit.parent(),
        author: commit.author().to_string(),
        email: commit.email().to_string(),
        timestamp: commit.timestamp(),
        message: commit.message().to_string(),
    }
}

fn cmd_log(root: &Path, max_count: Option<usize>, output: &OutputWriter) -> Result<()> {
    let repo = open_repo(root)?;

    let history = repo.history().with_context(|| "Failed to resolve HEAD")?;
    let mut commits = Vec::new();
    for entry in history.take(max_count.unwrap_or(usize::MAX)) {
        let (hash, commit) = entry.with_context(|| "Failed to read commit")?;
        commits.push(log_entry(hash, &commit));
    }

    let data = LogOutput {
        success: true,
        result_code: 0,
        commits,
    };

    output.write(&data, || render_commits(&data.commits))
}

fn render_commits(commits: &[LogEntry]) -> String {
    let mut text = String::new();
    for commit in commits {
        let _ = writeln!(text, "commit {}", commit.hash);
        let _ = writeln!(text, "Author: {} <{}>", commit.author, commit.email);
        let _ = writeln!(
            text,
            "Date:   {}",
            commit.timestamp.format("%a %b %e %H:%M:%S %Y %z")
        );
        text.push('\n');
        for line in commit.message.lines() {
            let _ = writeln!(text, "    {}", line);
        }
        text.push('\n');
    }
    text
}

fn cmd_search(root: &Path, filter: CommitFilter, output: &OutputWriter) -> Result<()> {
    let repo = open_repo(root)?;

    let found = repo
        .search_commits(&filter)
        .with_context(|| "Failed to search commits")?;
    let data = SearchOutput {
        success: true,
        result_code: 0,
        commits: found
            .iter()
            .map(|(hash, commit)| log_entry(*hash, commit))
            .collect(),
    };

    output.write(&data, || {
        if data.commits.is_empty() {
            return "No commits found.\n".to_string();
        }
        render_commits(&data.commits)
    })
}

fn cmd_gc(root: &Path, output: &OutputWriter) -> Result<()> {
    let repo = open_repo(root)?;

    let stats = repo.gc().with_context(|| "Failed to pack objects")?;
    let data = GcOutput {
        success: true,
        result_code: 0,
        pack_hash: stats.pack_hash,
        objects_packed: stats.objects_packed,
        deltas: stats.deltas,
        pack_size: stats.pack_size,
        bytes_freed: stats.bytes_freed,
    };

    output.write(&data, || {
        format!(
            "Packed {} objects ({} deltas)\nPack: pack-{}.pack ({} bytes)\nFreed {} bytes of loose objects\n",
            data.objects_packed, data.deltas, data.pack_hash, data.pack_size, data.bytes_freed
        )
    })
}

fn cmd_cat_object(root: &Path, hash_str: &str, output: &OutputWriter) -> Result<()> {
    let repo = open_repo(root)?;

    let hash = Hash::from_hex(hash_str).with_context(|| format!("Invalid hash: {}", hash_str))?;
    let object = repo
        .read_object(&hash)
        .with_context(|| format!("Failed to read object {}", hash))?;

    if output.is_json() {
        let data = match &object {
            Object::Blob(blob) => ObjectData::Blob {
                size: blob.content().len() as u64,
                content: String::from_utf8_lossy(blob.content()).into_owned(),
            },
            Object::Tree(tree) => ObjectData::Tree {
                entries: tree
                    .entries()
                    .iter()
                    .map(|e| TreeEntryInfo {
                        mode: e.mode.clone(),
                        name: e.name.clone(),
                        hash: e.hash,
                    })
                    .collect(),
            },
            Object::Commit(commit) => ObjectData::Commit(CommitInfo {
                tree: commit.tree(),
                parent: commit.parent(),
                author: commit.author().to_string(),
                email: commit.email().to_string(),
                timestamp: commit.timestamp(),
                message: commit.message().to_string(),
            }),
        };
        let data = CatObjectOutput {
            success: true,
            result_code: 0,
            hash,
            data,
        };
        return output.write(&data, String::new);
    }

    // Blob content goes out byte-for-byte.
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match object {
        Object::Blob(blob) => out.write_all(blob.content())?,
        Object::Tree(tree) => {
            for entry in tree.entries() {
                writeln!(out, "{} blob {}\t{}", entry.mode, entry.hash, entry.name)?;
            }
        }
        Object::Commit(commit) => {
            writeln!(out, "tree {}", commit.tree())?;
            if let Some(parent) = commit.parent() {
                writeln!(out, "parent {}", parent)?;
            }
            writeln!(out, "author {} <{}>", commit.author(), commit.email())?;
            writeln!(out, "date {}", commit.timestamp().to_rfc3339())?;
            writeln!(out)?;
            writeln!(out, "{}", commit.message())?;
        }
    }

    Ok(())
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or("")
}
