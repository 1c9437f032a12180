//! Lattice CLI - Command-line interface for Lattice
//!
//! Builds and updates the versioned code graph of a project and answers
//! structural queries about it. The graph lives in `.lattice/db` under the
//! project root.

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "lattice")]
#[command(version)]
#[command(about = "Versioned code property graphs for your codebase", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project root (defaults to current directory)
    #[arg(short = 'C', long, global = true, default_value = ".")]
    root: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides of the stored project config.
#[derive(Args, Clone, Default)]
pub struct ConfigOverrides {
    /// Project id
    #[arg(short, long)]
    project: Option<String>,

    /// Include glob (repeatable)
    #[arg(long = "include")]
    include: Vec<String>,

    /// Exclude glob (repeatable)
    #[arg(long = "exclude")]
    exclude: Vec<String>,

    /// Language allow-list entry (repeatable)
    #[arg(long = "language")]
    languages: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize Lattice in the project root
    Init {
        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Build a new version of the graph from the whole source tree
    Build {
        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Apply changed or deleted files to the current version
    Update {
        /// Files that changed; missing files are treated as deleted
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Version number to apply the changes to (defaults to current)
        #[arg(long)]
        base: Option<u64>,
    },

    /// Search nodes by name and purpose
    Search {
        query: String,

        /// Only nodes of this type (repeatable): function, class, variable, module
        #[arg(short = 't', long = "type")]
        node_types: Vec<String>,

        /// Maximum results to return
        #[arg(short, long, default_value_t = lattice_graph::DEFAULT_SEARCH_LIMIT)]
        limit: usize,

        /// Minimum similarity
        #[arg(long, default_value_t = lattice_graph::DEFAULT_FUZZY_THRESHOLD)]
        threshold: f64,

        /// Match names only, without purpose text
        #[arg(long)]
        names: bool,
    },

    /// Show the nodes that call a node
    Callers {
        /// Node id or exact name
        node: String,
    },

    /// Show the nodes a node calls
    Callees {
        /// Node id or exact name
        node: String,
    },

    /// Show what a node depends on, transitively
    Deps {
        /// Node id or exact name
        node: String,

        /// Maximum depth
        #[arg(short, long, default_value_t = lattice_graph::DEFAULT_DEPENDENCY_DEPTH)]
        depth: usize,
    },

    /// Find the shortest dependency path between two nodes
    Path {
        /// Source node id or exact name
        from: String,

        /// Target node id or exact name
        to: String,

        /// Maximum path length
        #[arg(short, long, default_value_t = lattice_graph::DEFAULT_PATH_DEPTH)]
        depth: usize,
    },

    /// Preview what a change to a node affects
    Impact {
        /// Node id or exact name
        node: String,
    },

    /// Rank the most central nodes
    Bottlenecks {
        /// Maximum results to return
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List dependency cycles
    Cycles,

    /// Show statistics of the current version
    Stats,

    /// List committed versions
    Versions,

    /// Watch the project root and update the graph on every change
    Watch,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let root = cli.root.as_path();
    let json = cli.json;
    let result = match cli.command {
        Commands::Init { overrides } => commands::init(root, &overrides),
        Commands::Build { overrides } => commands::build(root, &overrides, json),
        Commands::Update { files, base } => commands::update(root, &files, base, json),
        Commands::Search {
            query,
            node_types,
            limit,
            threshold,
            names,
        } => commands::search(root, &query, &node_types, limit, threshold, names, json),
        Commands::Callers { node } => commands::callers(root, &node, json),
        Commands::Callees { node } => commands::callees(root, &node, json),
        Commands::Deps { node, depth } => commands::deps(root, &node, depth, json),
        Commands::Path { from, to, depth } => commands::path(root, &from, &to, depth, json),
        Commands::Impact { node } => commands::impact(root, &node, json),
        Commands::Bottlenecks { limit } => commands::bottlenecks(root, limit, json),
        Commands::Cycles => commands::cycles(root, json),
        Commands::Stats => commands::stats(root, json),
        Commands::Versions => commands::versions(root, json),
        Commands::Watch => commands::watch(root, json).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
