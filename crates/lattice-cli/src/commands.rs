//! CLI command implementations.

use crate::ConfigOverrides;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use lattice_core::{GraphNode, NodeId, NodeType, ProjectId, TreeSitterExtractor};
use lattice_graph::{GraphStore, NameOptions, QueryEngine, SearchOptions, SledStore};
use lattice_indexer::{
    BuildContext, IndexConfig, IndexReport, Indexer, ProjectWatcher, UpdateContext,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// An opened project: its config and graph database.
struct Workspace {
    root: PathBuf,
    config: IndexConfig,
    store: Arc<SledStore>,
}

impl Workspace {
    fn open(root: &Path) -> Result<Self> {
        let config = IndexConfig::load(root)?;
        let db = IndexConfig::database_path(root);
        debug!("Opening graph database at {}", db.display());
        let store = Arc::new(SledStore::open(&db)?);
        Ok(Self {
            root: root.to_path_buf(),
            config,
            store,
        })
    }

    fn project(&self) -> &ProjectId {
        &self.config.project_id
    }

    fn engine(&self) -> QueryEngine<SledStore> {
        QueryEngine::new(Arc::clone(&self.store))
    }

    fn indexer(&self) -> Result<Indexer<SledStore>> {
        let extractor = TreeSitterExtractor::new()?;
        Ok(Indexer::new(Arc::clone(&self.store), Arc::new(extractor)))
    }

    /// Resolves a node argument: a storage id, or an exact name.
    fn resolve_node(&self, engine: &QueryEngine<SledStore>, arg: &str) -> Result<NodeId> {
        if let Ok(raw) = arg.parse::<u64>() {
            return Ok(NodeId(raw));
        }

        let found = engine.find_nodes_by_name(self.project(), arg, NameOptions::default())?;
        match found.as_slice() {
            [] => Err(format!("node '{}' not found", arg).into()),
            [only] => Ok(only.node.id),
            [first, ..] => {
                eprintln!(
                    "{} '{}' matches {} nodes, using {}",
                    "note:".yellow(),
                    arg,
                    found.len(),
                    first.node.key()
                );
                Ok(first.node.id)
            }
        }
    }
}

fn apply_overrides(config: &mut IndexConfig, overrides: &ConfigOverrides) {
    if let Some(project) = &overrides.project {
        config.project_id = ProjectId::new(project.clone());
    }
    if !overrides.include.is_empty() {
        config.include = overrides.include.clone();
    }
    if !overrides.exclude.is_empty() {
        config.exclude = overrides.exclude.clone();
    }
    if !overrides.languages.is_empty() {
        config.languages = overrides.languages.clone();
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn spinner(message: &'static str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message);
    Ok(spinner)
}

fn print_node(node: &GraphNode) {
    println!(
        "  {} {} {} {}",
        node.node_type().to_string().yellow(),
        node.name().cyan(),
        format!("({}:{})", node.file_path(), node.entity.location.start_line).dimmed(),
        format!("#{}", node.id).dimmed()
    );
}

fn print_report(action: &str, report: &IndexReport, json: bool) -> Result<()> {
    if json {
        print_json(report)?;
    } else if report.success {
        println!(
            "{} {} version {}: {} nodes, {} edges affected ({} operations) in {}ms",
            "✓".green(),
            action,
            report
                .version_number
                .map(|n| n.to_string())
                .unwrap_or_default()
                .cyan(),
            report.nodes_affected.to_string().cyan(),
            report.edges_affected.to_string().cyan(),
            report.operations_applied,
            report.execution_time_ms
        );
    }

    if !json && !report.errors.is_empty() {
        println!("\n{} {} problems:", "⚠".yellow(), report.errors.len());
        for issue in report.errors.iter().take(5) {
            println!("  {}", issue.to_string().red());
        }
        if report.errors.len() > 5 {
            println!("  ... and {} more", report.errors.len() - 5);
        }
    }

    if report.success {
        Ok(())
    } else {
        let reason = report
            .errors
            .last()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown failure".to_string());
        Err(format!("{} failed: {}", action.to_lowercase(), reason).into())
    }
}

/// Initialize Lattice in a directory.
pub fn init(root: &Path, overrides: &ConfigOverrides) -> Result<()> {
    let config_path = IndexConfig::path(root);
    if config_path.exists() {
        println!("{} Already initialized", "✓".green());
        return Ok(());
    }

    let mut config = IndexConfig::for_root(root);
    apply_overrides(&mut config, overrides);
    config.save(root)?;

    println!(
        "{} Initialized project {} in {}",
        "✓".green(),
        config.project_id.to_string().cyan(),
        root.display()
    );
    println!("  Run {} to index your codebase", "lattice build".cyan());

    Ok(())
}

/// Build a new version from the whole source tree.
pub fn build(root: &Path, overrides: &ConfigOverrides, json: bool) -> Result<()> {
    let mut workspace = Workspace::open(root)?;
    apply_overrides(&mut workspace.config, overrides);
    let indexer = workspace.indexer()?;

    let spinner = spinner("Indexing codebase...")?;
    let report = indexer.build(&BuildContext::from_config(&workspace.root, &workspace.config));
    spinner.finish_and_clear();

    let report = report?;
    workspace.store.flush()?;
    print_report("Built", &report, json)
}

/// Apply changed files to the current (or a pinned) version.
pub fn update(root: &Path, files: &[PathBuf], base: Option<u64>, json: bool) -> Result<()> {
    let workspace = Workspace::open(root)?;
    let indexer = Arc::new(workspace.indexer()?);
    let watcher = ProjectWatcher::new(Arc::clone(&indexer), &workspace.root, &workspace.config)?;

    let paths: Vec<PathBuf> = files
        .iter()
        .map(|f| {
            if f.is_absolute() {
                f.clone()
            } else {
                watcher.root().join(f)
            }
        })
        .collect();
    let changes = watcher.changes_for_paths(&paths)?;
    if changes.is_empty() {
        println!("Nothing to update");
        return Ok(());
    }

    let base_version = match base {
        Some(number) => {
            let versions = workspace.engine().list_versions(workspace.project())?;
            let version = versions
                .into_iter()
                .find(|v| v.version_number == number)
                .ok_or_else(|| format!("version {} not found", number))?;
            Some(version.id)
        }
        None => None,
    };

    let spinner = spinner("Updating graph...")?;
    let report = indexer.update(
        workspace.project(),
        &changes,
        &UpdateContext { base_version },
    );
    spinner.finish_and_clear();

    let report = report?;
    workspace.store.flush()?;
    print_report("Updated", &report, json)
}

/// Search nodes by name and purpose.
pub fn search(
    root: &Path,
    query: &str,
    node_types: &[String],
    limit: usize,
    threshold: f64,
    names_only: bool,
    json: bool,
) -> Result<()> {
    let workspace = Workspace::open(root)?;
    let engine = workspace.engine();

    if names_only {
        let options = NameOptions {
            fuzzy: true,
            threshold,
        };
        let mut found = engine.find_nodes_by_name(workspace.project(), query, options)?;
        found.truncate(limit);
        if json {
            return print_json(&found);
        }
        if found.is_empty() {
            println!("No matches found for \"{}\"", query);
            return Ok(());
        }
        println!("Found {} matches:\n", found.len());
        for m in &found {
            print_node(&m.node);
            println!("    {}", format!("similarity {:.2}", m.similarity).dimmed());
        }
        return Ok(());
    }

    let node_types = node_types
        .iter()
        .map(|t| t.parse::<NodeType>())
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let options = SearchOptions {
        node_types,
        limit,
        fuzzy_threshold: threshold,
    };
    let hits = engine.search_nodes(workspace.project(), query, &options)?;

    if json {
        return print_json(&hits);
    }
    if hits.is_empty() {
        println!("No matches found for \"{}\"", query);
        return Ok(());
    }

    println!("Found {} matches:\n", hits.len());
    for hit in &hits {
        print_node(&hit.node);
        println!(
            "    {}",
            format!("{:.2} ({})", hit.score, hit.match_reason.as_str()).dimmed()
        );
        if let Some(purpose) = &hit.node.entity.purpose {
            println!("    {}", purpose.dimmed());
        }
    }

    Ok(())
}

/// Show the callers of a node.
pub fn callers(root: &Path, node: &str, json: bool) -> Result<()> {
    let workspace = Workspace::open(root)?;
    let engine = workspace.engine();
    let id = workspace.resolve_node(&engine, node)?;
    let found = engine.find_callers(id)?;
    list_nodes(&found, &format!("Callers of {}", node), json)
}

/// Show the callees of a node.
pub fn callees(root: &Path, node: &str, json: bool) -> Result<()> {
    let workspace = Workspace::open(root)?;
    let engine = workspace.engine();
    let id = workspace.resolve_node(&engine, node)?;
    let found = engine.find_callees(id)?;
    list_nodes(&found, &format!("Callees of {}", node), json)
}

fn list_nodes(nodes: &[GraphNode], title: &str, json: bool) -> Result<()> {
    if json {
        return print_json(nodes);
    }
    println!("{} ({})", title.bold(), nodes.len());
    for node in nodes {
        print_node(node);
    }
    Ok(())
}

/// Show transitive dependencies of a node.
pub fn deps(root: &Path, node: &str, depth: usize, json: bool) -> Result<()> {
    let workspace = Workspace::open(root)?;
    let engine = workspace.engine();
    let id = workspace.resolve_node(&engine, node)?;
    let found = engine.find_dependencies(id, Some(depth))?;

    if json {
        return print_json(&found);
    }
    println!("{} ({})", format!("Dependencies of {}", node).bold(), found.len());
    for dependency in &found {
        print_node(&dependency.node);
        println!(
            "    {}",
            format!("depth {} via {}", dependency.depth, dependency.via).dimmed()
        );
    }
    Ok(())
}

/// Find the shortest dependency path between two nodes.
pub fn path(root: &Path, from: &str, to: &str, depth: usize, json: bool) -> Result<()> {
    let workspace = Workspace::open(root)?;
    let engine = workspace.engine();
    let from_id = workspace.resolve_node(&engine, from)?;
    let to_id = workspace.resolve_node(&engine, to)?;
    let found = engine.find_path(from_id, to_id, Some(depth))?;

    if json {
        return print_json(&found);
    }
    let Some(found) = found else {
        println!("No path from {} to {} within {} hops", from, to, depth);
        return Ok(());
    };

    println!("{} ({} hops)", "Path".bold(), found.length);
    for (i, node) in found.path.iter().enumerate() {
        if let Some(edge) = i.checked_sub(1).and_then(|e| found.edges.get(e)) {
            println!("    {} {}", "↓".dimmed(), edge.edge_type.to_string().dimmed());
        }
        print_node(node);
    }
    Ok(())
}

/// Preview what a change to a node affects.
pub fn impact(root: &Path, node: &str, json: bool) -> Result<()> {
    let workspace = Workspace::open(root)?;
    let engine = workspace.engine();
    let id = workspace.resolve_node(&engine, node)?;
    let analysis = engine.analyze_impact(id)?;

    if json {
        return print_json(&analysis);
    }

    println!("{}", "Impact".yellow().bold());
    println!(
        "Target: {} ({})",
        analysis.target.name().cyan(),
        analysis.target.node_type()
    );
    println!(
        "Risk: {} | Total: {} nodes in {} files",
        analysis.risk_level.to_string().red().bold(),
        analysis.total_affected.to_string().bold(),
        analysis.affected_files.len()
    );
    println!();

    if !analysis.directly_affected.is_empty() {
        println!("{}", "Direct (1 hop):".red());
        for affected in analysis.directly_affected.iter().take(10) {
            println!(
                "  • {} ({}) {} {}",
                affected.node.name(),
                affected.node.node_type(),
                affected.direction.to_string().dimmed(),
                affected.entry_edge.to_string().dimmed()
            );
        }
        if analysis.directly_affected.len() > 10 {
            println!("  ... and {} more", analysis.directly_affected.len() - 10);
        }
        println!();
    }

    if !analysis.indirectly_affected.is_empty() {
        println!("{}", "Indirect (2-3 hops):".yellow());
        for affected in analysis.indirectly_affected.iter().take(5) {
            println!(
                "  • {} {}",
                affected.node.name(),
                format!("{} hops, {}", affected.hop_distance, affected.direction).dimmed()
            );
        }
        if analysis.indirectly_affected.len() > 5 {
            println!("  ... and {} more", analysis.indirectly_affected.len() - 5);
        }
        println!();
    }

    println!("Query time: {}ms", analysis.query_time_ms);
    Ok(())
}

/// Rank the most central nodes.
pub fn bottlenecks(root: &Path, limit: Option<usize>, json: bool) -> Result<()> {
    let workspace = Workspace::open(root)?;
    let ranked = workspace.engine().find_bottlenecks(workspace.project(), limit)?;

    if json {
        return print_json(&ranked);
    }
    println!("{}", "Bottlenecks".bold());
    for (rank, bottleneck) in ranked.iter().enumerate() {
        println!(
            "{:>3}. {} {} {}",
            rank + 1,
            format!("{:.2}", bottleneck.centrality).cyan(),
            bottleneck.node.name(),
            format!(
                "({} connections, {})",
                bottleneck.total_connections,
                bottleneck.node.file_path()
            )
            .dimmed()
        );
    }
    Ok(())
}

/// List dependency cycles.
pub fn cycles(root: &Path, json: bool) -> Result<()> {
    let workspace = Workspace::open(root)?;
    let found = workspace
        .engine()
        .find_circular_dependencies(workspace.project())?;

    if json {
        return print_json(&found);
    }
    if found.is_empty() {
        println!("{} No cycles", "✓".green());
        return Ok(());
    }

    println!("{} {} cycles:", "⚠".yellow(), found.len());
    for cycle in &found {
        let mut names: Vec<&str> = cycle.nodes.iter().map(|n| n.name()).collect();
        if let Some(first) = names.first().copied() {
            names.push(first);
        }
        println!("  [{}] {}", cycle.severity, names.join(" → "));
    }
    Ok(())
}

/// Show statistics of the current version.
pub fn stats(root: &Path, json: bool) -> Result<()> {
    let workspace = Workspace::open(root)?;
    let statistics = workspace.engine().statistics(workspace.project())?;

    if json {
        return print_json(&statistics);
    }
    println!("{}", format!("Project {}", statistics.project_id).bold());
    println!("  Version:    {}", statistics.version_number.to_string().cyan());
    println!("  Created:    {}", statistics.version_created.to_rfc3339());
    println!("  Files:      {}", statistics.total_files);
    println!("  Nodes:      {}", statistics.total_nodes);
    println!("  Edges:      {}", statistics.total_edges);
    println!("  Complexity: {:.2} avg", statistics.average_complexity);
    Ok(())
}

/// List committed versions.
pub fn versions(root: &Path, json: bool) -> Result<()> {
    let workspace = Workspace::open(root)?;
    let versions = workspace.engine().list_versions(workspace.project())?;

    if json {
        return print_json(&versions);
    }
    for version in &versions {
        let checksum: String = version.checksum.chars().take(12).collect();
        println!(
            "  {:>4}  {}  {}  {} operations",
            version.version_number.to_string().cyan(),
            version.created_at.format("%Y-%m-%d %H:%M:%S"),
            checksum.dimmed(),
            version.operations_count
        );
    }
    Ok(())
}

/// Watch the root and apply every change as an update.
pub async fn watch(root: &Path, json: bool) -> Result<()> {
    let workspace = Workspace::open(root)?;
    let indexer = Arc::new(workspace.indexer()?);

    if workspace.store.current_version(workspace.project())?.is_none() {
        println!("{}", "No version yet, building first...".cyan());
        let report =
            indexer.build(&BuildContext::from_config(&workspace.root, &workspace.config))?;
        print_report("Built", &report, json)?;
    }

    let watcher = ProjectWatcher::new(Arc::clone(&indexer), &workspace.root, &workspace.config)?;
    println!(
        "{} Watching {}",
        "✓".green(),
        watcher.root().display().to_string().cyan()
    );
    println!("  Press {} to stop", "Ctrl+C".cyan());

    let store = Arc::clone(&workspace.store);
    let on_report = |report: &IndexReport| {
        if let Err(e) = store.flush() {
            warn!("Failed to flush the graph database: {}", e);
        }
        if let Err(e) = print_report("Updated", report, json) {
            eprintln!("{} {}", "error:".red().bold(), e);
        }
    };

    tokio::select! {
        result = watcher.run(on_report) => result?,
        _ = tokio::signal::ctrl_c() => println!("\nStopped"),
    }

    workspace.store.flush()?;
    Ok(())
}
