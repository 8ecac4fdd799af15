use anchorpatch::runner::{run, RuleReport, RunOptions, RunOutcome};
use anchorpatch::load_from_path;
use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "anchorpatch")]
#[command(about = "Anchor-guided line patching for semi-structured text files", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply rule sets to a project
    Apply {
        /// Project root (defaults to ANCHORPATCH_ROOT, then the current directory)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Specific rule file to apply (otherwise all in patches/)
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Run pipelines without writing anything back
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show a unified diff of each changed file
        #[arg(short, long)]
        diff: bool,

        /// Version checked against each set's version-range
        #[arg(long)]
        target_version: Option<String>,
    },

    /// Check rule status without modifying anything
    Status {
        #[arg(short, long)]
        root: Option<PathBuf>,

        #[arg(long)]
        rules: Option<PathBuf>,

        /// Emit a machine-readable JSON report
        #[arg(long)]
        json: bool,

        #[arg(long)]
        target_version: Option<String>,
    },

    /// List discovered rule sets and their rules
    List {
        #[arg(short, long)]
        root: Option<PathBuf>,

        #[arg(long)]
        rules: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            root,
            rules,
            dry_run,
            diff,
            target_version,
        } => cmd_apply(root, rules, dry_run, diff, target_version),
        Commands::Status {
            root,
            rules,
            json,
            target_version,
        } => cmd_status(root, rules, json, target_version),
        Commands::List { root, rules } => cmd_list(root, rules),
    }
}

/// Resolve the project root: explicit flag, then ANCHORPATCH_ROOT, then
/// the current directory.
fn resolve_root(cli_root: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_root {
        return Ok(path.canonicalize()?);
    }

    if let Ok(env_root) = env::var("ANCHORPATCH_ROOT") {
        let path = PathBuf::from(&env_root);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!("Warning: ANCHORPATCH_ROOT is set but does not exist: {env_root}").yellow()
        );
    }

    Ok(env::current_dir()?)
}

/// Discover rule files: `<root>/patches/*.toml`, falling back to
/// `./patches` so the tool can run from a checkout that keeps rule files
/// next to it rather than inside the target project.
fn discover_rule_files(root: &Path) -> Result<Vec<PathBuf>> {
    let candidates = [
        root.join("patches"),
        env::current_dir().map(|cwd| cwd.join("patches"))?,
    ];

    for dir in candidates {
        if !dir.is_dir() {
            continue;
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                files.push(entry.path().to_path_buf());
            }
        }
        files.sort();

        if !files.is_empty() {
            return Ok(files);
        }
    }

    anyhow::bail!(
        "no .toml rule files found in {}/patches or ./patches",
        root.display()
    )
}

fn rule_files(root: &Path, explicit: Option<PathBuf>) -> Result<Vec<PathBuf>> {
    match explicit {
        Some(path) => Ok(vec![path]),
        None => discover_rule_files(root),
    }
}

fn cmd_apply(
    root: Option<PathBuf>,
    rules: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
    target_version: Option<String>,
) -> Result<()> {
    let root = resolve_root(root)?;
    let rule_files = rule_files(&root, rules)?;

    println!("Root: {}", root.display());
    if let Some(version) = &target_version {
        println!("Target version: {version}");
    }
    println!();

    let options = RunOptions {
        dry_run,
        target_version,
    };

    let mut applied = 0;
    let mut already = 0;
    let mut skipped = 0;
    let mut failed = 0;

    for rule_file in rule_files {
        println!("Loading rules from {}...", rule_file.display());
        if dry_run {
            println!("{}", "  [DRY RUN - nothing will be written]".cyan());
        }

        let set = load_from_path(&rule_file)?.compile()?;

        // Capture target contents up front so --diff can show what changed.
        let mut before: HashMap<PathBuf, String> = HashMap::new();
        if show_diff {
            for group in &set.files {
                let path = if set.meta.root_relative {
                    root.join(&group.file)
                } else {
                    PathBuf::from(&group.file)
                };
                if let Ok(content) = fs::read_to_string(&path) {
                    before.insert(path, content);
                }
            }
        }

        for report in run(&set, &root, &options) {
            match &report.outcome {
                RunOutcome::Applied { file, detail } => {
                    let verb = if dry_run { "Would apply" } else { "Applied" };
                    println!(
                        "{} {}: {verb} to {} ({detail})",
                        "✓".green(),
                        report.id,
                        file.display()
                    );
                    applied += 1;

                    if show_diff && !dry_run {
                        if let Some(old) = before.get(file) {
                            if let Ok(new) = fs::read_to_string(file) {
                                if *old != new {
                                    display_diff(file, old, &new);
                                }
                            }
                        }
                    }
                }
                RunOutcome::AlreadyApplied { file } => {
                    println!(
                        "{} {}: Already applied to {}",
                        "⊙".yellow(),
                        report.id,
                        file.display()
                    );
                    already += 1;
                }
                RunOutcome::SkippedVersion { reason } => {
                    println!("{} {}: Skipped ({reason})", "⊘".cyan(), report.id);
                    skipped += 1;
                }
                RunOutcome::Failed { file, reason } => {
                    eprintln!("{} {}: Failed - {reason}", "✗".red(), report.id);
                    if let Some(file) = file {
                        eprintln!("  File: {}", file.display());
                    }
                    print_remediation(reason);
                    failed += 1;
                }
            }
        }
        println!();
    }

    println!("{}", "Summary:".bold());
    println!("  {} applied", applied.to_string().green());
    println!("  {} already applied", already.to_string().yellow());
    println!("  {} skipped", skipped.to_string().cyan());
    println!("  {} failed", failed.to_string().red());

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Hints for the two failure modes that usually mean the rule file is
/// stale rather than the target broken.
fn print_remediation(reason: &str) {
    if reason.contains("anchor not found") {
        eprintln!("  Possible causes:");
        eprintln!("    - The anchored line was renamed or removed");
        eprintln!("    - An earlier rule should have reset the search cursor (from-start)");
    } else if reason.contains("ambiguous") {
        eprintln!("  Action: add or tighten a lookahead to single out one site");
    }
}

fn cmd_status(
    root: Option<PathBuf>,
    rules: Option<PathBuf>,
    json: bool,
    target_version: Option<String>,
) -> Result<()> {
    let root = resolve_root(root)?;
    let rule_files = rule_files(&root, rules)?;

    let options = RunOptions {
        dry_run: true,
        target_version,
    };

    let mut all_reports: Vec<RuleReport> = Vec::new();
    for rule_file in &rule_files {
        let set = load_from_path(rule_file)?.compile()?;
        all_reports.extend(run(&set, &root, &options));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&all_reports)?);
        return Ok(());
    }

    println!("{}", "Rule Status Report".bold());
    println!("Root: {}", root.display());
    println!();

    let mut pending = Vec::new();
    let mut applied = Vec::new();
    let mut other = Vec::new();

    for report in all_reports {
        match &report.outcome {
            RunOutcome::Applied { .. } => pending.push(report),
            RunOutcome::AlreadyApplied { .. } => applied.push(report),
            _ => other.push(report),
        }
    }

    if !applied.is_empty() {
        println!("{} {} ({})", "✓".green(), "APPLIED".green().bold(), applied.len());
        for report in &applied {
            println!("  - {}", report.id);
        }
        println!();
    }

    if !pending.is_empty() {
        println!(
            "{} {} ({})",
            "⊙".yellow(),
            "PENDING".yellow().bold(),
            pending.len()
        );
        for report in &pending {
            println!("  - {} (would change the target)", report.id);
        }
        println!();
    }

    if !other.is_empty() {
        println!(
            "{} {} ({})",
            "✗".red(),
            "SKIPPED / FAILED".red().bold(),
            other.len()
        );
        for report in &other {
            println!("  - {} ({})", report.id, report.outcome.to_string().dimmed());
        }
        println!();
    }

    Ok(())
}

fn cmd_list(root: Option<PathBuf>, rules: Option<PathBuf>) -> Result<()> {
    let root = resolve_root(root)?;
    let rule_files = rule_files(&root, rules)?;

    for rule_file in &rule_files {
        let set = load_from_path(rule_file)?;
        let name = if set.meta.name.is_empty() {
            rule_file.display().to_string()
        } else {
            set.meta.name.clone()
        };

        println!("{} ({})", name.bold(), rule_file.display());
        if let Some(description) = &set.meta.description {
            println!("  {description}");
        }
        if let Some(range) = &set.meta.version_range {
            println!("  version-range: {range}");
        }
        for rule in &set.rules {
            println!("  - {} -> {}", rule.id, rule.file);
        }
        println!();
    }

    Ok(())
}

/// Unified diff between the original and patched content.
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!("{}", format!("--- {} (original)", file.display()).dimmed());
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);
    for change in diff.iter_all_changes() {
        let line = match change.tag() {
            ChangeTag::Delete => format!("-{change}").red(),
            ChangeTag::Insert => format!("+{change}").green(),
            ChangeTag::Equal => format!(" {change}").normal(),
        };
        print!("{line}");
    }
}
