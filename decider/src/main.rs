//! Definition tooling for the behavior arbitration engine.
//!
//! Parses and validates decision-tree definition files, prints the resolved
//! tree, and lists declared roots. Execution itself is embedded by an
//! integrator binding behaviors through [`decider::behavior`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

use decider::exit_codes;
use decider::io::config::{DeciderConfig, load_config};
use decider::io::loader::load_tree;
use decider::tree::{ActionElement, ElementId, Tree, TreeElement};

#[derive(Parser)]
#[command(
    name = "decider",
    version,
    about = "Behavior-tree definition parser and inspector"
)]
struct Cli {
    /// Config file consulted when no definition files are given.
    #[arg(long, default_value = "decider.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse definition files and validate structure and references.
    Check {
        /// Definition files sharing one namespace; defaults to the config's.
        files: Vec<PathBuf>,
    },
    /// Print the resolved tree in definition syntax.
    Show {
        /// Definition files sharing one namespace; defaults to the config's.
        files: Vec<PathBuf>,
        /// Print only this declared root.
        #[arg(long)]
        root: Option<String>,
    },
    /// List declared roots, default root marked.
    Roots {
        /// Definition files sharing one namespace; defaults to the config's.
        files: Vec<PathBuf>,
    },
}

fn main() {
    decider::logging::init();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(exit_codes::INVALID);
    }
    std::process::exit(exit_codes::OK);
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Check { files } => cmd_check(&cli.config, files),
        Command::Show { files, root } => cmd_show(&cli.config, files, root.as_deref()),
        Command::Roots { files } => cmd_roots(&cli.config, files),
    }
}

/// Definition files from the command line, falling back to the config.
fn resolve_definitions(config_path: &Path, files: Vec<PathBuf>) -> Result<(Vec<PathBuf>, DeciderConfig)> {
    let cfg = load_config(config_path)?;
    if files.is_empty() {
        Ok((cfg.definitions.clone(), cfg))
    } else {
        Ok((files, cfg))
    }
}

fn cmd_check(config_path: &Path, files: Vec<PathBuf>) -> Result<()> {
    let (files, _) = resolve_definitions(config_path, files)?;
    let tree = load_tree(&files).context("definition check failed")?;
    println!(
        "ok: {} elements, {} roots, default root '{}'",
        tree.len(),
        tree.roots().len(),
        tree.element(tree.root_element()).name()
    );
    Ok(())
}

fn cmd_show(config_path: &Path, files: Vec<PathBuf>, only_root: Option<&str>) -> Result<()> {
    let (files, cfg) = resolve_definitions(config_path, files)?;
    let tree = load_tree(&files)?;
    let only_root = only_root.or(cfg.start_element.as_deref());
    match only_root {
        Some(name) => {
            let id = tree
                .root_named(name)
                .ok_or_else(|| anyhow!("no declared root named '{name}'"))?;
            print!("{}", render_block(&tree, name, id));
        }
        None => {
            for (name, &id) in tree.roots() {
                print!("{}", render_block(&tree, name, id));
                println!();
            }
            println!("--> {}", tree.element(tree.root_element()).name());
        }
    }
    Ok(())
}

fn cmd_roots(config_path: &Path, files: Vec<PathBuf>) -> Result<()> {
    let (files, _) = resolve_definitions(config_path, files)?;
    let tree = load_tree(&files)?;
    let default = tree.root_element();
    for (name, &id) in tree.roots() {
        if id == default {
            println!("{name} (default)");
        } else {
            println!("{name}");
        }
    }
    Ok(())
}

/// Render one root block back in definition syntax. Spliced sub-behaviors
/// print as `#Name` references, matching how they were declared.
fn render_block(tree: &Tree, name: &str, id: ElementId) -> String {
    let mut out = String::new();
    out.push_str(&format!("${name}\n"));
    render_branches(tree, id, 1, &mut out);
    out
}

fn render_branches(tree: &Tree, id: ElementId, depth: usize, out: &mut String) {
    let Some(decision) = tree.element(id).as_decision() else {
        return;
    };
    let indent = "    ".repeat(depth);
    for (label, &child) in &decision.children {
        let spliced_root = tree
            .roots()
            .iter()
            .find(|&(_, &root)| root == child)
            .map(|(root_name, _)| root_name.clone());
        match (spliced_root, tree.element(child)) {
            (Some(root_name), _) => {
                out.push_str(&format!("{indent}{label} --> #{root_name}\n"));
            }
            (None, TreeElement::Action(action)) => {
                out.push_str(&format!("{indent}{label} --> {}\n", render_action(action)));
            }
            (None, TreeElement::Sequence(sequence)) => {
                let items: Vec<String> = sequence
                    .action_elements
                    .iter()
                    .filter_map(|&member| tree.element(member).as_action())
                    .map(render_action)
                    .collect();
                out.push_str(&format!("{indent}{label} --> {}\n", items.join(", ")));
            }
            (None, TreeElement::Decision(nested)) => {
                out.push_str(&format!("{indent}{label} --> ${}\n", nested.name));
                render_branches(tree, child, depth + 1, out);
            }
        }
    }
}

fn render_action(action: &ActionElement) -> String {
    let mut rendered = format!("@{}", action.name);
    for (key, value) in &action.parameters {
        rendered.push_str(&format!(" {key}={value}"));
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use decider::core::parse::parse_definition;

    #[test]
    fn parse_check() {
        let cli = Cli::parse_from(["decider", "check", "behavior.tree"]);
        assert!(matches!(cli.command, Command::Check { files } if files.len() == 1));
    }

    #[test]
    fn parse_show_with_root() {
        let cli = Cli::parse_from(["decider", "show", "--root", "Main", "a.tree", "b.tree"]);
        match cli.command {
            Command::Show { files, root } => {
                assert_eq!(files.len(), 2);
                assert_eq!(root.as_deref(), Some("Main"));
            }
            _ => panic!("expected show"),
        }
    }

    #[test]
    fn empty_files_fall_back_to_config_definitions() {
        // Missing config file resolves to the built-in defaults.
        let config_path = Path::new("does-not-exist/decider.toml");
        let (files, _) = resolve_definitions(config_path, Vec::new()).expect("resolve");
        assert_eq!(files, DeciderConfig::default().definitions);
    }

    #[test]
    fn explicit_files_win_over_config() {
        let config_path = Path::new("does-not-exist/decider.toml");
        let explicit = vec![PathBuf::from("custom.tree")];
        let (files, _) = resolve_definitions(config_path, explicit.clone()).expect("resolve");
        assert_eq!(files, explicit);
    }

    #[test]
    fn render_round_trips_through_the_parser() {
        let tree = parse_definition(
            "$Main\n    GO --> @Move speed=1\n    SUB --> #Helper\n    BOTH --> @A, @B\n\n$Helper\n    GO --> @Step\n",
        )
        .expect("parse");

        let mut rendered = String::new();
        for (name, &id) in tree.roots() {
            rendered.push_str(&render_block(&tree, name, id));
        }
        rendered.push_str(&format!(
            "--> {}\n",
            tree.element(tree.root_element()).name()
        ));

        let reparsed = parse_definition(&rendered).expect("reparse");
        assert_eq!(
            reparsed.element(reparsed.root_element()).name(),
            tree.element(tree.root_element()).name()
        );
        let spliced = reparsed
            .get_child(reparsed.root_element(), "SUB")
            .expect("spliced");
        assert_eq!(reparsed.element(spliced).name(), "Helper");
    }
}
