use anyhow::Context;
use colored::Colorize;
use serde_json::Value;

use dyntree_core::{codec, PathCodec, Tree, TreeConfig};
use dyntree_store::{FileTableStore, Item};

use crate::cli::*;

/// Result of one command, rendered once at the end.
#[derive(Debug, PartialEq)]
pub enum Output {
    /// Confirmation message.
    Done(String),
    /// Attributes of an object.
    Object(Value),
    /// Immediate target of a link.
    Target(Vec<String>),
    /// Child names of a directory.
    Children(Vec<String>),
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    let output = execute(cli)?;
    println!("{}", render(&output, format)?);
    Ok(())
}

pub fn execute(cli: Cli) -> anyhow::Result<Output> {
    let tree = open_tree(&cli)?;
    match cli.command {
        Command::Init(_) => cmd_init(&tree, &cli.store),
        Command::Put(args) => cmd_put(&tree, args),
        Command::Link(args) => cmd_link(&tree, args),
        Command::Get(args) => cmd_get(&tree, args),
        Command::Readlink(args) => cmd_readlink(&tree, args),
        Command::Ls(args) => cmd_ls(&tree, args),
        Command::Rm(args) => cmd_rm(&tree, args),
    }
}

fn open_tree(cli: &Cli) -> anyhow::Result<Tree<FileTableStore>> {
    let mut config = match &cli.config {
        Some(path) => TreeConfig::load(path)?,
        None => TreeConfig::default(),
    };
    if let Some(table) = &cli.table {
        config.table_name = table.clone();
    }
    if let Some(delimiter) = &cli.delimiter {
        config.delimiter = delimiter.clone();
    }

    let store = FileTableStore::open(&cli.store)
        .with_context(|| format!("cannot open store {}", cli.store.display()))?;
    Ok(Tree::new(store, config)?)
}

/// Split a slash-separated path. Leading and trailing slashes are ignored,
/// so `/` and the empty string both name the root.
pub fn parse_path(s: &str) -> Vec<String> {
    let trimmed = s.trim_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('/').map(str::to_string).collect()
}

fn cmd_init(tree: &Tree<FileTableStore>, store: &std::path::Path) -> anyhow::Result<Output> {
    tree.create_table()?;
    Ok(Output::Done(format!(
        "Table {} ready in {}",
        tree.config().table_name,
        store.display()
    )))
}

fn cmd_put(tree: &Tree<FileTableStore>, args: PutArgs) -> anyhow::Result<Output> {
    let value: Value = serde_json::from_str(&args.json).context("value is not valid JSON")?;
    let item = codec::to_item(&value)?;
    let path = parse_path(&args.path);
    tree.store(&path, &item)?;
    Ok(Output::Done(format!("Stored {}", PathCodec::display(&path))))
}

fn cmd_link(tree: &Tree<FileTableStore>, args: LinkArgs) -> anyhow::Result<Output> {
    let path = parse_path(&args.path);
    let target = parse_path(&args.target);
    tree.link(&path, &target)?;
    Ok(Output::Done(format!(
        "Linked {} -> {}",
        PathCodec::display(&path),
        PathCodec::display(&target)
    )))
}

fn cmd_get(tree: &Tree<FileTableStore>, args: GetArgs) -> anyhow::Result<Output> {
    let path = parse_path(&args.path);
    let item: Item = tree.fetch(&path)?;
    Ok(Output::Object(codec::from_item(&item)?))
}

fn cmd_readlink(tree: &Tree<FileTableStore>, args: ReadlinkArgs) -> anyhow::Result<Output> {
    let target = tree.link_target(&parse_path(&args.path))?;
    Ok(Output::Target(target))
}

fn cmd_ls(tree: &Tree<FileTableStore>, args: LsArgs) -> anyhow::Result<Output> {
    let prefix = args.prefix.as_deref().map(parse_path).unwrap_or_default();
    Ok(Output::Children(tree.list_children(&prefix)?))
}

fn cmd_rm(tree: &Tree<FileTableStore>, args: RmArgs) -> anyhow::Result<Output> {
    let path = parse_path(&args.path);
    tree.delete(&path)?;
    Ok(Output::Done(format!("Removed {}", PathCodec::display(&path))))
}

pub fn render(output: &Output, format: OutputFormat) -> anyhow::Result<String> {
    if format == OutputFormat::Json {
        let value = match output {
            Output::Done(message) => serde_json::json!({ "ok": true, "message": message }),
            Output::Object(value) => value.clone(),
            Output::Target(target) => serde_json::json!(target),
            Output::Children(names) => serde_json::json!(names),
        };
        return Ok(serde_json::to_string_pretty(&value)?);
    }

    Ok(match output {
        Output::Done(message) => format!("{} {}", "✓".green().bold(), message),
        Output::Object(Value::Object(map)) => map
            .iter()
            .map(|(name, value)| format!("{}: {}", name.cyan(), value))
            .collect::<Vec<_>>()
            .join("\n"),
        Output::Object(value) => value.to_string(),
        Output::Target(target) => PathCodec::display(target).yellow().to_string(),
        Output::Children(names) if names.is_empty() => "(empty)".dimmed().to_string(),
        Output::Children(names) => names.join("\n"),
    })
}
