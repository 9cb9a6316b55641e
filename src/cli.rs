use crate::{
    config::{self, AppConfig},
    error::ModError,
    fetch::HttpFetcher,
    game,
    installer::InstallOptions,
    logging,
    manager::{ModManager, ALL_MODS},
    notifier::LogNotifier,
    registry::{ModList, ModPackage},
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::{path::PathBuf, sync::Arc};

#[derive(Debug, Parser)]
#[command(name = "northmod", version, about = "Install and manage Northstar mods")]
pub struct Cli {
    /// Titanfall 2 install directory; falls back to the saved path.
    #[arg(long, global = true)]
    pub game_path: Option<PathBuf>,

    /// Remember `--game-path` for later runs.
    #[arg(long, global = true, requires = "game_path")]
    pub save_game_path: bool,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List installed mods, enabled first.
    List,
    /// Show one mod by its declared name.
    Get { name: String },
    /// Install a mod folder, a folder of mods, or a .zip/.7z archive.
    Install {
        path: PathBuf,
        #[arg(long)]
        author: Option<String>,
    },
    /// Download an archive and install it.
    InstallUrl {
        url: String,
        #[arg(long)]
        author: Option<String>,
    },
    /// Delete a mod folder; `allmods` removes every mod.
    Remove { name: String },
    /// Flip a mod's enabled state; `allmods` flips every mod.
    Toggle { name: String },
    Enable { name: String },
    Disable { name: String },
    /// Rebuild enabledmods.json with every installed mod enabled.
    Regenerate,
    /// Show the resolved game and data paths.
    Paths,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

pub fn run() -> i32 {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match execute(cli) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {err:#}");
            err.downcast_ref::<ModError>()
                .map(ModError::exit_code)
                .unwrap_or(1)
        }
    }
}

fn execute(cli: Cli) -> Result<()> {
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let mut config = AppConfig::load_or_create()?;
    if cli.save_game_path {
        config.game_path = cli.game_path.clone();
        config.save()?;
    }
    let game_root = cli
        .game_path
        .clone()
        .or_else(|| config.game_path.clone())
        .context("no game path; pass --game-path (and --save-game-path to remember it)")?;

    let manager = ModManager::new(
        game_root,
        config::staging_dir()?,
        config.container_policy(),
        Arc::new(LogNotifier),
    );

    match cli.command {
        Command::List => print_list(&manager.list()?, format),
        Command::Get { name } => print_get(&name, manager.get(&name)?, format),
        Command::Install { path, author } => {
            let options = InstallOptions {
                author,
                ..InstallOptions::default()
            };
            let installed = manager.install(&path, options)?;
            let names: Vec<String> = installed.into_iter().map(|p| p.folder_name).collect();
            print_names("Installed", &names, format)
        }
        Command::InstallUrl { url, author } => {
            let download_dir = config::download_dir()?;
            let installed = manager.install_from_url(&HttpFetcher, &url, author, &download_dir)?;
            let names: Vec<String> = installed.into_iter().map(|p| p.folder_name).collect();
            print_names("Installed", &names, format)
        }
        Command::Remove { name } => {
            let removed = manager.remove(&name)?;
            if name == ALL_MODS && removed.is_empty() && format == OutputFormat::Text {
                println!("No mods to remove.");
                return Ok(());
            }
            print_names("Removed", &removed, format)
        }
        Command::Toggle { name } => print_toggled(&manager.toggle(&name)?, format),
        Command::Enable { name } => {
            manager.set_enabled(&name, true)?;
            print_toggled(&[(name, true)], format)
        }
        Command::Disable { name } => {
            manager.set_enabled(&name, false)?;
            print_toggled(&[(name, false)], format)
        }
        Command::Regenerate => {
            manager.regenerate()?;
            if format == OutputFormat::Text {
                println!("Regenerated {}", manager.state().path().display());
            }
            Ok(())
        }
        Command::Paths => print_paths(&manager, format),
    }
}

#[derive(Serialize)]
struct ListOutput<'a> {
    installed: usize,
    enabled: &'a [ModPackage],
    disabled: &'a [ModPackage],
}

fn print_list(list: &ModList, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let output = ListOutput {
                installed: list.all.len(),
                enabled: &list.enabled,
                disabled: &list.disabled,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!(
                "{} installed, {} enabled, {} disabled",
                list.all.len(),
                list.enabled.len(),
                list.disabled.len()
            );
            for package in &list.all {
                let marker = if package.disabled { " " } else { "*" };
                println!("{marker} {} {}", package.name, package.version);
            }
        }
    }
    Ok(())
}

fn print_get(name: &str, package: Option<ModPackage>, format: OutputFormat) -> Result<()> {
    match (format, package) {
        (OutputFormat::Json, package) => {
            println!("{}", serde_json::to_string_pretty(&package)?);
        }
        (OutputFormat::Text, None) => println!("No mod named {name}."),
        (OutputFormat::Text, Some(package)) => {
            println!("Name: {}", package.name);
            println!("Version: {}", package.version);
            println!("Folder: {}", package.folder_name);
            if let Some(author) = &package.author {
                println!("Author: {author}");
            }
            if let Some(manifest_name) = &package.manifest_name {
                println!("Package: {manifest_name}");
            }
            println!("Enabled: {}", !package.disabled);
        }
    }
    Ok(())
}

fn print_names(verb: &str, names: &[String], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(names)?),
        OutputFormat::Text => {
            for name in names {
                println!("{verb} {name}");
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ToggleOutput<'a> {
    name: &'a str,
    enabled: bool,
}

fn print_toggled(toggled: &[(String, bool)], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let items: Vec<ToggleOutput> = toggled
                .iter()
                .map(|(name, enabled)| ToggleOutput {
                    name,
                    enabled: *enabled,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => {
            for (name, enabled) in toggled {
                let state = if *enabled { "enabled" } else { "disabled" };
                println!("{name}: {state}");
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct PathsOutput {
    game_root: String,
    version: String,
    mods_dir: String,
    state_file: String,
    staging_dir: String,
}

fn print_paths(manager: &ModManager, format: OutputFormat) -> Result<()> {
    let paths = manager.paths();
    let output = PathsOutput {
        game_root: paths.game_root.display().to_string(),
        version: manager.version(),
        mods_dir: paths.mods_dir.display().to_string(),
        state_file: paths.state_file.display().to_string(),
        staging_dir: config::staging_dir()?.display().to_string(),
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Text => {
            println!("Game root: {}", output.game_root);
            if output.version == game::UNKNOWN_VERSION {
                println!("{} version: not installed", game::GAME_NAME);
            } else {
                println!("{} version: {}", game::GAME_NAME, output.version);
            }
            println!("Mods: {}", output.mods_dir);
            println!("State file: {}", output.state_file);
            println!("Staging: {}", output.staging_dir);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_options_follow_subcommand() {
        let cli = Cli::parse_from([
            "northmod",
            "toggle",
            "allmods",
            "--game-path",
            "/games/tf2",
            "--json",
        ]);
        assert!(cli.json);
        assert_eq!(cli.game_path, Some(PathBuf::from("/games/tf2")));
        assert!(matches!(cli.command, Command::Toggle { name } if name == ALL_MODS));
    }

    #[test]
    fn saving_requires_a_path() {
        assert!(Cli::try_parse_from(["northmod", "--save-game-path", "list"]).is_err());
    }

    #[test]
    fn install_url_takes_author() {
        let cli = Cli::try_parse_from([
            "northmod",
            "install-url",
            "https://example.com/Mod.zip",
            "--author",
            "Team",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::InstallUrl { author: Some(author), .. } if author == "Team"
        ));
    }
}
