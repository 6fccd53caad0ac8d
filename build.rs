//! Renders the `dropship` manual pages from the clap definition.
//!
//! `dropship.1` documents the global options and lists `provision`, `run`
//! and `list`; each subcommand also gets its own `dropship-<name>.1` page
//! with its flags. Pages land in `OUT_DIR` for packaging to pick up.

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn render(command: clap::Command, title: &str, out_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut buffer = Vec::new();
    Man::new(command).title(title).render(&mut buffer)?;
    let mut file = File::create(out_dir.join(format!("{title}.1")))?;
    file.write_all(&buffer)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir =
        PathBuf::from(env::var_os("OUT_DIR").ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR was not set")
        })?);

    let mut command = Cli::command();
    command.build();
    for subcommand in command
        .get_subcommands()
        .filter(|subcommand| subcommand.get_name() != "help")
    {
        let title = format!("dropship-{}", subcommand.get_name());
        render(subcommand.clone(), &title, &out_dir)?;
    }
    render(command, "dropship", &out_dir)?;

    Ok(())
}
