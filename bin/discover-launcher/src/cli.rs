use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "discover-launcher")]
#[command(about = "Discover, download and install updates for sibling apps", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch the catalog and show what can be installed, updated or opened
    List {
        /// Ignore the allow-list and the updates-only filter
        #[arg(long)]
        all: bool,
    },
    /// Download one package and hand it to the installer
    Download {
        /// Package name, e.g. com.aresourcepool.justtip
        package: String,
        /// Keep the downloaded file instead of installing it
        #[arg(long)]
        no_install: bool,
    },
    /// Download and install every package with a pending update
    UpdateAll,
    /// Hand a local APK file to the installer
    Install {
        /// Path to the APK
        path: PathBuf,
    },
    /// Print the direct-download form of a share link
    Normalize { url: String },
}
