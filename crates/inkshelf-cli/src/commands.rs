use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "inkshelf")]
#[command(about = "Catalog comic and manga libraries", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan a library and show what changed on disk
    Scan {
        /// Library name as configured
        library: String,
        /// Write the plan to the catalog and link new files
        #[arg(long)]
        apply: bool,
        /// Apply without asking even when files would be removed
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Show per-library file counts
    Stats,
    /// Print a library's folder tree
    Folders {
        library: String,
        /// Start at this library-relative folder instead of the top level
        #[arg(long)]
        path: Option<String>,
        /// Levels to show below the starting folder
        #[arg(long, default_value_t = 2)]
        depth: i64,
    },
    /// Recompute folder file counts from the catalog
    Recalculate { library: String },
    /// Remove folders that hold no files
    Prune { library: String },
    /// Rename a folder in the catalog
    RenameFolder {
        library: String,
        path: String,
        new_name: String,
    },
    /// Run series auto-linking for one file
    Link {
        file_id: i64,
        /// Replace an existing series link
        #[arg(long)]
        relink: bool,
    },
    /// Print configuration values
    PrintConfig,
    /// Truncate all database tables
    TruncateDb,
}
