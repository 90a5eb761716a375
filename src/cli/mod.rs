use clap::{Parser, Subcommand};

pub mod commands;
pub mod errors;
mod types;
pub mod validation;

pub use types::*;

#[derive(Parser, Debug)]
#[command(version, about = "Keep track of customer contacts", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the web UI.
    Daemon {},

    /// Add a contact. Numbers already on file go to the repeating sheet.
    Add {
        /// Contact name (prompted for when missing)
        #[clap(short, long)]
        name: Option<String>,

        /// Contact number (prompted for when missing)
        #[clap(short = 'N', long, allow_hyphen_values = true)]
        number: Option<String>,
    },

    /// Search contacts
    Search {
        /// Name substring
        #[clap(short, long)]
        name: Option<String>,

        /// Number substring, formatting is ignored
        #[clap(short = 'N', long, allow_hyphen_values = true)]
        number: Option<String>,

        /// Free text matched against name and number
        #[clap(short, long)]
        keyword: Option<String>,

        /// id
        #[clap(short, long)]
        id: Option<u64>,

        /// Exact search. False by default.
        #[clap(short, long, default_value = "false")]
        exact: bool,

        /// Print the count
        #[clap(short = 'c', long, default_value = "false")]
        count: bool,

        /// Search the repeating sheet instead of the primary one
        #[clap(short, long, default_value = "false")]
        repeating: bool,

        #[clap(subcommand)]
        action: Option<ActionArgs>,
    },

    /// Edit the contact with the given number
    Edit {
        /// Current number of the contact
        #[clap(allow_hyphen_values = true)]
        number: String,

        /// New name
        #[clap(long)]
        name: Option<String>,

        /// New number
        #[clap(long, allow_hyphen_values = true)]
        new_number: Option<String>,
    },

    /// Delete the contact with the given number
    Delete {
        #[clap(allow_hyphen_values = true)]
        number: String,

        /// Auto confirm
        #[clap(short, long, default_value = "false")]
        yes: bool,
    },

    /// List all contacts sorted by name
    List {
        #[clap(short, long, default_value = "false")]
        repeating: bool,
    },

    /// Write a CSV copy of a sheet
    Export {
        /// Destination file
        dest: String,

        #[clap(short, long, default_value = "false")]
        repeating: bool,
    },

    /// Semantic lookup through the embeddings API and vector index
    Semantic {
        #[clap(subcommand)]
        action: SemanticArgs,
    },
}
