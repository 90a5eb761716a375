use clap::Subcommand;

#[derive(Subcommand, Debug, Clone)]
pub enum ActionArgs {
    /// Update found contacts
    Update {
        /// New name
        #[clap(short, long)]
        name: Option<String>,

        /// New number (only when a single contact matched)
        #[clap(short = 'N', long, allow_hyphen_values = true)]
        number: Option<String>,
    },
    /// Delete found contacts
    Delete {
        /// Auto confirm
        #[clap(short, long, default_value = "false")]
        yes: bool,

        /// Don't ask for confirmation when performing dangerous delete.
        /// (e.g. when attempting to delete all contacts)
        #[clap(short, long, default_value = "false")]
        force: bool,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum SemanticArgs {
    /// Find contacts similar to a piece of text
    Query {
        text: String,

        /// Maximum number of results
        #[clap(short, long)]
        limit: Option<usize>,

        /// Minimum similarity [0.0, 1.0]
        #[clap(short, long)]
        threshold: Option<f32>,
    },
    /// Push every contact to the vector index
    Reindex {},
}
