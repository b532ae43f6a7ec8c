use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start postit as a service.
    Daemon {},

    /// Print every post.
    List {},

    /// Create a new post.
    Add {
        /// Author of the post
        #[clap(short, long)]
        username: String,

        /// Post body
        #[clap(short, long)]
        text: String,
    },

    /// Search posts.
    Search {
        /// Search query. Use "term1 or term2" for multi-term search.
        query: String,

        /// Similarity threshold override [-1.0, 1.0]
        #[clap(short, long)]
        threshold: Option<f32>,

        /// Skip the embedding model and use substring matching.
        #[clap(short, long, default_value = "false")]
        plain: bool,
    },
}
