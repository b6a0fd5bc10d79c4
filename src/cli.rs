use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List fault categories
    Categories {
        /// List every category of the taxonomy instead of those that lead at least one shop
        #[clap(long, default_value = "false")]
        taxonomy: bool,
    },

    /// Classify a piece of text without touching the store
    Diagnose {
        /// Problem description, e.g. "my brakes squeal"
        text: String,
    },

    /// Assign a fault category to every review
    Classify {},

    /// Recompute per-shop fault tallies and best category
    Aggregate {},

    /// Compute vectors for reviews that have none
    Embed {},

    /// Recommend shops for a fault category or a problem description
    Recommend {
        /// Fault category, e.g. "brakes"
        #[clap(short, long)]
        category: Option<String>,

        /// Free-text problem description
        #[clap(short, long)]
        query: Option<String>,

        /// Your latitude
        #[clap(long, allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Your longitude
        #[clap(long, allow_hyphen_values = true)]
        lon: Option<f64>,
    },

    /// Show which faults peak in which quarter
    Seasonal {
        /// Categories listed per quarter
        #[clap(long, default_value = "3")]
        top: usize,
    },

    /// Rank shops by repair volume and rating
    Scores {
        /// Only this fault category
        #[clap(short, long)]
        category: Option<String>,

        /// Maximum rows
        #[clap(short, long, default_value = "10")]
        limit: usize,
    },
}
