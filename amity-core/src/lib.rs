pub mod config;
pub mod data;
pub mod output;
pub mod pipeline;
pub mod session;
pub mod snapshot;

use colored::Colorize;

pub use data::{CrawlQueueEntry, Database, FriendRelation, FriendStore, Subject};
pub use pipeline::{
    IngestSummary, IngestionPipeline, PipelineError, PipelineOptions, PipelineRunState,
    RunOutcome, Stage,
};
pub use snapshot::SnapshotWriter;

const BANNER: &str = r#"
                  _ __
  ____ _____ ___ (_) /___  __
 / __ `/ __ `__ \/ / __/ / / /
/ /_/ / / / / / / / /_/ /_/ /
\__,_/_/ /_/ /_/_/\__/\__, /
                     /____/
"#;

pub fn print_banner() {
    println!("{}", BANNER.bright_cyan().bold());
    println!(
        "  {} v{}\n",
        "friend list collector".bright_white(),
        env!("CARGO_PKG_VERSION")
    );
}
