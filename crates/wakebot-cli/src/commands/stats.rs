use clap::Subcommand;
use wakebot_core::storage::Database;
use wakebot_core::StatsStore;

#[derive(Subcommand)]
pub enum StatsAction {
    /// Most recent dismissals, newest first
    Recent {
        /// How many to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Totals over every dismissal
    Summary,
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        StatsAction::Recent { limit } => {
            let outcomes = db.recent_outcomes(limit)?;
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
        }
        StatsAction::Summary => {
            let summary = db.stats_summary()?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}
