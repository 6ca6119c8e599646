use caltrack_core::{Database, EventFilter, ManualEvent};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum EventsAction {
    /// List matched events, most recent first
    List {
        /// Only events of this key ID
        #[arg(long)]
        key: Option<String>,
        /// Case-insensitive substring of the event title
        #[arg(long)]
        search: Option<String>,
        /// Maximum number of events
        #[arg(long, default_value_t = 50)]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record an event by hand and add it to the key's totals
    Add {
        /// Key ID
        #[arg(long)]
        key: String,
        /// Event title
        #[arg(long)]
        summary: String,
        /// Start, e.g. "2026-02-04T14:00:00+01:00"
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        /// Duration in minutes (measured from start and end if omitted)
        #[arg(long)]
        minutes: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: EventsAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        EventsAction::List {
            key,
            search,
            limit,
            json,
        } => {
            let db = Database::open()?;
            let events = db.list_events(&EventFilter {
                key_id: key,
                search,
                limit: Some(limit),
            })?;

            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
                return Ok(());
            }
            if events.is_empty() {
                println!("No matched events.");
                return Ok(());
            }
            for event in &events {
                let r = &event.record;
                println!(
                    "{}  {:>4}min  {:<16} {}",
                    r.event_date, r.duration_minutes, r.key_name, r.summary
                );
            }
        }
        EventsAction::Add {
            key,
            summary,
            start,
            end,
            minutes,
            json,
        } => {
            let db = Database::open()?;
            let event = db.add_manual_event(&ManualEvent {
                key_id: key,
                summary,
                start_time: start,
                end_time: end,
                duration_minutes: minutes,
            })?;

            if json {
                println!("{}", serde_json::to_string_pretty(&event)?);
            } else {
                let r = &event.record;
                println!(
                    "Event recorded: {} ({}min, {})",
                    r.summary, r.duration_minutes, r.key_name
                );
            }
        }
    }
    Ok(())
}
