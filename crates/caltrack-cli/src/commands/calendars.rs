//! Calendars subcommand: what the stored credential can see.

use caltrack_core::{CalendarSource, Config, GoogleCalendarSource, StoredToken};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum CalendarsAction {
    /// List calendars, e.g. to pick a key's calendar restriction
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: CalendarsAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        CalendarsAction::List { json } => {
            let config = Config::load()?;
            let token = StoredToken::lookup()?.map(|(token, _)| token);
            let source = GoogleCalendarSource::new(&config.google, token)?;
            source.check_auth()?;

            let runtime = tokio::runtime::Runtime::new()?;
            let calendars = runtime.block_on(source.list_calendars())?;

            if json {
                println!("{}", serde_json::to_string_pretty(&calendars)?);
            } else if calendars.is_empty() {
                println!("No calendars.");
            } else {
                for calendar in &calendars {
                    println!("{:<40} {}", calendar.id, calendar.name);
                }
            }
        }
    }
    Ok(())
}
