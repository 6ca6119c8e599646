use caltrack_core::storage::KeyPatch;
use caltrack_core::{Database, NewKey, TrackingKey};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum KeysAction {
    /// Create a tracking key
    Add {
        /// Display name
        name: String,
        /// Term searched for in event titles (defaults to the name)
        #[arg(long)]
        search: Option<String>,
        /// Display color, e.g. "#3b82f6"
        #[arg(long)]
        color: Option<String>,
        /// Only match events from this calendar id
        #[arg(long)]
        calendar: Option<String>,
        /// Category ID
        #[arg(long)]
        category: Option<String>,
    },
    /// List tracking keys, newest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a tracking key
    Edit {
        /// Key ID
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long, conflicts_with = "all_calendars")]
        calendar: Option<String>,
        /// Match events from every calendar again
        #[arg(long)]
        all_calendars: bool,
        #[arg(long, conflicts_with = "no_category")]
        category: Option<String>,
        /// Remove the key from its category
        #[arg(long)]
        no_category: bool,
    },
    /// Delete a tracking key and its matched events
    Remove {
        /// Key ID
        id: String,
    },
}

pub fn run(action: KeysAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        KeysAction::Add {
            name,
            search,
            color,
            calendar,
            category,
        } => {
            let key = db.create_key(&NewKey {
                name,
                search_key: search,
                color,
                calendar_id: calendar,
                category_id: category,
            })?;
            println!("Key created: {} ({})", key.name, key.id);
        }
        KeysAction::List { json } => {
            let keys = db.list_keys()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&keys)?);
            } else if keys.is_empty() {
                println!("No tracking keys.");
            } else {
                for key in &keys {
                    print_key(key);
                }
            }
        }
        KeysAction::Edit {
            id,
            name,
            search,
            color,
            calendar,
            all_calendars,
            category,
            no_category,
        } => {
            let calendar_id = if all_calendars {
                Some(None)
            } else {
                calendar.map(Some)
            };
            let category_id = if no_category {
                Some(None)
            } else {
                category.map(Some)
            };
            let key = db.update_key(
                &id,
                &KeyPatch {
                    name,
                    search_key: search,
                    color,
                    calendar_id,
                    category_id,
                },
            )?;
            println!("Key updated:");
            print_key(&key);
        }
        KeysAction::Remove { id } => {
            db.delete_key(&id)?;
            println!("Key removed: {id}");
        }
    }
    Ok(())
}

fn print_key(key: &TrackingKey) {
    let term = key.effective_search_term().unwrap_or("");
    let scope = key.calendar_id.as_deref().unwrap_or("all calendars");
    println!(
        "{}  {:<20} search=\"{}\"  {}  {:.1}h / {} events  [{}]",
        key.id,
        key.name,
        term,
        key.color,
        key.total_minutes as f64 / 60.0,
        key.event_count,
        scope
    );
}
