use caltrack_core::Database;
use chrono::Local;

pub fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let stats = db.summary_stats(Local::now().date_naive())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Total:      {:.1}h in {} events", stats.total_hours, stats.total_events);
    println!("Active keys: {}", stats.active_keys);
    println!("This week:  {:.1}h", stats.this_week_hours);
    println!("Last week:  {:.1}h", stats.last_week_hours);

    if !stats.per_key.is_empty() {
        println!();
        for key in &stats.per_key {
            println!("  {:<20} {:>6.1}h  {:>4} events", key.name, key.hours, key.event_count);
        }
    }
    Ok(())
}
