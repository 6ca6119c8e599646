use caltrack_core::{Category, CategoryPatch, Database, NewCategory};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum CategoriesAction {
    /// Create a category
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// List categories, newest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rename a category or change its description
    Edit {
        /// Category ID
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,
        #[arg(long)]
        clear_description: bool,
    },
    /// Delete a category; its keys are kept without one
    Remove {
        /// Category ID
        id: String,
    },
}

pub fn run(action: CategoriesAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        CategoriesAction::Add { name, description } => {
            let category = db.create_category(&NewCategory { name, description })?;
            println!("Category created: {} ({})", category.name, category.id);
        }
        CategoriesAction::List { json } => {
            let categories = db.list_categories()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&categories)?);
            } else if categories.is_empty() {
                println!("No categories.");
            } else {
                for category in &categories {
                    print_category(category);
                }
            }
        }
        CategoriesAction::Edit {
            id,
            name,
            description,
            clear_description,
        } => {
            let description = if clear_description {
                Some(None)
            } else {
                description.map(Some)
            };
            let category = db.update_category(&id, &CategoryPatch { name, description })?;
            println!("Category updated:");
            print_category(&category);
        }
        CategoriesAction::Remove { id } => {
            db.delete_category(&id)?;
            println!("Category removed: {id}");
        }
    }
    Ok(())
}

fn print_category(category: &Category) {
    match &category.description {
        Some(description) => println!("{}  {:<20} {}", category.id, category.name, description),
        None => println!("{}  {}", category.id, category.name),
    }
}
