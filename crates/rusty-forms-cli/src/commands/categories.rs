use anyhow::Result;
use colored::Colorize;
use rusty_forms::load_category_options;
use std::path::Path;

pub async fn execute(config: &Path) -> Result<()> {
    let (_, lookup) = super::load(config)?;
    let options = load_category_options(lookup.as_ref()).await;

    if options.is_empty() {
        println!("{}", "No categories available".yellow());
        return Ok(());
    }

    for option in options {
        println!("{:<28} {}", option.label.cyan(), option.value);
    }
    Ok(())
}
