pub mod categories;
pub mod submit;

use anyhow::{Context, Result};
use rusty_forms::{FormConfig, HttpLookup, LookupService};
use std::path::Path;
use std::sync::Arc;

pub(crate) fn load(config: &Path) -> Result<(FormConfig, Arc<dyn LookupService>)> {
    let config = FormConfig::load(config)?;
    let lookup = HttpLookup::new(config.lookup.clone()).context("Failed to build HTTP client")?;
    Ok((config, Arc::new(lookup)))
}
