use anyhow::Result;

use crate::settings::AppSettings;

pub fn print_settings(settings: &AppSettings) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}
