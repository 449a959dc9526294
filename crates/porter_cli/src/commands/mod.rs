pub(crate) mod init;
pub(crate) mod meta;
pub(crate) mod run;
pub(crate) mod status;
pub(crate) mod verify;

use clap::ValueEnum;
use porter::tracker::TrackerClient;
use porter::youtrack::YouTrackClient;
use serde::Serialize;
use tabled::Tabled;

use crate::config::Config;

/// Output format for report commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

/// Render rows as a rounded table.
pub(crate) fn render_table<T: Tabled>(rows: impl IntoIterator<Item = T>) -> String {
    let mut table = tabled::Table::new(rows);
    table.with(tabled::settings::Style::rounded());
    table.to_string()
}

/// Print `value` as pretty JSON.
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Build both remote clients from validated settings.
pub(crate) fn connect(
    config: &Config,
) -> Result<(TrackerClient, YouTrackClient), Box<dyn std::error::Error>> {
    let credentials = config.credentials()?;
    let delay = config.request_delay();
    let source = TrackerClient::new(&credentials.source, delay)?;
    let target = YouTrackClient::new(&credentials.target_url, &credentials.target_token, delay)?;
    Ok((source, target))
}
