/// Timestamps for the exporter's start and stop log lines
use time::macros::format_description;
use time::OffsetDateTime;

/// Render `at` as `21.06.2023 - 09:34:56 UTC`
pub fn log_timestamp(at: &OffsetDateTime) -> String {
    let utc = at.to_offset(time::UtcOffset::UTC);
    utc.format(format_description!(
        "[day].[month].[year] - [hour]:[minute]:[second] UTC"
    ))
    .unwrap_or_else(|_| utc.to_string())
}
