//! Shared constants used across the application.

/// User agent string used for upstream listing requests.
///
/// The gallery host rejects requests that do not look like they come from a
/// desktop browser, so this mirrors a current Chrome build.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Accept header sent alongside the browser user agent.
pub const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";

/// On-site referer required by the gallery host.
pub const ONSITE_REFERER: &str = "https://gall.dcinside.com/";

/// Format the upstream uses for exact post times (the date cell tooltip).
pub const EXACT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Compact timestamp format used by the archive snapshot API.
pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
