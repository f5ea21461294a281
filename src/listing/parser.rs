use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::constants::EXACT_TIME_FORMAT;

static ROW: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".gall_list tbody tr.us-post").expect("Invalid selector"));
static NUM: Lazy<Selector> = Lazy::new(|| Selector::parse(".gall_num").expect("Invalid selector"));
static TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".gall_tit a").expect("Invalid selector"));
static WRITER: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".gall_writer").expect("Invalid selector"));
static DATE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".gall_date").expect("Invalid selector"));

/// Formats accepted for the exact-time tooltip, most common first.
const EXACT_TIME_FORMATS: &[&str] = &[EXACT_TIME_FORMAT, "%Y.%m.%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// One gallery post as listed on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    /// Post number. Increases with posting order but has gaps.
    #[serde(with = "id_string")]
    pub id: u64,
    pub title: String,
    pub author: String,
    /// Partial IP shown for anonymous posters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Account id shown for logged-in posters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Exact posting time in the upstream's local wall clock.
    #[serde(with = "exact_time")]
    pub timestamp: NaiveDateTime,
    /// Coarse time as displayed in the list ("18:30", "10.10").
    pub display_time: String,
}

/// Parse one listing page into post records, oldest first.
///
/// Notices and ads (rows without a numeric post number) and rows without an
/// exact-time tooltip are skipped. A page with no usable rows yields an empty
/// vector, which callers treat as "no information" rather than an error.
#[must_use]
pub fn parse_list_page(html: &str) -> Vec<PostRecord> {
    let document = Html::parse_document(html);

    let mut posts: Vec<PostRecord> = document.select(&ROW).filter_map(parse_row).collect();

    // The site lists newest first
    posts.reverse();
    posts
}

/// Parse an exact-time tooltip such as `2023-10-10 18:30:45`.
#[must_use]
pub fn parse_exact_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    EXACT_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

fn parse_row(row: ElementRef<'_>) -> Option<PostRecord> {
    let id: u64 = first_text(row, &NUM)?.parse().ok()?;

    let date = row.select(&DATE).next()?;
    let timestamp = date.value().attr("title").and_then(parse_exact_time)?;
    let display_time = collect_text(date);

    let title = first_text(row, &TITLE).unwrap_or_default();

    let (author, ip, uid) = match row.select(&WRITER).next() {
        Some(writer) => {
            let attr = |name: &str| {
                writer
                    .value()
                    .attr(name)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
            };
            let author = attr("data-nick").unwrap_or_else(|| collect_text(writer));
            (author, attr("data-ip"), attr("data-uid"))
        }
        None => (String::new(), None, None),
    };

    Some(PostRecord {
        id,
        title,
        author,
        ip,
        uid,
        timestamp,
        display_time,
    })
}

fn first_text(row: ElementRef<'_>, selector: &Selector) -> Option<String> {
    row.select(selector).next().map(collect_text)
}

fn collect_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Post ids travel as strings on the wire.
mod id_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(id)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.trim().parse().map_err(serde::de::Error::custom)
    }
}

/// Exact times are serialized in the same format the upstream renders them.
mod exact_time {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::constants::EXACT_TIME_FORMAT;

    pub fn serialize<S: Serializer>(at: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&at.format(EXACT_TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_exact_time(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid exact time: {raw}")))
    }
}
