//! Synthetic gallery markup shared by the integration tests.

#![allow(dead_code)]

use chrono::{NaiveDateTime, TimeDelta};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn at(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").expect("valid time")
}

/// Posts `1..=total` one minute apart from `start`, paginated newest first.
/// Each page is oldest first.
pub fn gallery_pages(total: u64, per_page: usize, start: NaiveDateTime) -> Vec<Vec<(u64, NaiveDateTime)>> {
    let mut all: Vec<(u64, NaiveDateTime)> = (1..=total)
        .map(|id| (id, start + TimeDelta::minutes(id as i64 - 1)))
        .collect();
    all.reverse();
    all.chunks(per_page)
        .map(|chunk| chunk.iter().rev().copied().collect())
        .collect()
}

/// Render a listing page the way the site does: newest first, with a pinned notice.
pub fn render_listing(posts: &[(u64, NaiveDateTime)]) -> String {
    let mut rows = String::from(
        r#"<tr class="ub-content us-post" data-type="icon_notice">
             <td class="gall_num">공지</td>
             <td class="gall_tit"><a href="/notice">Read before posting</a></td>
             <td class="gall_writer" data-nick="운영자"></td>
             <td class="gall_date" title="2020-01-01 00:00:00">20.01.01</td>
           </tr>"#,
    );
    for (id, posted) in posts.iter().rev() {
        rows.push_str(&format!(
            r#"<tr class="ub-content us-post">
                 <td class="gall_num">{id}</td>
                 <td class="gall_tit"><a href="/board/view/?id=stock&no={id}">post {id}</a></td>
                 <td class="gall_writer" data-nick="ㅇㅇ" data-ip="118.235"></td>
                 <td class="gall_date" title="{}">{}</td>
               </tr>"#,
            posted.format("%Y-%m-%d %H:%M:%S"),
            posted.format("%H:%M"),
        ));
    }
    format!(
        r#"<html><body><table class="gall_list"><thead><tr><th>번호</th></tr></thead><tbody>{rows}</tbody></table></body></html>"#
    )
}

/// Serve `pages` for `gallery_id` under `list_path`; every other page renders empty.
pub async fn mount_gallery(
    server: &MockServer,
    list_path: &str,
    gallery_id: &str,
    pages: &[Vec<(u64, NaiveDateTime)>],
) {
    for (index, page) in pages.iter().enumerate() {
        Mock::given(method("GET"))
            .and(path(list_path))
            .and(query_param("id", gallery_id))
            .and(query_param("page", (index + 1).to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string(render_listing(page)))
            .with_priority(1)
            .mount(server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path(list_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(render_listing(&[])))
        .with_priority(10)
        .mount(server)
        .await;
}
