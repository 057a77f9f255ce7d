// ----------------------------------------------------------------------------
// This file contains the code for reading the student portal's HTML pages.
//
// The portal has no API, so everything here is pulled out of the rendered
// dashboard and the per-subject attendance page. The markup is old and not
// very regular, so tables are found by regex and cells are cleaned by
// stripping tags and decoding entities.
// ----------------------------------------------------------------------------

use crate::error::PortalError;
use crate::projection::AttendanceReport;

use escaper::*;
use indexmap::IndexMap;
use lazy_static::*;
use log::*;
use regex::Regex;

lazy_static! {
    static ref TABLE_RE: Regex = Regex::new(r"(?is)<table([^>]*)>(.*?)</table>").expect("table regex");
    static ref ROW_RE: Regex = Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("row regex");
    static ref TD_RE: Regex = Regex::new(r"(?is)<td[^>]*>(.*?)</td>").expect("td regex");
    static ref TH_RE: Regex = Regex::new(r"(?is)<th[^>]*>(.*?)</th>").expect("th regex");
    static ref TAG_RE: Regex = Regex::new(r"(?s)<[^>]*>").expect("tag regex");
    static ref CENTER_H3_RE: Regex =
        Regex::new(r#"(?is)<h3[^>]*\balign\s*=\s*["']?center["']?[^>]*>(.*?)</h3>"#).expect("h3 regex");
    static ref BATCH_RE: Regex = Regex::new(r"Batch Number\s*-\s*([A-Z0-9]+)").expect("batch regex");
    static ref EXAMPLE_ID_RE: Regex = Regex::new(r#"(?i)(?:^|\s)id\s*=\s*(?:"example"|'example'|example\b)"#).expect("id regex");
}

/// Visible text of an HTML fragment, trimmed
pub fn clean_text(fragment: &str) -> String {
    let stripped = TAG_RE.replace_all(fragment, "");
    let decoded = decode_html(&stripped).unwrap_or_else(|_| stripped.to_string());

    decoded.replace('\u{a0}', " ").trim().to_string()
}

fn cells(row: &str, cell_re: &Regex) -> Vec<String> {
    cell_re
        .captures_iter(row)
        .map(|c| clean_text(&c[1]))
        .collect()
}

fn rows(table_body: &str) -> Vec<&str> {
    ROW_RE
        .captures_iter(table_body)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// The dashboard greets the student with a centered heading such as
/// "Welcome ... Batch Number - B12"
pub fn extract_batch_number(html: &str) -> Result<String, PortalError> {
    let heading = CENTER_H3_RE
        .captures(html)
        .ok_or(PortalError::BatchInfoMissing)?;

    let text = clean_text(&heading[1]);

    let batch = BATCH_RE
        .captures(&text)
        .ok_or(PortalError::BatchNumberMissing)?;

    Ok(batch[1].to_string())
}

/// Percentages from the dashboard's course table.
///
/// The first table mentioning "Course" is used; its rows are `<th>` cells of
/// (serial, subject, percentage). A percentage that doesn't parse is kept as
/// None rather than dropped.
pub fn parse_dashboard_attendance(html: &str) -> IndexMap<String, Option<f64>> {
    let mut attendance = IndexMap::new();

    let table = TABLE_RE
        .captures_iter(html)
        .filter_map(|c| c.get(2))
        .map(|m| m.as_str())
        .find(|body| clean_text(body).contains("Course"));

    let table = match table {
        Some(table) => table,
        None => {
            debug!("Dashboard has no course table");
            return attendance;
        }
    };

    for row in rows(table).into_iter().skip(1) {
        let cols = cells(row, &TH_RE);

        if cols.len() < 3 {
            continue;
        }

        let percentage = cols[2].replace('%', "").trim().parse::<f64>().ok();

        attendance.insert(cols[1].clone(), percentage);
    }

    attendance
}

/// Held/attended counts from a subject's attendance page.
///
/// The totals live in the last row of the `id="example"` table, in the
/// second and third cells. Anything else is reported as unavailable.
pub fn parse_subject_attendance(html: &str) -> AttendanceReport {
    let table = TABLE_RE
        .captures_iter(html)
        .find(|c| EXAMPLE_ID_RE.is_match(&c[1]))
        .and_then(|c| c.get(2))
        .map(|m| m.as_str());

    let table = match table {
        Some(table) => table,
        None => return AttendanceReport::Unavailable,
    };

    let last = match rows(table).last() {
        Some(last) => cells(last, &TD_RE),
        None => return AttendanceReport::Unavailable,
    };

    if last.len() < 3 {
        return AttendanceReport::Unavailable;
    }

    match (last[1].parse::<u32>(), last[2].parse::<u32>()) {
        (Ok(held), Ok(attended)) => AttendanceReport::Recorded { held, attended },
        _ => {
            debug!("Unreadable totals row: {:?}", last);
            AttendanceReport::Unavailable
        }
    }
}

/// A logged in dashboard always links to the attendance pages.
pub fn login_succeeded(dashboard_html: &str) -> bool {
    dashboard_html.contains("Attendance") || dashboard_html.contains("attendance")
}
