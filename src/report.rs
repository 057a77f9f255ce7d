use crate::error::SkipError;
use crate::projection::SubjectRecord;

use ::serde::*;
use indexmap::IndexMap;
use std::path::Path;

const HEADERS: [&str; 7] = [
    "Subject",
    "Held",
    "Attended",
    "Percentage",
    "Portal %",
    "Future",
    "Can Skip",
];

/// Percentage rounded to two places, "n/a" before any class is held
pub fn format_percentage(record: &SubjectRecord) -> String {
    match record.attendance_percentage() {
        Some(pct) => format!("{:.2}", pct),
        None => "n/a".to_string(),
    }
}

/// What the dashboard itself claims, matched by code first and then by name
fn portal_percentage(record: &SubjectRecord, portal: &IndexMap<String, Option<f64>>) -> String {
    let value = portal
        .get(&record.code)
        .or_else(|| portal.get(&record.name));

    match value {
        Some(Some(pct)) => format!("{:.2}", pct),
        _ => "-".to_string(),
    }
}

fn border(widths: &[usize]) -> String {
    let mut line = String::from("+");

    for width in widths {
        line.push_str(&"-".repeat(width + 2));
        line.push('+');
    }

    line
}

fn row(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::from("|");

    for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
        // subject names read better left aligned, numbers right aligned
        if i == 0 {
            line.push_str(&format!(" {:<width$} |", cell, width = *width));
        } else {
            line.push_str(&format!(" {:>width$} |", cell, width = *width));
        }
    }

    line
}

pub fn render_table(
    batch: &str,
    records: &[SubjectRecord],
    portal: &IndexMap<String, Option<f64>>,
) -> String {
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            vec![
                r.name.clone(),
                r.held.to_string(),
                r.attended.to_string(),
                format_percentage(r),
                portal_percentage(r, portal),
                r.future.to_string(),
                r.skippable.to_string(),
            ]
        })
        .collect();

    let mut widths: Vec<usize> = HEADERS.iter().map(|h| h.chars().count()).collect();

    for cells in &rows {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let headers: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
    let rule = border(&widths);

    let mut out = vec![
        "--- Attendance Projection ---".to_string(),
        format!("Batch: {}", batch),
        rule.clone(),
        row(&headers, &widths),
        rule.clone(),
    ];

    for cells in &rows {
        out.push(row(cells, &widths));
    }

    out.push(rule);

    out.join("\n")
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    code: &'a str,
    subject: &'a str,
    held: u32,
    attended: u32,
    percentage: Option<f64>,
    future: u32,
    can_skip: u32,
    attendance_available: bool,
}

pub fn write_csv(path: &Path, records: &[SubjectRecord]) -> Result<(), SkipError> {
    let mut writer = csv::Writer::from_path(path)?;

    for r in records {
        writer.serialize(CsvRow {
            code: &r.code,
            subject: &r.name,
            held: r.held,
            attended: r.attended,
            percentage: r.attendance_percentage().map(|p| (p * 100.0).round() / 100.0),
            future: r.future,
            can_skip: r.skippable,
            attendance_available: r.attendance_available,
        })?;
    }

    writer.flush().map_err(csv::Error::from)?;

    Ok(())
}
