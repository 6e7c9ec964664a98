// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTML rendering for the survey report.
//!
//! Pages are built line by line and contain nothing time- or
//! environment-dependent, so rendering the same failure map twice gives
//! byte-identical output.

use super::collect::{FailureMap, FailureRecord};
use crate::types::flatten_name;
use std::collections::BTreeMap;

pub const FAILED_COLOR: &str = "#FF0000";
pub const PASSED_COLOR: &str = "#00FF00";
pub const INDEX_FILE: &str = "index.html";

const INDEX_STRIP_WIDTH: usize = 50;
const CASE_STRIP_WIDTH: usize = 10;

/// Filename of a package's detail page.
pub fn package_page_name(package: &str) -> String {
    format!("{}.html", flatten_name(package))
}

/// Optional extra files the index links to.
#[derive(Debug, Clone, Default)]
pub struct IndexLinks<'a> {
    pub blacklist: Option<&'a str>,
    pub ledger: Option<&'a str>,
}

pub fn render_index(failures: &FailureMap, links: &IndexLinks<'_>) -> String {
    let mut lines = page_open("stdstress survey");
    lines.push("<h1>stdstress survey</h1>".to_string());
    lines.push("<table>".to_string());
    for (package, cases) in failures {
        let failing = cases.values().any(|record| record.failures > 0);
        lines.push(format!(
            "<tr><td width=\"{}\" bgcolor=\"{}\"></td><td><a href=\"{}\">{}</a></td></tr>",
            INDEX_STRIP_WIDTH,
            color(failing),
            escape_html(&package_page_name(package)),
            escape_html(package)
        ));
    }
    lines.push("</table>".to_string());

    let extras: Vec<(&str, &str)> = [("blacklist", links.blacklist), ("results", links.ledger)]
        .into_iter()
        .filter_map(|(label, file)| file.map(|file| (label, file)))
        .collect();
    if !extras.is_empty() {
        lines.push("<p>".to_string());
        for (label, file) in extras {
            lines.push(format!("<a href=\"{}\">{}</a><br>", escape_html(file), label));
        }
        lines.push("</p>".to_string());
    }
    page_close(lines)
}

/// One row per case; the strip has one cell per rerun, failures first.
pub fn render_package(
    package: &str,
    cases: &BTreeMap<String, FailureRecord>,
    reruns: usize,
) -> String {
    let mut lines = page_open(package);
    lines.push(format!("<h1>{}</h1>", escape_html(package)));
    lines.push("<p><a href=\"index.html\">index</a></p>".to_string());
    lines.push("<table>".to_string());
    for (case, record) in cases {
        let mut row = String::from("<tr>");
        for cell in 0..reruns {
            row.push_str(&format!(
                "<td width=\"{}\" bgcolor=\"{}\"></td>",
                CASE_STRIP_WIDTH,
                color(cell < record.failures)
            ));
        }
        row.push_str(&format!(
            "<td><a href=\"{}\">{}</a></td>",
            escape_html(&record.origin),
            escape_html(case)
        ));
        row.push_str(&format!("<td>{}/{}</td>", record.failures, reruns));
        row.push_str("<td>");
        let logs: Vec<String> = record
            .failure_logs
            .iter()
            .enumerate()
            .map(|(idx, log)| format!("<a href=\"{}\">output{}</a>", escape_html(log), idx))
            .collect();
        row.push_str(&logs.join(" "));
        row.push_str("</td></tr>");
        lines.push(row);
    }
    lines.push("</table>".to_string());
    page_close(lines)
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn color(failed: bool) -> &'static str {
    if failed {
        FAILED_COLOR
    } else {
        PASSED_COLOR
    }
}

fn page_open(title: &str) -> Vec<String> {
    vec![
        "<!DOCTYPE html>".to_string(),
        "<html>".to_string(),
        "<head>".to_string(),
        "<meta charset=\"utf-8\">".to_string(),
        format!("<title>{}</title>", escape_html(title)),
        "</head>".to_string(),
        "<body>".to_string(),
    ]
}

fn page_close(mut lines: Vec<String>) -> String {
    lines.push("</body>".to_string());
    lines.push("</html>".to_string());
    let mut page = lines.join("\n");
    page.push('\n');
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(failures: usize, logs: &[&str]) -> FailureRecord {
        FailureRecord {
            origin: "sTestsort-0_0.go".to_string(),
            failures,
            failure_logs: logs.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[test]
    fn index_colors_packages_by_any_failure() {
        let mut map = FailureMap::new();
        map.entry("sort".to_string())
            .or_default()
            .insert("TestSort".to_string(), record(0, &[]));
        map.entry("container/list".to_string())
            .or_default()
            .insert("TestList".to_string(), record(1, &["x.output"]));

        let html = render_index(
            &map,
            &IndexLinks {
                blacklist: None,
                ledger: Some("result.file"),
            },
        );
        let list_row = html
            .lines()
            .find(|l| l.contains("container_list.html"))
            .expect("list row");
        assert!(list_row.contains(FAILED_COLOR));
        let sort_row = html.lines().find(|l| l.contains("sort.html")).expect("sort row");
        assert!(sort_row.contains(PASSED_COLOR));
        assert!(html.contains("<a href=\"result.file\">results</a>"));
        assert!(!html.contains("blacklist"));
        // container/list sorts before sort
        assert!(html.find("container_list.html") < html.find("\"sort.html\""));
    }

    #[test]
    fn package_strip_has_one_cell_per_rerun() {
        let mut cases = BTreeMap::new();
        cases.insert("TestSort".to_string(), record(2, &["a.output", "b.output"]));
        let html = render_package("sort", &cases, 3);
        let row = html.lines().find(|l| l.contains("TestSort")).expect("row");
        assert_eq!(row.matches(FAILED_COLOR).count(), 2);
        assert_eq!(row.matches(PASSED_COLOR).count(), 1);
        assert!(row.contains("<a href=\"b.output\">output1</a>"));
        assert!(row.contains("2/3"));
    }

    #[test]
    fn names_are_escaped() {
        assert_eq!(escape_html("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&#39;");
    }
}
