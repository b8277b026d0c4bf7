//! Render a reconstructed [`Report`] as a single document.
//!
//! Two formats are supported:
//!
//! - **HTML** (default): a standalone page with one table row per record
//!   (timestamp, source file, line). Every cell is escaped, so log content
//!   containing markup cannot break the table.
//! - **JSON**: `{"records": [{"timestamp", "source", "content"}, ...]}`,
//!   suitable for further tooling.
//!
//! Rendering is pure; [`write_report`] is the only place I/O happens.

use serde::Deserialize;
use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;

use crate::models::Report;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Html,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html" => Ok(ReportFormat::Html),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!(
                "Unknown report format: '{}'. Must be html or json.",
                other
            )),
        }
    }
}

const HTML_HEAD: &str = "<!DOCTYPE html>
<html>
<body>
<style type='text/css'>
  table, td {
    border: 0px;
  }
  table {
    font-family: sans-serif;
    font-size: 75%;
  }
  td {
    padding: 5px;
    text-align: left;
    vertical-align: top;
  }
</style>
<table>
";

const HTML_TAIL: &str = "</table>\n</body>\n</html>\n";

/// Serialize `report` in the requested format.
pub fn render(report: &Report, format: ReportFormat) -> String {
    match format {
        ReportFormat::Html => render_html(report),
        ReportFormat::Json => render_json(report),
    }
}

pub fn render_html(report: &Report) -> String {
    let mut out = String::with_capacity(HTML_HEAD.len() + HTML_TAIL.len() + report.len() * 128);
    out.push_str(HTML_HEAD);
    for record in &report.records {
        // Writing into a String cannot fail.
        let _ = write!(
            out,
            "  <tr style='color:black;'>\n    <td>{}</td>\n    <td>{}</td>\n    <td>{}</td>\n  </tr>\n",
            escape_html(&record.timestamp_display()),
            escape_html(&record.source),
            escape_html(&record.content),
        );
    }
    out.push_str(HTML_TAIL);
    out
}

pub fn render_json(report: &Report) -> String {
    // Report holds only strings; serialization cannot fail.
    let mut json = serde_json::to_string_pretty(report).unwrap_or_default();
    json.push('\n');
    json
}

/// Escape the characters that are structural in HTML text and attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render `report` and write it to `path`, creating parent directories.
pub fn write_report(report: &Report, format: ReportFormat, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, render(report, format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogRecord;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn record(ms: u32, source: &str, content: &str) -> LogRecord {
        LogRecord {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_milli_opt(9, 59, 59, ms)
                .unwrap(),
            source: source.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn html_has_one_row_per_record_in_order() {
        let report = Report {
            records: vec![record(500, "B.log", "world"), record(900, "A.log", "hello")],
        };
        let html = render_html(&report);
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.ends_with("</html>\n"));
        assert_eq!(html.matches("<tr ").count(), 2);
        let world = html.find("world").unwrap();
        let hello = html.find("hello").unwrap();
        assert!(world < hello);
        assert!(html.contains("<td>2024-01-01 09:59:59.500</td>"));
        assert!(html.contains("<td>B.log</td>"));
    }

    #[test]
    fn markup_in_content_is_escaped() {
        let report = Report {
            records: vec![record(0, "A.log", "<script>alert('x') & \"y\"</script>")],
        };
        let html = render_html(&report);
        assert!(!html.contains("<script>"));
        assert!(html.contains(
            "&lt;script&gt;alert(&#39;x&#39;) &amp; &quot;y&quot;&lt;/script&gt;"
        ));
    }

    #[test]
    fn escaping_is_stable() {
        assert_eq!(escape_html("a<b>c"), "a&lt;b&gt;c");
        assert_eq!(escape_html("&amp;"), "&amp;amp;");
        assert_eq!(escape_html("plain text"), "plain text");
    }

    #[test]
    fn empty_report_is_a_valid_document() {
        let html = render_html(&Report::default());
        assert!(html.contains("<table>\n</table>"));
        assert_eq!(html.matches("<tr").count(), 0);

        let json: serde_json::Value = serde_json::from_str(&render_json(&Report::default())).unwrap();
        assert_eq!(json["records"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn json_carries_all_fields() {
        let report = Report {
            records: vec![record(250, "A.log", "hello <there>")],
        };
        let json: serde_json::Value = serde_json::from_str(&render_json(&report)).unwrap();
        let first = &json["records"][0];
        assert_eq!(first["timestamp"], "2024-01-01 09:59:59.250");
        assert_eq!(first["source"], "A.log");
        assert_eq!(first["content"], "hello <there>");
    }

    #[test]
    fn rendering_is_byte_identical_across_runs() {
        let report = Report {
            records: vec![record(1, "A.log", "x"), record(2, "B.log", "y")],
        };
        assert_eq!(render(&report, ReportFormat::Html), render(&report, ReportFormat::Html));
        assert_eq!(render(&report, ReportFormat::Json), render(&report, ReportFormat::Json));
    }

    #[test]
    fn write_report_creates_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out").join("reconstructed.htm");
        write_report(&Report::default(), ReportFormat::Html, &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn format_parses_from_str() {
        assert_eq!("json".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("html".parse::<ReportFormat>().unwrap(), ReportFormat::Html);
        assert!("pdf".parse::<ReportFormat>().is_err());
    }
}
