use crate::ai_sql::TrainingStatus;
use crate::database::QueryResult;
use clap::ValueEnum;
use prettytable::{Cell, Row, Table, format};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use strum::{Display, EnumIter, EnumString};
use tracing::warn;

/// Markdown output shows at most this many rows
pub const MARKDOWN_ROW_LIMIT: usize = 100;

/// How executed results are rendered
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Display, EnumIter, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    /// psql-style table
    #[default]
    Table,
    /// GitHub-flavoured markdown table
    Markdown,
    /// Comma-separated values with a header row
    Csv,
}

fn pad(text: &str, width: usize, left_align: bool) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let padding = " ".repeat(width - len);
    if left_align {
        format!("{text}{padding}")
    } else {
        format!("{padding}{text}")
    }
}

fn is_numeric(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == '-' || c == '+')
}

/// psql-style table: header, dashed separator, rows, row count.
/// `data[0]` is the header; short rows are padded with empty cells.
pub fn format_query_results_psql(data: &[Vec<String>]) -> String {
    let Some(header) = data.first() else {
        return String::new();
    };
    if header.is_empty() {
        return String::new();
    }

    let columns = data.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0; columns];
    for row in data {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut result = String::new();
    for (i, width) in widths.iter().enumerate() {
        if i > 0 {
            result.push_str(" | ");
        }
        let name = header.get(i).map(String::as_str).unwrap_or("");
        result.push_str(&pad(name, *width, true));
    }
    result.push('\n');

    for (i, width) in widths.iter().enumerate() {
        if i > 0 {
            result.push_str("-+-");
        }
        result.push_str(&"-".repeat(*width));
    }
    result.push('\n');

    for row in data.iter().skip(1) {
        for (i, width) in widths.iter().enumerate() {
            if i > 0 {
                result.push_str(" | ");
            }
            let value = row.get(i).map(String::as_str).unwrap_or("");
            result.push_str(&pad(value, *width, !is_numeric(value)));
        }
        result.push('\n');
    }

    let row_count = data.len() - 1;
    result.push_str(&format!(
        "({} {})\n",
        row_count,
        if row_count == 1 { "row" } else { "rows" }
    ));
    result
}

/// Tabular result, or a one-line summary for statements without a result set
pub fn format_query_result(result: &QueryResult) -> String {
    if let Some(count) = result.affected_rows() {
        return affected_summary(count);
    }
    if result.columns.is_empty() {
        return "(0 rows)\n".to_string();
    }
    format_query_results_psql(&result.to_table_data())
}

pub fn format_query_result_json(result: &QueryResult) -> String {
    serde_json::to_string_pretty(&result.to_json_records()).unwrap_or_else(|_| "[]".to_string())
}

fn affected_summary(count: u64) -> String {
    format!(
        "Query OK, {} {} affected\n",
        count,
        if count == 1 { "row" } else { "rows" }
    )
}

fn markdown_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// GitHub-style markdown table, capped at [`MARKDOWN_ROW_LIMIT`] rows
pub fn format_query_result_markdown(result: &QueryResult) -> String {
    if let Some(count) = result.affected_rows() {
        return affected_summary(count);
    }
    if result.columns.is_empty() {
        return "(0 rows)\n".to_string();
    }

    let line = |cells: Vec<String>| format!("| {} |\n", cells.join(" | "));
    let mut out = line(result.columns.iter().map(|c| markdown_cell(c)).collect());
    out.push_str(&line(result.columns.iter().map(|_| "---".to_string()).collect()));
    for row in result.rows.iter().take(MARKDOWN_ROW_LIMIT) {
        out.push_str(&line(
            (0..result.columns.len())
                .map(|i| markdown_cell(row.get(i).and_then(|c| c.as_deref()).unwrap_or("")))
                .collect(),
        ));
    }
    if result.row_count() > MARKDOWN_ROW_LIMIT {
        out.push_str(&format!(
            "\n... showing first {} of {} rows\n",
            MARKDOWN_ROW_LIMIT,
            result.row_count()
        ));
    }
    out
}

fn write_csv(result: &QueryResult) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&result.columns)?;
    for row in &result.rows {
        writer.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
    }
    writer.into_inner().map_err(|e| csv::Error::from(e.into_error()))
}

/// Header row then data rows; NULL is an empty field
pub fn format_query_result_csv(result: &QueryResult) -> String {
    match write_csv(result) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!("[format_query_result_csv] {}", e);
            String::new()
        }
    }
}

pub fn format_query_result_as(result: &QueryResult, output: OutputFormat) -> String {
    match output {
        OutputFormat::Table => format_query_result(result),
        OutputFormat::Markdown => format_query_result_markdown(result),
        OutputFormat::Csv => match result.affected_rows() {
            Some(count) => affected_summary(count),
            None => format_query_result_csv(result),
        },
    }
}

fn table_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:FROM|JOIN)\s+(\w+)").expect("valid regex"))
}

fn word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+").expect("valid regex"))
}

/// CSV file name from the tables `sql` reads and a few hints in `request`,
/// e.g. `orders_users_count_joined.csv`
pub fn export_file_name(request: &str, sql: &str) -> String {
    let tables: Vec<&str> = table_regex()
        .captures_iter(sql)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    let request_lower = request.to_lowercase();
    let mut hints = Vec::new();
    if request_lower.contains("count") {
        hints.push("count");
    }
    if request_lower.contains("list") {
        hints.push("list");
    }
    if tables.len() > 1 {
        hints.push("joined");
    }

    let mut parts = Vec::new();
    if !tables.is_empty() {
        parts.push(tables.iter().take(2).copied().collect::<Vec<_>>().join("_"));
    }
    if !hints.is_empty() {
        parts.push(hints.iter().take(2).copied().collect::<Vec<_>>().join("_"));
    }

    let stem = if parts.is_empty() {
        let words: Vec<&str> = word_regex().find_iter(request).take(4).map(|m| m.as_str()).collect();
        if words.is_empty() {
            "query_results".to_string()
        } else {
            words.join("_")
        }
    } else {
        parts.join("_")
    };
    let stem: String = stem.chars().filter(|c| c.is_alphanumeric() || *c == '_').take(50).collect();
    format!("{stem}.csv")
}

fn base_table(titles: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(Row::new(titles.iter().map(|t| Cell::new(t)).collect()));
    table
}

/// Configured names with the current one marked by `*`
pub fn format_name_list(names: &[String], current: Option<&str>) -> String {
    let mut table = base_table(&["", "Name"]);
    for name in names {
        let marker = if current == Some(name.as_str()) { "*" } else { "" };
        table.add_row(Row::new(vec![Cell::new(marker), Cell::new(name)]));
    }
    table.to_string()
}

pub fn format_training_status(status: &BTreeMap<String, TrainingStatus>) -> String {
    let mut table = base_table(&["Database", "Trained", "Tables", "Cached at", "In memory"]);
    for (name, entry) in status {
        table.add_row(Row::new(vec![
            Cell::new(name),
            Cell::new(if entry.trained { "yes" } else { "no" }),
            Cell::new(&entry.tables.map(|t| t.to_string()).unwrap_or_default()),
            Cell::new(entry.cached_at.as_deref().unwrap_or("")),
            Cell::new(match entry.in_memory {
                Some(true) => "yes",
                Some(false) => "no",
                None => "",
            }),
        ]));
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[rstest]
    fn test_psql_layout() {
        let data = rows(&[&["id", "name"], &["1", "alice"], &["22", "bo"]]);
        assert_eq!(
            format_query_results_psql(&data),
            "id | name \n---+------\n 1 | alice\n22 | bo   \n(2 rows)\n"
        );
    }

    #[rstest]
    fn test_short_rows_are_padded() {
        let data = rows(&[&["a", "b"], &["x"]]);
        let out = format_query_results_psql(&data);
        assert!(out.contains("x | "));
        assert!(out.ends_with("(1 row)\n"));
    }

    #[rstest]
    #[case(&[])]
    #[case(&[&[] as &[&str]])]
    fn test_empty_data(#[case] data: &[&[&str]]) {
        assert_eq!(format_query_results_psql(&rows(data)), "");
    }

    #[rstest]
    fn test_unicode_width() {
        let data = rows(&[&["名前"], &["é"]]);
        assert_eq!(format_query_results_psql(&data), "名前\n--\né \n(1 row)\n");
    }

    #[rstest]
    #[case(1, "Query OK, 1 row affected\n")]
    #[case(3, "Query OK, 3 rows affected\n")]
    fn test_affected_summary(#[case] count: u64, #[case] expected: &str) {
        assert_eq!(format_query_result(&QueryResult::affected(count)), expected);
    }

    #[rstest]
    fn test_affected_rows_column_in_a_select_renders_as_table() {
        let result = QueryResult::new(
            vec!["affected_rows".to_string()],
            vec![vec![Some("7".to_string())]],
        );
        assert_eq!(format_query_result(&result), "affected_rows\n-------------\n            7\n(1 row)\n");
    }

    fn people() -> QueryResult {
        QueryResult::new(
            vec!["id".to_string(), "note".to_string()],
            vec![
                vec![Some("1".to_string()), Some("a|b".to_string())],
                vec![Some("2".to_string()), None],
            ],
        )
    }

    #[rstest]
    fn test_markdown_table() {
        assert_eq!(
            format_query_result_markdown(&people()),
            "| id | note |\n| --- | --- |\n| 1 | a\\|b |\n| 2 |  |\n"
        );
    }

    #[rstest]
    fn test_markdown_row_limit() {
        let rows = (0..MARKDOWN_ROW_LIMIT + 5).map(|i| vec![Some(i.to_string())]).collect();
        let out = format_query_result_markdown(&QueryResult::new(vec!["n".to_string()], rows));
        assert_eq!(out.lines().filter(|l| l.starts_with("| ")).count(), MARKDOWN_ROW_LIMIT + 2);
        assert!(out.ends_with("... showing first 100 of 105 rows\n"));
    }

    #[rstest]
    fn test_csv_quotes_and_nulls() {
        let result = QueryResult::new(
            vec!["id".to_string(), "name".to_string()],
            vec![
                vec![Some("1".to_string()), Some("Smith, Jo".to_string())],
                vec![Some("2".to_string()), None],
            ],
        );
        assert_eq!(format_query_result_csv(&result), "id,name\n1,\"Smith, Jo\"\n2,\n");
    }

    #[rstest]
    #[case(OutputFormat::Table)]
    #[case(OutputFormat::Markdown)]
    #[case(OutputFormat::Csv)]
    fn test_affected_summary_in_every_format(#[case] output: OutputFormat) {
        assert_eq!(
            format_query_result_as(&QueryResult::affected(2), output),
            "Query OK, 2 rows affected\n"
        );
    }

    #[rstest]
    #[case("count orders per user", "SELECT u.id, COUNT(*) FROM orders o JOIN users u ON o.user_id = u.id", "orders_users_count_joined.csv")]
    #[case("list customers", "select * from customers", "customers_list.csv")]
    #[case("hello there big world again", "SELECT 1", "hello_there_big_world.csv")]
    #[case("", "SELECT 1", "query_results.csv")]
    fn test_export_file_name(#[case] request: &str, #[case] sql: &str, #[case] expected: &str) {
        assert_eq!(export_file_name(request, sql), expected);
    }

    #[rstest]
    fn test_result_json() {
        let result = QueryResult::new(vec!["n".to_string()], vec![vec![None]]);
        let parsed: serde_json::Value =
            serde_json::from_str(&format_query_result_json(&result)).unwrap();
        assert_eq!(parsed[0]["n"], serde_json::Value::Null);
    }

    #[rstest]
    fn test_name_list_marks_current() {
        let names = vec!["shop".to_string(), "warehouse".to_string()];
        let out = format_name_list(&names, Some("warehouse"));
        let line = out.lines().find(|l| l.contains("warehouse")).unwrap();
        assert!(line.contains('*'));
        let line = out.lines().find(|l| l.contains("shop")).unwrap();
        assert!(!line.contains('*'));
    }

    #[rstest]
    fn test_training_status_table() {
        let mut status = BTreeMap::new();
        status.insert("shop".to_string(), TrainingStatus::untrained());
        status.insert(
            "warehouse".to_string(),
            TrainingStatus {
                trained: true,
                tables: Some(4),
                cached_at: Some("2026-01-01T00:00:00+00:00".to_string()),
                in_memory: Some(false),
            },
        );
        let out = format_training_status(&status);
        assert!(out.contains("Database"));
        let line = out.lines().find(|l| l.contains("warehouse")).unwrap();
        assert!(line.contains("yes") && line.contains('4'));
    }
}
