use nu_ansi_term::{Color, Style};
use reedline::{Highlighter, StyledText};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

const KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE",
    "REPLACE", "TABLE", "VIEW", "INDEX", "DATABASE", "SCHEMA", "GROUP", "BY", "ORDER", "HAVING",
    "JOIN", "LEFT", "RIGHT", "INNER", "OUTER", "CROSS", "UNION", "LIMIT", "OFFSET", "ASC", "DESC",
    "DISTINCT", "ALL", "IN", "BETWEEN", "LIKE", "REGEXP", "IS", "NULL", "AND", "OR", "NOT", "AS",
    "WITH", "ON", "USING", "VALUES", "SET", "INTO", "DEFAULT", "PRIMARY", "KEY", "FOREIGN",
    "REFERENCES", "CONSTRAINT", "UNIQUE", "CHECK", "CASE", "WHEN", "THEN", "ELSE", "END", "EXISTS",
    "IF", "SHOW", "DESCRIBE", "EXPLAIN", "AUTO_INCREMENT", "ENGINE", "CHARSET", "COLLATE",
];

const TYPES: &[&str] = &[
    "INT", "INTEGER", "TINYINT", "SMALLINT", "MEDIUMINT", "BIGINT", "DECIMAL", "NUMERIC", "FLOAT",
    "DOUBLE", "BIT", "BOOL", "BOOLEAN", "CHAR", "VARCHAR", "TEXT", "TINYTEXT", "MEDIUMTEXT",
    "LONGTEXT", "BLOB", "LONGBLOB", "BINARY", "VARBINARY", "ENUM", "JSON", "DATE", "TIME",
    "DATETIME", "TIMESTAMP", "YEAR", "UNSIGNED",
];

const FUNCTIONS: &[&str] = &[
    "COUNT", "SUM", "AVG", "MIN", "MAX", "COALESCE", "IFNULL", "NULLIF", "GREATEST", "LEAST", "NOW",
    "CURDATE", "CURRENT_DATE", "CURRENT_TIMESTAMP", "DATE_FORMAT", "DATE_ADD", "DATE_SUB",
    "DATEDIFF", "EXTRACT", "SUBSTRING", "CONCAT", "CONCAT_WS", "GROUP_CONCAT", "TRIM", "UPPER",
    "LOWER", "LENGTH", "CHAR_LENGTH", "ROUND", "FLOOR", "CEIL", "ABS", "CAST", "CONVERT",
    "JSON_EXTRACT", "ROW_NUMBER", "RANK", "DENSE_RANK", "OVER", "PARTITION",
];

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?s)--[^\n]*|#[^\n]*|/\*.*?\*/|'(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*"|`[^`]*`|\b\d+(?:\.\d+)?\b|\b\w+\b"#,
        )
        .expect("valid regex")
    })
}

/// MySQL-flavoured syntax colouring for the REPL line and printed statements
pub struct SqlHighlighter {
    keywords: HashSet<&'static str>,
    types: HashSet<&'static str>,
    functions: HashSet<&'static str>,
}

impl Default for SqlHighlighter {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlHighlighter {
    pub fn new() -> Self {
        Self {
            keywords: KEYWORDS.iter().copied().collect(),
            types: TYPES.iter().copied().collect(),
            functions: FUNCTIONS.iter().copied().collect(),
        }
    }

    fn style_for(&self, token: &str) -> Style {
        let first = token.chars().next().unwrap_or(' ');
        if token.starts_with("--") || token.starts_with('#') || token.starts_with("/*") {
            return Style::new().fg(Color::DarkGray).italic();
        }
        match first {
            '\'' | '"' => return Style::new().fg(Color::Red),
            '`' => return Style::new().fg(Color::Cyan),
            c if c.is_ascii_digit() => return Style::new().fg(Color::Yellow),
            _ => {}
        }

        let upper = token.to_uppercase();
        if self.keywords.contains(upper.as_str()) {
            Style::new().fg(Color::Blue).bold()
        } else if self.types.contains(upper.as_str()) {
            Style::new().fg(Color::Green).bold()
        } else if self.functions.contains(upper.as_str()) {
            Style::new().fg(Color::Purple).bold()
        } else {
            Style::new()
        }
    }

    /// ANSI-coloured copy of `sql` for printing
    pub fn paint(&self, sql: &str) -> String {
        self.highlight(sql, 0).render_simple()
    }
}

impl Highlighter for SqlHighlighter {
    fn highlight(&self, line: &str, _cursor: usize) -> StyledText {
        let mut styled = StyledText::new();
        let mut last_end = 0;

        for token in token_regex().find_iter(line) {
            if token.start() > last_end {
                styled.push((Style::new(), line[last_end..token.start()].to_string()));
            }
            styled.push((self.style_for(token.as_str()), token.as_str().to_string()));
            last_end = token.end();
        }
        if last_end < line.len() {
            styled.push((Style::new(), line[last_end..].to_string()));
        }
        styled
    }
}
