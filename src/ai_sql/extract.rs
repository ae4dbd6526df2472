//! Pulling SQL out of free-form model output

use regex::Regex;
use std::sync::OnceLock;

/// Statement verbs recognised when no `sql` fence is present, in search order
const SQL_VERBS: [&str; 7] = ["SELECT", "INSERT", "UPDATE", "DELETE", "CREATE", "ALTER", "DROP"];

/// Prefixes that mark a statement as data- or schema-mutating
const DESTRUCTIVE_PREFIXES: [&str; 7] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "TRUNCATE", "ALTER", "CREATE",
];

fn sql_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)```sql\s*(.*?)\s*```").expect("valid regex"))
}

fn verb_fences() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        SQL_VERBS
            .iter()
            .map(|verb| Regex::new(&format!(r"(?is)```\s*({verb}\b.*?)\s*```")).expect("valid regex"))
            .collect()
    })
}

fn bare_statements() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        SQL_VERBS
            .iter()
            .map(|verb| Regex::new(&format!(r"(?is)\b({verb}\s+.*?)(?:;|$)")).expect("valid regex"))
            .collect()
    })
}

/// SQL inside a ```sql fence, or a bare fence opening with a SQL verb.
pub fn extract_fenced_sql(text: &str) -> Option<String> {
    if let Some(caps) = sql_fence().captures(text) {
        return Some(caps[1].trim().to_string());
    }
    verb_fences()
        .iter()
        .find_map(|re| re.captures(text))
        .map(|caps| caps[1].trim().to_string())
}

/// Best-effort SQL from a model reply.
///
/// Tries fenced blocks first, then the first bare statement starting with a
/// known verb (terminated with `;`). Text with no SQL comes back unchanged.
pub fn extract_sql(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    if let Some(sql) = extract_fenced_sql(text) {
        return sql;
    }
    for re in bare_statements() {
        if let Some(caps) = re.captures(text) {
            let statement = caps[1].trim().trim_end_matches(';');
            return format!("{statement};");
        }
    }
    text.to_string()
}

/// Keyword-prefix check used for confirmation prompts. Not a security boundary.
pub fn is_destructive(sql: &str) -> bool {
    let normalized = sql.trim().to_uppercase();
    DESTRUCTIVE_PREFIXES
        .iter()
        .any(|prefix| normalized.starts_with(prefix))
}
