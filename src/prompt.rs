use crate::ai_sql::GenerationMode;
use reedline::{Prompt, PromptEditMode, PromptHistorySearch, PromptHistorySearchStatus};
use std::borrow::Cow;

/// `daibai [db|llm|mode]> ` with `-` for an unset selection
pub struct SessionPrompt {
    database: Option<String>,
    provider: Option<String>,
    mode: GenerationMode,
    auto_execute: bool,
}

impl SessionPrompt {
    pub fn new(
        database: Option<&str>,
        provider: Option<&str>,
        mode: GenerationMode,
        auto_execute: bool,
    ) -> Self {
        Self {
            database: database.map(str::to_string),
            provider: provider.map(str::to_string),
            mode,
            auto_execute,
        }
    }

    pub fn label(&self) -> String {
        format!(
            "daibai [{}|{}|{}{}]> ",
            self.database.as_deref().unwrap_or("-"),
            self.provider.as_deref().unwrap_or("-"),
            self.mode,
            if self.auto_execute { "!" } else { "" }
        )
    }
}

impl Prompt for SessionPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        Cow::Owned(self.label())
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, edit_mode: PromptEditMode) -> Cow<'_, str> {
        match edit_mode {
            PromptEditMode::Vi(reedline::PromptViMode::Normal) => Cow::Borrowed("[NOR] "),
            PromptEditMode::Vi(reedline::PromptViMode::Insert) => Cow::Borrowed("[INS] "),
            _ => Cow::Borrowed(""),
        }
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("... ")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "failing ",
        };
        match history_search.term.as_str() {
            "" => Cow::Owned(format!("({prefix}reverse-i-search): ")),
            term => Cow::Owned(format!("({prefix}reverse-i-search '{term}'): ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some("shop"), Some("gpt"), GenerationMode::Sql, false, "daibai [shop|gpt|sql]> ")]
    #[case(None, Some("gpt"), GenerationMode::Ddl, false, "daibai [-|gpt|ddl]> ")]
    #[case(Some("shop"), None, GenerationMode::Crud, true, "daibai [shop|-|crud!]> ")]
    fn test_prompt_label(
        #[case] database: Option<&str>,
        #[case] provider: Option<&str>,
        #[case] mode: GenerationMode,
        #[case] auto_execute: bool,
        #[case] expected: &str,
    ) {
        let prompt = SessionPrompt::new(database, provider, mode, auto_execute);
        assert_eq!(prompt.render_prompt_left(), expected);
    }
}
