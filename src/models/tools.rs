use serde::{Deserialize, Serialize};

/// Per-request tool toggles chosen by the user for a single send.
///
/// Code execution and URL context are mutually exclusive: the Gemini API
/// rejects requests carrying both, so enabling one clears the other. All
/// mutation goes through the setters to keep that invariant standing at all
/// times, not just at submit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    web_search: bool,
    code_execution: bool,
    url_context: bool,
    study_mode: bool,
    deep_reasoning: bool,
}

impl ToolConfig {
    pub fn web_search(&self) -> bool {
        self.web_search
    }

    pub fn code_execution(&self) -> bool {
        self.code_execution
    }

    pub fn url_context(&self) -> bool {
        self.url_context
    }

    pub fn study_mode(&self) -> bool {
        self.study_mode
    }

    pub fn deep_reasoning(&self) -> bool {
        self.deep_reasoning
    }

    pub fn set_web_search(&mut self, on: bool) {
        self.web_search = on;
    }

    pub fn set_code_execution(&mut self, on: bool) {
        self.code_execution = on;
        if on {
            self.url_context = false;
        }
    }

    pub fn set_url_context(&mut self, on: bool) {
        self.url_context = on;
        if on {
            self.code_execution = false;
        }
    }

    pub fn set_study_mode(&mut self, on: bool) {
        self.study_mode = on;
    }

    pub fn set_deep_reasoning(&mut self, on: bool) {
        self.deep_reasoning = on;
    }

    pub fn with_web_search(mut self, on: bool) -> Self {
        self.set_web_search(on);
        self
    }

    pub fn with_code_execution(mut self, on: bool) -> Self {
        self.set_code_execution(on);
        self
    }

    pub fn with_url_context(mut self, on: bool) -> Self {
        self.set_url_context(on);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_execution_and_url_context_are_exclusive() {
        let mut tools = ToolConfig::default();

        tools.set_code_execution(true);
        tools.set_url_context(true);
        assert!(tools.url_context());
        assert!(!tools.code_execution());

        tools.set_code_execution(true);
        assert!(tools.code_execution());
        assert!(!tools.url_context());

        // Disabling one never resurrects the other
        tools.set_code_execution(false);
        assert!(!tools.code_execution());
        assert!(!tools.url_context());
    }

    #[test]
    fn exclusivity_holds_under_arbitrary_toggle_sequences() {
        let mut tools = ToolConfig::default();
        let flips = [true, true, false, true, false, false, true];
        for (i, on) in flips.into_iter().enumerate() {
            if i % 2 == 0 {
                tools.set_code_execution(on);
            } else {
                tools.set_url_context(on);
            }
            assert!(!(tools.code_execution() && tools.url_context()));
        }
    }

    #[test]
    fn web_search_is_independent() {
        let mut tools = ToolConfig::default().with_web_search(true);
        tools.set_code_execution(true);
        tools.set_url_context(true);
        assert!(tools.web_search());
    }
}
