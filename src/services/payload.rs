use crate::models::{Message, Persona, ToolConfig};
use crate::providers::types::{ChatMessage, GenerationRequest, ToolSelection};
use crate::services::settings::AppSettings;

/// Separator between system-instruction sections. Keeps ordering readable to
/// the model even when individual sections are absent.
const SECTION_SEPARATOR: &str = "\n\n---\n\n";

const STUDY_MODE_DIRECTIVE: &str = "You are in study mode. Act as a patient tutor: \
    break problems into steps, ask guiding questions before revealing answers, and \
    check the user's understanding as you go.";

const FORMATTING_DIRECTIVE: &str = "Format responses for readability: use short \
    paragraphs, Markdown headings and lists where they help, and fenced code blocks \
    with a language tag for any code.";

const DEEP_REASONING_DIRECTIVE: &str = "Reason carefully and thoroughly before \
    answering. Prefer correctness over speed and state your assumptions explicitly.";

const SEARCH_REQUIRED_DIRECTIVE: &str = "The user has enabled web search for this \
    request. You must use it to ground your answer and cite your sources.";

const SEARCH_CONSERVATIVE_DIRECTIVE: &str = "Web search is available. Use it only \
    when the request clearly needs real-time or post-cutoff information; otherwise \
    answer from your own knowledge.";

/// Everything the builder needs for one generation call.
///
/// Pure data in, pure data out: no I/O, no hidden state, so prompt
/// composition and tool resolution stay unit-testable.
pub struct PayloadInput<'a> {
    pub messages: &'a [Message],
    pub persona: Option<&'a Persona>,
    pub settings: &'a AppSettings,
    pub tools: ToolConfig,
    /// Conversation-level study flag; the per-call toggle also counts.
    pub study_mode: bool,
    pub model: &'a str,
}

pub fn build_request(input: PayloadInput<'_>) -> GenerationRequest {
    let tools = resolve_tools(&input);
    let system_instruction = build_system_instruction(&input, &tools);

    let messages = input
        .messages
        .iter()
        .map(|m| ChatMessage {
            role: m.role,
            content: m.content.clone(),
            attachments: m.attachments.clone(),
        })
        .collect();

    GenerationRequest {
        model: input.model.to_string(),
        messages,
        system_instruction,
        tools,
        include_thoughts: input.settings.show_thoughts,
        json_response: false,
    }
}

fn resolve_tools(input: &PayloadInput<'_>) -> ToolSelection {
    let persona_search = input.persona.is_some_and(|p| p.web_search);
    let persona_code = input.persona.is_some_and(|p| p.code_execution);
    let persona_url = input.persona.is_some_and(|p| p.url_context);

    let mut code_execution = input.tools.code_execution() || persona_code;
    let mut url_context = input.tools.url_context() || persona_url;

    // The per-call toggles are already exclusive; a conflict can only come
    // from persona defaults. The explicit per-call choice wins, then code
    // execution as the tie-break.
    if code_execution && url_context {
        if input.tools.url_context() {
            code_execution = false;
        } else {
            url_context = false;
        }
    }

    // A default-driven search yields to url context; explicit and persona
    // search do not.
    let web_search = input.tools.web_search()
        || persona_search
        || (input.settings.default_web_search && !url_context);

    ToolSelection {
        web_search,
        code_execution,
        url_context,
    }
}

fn build_system_instruction(input: &PayloadInput<'_>, tools: &ToolSelection) -> Option<String> {
    let mut sections: Vec<&str> = Vec::new();

    if input.study_mode || input.tools.study_mode() {
        sections.push(STUDY_MODE_DIRECTIVE);
    }

    if let Some(persona) = input.persona {
        if !persona.system_prompt.is_empty() {
            sections.push(&persona.system_prompt);
        }
    }

    if input.settings.system_prompt_enabled {
        if let Some(prompt) = input.settings.system_prompt.as_deref() {
            if !prompt.is_empty() {
                sections.push(prompt);
            }
        }
    }

    if input.settings.optimize_formatting {
        sections.push(FORMATTING_DIRECTIVE);
    }

    if input.tools.deep_reasoning() {
        sections.push(DEEP_REASONING_DIRECTIVE);
    }

    if let Some(directive) = search_directive(input, tools) {
        sections.push(directive);
    }

    if sections.is_empty() {
        None
    } else {
        Some(sections.join(SECTION_SEPARATOR))
    }
}

/// Highest-priority rule wins: an explicit per-call search toggle demands
/// grounded, cited answers; a default-on search only gets the conservative
/// steering text when the optimizer setting asks for it and url context is
/// not driving; otherwise the tool may be registered with no steering at all.
fn search_directive(input: &PayloadInput<'_>, tools: &ToolSelection) -> Option<&'static str> {
    if input.tools.web_search() {
        return Some(SEARCH_REQUIRED_DIRECTIVE);
    }
    if input.settings.default_web_search && !tools.url_context && input.settings.optimize_prompts {
        return Some(SEARCH_CONSERVATIVE_DIRECTIVE);
    }
    None
}
