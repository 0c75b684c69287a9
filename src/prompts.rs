//! Prompt construction for translation requests.
//!
//! The whole request is a single user-role message. Keeping the template
//! here means unit tests can pin its exact wording, and any change to it is
//! a one-line diff.

/// Instruction prefix; `{language}` and the source text are appended by
/// [`build_translation_prompt`].
pub const TRANSLATION_TEMPLATE: &str =
    "Translate the following text into {language} and format the result in Markdown:";

/// Build the instruction for translating `source_text` into `target_language`.
///
/// The source text is embedded verbatim after a blank line: no truncation,
/// no escaping. JSON encoding of the request body is the transport's job.
pub fn build_translation_prompt(source_text: &str, target_language: &str) -> String {
    let header = TRANSLATION_TEMPLATE.replace("{language}", target_language);
    let mut prompt = String::with_capacity(header.len() + 2 + source_text.len());
    prompt.push_str(&header);
    prompt.push_str("\n\n");
    prompt.push_str(source_text);
    prompt
}
