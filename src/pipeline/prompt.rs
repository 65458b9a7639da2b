//! Prompt assembly

/// Instruction added when the user sent a voice note
pub const LISTEN_INSTRUCTION: &str = "Listen to the audio and answer.";

/// Placeholder for a message without text
pub const MEDIA_PLACEHOLDER: &str = "[Media]";

/// Build the text part sent alongside any media
///
/// Layout: sender handle, prior exchanges, then the message itself. The
/// listen instruction is appended for voice notes.
pub fn assemble(sender: &str, history: &str, message: &str, has_voice: bool) -> String {
    let message = if message.trim().is_empty() {
        MEDIA_PLACEHOLDER
    } else {
        message.trim()
    };

    let mut prompt = format!("FROM: @{}\n", sender);
    if !history.is_empty() {
        prompt.push_str("CONTEXT:\n");
        prompt.push_str(history);
        prompt.push('\n');
    }
    prompt.push_str("MESSAGE:\n");
    prompt.push_str(message);
    if has_voice {
        prompt.push('\n');
        prompt.push_str(LISTEN_INSTRUCTION);
    }
    prompt
}
