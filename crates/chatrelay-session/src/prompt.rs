use crate::transcript::Transcript;

/// Persona used when a user has not set a role.
pub const DEFAULT_ROLE: &str = "You are a helpful AI assistant. In the request, \"AI:\" marks \
your previous replies and \"User:\" marks the user's messages.";

/// Build the prompt for one turn.
///
/// Layout: the role, then each retained turn as a `User:` line followed by an
/// `AI:` line, then the new message and a bare `AI:` cue for the backend to
/// complete.
pub fn compose_prompt(role: &str, transcript: &Transcript, user_text: &str) -> String {
    let history_len: usize = transcript
        .iter()
        .map(|t| t.user_text.len() + t.ai_text.len() + 12)
        .sum();
    let mut prompt = String::with_capacity(role.len() + history_len + user_text.len() + 16);

    prompt.push_str(role);
    for turn in transcript.iter() {
        prompt.push_str("\nUser: ");
        prompt.push_str(&turn.user_text);
        prompt.push_str("\nAI: ");
        prompt.push_str(&turn.ai_text);
    }
    prompt.push_str("\nUser: ");
    prompt.push_str(user_text);
    prompt.push_str("\nAI:");
    prompt
}
