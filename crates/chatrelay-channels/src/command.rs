/// An inbound message, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/start`
    Start,
    /// `/clear`
    Clear,
    /// `/setrole <text>`; the text may be empty or span several lines.
    SetRole(String),
    /// `/getrole`
    GetRole,
    /// Anything else, forwarded to the model as-is.
    Text(String),
}

impl Command {
    /// Classify `text`.
    ///
    /// Recognized commands may carry a `@botname` suffix. Unknown commands
    /// are ordinary text.
    pub fn parse(text: &str) -> Self {
        let Some(rest) = text.strip_prefix('/') else {
            return Command::Text(text.to_string());
        };

        let (head, args) = match rest.find(char::is_whitespace) {
            Some(idx) => (&rest[..idx], rest[idx..].trim_start()),
            None => (rest, ""),
        };
        let name = head.split('@').next().unwrap_or(head);

        match name.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "clear" => Command::Clear,
            "setrole" => Command::SetRole(args.to_string()),
            "getrole" => Command::GetRole,
            _ => Command::Text(text.to_string()),
        }
    }
}
