use std::collections::BTreeMap;
use std::io::Write;

use loomchat_client_core::auth::{IdentityWiring, UserIdentity};
use loomchat_client_core::page::{ChatLayout, PageView};
use loomchat_client_core::transcript::{SpeakerRole, TranscriptMessage};

/// Render one page view. Loading and Error are fixed content; SignIn points
/// at the wiring's login destination; the chat surface renders elsewhere.
pub fn page(view: &PageView, wiring: &IdentityWiring) {
    match view {
        PageView::Loading => println!("Loading..."),
        PageView::Error { message } => println!("{message}"),
        PageView::Chat => {}
        PageView::SignIn => println!("Login: {}", wiring.login_destination()),
    }
}

pub fn welcome(layout: ChatLayout, user: Option<&UserIdentity>) {
    if layout == ChatLayout::Minimal {
        return;
    }
    if let Some(user) = user {
        println!("signed in as {}", display_name(user));
    }
    println!("How can I help you today?");
    println!("try: \"summarize my open threads\" / \"draft a reply\"");
    println!("commands: /new, /resume <thread-id>, /quit");
    println!();
}

pub fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

#[must_use]
pub fn display_name(user: &UserIdentity) -> &str {
    user.name
        .as_deref()
        .or(user.email.as_deref())
        .unwrap_or(&user.id)
}

#[must_use]
pub fn speaker_label(role: &SpeakerRole) -> &'static str {
    match role {
        SpeakerRole::User => "you",
        SpeakerRole::Assistant => "assistant",
        SpeakerRole::System => "system",
    }
}

#[must_use]
pub fn transcript_lines(messages: &[TranscriptMessage]) -> Vec<String> {
    messages
        .iter()
        .map(|message| format!("{}: {}", speaker_label(&message.role), message.text))
        .collect()
}

/// Prints assistant text as it grows across partial snapshots. Partial
/// events carry the full text so far, so only the unseen suffix is printed.
#[derive(Debug, Default)]
pub struct StreamPrinter {
    printed: BTreeMap<String, String>,
    open_line: bool,
}

impl StreamPrinter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record text as already shown without printing it, so transcript
    /// content that predates this stream is not replayed.
    pub fn mark_printed(&mut self, id: &str, text: &str) {
        self.printed.insert(id.to_string(), text.to_string());
    }

    pub fn print_growth(&mut self, id: &str, text: &str) {
        let previous = self.printed.get(id).cloned().unwrap_or_default();
        if text == previous {
            return;
        }
        if let Some(suffix) = text.strip_prefix(previous.as_str()) {
            print!("{suffix}");
        } else {
            // The snapshot was rewritten rather than extended; restart the line.
            if self.open_line {
                println!();
            }
            print!("{text}");
        }
        self.printed.insert(id.to_string(), text.to_string());
        self.open_line = true;
        let _ = std::io::stdout().flush();
    }

    pub fn finish_line(&mut self) {
        if self.open_line {
            println!();
            self.open_line = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_prefers_name_then_email_then_id() {
        let mut user = UserIdentity::from_id("u1");
        assert_eq!(display_name(&user), "u1");
        user.email = Some("u1@example.com".to_string());
        assert_eq!(display_name(&user), "u1@example.com");
        user.name = Some("Ursula".to_string());
        assert_eq!(display_name(&user), "Ursula");
    }

    #[test]
    fn transcript_lines_label_speakers() {
        let messages = vec![
            TranscriptMessage {
                id: "m1".to_string(),
                role: SpeakerRole::User,
                text: "hello".to_string(),
                streaming: false,
            },
            TranscriptMessage {
                id: "m2".to_string(),
                role: SpeakerRole::Assistant,
                text: "hi there".to_string(),
                streaming: false,
            },
        ];
        assert_eq!(
            transcript_lines(&messages),
            vec!["you: hello".to_string(), "assistant: hi there".to_string()]
        );
    }
}
