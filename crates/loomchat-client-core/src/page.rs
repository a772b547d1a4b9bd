use crate::auth::AuthSnapshot;

/// The four page states, one of which is rendered per evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageView {
    Loading,
    Error { message: String },
    Chat,
    SignIn,
}

/// Priority order: loading beats error beats an authenticated user beats the
/// anonymous fallback. Loading and Error are terminal for the evaluation.
#[must_use]
pub fn select_page_view(auth: &AuthSnapshot) -> PageView {
    if auth.is_loading {
        return PageView::Loading;
    }
    if let Some(message) = &auth.error {
        return PageView::Error {
            message: message.clone(),
        };
    }
    if auth.is_authenticated {
        return PageView::Chat;
    }
    PageView::SignIn
}

/// The two chat-surface compositions observed in deployments: the full
/// surface with welcome banner, follow-up suggestions, and an explicit
/// composer footer, or a single minimal transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatLayout {
    #[default]
    Full,
    Minimal,
}

impl ChatLayout {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "full" => Some(Self::Full),
            "minimal" => Some(Self::Minimal),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Minimal => "minimal",
        }
    }
}
