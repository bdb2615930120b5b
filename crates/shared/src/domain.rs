use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(SessionId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Scheduled,
    InProgress,
    Completed,
    Expired,
    Rejected,
}

impl SessionStatus {
    /// Statuses after which the live transcript is replaced by the stored one.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Expired)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Joined,
    Error,
}

impl ConnectionStatus {
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connected | Self::Joined)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AiRequestKind {
    #[default]
    HelpMe,
    Explain,
    Code,
    FollowUp,
    Summarize,
    #[serde(other)]
    Other,
}

impl AiRequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HelpMe => "HELP_ME",
            Self::Explain => "EXPLAIN",
            Self::Code => "CODE",
            Self::FollowUp => "FOLLOW_UP",
            Self::Summarize => "SUMMARIZE",
            Self::Other => "OTHER",
        }
    }

    /// Lenient parse used by the console front end; accepts `help-me`, `help_me`, `HELP_ME`.
    pub fn parse_loose(raw: &str) -> Option<Self> {
        let normalized = raw.trim().replace('-', "_").to_ascii_uppercase();
        match normalized.as_str() {
            "HELP" | "HELP_ME" => Some(Self::HelpMe),
            "EXPLAIN" => Some(Self::Explain),
            "CODE" => Some(Self::Code),
            "FOLLOW_UP" | "FOLLOWUP" => Some(Self::FollowUp),
            "SUMMARIZE" | "SUMMARY" => Some(Self::Summarize),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}
