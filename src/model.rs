use serde::{Deserialize, Serialize};

/// A news store item waiting to be mailed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub id: i64,
    pub title: String,
    pub teaser: String,
    pub uri: String,
    /// Id of the consumption record that ties this item to its source.
    pub consumption_key: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub id: i64,
    pub name: String,
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupDescriptor {
    pub id: i64,
    pub title: String,
}

/// Sender of a mailing. Only constructible with a non-empty email.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SenderIdentity {
    pub name: Option<String>,
    pub email: String,
}

impl SenderIdentity {
    pub fn new(name: Option<String>, email: impl Into<String>) -> Option<Self> {
        let email = email.into();
        let email = email.trim();
        if email.is_empty() {
            return None;
        }
        Some(Self {
            name: name.filter(|n| !n.trim().is_empty()),
            email: email.to_string(),
        })
    }
}

/// Everything the mailing service needs to create one mailing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MailingRequest {
    pub name: String,
    pub subject: String,
    pub body_html: String,
    pub group_id: i64,
    pub sender: SenderIdentity,
    pub created_by: Option<i64>,
}

/// Identifier of a mailing created by the mailing service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MailingHandle(pub i64);

impl std::fmt::Display for MailingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Final state of a dispatch run, as stored in the run ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunOutcome {
    Empty,
    Draft,
    Sent,
    Partial,
    Failed,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Empty => "empty",
            RunOutcome::Draft => "draft",
            RunOutcome::Sent => "sent",
            RunOutcome::Partial => "partial",
            RunOutcome::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "empty" => Some(RunOutcome::Empty),
            "draft" => Some(RunOutcome::Draft),
            "sent" => Some(RunOutcome::Sent),
            "partial" => Some(RunOutcome::Partial),
            "failed" => Some(RunOutcome::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_requires_email() {
        assert!(SenderIdentity::new(Some("News".into()), "  ").is_none());
        let s = SenderIdentity::new(Some(" ".into()), " news@example.org ").unwrap();
        assert_eq!(s.email, "news@example.org");
        assert_eq!(s.name, None);
    }

    #[test]
    fn unknown_outcome_does_not_parse() {
        assert_eq!(RunOutcome::parse("partial"), Some(RunOutcome::Partial));
        assert_eq!(RunOutcome::parse("queued"), None);
    }
}
