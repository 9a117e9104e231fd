use thiserror::Error;

/// Coarse classification used by callers to decide how a failure is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing entity, or an authorization failure disguised as one.
    NotFound,
    /// Business-rule rejection that is safe to show to the end user.
    PreconditionFailed,
    Validation,
    Internal,
}

#[derive(Debug, Error)]
pub enum MessagingError {
    /// Also returned when the acting user is not allowed to see or touch the
    /// conversation, so callers cannot tell the two cases apart.
    #[error("conversation not found")]
    ConversationNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("user block not found")]
    UserBlockNotFound,

    #[error("conversation report not found")]
    ConversationReportNotFound,

    #[error("listing not found")]
    ListingNotFound,

    #[error("messaging is muted for this user")]
    MessagingMuted,

    #[error("recipient does not accept direct messages")]
    DirectMessagesDisabled,

    #[error("user is blocked")]
    UserIsBlocked,

    #[error("a conversation request is already pending")]
    ConversationRequestAlreadyPending,

    #[error("a user cannot target themselves")]
    SelfTarget,

    #[error("mute duration must be at least one day and end on a representable date")]
    InvalidMuteDuration,

    #[error("delivery failed: {0}")]
    Delivery(anyhow::Error),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl MessagingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConversationNotFound
            | Self::UserNotFound
            | Self::UserBlockNotFound
            | Self::ConversationReportNotFound
            | Self::ListingNotFound => ErrorKind::NotFound,
            Self::MessagingMuted
            | Self::DirectMessagesDisabled
            | Self::UserIsBlocked
            | Self::ConversationRequestAlreadyPending => ErrorKind::PreconditionFailed,
            Self::SelfTarget | Self::InvalidMuteDuration => ErrorKind::Validation,
            Self::Delivery(_) | Self::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Text that may be shown to the end user. Not-found failures all render
    /// the same way so they reveal nothing about which rule rejected the call.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MessagingMuted => "You are temporarily not allowed to send messages.",
            Self::DirectMessagesDisabled => "This user does not accept direct messages.",
            Self::UserIsBlocked => "You cannot message this user.",
            Self::ConversationRequestAlreadyPending => {
                "A message request between you and this user is already waiting for a response."
            }
            Self::SelfTarget => "You cannot do this to yourself.",
            Self::InvalidMuteDuration => "Mute duration must be at least one day and not absurdly long.",
            _ => match self.kind() {
                ErrorKind::NotFound => "Not found.",
                _ => "Something went wrong. Please try again later.",
            },
        }
    }
}

/// A stored enum value that does not match any known variant.
#[derive(Debug, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_failures_render_identically() {
        let messages: Vec<_> = [
            MessagingError::ConversationNotFound,
            MessagingError::UserNotFound,
            MessagingError::ConversationReportNotFound,
        ]
        .iter()
        .map(|e| e.user_message())
        .collect();

        assert!(messages.iter().all(|m| *m == "Not found."));
    }

    #[test]
    fn precondition_failures_are_specific() {
        let err = MessagingError::DirectMessagesDisabled;
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(err.user_message(), "This user does not accept direct messages.");
    }

    #[test]
    fn storage_errors_are_internal() {
        let err: MessagingError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(!err.user_message().contains("disk"));
    }
}
