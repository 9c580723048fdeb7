use crate::attributes::MessageAttributes;
use crate::errors::{Result, WarrenError};
use crate::filters::MessageFilters;

/// A queue operation descriptor handed to a backend at submission.
///
/// Attributes and filters travel as value snapshots taken when the command
/// is built, so a backend can never observe later caller mutation.
#[derive(Debug, Clone)]
pub enum Command {
    /// Store a message, creating its queue and account as needed. An
    /// existing id is overwritten.
    CreateMessage {
        account: String,
        queue: String,
        message_id: String,
        body: Vec<u8>,
        attributes: Option<MessageAttributes>,
    },
    /// Apply assigned attribute fields to one message, hidden or not.
    UpdateMessage {
        account: String,
        queue: String,
        message_id: String,
        attributes: Option<MessageAttributes>,
        filters: Option<MessageFilters>,
    },
    /// Apply assigned attribute fields to every matching message.
    UpdateMessages {
        account: String,
        queue: String,
        attributes: Option<MessageAttributes>,
        filters: Option<MessageFilters>,
    },
    /// Fetch one message, hidden or not.
    GetMessage {
        account: String,
        queue: String,
        message_id: String,
        filters: Option<MessageFilters>,
    },
    /// Fetch every matching message.
    GetMessages {
        account: String,
        queue: String,
        filters: Option<MessageFilters>,
    },
    /// Remove one message, hidden or not.
    DeleteMessage {
        account: String,
        queue: String,
        message_id: String,
        filters: Option<MessageFilters>,
    },
    /// Remove every matching message.
    DeleteMessages {
        account: String,
        queue: String,
        filters: Option<MessageFilters>,
    },
    /// Enumerate the account's queues.
    GetQueues {
        account: String,
        filters: Option<MessageFilters>,
    },
    /// Remove matching queues and their messages.
    DeleteQueues {
        account: String,
        filters: Option<MessageFilters>,
    },
    /// Enumerate accounts.
    GetAccounts { filters: Option<MessageFilters> },
    /// Remove matching accounts and everything under them.
    DeleteAccounts { filters: Option<MessageFilters> },
}

impl Command {
    /// Stable snake_case operation name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::CreateMessage { .. } => "create_message",
            Command::UpdateMessage { .. } => "update_message",
            Command::UpdateMessages { .. } => "update_messages",
            Command::GetMessage { .. } => "get_message",
            Command::GetMessages { .. } => "get_messages",
            Command::DeleteMessage { .. } => "delete_message",
            Command::DeleteMessages { .. } => "delete_messages",
            Command::GetQueues { .. } => "get_queues",
            Command::DeleteQueues { .. } => "delete_queues",
            Command::GetAccounts { .. } => "get_accounts",
            Command::DeleteAccounts { .. } => "delete_accounts",
        }
    }

    /// Check every identifier the command carries. Called by the client
    /// before submission; a failure means nothing reached the backend.
    pub fn validate(&self) -> Result<()> {
        match self {
            Command::CreateMessage {
                account,
                queue,
                message_id,
                ..
            }
            | Command::UpdateMessage {
                account,
                queue,
                message_id,
                ..
            }
            | Command::GetMessage {
                account,
                queue,
                message_id,
                ..
            }
            | Command::DeleteMessage {
                account,
                queue,
                message_id,
                ..
            } => {
                check_name("account", account)?;
                check_name("queue", queue)?;
                check_name("message id", message_id)
            }
            Command::UpdateMessages { account, queue, .. }
            | Command::GetMessages { account, queue, .. }
            | Command::DeleteMessages { account, queue, .. } => {
                check_name("account", account)?;
                check_name("queue", queue)
            }
            Command::GetQueues { account, .. } | Command::DeleteQueues { account, .. } => {
                check_name("account", account)
            }
            Command::GetAccounts { .. } | Command::DeleteAccounts { .. } => Ok(()),
        }
    }
}

fn check_name(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(WarrenError::InvalidArgument(format!("{what} is empty")));
    }
    // '/' is the path separator in the wire protocol; anything else,
    // spaces included, is a legal identifier.
    if value.contains('/') {
        return Err(WarrenError::InvalidArgument(format!(
            "{what} {value:?} contains '/'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_message(account: &str, queue: &str, id: &str) -> Command {
        Command::GetMessage {
            account: account.into(),
            queue: queue.into(),
            message_id: id.into(),
            filters: None,
        }
    }

    #[test]
    fn test_valid_identifiers_pass() {
        assert!(get_message("acct-1", "q.main", "msg_01").validate().is_ok());
        assert!(Command::GetAccounts { filters: None }.validate().is_ok());
    }

    #[test]
    fn test_spaces_are_legal_in_identifiers() {
        assert!(get_message("my acct", "my queue", "my messageid")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_empty_identifier_rejected() {
        let err = get_message("acct", "", "m1").validate().unwrap_err();
        assert!(matches!(err, WarrenError::InvalidArgument(_)));
    }

    #[test]
    fn test_slash_rejected() {
        assert!(get_message("a/b", "q", "m").validate().is_err());
        assert!(get_message("a", "q/1", "m").validate().is_err());
        assert!(get_message("a", "q", "m/x").validate().is_err());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(get_message("a", "q", "m").kind(), "get_message");
        assert_eq!(
            Command::DeleteAccounts { filters: None }.kind(),
            "delete_accounts"
        );
    }
}
