use crate::attributes::MessageAttributes;

/// A message as reported by a backend.
///
/// Bodies are opaque bytes; the attributes carry whatever metadata the
/// backend knows about the message, with the corresponding mask bits set.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message identifier, unique within its queue.
    pub id: String,
    /// Opaque message body.
    pub body: Vec<u8>,
    /// Metadata reported alongside the body.
    pub attributes: MessageAttributes,
}

impl Message {
    /// Assemble a message result.
    pub fn new(id: impl Into<String>, body: impl Into<Vec<u8>>, attributes: MessageAttributes) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            attributes,
        }
    }
}
