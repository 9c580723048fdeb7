use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::allocator::Allocator;

// ---------------------------------------------------------------------------
// Attribute mask
// ---------------------------------------------------------------------------

bitflags::bitflags! {
    /// Which fields of a [`MessageAttributes`] carry a caller-assigned value.
    ///
    /// Backends consult the mask to decide which fields to apply; a field
    /// whose bit is clear is ignored even though it still reads as `0`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AttributeSet: u32 {
        /// The TTL field has been assigned.
        const TTL = 1 << 0;
        /// The hide field has been assigned.
        const HIDE = 1 << 1;
    }
}

// ---------------------------------------------------------------------------
// Message attributes
// ---------------------------------------------------------------------------

/// Per-message metadata: time-to-live and hide durations, in seconds,
/// plus the mask recording which of them the caller actually assigned.
///
/// Setters assign the field and mark its bit. Readers return whatever the
/// field holds without consulting the mask, so an unassigned field reads
/// as `0`.
///
/// # Example
///
/// ```rust
/// use warren::{AttributeSet, MessageAttributes};
///
/// let mut attrs = MessageAttributes::new().with_ttl(120);
/// attrs.set_hide(10);
/// assert_eq!(attrs.ttl(), 120);
/// assert!(attrs.check(AttributeSet::TTL | AttributeSet::HIDE));
///
/// // `unset` replaces the whole mask with its argument.
/// attrs.unset(AttributeSet::HIDE);
/// assert!(!attrs.check(AttributeSet::TTL));
/// assert_eq!(attrs.hide(), 10);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageAttributes {
    ttl: u32,
    hide: u32,
    set: AttributeSet,
}

impl MessageAttributes {
    /// Create attributes with both fields zero and nothing assigned.
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-initialize in place: both fields back to zero, mask emptied.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Assign the TTL in seconds and mark it as set.
    pub fn set_ttl(&mut self, ttl: u32) {
        self.ttl = ttl;
        self.set |= AttributeSet::TTL;
    }

    /// Assign the hide duration in seconds and mark it as set.
    pub fn set_hide(&mut self, hide: u32) {
        self.hide = hide;
        self.set |= AttributeSet::HIDE;
    }

    /// Chainable form of [`set_ttl`](Self::set_ttl).
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.set_ttl(ttl);
        self
    }

    /// Chainable form of [`set_hide`](Self::set_hide).
    pub fn with_hide(mut self, hide: u32) -> Self {
        self.set_hide(hide);
        self
    }

    /// The TTL field, `0` if never assigned.
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// The hide field, `0` if never assigned.
    pub fn hide(&self) -> u32 {
        self.hide
    }

    /// Replace the whole mask with `set`.
    ///
    /// This is an assignment, not a bit-clear: `unset(AttributeSet::TTL)`
    /// leaves exactly the TTL bit marked. Field values are untouched.
    pub fn unset(&mut self, set: AttributeSet) {
        self.set = set;
    }

    /// `true` if **any** bit of `set` is marked. Not a subset test.
    pub fn check(&self, set: AttributeSet) -> bool {
        self.set.intersects(set)
    }

    /// The current mask.
    pub fn assigned(&self) -> AttributeSet {
        self.set
    }

    /// Byte size of an attribute object, for callers that account for raw
    /// storage. This is the amount charged to an [`Allocator`] per managed
    /// or charged object.
    pub fn size() -> usize {
        mem::size_of::<Self>()
    }
}

// ---------------------------------------------------------------------------
// Managed-attributes handle
// ---------------------------------------------------------------------------

/// Key for an attribute object owned by a [`Client`] registry.
///
/// Ids are client-scoped and never reused within a client's lifetime.
/// Using an id after [`Client::free_attributes`] fails with
/// [`WarrenError::InvalidArgument`](crate::WarrenError::InvalidArgument)
/// rather than touching freed storage.
///
/// [`Client`]: crate::Client
/// [`Client::free_attributes`]: crate::Client::free_attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributesId(pub(crate) u64);

impl fmt::Display for AttributesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attributes#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Charged attributes
// ---------------------------------------------------------------------------

/// A caller-owned attribute object whose storage is charged against a
/// client's [`Allocator`].
///
/// Created by [`Client::charged_attributes`]; the charge is released when
/// the value drops or when [`into_inner`](Self::into_inner) detaches the
/// plain [`MessageAttributes`]. The held allocator is used only to route
/// the release; the object never appears in the client's registry.
///
/// [`Client::charged_attributes`]: crate::Client::charged_attributes
#[derive(Debug)]
pub struct ChargedAttributes {
    attributes: MessageAttributes,
    allocator: Option<Arc<dyn Allocator>>,
}

impl ChargedAttributes {
    pub(crate) fn new(attributes: MessageAttributes, allocator: Arc<dyn Allocator>) -> Self {
        Self {
            attributes,
            allocator: Some(allocator),
        }
    }

    /// Detach the attributes as a plain value, releasing the charge now.
    pub fn into_inner(mut self) -> MessageAttributes {
        if let Some(allocator) = self.allocator.take() {
            allocator.release(MessageAttributes::size());
        }
        mem::take(&mut self.attributes)
    }
}

impl Deref for ChargedAttributes {
    type Target = MessageAttributes;

    fn deref(&self) -> &MessageAttributes {
        &self.attributes
    }
}

impl DerefMut for ChargedAttributes {
    fn deref_mut(&mut self) -> &mut MessageAttributes {
        &mut self.attributes
    }
}

impl Drop for ChargedAttributes {
    fn drop(&mut self) {
        if let Some(allocator) = self.allocator.take() {
            allocator.release(MessageAttributes::size());
        }
    }
}
