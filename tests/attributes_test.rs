use std::sync::Arc;

use warren::{AttributeSet, Client, MessageAttributes, QuotaAllocator, WarrenError};

fn quota_client(limit: usize) -> (Client, Arc<QuotaAllocator>) {
    let quota = Arc::new(QuotaAllocator::new(limit));
    let client = Client::builder()
        .backend("memory")
        .allocator(quota.clone())
        .build()
        .unwrap();
    (client, quota)
}

// ---------------------------------------------------------------------------
// Value semantics
// ---------------------------------------------------------------------------

#[test]
fn test_new_attributes_are_zeroed() {
    let attrs = MessageAttributes::new();
    assert_eq!(attrs.ttl(), 0);
    assert_eq!(attrs.hide(), 0);
    assert!(attrs.assigned().is_empty());
    assert!(!attrs.check(AttributeSet::TTL | AttributeSet::HIDE));
}

#[test]
fn test_setters_assign_and_mark() {
    let mut attrs = MessageAttributes::new();
    attrs.set_ttl(300);
    assert_eq!(attrs.ttl(), 300);
    assert!(attrs.check(AttributeSet::TTL));
    assert!(!attrs.check(AttributeSet::HIDE));

    attrs.set_hide(60);
    assert_eq!(attrs.hide(), 60);
    assert_eq!(attrs.assigned(), AttributeSet::TTL | AttributeSet::HIDE);
}

#[test]
fn test_with_chain_marks_both() {
    let attrs = MessageAttributes::new().with_ttl(120).with_hide(10);
    assert_eq!(attrs.ttl(), 120);
    assert_eq!(attrs.hide(), 10);
    assert_eq!(attrs.assigned(), AttributeSet::TTL | AttributeSet::HIDE);
}

#[test]
fn test_zero_values_still_count_as_assigned() {
    let attrs = MessageAttributes::new().with_hide(0);
    assert_eq!(attrs.hide(), 0);
    assert!(attrs.check(AttributeSet::HIDE));
}

#[test]
fn test_unset_replaces_the_whole_mask() {
    let mut attrs = MessageAttributes::new().with_ttl(100).with_hide(10);

    // The argument becomes the mask; it is not subtracted from it.
    attrs.unset(AttributeSet::HIDE);
    assert!(attrs.check(AttributeSet::HIDE));
    assert!(!attrs.check(AttributeSet::TTL));

    // Field values survive mask edits.
    assert_eq!(attrs.ttl(), 100);
    assert_eq!(attrs.hide(), 10);

    attrs.unset(AttributeSet::empty());
    assert!(attrs.assigned().is_empty());
}

#[test]
fn test_check_matches_any_assigned_bit() {
    let attrs = MessageAttributes::new().with_ttl(5);
    // One assigned bit out of two queried is enough.
    assert!(attrs.check(AttributeSet::TTL | AttributeSet::HIDE));
    assert!(!attrs.check(AttributeSet::HIDE));
    assert!(!attrs.check(AttributeSet::empty()));
}

#[test]
fn test_reset_restores_default() {
    let mut attrs = MessageAttributes::new().with_ttl(100).with_hide(10);
    attrs.reset();
    assert_eq!(attrs, MessageAttributes::new());
}

#[test]
fn test_clone_is_independent() {
    let original = MessageAttributes::new().with_ttl(100);
    let mut copy = original.clone();
    copy.set_hide(10);
    copy.unset(AttributeSet::empty());

    assert_eq!(original.assigned(), AttributeSet::TTL);
    assert_eq!(original.hide(), 0);
}

#[test]
fn test_size_is_nonzero() {
    assert!(MessageAttributes::size() > 0);
}

// ---------------------------------------------------------------------------
// Managed attributes (client registry)
// ---------------------------------------------------------------------------

#[test]
fn test_create_attributes_charges_allocator() {
    let (mut client, quota) = quota_client(1024);
    let id = client.create_attributes().unwrap();

    assert_eq!(quota.used(), MessageAttributes::size());
    assert_eq!(client.attributes(id), Some(&MessageAttributes::new()));
    assert_eq!(client.attributes_count(), 1);
}

#[test]
fn test_create_from_copies_values() {
    let (mut client, _quota) = quota_client(1024);
    let src = MessageAttributes::new().with_ttl(60);
    let id = client.create_attributes_from(&src).unwrap();

    assert_eq!(client.attributes(id), Some(&src));

    // The registry holds a copy, not a reference.
    let mut detached = src;
    detached.set_hide(10);
    assert_eq!(client.attributes(id).unwrap().hide(), 0);
}

#[test]
fn test_attributes_mut_edits_in_place() {
    let (mut client, _quota) = quota_client(1024);
    let id = client.create_attributes().unwrap();

    client.attributes_mut(id).unwrap().set_ttl(300);
    assert_eq!(client.attributes(id).unwrap().ttl(), 300);
}

#[test]
fn test_free_keeps_other_ids_live() {
    let (mut client, quota) = quota_client(1024);
    let first = client.create_attributes().unwrap();
    let second = client.create_attributes().unwrap();
    let third = client.create_attributes().unwrap();

    client.free_attributes(second).unwrap();

    assert!(client.attributes(second).is_none());
    assert!(client.attributes(first).is_some());
    assert!(client.attributes(third).is_some());
    assert_eq!(client.attributes_count(), 2);
    assert_eq!(quota.used(), 2 * MessageAttributes::size());
}

#[test]
fn test_free_stale_id_is_invalid_argument() {
    let (mut client, _quota) = quota_client(1024);
    let id = client.create_attributes().unwrap();
    client.free_attributes(id).unwrap();

    let err = client.free_attributes(id).unwrap_err();
    assert!(matches!(err, WarrenError::InvalidArgument(_)));
    assert!(err.to_string().contains("not live"));
}

#[test]
fn test_quota_refusal_surfaces_as_out_of_memory() {
    let (mut client, quota) = quota_client(MessageAttributes::size() - 1);
    let err = client.create_attributes().unwrap_err();

    assert!(matches!(err, WarrenError::OutOfMemory(_)));
    assert!(err.to_string().contains("quota exceeded"));
    assert_eq!(client.attributes_count(), 0);
    assert_eq!(quota.used(), 0);
}

#[test]
fn test_client_drop_releases_unfreed_objects() {
    let (mut client, quota) = quota_client(1024);
    let first = client.create_attributes().unwrap();
    client.create_attributes().unwrap();
    client.create_attributes().unwrap();
    client.free_attributes(first).unwrap();

    drop(client);
    assert_eq!(quota.used(), 0);
}

// ---------------------------------------------------------------------------
// Charged attributes
// ---------------------------------------------------------------------------

#[test]
fn test_charged_attributes_release_on_drop() {
    let (client, quota) = quota_client(1024);
    let mut charged = client.charged_attributes().unwrap();
    assert_eq!(quota.used(), MessageAttributes::size());

    charged.set_ttl(30);
    assert_eq!(charged.ttl(), 30);

    drop(charged);
    assert_eq!(quota.used(), 0);
}

#[test]
fn test_into_inner_releases_once() {
    let (client, quota) = quota_client(1024);
    let src = MessageAttributes::new().with_ttl(60);
    let charged = client.charged_attributes_from(&src).unwrap();

    let plain = charged.into_inner();
    assert_eq!(quota.used(), 0);
    assert_eq!(plain, src);

    // The detached plain value carries no charge of its own.
    drop(plain);
    assert_eq!(quota.used(), 0);
}

#[test]
fn test_charged_attributes_stay_out_of_the_registry() {
    let (client, _quota) = quota_client(1024);
    let _charged = client.charged_attributes().unwrap();
    assert_eq!(client.attributes_count(), 0);
}

#[test]
fn test_charged_refusal_creates_nothing() {
    let (client, quota) = quota_client(0);
    assert!(client.charged_attributes().is_err());
    assert_eq!(quota.used(), 0);
}
