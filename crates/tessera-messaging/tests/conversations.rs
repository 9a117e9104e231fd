mod common;

use chrono::Duration;
use uuid::Uuid;

use common::{Harness, Notification};
use tessera_types::MessagingError;
use tessera_types::api::{SendMessage, StartConversation, StartDisposition};
use tessera_types::directory::ListingCatalog;
use tessera_types::models::{ConversationFilter, ConversationStatus, MessageCursor};

fn send(h: &Harness, conversation_id: Uuid, sender_id: Uuid, content: &str) -> Result<Uuid, MessagingError> {
    h.conversations
        .send_message(SendMessage {
            conversation_id,
            sender_id,
            content: content.to_string(),
        })
        .map(|m| m.id)
}

#[test]
fn request_then_accept() {
    let h = Harness::new();
    let (a, b) = (h.user(), h.user());

    let outcome = h.start(b, a, "Hi");
    assert_eq!(outcome.disposition, StartDisposition::RequestCreated);

    let pending = h.conversation(outcome.conversation_id);
    assert_eq!(pending.status, ConversationStatus::Pending);
    assert_eq!(pending.responded_at, None);
    assert_eq!(h.message_count(pending.id), 1);

    h.clock.advance(Duration::minutes(5));
    let accepted = h.conversations.accept_conversation(pending.id, a).unwrap();
    assert_eq!(accepted.status, ConversationStatus::Accepted);
    assert_eq!(accepted.responded_at, Some(h.now()));

    let sent = h.notifier.take();
    let new_messages = sent
        .iter()
        .filter(|n| matches!(n, Notification::NewMessage { recipient_id, .. } if *recipient_id == a))
        .count();
    let accepts = sent
        .iter()
        .filter(|n| **n == Notification::Accepted(pending.id))
        .count();
    assert_eq!(new_messages, 1);
    assert_eq!(accepts, 1);
    assert!(sent.contains(&Notification::Request(pending.id)));
}

#[test]
fn only_the_recipient_may_answer_a_pending_request() {
    let h = Harness::new();
    let (a, b, stranger) = (h.user(), h.user(), h.user());
    let id = h.start(a, b, "hey").conversation_id;

    for actor in [a, stranger] {
        let err = h.conversations.accept_conversation(id, actor).unwrap_err();
        assert!(matches!(err, MessagingError::ConversationNotFound));
    }

    h.conversations.deny_conversation(id, b).unwrap();
    let err = h.conversations.accept_conversation(id, b).unwrap_err();
    assert!(matches!(err, MessagingError::ConversationNotFound));
    assert_eq!(h.conversation(id).status, ConversationStatus::Denied);

    let err = h
        .conversations
        .accept_conversation(Uuid::new_v4(), b)
        .unwrap_err();
    assert!(matches!(err, MessagingError::ConversationNotFound));
}

#[test]
fn direct_messages_disabled_only_gates_general_requests() {
    let h = Harness::new();
    let seller = h.user_with(|u| u.allow_direct_messages = false);
    let buyer = h.user();

    let err = h
        .conversations
        .start_conversation(StartConversation {
            initiator_id: buyer,
            recipient_id: seller,
            listing_id: None,
            initial_message: "hi".into(),
        })
        .unwrap_err();
    assert!(matches!(err, MessagingError::DirectMessagesDisabled));

    let listing = h.listing(seller);
    let outcome = h.start_about(buyer, seller, &listing, "is this still available?");
    let conversation = h.conversation(outcome.conversation_id);
    assert_eq!(conversation.status, ConversationStatus::Pending);
    assert_eq!(conversation.listing_id, Some(listing.id));
    assert_eq!(conversation.puzzle_id, listing.puzzle_id);
}

#[test]
fn blocked_initiator_cannot_start() {
    let h = Harness::new();
    let (a, b) = (h.user(), h.user());
    h.blocks.block_user(a, b).unwrap();

    let err = h
        .conversations
        .start_conversation(StartConversation {
            initiator_id: b,
            recipient_id: a,
            listing_id: None,
            initial_message: "hi".into(),
        })
        .unwrap_err();
    assert!(matches!(err, MessagingError::UserIsBlocked));

    // The blocker can still reach out
    h.start(a, b, "actually, hi");
}

#[test]
fn one_pending_request_per_pair() {
    let h = Harness::new();
    let (a, b) = (h.user(), h.user());
    h.start(a, b, "first");

    for (from, to) in [(a, b), (b, a)] {
        let err = h
            .conversations
            .start_conversation(StartConversation {
                initiator_id: from,
                recipient_id: to,
                listing_id: None,
                initial_message: "again".into(),
            })
            .unwrap_err();
        assert!(matches!(err, MessagingError::ConversationRequestAlreadyPending));
    }
}

#[test]
fn general_start_reuses_an_accepted_thread() {
    let h = Harness::new();
    let (a, b) = (h.user(), h.user());
    let id = h.accepted(a, b);
    h.notifier.take();

    let outcome = h.start(b, a, "me again");
    assert_eq!(outcome.conversation_id, id);
    assert_eq!(outcome.disposition, StartDisposition::ExistingThreadReused);
    assert_eq!(h.message_count(id), 2);
    assert_eq!(h.conversations.conversations(a, ConversationFilter::Inbox).unwrap().len(), 1);

    let sent = h.notifier.take();
    assert!(sent.contains(&Notification::NewMessage {
        recipient_id: a,
        message_id: outcome.message_id
    }));
    assert!(!sent.iter().any(|n| matches!(n, Notification::Request(_))));
}

#[test]
fn each_listing_gets_its_own_accepted_thread() {
    let h = Harness::new();
    let (buyer, seller) = (h.user(), h.user());
    let general = h.accepted(buyer, seller);
    let listing = h.listing(seller);

    let first = h.start_about(buyer, seller, &listing, "about the 1000 piece one");
    assert_eq!(first.disposition, StartDisposition::ListingThreadCreated);
    assert_ne!(first.conversation_id, general);

    let thread = h.conversation(first.conversation_id);
    assert_eq!(thread.status, ConversationStatus::Accepted);
    assert_eq!(thread.listing_id, Some(listing.id));
    assert!(thread.responded_at.is_some());

    let again = h.start_about(seller, buyer, &listing, "yes, still here");
    assert_eq!(again.conversation_id, first.conversation_id);
    assert_eq!(again.disposition, StartDisposition::ExistingThreadReused);
    assert_eq!(h.message_count(first.conversation_id), 2);
}

#[test]
fn removed_listing_cannot_anchor_a_conversation() {
    let h = Harness::new();
    let (buyer, seller) = (h.user(), h.user());
    let listing = h.listing(seller);
    h.listings.remove(listing.id).unwrap();

    let err = h
        .conversations
        .start_conversation(StartConversation {
            initiator_id: buyer,
            recipient_id: seller,
            listing_id: Some(listing.id),
            initial_message: "hi".into(),
        })
        .unwrap_err();
    assert!(matches!(err, MessagingError::ListingNotFound));
}

#[test]
fn self_and_unknown_targets_are_rejected() {
    let h = Harness::new();
    let a = h.user();

    let start = |to| {
        h.conversations.start_conversation(StartConversation {
            initiator_id: a,
            recipient_id: to,
            listing_id: None,
            initial_message: "hi".into(),
        })
    };
    assert!(matches!(start(a).unwrap_err(), MessagingError::SelfTarget));
    assert!(matches!(start(Uuid::new_v4()).unwrap_err(), MessagingError::UserNotFound));
}

#[test]
fn recipient_must_accept_before_replying() {
    let h = Harness::new();
    let (a, b, stranger) = (h.user(), h.user(), h.user());
    let id = h.start(a, b, "hi").conversation_id;

    assert!(matches!(send(&h, id, b, "reply").unwrap_err(), MessagingError::ConversationNotFound));
    assert!(matches!(send(&h, id, stranger, "psst").unwrap_err(), MessagingError::ConversationNotFound));
    send(&h, id, a, "follow-up").unwrap();

    h.conversations.ignore_conversation(id, b).unwrap();
    send(&h, id, a, "still there?").unwrap();
    assert!(matches!(send(&h, id, b, "no").unwrap_err(), MessagingError::ConversationNotFound));
    assert_eq!(h.message_count(id), 3);
}

#[test]
fn denied_conversations_are_closed_to_everyone() {
    let h = Harness::new();
    let (a, b) = (h.user(), h.user());
    let id = h.start(a, b, "hi").conversation_id;
    h.conversations.deny_conversation(id, b).unwrap();

    for sender in [a, b] {
        assert!(matches!(send(&h, id, sender, "x").unwrap_err(), MessagingError::ConversationNotFound));
    }
    assert!(h.notifier.take().contains(&Notification::Denied(id)));
}

#[test]
fn missing_conversation_wins_over_missing_sender() {
    let h = Harness::new();
    let err = send(&h, Uuid::new_v4(), Uuid::new_v4(), "x").unwrap_err();
    assert!(matches!(err, MessagingError::ConversationNotFound));

    let (a, b) = (h.user(), h.user());
    let id = h.start(a, b, "hi").conversation_id;
    let err = send(&h, id, Uuid::new_v4(), "x").unwrap_err();
    assert!(matches!(err, MessagingError::UserNotFound));
}

#[test]
fn long_messages_are_truncated() {
    let h = Harness::new();
    let (a, b) = (h.user(), h.user());
    let id = h.accepted(a, b);

    let content = "ü".repeat(2500);
    let message = h
        .conversations
        .send_message(SendMessage {
            conversation_id: id,
            sender_id: a,
            content,
        })
        .unwrap();
    assert_eq!(message.content.chars().count(), 2000);
}

#[test]
fn muted_sender_is_refused_until_expiry() {
    let h = Harness::new();
    let (a, b) = (h.user(), h.user());
    let id = h.accepted(a, b);

    let mut user = h.load_user(a);
    user.messaging_muted_until = Some(h.now() + Duration::days(1));
    h.users.upsert(&user).unwrap();

    assert!(matches!(send(&h, id, a, "x").unwrap_err(), MessagingError::MessagingMuted));
    let err = h
        .conversations
        .start_conversation(StartConversation {
            initiator_id: a,
            recipient_id: h.user(),
            listing_id: None,
            initial_message: "hi".into(),
        })
        .unwrap_err();
    assert!(matches!(err, MessagingError::MessagingMuted));

    h.clock.advance(Duration::days(1) + Duration::seconds(1));
    send(&h, id, a, "back").unwrap();
}

#[test]
fn blocking_stops_messages_on_existing_threads() {
    let h = Harness::new();
    let (a, b) = (h.user(), h.user());
    let id = h.accepted(a, b);

    h.blocks.block_user(b, a).unwrap();
    assert!(matches!(send(&h, id, a, "hello?").unwrap_err(), MessagingError::UserIsBlocked));
    send(&h, id, b, "one last thing").unwrap();

    h.blocks.unblock_user(b, a).unwrap();
    send(&h, id, a, "hello again").unwrap();
}

#[test]
fn sending_touches_last_message_at_and_pushes_unread_count() {
    let h = Harness::new();
    let (a, b) = (h.user(), h.user());
    let id = h.accepted(a, b);
    h.notifier.take();

    h.clock.advance(Duration::minutes(3));
    let message_id = send(&h, id, a, "ping").unwrap();

    assert_eq!(h.conversation(id).last_message_at, Some(h.now()));
    assert_eq!(
        h.notifier.take(),
        vec![
            Notification::NewMessage {
                recipient_id: b,
                message_id
            },
            Notification::UnreadCount { user_id: b, count: 1 },
        ]
    );
}

#[test]
fn mark_read_clears_only_the_other_sides_messages() {
    let h = Harness::new();
    let (a, b) = (h.user(), h.user());
    let id = h.accepted(a, b);
    send(&h, id, a, "one").unwrap();
    send(&h, id, b, "two").unwrap();
    assert_eq!(h.conversations.unread_count(b).unwrap(), 1);
    h.notifier.take();

    h.clock.advance(Duration::minutes(1));
    let marked = h.conversations.mark_messages_as_read(id, b).unwrap();
    assert_eq!(marked, 2);
    assert_eq!(h.conversations.unread_count(b).unwrap(), 0);
    assert_eq!(h.conversations.unread_count(a).unwrap(), 1);

    assert_eq!(
        h.notifier.take(),
        vec![
            Notification::UnreadCount { user_id: b, count: 0 },
            Notification::MessagesRead {
                sender_id: a,
                conversation_id: id
            },
        ]
    );

    let page = h.conversations.messages(id, a, None, None).unwrap();
    for message in page.iter().filter(|m| m.sender_id == a) {
        let read_at = message.read_at.unwrap();
        assert!(read_at >= message.sent_at);
    }

    // Nothing left to mark: the count is still pushed, the receipt is not
    assert_eq!(h.conversations.mark_messages_as_read(id, b).unwrap(), 0);
    assert_eq!(h.notifier.take(), vec![Notification::UnreadCount { user_id: b, count: 0 }]);
}

#[test]
fn mark_read_by_outsider_is_a_no_op() {
    let h = Harness::new();
    let (a, b, stranger) = (h.user(), h.user(), h.user());
    let id = h.accepted(a, b);
    h.notifier.take();

    assert_eq!(h.conversations.mark_messages_as_read(id, stranger).unwrap(), 0);
    assert_eq!(h.conversations.unread_count(b).unwrap(), 1);
    assert!(h.notifier.take().is_empty());

    let err = h
        .conversations
        .mark_messages_as_read(Uuid::new_v4(), a)
        .unwrap_err();
    assert!(matches!(err, MessagingError::ConversationNotFound));
}

#[test]
fn ignore_refreshes_both_conversation_lists() {
    let h = Harness::new();
    let (a, b) = (h.user(), h.user());
    let id = h.start(a, b, "hi").conversation_id;
    h.notifier.take();

    h.conversations.ignore_conversation(id, b).unwrap();
    assert_eq!(
        h.notifier.take(),
        vec![
            Notification::Ignored(id),
            Notification::ListChanged(a),
            Notification::ListChanged(b),
        ]
    );

    let ignored = h.conversations.conversations(b, ConversationFilter::Ignored).unwrap();
    assert_eq!(ignored.len(), 1);
    assert!(h.conversations.conversations(b, ConversationFilter::Requests).unwrap().is_empty());
    // The initiator is not told
    assert_eq!(h.conversations.conversations(a, ConversationFilter::Inbox).unwrap().len(), 1);
}

#[test]
fn notifier_outage_does_not_fail_commands() {
    let h = Harness::new();
    let (a, b) = (h.user(), h.user());
    h.notifier.fail(true);

    let id = h.start(a, b, "hi").conversation_id;
    h.conversations.accept_conversation(id, b).unwrap();
    send(&h, id, b, "welcome").unwrap();
    h.conversations.mark_messages_as_read(id, a).unwrap();

    assert_eq!(h.conversation(id).status, ConversationStatus::Accepted);
    assert_eq!(h.message_count(id), 2);
    assert!(h.notifier.take().is_empty());
}

#[test]
fn inbox_overview_carries_unread_and_last_message() {
    let h = Harness::new();
    let (a, b, c) = (h.user(), h.user(), h.user());
    let with_b = h.accepted(a, b);
    h.clock.advance(Duration::minutes(1));
    send(&h, with_b, b, "news").unwrap();
    h.clock.advance(Duration::minutes(1));
    h.start(c, a, "can we talk?");

    let inbox = h.conversations.conversations(a, ConversationFilter::Inbox).unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].other_user_id, b);
    assert_eq!(inbox[0].unread_count, 1);
    assert_eq!(inbox[0].last_message.as_ref().unwrap().content, "news");

    let requests = h.conversations.conversations(a, ConversationFilter::Requests).unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].other_user_id, c);
}

#[test]
fn message_history_pages_newest_first() {
    let h = Harness::new();
    let (a, b, stranger) = (h.user(), h.user(), h.user());
    let id = h.accepted(a, b);
    for i in 0..5 {
        h.clock.advance(Duration::seconds(10));
        send(&h, id, a, &format!("m{}", i)).unwrap();
    }

    let first = h.conversations.messages(id, b, Some(2), None).unwrap();
    assert_eq!(
        first.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
        ["m4", "m3"]
    );

    let cursor = MessageCursor::from(first.last().unwrap());
    let next = h.conversations.messages(id, b, Some(2), Some(cursor)).unwrap();
    assert_eq!(
        next.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
        ["m2", "m1"]
    );

    let err = h.conversations.messages(id, stranger, None, None).unwrap_err();
    assert!(matches!(err, MessagingError::ConversationNotFound));
}

#[test]
fn paging_does_not_skip_messages_sent_in_the_same_instant() {
    let h = Harness::new();
    let (a, b) = (h.user(), h.user());
    let id = h.accepted(a, b);
    for i in 0..4 {
        send(&h, id, a, &format!("same tick {}", i)).unwrap();
    }

    let mut seen = 0;
    let mut cursor = None;
    loop {
        let page = h.conversations.messages(id, b, Some(2), cursor).unwrap();
        let Some(last) = page.last() else { break };
        cursor = Some(MessageCursor::from(last));
        seen += page.len();
    }
    assert_eq!(seen, h.message_count(id));
}

#[test]
fn unread_count_ignores_pending_and_blocked_threads() {
    let h = Harness::new();
    let (a, b, c, d) = (h.user(), h.user(), h.user(), h.user());
    let with_b = h.accepted(b, a);
    let with_c = h.accepted(c, a);
    send(&h, with_b, b, "again").unwrap();
    send(&h, with_c, c, "hi").unwrap();
    h.start(d, a, "pending");

    assert_eq!(h.conversations.unread_count(a).unwrap(), 2);

    h.blocks.block_user(a, c).unwrap();
    assert_eq!(h.conversations.unread_count(a).unwrap(), 1);
}
