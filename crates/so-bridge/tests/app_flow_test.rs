mod common;

use std::rc::Rc;

use futures::executor::block_on;

use common::{CountingIdentity, Harness};
use so_bridge::backend::Backend;
use so_core::config::BackendKind;
use so_bridge::controller::{ChatOpenOutcome, ChatPanelState};
use so_bridge::demo::LocalMessageStore;
use so_bridge::modal::{AuthTab, KeyAction, ModalState, Redirect, SubmitOutcome};
use so_bridge::nav::NavState;
use so_bridge::{BusEvent, Topic};
use so_core::backend::MessageStore;
use so_core::profile::ProfileDraft;
use so_core::profile_store::ProfileStore;
use so_core::storage::{KeyValueStore, MemoryStorage};
use so_core::types::{ConversationId, MessageDraft, Session};

fn draft(author: &str, body: &str) -> MessageDraft {
    MessageDraft {
        author_id: author.to_string(),
        author_name: author.to_string(),
        body: body.to_string(),
    }
}

fn signed_in_harness() -> Harness {
    let mut h = Harness::demo();
    h.ui.open_modal(AuthTab::SignIn, Some("nav-login"));
    let outcome = h.run(h.ui.clone().sign_in("aida@example.com", "pw"));
    assert!(matches!(outcome, SubmitOutcome::Succeeded { .. }));
    h
}

#[test]
fn chat_without_session_prompts_sign_in() {
    let h = Harness::demo();
    let opened = h.ctx.bus.subscribe_channel(Topic::ChatOpen);

    assert_eq!(h.ui.open_chat(Some("chat-button")), ChatOpenOutcome::SignInRequired);
    assert_eq!(h.ui.snapshot().modal, ModalState::SignIn);
    assert_eq!(h.ui.chat_state(), ChatPanelState::Closed);
    assert!(opened.try_recv().is_err());

    assert_eq!(
        h.ui.handle_modal_key("Escape", false, None),
        KeyAction::Close {
            restore: Some("chat-button")
        }
    );
}

#[test]
fn stored_session_opens_chat_with_history() {
    let kv: Rc<dyn KeyValueStore> = Rc::new(MemoryStorage::new());
    ProfileStore::new(Rc::clone(&kv))
        .mirror_session(&Session::new("u-aida").with_display_name("Aida"))
        .unwrap();
    let seed = LocalMessageStore::with_storage(Rc::clone(&kv));
    let global = ConversationId::global();
    block_on(seed.append(&global, draft("u-bo", "first"))).unwrap();
    block_on(seed.append(&global, draft("u-aida", "second"))).unwrap();
    drop(seed);

    let h = Harness::with_storage(kv);
    let opened = h.ctx.bus.subscribe_channel(Topic::ChatOpen);
    assert!(matches!(h.ui.nav(), NavState::SignedIn { ref display_name, .. } if display_name == "Aida"));

    assert_eq!(h.ui.open_chat(None), ChatOpenOutcome::Opened(global.clone()));
    assert_eq!(
        opened.try_recv().unwrap(),
        BusEvent::ChatOpen {
            conversation_id: global.clone()
        }
    );
    assert_eq!(h.ui.chat_state(), ChatPanelState::Open);

    let view = h.ctx.feed.view();
    let bodies: Vec<&str> = view.entries.iter().map(|e| e.message.body.as_str()).collect();
    assert_eq!(bodies, vec!["first", "second"]);
    assert!(view.entries[1].from_self);
    assert!(!view.entries[0].from_self);
}

#[test]
fn sign_in_without_avatar_redirects_to_profile() {
    let mut h = Harness::demo();
    h.ui.open_modal(AuthTab::SignIn, Some("nav-login"));
    let outcome = h.run(h.ui.clone().sign_in("  aida@example.com ", "pw"));
    assert_eq!(
        outcome,
        SubmitOutcome::Succeeded {
            redirect: Redirect::Profile,
            restore: Some("nav-login"),
        }
    );
    assert!(!h.ui.snapshot().modal.is_open());
    match h.ui.nav() {
        NavState::SignedIn {
            display_name,
            initial,
            avatar,
        } => {
            assert_eq!(display_name, "aida");
            assert_eq!(initial, "A");
            assert_eq!(avatar, None);
        }
        NavState::Guest => panic!("expected signed-in nav"),
    }
}

#[test]
fn sign_in_with_stored_avatar_redirects_to_chat() {
    let mut h = Harness::demo();
    h.ctx
        .store
        .save_profile(&so_core::types::Profile {
            name: "Aida".into(),
            avatar: Some("data:image/png;base64,AAAA".into()),
            ..Default::default()
        })
        .unwrap();
    h.ui.open_modal(AuthTab::SignIn, None);
    let outcome = h.run(h.ui.clone().sign_in("aida@example.com", "pw"));
    assert!(matches!(
        outcome,
        SubmitOutcome::Succeeded {
            redirect: Redirect::Chat,
            ..
        }
    ));
}

#[test]
fn missing_password_is_rejected_inline() {
    let mut h = Harness::demo();
    h.ui.open_modal(AuthTab::SignIn, None);
    let outcome = h.run(h.ui.clone().sign_in("aida@example.com", ""));
    assert_eq!(outcome, SubmitOutcome::Failed);

    let snap = h.ui.snapshot();
    assert_eq!(snap.modal, ModalState::SignIn);
    assert_eq!(snap.modal_error.as_deref(), Some("password is required"));
    assert!(!h.ctx.auth.is_signed_in());
}

#[test]
fn sign_up_names_the_account() {
    let mut h = Harness::demo();
    h.ui.open_modal(AuthTab::SignUp, None);
    let outcome = h.run(h.ui.clone().sign_up("Aida L", "aida@example.com", "pw"));
    assert!(matches!(
        outcome,
        SubmitOutcome::Succeeded {
            redirect: Redirect::Profile,
            ..
        }
    ));
    assert!(matches!(h.ui.nav(), NavState::SignedIn { ref display_name, .. } if display_name == "Aida L"));

    let mut h = Harness::demo();
    h.ui.open_modal(AuthTab::SignUp, None);
    let outcome = h.run(h.ui.clone().sign_up("", "aida@example.com", "pw"));
    assert_eq!(outcome, SubmitOutcome::Failed);
    assert_eq!(h.ui.snapshot().modal_error.as_deref(), Some("name is required"));
}

#[test]
fn google_sign_in() {
    let mut h = Harness::demo();
    h.ui.open_modal(AuthTab::SignIn, None);
    let outcome = h.run(h.ui.clone().sign_in_with_google());
    assert!(matches!(outcome, SubmitOutcome::Succeeded { .. }));
    assert!(matches!(h.ui.nav(), NavState::SignedIn { ref display_name, .. } if display_name == "GoogleUser"));
}

#[test]
fn forgot_password_shows_notice() {
    let mut h = Harness::demo();
    h.ui.open_modal(AuthTab::SignIn, None);
    h.run(h.ui.clone().forgot_password("aida@example.com")).unwrap();
    let snap = h.ui.snapshot();
    assert_eq!(
        snap.modal_notice.as_deref(),
        Some("Reset link sent. Check your email.")
    );
    assert!(snap.modal.is_open());

    assert!(h.run(h.ui.clone().forgot_password("  ")).is_err());
    assert_eq!(h.ui.snapshot().modal_error.as_deref(), Some("email is required"));
}

#[test]
fn blank_forgot_identifier_never_reaches_the_provider() {
    let kv: Rc<dyn KeyValueStore> = Rc::new(MemoryStorage::new());
    let identity = Rc::new(CountingIdentity::default());
    let backend = Backend::custom(
        BackendKind::Demo,
        identity.clone(),
        Rc::new(LocalMessageStore::in_memory()),
    );
    let mut h = Harness::with_backend(kv, backend);
    h.ui.open_modal(AuthTab::SignIn, None);

    let err = h.run(h.ui.clone().forgot_password(" \t ")).unwrap_err();
    assert_eq!(err.kind(), "validation_failure");
    let snap = h.ui.snapshot();
    assert_eq!(snap.modal, ModalState::SignIn);
    assert_eq!(snap.modal_error.as_deref(), Some("email is required"));
    assert_eq!(snap.modal_notice, None);
    assert!(identity.calls.borrow().is_empty());

    h.run(h.ui.clone().forgot_password("aida@example.com")).unwrap();
    assert_eq!(*identity.calls.borrow(), vec!["reset"]);
}

#[test]
fn logout_over_bus_returns_to_guest_and_keeps_profile() {
    let mut h = signed_in_harness();
    h.ui.save_profile(ProfileDraft {
        name: "Aida".into(),
        bio: "hello".into(),
        interests: "rust, chess".into(),
        avatar: None,
    })
    .unwrap();
    h.ui.open_chat(None);
    assert_eq!(h.ui.chat_state(), ChatPanelState::Open);

    h.ui.log_out();
    h.settle();

    assert_eq!(h.ui.nav(), NavState::Guest);
    assert_eq!(h.ui.chat_state(), ChatPanelState::Closed);
    assert_eq!(h.ctx.feed.conversation(), None);
    let record = h.ui.record();
    assert!(record.session.is_none());
    assert_eq!(record.profile.unwrap().interests, vec!["rust", "chess"]);
}

#[test]
fn direct_chat_joins_conversation() {
    let h = signed_in_harness();
    let joins = h.ctx.bus.subscribe_channel(Topic::JoinConversation);
    let me = h.ctx.auth.current_session().unwrap().id;
    let expected = ConversationId::direct(&me, "u-bo");

    assert_eq!(
        h.ui.start_direct_chat("u-bo", None),
        ChatOpenOutcome::Opened(expected.clone())
    );
    assert_eq!(
        joins.try_recv().unwrap(),
        BusEvent::JoinConversation {
            conversation_id: expected.clone(),
            peer: "u-bo".into(),
        }
    );
    assert_eq!(h.ctx.feed.conversation(), Some(expected));
    assert!(h.ctx.feed.is_subscribed());
}

#[test]
fn submitted_chat_message_is_stored() {
    let mut h = signed_in_harness();
    h.ui.open_chat(None);
    assert!(!h.ui.submit_chat("   "));
    assert!(h.ui.submit_chat("hello world"));
    h.settle();

    let view = h.ctx.feed.view();
    assert_eq!(view.entries.len(), 1);
    assert_eq!(view.entries[0].message.body, "hello world");
    assert!(view.entries[0].from_self);

    let history = LocalMessageStore::with_storage(Rc::clone(&h.kv)).history(&ConversationId::global());
    assert_eq!(history.len(), 1);
}

#[test]
fn minimize_toggles_only_when_open() {
    let h = signed_in_harness();
    h.ui.toggle_minimized();
    assert_eq!(h.ui.chat_state(), ChatPanelState::Closed);
    h.ui.open_chat(None);
    h.ui.toggle_minimized();
    assert_eq!(h.ui.chat_state(), ChatPanelState::Minimized);
    h.ui.toggle_minimized();
    assert_eq!(h.ui.chat_state(), ChatPanelState::Open);
    h.ui.close_chat();
    assert_eq!(h.ui.chat_state(), ChatPanelState::Closed);
    assert!(!h.ctx.feed.is_subscribed());
}

#[test]
fn saved_profile_survives_reload() {
    let h = signed_in_harness();
    let saved = h
        .ui
        .save_profile(ProfileDraft {
            name: "  Aida ".into(),
            bio: String::new(),
            interests: "rust,rust, go".into(),
            avatar: None,
        })
        .unwrap();
    assert_eq!(saved.name, "Aida");
    assert_eq!(saved.interests, vec!["rust", "go"]);
    assert_eq!(h.ctx.toasts.latest().unwrap().message, "Profile saved");

    let reloaded = Harness::with_storage(Rc::clone(&h.kv));
    assert_eq!(reloaded.ui.record().profile, Some(saved));
    assert!(reloaded.ctx.auth.is_signed_in());
}
