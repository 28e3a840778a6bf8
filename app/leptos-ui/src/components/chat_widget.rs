use leptos::ev::SubmitEvent;
use leptos::prelude::*;

use so_bridge::controller::ChatPanelState;
use so_bridge::feed::FeedEntry;
use so_core::types::ConversationId;

use crate::components::focus_trap::active_element;
use crate::state::use_app_state;

pub fn entry_class(entry: &FeedEntry) -> &'static str {
    match (entry.from_self, entry.pending) {
        (true, true) => "chat-msg chat-msg-self chat-msg-pending",
        (true, false) => "chat-msg chat-msg-self",
        (false, _) => "chat-msg chat-msg-other",
    }
}

pub fn author_label(entry: &FeedEntry) -> String {
    if entry.from_self {
        "You".to_string()
    } else if entry.message.author_name.trim().is_empty() {
        entry.message.author_id.clone()
    } else {
        entry.message.author_name.clone()
    }
}

pub fn conversation_title(conversation: Option<&ConversationId>) -> String {
    match conversation {
        Some(id) if id.is_direct() => "Direct message".to_string(),
        Some(id) if !id.is_global() => id.to_string(),
        _ => "Everyone".to_string(),
    }
}

#[component]
pub fn ChatWidget() -> impl IntoView {
    let state = use_app_state();
    let panel = Memo::new(move |_| state.snapshot.with(|s| s.chat));
    let title = Memo::new(move |_| state.snapshot.with(|s| conversation_title(s.conversation.as_ref())));
    let draft = RwSignal::new(String::new());
    let list = NodeRef::<leptos::html::Ol>::new();

    // Keep the newest message in view.
    Effect::new(move |_| {
        state.feed.track();
        request_animation_frame(move || {
            if let Some(el) = list.get_untracked() {
                el.set_scroll_top(el.scroll_height());
            }
        });
    });

    let submit = move |ev: SubmitEvent| {
        ev.prevent_default();
        if state.ui().submit_chat(&draft.get_untracked()) {
            draft.set(String::new());
        }
    };

    move || match panel.get() {
        ChatPanelState::Closed => view! {
            <button
                class="chat-launcher"
                aria-label="Open chat"
                on:click=move |_| {
                    state.ui().open_chat(active_element());
                }
            >
                "Chat"
            </button>
        }
        .into_any(),
        open => {
            let minimized = open == ChatPanelState::Minimized;
            view! {
                <section
                    class={if minimized { "chat-widget chat-minimized" } else { "chat-widget" }}
                    aria-label="Chat"
                >
                    <header class="chat-header">
                        <h2 class="chat-title">{move || title.get()}</h2>
                        <button
                            class="chat-icon-btn"
                            aria-label={if minimized { "Expand chat" } else { "Minimize chat" }}
                            on:click=move |_| state.ui().toggle_minimized()
                        >
                            {if minimized { "▴" } else { "▾" }}
                        </button>
                        <button
                            class="chat-icon-btn"
                            aria-label="Close chat"
                            on:click=move |_| state.ui().close_chat()
                        >
                            "×"
                        </button>
                    </header>
                    <Show when=move || !minimized>
                        <ol class="chat-messages" node_ref=list aria-live="polite">
                            <For
                                each=move || state.feed.with(|f| f.entries.clone())
                                key=|entry| (entry.message.id.clone(), entry.pending)
                                let:entry
                            >
                                <li class=entry_class(&entry)>
                                    <span class="chat-author">{author_label(&entry)}</span>
                                    <span class="chat-body">{entry.message.body.clone()}</span>
                                    <time class="chat-time">
                                        {entry.message.sent_at.format("%H:%M").to_string()}
                                    </time>
                                </li>
                            </For>
                        </ol>
                        <form class="chat-composer" on:submit=submit>
                            <input
                                type="text"
                                placeholder="Say something..."
                                aria-label="Message"
                                prop:value=move || draft.get()
                                on:input=move |ev| draft.set(event_target_value(&ev))
                            />
                            <button type="submit" class="btn-primary">"Send"</button>
                        </form>
                    </Show>
                </section>
            }
            .into_any()
        }
    }
}
