use leptos::ev::SubmitEvent;
use leptos::prelude::*;

use so_bridge::modal::AuthTab;

use crate::components::focus_trap::active_element;
use crate::state::use_app_state;

#[component]
pub fn HomePage() -> impl IntoView {
    let state = use_app_state();
    let signed_in = Memo::new(move |_| state.snapshot.with(|s| s.nav.is_signed_in()));
    let peer = RwSignal::new(String::new());

    let start_direct = move |ev: SubmitEvent| {
        ev.prevent_default();
        let id = peer.get_untracked();
        if id.trim().is_empty() {
            return;
        }
        state.ui().start_direct_chat(id.trim(), active_element());
        peer.set(String::new());
    };

    view! {
        <section class="hero">
            <h1>"Meet people who share your interests"</h1>
            <p class="hero-lead">
                "Set up a profile, list what you care about and jump into the conversation."
            </p>
            <div class="hero-actions">
                <button
                    class="btn-primary"
                    on:click=move |_| {
                        state.ui().open_chat(active_element());
                    }
                >
                    "Join the conversation"
                </button>
                <Show when=move || !signed_in.get()>
                    <button
                        class="btn-secondary"
                        on:click=move |_| state.ui().open_modal(AuthTab::SignUp, active_element())
                    >
                        "Create an account"
                    </button>
                </Show>
            </div>
        </section>
        <Show when=move || signed_in.get()>
            <section class="direct-chat">
                <h2>"Message someone directly"</h2>
                <form class="direct-chat-form" on:submit=start_direct>
                    <label for="direct-peer">"User id"</label>
                    <input
                        id="direct-peer"
                        type="text"
                        prop:value=move || peer.get()
                        on:input=move |ev| peer.set(event_target_value(&ev))
                    />
                    <button type="submit" class="btn-secondary">"Start chat"</button>
                </form>
            </section>
        </Show>
    }
}
