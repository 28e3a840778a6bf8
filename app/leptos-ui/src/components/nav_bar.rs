use leptos::prelude::*;

use so_bridge::modal::AuthTab;
use so_bridge::nav::NavState;

use crate::components::focus_trap::active_element;
use crate::state::{use_app_state, AppState, Page};

fn open_auth(state: AppState, tab: AuthTab) {
    state.ui().open_modal(tab, active_element());
}

/// Avatar image, or the initial on a coloured disc when no avatar is known.
fn avatar_badge(avatar: Option<String>, initial: String) -> AnyView {
    match avatar {
        Some(src) => view! { <img class="nav-avatar" src=src alt="" /> }.into_any(),
        None => view! {
            <span class="nav-avatar nav-avatar-initial" aria-hidden="true">{initial}</span>
        }
        .into_any(),
    }
}

#[component]
pub fn NavBar() -> impl IntoView {
    let state = use_app_state();
    let nav = Memo::new(move |_| state.snapshot.with(|s| s.nav.clone()));

    view! {
        <header class="nav-bar">
            <button class="nav-brand" on:click=move |_| state.page.set(Page::Home)>
                "Socially"
            </button>
            <nav class="nav-actions" aria-label="Account">
                {move || match nav.get() {
                    NavState::Guest => view! {
                        <button class="nav-btn" on:click=move |_| open_auth(state, AuthTab::SignIn)>
                            "Log in"
                        </button>
                        <button
                            class="nav-btn nav-btn-primary"
                            on:click=move |_| open_auth(state, AuthTab::SignUp)
                        >
                            "Sign up"
                        </button>
                    }
                    .into_any(),
                    NavState::SignedIn { display_name, initial, avatar } => {
                        let title = format!("{display_name} - {}", Page::Profile.label());
                        view! {
                            <button
                                class="nav-btn"
                                on:click=move |_| {
                                    state.ui().open_chat(active_element());
                                }
                            >
                                "Chat"
                            </button>
                            <button
                                class="nav-profile"
                                title=title
                                on:click=move |_| state.page.set(Page::Profile)
                            >
                                {avatar_badge(avatar, initial)}
                                <span class="nav-name">{display_name}</span>
                            </button>
                            <button class="nav-btn" on:click=move |_| state.ui().log_out()>
                                "Log out"
                            </button>
                        }
                        .into_any()
                    }
                }}
            </nav>
        </header>
    }
}
