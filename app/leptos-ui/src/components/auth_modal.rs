use leptos::ev::SubmitEvent;
use leptos::prelude::*;
use leptos::task::spawn_local;
use web_sys::HtmlElement;

use so_bridge::modal::{AuthTab, ModalState, Redirect, SubmitOutcome};

use crate::components::focus_trap::{active_element, focusable_elements, use_focus_trap};
use crate::state::{use_app_state, AppState, Page};

/// Follow a successful submission: restore focus, then go where the
/// controller says.
fn after_submit(state: AppState, outcome: SubmitOutcome<HtmlElement>) {
    let SubmitOutcome::Succeeded { redirect, restore } = outcome else {
        return;
    };
    if let Some(target) = restore {
        let _ = target.focus();
    }
    match redirect {
        Redirect::Chat => {
            state.ui().open_chat(active_element());
        }
        Redirect::Profile => state.page.set(Page::Profile),
    }
}

#[component]
pub fn AuthModal() -> impl IntoView {
    let state = use_app_state();
    let modal = Memo::new(move |_| state.snapshot.with(|s| s.modal));
    let dialog = NodeRef::<leptos::html::Div>::new();

    let name = RwSignal::new(String::new());
    let email = RwSignal::new(String::new());
    let password = RwSignal::new(String::new());
    let busy = RwSignal::new(false);

    // Each form render installs its own focus targets.
    Effect::new(move |_| {
        if !modal.get().is_open() {
            return;
        }
        request_animation_frame(move || {
            let Some(container) = dialog.get_untracked() else {
                return;
            };
            if let Some(first) = state.ui().modal_rendered(focusable_elements(&container)) {
                let _ = first.focus();
            }
        });
    });

    let submit = move |ev: SubmitEvent| {
        ev.prevent_default();
        if busy.get_untracked() {
            return;
        }
        busy.set(true);
        let tab = modal.get_untracked().tab();
        let (n, e, p) = (
            name.get_untracked(),
            email.get_untracked(),
            password.get_untracked(),
        );
        spawn_local(async move {
            let ui = state.ui();
            let outcome = match tab {
                Some(AuthTab::SignUp) => ui.sign_up(&n, &e, &p).await,
                _ => ui.sign_in(&e, &p).await,
            };
            // the modal may already be gone
            busy.try_set(false);
            if matches!(outcome, SubmitOutcome::Succeeded { .. }) {
                password.try_set(String::new());
            }
            after_submit(state, outcome);
        });
    };

    let google = move |_| {
        if busy.get_untracked() {
            return;
        }
        busy.set(true);
        spawn_local(async move {
            let outcome = state.ui().sign_in_with_google().await;
            busy.try_set(false);
            after_submit(state, outcome);
        });
    };

    let forgot = move |_| {
        let address = email.get_untracked();
        spawn_local(async move {
            // the outcome is rendered from the snapshot
            let _ = state.ui().forgot_password(&address).await;
        });
    };

    let close = move |_| {
        if let Some(target) = state.ui().close_modal() {
            let _ = target.focus();
        }
    };

    let on_keydown = use_focus_trap(state);

    view! {
        <div class="auth-overlay" on:click=close></div>
        <div
            class="auth-modal"
            role="dialog"
            aria-modal="true"
            aria-labelledby="auth-modal-title"
            node_ref=dialog
            on:keydown=on_keydown
        >
            <div class="auth-tabs" role="tablist">
                <button
                    role="tab"
                    aria-selected=move || (modal.get() == ModalState::SignIn).to_string()
                    on:click=move |_| state.ui().switch_tab(AuthTab::SignIn)
                >
                    "Sign in"
                </button>
                <button
                    role="tab"
                    aria-selected=move || (modal.get() == ModalState::SignUp).to_string()
                    on:click=move |_| state.ui().switch_tab(AuthTab::SignUp)
                >
                    "Sign up"
                </button>
            </div>
            <h2 id="auth-modal-title">
                {move || match modal.get() {
                    ModalState::SignUp => "Create your account",
                    _ => "Welcome back",
                }}
            </h2>
            <form class="auth-form" on:submit=submit>
                {move || (modal.get() == ModalState::SignUp).then(|| view! {
                    <label for="auth-name">"Name"</label>
                    <input
                        id="auth-name"
                        type="text"
                        autocomplete="name"
                        prop:value=move || name.get()
                        on:input=move |ev| name.set(event_target_value(&ev))
                    />
                })}
                <label for="auth-email">"Email"</label>
                <input
                    id="auth-email"
                    type="email"
                    autocomplete="email"
                    prop:value=move || email.get()
                    on:input=move |ev| email.set(event_target_value(&ev))
                />
                <label for="auth-password">"Password"</label>
                <input
                    id="auth-password"
                    type="password"
                    autocomplete=move || match modal.get() {
                        ModalState::SignUp => "new-password",
                        _ => "current-password",
                    }
                    prop:value=move || password.get()
                    on:input=move |ev| password.set(event_target_value(&ev))
                />
                {move || state.snapshot.with(|s| s.modal_error.clone()).map(|message| view! {
                    <p class="auth-error" role="alert">{message}</p>
                })}
                {move || state.snapshot.with(|s| s.modal_notice.clone()).map(|message| view! {
                    <p class="auth-notice" role="status">{message}</p>
                })}
                <button type="submit" class="btn-primary" disabled=move || busy.get()>
                    {move || match modal.get() {
                        ModalState::SignUp => "Create account",
                        _ => "Sign in",
                    }}
                </button>
            </form>
            <button class="btn-google" disabled=move || busy.get() on:click=google>
                "Continue with Google"
            </button>
            {move || (modal.get() == ModalState::SignIn).then(|| view! {
                <button class="btn-link" on:click=forgot>"Forgot password?"</button>
            })}
            <button class="auth-close" aria-label="Close" on:click=close>"×"</button>
        </div>
    }
}
