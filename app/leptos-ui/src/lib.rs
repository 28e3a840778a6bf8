//! Browser front end: navigation chrome, the auth modal, the chat widget
//! and the profile editor, all driven by `so_bridge::controller`.

use leptos::prelude::*;
use wasm_bindgen::prelude::*;

pub mod components;
pub mod pages;
pub mod state;
pub mod storage;

use components::auth_modal::AuthModal;
use components::chat_widget::ChatWidget;
use components::nav_bar::NavBar;
use components::toast_stack::ToastStack;
use pages::home::HomePage;
use pages::profile::ProfilePage;
use state::Page;

#[component]
pub fn App() -> impl IntoView {
    state::provide_app_state();
    let state = state::use_app_state();
    let modal_open = Memo::new(move |_| state.snapshot.with(|s| s.modal.is_open()));

    // A signed-out visitor cannot stay on the profile editor.
    Effect::new(move |_| {
        let signed_in = state.snapshot.with(|s| s.nav.is_signed_in());
        if !signed_in && state.page.get_untracked() == Page::Profile {
            state.page.set(Page::Home);
        }
    });

    view! {
        <NavBar />
        <main class="content">
            {move || match state.page.get() {
                Page::Home => view! { <HomePage /> }.into_any(),
                Page::Profile => view! { <ProfilePage /> }.into_any(),
            }}
        </main>
        <ChatWidget />
        <ToastStack />
        <Show when=move || modal_open.get()>
            <AuthModal />
        </Show>
    }
}

#[wasm_bindgen(start)]
pub fn mount() {
    console_error_panic_hook::set_once();
    leptos::mount::mount_to_body(App);
}
