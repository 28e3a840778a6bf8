use std::rc::Rc;

use leptos::prelude::*;
use send_wrapper::SendWrapper;
use wasm_bindgen::JsCast;
use web_sys::HtmlElement;

use so_bridge::backend::Backend;
use so_bridge::controller::{UiController, UiSnapshot};
use so_bridge::feed::FeedView;
use so_bridge::notifications::Toast;
use so_bridge::{AppContext, Spawner};
use so_core::config::{BackendKind, Config};
use so_core::storage::KeyValueStore;

use crate::storage::WebStorage;

/// Element id of an optional inline TOML config block.
const CONFIG_ELEMENT_ID: &str = "socially-config";
/// `<meta>` carrying the Firebase web API key.
const FIREBASE_KEY_META: &str = "meta[name=\"socially-firebase-key\"]";

pub type Ui = UiController<HtmlElement>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Page {
    #[default]
    Home,
    Profile,
}

impl Page {
    pub fn label(self) -> &'static str {
        match self {
            Page::Home => "Home",
            Page::Profile => "Profile",
        }
    }
}

/// Reactive mirror of the controller state, shared through context.
///
/// The controller itself is `!Send`; it lives in a `StoredValue` behind a
/// `SendWrapper`, which is sound on the single browser thread.
#[derive(Clone, Copy)]
pub struct AppState {
    ui: StoredValue<SendWrapper<Ui>>,
    pub snapshot: RwSignal<UiSnapshot>,
    pub feed: RwSignal<FeedView>,
    pub toasts: RwSignal<Vec<Toast>>,
    pub page: RwSignal<Page>,
}

impl AppState {
    pub fn ui(&self) -> Ui {
        self.ui.with_value(|ui| Ui::clone(ui))
    }

    pub fn context(&self) -> AppContext {
        self.ui.with_value(|ui| ui.context().clone())
    }
}

fn console_warn(message: &str) {
    web_sys::console::warn_1(&message.into());
}

fn load_config() -> Config {
    let text = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.get_element_by_id(CONFIG_ELEMENT_ID))
        .and_then(|el| el.text_content());
    match text {
        Some(text) => Config::from_toml(&text).unwrap_or_else(|e| {
            console_warn(&format!("Ignoring invalid inline config: {e}"));
            Config::default()
        }),
        None => Config::default(),
    }
}

fn firebase_key() -> Option<String> {
    let meta = web_sys::window()?
        .document()?
        .query_selector(FIREBASE_KEY_META)
        .ok()??
        .dyn_into::<web_sys::HtmlMetaElement>()
        .ok()?;
    Some(meta.content()).filter(|k| !k.trim().is_empty())
}

/// The configured backend, or the demo one when Firebase cannot start.
fn build_backend(config: &Config, kv: Rc<dyn KeyValueStore>) -> Backend {
    if config.backend.kind == BackendKind::Demo {
        return Backend::demo(kv);
    }
    let Some(key) = firebase_key() else {
        console_warn("No Firebase API key on the page; running the offline demo");
        return Backend::demo(kv);
    };
    Backend::firebase_with_key(&config.firebase, key, Rc::clone(&kv)).unwrap_or_else(|e| {
        console_warn(&format!("Firebase unavailable ({e}); running the offline demo"));
        Backend::demo(kv)
    })
}

fn browser_spawner() -> Spawner {
    Spawner::new(
        |task| wasm_bindgen_futures::spawn_local(task),
        |duration| Box::pin(gloo_timers::future::sleep(duration)),
    )
}

pub fn provide_app_state() {
    let config = load_config();
    let kv: Rc<dyn KeyValueStore> = Rc::new(WebStorage::new());
    let backend = build_backend(&config, Rc::clone(&kv));
    let ctx = AppContext::new(config, backend, kv, browser_spawner());
    let ui = Ui::new(ctx);

    let snapshot = RwSignal::new(ui.snapshot());
    let feed = RwSignal::new(ui.context().feed.view());
    let toasts = RwSignal::new(ui.context().toasts.list());
    ui.on_change(move |s| snapshot.set(s.clone()));
    ui.context().feed.on_render(move |view| feed.set(view.clone()));
    ui.context().toasts.on_change(move |list| toasts.set(list.to_vec()));

    provide_context(AppState {
        ui: StoredValue::new(SendWrapper::new(ui)),
        snapshot,
        feed,
        toasts,
        page: RwSignal::new(Page::default()),
    });
}

pub fn use_app_state() -> AppState {
    expect_context::<AppState>()
}
