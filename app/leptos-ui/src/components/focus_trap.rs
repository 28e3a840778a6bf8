use wasm_bindgen::JsCast;
use web_sys::{Element, HtmlElement};

use so_bridge::modal::KeyAction;

use crate::state::AppState;

const FOCUSABLE: &str = r#"a[href], button:not([disabled]), input:not([disabled]), select:not([disabled]), textarea:not([disabled]), [tabindex]:not([tabindex="-1"])"#;

/// Focusable descendants of `container` in document order.
pub fn focusable_elements(container: &Element) -> Vec<HtmlElement> {
    let Ok(nodes) = container.query_selector_all(FOCUSABLE) else {
        return Vec::new();
    };
    (0..nodes.length())
        .filter_map(|i| nodes.item(i))
        .filter_map(|node| node.dyn_into::<HtmlElement>().ok())
        .collect()
}

/// The element holding keyboard focus, if it is an HTML element.
pub fn active_element() -> Option<HtmlElement> {
    web_sys::window()?
        .document()?
        .active_element()?
        .dyn_into::<HtmlElement>()
        .ok()
}

/// Keydown handler for the auth modal.
///
/// Tab / Shift+Tab cycle through the targets registered with the
/// controller; Escape closes the modal and restores the focus it had
/// before opening.
pub fn use_focus_trap(state: AppState) -> impl Fn(leptos::ev::KeyboardEvent) + Copy {
    move |ev: leptos::ev::KeyboardEvent| {
        let action = state
            .ui()
            .handle_modal_key(&ev.key(), ev.shift_key(), active_element().as_ref());
        match action {
            KeyAction::Focus(target) => {
                ev.prevent_default();
                let _ = target.focus();
            }
            KeyAction::Close { restore } => {
                ev.prevent_default();
                if let Some(target) = restore {
                    let _ = target.focus();
                }
            }
            KeyAction::Ignore => {}
        }
    }
}
