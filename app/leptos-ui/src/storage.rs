//! `window.localStorage` as a [`KeyValueStore`].

use so_core::error::StorageError;
use so_core::storage::KeyValueStore;
use wasm_bindgen::JsValue;

fn js_error(context: &str, err: JsValue) -> StorageError {
    let detail = err.as_string().unwrap_or_else(|| format!("{err:?}"));
    StorageError::Unavailable(format!("{context}: {detail}"))
}

/// Browser storage scoped to the page origin.
///
/// Private browsing modes may refuse access; every call then fails with
/// [`StorageError::Unavailable`] rather than panicking.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebStorage;

impl WebStorage {
    pub fn new() -> Self {
        Self
    }

    fn storage(&self) -> Result<web_sys::Storage, StorageError> {
        let window = web_sys::window()
            .ok_or_else(|| StorageError::Unavailable("no window".to_string()))?;
        window
            .local_storage()
            .map_err(|e| js_error("localStorage", e))?
            .ok_or_else(|| StorageError::Unavailable("localStorage disabled".to_string()))
    }
}

impl KeyValueStore for WebStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.storage()?
            .get_item(key)
            .map_err(|e| js_error("getItem", e))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.storage()?
            .set_item(key, value)
            .map_err(|e| js_error("setItem", e))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.storage()?
            .remove_item(key)
            .map_err(|e| js_error("removeItem", e))
    }
}
