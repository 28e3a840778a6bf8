//! Behaviour layer of the socially front end.
//!
//! Components talk through the [`event_bus::EventBus`]; the browser UI and
//! the terminal client both drive the same [`controller::UiController`],
//! [`auth::AuthBridge`] and [`feed::LiveMessageFeed`].

pub mod auth;
pub mod backend;
pub mod context;
pub mod controller;
pub mod demo;
pub mod event_bus;
pub mod feed;
pub mod modal;
pub mod nav;
pub mod notifications;
pub mod protocol;
pub mod spawner;

pub use context::AppContext;
pub use event_bus::EventBus;
pub use protocol::{BusEvent, Secret, Topic};
pub use spawner::Spawner;
