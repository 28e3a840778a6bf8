pub mod auth_modal;
pub mod chat_widget;
pub mod focus_trap;
pub mod nav_bar;
pub mod toast_stack;
