//! Remote backends for the socially front end.
//!
//! [`firebase`] talks to Firebase Authentication (Identity Toolkit and
//! Secure Token) and Cloud Firestore over their REST APIs.

pub mod firebase;
