//! Application-level orchestration.
//!
//! The controller owns the runner collection and is the single place where UI
//! commands and job callbacks meet. UI/CLI layers call into this module to
//! keep responsibilities separated.

mod controller;

pub(crate) use controller::{Controller, Flow, UiCommand};
