//! Client-side session and telemetry synchronisation for BERNT devices.
//!
//! A [`session::SessionStore`] gates everything: the [`registry::DeviceRegistry`],
//! the [`poller::TelemetryPoller`] and the [`export::ExportSerializer`] only
//! talk to the server with its credential, and report rejected credentials
//! back to it. Charts and the session energy are derived from the poller's
//! buffer without further network access.

pub mod api;
pub mod config;
pub mod dashboard;
pub mod energy;
pub mod export;
pub mod notice;
pub mod poller;
pub mod reading;
pub mod registry;
pub mod session;
pub mod window;

#[cfg(test)]
mod testing;
