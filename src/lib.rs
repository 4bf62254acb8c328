//! Tracks pre-match favorites through live play and raises a one-time alert when
//! the favorite is trailing at the halfway point.

pub mod config;
pub mod error;
pub mod health;
pub mod model;
pub mod notify;
pub mod odds;
pub mod payload;
pub mod phase;
pub mod provider;
pub mod scheduler;
pub mod score;
pub mod store;
pub mod tracker;
pub mod trailing;
