//! API handlers.

pub mod accounts;
pub mod assistant;
pub mod checkout;
pub mod health;
pub mod webhooks;
