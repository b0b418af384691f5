pub mod checkin;
pub mod public;
pub mod webhooks;
