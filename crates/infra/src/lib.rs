pub mod certificates;
pub mod config;
pub mod db;
pub mod events;
pub mod evidence;
pub mod idempotency;
pub mod logging;
pub mod payments;
pub mod repositories;
