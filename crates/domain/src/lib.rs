pub mod application;
pub mod auth;
pub mod engine;
pub mod error;
pub mod events;
pub mod gating;
pub mod idempotency;
pub mod identity;
pub mod ports;
pub mod transitions;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
