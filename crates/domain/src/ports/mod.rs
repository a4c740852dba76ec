use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub mod certificates;
pub mod db;
pub mod events;
pub mod evidence;
pub mod idempotency;
pub mod payments;
pub mod store;
