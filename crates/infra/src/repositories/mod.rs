mod memory;
mod surreal;

pub use memory::InMemoryApplicationStore;
pub use surreal::SurrealApplicationStore;
