pub mod memory;
pub mod postgres;

pub use memory::InMemoryRecipeStore;
pub use postgres::PgRecipeStore;
