mod memory;
mod user;

pub use memory::InMemoryUserRepository;
pub use user::PostgresUserRepository;
