//! User domain: account records, credential verification, and the
//! cached notification preferences the dispatch pipeline reads.

pub mod error;
pub mod models;
pub mod postgres;
pub mod repository;
pub mod service;

pub use error::{UserError, UserResult};
pub use models::{CreateUser, Preferences, UpdateUser, User, UserResponse};
pub use postgres::PostgresUserRepository;
pub use repository::{InMemoryUserRepository, UserRepository};
pub use service::UserService;
