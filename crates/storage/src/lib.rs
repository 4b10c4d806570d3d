#![forbid(unsafe_code)]

pub mod repository;
pub mod rest;
pub mod sqlite;

pub use repository::{
    InMemoryRepository, QuestionRecord, QuestionSource, ResultReader, ResultStore, Storage,
    StorageError,
};
