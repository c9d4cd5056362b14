//! BOQ baseline aggregate

pub mod model;
pub mod repository;

pub use model::{Base, BaseItem, NewBase, NewBaseItem};
pub use repository::BaseRepository;
