// Engine — pagination cursor, response cache, debounced search and the request coordinator.

pub mod cache;
pub mod coordinator;
pub mod cursor;
pub mod key;
pub mod page;
pub mod paged;
pub mod results;
pub mod search;
pub mod stats;
pub mod strategy;
