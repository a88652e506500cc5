pub mod fixture_store;

pub use fixture_store::{FixtureStore, ListFilters};
