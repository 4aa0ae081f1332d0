//! Client-side state for the city browser.
//!
//! Both stores are cheap to clone; clones share the same state and the same
//! API handle. State is only ever touched through the store operations.

pub mod city_list;
pub mod preferred;

pub use city_list::{CityListState, CityListStore, FetchOutcome, ListPhase};
pub use preferred::{PreferredCitiesState, PreferredCitiesStore, PreferredEntry};
