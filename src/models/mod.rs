pub mod listing;
pub mod state;
