pub mod migrations;
pub mod sample_store;
