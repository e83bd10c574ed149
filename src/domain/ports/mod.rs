pub mod pricing_strategy;
pub mod retailer_adapter;
pub mod sample_store;
pub mod storefront;
