pub mod check_task;
pub mod monitored_product;
pub mod price_group;
pub mod price_sample;
pub mod proxy;
