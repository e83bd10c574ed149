pub mod adapter_registry;
pub mod barrier;
pub mod orchestrator;
pub mod pricing_engine;
pub mod proxy_pool;
pub mod strategies;
pub mod task_board;
