pub mod history_window;
pub mod ids;
pub mod task_state;
