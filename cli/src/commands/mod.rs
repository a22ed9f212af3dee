pub mod cli;
pub mod history;
pub mod make;
pub mod run_task;
pub mod tasks;
