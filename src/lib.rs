pub mod debugger;
pub mod store;
pub mod ui;
