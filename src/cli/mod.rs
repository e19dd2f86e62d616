pub mod peers;
pub mod setup;
pub mod ui;
pub mod value;
