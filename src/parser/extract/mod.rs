pub mod contacts;
pub mod opportunities;
pub mod tasks;
