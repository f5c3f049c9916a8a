pub mod event;
pub mod records;
pub mod scan;
