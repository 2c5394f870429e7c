pub mod fetch;
pub mod sysfs;
