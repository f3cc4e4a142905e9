pub mod domain;
pub mod error;
pub mod records;
pub mod resource;

pub use resource::Resource;
