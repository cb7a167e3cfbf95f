pub mod encode;
pub mod loader;
pub mod prepare;
pub mod record;
pub mod summary;
