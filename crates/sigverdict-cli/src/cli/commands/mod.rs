pub mod analyse;
pub mod dispatch;
pub mod importer;
pub mod keyserver;

pub use dispatch::dispatch;
