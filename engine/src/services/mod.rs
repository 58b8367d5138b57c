pub mod cleanup;
pub mod integrity;
pub mod similar;

pub use cleanup::DuplicateCleanup;
pub use integrity::IntegrityService;
