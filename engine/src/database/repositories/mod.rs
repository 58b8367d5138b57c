pub mod file;

pub use file::FileRepository;
