mod log;

pub use log::LogRepository;
