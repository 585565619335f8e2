pub mod downloads;

pub use downloads::DownloadStore;
