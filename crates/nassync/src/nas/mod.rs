//! Client for the Synology FileStation web API.
//!
//! ```text
//! NasClient ──login()──▶ NasSession ──logout()──▶ (inactive)
//!                          │
//!                          ├── list_folders(base)
//!                          ├── list_files(folder)
//!                          └── download_to(remote, dest)
//! ```

mod client;
pub mod error;
mod types;

pub use client::{NasClient, NasSession};
pub use error::NasError;
pub use types::{FileEntry, Folder};
