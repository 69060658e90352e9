//! SFTP file management module
//!
//! Provides remote file browsing, upload, download and the small set of
//! remote mutations (delete, mkdir, rmdir) on an open [`Session`](crate::ssh::Session).

pub mod error;
pub mod lister;
pub mod ops;
pub mod path_utils;
pub mod remote;
pub mod transfer;
pub mod types;

pub use error::SftpError;
pub use lister::{list_local, list_remote, working_directory};
pub use remote::{RemoteFs, SftpRemote};
pub use transfer::{check_transfer_control, TransferControl, TransferEngine};
pub use types::*;
