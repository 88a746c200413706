use std::io;

use thiserror::Error;

use crate::config::PageAddr;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("could not read page {local_addr} of `{file}`")]
    ReadFailure {
        file: String,
        local_addr: PageAddr,
        #[source]
        source: io::Error,
    },

    #[error("could not write page {local_addr} of `{file}`")]
    WriteFailure {
        file: String,
        local_addr: PageAddr,
        #[source]
        source: io::Error,
    },

    #[error("the disk is full")]
    DiskFull,

    #[error("no such type: `{0}`")]
    NotFound(String),

    #[error("page has no file identity")]
    InvalidPage,

    #[error("{0}")]
    ConstraintViolation(String),

    #[error("content write of {len} bytes at offset {pos} exceeds the page content region")]
    ContentOverflow { pos: usize, len: usize },
}
