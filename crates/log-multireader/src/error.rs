use std::io;

use activity_log_codec::CodecError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum MultiReaderError {
    #[error("i/o error indexing or seeking a file")]
    Io(#[from] io::Error),

    #[error("codec error while indexing a file")]
    Codec(#[from] CodecError),

    #[error("no file with id {0} has been added")]
    UnknownFile(usize),

    #[error(
        "file {file_id} offset {offset} does not land on a multicast entry for monitor {expected}"
    )]
    OffsetMismatch {
        file_id: usize,
        offset: u64,
        expected: Uuid,
    },
}

pub type MultiReaderResult<T> = Result<T, MultiReaderError>;
