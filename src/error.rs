//! Error type shared by every layer of a scrape

use std::process::ExitStatus;
use std::time::Duration;

/// Everything that can abort a scrape or a single fetch.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    // Configuration
    #[error("no pieces in the config")]
    NoPieces,

    #[error("no name provided for piece {index}")]
    MissingPieceName { index: usize },

    #[error("piece {name} has a duplicate name")]
    DuplicatePieceName { name: String },

    #[error("no selector provided for piece {index}")]
    MissingSelector { index: usize },

    #[error("invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("invalid regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("no regex given")]
    NoRegex,

    #[error("regex has no capturing groups")]
    RegexWithoutGroups,

    #[error("regex has {groups} capturing groups, but which to extract was not specified")]
    AmbiguousRegexGroup { groups: usize },

    #[error("regex group {group} does not exist (regex has {groups} groups)")]
    RegexGroupOutOfRange { group: usize, groups: usize },

    #[error("no attribute provided")]
    NoAttribute,

    #[error("no URL provided")]
    NoUrl,

    // Transport
    #[error("invalid method: {0}")]
    InvalidMethod(String),

    #[error("no browser engine was found")]
    NoBrowserEngine,

    #[error("fetcher used before prepare")]
    NotPrepared,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to fetch {url}: {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser engine exited with {status}: {message}")]
    EngineExit { status: ExitStatus, message: String },

    #[error("browser engine did not exit within {grace:?} after the page settled")]
    EngineHung { grace: Duration },

    #[error("malformed browser engine output: {0}")]
    MalformedOutput(String),

    // Parse
    #[error("failed to parse {url}: {reason}")]
    Parse { url: String, reason: String },

    // Extraction
    #[error("piece {piece} failed on block {block} of {url}: {source}")]
    Extract {
        url: String,
        block: usize,
        piece: String,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
