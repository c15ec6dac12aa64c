pub mod archive;
pub mod config;
pub mod deps;
pub mod description;
pub mod error;
pub mod extract;
pub mod http;
pub mod naming;
pub mod overlay;
pub mod platform;
pub mod record;
pub mod registry;
pub mod sandbox;
pub mod trove;

pub use error::{ExtractError, Result};
pub use extract::{Collaborators, ExtractRequest, extract, guess_name_version};
pub use record::{MergeMode, MetadataRecord, RecordUpdate, UNKNOWN};
