//! Acquiring, verifying and unpacking the upstream source archive.

pub mod acquire;
pub mod download;
pub mod extraction;
pub mod hashes;
pub mod naming;
pub mod verification;

pub use acquire::{AcquireError, AcquireOptions, SourcePlan};
pub use download::{DownloadError, HttpDownloader, SourceDownloader};
pub use extraction::{
    ExtractionError, ExtractionReport, MemberError, PendingDenylist, SourceExtractor,
    TarExtractor,
};
pub use hashes::{HashAlgorithm, HashManifest};
pub use naming::SourceName;
pub use verification::{VerificationError, VerificationPolicy, VerificationReport, verify_file};
