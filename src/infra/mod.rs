//! AWS-backed adapters used by the binary.
//!
//! [`S3StationCatalog`] reads the station list from an S3 object.
//! [`upload_archive_for_date`] ships one day of archived readings to S3.

mod stations;
mod upload;

pub use stations::S3StationCatalog;
pub use upload::upload_archive_for_date;
