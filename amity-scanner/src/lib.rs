pub mod driver;
pub mod error;
pub mod extract;
pub mod record;
pub mod scroll;

pub use driver::{HttpPageDriver, PageDocument, PageDriver, RenderedPage, SessionCookie};
pub use error::ScanError;
pub use extract::{FriendListExtractor, ListingSelectors, RecordExtractor};
pub use record::{CandidateRecord, RecordSet};
pub use scroll::{Collection, ScrollController, ScrollOptions, StopReason};
