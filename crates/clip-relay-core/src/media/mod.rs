//! Media sources, output selectors and the extraction backend.

/// Backend abstraction used by resolvers and jobs
pub mod backend;
/// Option discovery strategies
pub mod resolver;
/// Output selectors
pub mod selector;
/// Source URL validation
pub mod source;
/// yt-dlp backend implementation
pub mod ytdlp;

pub use backend::{FetchRequest, MediaBackend, MediaInfo};
pub use resolver::{CanonicalResolver, FormatResolver, ProbingResolver, ResolvedMedia};
pub use selector::{MediaKind, Selector};
pub use source::SourceUrl;
pub use ytdlp::YtDlpBackend;
