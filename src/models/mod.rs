pub mod analysis;
pub mod comment;
pub mod loaders;
pub mod post;

pub use analysis::{
    AggregatedResponse, AnalysisContext, AnalysisMetadata, AnalysisOutcome, CommentAnalysis,
    ThreadContext,
};
pub use comment::{CommentNode, CommentRecord, DELETED_MARKER};
pub use loaders::{load_posts_from_file, records_from_comment_forest};
pub use post::{Post, RawPost};
