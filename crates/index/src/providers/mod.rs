//! One [`ContentStrategy`](crate::ContentStrategy) per content kind.

mod feature;
mod metadata;
mod preview;
mod tags;

pub use self::feature::{DependencyTracker, FeatureImageDependencies, FeatureImageProvider};
pub use self::metadata::{MetadataProvider, MetadataScratch};
pub use self::preview::PreviewProvider;
pub use self::tags::TagProvider;
