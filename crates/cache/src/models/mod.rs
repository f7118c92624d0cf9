mod patch;
mod record;

pub use self::patch::{FeatureImagePatch, FieldPatch, ProcessResult};
pub use self::record::{FileRecord, Stamps};
pub(crate) use self::record::RecordRow;
