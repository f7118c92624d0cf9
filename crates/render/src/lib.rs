//! Generated previews for attachments that aren't images.
//!
//! - [`Rasterizer`]s turn a PDF or diagram into PNG bytes, usually by
//!   shelling out to an external program ([`CommandRasterizer`]).
//! - [`RenderCache`] stores those PNGs under deterministic file names so a
//!   render is produced once and shared by every document using it.
//! - [`thumbnail()`] shrinks any image to the inline square thumbnail kept in
//!   the content cache.

mod cache;
pub mod error;
mod rasterizer;
mod thumbnail;

pub use crate::cache::RenderCache;
#[cfg(any(test, feature = "mock"))]
pub use crate::rasterizer::MockRasterizer;
pub use crate::rasterizer::{CommandRasterizer, Rasterizer, RasterizerHandle, RasterizerRegistry, RenderedImage};
pub use crate::thumbnail::{DATA_URL_PREFIX, thumbnail};
