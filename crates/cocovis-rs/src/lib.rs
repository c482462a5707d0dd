pub mod coco;
pub mod color;
pub mod composite;
pub mod contour;
pub mod error;
pub mod mask;
pub mod params;
pub mod raster;
pub mod source;
pub mod types;

pub use coco::{AnnotationIndex, AnnotationQuery, DatasetSummary, COCO};
pub use composite::{Compositor, MaskInput};
pub use contour::{extract_contours, ContourOptions};
pub use error::{Error, Result};
pub use params::{ColorMode, RenderParams};
pub use raster::{rasterize, Mask};
pub use source::{FsImageSource, ImageSource};
pub use types::{Annotation, Category, Dataset, Image, Rle, Segmentation};
