//! COCO annotation file loading and querying.
//!
//! [`AnnotationIndex`] is the narrow lookup surface the renderer needs;
//! [`COCO`] implements it over an in-memory [`Dataset`].

use std::collections::HashMap;
use std::path::Path;

use crate::contour;
use crate::error::{Error, Result};
use crate::mask;
use crate::raster::Mask;
use crate::types::{Annotation, Category, Dataset, Image, Rle};

/// Conjunctive annotation filter. Empty lists and `None` match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationQuery {
    pub img_ids: Vec<u64>,
    pub cat_ids: Vec<u64>,
    /// Open interval `(min, max)` on the annotation's `area`.
    pub area_rng: Option<[f64; 2]>,
    pub iscrowd: Option<bool>,
    pub type_ids: Vec<u64>,
}

impl AnnotationQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn img_ids(mut self, ids: &[u64]) -> Self {
        self.img_ids = ids.to_vec();
        self
    }

    pub fn cat_ids(mut self, ids: &[u64]) -> Self {
        self.cat_ids = ids.to_vec();
        self
    }

    pub fn area_rng(mut self, min: f64, max: f64) -> Self {
        self.area_rng = Some([min, max]);
        self
    }

    pub fn iscrowd(mut self, crowd: bool) -> Self {
        self.iscrowd = Some(crowd);
        self
    }

    pub fn type_ids(mut self, ids: &[u64]) -> Self {
        self.type_ids = ids.to_vec();
        self
    }

    fn matches(&self, ann: &Annotation) -> bool {
        if !self.cat_ids.is_empty() && !self.cat_ids.contains(&ann.category_id) {
            return false;
        }
        if let Some([lo, hi]) = self.area_rng {
            let a = ann.area.unwrap_or(0.0);
            if !(a > lo && a < hi) {
                return false;
            }
        }
        if !self.type_ids.is_empty() {
            match ann.type_id {
                Some(t) if self.type_ids.contains(&t) => {}
                _ => return false,
            }
        }
        if let Some(crowd) = self.iscrowd {
            if ann.iscrowd != crowd {
                return false;
            }
        }
        true
    }
}

/// Image lookup and annotation filtering.
pub trait AnnotationIndex {
    fn lookup_image(&self, id: u64) -> Option<&Image>;

    /// Annotations matching every filter of `query`, sorted by id.
    fn query_annotations(&self, query: &AnnotationQuery) -> Vec<&Annotation>;
}

/// Counts reported after loading an annotation file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSummary {
    pub images: usize,
    pub annotations: usize,
    /// Category ids that have at least one annotation, ascending.
    pub categories: Vec<u64>,
}

/// In-memory COCO dataset with lookup indices.
pub struct COCO {
    pub dataset: Dataset,
    /// ann_id -> index into dataset.annotations
    anns: HashMap<u64, usize>,
    /// img_id -> index into dataset.images
    imgs: HashMap<u64, usize>,
    /// cat_id -> index into dataset.categories
    cats: HashMap<u64, usize>,
    /// img_id -> [ann_id, ...]
    img_to_anns: HashMap<u64, Vec<u64>>,
    /// cat_id -> [img_id, ...] (sorted, unique)
    cat_to_imgs: HashMap<u64, Vec<u64>>,
}

impl COCO {
    /// Load a COCO annotation JSON file and build indices.
    pub fn new(annotation_file: &Path) -> Result<Self> {
        let file = std::fs::File::open(annotation_file)?;
        let reader = std::io::BufReader::new(file);
        let dataset: Dataset = serde_json::from_reader(reader).map_err(|source| Error::Json {
            path: annotation_file.to_path_buf(),
            source,
        })?;
        Ok(Self::from_dataset(dataset))
    }

    /// Build a COCO object from an already-loaded Dataset.
    pub fn from_dataset(dataset: Dataset) -> Self {
        let mut coco = COCO {
            dataset,
            anns: HashMap::new(),
            imgs: HashMap::new(),
            cats: HashMap::new(),
            img_to_anns: HashMap::new(),
            cat_to_imgs: HashMap::new(),
        };
        coco.create_index();
        coco
    }

    fn create_index(&mut self) {
        for (i, ann) in self.dataset.annotations.iter().enumerate() {
            self.anns.insert(ann.id, i);
            self.img_to_anns
                .entry(ann.image_id)
                .or_default()
                .push(ann.id);
            self.cat_to_imgs
                .entry(ann.category_id)
                .or_default()
                .push(ann.image_id);
        }
        for (i, img) in self.dataset.images.iter().enumerate() {
            self.imgs.insert(img.id, i);
        }
        for (i, cat) in self.dataset.categories.iter().enumerate() {
            self.cats.insert(cat.id, i);
        }
        for ids in self.cat_to_imgs.values_mut() {
            ids.sort_unstable();
            ids.dedup();
        }
    }

    pub fn summary(&self) -> DatasetSummary {
        let mut categories: Vec<u64> = self.cat_to_imgs.keys().copied().collect();
        categories.sort_unstable();
        DatasetSummary {
            images: self.imgs.len(),
            annotations: self.anns.len(),
            categories,
        }
    }

    /// Image ids matching the given filters, ascending.
    ///
    /// Requested ids that are not in the dataset are dropped. With `cat_ids`,
    /// only images holding at least one annotation of those categories remain.
    pub fn get_img_ids(&self, img_ids: &[u64], cat_ids: &[u64]) -> Vec<u64> {
        let mut ids: Vec<u64> = if img_ids.is_empty() {
            self.dataset.images.iter().map(|img| img.id).collect()
        } else {
            img_ids
                .iter()
                .copied()
                .filter(|id| self.imgs.contains_key(id))
                .collect()
        };

        if !cat_ids.is_empty() {
            let mut valid: Vec<u64> = cat_ids
                .iter()
                .filter_map(|cid| self.cat_to_imgs.get(cid))
                .flatten()
                .copied()
                .collect();
            valid.sort_unstable();
            valid.dedup();
            ids.retain(|id| valid.binary_search(id).is_ok());
        }

        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Annotation ids matching `query`, ascending.
    pub fn get_ann_ids(&self, query: &AnnotationQuery) -> Vec<u64> {
        self.query_annotations(query).iter().map(|a| a.id).collect()
    }

    pub fn load_anns(&self, ids: &[u64]) -> Vec<&Annotation> {
        ids.iter().filter_map(|&id| self.get_ann(id)).collect()
    }

    pub fn load_imgs(&self, ids: &[u64]) -> Vec<&Image> {
        ids.iter().filter_map(|&id| self.get_img(id)).collect()
    }

    pub fn get_ann(&self, id: u64) -> Option<&Annotation> {
        self.anns.get(&id).map(|&i| &self.dataset.annotations[i])
    }

    pub fn get_img(&self, id: u64) -> Option<&Image> {
        self.imgs.get(&id).map(|&i| &self.dataset.images[i])
    }

    pub fn get_cat(&self, id: u64) -> Option<&Category> {
        self.cats.get(&id).map(|&i| &self.dataset.categories[i])
    }

    /// The annotation's segmentation as an RLE at its image's size.
    ///
    /// `Ok(None)` when the annotation has no segmentation or its image is
    /// unknown.
    pub fn ann_to_rle(&self, ann: &Annotation) -> Result<Option<Rle>> {
        let (Some(img), Some(seg)) = (self.get_img(ann.image_id), &ann.segmentation) else {
            return Ok(None);
        };
        seg.to_rle(img.height, img.width).map(Some)
    }

    /// The annotation's segmentation as a dense mask.
    pub fn ann_to_mask(&self, ann: &Annotation) -> Result<Option<Mask>> {
        self.ann_to_rle(ann)?.map(|rle| mask::decode(&rle)).transpose()
    }

    /// Re-derive polygon contours from the annotation's mask.
    pub fn ann_to_polygon(&self, ann: &Annotation) -> Result<Option<Vec<Vec<f64>>>> {
        Ok(self
            .ann_to_mask(ann)?
            .map(|m| contour::extract_contours(&m)))
    }
}

impl AnnotationIndex for COCO {
    fn lookup_image(&self, id: u64) -> Option<&Image> {
        self.get_img(id)
    }

    fn query_annotations(&self, query: &AnnotationQuery) -> Vec<&Annotation> {
        let candidates: Box<dyn Iterator<Item = &Annotation> + '_> = if query.img_ids.is_empty() {
            Box::new(self.dataset.annotations.iter())
        } else {
            Box::new(
                query
                    .img_ids
                    .iter()
                    .filter_map(|id| self.img_to_anns.get(id))
                    .flatten()
                    .filter_map(|&id| self.get_ann(id)),
            )
        };
        let mut result: Vec<&Annotation> = candidates.filter(|ann| query.matches(ann)).collect();
        result.sort_by_key(|ann| ann.id);
        result.dedup_by_key(|ann| ann.id);
        result
    }
}
