//! OCT Dataset Loader
//!
//! Walks a folder-structured retinal OCT dataset with one directory per
//! split and one subdirectory per diagnostic class:
//!
//! ```text
//! root/
//! ├── train/
//! │   ├── CNV/
//! │   ├── DME/
//! │   ├── DRUSEN/
//! │   └── NORMAL/
//! ├── val/
//! │   └── ...
//! └── test/
//!     └── ...
//! ```
//!
//! Class names are derived from directory names and must be identical across
//! splits. A missing directory or an empty class folder is a fatal
//! configuration error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::utils::error::{OctError, Result};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "tiff"];

/// Dataset splits with fixed on-disk directory names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    /// All splits, in canonical order
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    /// Directory name under the dataset root
    pub fn dir_name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }

    fn index(&self) -> usize {
        match self {
            Split::Train => 0,
            Split::Val => 1,
            Split::Test => 2,
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A single image sample with its label and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index (0-3)
    pub label: usize,
    /// Class name (e.g., "DRUSEN")
    pub class_name: String,
}

/// Retinal OCT dataset indexed from disk; image decoding is lazy
#[derive(Debug)]
pub struct OctDataset {
    /// Root directory of the dataset
    root_dir: PathBuf,
    /// Class names, sorted; index == label
    class_names: Vec<String>,
    /// Mapping from class name to label index
    class_to_idx: HashMap<String, usize>,
    /// Samples per split
    splits: [Vec<ImageSample>; 3],
}

impl OctDataset {
    /// Index a dataset from the given root directory.
    ///
    /// Fails with `OctError::Config` when a split directory is missing, no
    /// class directories exist, a class folder holds no images, or the class
    /// sets differ between splits.
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Loading OCT dataset from: {:?}", root_dir);

        if !root_dir.exists() {
            return Err(OctError::Config(format!(
                "dataset directory does not exist: {}",
                root_dir.display()
            )));
        }

        for split in Split::ALL {
            let dir = root_dir.join(split.dir_name());
            if !dir.is_dir() {
                return Err(OctError::Config(format!(
                    "missing split directory: {}",
                    dir.display()
                )));
            }
        }

        // Class set is defined by the training split, sorted for stable labels
        let class_names = discover_classes(&root_dir.join(Split::Train.dir_name()))?;
        if class_names.is_empty() {
            return Err(OctError::Config(format!(
                "no class directories found under {}",
                root_dir.join("train").display()
            )));
        }
        info!("Found {} classes", class_names.len());

        let class_to_idx: HashMap<String, usize> = class_names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();

        let mut splits: [Vec<ImageSample>; 3] = [Vec::new(), Vec::new(), Vec::new()];

        for split in Split::ALL {
            let split_dir = root_dir.join(split.dir_name());
            let split_classes = discover_classes(&split_dir)?;
            if split_classes != class_names {
                return Err(OctError::Config(format!(
                    "class directories in split '{}' do not match the training split \
                     (expected {:?}, found {:?})",
                    split, class_names, split_classes
                )));
            }

            let samples = &mut splits[split.index()];
            for class_name in &class_names {
                let class_dir = split_dir.join(class_name);
                let label = class_to_idx[class_name];
                let before = samples.len();

                for entry in WalkDir::new(&class_dir)
                    .min_depth(1)
                    .max_depth(1)
                    .into_iter()
                    .filter_map(|e| e.ok())
                {
                    let path = entry.path().to_path_buf();
                    if is_image_file(&path) {
                        samples.push(ImageSample {
                            path,
                            label,
                            class_name: class_name.clone(),
                        });
                    }
                }

                let count = samples.len() - before;
                if count == 0 {
                    return Err(OctError::Config(format!(
                        "class folder '{}' in split '{}' contains no images",
                        class_name, split
                    )));
                }
                debug!("Split '{}', class '{}': {} samples", split, class_name, count);
            }

            info!("Split '{}': {} samples", split, samples.len());
        }

        Ok(Self {
            root_dir,
            class_names,
            class_to_idx,
            splits,
        })
    }

    /// Dataset root directory
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Samples of one split
    pub fn samples(&self, split: Split) -> &[ImageSample] {
        &self.splits[split.index()]
    }

    /// Number of samples in one split
    pub fn len(&self, split: Split) -> usize {
        self.splits[split.index()].len()
    }

    /// Whether a split holds no samples
    pub fn is_empty(&self, split: Split) -> bool {
        self.splits[split.index()].is_empty()
    }

    /// Number of classes
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Class names, sorted; index == label
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Label index of a class name
    pub fn class_index(&self, name: &str) -> Option<usize> {
        self.class_to_idx.get(name).copied()
    }

    /// Statistics for one split
    pub fn stats(&self, split: Split) -> DatasetStats {
        let samples = self.samples(split);
        let mut class_counts = vec![0usize; self.num_classes()];
        for sample in samples {
            class_counts[sample.label] += 1;
        }

        DatasetStats {
            split,
            total_samples: samples.len(),
            num_classes: self.num_classes(),
            class_counts,
            class_names: self.class_names.clone(),
        }
    }
}

/// Sorted class directory names directly under `dir`
fn discover_classes(dir: &Path) -> Result<Vec<String>> {
    let mut classes = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                classes.push(name.to_string());
            }
        }
    }
    classes.sort();
    Ok(classes)
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Statistics about one dataset split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub split: Split,
    pub total_samples: usize,
    pub num_classes: usize,
    pub class_counts: Vec<usize>,
    pub class_names: Vec<String>,
}

impl DatasetStats {
    /// Print statistics to console
    pub fn print(&self) {
        println!("\n📊 Split '{}' statistics:", self.split);
        println!("  Total samples: {}", self.total_samples);
        println!("  Number of classes: {}", self.num_classes);
        println!("\n  Samples per class:");

        for (idx, name) in self.class_names.iter().enumerate() {
            let count = self.class_counts[idx];
            let bar_len = (count as f32 / self.total_samples.max(1) as f32 * 40.0) as usize;
            let bar: String = "█".repeat(bar_len);
            println!("    {:3}. {:12} {:6} {}", idx, name, count, bar);
        }
    }
}
