//! Picture stack loading.
//!
//! Instrument formats live behind the [`PictureSource`] trait. The crate ships
//! a `.npy` loader that pairs a 3-D picture stack with a JSON sidecar holding
//! the [`RunMetadata`], plus an in-memory source for code and tests.

use ndarray::{Array3, ShapeBuilder};
use npyz::{DType, NpyFile, Order, WriterBuilder};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::Result;
use crate::run::{ExperimentRun, RunMetadata};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid run metadata in {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported picture element type '{0}'")]
    UnsupportedDtype(String),
    #[error("picture stack must be 3-D (pictures, rows, cols), got shape {0:?}")]
    BadShape(Vec<u64>),
    #[error("picture data does not fill shape {0:?}")]
    Shape(Vec<u64>),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> LoadError + '_ {
    move |source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Anything that can provide a picture stack and its scan description
pub trait PictureSource {
    /// Raw pictures shaped `(pictures, rows, cols)`
    fn pictures(&self) -> std::result::Result<Array3<f64>, LoadError>;

    fn metadata(&self) -> std::result::Result<RunMetadata, LoadError>;

    /// Load and validate a run
    fn load(&self, pictures_per_repetition: usize) -> Result<ExperimentRun> {
        let pictures = self.pictures()?;
        let metadata = self.metadata()?;
        ExperimentRun::new(pictures, metadata, pictures_per_repetition)
    }
}

/// Reads `<name>.npy` together with its `<name>.json` sidecar
#[derive(Debug, Clone)]
pub struct NpyRunLoader {
    pub pictures_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl NpyRunLoader {
    /// Loader for a stack whose sidecar sits next to it with a `.json` extension
    pub fn new(pictures_path: impl AsRef<Path>) -> Self {
        let pictures_path = pictures_path.as_ref().to_path_buf();
        let metadata_path = pictures_path.with_extension("json");
        Self {
            pictures_path,
            metadata_path,
        }
    }

    pub fn with_metadata(mut self, metadata_path: impl AsRef<Path>) -> Self {
        self.metadata_path = metadata_path.as_ref().to_path_buf();
        self
    }
}

impl PictureSource for NpyRunLoader {
    fn pictures(&self) -> std::result::Result<Array3<f64>, LoadError> {
        let path = &self.pictures_path;
        let file = File::open(path).map_err(io_error(path))?;
        let npy = NpyFile::new(BufReader::new(file)).map_err(io_error(path))?;
        let stack = read_stack(npy).map_err(|e| match e {
            LoadError::Io { source, .. } => io_error(path)(source),
            other => other,
        })?;
        log::info!(
            "loaded {} pictures of {}x{} from {}",
            stack.dim().0,
            stack.dim().1,
            stack.dim().2,
            path.display()
        );
        Ok(stack)
    }

    fn metadata(&self) -> std::result::Result<RunMetadata, LoadError> {
        let path = &self.metadata_path;
        let file = File::open(path).map_err(io_error(path))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| LoadError::Metadata {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn read_stack<R: std::io::Read>(npy: NpyFile<R>) -> std::result::Result<Array3<f64>, LoadError> {
    let shape = npy.shape().to_vec();
    let dims: [usize; 3] = match shape.as_slice() {
        [p, r, c] => [*p as usize, *r as usize, *c as usize],
        _ => return Err(LoadError::BadShape(shape)),
    };
    let fortran = matches!(npy.order(), Order::Fortran);

    let descr = match npy.dtype() {
        DType::Plain(ts) => ts.to_string(),
        other => return Err(LoadError::UnsupportedDtype(format!("{other:?}"))),
    };
    let io = |source| LoadError::Io {
        path: PathBuf::new(),
        source,
    };
    let values: Vec<f64> = match descr.trim_start_matches(['<', '>', '|', '=']) {
        "u1" => npy.into_vec::<u8>().map_err(io)?.into_iter().map(f64::from).collect(),
        "u2" => npy.into_vec::<u16>().map_err(io)?.into_iter().map(f64::from).collect(),
        "u4" => npy.into_vec::<u32>().map_err(io)?.into_iter().map(f64::from).collect(),
        "i2" => npy.into_vec::<i16>().map_err(io)?.into_iter().map(f64::from).collect(),
        "i4" => npy.into_vec::<i32>().map_err(io)?.into_iter().map(f64::from).collect(),
        "i8" => npy
            .into_vec::<i64>()
            .map_err(io)?
            .into_iter()
            .map(|v| v as f64)
            .collect(),
        "f4" => npy.into_vec::<f32>().map_err(io)?.into_iter().map(f64::from).collect(),
        "f8" => npy.into_vec::<f64>().map_err(io)?,
        _ => return Err(LoadError::UnsupportedDtype(descr)),
    };

    let stack = if fortran {
        Array3::from_shape_vec(dims.f(), values)
    } else {
        Array3::from_shape_vec(dims, values)
    }
    .map_err(|_| LoadError::Shape(shape))?;
    Ok(stack.as_standard_layout().into_owned())
}

/// A run assembled in memory
#[derive(Debug, Clone)]
pub struct InMemoryRun {
    pub pictures: Array3<f64>,
    pub metadata: RunMetadata,
}

impl InMemoryRun {
    pub fn new(pictures: Array3<f64>, metadata: RunMetadata) -> Self {
        Self { pictures, metadata }
    }
}

impl PictureSource for InMemoryRun {
    fn pictures(&self) -> std::result::Result<Array3<f64>, LoadError> {
        Ok(self.pictures.clone())
    }

    fn metadata(&self) -> std::result::Result<RunMetadata, LoadError> {
        Ok(self.metadata.clone())
    }
}

/// Write a picture stack as a C-ordered `f64` `.npy` file
pub fn write_npy_stack(path: &Path, pictures: &Array3<f64>) -> std::result::Result<(), LoadError> {
    let (count, rows, cols) = pictures.dim();
    let file = File::create(path).map_err(io_error(path))?;
    let mut writer = npyz::WriteOptions::<f64>::new()
        .default_dtype()
        .shape(&[count as u64, rows as u64, cols as u64])
        .writer(BufWriter::new(file))
        .begin_nd()
        .map_err(io_error(path))?;
    for value in pictures.iter() {
        writer.push(value).map_err(io_error(path))?;
    }
    writer.finish().map_err(io_error(path))
}

/// Write a stack and its JSON sidecar so [`NpyRunLoader`] can read them back
pub fn write_run(
    pictures_path: &Path,
    pictures: &Array3<f64>,
    metadata: &RunMetadata,
) -> std::result::Result<(), LoadError> {
    write_npy_stack(pictures_path, pictures)?;
    let metadata_path = pictures_path.with_extension("json");
    let file = File::create(&metadata_path).map_err(io_error(&metadata_path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), metadata).map_err(|source| {
        LoadError::Metadata {
            path: metadata_path.clone(),
            source,
        }
    })
}

/// Convenience wrapper: load `<path>.npy` plus sidecar as a validated run
pub fn load_run(path: impl AsRef<Path>, pictures_per_repetition: usize) -> Result<ExperimentRun> {
    NpyRunLoader::new(path).load(pictures_per_repetition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use tempfile::TempDir;

    fn metadata() -> RunMetadata {
        RunMetadata {
            key_name: "hold time".to_string(),
            key: vec![1.0, 2.0],
            repetitions: 3,
        }
    }

    #[test]
    fn test_write_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.npy");
        let pictures = Array3::from_shape_fn((12, 3, 4), |(p, r, c)| (p * 100 + r * 10 + c) as f64);
        write_run(&path, &pictures, &metadata()).unwrap();

        let run = load_run(&path, 2).unwrap();
        assert_eq!(run.pictures, pictures);
        assert_eq!(run.key, vec![1.0, 2.0]);
        assert_eq!(run.key_name, "hold time");
        assert_eq!(run.repetitions, 3);
        assert_eq!(run.variations(), 2);
    }

    #[test]
    fn test_u16_stack() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("camera.npy");
        let file = File::create(&path).unwrap();
        let mut writer = npyz::WriteOptions::<u16>::new()
            .default_dtype()
            .shape(&[2, 2, 2])
            .writer(BufWriter::new(file))
            .begin_nd()
            .unwrap();
        for v in 0..8u16 {
            writer.push(&(v * 1000)).unwrap();
        }
        writer.finish().unwrap();

        let stack = NpyRunLoader::new(&path).pictures().unwrap();
        assert_eq!(stack.dim(), (2, 2, 2));
        assert_eq!(stack[[1, 1, 1]], 7000.0);
    }

    #[test]
    fn test_missing_sidecar() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.npy");
        write_npy_stack(&path, &Array3::zeros((2, 2, 2))).unwrap();
        assert!(matches!(
            NpyRunLoader::new(&path).metadata(),
            Err(LoadError::Io { .. })
        ));
    }

    #[test]
    fn test_bad_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flat.npy");
        let file = File::create(&path).unwrap();
        let mut writer = npyz::WriteOptions::<f64>::new()
            .default_dtype()
            .shape(&[4])
            .writer(BufWriter::new(file))
            .begin_nd()
            .unwrap();
        for v in 0..4 {
            writer.push(&(v as f64)).unwrap();
        }
        writer.finish().unwrap();

        assert!(matches!(
            NpyRunLoader::new(&path).pictures(),
            Err(LoadError::BadShape(_))
        ));
    }

    #[test]
    fn test_in_memory_key_mismatch() {
        let source = InMemoryRun::new(Array3::zeros((6, 2, 2)), metadata());
        assert!(matches!(
            source.load(1),
            Err(AnalysisError::KeyLengthMismatch {
                key_len: 2,
                variations: 3
            })
        ));
    }
}
