//! Per-camera lens calibration: loading, caching and undistortion.

use crate::error::{Error, Result};
use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_with, Interpolation};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct MatrixFile {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

/// The parts of a ROS camera-info YAML file that undistortion needs.
#[derive(Debug, Deserialize)]
struct CameraInfoFile {
    camera_matrix: MatrixFile,
    distortion_coefficients: MatrixFile,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistortionProfile {
    pub camera_matrix: [[f64; 3]; 3],
    /// `k1, k2, p1, p2[, k3[, k4, k5, k6]]`
    pub distortion_coefficients: Vec<f64>,
}

impl DistortionProfile {
    pub fn from_yaml(text: &str, path: &Path) -> Result<Self> {
        let invalid = |reason: String| Error::Calibration {
            path: path.to_path_buf(),
            reason,
        };
        let file: CameraInfoFile =
            serde_yaml::from_str(text).map_err(|e| invalid(e.to_string()))?;

        let k = &file.camera_matrix;
        if k.rows != 3 || k.cols != 3 || k.data.len() != 9 {
            return Err(invalid(format!(
                "camera_matrix must be 3x3 with 9 values, got {}x{} with {}",
                k.rows,
                k.cols,
                k.data.len()
            )));
        }
        let d = &file.distortion_coefficients;
        if d.rows * d.cols != d.data.len() {
            return Err(invalid(format!(
                "distortion_coefficients declares {}x{} but holds {} values",
                d.rows,
                d.cols,
                d.data.len()
            )));
        }
        if ![0, 4, 5, 8].contains(&d.data.len()) {
            return Err(invalid(format!(
                "{} distortion coefficients are not supported",
                d.data.len()
            )));
        }

        let mut camera_matrix = [[0.0; 3]; 3];
        for (i, value) in k.data.iter().enumerate() {
            camera_matrix[i / 3][i % 3] = *value;
        }
        if camera_matrix[0][0] == 0.0 || camera_matrix[1][1] == 0.0 {
            return Err(invalid("camera_matrix has a zero focal length".into()));
        }
        Ok(DistortionProfile {
            camera_matrix,
            distortion_coefficients: d.data.clone(),
        })
    }

    fn coefficient(&self, i: usize) -> f64 {
        self.distortion_coefficients.get(i).copied().unwrap_or(0.0)
    }

    /// Where each pixel of the undistorted `width` x `height` image comes from
    /// in the distorted one. The camera matrix is kept as the target matrix.
    pub fn undistort_map(&self, width: u32, height: u32) -> UndistortMap {
        let k = &self.camera_matrix;
        let (fx, skew, cx) = (k[0][0], k[0][1], k[0][2]);
        let (fy, cy) = (k[1][1], k[1][2]);
        let (k1, k2, p1, p2, k3) = (
            self.coefficient(0),
            self.coefficient(1),
            self.coefficient(2),
            self.coefficient(3),
            self.coefficient(4),
        );
        let (k4, k5, k6) = (self.coefficient(5), self.coefficient(6), self.coefficient(7));

        let mut sources = Vec::with_capacity(width as usize * height as usize);
        for v in 0..height {
            for u in 0..width {
                let y = (f64::from(v) - cy) / fy;
                let x = (f64::from(u) - cx - skew * y) / fx;
                let r2 = x * x + y * y;
                let r4 = r2 * r2;
                let r6 = r4 * r2;
                let radial =
                    (1.0 + k1 * r2 + k2 * r4 + k3 * r6) / (1.0 + k4 * r2 + k5 * r4 + k6 * r6);
                let xd = x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
                let yd = y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
                sources.push(((fx * xd + skew * yd + cx) as f32, (fy * yd + cy) as f32));
            }
        }
        UndistortMap {
            width,
            height,
            sources,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UndistortMap {
    width: u32,
    height: u32,
    sources: Vec<(f32, f32)>,
}

impl UndistortMap {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Resamples `image` bilinearly. Pixels that map outside it are black.
    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let width = self.width as usize;
        let sources = &self.sources;
        warp_with(
            image,
            move |x, y| {
                sources
                    .get(y as usize * width + x as usize)
                    .copied()
                    .unwrap_or((-1.0, -1.0))
            },
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
        )
    }
}

pub trait CalibrationStore {
    fn load(&self, key: &str) -> Result<DistortionProfile>;
}

/// `<root>/<key>.yaml` files.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::NotADirectory(root));
        }
        Ok(DirectoryStore { root })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.yaml"))
    }
}

impl CalibrationStore for DirectoryStore {
    fn load(&self, key: &str) -> Result<DistortionProfile> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Err(Error::NotAFile(path));
        }
        let text = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        log::debug!("loaded calibration {}", path.display());
        DistortionProfile::from_yaml(&text, &path)
    }
}

struct Entry {
    profile: DistortionProfile,
    map: Option<UndistortMap>,
}

/// Loads each key from the store at most once per run and keeps the remap
/// table for the last image size seen on that key.
pub struct ProfileCache<S> {
    store: S,
    entries: HashMap<String, Entry>,
}

impl<S: CalibrationStore> ProfileCache<S> {
    pub fn new(store: S) -> Self {
        ProfileCache {
            store,
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, key: &str) -> Result<&DistortionProfile> {
        if !self.entries.contains_key(key) {
            let profile = self.store.load(key)?;
            self.entries.insert(
                key.to_string(),
                Entry { profile, map: None },
            );
        }
        match self.entries.get(key) {
            Some(entry) => Ok(&entry.profile),
            None => Err(Error::MissingCalibration(vec![key.to_string()])),
        }
    }

    /// Loads every key now, reporting all failures together.
    pub fn preload<'a, I>(&mut self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut failures = Vec::new();
        for key in keys {
            if let Err(e) = self.get(key) {
                failures.push(format!("{key}: {e}"));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingCalibration(failures))
        }
    }

    pub fn undistort(&mut self, key: &str, image: &RgbImage) -> Result<RgbImage> {
        self.get(key)?;
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| Error::MissingCalibration(vec![key.to_string()]))?;
        let size = image.dimensions();
        let stale = entry.map.as_ref().map_or(true, |m| m.dimensions() != size);
        if stale {
            entry.map = Some(entry.profile.undistort_map(size.0, size.1));
        }
        Ok(match &entry.map {
            Some(map) => map.apply(image),
            None => image.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
