use lumen_render::TextureHandle;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("{path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{path}: face is {width}x{height}, expected {expected}x{expected}")]
    Size {
        path: PathBuf,
        width: u32,
        height: u32,
        expected: u32,
    },
}

/// Decode six square faces of equal size into RGBA8 pixels.
pub fn decode_faces(faces: &[PathBuf; 6]) -> Result<(u32, Vec<Vec<u8>>), LoadError> {
    let mut expected = None;
    let mut pixels = Vec::with_capacity(6);
    for path in faces {
        let face = image::open(path)
            .map_err(|source| LoadError::Image {
                path: path.clone(),
                source,
            })?
            .to_rgba8();
        let (width, height) = face.dimensions();
        let size = *expected.get_or_insert(width);
        if width != size || height != size {
            return Err(size_error(path, width, height, size));
        }
        pixels.push(face.into_raw());
    }
    Ok((expected.unwrap_or(0), pixels))
}

fn size_error(path: &Path, width: u32, height: u32, expected: u32) -> LoadError {
    LoadError::Size {
        path: path.to_owned(),
        width,
        height,
        expected,
    }
}

pub(crate) enum LoadResult {
    Loaded {
        texture: TextureHandle,
        size: u32,
        faces: Vec<Vec<u8>>,
    },
    Failed {
        texture: TextureHandle,
        error: LoadError,
    },
}

/// Decodes cubemaps off the render thread and hands the pixels back.
pub(crate) struct CubemapLoader {
    tx: flume::Sender<LoadResult>,
    rx: flume::Receiver<LoadResult>,
}

impl CubemapLoader {
    pub(crate) fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }

    pub(crate) fn spawn(&self, texture: TextureHandle, faces: [PathBuf; 6]) {
        let tx = self.tx.clone();
        std::thread::spawn(move || {
            let result = match decode_faces(&faces) {
                Ok((size, faces)) => LoadResult::Loaded {
                    texture,
                    size,
                    faces,
                },
                Err(error) => LoadResult::Failed { texture, error },
            };
            // The backend may be gone by now.
            if tx.send(result).is_err() {
                debug!(%texture, "cubemap finished after backend shutdown");
            }
        });
    }

    pub(crate) fn try_recv(&self) -> Option<LoadResult> {
        self.rx.try_recv().ok()
    }

    #[cfg(test)]
    fn recv_timeout(&self, timeout: std::time::Duration) -> Option<LoadResult> {
        self.rx.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn write_faces(dir: &Path, sizes: [u32; 6]) -> [PathBuf; 6] {
        let names = ["rt", "lf", "up", "dn", "ft", "bk"];
        std::array::from_fn(|i| {
            let path = dir.join(format!("test_{}.png", names[i]));
            image::RgbaImage::from_pixel(sizes[i], sizes[i], image::Rgba([i as u8, 0, 0, 255]))
                .save(&path)
                .unwrap();
            path
        })
    }

    #[test]
    fn decodes_six_faces() {
        let tmp = tempfile::tempdir().unwrap();
        let faces = write_faces(tmp.path(), [4; 6]);
        let (size, pixels) = decode_faces(&faces).unwrap();
        assert_eq!(size, 4);
        assert_eq!(pixels.len(), 6);
        assert_eq!(pixels[2].len(), 4 * 4 * 4);
        assert_eq!(pixels[2][0], 2);
    }

    #[test]
    fn mismatched_face_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let faces = write_faces(tmp.path(), [4, 4, 4, 8, 4, 4]);
        assert!(matches!(
            decode_faces(&faces),
            Err(LoadError::Size { width: 8, expected: 4, .. })
        ));
    }

    #[test]
    fn missing_face_is_an_image_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut faces = write_faces(tmp.path(), [2; 6]);
        faces[5] = tmp.path().join("nope.png");
        let error = decode_faces(&faces).unwrap_err();
        assert!(error.to_string().contains("nope.png"));
    }

    #[test]
    fn loader_reports_back() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = CubemapLoader::new();
        loader.spawn(TextureHandle(7), write_faces(tmp.path(), [2; 6]));
        match loader.recv_timeout(Duration::from_secs(10)) {
            Some(LoadResult::Loaded { texture, size, .. }) => {
                assert_eq!((texture, size), (TextureHandle(7), 2));
            }
            _ => panic!("expected a loaded cubemap"),
        }

        let mut broken = write_faces(tmp.path(), [2; 6]);
        broken[0] = tmp.path().join("missing.png");
        loader.spawn(TextureHandle(8), broken);
        assert!(matches!(
            loader.recv_timeout(Duration::from_secs(10)),
            Some(LoadResult::Failed { texture: TextureHandle(8), .. })
        ));
    }
}
