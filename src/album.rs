//! Captured photos and the stores that keep them.
//!
//! Photos are immutable once captured. A store only appends, lists (newest
//! first) and deletes.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::location::Position;
use crate::params::PhotoEncoding;

pub type PhotoId = u64;

/// Index file kept next to the encoded images
const INDEX_FILE: &str = "album.json";

/// One shutter action's result
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedPhoto {
    pub image: RgbaImage,
    pub f_number: f64,
    pub bpm: u32,
    pub taken_at: DateTime<Utc>,
    pub location: Option<Position>,
}

impl CapturedPhoto {
    /// Capture metadata as a short comment, e.g. `F:8,BPM:72`
    pub fn comment(&self) -> String {
        format!("F:{},BPM:{}", self.f_number.round() as u32, self.bpm)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredPhoto {
    pub id: PhotoId,
    pub photo: CapturedPhoto,
}

/// Photo persistence
pub trait PhotoStore {
    fn append(&mut self, photo: &CapturedPhoto) -> Result<PhotoId, StoreError>;

    /// Every photo, newest first
    fn list_all(&self) -> Result<Vec<StoredPhoto>, StoreError>;

    fn delete(&mut self, id: PhotoId) -> Result<(), StoreError>;
}

fn newest_first(photos: &mut [StoredPhoto]) {
    photos.sort_by(|a, b| {
        b.photo
            .taken_at
            .cmp(&a.photo.taken_at)
            .then(b.id.cmp(&a.id))
    });
}

/// Volatile store, lost with the process
#[derive(Debug, Default)]
pub struct MemoryAlbum {
    photos: Vec<StoredPhoto>,
    next_id: PhotoId,
}

impl MemoryAlbum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }
}

impl PhotoStore for MemoryAlbum {
    fn append(&mut self, photo: &CapturedPhoto) -> Result<PhotoId, StoreError> {
        self.next_id += 1;
        let id = self.next_id;
        self.photos.push(StoredPhoto {
            id,
            photo: photo.clone(),
        });
        Ok(id)
    }

    fn list_all(&self) -> Result<Vec<StoredPhoto>, StoreError> {
        let mut photos = self.photos.clone();
        newest_first(&mut photos);
        Ok(photos)
    }

    fn delete(&mut self, id: PhotoId) -> Result<(), StoreError> {
        let before = self.photos.len();
        self.photos.retain(|p| p.id != id);
        if self.photos.len() == before {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

/// Metadata of one persisted photo
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PhotoRecord {
    id: PhotoId,
    file: String,
    f_number: f64,
    bpm: u32,
    taken_at: DateTime<Utc>,
    location: Option<Position>,
    comment: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AlbumIndex {
    next_id: PhotoId,
    photos: Vec<PhotoRecord>,
}

/// Album persisted in a directory: encoded images plus a JSON index
pub struct DirectoryAlbum {
    root: PathBuf,
    encoding: PhotoEncoding,
    index: AlbumIndex,
}

impl DirectoryAlbum {
    /// Open (or create) an album rooted at `root`
    pub fn open(root: impl AsRef<Path>, encoding: PhotoEncoding) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let index_path = root.join(INDEX_FILE);
        let index = if index_path.exists() {
            serde_json::from_reader(BufReader::new(File::open(&index_path)?))?
        } else {
            AlbumIndex::default()
        };
        log::debug!(
            "Opened album {} with {} photos",
            root.display(),
            index.photos.len()
        );

        Ok(Self {
            root,
            encoding,
            index,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the encoded image for a photo
    pub fn image_path(&self, id: PhotoId) -> Option<PathBuf> {
        self.index
            .photos
            .iter()
            .find(|r| r.id == id)
            .map(|r| self.root.join(&r.file))
    }

    fn encode(&self, image: &RgbaImage, path: &Path) -> Result<(), StoreError> {
        match self.encoding {
            PhotoEncoding::Jpeg { quality } => {
                let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
                let writer = BufWriter::new(File::create(path)?);
                JpegEncoder::new_with_quality(writer, quality).encode_image(&rgb)?;
            }
            PhotoEncoding::Png => image.save(path)?,
        }
        Ok(())
    }

    /// Persist `index` and make it current
    ///
    /// `self.index` only changes once the file is in place, so a failed
    /// write leaves memory and disk agreeing on the previous index.
    fn commit_index(&mut self, index: AlbumIndex) -> Result<(), StoreError> {
        let tmp = self.root.join(format!("{}.tmp", INDEX_FILE));
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut writer, &index)?;
        writer.flush()?;
        drop(writer);
        fs::rename(&tmp, self.root.join(INDEX_FILE))?;
        self.index = index;
        Ok(())
    }

    fn load(&self, record: &PhotoRecord) -> Result<StoredPhoto, StoreError> {
        let image = image::open(self.root.join(&record.file))?.to_rgba8();
        Ok(StoredPhoto {
            id: record.id,
            photo: CapturedPhoto {
                image,
                f_number: record.f_number,
                bpm: record.bpm,
                taken_at: record.taken_at,
                location: record.location,
            },
        })
    }
}

impl PhotoStore for DirectoryAlbum {
    fn append(&mut self, photo: &CapturedPhoto) -> Result<PhotoId, StoreError> {
        let id = self.index.next_id + 1;
        let file = format!("kokoro_{:05}.{}", id, self.encoding.extension());
        let path = self.root.join(&file);
        self.encode(&photo.image, &path)?;

        let mut index = self.index.clone();
        index.next_id = id;
        index.photos.push(PhotoRecord {
            id,
            file,
            f_number: photo.f_number,
            bpm: photo.bpm,
            taken_at: photo.taken_at,
            location: photo.location,
            comment: photo.comment(),
        });
        if let Err(err) = self.commit_index(index) {
            // Nothing references the image yet; the id is reused next time
            if let Err(cleanup) = fs::remove_file(&path) {
                log::warn!("Could not remove orphaned {}: {}", path.display(), cleanup);
            }
            return Err(err);
        }
        log::info!("Saved photo {} ({})", id, photo.comment());
        Ok(id)
    }

    fn list_all(&self) -> Result<Vec<StoredPhoto>, StoreError> {
        let mut photos: Vec<StoredPhoto> = self
            .index
            .photos
            .iter()
            .filter_map(|record| match self.load(record) {
                Ok(stored) => Some(stored),
                Err(err) => {
                    log::warn!("Skipping photo {} ({}): {}", record.id, record.file, err);
                    None
                }
            })
            .collect();
        newest_first(&mut photos);
        Ok(photos)
    }

    fn delete(&mut self, id: PhotoId) -> Result<(), StoreError> {
        let position = self
            .index
            .photos
            .iter()
            .position(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))?;
        let path = self.root.join(&self.index.photos[position].file);

        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("Image for photo {} was already gone", id);
            }
            Err(err) => return Err(err.into()),
        }

        let mut index = self.index.clone();
        index.photos.remove(position);
        self.commit_index(index)?;
        log::info!("Deleted photo {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::Rgba;

    fn photo(f_number: f64, bpm: u32, secs: i64) -> CapturedPhoto {
        CapturedPhoto {
            image: RgbaImage::from_pixel(8, 6, Rgba([120, 60, 30, 255])),
            f_number,
            bpm,
            taken_at: Utc.timestamp_opt(1_700_000_000 + secs, 123_456_789).unwrap(),
            location: None,
        }
    }

    #[test]
    fn test_comment() {
        assert_eq!(photo(5.6, 72, 0).comment(), "F:6,BPM:72");
    }

    #[test]
    fn test_memory_album_newest_first() {
        let mut album = MemoryAlbum::new();
        let old = album.append(&photo(2.0, 60, 0)).unwrap();
        let new = album.append(&photo(22.0, 100, 10)).unwrap();

        let listed = album.list_all().unwrap();
        assert_eq!(listed.iter().map(|p| p.id).collect::<Vec<_>>(), vec![new, old]);

        album.delete(old).unwrap();
        assert_eq!(album.len(), 1);
        assert!(matches!(album.delete(old), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_directory_album_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut album =
            DirectoryAlbum::open(dir.path(), PhotoEncoding::Jpeg { quality: 90 }).unwrap();

        let mut original = photo(5.6, 72, 0);
        original.location = Some(Position {
            lat: 35.6812,
            lon: 139.7671,
        });
        let id = album.append(&original).unwrap();
        assert!(album.image_path(id).unwrap().exists());

        let listed = album.list_all().unwrap();
        assert_eq!(listed.len(), 1);
        let stored = &listed[0].photo;
        assert_eq!(stored.f_number, original.f_number);
        assert_eq!(stored.bpm, original.bpm);
        assert_eq!(stored.taken_at, original.taken_at);
        assert_eq!(stored.location, original.location);
        assert_eq!(stored.image.dimensions(), (8, 6));
    }

    #[test]
    fn test_directory_album_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut album = DirectoryAlbum::open(dir.path(), PhotoEncoding::Png).unwrap();
            album.append(&photo(2.0, 60, 0)).unwrap();
            album.append(&photo(11.0, 80, 5)).unwrap();
        }

        let mut album = DirectoryAlbum::open(dir.path(), PhotoEncoding::Png).unwrap();
        let listed = album.list_all().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].photo.bpm, 80);
        // Lossless encoding keeps pixels exactly
        assert_eq!(listed[1].photo.image, photo(2.0, 60, 0).image);

        // Ids keep counting after reopen
        let id = album.append(&photo(3.0, 61, 9)).unwrap();
        assert_eq!(id, 3);
    }

    #[test]
    fn test_directory_album_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut album = DirectoryAlbum::open(dir.path(), PhotoEncoding::Png).unwrap();
        let id = album.append(&photo(8.0, 70, 0)).unwrap();
        let path = album.image_path(id).unwrap();

        album.delete(id).unwrap();
        assert!(!path.exists());
        assert!(album.list_all().unwrap().is_empty());
        assert!(matches!(album.delete(id), Err(StoreError::NotFound(1))));
    }

    #[test]
    fn test_failed_delete_keeps_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut album = DirectoryAlbum::open(dir.path(), PhotoEncoding::Png).unwrap();
        let id = album.append(&photo(8.0, 70, 0)).unwrap();

        // A directory where the image should be cannot be removed as a file
        let path = album.image_path(id).unwrap();
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        assert!(album.delete(id).is_err());
        assert_eq!(album.image_path(id), Some(path.clone()));

        let reopened = DirectoryAlbum::open(dir.path(), PhotoEncoding::Png).unwrap();
        assert_eq!(reopened.image_path(id), Some(path));
    }

    #[test]
    fn test_failed_append_consumes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut album = DirectoryAlbum::open(dir.path(), PhotoEncoding::Png).unwrap();

        let blocker = dir.path().join("album.json.tmp");
        fs::create_dir(&blocker).unwrap();
        assert!(album.append(&photo(8.0, 70, 0)).is_err());
        assert!(album.list_all().unwrap().is_empty());
        assert_eq!(album.image_path(1), None);
        assert!(!dir.path().join("kokoro_00001.png").exists());

        fs::remove_dir(&blocker).unwrap();
        assert_eq!(album.append(&photo(8.0, 70, 0)).unwrap(), 1);

        let reopened = DirectoryAlbum::open(dir.path(), PhotoEncoding::Png).unwrap();
        let listed = reopened.list_all().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, 1);
    }

    #[test]
    fn test_list_skips_unreadable_images() {
        let dir = tempfile::tempdir().unwrap();
        let mut album = DirectoryAlbum::open(dir.path(), PhotoEncoding::Png).unwrap();
        let first = album.append(&photo(4.0, 62, 0)).unwrap();
        let second = album.append(&photo(8.0, 70, 10)).unwrap();
        let third = album.append(&photo(16.0, 95, 20)).unwrap();

        fs::remove_file(album.image_path(second).unwrap()).unwrap();
        fs::write(album.image_path(third).unwrap(), b"not a png").unwrap();

        let listed = album.list_all().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, first);

        // The missing image does not block deleting its record
        album.delete(second).unwrap();
        assert_eq!(album.image_path(second), None);
    }
}
