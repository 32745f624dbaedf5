use std::path::Path;

/// Broad category of a recognized media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Rendered images: jpg, png, heic, ...
    Image,
    /// Camera RAW formats: cr2, nef, arw, dng, ...
    Raw,
    /// Video: mp4, mov, mts, ...
    Video,
}

/// What a recognized extension maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaType {
    pub kind: MediaKind,
    /// Content type sent along with the object.
    pub content_type: &'static str,
}

const OCTET_STREAM: &str = "application/octet-stream";

/// Classify a file by its extension (case-insensitive).
///
/// Returns `None` for anything that isn't a recognized media file; the
/// scanner leaves those out of the inventory entirely.
pub fn classify(path: impl AsRef<Path>) -> Option<MediaType> {
    let extension = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
    let (kind, content_type) = match extension.as_str() {
        // Images
        "jpg" | "jpeg" | "jpe" => (MediaKind::Image, "image/jpeg"),
        "png" => (MediaKind::Image, "image/png"),
        "gif" => (MediaKind::Image, "image/gif"),
        "bmp" => (MediaKind::Image, "image/bmp"),
        "tif" | "tiff" => (MediaKind::Image, "image/tiff"),
        "webp" => (MediaKind::Image, "image/webp"),
        "heic" => (MediaKind::Image, "image/heic"),
        "heif" => (MediaKind::Image, "image/heif"),
        "avif" => (MediaKind::Image, "image/avif"),

        // RAW
        "dng" => (MediaKind::Raw, "image/x-adobe-dng"),
        "cr2" => (MediaKind::Raw, "image/x-canon-cr2"),
        "cr3" => (MediaKind::Raw, "image/x-canon-cr3"),
        "crw" => (MediaKind::Raw, "image/x-canon-crw"),
        "nef" => (MediaKind::Raw, "image/x-nikon-nef"),
        "nrw" => (MediaKind::Raw, "image/x-nikon-nrw"),
        "arw" => (MediaKind::Raw, "image/x-sony-arw"),
        "srf" | "sr2" => (MediaKind::Raw, "image/x-sony-sr2"),
        "raf" => (MediaKind::Raw, "image/x-fuji-raf"),
        "orf" => (MediaKind::Raw, "image/x-olympus-orf"),
        "rw2" => (MediaKind::Raw, "image/x-panasonic-rw2"),
        "pef" => (MediaKind::Raw, "image/x-pentax-pef"),
        "srw" => (MediaKind::Raw, "image/x-samsung-srw"),
        "x3f" => (MediaKind::Raw, "image/x-sigma-x3f"),
        "3fr" | "fff" | "erf" | "kdc" | "mrw" | "mos" | "iiq" | "rwl" | "raw" => (MediaKind::Raw, OCTET_STREAM),

        // Video
        "mp4" | "m4v" => (MediaKind::Video, "video/mp4"),
        "mov" => (MediaKind::Video, "video/quicktime"),
        "avi" => (MediaKind::Video, "video/x-msvideo"),
        "mkv" => (MediaKind::Video, "video/x-matroska"),
        "webm" => (MediaKind::Video, "video/webm"),
        "wmv" => (MediaKind::Video, "video/x-ms-wmv"),
        "mts" | "m2ts" => (MediaKind::Video, "video/mp2t"),
        "mpg" | "mpeg" => (MediaKind::Video, "video/mpeg"),
        "3gp" => (MediaKind::Video, "video/3gpp"),

        _ => return None,
    };
    Some(MediaType { kind, content_type })
}
