//! File-extension to MIME type table.
use once_cell::sync::Lazy;
use std::collections::HashMap;

static MIME_TYPES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut types = HashMap::new();
    // Text
    types.insert("html", "text/html");
    types.insert("htm", "text/html");
    types.insert("js", "text/javascript");
    types.insert("txt", "text/plain");
    types.insert("css", "text/css");
    types.insert("xml", "text/xml");
    // Images
    types.insert("bmp", "image/bmp");
    types.insert("gif", "image/gif");
    types.insert("png", "image/png");
    types.insert("jpg", "image/jpeg");
    types.insert("jpeg", "image/jpeg");
    types.insert("ico", "image/x-icon");
    types.insert("svg", "image/svg+xml");
    // Audio
    types.insert("mid", "audio/midi");
    types.insert("midi", "audio/midi");
    types.insert("kar", "audio/midi");
    types.insert("mp3", "audio/mpeg");
    types.insert("ogg", "audio/ogg");
    types.insert("m4a", "audio/x-m4a");
    types.insert("ra", "audio/x-realaudio");
    // Video
    types.insert("3gp", "video/3gpp");
    types.insert("3gpp", "video/3gpp");
    types.insert("ts", "video/mp2t");
    types.insert("mp4", "video/mp4");
    types.insert("mpg", "video/mpeg");
    types.insert("mpeg", "video/mpeg");
    types.insert("mov", "video/quicktime");
    types.insert("webm", "video/webm");
    types.insert("flv", "video/x-flv");
    types.insert("m4v", "video/x-m4v");
    types.insert("mng", "video/x-mng");
    types.insert("asf", "video/x-ms-asf");
    types.insert("asx", "video/x-ms-asf");
    types.insert("wmv", "video/x-ms-wmv");
    types.insert("avi", "video/x-msvideo");
    // Applications
    types.insert("zip", "application/zip");
    types.insert("7z", "application/x-7z-compressed");
    types.insert("jar", "application/java-archive");
    types.insert("war", "application/java-archive");
    types.insert("ear", "application/java-archive");
    types.insert("json", "application/json");
    types.insert("pdf", "application/pdf");
    types.insert("xhtml", "application/xhtml+xml");
    types.insert("xspf", "application/xspf+xml");
    types.insert("der", "application/x-x509-ca-cert");
    types.insert("pem", "application/x-x509-ca-cert");
    types.insert("crt", "application/x-x509-ca-cert");
    types.insert("bin", "application/octet-stream");
    types.insert("exe", "application/octet-stream");
    types.insert("dll", "application/octet-stream");
    types.insert("deb", "application/octet-stream");
    types.insert("dmg", "application/octet-stream");
    types.insert("iso", "application/octet-stream");
    types.insert("img", "application/octet-stream");
    types.insert("msi", "application/octet-stream");
    types.insert("msp", "application/octet-stream");
    types.insert("msm", "application/octet-stream");
    types
});

/// Maps a path to the MIME type of its extension, defaulting to
/// `text/html`. Extension-only ("hidden") file names keep the default.
pub fn mime_type(path: &str) -> &'static str {
    if let Some(pos) = path.rfind('.') {
        if pos > 0 && !path[..pos].ends_with('/') {
            if let Some(mime) = MIME_TYPES.get(&path[pos + 1..]) {
                return mime;
            }
        }
    }
    "text/html"
}

#[cfg(test)]
mod tests {
    use super::mime_type;

    #[test]
    fn test_known_extensions() {
        assert_eq!(mime_type("/srv/www/index.html"), "text/html");
        assert_eq!(mime_type("photo.JPEG".to_lowercase().as_str()), "image/jpeg");
        assert_eq!(mime_type("/a/b/data.json"), "application/json");
        assert_eq!(mime_type("archive.tar.7z"), "application/x-7z-compressed");
    }

    #[test]
    fn test_defaults() {
        assert_eq!(mime_type("/srv/www/README"), "text/html");
        assert_eq!(mime_type("file.unknownext"), "text/html");
        // hidden files have no extension
        assert_eq!(mime_type("/srv/.gitignore"), "text/html");
        assert_eq!(mime_type(".profile"), "text/html");
    }
}
