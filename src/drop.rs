// Drag-and-drop payload parsing
// Turns a text/uri-list payload into local file paths

use log::debug;
use std::path::PathBuf;
use url::Url;

/// MIME type a file manager offers for dragged files
pub const URI_LIST_MIME: &str = "text/uri-list";

/// Extract local file paths from a `text/uri-list` payload, in order.
///
/// Comment lines and blank lines are skipped, as is anything that is not a `file://` URI.
pub fn parse_uri_list(payload: &str) -> Vec<PathBuf> {
    payload
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match Url::parse(line) {
            Ok(url) if url.scheme() == "file" => url.to_file_path().ok(),
            Ok(url) => {
                debug!("Skipping non-file URI: {}", url);
                None
            }
            Err(e) => {
                debug!("Skipping malformed URI {:?}: {}", line, e);
                None
            }
        })
        .collect()
}

/// The path that a drop should load, if any
pub fn first_local_path(payload: &str) -> Option<PathBuf> {
    parse_uri_list(payload).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_blank_lines_and_remote_uris() {
        let payload = "# dragged from nautilus\r\n\
                       \r\n\
                       https://example.com/cat.png\r\n\
                       file:///home/me/a.png\r\n\
                       file:///home/me/b.jpg\r\n";
        assert_eq!(
            parse_uri_list(payload),
            vec![PathBuf::from("/home/me/a.png"), PathBuf::from("/home/me/b.jpg")]
        );
    }

    #[test]
    fn decodes_percent_escapes() {
        let payload = "file:///tmp/my%20pictures/caf%C3%A9.png";
        assert_eq!(
            first_local_path(payload),
            Some(PathBuf::from("/tmp/my pictures/café.png"))
        );
    }

    #[test]
    fn nothing_usable() {
        assert_eq!(first_local_path(""), None);
        assert_eq!(first_local_path("not a uri at all"), None);
        assert_eq!(first_local_path("#only a comment\n"), None);
    }
}
