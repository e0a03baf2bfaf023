use std::fmt;

use url::Url;

use crate::error::Error;

pub struct OptFmt<T>(pub Option<T>);

impl<T: fmt::Display> fmt::Display for OptFmt<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref t) = self.0 {
            fmt::Display::fmt(t, f)
        } else {
            f.write_str("-")
        }
    }
}

/// Appends the `/`-separated segments of `path` to `base`, e.g. an object key to the
/// distribution URL.
pub fn join_url(base: &Url, path: &str) -> Result<Url, Error> {
    let mut url = base.clone();
    {
        let mut path_segments = url
            .path_segments_mut()
            .map_err(|_| Error::InvalidUrlError(String::from("URL cannot be a base")))?;
        path_segments.pop_if_empty();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            path_segments.push(segment);
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        let base = Url::parse("https://d1234.cloudfront.net").unwrap();
        assert_eq!(
            join_url(&base, "landscape/abc.mp4").unwrap().as_str(),
            "https://d1234.cloudfront.net/landscape/abc.mp4"
        );

        let base = Url::parse("https://cdn.example.com/media/").unwrap();
        assert_eq!(
            join_url(&base, "portrait/x_-y.mp4").unwrap().as_str(),
            "https://cdn.example.com/media/portrait/x_-y.mp4"
        );
    }

    #[test]
    fn test_join_url_cannot_be_base() {
        let base = Url::parse("mailto:someone@example.com").unwrap();
        assert!(join_url(&base, "a.mp4").is_err());
    }

    #[test]
    fn test_opt_fmt() {
        assert_eq!(OptFmt(Some(5)).to_string(), "5");
        assert_eq!(OptFmt::<u8>(None).to_string(), "-");
    }
}
