use regex::Regex;
use url::Url;

/// Extracts the file name from a URL: the last path segment, query string
/// excluded. Falls back to the raw tail of the string for inputs the `url`
/// crate cannot parse.
pub fn file_name_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|segment| !segment.is_empty())
        .unwrap_or_else(|| url.rsplit('/').next().unwrap_or(url).to_string())
}

/// Whether the name ends in a `.ext`-style extension.
pub fn has_extension(name: &str) -> bool {
    Regex::new(r".+\.\w+$")
        .map(|re| re.is_match(name))
        .unwrap_or(false)
}

/// Renders a byte count the way it appears in substatus text, e.g. `5.00 Mb`.
pub fn human_size_str(bytes: u64) -> String {
    const KILO: f64 = 1000.0;

    let bytes_f = bytes as f64;
    if bytes_f >= KILO * KILO * KILO {
        format!("{:.2} Gb", bytes_f / (KILO * KILO * KILO))
    } else if bytes_f >= KILO * KILO {
        format!("{:.2} Mb", bytes_f / (KILO * KILO))
    } else if bytes_f >= KILO {
        format!("{:.2} Kb", bytes_f / KILO)
    } else {
        format!("{bytes} bytes")
    }
}
