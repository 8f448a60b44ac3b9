//! Parse HTTP response header lines collected from curl.

/// Response headers of the final response, names lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    pairs: Vec<(String, String)>,
}

impl ResponseHeaders {
    /// Parse collected header lines.
    ///
    /// With redirects followed (or a `100 Continue`), curl reports one header
    /// block per response; each status line starts a new block and only the
    /// last block is kept.
    pub fn parse(lines: &[String]) -> Self {
        let mut pairs = Vec::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with("HTTP/") {
                pairs.clear();
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                pairs.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
            }
        }
        Self { pairs }
    }

    /// First value of a header, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.get("content-length")?.parse().ok()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for ResponseHeaders {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(n, v)| (n.into().to_ascii_lowercase(), v.into()))
                .collect(),
        }
    }
}
