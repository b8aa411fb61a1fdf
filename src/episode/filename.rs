// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use url::Url;

/// Characters never allowed in a file or directory name
const RESERVED_CHARS: &str = "|\\?*<\":>+[]/'#!,&";

fn is_reserved_char(c: char) -> bool {
    RESERVED_CHARS.contains(c)
}

/// Strip all reserved characters from a name. The result may be empty.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars().filter(|c| !is_reserved_char(*c)).collect()
}

/// Extract the file ending (including the dot) from the last path segment of a URL
///
/// A dot in first position (hidden file) or last position does not count.
/// Unparseable URLs yield no ending.
pub fn file_ending(episode_url: &str) -> Option<String> {
    let url = Url::parse(episode_url).ok()?;
    let segment = url.path_segments()?.next_back()?;

    match segment.rfind('.') {
        Some(index) if index > 0 && index + 1 < segment.len() => {
            Some(segment[index..].to_string())
        }
        _ => None,
    }
}

/// Relative location of a downloaded episode: `<podcast>/<episode><.ending>`
///
/// Both name components are sanitized independently, the ending is taken from
/// the episode URL. The result depends on nothing but the inputs, which is what
/// lets the journal loader find files without a stored mapping.
pub fn sanitize_file_path(podcast: &str, episode: &str, episode_url: &str) -> PathBuf {
    let ending = file_ending(episode_url).unwrap_or_default();

    PathBuf::from(sanitize_file_name(podcast)).join(sanitize_file_name(&format!(
        "{}{}",
        episode, ending
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_every_reserved_char() {
        assert_eq!(
            sanitize_file_name("a|b\\c?d*e<f\"g:h>i+j[k]l/m'n#o!p,q&r"),
            "abcdefghijklmnopqr"
        );
    }

    #[test]
    fn sanitize_keeps_spaces_dots_and_unicode() {
        assert_eq!(sanitize_file_name("Café Nr. 5 - Folge"), "Café Nr. 5 - Folge");
    }

    #[test]
    fn sanitize_handles_only_reserved_chars() {
        assert_eq!(sanitize_file_name("///"), "");
    }

    #[test]
    fn file_ending_from_last_segment() {
        assert_eq!(file_ending("http://x/y/z.mp3"), Some(".mp3".to_string()));
        assert_eq!(
            file_ending("https://cdn.example.com/a.b/episode.M4A?token=1"),
            Some(".M4A".to_string())
        );
    }

    #[test]
    fn file_ending_absent_without_dot() {
        assert_eq!(file_ending("https://example.com/episode"), None);
        assert_eq!(file_ending("https://example.com/"), None);
    }

    #[test]
    fn file_ending_ignores_leading_and_trailing_dots() {
        assert_eq!(file_ending("https://example.com/.hidden"), None);
        assert_eq!(file_ending("https://example.com/episode."), None);
    }

    #[test]
    fn file_ending_absent_for_malformed_url() {
        assert_eq!(file_ending("not a url at all.mp3"), None);
    }

    #[test]
    fn file_path_strips_components_independently() {
        let path = sanitize_file_path("My/Cast", "Ep:1", "http://x/y/z.mp3");
        assert_eq!(path, PathBuf::from("MyCast").join("Ep1.mp3"));
    }

    #[test]
    fn file_path_is_deterministic() {
        let first = sanitize_file_path("My/Cast", "Ep:1", "http://x/y/z.mp3");
        for _ in 0..10 {
            assert_eq!(sanitize_file_path("My/Cast", "Ep:1", "http://x/y/z.mp3"), first);
        }
    }

    #[test]
    fn file_path_without_ending_for_bad_url() {
        let path = sanitize_file_path("Cast", "Episode #3!", "::::");
        assert_eq!(path, PathBuf::from("Cast").join("Episode 3"));
    }
}
