//! Filename derivation for playlist-dl
//!
//! Computes the canonical on-disk names for downloaded and converted songs.

use crate::core::resolver::ResolvedItem;

/// Characters that never reach the filesystem
pub const ILLEGAL_FILENAME_CHARS: &[char] = &['<', '>', ':', '/', '\\', '|', '?', '*', '"'];

/// Separator between the two name parts
pub const NAME_SEPARATOR: &str = " - ";

/// Extension given to downloaded songs
pub const DOWNLOAD_EXTENSION: &str = "mp3";

/// Order of title and artist in a generated filename
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilenameFormat {
    /// "title - artist"
    #[default]
    TitleArtist,
    /// "artist - title"
    ArtistTitle,
}

/// Replace every illegal character with `_`
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if ILLEGAL_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Generates the download filename for an item
pub fn resolve_output_filename(item: &ResolvedItem, format: FilenameFormat) -> String {
    let stem = match format {
        FilenameFormat::TitleArtist => format!("{}{NAME_SEPARATOR}{}", item.title, item.artist),
        FilenameFormat::ArtistTitle => format!("{}{NAME_SEPARATOR}{}", item.artist, item.title),
    };
    sanitize_filename(&format!("{stem}.{DOWNLOAD_EXTENSION}"))
}

/// Swap the parts around the first separator, `"A - B"` becomes `"B - A"`
///
/// Stems without the separator come back unchanged.
pub fn flip_name_order(stem: &str) -> String {
    match stem.split_once(NAME_SEPARATOR) {
        Some((first, rest)) => format!("{rest}{NAME_SEPARATOR}{first}"),
        None => stem.to_string(),
    }
}

/// Canonical converted filename for a source stem
pub fn canonical_converted_name(stem: &str, extension: &str, flip: bool) -> String {
    let stem = if flip {
        flip_name_order(stem)
    } else {
        stem.to_string()
    };
    sanitize_filename(&format!("{stem}.{extension}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, artist: &str) -> ResolvedItem {
        ResolvedItem {
            title: title.to_string(),
            artist: artist.to_string(),
            id: "1".to_string(),
        }
    }

    #[test]
    fn test_sanitize_replaces_every_illegal_char() {
        assert_eq!(sanitize_filename(r#"a<b>c:d/e\f|g?h*i"j"#), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_filename("plain name"), "plain name");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for name in [r#"AC/DC: "Live" <1991>?"#, "clean", "", "***"] {
            let once = sanitize_filename(name);
            assert_eq!(sanitize_filename(&once), once);
            assert!(!once.contains(ILLEGAL_FILENAME_CHARS));
        }
    }

    #[test]
    fn test_resolve_output_filename() {
        let song = item("Back in Black", "AC/DC");
        assert_eq!(
            resolve_output_filename(&song, FilenameFormat::TitleArtist),
            "Back in Black - AC_DC.mp3"
        );
        assert_eq!(
            resolve_output_filename(&song, FilenameFormat::ArtistTitle),
            "AC_DC - Back in Black.mp3"
        );
    }

    #[test]
    fn test_flip_name_order() {
        assert_eq!(flip_name_order("Artist - Song"), "Song - Artist");
        assert_eq!(flip_name_order("Artist - Song - Live"), "Song - Live - Artist");
        assert_eq!(flip_name_order("NoSeparator"), "NoSeparator");
        assert_eq!(flip_name_order("Hyphen-Only"), "Hyphen-Only");
    }

    #[test]
    fn test_canonical_converted_name() {
        assert_eq!(canonical_converted_name("Artist - Song", "mp3", false), "Artist - Song.mp3");
        assert_eq!(canonical_converted_name("Artist - Song", "mp3", true), "Song - Artist.mp3");
        assert_eq!(canonical_converted_name("Who? - What", "mp3", true), "What - Who_.mp3");
    }
}
