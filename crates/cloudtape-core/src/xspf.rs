//! XSPF playlist documents.
//!
//! [`encode`] writes exactly the fields the application round-trips:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <playlist xmlns="http://xspf.org/ns/0/" version="1">
//!   <title>Mix</title>
//!   <trackList>
//!     <track>
//!       <location>a/b.mp3</location>
//!       <duration>1000</duration>
//!       <meta rel="bitrate">128</meta>
//!       <meta rel="driveId">X1</meta>
//!     </track>
//!   </trackList>
//! </playlist>
//! ```
//!
//! [`decode`] accepts any well-formed document with a `playlist` root and
//! salvages what it can: unknown elements are skipped, unparsable numbers
//! become `None` and tracks without a location are dropped. The standard
//! XSPF `title`, `creator` and `album` track elements are read into the
//! track's tags.

use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use tracing::{debug, info, warn};

use crate::error::{
    Error, PlaylistError, Result, create_dir_error, read_error, write_error,
};
use crate::playlist::{Playlist, Track};

/// XSPF version 1 namespace.
pub const XSPF_NAMESPACE: &str = "http://xspf.org/ns/0/";

/// File extension of playlist documents (without dot).
pub const XSPF_EXTENSION: &str = "xspf";

/// MIME type of playlist documents.
pub const XSPF_CONTENT_TYPE: &str = "application/xspf+xml";

const META_BITRATE: &str = "bitrate";
const META_REMOTE_ID: &str = "driveId";

/// Serialize a playlist to an XSPF document.
///
/// # Errors
///
/// Returns [`PlaylistError::EncodeFailed`] if the XML writer fails.
pub fn encode(playlist: &Playlist) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_document(&mut writer, playlist).map_err(|reason| {
        Error::Playlist(PlaylistError::EncodeFailed {
            title: playlist.title.clone(),
            reason,
        })
    })?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

fn xml_err(e: impl std::fmt::Display) -> String {
    e.to_string()
}

fn write_document(
    writer: &mut Writer<Vec<u8>>,
    playlist: &Playlist,
) -> std::result::Result<(), String> {
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(
            BytesStart::new("playlist")
                .with_attributes([("xmlns", XSPF_NAMESPACE), ("version", "1")]),
        ))
        .map_err(xml_err)?;

    writer
        .create_element("title")
        .write_text_content(BytesText::new(&playlist.title))
        .map_err(xml_err)?;

    writer
        .write_event(Event::Start(BytesStart::new("trackList")))
        .map_err(xml_err)?;
    for track in &playlist.tracks {
        write_track(writer, track)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("trackList")))
        .map_err(xml_err)?;

    writer
        .write_event(Event::End(BytesEnd::new("playlist")))
        .map_err(xml_err)?;
    Ok(())
}

fn write_track(writer: &mut Writer<Vec<u8>>, track: &Track) -> std::result::Result<(), String> {
    writer
        .write_event(Event::Start(BytesStart::new("track")))
        .map_err(xml_err)?;

    writer
        .create_element("location")
        .write_text_content(BytesText::new(&track.location))
        .map_err(xml_err)?;

    if let Some(duration) = track.duration {
        writer
            .create_element("duration")
            .write_text_content(BytesText::new(&duration.to_string()))
            .map_err(xml_err)?;
    }

    if let Some(bitrate) = track.bitrate {
        writer
            .create_element("meta")
            .with_attribute(("rel", META_BITRATE))
            .write_text_content(BytesText::new(&bitrate.to_string()))
            .map_err(xml_err)?;
    }

    if !track.id.is_empty() {
        writer
            .create_element("meta")
            .with_attribute(("rel", META_REMOTE_ID))
            .write_text_content(BytesText::new(&track.id))
            .map_err(xml_err)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("track")))
        .map_err(xml_err)?;
    Ok(())
}

/// Fields of the `<track>` element being read.
#[derive(Default)]
struct TrackDraft {
    id: String,
    location: Option<String>,
    duration: Option<i64>,
    bitrate: Option<i32>,
    title: Option<String>,
    creator: Option<String>,
    album: Option<String>,
}

impl TrackDraft {
    fn finish(self) -> Option<Track> {
        let location = self.location.filter(|l| !l.is_empty())?;
        Some(Track {
            id: self.id,
            location,
            duration: self.duration,
            bitrate: self.bitrate,
            artist: self.creator,
            album: self.album,
            title: self.title,
            year: None,
            upload_date: None,
        })
    }
}

/// Decoder state over the element stack.
#[derive(Default)]
struct Decoder {
    stack: Vec<String>,
    text: String,
    meta_rel: Option<String>,
    seen_root: bool,
    title: String,
    tracks: Vec<Track>,
    current: Option<TrackDraft>,
    skipped: usize,
}

impl Decoder {
    fn open(&mut self, start: &BytesStart<'_>) -> Result<()> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();

        if self.stack.is_empty() {
            if self.seen_root {
                return Err(Error::malformed("content after the root element"));
            }
            if name != "playlist" {
                return Err(Error::malformed(format!(
                    "root element is <{name}>, expected <playlist>"
                )));
            }
            self.seen_root = true;
        }

        if self.in_track_list() && name == "track" {
            self.current = Some(TrackDraft::default());
        }
        if name == "meta" {
            self.meta_rel = start
                .try_get_attribute("rel")
                .map_err(Error::malformed)?
                .map(|attr| String::from_utf8_lossy(attr.value.as_ref()).into_owned());
        }

        self.stack.push(name);
        self.text.clear();
        Ok(())
    }

    fn close(&mut self) {
        let Some(name) = self.stack.pop() else {
            return;
        };
        let text = std::mem::take(&mut self.text);

        if self.stack.len() == 1 && name == "title" {
            self.title = text;
        } else if self.in_track_list() && name == "track" {
            if let Some(track) = self.current.take().and_then(TrackDraft::finish) {
                self.tracks.push(track);
            } else {
                self.skipped += 1;
            }
        } else if self.in_track()
            && let Some(draft) = self.current.as_mut()
        {
            match name.as_str() {
                "location" => draft.location = Some(text),
                "duration" => draft.duration = text.trim().parse().ok(),
                "title" => draft.title = non_blank(text),
                "creator" => draft.creator = non_blank(text),
                "album" => draft.album = non_blank(text),
                "meta" => match self.meta_rel.take().as_deref() {
                    Some(META_BITRATE) => draft.bitrate = text.trim().parse().ok(),
                    Some(META_REMOTE_ID) => draft.id = text,
                    _ => {}
                },
                _ => {}
            }
        }
    }

    /// Directly inside `<playlist><trackList>`.
    fn in_track_list(&self) -> bool {
        self.stack.len() == 2 && self.stack[1] == "trackList"
    }

    /// Directly inside a `<track>`.
    fn in_track(&self) -> bool {
        self.stack.len() == 3 && self.stack[1] == "trackList" && self.stack[2] == "track"
    }

    fn push_text(&mut self, text: &str) -> Result<()> {
        if self.stack.is_empty() {
            if text.trim().is_empty() {
                return Ok(());
            }
            return Err(Error::malformed("text outside the root element"));
        }
        self.text.push_str(text);
        Ok(())
    }
}

fn non_blank(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == text.len() {
        Some(text)
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse an XSPF document.
///
/// # Errors
///
/// Returns [`PlaylistError::MalformedDocument`] if the input is not
/// well-formed XML or its root element is not `playlist`.
pub fn decode(bytes: &[u8]) -> Result<Playlist> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut decoder = Decoder::default();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            Error::malformed(format!("{e} at byte {}", reader.buffer_position()))
        })?;

        match event {
            Event::Start(e) => decoder.open(&e)?,
            Event::Empty(e) => {
                decoder.open(&e)?;
                decoder.close();
            }
            Event::End(_) => decoder.close(),
            Event::Text(e) => {
                let text = e.decode().map_err(Error::malformed)?;
                decoder.push_text(&text)?;
            }
            Event::CData(e) => {
                let text = e.decode().map_err(Error::malformed)?;
                decoder.push_text(&text)?;
            }
            Event::GeneralRef(e) => {
                let resolved = if let Some(ch) = e.resolve_char_ref().map_err(Error::malformed)? {
                    ch.to_string()
                } else {
                    let name = e.decode().map_err(Error::malformed)?;
                    resolve_predefined_entity(&name)
                        .ok_or_else(|| Error::malformed(format!("undefined entity &{name};")))?
                        .to_string()
                };
                decoder.push_text(&resolved)?;
            }
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    if !decoder.seen_root {
        return Err(Error::malformed("document has no root element"));
    }
    if let Some(open) = decoder.stack.last() {
        return Err(Error::malformed(format!("unclosed element <{open}>")));
    }

    if decoder.skipped > 0 {
        debug!("Skipped {} tracks without a location", decoder.skipped);
    }

    Ok(Playlist {
        title: decoder.title,
        tracks: decoder.tracks,
    })
}

/// File name for a playlist document: the title with characters unsafe in
/// file names replaced by `_`, plus the `.xspf` extension.
#[must_use]
pub fn playlist_file_name(title: &str) -> String {
    let sanitized: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let stem = sanitized.trim().trim_end_matches('.');
    let stem = if stem.is_empty() { "playlist" } else { stem };
    format!("{stem}.{XSPF_EXTENSION}")
}

/// Write `playlist` as an XSPF file at `path`, creating parent directories.
///
/// # Errors
///
/// Returns an error if encoding fails or the file cannot be written.
pub async fn export_playlist(playlist: &Playlist, path: &Path) -> Result<()> {
    let bytes = encode(playlist)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| create_dir_error(parent, &e))?;
    }
    tokio::fs::write(path, &bytes)
        .await
        .map_err(|e| write_error(path, &e))?;
    info!(
        "Exported playlist '{}' ({} tracks) to {}",
        playlist.title,
        playlist.len(),
        path.display()
    );
    Ok(())
}

/// Read an XSPF file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is malformed.
pub async fn import_playlist(path: &Path) -> Result<Playlist> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| read_error(path, &e))?;
    let playlist = decode(&bytes)?;
    info!(
        "Imported playlist '{}' ({} tracks) from {}",
        playlist.title,
        playlist.len(),
        path.display()
    );
    Ok(playlist)
}

/// Export `playlist` into `dir` under [`playlist_file_name`].
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub async fn export_to_directory(playlist: &Playlist, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(playlist_file_name(&playlist.title));
    export_playlist(playlist, &path).await?;
    Ok(path)
}

/// Import every `.xspf` file in `dir`, sorted by file name.
///
/// Unreadable or malformed files are logged and skipped. A missing
/// directory yields an empty list.
///
/// # Errors
///
/// Returns an error if `dir` exists but cannot be listed.
pub async fn import_directory(dir: &Path) -> Result<Vec<Playlist>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(read_error(dir, &e)),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| read_error(dir, &e))?
    {
        let path = entry.path();
        let is_xspf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(XSPF_EXTENSION));
        if is_xspf {
            paths.push(path);
        }
    }
    paths.sort();

    let mut playlists = Vec::with_capacity(paths.len());
    for path in paths {
        match import_playlist(&path).await {
            Ok(playlist) => playlists.push(playlist),
            Err(e) => warn!("Skipping playlist file {}: {}", path.display(), e),
        }
    }
    Ok(playlists)
}
